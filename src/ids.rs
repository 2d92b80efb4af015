//! ULID-backed identifiers for requests and continuations.
//!
//! Both render as 26-character Crockford base32 strings, sort by creation
//! time, and travel through headers, cookies and query strings as text.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

macro_rules! ulid_id {
    ($(#[$meta:meta])* $name:ident, $what:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Eq, PartialEq, Hash, PartialOrd, Ord, Debug)]
        pub struct $name(ulid::Ulid);

        impl $name {
            #[must_use]
            pub fn new() -> Self {
                Self(ulid::Ulid::new())
            }

            /// Creation time encoded in the id, in milliseconds since the epoch
            #[must_use]
            pub fn timestamp_ms(&self) -> u64 {
                self.0.timestamp_ms()
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }

        impl FromStr for $name {
            type Err = ulid::DecodeError;

            /// Surrounding whitespace is ignored; clients echo ids back verbatim
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                ulid::Ulid::from_string(s.trim()).map(Self)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let raw = String::deserialize(deserializer)?;
                raw.parse::<Self>()
                    .map_err(|e| serde::de::Error::custom(format!("invalid {}: {e}", $what)))
            }
        }
    };
}

ulid_id!(
    /// Correlates every log line of one request. Taken from `x-request-id`
    /// when the client sends a valid one.
    RequestId,
    "request id"
);

ulid_id!(
    /// Names one parked continuation.
    ///
    /// Handed to the client (cookie or `contId` query parameter) and used as
    /// the key of the continuation table. A fresh id is issued on every pause.
    ContinuationId,
    "continuation id"
);

impl RequestId {
    /// Parse `header_value`, or mint a new id if it is missing or malformed.
    #[must_use]
    pub fn from_header_or_new(header_value: Option<&str>) -> Self {
        header_value
            .and_then(|s| s.parse::<Self>().ok())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn continuation_ids_are_unique_and_parse_back() {
        let a = ContinuationId::new();
        let b = ContinuationId::new();
        assert_ne!(a, b);
        let parsed: ContinuationId = format!(" {a}\n").parse().unwrap();
        assert_eq!(parsed, a);
    }

    #[test]
    fn garbage_continuation_id_is_rejected() {
        assert!("not-a-ulid".parse::<ContinuationId>().is_err());
    }

    #[test]
    fn request_id_header_is_kept_when_valid() {
        let sent = RequestId::new();
        let id = RequestId::from_header_or_new(Some(&sent.to_string()));
        assert_eq!(id, sent);

        let fresh = RequestId::from_header_or_new(Some("???"));
        assert_ne!(fresh, sent);
        assert_eq!(fresh.to_string().len(), 26);
    }

    #[test]
    fn ids_serialize_as_strings() {
        let id = ContinuationId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{id}\""));
        let back: ContinuationId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
        assert!(id.timestamp_ms() > 0);
        assert!(serde_json::from_str::<RequestId>("\"nope\"").is_err());
    }
}
