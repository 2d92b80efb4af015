//! Inbound request handle consumed by the router and the dispatch pipeline.
//!
//! The engine never parses HTTP off a socket; a transport layer builds a
//! [`Request`] (directly, or from an [`http::Request`]) and hands it to the
//! [`Gate`](crate::gate::Gate).

use crate::ids::RequestId;
use crate::router::ParamVec;
use http::Method;
use smallvec::SmallVec;
use std::sync::Arc;
use tracing::debug;

/// Maximum inline headers/cookies before heap allocation
/// Most requests have ≤16 headers (JSF: no heap in hot path)
pub const MAX_INLINE_HEADERS: usize = 16;

/// Stack-allocated header/cookie storage for the hot path
///
/// Header names use `Arc<str>` so repeated names (`content-type`, `cookie`)
/// clone in O(1); values stay owned per request.
pub type HeaderVec = SmallVec<[(Arc<str>, String); MAX_INLINE_HEADERS]>;

/// An inbound request: method, path, parameters, headers, cookies and body.
#[derive(Debug, Clone)]
pub struct Request {
    /// Unique request ID for tracing and correlation
    pub request_id: RequestId,
    /// HTTP method (GET, POST, etc.)
    pub method: Method,
    /// Request path without the query string
    pub path: String,
    /// Query string parameters, in order of appearance
    pub query_params: ParamVec,
    /// HTTP headers (lowercase names)
    pub headers: HeaderVec,
    /// Cookies parsed from the Cookie header
    pub cookies: HeaderVec,
    /// Raw request body
    pub body: Vec<u8>,
}

impl Request {
    /// Build a request from a method and a target such as `/users?id=7`.
    #[must_use]
    pub fn new(method: Method, target: &str) -> Self {
        let (path, query) = match target.split_once('?') {
            Some((p, q)) => (p, Some(q)),
            None => (target, None),
        };
        Self {
            request_id: RequestId::new(),
            method,
            path: path.to_string(),
            query_params: query.map(parse_query_params).unwrap_or_default(),
            headers: HeaderVec::new(),
            cookies: HeaderVec::new(),
            body: Vec::new(),
        }
    }

    /// Shorthand for `Request::new(Method::GET, target)`.
    #[must_use]
    pub fn get(target: &str) -> Self {
        Self::new(Method::GET, target)
    }

    /// Shorthand for `Request::new(Method::POST, target)`.
    #[must_use]
    pub fn post(target: &str) -> Self {
        Self::new(Method::POST, target)
    }

    /// Convert an `http::Request` into an engine request.
    ///
    /// Header names are lower-cased, the `Cookie` header is split into
    /// individual cookies and a valid `x-request-id` header is reused.
    #[must_use]
    pub fn from_http(req: http::Request<Vec<u8>>) -> Self {
        let (parts, body) = req.into_parts();
        let target = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        let mut request = Self::new(parts.method, target);

        for (name, value) in &parts.headers {
            let value = String::from_utf8_lossy(value.as_bytes()).to_string();
            request.headers.push((Arc::from(name.as_str()), value));
        }
        request.cookies = parse_cookies(&request.headers);
        request.request_id = RequestId::from_header_or_new(request.header("x-request-id"));
        request.body = body;

        debug!(
            request_id = %request.request_id,
            method = %request.method,
            path = %request.path,
            header_count = request.headers.len(),
            cookie_count = request.cookies.len(),
            "HTTP request converted"
        );
        request
    }

    /// Add a header, returning `self` for chaining.
    #[must_use]
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        let name = name.to_ascii_lowercase();
        if name == "cookie" {
            for (k, v) in split_cookie_header(value) {
                self.cookies.push((Arc::from(k), v.to_string()));
            }
        }
        self.headers.push((Arc::from(name.as_str()), value.to_string()));
        self
    }

    /// Add a cookie, returning `self` for chaining.
    #[must_use]
    pub fn with_cookie(mut self, name: &str, value: &str) -> Self {
        self.cookies.push((Arc::from(name), value.to_string()));
        self
    }

    /// Add a query parameter, returning `self` for chaining.
    #[must_use]
    pub fn with_param(mut self, name: &str, value: &str) -> Self {
        self.query_params.push((Arc::from(name), value.to_string()));
        self
    }

    /// Set the request body, returning `self` for chaining.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Get a query parameter by name
    ///
    /// Uses "last write wins" semantics for repeated names.
    #[inline]
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&str> {
        self.query_params
            .iter()
            .rfind(|(k, _)| k.as_ref() == name)
            .map(|(_, v)| v.as_str())
    }

    /// All values of a repeated query parameter, in order.
    #[must_use]
    pub fn param_values(&self, name: &str) -> Vec<&str> {
        self.query_params
            .iter()
            .filter(|(k, _)| k.as_ref() == name)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    /// Get a header by name (case-insensitive per RFC 7230)
    #[inline]
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Get a cookie by name
    #[inline]
    #[must_use]
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies
            .iter()
            .rfind(|(k, _)| k.as_ref() == name)
            .map(|(_, v)| v.as_str())
    }

    /// Body decoded as UTF-8, lossily.
    #[must_use]
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

fn split_cookie_header(value: &str) -> impl Iterator<Item = (&str, &str)> {
    value.split(';').filter_map(|pair| {
        let mut parts = pair.trim().splitn(2, '=');
        let name = parts.next()?.trim();
        if name.is_empty() {
            return None;
        }
        let value = parts.next().unwrap_or("").trim();
        Some((name, value))
    })
}

/// Parse cookies out of the `cookie` header(s).
#[must_use]
pub fn parse_cookies(headers: &HeaderVec) -> HeaderVec {
    headers
        .iter()
        .filter(|(k, _)| k.eq_ignore_ascii_case("cookie"))
        .flat_map(|(_, v)| split_cookie_header(v))
        .map(|(k, v)| (Arc::from(k), v.to_string()))
        .collect()
}

/// Parse and URL-decode a raw query string (without the leading `?`).
#[must_use]
pub fn parse_query_params(query: &str) -> ParamVec {
    url::form_urlencoded::parse(query.as_bytes())
        .map(|(k, v)| (Arc::from(k.as_ref()), v.into_owned()))
        .collect()
}
