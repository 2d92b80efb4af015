//! Outbound response sink.
//!
//! Stages write into a [`Response`] incrementally through the
//! [`Context`](crate::dispatcher::Context). The dispatcher moves the buffer out
//! exactly once per request (or once per pause), which is the point where it
//! is considered finalized.

use super::request::HeaderVec;
use http::StatusCode;
use serde::Serialize;
use std::fmt::{Display, Write as _};
use std::sync::Arc;

/// A cookie to be sent with `Set-Cookie`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    pub path: Option<String>,
    pub max_age: Option<u64>,
    pub http_only: bool,
}

impl Cookie {
    #[must_use]
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            path: None,
            max_age: None,
            http_only: false,
        }
    }

    #[must_use]
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    #[must_use]
    pub fn max_age(mut self, secs: u64) -> Self {
        self.max_age = Some(secs);
        self
    }

    #[must_use]
    pub fn http_only(mut self) -> Self {
        self.http_only = true;
        self
    }

    /// Render as a `Set-Cookie` header value.
    #[must_use]
    pub fn to_header_value(&self) -> String {
        let mut out = format!("{}={}", self.name, self.value);
        if let Some(path) = &self.path {
            let _ = write!(out, "; Path={path}");
        }
        if let Some(age) = self.max_age {
            let _ = write!(out, "; Max-Age={age}");
        }
        if self.http_only {
            out.push_str("; HttpOnly");
        }
        out
    }
}

/// Accumulated response: status, headers, cookies and body bytes.
#[derive(Debug, Clone)]
pub struct Response {
    status: StatusCode,
    headers: HeaderVec,
    cookies: Vec<Cookie>,
    body: Vec<u8>,
}

impl Default for Response {
    fn default() -> Self {
        Self::new()
    }
}

impl Response {
    #[must_use]
    pub fn new() -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderVec::new(),
            cookies: Vec::new(),
            body: Vec::new(),
        }
    }

    /// Empty response with the given status.
    #[must_use]
    pub fn with_status(status: StatusCode) -> Self {
        let mut res = Self::new();
        res.status = status;
        res
    }

    /// Append the `Display` rendering of a value to the body.
    pub fn print(&mut self, value: impl Display) {
        let _ = write!(ByteWriter(&mut self.body), "{value}");
    }

    /// Append raw bytes to the body.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.body.extend_from_slice(bytes);
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    /// Get a header by name
    #[inline]
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Add or update a header
    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        self.headers.push((Arc::from(name), value.into()));
    }

    pub fn set_content_type(&mut self, content_type: &str) {
        self.set_header("content-type", content_type);
    }

    /// Add a cookie, replacing an earlier one with the same name.
    pub fn add_cookie(&mut self, cookie: Cookie) {
        self.cookies.retain(|c| c.name != cookie.name);
        self.cookies.push(cookie);
    }

    #[must_use]
    pub fn cookie(&self, name: &str) -> Option<&Cookie> {
        self.cookies.iter().find(|c| c.name == name)
    }

    #[must_use]
    pub fn cookies(&self) -> &[Cookie] {
        &self.cookies
    }

    #[must_use]
    pub fn headers(&self) -> &HeaderVec {
        &self.headers
    }

    #[must_use]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Body decoded as UTF-8, lossily.
    #[must_use]
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Discard the body produced so far.
    pub fn clear_body(&mut self) {
        self.body.clear();
    }

    /// Convert into an `http::Response`, emitting one `Set-Cookie` per cookie.
    #[must_use]
    pub fn into_http(self) -> http::Response<Vec<u8>> {
        let mut builder = http::Response::builder().status(self.status);
        for (name, value) in &self.headers {
            builder = builder.header(name.as_ref(), value.as_str());
        }
        for cookie in &self.cookies {
            builder = builder.header(http::header::SET_COOKIE, cookie.to_header_value());
        }
        match builder.body(self.body) {
            Ok(res) => res,
            Err(_) => {
                let mut res = http::Response::new(Vec::new());
                *res.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
                res
            }
        }
    }
}

struct ByteWriter<'a>(&'a mut Vec<u8>);

impl std::fmt::Write for ByteWriter<'_> {
    fn write_str(&mut self, s: &str) -> std::fmt::Result {
        self.0.extend_from_slice(s.as_bytes());
        Ok(())
    }
}
