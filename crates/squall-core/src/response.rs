//! Canonical HTTP response
//!
//! Mutable accumulator the handler writes into. The first write picks the
//! sink kind (bytes or text); asking for the other kind afterwards is a
//! state error.

use crate::cookie::Cookie;
use crate::{Error, Result};
use smallvec::SmallVec;

/// HTTP Status Code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusCode(pub u16);

impl StatusCode {
    pub const OK: StatusCode = StatusCode(200);
    pub const CREATED: StatusCode = StatusCode(201);
    pub const NO_CONTENT: StatusCode = StatusCode(204);
    pub const MOVED_PERMANENTLY: StatusCode = StatusCode(301);
    pub const FOUND: StatusCode = StatusCode(302);
    pub const NOT_MODIFIED: StatusCode = StatusCode(304);
    pub const BAD_REQUEST: StatusCode = StatusCode(400);
    pub const UNAUTHORIZED: StatusCode = StatusCode(401);
    pub const FORBIDDEN: StatusCode = StatusCode(403);
    pub const NOT_FOUND: StatusCode = StatusCode(404);
    pub const METHOD_NOT_ALLOWED: StatusCode = StatusCode(405);
    pub const INTERNAL_SERVER_ERROR: StatusCode = StatusCode(500);
    pub const SERVICE_UNAVAILABLE: StatusCode = StatusCode(503);

    /// Get the numeric code
    pub fn as_u16(&self) -> u16 {
        self.0
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.0)
    }

    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.0)
    }

    pub fn is_server_error(&self) -> bool {
        (500..600).contains(&self.0)
    }
}

impl From<u16> for StatusCode {
    fn from(code: u16) -> Self {
        StatusCode(code)
    }
}

impl std::fmt::Display for StatusCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The body sink a handler wrote into
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseBody {
    Bytes(Vec<u8>),
    Text(String),
}

/// Canonical HTTP response
#[derive(Debug)]
pub struct Response {
    status: StatusCode,
    headers: SmallVec<[(String, String); 8]>,
    content_type: Option<String>,
    character_encoding: Option<String>,
    cookies: Vec<Cookie>,
    sink: Option<ResponseBody>,
}

impl Response {
    /// Create a new response (status 200, no body)
    pub fn new() -> Self {
        Self {
            status: StatusCode::OK,
            headers: SmallVec::new(),
            content_type: None,
            character_encoding: None,
            cookies: Vec::new(),
            sink: None,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn set_status(&mut self, status: impl Into<StatusCode>) {
        self.status = status.into();
    }

    /// First value of a header. Writes are case-sensitive; the lookup is
    /// exact.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Append a header value
    pub fn add_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.push((name.into(), value.into()));
    }

    /// Replace all values of a header
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.headers.retain(|(k, _)| *k != name);
        self.headers.push((name, value.into()));
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn set_content_type(&mut self, content_type: impl Into<String>) {
        self.content_type = Some(content_type.into());
    }

    pub fn character_encoding(&self) -> Option<&str> {
        self.character_encoding.as_deref()
    }

    pub fn set_character_encoding(&mut self, encoding: impl Into<String>) {
        self.character_encoding = Some(encoding.into());
    }

    /// Queue a cookie to be set on the client
    pub fn add_cookie(&mut self, cookie: Cookie) {
        self.cookies.push(cookie);
    }

    pub fn cookies(&self) -> &[Cookie] {
        &self.cookies
    }

    /// Byte sink. The first call fixes the sink kind for the response's
    /// lifetime; calling this after the text sink was chosen is an error.
    pub fn output(&mut self) -> Result<&mut Vec<u8>> {
        match self.sink {
            None => {
                self.sink = Some(ResponseBody::Bytes(Vec::new()));
            }
            Some(ResponseBody::Bytes(_)) => {}
            Some(ResponseBody::Text(_)) => {
                return Err(Error::State(
                    "text sink already chosen for this response".to_string(),
                ));
            }
        }
        match self.sink {
            Some(ResponseBody::Bytes(ref mut buf)) => Ok(buf),
            _ => unreachable!("sink was just fixed to bytes"),
        }
    }

    /// Text sink; the counterpart of [`Response::output`].
    pub fn writer(&mut self) -> Result<&mut String> {
        match self.sink {
            None => {
                self.sink = Some(ResponseBody::Text(String::new()));
            }
            Some(ResponseBody::Text(_)) => {}
            Some(ResponseBody::Bytes(_)) => {
                return Err(Error::State(
                    "byte sink already chosen for this response".to_string(),
                ));
            }
        }
        match self.sink {
            Some(ResponseBody::Text(ref mut buf)) => Ok(buf),
            _ => unreachable!("sink was just fixed to text"),
        }
    }

    /// Append text to the text sink
    pub fn write_text(&mut self, text: &str) -> Result<()> {
        self.writer()?.push_str(text);
        Ok(())
    }

    /// Append bytes to the byte sink
    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.output()?.extend_from_slice(bytes);
        Ok(())
    }

    /// Decompose the response for platform encoding
    pub fn into_parts(self) -> ResponseParts {
        ResponseParts {
            status: self.status,
            headers: self.headers,
            content_type: self.content_type,
            character_encoding: self.character_encoding,
            cookies: self.cookies,
            body: self.sink,
        }
    }
}

impl Default for Response {
    fn default() -> Self {
        Self::new()
    }
}

/// A finished response, broken apart for the adapter's reply encoder
pub struct ResponseParts {
    pub status: StatusCode,
    pub headers: SmallVec<[(String, String); 8]>,
    pub content_type: Option<String>,
    pub character_encoding: Option<String>,
    pub cookies: Vec<Cookie>,
    pub body: Option<ResponseBody>,
}
