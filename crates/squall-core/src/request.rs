//! Canonical HTTP request
//!
//! The platform-neutral request every adapter converges on. Immutable once
//! built, except for the request-scoped attribute map, the once-consumable
//! body, and the lazily created session.

use crate::cookie::Cookie;
use crate::form::{Charset, ParamMap};
use crate::session::{Session, SessionHooks};
use crate::{Error, Result};
use bytes::Bytes;
use smallvec::SmallVec;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// HTTP Methods
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Head,
    Options,
    Connect,
    Trace,
}

impl Method {
    /// Convert to string
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Patch => "PATCH",
            Method::Head => "HEAD",
            Method::Options => "OPTIONS",
            Method::Connect => "CONNECT",
            Method::Trace => "TRACE",
        }
    }
}

impl std::str::FromStr for Method {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_uppercase().as_str() {
            "GET" => Ok(Method::Get),
            "POST" => Ok(Method::Post),
            "PUT" => Ok(Method::Put),
            "DELETE" => Ok(Method::Delete),
            "PATCH" => Ok(Method::Patch),
            "HEAD" => Ok(Method::Head),
            "OPTIONS" => Ok(Method::Options),
            "CONNECT" => Ok(Method::Connect),
            "TRACE" => Ok(Method::Trace),
            _ => Err(Error::Parse(format!("invalid HTTP method: {s}"))),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Resolved body payload
enum Payload {
    Bytes(Bytes),
    Text(String),
}

type Supplier = Box<dyn FnOnce() -> Result<Payload> + Send>;

/// Request (or response) body: exactly one lazy byte or text supplier,
/// consumable exactly once.
///
/// Whichever representation the handler asks for is transcoded on the fly
/// from whatever the adapter supplied, using the declared charset.
pub struct Body {
    supplier: Option<Supplier>,
    charset: Charset,
}

impl Body {
    /// An empty body (consumable once, yielding no bytes)
    pub fn empty() -> Self {
        Self::from_bytes(Bytes::new())
    }

    /// A body that was already drained by the framework (e.g. a
    /// form-encoded payload merged into the parameter map)
    pub fn consumed() -> Self {
        Self {
            supplier: None,
            charset: Charset::Utf8,
        }
    }

    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        let bytes = bytes.into();
        Self::lazy_bytes(move || Ok(bytes))
    }

    pub fn from_text(text: impl Into<String>) -> Self {
        let text = text.into();
        Self::lazy_text(move || Ok(text))
    }

    /// Defer byte production until first consumption
    pub fn lazy_bytes<F>(supplier: F) -> Self
    where
        F: FnOnce() -> Result<Bytes> + Send + 'static,
    {
        Self {
            supplier: Some(Box::new(move || supplier().map(Payload::Bytes))),
            charset: Charset::Utf8,
        }
    }

    /// Defer text production until first consumption
    pub fn lazy_text<F>(supplier: F) -> Self
    where
        F: FnOnce() -> Result<String> + Send + 'static,
    {
        Self {
            supplier: Some(Box::new(move || supplier().map(Payload::Text))),
            charset: Charset::Utf8,
        }
    }

    pub fn with_charset(mut self, charset: Charset) -> Self {
        self.charset = charset;
        self
    }

    /// Whether the body has already been consumed (or drained)
    pub fn is_consumed(&self) -> bool {
        self.supplier.is_none()
    }

    fn resolve(&mut self) -> Result<Payload> {
        let supplier = self
            .supplier
            .take()
            .ok_or_else(|| Error::State("request body already consumed".to_string()))?;
        supplier()
    }

    /// Consume the body as raw bytes. A second consumption of either
    /// representation is a state error.
    pub fn bytes(&mut self) -> Result<Bytes> {
        match self.resolve()? {
            Payload::Bytes(b) => Ok(b),
            Payload::Text(s) => Ok(Bytes::from(self.charset.encode(&s))),
        }
    }

    /// Consume the body as text, decoding with the declared charset.
    pub fn text(&mut self) -> Result<String> {
        match self.resolve()? {
            Payload::Text(s) => Ok(s),
            Payload::Bytes(b) => self.charset.decode(&b),
        }
    }

    /// Consume the body as a byte stream.
    pub fn reader(&mut self) -> Result<std::io::Cursor<Bytes>> {
        Ok(std::io::Cursor::new(self.bytes()?))
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Body")
            .field("consumed", &self.is_consumed())
            .field("charset", &self.charset)
            .finish()
    }
}

/// Canonical HTTP request
pub struct Request {
    method: Method,
    uri: String,
    url: String,
    query_string: Option<String>,
    protocol: String,
    content_type: Option<String>,
    content_length: i64,
    context_path: String,
    server_name: String,
    server_port: i32,
    secure: bool,
    remote_addr: Option<String>,
    remote_host: Option<String>,
    headers: SmallVec<[(String, String); 16]>,
    parameters: ParamMap,
    cookies: Vec<Cookie>,
    attributes: HashMap<String, Box<dyn Any + Send + Sync>>,
    body: Body,
    session: Option<Session>,
    session_hooks: Arc<SessionHooks>,
}

impl Request {
    /// HTTP method
    pub fn method(&self) -> Method {
        self.method
    }

    /// Path within the context (context path already stripped)
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Context path plus path, as the client addressed it
    pub fn request_uri(&self) -> String {
        format!("{}{}", self.context_path, self.uri)
    }

    /// Fully qualified URL (scheme, authority, request URI)
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn query_string(&self) -> Option<&str> {
        self.query_string.as_deref()
    }

    pub fn protocol(&self) -> &str {
        &self.protocol
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    /// Declared content length; -1 when unset
    pub fn content_length(&self) -> i64 {
        self.content_length
    }

    pub fn context_path(&self) -> &str {
        &self.context_path
    }

    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    /// Declared server port; -1 when unset
    pub fn server_port(&self) -> i32 {
        self.server_port
    }

    pub fn is_secure(&self) -> bool {
        self.secure
    }

    pub fn remote_addr(&self) -> Option<&str> {
        self.remote_addr.as_deref()
    }

    pub fn remote_host(&self) -> Option<&str> {
        self.remote_host.as_deref()
    }

    /// First value of a header (name lookup is case-insensitive; stored
    /// names are always lower-case)
    pub fn header(&self, name: &str) -> Option<&str> {
        let name = name.to_lowercase();
        self.headers
            .iter()
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v.as_str())
    }

    /// All values of a header, in arrival order
    pub fn header_values(&self, name: &str) -> Vec<&str> {
        let name = name.to_lowercase();
        self.headers
            .iter()
            .filter(|(k, _)| *k == name)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    /// All header names (lower-case, deduplicated, arrival order)
    pub fn header_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for (k, _) in &self.headers {
            if !names.contains(&k.as_str()) {
                names.push(k);
            }
        }
        names
    }

    /// First non-null value of a parameter
    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters
            .get(name)?
            .iter()
            .find_map(|v| v.as_deref())
    }

    /// All values of a parameter, in arrival order
    pub fn parameter_values(&self, name: &str) -> Option<&[Option<String>]> {
        self.parameters.get(name).map(Vec::as_slice)
    }

    pub fn parameters(&self) -> &ParamMap {
        &self.parameters
    }

    pub fn cookies(&self) -> &[Cookie] {
        &self.cookies
    }

    /// Typed request attribute lookup
    pub fn attribute<T: Any + Send + Sync>(&self, name: &str) -> Option<&T> {
        self.attributes.get(name)?.downcast_ref()
    }

    pub fn set_attribute<T: Any + Send + Sync>(&mut self, name: impl Into<String>, value: T) {
        self.attributes.insert(name.into(), Box::new(value));
    }

    pub fn remove_attribute(&mut self, name: &str) -> bool {
        self.attributes.remove(name).is_some()
    }

    /// The request body. Consumable exactly once.
    pub fn body_mut(&mut self) -> &mut Body {
        &mut self.body
    }

    /// Current session, if present and still valid
    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref().filter(|s| s.is_valid())
    }

    /// Get the session, creating one when `create` is set.
    ///
    /// An invalidated session counts as absent. Creation fires the
    /// session-created notification when listeners are registered.
    pub fn get_session(&mut self, create: bool) -> Option<Session> {
        if let Some(session) = &self.session {
            if session.is_valid() {
                session.touch();
                return Some(session.clone());
            }
            self.session = None;
        }
        if !create {
            return None;
        }
        let session = Session::create(self.session_hooks.clone());
        self.session = Some(session.clone());
        Some(session)
    }

    /// Bind the context's session listeners before dispatch.
    pub(crate) fn bind_session_hooks(&mut self, hooks: Arc<SessionHooks>) {
        self.session_hooks = hooks;
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("method", &self.method)
            .field("uri", &self.uri)
            .field("context_path", &self.context_path)
            .field("server_name", &self.server_name)
            .field("server_port", &self.server_port)
            .field("secure", &self.secure)
            .finish()
    }
}

/// Builder for constructing canonical requests
pub struct RequestBuilder {
    request: Request,
}

impl RequestBuilder {
    /// Create a new builder
    pub fn new(method: Method, uri: impl Into<String>) -> Self {
        let uri = uri.into();
        Self {
            request: Request {
                method,
                url: uri.clone(),
                uri,
                query_string: None,
                protocol: "HTTP/1.1".to_string(),
                content_type: None,
                content_length: -1,
                context_path: String::new(),
                server_name: "localhost".to_string(),
                server_port: -1,
                secure: false,
                remote_addr: None,
                remote_host: None,
                headers: SmallVec::new(),
                parameters: ParamMap::new(),
                cookies: Vec::new(),
                attributes: HashMap::new(),
                body: Body::empty(),
                session: None,
                session_hooks: Arc::new(SessionHooks::default()),
            },
        }
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.request.url = url.into();
        self
    }

    pub fn query_string(mut self, query: impl Into<String>) -> Self {
        self.request.query_string = Some(query.into());
        self
    }

    pub fn protocol(mut self, protocol: impl Into<String>) -> Self {
        self.request.protocol = protocol.into();
        self
    }

    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.request.content_type = Some(content_type.into());
        self
    }

    pub fn content_length(mut self, length: i64) -> Self {
        self.request.content_length = length;
        self
    }

    pub fn context_path(mut self, path: impl Into<String>) -> Self {
        self.request.context_path = path.into();
        self
    }

    pub fn server_name(mut self, name: impl Into<String>) -> Self {
        self.request.server_name = name.into();
        self
    }

    pub fn server_port(mut self, port: i32) -> Self {
        self.request.server_port = port;
        self
    }

    pub fn secure(mut self, secure: bool) -> Self {
        self.request.secure = secure;
        self
    }

    pub fn remote_addr(mut self, addr: impl Into<String>) -> Self {
        self.request.remote_addr = Some(addr.into());
        self
    }

    pub fn remote_host(mut self, host: impl Into<String>) -> Self {
        self.request.remote_host = Some(host.into());
        self
    }

    /// Add a header; the name is stored lower-case
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.request
            .headers
            .push((name.into().to_lowercase(), value.into()));
        self
    }

    /// Append a parameter value
    pub fn parameter(mut self, name: impl Into<String>, value: Option<String>) -> Self {
        self.request
            .parameters
            .entry(name.into())
            .or_default()
            .push(value);
        self
    }

    /// Replace the whole parameter map
    pub fn parameters(mut self, parameters: ParamMap) -> Self {
        self.request.parameters = parameters;
        self
    }

    pub fn cookie(mut self, cookie: Cookie) -> Self {
        self.request.cookies.push(cookie);
        self
    }

    pub fn cookies(mut self, cookies: Vec<Cookie>) -> Self {
        self.request.cookies = cookies;
        self
    }

    pub fn body(mut self, body: Body) -> Self {
        self.request.body = body;
        self
    }

    /// Snapshot the builder into the immutable request
    pub fn build(self) -> Request {
        self.request
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_method_parse() {
        assert_eq!(Method::from_str("GET").unwrap(), Method::Get);
        assert_eq!(Method::from_str("post").unwrap(), Method::Post);
        assert!(Method::from_str("INVALID").is_err());
    }

    #[test]
    fn test_header_names_lowercased() {
        let req = RequestBuilder::new(Method::Get, "/")
            .header("Content-Type", "application/json")
            .header("X-Token", "a")
            .header("X-TOKEN", "b")
            .build();

        assert_eq!(req.header("content-type"), Some("application/json"));
        assert_eq!(req.header("CONTENT-TYPE"), Some("application/json"));
        assert_eq!(req.header_values("x-token"), vec!["a", "b"]);
        assert_eq!(req.header_names(), vec!["content-type", "x-token"]);
    }

    #[test]
    fn test_request_uri_includes_context_path() {
        let req = RequestBuilder::new(Method::Get, "/testUri")
            .context_path("/myPrefix")
            .build();
        assert_eq!(req.uri(), "/testUri");
        assert_eq!(req.request_uri(), "/myPrefix/testUri");
    }

    #[test]
    fn test_body_consumable_exactly_once() {
        let mut req = RequestBuilder::new(Method::Post, "/")
            .body(Body::from_text("hello"))
            .build();

        assert_eq!(req.body_mut().text().unwrap(), "hello");
        assert!(matches!(req.body_mut().text(), Err(Error::State(_))));
        assert!(matches!(req.body_mut().bytes(), Err(Error::State(_))));
    }

    #[test]
    fn test_body_transcodes_text_to_bytes() {
        let mut body = Body::from_text("héllo");
        assert_eq!(body.bytes().unwrap(), Bytes::from("héllo".as_bytes()));

        let mut body = Body::from_text("héllo").with_charset(Charset::Latin1);
        assert_eq!(body.bytes().unwrap(), Bytes::from_static(b"h\xe9llo"));
    }

    #[test]
    fn test_body_lazy_supplier_runs_once() {
        let mut body = Body::lazy_bytes(|| Ok(Bytes::from_static(b"lazy")));
        assert!(!body.is_consumed());
        assert_eq!(body.bytes().unwrap(), Bytes::from_static(b"lazy"));
        assert!(body.is_consumed());
    }

    #[test]
    fn test_drained_body_is_unreadable() {
        let mut req = RequestBuilder::new(Method::Post, "/")
            .body(Body::consumed())
            .build();
        assert!(matches!(req.body_mut().bytes(), Err(Error::State(_))));
    }

    #[test]
    fn test_attributes_are_typed() {
        let mut req = RequestBuilder::new(Method::Get, "/").build();
        req.set_attribute("user", "alice".to_string());

        assert_eq!(req.attribute::<String>("user").unwrap(), "alice");
        assert!(req.attribute::<i64>("user").is_none());
        assert!(req.remove_attribute("user"));
        assert!(req.attribute::<String>("user").is_none());
    }

    #[test]
    fn test_parameter_first_non_null() {
        let req = RequestBuilder::new(Method::Get, "/")
            .parameter("flag", None)
            .parameter("flag", Some("on".to_string()))
            .build();
        assert_eq!(req.parameter("flag"), Some("on"));
        assert_eq!(req.parameter_values("flag").unwrap().len(), 2);
    }

    #[test]
    fn test_session_lazy_create_and_reuse() {
        let mut req = RequestBuilder::new(Method::Get, "/").build();
        assert!(req.get_session(false).is_none());

        let session = req.get_session(true).unwrap();
        assert!(session.is_new());

        let again = req.get_session(false).unwrap();
        assert_eq!(session.id(), again.id());
    }

    #[test]
    fn test_invalidated_session_counts_as_absent() {
        let mut req = RequestBuilder::new(Method::Get, "/").build();
        let session = req.get_session(true).unwrap();
        session.invalidate();

        assert!(req.get_session(false).is_none());
        let fresh = req.get_session(true).unwrap();
        assert_ne!(fresh.id(), session.id());
    }
}
