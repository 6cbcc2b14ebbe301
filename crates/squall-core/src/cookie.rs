//! Cookie codec
//!
//! RFC2109-style Set-Cookie parsing, request Cookie header splitting, and
//! Set-Cookie rendering for responses.

use crate::{Error, Result};
use chrono::{Duration, Utc};

/// HTTP Cookie
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    /// Seconds until expiry; -1 means unset (session cookie)
    pub max_age: i64,
    pub domain: Option<String>,
    pub path: Option<String>,
    pub comment: Option<String>,
    pub secure: bool,
    pub http_only: bool,
    /// RFC2109 Version; 0 means unversioned
    pub version: i64,
}

impl Cookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            max_age: -1,
            domain: None,
            path: None,
            comment: None,
            secure: false,
            http_only: false,
            version: 0,
        }
    }

    pub fn max_age(mut self, seconds: i64) -> Self {
        self.max_age = seconds;
        self
    }

    pub fn domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    pub fn secure(mut self) -> Self {
        self.secure = true;
        self
    }

    pub fn http_only(mut self) -> Self {
        self.http_only = true;
        self
    }

    pub fn version(mut self, version: i64) -> Self {
        self.version = version;
        self
    }
}

/// Parse one Set-Cookie value.
///
/// The first `name=value` segment whose name does not begin with `$` seeds
/// the cookie; later `; attr[=value]` segments update it. Unrecognized
/// attributes are ignored. A bare attribute (no `=`) is boolean-true.
pub fn parse_set_cookie(text: &str) -> Result<Cookie> {
    let mut cookie: Option<Cookie> = None;

    for segment in text.split(';') {
        let segment = segment.trim();
        if segment.is_empty() {
            continue;
        }

        let (name, value) = match segment.split_once('=') {
            Some((n, v)) => (n.trim(), Some(v.trim())),
            None => (segment, None),
        };

        let Some(cookie) = cookie.as_mut() else {
            if name.starts_with('$') {
                continue;
            }
            let value = value
                .ok_or_else(|| Error::Parse(format!("set-cookie segment without value: {segment}")))?;
            cookie = Some(Cookie::new(name, value));
            continue;
        };

        // Each attribute is an independent branch. The flag attributes in
        // particular must not bleed into one another.
        if name.eq_ignore_ascii_case("max-age") {
            let v = value.unwrap_or_default();
            cookie.max_age = v
                .parse()
                .map_err(|_| Error::Parse(format!("bad Max-Age value: {v}")))?;
        } else if name.eq_ignore_ascii_case("domain") {
            cookie.domain = value.map(str::to_string);
        } else if name.eq_ignore_ascii_case("comment") {
            cookie.comment = value.map(str::to_string);
        } else if name.eq_ignore_ascii_case("path") {
            cookie.path = value.map(str::to_string);
        } else if name.eq_ignore_ascii_case("secure") {
            cookie.secure = value.map_or(true, |v| v.eq_ignore_ascii_case("true"));
        } else if name.eq_ignore_ascii_case("httponly") {
            cookie.http_only = value.map_or(true, |v| v.eq_ignore_ascii_case("true"));
        } else if name.eq_ignore_ascii_case("version") {
            let v = value.unwrap_or_default();
            cookie.version = v
                .parse()
                .map_err(|_| Error::Parse(format!("bad Version value: {v}")))?;
        }
    }

    cookie.ok_or_else(|| Error::Parse(format!("no cookie in set-cookie value: {text}")))
}

/// Split a request Cookie header into its cookies.
///
/// `name=value` pairs separated by `;`, no attribute parsing. RFC2109
/// `$`-prefixed bookkeeping tokens are skipped.
pub fn parse_cookie_header(text: &str) -> Vec<Cookie> {
    let mut cookies = Vec::new();
    for pair in text.split(';') {
        let pair = pair.trim();
        if let Some((name, value)) = pair.split_once('=') {
            let name = name.trim();
            if name.is_empty() || name.starts_with('$') {
                continue;
            }
            cookies.push(Cookie::new(name, value.trim()));
        }
    }
    cookies
}

/// Render a cookie as a Set-Cookie value.
///
/// `Max-Age` is always emitted; `Expires` (RFC-1123, now + Max-Age) only
/// when Max-Age is positive; the remaining attributes only when set.
pub fn render(cookie: &Cookie) -> String {
    let mut parts = vec![format!("{}={}", cookie.name, cookie.value)];

    parts.push(format!("Max-Age={}", cookie.max_age));
    if cookie.max_age > 0 {
        let expires = Utc::now() + Duration::seconds(cookie.max_age);
        parts.push(format!(
            "Expires={}",
            expires.format("%a, %d %b %Y %H:%M:%S GMT")
        ));
    }
    if cookie.secure {
        parts.push("Secure".to_string());
    }
    if cookie.http_only {
        parts.push("HttpOnly".to_string());
    }
    if let Some(ref domain) = cookie.domain {
        parts.push(format!("Domain={domain}"));
    }
    if let Some(ref path) = cookie.path {
        parts.push(format!("Path={path}"));
    }
    if let Some(ref comment) = cookie.comment {
        parts.push(format!("Comment={comment}"));
    }
    if cookie.version > 0 {
        parts.push(format!("Version={}", cookie.version));
    }

    parts.join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_set_cookie() {
        let cookie =
            parse_set_cookie("sid=abc123; Max-Age=600; Path=/app; Domain=example.com; Secure")
                .unwrap();
        assert_eq!(cookie.name, "sid");
        assert_eq!(cookie.value, "abc123");
        assert_eq!(cookie.max_age, 600);
        assert_eq!(cookie.path.as_deref(), Some("/app"));
        assert_eq!(cookie.domain.as_deref(), Some("example.com"));
        assert!(cookie.secure);
        assert!(!cookie.http_only);
    }

    #[test]
    fn test_parse_skips_version_token() {
        let cookie = parse_set_cookie("$Version=1; sid=abc; Path=/").unwrap();
        assert_eq!(cookie.name, "sid");
        assert_eq!(cookie.path.as_deref(), Some("/"));
    }

    #[test]
    fn test_unknown_attribute_ignored() {
        let cookie = parse_set_cookie("a=b; SameSite=Lax; Partitioned").unwrap();
        assert_eq!(cookie.name, "a");
        assert!(!cookie.secure);
        assert!(!cookie.http_only);
    }

    // Pins the fix for the upstream fallthrough bug: a bare Secure must not
    // also turn on HttpOnly, and vice versa.
    #[test]
    fn test_secure_does_not_set_http_only() {
        let cookie = parse_set_cookie("a=b; Secure").unwrap();
        assert!(cookie.secure);
        assert!(!cookie.http_only);

        let cookie = parse_set_cookie("a=b; HttpOnly").unwrap();
        assert!(!cookie.secure);
        assert!(cookie.http_only);
    }

    #[test]
    fn test_bad_max_age_is_parse_error() {
        assert!(matches!(
            parse_set_cookie("a=b; Max-Age=soon"),
            Err(Error::Parse(_))
        ));
    }

    #[test]
    fn test_version_attribute() {
        let cookie = parse_set_cookie("sid=abc; Version=1").unwrap();
        assert_eq!(cookie.version, 1);
        assert!(render(&cookie).contains("Version=1"));

        // unversioned cookies render without the attribute
        assert!(!render(&Cookie::new("a", "b")).contains("Version="));
        assert!(matches!(
            parse_set_cookie("a=b; Version=one"),
            Err(Error::Parse(_))
        ));
    }

    #[test]
    fn test_parse_cookie_header() {
        let cookies = parse_cookie_header("$Version=1; session=abc123; theme=dark; lang=en");
        let names: Vec<&str> = cookies.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["session", "theme", "lang"]);
        assert_eq!(cookies[0].value, "abc123");
    }

    #[test]
    fn test_render_always_emits_max_age() {
        let header = render(&Cookie::new("sid", "abc"));
        assert!(header.contains("Max-Age=-1"));
        assert!(!header.contains("Expires="));
    }

    #[test]
    fn test_render_expires_only_when_positive() {
        let header = render(&Cookie::new("sid", "abc").max_age(60));
        assert!(header.contains("Max-Age=60"));
        assert!(header.contains("Expires="));
        assert!(header.contains("GMT"));
    }

    #[test]
    fn test_render_parse_round_trip() {
        let cookie = Cookie::new("sid", "abc123")
            .max_age(3600)
            .domain("example.com")
            .path("/app")
            .comment("state")
            .secure()
            .http_only()
            .version(1);

        let parsed = parse_set_cookie(&render(&cookie)).unwrap();
        assert_eq!(parsed, cookie);
    }
}
