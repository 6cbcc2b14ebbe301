//! Shared URL derivation
//!
//! Every platform event encodes the externally visible URL differently;
//! this module reconciles them into one set of parts. Precedence rules:
//!
//! - path: nested inner path, then raw top-level path, then the decoded
//!   resource template
//! - context path: forwarded-prefix header verbatim, else inferred from an
//!   inner full path that extends the path with a prefix, else empty
//! - host/port: forwarded headers, then the `Host` header, then the
//!   event's own domain field
//! - scheme: forwarded-proto header, else plain http only for loopback
//!   hosts

use squall_core::{Error, Result};

/// URL-bearing fields extracted from a platform event
#[derive(Debug, Default)]
pub struct EventUrl<'a> {
    /// Top-level raw path
    pub path: Option<&'a str>,
    /// Path nested inside a gateway sub-object, preferred when present
    pub inner_path: Option<&'a str>,
    /// Full path including any gateway prefix (stage, mount point)
    pub inner_full_path: Option<&'a str>,
    /// Decoded resource template, the last resort
    pub resource: Option<&'a str>,
    /// The event's own server/domain field
    pub domain: Option<&'a str>,
}

/// The reconciled URL, ready for the request builder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlParts {
    /// Context-stripped path
    pub uri: String,
    pub context_path: String,
    pub server_name: String,
    /// -1 when no port could be determined
    pub server_port: i32,
    pub secure: bool,
    /// Fully qualified URL (scheme, authority, context path, path)
    pub url: String,
}

/// First value of a header in a lower-cased header list
fn header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.as_str())
        .filter(|v| !v.is_empty())
}

fn is_loopback(host: &str) -> bool {
    host == "localhost" || host == "127.0.0.1"
}

fn parse_port(value: &str) -> Result<i32> {
    value
        .parse::<i32>()
        .map_err(|_| Error::Parse(format!("invalid port value: {value}")))
}

/// Split `host[:port]`
fn split_authority(authority: &str) -> Result<(String, Option<i32>)> {
    match authority.split_once(':') {
        Some((host, port)) => Ok((host.to_string(), Some(parse_port(port)?))),
        None => Ok((authority.to_string(), None)),
    }
}

/// Derive the URL parts from an event's fields and its lower-cased
/// header list.
pub fn derive_url(event: &EventUrl<'_>, headers: &[(String, String)]) -> Result<UrlParts> {
    let path = event
        .inner_path
        .or(event.path)
        .or(event.resource)
        .unwrap_or("/")
        .to_string();

    let context_path = match header(headers, "x-forwarded-prefix") {
        Some(prefix) if prefix != "/" => prefix.to_string(),
        _ => infer_context_path(event.inner_full_path, &path),
    };

    let (mut server_name, mut server_port) = (String::new(), None);
    if let Some(forwarded_host) = header(headers, "x-forwarded-host") {
        let (host, port) = split_authority(forwarded_host)?;
        server_name = host;
        server_port = port;
    } else if let Some(host_header) = header(headers, "host") {
        let (host, port) = split_authority(host_header)?;
        server_name = host;
        server_port = port;
    } else if let Some(domain) = event.domain {
        server_name = domain.to_string();
    }
    if let Some(forwarded_port) = header(headers, "x-forwarded-port") {
        server_port = Some(parse_port(forwarded_port)?);
    }
    let server_port = server_port.unwrap_or(-1);

    let scheme = match header(headers, "x-forwarded-proto") {
        Some(proto) => proto.to_string(),
        None if is_loopback(&server_name) => "http".to_string(),
        None => "https".to_string(),
    };
    let secure = scheme == "https";

    let url = render_url(&scheme, &server_name, server_port, &context_path, &path);

    Ok(UrlParts {
        uri: path,
        context_path,
        server_name,
        server_port,
        secure,
        url,
    })
}

// The full path extends the path with a gateway prefix; the non-matching
// prefix is the context path.
fn infer_context_path(inner_full_path: Option<&str>, path: &str) -> String {
    match inner_full_path {
        Some(full) if full.len() > path.len() && full.ends_with(path) => {
            full[..full.len() - path.len()].to_string()
        }
        _ => String::new(),
    }
}

fn default_port(scheme: &str) -> i32 {
    match scheme {
        "http" => 80,
        "https" => 443,
        _ => -1,
    }
}

fn render_url(scheme: &str, host: &str, port: i32, context_path: &str, path: &str) -> String {
    let mut url = format!("{scheme}://{host}");
    if port != -1 && port != default_port(scheme) {
        url.push_str(&format!(":{port}"));
    }
    url.push_str(context_path);
    url.push_str(path);
    url
}

/// Split an absolute URL (as some triggers deliver) into scheme,
/// authority, path and query.
pub fn parse_absolute_url(url: &str) -> Result<AbsoluteUrl> {
    let (scheme, rest) = url
        .split_once("://")
        .ok_or_else(|| Error::Parse(format!("not an absolute url: {url}")))?;

    let (authority, path_and_query) = match rest.find('/') {
        Some(i) => (&rest[..i], &rest[i..]),
        None => (rest, "/"),
    };
    if authority.is_empty() {
        return Err(Error::Parse(format!("missing authority in url: {url}")));
    }

    let (host, port) = split_authority(authority)?;
    let (path, query) = match path_and_query.split_once('?') {
        Some((p, q)) => (p.to_string(), Some(q.to_string())),
        None => (path_and_query.to_string(), None),
    };

    Ok(AbsoluteUrl {
        scheme: scheme.to_string(),
        host,
        port: port.unwrap_or(-1),
        path,
        query,
    })
}

/// An absolute URL, decomposed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbsoluteUrl {
    pub scheme: String,
    pub host: String,
    pub port: i32,
    pub path: String,
    pub query: Option<String>,
}
