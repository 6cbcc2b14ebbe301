//! Platform adapter contract
//!
//! An adapter translates one platform's native invocation event into the
//! canonical request, runs the dispatch, and encodes the canonical
//! response back into the platform's reply shape. `invoke` is the
//! process-boundary entry point: nothing escapes it, every failure
//! (including a panicking handler) becomes the platform's 500 reply.

use crate::base64;
use bytes::Bytes;
use squall_core::cookie::{parse_cookie_header, render, Cookie};
use squall_core::form::{parse_query_string, write_query_string};
use squall_core::{Charset, Context, Error, ParamMap, Request, Response, Result};
use squall_core::{Body, ResponseBody};
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::{error, warn};

/// Platform-specific translator between a native invocation event and the
/// canonical request/response.
pub trait Adapter {
    type Event;
    type Reply;

    /// Build the canonical request from the platform event
    fn create(&self, ctx: &Context, event: &Self::Event) -> Result<Request>;

    /// Encode the canonical response into the platform reply shape
    fn encode(&self, response: Response) -> Result<Self::Reply>;

    /// The platform's standard internal-error (500) reply
    fn internal_error(&self) -> Self::Reply;

    /// Run one invocation end to end. Never fails past this boundary:
    /// translation errors, dispatch errors, and panics all collapse into
    /// the platform 500 reply.
    fn invoke(&self, ctx: &Context, event: &Self::Event) -> Self::Reply {
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            let mut req = self.create(ctx, event)?;
            let mut res = Response::new();
            ctx.dispatch(&mut req, &mut res)?;
            self.encode(res)
        }));

        match outcome {
            Ok(Ok(reply)) => reply,
            Ok(Err(Error::Dispatch(e))) => {
                warn!(error = %e, "application handler failed");
                self.internal_error()
            }
            Ok(Err(e)) => {
                error!(error = %e, "invocation failed");
                self.internal_error()
            }
            Err(_) => {
                error!("invocation panicked");
                self.internal_error()
            }
        }
    }
}

/// The body as a platform event carries it
#[derive(Debug)]
pub enum EventPayload {
    None,
    Text(String),
    Base64(String),
    Json(serde_json::Value),
}

impl EventPayload {
    /// Classify an optional string body with the platform's base64 flag
    pub fn from_flagged(body: Option<&str>, is_base64: bool) -> Self {
        match body {
            None => EventPayload::None,
            Some(s) if is_base64 => EventPayload::Base64(s.to_string()),
            Some(s) => EventPayload::Text(s.to_string()),
        }
    }

    /// Classify a JSON body value: strings stay text, structured values
    /// are serialized on demand.
    pub fn from_json(value: Option<&serde_json::Value>) -> Self {
        match value {
            None | Some(serde_json::Value::Null) => EventPayload::None,
            Some(serde_json::Value::String(s)) => EventPayload::Text(s.clone()),
            Some(other) => EventPayload::Json(other.clone()),
        }
    }

    fn into_bytes(self, charset: Charset) -> Result<Vec<u8>> {
        match self {
            EventPayload::None => Ok(Vec::new()),
            EventPayload::Text(s) => Ok(charset.encode(&s)),
            EventPayload::Base64(s) => base64::decode(&s),
            EventPayload::Json(v) => {
                serde_json::to_string(&v).map(|s| s.into_bytes()).map_err(json_error)
            }
        }
    }
}

fn json_error(e: serde_json::Error) -> Error {
    Error::Parse(format!("body serialization failed: {e}"))
}

fn is_form_urlencoded(content_type: Option<&str>) -> bool {
    content_type
        .map(|ct| mime_part(ct) == "application/x-www-form-urlencoded")
        .unwrap_or(false)
}

fn mime_part(content_type: &str) -> &str {
    content_type
        .split(';')
        .next()
        .unwrap_or(content_type)
        .trim()
}

/// Wire the event payload into the request. Form-encoded payloads are
/// drained into the parameter map immediately and the body is left
/// consumed; anything else becomes exactly one lazy supplier.
pub fn build_body(
    payload: EventPayload,
    content_type: Option<&str>,
    params: &mut ParamMap,
) -> Result<Body> {
    let charset = Charset::from_content_type(content_type)?;

    if is_form_urlencoded(content_type) {
        let bytes = payload.into_bytes(charset)?;
        squall_core::form::decode_form_body(&bytes, charset, params)?;
        return Ok(Body::consumed());
    }

    let body = match payload {
        EventPayload::None => Body::empty(),
        EventPayload::Text(s) => Body::from_text(s),
        EventPayload::Base64(s) => {
            Body::lazy_bytes(move || base64::decode(&s).map(Bytes::from))
        }
        EventPayload::Json(v) => {
            Body::lazy_text(move || serde_json::to_string(&v).map_err(json_error))
        }
    };
    Ok(body.with_charset(charset))
}

/// Resolve the query string and parameter map: a raw query string wins
/// over a multi-value map; with neither, parameters start empty.
pub fn resolve_query(
    raw: Option<&str>,
    multi: Option<&HashMap<String, Vec<String>>>,
) -> Result<(Option<String>, ParamMap)> {
    if let Some(raw) = raw.filter(|q| !q.is_empty()) {
        return Ok((Some(raw.to_string()), parse_query_string(raw)?));
    }
    if let Some(multi) = multi.filter(|m| !m.is_empty()) {
        let mut params = ParamMap::new();
        for (name, values) in multi {
            params
                .entry(name.clone())
                .or_default()
                .extend(values.iter().cloned().map(Some));
        }
        let rebuilt = write_query_string(&params);
        return Ok((Some(rebuilt), params));
    }
    Ok((None, ParamMap::new()))
}

/// Lower-case a single-valued header map into the list form the URL
/// derivation and request builder expect.
pub fn lower_headers(map: &HashMap<String, String>) -> Vec<(String, String)> {
    map.iter()
        .map(|(k, v)| (k.to_ascii_lowercase(), v.clone()))
        .collect()
}

/// Lower-case a multi-valued header map, preserving per-name value order.
pub fn lower_multi_headers(map: &HashMap<String, Vec<String>>) -> Vec<(String, String)> {
    let mut out = Vec::new();
    for (k, values) in map {
        let name = k.to_ascii_lowercase();
        for v in values {
            out.push((name.clone(), v.clone()));
        }
    }
    out
}

/// Declared content length from a lower-cased header list; -1 when the
/// header is absent. A non-numeric value is a malformed-input error and
/// fails the request, like a bad port.
pub fn content_length_from_headers(headers: &[(String, String)]) -> Result<i64> {
    match headers.iter().find(|(k, _)| k == "content-length") {
        Some((_, v)) => v
            .trim()
            .parse::<i64>()
            .map_err(|_| Error::Parse(format!("invalid content-length value: {v}"))),
        None => Ok(-1),
    }
}

/// Parse request cookies out of a lower-cased header list
pub fn cookies_from_headers(headers: &[(String, String)]) -> Vec<Cookie> {
    headers
        .iter()
        .filter(|(k, _)| k == "cookie")
        .flat_map(|(_, v)| parse_cookie_header(v))
        .collect()
}

/// A canonical response flattened for platform reply packing:
/// Content-Type and Set-Cookie hoisted out of the header list, body
/// rendered as text or base64 per the content type.
pub struct ReplyParts {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub content_type: Option<String>,
    pub cookies: Vec<String>,
    pub body: Option<String>,
    pub is_base64: bool,
}

/// Exact matches for the two structured text types, or any `text/*`
fn is_text_media_type(content_type: &str) -> bool {
    let mime = mime_part(content_type);
    mime == "application/json" || mime == "application/xml" || mime.starts_with("text/")
}

/// Flatten a finished response for the platform reply encoders.
pub fn encode_response(response: Response) -> Result<ReplyParts> {
    let parts = response.into_parts();

    let mut content_type = parts.content_type;
    let mut cookies: Vec<String> = Vec::new();
    let mut headers: Vec<(String, String)> = Vec::new();
    for (name, value) in parts.headers {
        if name.eq_ignore_ascii_case("content-type") {
            if content_type.is_none() {
                content_type = Some(value);
            }
        } else if name.eq_ignore_ascii_case("set-cookie") {
            cookies.push(value);
        } else {
            headers.push((name, value));
        }
    }
    cookies.extend(parts.cookies.iter().map(render));

    if let (Some(ct), Some(encoding)) = (&mut content_type, &parts.character_encoding) {
        if !ct.contains("charset=") {
            ct.push_str("; charset=");
            ct.push_str(encoding);
        }
    }

    let text_body = content_type.as_deref().map(is_text_media_type).unwrap_or(false);
    let charset = parts
        .character_encoding
        .as_deref()
        .map(Charset::parse)
        .transpose()?
        .unwrap_or(Charset::Utf8);

    let (body, is_base64) = match parts.body {
        None => (None, false),
        Some(ResponseBody::Text(s)) if text_body => (Some(s), false),
        Some(ResponseBody::Text(s)) => (Some(base64::encode(&charset.encode(&s))), true),
        Some(ResponseBody::Bytes(b)) if text_body => (Some(charset.decode(&b)?), false),
        Some(ResponseBody::Bytes(b)) => (Some(base64::encode(&b)), true),
    };

    Ok(ReplyParts {
        status: parts.status.as_u16(),
        headers,
        content_type,
        cookies,
        body,
        is_base64,
    })
}
