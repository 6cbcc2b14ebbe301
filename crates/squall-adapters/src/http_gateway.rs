//! HTTP-gateway adapter (v2 event shape)
//!
//! v2 events carry a raw path and raw query string at the top level, a
//! single-valued header map, request cookies in a dedicated list, and the
//! method nested under `requestContext.http`. Replies return Set-Cookie
//! values through a dedicated `cookies` list.

use crate::adapter::{
    build_body, content_length_from_headers, encode_response, lower_headers, resolve_query,
    Adapter, EventPayload,
};
use crate::url::{derive_url, EventUrl};
use serde::{Deserialize, Serialize};
use squall_core::cookie::parse_cookie_header;
use squall_core::{Context, Request, RequestBuilder, Response, Result};
use std::collections::HashMap;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HttpGatewayEvent {
    pub version: Option<String>,
    pub route_key: Option<String>,
    pub raw_path: Option<String>,
    pub raw_query_string: Option<String>,
    pub cookies: Option<Vec<String>>,
    pub headers: Option<HashMap<String, String>>,
    pub request_context: Option<HttpGatewayRequestContext>,
    pub body: Option<String>,
    pub is_base64_encoded: bool,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HttpGatewayRequestContext {
    pub domain_name: Option<String>,
    pub stage: Option<String>,
    pub http: Option<HttpGatewayHttp>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HttpGatewayHttp {
    pub method: Option<String>,
    pub path: Option<String>,
    pub protocol: Option<String>,
    pub source_ip: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpGatewayReply {
    pub status_code: u16,
    pub headers: HashMap<String, String>,
    pub cookies: Vec<String>,
    pub body: Option<String>,
    pub is_base64_encoded: bool,
}

pub struct HttpGatewayAdapter;

impl Adapter for HttpGatewayAdapter {
    type Event = HttpGatewayEvent;
    type Reply = HttpGatewayReply;

    fn create(&self, _ctx: &Context, event: &Self::Event) -> Result<Request> {
        let headers = event.headers.as_ref().map(lower_headers).unwrap_or_default();

        let rc = event.request_context.as_ref();
        let http = rc.and_then(|c| c.http.as_ref());
        let parts = derive_url(
            &EventUrl {
                path: event.raw_path.as_deref(),
                inner_path: http.and_then(|h| h.path.as_deref()),
                domain: rc.and_then(|c| c.domain_name.as_deref()),
                ..Default::default()
            },
            &headers,
        )?;

        let (query_string, mut params) =
            resolve_query(event.raw_query_string.as_deref(), None)?;

        let content_type = headers
            .iter()
            .find(|(k, _)| k == "content-type")
            .map(|(_, v)| v.clone());
        let content_length = content_length_from_headers(&headers)?;

        let payload = EventPayload::from_flagged(event.body.as_deref(), event.is_base64_encoded);
        let body = build_body(payload, content_type.as_deref(), &mut params)?;

        let cookies = event
            .cookies
            .as_deref()
            .unwrap_or_default()
            .iter()
            .flat_map(|pair| parse_cookie_header(pair))
            .collect();

        let method = http.and_then(|h| h.method.as_deref()).unwrap_or("GET");
        let mut builder = RequestBuilder::new(method.parse()?, parts.uri)
            .url(parts.url)
            .protocol(http.and_then(|h| h.protocol.as_deref()).unwrap_or("HTTP/1.1"))
            .content_length(content_length)
            .context_path(parts.context_path)
            .server_name(parts.server_name)
            .server_port(parts.server_port)
            .secure(parts.secure)
            .cookies(cookies)
            .parameters(params)
            .body(body);
        if let Some(query) = query_string {
            builder = builder.query_string(query);
        }
        if let Some(ct) = content_type {
            builder = builder.content_type(ct);
        }
        if let Some(ip) = http.and_then(|h| h.source_ip.as_deref()) {
            builder = builder.remote_addr(ip).remote_host(ip);
        }
        for (name, value) in headers {
            builder = builder.header(name, value);
        }
        Ok(builder.build())
    }

    fn encode(&self, response: Response) -> Result<Self::Reply> {
        let parts = encode_response(response)?;

        let mut headers = HashMap::new();
        if let Some(ct) = &parts.content_type {
            headers.insert("Content-Type".to_string(), ct.clone());
        }
        for (name, value) in parts.headers {
            // single-valued map: repeated names are comma-joined
            headers
                .entry(name)
                .and_modify(|existing: &mut String| {
                    existing.push(',');
                    existing.push_str(&value);
                })
                .or_insert(value);
        }

        Ok(HttpGatewayReply {
            status_code: parts.status,
            headers,
            cookies: parts.cookies,
            body: parts.body,
            is_base64_encoded: parts.is_base64,
        })
    }

    fn internal_error(&self) -> Self::Reply {
        HttpGatewayReply {
            status_code: 500,
            headers: HashMap::new(),
            cookies: Vec::new(),
            body: None,
            is_base64_encoded: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use squall_core::{Cookie, Handler, HandlerRegistration, Method};
    use std::sync::Arc;

    struct Probe;
    impl Handler for Probe {
        fn handle(&self, req: &mut Request, res: &mut Response) -> Result<()> {
            res.set_content_type("text/plain");
            res.write_text(req.url())?;
            Ok(())
        }
    }

    fn context() -> Context {
        let mut ctx = Context::new();
        ctx.add_handler(HandlerRegistration::new("probe", Arc::new(Probe)).mapping("/"))
            .unwrap();
        ctx.startup().unwrap();
        ctx
    }

    fn event(value: serde_json::Value) -> HttpGatewayEvent {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_method_and_path_from_request_context() {
        let ctx = context();
        let event = event(json!({
            "version": "2.0",
            "rawPath": "/raw",
            "headers": {"host": "127.0.0.1:8080"},
            "requestContext": {
                "http": {"method": "POST", "path": "/inner", "protocol": "HTTP/1.1", "sourceIp": "10.0.0.9"}
            }
        }));

        let req = HttpGatewayAdapter.create(&ctx, &event).unwrap();
        assert_eq!(req.method(), Method::Post);
        assert_eq!(req.uri(), "/inner");
        assert_eq!(req.remote_addr(), Some("10.0.0.9"));
        assert_eq!(req.url(), "http://127.0.0.1:8080/inner");
    }

    #[test]
    fn test_raw_query_string_parsed() {
        let ctx = context();
        let event = event(json!({
            "rawPath": "/search",
            "rawQueryString": "q=rust&lang=en&lang=de",
            "headers": {"host": "localhost"},
            "requestContext": {"http": {"method": "GET"}}
        }));

        let req = HttpGatewayAdapter.create(&ctx, &event).unwrap();
        assert_eq!(req.query_string(), Some("q=rust&lang=en&lang=de"));
        assert_eq!(req.parameter("q"), Some("rust"));
        assert_eq!(
            req.parameter_values("lang").unwrap(),
            &[Some("en".to_string()), Some("de".to_string())]
        );
    }

    #[test]
    fn test_cookie_list_parsed() {
        let ctx = context();
        let event = event(json!({
            "rawPath": "/x",
            "cookies": ["sid=abc", "theme=dark"],
            "headers": {"host": "localhost"},
            "requestContext": {"http": {"method": "GET"}}
        }));

        let req = HttpGatewayAdapter.create(&ctx, &event).unwrap();
        let names: Vec<&str> = req.cookies().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["sid", "theme"]);
    }

    #[test]
    fn test_base64_body_decoded_on_consumption() {
        let ctx = context();
        let event = event(json!({
            "rawPath": "/upload",
            "headers": {"host": "localhost", "content-type": "application/octet-stream"},
            "requestContext": {"http": {"method": "PUT"}},
            "body": crate::base64::encode(b"raw bytes"),
            "isBase64Encoded": true
        }));

        let mut req = HttpGatewayAdapter.create(&ctx, &event).unwrap();
        assert_eq!(req.body_mut().bytes().unwrap().as_ref(), b"raw bytes");
    }

    #[test]
    fn test_bad_content_length_fails_request() {
        let ctx = context();
        let event = event(json!({
            "rawPath": "/x",
            "headers": {"host": "localhost", "content-length": "not-a-number"},
            "requestContext": {"http": {"method": "POST"}},
            "body": "payload"
        }));

        let err = HttpGatewayAdapter.create(&ctx, &event).unwrap_err();
        assert!(matches!(err, squall_core::Error::Parse(_)));
    }

    #[test]
    fn test_reply_schema_field_names() {
        let mut res = Response::new();
        res.set_content_type("application/json");
        res.add_cookie(Cookie::new("sid", "abc").http_only());
        res.write_text("{}").unwrap();

        let reply = HttpGatewayAdapter.encode(res).unwrap();
        let json = serde_json::to_value(&reply).unwrap();

        assert_eq!(json["statusCode"], 200);
        assert_eq!(json["headers"]["Content-Type"], "application/json");
        assert!(json["cookies"][0].as_str().unwrap().starts_with("sid=abc"));
        assert_eq!(json["body"], "{}");
        assert_eq!(json["isBase64Encoded"], false);
    }

    #[test]
    fn test_repeated_reply_headers_comma_joined() {
        let mut res = Response::new();
        res.add_header("Vary", "Accept");
        res.add_header("Vary", "Origin");

        let reply = HttpGatewayAdapter.encode(res).unwrap();
        assert_eq!(reply.headers["Vary"], "Accept,Origin");
    }

    #[test]
    fn test_invoke_round_trip() {
        let ctx = context();
        let event = event(json!({
            "rawPath": "/here",
            "headers": {
                "host": "gateway.internal",
                "x-forwarded-host": "barefoot.example",
                "x-forwarded-port": "8443",
                "x-forwarded-proto": "https",
                "x-forwarded-prefix": "/myPrefix"
            },
            "requestContext": {"http": {"method": "GET"}}
        }));

        let reply = HttpGatewayAdapter.invoke(&ctx, &event);
        assert_eq!(reply.status_code, 200);
        assert_eq!(
            reply.body.as_deref(),
            Some("https://barefoot.example:8443/myPrefix/here")
        );
    }
}
