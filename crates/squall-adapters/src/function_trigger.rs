//! Function-trigger adapter
//!
//! Trigger payloads wrap the HTTP request under `Data.req` with
//! PascalCase field names, an absolute URL instead of a bare path, a
//! multi-valued header map, and a body that may be a plain string or a
//! structured JSON value. Replies nest the HTTP response under
//! `Outputs.res`.

use crate::adapter::{
    build_body, content_length_from_headers, cookies_from_headers, encode_response,
    lower_multi_headers, resolve_query, Adapter, EventPayload,
};
use crate::url::{derive_url, parse_absolute_url, AbsoluteUrl, EventUrl};
use serde::{Deserialize, Serialize};
use squall_core::{Context, Request, RequestBuilder, Response, Result};
use std::collections::HashMap;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct FunctionTriggerEvent {
    #[serde(rename = "Data", default)]
    pub data: FunctionTriggerData,
    #[serde(rename = "Metadata", default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct FunctionTriggerData {
    #[serde(default)]
    pub req: FunctionTriggerRequest,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct FunctionTriggerRequest {
    #[serde(rename = "Url")]
    pub url: Option<String>,
    #[serde(rename = "Method")]
    pub method: Option<String>,
    #[serde(rename = "Query", default)]
    pub query: HashMap<String, String>,
    #[serde(rename = "Headers", default)]
    pub headers: HashMap<String, Vec<String>>,
    #[serde(rename = "Body")]
    pub body: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FunctionTriggerReply {
    #[serde(rename = "Outputs")]
    pub outputs: FunctionTriggerOutputs,
    #[serde(rename = "Logs")]
    pub logs: Vec<String>,
    #[serde(rename = "ReturnValue")]
    pub return_value: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FunctionTriggerOutputs {
    pub res: FunctionTriggerResponse,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionTriggerResponse {
    pub status_code: u16,
    pub headers: HashMap<String, String>,
    pub cookies: Vec<String>,
    pub body: Option<String>,
    pub is_base64_encoded: bool,
}

pub struct FunctionTriggerAdapter;

impl Adapter for FunctionTriggerAdapter {
    type Event = FunctionTriggerEvent;
    type Reply = FunctionTriggerReply;

    fn create(&self, _ctx: &Context, event: &Self::Event) -> Result<Request> {
        let req = &event.data.req;
        let mut headers = lower_multi_headers(&req.headers);

        // The absolute URL's own authority and scheme are the lowest
        // precedence defaults; forwarding headers still win inside
        // derive_url.
        let absolute = match req.url.as_deref() {
            Some(url) => parse_absolute_url(url)?,
            None => AbsoluteUrl {
                scheme: String::new(),
                host: String::new(),
                port: -1,
                path: "/".to_string(),
                query: None,
            },
        };
        if !headers.iter().any(|(k, _)| k == "host") && !absolute.host.is_empty() {
            let authority = if absolute.port == -1 {
                absolute.host.clone()
            } else {
                format!("{}:{}", absolute.host, absolute.port)
            };
            headers.push(("host".to_string(), authority));
        }
        if !headers.iter().any(|(k, _)| k == "x-forwarded-proto") && !absolute.scheme.is_empty() {
            headers.push(("x-forwarded-proto".to_string(), absolute.scheme.clone()));
        }

        let parts = derive_url(
            &EventUrl {
                path: Some(&absolute.path),
                ..Default::default()
            },
            &headers,
        )?;

        let single_as_multi: HashMap<String, Vec<String>> = req
            .query
            .iter()
            .map(|(k, v)| (k.clone(), vec![v.clone()]))
            .collect();
        let (query_string, mut params) =
            resolve_query(absolute.query.as_deref(), Some(&single_as_multi))?;

        let content_type = headers
            .iter()
            .find(|(k, _)| k == "content-type")
            .map(|(_, v)| v.clone());
        let content_length = content_length_from_headers(&headers)?;

        let payload = EventPayload::from_json(req.body.as_ref());
        let body = build_body(payload, content_type.as_deref(), &mut params)?;

        let method = req.method.as_deref().unwrap_or("GET");
        let mut builder = RequestBuilder::new(method.parse()?, parts.uri)
            .url(parts.url)
            .protocol("HTTP/1.1")
            .content_length(content_length)
            .context_path(parts.context_path)
            .server_name(parts.server_name)
            .server_port(parts.server_port)
            .secure(parts.secure)
            .cookies(cookies_from_headers(&headers))
            .parameters(params)
            .body(body);
        if let Some(query) = query_string {
            builder = builder.query_string(query);
        }
        if let Some(ct) = content_type {
            builder = builder.content_type(ct);
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
            headers.entry(name).or_insert(value);
        }

        Ok(FunctionTriggerReply {
            outputs: FunctionTriggerOutputs {
                res: FunctionTriggerResponse {
                    status_code: parts.status,
                    headers,
                    cookies: parts.cookies,
                    body: parts.body,
                    is_base64_encoded: parts.is_base64,
                },
            },
            logs: Vec::new(),
            return_value: None,
        })
    }

    fn internal_error(&self) -> Self::Reply {
        FunctionTriggerReply {
            outputs: FunctionTriggerOutputs {
                res: FunctionTriggerResponse {
                    status_code: 500,
                    headers: HashMap::new(),
                    cookies: Vec::new(),
                    body: None,
                    is_base64_encoded: false,
                },
            },
            logs: Vec::new(),
            return_value: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use squall_core::{Handler, HandlerRegistration, Method};
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

    fn event(value: serde_json::Value) -> FunctionTriggerEvent {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_absolute_url_decomposed() {
        let ctx = context();
        let event = event(json!({
            "Data": {"req": {
                "Url": "http://fn.example.com:7071/api/hello?a=1",
                "Method": "GET",
                "Headers": {}
            }}
        }));

        let req = FunctionTriggerAdapter.create(&ctx, &event).unwrap();
        assert_eq!(req.method(), Method::Get);
        assert_eq!(req.uri(), "/api/hello");
        assert_eq!(req.server_name(), "fn.example.com");
        assert_eq!(req.server_port(), 7071);
        assert!(!req.is_secure());
        assert_eq!(req.query_string(), Some("a=1"));
        assert_eq!(req.parameter("a"), Some("1"));
        assert_eq!(req.url(), "http://fn.example.com:7071/api/hello");
    }

    #[test]
    fn test_query_map_used_when_url_has_none() {
        let ctx = context();
        let event = event(json!({
            "Data": {"req": {
                "Url": "https://fn.example.com/api/hello",
                "Method": "GET",
                "Query": {"a": "1"},
                "Headers": {}
            }}
        }));

        let req = FunctionTriggerAdapter.create(&ctx, &event).unwrap();
        assert_eq!(req.parameter("a"), Some("1"));
    }

    #[test]
    fn test_multi_valued_headers_preserved() {
        let ctx = context();
        let event = event(json!({
            "Data": {"req": {
                "Url": "https://fn.example.com/x",
                "Method": "GET",
                "Headers": {"Accept": ["text/html", "application/json"]}
            }}
        }));

        let req = FunctionTriggerAdapter.create(&ctx, &event).unwrap();
        assert_eq!(
            req.header_values("accept"),
            vec!["text/html", "application/json"]
        );
    }

    #[test]
    fn test_structured_body_serialized() {
        let ctx = context();
        let event = event(json!({
            "Data": {"req": {
                "Url": "https://fn.example.com/x",
                "Method": "POST",
                "Headers": {"Content-Type": ["application/json"]},
                "Body": {"k": [1, 2]}
            }}
        }));

        let mut req = FunctionTriggerAdapter.create(&ctx, &event).unwrap();
        assert_eq!(req.body_mut().text().unwrap(), r#"{"k":[1,2]}"#);
    }

    #[test]
    fn test_string_body_stays_text() {
        let ctx = context();
        let event = event(json!({
            "Data": {"req": {
                "Url": "https://fn.example.com/x",
                "Method": "POST",
                "Headers": {"Content-Type": ["text/plain"]},
                "Body": "plain words"
            }}
        }));

        let mut req = FunctionTriggerAdapter.create(&ctx, &event).unwrap();
        assert_eq!(req.body_mut().text().unwrap(), "plain words");
    }

    #[test]
    fn test_bad_content_length_fails_request() {
        let ctx = context();
        let event = event(json!({
            "Data": {"req": {
                "Url": "https://fn.example.com/x",
                "Method": "POST",
                "Headers": {"Content-Length": ["not-a-number"]},
                "Body": "payload"
            }}
        }));

        let err = FunctionTriggerAdapter.create(&ctx, &event).unwrap_err();
        assert!(matches!(err, squall_core::Error::Parse(_)));
    }

    #[test]
    fn test_reply_schema_field_names() {
        let mut res = Response::new();
        res.set_content_type("application/json");
        res.write_text("{}").unwrap();

        let reply = FunctionTriggerAdapter.encode(res).unwrap();
        let json = serde_json::to_value(&reply).unwrap();

        assert_eq!(json["Outputs"]["res"]["statusCode"], 200);
        assert_eq!(json["Outputs"]["res"]["headers"]["Content-Type"], "application/json");
        assert_eq!(json["Outputs"]["res"]["body"], "{}");
        assert_eq!(json["Outputs"]["res"]["isBase64Encoded"], false);
        assert!(json["Logs"].as_array().unwrap().is_empty());
        assert!(json["ReturnValue"].is_null());
    }

    #[test]
    fn test_invoke_round_trip() {
        let ctx = context();
        let event = event(json!({
            "Data": {"req": {
                "Url": "https://fn.example.com/api/hello",
                "Method": "GET",
                "Headers": {}
            }}
        }));

        let reply = FunctionTriggerAdapter.invoke(&ctx, &event);
        assert_eq!(reply.outputs.res.status_code, 200);
        assert_eq!(
            reply.outputs.res.body.as_deref(),
            Some("https://fn.example.com/api/hello")
        );
    }
}
