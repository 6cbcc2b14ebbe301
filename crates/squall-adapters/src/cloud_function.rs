//! Cloud-function adapter
//!
//! The leanest of the four event shapes: method, bare path, multi-valued
//! header map, raw query string, and a body that may be a plain string or
//! a structured JSON value. Replies carry Set-Cookie values in a
//! dedicated `setCookies` list.

use crate::adapter::{
    build_body, content_length_from_headers, cookies_from_headers, encode_response,
    lower_multi_headers, resolve_query, Adapter, EventPayload,
};
use crate::url::{derive_url, EventUrl};
use serde::{Deserialize, Serialize};
use squall_core::{Context, Request, RequestBuilder, Response, Result};
use std::collections::HashMap;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CloudFunctionEvent {
    pub method: String,
    pub path: Option<String>,
    pub headers: HashMap<String, Vec<String>>,
    pub query: Option<String>,
    pub body: Option<serde_json::Value>,
    pub remote_addr: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CloudFunctionReply {
    pub status_code: u16,
    pub headers: HashMap<String, String>,
    pub set_cookies: Vec<String>,
    pub body: Option<String>,
    pub is_base64_encoded: bool,
}

pub struct CloudFunctionAdapter;

impl Adapter for CloudFunctionAdapter {
    type Event = CloudFunctionEvent;
    type Reply = CloudFunctionReply;

    fn create(&self, _ctx: &Context, event: &Self::Event) -> Result<Request> {
        let headers = lower_multi_headers(&event.headers);

        let parts = derive_url(
            &EventUrl {
                path: event.path.as_deref(),
                ..Default::default()
            },
            &headers,
        )?;

        let (query_string, mut params) = resolve_query(event.query.as_deref(), None)?;

        let content_type = headers
            .iter()
            .find(|(k, _)| k == "content-type")
            .map(|(_, v)| v.clone());
        let content_length = content_length_from_headers(&headers)?;

        let payload = EventPayload::from_json(event.body.as_ref());
        let body = build_body(payload, content_type.as_deref(), &mut params)?;

        let mut builder = RequestBuilder::new(event.method.parse()?, parts.uri)
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
        if let Some(addr) = event.remote_addr.as_deref() {
            builder = builder.remote_addr(addr).remote_host(addr);
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

        Ok(CloudFunctionReply {
            status_code: parts.status,
            headers,
            set_cookies: parts.cookies,
            body: parts.body,
            is_base64_encoded: parts.is_base64,
        })
    }

    fn internal_error(&self) -> Self::Reply {
        CloudFunctionReply {
            status_code: 500,
            headers: HashMap::new(),
            set_cookies: Vec::new(),
            body: None,
            is_base64_encoded: false,
        }
    }
}
