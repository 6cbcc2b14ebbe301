//! REST-gateway proxy adapter (v1 event shape)
//!
//! Events carry single- and multi-valued header/query maps side by side
//! (the multi-valued maps win when present), the stage-qualified full path
//! under `requestContext.path`, and an optional base64-flagged body.

use crate::adapter::{
    build_body, content_length_from_headers, cookies_from_headers, encode_response,
    lower_headers, lower_multi_headers, resolve_query, Adapter, EventPayload,
};
use crate::url::{derive_url, EventUrl};
use serde::{Deserialize, Serialize};
use squall_core::{Context, Request, RequestBuilder, Response, Result};
use std::collections::HashMap;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RestGatewayEvent {
    pub resource: Option<String>,
    pub path: Option<String>,
    pub http_method: String,
    pub headers: Option<HashMap<String, String>>,
    pub multi_value_headers: Option<HashMap<String, Vec<String>>>,
    pub query_string_parameters: Option<HashMap<String, String>>,
    pub multi_value_query_string_parameters: Option<HashMap<String, Vec<String>>>,
    pub request_context: Option<RestGatewayRequestContext>,
    pub body: Option<String>,
    pub is_base64_encoded: bool,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RestGatewayRequestContext {
    /// Stage-qualified full path
    pub path: Option<String>,
    pub stage: Option<String>,
    pub domain_name: Option<String>,
    pub protocol: Option<String>,
    pub identity: Option<RestGatewayIdentity>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RestGatewayIdentity {
    pub source_ip: Option<String>,
}

/// Reply shape the gateway expects back. Set-Cookie values travel in the
/// multi-valued header map.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RestGatewayReply {
    pub status_code: u16,
    pub headers: HashMap<String, String>,
    pub multi_value_headers: HashMap<String, Vec<String>>,
    pub body: Option<String>,
    pub is_base64_encoded: bool,
}

pub struct RestGatewayAdapter;

impl Adapter for RestGatewayAdapter {
    type Event = RestGatewayEvent;
    type Reply = RestGatewayReply;

    fn create(&self, _ctx: &Context, event: &Self::Event) -> Result<Request> {
        let headers = match &event.multi_value_headers {
            Some(multi) => lower_multi_headers(multi),
            None => event.headers.as_ref().map(lower_headers).unwrap_or_default(),
        };

        let rc = event.request_context.as_ref();
        let parts = derive_url(
            &EventUrl {
                path: event.path.as_deref(),
                inner_full_path: rc.and_then(|c| c.path.as_deref()),
                resource: event.resource.as_deref(),
                domain: rc.and_then(|c| c.domain_name.as_deref()),
                ..Default::default()
            },
            &headers,
        )?;

        // v1 never carries a raw query string
        let single_as_multi = event.query_string_parameters.as_ref().map(|m| {
            m.iter()
                .map(|(k, v)| (k.clone(), vec![v.clone()]))
                .collect::<HashMap<_, _>>()
        });
        let multi = event
            .multi_value_query_string_parameters
            .as_ref()
            .or(single_as_multi.as_ref());
        let (query_string, mut params) = resolve_query(None, multi)?;

        let content_type = headers
            .iter()
            .find(|(k, _)| k == "content-type")
            .map(|(_, v)| v.clone());
        let content_length = content_length_from_headers(&headers)?;

        let payload = EventPayload::from_flagged(event.body.as_deref(), event.is_base64_encoded);
        let body = build_body(payload, content_type.as_deref(), &mut params)?;

        let mut builder = RequestBuilder::new(event.http_method.parse()?, parts.uri)
            .url(parts.url)
            .protocol(
                rc.and_then(|c| c.protocol.as_deref())
                    .unwrap_or("HTTP/1.1"),
            )
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
        if let Some(ip) = rc.and_then(|c| c.identity.as_ref()).and_then(|i| i.source_ip.as_deref())
        {
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
        let mut multi: HashMap<String, Vec<String>> = HashMap::new();
        if let Some(ct) = &parts.content_type {
            headers.insert("Content-Type".to_string(), ct.clone());
            multi.insert("Content-Type".to_string(), vec![ct.clone()]);
        }
        for (name, value) in parts.headers {
            headers.entry(name.clone()).or_insert_with(|| value.clone());
            multi.entry(name).or_default().push(value);
        }
        if !parts.cookies.is_empty() {
            multi.insert("Set-Cookie".to_string(), parts.cookies);
        }

        Ok(RestGatewayReply {
            status_code: parts.status,
            headers,
            multi_value_headers: multi,
            body: parts.body,
            is_base64_encoded: parts.is_base64,
        })
    }

    fn internal_error(&self) -> Self::Reply {
        RestGatewayReply {
            status_code: 500,
            headers: HashMap::new(),
            multi_value_headers: HashMap::new(),
            body: None,
            is_base64_encoded: false,
        }
    }
}
