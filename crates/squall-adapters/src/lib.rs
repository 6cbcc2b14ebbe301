//! squall-adapters: Platform event translation
//!
//! One adapter per serverless event shape, all converging on the
//! squall-core canonical request/response model:
//!
//! - `rest_gateway` - REST-gateway proxy events (v1)
//! - `http_gateway` - HTTP-gateway events (v2)
//! - `function_trigger` - function-trigger request objects
//! - `cloud_function` - cloud-function request objects
//!
//! The URL, query, and body derivation rules are shared by all four
//! (`url`, `adapter`); only the event/reply wire shapes differ.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod adapter;
pub mod base64;
pub mod cloud_function;
pub mod function_trigger;
pub mod http_gateway;
pub mod rest_gateway;
pub mod url;

// Re-exports
pub use adapter::{Adapter, EventPayload, ReplyParts};
pub use cloud_function::{CloudFunctionAdapter, CloudFunctionEvent, CloudFunctionReply};
pub use function_trigger::{FunctionTriggerAdapter, FunctionTriggerEvent, FunctionTriggerReply};
pub use http_gateway::{HttpGatewayAdapter, HttpGatewayEvent, HttpGatewayReply};
pub use rest_gateway::{RestGatewayAdapter, RestGatewayEvent, RestGatewayReply};
pub use url::{derive_url, AbsoluteUrl, EventUrl, UrlParts};
