//! squall-core: Canonical request/response model and dispatch engine
//!
//! This library is platform-agnostic: it knows nothing about the event
//! shapes of any particular serverless platform. Adapters build a
//! [`Request`], dispatch it through a [`Context`], and encode the
//! [`Response`] back into their platform's reply shape.
//!
//! ## Layers
//! - `request` / `response` - the canonical HTTP model
//! - `context` - handler registry, middleware chain, lifecycle
//! - `session` - per-request lazy sessions with listeners
//! - `form` / `cookie` - parameter and cookie codecs

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod context;
pub mod cookie;
pub mod error;
pub mod form;
pub mod middleware;
pub mod request;
pub mod response;
pub mod router;
pub mod session;

// Re-exports
pub use error::{DispatchError, Error, Result};
pub use request::{Body, Method, Request, RequestBuilder};
pub use response::{Response, ResponseBody, ResponseParts, StatusCode};

// Context re-exports
pub use context::{
    Context, ContextAttributeListener, ContextListener, Handler, HandlerConfig,
    HandlerRegistration, LifecycleState, RequestListener,
};

// Middleware re-exports
pub use middleware::{
    Chain, DispatchKind, Middleware, MiddlewareConfig, MiddlewareRegistration,
};

// Session re-exports
pub use session::{
    Session, SessionAttributeListener, SessionListener, SessionValue,
};

// Codec re-exports
pub use cookie::Cookie;
pub use form::{Charset, ParamMap};
