//! Middleware chain
//!
//! Middleware wraps the terminal handler dispatch through an explicit
//! continuation. The chain runs outermost-first in reverse registration
//! order: the most recently registered middleware sees the request first
//! and the response last. A middleware may skip the continuation entirely
//! to short-circuit.

use crate::router::pattern_matches;
use crate::{Request, Response, Result};
use std::collections::HashMap;
use std::sync::Arc;

/// How a request reached the chain. Only direct requests exist at this
/// layer; the kind is recorded on the registration so mappings stay
/// explicit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DispatchKind {
    #[default]
    Request,
}

/// Configuration handed to a middleware's `init`
#[derive(Debug, Clone, Default)]
pub struct MiddlewareConfig {
    pub name: String,
    pub init_params: HashMap<String, String>,
}

/// Middleware contract: inspect or modify either side, invoke the
/// continuation zero or one times, and optionally act after it returns.
pub trait Middleware: Send + Sync {
    /// Called once during context startup
    fn init(&self, _config: &MiddlewareConfig) -> Result<()> {
        Ok(())
    }

    fn handle(&self, req: &mut Request, res: &mut Response, chain: &Chain<'_>) -> Result<()>;
}

/// A middleware registration: name, reference, URL pattern, dispatch kind.
/// Registration order determines chain position (last registered runs
/// outermost).
pub struct MiddlewareRegistration {
    pub(crate) name: String,
    pub(crate) middleware: Arc<dyn Middleware>,
    pub(crate) pattern: String,
    pub(crate) kind: DispatchKind,
    pub(crate) config: MiddlewareConfig,
}

impl MiddlewareRegistration {
    pub fn new(name: impl Into<String>, middleware: Arc<dyn Middleware>) -> Self {
        let name = name.into();
        Self {
            config: MiddlewareConfig {
                name: name.clone(),
                init_params: HashMap::new(),
            },
            name,
            middleware,
            pattern: "/".to_string(),
            kind: DispatchKind::Request,
        }
    }

    /// URL pattern this middleware applies to (default `/`, i.e. all)
    pub fn pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = pattern.into();
        self
    }

    pub fn dispatch_kind(mut self, kind: DispatchKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn init_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.init_params.insert(name.into(), value.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn applies_to(&self, path: &str) -> bool {
        pattern_matches(&self.pattern, path)
    }
}

/// The continuation passed to each middleware. `proceed` invokes the next
/// link, or the terminal handler dispatch once the links are exhausted.
pub struct Chain<'a> {
    links: &'a [Arc<MiddlewareRegistration>],
    terminal: &'a dyn Fn(&mut Request, &mut Response) -> Result<()>,
}

impl<'a> Chain<'a> {
    pub(crate) fn new(
        links: &'a [Arc<MiddlewareRegistration>],
        terminal: &'a dyn Fn(&mut Request, &mut Response) -> Result<()>,
    ) -> Self {
        Self { links, terminal }
    }

    /// Invoke the next link in the chain
    pub fn proceed(&self, req: &mut Request, res: &mut Response) -> Result<()> {
        match self.links.split_first() {
            Some((link, rest)) => {
                let next = Chain {
                    links: rest,
                    terminal: self.terminal,
                };
                link.middleware.handle(req, res, &next)
            }
            None => (self.terminal)(req, res),
        }
    }
}
