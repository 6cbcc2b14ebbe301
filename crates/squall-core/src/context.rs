//! Dispatch engine and deployment context
//!
//! The `Context` owns handler/middleware/listener registrations, global
//! attributes, and the lifecycle state machine:
//!
//! `New -> Initializing -> Running -> ShuttingDown`
//!
//! Registrations are only accepted before startup; once running, the
//! tables are read-only and routing needs no locks. Startup drains three
//! FIFO task queues in a fixed order: listener-init, middleware-init,
//! handler-init.

use crate::middleware::{Chain, MiddlewareRegistration};
use crate::router;
use crate::session::{SessionAttributeListener, SessionHooks, SessionListener};
use crate::{Error, Request, Response, Result, StatusCode};
use parking_lot::Mutex;
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Context lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LifecycleState {
    New,
    Initializing,
    Running,
    ShuttingDown,
}

/// Configuration handed to a handler's `init`
#[derive(Debug, Clone, Default)]
pub struct HandlerConfig {
    pub name: String,
    pub init_params: HashMap<String, String>,
}

/// Application-supplied unit of request-processing logic
pub trait Handler: Send + Sync {
    /// Called exactly once before the first request reaches the handler
    fn init(&self, _config: &HandlerConfig) -> Result<()> {
        Ok(())
    }

    fn handle(&self, req: &mut Request, res: &mut Response) -> Result<()>;

    /// Called during context shutdown for initialized handlers
    fn destroy(&self) {}
}

/// Listener for context lifecycle
pub trait ContextListener: Send + Sync {
    fn on_startup(&self, _ctx: &Context) {}
    fn on_shutdown(&self, _ctx: &Context) {}
}

/// Listener for request-scoped lifecycle
pub trait RequestListener: Send + Sync {
    fn on_request_init(&self, _req: &Request) {}
    fn on_request_destroy(&self, _req: &Request) {}
}

/// Listener for global attribute changes
pub trait ContextAttributeListener: Send + Sync {
    fn attribute_added(&self, _name: &str) {}
    fn attribute_replaced(&self, _name: &str) {}
    fn attribute_removed(&self, _name: &str) {}
}

/// A handler registration: unique name, reference, mapping set, init
/// parameters, load-on-startup flag.
pub struct HandlerRegistration {
    name: String,
    handler: Arc<dyn Handler>,
    mappings: Vec<String>,
    load_on_startup: bool,
    config: HandlerConfig,
    // false -> true exactly once, guarded
    initialized: Mutex<bool>,
}

impl HandlerRegistration {
    pub fn new(name: impl Into<String>, handler: Arc<dyn Handler>) -> Self {
        let name = name.into();
        Self {
            config: HandlerConfig {
                name: name.clone(),
                init_params: HashMap::new(),
            },
            name,
            handler,
            mappings: Vec::new(),
            load_on_startup: false,
            initialized: Mutex::new(false),
        }
    }

    /// Add a URL-pattern mapping
    pub fn mapping(mut self, pattern: impl Into<String>) -> Self {
        self.mappings.push(pattern.into());
        self
    }

    pub fn init_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.init_params.insert(name.into(), value.into());
        self
    }

    pub fn load_on_startup(mut self, load: bool) -> Self {
        self.load_on_startup = load;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn ensure_initialized(&self) -> Result<()> {
        let mut initialized = self.initialized.lock();
        if !*initialized {
            self.handler.init(&self.config)?;
            *initialized = true;
        }
        Ok(())
    }

    fn destroy_if_initialized(&self) {
        if *self.initialized.lock() {
            self.handler.destroy();
        }
    }
}

enum AttributeChange {
    Added(String),
    Replaced(String),
    Removed(String),
}

/// The per-deployment registry and dispatch engine.
///
/// All registration happens on one thread before `startup`; dispatch is
/// then safe from any number of concurrent invocations sharing the
/// context.
pub struct Context {
    state: LifecycleState,
    handlers: Vec<Arc<HandlerRegistration>>,
    // pattern -> index into `handlers`
    mappings: Vec<(String, usize)>,
    middleware: Vec<Arc<MiddlewareRegistration>>,
    context_listeners: Vec<Arc<dyn ContextListener>>,
    request_listeners: Vec<Arc<dyn RequestListener>>,
    session_listeners: Vec<Arc<dyn SessionListener>>,
    session_attribute_listeners: Vec<Arc<dyn SessionAttributeListener>>,
    attribute_listeners: Vec<Arc<dyn ContextAttributeListener>>,
    attributes: Mutex<HashMap<String, Box<dyn Any + Send + Sync>>>,
    // Startup task queues; each registration enqueues exactly one task.
    listener_init_queue: Vec<usize>,
    middleware_init_queue: Vec<usize>,
    handler_init_queue: Vec<usize>,
    session_hooks: Arc<SessionHooks>,
}

impl Context {
    pub fn new() -> Self {
        Self {
            state: LifecycleState::New,
            handlers: Vec::new(),
            mappings: Vec::new(),
            middleware: Vec::new(),
            context_listeners: Vec::new(),
            request_listeners: Vec::new(),
            session_listeners: Vec::new(),
            session_attribute_listeners: Vec::new(),
            attribute_listeners: Vec::new(),
            attributes: Mutex::new(HashMap::new()),
            listener_init_queue: Vec::new(),
            middleware_init_queue: Vec::new(),
            handler_init_queue: Vec::new(),
            session_hooks: Arc::new(SessionHooks::default()),
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    fn require_registrable(&self, what: &str) -> Result<()> {
        if self.state >= LifecycleState::Running {
            return Err(Error::State(format!(
                "cannot register {what} once the context is running"
            )));
        }
        Ok(())
    }

    /// Register a handler. Names are unique; registration is rejected once
    /// the context is running.
    pub fn add_handler(&mut self, registration: HandlerRegistration) -> Result<()> {
        self.require_registrable("a handler")?;
        if self.handlers.iter().any(|h| h.name == registration.name) {
            return Err(Error::State(format!(
                "handler name already registered: {}",
                registration.name
            )));
        }
        let index = self.handlers.len();
        for pattern in &registration.mappings {
            self.mappings.push((pattern.clone(), index));
        }
        self.handlers.push(Arc::new(registration));
        self.handler_init_queue.push(index);
        Ok(())
    }

    /// Register middleware. Insertion order is chain position: the last
    /// registered middleware runs outermost.
    pub fn add_middleware(&mut self, registration: MiddlewareRegistration) -> Result<()> {
        self.require_registrable("middleware")?;
        let index = self.middleware.len();
        self.middleware.push(Arc::new(registration));
        self.middleware_init_queue.push(index);
        Ok(())
    }

    pub fn add_context_listener(&mut self, listener: Arc<dyn ContextListener>) -> Result<()> {
        self.require_registrable("a listener")?;
        let index = self.context_listeners.len();
        self.context_listeners.push(listener);
        self.listener_init_queue.push(index);
        Ok(())
    }

    pub fn add_request_listener(&mut self, listener: Arc<dyn RequestListener>) -> Result<()> {
        self.require_registrable("a listener")?;
        self.request_listeners.push(listener);
        Ok(())
    }

    pub fn add_session_listener(&mut self, listener: Arc<dyn SessionListener>) -> Result<()> {
        self.require_registrable("a listener")?;
        self.session_listeners.push(listener);
        Ok(())
    }

    pub fn add_session_attribute_listener(
        &mut self,
        listener: Arc<dyn SessionAttributeListener>,
    ) -> Result<()> {
        self.require_registrable("a listener")?;
        self.session_attribute_listeners.push(listener);
        Ok(())
    }

    pub fn add_attribute_listener(
        &mut self,
        listener: Arc<dyn ContextAttributeListener>,
    ) -> Result<()> {
        self.require_registrable("a listener")?;
        self.attribute_listeners.push(listener);
        Ok(())
    }

    /// Run the startup sequence exactly once: listener-init tasks, then
    /// middleware-init tasks, then handler-init tasks, each queue FIFO.
    pub fn startup(&mut self) -> Result<()> {
        if self.state != LifecycleState::New {
            return Err(Error::State(format!(
                "startup called in state {:?}",
                self.state
            )));
        }
        self.state = LifecycleState::Initializing;

        self.session_hooks = Arc::new(SessionHooks::new(
            self.session_listeners.clone(),
            self.session_attribute_listeners.clone(),
        ));

        for index in std::mem::take(&mut self.listener_init_queue) {
            self.context_listeners[index].on_startup(self);
        }
        for index in std::mem::take(&mut self.middleware_init_queue) {
            let registration = &self.middleware[index];
            registration.middleware.init(&registration.config)?;
        }
        for index in std::mem::take(&mut self.handler_init_queue) {
            let registration = &self.handlers[index];
            if registration.load_on_startup {
                registration.ensure_initialized()?;
            }
        }

        self.state = LifecycleState::Running;
        debug!(
            handlers = self.handlers.len(),
            middleware = self.middleware.len(),
            "context running"
        );
        Ok(())
    }

    /// Shut the context down: shutdown listeners and handler `destroy`
    /// callbacks run in reverse registration order.
    pub fn shutdown(&mut self) -> Result<()> {
        if self.state != LifecycleState::Running {
            return Err(Error::State(format!(
                "shutdown called in state {:?}",
                self.state
            )));
        }
        self.state = LifecycleState::ShuttingDown;

        for listener in self.context_listeners.iter().rev() {
            listener.on_shutdown(self);
        }
        for registration in self.handlers.iter().rev() {
            registration.destroy_if_initialized();
        }
        Ok(())
    }

    /// Resolve the handler for a path: exact mapping, longest boundary
    /// prefix, then the root default.
    pub fn resolve(&self, path: &str) -> Option<&Arc<HandlerRegistration>> {
        router::resolve(&self.mappings, path).map(|&index| &self.handlers[index])
    }

    /// Dispatch one canonical request.
    ///
    /// Request-init listeners fire first, then the middleware chain wraps
    /// the handler, and request-destroy listeners fire in reverse order
    /// even when the chain failed. Handler and middleware failures come
    /// back wrapped as [`Error::Dispatch`]; an unresolved path is a 404
    /// outcome, not an error.
    pub fn dispatch(&self, req: &mut Request, res: &mut Response) -> Result<()> {
        if self.state != LifecycleState::Running {
            return Err(Error::State(format!(
                "dispatch called in state {:?}",
                self.state
            )));
        }
        req.bind_session_hooks(self.session_hooks.clone());

        for listener in &self.request_listeners {
            listener.on_request_init(req);
        }

        let result = self.run_chain(req, res);

        // Guaranteed cleanup: destroy notifications run on failure too.
        for listener in self.request_listeners.iter().rev() {
            listener.on_request_destroy(req);
        }

        result.map_err(|e| {
            warn!(uri = %req.uri(), error = %e, "request dispatch failed");
            e.into_dispatch()
        })
    }

    fn run_chain(&self, req: &mut Request, res: &mut Response) -> Result<()> {
        let Some(registration) = self.resolve(req.uri()) else {
            debug!(uri = %req.uri(), "no handler mapping");
            res.set_status(StatusCode::NOT_FOUND);
            return Ok(());
        };
        debug!(handler = %registration.name, uri = %req.uri(), "dispatching");

        // Reverse registration order: last registered runs outermost.
        let links: Vec<Arc<MiddlewareRegistration>> = self
            .middleware
            .iter()
            .rev()
            .filter(|m| m.applies_to(req.uri()))
            .cloned()
            .collect();

        let registration = registration.clone();
        let terminal = move |req: &mut Request, res: &mut Response| -> Result<()> {
            registration.ensure_initialized()?;
            registration.handler.handle(req, res)
        };
        Chain::new(&links, &terminal).proceed(req, res)
    }

    /// Typed global attribute lookup
    pub fn attribute<T: Any + Send + Sync + Clone>(&self, name: &str) -> Option<T> {
        self.attributes
            .lock()
            .get(name)
            .and_then(|v| v.downcast_ref::<T>())
            .cloned()
    }

    /// Set a global attribute. The add-versus-replace decision is made
    /// under the lock so concurrent writers cannot produce duplicate or
    /// missed notifications; the payload is only built when listeners
    /// exist.
    pub fn set_attribute<T: Any + Send + Sync>(&self, name: impl Into<String>, value: T) {
        let name = name.into();
        let change = {
            let mut attributes = self.attributes.lock();
            let existed = attributes.insert(name.clone(), Box::new(value)).is_some();
            if self.attribute_listeners.is_empty() {
                None
            } else if existed {
                Some(AttributeChange::Replaced(name))
            } else {
                Some(AttributeChange::Added(name))
            }
        };
        self.notify_attribute(change);
    }

    /// Remove a global attribute; returns whether it existed.
    pub fn remove_attribute(&self, name: &str) -> bool {
        let (existed, change) = {
            let mut attributes = self.attributes.lock();
            let existed = attributes.remove(name).is_some();
            let change = if existed && !self.attribute_listeners.is_empty() {
                Some(AttributeChange::Removed(name.to_string()))
            } else {
                None
            };
            (existed, change)
        };
        self.notify_attribute(change);
        existed
    }

    fn notify_attribute(&self, change: Option<AttributeChange>) {
        let Some(change) = change else { return };
        for listener in &self.attribute_listeners {
            match &change {
                AttributeChange::Added(name) => listener.attribute_added(name),
                AttributeChange::Replaced(name) => listener.attribute_replaced(name),
                AttributeChange::Removed(name) => listener.attribute_removed(name),
            }
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::{Middleware, MiddlewareConfig};
    use crate::{Method, RequestBuilder};

    struct Echo;
    impl Handler for Echo {
        fn handle(&self, req: &mut Request, res: &mut Response) -> Result<()> {
            res.set_content_type("text/plain");
            res.write_text(&format!("echo:{}", req.uri()))?;
            Ok(())
        }
    }

    struct Tagger(&'static str);
    impl Handler for Tagger {
        fn handle(&self, _: &mut Request, res: &mut Response) -> Result<()> {
            res.set_header("X-Handler", self.0);
            Ok(())
        }
    }

    fn request(uri: &str) -> Request {
        RequestBuilder::new(Method::Get, uri).build()
    }

    fn running_context() -> Context {
        let mut ctx = Context::new();
        ctx.add_handler(HandlerRegistration::new("echo", Arc::new(Echo)).mapping("/echo"))
            .unwrap();
        ctx.startup().unwrap();
        ctx
    }

    #[test]
    fn test_dispatch_reaches_handler() {
        let ctx = running_context();
        let mut req = request("/echo");
        let mut res = Response::new();
        ctx.dispatch(&mut req, &mut res).unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[test]
    fn test_unmapped_path_is_not_found_outcome() {
        let ctx = running_context();
        let mut req = request("/missing");
        let mut res = Response::new();
        // Not an error: the 404 outcome travels on the response
        ctx.dispatch(&mut req, &mut res).unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_root_mapping_catches_all() {
        let mut ctx = Context::new();
        ctx.add_handler(HandlerRegistration::new("default", Arc::new(Tagger("default"))).mapping("/"))
            .unwrap();
        ctx.add_handler(
            HandlerRegistration::new("specific", Arc::new(Tagger("specific"))).mapping("/special"),
        )
        .unwrap();
        ctx.startup().unwrap();

        let mut res = Response::new();
        ctx.dispatch(&mut request("/anything/at/all"), &mut res).unwrap();
        assert_eq!(res.header("X-Handler"), Some("default"));

        let mut res = Response::new();
        ctx.dispatch(&mut request("/special/child"), &mut res).unwrap();
        assert_eq!(res.header("X-Handler"), Some("specific"));
    }

    #[test]
    fn test_registration_rejected_once_running() {
        let mut ctx = running_context();
        let err = ctx
            .add_handler(HandlerRegistration::new("late", Arc::new(Echo)).mapping("/late"))
            .unwrap_err();
        assert!(matches!(err, Error::State(_)));

        struct Noop;
        impl RequestListener for Noop {}
        assert!(matches!(
            ctx.add_request_listener(Arc::new(Noop)),
            Err(Error::State(_))
        ));
    }

    #[test]
    fn test_duplicate_handler_name_rejected() {
        let mut ctx = Context::new();
        ctx.add_handler(HandlerRegistration::new("dup", Arc::new(Echo)).mapping("/a"))
            .unwrap();
        let err = ctx
            .add_handler(HandlerRegistration::new("dup", Arc::new(Echo)).mapping("/b"))
            .unwrap_err();
        assert!(matches!(err, Error::State(_)));
    }

    #[test]
    fn test_startup_runs_once() {
        let mut ctx = running_context();
        assert!(matches!(ctx.startup(), Err(Error::State(_))));
    }

    #[test]
    fn test_startup_queue_order() {
        use parking_lot::Mutex;

        let log: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));

        struct L(Arc<Mutex<Vec<&'static str>>>, &'static str);
        impl ContextListener for L {
            fn on_startup(&self, _: &Context) {
                self.0.lock().push(self.1);
            }
        }
        struct M(Arc<Mutex<Vec<&'static str>>>, &'static str);
        impl Middleware for M {
            fn init(&self, _: &MiddlewareConfig) -> Result<()> {
                self.0.lock().push(self.1);
                Ok(())
            }
            fn handle(&self, req: &mut Request, res: &mut Response, chain: &Chain<'_>) -> Result<()> {
                chain.proceed(req, res)
            }
        }
        struct H(Arc<Mutex<Vec<&'static str>>>, &'static str);
        impl Handler for H {
            fn init(&self, _: &HandlerConfig) -> Result<()> {
                self.0.lock().push(self.1);
                Ok(())
            }
            fn handle(&self, _: &mut Request, _: &mut Response) -> Result<()> {
                Ok(())
            }
        }

        let mut ctx = Context::new();
        // Interleave registrations; queue order must still be
        // listeners, then middleware, then handlers, FIFO within each.
        ctx.add_handler(
            HandlerRegistration::new("h1", Arc::new(H(log.clone(), "h1")))
                .mapping("/h1")
                .load_on_startup(true),
        )
        .unwrap();
        ctx.add_context_listener(Arc::new(L(log.clone(), "l1"))).unwrap();
        ctx.add_middleware(MiddlewareRegistration::new(
            "m1",
            Arc::new(M(log.clone(), "m1")),
        ))
        .unwrap();
        ctx.add_context_listener(Arc::new(L(log.clone(), "l2"))).unwrap();
        ctx.add_handler(
            HandlerRegistration::new("h2", Arc::new(H(log.clone(), "h2")))
                .mapping("/h2")
                .load_on_startup(true),
        )
        .unwrap();
        ctx.add_middleware(MiddlewareRegistration::new(
            "m2",
            Arc::new(M(log.clone(), "m2")),
        ))
        .unwrap();
        ctx.startup().unwrap();

        assert_eq!(*log.lock(), vec!["l1", "l2", "m1", "m2", "h1", "h2"]);
    }

    #[test]
    fn test_lazy_handler_init_on_first_dispatch() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        struct Lazy(Arc<AtomicUsize>);
        impl Handler for Lazy {
            fn init(&self, _: &HandlerConfig) -> Result<()> {
                self.0.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
            fn handle(&self, _: &mut Request, _: &mut Response) -> Result<()> {
                Ok(())
            }
        }

        let inits = Arc::new(AtomicUsize::new(0));
        let mut ctx = Context::new();
        ctx.add_handler(
            HandlerRegistration::new("lazy", Arc::new(Lazy(inits.clone()))).mapping("/lazy"),
        )
        .unwrap();
        ctx.startup().unwrap();
        assert_eq!(inits.load(Ordering::SeqCst), 0);

        for _ in 0..2 {
            let mut res = Response::new();
            ctx.dispatch(&mut request("/lazy"), &mut res).unwrap();
        }
        assert_eq!(inits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_middleware_wraps_in_reverse_registration_order() {
        use parking_lot::Mutex;

        struct Tracer(Arc<Mutex<Vec<String>>>, &'static str);
        impl Middleware for Tracer {
            fn handle(&self, req: &mut Request, res: &mut Response, chain: &Chain<'_>) -> Result<()> {
                self.0.lock().push(format!("{}:req", self.1));
                chain.proceed(req, res)?;
                self.0.lock().push(format!("{}:res", self.1));
                Ok(())
            }
        }

        let log = Arc::new(Mutex::new(Vec::new()));
        let mut ctx = Context::new();
        ctx.add_handler(HandlerRegistration::new("echo", Arc::new(Echo)).mapping("/echo"))
            .unwrap();
        ctx.add_middleware(MiddlewareRegistration::new(
            "M1",
            Arc::new(Tracer(log.clone(), "M1")),
        ))
        .unwrap();
        ctx.add_middleware(MiddlewareRegistration::new(
            "M2",
            Arc::new(Tracer(log.clone(), "M2")),
        ))
        .unwrap();
        ctx.startup().unwrap();

        let mut res = Response::new();
        ctx.dispatch(&mut request("/echo"), &mut res).unwrap();

        // M2 registered last: sees the request first and the response last
        assert_eq!(*log.lock(), vec!["M2:req", "M1:req", "M1:res", "M2:res"]);
    }

    #[test]
    fn test_handler_failure_wrapped_as_dispatch_error() {
        struct Failing;
        impl Handler for Failing {
            fn handle(&self, _: &mut Request, _: &mut Response) -> Result<()> {
                Err(Error::Internal("application exploded".to_string()))
            }
        }

        let mut ctx = Context::new();
        ctx.add_handler(HandlerRegistration::new("bad", Arc::new(Failing)).mapping("/bad"))
            .unwrap();
        ctx.startup().unwrap();

        let mut res = Response::new();
        let err = ctx.dispatch(&mut request("/bad"), &mut res).unwrap_err();
        assert!(matches!(err, Error::Dispatch(_)));
    }

    #[test]
    fn test_request_listeners_fire_around_failure() {
        use parking_lot::Mutex;

        struct Recorder(Arc<Mutex<Vec<String>>>, &'static str);
        impl RequestListener for Recorder {
            fn on_request_init(&self, _: &Request) {
                self.0.lock().push(format!("{}:init", self.1));
            }
            fn on_request_destroy(&self, _: &Request) {
                self.0.lock().push(format!("{}:destroy", self.1));
            }
        }

        struct Failing;
        impl Handler for Failing {
            fn handle(&self, _: &mut Request, _: &mut Response) -> Result<()> {
                Err(Error::Internal("boom".to_string()))
            }
        }

        let log = Arc::new(Mutex::new(Vec::new()));
        let mut ctx = Context::new();
        ctx.add_handler(HandlerRegistration::new("bad", Arc::new(Failing)).mapping("/bad"))
            .unwrap();
        ctx.add_request_listener(Arc::new(Recorder(log.clone(), "r1"))).unwrap();
        ctx.add_request_listener(Arc::new(Recorder(log.clone(), "r2"))).unwrap();
        ctx.startup().unwrap();

        let mut res = Response::new();
        let _ = ctx.dispatch(&mut request("/bad"), &mut res);

        // Init in registration order, destroy in reverse, despite the error
        assert_eq!(
            *log.lock(),
            vec!["r1:init", "r2:init", "r2:destroy", "r1:destroy"]
        );
    }

    #[test]
    fn test_dispatch_before_startup_is_state_error() {
        let ctx = Context::new();
        let mut res = Response::new();
        let err = ctx.dispatch(&mut request("/x"), &mut res).unwrap_err();
        assert!(matches!(err, Error::State(_)));
    }

    #[test]
    fn test_global_attributes_notify_add_replace_remove() {
        use parking_lot::Mutex;

        #[derive(Default)]
        struct Recorder(Mutex<Vec<String>>);
        impl ContextAttributeListener for Recorder {
            fn attribute_added(&self, name: &str) {
                self.0.lock().push(format!("add:{name}"));
            }
            fn attribute_replaced(&self, name: &str) {
                self.0.lock().push(format!("replace:{name}"));
            }
            fn attribute_removed(&self, name: &str) {
                self.0.lock().push(format!("remove:{name}"));
            }
        }

        let recorder = Arc::new(Recorder::default());
        let mut ctx = Context::new();
        ctx.add_attribute_listener(recorder.clone()).unwrap();
        ctx.startup().unwrap();

        ctx.set_attribute("k", 1i64);
        ctx.set_attribute("k", 2i64);
        assert_eq!(ctx.attribute::<i64>("k"), Some(2));
        assert!(ctx.remove_attribute("k"));
        assert!(!ctx.remove_attribute("k"));

        assert_eq!(*recorder.0.lock(), vec!["add:k", "replace:k", "remove:k"]);
    }

    #[test]
    fn test_session_listener_wired_through_dispatch() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        struct Counter(Arc<AtomicUsize>);
        impl crate::session::SessionListener for Counter {
            fn session_created(&self, _: &crate::session::Session) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        struct NeedsSession;
        impl Handler for NeedsSession {
            fn handle(&self, req: &mut Request, _: &mut Response) -> Result<()> {
                let session = req.get_session(true).expect("session created");
                session.set_attribute("user", "alice")?;
                Ok(())
            }
        }

        let created = Arc::new(AtomicUsize::new(0));
        let mut ctx = Context::new();
        ctx.add_handler(HandlerRegistration::new("s", Arc::new(NeedsSession)).mapping("/s"))
            .unwrap();
        ctx.add_session_listener(Arc::new(Counter(created.clone()))).unwrap();
        ctx.startup().unwrap();

        let mut res = Response::new();
        ctx.dispatch(&mut request("/s"), &mut res).unwrap();
        assert_eq!(created.load(Ordering::SeqCst), 1);
    }
}
