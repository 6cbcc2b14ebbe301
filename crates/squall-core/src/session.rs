//! Session store
//!
//! Per-request lazy sessions with listener notification. A session is a
//! cheaply clonable handle over shared state; the owning request creates it
//! on demand and drops it on invalidation.
//!
//! Notification payloads are only built when at least one listener is
//! registered; the empty-listener check is the hot-path fast exit.

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Session attribute values
#[derive(Debug, Clone, PartialEq)]
pub enum SessionValue {
    String(String),
    Number(f64),
    Bool(bool),
    Null,
}

impl SessionValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            SessionValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            SessionValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SessionValue::Number(n) => Some(*n as i64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            SessionValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, SessionValue::Null)
    }
}

impl From<String> for SessionValue {
    fn from(s: String) -> Self {
        SessionValue::String(s)
    }
}

impl From<&str> for SessionValue {
    fn from(s: &str) -> Self {
        SessionValue::String(s.to_string())
    }
}

impl From<f64> for SessionValue {
    fn from(n: f64) -> Self {
        SessionValue::Number(n)
    }
}

impl From<i64> for SessionValue {
    fn from(n: i64) -> Self {
        SessionValue::Number(n as f64)
    }
}

impl From<bool> for SessionValue {
    fn from(b: bool) -> Self {
        SessionValue::Bool(b)
    }
}

/// Listener for session lifecycle events
pub trait SessionListener: Send + Sync {
    fn session_created(&self, _session: &Session) {}
    fn session_destroyed(&self, _session: &Session) {}
}

/// Listener for session attribute changes
pub trait SessionAttributeListener: Send + Sync {
    fn attribute_added(&self, _session: &Session, _name: &str, _value: &SessionValue) {}
    fn attribute_replaced(&self, _session: &Session, _name: &str, _old: &SessionValue) {}
    fn attribute_removed(&self, _session: &Session, _name: &str, _old: &SessionValue) {}
}

/// Listener sets a session notifies against, snapshotted from the context
/// at startup
#[derive(Default)]
pub struct SessionHooks {
    pub(crate) lifecycle: Vec<Arc<dyn SessionListener>>,
    pub(crate) attributes: Vec<Arc<dyn SessionAttributeListener>>,
}

impl SessionHooks {
    pub fn new(
        lifecycle: Vec<Arc<dyn SessionListener>>,
        attributes: Vec<Arc<dyn SessionAttributeListener>>,
    ) -> Self {
        Self {
            lifecycle,
            attributes,
        }
    }
}

struct SessionState {
    id: String,
    created: DateTime<Utc>,
    last_accessed: DateTime<Utc>,
    max_inactive_secs: i64,
    is_new: bool,
    valid: bool,
    attributes: HashMap<String, SessionValue>,
}

struct SessionInner {
    state: Mutex<SessionState>,
    hooks: Arc<SessionHooks>,
}

/// Session handle. Clones share the same underlying state.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

/// Default max-inactive interval, in seconds
const DEFAULT_MAX_INACTIVE_SECS: i64 = 30 * 60;

enum AttributeEvent {
    Added(String, SessionValue),
    Replaced(String, SessionValue),
    Removed(String, SessionValue),
}

impl Session {
    /// Create a new session with a fresh random id.
    pub(crate) fn create(hooks: Arc<SessionHooks>) -> Self {
        let now = Utc::now();
        let id = uuid::Uuid::new_v4().simple().to_string();
        debug!(session_id = %id, "session created");

        let session = Self {
            inner: Arc::new(SessionInner {
                state: Mutex::new(SessionState {
                    id,
                    created: now,
                    last_accessed: now,
                    max_inactive_secs: DEFAULT_MAX_INACTIVE_SECS,
                    is_new: true,
                    valid: true,
                    attributes: HashMap::new(),
                }),
                hooks,
            }),
        };
        if !session.inner.hooks.lifecycle.is_empty() {
            for listener in &session.inner.hooks.lifecycle {
                listener.session_created(&session);
            }
        }
        session
    }

    pub fn id(&self) -> String {
        self.inner.state.lock().id.clone()
    }

    pub fn creation_time(&self) -> DateTime<Utc> {
        self.inner.state.lock().created
    }

    pub fn last_accessed_time(&self) -> DateTime<Utc> {
        self.inner.state.lock().last_accessed
    }

    pub fn max_inactive_interval(&self) -> i64 {
        self.inner.state.lock().max_inactive_secs
    }

    pub fn set_max_inactive_interval(&self, seconds: i64) {
        self.inner.state.lock().max_inactive_secs = seconds;
    }

    pub fn is_new(&self) -> bool {
        self.inner.state.lock().is_new
    }

    pub fn is_valid(&self) -> bool {
        self.inner.state.lock().valid
    }

    pub(crate) fn touch(&self) {
        self.inner.state.lock().last_accessed = Utc::now();
    }

    /// Regenerate the session id, leaving attributes and timestamps alone.
    /// Requires a valid session.
    pub fn change_session_id(&self) -> Result<String> {
        let mut state = self.inner.state.lock();
        if !state.valid {
            return Err(Error::State(
                "cannot change id of an invalidated session".to_string(),
            ));
        }
        state.id = uuid::Uuid::new_v4().simple().to_string();
        Ok(state.id.clone())
    }

    /// Invalidate the session. Idempotent; the destroyed notification fires
    /// at most once.
    pub fn invalidate(&self) {
        {
            let mut state = self.inner.state.lock();
            if !state.valid {
                return;
            }
            state.valid = false;
            debug!(session_id = %state.id, "session invalidated");
        }
        if !self.inner.hooks.lifecycle.is_empty() {
            for listener in &self.inner.hooks.lifecycle {
                listener.session_destroyed(self);
            }
        }
    }

    /// Get an attribute. Any attribute access on an invalidated session is
    /// a state error.
    pub fn attribute(&self, name: &str) -> Result<Option<SessionValue>> {
        let state = self.inner.state.lock();
        if !state.valid {
            return Err(invalidated());
        }
        Ok(state.attributes.get(name).cloned())
    }

    pub fn attribute_names(&self) -> Result<Vec<String>> {
        let state = self.inner.state.lock();
        if !state.valid {
            return Err(invalidated());
        }
        Ok(state.attributes.keys().cloned().collect())
    }

    /// Set an attribute, firing the added/replaced notification when
    /// attribute listeners are registered.
    pub fn set_attribute(&self, name: impl Into<String>, value: impl Into<SessionValue>) -> Result<()> {
        let name = name.into();
        let value = value.into();
        let event = {
            let mut state = self.inner.state.lock();
            if !state.valid {
                return Err(invalidated());
            }
            let old = state.attributes.insert(name.clone(), value.clone());
            if self.inner.hooks.attributes.is_empty() {
                None
            } else {
                Some(match old {
                    Some(old) => AttributeEvent::Replaced(name, old),
                    None => AttributeEvent::Added(name, value),
                })
            }
        };
        self.fire(event);
        Ok(())
    }

    /// Remove an attribute, firing the removed notification when attribute
    /// listeners are registered.
    pub fn remove_attribute(&self, name: &str) -> Result<Option<SessionValue>> {
        let (removed, event) = {
            let mut state = self.inner.state.lock();
            if !state.valid {
                return Err(invalidated());
            }
            let removed = state.attributes.remove(name);
            let event = match (&removed, self.inner.hooks.attributes.is_empty()) {
                (Some(old), false) => Some(AttributeEvent::Removed(name.to_string(), old.clone())),
                _ => None,
            };
            (removed, event)
        };
        self.fire(event);
        Ok(removed)
    }

    // Listener callbacks run outside the state lock so they may read the
    // session without deadlocking.
    fn fire(&self, event: Option<AttributeEvent>) {
        let Some(event) = event else { return };
        for listener in &self.inner.hooks.attributes {
            match &event {
                AttributeEvent::Added(name, value) => listener.attribute_added(self, name, value),
                AttributeEvent::Replaced(name, old) => {
                    listener.attribute_replaced(self, name, old)
                }
                AttributeEvent::Removed(name, old) => listener.attribute_removed(self, name, old),
            }
        }
    }
}

fn invalidated() -> Error {
    Error::State("session has been invalidated".to_string())
}
