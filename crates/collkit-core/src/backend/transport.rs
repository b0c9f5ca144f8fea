use crate::{
    backend::store::Cursor,
    error::{Error, ErrorKind, ErrorOrigin},
};
use collkit_schema::value::Value;
use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};
use thiserror::Error as ThisError;

///
/// TransportError
///

#[derive(Debug, ThisError)]
pub enum TransportError {
    #[error("{kind} '{name}' is already registered")]
    AlreadyRegistered { kind: EndpointKind, name: String },

    #[error("{kind} '{name}' is not registered")]
    NotRegistered { kind: EndpointKind, name: String },

    #[error("rate limit exceeded for {kind} '{name}'")]
    RateLimited { kind: EndpointKind, name: String },
}

impl From<TransportError> for Error {
    fn from(err: TransportError) -> Self {
        let kind = match &err {
            TransportError::AlreadyRegistered { .. } => ErrorKind::Transport,
            TransportError::NotRegistered { .. } => ErrorKind::NotFound,
            TransportError::RateLimited { .. } => ErrorKind::RateLimited,
        };

        Self::new(kind, ErrorOrigin::Transport, err.to_string())
    }
}

///
/// EndpointKind
///

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum EndpointKind {
    Method,
    Feed,
}

impl fmt::Display for EndpointKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Method => "method",
            Self::Feed => "feed",
        };
        write!(f, "{label}")
    }
}

///
/// CallContext
///
/// Execution context of one remote procedure invocation.
///

#[derive(Debug, Default)]
pub struct CallContext {
    user_id: Option<String>,
    connection_id: Option<String>,
    is_simulation: bool,
    unblocked: AtomicBool,
}

impl CallContext {
    #[must_use]
    pub fn new(user_id: Option<&str>, connection_id: Option<&str>) -> Self {
        Self {
            user_id: user_id.map(ToString::to_string),
            connection_id: connection_id.map(ToString::to_string),
            ..Self::default()
        }
    }

    /// Context for a client-side optimistic run of the procedure.
    #[must_use]
    pub const fn simulation(mut self) -> Self {
        self.is_simulation = true;
        self
    }

    #[must_use]
    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    #[must_use]
    pub fn connection_id(&self) -> Option<&str> {
        self.connection_id.as_deref()
    }

    #[must_use]
    pub const fn is_simulation(&self) -> bool {
        self.is_simulation
    }

    /// Let the transport start the caller's next call without waiting for
    /// this one.
    pub fn unblock(&self) {
        self.unblocked.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn is_unblocked(&self) -> bool {
        self.unblocked.load(Ordering::Acquire)
    }
}

///
/// FeedContext
///
/// Execution context of one feed subscription.
///

#[derive(Debug, Default)]
pub struct FeedContext {
    user_id: Option<String>,
    connection_id: Option<String>,
    ready: AtomicBool,
    unblocked: AtomicBool,
}

impl FeedContext {
    #[must_use]
    pub fn new(user_id: Option<&str>, connection_id: Option<&str>) -> Self {
        Self {
            user_id: user_id.map(ToString::to_string),
            connection_id: connection_id.map(ToString::to_string),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    #[must_use]
    pub fn connection_id(&self) -> Option<&str> {
        self.connection_id.as_deref()
    }

    /// Mark the initial result set as delivered.
    pub fn ready(&self) {
        self.ready.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    pub fn unblock(&self) {
        self.unblocked.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn is_unblocked(&self) -> bool {
        self.unblocked.load(Ordering::Acquire)
    }
}

/// Handler invoked once per remote procedure call.
pub type MethodHandler = Arc<dyn Fn(&CallContext, Vec<Value>) -> Result<Value, Error> + Send + Sync>;

/// Handler invoked once per feed subscription; returns the live cursor.
pub type FeedHandler = Arc<dyn Fn(&FeedContext, Vec<Value>) -> Result<Cursor, Error> + Send + Sync>;

///
/// Transport
///
/// Remote-procedure runtime the synthesizers register into.
///

pub trait Transport: Send + Sync {
    /// True in contexts (browser, pure client) where server-only
    /// procedures and feeds are not registered.
    fn is_pure_client(&self) -> bool;

    fn register_method(&self, name: &str, handler: MethodHandler) -> Result<(), TransportError>;

    fn register_feed(&self, name: &str, handler: FeedHandler) -> Result<(), TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unblock_is_visible_through_shared_reference() {
        let ctx = CallContext::new(Some("u1"), Some("c1"));
        assert!(!ctx.is_unblocked());
        ctx.unblock();
        assert!(ctx.is_unblocked());
        assert_eq!(ctx.user_id(), Some("u1"));
    }

    #[test]
    fn simulation_flag_is_opt_in() {
        assert!(!CallContext::default().is_simulation());
        assert!(CallContext::default().simulation().is_simulation());
    }

    #[test]
    fn rate_limited_maps_to_call_time_kind() {
        let err: Error = TransportError::RateLimited {
            kind: EndpointKind::Method,
            name: "m".into(),
        }
        .into();

        assert_eq!(err.kind, ErrorKind::RateLimited);
        assert!(!err.is_setup());
        assert_eq!(err.message, "rate limit exceeded for method 'm'");
    }
}
