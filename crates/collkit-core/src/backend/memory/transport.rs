use crate::{
    backend::{
        memory::MemoryRateLimiter,
        store::Cursor,
        transport::{
            CallContext, EndpointKind, FeedContext, FeedHandler, MethodHandler, Transport,
            TransportError,
        },
    },
    error::Error,
};
use collkit_schema::value::Value;
use std::{
    collections::BTreeMap,
    fmt,
    sync::{Arc, RwLock},
};

///
/// MemoryTransport
///
/// In-process dispatcher: procedures are run with [`call`](Self::call),
/// feeds opened with [`subscribe`](Self::subscribe). Rate-limit rules are
/// enforced through the attached [`MemoryRateLimiter`], keyed by the
/// caller's connection id.
///

pub struct MemoryTransport {
    pure_client: bool,
    methods: RwLock<BTreeMap<String, MethodHandler>>,
    feeds: RwLock<BTreeMap<String, FeedHandler>>,
    limiter: Option<Arc<MemoryRateLimiter>>,
}

impl MemoryTransport {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            pure_client: false,
            methods: RwLock::new(BTreeMap::new()),
            feeds: RwLock::new(BTreeMap::new()),
            limiter: None,
        }
    }

    /// A transport standing in for a browser-side runtime.
    #[must_use]
    pub const fn pure_client() -> Self {
        let mut transport = Self::new();
        transport.pure_client = true;
        transport
    }

    #[must_use]
    pub fn with_rate_limiter(mut self, limiter: Arc<MemoryRateLimiter>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    #[must_use]
    pub fn method_names(&self) -> Vec<String> {
        self.methods
            .read()
            .expect("method table lock should not be poisoned")
            .keys()
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn feed_names(&self) -> Vec<String> {
        self.feeds
            .read()
            .expect("feed table lock should not be poisoned")
            .keys()
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn has_method(&self, name: &str) -> bool {
        self.methods
            .read()
            .expect("method table lock should not be poisoned")
            .contains_key(name)
    }

    #[must_use]
    pub fn has_feed(&self, name: &str) -> bool {
        self.feeds
            .read()
            .expect("feed table lock should not be poisoned")
            .contains_key(name)
    }

    /// Invoke a registered procedure.
    pub fn call(&self, name: &str, ctx: &CallContext, args: Vec<Value>) -> Result<Value, Error> {
        let handler = self
            .methods
            .read()
            .expect("method table lock should not be poisoned")
            .get(name)
            .cloned()
            .ok_or_else(|| not_registered(EndpointKind::Method, name))?;

        self.throttle(EndpointKind::Method, name, ctx.connection_id())?;

        handler(ctx, args)
    }

    /// Open a registered feed. On success the context is marked ready and
    /// the live cursor returned.
    pub fn subscribe(&self, name: &str, ctx: &FeedContext, args: Vec<Value>) -> Result<Cursor, Error> {
        let handler = self
            .feeds
            .read()
            .expect("feed table lock should not be poisoned")
            .get(name)
            .cloned()
            .ok_or_else(|| not_registered(EndpointKind::Feed, name))?;

        self.throttle(EndpointKind::Feed, name, ctx.connection_id())?;

        let cursor = handler(ctx, args)?;
        ctx.ready();

        Ok(cursor)
    }

    fn throttle(&self, kind: EndpointKind, name: &str, connection_id: Option<&str>) -> Result<(), Error> {
        let Some(limiter) = &self.limiter else {
            return Ok(());
        };

        if limiter.check_and_record(kind, name, connection_id.unwrap_or_default()) {
            Ok(())
        } else {
            Err(TransportError::RateLimited {
                kind,
                name: name.to_string(),
            }
            .into())
        }
    }
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MemoryTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryTransport")
            .field("pure_client", &self.pure_client)
            .field("methods", &self.method_names())
            .field("feeds", &self.feed_names())
            .finish_non_exhaustive()
    }
}

impl Transport for MemoryTransport {
    fn is_pure_client(&self) -> bool {
        self.pure_client
    }

    fn register_method(&self, name: &str, handler: MethodHandler) -> Result<(), TransportError> {
        let mut methods = self
            .methods
            .write()
            .expect("method table lock should not be poisoned");
        if methods.contains_key(name) {
            return Err(TransportError::AlreadyRegistered {
                kind: EndpointKind::Method,
                name: name.to_string(),
            });
        }
        methods.insert(name.to_string(), handler);

        Ok(())
    }

    fn register_feed(&self, name: &str, handler: FeedHandler) -> Result<(), TransportError> {
        let mut feeds = self
            .feeds
            .write()
            .expect("feed table lock should not be poisoned");
        if feeds.contains_key(name) {
            return Err(TransportError::AlreadyRegistered {
                kind: EndpointKind::Feed,
                name: name.to_string(),
            });
        }
        feeds.insert(name.to_string(), handler);

        Ok(())
    }
}

fn not_registered(kind: EndpointKind, name: &str) -> Error {
    TransportError::NotRegistered {
        kind,
        name: name.to_string(),
    }
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        backend::{RateLimit, RateLimitRule, RateLimiter},
        error::ErrorKind,
    };

    fn echo() -> MethodHandler {
        Arc::new(|_, args| Ok(Value::List(args)))
    }

    #[test]
    fn call_dispatches_to_registered_handler() {
        let transport = MemoryTransport::new();
        transport
            .register_method("echo", echo())
            .expect("first registration should succeed");

        let out = transport
            .call("echo", &CallContext::default(), vec![Value::Int(1)])
            .expect("call should succeed");
        assert_eq!(out, Value::List(vec![Value::Int(1)]));
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let transport = MemoryTransport::new();
        transport
            .register_method("echo", echo())
            .expect("first registration should succeed");

        assert!(matches!(
            transport.register_method("echo", echo()),
            Err(TransportError::AlreadyRegistered { .. })
        ));
    }

    #[test]
    fn unknown_method_is_not_found() {
        let err = MemoryTransport::new()
            .call("nope", &CallContext::default(), Vec::new())
            .expect_err("unregistered call should fail");
        assert_eq!(err.kind, ErrorKind::NotFound);
    }

    #[test]
    fn calls_are_rate_limited_per_connection() {
        let limiter = Arc::new(MemoryRateLimiter::new());
        limiter.add_rule(RateLimitRule::new(
            EndpointKind::Method,
            "echo",
            RateLimit::per_millis(1, 60_000),
        ));
        let transport = MemoryTransport::new().with_rate_limiter(limiter);
        transport
            .register_method("echo", echo())
            .expect("registration should succeed");

        let ctx = CallContext::new(None, Some("conn"));
        assert!(transport.call("echo", &ctx, Vec::new()).is_ok());

        let err = transport
            .call("echo", &ctx, Vec::new())
            .expect_err("second call should be throttled");
        assert_eq!(err.kind, ErrorKind::RateLimited);
    }
}
