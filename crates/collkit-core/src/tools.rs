use crate::{
    backend::{Database, RateLimit, RateLimiter, Transport},
    config::ToolsConfig,
    error::Error,
    procedure::{self, MethodNameRegistry, MethodSpec},
    record::{RecordType, RecordTypeOptions},
};
use std::{fmt, sync::Arc};

///
/// CollectionTools
///
/// Wires record types for one process: owns the procedure-name registry
/// shared by every record type it builds, and hands each of them the
/// database, transport and rate limiter. Clones share the registry.
///

#[derive(Clone)]
pub struct CollectionTools {
    database: Arc<dyn Database>,
    transport: Arc<dyn Transport>,
    rate_limiter: Arc<dyn RateLimiter>,
    registry: Arc<MethodNameRegistry>,
    config: Arc<ToolsConfig>,
    simulate_nothing: bool,
}

impl CollectionTools {
    #[must_use]
    pub fn new(
        database: Arc<dyn Database>,
        transport: Arc<dyn Transport>,
        rate_limiter: Arc<dyn RateLimiter>,
    ) -> Self {
        Self {
            database,
            transport,
            rate_limiter,
            registry: Arc::new(MethodNameRegistry::new()),
            config: Arc::new(ToolsConfig::default()),
            simulate_nothing: false,
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: ToolsConfig) -> Self {
        self.config = Arc::new(config);
        self
    }

    /// Procedures created after this call return `Null` without running
    /// their effect when invoked as a client-side simulation.
    #[must_use]
    pub const fn simulate_nothing(mut self, simulate_nothing: bool) -> Self {
        self.simulate_nothing = simulate_nothing;
        self
    }

    #[must_use]
    pub const fn simulates_nothing(&self) -> bool {
        self.simulate_nothing
    }

    #[must_use]
    pub fn config(&self) -> &ToolsConfig {
        &self.config
    }

    #[must_use]
    pub fn registry(&self) -> &MethodNameRegistry {
        &self.registry
    }

    #[must_use]
    pub fn database(&self) -> &Arc<dyn Database> {
        &self.database
    }

    #[must_use]
    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    #[must_use]
    pub fn rate_limiter(&self) -> &Arc<dyn RateLimiter> {
        &self.rate_limiter
    }

    /// Every procedure name claimed so far, sorted.
    #[must_use]
    pub fn method_names(&self) -> Vec<String> {
        self.registry.names()
    }

    /// Build a record type bound to `options.collection_name`.
    pub fn build(&self, options: RecordTypeOptions) -> Result<Arc<RecordType>, Error> {
        RecordType::build(self, options).map(Arc::new)
    }

    /// Create a free-standing procedure. Without an explicit rate limit the
    /// configured defaults apply.
    pub fn create_method(&self, spec: MethodSpec) -> Result<String, Error> {
        procedure::create_method(self, spec, self.default_rate_limit())
    }

    #[must_use]
    pub fn default_rate_limit(&self) -> RateLimit {
        RateLimit::per_millis(
            self.config.default_rate_limit,
            self.config.default_rate_limit_interval_ms,
        )
    }
}

impl fmt::Debug for CollectionTools {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectionTools")
            .field("config", &self.config)
            .field("methods", &self.registry.len())
            .field("pure_client", &self.transport.is_pure_client())
            .field("simulate_nothing", &self.simulate_nothing)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        backend::{
            CallContext,
            memory::{MemoryDatabase, MemoryRateLimiter, MemoryTransport},
        },
        error::ErrorKind,
    };
    use collkit_schema::value::Value;

    fn tools(transport: Arc<MemoryTransport>) -> CollectionTools {
        CollectionTools::new(
            Arc::new(MemoryDatabase::new()),
            transport,
            Arc::new(MemoryRateLimiter::new()),
        )
    }

    #[test]
    fn clones_share_the_name_registry() {
        let a = tools(Arc::new(MemoryTransport::new()));
        let b = a.clone();

        a.create_method(MethodSpec::new("shared", |_, _| Ok(Value::Null)))
            .expect("first registration should succeed");
        let err = b
            .create_method(MethodSpec::new("shared", |_, _| Ok(Value::Null)))
            .expect_err("clone should see the claimed name");
        assert_eq!(err.kind, ErrorKind::DuplicateMethodName);
    }

    #[test]
    fn config_drives_default_rate_limit() {
        let config = ToolsConfig {
            default_rate_limit: 3,
            default_rate_limit_interval_ms: 250,
            ..ToolsConfig::default()
        };
        let tools = tools(Arc::new(MemoryTransport::new())).with_config(config);

        assert_eq!(tools.default_rate_limit(), RateLimit::per_millis(3, 250));
    }

    #[test]
    fn created_methods_are_callable() {
        let transport = Arc::new(MemoryTransport::new());
        let tools = tools(transport.clone());
        let name = tools
            .create_method(MethodSpec::new("ping", |_, _| Ok(Value::from("pong"))))
            .expect("registration should succeed");

        assert_eq!(name, "ping");
        assert_eq!(tools.method_names(), vec!["ping"]);
        assert_eq!(
            transport
                .call("ping", &CallContext::default(), Vec::new())
                .expect("call should succeed"),
            Value::from("pong")
        );
    }
}
