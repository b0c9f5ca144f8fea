//! Procedure synthesis.
//!
//! A [`MethodSpec`] describes one remote procedure; `create_method` claims
//! its name, wraps the effect in argument validation, authorization and
//! finisher hooks, and registers the result with the transport.

pub mod args;
pub mod registry;

pub use args::{ArgCheck, ArgSchema};
pub use registry::{MethodNameRegistry, RegistryError};

use crate::{
    backend::{CallContext, EndpointKind, MethodHandler, RateLimit, RateLimitRule},
    error::{Error, ErrorOrigin},
    obs::sink::{MetricsEvent, record},
    tools::CollectionTools,
};
use collkit_schema::value::Value;
use std::{fmt, sync::Arc};
use tracing::{debug, info, warn};

/// Authorization predicate over `(caller id, first argument)`.
pub type AuthCheck = Arc<dyn Fn(Option<&str>, Option<&Value>) -> bool + Send + Sync>;

/// The procedure body, run after validation and authorization.
pub type Effect = Arc<dyn Fn(&CallContext, &[Value]) -> Result<Value, Error> + Send + Sync>;

/// Post-effect hook.
pub type Finisher = Arc<dyn Fn(FinisherInput<'_>) -> Result<(), Error> + Send + Sync>;

/// Builds the message of an `Unauthorized` failure from
/// `(procedure name, caller id, first argument)`.
pub type UnauthorizedMessage =
    Arc<dyn Fn(&str, Option<&str>, Option<&Value>) -> String + Send + Sync>;

/// An authorization check that admits every caller.
#[must_use]
pub fn allow_all() -> AuthCheck {
    Arc::new(|_, _| true)
}

fn default_unauthorized_message() -> UnauthorizedMessage {
    Arc::new(|name, user_id, id| {
        let id = id.map_or_else(
            || "none".to_string(),
            |v| v.as_text().map_or_else(|| v.to_json().to_string(), ToString::to_string),
        );

        format!(
            "unauthorized for {}: {name} (_id: {id})",
            user_id.unwrap_or("anonymous")
        )
    })
}

///
/// FinisherInput
///

#[derive(Clone, Copy, Debug)]
pub struct FinisherInput<'a> {
    pub context: &'a CallContext,
    pub args: &'a [Value],
    pub result: &'a Value,
}

///
/// MethodSpec
///

#[derive(Clone)]
pub struct MethodSpec {
    pub name: String,
    pub method: Effect,
    pub schema: ArgSchema,

    /// Bundle trailing arguments into one list checked against the last
    /// positional pattern.
    pub rest_args: bool,

    pub auth: AuthCheck,
    pub unauthorized_message: UnauthorizedMessage,
    pub finishers: Vec<Finisher>,

    /// Skip transport registration in pure-client contexts.
    pub server_only: bool,

    pub unblock: bool,

    /// Falls back to the owner's defaults when unset or unusable.
    pub rate_limit: Option<RateLimit>,
}

impl MethodSpec {
    pub fn new(
        name: impl Into<String>,
        method: impl Fn(&CallContext, &[Value]) -> Result<Value, Error> + Send + Sync + 'static,
    ) -> Self {
        Self::from_effect(name, Arc::new(method))
    }

    pub fn from_effect(name: impl Into<String>, method: Effect) -> Self {
        Self {
            name: name.into(),
            method,
            schema: ArgSchema::default(),
            rest_args: false,
            auth: allow_all(),
            unauthorized_message: default_unauthorized_message(),
            finishers: Vec::new(),
            server_only: false,
            unblock: false,
            rate_limit: None,
        }
    }

    #[must_use]
    pub fn schema(mut self, schema: ArgSchema) -> Self {
        self.schema = schema;
        self
    }

    #[must_use]
    pub fn positional(self, checks: impl IntoIterator<Item = ArgCheck>) -> Self {
        self.schema(ArgSchema::Positional(checks.into_iter().collect()))
    }

    #[must_use]
    pub const fn rest_args(mut self) -> Self {
        self.rest_args = true;
        self
    }

    #[must_use]
    pub fn auth(mut self, auth: AuthCheck) -> Self {
        self.auth = auth;
        self
    }

    #[must_use]
    pub fn unauthorized_message(mut self, message: UnauthorizedMessage) -> Self {
        self.unauthorized_message = message;
        self
    }

    #[must_use]
    pub fn finisher(
        mut self,
        finisher: impl Fn(FinisherInput<'_>) -> Result<(), Error> + Send + Sync + 'static,
    ) -> Self {
        self.finishers.push(Arc::new(finisher));
        self
    }

    #[must_use]
    pub fn finishers(mut self, finishers: impl IntoIterator<Item = Finisher>) -> Self {
        self.finishers.extend(finishers);
        self
    }

    #[must_use]
    pub const fn server_only(mut self, server_only: bool) -> Self {
        self.server_only = server_only;
        self
    }

    #[must_use]
    pub const fn unblock(mut self, unblock: bool) -> Self {
        self.unblock = unblock;
        self
    }

    #[must_use]
    pub const fn rate_limit(mut self, limit: Option<RateLimit>) -> Self {
        self.rate_limit = limit;
        self
    }
}

impl fmt::Debug for MethodSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodSpec")
            .field("name", &self.name)
            .field("schema", &self.schema)
            .field("rest_args", &self.rest_args)
            .field("finishers", &self.finishers.len())
            .field("server_only", &self.server_only)
            .field("unblock", &self.unblock)
            .field("rate_limit", &self.rate_limit)
            .finish_non_exhaustive()
    }
}

///
/// Procedure
///
/// A synthesized procedure as run by the transport, once per call.
///

struct Procedure {
    name: String,
    method: Effect,
    schema: ArgSchema,
    rest_args: bool,
    auth: AuthCheck,
    unauthorized_message: UnauthorizedMessage,
    finishers: Vec<Finisher>,
    unblock: bool,
    debug: bool,
    simulate_nothing: bool,
}

impl Procedure {
    fn invoke(&self, ctx: &CallContext, args: Vec<Value>) -> Result<Value, Error> {
        record(MetricsEvent::MethodCall { name: &self.name });

        if self.debug {
            debug!(method = %self.name, user = ?ctx.user_id(), ?args, "procedure called");
        }
        if self.unblock {
            ctx.unblock();
        }

        let args = self
            .schema
            .validate(self.rest_args, args)
            .inspect_err(|_| record(MetricsEvent::MethodFailed { name: &self.name }))?;

        let first = args.first();
        if !(self.auth)(ctx.user_id(), first) {
            record(MetricsEvent::MethodDenied { name: &self.name });
            warn!(method = %self.name, user = ?ctx.user_id(), "procedure call denied");

            return Err(Error::unauthorized(
                ErrorOrigin::Procedure,
                (self.unauthorized_message)(&self.name, ctx.user_id(), first),
            ));
        }

        if self.simulate_nothing && ctx.is_simulation() {
            return Ok(Value::Null);
        }

        let result = (self.method)(ctx, &args)
            .inspect_err(|_| record(MetricsEvent::MethodFailed { name: &self.name }))?;

        // finisher failures never reach the caller
        for finisher in &self.finishers {
            let input = FinisherInput {
                context: ctx,
                args: &args,
                result: &result,
            };
            if let Err(err) = finisher(input) {
                record(MetricsEvent::FinisherFailed { name: &self.name });
                warn!(method = %self.name, error = %err, "finisher failed");
            }
        }

        Ok(result)
    }
}

/// Claim `spec.name`, build the procedure and register it.
///
/// Returns the registered name. The rate-limit rule uses `spec.rate_limit`
/// when usable, else `default_limit`.
pub(crate) fn create_method(
    tools: &CollectionTools,
    spec: MethodSpec,
    default_limit: RateLimit,
) -> Result<String, Error> {
    if spec.rest_args {
        match &spec.schema {
            ArgSchema::Positional(checks) if !checks.is_empty() => {}
            _ => return Err(args::invalid_rest_args_schema()),
        }
    }

    tools.registry().register(&spec.name)?;

    let transport = tools.transport();
    let registered = !(spec.server_only && transport.is_pure_client());

    if registered {
        let limit = spec
            .rate_limit
            .filter(RateLimit::is_usable)
            .unwrap_or(default_limit);

        let procedure = Arc::new(Procedure {
            name: spec.name.clone(),
            method: spec.method,
            schema: spec.schema,
            rest_args: spec.rest_args,
            auth: spec.auth,
            unauthorized_message: spec.unauthorized_message,
            finishers: spec.finishers,
            unblock: spec.unblock,
            debug: tools.config().debug,
            simulate_nothing: tools.simulates_nothing(),
        });
        let handler: MethodHandler =
            Arc::new(move |ctx: &CallContext, args: Vec<Value>| procedure.invoke(ctx, args));

        if let Err(err) = transport.register_method(&spec.name, handler) {
            tools.registry().release(&spec.name);
            return Err(err.into());
        }
        if limit.is_usable() {
            tools
                .rate_limiter()
                .add_rule(RateLimitRule::new(EndpointKind::Method, &spec.name, limit));
        }
    }

    record(MetricsEvent::MethodRegistered { name: &spec.name });
    info!(method = %spec.name, registered, "procedure created");

    Ok(spec.name)
}
