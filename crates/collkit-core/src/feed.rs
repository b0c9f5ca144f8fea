//! Feed synthesis.
//!
//! A feed is a named, authorization-gated live view over one collection.
//! Each record type keeps its own [`FeedRegistry`]; the first plain feed
//! and the first by-id feed become its defaults.

use crate::{
    backend::{
        Collection, EndpointKind, FeedContext, FeedHandler, FindOptions, RateLimit,
        RateLimitRule, Selector,
    },
    error::{Error, ErrorKind, ErrorOrigin},
    obs::sink::{MetricsEvent, record},
    procedure::AuthCheck,
    tools::CollectionTools,
};
use collkit_schema::value::Value;
use std::{
    collections::BTreeMap,
    fmt,
    sync::{Arc, OnceLock, RwLock},
};
use thiserror::Error as ThisError;
use tracing::{info, warn};

///
/// FeedError
///

#[derive(Debug, ThisError)]
pub enum FeedError {
    #[error("feed '{0}' already exists")]
    DuplicateFeedName(String),
}

impl From<FeedError> for Error {
    fn from(err: FeedError) -> Self {
        let kind = match &err {
            FeedError::DuplicateFeedName(_) => ErrorKind::DuplicateFeedName,
        };

        Self::new(kind, ErrorOrigin::Feed, err.to_string())
    }
}

///
/// FeedSpec
///

#[derive(Clone, Default)]
pub struct FeedSpec {
    pub selector: Selector,
    pub select_options: FindOptions,

    /// Replaces the record type's global auth for this feed.
    pub alternative_auth: Option<AuthCheck>,

    pub unblock: bool,
    pub rate_limit: Option<RateLimit>,
}

impl FeedSpec {
    #[must_use]
    pub fn new(selector: Selector) -> Self {
        Self {
            selector,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn select_options(mut self, options: FindOptions) -> Self {
        self.select_options = options;
        self
    }

    #[must_use]
    pub fn alternative_auth(mut self, auth: AuthCheck) -> Self {
        self.alternative_auth = Some(auth);
        self
    }

    #[must_use]
    pub const fn unblock(mut self, unblock: bool) -> Self {
        self.unblock = unblock;
        self
    }

    #[must_use]
    pub const fn rate_limit(mut self, limit: RateLimit) -> Self {
        self.rate_limit = Some(limit);
        self
    }
}

impl fmt::Debug for FeedSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeedSpec")
            .field("selector", &self.selector)
            .field("select_options", &self.select_options)
            .field("alternative_auth", &self.alternative_auth.is_some())
            .field("unblock", &self.unblock)
            .field("rate_limit", &self.rate_limit)
            .finish()
    }
}

///
/// FeedByIdSpec
///
/// A feed opened with one non-empty text id, selecting `{id_field: id}`.
///

#[derive(Clone, Default)]
pub struct FeedByIdSpec {
    /// Defaults to the record type's id field.
    pub id_field: Option<String>,
    pub select_options: FindOptions,
    pub alternative_auth: Option<AuthCheck>,
    pub unblock: bool,
    pub rate_limit: Option<RateLimit>,
}

impl FeedByIdSpec {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn id_field(mut self, field: impl Into<String>) -> Self {
        self.id_field = Some(field.into());
        self
    }

    #[must_use]
    pub fn select_options(mut self, options: FindOptions) -> Self {
        self.select_options = options;
        self
    }

    #[must_use]
    pub fn alternative_auth(mut self, auth: AuthCheck) -> Self {
        self.alternative_auth = Some(auth);
        self
    }

    #[must_use]
    pub const fn unblock(mut self, unblock: bool) -> Self {
        self.unblock = unblock;
        self
    }

    #[must_use]
    pub const fn rate_limit(mut self, limit: RateLimit) -> Self {
        self.rate_limit = Some(limit);
        self
    }
}

impl fmt::Debug for FeedByIdSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeedByIdSpec")
            .field("id_field", &self.id_field)
            .field("select_options", &self.select_options)
            .field("alternative_auth", &self.alternative_auth.is_some())
            .field("unblock", &self.unblock)
            .field("rate_limit", &self.rate_limit)
            .finish()
    }
}

///
/// FeedEntry
///
/// What the registry remembers about one feed.
///

#[derive(Clone, Debug, PartialEq)]
pub enum FeedEntry {
    Selector {
        selector: Selector,
        select_options: FindOptions,
        rate_limit: Option<RateLimit>,
    },
    ById {
        id_field: String,
        select_options: FindOptions,
        rate_limit: Option<RateLimit>,
    },
}

///
/// FeedRegistry
///

#[derive(Debug, Default)]
pub struct FeedRegistry {
    feeds: RwLock<BTreeMap<String, FeedEntry>>,
    default_feed: OnceLock<String>,
    default_by_id: OnceLock<String>,
}

impl FeedRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_free(&self, name: &str) -> Result<(), FeedError> {
        if self.contains(name) {
            return Err(FeedError::DuplicateFeedName(name.to_string()));
        }

        Ok(())
    }

    fn insert(&self, name: &str, entry: FeedEntry) -> Result<(), FeedError> {
        let mut feeds = self
            .feeds
            .write()
            .expect("feed registry lock should not be poisoned");
        if feeds.contains_key(name) {
            return Err(FeedError::DuplicateFeedName(name.to_string()));
        }

        let slot = match entry {
            FeedEntry::Selector { .. } => &self.default_feed,
            FeedEntry::ById { .. } => &self.default_by_id,
        };
        let _ = slot.set(name.to_string());

        feeds.insert(name.to_string(), entry);
        Ok(())
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.feeds
            .read()
            .expect("feed registry lock should not be poisoned")
            .contains_key(name)
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<FeedEntry> {
        self.feeds
            .read()
            .expect("feed registry lock should not be poisoned")
            .get(name)
            .cloned()
    }

    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.feeds
            .read()
            .expect("feed registry lock should not be poisoned")
            .keys()
            .cloned()
            .collect()
    }

    /// First plain feed registered.
    #[must_use]
    pub fn default_feed(&self) -> Option<&str> {
        self.default_feed.get().map(String::as_str)
    }

    /// First by-id feed registered.
    #[must_use]
    pub fn default_by_id(&self) -> Option<&str> {
        self.default_by_id.get().map(String::as_str)
    }
}

///
/// FeedOwner
///
/// What a feed needs from the record type it belongs to.
///

pub(crate) struct FeedOwner<'a> {
    pub tools: &'a CollectionTools,
    pub collection: &'a Collection,
    pub registry: &'a FeedRegistry,
    pub global_auth: &'a AuthCheck,
    pub id_field: &'a str,
    pub default_limit: RateLimit,
}

/// Register a feed over `spec.selector`.
pub(crate) fn make_feed(owner: &FeedOwner<'_>, name: &str, spec: FeedSpec) -> Result<(), Error> {
    owner.registry.ensure_free(name)?;
    let entry = FeedEntry::Selector {
        selector: spec.selector.clone(),
        select_options: spec.select_options.clone(),
        rate_limit: spec.rate_limit,
    };

    let auth = spec
        .alternative_auth
        .unwrap_or_else(|| owner.global_auth.clone());
    let collection = owner.collection.clone();
    let feed_name = name.to_string();
    let (selector, options, unblock) = (spec.selector, spec.select_options, spec.unblock);

    let handler: FeedHandler = Arc::new(move |ctx: &FeedContext, _args: Vec<Value>| {
        if unblock {
            ctx.unblock();
        }
        if !auth(ctx.user_id(), None) {
            return Err(deny(ctx, &feed_name));
        }
        record(MetricsEvent::FeedOpened { name: &feed_name });

        Ok(collection.find(selector.clone(), options.clone()))
    });

    register(owner, name, entry, handler, spec.rate_limit)
}

/// Register a feed opened with a single id argument.
pub(crate) fn make_feed_by_id(
    owner: &FeedOwner<'_>,
    name: &str,
    spec: FeedByIdSpec,
) -> Result<(), Error> {
    let id_field = spec
        .id_field
        .unwrap_or_else(|| owner.id_field.to_string());
    owner.registry.ensure_free(name)?;
    let entry = FeedEntry::ById {
        id_field: id_field.clone(),
        select_options: spec.select_options.clone(),
        rate_limit: spec.rate_limit,
    };

    let auth = spec
        .alternative_auth
        .unwrap_or_else(|| owner.global_auth.clone());
    let collection = owner.collection.clone();
    let feed_name = name.to_string();
    let (options, unblock) = (spec.select_options, spec.unblock);

    let handler: FeedHandler = Arc::new(move |ctx: &FeedContext, args: Vec<Value>| {
        let id = match args.as_slice() {
            [Value::Text(id)] if !id.is_empty() => id.clone(),
            _ => {
                return Err(Error::new(
                    ErrorKind::InvalidArgument,
                    ErrorOrigin::Feed,
                    format!("feed '{feed_name}' expects one non-empty text id"),
                ));
            }
        };
        if unblock {
            ctx.unblock();
        }
        if !auth(ctx.user_id(), Some(&Value::Text(id.clone()))) {
            return Err(deny(ctx, &feed_name));
        }
        record(MetricsEvent::FeedOpened { name: &feed_name });

        Ok(collection.find(Selector::by_id(&id_field, id), options.clone()))
    });

    register(owner, name, entry, handler, spec.rate_limit)
}

// the subscription completes empty before the failure is reported
fn deny(ctx: &FeedContext, name: &str) -> Error {
    ctx.ready();
    record(MetricsEvent::FeedDenied { name });
    warn!(feed = %name, user = ?ctx.user_id(), "feed subscription denied");

    Error::unauthorized(ErrorOrigin::Feed, format!("unauthorized: {name}"))
}

// the feed table and defaults only record feeds the transport accepted
fn register(
    owner: &FeedOwner<'_>,
    name: &str,
    entry: FeedEntry,
    handler: FeedHandler,
    rate_limit: Option<RateLimit>,
) -> Result<(), Error> {
    let transport = owner.tools.transport();
    let registered = !transport.is_pure_client();

    if registered {
        transport.register_feed(name, handler)?;
    }
    owner.registry.insert(name, entry)?;

    if registered {

        let limit = rate_limit
            .filter(RateLimit::is_usable)
            .unwrap_or(owner.default_limit);
        if limit.is_usable() {
            owner
                .tools
                .rate_limiter()
                .add_rule(RateLimitRule::new(EndpointKind::Feed, name, limit));
        }
    }

    record(MetricsEvent::FeedRegistered { name });
    info!(feed = %name, collection = %owner.collection.name(), registered, "feed created");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{
        Database,
        memory::{MemoryDatabase, MemoryRateLimiter, MemoryTransport},
    };
    use collkit_schema::value::Document;

    struct Fixture {
        tools: CollectionTools,
        transport: Arc<MemoryTransport>,
        limiter: Arc<MemoryRateLimiter>,
        collection: Collection,
        registry: FeedRegistry,
        auth: AuthCheck,
    }

    impl Fixture {
        fn new(transport: MemoryTransport) -> Self {
            let db = Arc::new(MemoryDatabase::new());
            let limiter = Arc::new(MemoryRateLimiter::new());
            let transport = Arc::new(transport);
            let collection = db.collection("things");
            let tools = CollectionTools::new(db, transport.clone(), limiter.clone());

            Self {
                tools,
                transport,
                limiter,
                collection,
                registry: FeedRegistry::new(),
                auth: Arc::new(|user, _| user.is_some()),
            }
        }

        fn owner(&self) -> FeedOwner<'_> {
            FeedOwner {
                tools: &self.tools,
                collection: &self.collection,
                registry: &self.registry,
                global_auth: &self.auth,
                id_field: "_id",
                default_limit: RateLimit::per_millis(10, 1000),
            }
        }

        fn insert(&self, id: &str, kind: &str) {
            let mut doc = Document::new();
            doc.insert("_id".into(), Value::from(id));
            doc.insert("kind".into(), Value::from(kind));
            self.collection.insert(doc).expect("insert should succeed");
        }
    }

    #[test]
    fn authorized_feed_is_live() {
        let fx = Fixture::new(MemoryTransport::new());
        make_feed(
            &fx.owner(),
            "things/a",
            FeedSpec::new(Selector::all().eq("kind", "a")),
        )
        .expect("feed should register");

        fx.insert("1", "a");
        fx.insert("2", "b");

        let ctx = FeedContext::new(Some("u1"), None);
        let cursor = fx
            .transport
            .subscribe("things/a", &ctx, Vec::new())
            .expect("authorized subscription should open");
        assert!(ctx.is_ready());
        assert_eq!(cursor.count().expect("count should succeed"), 1);

        // later inserts show through the same cursor
        fx.insert("3", "a");
        assert_eq!(cursor.count().expect("count should succeed"), 2);
    }

    #[test]
    fn unauthorized_feed_is_ready_then_failed() {
        let fx = Fixture::new(MemoryTransport::new());
        make_feed(&fx.owner(), "things/all", FeedSpec::default()).expect("feed should register");

        let ctx = FeedContext::new(None, None);
        let err = fx
            .transport
            .subscribe("things/all", &ctx, Vec::new())
            .expect_err("anonymous subscription should be denied");
        assert_eq!(err.kind, ErrorKind::Unauthorized);
        assert!(ctx.is_ready(), "denied feed should still be marked ready");
    }

    #[test]
    fn alternative_auth_replaces_global_auth() {
        let fx = Fixture::new(MemoryTransport::new());
        make_feed(
            &fx.owner(),
            "things/public",
            FeedSpec::default().alternative_auth(Arc::new(|_, _| true)),
        )
        .expect("feed should register");

        assert!(
            fx.transport
                .subscribe("things/public", &FeedContext::default(), Vec::new())
                .is_ok()
        );
    }

    #[test]
    fn by_id_feed_checks_its_argument() {
        let fx = Fixture::new(MemoryTransport::new());
        let seen = Arc::new(RwLock::new(None));
        let captured = seen.clone();
        let auth: AuthCheck = Arc::new(move |_, id| {
            *captured.write().expect("capture lock should not be poisoned") = id.cloned();
            true
        });
        make_feed_by_id(
            &fx.owner(),
            "things/by-id",
            FeedByIdSpec::new().alternative_auth(auth),
        )
        .expect("feed should register");
        fx.insert("1", "a");

        let ctx = FeedContext::default();
        let err = fx
            .transport
            .subscribe("things/by-id", &ctx, vec![Value::from("")])
            .expect_err("empty id should be rejected");
        assert_eq!(err.kind, ErrorKind::InvalidArgument);

        let cursor = fx
            .transport
            .subscribe("things/by-id", &ctx, vec![Value::from("1")])
            .expect("by-id subscription should open");
        assert_eq!(cursor.count().expect("count should succeed"), 1);
        assert_eq!(
            *seen.read().expect("capture lock should not be poisoned"),
            Some(Value::from("1"))
        );
    }

    #[test]
    fn duplicate_feed_names_and_defaults() {
        let fx = Fixture::new(MemoryTransport::new());
        let owner = fx.owner();
        make_feed(&owner, "first", FeedSpec::default()).expect("first feed should register");
        make_feed(&owner, "second", FeedSpec::default()).expect("second feed should register");
        make_feed_by_id(&owner, "by-id", FeedByIdSpec::new()).expect("by-id feed should register");

        let err = make_feed(&owner, "first", FeedSpec::default())
            .expect_err("duplicate feed should fail");
        assert_eq!(err.kind, ErrorKind::DuplicateFeedName);

        let err = make_feed_by_id(&owner, "second", FeedByIdSpec::new())
            .expect_err("by-id feed may not reuse a name either");
        assert_eq!(err.kind, ErrorKind::DuplicateFeedName);

        assert_eq!(fx.registry.default_feed(), Some("first"));
        assert_eq!(fx.registry.default_by_id(), Some("by-id"));
        assert_eq!(fx.registry.names(), vec!["by-id", "first", "second"]);
    }

    #[test]
    fn transport_rejection_leaves_no_feed_behind() {
        let fx = Fixture::new(MemoryTransport::new());
        make_feed(&fx.owner(), "all", FeedSpec::default()).expect("first owner should register");

        let other = FeedRegistry::new();
        let owner = FeedOwner {
            registry: &other,
            ..fx.owner()
        };
        let err = make_feed(&owner, "all", FeedSpec::default())
            .expect_err("transport should refuse a taken name");
        assert_eq!(err.kind, ErrorKind::Transport);
        assert_eq!(other.default_feed(), None);
        assert!(other.names().is_empty());

        make_feed_by_id(&owner, "all", FeedByIdSpec::new())
            .expect_err("by-id feed should be refused too");
        assert_eq!(other.default_by_id(), None);

        make_feed(&owner, "mine", FeedSpec::default()).expect("free name should register");
        assert_eq!(other.default_feed(), Some("mine"));
    }

    #[test]
    fn pure_clients_track_feeds_without_registering() {
        let fx = Fixture::new(MemoryTransport::pure_client());
        make_feed(&fx.owner(), "client", FeedSpec::default()).expect("feed should be tracked");

        assert!(fx.registry.contains("client"));
        assert_eq!(fx.registry.default_feed(), Some("client"));
        assert!(!fx.transport.has_feed("client"));
        assert!(fx.limiter.rule(EndpointKind::Feed, "client").is_none());
    }

    #[test]
    fn feed_rate_limits() {
        let fx = Fixture::new(MemoryTransport::new());
        make_feed(&fx.owner(), "defaulted", FeedSpec::default()).expect("feed should register");
        make_feed(
            &fx.owner(),
            "explicit",
            FeedSpec::default().rate_limit(RateLimit::per_millis(2, 50)),
        )
        .expect("feed should register");

        let limit = |name| fx.limiter.rule(EndpointKind::Feed, name).map(|r| r.limit);
        assert_eq!(limit("defaulted"), Some(RateLimit::per_millis(10, 1000)));
        assert_eq!(limit("explicit"), Some(RateLimit::per_millis(2, 50)));
    }
}
