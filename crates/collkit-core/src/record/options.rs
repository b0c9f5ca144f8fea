use crate::{
    backend::Collection,
    error::Error,
    procedure::AuthCheck,
    record::{Record, RecordModel, RecordType},
};
use collkit_schema::{
    node::Schema,
    value::{Document, Value},
};
use std::{collections::BTreeMap, fmt, sync::Arc, time::Duration};

/// Maps a raw store document to the data a [`Record`] holds.
pub type Transform = Arc<dyn Fn(Document) -> Document + Send + Sync>;

/// Derives the global auth check once the model and collection exist.
pub type AuthFactory = Arc<dyn Fn(&RecordModel, &Collection) -> AuthCheck + Send + Sync>;

pub type InstanceMethod = Arc<dyn Fn(&Record, &[Value]) -> Result<Value, Error> + Send + Sync>;

pub type TypeMethod = Arc<dyn Fn(&RecordType, &[Value]) -> Result<Value, Error> + Send + Sync>;

///
/// RecordExtensions
///
/// Named operations added to every record instance or to the record type.
///

#[derive(Clone, Default)]
pub struct RecordExtensions {
    pub instance: BTreeMap<String, InstanceMethod>,
    pub type_level: BTreeMap<String, TypeMethod>,
}

impl RecordExtensions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn instance_method(
        mut self,
        name: impl Into<String>,
        method: impl Fn(&Record, &[Value]) -> Result<Value, Error> + Send + Sync + 'static,
    ) -> Self {
        self.instance.insert(name.into(), Arc::new(method));
        self
    }

    #[must_use]
    pub fn type_method(
        mut self,
        name: impl Into<String>,
        method: impl Fn(&RecordType, &[Value]) -> Result<Value, Error> + Send + Sync + 'static,
    ) -> Self {
        self.type_level.insert(name.into(), Arc::new(method));
        self
    }
}

impl fmt::Debug for RecordExtensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordExtensions")
            .field("instance", &self.instance.keys().collect::<Vec<_>>())
            .field("type_level", &self.type_level.keys().collect::<Vec<_>>())
            .finish()
    }
}

///
/// RecordTypeOptions
///
/// Everything left as `None` falls back to the orchestrator's
/// configuration.
///

#[derive(Clone)]
pub struct RecordTypeOptions {
    pub collection_name: String,

    /// Display name; defaults to the collection name.
    pub constructor_name: Option<String>,

    pub schema: Schema,
    pub transform: Option<Transform>,
    pub global_auth: Option<AuthCheck>,

    /// Takes precedence over `global_auth`.
    pub global_auth_factory: Option<AuthFactory>,

    pub restrictive_allow_deny: Option<bool>,

    /// Defaults to `{root}{collection}/`, where a leading `ns_` segment of
    /// the collection name is dropped.
    pub method_prefix: Option<String>,

    pub default_rate_limit: Option<u32>,
    pub default_rate_limit_interval: Option<Duration>,
    pub id_field: Option<String>,
    pub extensions: RecordExtensions,
}

impl RecordTypeOptions {
    pub fn new(collection_name: impl Into<String>, schema: Schema) -> Self {
        Self {
            collection_name: collection_name.into(),
            constructor_name: None,
            schema,
            transform: None,
            global_auth: None,
            global_auth_factory: None,
            restrictive_allow_deny: None,
            method_prefix: None,
            default_rate_limit: None,
            default_rate_limit_interval: None,
            id_field: None,
            extensions: RecordExtensions::default(),
        }
    }

    #[must_use]
    pub fn constructor_name(mut self, name: impl Into<String>) -> Self {
        self.constructor_name = Some(name.into());
        self
    }

    #[must_use]
    pub fn transform(
        mut self,
        transform: impl Fn(Document) -> Document + Send + Sync + 'static,
    ) -> Self {
        self.transform = Some(Arc::new(transform));
        self
    }

    #[must_use]
    pub fn global_auth(mut self, auth: AuthCheck) -> Self {
        self.global_auth = Some(auth);
        self
    }

    #[must_use]
    pub fn global_auth_factory(mut self, factory: AuthFactory) -> Self {
        self.global_auth_factory = Some(factory);
        self
    }

    #[must_use]
    pub const fn restrictive_allow_deny(mut self, restrictive: bool) -> Self {
        self.restrictive_allow_deny = Some(restrictive);
        self
    }

    #[must_use]
    pub fn method_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.method_prefix = Some(prefix.into());
        self
    }

    #[must_use]
    pub const fn default_rate_limit(mut self, max_requests: u32, interval: Duration) -> Self {
        self.default_rate_limit = Some(max_requests);
        self.default_rate_limit_interval = Some(interval);
        self
    }

    #[must_use]
    pub fn id_field(mut self, field: impl Into<String>) -> Self {
        self.id_field = Some(field.into());
        self
    }

    #[must_use]
    pub fn extensions(mut self, extensions: RecordExtensions) -> Self {
        self.extensions = extensions;
        self
    }
}

impl fmt::Debug for RecordTypeOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordTypeOptions")
            .field("collection_name", &self.collection_name)
            .field("constructor_name", &self.constructor_name)
            .field("fields", &self.schema.len())
            .field("restrictive_allow_deny", &self.restrictive_allow_deny)
            .field("method_prefix", &self.method_prefix)
            .field("default_rate_limit", &self.default_rate_limit)
            .field("default_rate_limit_interval", &self.default_rate_limit_interval)
            .field("id_field", &self.id_field)
            .field("extensions", &self.extensions)
            .finish_non_exhaustive()
    }
}

/// Method prefix derived from a collection name: `app_things` becomes
/// `{root}things/`.
#[must_use]
pub fn derived_method_prefix(root: &str, collection_name: &str) -> String {
    let name = collection_name
        .split_once('_')
        .map_or(collection_name, |(_, rest)| rest);

    format!("{root}{name}/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_prefix_drops_the_namespace_segment() {
        assert_eq!(
            derived_method_prefix("collections/", "app_things"),
            "collections/things/"
        );
        assert_eq!(
            derived_method_prefix("collections/", "a_b_c"),
            "collections/b_c/"
        );
        assert_eq!(derived_method_prefix("rpc/", "things"), "rpc/things/");
    }

    #[test]
    fn extensions_are_keyed_by_name() {
        let ext = RecordExtensions::new()
            .instance_method("describe", |_, _| Ok(Value::Null))
            .type_method("count", |_, _| Ok(Value::Int(0)));

        assert!(ext.instance.contains_key("describe"));
        assert!(ext.type_level.contains_key("count"));
        assert_eq!(
            format!("{ext:?}"),
            "RecordExtensions { instance: [\"describe\"], type_level: [\"count\"] }"
        );
    }
}
