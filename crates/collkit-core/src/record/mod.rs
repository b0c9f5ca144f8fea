//! Record type factory.
//!
//! [`RecordType`] binds one collection to a schema and owns everything
//! registered against it: procedure tables, feed registry and type-level
//! extensions. [`RecordModel`] is the immutable reflection half shared with
//! every [`Record`].

mod instance;
mod methods;
mod model;
mod options;

pub use instance::{Record, ValidationReport};
pub use methods::{
    AddSpec, GeneralUpdaterSpec, GenericUpdatersSpec, MethodOptions, MethodTables, RemoveSpec,
    UpdaterSpec, WithMethodOptions,
};
pub use model::{FieldSource, RecordModel, TopLevelFilter};
pub use options::{
    AuthFactory, InstanceMethod, RecordExtensions, RecordTypeOptions, Transform, TypeMethod,
    derived_method_prefix,
};

use crate::{
    backend::{AccessRules, Collection, Cursor, FindOptions, Modifier, RateLimit, Selector},
    error::{Error, ErrorKind, ErrorOrigin},
    feed::{self, FeedByIdSpec, FeedOwner, FeedRegistry, FeedSpec},
    filter::FilterError,
    procedure::{self, AuthCheck},
    tools::CollectionTools,
};
use collkit_schema::{
    node::{FieldDescriptor, Schema},
    tree::{TypeNode, TypeTree},
    value::{Document, Value},
};
use convert_case::{Case, Casing};
use std::{
    collections::BTreeMap,
    fmt,
    sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard},
};
use thiserror::Error as ThisError;
use tracing::info;

///
/// RecordError
///

#[derive(Debug, ThisError)]
pub enum RecordError {
    #[error("entry '{entry}' already exists (for {method})")]
    DuplicateEntryName { entry: String, method: String },

    #[error("field is not specified")]
    FieldNotSpecified,

    #[error("field '{0}' is not in the schema")]
    FieldNotInSchema(String),

    #[error("invalid field '{0}'")]
    InvalidField(String),

    #[error("collection name must not be empty")]
    MissingCollectionName,

    #[error("'{0}' is not a document or top-level array")]
    NotArrayField(String),
}

impl From<RecordError> for Error {
    fn from(err: RecordError) -> Self {
        let kind = match &err {
            RecordError::DuplicateEntryName { .. } => ErrorKind::DuplicateEntryName,
            RecordError::FieldNotSpecified | RecordError::FieldNotInSchema(_) => {
                ErrorKind::FieldNotSpecified
            }
            RecordError::InvalidField(_) => ErrorKind::InvalidField,
            RecordError::MissingCollectionName => ErrorKind::Config,
            RecordError::NotArrayField(_) => ErrorKind::NotArrayField,
        };

        Self::new(kind, ErrorOrigin::Record, err.to_string())
    }
}

///
/// RecordType
///
/// Built once per entity by [`CollectionTools::build`]; afterwards only
/// grows, as procedures and feeds are registered against it.
///

pub struct RecordType {
    model: Arc<RecordModel>,
    tools: CollectionTools,
    collection: Collection,
    global_auth: AuthCheck,
    method_prefix: String,
    default_limit: RateLimit,
    methods: RwLock<MethodTables>,
    feeds: FeedRegistry,
    type_methods: BTreeMap<String, TypeMethod>,
}

impl RecordType {
    pub(crate) fn build(tools: &CollectionTools, options: RecordTypeOptions) -> Result<Self, Error> {
        let collection_name = options.collection_name;
        if collection_name.is_empty() {
            return Err(RecordError::MissingCollectionName.into());
        }

        let config = tools.config();
        let name = display_name(options.constructor_name.as_deref().unwrap_or(&collection_name));
        let id_field = options.id_field.unwrap_or_else(|| config.id_field.clone());
        let method_prefix = options
            .method_prefix
            .filter(|prefix| !prefix.is_empty())
            .unwrap_or_else(|| derived_method_prefix(&config.method_prefix_root, &collection_name));
        let default_limit = RateLimit::new(
            options.default_rate_limit.unwrap_or(config.default_rate_limit),
            options
                .default_rate_limit_interval
                .unwrap_or_else(|| config.default_rate_limit_interval()),
        );
        let restrictive = options
            .restrictive_allow_deny
            .unwrap_or(config.restrictive_allow_deny);

        let model = Arc::new(RecordModel::new(
            name,
            collection_name.clone(),
            options.schema,
            options.transform,
            id_field,
            options.extensions.instance,
        ));
        let collection = tools.database().collection(&collection_name);

        let global_auth = match (options.global_auth_factory, options.global_auth) {
            (Some(factory), _) => factory(model.as_ref(), &collection),
            (None, Some(auth)) => auth,
            (None, None) => procedure::allow_all(),
        };

        // direct client mutations are refused; only procedures write
        if restrictive {
            collection.allow(AccessRules::constant(false));
            collection.deny(AccessRules::constant(true));
        }

        info!(
            record = %model.name(),
            collection = %collection_name,
            prefix = %method_prefix,
            restrictive,
            "record type built"
        );

        Ok(Self {
            model,
            tools: tools.clone(),
            collection,
            global_auth,
            method_prefix,
            default_limit,
            methods: RwLock::new(MethodTables::default()),
            feeds: FeedRegistry::new(),
            type_methods: options.extensions.type_level,
        })
    }

    ///
    /// ACCESSORS
    ///

    /// Display name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.model.name()
    }

    #[must_use]
    pub fn collection_name(&self) -> &str {
        self.model.collection_name()
    }

    #[must_use]
    pub const fn model(&self) -> &Arc<RecordModel> {
        &self.model
    }

    #[must_use]
    pub fn schema(&self) -> &Schema {
        self.model.schema()
    }

    #[must_use]
    pub fn type_tree(&self) -> &TypeTree {
        self.model.type_tree()
    }

    #[must_use]
    pub const fn collection(&self) -> &Collection {
        &self.collection
    }

    #[must_use]
    pub const fn tools(&self) -> &CollectionTools {
        &self.tools
    }

    #[must_use]
    pub fn method_prefix(&self) -> &str {
        &self.method_prefix
    }

    #[must_use]
    pub const fn default_rate_limit(&self) -> RateLimit {
        self.default_limit
    }

    #[must_use]
    pub const fn global_auth(&self) -> &AuthCheck {
        &self.global_auth
    }

    ///
    /// REGISTRIES
    ///

    /// Entry name to procedure name, for every maker.
    #[must_use]
    pub fn all_methods(&self) -> BTreeMap<String, String> {
        self.tables().all.clone()
    }

    #[must_use]
    pub fn add_methods(&self) -> BTreeMap<String, String> {
        self.tables().add.clone()
    }

    /// Keyed by field.
    #[must_use]
    pub fn update_methods(&self) -> BTreeMap<String, String> {
        self.tables().update.clone()
    }

    /// Keyed by field; whole-document removal sits under `""`.
    #[must_use]
    pub fn remove_methods(&self) -> BTreeMap<String, String> {
        self.tables().remove.clone()
    }

    #[must_use]
    pub const fn feeds(&self) -> &FeedRegistry {
        &self.feeds
    }

    #[must_use]
    pub fn default_feed(&self) -> Option<&str> {
        self.feeds.default_feed()
    }

    #[must_use]
    pub fn default_feed_by_id(&self) -> Option<&str> {
        self.feeds.default_by_id()
    }

    fn tables(&self) -> RwLockReadGuard<'_, MethodTables> {
        self.methods
            .read()
            .expect("method tables lock should not be poisoned")
    }

    fn tables_mut(&self) -> RwLockWriteGuard<'_, MethodTables> {
        self.methods
            .write()
            .expect("method tables lock should not be poisoned")
    }

    ///
    /// REFLECTION
    ///

    #[must_use]
    pub fn descend(&self, prefix: &str) -> Option<&TypeNode> {
        self.model.descend(prefix)
    }

    #[must_use]
    pub fn wildcard_description(&self) -> BTreeMap<String, &FieldDescriptor> {
        self.model.wildcard_description()
    }

    #[must_use]
    pub fn type_info_for(&self, field_spec: &str) -> Option<(&str, &FieldDescriptor)> {
        self.model.type_info_for(field_spec)
    }

    pub fn default_value_object(&self, prefix: &str) -> Result<Document, Error> {
        self.model.default_value_object(prefix)
    }

    pub fn object_with_default_values(&self) -> Result<Record, Error> {
        self.model.object_with_default_values()
    }

    pub fn modified_schema(
        &self,
        overrides: &BTreeMap<String, FieldDescriptor>,
        tag: Option<&str>,
    ) -> Result<Schema, Error> {
        self.model.modified_schema(overrides, tag)
    }

    pub fn filter_with_top_level_schema(
        &self,
        source: &BTreeMap<String, FieldSource>,
        call_functions: bool,
        overrides: &BTreeMap<String, FieldDescriptor>,
        tag: Option<&str>,
    ) -> Result<TopLevelFilter, Error> {
        self.model
            .filter_with_top_level_schema(source, call_functions, overrides, tag)
    }

    pub fn filter(
        &self,
        value: &Value,
        ignore_off_schema: bool,
        prefix: &str,
    ) -> Result<Value, FilterError> {
        self.model.filter(value, ignore_off_schema, prefix)
    }

    /// Wrap a raw document as a record of this type.
    #[must_use]
    pub fn instantiate(&self, doc: Document) -> Record {
        self.model.instantiate(doc)
    }

    ///
    /// STORE
    ///

    #[must_use]
    pub fn find(&self, selector: Selector, options: FindOptions) -> Cursor {
        self.collection.find(selector, options)
    }

    pub fn find_one(&self, selector: &Selector, options: &FindOptions) -> Result<Option<Record>, Error> {
        Ok(self
            .collection
            .find_one(selector, options)?
            .map(|doc| self.instantiate(doc)))
    }

    /// Run the selection once and wrap every document.
    pub fn fetch(&self, selector: Selector, options: FindOptions) -> Result<Vec<Record>, Error> {
        Ok(self
            .find(selector, options)
            .fetch()?
            .into_iter()
            .map(|doc| self.instantiate(doc))
            .collect())
    }

    pub fn insert(&self, doc: Document) -> Result<String, Error> {
        Ok(self.collection.insert(doc)?)
    }

    pub fn update(&self, id: &str, modifier: &Modifier) -> Result<usize, Error> {
        Ok(self.collection.update(id, modifier)?)
    }

    pub fn remove(&self, id: &str) -> Result<usize, Error> {
        Ok(self.collection.remove(id)?)
    }

    /// Dump a selection to the log. Returns the number of documents.
    pub fn log_all(&self, selector: &Selector, options: &FindOptions) -> Result<usize, Error> {
        let docs = self.find(selector.clone(), options.clone()).fetch()?;
        for doc in &docs {
            let id = doc.get(self.model.id_field()).and_then(Value::as_text);
            info!(record = %self.name(), id = ?id, doc = ?doc, "record");
        }

        Ok(docs.len())
    }

    ///
    /// FEEDS
    ///

    pub fn make_publication(&self, name: &str, spec: FeedSpec) -> Result<(), Error> {
        feed::make_feed(&self.feed_owner(), name, spec)
    }

    pub fn make_publication_by_id(&self, name: &str, spec: FeedByIdSpec) -> Result<(), Error> {
        feed::make_feed_by_id(&self.feed_owner(), name, spec)
    }

    fn feed_owner(&self) -> FeedOwner<'_> {
        FeedOwner {
            tools: &self.tools,
            collection: &self.collection,
            registry: &self.feeds,
            global_auth: &self.global_auth,
            id_field: self.model.id_field(),
            default_limit: self.default_limit,
        }
    }

    ///
    /// EXTENSIONS
    ///

    /// Run a named type-level extension.
    pub fn call_type_method(&self, name: &str, args: &[Value]) -> Result<Value, Error> {
        let method = self.type_methods.get(name).ok_or_else(|| {
            Error::not_found(
                ErrorOrigin::Record,
                format!("{} has no type method '{name}'", self.name()),
            )
        })?;

        method(self, args)
    }

    #[must_use]
    pub fn type_method_names(&self) -> Vec<&str> {
        self.type_methods.keys().map(String::as_str).collect()
    }
}

impl fmt::Debug for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordType")
            .field("model", &self.model)
            .field("method_prefix", &self.method_prefix)
            .field("default_limit", &self.default_limit)
            .field("methods", &*self.tables())
            .field("feeds", &self.feeds.names())
            .finish_non_exhaustive()
    }
}

// keeps `_`, letters, and digits past the first character, then PascalCase
fn display_name(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .enumerate()
        .filter(|&(i, c)| c == '_' || c.is_ascii_alphabetic() || (i > 0 && c.is_ascii_digit()))
        .map(|(_, c)| c)
        .collect();

    cleaned.to_case(Case::Pascal)
}
