use crate::error::{Error, ErrorKind, ErrorOrigin};
use collkit_schema::value::{Document, Value, document_path};
use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    sync::Arc,
};
use thiserror::Error as ThisError;

///
/// StoreError
///

#[derive(Debug, ThisError)]
pub enum StoreError {
    #[error("document '{0}' not found")]
    NotFound(String),

    #[error("document id '{0}' already exists")]
    DuplicateId(String),

    #[error("cannot apply modifier at '{path}': {reason}")]
    InvalidModifier { path: String, reason: String },

    #[error("{op} denied on collection '{collection}'")]
    AccessDenied { op: MutationKind, collection: String },
}

impl From<StoreError> for Error {
    fn from(err: StoreError) -> Self {
        let kind = match &err {
            StoreError::NotFound(_) => ErrorKind::NotFound,
            StoreError::AccessDenied { .. } => ErrorKind::Unauthorized,
            StoreError::DuplicateId(_) | StoreError::InvalidModifier { .. } => ErrorKind::Store,
        };

        Self::new(kind, ErrorOrigin::Store, err.to_string())
    }
}

///
/// Selector
///
/// Conjunction of dotted-path equality conditions. The empty selector
/// matches every document.
///

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Selector {
    conditions: BTreeMap<String, Value>,
}

impl Selector {
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn by_id(id_field: &str, id: impl Into<String>) -> Self {
        Self::all().eq(id_field, Value::Text(id.into()))
    }

    #[must_use]
    pub fn eq(mut self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.insert(path.into(), value.into());
        self
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    #[must_use]
    pub fn matches(&self, doc: &Document) -> bool {
        self.conditions
            .iter()
            .all(|(path, want)| document_path(doc, path) == Some(want))
    }
}

///
/// SortDirection
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SortDirection {
    Asc,
    Desc,
}

///
/// FindOptions
///

#[derive(Clone, Debug, Default, PartialEq)]
pub struct FindOptions {
    /// Top-level fields to keep; the id field is always kept.
    pub fields: Option<BTreeSet<String>>,
    pub sort: Vec<(String, SortDirection)>,
    pub skip: usize,
    pub limit: Option<usize>,
}

impl FindOptions {
    #[must_use]
    pub fn fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    #[must_use]
    pub fn sort(mut self, path: impl Into<String>, direction: SortDirection) -> Self {
        self.sort.push((path.into(), direction));
        self
    }

    #[must_use]
    pub const fn skip(mut self, skip: usize) -> Self {
        self.skip = skip;
        self
    }

    #[must_use]
    pub const fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

///
/// Modifier
///
/// Single-document update. Paths are dotted; numeric segments index
/// arrays.
///

#[derive(Clone, Debug, PartialEq)]
pub enum Modifier {
    Set(BTreeMap<String, Value>),
    Unset(BTreeSet<String>),
    Push { path: String, value: Value },
    RemoveAt { path: String, index: usize },
}

impl Modifier {
    #[must_use]
    pub fn set(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Set(BTreeMap::from([(path.into(), value.into())]))
    }

    #[must_use]
    pub fn unset(path: impl Into<String>) -> Self {
        Self::Unset(BTreeSet::from([path.into()]))
    }
}

///
/// MutationKind
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MutationKind {
    Insert,
    Update,
    Remove,
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Remove => "remove",
        };
        write!(f, "{label}")
    }
}

/// Access predicate over `(user id, target document)`.
pub type AccessRule = Arc<dyn Fn(Option<&str>, &Document) -> bool + Send + Sync>;

///
/// AccessRules
///
/// One predicate per direct client mutation kind, as passed to
/// [`Store::allow`] and [`Store::deny`].
///

#[derive(Clone, Default)]
pub struct AccessRules {
    pub insert: Option<AccessRule>,
    pub update: Option<AccessRule>,
    pub remove: Option<AccessRule>,
}

impl AccessRules {
    /// The same constant answer for every mutation kind.
    #[must_use]
    pub fn constant(answer: bool) -> Self {
        let rule: AccessRule = Arc::new(move |_, _| answer);

        Self {
            insert: Some(rule.clone()),
            update: Some(rule.clone()),
            remove: Some(rule),
        }
    }

    #[must_use]
    pub const fn get(&self, kind: MutationKind) -> Option<&AccessRule> {
        match kind {
            MutationKind::Insert => self.insert.as_ref(),
            MutationKind::Update => self.update.as_ref(),
            MutationKind::Remove => self.remove.as_ref(),
        }
    }
}

impl fmt::Debug for AccessRules {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessRules")
            .field("insert", &self.insert.is_some())
            .field("update", &self.update.is_some())
            .field("remove", &self.remove.is_some())
            .finish()
    }
}

///
/// StoreCapabilities
///

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct StoreCapabilities {
    /// The store applies [`Modifier::RemoveAt`] atomically.
    pub atomic_remove_at: bool,
}

///
/// Store
///
/// One named document collection. Server-side mutations (`insert`,
/// `update`, `remove`) are trusted; `client_*` mutations are gated by the
/// allow/deny rules: at least one allow rule must pass and no deny rule
/// may.
///

pub trait Store: Send + Sync {
    fn name(&self) -> &str;

    fn id_field(&self) -> &str;

    fn query(&self, selector: &Selector, options: &FindOptions) -> Result<Vec<Document>, StoreError>;

    fn find_one(&self, selector: &Selector, options: &FindOptions) -> Result<Option<Document>, StoreError> {
        let options = FindOptions {
            limit: Some(1),
            ..options.clone()
        };

        Ok(self.query(selector, &options)?.into_iter().next())
    }

    /// Insert a document, assigning an id when it carries none.
    fn insert(&self, doc: Document) -> Result<String, StoreError>;

    /// Returns the number of documents modified (0 or 1).
    fn update(&self, id: &str, modifier: &Modifier) -> Result<usize, StoreError>;

    fn remove(&self, id: &str) -> Result<usize, StoreError>;

    fn allow(&self, rules: AccessRules);

    fn deny(&self, rules: AccessRules);

    fn client_insert(&self, user_id: Option<&str>, doc: Document) -> Result<String, StoreError>;

    fn client_update(&self, user_id: Option<&str>, id: &str, modifier: &Modifier) -> Result<usize, StoreError>;

    fn client_remove(&self, user_id: Option<&str>, id: &str) -> Result<usize, StoreError>;

    fn capabilities(&self) -> StoreCapabilities {
        StoreCapabilities::default()
    }
}

///
/// Cursor
///
/// Live view over a selection: every [`fetch`](Self::fetch) re-reads the
/// store.
///

#[derive(Clone)]
pub struct Cursor {
    store: Arc<dyn Store>,
    selector: Selector,
    options: FindOptions,
}

impl Cursor {
    #[must_use]
    pub fn new(store: Arc<dyn Store>, selector: Selector, options: FindOptions) -> Self {
        Self {
            store,
            selector,
            options,
        }
    }

    pub fn fetch(&self) -> Result<Vec<Document>, StoreError> {
        self.store.query(&self.selector, &self.options)
    }

    pub fn count(&self) -> Result<usize, StoreError> {
        self.fetch().map(|docs| docs.len())
    }

    #[must_use]
    pub const fn selector(&self) -> &Selector {
        &self.selector
    }

    #[must_use]
    pub fn collection_name(&self) -> &str {
        self.store.name()
    }
}

impl fmt::Debug for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cursor")
            .field("collection", &self.store.name())
            .field("selector", &self.selector)
            .field("options", &self.options)
            .finish()
    }
}

///
/// Collection
///
/// Cloneable handle binding a [`Store`]; the entry point record types use
/// for every store operation.
///

#[derive(Clone)]
pub struct Collection {
    store: Arc<dyn Store>,
}

impl Collection {
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        self.store.name()
    }

    #[must_use]
    pub fn id_field(&self) -> &str {
        self.store.id_field()
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    #[must_use]
    pub fn find(&self, selector: Selector, options: FindOptions) -> Cursor {
        Cursor::new(self.store.clone(), selector, options)
    }

    pub fn find_one(&self, selector: &Selector, options: &FindOptions) -> Result<Option<Document>, StoreError> {
        self.store.find_one(selector, options)
    }

    pub fn find_by_id(&self, id: &str) -> Result<Option<Document>, StoreError> {
        self.find_one(&Selector::by_id(self.id_field(), id), &FindOptions::default())
    }

    pub fn insert(&self, doc: Document) -> Result<String, StoreError> {
        self.store.insert(doc)
    }

    pub fn update(&self, id: &str, modifier: &Modifier) -> Result<usize, StoreError> {
        self.store.update(id, modifier)
    }

    pub fn remove(&self, id: &str) -> Result<usize, StoreError> {
        self.store.remove(id)
    }

    pub fn allow(&self, rules: AccessRules) {
        self.store.allow(rules);
    }

    pub fn deny(&self, rules: AccessRules) {
        self.store.deny(rules);
    }

    #[must_use]
    pub fn capabilities(&self) -> StoreCapabilities {
        self.store.capabilities()
    }
}

impl fmt::Debug for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Collection").field(&self.store.name()).finish()
    }
}

///
/// Database
///

pub trait Database: Send + Sync {
    /// Bind the named collection, creating it on first use.
    fn collection(&self, name: &str) -> Collection;
}
