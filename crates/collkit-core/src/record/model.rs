use crate::{
    error::Error,
    filter::{self, FilterError},
    record::{InstanceMethod, Record, Transform},
};
use collkit_schema::{
    node::{FieldDescriptor, Schema},
    tree::{TypeNode, TypeTree},
    value::{Document, Value},
};
use std::{collections::BTreeMap, fmt, sync::Arc};

///
/// FieldSource
///
/// Input to [`RecordModel::filter_with_top_level_schema`]: a value, or a
/// thunk producing one.
///

#[derive(Clone)]
pub enum FieldSource {
    Value(Value),
    Thunk(Arc<dyn Fn() -> Value + Send + Sync>),
}

impl FieldSource {
    pub fn thunk(f: impl Fn() -> Value + Send + Sync + 'static) -> Self {
        Self::Thunk(Arc::new(f))
    }

    #[must_use]
    pub const fn as_value(&self) -> Option<&Value> {
        match self {
            Self::Value(v) => Some(v),
            Self::Thunk(_) => None,
        }
    }

    #[must_use]
    pub const fn is_thunk(&self) -> bool {
        matches!(self, Self::Thunk(_))
    }

    /// The value, invoking a thunk.
    #[must_use]
    pub fn resolve(&self) -> Value {
        match self {
            Self::Value(v) => v.clone(),
            Self::Thunk(f) => f(),
        }
    }
}

impl<T: Into<Value>> From<T> for FieldSource {
    fn from(value: T) -> Self {
        Self::Value(value.into())
    }
}

impl fmt::Debug for FieldSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(v) => f.debug_tuple("Value").field(v).finish(),
            Self::Thunk(_) => f.write_str("Thunk(..)"),
        }
    }
}

///
/// TopLevelFilter
///
/// Selected schema plus the matching entries of the source. Thunks stay
/// uninvoked unless the filter was asked to call them.
///

#[derive(Clone, Debug)]
pub struct TopLevelFilter {
    pub schema: Schema,
    pub object: BTreeMap<String, FieldSource>,
}

impl TopLevelFilter {
    /// The filtered object as a document, or `None` while thunks remain.
    #[must_use]
    pub fn document(&self) -> Option<Document> {
        self.object
            .iter()
            .map(|(k, v)| v.as_value().map(|v| (k.clone(), v.clone())))
            .collect()
    }
}

///
/// RecordModel
///
/// The reflection half of a record type: schema, type tree, transform and
/// instance extensions. Shared by every [`Record`] of the type.
///

pub struct RecordModel {
    name: String,
    collection_name: String,
    schema: Schema,
    tree: TypeTree,
    transform: Option<Transform>,
    id_field: String,
    instance_methods: BTreeMap<String, InstanceMethod>,
}

impl RecordModel {
    pub(crate) fn new(
        name: String,
        collection_name: String,
        schema: Schema,
        transform: Option<Transform>,
        id_field: String,
        instance_methods: BTreeMap<String, InstanceMethod>,
    ) -> Self {
        let tree = TypeTree::build(&schema);

        Self {
            name,
            collection_name,
            schema,
            tree,
            transform,
            id_field,
            instance_methods,
        }
    }

    /// Display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn collection_name(&self) -> &str {
        &self.collection_name
    }

    #[must_use]
    pub const fn schema(&self) -> &Schema {
        &self.schema
    }

    #[must_use]
    pub const fn type_tree(&self) -> &TypeTree {
        &self.tree
    }

    #[must_use]
    pub fn id_field(&self) -> &str {
        &self.id_field
    }

    /// The type-tree node for a dotted prefix; `$`, `*` and indexes select
    /// the element slot.
    #[must_use]
    pub fn descend(&self, prefix: &str) -> Option<&TypeNode> {
        self.tree.descend(prefix)
    }

    #[must_use]
    pub fn wildcard_description(&self) -> BTreeMap<String, &FieldDescriptor> {
        self.schema.wildcard_description()
    }

    #[must_use]
    pub fn type_info_for(&self, field_spec: &str) -> Option<(&str, &FieldDescriptor)> {
        self.schema.type_info_for(field_spec)
    }

    /// Raw default object for the fields under `prefix`.
    pub fn default_value_object(&self, prefix: &str) -> Result<Document, Error> {
        Ok(self.schema.default_value_object(prefix)?)
    }

    /// A record built from the top-level defaults.
    pub fn object_with_default_values(self: &Arc<Self>) -> Result<Record, Error> {
        let doc = self.default_value_object("")?;

        Ok(self.instantiate(doc))
    }

    pub fn modified_schema(
        &self,
        overrides: &BTreeMap<String, FieldDescriptor>,
        tag: Option<&str>,
    ) -> Result<Schema, Error> {
        Ok(self.schema.modified(overrides, tag)?)
    }

    /// Keep the top-level keys of `source` named by the selected schema.
    ///
    /// With `call_functions` thunks are invoked; without it they are
    /// passed through as thunks.
    pub fn filter_with_top_level_schema(
        &self,
        source: &BTreeMap<String, FieldSource>,
        call_functions: bool,
        overrides: &BTreeMap<String, FieldDescriptor>,
        tag: Option<&str>,
    ) -> Result<TopLevelFilter, Error> {
        let schema = self.modified_schema(overrides, tag)?;
        let object = schema
            .top_level()
            .filter_map(|(field, _)| {
                let entry = source.get(field)?;
                let entry = if call_functions && entry.is_thunk() {
                    FieldSource::Value(entry.resolve())
                } else {
                    entry.clone()
                };

                Some((field.to_string(), entry))
            })
            .collect();

        Ok(TopLevelFilter { schema, object })
    }

    /// Structural filter over this model's type tree.
    pub fn filter(
        &self,
        value: &Value,
        ignore_off_schema: bool,
        prefix: &str,
    ) -> Result<Value, FilterError> {
        filter::filter_value(value, &self.tree, ignore_off_schema, prefix)
    }

    /// Wrap a raw document, applying the transform.
    #[must_use]
    pub fn instantiate(self: &Arc<Self>, doc: Document) -> Record {
        let data = match &self.transform {
            Some(transform) => transform(doc),
            None => doc,
        };

        Record::new(Arc::clone(self), data)
    }

    pub(crate) fn instance_method(&self, name: &str) -> Option<&InstanceMethod> {
        self.instance_methods.get(name)
    }
}

impl fmt::Debug for RecordModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordModel")
            .field("name", &self.name)
            .field("collection_name", &self.collection_name)
            .field("fields", &self.schema.len())
            .field("id_field", &self.id_field)
            .field("instance_methods", &self.instance_methods.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}
