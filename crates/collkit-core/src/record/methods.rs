//! Field-bound procedure makers.
//!
//! Every maker claims an entry name in the record type's method tables,
//! derives the procedure name from the method prefix, builds the argument
//! schema from the type tree and hands the result to `create_method`.

use crate::{
    backend::{CallContext, Collection, Modifier, RateLimit, StoreError},
    error::{Error, ErrorKind, ErrorOrigin},
    procedure::{self, ArgCheck, AuthCheck, Effect, Finisher, MethodSpec},
    record::{RecordError, RecordModel, RecordType},
};
use collkit_schema::{
    WILDCARD_SEGMENT, is_wildcard,
    node::FieldDescriptor,
    tree::TypeNode,
    types::Primitive,
    value::{Document, Value},
};
use std::{collections::BTreeMap, fmt, sync::Arc};
use tracing::debug;

///
/// MethodOptions
///
/// Options shared by every maker.
///

#[derive(Clone, Default)]
pub struct MethodOptions {
    /// Key in the method tables; derived from the prefix and field when
    /// unset.
    pub entry_name: Option<String>,
    pub entry_prefix: Option<String>,

    /// Replaces the record type's global auth.
    pub alternative_auth: Option<AuthCheck>,

    pub finishers: Vec<Finisher>,
    pub server_only: bool,
    pub unblock: bool,
    pub rate_limit: Option<RateLimit>,
}

impl fmt::Debug for MethodOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodOptions")
            .field("entry_name", &self.entry_name)
            .field("entry_prefix", &self.entry_prefix)
            .field("alternative_auth", &self.alternative_auth.is_some())
            .field("finishers", &self.finishers.len())
            .field("server_only", &self.server_only)
            .field("unblock", &self.unblock)
            .field("rate_limit", &self.rate_limit)
            .finish()
    }
}

///
/// WithMethodOptions
///
/// Builder methods for the shared options of every maker spec.
///

pub trait WithMethodOptions: Sized {
    fn method_options(&mut self) -> &mut MethodOptions;

    #[must_use]
    fn entry_name(mut self, name: impl Into<String>) -> Self {
        self.method_options().entry_name = Some(name.into());
        self
    }

    #[must_use]
    fn entry_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.method_options().entry_prefix = Some(prefix.into());
        self
    }

    #[must_use]
    fn alternative_auth(mut self, auth: AuthCheck) -> Self {
        self.method_options().alternative_auth = Some(auth);
        self
    }

    #[must_use]
    fn finisher(mut self, finisher: Finisher) -> Self {
        self.method_options().finishers.push(finisher);
        self
    }

    #[must_use]
    fn server_only(mut self, server_only: bool) -> Self {
        self.method_options().server_only = server_only;
        self
    }

    #[must_use]
    fn unblock(mut self, unblock: bool) -> Self {
        self.method_options().unblock = unblock;
        self
    }

    #[must_use]
    fn rate_limit(mut self, limit: RateLimit) -> Self {
        self.method_options().rate_limit = Some(limit);
        self
    }
}

macro_rules! impl_with_method_options {
    ($($ty:ty),* $(,)?) => {
        $(
            impl WithMethodOptions for $ty {
                fn method_options(&mut self) -> &mut MethodOptions {
                    &mut self.options
                }
            }
        )*
    };
}

impl_with_method_options!(
    AddSpec,
    RemoveSpec,
    UpdaterSpec,
    GeneralUpdaterSpec,
    GenericUpdatersSpec,
);

///
/// AddSpec
///
/// Without a field: insert a default or supplied document. With an array
/// field: push a default or supplied element.
///

#[derive(Clone, Debug, Default)]
pub struct AddSpec {
    pub field: String,
    pub with_params: bool,
    pub options: MethodOptions,
}

impl AddSpec {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Only the first segment is used.
    #[must_use]
    pub fn field(mut self, field: impl Into<String>) -> Self {
        self.field = field.into();
        self
    }

    #[must_use]
    pub const fn with_params(mut self) -> Self {
        self.with_params = true;
        self
    }
}

///
/// RemoveSpec
///

#[derive(Clone, Debug, Default)]
pub struct RemoveSpec {
    pub field: String,
    pub options: MethodOptions,
}

impl RemoveSpec {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn field(mut self, field: impl Into<String>) -> Self {
        self.field = field.into();
        self
    }
}

///
/// UpdaterSpec
///
/// Sets one field. `*` segments in the field are filled, in order, from
/// the arguments after the value.
///

#[derive(Clone, Debug, Default)]
pub struct UpdaterSpec {
    pub field: String,

    /// Check for the value argument; derived from the type tree when unset.
    pub value_check: Option<ArgCheck>,

    pub options: MethodOptions,
}

impl UpdaterSpec {
    #[must_use]
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn value_check(mut self, check: ArgCheck) -> Self {
        self.value_check = Some(check);
        self
    }
}

///
/// GeneralUpdaterSpec
///

#[derive(Clone, Debug, Default)]
pub struct GeneralUpdaterSpec {
    pub options: MethodOptions,
}

impl GeneralUpdaterSpec {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

///
/// GenericUpdatersSpec
///
/// Selects the schema fields that get an updater each. When either
/// `consider_*` list is set only matching fields are considered; the
/// exclusions apply afterwards.
///

#[derive(Clone, Debug, Default)]
pub struct GenericUpdatersSpec {
    pub consider_by_name: Option<Vec<String>>,
    pub consider_by_prefix: Option<Vec<String>>,
    pub exclude_by_name: Vec<String>,
    pub exclude_by_prefix: Vec<String>,
    pub primitive_types_only: bool,
    pub primitive_types_includes_date: bool,
    pub options: MethodOptions,
}

impl GenericUpdatersSpec {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn consider_by_name<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.consider_by_name = Some(names.into_iter().map(Into::into).collect());
        self
    }

    #[must_use]
    pub fn consider_by_prefix<I, S>(mut self, prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.consider_by_prefix = Some(prefixes.into_iter().map(Into::into).collect());
        self
    }

    #[must_use]
    pub fn exclude_by_name<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude_by_name = names.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn exclude_by_prefix<I, S>(mut self, prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude_by_prefix = prefixes.into_iter().map(Into::into).collect();
        self
    }

    /// Only bool, int, number and text fields.
    #[must_use]
    pub const fn primitive_types_only(mut self) -> Self {
        self.primitive_types_only = true;
        self
    }

    /// Count dates as primitive too.
    #[must_use]
    pub const fn primitive_types_includes_date(mut self) -> Self {
        self.primitive_types_includes_date = true;
        self
    }

    fn selects(&self, field: &str, desc: &FieldDescriptor) -> bool {
        let has_prefix = |prefixes: &[String]| prefixes.iter().any(|p| field.starts_with(p.as_str()));

        if self.consider_by_name.is_some() || self.consider_by_prefix.is_some() {
            let by_name = self
                .consider_by_name
                .as_ref()
                .is_some_and(|names| names.iter().any(|n| n == field));
            let by_prefix = self.consider_by_prefix.as_deref().is_some_and(has_prefix);
            if !(by_name || by_prefix) {
                return false;
            }
        }

        if self.exclude_by_name.iter().any(|n| n == field) || has_prefix(&self.exclude_by_prefix) {
            return false;
        }

        if self.primitive_types_only {
            return desc.ty.primitive().is_some_and(|p| {
                p.is_basic() || (self.primitive_types_includes_date && p == Primitive::Date)
            });
        }

        true
    }
}

///
/// MethodTables
///
/// Entry name to procedure name. `add` and `all` are keyed by entry name;
/// `update` and `remove` by field.
///

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct MethodTables {
    pub all: BTreeMap<String, String>,
    pub add: BTreeMap<String, String>,
    pub update: BTreeMap<String, String>,
    pub remove: BTreeMap<String, String>,
}

#[derive(Clone, Copy)]
enum Table {
    Add,
    Update,
    Remove,
    General,
}

impl RecordType {
    /// Returns the entry name.
    pub fn make_method_add(&self, spec: AddSpec) -> Result<String, Error> {
        let field = top_segment(&spec.field).to_string();
        let prefix = spec.options.entry_prefix.clone().unwrap_or_else(|| "add".into());
        let entry = entry_name(&spec.options, &prefix, &field);
        let method_name = if field.is_empty() {
            format!("{}{prefix}", self.method_prefix())
        } else {
            format!("{}{field}/{prefix}", self.method_prefix())
        };
        self.ensure_entry_free(&entry, &method_name)?;

        let model = Arc::clone(self.model());
        let collection = self.collection().clone();

        let (checks, effect): (Vec<ArgCheck>, Effect) = if field.is_empty() {
            if spec.with_params {
                let shape = ArgCheck::Schema(model.schema().clone());
                let effect: Effect = Arc::new(move |_: &CallContext, args: &[Value]| {
                    let doc = document_arg(args, 0)?;
                    Ok(Value::Text(collection.insert(doc)?))
                });

                (vec![shape], effect)
            } else {
                model.default_value_object("")?;
                let effect: Effect = Arc::new(move |_: &CallContext, _: &[Value]| {
                    let record = model.object_with_default_values()?;
                    Ok(Value::Text(collection.insert(record.into_document())?))
                });

                (Vec::new(), effect)
            }
        } else {
            let node = model
                .descend(&field)
                .filter(|node| node.is_array())
                .ok_or_else(|| RecordError::NotArrayField(field.clone()))?;
            let element = node.element().cloned();

            if spec.with_params {
                let element_check = match element {
                    Some(TypeNode::Leaf(p)) => ArgCheck::Primitive(p),
                    Some(_) => ArgCheck::Schema(model.schema().sub_schema(&format!("{field}.$"))),
                    None => ArgCheck::Any,
                };
                let path = field.clone();
                let effect: Effect = Arc::new(move |_: &CallContext, args: &[Value]| {
                    let id = text_arg(args, 0)?;
                    let value = args.get(1).cloned().unwrap_or_default();
                    push(&collection, id, &path, value)
                });

                (vec![ArgCheck::text(), element_check], effect)
            } else {
                let scalar = node.is_scalar_list();
                element_default(&model, &field, scalar)?;
                let path = field.clone();
                let effect: Effect = Arc::new(move |_: &CallContext, args: &[Value]| {
                    let id = text_arg(args, 0)?;
                    let value = element_default(&model, &path, scalar)?;
                    push(&collection, id, &path, value)
                });

                (vec![ArgCheck::text()], effect)
            }
        };

        let spec_out = self
            .method_spec(method_name, effect, spec.options)
            .positional(checks);
        self.register(&entry, Table::Add, &entry, spec_out)?;

        Ok(entry)
    }

    /// Returns the entry name.
    pub fn make_method_remove(&self, spec: RemoveSpec) -> Result<String, Error> {
        let field = top_segment(&spec.field).to_string();
        let prefix = spec
            .options
            .entry_prefix
            .clone()
            .unwrap_or_else(|| "remove".into());
        let entry = entry_name(&spec.options, &prefix, &field);
        let method_name = format!("{}{entry}", self.method_prefix());
        self.ensure_entry_free(&entry, &method_name)?;

        let collection = self.collection().clone();
        let is_array = !field.is_empty() && self.descend(&field).is_some_and(TypeNode::is_array);

        let (checks, effect): (Vec<ArgCheck>, Effect) = if field.is_empty() {
            let effect: Effect = Arc::new(move |_: &CallContext, args: &[Value]| {
                let id = text_arg(args, 0)?;
                Ok(count(collection.remove(id)?))
            });

            (vec![ArgCheck::text()], effect)
        } else if is_array {
            let path = field.clone();
            let effect: Effect = Arc::new(move |_: &CallContext, args: &[Value]| {
                let id = text_arg(args, 0)?;
                let index = index_arg(args, 1)?;
                remove_element(&collection, id, &path, index)
            });

            (vec![ArgCheck::text(), ArgCheck::NonNegativeInt], effect)
        } else {
            let path = field.clone();
            let effect: Effect = Arc::new(move |_: &CallContext, args: &[Value]| {
                let id = text_arg(args, 0)?;
                Ok(count(collection.update(id, &Modifier::unset(path.clone()))?))
            });

            (vec![ArgCheck::text()], effect)
        };

        let spec_out = self
            .method_spec(method_name, effect, spec.options)
            .positional(checks);
        self.register(&entry, Table::Remove, &field, spec_out)?;

        Ok(entry)
    }

    /// Returns the procedure name. The procedure takes
    /// `(id, value, ...wildcard segments)`.
    pub fn make_method_updater(&self, spec: UpdaterSpec) -> Result<String, Error> {
        let field = spec.field;
        if field.is_empty() {
            return Err(RecordError::FieldNotSpecified.into());
        }

        let prefix = spec
            .options
            .entry_prefix
            .clone()
            .unwrap_or_else(|| "update".into());
        let entry = entry_name(&spec.options, &prefix, &field);
        let method_name = format!("{}{prefix}-{field}", self.method_prefix());
        self.ensure_entry_free(&entry, &method_name)?;

        let value_check = match spec.value_check {
            Some(check) => check,
            None => self.derived_value_check(&field)?,
        };
        if self.tools().config().debug {
            debug!(field = %field, check = %value_check.describe(), "creating updater");
        }

        let collection = self.collection().clone();
        let segments: Vec<String> = field.split('.').map(ToString::to_string).collect();
        let effect: Effect = Arc::new(move |_: &CallContext, args: &[Value]| {
            let id = text_arg(args, 0)?;
            let value = args.get(1).cloned().unwrap_or_default();
            let path = fill_wildcards(&segments, args.get(2..).unwrap_or_default())?;

            Ok(count(collection.update(id, &Modifier::set(path, value))?))
        });

        let checks = [
            ArgCheck::text(),
            value_check,
            ArgCheck::list_of(ArgCheck::OneOf(vec![
                ArgCheck::Primitive(Primitive::Int),
                ArgCheck::text(),
            ])),
        ];
        let spec_out = self
            .method_spec(method_name, effect, spec.options)
            .positional(checks)
            .rest_args();

        self.register(&entry, Table::Update, &field, spec_out)
    }

    /// Returns the procedure name. The procedure takes `(id, updates)` and
    /// sets every key of `updates` after checking it against the schema.
    pub fn make_methods_general_updater(&self, spec: GeneralUpdaterSpec) -> Result<String, Error> {
        let entry = spec
            .options
            .entry_name
            .clone()
            .unwrap_or_else(|| "general-update".into());
        let method_name = format!("{}{entry}", self.method_prefix());
        self.ensure_entry_free(&entry, &method_name)?;

        let model = Arc::clone(self.model());
        let collection = self.collection().clone();
        let effect: Effect = Arc::new(move |_: &CallContext, args: &[Value]| {
            let updates = document_arg(args, 1)?;
            check_updates(&model, &updates)?;
            let id = text_arg(args, 0)?;

            Ok(count(collection.update(id, &Modifier::Set(updates))?))
        });

        let spec_out = self
            .method_spec(method_name, effect, spec.options)
            .positional([ArgCheck::text(), ArgCheck::Object]);

        self.register(&entry, Table::General, &entry, spec_out)
    }

    /// One updater per selected schema field, in schema order. Returns the
    /// procedure names.
    pub fn make_generic_method_updaters(&self, spec: GenericUpdatersSpec) -> Result<Vec<String>, Error> {
        let fields: Vec<String> = self
            .wildcard_description()
            .into_iter()
            .filter(|(field, desc)| field != self.model().id_field() && spec.selects(field, desc))
            .map(|(field, _)| field)
            .collect();

        let options = MethodOptions {
            entry_name: None,
            entry_prefix: Some(
                spec.options
                    .entry_prefix
                    .clone()
                    .unwrap_or_else(|| "update-gen".into()),
            ),
            ..spec.options
        };

        fields
            .into_iter()
            .map(|field| {
                self.make_method_updater(UpdaterSpec {
                    field,
                    value_check: None,
                    options: options.clone(),
                })
            })
            .collect()
    }

    fn method_spec(&self, name: String, effect: Effect, options: MethodOptions) -> MethodSpec {
        MethodSpec::from_effect(name, effect)
            .auth(
                options
                    .alternative_auth
                    .unwrap_or_else(|| self.global_auth().clone()),
            )
            .finishers(options.finishers)
            .server_only(options.server_only)
            .unblock(options.unblock)
            .rate_limit(options.rate_limit)
    }

    fn ensure_entry_free(&self, entry: &str, method_name: &str) -> Result<(), Error> {
        if self.tables().all.contains_key(entry) {
            return Err(RecordError::DuplicateEntryName {
                entry: entry.to_string(),
                method: method_name.to_string(),
            }
            .into());
        }

        Ok(())
    }

    // the table lock is held across registration so entry names stay unique
    fn register(&self, entry: &str, table: Table, key: &str, spec: MethodSpec) -> Result<String, Error> {
        let mut tables = self.tables_mut();
        if tables.all.contains_key(entry) {
            return Err(RecordError::DuplicateEntryName {
                entry: entry.to_string(),
                method: spec.name,
            }
            .into());
        }

        let name = procedure::create_method(self.tools(), spec, self.default_rate_limit())?;

        tables.all.insert(entry.to_string(), name.clone());
        match table {
            Table::Add => {
                tables.add.insert(key.to_string(), name.clone());
            }
            Table::Update => {
                tables.update.insert(key.to_string(), name.clone());
            }
            Table::Remove => {
                tables.remove.insert(key.to_string(), name.clone());
            }
            Table::General => {}
        }

        Ok(name)
    }

    // containers are checked strictly against the field's branch of the
    // schema, which also carries their optionality
    fn derived_value_check(&self, field: &str) -> Result<ArgCheck, Error> {
        let (path, desc) = self
            .type_info_for(field)
            .ok_or_else(|| RecordError::FieldNotInSchema(field.to_string()))?;
        let node = self
            .descend(field)
            .ok_or_else(|| RecordError::FieldNotInSchema(field.to_string()))?;

        let TypeNode::Leaf(p) = node else {
            let (parent, key) = path.rsplit_once('.').unwrap_or(("", path));
            return Ok(ArgCheck::SchemaField {
                key: key.to_string(),
                schema: self.schema().branch(path).sub_schema(parent),
            });
        };

        let check = ArgCheck::Primitive(*p);
        Ok(if desc.optional {
            ArgCheck::optional(check)
        } else {
            check
        })
    }
}

fn top_segment(field: &str) -> &str {
    field.split_once('.').map_or(field, |(head, _)| head)
}

fn entry_name(options: &MethodOptions, prefix: &str, field: &str) -> String {
    options.entry_name.clone().unwrap_or_else(|| {
        if field.is_empty() {
            prefix.to_string()
        } else {
            format!("{prefix}-{field}")
        }
    })
}

// default element for `field`: the element default of a scalar list, else
// the default object of the element's sub-fields
fn element_default(model: &RecordModel, field: &str, scalar: bool) -> Result<Value, Error> {
    if scalar {
        let path = format!("{field}.$");
        let default = model
            .schema()
            .get(&path)
            .and_then(|desc| desc.default.as_ref())
            .ok_or_else(|| {
                Error::from(collkit_schema::SchemaError::MissingDefaultValue(path.clone()))
            })?;

        return Ok(default.resolve());
    }

    Ok(Value::Map(model.default_value_object(&format!("{field}.$."))?))
}

fn fill_wildcards(segments: &[String], args: &[Value]) -> Result<String, Error> {
    let mut fill = args.iter();
    let mut out = Vec::with_capacity(segments.len());

    for segment in segments {
        if is_wildcard(segment) {
            let value = fill.next().and_then(Value::to_segment).ok_or_else(|| {
                Error::invalid_argument(format!(
                    "missing or invalid value for '{WILDCARD_SEGMENT}' segment {}",
                    out.len()
                ))
            })?;
            out.push(value);
        } else {
            out.push(segment.clone());
        }
    }

    Ok(out.join("."))
}

fn check_updates(model: &RecordModel, updates: &Document) -> Result<(), Error> {
    for (field, value) in updates {
        let (_, desc) = model
            .type_info_for(field)
            .ok_or_else(|| RecordError::InvalidField(field.clone()))?;

        let accepted = desc.ty.accepts(value) || (desc.optional && value.is_null());
        if !accepted {
            return Err(Error::invalid_argument(format!(
                "'{field}' expects {}, found {}",
                desc.ty,
                value.type_name()
            )));
        }
    }

    Ok(())
}

fn push(collection: &Collection, id: &str, path: &str, value: Value) -> Result<Value, Error> {
    let modifier = Modifier::Push {
        path: path.to_string(),
        value,
    };

    Ok(count(collection.update(id, &modifier)?))
}

// a missing document or an index past the end removes nothing
fn remove_element(collection: &Collection, id: &str, path: &str, index: usize) -> Result<Value, Error> {
    if collection.capabilities().atomic_remove_at {
        let modifier = Modifier::RemoveAt {
            path: path.to_string(),
            index,
        };

        return match collection.update(id, &modifier) {
            Ok(n) => Ok(count(n)),
            Err(StoreError::InvalidModifier { .. }) => Ok(Value::Int(0)),
            Err(err) => Err(err.into()),
        };
    }

    let Some(doc) = collection.find_by_id(id)? else {
        return Ok(Value::Int(0));
    };
    let Some(Value::List(mut items)) = doc.get(path).cloned() else {
        return Ok(Value::Int(0));
    };
    if index >= items.len() {
        return Ok(Value::Int(0));
    }
    items.remove(index);

    Ok(count(collection.update(id, &Modifier::set(path, Value::List(items)))?))
}

fn count(n: usize) -> Value {
    Value::Int(i64::try_from(n).unwrap_or(i64::MAX))
}

fn text_arg(args: &[Value], position: usize) -> Result<&str, Error> {
    args.get(position)
        .and_then(Value::as_text)
        .ok_or_else(|| missing_arg(position, "text"))
}

fn index_arg(args: &[Value], position: usize) -> Result<usize, Error> {
    args.get(position)
        .and_then(Value::as_int)
        .and_then(|i| usize::try_from(i).ok())
        .ok_or_else(|| missing_arg(position, "non-negative int"))
}

fn document_arg(args: &[Value], position: usize) -> Result<Document, Error> {
    match args.get(position) {
        Some(Value::Map(doc)) => Ok(doc.clone()),
        _ => Err(missing_arg(position, "object")),
    }
}

fn missing_arg(position: usize, expected: &str) -> Error {
    Error::new(
        ErrorKind::InvalidArgument,
        ErrorOrigin::Record,
        format!("argument {position} must be {expected}"),
    )
}
