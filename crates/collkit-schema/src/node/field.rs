use crate::{
    types::{FieldType, Primitive},
    value::Value,
};
use std::{collections::BTreeSet, fmt, sync::Arc};

///
/// DefaultValue
///
/// Either a literal or a zero-argument factory invoked each time a default
/// object is built (fresh timestamps, generated ids).
///

#[derive(Clone)]
pub enum DefaultValue {
    Literal(Value),
    Factory(Arc<dyn Fn() -> Value + Send + Sync>),
}

impl DefaultValue {
    #[must_use]
    pub fn resolve(&self) -> Value {
        match self {
            Self::Literal(v) => v.clone(),
            Self::Factory(f) => f(),
        }
    }
}

impl fmt::Debug for DefaultValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(v) => f.debug_tuple("Literal").field(v).finish(),
            Self::Factory(_) => f.write_str("Factory(..)"),
        }
    }
}

// factories compare by identity
impl PartialEq for DefaultValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Literal(a), Self::Literal(b)) => a == b,
            (Self::Factory(a), Self::Factory(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

///
/// FieldDescriptor
///

#[derive(Clone, Debug, PartialEq)]
pub struct FieldDescriptor {
    pub ty: FieldType,
    pub optional: bool,
    pub default: Option<DefaultValue>,
    pub tags: BTreeSet<String>,
    pub label: Option<String>,
}

impl FieldDescriptor {
    #[must_use]
    pub const fn new(ty: FieldType) -> Self {
        Self {
            ty,
            optional: false,
            default: None,
            tags: BTreeSet::new(),
            label: None,
        }
    }

    #[must_use]
    pub const fn scalar(p: Primitive) -> Self {
        Self::new(FieldType::Scalar(p))
    }

    #[must_use]
    pub const fn text() -> Self {
        Self::scalar(Primitive::Text)
    }

    #[must_use]
    pub const fn int() -> Self {
        Self::scalar(Primitive::Int)
    }

    #[must_use]
    pub const fn number() -> Self {
        Self::scalar(Primitive::Number)
    }

    #[must_use]
    pub const fn bool() -> Self {
        Self::scalar(Primitive::Bool)
    }

    #[must_use]
    pub const fn date() -> Self {
        Self::scalar(Primitive::Date)
    }

    #[must_use]
    pub const fn any() -> Self {
        Self::scalar(Primitive::Any)
    }

    #[must_use]
    pub const fn object() -> Self {
        Self::new(FieldType::Object)
    }

    #[must_use]
    pub const fn array() -> Self {
        Self::new(FieldType::Array)
    }

    #[must_use]
    pub const fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    #[must_use]
    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(DefaultValue::Literal(value.into()));
        self
    }

    #[must_use]
    pub fn default_with(mut self, factory: impl Fn() -> Value + Send + Sync + 'static) -> Self {
        self.default = Some(DefaultValue::Factory(Arc::new(factory)));
        self
    }

    #[must_use]
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    #[must_use]
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    #[must_use]
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }
}
