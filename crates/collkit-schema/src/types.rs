use crate::value::Value;
use derive_more::{Display, FromStr};
use serde::{Deserialize, Serialize};

///
/// Primitive
///
/// Scalar leaf types a field may declare.
///

#[derive(Clone, Copy, Debug, Deserialize, Display, Eq, FromStr, Hash, PartialEq, Serialize)]
#[remain::sorted]
pub enum Primitive {
    Any,
    Bool,
    Date,
    Int,
    Number,
    Text,
}

impl Primitive {
    /// Returns true when `value` inhabits this primitive. `Null` never
    /// matches; optionality is decided by the caller.
    #[must_use]
    pub const fn accepts(self, value: &Value) -> bool {
        match self {
            Self::Any => true,
            Self::Bool => matches!(value, Value::Bool(_)),
            Self::Date => matches!(value, Value::Date(_)),
            Self::Int => matches!(value, Value::Int(_)),
            Self::Number => matches!(value, Value::Int(_) | Value::Float(_)),
            Self::Text => matches!(value, Value::Text(_)),
        }
    }

    // the set the bulk updater treats as "primitive" (date is opt-in)
    #[must_use]
    pub const fn is_basic(self) -> bool {
        matches!(self, Self::Bool | Self::Int | Self::Number | Self::Text)
    }
}

///
/// FieldType
///

#[derive(Clone, Copy, Debug, Deserialize, Display, Eq, Hash, PartialEq, Serialize)]
pub enum FieldType {
    #[display("{_0}")]
    Scalar(Primitive),
    Object,
    Array,
}

impl FieldType {
    #[must_use]
    pub const fn is_container(self) -> bool {
        matches!(self, Self::Object | Self::Array)
    }

    #[must_use]
    pub const fn primitive(self) -> Option<Primitive> {
        match self {
            Self::Scalar(p) => Some(p),
            Self::Object | Self::Array => None,
        }
    }

    #[must_use]
    pub const fn accepts(self, value: &Value) -> bool {
        match self {
            Self::Scalar(p) => p.accepts(value),
            Self::Object => matches!(value, Value::Map(_)),
            Self::Array => matches!(value, Value::List(_)),
        }
    }
}

impl From<Primitive> for FieldType {
    fn from(p: Primitive) -> Self {
        Self::Scalar(p)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn number_accepts_ints_and_floats() {
        assert!(Primitive::Number.accepts(&Value::Int(3)));
        assert!(Primitive::Number.accepts(&Value::Float(0.5)));
        assert!(!Primitive::Int.accepts(&Value::Float(0.5)));
        assert!(!Primitive::Text.accepts(&Value::Null));
    }

    #[test]
    fn primitive_round_trips_through_display() {
        let parsed: Primitive = Primitive::Date.to_string().parse().expect("display should parse");
        assert_eq!(parsed, Primitive::Date);
        assert_eq!(FieldType::Scalar(Primitive::Text).to_string(), "Text");
    }
}
