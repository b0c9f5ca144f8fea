//! Schema description and reflection for collkit record types.
//!
//! A schema is a flat map from dotted field path to [`FieldDescriptor`].
//! From it this crate derives the traversable [`TypeTree`], default-value
//! objects, tag-filtered sub-schemas, wildcard type lookups and a structural
//! validator.

pub mod error;
pub mod node;
pub mod reflect;
pub mod tree;
pub mod types;
pub mod validate;
pub mod value;

use thiserror::Error as ThisError;

///
/// CONSTANTS
///

/// Path separator used by every schema path.
pub const PATH_SEPARATOR: char = '.';

/// Array-element segment as written in schema paths.
pub const ELEMENT_SEGMENT: &str = "$";

/// Array-element segment as written in field specs and updater paths.
pub const WILDCARD_SEGMENT: &str = "*";

/// Returns true for either spelling of the array-element segment.
#[must_use]
pub fn is_wildcard(segment: &str) -> bool {
    segment == ELEMENT_SEGMENT || segment == WILDCARD_SEGMENT
}

///
/// Prelude
///

pub mod prelude {
    pub use crate::{
        node::{DefaultValue, FieldDescriptor, Schema, SchemaBuilder},
        tree::{TypeNode, TypeTree},
        types::{FieldType, Primitive},
        validate::{InvalidKey, InvalidKeyKind, ValidationContext},
        value::{Document, Value},
    };
}

///
/// SchemaError
///

#[derive(Debug, ThisError)]
pub enum SchemaError {
    #[error("schema is invalid: {0}")]
    Invalid(error::ErrorTree),

    #[error("no default value for required field '{0}'")]
    MissingDefaultValue(String),

    #[error("override field '{0}' is not in the schema")]
    UnknownOverrideField(String),

    #[error("value does not match schema: {0}")]
    CheckFailed(validate::InvalidKey),
}
