mod field;
mod schema;

pub use field::{DefaultValue, FieldDescriptor};
pub use schema::{Schema, SchemaBuilder, to_wildcard_path};
