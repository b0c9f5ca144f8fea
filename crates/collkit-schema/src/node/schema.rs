use crate::{
    ELEMENT_SEGMENT, PATH_SEPARATOR, SchemaError, WILDCARD_SEGMENT,
    err,
    error::ErrorTree,
    node::FieldDescriptor,
    types::{FieldType, Primitive},
};
use std::collections::{BTreeMap, btree_map};

///
/// Schema
///
/// Flat dotted-path schema. Paths are kept in lexicographic order so every
/// parent is visited before its children.
///

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Schema {
    fields: BTreeMap<String, FieldDescriptor>,
}

impl Schema {
    #[must_use]
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::default()
    }

    // skips structural validation; used for derived sub-schemas whose
    // entries were already validated
    pub(crate) const fn from_fields_unchecked(fields: BTreeMap<String, FieldDescriptor>) -> Self {
        Self { fields }
    }

    #[must_use]
    pub fn get(&self, path: &str) -> Option<&FieldDescriptor> {
        self.fields.get(path)
    }

    #[must_use]
    pub fn contains(&self, path: &str) -> bool {
        self.fields.contains_key(path)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, FieldDescriptor> {
        self.fields.iter()
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Fields with no separator in their path.
    pub fn top_level(&self) -> impl Iterator<Item = (&str, &FieldDescriptor)> {
        self.fields
            .iter()
            .filter(|(path, _)| !path.contains(PATH_SEPARATOR))
            .map(|(path, desc)| (path.as_str(), desc))
    }

    /// The same description with every `$` segment spelled `*`, the form
    /// used by field specs and updater paths.
    #[must_use]
    pub fn wildcard_description(&self) -> BTreeMap<String, &FieldDescriptor> {
        self.fields
            .iter()
            .map(|(path, desc)| (to_wildcard_path(path), desc))
            .collect()
    }
}

impl<'a> IntoIterator for &'a Schema {
    type Item = (&'a String, &'a FieldDescriptor);
    type IntoIter = btree_map::Iter<'a, String, FieldDescriptor>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.iter()
    }
}

/// Rewrite `$` segments as `*`.
#[must_use]
pub fn to_wildcard_path(path: &str) -> String {
    path.split(PATH_SEPARATOR)
        .map(|seg| {
            if seg == ELEMENT_SEGMENT {
                WILDCARD_SEGMENT
            } else {
                seg
            }
        })
        .collect::<Vec<_>>()
        .join(".")
}

///
/// SchemaBuilder
///

#[derive(Debug, Default)]
pub struct SchemaBuilder {
    fields: BTreeMap<String, FieldDescriptor>,
    duplicates: Vec<String>,
}

impl SchemaBuilder {
    #[must_use]
    pub fn field(mut self, path: impl Into<String>, desc: FieldDescriptor) -> Self {
        let path = path.into();
        if self.fields.insert(path.clone(), desc).is_some() {
            self.duplicates.push(path);
        }
        self
    }

    /// Declare an array of scalars: registers `path` (array) and
    /// `path.$` (the element type).
    #[must_use]
    pub fn array_of(self, path: impl Into<String>, element: Primitive, desc: FieldDescriptor) -> Self {
        let path = path.into();
        let element_path = format!("{path}.{ELEMENT_SEGMENT}");
        let desc = FieldDescriptor {
            ty: FieldType::Array,
            ..desc
        };

        self.field(path, desc)
            .field(element_path, FieldDescriptor::scalar(element))
    }

    pub fn build(self) -> Result<Schema, SchemaError> {
        let mut errs = ErrorTree::new();

        for path in &self.duplicates {
            err!(errs, at = path.as_str(), "field declared more than once");
        }

        for path in self.fields.keys() {
            validate_path(path, &self.fields, &mut errs);
        }

        errs.result().map_err(SchemaError::Invalid)?;

        Ok(Schema {
            fields: self.fields,
        })
    }
}

fn validate_path(path: &str, fields: &BTreeMap<String, FieldDescriptor>, errs: &mut ErrorTree) {
    let segments: Vec<&str> = path.split(PATH_SEPARATOR).collect();

    if segments.iter().any(|seg| seg.is_empty()) {
        err!(errs, at = path, "path has an empty segment");
        return;
    }
    if segments.contains(&WILDCARD_SEGMENT) {
        err!(errs, at = path, "schema paths use '$' for array elements, not '*'");
        return;
    }

    let Some((last, parents)) = segments.split_last() else {
        return;
    };
    if parents.is_empty() {
        if *last == ELEMENT_SEGMENT {
            err!(errs, at = path, "array element segment has no parent array");
        }
        return;
    }

    let parent = parents.join(".");
    match fields.get(&parent).map(|desc| desc.ty) {
        None => err!(errs, at = path, "parent field '{parent}' is not declared"),
        Some(FieldType::Array) if *last != ELEMENT_SEGMENT => {
            err!(errs, at = path, "children of array '{parent}' must use '$'");
        }
        Some(FieldType::Object) if *last == ELEMENT_SEGMENT => {
            err!(errs, at = path, "'{parent}' is an object, not an array");
        }
        Some(FieldType::Scalar(p)) => {
            err!(errs, at = path, "parent '{parent}' is a scalar ({p})");
        }
        Some(_) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order_schema() -> Schema {
        Schema::builder()
            .field("name", FieldDescriptor::text().default_value("order"))
            .field("items", FieldDescriptor::array().default_value(Vec::<i64>::new()))
            .field("items.$", FieldDescriptor::object())
            .field("items.$.sku", FieldDescriptor::text().default_value(""))
            .field("items.$.qty", FieldDescriptor::int().default_value(1))
            .array_of("tags", Primitive::Text, FieldDescriptor::array().optional())
            .build()
            .expect("order schema should be valid")
    }

    #[test]
    fn array_of_registers_element_entry() {
        let schema = order_schema();
        assert_eq!(schema.get("tags").map(|d| d.ty), Some(FieldType::Array));
        assert_eq!(
            schema.get("tags.$").map(|d| d.ty),
            Some(FieldType::Scalar(Primitive::Text))
        );
    }

    #[test]
    fn top_level_skips_nested_paths() {
        let schema = order_schema();
        let names: Vec<&str> = schema.top_level().map(|(p, _)| p).collect();
        assert_eq!(names, ["items", "name", "tags"]);
    }

    #[test]
    fn wildcard_description_rewrites_element_segments() {
        let schema = order_schema();
        let desc = schema.wildcard_description();
        assert!(desc.contains_key("items.*.qty"));
        assert!(!desc.contains_key("items.$.qty"));
    }

    #[test]
    fn undeclared_parent_is_rejected() {
        let err = Schema::builder()
            .field("a.b", FieldDescriptor::text())
            .build()
            .expect_err("orphan child should fail");

        let SchemaError::Invalid(tree) = err else {
            panic!("expected invalid schema, got {err:?}");
        };
        assert_eq!(tree.get("a.b"), ["parent field 'a' is not declared"]);
    }

    #[test]
    fn element_segment_requires_array_parent() {
        let err = Schema::builder()
            .field("meta", FieldDescriptor::object())
            .field("meta.$", FieldDescriptor::text())
            .build()
            .expect_err("object parent with '$' child should fail");

        assert!(err.to_string().contains("'meta' is an object, not an array"));
    }

    #[test]
    fn duplicate_declaration_is_rejected() {
        let err = Schema::builder()
            .field("name", FieldDescriptor::text())
            .field("name", FieldDescriptor::int())
            .build()
            .expect_err("duplicate path should fail");

        assert!(err.to_string().contains("declared more than once"));
    }
}
