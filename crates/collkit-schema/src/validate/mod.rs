//! Structural validation of documents against a [`Schema`].
//!
//! The validator reports every mismatch through a [`ValidationContext`];
//! [`Schema::check`] is the strict form that stops at the first one.

use crate::{
    ELEMENT_SEGMENT, PATH_SEPARATOR, SchemaError,
    node::{FieldDescriptor, Schema},
    types::FieldType,
    value::Value,
};
use derive_more::Display;
use std::collections::BTreeMap;

///
/// InvalidKeyKind
///

#[derive(Clone, Debug, Display, Eq, PartialEq)]
#[remain::sorted]
pub enum InvalidKeyKind {
    #[display("expected {expected}, found {found}")]
    ExpectedType {
        expected: FieldType,
        found: &'static str,
    },

    #[display("not in schema")]
    KeyNotInSchema,

    #[display("required")]
    Required,
}

///
/// InvalidKey
///
/// One validation failure, named by the concrete path of the offending
/// value (`items.2.qty`, not `items.$.qty`).
///

#[derive(Clone, Debug, Display, Eq, PartialEq)]
#[display("{name}: {kind}")]
pub struct InvalidKey {
    pub name: String,
    pub kind: InvalidKeyKind,
}

impl InvalidKey {
    fn new(name: impl Into<String>, kind: InvalidKeyKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

///
/// ValidationContext
///
/// Reusable validation state bound to one schema. Each call to
/// [`validate`](Self::validate) replaces the previous invalid keys.
///

#[derive(Debug)]
pub struct ValidationContext<'a> {
    schema: &'a Schema,
    invalid_keys: Vec<InvalidKey>,
}

impl<'a> ValidationContext<'a> {
    #[must_use]
    pub const fn new(schema: &'a Schema) -> Self {
        Self {
            schema,
            invalid_keys: Vec::new(),
        }
    }

    pub fn validate(&mut self, value: &Value) -> bool {
        self.invalid_keys.clear();
        Walker {
            schema: self.schema,
            stop_at_first: false,
            out: &mut self.invalid_keys,
        }
        .root(value);

        self.invalid_keys.is_empty()
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.invalid_keys.is_empty()
    }

    #[must_use]
    pub fn invalid_keys(&self) -> &[InvalidKey] {
        &self.invalid_keys
    }
}

impl Schema {
    #[must_use]
    pub const fn new_context(&self) -> ValidationContext<'_> {
        ValidationContext::new(self)
    }

    /// Strict check: fail on the first mismatch.
    pub fn check(&self, value: &Value) -> Result<(), SchemaError> {
        let mut out = Vec::new();
        Walker {
            schema: self,
            stop_at_first: true,
            out: &mut out,
        }
        .root(value);

        match out.into_iter().next() {
            Some(key) => Err(SchemaError::CheckFailed(key)),
            None => Ok(()),
        }
    }

    // direct children of a schema path, keyed by their last segment
    fn children_of(&self, parent: &str) -> BTreeMap<&str, &FieldDescriptor> {
        self.iter()
            .filter_map(|(path, desc)| {
                let key = if parent.is_empty() {
                    path.as_str()
                } else {
                    path.strip_prefix(parent)?.strip_prefix(PATH_SEPARATOR)?
                };

                (!key.contains(PATH_SEPARATOR)).then_some((key, desc))
            })
            .collect()
    }
}

///
/// Walker
///

struct Walker<'s, 'o> {
    schema: &'s Schema,
    stop_at_first: bool,
    out: &'o mut Vec<InvalidKey>,
}

impl Walker<'_, '_> {
    fn done(&self) -> bool {
        self.stop_at_first && !self.out.is_empty()
    }

    fn report(&mut self, name: impl Into<String>, kind: InvalidKeyKind) {
        if !self.done() {
            self.out.push(InvalidKey::new(name, kind));
        }
    }

    fn root(&mut self, value: &Value) {
        match value {
            Value::Map(map) => self.object(map, "", ""),
            other => self.report(
                "",
                InvalidKeyKind::ExpectedType {
                    expected: FieldType::Object,
                    found: other.type_name(),
                },
            ),
        }
    }

    fn object(&mut self, map: &BTreeMap<String, Value>, schema_path: &str, concrete: &str) {
        let schema = self.schema;
        let children = schema.children_of(schema_path);

        for (key, desc) in &children {
            if self.done() {
                return;
            }
            let name = join(concrete, key);
            let path = join(schema_path, key);

            match map.get(*key) {
                None | Some(Value::Null) if !desc.optional => {
                    self.report(name, InvalidKeyKind::Required);
                }
                None | Some(Value::Null) => {}
                Some(value) => self.field(value, desc, &path, &name),
            }
        }

        for key in map.keys() {
            if !children.contains_key(key.as_str()) {
                self.report(join(concrete, key), InvalidKeyKind::KeyNotInSchema);
            }
        }
    }

    fn field(&mut self, value: &Value, desc: &FieldDescriptor, schema_path: &str, concrete: &str) {
        if !desc.ty.accepts(value) {
            self.report(
                concrete,
                InvalidKeyKind::ExpectedType {
                    expected: desc.ty,
                    found: value.type_name(),
                },
            );
            return;
        }

        match value {
            Value::Map(map) if desc.ty == FieldType::Object => {
                self.object(map, schema_path, concrete);
            }
            Value::List(items) => {
                let schema = self.schema;
                let element_path = join(schema_path, ELEMENT_SEGMENT);
                let Some(element) = schema.get(&element_path) else {
                    return;
                };
                for (i, item) in items.iter().enumerate() {
                    if self.done() {
                        return;
                    }
                    self.field(item, element, &element_path, &join(concrete, &i.to_string()));
                }
            }
            _ => {}
        }
    }
}

fn join(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}{PATH_SEPARATOR}{key}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Primitive;
    use serde_json::json;

    fn thing_schema() -> Schema {
        Schema::builder()
            .field(
                "name",
                FieldDescriptor::text().tag("name-only").default_value("name"),
            )
            .field("num", FieldDescriptor::number().default_value(42))
            .build()
            .expect("thing schema should be valid")
    }

    fn order_schema() -> Schema {
        Schema::builder()
            .field("title", FieldDescriptor::text())
            .field("items", FieldDescriptor::array())
            .field("items.$", FieldDescriptor::object())
            .field("items.$.sku", FieldDescriptor::text())
            .field("items.$.qty", FieldDescriptor::int().optional())
            .array_of("tags", Primitive::Text, FieldDescriptor::array().optional())
            .build()
            .expect("order schema should be valid")
    }

    #[test]
    fn wrong_scalar_type_is_the_only_invalid_key() {
        let schema = thing_schema();
        let mut ctx = schema.new_context();

        assert!(!ctx.validate(&Value::from(json!({ "name": 0, "num": 0 }))));
        let names: Vec<&str> = ctx.invalid_keys().iter().map(|k| k.name.as_str()).collect();
        assert_eq!(names, ["name"]);
        assert!(matches!(
            ctx.invalid_keys()[0].kind,
            InvalidKeyKind::ExpectedType { found: "int", .. }
        ));
    }

    #[test]
    fn off_schema_key_is_reported() {
        let schema = thing_schema();
        let mut ctx = schema.new_context();

        ctx.validate(&Value::from(json!({ "name": "n", "num": 1, "xxx": 0 })));
        assert_eq!(
            ctx.invalid_keys(),
            [InvalidKey::new("xxx", InvalidKeyKind::KeyNotInSchema)]
        );
    }

    #[test]
    fn missing_required_field_is_reported() {
        let schema = thing_schema();
        let mut ctx = schema.new_context();

        ctx.validate(&Value::from(json!({ "num": 1 })));
        assert_eq!(
            ctx.invalid_keys(),
            [InvalidKey::new("name", InvalidKeyKind::Required)]
        );
    }

    #[test]
    fn nested_elements_use_concrete_paths() {
        let schema = order_schema();
        let mut ctx = schema.new_context();

        let doc = json!({
            "title": "t",
            "items": [{ "sku": "a", "qty": 1 }, { "sku": 7 }, { "qty": 2, "extra": true }],
            "tags": ["x", 3],
        });
        assert!(!ctx.validate(&Value::from(doc)));

        let names: Vec<&str> = ctx.invalid_keys().iter().map(|k| k.name.as_str()).collect();
        assert_eq!(names, ["items.1.sku", "items.2.sku", "items.2.extra", "tags.1"]);
    }

    #[test]
    fn context_is_reusable() {
        let schema = thing_schema();
        let mut ctx = schema.new_context();

        assert!(!ctx.validate(&Value::from(json!({}))));
        assert!(ctx.validate(&Value::from(json!({ "name": "n", "num": 1.5 }))));
        assert!(ctx.is_valid());
    }

    #[test]
    fn strict_check_stops_at_first_mismatch() {
        let err = order_schema()
            .check(&Value::from(json!({ "items": "nope", "zzz": 1 })))
            .expect_err("mismatched document should fail");

        let SchemaError::CheckFailed(key) = err else {
            panic!("expected check failure, got {err:?}");
        };
        assert_eq!(key.name, "items");
    }

    #[test]
    fn non_object_root_is_rejected() {
        let err = thing_schema()
            .check(&Value::from("text"))
            .expect_err("scalar root should fail");

        assert!(err.to_string().contains("expected Object, found text"));
    }
}
