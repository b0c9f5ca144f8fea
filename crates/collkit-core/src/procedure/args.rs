use crate::error::{Error, ErrorKind, ErrorOrigin};
use collkit_schema::{node::Schema, tree::TypeNode, types::Primitive, value::Value};
use serde_json::json;
use std::collections::BTreeMap;

///
/// ArgCheck
///
/// Pattern one positional argument must match.
///

#[derive(Clone, Debug, PartialEq)]
pub enum ArgCheck {
    Any,
    Primitive(Primitive),
    NonEmptyText,
    NonNegativeInt,
    Object,

    /// Structural match against a type node: unknown keys are rejected,
    /// present values are type-checked, missing keys are tolerated.
    Shape(TypeNode),

    /// Strict document check: required fields must be present.
    Schema(Schema),

    /// Strict check of the value stored under `key` in a schema whose
    /// root holds that key.
    SchemaField { key: String, schema: Schema },

    ListOf(Box<Self>),
    OneOf(Vec<Self>),
    Optional(Box<Self>),
}

impl ArgCheck {
    #[must_use]
    pub const fn text() -> Self {
        Self::Primitive(Primitive::Text)
    }

    #[must_use]
    pub fn list_of(inner: Self) -> Self {
        Self::ListOf(Box::new(inner))
    }

    #[must_use]
    pub fn optional(inner: Self) -> Self {
        Self::Optional(Box::new(inner))
    }

    #[must_use]
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            Self::Any => true,
            Self::Primitive(p) => p.accepts(value),
            Self::NonEmptyText => value.as_text().is_some_and(|s| !s.is_empty()),
            Self::NonNegativeInt => value.as_int().is_some_and(|i| i >= 0),
            Self::Object => matches!(value, Value::Map(_)),
            Self::Shape(node) => shape_matches(node, value),
            Self::Schema(_) | Self::SchemaField { .. } => self.schema_mismatch(value).is_none(),
            Self::ListOf(inner) => value
                .as_list()
                .is_some_and(|items| items.iter().all(|v| inner.matches(v))),
            Self::OneOf(options) => options.iter().any(|c| c.matches(value)),
            Self::Optional(inner) => value.is_null() || inner.matches(value),
        }
    }

    /// Human-readable pattern, used in mismatch payloads.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Any => "Any".to_string(),
            Self::Primitive(p) => p.to_string(),
            Self::NonEmptyText => "NonEmptyText".to_string(),
            Self::NonNegativeInt => "NonNegativeInt".to_string(),
            Self::Object => "Object".to_string(),
            Self::Shape(_) => "Shape".to_string(),
            Self::Schema(schema) => format!("Schema({})", schema.paths().collect::<Vec<_>>().join(", ")),
            Self::SchemaField { key, .. } => format!("SchemaField({key})"),
            Self::ListOf(inner) => format!("[{}]", inner.describe()),
            Self::OneOf(options) => {
                let inner: Vec<String> = options.iter().map(Self::describe).collect();
                format!("OneOf({})", inner.join(", "))
            }
            Self::Optional(inner) => format!("Optional({})", inner.describe()),
        }
    }

    // first strict-check failure, for the schema-backed patterns
    fn schema_mismatch(&self, value: &Value) -> Option<String> {
        let result = match self {
            Self::Schema(schema) => schema.check(value),
            Self::SchemaField { key, schema } => {
                let wrapped = Value::Map(BTreeMap::from([(key.clone(), value.clone())]));
                schema.check(&wrapped)
            }
            _ => return None,
        };

        result.err().map(|err| err.to_string())
    }
}

impl From<Primitive> for ArgCheck {
    fn from(p: Primitive) -> Self {
        Self::Primitive(p)
    }
}

fn shape_matches(node: &TypeNode, value: &Value) -> bool {
    match (node, value) {
        (TypeNode::Leaf(p), v) => p.accepts(v),
        (TypeNode::Object(children), Value::Map(map)) => map.iter().all(|(k, v)| {
            children
                .get(k)
                .is_some_and(|child| shape_matches(child, v))
        }),
        (TypeNode::Array(slot), Value::List(items)) => match slot.as_deref() {
            Some(element) => items.iter().all(|item| shape_matches(element, item)),
            None => true,
        },
        _ => false,
    }
}

///
/// ArgSchema
///

#[derive(Clone, Debug, PartialEq)]
pub enum ArgSchema {
    /// One check per positional argument.
    Positional(Vec<ArgCheck>),

    /// A single object argument strictly checked against a schema.
    Named(Schema),
}

impl Default for ArgSchema {
    fn default() -> Self {
        Self::Positional(Vec::new())
    }
}

impl ArgSchema {
    #[must_use]
    pub fn describe(&self) -> serde_json::Value {
        match self {
            Self::Positional(checks) => {
                json!(checks.iter().map(ArgCheck::describe).collect::<Vec<_>>())
            }
            Self::Named(schema) => json!(schema.paths().collect::<Vec<_>>()),
        }
    }

    /// Validate call arguments. With `rest_args`, the trailing arguments
    /// beyond `len - 1` are bundled into one list and checked against the
    /// last pattern; the returned arguments are flat again.
    pub(crate) fn validate(&self, rest_args: bool, args: Vec<Value>) -> Result<Vec<Value>, Error> {
        match self {
            Self::Named(schema) => {
                let [arg] = args.as_slice() else {
                    return Err(self.length_mismatch(&args));
                };
                schema.check(arg)?;

                Ok(args)
            }

            Self::Positional(checks) if rest_args => {
                let Some((rest_check, fixed)) = checks.split_last() else {
                    return Err(invalid_rest_args_schema());
                };
                if args.len() < fixed.len() {
                    return Err(self.length_mismatch(&args));
                }

                for (position, (check, arg)) in fixed.iter().zip(&args).enumerate() {
                    check_position(position, check, arg)?;
                }
                let rest = Value::List(args[fixed.len()..].to_vec());
                check_position(fixed.len(), rest_check, &rest)?;

                Ok(args)
            }

            Self::Positional(checks) => {
                if args.len() != checks.len() {
                    return Err(self.length_mismatch(&args));
                }
                for (position, (check, arg)) in checks.iter().zip(&args).enumerate() {
                    check_position(position, check, arg)?;
                }

                Ok(args)
            }
        }
    }

    fn length_mismatch(&self, args: &[Value]) -> Error {
        Error::new(
            ErrorKind::SchemaLengthMismatch,
            ErrorOrigin::Procedure,
            format!("expected arguments matching {}, got {}", self.describe(), args.len()),
        )
        .with_payload(json!({
            "args": args.iter().map(Value::to_json).collect::<Vec<_>>(),
            "schema": self.describe(),
        }))
    }
}

pub(crate) fn invalid_rest_args_schema() -> Error {
    Error::new(
        ErrorKind::InvalidRestArgsSchema,
        ErrorOrigin::Procedure,
        "rest arguments need at least one pattern",
    )
}

fn check_position(position: usize, check: &ArgCheck, arg: &Value) -> Result<(), Error> {
    if check.matches(arg) {
        return Ok(());
    }

    let mut payload = json!({
        "position": position,
        "expected": check.describe(),
        "found": arg.to_json(),
    });
    if let Some(reason) = check.schema_mismatch(arg) {
        payload["reason"] = json!(reason);
    }

    Err(Error::invalid_argument(format!(
        "argument {position} does not match {}",
        check.describe()
    ))
    .with_payload(payload))
}

#[cfg(test)]
mod tests {
    use super::*;
    use collkit_schema::{node::FieldDescriptor, tree::TypeTree};

    fn updater_schema() -> ArgSchema {
        ArgSchema::Positional(vec![
            ArgCheck::text(),
            ArgCheck::Primitive(Primitive::Int),
            ArgCheck::list_of(ArgCheck::OneOf(vec![
                ArgCheck::Primitive(Primitive::Int),
                ArgCheck::text(),
            ])),
        ])
    }

    #[test]
    fn positional_arity_must_match() {
        let schema = ArgSchema::Positional(vec![ArgCheck::text()]);

        let err = schema
            .validate(false, vec![Value::from("a"), Value::from("b")])
            .expect_err("extra argument should fail");
        assert_eq!(err.kind, ErrorKind::SchemaLengthMismatch);

        let payload = err.payload.expect("mismatch should carry a payload");
        assert_eq!(payload["schema"], json!(["Text"]));
        assert_eq!(payload["args"], json!(["a", "b"]));
    }

    #[test]
    fn positional_type_mismatch_is_invalid_argument() {
        let schema = ArgSchema::Positional(vec![ArgCheck::text(), ArgCheck::NonNegativeInt]);

        let err = schema
            .validate(false, vec![Value::from("a"), Value::Int(-1)])
            .expect_err("negative index should fail");
        assert_eq!(err.kind, ErrorKind::InvalidArgument);
        assert_eq!(err.payload.map(|p| p["position"].clone()), Some(json!(1)));
    }

    #[test]
    fn rest_args_are_bundled_then_flattened() {
        let args = vec![
            Value::from("id"),
            Value::Int(5),
            Value::from("item-1"),
            Value::Int(2),
        ];

        let out = updater_schema()
            .validate(true, args.clone())
            .expect("rest args should validate");
        assert_eq!(out, args);

        let none = updater_schema()
            .validate(true, vec![Value::from("id"), Value::Int(5)])
            .expect("empty rest is allowed");
        assert_eq!(none.len(), 2);
    }

    #[test]
    fn rest_args_check_each_trailing_value() {
        let err = updater_schema()
            .validate(true, vec![Value::from("id"), Value::Int(5), Value::Bool(true)])
            .expect_err("bool trailing arg should fail");
        assert_eq!(err.kind, ErrorKind::InvalidArgument);

        let err = updater_schema()
            .validate(true, vec![Value::from("id")])
            .expect_err("too few fixed args should fail");
        assert_eq!(err.kind, ErrorKind::SchemaLengthMismatch);
    }

    #[test]
    fn empty_rest_schema_is_a_setup_error() {
        let err = ArgSchema::Positional(Vec::new())
            .validate(true, Vec::new())
            .expect_err("empty rest schema should fail");
        assert!(err.is_setup());
    }

    #[test]
    fn named_schema_takes_one_checked_object() {
        let schema = Schema::builder()
            .field("name", FieldDescriptor::text())
            .build()
            .expect("schema should be valid");
        let named = ArgSchema::Named(schema);

        assert!(named.validate(false, vec![Value::from(json!({ "name": "x" }))]).is_ok());

        let err = named
            .validate(false, vec![Value::from(json!({ "name": 1 }))])
            .expect_err("wrong field type should fail");
        assert_eq!(err.kind, ErrorKind::InvalidArgument);

        let err = named
            .validate(false, Vec::new())
            .expect_err("missing object should fail");
        assert_eq!(err.kind, ErrorKind::SchemaLengthMismatch);
    }

    #[test]
    fn schema_checks_reject_missing_required_fields() {
        let schema = Schema::builder()
            .field("sku", FieldDescriptor::text())
            .field("qty", FieldDescriptor::int().optional())
            .build()
            .expect("schema should be valid");
        let check = ArgCheck::Schema(schema.clone());

        assert!(check.matches(&Value::from(json!({ "sku": "a" }))));
        assert!(!check.matches(&Value::from(json!({}))));
        assert!(!check.matches(&Value::from(json!({ "qty": 1 }))));

        let err = ArgSchema::Positional(vec![check])
            .validate(false, vec![Value::from(json!({}))])
            .expect_err("empty document should fail");
        assert_eq!(err.kind, ErrorKind::InvalidArgument);
        let reason = err.payload.map(|p| p["reason"].clone());
        assert!(reason.is_some_and(|r| r.as_str().is_some_and(|r| r.contains("sku"))));

        let field = ArgCheck::SchemaField {
            key: "qty".into(),
            schema: schema.branch("qty"),
        };
        assert!(field.matches(&Value::Int(2)));
        assert!(field.matches(&Value::Null));
        assert!(!field.matches(&Value::from("two")));
    }

    #[test]
    fn shape_rejects_unknown_keys_and_tolerates_missing_ones() {
        let schema = Schema::builder()
            .field("sku", FieldDescriptor::text())
            .field("qty", FieldDescriptor::int())
            .build()
            .expect("schema should be valid");
        let check = ArgCheck::Shape(TypeTree::build(&schema).root().clone());

        assert!(check.matches(&Value::from(json!({ "sku": "a" }))));
        assert!(!check.matches(&Value::from(json!({ "sku": "a", "odd": 1 }))));
        assert!(!check.matches(&Value::from(json!({ "qty": "many" }))));
        assert!(!check.matches(&Value::from("not an object")));
    }
}
