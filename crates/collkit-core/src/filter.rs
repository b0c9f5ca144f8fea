//! Structural object filter.
//!
//! Prunes or rejects a candidate value against a [`TypeTree`] so a later,
//! stricter schema check sees a shape-correct object. Leaf types are not
//! checked here.

use crate::error::{Error, ErrorKind, ErrorOrigin};
use collkit_schema::{
    ELEMENT_SEGMENT, PATH_SEPARATOR,
    tree::{TypeNode, TypeTree},
    value::{Document, Value},
};
use std::collections::BTreeMap;
use thiserror::Error as ThisError;

///
/// FilterError
///

#[derive(Debug, Eq, PartialEq, ThisError)]
pub enum FilterError {
    #[error("invalid field '{0}'")]
    InvalidField(String),
}

impl From<FilterError> for Error {
    fn from(err: FilterError) -> Self {
        Self::new(ErrorKind::InvalidField, ErrorOrigin::Filter, err.to_string())
    }
}

/// Filter `value` against the node at `prefix`.
///
/// Off-schema keys are dropped when `ignore_off_schema` is set and kept
/// otherwise; a shape mismatch (non-list under an array node, non-map under
/// an object node) passes through when ignoring and fails otherwise.
pub fn filter_value(
    value: &Value,
    tree: &TypeTree,
    ignore_off_schema: bool,
    prefix: &str,
) -> Result<Value, FilterError> {
    let Some(node) = tree.descend(prefix) else {
        return mismatch(value, ignore_off_schema, prefix);
    };

    match node {
        TypeNode::Array(_) if node.is_scalar_list() => Ok(value.clone()),

        TypeNode::Array(_) => {
            let Value::List(items) = value else {
                return mismatch(value, ignore_off_schema, prefix);
            };
            let element_prefix = child_prefix(prefix, ELEMENT_SEGMENT);

            items
                .iter()
                .map(|item| filter_value(item, tree, ignore_off_schema, &element_prefix))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::List)
        }

        TypeNode::Object(children) => {
            let Value::Map(map) = value else {
                return mismatch(value, ignore_off_schema, prefix);
            };

            filter_map(map, children, tree, ignore_off_schema, prefix).map(Value::Map)
        }

        TypeNode::Leaf(_) => Ok(value.clone()),
    }
}

/// Filter a top-level document against the tree root.
pub fn filter_document(
    doc: &Document,
    tree: &TypeTree,
    ignore_off_schema: bool,
) -> Result<Document, FilterError> {
    match tree.root() {
        TypeNode::Object(children) => filter_map(doc, children, tree, ignore_off_schema, ""),
        _ => Ok(doc.clone()),
    }
}

fn filter_map(
    map: &BTreeMap<String, Value>,
    children: &BTreeMap<String, TypeNode>,
    tree: &TypeTree,
    ignore_off_schema: bool,
    prefix: &str,
) -> Result<BTreeMap<String, Value>, FilterError> {
    let mut out = BTreeMap::new();

    for (key, value) in map {
        match children.get(key) {
            Some(child) if child.is_container() && value.is_container() => {
                let filtered =
                    filter_value(value, tree, ignore_off_schema, &child_prefix(prefix, key))?;
                out.insert(key.clone(), filtered);
            }
            // leaves, dates and scalars under container nodes pass through
            Some(_) => {
                out.insert(key.clone(), value.clone());
            }
            None if ignore_off_schema => {}
            None => {
                out.insert(key.clone(), value.clone());
            }
        }
    }

    Ok(out)
}

fn mismatch(value: &Value, ignore_off_schema: bool, prefix: &str) -> Result<Value, FilterError> {
    if ignore_off_schema {
        Ok(value.clone())
    } else {
        Err(FilterError::InvalidField(prefix.to_string()))
    }
}

fn child_prefix(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}{PATH_SEPARATOR}{key}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use collkit_schema::{node::FieldDescriptor, node::Schema, types::Primitive};
    use proptest::prelude::*;
    use serde_json::json;

    fn tree() -> TypeTree {
        let schema = Schema::builder()
            .field("name", FieldDescriptor::text())
            .field("num", FieldDescriptor::number())
            .field("when", FieldDescriptor::date().optional())
            .field("meta", FieldDescriptor::object())
            .field("meta.note", FieldDescriptor::text())
            .field("items", FieldDescriptor::array())
            .field("items.$", FieldDescriptor::object())
            .field("items.$.qty", FieldDescriptor::int())
            .array_of("tags", Primitive::Text, FieldDescriptor::array())
            .build()
            .expect("filter schema should be valid");

        TypeTree::build(&schema)
    }

    #[test]
    fn off_schema_keys_follow_the_flag() {
        let tree = tree();
        let input = Value::from(json!({
            "name": "n",
            "xxx": 0,
            "meta": { "note": "a", "extra": 1 },
            "items": [{ "qty": 1, "junk": true }],
        }));

        let kept = filter_value(&input, &tree, false, "").expect("lenient filter should pass");
        assert_eq!(kept, input);

        let dropped = filter_value(&input, &tree, true, "").expect("strict filter should pass");
        assert_eq!(
            dropped,
            Value::from(json!({ "name": "n", "meta": { "note": "a" }, "items": [{ "qty": 1 }] }))
        );
    }

    #[test]
    fn scalar_lists_are_opaque() {
        let tree = tree();
        let input = Value::from(json!({ "tags": ["a", { "odd": 1 }] }));

        let out = filter_value(&input, &tree, true, "").expect("scalar list should pass");
        assert_eq!(out, input);
    }

    #[test]
    fn non_list_under_array_node() {
        let tree = tree();
        let value = Value::from(json!({ "qty": 1 }));

        assert_eq!(
            filter_value(&value, &tree, false, "items"),
            Err(FilterError::InvalidField("items".into()))
        );
        assert_eq!(filter_value(&value, &tree, true, "items"), Ok(value));
    }

    #[test]
    fn non_map_element_is_rejected_unless_ignored() {
        let tree = tree();
        let input = Value::from(json!({ "items": [{ "qty": 1 }, 7] }));

        assert_eq!(
            filter_value(&input, &tree, false, ""),
            Err(FilterError::InvalidField("items.$".into()))
        );
        assert!(filter_value(&input, &tree, true, "").is_ok());
    }

    #[test]
    fn dates_and_scalars_under_containers_pass_through() {
        let tree = tree();
        let now = chrono::Utc::now();
        let mut doc = Document::new();
        doc.insert("when".into(), Value::Date(now));
        doc.insert("meta".into(), Value::Text("flat".into()));

        let out = filter_document(&doc, &tree, true).expect("pass-through should succeed");
        assert_eq!(out, doc);
    }

    #[test]
    fn element_prefix_filters_sub_documents() {
        let tree = tree();
        let input = Value::from(json!({ "qty": 2, "junk": 1 }));

        let out = filter_value(&input, &tree, true, "items.$").expect("element filter should pass");
        assert_eq!(out, Value::from(json!({ "qty": 2 })));
    }

    proptest! {
        #[test]
        fn conformant_objects_keep_exactly_their_schema_keys(
            name in "[a-z]{0,8}",
            num in any::<i64>(),
            extra in "[a-z]{1,4}",
        ) {
            prop_assume!(!["name", "num", "when", "meta", "items", "tags"].contains(&extra.as_str()));
            let tree = tree();
            let mut doc = Document::new();
            doc.insert("name".into(), Value::Text(name));
            doc.insert("num".into(), Value::Int(num));

            let clean = filter_document(&doc, &tree, true).expect("conformant doc should pass");
            prop_assert_eq!(&clean, &doc);

            doc.insert(extra.clone(), Value::Int(0));
            let kept = filter_document(&doc, &tree, false).expect("lenient filter should pass");
            prop_assert!(kept.contains_key(&extra));
            let dropped = filter_document(&doc, &tree, true).expect("strict filter should pass");
            prop_assert!(!dropped.contains_key(&extra));
        }
    }
}
