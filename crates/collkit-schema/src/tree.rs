use crate::{
    ELEMENT_SEGMENT, PATH_SEPARATOR, is_wildcard,
    node::Schema,
    types::{FieldType, Primitive},
};
use std::collections::BTreeMap;

///
/// TypeNode
///
/// One node of a [`TypeTree`]. Arrays hold a single representative element
/// slot shared by every index.
///

#[derive(Clone, Debug, PartialEq)]
pub enum TypeNode {
    Leaf(Primitive),
    Object(BTreeMap<String, Self>),
    Array(Option<Box<Self>>),
}

impl TypeNode {
    #[must_use]
    pub const fn is_container(&self) -> bool {
        matches!(self, Self::Object(_) | Self::Array(_))
    }

    #[must_use]
    pub const fn is_array(&self) -> bool {
        matches!(self, Self::Array(_))
    }

    /// The element node of an array; `None` for non-arrays and for arrays
    /// whose element type was never declared.
    #[must_use]
    pub fn element(&self) -> Option<&Self> {
        match self {
            Self::Array(slot) => slot.as_deref(),
            _ => None,
        }
    }

    /// True for arrays of scalars, which filtering treats as opaque lists.
    #[must_use]
    pub fn is_scalar_list(&self) -> bool {
        match self {
            Self::Array(None) => true,
            Self::Array(Some(el)) => matches!(**el, Self::Leaf(_)),
            _ => false,
        }
    }

    /// Step one segment down. Wildcards and numeric segments select the
    /// array slot.
    #[must_use]
    pub fn child(&self, segment: &str) -> Option<&Self> {
        match self {
            Self::Object(children) => children.get(segment),
            Self::Array(slot) if is_wildcard(segment) || segment.parse::<usize>().is_ok() => {
                slot.as_deref()
            }
            _ => None,
        }
    }

    fn for_type(ty: FieldType) -> Self {
        match ty {
            FieldType::Scalar(p) => Self::Leaf(p),
            FieldType::Object => Self::Object(BTreeMap::new()),
            FieldType::Array => Self::Array(None),
        }
    }

    fn child_mut(&mut self, segment: &str) -> Option<&mut Self> {
        match self {
            Self::Object(children) => children.get_mut(segment),
            Self::Array(slot) if segment == ELEMENT_SEGMENT => slot.as_deref_mut(),
            _ => None,
        }
    }
}

///
/// TypeTree
///
/// Nested, traversable form of a [`Schema`]. Built once; immutable.
///

#[derive(Clone, Debug, PartialEq)]
pub struct TypeTree {
    root: TypeNode,
}

impl TypeTree {
    /// Build the tree from a validated schema. Paths are visited in
    /// lexicographic order, so parents always exist before their children.
    #[must_use]
    pub fn build(schema: &Schema) -> Self {
        let mut root = TypeNode::Object(BTreeMap::new());

        for (path, desc) in schema {
            let segments: Vec<&str> = path.split(PATH_SEPARATOR).collect();
            let Some((last, parents)) = segments.split_last() else {
                continue;
            };

            let head = parents
                .iter()
                .try_fold(&mut root, |node, seg| node.child_mut(seg));
            let node = TypeNode::for_type(desc.ty);

            match head {
                Some(TypeNode::Array(slot)) => *slot = Some(Box::new(node)),
                Some(TypeNode::Object(children)) => {
                    children.insert((*last).to_string(), node);
                }
                // builder validation keeps scalar parents out of a schema
                Some(TypeNode::Leaf(_)) | None => {}
            }
        }

        Self { root }
    }

    #[must_use]
    pub const fn root(&self) -> &TypeNode {
        &self.root
    }

    /// Descend along a dotted prefix; the empty prefix is the root. Any
    /// segment absent from the tree short-circuits to `None`.
    #[must_use]
    pub fn descend(&self, prefix: &str) -> Option<&TypeNode> {
        if prefix.is_empty() {
            return Some(&self.root);
        }

        prefix
            .split(PATH_SEPARATOR)
            .try_fold(&self.root, |node, seg| node.child(seg))
    }
}
