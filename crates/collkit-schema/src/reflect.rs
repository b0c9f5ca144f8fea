//! Schema reflection: default objects, tag-filtered sub-schemas and
//! wildcard type lookup.

use crate::{
    PATH_SEPARATOR, SchemaError, is_wildcard,
    node::{FieldDescriptor, Schema},
    value::Document,
};
use std::collections::BTreeMap;

impl Schema {
    /// Build the default object for the fields directly under `prefix`.
    ///
    /// A non-empty prefix names a container (`items.$` or `items.$.`);
    /// only the immediate children of that container are considered.
    /// Required fields without a default fail with `MissingDefaultValue`;
    /// optional fields without one are left out.
    pub fn default_value_object(&self, prefix: &str) -> Result<Document, SchemaError> {
        let prefix = normalize_prefix(prefix);
        let mut obj = Document::new();

        for (path, desc) in self {
            let Some(key) = path.strip_prefix(prefix.as_str()) else {
                continue;
            };
            if key.is_empty() || key.contains(PATH_SEPARATOR) {
                continue;
            }

            match &desc.default {
                Some(default) => {
                    obj.insert(key.to_string(), default.resolve());
                }
                None if desc.optional => {}
                None => return Err(SchemaError::MissingDefaultValue(key.to_string())),
            }
        }

        Ok(obj)
    }

    /// Select the fields carrying `tag` (every field when `tag` is `None`
    /// or empty), replacing any entry named in `overrides` wholesale.
    /// Every override key must already exist in the schema.
    pub fn modified(
        &self,
        overrides: &BTreeMap<String, FieldDescriptor>,
        tag: Option<&str>,
    ) -> Result<Self, SchemaError> {
        if let Some(unknown) = overrides.keys().find(|k| !self.contains(k)) {
            return Err(SchemaError::UnknownOverrideField(unknown.clone()));
        }

        let tag = tag.filter(|t| !t.is_empty());
        let fields = self
            .iter()
            .filter(|(_, desc)| tag.is_none_or(|t| desc.has_tag(t)))
            .map(|(path, desc)| {
                let desc = overrides.get(path).unwrap_or(desc);
                (path.clone(), desc.clone())
            })
            .collect();

        Ok(Self::from_fields_unchecked(fields))
    }

    /// The fields below the container `prefix` with the prefix stripped, so
    /// `items.$` yields `sku` and `qty` for an array of item objects.
    #[must_use]
    pub fn sub_schema(&self, prefix: &str) -> Self {
        let prefix = normalize_prefix(prefix);
        let fields = self
            .iter()
            .filter_map(|(path, desc)| {
                let key = path.strip_prefix(prefix.as_str())?;
                (!key.is_empty()).then(|| (key.to_string(), desc.clone()))
            })
            .collect();

        Self::from_fields_unchecked(fields)
    }

    /// `path` and every field below it, paths unchanged.
    #[must_use]
    pub fn branch(&self, path: &str) -> Self {
        let fields = self
            .iter()
            .filter(|(p, _)| {
                p.as_str() == path
                    || p.strip_prefix(path)
                        .is_some_and(|rest| rest.starts_with(PATH_SEPARATOR))
            })
            .map(|(p, desc)| (p.clone(), desc.clone()))
            .collect();

        Self::from_fields_unchecked(fields)
    }

    /// Find the descriptor for a concrete field spec such as `items.3.qty`.
    ///
    /// A schema path matches when it has the same number of segments and
    /// every non-wildcard segment is equal. When several paths match, the
    /// lexicographically first one wins.
    #[must_use]
    pub fn type_info_for(&self, field_spec: &str) -> Option<(&str, &FieldDescriptor)> {
        let wanted: Vec<&str> = field_spec.split(PATH_SEPARATOR).collect();

        self.iter()
            .find(|(path, _)| {
                let segments: Vec<&str> = path.split(PATH_SEPARATOR).collect();
                segments.len() == wanted.len()
                    && segments
                        .iter()
                        .zip(&wanted)
                        .all(|(have, want)| have == want || is_wildcard(have))
            })
            .map(|(path, desc)| (path.as_str(), desc))
    }
}

fn normalize_prefix(prefix: &str) -> String {
    if prefix.is_empty() || prefix.ends_with(PATH_SEPARATOR) {
        prefix.to_string()
    } else {
        format!("{prefix}{PATH_SEPARATOR}")
    }
}
