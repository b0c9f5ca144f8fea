use crate::{
    error::{Error, ErrorOrigin},
    filter,
    record::RecordModel,
};
use collkit_schema::{
    validate::InvalidKey,
    value::{Document, Value, document_path},
};
use std::{fmt, sync::Arc};

///
/// ValidationReport
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ValidationReport {
    pub is_valid: bool,
    pub invalid_keys: Vec<InvalidKey>,
}

impl ValidationReport {
    #[must_use]
    pub fn has_invalid_key(&self, name: &str) -> bool {
        self.invalid_keys.iter().any(|k| k.name == name)
    }
}

///
/// Record
///
/// One document wrapped with its record type's model. Transient: the
/// record type never tracks instances.
///

#[derive(Clone)]
pub struct Record {
    model: Arc<RecordModel>,
    data: Document,
}

impl Record {
    pub(crate) const fn new(model: Arc<RecordModel>, data: Document) -> Self {
        Self { model, data }
    }

    #[must_use]
    pub fn model(&self) -> &RecordModel {
        &self.model
    }

    #[must_use]
    pub const fn data(&self) -> &Document {
        &self.data
    }

    #[must_use]
    pub fn into_document(self) -> Document {
        self.data
    }

    #[must_use]
    pub fn id(&self) -> Option<&str> {
        self.data.get(self.model.id_field()).and_then(Value::as_text)
    }

    #[must_use]
    pub fn get(&self, path: &str) -> Option<&Value> {
        document_path(&self.data, path)
    }

    /// The record's data filtered structurally against the type tree.
    pub fn as_plain_object(&self, ignore_off_schema: bool) -> Result<Document, Error> {
        Ok(filter::filter_document(
            &self.data,
            self.model.type_tree(),
            ignore_off_schema,
        )?)
    }

    /// Validate the plain object against the schema.
    ///
    /// The strict form fails on the first mismatch; otherwise every invalid
    /// key is reported. The id field is left out unless the schema declares
    /// it.
    pub fn validate(
        &self,
        use_strict_check: bool,
        ignore_off_schema: bool,
    ) -> Result<ValidationReport, Error> {
        let mut plain = self.as_plain_object(ignore_off_schema)?;
        let id_field = self.model.id_field();
        if !self.model.schema().contains(id_field) {
            plain.remove(id_field);
        }

        let schema = self.model.schema();
        let value = Value::Map(plain);

        if use_strict_check {
            schema.check(&value)?;

            return Ok(ValidationReport {
                is_valid: true,
                invalid_keys: Vec::new(),
            });
        }

        let mut ctx = schema.new_context();
        let is_valid = ctx.validate(&value);

        Ok(ValidationReport {
            is_valid,
            invalid_keys: ctx.invalid_keys().to_vec(),
        })
    }

    /// Run a named instance extension.
    pub fn call(&self, name: &str, args: &[Value]) -> Result<Value, Error> {
        let method = self.model.instance_method(name).ok_or_else(|| {
            Error::not_found(
                ErrorOrigin::Record,
                format!("{} has no instance method '{name}'", self.model.name()),
            )
        })?;

        method(self, args)
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Record")
            .field("type", &self.model.name())
            .field("data", &self.data)
            .finish()
    }
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.model, &other.model) && self.data == other.data
    }
}
