use collkit_schema::SchemaError;
use derive_more::Display;
use serde::Serialize;
use thiserror::Error as ThisError;

///
/// Error
///
/// Structured failure surfaced to callers: setup code sees it as the
/// reason initialisation aborted, remote callers receive it as the result
/// of a failed procedure or feed.
///

#[derive(Debug, Serialize, ThisError)]
#[error("{message}")]
pub struct Error {
    pub kind: ErrorKind,
    pub origin: ErrorOrigin,
    pub message: String,

    /// Diagnostic detail (offending arguments, schema shape).
    pub payload: Option<serde_json::Value>,
}

impl Error {
    pub fn new(kind: ErrorKind, origin: ErrorOrigin, message: impl Into<String>) -> Self {
        Self {
            kind,
            origin,
            message: message.into(),
            payload: None,
        }
    }

    #[must_use]
    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn unauthorized(origin: ErrorOrigin, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unauthorized, origin, message)
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidArgument, ErrorOrigin::Procedure, message)
    }

    pub fn not_found(origin: ErrorOrigin, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, origin, message)
    }

    #[must_use]
    pub const fn is_setup(&self) -> bool {
        self.kind.is_setup()
    }

    #[must_use]
    pub fn display_with_kind(&self) -> String {
        format!("{}:{}: {}", self.origin, self.kind, self.message)
    }
}

impl From<SchemaError> for Error {
    fn from(err: SchemaError) -> Self {
        let kind = match &err {
            SchemaError::Invalid(_) => ErrorKind::InvalidSchema,
            SchemaError::MissingDefaultValue(_) => ErrorKind::MissingDefaultValue,
            SchemaError::UnknownOverrideField(_) => ErrorKind::UnknownOverrideField,
            SchemaError::CheckFailed(_) => ErrorKind::InvalidArgument,
        };

        Self::new(kind, ErrorOrigin::Schema, err.to_string())
    }
}

///
/// ErrorKind
///

#[derive(Clone, Copy, Debug, Display, Eq, Hash, PartialEq, Serialize)]
#[remain::sorted]
pub enum ErrorKind {
    Config,
    DuplicateEntryName,
    DuplicateFeedName,
    DuplicateMethodName,
    FieldNotSpecified,
    Internal,
    InvalidArgument,
    InvalidField,
    InvalidRestArgsSchema,
    InvalidSchema,
    MissingDefaultValue,
    NotArrayField,
    NotFound,
    RateLimited,
    SchemaLengthMismatch,
    Store,
    Transport,
    Unauthorized,
    UnknownOverrideField,
}

impl ErrorKind {
    /// Setup-time kinds are programmer errors that abort initialisation;
    /// everything else is a call-time failure for the remote caller.
    #[must_use]
    pub const fn is_setup(self) -> bool {
        matches!(
            self,
            Self::Config
                | Self::DuplicateEntryName
                | Self::DuplicateFeedName
                | Self::DuplicateMethodName
                | Self::FieldNotSpecified
                | Self::InvalidRestArgsSchema
                | Self::InvalidSchema
                | Self::MissingDefaultValue
                | Self::NotArrayField
                | Self::UnknownOverrideField
        )
    }
}

///
/// ErrorOrigin
///

#[derive(Clone, Copy, Debug, Display, Eq, Hash, PartialEq, Serialize)]
#[remain::sorted]
pub enum ErrorOrigin {
    Config,
    Feed,
    Filter,
    Procedure,
    Record,
    Schema,
    Store,
    Transport,
}
