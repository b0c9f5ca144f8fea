//! Core runtime for collkit: record types, procedure and feed synthesis,
//! the structural object filter, and the collaborator seams they run over.

// public exports are one module level down
pub mod backend;
pub mod config;
pub mod error;
pub mod feed;
pub mod filter;
pub mod obs;
pub mod procedure;
pub mod record;
pub mod tools;

pub use error::{Error, ErrorKind, ErrorOrigin};
pub use tools::CollectionTools;

///
/// Prelude
///
/// Domain vocabulary plus the builder traits record-type code leans on.
///

pub mod prelude {
    pub use crate::{
        backend::{CallContext, FeedContext, FindOptions, Modifier, RateLimit, Selector},
        config::ToolsConfig,
        feed::{FeedByIdSpec, FeedSpec},
        procedure::{ArgCheck, ArgSchema, AuthCheck, MethodSpec},
        record::{
            AddSpec, GeneralUpdaterSpec, GenericUpdatersSpec, Record, RecordType,
            RecordTypeOptions, RemoveSpec, UpdaterSpec, WithMethodOptions as _,
        },
        tools::CollectionTools,
    };
    pub use collkit_schema::prelude::*;
}
