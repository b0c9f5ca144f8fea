//! ## Crate layout
//! - `core`: record types, procedure and feed synthesis, the object filter,
//!   configuration, observability and the collaborator seams.
//! - `schema`: value model, schema description, type tree, reflection and
//!   the structural validator.
//!
//! The `prelude` module carries the vocabulary used when declaring record
//! types and their procedures.

pub use collkit_core as core;
pub use collkit_schema as schema;

/// re-exports
///
/// the in-memory collaborators live one level down; embedders wiring their
/// own store or transport implement the traits in `backend`
pub use core::{
    CollectionTools, Error, ErrorKind, ErrorOrigin,
    backend::{self, memory},
    config::ToolsConfig,
    obs,
};

pub mod __reexports {
    pub use serde;
    pub use serde_json;
    pub use tracing;
}

//
// Consts
//

/// Workspace version re-export for downstream tooling/tests.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

///
/// Prelude
/// using _ brings traits into scope and avoids name conflicts
///

pub mod prelude {
    pub use crate::core::prelude::*;
    pub use serde::{Deserialize, Serialize};
}
