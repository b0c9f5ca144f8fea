//! Collaborator seams: document store, transport and rate limiter, plus
//! in-memory implementations of each.

pub mod memory;
pub mod rate_limit;
pub mod store;
pub mod transport;

// re-exports
pub use rate_limit::{RateLimit, RateLimitRule, RateLimiter};
pub use store::{
    AccessRule, AccessRules, Collection, Cursor, Database, FindOptions, Modifier, MutationKind,
    Selector, SortDirection, Store, StoreCapabilities, StoreError,
};
pub use transport::{
    CallContext, EndpointKind, FeedContext, FeedHandler, MethodHandler, Transport, TransportError,
};
