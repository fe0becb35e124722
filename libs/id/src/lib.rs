//! # switchyard-id
//!
//! Typed identifiers used on the switchyard wire and inside the control plane.
//!
//! ## Identifier Kinds
//!
//! - **Generated IDs** (`ConnectionId`, `WorkerRunId`) use a prefixed ULID
//!   format: `{prefix}_{ulid}`. They are time-ordered and strictly parsed.
//! - **Request IDs** are opaque tokens. Callers may choose their own (any
//!   non-empty string); generated ones use the `req_{ulid}` format.
//! - **Domain names** are the logical identity of a worker. They are short,
//!   case-sensitive labels validated on construction.
//!
//! Request IDs only need to be unique among currently-outstanding requests,
//! so parsing them is deliberately lenient.

mod error;
mod macros;
mod types;

pub use error::IdError;
pub use types::*;

/// Re-export ulid for consumers that need raw ULID operations
pub use ulid::Ulid;
