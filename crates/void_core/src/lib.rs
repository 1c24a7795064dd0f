//! # void_core - Shared Primitives
//!
//! Identifiers that every AI subsystem agrees on. Entity ids come from the
//! host simulation; the toolkit never allocates them itself, but
//! [`IdGenerator`] is provided for hosts and tests that need fresh ids.

pub mod id;

pub use id::*;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::id::{EntityId, IdGenerator};
}
