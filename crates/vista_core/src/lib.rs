//! # vista_core - Vista Core
//!
//! Primitives shared by every Vista crate:
//! - **Identifiers**: stable node UUIDs, server-issued session ids, user ids
//! - **Timestamps**: UTC seconds, strictly ordered within a process
//! - **Errors**: the single error taxonomy used across the scene graph,
//!   persistence and collaboration layers

pub mod error;
pub mod id;
pub mod time;

pub use error::*;
pub use id::*;
pub use time::*;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::error::{ErrorKind, SceneError, SceneResult};
    pub use crate::id::{NodeId, SessionId, UserId};
    pub use crate::time::Timestamp;
}
