//! cmdkeep-core - Core library for cmdkeep
//!
//! This crate contains the command record model, the local libSQL store, the
//! merge engine that reconciles two copies of a collection, and the two
//! transports (GitHub gist and local file) that carry the synced payload.

pub mod db;
pub mod error;
pub mod merge;
pub mod models;
pub mod sync;
pub mod transfer;
pub mod util;

#[cfg(test)]
pub(crate) mod test_support;

pub use error::{Error, Result};
pub use models::{
    Command, CommandId, ConflictKind, ConflictResolution, Resolutions, SyncConflict, SyncPayload,
};
