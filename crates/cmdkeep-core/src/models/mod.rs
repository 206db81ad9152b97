//! Data models for cmdkeep

mod command;
mod sync;
pub mod timestamp;

pub use command::{Command, CommandId};
pub use sync::{
    ConflictKind, ConflictResolution, ResolutionRecord, Resolutions, SyncConflict, SyncPayload,
    PAYLOAD_VERSION,
};
