//! Local libSQL store for cmdkeep

mod connection;
mod migrations;
mod repository;
mod sync_state_repository;

pub use connection::Database;
pub use repository::{CommandRepository, LibSqlCommandRepository};
pub use sync_state_repository::{LibSqlSyncStateRepository, SyncStateRepository};
