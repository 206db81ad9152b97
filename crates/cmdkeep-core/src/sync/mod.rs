//! Remote sync: the gist client and the sync run built on top of it.

pub mod gist;
mod session;

pub use gist::{
    GistClient, GistConfig, TransportError, TransportResult, DEFAULT_API_BASE_URL,
    DEFAULT_REQUEST_TIMEOUT, GIST_FILE_NAME,
};
pub use session::{
    link_remote, run_sync, unlink_remote, ConflictResolver, ResolutionPolicy, SyncReport,
};
