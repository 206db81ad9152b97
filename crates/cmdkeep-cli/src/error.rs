use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] cmdkeep_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error(transparent)]
    Transport(#[from] cmdkeep_core::sync::TransportError),
    #[error("No command text provided")]
    EmptyCommand,
    #[error("Command ID cannot be empty")]
    EmptyCommandId,
    #[error("Search query cannot be empty")]
    EmptySearchQuery,
    #[error("Command not found for id/prefix: {0}")]
    CommandNotFound(String),
    #[error("{0}")]
    AmbiguousCommandId(String),
    #[error("Editor command failed: {0}")]
    EditorFailed(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Authentication error: {0}")]
    Auth(String),
    #[error("Prompt failed: {0}")]
    Prompt(String),
    #[error(
        "Sync is not configured. Run `cmdkeep auth login` or set CMDKEEP_GITHUB_TOKEN/GITHUB_TOKEN."
    )]
    SyncNotConfigured,
}

impl CliError {
    /// The user backed out of a prompt; nothing was written.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Core(error) if error.is_cancelled())
    }
}
