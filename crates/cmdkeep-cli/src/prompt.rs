//! Terminal prompts for sync conflicts and file transfer.

use std::io::{self, IsTerminal};
use std::path::PathBuf;

use cmdkeep_core::sync::ConflictResolver;
use cmdkeep_core::transfer::{FilePrompt, ImportMode};
use cmdkeep_core::util::single_line_preview;
use cmdkeep_core::{Command, ConflictKind, ConflictResolution, SyncConflict};
use dialoguer::{Input, Select};

use crate::commands::common::{format_sync_timestamp, short_id};
use crate::error::CliError;

fn stdin_is_interactive() -> bool {
    io::stdin().is_terminal()
}

const fn describe_kind(kind: ConflictKind) -> &'static str {
    match kind {
        ConflictKind::Modified => "edited on both sides",
        ConflictKind::DeletedLocal => "deleted here, edited remotely",
        ConflictKind::DeletedRemote => "deleted remotely, edited here",
    }
}

fn describe_side(command: &Command) -> String {
    let mut line = format!(
        "{}  updated {}  used {} times",
        single_line_preview(&command.command, 48),
        format_sync_timestamp(command.updated_at),
        command.usage_count
    );
    if command.is_deleted() {
        line.push_str("  [deleted]");
    }
    line
}

pub fn format_conflict_summary(conflict: &SyncConflict) -> String {
    format!(
        "Conflict on {} ({})\n  local:  {}\n  remote: {}",
        short_id(&conflict.command_id),
        describe_kind(conflict.kind),
        describe_side(&conflict.local),
        describe_side(&conflict.remote)
    )
}

/// Asks on the terminal for every conflict of a sync run.
#[derive(Debug, Default)]
pub struct TerminalConflictResolver {
    failure: Option<String>,
}

impl TerminalConflictResolver {
    /// Turn a prompt failure recorded during the run into an error.
    pub fn take_failure(&mut self) -> Option<CliError> {
        self.failure.take().map(CliError::Prompt)
    }
}

impl ConflictResolver for TerminalConflictResolver {
    fn resolve(
        &mut self,
        conflict: &SyncConflict,
        position: usize,
        total: usize,
    ) -> Option<ConflictResolution> {
        if !stdin_is_interactive() {
            self.failure = Some(
                "sync conflicts need an answer; rerun in a terminal or pass --policy keep_local|keep_remote"
                    .to_string(),
            );
            return None;
        }

        eprintln!("{}", format_conflict_summary(conflict));
        let choice = Select::new()
            .with_prompt(format!("Conflict {position}/{total} (Esc cancels the sync)"))
            .items(&["Keep local", "Keep remote", "Keep both"])
            .default(0)
            .interact_opt();

        match choice {
            Ok(Some(0)) => Some(ConflictResolution::KeepLocal),
            Ok(Some(1)) => Some(ConflictResolution::KeepRemote),
            Ok(Some(_)) => Some(ConflictResolution::KeepBoth),
            Ok(None) => None,
            Err(error) => {
                self.failure = Some(error.to_string());
                None
            }
        }
    }
}

/// File paths and import mode from flags, falling back to terminal prompts.
#[derive(Debug, Default)]
pub struct TerminalFilePrompt {
    pub export_path: Option<PathBuf>,
    pub import_path: Option<PathBuf>,
    pub import_mode: Option<ImportMode>,
    pub(crate) failure: Option<String>,
}

impl TerminalFilePrompt {
    pub fn take_failure(&mut self) -> Option<CliError> {
        self.failure.take().map(CliError::Prompt)
    }

    fn ask_path(&mut self, prompt: &str, default: Option<&str>) -> Option<PathBuf> {
        let mut input = Input::<String>::new()
            .with_prompt(prompt)
            .allow_empty(true);
        if let Some(default) = default {
            input = input.default(default.to_string());
        }

        match input.interact_text() {
            Ok(value) => {
                let value = value.trim();
                if value.is_empty() {
                    None
                } else {
                    Some(PathBuf::from(value))
                }
            }
            Err(error) => {
                self.failure = Some(error.to_string());
                None
            }
        }
    }
}

impl FilePrompt for TerminalFilePrompt {
    fn export_path(&mut self, suggested_name: &str) -> Option<PathBuf> {
        if let Some(path) = self.export_path.clone() {
            return Some(path);
        }
        if !stdin_is_interactive() {
            return Some(PathBuf::from(suggested_name));
        }
        self.ask_path("Export to", Some(suggested_name))
    }

    fn import_path(&mut self) -> Option<PathBuf> {
        if let Some(path) = self.import_path.clone() {
            return Some(path);
        }
        if !stdin_is_interactive() {
            self.failure = Some("no import file given".to_string());
            return None;
        }
        self.ask_path("Import from", None)
    }

    fn import_mode(&mut self, incoming: usize, existing: usize) -> Option<ImportMode> {
        if let Some(mode) = self.import_mode {
            return Some(mode);
        }
        if !stdin_is_interactive() {
            self.failure = Some("--mode merge|replace is required without a terminal".to_string());
            return None;
        }

        let choice = Select::new()
            .with_prompt(format!(
                "Import {incoming} commands into a collection of {existing}"
            ))
            .items(&["Merge (latest edit wins)", "Replace existing commands"])
            .default(0)
            .interact_opt();

        match choice {
            Ok(Some(0)) => Some(ImportMode::Merge),
            Ok(Some(_)) => Some(ImportMode::Replace),
            Ok(None) => None,
            Err(error) => {
                self.failure = Some(error.to_string());
                None
            }
        }
    }
}
