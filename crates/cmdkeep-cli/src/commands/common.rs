use std::env;
use std::io::{self, IsTerminal, Read};
use std::path::{Path, PathBuf};
use std::process::Command as Process;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};
use cmdkeep_core::db::{CommandRepository, Database, LibSqlCommandRepository};
use cmdkeep_core::models::ResolutionRecord;
use cmdkeep_core::util::single_line_preview;
use cmdkeep_core::{Command, CommandId};
use serde::Serialize;

use crate::error::CliError;

#[derive(Debug, Serialize)]
pub struct CommandListItem {
    pub id: String,
    pub command: String,
    pub prompt: String,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub usage_count: u32,
    pub favorite: bool,
    pub created_at: i64,
    pub updated_at: i64,
    pub relative_time: String,
}

#[derive(Debug, Serialize)]
pub struct ResolutionItem {
    pub id: i64,
    pub command_id: String,
    pub kind: String,
    pub resolution: String,
    pub local_updated_at: String,
    pub remote_updated_at: String,
    pub resolved_at: String,
}

pub async fn resolve_command(
    query: &str,
    repo: &LibSqlCommandRepository<'_>,
) -> Result<Command, CliError> {
    let exact = CommandId::from(query);
    if let Some(command) = repo.get(&exact).await? {
        return Ok(command);
    }

    let matching_ids = repo.list_ids_by_prefix(query, 3).await?;

    match matching_ids.as_slice() {
        [] => Err(CliError::CommandNotFound(query.to_string())),
        [only] => repo
            .get(&CommandId::from(only.as_str()))
            .await?
            .ok_or_else(|| CliError::CommandNotFound(query.to_string())),
        _ => {
            let options = matching_ids
                .iter()
                .map(|id| short_id(id))
                .collect::<Vec<_>>()
                .join(", ");

            Err(CliError::AmbiguousCommandId(format!(
                "ID prefix '{query}' is ambiguous; matches: {options}"
            )))
        }
    }
}

pub fn short_id(id: &str) -> String {
    id.chars().take(13).collect()
}

pub fn format_command_lines(commands: &[Command]) -> Vec<String> {
    let now_ms = Utc::now().timestamp_millis();
    commands
        .iter()
        .map(|command| {
            let short_id = short_id(command.id.as_str());
            let marker = if command.favorite { '*' } else { ' ' };
            let preview = single_line_preview(&command.command, 40);
            let relative_time = format_relative_time(command.updated_at.timestamp_millis(), now_ms);
            let tags = render_tags(command);
            let prompt = single_line_preview(&command.prompt, 40);

            let mut line = format!("{short_id:<13} {marker} {preview:<40}  {relative_time:<10}");
            if !prompt.is_empty() {
                line.push_str("  ");
                line.push_str(&prompt);
            }
            if !tags.is_empty() {
                line.push_str("  ");
                line.push_str(&tags);
            }
            line.trim_end().to_string()
        })
        .collect()
}

pub fn command_to_list_item(command: &Command) -> CommandListItem {
    let now_ms = Utc::now().timestamp_millis();
    let updated_at = command.updated_at.timestamp_millis();

    CommandListItem {
        id: command.id.to_string(),
        command: command.command.clone(),
        prompt: command.prompt.clone(),
        description: command.description.clone(),
        tags: command.tags.clone(),
        usage_count: command.usage_count,
        favorite: command.favorite,
        created_at: command.created_at.timestamp_millis(),
        updated_at,
        relative_time: format_relative_time(updated_at, now_ms),
    }
}

pub fn render_tags(command: &Command) -> String {
    command
        .tags
        .iter()
        .map(|tag| format!("#{tag}"))
        .collect::<Vec<String>>()
        .join(" ")
}

pub fn resolution_to_item(record: &ResolutionRecord) -> ResolutionItem {
    ResolutionItem {
        id: record.id,
        command_id: record.command_id.clone(),
        kind: record.kind.to_string(),
        resolution: record.resolution.to_string(),
        local_updated_at: record.local_updated_at.to_rfc3339(),
        remote_updated_at: record.remote_updated_at.to_rfc3339(),
        resolved_at: record.resolved_at.to_rfc3339(),
    }
}

pub fn format_resolution_lines(records: &[ResolutionRecord]) -> Vec<String> {
    records
        .iter()
        .map(|record| {
            format!(
                "{}  {:<11}  {:<14}  command={}  local={} remote={}",
                format_sync_timestamp(record.resolved_at),
                record.resolution,
                record.kind,
                short_id(&record.command_id),
                format_sync_timestamp(record.local_updated_at),
                format_sync_timestamp(record.remote_updated_at)
            )
        })
        .collect()
}

pub fn format_sync_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

pub fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;
    let month = 30 * day;
    let year = 365 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else if diff < month {
        format!("{}w ago", diff / week)
    } else if diff < year {
        format!("{}mo ago", diff / month)
    } else {
        format!("{}y ago", diff / year)
    }
}

/// Command text from arguments, then piped stdin.
pub fn resolve_command_text(parts: &[String]) -> Result<String, CliError> {
    if let Some(text) = normalize_text(&parts.join(" ")) {
        return Ok(text);
    }

    if let Some(text) = read_piped_stdin()? {
        return Ok(text);
    }

    Err(CliError::EmptyCommand)
}

pub fn normalize_text(text: &str) -> Option<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

pub fn normalize_search_query(query: &str) -> Result<String, CliError> {
    normalize_text(query).ok_or(CliError::EmptySearchQuery)
}

pub fn normalize_command_identifier(id: &str) -> Result<String, CliError> {
    normalize_text(id).ok_or(CliError::EmptyCommandId)
}

pub fn read_piped_stdin() -> Result<Option<String>, CliError> {
    let stdin = io::stdin();
    if stdin.is_terminal() {
        return Ok(None);
    }

    let mut buffer = String::new();
    stdin.lock().read_to_string(&mut buffer)?;
    Ok(normalize_text(&buffer))
}

pub fn capture_editor_input_with_initial(
    initial_content: &str,
) -> Result<Option<String>, CliError> {
    let editor = preferred_editor();
    let temp_file = create_temp_edit_file_path();
    std::fs::write(&temp_file, initial_content)?;

    let launch_result = launch_editor(&editor, &temp_file);
    let edited = std::fs::read_to_string(&temp_file)?;
    let _ = std::fs::remove_file(&temp_file);

    launch_result?;
    Ok(normalize_text(&edited))
}

pub fn launch_editor(editor: &str, file_path: &Path) -> Result<(), CliError> {
    match Process::new(editor).arg(file_path).status() {
        Ok(status) => {
            if status.success() {
                Ok(())
            } else {
                Err(CliError::EditorFailed(format!(
                    "`{editor}` exited with status {status}"
                )))
            }
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            let mut parts = editor.split_whitespace();
            let Some(program) = parts.next() else {
                return Err(CliError::EditorFailed("empty EDITOR command".into()));
            };

            let status = Process::new(program).args(parts).arg(file_path).status()?;
            if status.success() {
                Ok(())
            } else {
                Err(CliError::EditorFailed(format!(
                    "`{editor}` exited with status {status}"
                )))
            }
        }
        Err(err) => Err(CliError::Io(err)),
    }
}

pub fn preferred_editor() -> String {
    env::var("VISUAL")
        .or_else(|_| env::var("EDITOR"))
        .unwrap_or_else(|_| default_editor().to_string())
}

pub const fn default_editor() -> &'static str {
    if cfg!(windows) {
        "notepad"
    } else {
        "vi"
    }
}

pub fn create_temp_edit_file_path() -> PathBuf {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| duration.as_nanos());
    env::temp_dir().join(format!("cmdkeep-edit-{}-{now}.txt", std::process::id()))
}

pub fn resolve_db_path(cli_db_path: Option<PathBuf>) -> Result<PathBuf, CliError> {
    if let Some(path) = cli_db_path.or_else(|| env::var_os("CMDKEEP_DB_PATH").map(PathBuf::from))
    {
        return Ok(path);
    }
    default_db_path()
}

pub fn default_db_path() -> Result<PathBuf, CliError> {
    dirs::data_dir()
        .map(|dir| dir.join("cmdkeep").join("cmdkeep.db"))
        .ok_or_else(|| CliError::Config("Failed to resolve CLI data directory".to_string()))
}

pub async fn open_database(path: &Path) -> Result<Database, CliError> {
    Ok(Database::open(path).await?)
}
