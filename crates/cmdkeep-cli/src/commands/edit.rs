use std::path::Path;

use cmdkeep_core::db::{CommandRepository, LibSqlCommandRepository};
use cmdkeep_core::Command;

use crate::commands::common::{
    capture_editor_input_with_initial, normalize_command_identifier, normalize_text,
    open_database, resolve_command,
};
use crate::error::CliError;

/// Field replacements given on the command line.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CommandEdits {
    pub command: Option<String>,
    pub prompt: Option<String>,
    pub description: Option<String>,
    pub tags: Option<Vec<String>>,
}

impl CommandEdits {
    pub const fn is_empty(&self) -> bool {
        self.command.is_none()
            && self.prompt.is_none()
            && self.description.is_none()
            && self.tags.is_none()
    }

    /// Apply the edits; returns whether any content field changed.
    pub fn apply_to(self, target: &mut Command) -> Result<bool, CliError> {
        let before = target.content_hash();

        if let Some(text) = self.command {
            target.command = normalize_text(&text).ok_or(CliError::EmptyCommand)?;
        }
        if let Some(prompt) = self.prompt {
            target.prompt = prompt.trim().to_string();
        }
        if let Some(description) = self.description {
            target.description = normalize_text(&description);
        }
        if let Some(tags) = self.tags {
            target.set_tags(tags);
        }

        Ok(target.content_hash() != before)
    }
}

pub fn render_edit_template(command: &Command) -> String {
    format!(
        "command: {}\nprompt: {}\ndescription: {}\ntags: {}\n",
        command.command,
        command.prompt,
        command.description.as_deref().unwrap_or_default(),
        command.tags.join(", ")
    )
}

/// Read the `key: value` lines written by [`render_edit_template`].
///
/// Unknown keys and lines without a colon are ignored.
pub fn parse_edit_template(raw: &str) -> CommandEdits {
    let mut edits = CommandEdits::default();
    for line in raw.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim().to_string();
        match key.trim().to_ascii_lowercase().as_str() {
            "command" => edits.command = Some(value),
            "prompt" => edits.prompt = Some(value),
            "description" => edits.description = Some(value),
            "tags" => {
                edits.tags = Some(
                    value
                        .split(',')
                        .map(str::trim)
                        .filter(|tag| !tag.is_empty())
                        .map(str::to_string)
                        .collect(),
                );
            }
            _ => {}
        }
    }
    edits
}

pub async fn run_edit(id: &str, edits: CommandEdits, db_path: &Path) -> Result<(), CliError> {
    let normalized_id = normalize_command_identifier(id)?;
    let db = open_database(db_path).await?;
    let repo = LibSqlCommandRepository::new(db.connection());
    let mut command = resolve_command(&normalized_id, &repo).await?;

    let edits = if edits.is_empty() {
        let Some(edited) = capture_editor_input_with_initial(&render_edit_template(&command))?
        else {
            return Err(CliError::EmptyCommand);
        };
        parse_edit_template(&edited)
    } else {
        edits
    };

    if edits.apply_to(&mut command)? {
        command.touch();
        repo.update(&command).await?;
    }

    println!("{}", command.id);
    Ok(())
}
