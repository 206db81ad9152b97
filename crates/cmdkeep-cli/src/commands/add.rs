use std::path::Path;

use cmdkeep_core::db::{CommandRepository, LibSqlCommandRepository};

use crate::commands::common::{open_database, resolve_command_text};
use crate::error::CliError;

pub async fn run_add(
    command_parts: &[String],
    prompt: Option<&str>,
    description: Option<&str>,
    tags: &[String],
    db_path: &Path,
) -> Result<(), CliError> {
    let text = resolve_command_text(command_parts)?;

    let db = open_database(db_path).await?;
    let repo = LibSqlCommandRepository::new(db.connection());
    let command = repo
        .create(&text, prompt.unwrap_or_default(), description, tags)
        .await?;

    println!("{}", command.id);
    Ok(())
}
