use std::path::Path;

use cmdkeep_core::db::{CommandRepository, LibSqlCommandRepository};

use crate::commands::common::{normalize_command_identifier, open_database, resolve_command};
use crate::error::CliError;

/// Print the command text so it can be piped or evaluated, and count the use.
pub async fn run_use(id: &str, db_path: &Path) -> Result<(), CliError> {
    let normalized_id = normalize_command_identifier(id)?;
    let db = open_database(db_path).await?;
    let repo = LibSqlCommandRepository::new(db.connection());
    let mut command = resolve_command(&normalized_id, &repo).await?;

    command.record_use();
    repo.update(&command).await?;

    println!("{}", command.command);
    Ok(())
}
