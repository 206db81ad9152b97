use std::path::Path;

use cmdkeep_core::db::{CommandRepository, LibSqlCommandRepository};

use crate::commands::common::{normalize_command_identifier, open_database, resolve_command};
use crate::error::CliError;

pub async fn run_delete(id: &str, db_path: &Path) -> Result<(), CliError> {
    let normalized_id = normalize_command_identifier(id)?;
    let db = open_database(db_path).await?;
    let repo = LibSqlCommandRepository::new(db.connection());
    let command = resolve_command(&normalized_id, &repo).await?;

    repo.soft_delete(&command.id).await?;
    println!("{}", command.id);
    Ok(())
}
