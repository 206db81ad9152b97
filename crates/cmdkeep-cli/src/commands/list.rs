use std::path::Path;

use cmdkeep_core::db::{CommandRepository, LibSqlCommandRepository};
use cmdkeep_core::Command;

use crate::commands::common::{
    command_to_list_item, format_command_lines, open_database, CommandListItem,
};
use crate::error::CliError;

pub async fn list_commands(
    limit: usize,
    favorites_only: bool,
    db_path: &Path,
) -> Result<Vec<Command>, CliError> {
    let db = open_database(db_path).await?;
    let repo = LibSqlCommandRepository::new(db.connection());

    if !favorites_only {
        return Ok(repo.list(limit, 0).await?);
    }

    let mut favorites = repo
        .list_all()
        .await?
        .into_iter()
        .filter(|command| command.favorite && !command.is_deleted())
        .collect::<Vec<_>>();
    favorites.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
    favorites.truncate(limit);
    Ok(favorites)
}

pub fn print_commands(commands: &[Command], as_json: bool) -> Result<(), CliError> {
    if as_json {
        let json_items = commands
            .iter()
            .map(command_to_list_item)
            .collect::<Vec<CommandListItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
    } else {
        for line in format_command_lines(commands) {
            println!("{line}");
        }
    }
    Ok(())
}

pub async fn run_list(
    limit: usize,
    favorites_only: bool,
    as_json: bool,
    db_path: &Path,
) -> Result<(), CliError> {
    let commands = list_commands(limit, favorites_only, db_path).await?;
    print_commands(&commands, as_json)
}
