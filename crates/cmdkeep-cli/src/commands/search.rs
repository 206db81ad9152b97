use std::path::Path;

use cmdkeep_core::db::{CommandRepository, LibSqlCommandRepository};

use crate::commands::common::{normalize_search_query, open_database};
use crate::commands::list::print_commands;
use crate::error::CliError;

pub async fn run_search(
    query: &str,
    limit: usize,
    as_json: bool,
    db_path: &Path,
) -> Result<(), CliError> {
    let normalized_query = normalize_search_query(query)?;
    let db = open_database(db_path).await?;
    let commands = LibSqlCommandRepository::new(db.connection())
        .search(&normalized_query, limit)
        .await?;

    print_commands(&commands, as_json)
}
