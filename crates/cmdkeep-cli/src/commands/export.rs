use std::path::Path;

use cmdkeep_core::transfer::export_to_file;

use crate::commands::common::open_database;
use crate::error::CliError;
use crate::prompt::TerminalFilePrompt;

pub async fn run_export(output_path: Option<&Path>, db_path: &Path) -> Result<(), CliError> {
    let db = open_database(db_path).await?;
    let mut prompt = TerminalFilePrompt {
        export_path: output_path.map(Path::to_path_buf),
        ..TerminalFilePrompt::default()
    };

    match export_to_file(db.connection(), &mut prompt).await {
        Ok(count) => {
            println!("Exported {count} commands");
            Ok(())
        }
        Err(error) => Err(prompt.take_failure().unwrap_or_else(|| error.into())),
    }
}
