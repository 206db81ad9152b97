use std::path::Path;

use cmdkeep_core::transfer::{import_from_file, ImportMode};

use crate::cli::ImportModeArg;
use crate::commands::common::open_database;
use crate::error::CliError;
use crate::prompt::TerminalFilePrompt;

impl From<ImportModeArg> for ImportMode {
    fn from(value: ImportModeArg) -> Self {
        match value {
            ImportModeArg::Merge => Self::Merge,
            ImportModeArg::Replace => Self::Replace,
        }
    }
}

pub async fn run_import(
    input_path: Option<&Path>,
    mode: Option<ImportModeArg>,
    db_path: &Path,
) -> Result<(), CliError> {
    let db = open_database(db_path).await?;
    let mut prompt = TerminalFilePrompt {
        import_path: input_path.map(Path::to_path_buf),
        import_mode: mode.map(ImportMode::from),
        ..TerminalFilePrompt::default()
    };

    match import_from_file(db.connection(), &mut prompt).await {
        Ok(count) => {
            println!("Imported {count} commands");
            Ok(())
        }
        Err(error) => Err(prompt.take_failure().unwrap_or_else(|| error.into())),
    }
}
