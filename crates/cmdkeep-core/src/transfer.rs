//! File export and import of the collection, in the sync payload format.

use std::path::{Path, PathBuf};

use libsql::Connection;

use crate::db::{CommandRepository, LibSqlCommandRepository};
use crate::error::{Error, Result};
use crate::merge::merge_commands;
use crate::models::{Command, SyncPayload};

/// How imported records combine with the existing collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportMode {
    /// Union with the existing collection, latest `updatedAt` wins
    Merge,
    /// Discard the existing collection
    Replace,
}

/// File picker and import choice supplied by the user interface.
///
/// Every method returns `None` when the user backs out.
pub trait FilePrompt {
    fn export_path(&mut self, suggested_name: &str) -> Option<PathBuf>;

    fn import_path(&mut self) -> Option<PathBuf>;

    /// Ask how `incoming` records should combine with `existing` ones.
    fn import_mode(&mut self, incoming: usize, existing: usize) -> Option<ImportMode>;
}

/// Default export file name for a timestamp in unix milliseconds.
#[must_use]
pub fn suggested_export_file_name(timestamp_ms: i64) -> String {
    format!("cmdkeep-export-{timestamp_ms}.json")
}

/// Write every stored record, tombstones included, to a user-chosen file.
///
/// Returns the number of records written.
pub async fn export_to_file<P>(conn: &Connection, prompt: &mut P) -> Result<usize>
where
    P: FilePrompt + ?Sized,
{
    let suggested = suggested_export_file_name(chrono::Utc::now().timestamp_millis());
    let path = prompt.export_path(&suggested).ok_or(Error::Cancelled)?;

    let commands = LibSqlCommandRepository::new(conn).list_all().await?;
    let count = commands.len();
    write_payload_file(&path, &SyncPayload::new(commands, None))?;

    tracing::info!(count, path = %path.display(), "Exported commands");
    Ok(count)
}

/// Read a user-chosen payload file into the local store.
///
/// The file is validated before the user is asked for the import mode, so a
/// malformed file fails with [`Error::Format`] and leaves the store untouched.
/// Returns the number of records imported.
pub async fn import_from_file<P>(conn: &Connection, prompt: &mut P) -> Result<usize>
where
    P: FilePrompt + ?Sized,
{
    let path = prompt.import_path().ok_or(Error::Cancelled)?;
    let payload = read_payload_file(&path)?;

    let repo = LibSqlCommandRepository::new(conn);
    let existing = repo.list_all().await?;
    let incoming = payload
        .commands
        .iter()
        .filter(|command| !command.is_deleted())
        .count();
    let visible = existing
        .iter()
        .filter(|command| !command.is_deleted())
        .count();

    let mode = prompt
        .import_mode(incoming, visible)
        .ok_or(Error::Cancelled)?;
    let result = import_commands(&existing, &payload.commands, mode);
    repo.replace_all(&result).await?;

    tracing::info!(count = incoming, ?mode, path = %path.display(), "Imported commands");
    Ok(incoming)
}

/// Combine `incoming` with `existing` according to `mode`.
pub fn import_commands(existing: &[Command], incoming: &[Command], mode: ImportMode) -> Vec<Command> {
    match mode {
        ImportMode::Merge => merge_commands(existing, incoming),
        ImportMode::Replace => incoming
            .iter()
            .filter(|command| !command.is_deleted())
            .cloned()
            .collect(),
    }
}

/// Read and validate a payload file.
pub fn read_payload_file(path: &Path) -> Result<SyncPayload> {
    let raw = std::fs::read_to_string(path)?;
    SyncPayload::parse(&raw).map_err(Error::Format)
}

/// Write `payload` as pretty-printed JSON, creating parent directories.
pub fn write_payload_file(path: &Path, payload: &SyncPayload) -> Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, payload.to_json()?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    #[derive(Default)]
    struct ScriptedPrompt {
        export_path: Option<PathBuf>,
        import_path: Option<PathBuf>,
        mode: Option<ImportMode>,
        asked_mode: Option<(usize, usize)>,
        suggested: Option<String>,
    }

    impl FilePrompt for ScriptedPrompt {
        fn export_path(&mut self, suggested_name: &str) -> Option<PathBuf> {
            self.suggested = Some(suggested_name.to_string());
            self.export_path.clone()
        }

        fn import_path(&mut self) -> Option<PathBuf> {
            self.import_path.clone()
        }

        fn import_mode(&mut self, incoming: usize, existing: usize) -> Option<ImportMode> {
            self.asked_mode = Some((incoming, existing));
            self.mode
        }
    }

    #[test]
    fn suggested_export_file_name_uses_timestamp() {
        assert_eq!(
            suggested_export_file_name(1_700_000_000_000),
            "cmdkeep-export-1700000000000.json"
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn export_writes_all_records_including_tombstones() {
        let db = Database::open_in_memory().await.unwrap();
        let repo = LibSqlCommandRepository::new(db.connection());
        repo.create("ls", "", None, &[]).await.unwrap();
        let gone = repo.create("rm", "", None, &[]).await.unwrap();
        repo.soft_delete(&gone.id).await.unwrap();

        let tmp = tempdir().unwrap();
        let path = tmp.path().join("out").join("export.json");
        let mut prompt = ScriptedPrompt {
            export_path: Some(path.clone()),
            ..ScriptedPrompt::default()
        };

        let count = export_to_file(db.connection(), &mut prompt).await.unwrap();
        assert_eq!(count, 2);
        assert!(prompt
            .suggested
            .unwrap()
            .starts_with("cmdkeep-export-"));

        let payload = read_payload_file(&path).unwrap();
        assert_eq!(payload.commands, repo.list_all().await.unwrap());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn export_cancelled_when_no_path_chosen() {
        let db = Database::open_in_memory().await.unwrap();
        let mut prompt = ScriptedPrompt::default();

        let error = export_to_file(db.connection(), &mut prompt)
            .await
            .unwrap_err();
        assert!(error.is_cancelled());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn import_merge_keeps_existing_records() {
        let db = Database::open_in_memory().await.unwrap();
        let repo = LibSqlCommandRepository::new(db.connection());
        repo.create("existing", "", None, &[]).await.unwrap();

        let tmp = tempdir().unwrap();
        let path = tmp.path().join("import.json");
        write_payload_file(
            &path,
            &SyncPayload::new(vec![Command::new("imported", "")], None),
        )
        .unwrap();

        let mut prompt = ScriptedPrompt {
            import_path: Some(path),
            mode: Some(ImportMode::Merge),
            ..ScriptedPrompt::default()
        };
        let count = import_from_file(db.connection(), &mut prompt).await.unwrap();

        assert_eq!(count, 1);
        assert_eq!(prompt.asked_mode, Some((1, 1)));
        let texts = repo
            .list_all()
            .await
            .unwrap()
            .into_iter()
            .map(|command| command.command)
            .collect::<Vec<_>>();
        assert_eq!(texts, vec!["existing", "imported"]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn import_replace_discards_existing_records() {
        let db = Database::open_in_memory().await.unwrap();
        let repo = LibSqlCommandRepository::new(db.connection());
        repo.create("existing", "", None, &[]).await.unwrap();

        let mut tombstone = Command::new("deleted elsewhere", "");
        tombstone.mark_deleted();
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("import.json");
        write_payload_file(
            &path,
            &SyncPayload::new(vec![Command::new("imported", ""), tombstone], None),
        )
        .unwrap();

        let mut prompt = ScriptedPrompt {
            import_path: Some(path),
            mode: Some(ImportMode::Replace),
            ..ScriptedPrompt::default()
        };
        let count = import_from_file(db.connection(), &mut prompt).await.unwrap();

        assert_eq!(count, 1);
        let stored = repo.list_all().await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].command, "imported");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn import_rejects_malformed_file_without_touching_store() {
        let db = Database::open_in_memory().await.unwrap();
        let repo = LibSqlCommandRepository::new(db.connection());
        let existing = repo.create("existing", "", None, &[]).await.unwrap();

        let tmp = tempdir().unwrap();
        let path = tmp.path().join("broken.json");
        std::fs::write(&path, r#"{"version": "1.0", "commands": {}}"#).unwrap();

        let mut prompt = ScriptedPrompt {
            import_path: Some(path),
            mode: Some(ImportMode::Replace),
            ..ScriptedPrompt::default()
        };
        let error = import_from_file(db.connection(), &mut prompt)
            .await
            .unwrap_err();

        assert!(matches!(error, Error::Format(_)));
        assert_eq!(prompt.asked_mode, None);
        assert_eq!(repo.list_all().await.unwrap(), vec![existing]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn import_cancelled_at_mode_choice() {
        let db = Database::open_in_memory().await.unwrap();
        let repo = LibSqlCommandRepository::new(db.connection());
        let existing = repo.create("existing", "", None, &[]).await.unwrap();

        let tmp = tempdir().unwrap();
        let path = tmp.path().join("import.json");
        write_payload_file(&path, &SyncPayload::new(vec![], None)).unwrap();

        let mut prompt = ScriptedPrompt {
            import_path: Some(path),
            ..ScriptedPrompt::default()
        };
        let error = import_from_file(db.connection(), &mut prompt)
            .await
            .unwrap_err();

        assert!(error.is_cancelled());
        assert_eq!(repo.list_all().await.unwrap(), vec![existing]);
    }
}
