//! Command repository implementation

#![allow(clippy::cast_possible_wrap)] // SQLite uses i64 for LIMIT/OFFSET

use chrono::{DateTime, Utc};
use libsql::params::Params;
use libsql::{Connection, Row, Value};

use crate::error::{Error, Result};
use crate::models::{timestamp, Command, CommandId};
use crate::util::normalize_text_option;

const COLUMNS: &str = "id, sync_id, command, prompt, description, tags, usage_count, favorite, \
                       created_at, updated_at, last_synced_at, deleted_at";

/// Trait for command storage operations (async)
#[allow(async_fn_in_trait)]
pub trait CommandRepository {
    /// Create and store a new command
    async fn create(
        &self,
        command: &str,
        prompt: &str,
        description: Option<&str>,
        tags: &[String],
    ) -> Result<Command>;

    /// Store a fully built record as-is
    async fn insert(&self, command: &Command) -> Result<()>;

    /// Get a visible (not tombstoned) command by ID
    async fn get(&self, id: &CommandId) -> Result<Option<Command>>;

    /// List visible commands, most recently updated first
    async fn list(&self, limit: usize, offset: usize) -> Result<Vec<Command>>;

    /// Every stored record, tombstones included, in storage order
    async fn list_all(&self) -> Result<Vec<Command>>;

    /// Substring search over command, prompt, description and tags
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<Command>>;

    /// Persist every field of an existing visible command
    async fn update(&self, command: &Command) -> Result<()>;

    /// Tombstone a command so the deletion can sync
    async fn soft_delete(&self, id: &CommandId) -> Result<()>;

    /// IDs of visible commands starting with `prefix`, most recent first
    async fn list_ids_by_prefix(&self, prefix: &str, limit: usize) -> Result<Vec<String>>;

    /// Replace the whole stored collection in one transaction
    async fn replace_all(&self, commands: &[Command]) -> Result<()>;
}

/// libSQL implementation of `CommandRepository`
pub struct LibSqlCommandRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlCommandRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    async fn query_commands(&self, sql: &str, params: Params) -> Result<Vec<Command>> {
        let mut rows = self.conn.query(sql, params).await?;
        let mut commands = Vec::new();
        while let Some(row) = rows.next().await? {
            commands.push(parse_command(&row)?);
        }
        Ok(commands)
    }

    async fn insert_row(&self, command: &Command) -> Result<()> {
        let sql = format!(
            "INSERT INTO commands ({COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        );
        self.conn
            .execute(&sql, Params::Positional(command_values(command)?))
            .await?;
        Ok(())
    }

    async fn rewrite(&self, commands: &[Command]) -> Result<()> {
        self.conn.execute("DELETE FROM commands", ()).await?;
        for command in commands {
            self.insert_row(command).await?;
        }
        Ok(())
    }
}

impl CommandRepository for LibSqlCommandRepository<'_> {
    async fn create(
        &self,
        command: &str,
        prompt: &str,
        description: Option<&str>,
        tags: &[String],
    ) -> Result<Command> {
        let text = command.trim();
        if text.is_empty() {
            return Err(Error::InvalidInput("command must not be empty".into()));
        }

        let mut record = Command::new(text, prompt.trim());
        record.description = normalize_text_option(description.map(str::to_string));
        record.set_tags(tags);

        self.insert_row(&record).await?;
        Ok(record)
    }

    async fn insert(&self, command: &Command) -> Result<()> {
        self.insert_row(command).await
    }

    async fn get(&self, id: &CommandId) -> Result<Option<Command>> {
        let sql = format!("SELECT {COLUMNS} FROM commands WHERE id = ? AND deleted_at IS NULL");
        let mut found = self
            .query_commands(&sql, Params::Positional(vec![text_value(id.as_str())]))
            .await?;
        Ok(found.pop())
    }

    async fn list(&self, limit: usize, offset: usize) -> Result<Vec<Command>> {
        let sql = format!(
            "SELECT {COLUMNS}
             FROM commands
             WHERE deleted_at IS NULL
             ORDER BY updated_at DESC, rowid DESC
             LIMIT ? OFFSET ?"
        );
        self.query_commands(
            &sql,
            Params::Positional(vec![
                Value::Integer(limit as i64),
                Value::Integer(offset as i64),
            ]),
        )
        .await
    }

    async fn list_all(&self) -> Result<Vec<Command>> {
        let sql = format!("SELECT {COLUMNS} FROM commands ORDER BY rowid");
        self.query_commands(&sql, Params::None).await
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<Command>> {
        let query = query.trim();
        if query.is_empty() {
            return self.list(limit, 0).await;
        }

        let pattern = format!("%{}%", escape_like(&query.to_lowercase()));
        let sql = format!(
            "SELECT {COLUMNS}
             FROM commands
             WHERE deleted_at IS NULL
               AND (lower(command) LIKE ?1 ESCAPE '\\'
                    OR lower(prompt) LIKE ?1 ESCAPE '\\'
                    OR lower(COALESCE(description, '')) LIKE ?1 ESCAPE '\\'
                    OR lower(tags) LIKE ?1 ESCAPE '\\')
             ORDER BY favorite DESC, usage_count DESC, updated_at DESC
             LIMIT ?2"
        );
        self.query_commands(
            &sql,
            Params::Positional(vec![Value::Text(pattern), Value::Integer(limit as i64)]),
        )
        .await
    }

    async fn update(&self, command: &Command) -> Result<()> {
        let mut values = command_values(command)?;
        // Move `id` from the front to the WHERE clause.
        let id = values.remove(0);
        values.push(id);

        let rows = self
            .conn
            .execute(
                "UPDATE commands
                 SET sync_id = ?, command = ?, prompt = ?, description = ?, tags = ?,
                     usage_count = ?, favorite = ?, created_at = ?, updated_at = ?,
                     last_synced_at = ?, deleted_at = ?
                 WHERE id = ? AND deleted_at IS NULL",
                Params::Positional(values),
            )
            .await?;

        if rows == 0 {
            return Err(Error::NotFound(command.id.to_string()));
        }
        Ok(())
    }

    async fn soft_delete(&self, id: &CommandId) -> Result<()> {
        let now = timestamp::format(&timestamp::now());

        let rows = self
            .conn
            .execute(
                "UPDATE commands SET deleted_at = ?1, updated_at = ?1 WHERE id = ?2 AND deleted_at IS NULL",
                Params::Positional(vec![Value::Text(now), text_value(id.as_str())]),
            )
            .await?;

        if rows == 0 {
            return Err(Error::NotFound(id.to_string()));
        }

        Ok(())
    }

    async fn list_ids_by_prefix(&self, prefix: &str, limit: usize) -> Result<Vec<String>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id
                 FROM commands
                 WHERE deleted_at IS NULL AND id LIKE ? ESCAPE '\\'
                 ORDER BY updated_at DESC
                 LIMIT ?",
                Params::Positional(vec![
                    Value::Text(format!("{}%", escape_like(prefix))),
                    Value::Integer(limit as i64),
                ]),
            )
            .await?;

        let mut ids = Vec::new();
        while let Some(row) = rows.next().await? {
            ids.push(row.get::<String>(0)?);
        }
        Ok(ids)
    }

    async fn replace_all(&self, commands: &[Command]) -> Result<()> {
        self.conn.execute("BEGIN TRANSACTION", ()).await?;

        if let Err(error) = self.rewrite(commands).await {
            self.conn.execute("ROLLBACK", ()).await.ok();
            return Err(error);
        }

        if let Err(e) = self.conn.execute("COMMIT", ()).await {
            self.conn.execute("ROLLBACK", ()).await.ok();
            return Err(e.into());
        }

        tracing::debug!(count = commands.len(), "Replaced stored command collection");
        Ok(())
    }
}

fn command_values(command: &Command) -> Result<Vec<Value>> {
    Ok(vec![
        text_value(command.id.as_str()),
        optional_text_value(command.sync_id.as_deref()),
        text_value(&command.command),
        text_value(&command.prompt),
        optional_text_value(command.description.as_deref()),
        Value::Text(serde_json::to_string(&command.tags)?),
        Value::Integer(i64::from(command.usage_count)),
        Value::Integer(i64::from(command.favorite)),
        Value::Text(timestamp::format(&command.created_at)),
        Value::Text(timestamp::format(&command.updated_at)),
        optional_time_value(command.last_synced_at.as_ref()),
        optional_time_value(command.deleted_at.as_ref()),
    ])
}

fn parse_command(row: &Row) -> Result<Command> {
    let tags_raw: String = row.get(5)?;
    let tags = serde_json::from_str(&tags_raw)
        .map_err(|error| Error::Database(format!("invalid tags '{tags_raw}': {error}")))?;
    let usage_count: i64 = row.get(6)?;
    let usage_count = u32::try_from(usage_count)
        .map_err(|_| Error::Database(format!("invalid usage count {usage_count}")))?;

    Ok(Command {
        id: CommandId::from(row.get::<String>(0)?),
        sync_id: optional_text(row, 1)?,
        command: row.get(2)?,
        prompt: row.get(3)?,
        description: optional_text(row, 4)?,
        tags,
        usage_count,
        favorite: row.get::<i64>(7)? != 0,
        created_at: required_time(row, 8)?,
        updated_at: required_time(row, 9)?,
        last_synced_at: optional_text(row, 10)?
            .map(|raw| parse_time(&raw))
            .transpose()?,
        deleted_at: optional_text(row, 11)?
            .map(|raw| parse_time(&raw))
            .transpose()?,
    })
}

fn optional_text(row: &Row, index: i32) -> Result<Option<String>> {
    match row.get_value(index)? {
        Value::Null => Ok(None),
        Value::Text(text) => Ok(Some(text)),
        other => Err(Error::Database(format!(
            "expected text in column {index}, found {other:?}"
        ))),
    }
}

fn required_time(row: &Row, index: i32) -> Result<DateTime<Utc>> {
    let raw: String = row.get(index)?;
    parse_time(&raw)
}

fn parse_time(raw: &str) -> Result<DateTime<Utc>> {
    timestamp::parse(raw).ok_or_else(|| Error::Database(format!("invalid timestamp '{raw}'")))
}

fn text_value(value: &str) -> Value {
    Value::Text(value.to_string())
}

fn optional_text_value(value: Option<&str>) -> Value {
    value.map_or(Value::Null, text_value)
}

fn optional_time_value(value: Option<&DateTime<Utc>>) -> Value {
    value.map_or(Value::Null, |time| Value::Text(timestamp::format(time)))
}

fn escape_like(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}
