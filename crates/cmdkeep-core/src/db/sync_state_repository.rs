//! Per-profile sync state: gist id, last sync time and the resolution log

#![allow(clippy::cast_possible_wrap)]

use chrono::{DateTime, Utc};
use libsql::params::Params;
use libsql::{Connection, Value};

use crate::error::{Error, Result};
use crate::models::{timestamp, ResolutionRecord, Resolutions, SyncConflict};

/// Trait for sync state storage operations (async)
#[allow(async_fn_in_trait)]
pub trait SyncStateRepository {
    async fn load_gist_id(&self, profile: &str) -> Result<Option<String>>;

    async fn save_gist_id(&self, profile: &str, gist_id: &str) -> Result<()>;

    async fn clear_gist_id(&self, profile: &str) -> Result<()>;

    async fn load_last_synced_at(&self, profile: &str) -> Result<Option<DateTime<Utc>>>;

    async fn save_last_synced_at(&self, profile: &str, synced_at: DateTime<Utc>) -> Result<()>;

    /// Log every conflict that has an entry in `resolutions`
    async fn record_resolutions(
        &self,
        profile: &str,
        conflicts: &[SyncConflict],
        resolutions: &Resolutions,
        resolved_at: DateTime<Utc>,
    ) -> Result<usize>;

    /// Most recent resolutions first
    async fn list_resolutions(&self, profile: &str, limit: usize) -> Result<Vec<ResolutionRecord>>;
}

/// libSQL implementation of `SyncStateRepository`
pub struct LibSqlSyncStateRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlSyncStateRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    async fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let mut rows = self
            .conn
            .query("SELECT value FROM settings WHERE key = ?", [key])
            .await?;

        if let Some(row) = rows.next().await? {
            let value: String = row.get(0)?;
            Ok(Some(value))
        } else {
            Ok(None)
        }
    }

    async fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO settings (key, value) VALUES (?, ?)",
                [key, value],
            )
            .await?;
        Ok(())
    }

    async fn delete_setting(&self, key: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM settings WHERE key = ?", [key])
            .await?;
        Ok(())
    }
}

fn gist_id_key(profile: &str) -> String {
    format!("gist_id:{profile}")
}

fn last_synced_key(profile: &str) -> String {
    format!("last_synced_at:{profile}")
}

impl SyncStateRepository for LibSqlSyncStateRepository<'_> {
    async fn load_gist_id(&self, profile: &str) -> Result<Option<String>> {
        Ok(self
            .get_setting(&gist_id_key(profile))
            .await?
            .filter(|value| !value.trim().is_empty()))
    }

    async fn save_gist_id(&self, profile: &str, gist_id: &str) -> Result<()> {
        self.set_setting(&gist_id_key(profile), gist_id.trim()).await
    }

    async fn clear_gist_id(&self, profile: &str) -> Result<()> {
        self.delete_setting(&gist_id_key(profile)).await
    }

    async fn load_last_synced_at(&self, profile: &str) -> Result<Option<DateTime<Utc>>> {
        Ok(self
            .get_setting(&last_synced_key(profile))
            .await?
            .and_then(|raw| timestamp::parse(&raw)))
    }

    async fn save_last_synced_at(&self, profile: &str, synced_at: DateTime<Utc>) -> Result<()> {
        self.set_setting(&last_synced_key(profile), &timestamp::format(&synced_at))
            .await
    }

    async fn record_resolutions(
        &self,
        profile: &str,
        conflicts: &[SyncConflict],
        resolutions: &Resolutions,
        resolved_at: DateTime<Utc>,
    ) -> Result<usize> {
        let mut recorded = 0;
        for conflict in conflicts {
            let Some(resolution) = resolutions.get(&conflict.command_id) else {
                continue;
            };

            self.conn
                .execute(
                    "INSERT INTO sync_resolutions (
                        profile, command_id, conflict_kind, resolution,
                        local_updated_at, remote_updated_at, resolved_at
                    ) VALUES (?, ?, ?, ?, ?, ?, ?)",
                    Params::Positional(vec![
                        Value::Text(profile.to_string()),
                        Value::Text(conflict.command_id.clone()),
                        Value::Text(conflict.kind.as_str().to_string()),
                        Value::Text(resolution.as_str().to_string()),
                        Value::Text(timestamp::format(&conflict.local.updated_at)),
                        Value::Text(timestamp::format(&conflict.remote.updated_at)),
                        Value::Text(timestamp::format(&resolved_at)),
                    ]),
                )
                .await?;
            recorded += 1;
        }
        Ok(recorded)
    }

    async fn list_resolutions(&self, profile: &str, limit: usize) -> Result<Vec<ResolutionRecord>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, command_id, conflict_kind, resolution,
                        local_updated_at, remote_updated_at, resolved_at
                 FROM sync_resolutions
                 WHERE profile = ?
                 ORDER BY resolved_at DESC, id DESC
                 LIMIT ?",
                Params::Positional(vec![
                    Value::Text(profile.to_string()),
                    Value::Integer(limit as i64),
                ]),
            )
            .await?;

        let mut records = Vec::new();
        while let Some(row) = rows.next().await? {
            let kind: String = row.get(2)?;
            let resolution: String = row.get(3)?;
            records.push(ResolutionRecord {
                id: row.get(0)?,
                command_id: row.get(1)?,
                kind: kind.parse().map_err(Error::Database)?,
                resolution: resolution.parse().map_err(Error::Database)?,
                local_updated_at: parse_time(&row.get::<String>(4)?)?,
                remote_updated_at: parse_time(&row.get::<String>(5)?)?,
                resolved_at: parse_time(&row.get::<String>(6)?)?,
            });
        }
        Ok(records)
    }
}

fn parse_time(raw: &str) -> Result<DateTime<Utc>> {
    timestamp::parse(raw).ok_or_else(|| Error::Database(format!("invalid timestamp '{raw}'")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::models::{Command, ConflictKind, ConflictResolution};

    async fn setup() -> Database {
        Database::open_in_memory().await.unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_gist_id_is_scoped_per_profile() {
        let db = setup().await;
        let repo = LibSqlSyncStateRepository::new(db.connection());

        assert_eq!(repo.load_gist_id("default").await.unwrap(), None);

        repo.save_gist_id("default", "abc").await.unwrap();
        repo.save_gist_id("work", "xyz").await.unwrap();
        assert_eq!(
            repo.load_gist_id("default").await.unwrap().as_deref(),
            Some("abc")
        );

        repo.clear_gist_id("default").await.unwrap();
        assert_eq!(repo.load_gist_id("default").await.unwrap(), None);
        assert_eq!(
            repo.load_gist_id("work").await.unwrap().as_deref(),
            Some("xyz")
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_last_synced_at_round_trip() {
        let db = setup().await;
        let repo = LibSqlSyncStateRepository::new(db.connection());
        let now = timestamp::now();

        repo.save_last_synced_at("default", now).await.unwrap();
        assert_eq!(
            repo.load_last_synced_at("default").await.unwrap(),
            Some(now)
        );
        assert_eq!(repo.load_last_synced_at("other").await.unwrap(), None);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_record_and_list_resolutions() {
        let db = setup().await;
        let repo = LibSqlSyncStateRepository::new(db.connection());

        let local = Command::new("ls", "");
        let mut remote = local.clone();
        remote.command = "ls -a".to_string();
        let conflicts = vec![
            SyncConflict {
                command_id: "resolved".to_string(),
                local: local.clone(),
                remote: remote.clone(),
                kind: ConflictKind::Modified,
            },
            SyncConflict {
                command_id: "skipped".to_string(),
                local,
                remote,
                kind: ConflictKind::DeletedRemote,
            },
        ];
        let resolutions =
            Resolutions::from([("resolved".to_string(), ConflictResolution::KeepBoth)]);

        let recorded = repo
            .record_resolutions("default", &conflicts, &resolutions, timestamp::now())
            .await
            .unwrap();
        assert_eq!(recorded, 1);

        let listed = repo.list_resolutions("default", 10).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].command_id, "resolved");
        assert_eq!(listed[0].kind, ConflictKind::Modified);
        assert_eq!(listed[0].resolution, ConflictResolution::KeepBoth);
        assert!(repo.list_resolutions("work", 10).await.unwrap().is_empty());
    }
}
