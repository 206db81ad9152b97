//! One sync run between the local store and the remote gist.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use libsql::Connection;
use serde::{Deserialize, Serialize};

use super::gist::GistClient;
use crate::db::{
    CommandRepository, LibSqlCommandRepository, LibSqlSyncStateRepository, SyncStateRepository,
};
use crate::error::{Error, Result};
use crate::merge::{
    apply_resolutions_at, detect_conflicts, fast_forward_unconflicted, merge_commands_at,
    pending_tombstones,
};
use crate::models::{timestamp, ConflictResolution, Resolutions, SyncConflict, SyncPayload};

/// Interactive source of conflict resolutions.
pub trait ConflictResolver {
    /// Choose a resolution for `conflict` (1-based `position` of `total`).
    ///
    /// `None` aborts the whole sync before anything is written.
    fn resolve(
        &mut self,
        conflict: &SyncConflict,
        position: usize,
        total: usize,
    ) -> Option<ConflictResolution>;
}

impl<F> ConflictResolver for F
where
    F: FnMut(&SyncConflict, usize, usize) -> Option<ConflictResolution>,
{
    fn resolve(
        &mut self,
        conflict: &SyncConflict,
        position: usize,
        total: usize,
    ) -> Option<ConflictResolution> {
        self(conflict, position, total)
    }
}

/// Standing answer for every conflict of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionPolicy {
    /// Ask the resolver for each conflict
    #[default]
    Ask,
    KeepLocal,
    KeepRemote,
}

impl ResolutionPolicy {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ask => "ask",
            Self::KeepLocal => "keep_local",
            Self::KeepRemote => "keep_remote",
        }
    }

    const fn fixed_resolution(self) -> Option<ConflictResolution> {
        match self {
            Self::Ask => None,
            Self::KeepLocal => Some(ConflictResolution::KeepLocal),
            Self::KeepRemote => Some(ConflictResolution::KeepRemote),
        }
    }
}

impl fmt::Display for ResolutionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResolutionPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "ask" => Ok(Self::Ask),
            "keep_local" | "local" => Ok(Self::KeepLocal),
            "keep_remote" | "remote" => Ok(Self::KeepRemote),
            other => Err(format!(
                "unknown conflict policy '{other}' (expected ask, keep_local or keep_remote)"
            )),
        }
    }
}

/// Outcome of a completed sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub local_count: usize,
    pub remote_count: usize,
    pub result_count: usize,
    pub conflicts: usize,
    pub gist_id: Option<String>,
    pub created_gist: bool,
    pub sync_version: u64,
    pub synced_at: DateTime<Utc>,
}

/// Run a full sync for `profile`.
///
/// Fetch, detect, resolve, then write locally and push. Every conflict must
/// be resolved before anything is written; a cancelled resolution returns
/// [`Error::Cancelled`] with the local store and the gist untouched.
///
/// Local tombstones the remote still holds live are kept in both the stored
/// collection and the pushed payload until the remote copy is a tombstone
/// too. If the push fails the local collection is restored to its pre-sync
/// state, so no record looks reconciled with a gist that never received it.
/// The resolution log, the gist id and the last sync time are persisted only
/// once the push succeeded.
pub async fn run_sync<R>(
    conn: &Connection,
    client: &mut GistClient,
    profile: &str,
    policy: ResolutionPolicy,
    resolver: &mut R,
) -> Result<SyncReport>
where
    R: ConflictResolver + ?Sized,
{
    let commands = LibSqlCommandRepository::new(conn);
    let state = LibSqlSyncStateRepository::new(conn);

    let snapshot = commands.list_all().await?;
    let mut local = snapshot.clone();
    for command in &mut local {
        command.ensure_sync_id();
    }

    let remote = client.fetch().await?;
    let remote_version = remote
        .as_ref()
        .and_then(|payload| payload.sync_version)
        .unwrap_or(0);
    let remote_commands = remote.map(|payload| payload.commands).unwrap_or_default();
    let gist_before_push = client.gist_id().map(str::to_string);

    let conflicts = detect_conflicts(&local, &remote_commands);
    let now = timestamp::now();

    let (result, resolutions) = if conflicts.is_empty() {
        (
            merge_commands_at(&local, &remote_commands, now),
            Resolutions::new(),
        )
    } else {
        tracing::info!(count = conflicts.len(), "Sync found conflicts");
        let resolutions = collect_resolutions(&conflicts, policy, resolver)?;
        let base = fast_forward_unconflicted(&local, &remote_commands, &conflicts, now);
        let mut result =
            apply_resolutions_at(&conflicts, &resolutions, &base, &remote_commands, now);
        // Every conflict is resolved at this point, so the whole result is reconciled.
        for command in &mut result {
            command.ensure_sync_id();
            command.last_synced_at = Some(now);
        }
        (result, resolutions)
    };

    let result_count = result.len();
    let tombstones = pending_tombstones(&local, &remote_commands, &result, now);
    let mut collection = result;
    collection.extend(tombstones);

    commands.replace_all(&collection).await?;

    let sync_version = remote_version.saturating_add(1);
    let payload = SyncPayload::new(collection, Some(sync_version));
    if let Err(error) = client.update(&payload).await {
        tracing::warn!(error = %error, "Gist push failed; restoring local collection");
        commands.replace_all(&snapshot).await?;
        return Err(error.into());
    }

    state
        .record_resolutions(profile, &conflicts, &resolutions, now)
        .await?;
    let gist_id = client.gist_id().map(str::to_string);
    if let Some(id) = &gist_id {
        state.save_gist_id(profile, id).await?;
    }
    state.save_last_synced_at(profile, now).await?;

    let report = SyncReport {
        local_count: local.iter().filter(|command| !command.is_deleted()).count(),
        remote_count: remote_commands
            .iter()
            .filter(|command| !command.is_deleted())
            .count(),
        result_count,
        conflicts: conflicts.len(),
        created_gist: gist_id.is_some() && gist_id != gist_before_push,
        gist_id,
        sync_version,
        synced_at: now,
    };
    tracing::info!(
        profile,
        result = report.result_count,
        conflicts = report.conflicts,
        sync_version,
        "Sync completed"
    );
    Ok(report)
}

fn collect_resolutions<R>(
    conflicts: &[SyncConflict],
    policy: ResolutionPolicy,
    resolver: &mut R,
) -> Result<Resolutions>
where
    R: ConflictResolver + ?Sized,
{
    let total = conflicts.len();
    let mut resolutions = Resolutions::with_capacity(total);
    for (index, conflict) in conflicts.iter().enumerate() {
        let resolution = match policy.fixed_resolution() {
            Some(resolution) => resolution,
            None => resolver
                .resolve(conflict, index + 1, total)
                .ok_or(Error::Cancelled)?,
        };
        resolutions.insert(conflict.command_id.clone(), resolution);
    }
    Ok(resolutions)
}

/// Adopt an existing gist holding the collection, if the account has one.
pub async fn link_remote(
    conn: &Connection,
    client: &mut GistClient,
    profile: &str,
) -> Result<Option<String>> {
    if !client.discover().await {
        return Ok(None);
    }
    let Some(gist_id) = client.gist_id().map(str::to_string) else {
        return Ok(None);
    };
    LibSqlSyncStateRepository::new(conn)
        .save_gist_id(profile, &gist_id)
        .await?;
    Ok(Some(gist_id))
}

/// Forget the gist linked to `profile`. The gist itself is left in place.
pub async fn unlink_remote(conn: &Connection, profile: &str) -> Result<()> {
    LibSqlSyncStateRepository::new(conn)
        .clear_gist_id(profile)
        .await
}
