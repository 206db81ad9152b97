//! Merge engine: conflict detection, conflict-free merge and resolution.
//!
//! Every function here is pure. Collections are matched by
//! [`Command::sync_key`], and outputs follow a fixed order: keys in the order
//! they first appear in `local`, then keys only present in `remote` in their
//! `remote` order. Functions that stamp `lastSyncedAt` come in pairs; the
//! `_at` variant takes "now" explicitly.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::models::{
    timestamp, Command, CommandId, ConflictKind, ConflictResolution, Resolutions, SyncConflict,
};

/// Suffix appended to the prompt of a remote copy kept by `keep_both`.
pub const KEEP_BOTH_MARKER: &str = "(from sync)";

/// Find the records that cannot be merged automatically.
///
/// At most one conflict is reported per key. A tombstone on exactly one side
/// yields `deleted_local`/`deleted_remote`; otherwise differing content
/// yields `modified` only when both sides changed since their last sync.
pub fn detect_conflicts(local: &[Command], remote: &[Command]) -> Vec<SyncConflict> {
    let local = KeyedCollection::from_commands(local);
    let remote = KeyedCollection::from_commands(remote);

    local
        .iter()
        .filter_map(|local_copy| {
            let remote_copy = remote.get(local_copy.sync_key())?;
            classify(local_copy, remote_copy).map(|kind| SyncConflict {
                command_id: local_copy.sync_key().to_string(),
                local: local_copy.clone(),
                remote: remote_copy.clone(),
                kind,
            })
        })
        .collect()
}

fn classify(local: &Command, remote: &Command) -> Option<ConflictKind> {
    match (local.is_deleted(), remote.is_deleted()) {
        (true, false) => Some(ConflictKind::DeletedLocal),
        (false, true) => Some(ConflictKind::DeletedRemote),
        (true, true) => None,
        (false, false) => {
            if local.content_hash() == remote.content_hash() {
                return None;
            }
            (local.changed_since_sync() && remote.changed_since_sync())
                .then_some(ConflictKind::Modified)
        }
    }
}

/// Conflict-free union of both collections, stamped with the current time.
pub fn merge_commands(local: &[Command], remote: &[Command]) -> Vec<Command> {
    merge_commands_at(local, remote, timestamp::now())
}

/// Conflict-free union: the strictly later `updatedAt` wins, ties keep the
/// local copy. Every kept record is stamped `lastSyncedAt = now`; tombstones
/// take part in "latest wins" and are dropped from the result afterwards.
pub fn merge_commands_at(
    local: &[Command],
    remote: &[Command],
    now: DateTime<Utc>,
) -> Vec<Command> {
    let mut merged = KeyedCollection::from_commands(local);

    for candidate in remote {
        match merged.get(candidate.sync_key()) {
            Some(current) if candidate.updated_at <= current.updated_at => {}
            _ => merged.set(candidate.clone()),
        }
    }

    merged
        .into_vec()
        .into_iter()
        .map(|command| stamp_synced(command, now))
        .filter(|command| !command.is_deleted())
        .collect()
}

/// Apply user resolutions, stamped with the current time.
pub fn apply_resolutions(
    conflicts: &[SyncConflict],
    resolutions: &Resolutions,
    local: &[Command],
    remote: &[Command],
) -> Vec<Command> {
    apply_resolutions_at(conflicts, resolutions, local, remote, timestamp::now())
}

/// Build the final collection from the chosen resolutions.
///
/// The result is seeded with `local` plus remote-only keys. Resolved
/// conflicts then replace their key; unresolved conflicts keep the seeded
/// local copy, so a partial resolution map still gives a well-defined
/// result. Tombstones are dropped last.
pub fn apply_resolutions_at(
    conflicts: &[SyncConflict],
    resolutions: &Resolutions,
    local: &[Command],
    remote: &[Command],
    now: DateTime<Utc>,
) -> Vec<Command> {
    let mut result = KeyedCollection::from_commands(local);
    for candidate in remote {
        if !result.contains(candidate.sync_key()) {
            result.set(candidate.clone());
        }
    }

    for conflict in conflicts {
        let Some(resolution) = resolutions.get(&conflict.command_id) else {
            continue;
        };

        match resolution {
            ConflictResolution::KeepLocal => {
                result.set(stamp_synced(conflict.local.clone(), now));
            }
            ConflictResolution::KeepRemote => {
                result.set(stamp_synced(conflict.remote.clone(), now));
            }
            ConflictResolution::KeepBoth => {
                result.set(stamp_synced(conflict.local.clone(), now));
                if !conflict.remote.is_deleted() {
                    result.set(duplicate_for_keep_both(&conflict.remote, now));
                }
            }
        }
    }

    result
        .into_vec()
        .into_iter()
        .filter(|command| !command.is_deleted())
        .collect()
}

/// Prepare the local side for [`apply_resolutions_at`] when a sync has conflicts.
///
/// Keys present on both sides that are not in conflict are reconciled the
/// way [`merge_commands_at`] would (later `updatedAt` wins, stamped `now`),
/// so a one-sided edit is not lost just because another record conflicts.
/// Conflicting keys and local-only keys are returned untouched.
pub fn fast_forward_unconflicted(
    local: &[Command],
    remote: &[Command],
    conflicts: &[SyncConflict],
    now: DateTime<Utc>,
) -> Vec<Command> {
    let remote = KeyedCollection::from_commands(remote);
    let mut base = KeyedCollection::from_commands(local);
    let conflicted = conflicts
        .iter()
        .map(|conflict| conflict.command_id.as_str())
        .collect::<Vec<_>>();

    for current in base.items.iter_mut() {
        let key = current.sync_key().to_string();
        if conflicted.contains(&key.as_str()) {
            continue;
        }
        let Some(remote_copy) = remote.get(&key) else {
            continue;
        };

        let winner = if remote_copy.updated_at > current.updated_at {
            remote_copy.clone()
        } else {
            current.clone()
        };
        *current = stamp_synced(winner, now);
    }

    base.into_vec()
}

/// Local tombstones the remote has not observed yet.
///
/// A local tombstone whose key is missing from the visible `result` while
/// the remote still holds a live copy has to travel with the next push, or
/// the other side keeps its copy and sends it back. Tombstones the remote
/// already holds, and tombstones for keys the remote never had, are not
/// returned. Returned records are stamped `lastSyncedAt = now`.
pub fn pending_tombstones(
    local: &[Command],
    remote: &[Command],
    result: &[Command],
    now: DateTime<Utc>,
) -> Vec<Command> {
    let remote = KeyedCollection::from_commands(remote);
    let visible = KeyedCollection::from_commands(result);

    KeyedCollection::from_commands(local)
        .into_vec()
        .into_iter()
        .filter(|command| command.is_deleted() && !visible.contains(command.sync_key()))
        .filter(|command| {
            remote
                .get(command.sync_key())
                .is_some_and(|remote_copy| !remote_copy.is_deleted())
        })
        .map(|command| stamp_synced(command, now))
        .collect()
}

fn stamp_synced(mut command: Command, now: DateTime<Utc>) -> Command {
    command.ensure_sync_id();
    command.last_synced_at = Some(now);
    command
}

fn duplicate_for_keep_both(remote: &Command, now: DateTime<Utc>) -> Command {
    let id = CommandId::new();
    let mut copy = remote.clone();
    copy.sync_id = Some(id.to_string());
    copy.id = id;
    copy.prompt = if copy.prompt.trim().is_empty() {
        KEEP_BOTH_MARKER.to_string()
    } else {
        format!("{} {KEEP_BOTH_MARKER}", copy.prompt)
    };
    copy.last_synced_at = Some(now);
    copy
}

/// Ordered collection with one record per sync key.
struct KeyedCollection {
    items: Vec<Command>,
    positions: HashMap<String, usize>,
}

impl KeyedCollection {
    /// Index `commands`; a repeated key keeps the copy with the later `updatedAt`.
    fn from_commands(commands: &[Command]) -> Self {
        let mut collection = Self {
            items: Vec::with_capacity(commands.len()),
            positions: HashMap::with_capacity(commands.len()),
        };
        for command in commands {
            match collection.get(command.sync_key()) {
                Some(existing) if command.updated_at <= existing.updated_at => {}
                _ => collection.set(command.clone()),
            }
        }
        collection
    }

    fn get(&self, key: &str) -> Option<&Command> {
        self.positions.get(key).map(|&index| &self.items[index])
    }

    fn contains(&self, key: &str) -> bool {
        self.positions.contains_key(key)
    }

    /// Replace the record under the command's key in place, or append it.
    fn set(&mut self, command: Command) {
        if let Some(&index) = self.positions.get(command.sync_key()) {
            self.items[index] = command;
        } else {
            self.positions
                .insert(command.sync_key().to_string(), self.items.len());
            self.items.push(command);
        }
    }

    fn iter(&self) -> impl Iterator<Item = &Command> {
        self.items.iter()
    }

    fn into_vec(self) -> Vec<Command> {
        self.items
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap()
    }

    fn record(key: &str, text: &str, updated_day: u32, synced_day: Option<u32>) -> Command {
        Command {
            id: CommandId::from(key),
            sync_id: Some(key.to_string()),
            command: text.to_string(),
            prompt: String::new(),
            description: None,
            tags: Vec::new(),
            usage_count: 0,
            favorite: false,
            created_at: at(1),
            updated_at: at(updated_day),
            last_synced_at: synced_day.map(at),
            deleted_at: None,
        }
    }

    fn tombstone(mut command: Command, day: u32) -> Command {
        command.deleted_at = Some(at(day));
        command.updated_at = at(day);
        command
    }

    fn keys(commands: &[Command]) -> Vec<&str> {
        commands.iter().map(Command::sync_key).collect()
    }

    fn without_sync_stamp(mut commands: Vec<Command>) -> Vec<Command> {
        for command in &mut commands {
            command.last_synced_at = None;
        }
        commands.sort_by(|left, right| left.sync_key().cmp(right.sync_key()));
        commands
    }

    #[test]
    fn only_remote_changed_is_not_a_conflict_and_merge_takes_remote() {
        let local = vec![record("1", "ls -la", 1, Some(1))];
        let remote = vec![record("1", "ls -la -h", 2, Some(1))];

        assert!(detect_conflicts(&local, &remote).is_empty());

        let merged = merge_commands_at(&local, &remote, at(5));
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].command, "ls -la -h");
        assert_eq!(merged[0].last_synced_at, Some(at(5)));
    }

    #[test]
    fn both_changed_since_sync_is_modified_conflict() {
        let local = vec![record("2", "git log", 3, Some(1))];
        let remote = vec![record("2", "git log --oneline", 4, Some(1))];

        let conflicts = detect_conflicts(&local, &remote);
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].command_id, "2");
        assert_eq!(conflicts[0].kind, ConflictKind::Modified);

        let resolutions = Resolutions::from([("2".to_string(), ConflictResolution::KeepRemote)]);
        let result = apply_resolutions_at(&conflicts, &resolutions, &local, &remote, at(9));
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].command, "git log --oneline");
        assert_eq!(result[0].last_synced_at, Some(at(9)));
    }

    #[test]
    fn never_synced_copies_with_different_content_conflict() {
        let local = vec![record("k", "make", 2, None)];
        let remote = vec![record("k", "make all", 3, None)];
        let conflicts = detect_conflicts(&local, &remote);
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].kind, ConflictKind::Modified);
    }

    #[test]
    fn equal_content_never_conflicts() {
        let local = vec![record("k", "make", 2, None)];
        let remote = vec![record("k", "make", 3, None)];
        assert!(detect_conflicts(&local, &remote).is_empty());
    }

    #[test]
    fn one_sided_tombstones_are_reported_once_per_key() {
        let local = vec![
            tombstone(record("a", "ls", 1, Some(1)), 2),
            record("b", "pwd", 1, Some(1)),
        ];
        let remote = vec![
            record("a", "ls -1", 3, Some(1)),
            tombstone(record("b", "pwd -P", 3, Some(1)), 3),
        ];

        let conflicts = detect_conflicts(&local, &remote);
        let kinds = conflicts
            .iter()
            .map(|conflict| (conflict.command_id.as_str(), conflict.kind))
            .collect::<Vec<_>>();
        assert_eq!(
            kinds,
            vec![
                ("a", ConflictKind::DeletedLocal),
                ("b", ConflictKind::DeletedRemote)
            ]
        );
    }

    #[test]
    fn conflicts_follow_local_order() {
        let local = vec![
            record("z", "one", 3, Some(1)),
            record("a", "two", 3, Some(1)),
        ];
        let remote = vec![
            record("a", "two!", 4, Some(1)),
            record("z", "one!", 4, Some(1)),
        ];
        let conflicts = detect_conflicts(&local, &remote);
        assert_eq!(
            conflicts
                .iter()
                .map(|conflict| conflict.command_id.as_str())
                .collect::<Vec<_>>(),
            vec!["z", "a"]
        );
    }

    #[test]
    fn merge_keeps_local_order_then_remote_only_keys() {
        let local = vec![record("b", "b", 1, None), record("a", "a", 1, None)];
        let remote = vec![record("c", "c", 1, None), record("a", "a", 1, None)];

        let merged = merge_commands_at(&local, &remote, at(2));
        assert_eq!(keys(&merged), vec!["b", "a", "c"]);
        assert!(merged
            .iter()
            .all(|command| command.last_synced_at == Some(at(2))));
    }

    #[test]
    fn merge_tie_keeps_local_copy() {
        let local = vec![record("k", "local", 2, None)];
        let remote = vec![record("k", "remote", 2, None)];
        let merged = merge_commands_at(&local, &remote, at(3));
        assert_eq!(merged[0].command, "local");
    }

    #[test]
    fn merge_drops_tombstones_after_latest_wins() {
        let local = vec![record("k", "live", 2, Some(1))];
        let remote = vec![
            tombstone(record("k", "live", 1, Some(1)), 3),
            tombstone(record("gone", "x", 1, None), 2),
        ];
        let merged = merge_commands_at(&local, &remote, at(4));
        assert!(merged.is_empty());

        // An older remote tombstone loses to the newer live local copy.
        let remote = vec![tombstone(record("k", "live", 1, Some(1)), 1)];
        let local = vec![record("k", "live", 2, Some(1))];
        let merged = merge_commands_at(&local, &remote, at(4));
        assert_eq!(keys(&merged), vec!["k"]);
    }

    #[test]
    fn merge_assigns_sync_id_on_first_sync() {
        let mut fresh = Command::new("cargo test", "");
        fresh.sync_id = None;
        let merged = merge_commands_at(&[fresh.clone()], &[], at(2));
        assert_eq!(merged[0].sync_id.as_deref(), Some(fresh.id.as_str()));
    }

    #[test]
    fn merge_is_idempotent() {
        let local = vec![
            record("a", "alpha", 2, Some(1)),
            record("b", "beta", 1, Some(1)),
        ];
        let remote = vec![
            record("b", "beta 2", 3, Some(1)),
            record("c", "gamma", 1, None),
        ];

        let once = merge_commands_at(&local, &remote, at(5));
        let twice = merge_commands_at(&once, &remote, at(5));
        assert_eq!(once, twice);
    }

    #[test]
    fn merge_is_commutative_apart_from_stamps() {
        let left = vec![
            record("a", "alpha", 2, Some(1)),
            record("b", "beta", 1, Some(1)),
            record("only-left", "l", 1, None),
        ];
        let right = vec![
            record("b", "beta 2", 3, Some(1)),
            record("a", "alpha old", 1, Some(1)),
            record("only-right", "r", 1, None),
        ];

        let forward = without_sync_stamp(merge_commands_at(&left, &right, at(5)));
        let backward = without_sync_stamp(merge_commands_at(&right, &left, at(6)));
        assert_eq!(forward, backward);
        assert_eq!(
            forward
                .iter()
                .map(|command| command.command.as_str())
                .collect::<Vec<_>>(),
            vec!["alpha", "beta 2", "l", "r"]
        );
    }

    #[test]
    fn keep_both_preserves_both_contents_under_distinct_keys() {
        let local = vec![record("k", "docker ps", 3, Some(1))];
        let mut remote_copy = record("k", "docker ps -a", 4, Some(1));
        remote_copy.prompt = "list containers".to_string();
        let remote = vec![remote_copy];

        let conflicts = detect_conflicts(&local, &remote);
        let resolutions = Resolutions::from([("k".to_string(), ConflictResolution::KeepBoth)]);
        let result = apply_resolutions_at(&conflicts, &resolutions, &local, &remote, at(7));

        assert_eq!(result.len(), 2);
        assert_eq!(result[0].sync_key(), "k");
        assert_eq!(result[0].command, "docker ps");
        assert_ne!(result[1].sync_key(), "k");
        assert_ne!(result[1].id.as_str(), "k");
        assert_eq!(result[1].command, "docker ps -a");
        assert_eq!(result[1].prompt, "list containers (from sync)");
        assert!(result
            .iter()
            .all(|command| command.last_synced_at == Some(at(7))));
    }

    #[test]
    fn keep_local_tombstone_removes_record_for_any_input_order() {
        let deleted = tombstone(record("t", "rm -rf", 2, Some(1)), 2);
        let live = record("t", "rm -rf ./tmp", 3, Some(1));
        let other_local = record("x", "echo", 1, Some(1));
        let other_remote = record("y", "date", 1, Some(1));

        for (local, remote) in [
            (
                vec![deleted.clone(), other_local.clone()],
                vec![live.clone(), other_remote.clone()],
            ),
            (
                vec![other_local.clone(), deleted.clone()],
                vec![other_remote.clone(), live.clone()],
            ),
        ] {
            let conflicts = detect_conflicts(&local, &remote);
            assert_eq!(conflicts.len(), 1);
            assert_eq!(conflicts[0].kind, ConflictKind::DeletedLocal);

            let resolutions =
                Resolutions::from([("t".to_string(), ConflictResolution::KeepLocal)]);
            let result = apply_resolutions_at(&conflicts, &resolutions, &local, &remote, at(4));
            assert!(result.iter().all(|command| command.sync_key() != "t"));
            assert_eq!(result.len(), 2);
        }
    }

    #[test]
    fn keep_both_on_local_deletion_keeps_remote_content_under_new_key() {
        let local = vec![tombstone(record("k", "kubectl get pods", 1, Some(1)), 3)];
        let mut edited = record("k", "kubectl get pods -A", 4, Some(1));
        edited.prompt = "all pods".to_string();
        let remote = vec![edited];

        let conflicts = detect_conflicts(&local, &remote);
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].kind, ConflictKind::DeletedLocal);

        let resolutions = Resolutions::from([("k".to_string(), ConflictResolution::KeepBoth)]);
        let result = apply_resolutions_at(&conflicts, &resolutions, &local, &remote, at(6));

        assert_eq!(result.len(), 1);
        assert_ne!(result[0].sync_key(), "k");
        assert!(!result[0].is_deleted());
        assert_eq!(result[0].command, "kubectl get pods -A");
        assert_eq!(result[0].prompt, "all pods (from sync)");
        assert_eq!(result[0].last_synced_at, Some(at(6)));
    }

    #[test]
    fn pending_tombstones_carry_deletions_the_remote_has_not_seen() {
        let local = vec![
            tombstone(record("deleted-here", "ls", 1, Some(1)), 3),
            tombstone(record("deleted-both", "pwd", 1, Some(1)), 3),
            tombstone(record("never-pushed", "cd", 1, None), 2),
            tombstone(record("kept-remote", "top", 1, Some(1)), 2),
            record("live", "echo", 1, Some(1)),
        ];
        let remote = vec![
            record("deleted-here", "ls", 1, Some(1)),
            tombstone(record("deleted-both", "pwd", 1, Some(1)), 2),
            record("kept-remote", "htop", 4, Some(1)),
            record("live", "echo", 1, Some(1)),
        ];
        // "kept-remote" was answered keep_remote, so its live copy is visible.
        let result = vec![
            record("kept-remote", "htop", 4, Some(7)),
            record("live", "echo", 1, Some(7)),
        ];

        let pending = pending_tombstones(&local, &remote, &result, at(7));
        assert_eq!(keys(&pending), vec!["deleted-here"]);
        assert!(pending[0].is_deleted());
        assert_eq!(pending[0].last_synced_at, Some(at(7)));

        // The other side adopts the deletion through the conflict-free merge.
        let other_device = vec![record("deleted-here", "ls", 1, Some(1))];
        assert!(merge_commands_at(&other_device, &pending, at(8)).is_empty());
    }

    #[test]
    fn unresolved_conflicts_keep_the_local_copy() {
        let local = vec![
            record("a", "local a", 3, Some(1)),
            record("b", "local b", 3, Some(1)),
        ];
        let remote = vec![
            record("a", "remote a", 4, Some(1)),
            record("b", "remote b", 4, Some(1)),
            record("c", "remote only", 2, None),
        ];
        let conflicts = detect_conflicts(&local, &remote);
        assert_eq!(conflicts.len(), 2);

        let resolutions = Resolutions::from([("b".to_string(), ConflictResolution::KeepRemote)]);
        let result = apply_resolutions_at(&conflicts, &resolutions, &local, &remote, at(6));

        assert_eq!(keys(&result), vec!["a", "b", "c"]);
        assert_eq!(result[0].command, "local a");
        assert_eq!(result[0].last_synced_at, Some(at(1)));
        assert_eq!(result[1].command, "remote b");
        assert_eq!(result[2].command, "remote only");
    }

    #[test]
    fn fast_forward_takes_one_sided_edits_but_leaves_conflicts() {
        let local = vec![
            record("conflict", "mine", 3, Some(1)),
            record("edited-remotely", "old", 1, Some(1)),
            record("local-only", "solo", 2, None),
        ];
        let remote = vec![
            record("conflict", "theirs", 4, Some(1)),
            record("edited-remotely", "new", 2, Some(1)),
        ];
        let conflicts = detect_conflicts(&local, &remote);
        assert_eq!(conflicts.len(), 1);

        let base = fast_forward_unconflicted(&local, &remote, &conflicts, at(8));
        assert_eq!(base[0].command, "mine");
        assert_eq!(base[1].command, "new");
        assert_eq!(base[1].last_synced_at, Some(at(8)));
        assert_eq!(base[2], local[2]);
    }
}
