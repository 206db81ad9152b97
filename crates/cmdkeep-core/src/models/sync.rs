//! Sync payload and conflict models

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::timestamp;
use super::Command;

/// Payload format version written by this client.
pub const PAYLOAD_VERSION: &str = "1.0";

/// How the two copies of a record disagree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    /// Both sides edited the content since their last shared sync
    Modified,
    /// Local copy is tombstoned, remote copy is live
    DeletedLocal,
    /// Remote copy is tombstoned, local copy is live
    DeletedRemote,
}

impl ConflictKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Modified => "modified",
            Self::DeletedLocal => "deleted_local",
            Self::DeletedRemote => "deleted_remote",
        }
    }
}

impl fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConflictKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "modified" => Ok(Self::Modified),
            "deleted_local" => Ok(Self::DeletedLocal),
            "deleted_remote" => Ok(Self::DeletedRemote),
            other => Err(format!("unknown conflict kind '{other}'")),
        }
    }
}

/// User choice for a single conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictResolution {
    KeepLocal,
    KeepRemote,
    /// Keep the local copy and add the remote copy under a new key
    KeepBoth,
}

impl ConflictResolution {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::KeepLocal => "keep_local",
            Self::KeepRemote => "keep_remote",
            Self::KeepBoth => "keep_both",
        }
    }
}

impl fmt::Display for ConflictResolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConflictResolution {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "keep_local" => Ok(Self::KeepLocal),
            "keep_remote" => Ok(Self::KeepRemote),
            "keep_both" => Ok(Self::KeepBoth),
            other => Err(format!("unknown conflict resolution '{other}'")),
        }
    }
}

/// Resolutions chosen for a set of conflicts, keyed by `SyncConflict::command_id`.
pub type Resolutions = HashMap<String, ConflictResolution>;

/// A record both sides hold in incompatible states. Derived, never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncConflict {
    /// Sync key shared by both copies
    pub command_id: String,
    pub local: Command,
    pub remote: Command,
    #[serde(rename = "type")]
    pub kind: ConflictKind,
}

/// Logged outcome of one resolved conflict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionRecord {
    /// Log row identifier
    pub id: i64,
    pub command_id: String,
    pub kind: ConflictKind,
    pub resolution: ConflictResolution,
    pub local_updated_at: DateTime<Utc>,
    pub remote_updated_at: DateTime<Utc>,
    pub resolved_at: DateTime<Utc>,
}

/// Wire and file format of a synced collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncPayload {
    pub version: String,
    pub commands: Vec<Command>,
    #[serde(with = "timestamp")]
    pub exported_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync_version: Option<u64>,
}

impl SyncPayload {
    /// Build a payload stamped with the current time.
    #[must_use]
    pub fn new(commands: Vec<Command>, sync_version: Option<u64>) -> Self {
        Self {
            version: PAYLOAD_VERSION.to_string(),
            commands,
            exported_at: timestamp::now(),
            sync_version,
        }
    }

    /// Parse and validate a raw payload.
    ///
    /// The JSON shape is checked first (`version` string, `commands` array,
    /// `exportedAt` string) so a wrong document is reported by field rather
    /// than by serde position. Duplicate sync keys collapse to the copy with
    /// the later `updatedAt`.
    pub fn parse(raw: &str) -> Result<Self, String> {
        let value: Value =
            serde_json::from_str(raw).map_err(|error| format!("invalid JSON: {error}"))?;
        let Some(object) = value.as_object() else {
            return Err("payload must be a JSON object".to_string());
        };
        if !object.get("version").is_some_and(Value::is_string) {
            return Err("'version' must be a string".to_string());
        }
        if !object.get("commands").is_some_and(Value::is_array) {
            return Err("'commands' must be an array".to_string());
        }
        if !object.get("exportedAt").is_some_and(Value::is_string) {
            return Err("'exportedAt' must be a string".to_string());
        }

        let payload: Self = serde_json::from_value(value)
            .map_err(|error| format!("invalid payload content: {error}"))?;
        Ok(payload.deduplicated())
    }

    /// Render as pretty-printed JSON.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    fn deduplicated(mut self) -> Self {
        let mut positions: HashMap<String, usize> = HashMap::new();
        let mut unique: Vec<Command> = Vec::with_capacity(self.commands.len());

        for command in self.commands.drain(..) {
            match positions.get(command.sync_key()) {
                Some(&index) => {
                    if command.updated_at > unique[index].updated_at {
                        unique[index] = command;
                    }
                }
                None => {
                    positions.insert(command.sync_key().to_string(), unique.len());
                    unique.push(command);
                }
            }
        }

        self.commands = unique;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_rejects_wrong_shapes() {
        let missing_version = r#"{"commands": [], "exportedAt": "2024-01-01T00:00:00Z"}"#;
        assert!(SyncPayload::parse(missing_version)
            .unwrap_err()
            .contains("version"));

        let commands_not_array =
            r#"{"version": "1.0", "commands": {}, "exportedAt": "2024-01-01T00:00:00Z"}"#;
        assert!(SyncPayload::parse(commands_not_array)
            .unwrap_err()
            .contains("commands"));

        let numeric_exported_at = r#"{"version": "1.0", "commands": [], "exportedAt": 5}"#;
        assert!(SyncPayload::parse(numeric_exported_at)
            .unwrap_err()
            .contains("exportedAt"));

        assert!(SyncPayload::parse("not json").is_err());
        assert!(SyncPayload::parse("[]").is_err());
    }

    #[test]
    fn parse_keeps_latest_copy_per_sync_key() {
        let raw = r#"{
            "version": "1.0",
            "exportedAt": "2024-01-03T00:00:00.000Z",
            "syncVersion": 4,
            "commands": [
                {"id": "a", "syncId": "k", "command": "old", "updatedAt": "2024-01-01"},
                {"id": "b", "command": "other", "updatedAt": "2024-01-01"},
                {"id": "c", "syncId": "k", "command": "new", "updatedAt": "2024-01-02"}
            ]
        }"#;

        let payload = SyncPayload::parse(raw).unwrap();
        assert_eq!(payload.sync_version, Some(4));
        assert_eq!(payload.commands.len(), 2);
        assert_eq!(payload.commands[0].command, "new");
        assert_eq!(payload.commands[1].command, "other");
    }

    #[test]
    fn conflict_serializes_type_tag() {
        let local = Command::new("ls", "");
        let conflict = SyncConflict {
            command_id: local.sync_key().to_string(),
            remote: local.clone(),
            local,
            kind: ConflictKind::DeletedRemote,
        };
        let encoded = serde_json::to_string(&conflict).unwrap();
        assert!(encoded.contains("\"type\":\"deleted_remote\""));
        assert!(encoded.contains("\"commandId\""));
    }

    #[test]
    fn resolution_parses_from_str() {
        assert_eq!(
            "keep_both".parse::<ConflictResolution>().unwrap(),
            ConflictResolution::KeepBoth
        );
        assert!("keep_neither".parse::<ConflictResolution>().is_err());
        assert_eq!(
            "deleted_local".parse::<ConflictKind>().unwrap(),
            ConflictKind::DeletedLocal
        );
    }
}
