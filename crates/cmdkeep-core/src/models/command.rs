//! Command record model

use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use super::timestamp;

/// Locally generated identifier of a command record.
///
/// Fresh ids are UUID v7 (time-sortable). Ids that arrive in a payload are
/// kept verbatim whatever their shape, so records created by other clients
/// keep matching across devices.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommandId(String);

impl CommandId {
    /// Create a new unique command ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    /// Borrow the string form of this ID
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for CommandId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for CommandId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for CommandId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl FromStr for CommandId {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from(s))
    }
}

/// A saved CLI command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Command {
    /// Local identifier, assigned once and never reused
    pub id: CommandId,
    /// Cross-device matching key; set to `id` on first sync, then immutable
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync_id: Option<String>,
    /// The command text
    pub command: String,
    /// The prompt or description that produced the command
    #[serde(default)]
    pub prompt: String,
    /// Optional free-form notes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub usage_count: u32,
    #[serde(default)]
    pub favorite: bool,
    #[serde(default = "timestamp::now", with = "timestamp")]
    pub created_at: DateTime<Utc>,
    /// Set on every local content mutation
    #[serde(with = "timestamp")]
    pub updated_at: DateTime<Utc>,
    /// Set only when a sync reconciles this record; `None` means never synced
    #[serde(
        default,
        with = "timestamp::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_synced_at: Option<DateTime<Utc>>,
    /// Tombstone; a record with this set is soft-deleted
    #[serde(
        default,
        with = "timestamp::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub deleted_at: Option<DateTime<Utc>>,
}

/// The fields that make up a record's content, in hashing order.
#[derive(Serialize)]
struct ContentFields<'a> {
    command: &'a str,
    prompt: &'a str,
    description: Option<&'a str>,
    tags: &'a [String],
    usage_count: u32,
    favorite: bool,
}

impl Command {
    /// Create a new, never-synced command
    #[must_use]
    pub fn new(command: impl Into<String>, prompt: impl Into<String>) -> Self {
        let now = timestamp::now();
        Self {
            id: CommandId::new(),
            sync_id: None,
            command: command.into(),
            prompt: prompt.into(),
            description: None,
            tags: Vec::new(),
            usage_count: 0,
            favorite: false,
            created_at: now,
            updated_at: now,
            last_synced_at: None,
            deleted_at: None,
        }
    }

    /// Key used to match this record across devices (`syncId`, else `id`).
    pub fn sync_key(&self) -> &str {
        self.sync_id.as_deref().unwrap_or_else(|| self.id.as_str())
    }

    /// Adopt `id` as the sync key if the record has never been synced.
    pub fn ensure_sync_id(&mut self) {
        if self.sync_id.is_none() {
            self.sync_id = Some(self.id.to_string());
        }
    }

    /// Whether the record carries a tombstone.
    pub const fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Whether the content changed after the last successful sync.
    ///
    /// A record that was never synced always counts as changed.
    pub fn changed_since_sync(&self) -> bool {
        self.last_synced_at
            .is_none_or(|synced_at| self.updated_at > synced_at)
    }

    /// Hex SHA-256 over the content fields only.
    ///
    /// Identifiers, timestamps and the tombstone are bookkeeping and do not
    /// participate, so two copies with equal content hash equally.
    pub fn content_hash(&self) -> String {
        let fields = ContentFields {
            command: &self.command,
            prompt: &self.prompt,
            description: self.description.as_deref(),
            tags: &self.tags,
            usage_count: self.usage_count,
            favorite: self.favorite,
        };
        let encoded = serde_json::to_vec(&fields).unwrap_or_default();
        format!("{:x}", Sha256::digest(&encoded))
    }

    /// Record a local content mutation.
    pub fn touch(&mut self) {
        self.updated_at = timestamp::now();
    }

    /// Soft delete: set the tombstone so the deletion can propagate.
    pub fn mark_deleted(&mut self) {
        let now = timestamp::now();
        self.deleted_at = Some(now);
        self.updated_at = now;
    }

    /// Count one more use of the command.
    pub fn record_use(&mut self) {
        self.usage_count = self.usage_count.saturating_add(1);
        self.touch();
    }

    pub fn toggle_favorite(&mut self) {
        self.favorite = !self.favorite;
        self.touch();
    }

    /// Normalize tags: trimmed, lowercase, without a leading `#`, sorted and deduplicated.
    pub fn set_tags<I, S>(&mut self, tags: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut normalized = tags
            .into_iter()
            .map(|tag| tag.as_ref().trim().trim_start_matches('#').to_lowercase())
            .filter(|tag| !tag.is_empty())
            .collect::<Vec<_>>();
        normalized.sort();
        normalized.dedup();
        self.tags = normalized;
    }
}
