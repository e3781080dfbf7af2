//! Sync manifest — what Sync last wrote, persisted alongside canonical state.
//!
//! Two jobs:
//!   1. MCP ownership: the set of entry keys Sync wrote into each agent's
//!      config. Sync may only delete keys it owns; entries a user added
//!      directly in a native config file are never touched. Ownership is
//!      recorded explicitly here, never inferred by diffing.
//!   2. Content hashes: the hash of every artifact as written, so the drift
//!      detector can tell a human edit (`modified`) apart from a canonical
//!      change not yet materialized (`stale`).

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Truncated hex SHA-256 of artifact content.
pub fn content_hash(content: &str) -> String {
    let hash = Sha256::digest(content.as_bytes());
    hex::encode(&hash[..16])
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    File,
    Symlink,
}

/// One materialized file or link, keyed by project-relative path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    pub agent_id: String,
    pub kind: ArtifactKind,
    /// Hash of the written content; for symlinks, hash of the target path.
    pub hash: String,
}

/// Owned MCP entries inside one agent's config artifact.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct McpRecord {
    /// Project-relative path of the artifact.
    pub path: String,
    /// Hash of each owned entry's JSON value, keyed by entry name.
    /// The key set is the ownership set.
    pub entry_hashes: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncManifest {
    #[serde(default)]
    pub files: BTreeMap<String, FileRecord>,
    /// Keyed by agent id.
    #[serde(default)]
    pub mcp: BTreeMap<String, McpRecord>,
    #[serde(default)]
    pub synced_at: Option<DateTime<Utc>>,
}

impl SyncManifest {
    /// Whether Sync wrote the given MCP entry for the given agent.
    pub fn owns_mcp_entry(&self, agent_id: &str, key: &str) -> bool {
        self.mcp
            .get(agent_id)
            .map(|rec| rec.entry_hashes.contains_key(key))
            .unwrap_or(false)
    }
}
