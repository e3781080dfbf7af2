//! Error taxonomy for the reconciliation core.
//!
//! Every fallible core operation returns `Result<T, CoreError>`. The variants
//! are deliberately closed so callers (CLI, protocol server) can match
//! exhaustively and render one human-readable status line per operation.

use std::path::PathBuf;

/// What kind of document a `NotFound` refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocKind {
    Project,
    Template,
}

impl DocKind {
    pub fn as_str(self) -> &'static str {
        match self {
            DocKind::Project => "project",
            DocKind::Template => "template",
        }
    }
}

/// One per-agent artifact that Sync failed to materialize.
///
/// Collected rather than aborting — one agent's failed write must not block
/// another's.
#[derive(Debug, Clone)]
pub struct SyncFailure {
    pub agent_id: String,
    pub path: PathBuf,
    pub reason: String,
}

impl std::fmt::Display for SyncFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: {}: {}",
            self.agent_id,
            self.path.display(),
            self.reason
        )
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// Invalid name/path — rejected before any mutation.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Read/delete/rename of a missing project or template.
    #[error("{} not found: {name}", kind.as_str())]
    NotFound { kind: DocKind, name: String },

    /// One or more per-agent artifacts failed; the rest were still written.
    #[error("sync failed for {} artifact(s): {}", failures.len(), summarize(failures))]
    PartialSyncFailure { failures: Vec<SyncFailure> },

    /// A second mutating operation was attempted while one is in flight for
    /// the same project. The caller retries; nothing is queued.
    #[error("operation already in progress for project '{0}'")]
    OperationInProgress(String),

    /// Underlying I/O or serialization failure outside the cases above.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CoreError {
    pub fn validation(msg: impl Into<String>) -> Self {
        CoreError::Validation(msg.into())
    }

    pub fn not_found(kind: DocKind, name: impl Into<String>) -> Self {
        CoreError::NotFound {
            kind,
            name: name.into(),
        }
    }
}

fn summarize(failures: &[SyncFailure]) -> String {
    failures
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}
