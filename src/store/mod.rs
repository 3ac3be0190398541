//! Durable collection store.
//!
//! All persistent state lives in five named collections with
//! whole-collection read-modify-write semantics — no partial-update API.
//! The [`Repository`] trait is an injected capability so engines can run
//! against an in-memory fake in tests and a JSON file store in the demo
//! binary.

mod json;
mod memory;

pub use json::JsonFileRepository;
pub use memory::MemoryRepository;

use async_trait::async_trait;

use crate::types::{AuditLogEntry, ExamPaper, UnlockRequest, User};

/// Maximum retained audit log entries. Oldest entries are dropped.
pub const MAX_AUDIT_ENTRIES: usize = 500;

/// Errors returned by repository implementations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Underlying I/O failure.
    #[error("store I/O failure: {0}")]
    Io(#[from] std::io::Error),
    /// A collection file held malformed JSON.
    #[error("store corrupt collection {collection}: {source}")]
    Corrupt {
        /// Collection that failed to parse.
        collection: &'static str,
        /// Parse error.
        #[source]
        source: serde_json::Error,
    },
    /// A collection could not be serialized.
    #[error("store serialization failure: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Injected persistence capability over the five named collections.
///
/// Implementations must keep the audit log newest-first and capped at
/// [`MAX_AUDIT_ENTRIES`], and the whitelist lower-cased and free of
/// duplicates.
#[async_trait]
pub trait Repository: Send + Sync {
    /// Read all registered users.
    async fn users(&self) -> Result<Vec<User>, StoreError>;

    /// Replace the users collection.
    async fn set_users(&self, users: Vec<User>) -> Result<(), StoreError>;

    /// Read all exam papers.
    async fn papers(&self) -> Result<Vec<ExamPaper>, StoreError>;

    /// Replace the papers collection.
    async fn set_papers(&self, papers: Vec<ExamPaper>) -> Result<(), StoreError>;

    /// Read all unlock requests.
    async fn unlock_requests(&self) -> Result<Vec<UnlockRequest>, StoreError>;

    /// Replace the unlock requests collection.
    async fn set_unlock_requests(&self, requests: Vec<UnlockRequest>) -> Result<(), StoreError>;

    /// Read the audit log, newest first.
    async fn audit_logs(&self) -> Result<Vec<AuditLogEntry>, StoreError>;

    /// Prepend one audit entry, enforcing the retention cap.
    async fn append_audit_log(&self, entry: AuditLogEntry) -> Result<(), StoreError>;

    /// Read the whitelist (lower-cased emails).
    async fn whitelist(&self) -> Result<Vec<String>, StoreError>;

    /// Add an email to the whitelist. Lower-cases on insert; inserting
    /// an existing entry is a no-op.
    async fn add_to_whitelist(&self, email: &str) -> Result<(), StoreError>;

    /// Case-insensitive whitelist membership check.
    async fn is_whitelisted(&self, email: &str) -> Result<bool, StoreError> {
        let needle = email.trim().to_lowercase();
        Ok(self.whitelist().await?.iter().any(|e| *e == needle))
    }
}

/// Prepend `entry` to `logs` in place, enforcing the retention cap.
pub(crate) fn push_capped(logs: &mut Vec<AuditLogEntry>, entry: AuditLogEntry) {
    logs.insert(0, entry);
    logs.truncate(MAX_AUDIT_ENTRIES);
}

/// Insert a lower-cased email into `list` if absent.
pub(crate) fn insert_email(list: &mut Vec<String>, email: &str) {
    let normalized = email.trim().to_lowercase();
    if !list.contains(&normalized) {
        list.push(normalized);
    }
}
