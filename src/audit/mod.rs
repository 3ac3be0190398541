//! Typed audit trail over the repository's capped log collection.
//!
//! Every privileged action funnels through here. Entries are persisted
//! newest-first and echoed as structured `tracing` events.

use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use crate::store::{Repository, StoreError};
use crate::types::{new_entity_id, AuditKind, AuditLogEntry, Severity};

/// User id recorded for events with no acting identity.
pub const SYSTEM_USER: &str = "SYSTEM";

/// Records typed audit events.
#[derive(Clone)]
pub struct AuditTrail {
    repo: Arc<dyn Repository>,
}

impl AuditTrail {
    /// Create an audit trail writing through the given repository.
    pub fn new(repo: Arc<dyn Repository>) -> Self {
        Self { repo }
    }

    /// Record a login/logout event.
    pub async fn login(&self, user_id: &str, details: String) -> Result<(), StoreError> {
        self.record(AuditKind::Login, user_id, details, Severity::Low)
            .await
    }

    /// Record an editing or sealing event.
    pub async fn edit(&self, user_id: &str, details: String) -> Result<(), StoreError> {
        self.record(AuditKind::Edit, user_id, details, Severity::Low)
            .await
    }

    /// Record an unlock workflow action.
    pub async fn unlock(
        &self,
        user_id: &str,
        details: String,
        severity: Severity,
    ) -> Result<(), StoreError> {
        self.record(AuditKind::Unlock, user_id, details, severity)
            .await
    }

    /// Record a security alert.
    pub async fn security_alert(
        &self,
        user_id: &str,
        details: String,
        severity: Severity,
    ) -> Result<(), StoreError> {
        self.record(AuditKind::SecurityAlert, user_id, details, severity)
            .await
    }

    /// Record a forensic attribution run.
    pub async fn forensics(
        &self,
        details: String,
        severity: Severity,
    ) -> Result<(), StoreError> {
        self.record(AuditKind::Forensics, SYSTEM_USER, details, severity)
            .await
    }

    /// Write one entry to the capped log.
    pub async fn record(
        &self,
        kind: AuditKind,
        user_id: &str,
        details: String,
        severity: Severity,
    ) -> Result<(), StoreError> {
        let entry = AuditLogEntry {
            id: new_entity_id(),
            timestamp: Utc::now(),
            kind,
            user_id: user_id.to_owned(),
            details,
            severity,
        };
        info!(
            kind = ?entry.kind,
            user = %entry.user_id,
            severity = ?entry.severity,
            details = %entry.details,
            "audit"
        );
        self.repo.append_audit_log(entry).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryRepository;

    #[tokio::test]
    async fn records_entry_with_kind_and_severity() {
        let repo = Arc::new(MemoryRepository::new());
        let trail = AuditTrail::new(repo.clone());

        trail
            .unlock("auth-1", "approved request".to_owned(), Severity::Medium)
            .await
            .expect("record");

        let logs = repo.audit_logs().await.expect("read");
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].kind, AuditKind::Unlock);
        assert_eq!(logs[0].severity, Severity::Medium);
        assert_eq!(logs[0].user_id, "auth-1");
    }

    #[tokio::test]
    async fn forensics_entries_attribute_to_system() {
        let repo = Arc::new(MemoryRepository::new());
        let trail = AuditTrail::new(repo.clone());

        trail
            .forensics("attribution complete".to_owned(), Severity::Critical)
            .await
            .expect("record");

        let logs = repo.audit_logs().await.expect("read");
        assert_eq!(logs[0].user_id, SYSTEM_USER);
    }
}
