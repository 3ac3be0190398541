//! In-memory repository used by tests and short-lived sessions.

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::types::{AuditLogEntry, ExamPaper, UnlockRequest, User};

use super::{insert_email, push_capped, Repository, StoreError};

#[derive(Debug, Default)]
struct Collections {
    users: Vec<User>,
    papers: Vec<ExamPaper>,
    requests: Vec<UnlockRequest>,
    logs: Vec<AuditLogEntry>,
    whitelist: Vec<String>,
}

/// Repository backed by process memory. State is lost on drop.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    inner: RwLock<Collections>,
}

impl MemoryRepository {
    /// Create an empty in-memory repository.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn users(&self) -> Result<Vec<User>, StoreError> {
        Ok(self.inner.read().await.users.clone())
    }

    async fn set_users(&self, users: Vec<User>) -> Result<(), StoreError> {
        self.inner.write().await.users = users;
        Ok(())
    }

    async fn papers(&self) -> Result<Vec<ExamPaper>, StoreError> {
        Ok(self.inner.read().await.papers.clone())
    }

    async fn set_papers(&self, papers: Vec<ExamPaper>) -> Result<(), StoreError> {
        self.inner.write().await.papers = papers;
        Ok(())
    }

    async fn unlock_requests(&self) -> Result<Vec<UnlockRequest>, StoreError> {
        Ok(self.inner.read().await.requests.clone())
    }

    async fn set_unlock_requests(&self, requests: Vec<UnlockRequest>) -> Result<(), StoreError> {
        self.inner.write().await.requests = requests;
        Ok(())
    }

    async fn audit_logs(&self) -> Result<Vec<AuditLogEntry>, StoreError> {
        Ok(self.inner.read().await.logs.clone())
    }

    async fn append_audit_log(&self, entry: AuditLogEntry) -> Result<(), StoreError> {
        push_capped(&mut self.inner.write().await.logs, entry);
        Ok(())
    }

    async fn whitelist(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.inner.read().await.whitelist.clone())
    }

    async fn add_to_whitelist(&self, email: &str) -> Result<(), StoreError> {
        insert_email(&mut self.inner.write().await.whitelist, email);
        Ok(())
    }
}
