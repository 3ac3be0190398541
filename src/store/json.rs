//! JSON file repository — one file per collection under the data dir.
//!
//! The device is the only writer, so plain read-modify-write on whole
//! files is sufficient; two concurrent processes could race the
//! duplicate-pending check and this is an accepted limitation.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::Mutex;

use crate::types::{AuditLogEntry, ExamPaper, UnlockRequest, User};

use super::{insert_email, push_capped, Repository, StoreError};

const USERS: &str = "users.json";
const PAPERS: &str = "papers.json";
const REQUESTS: &str = "unlock_requests.json";
const LOGS: &str = "audit_logs.json";
const WHITELIST: &str = "whitelist.json";

/// Repository persisting each collection as a JSON file.
pub struct JsonFileRepository {
    dir: PathBuf,
    // Serializes read-modify-write sequences within this process.
    write_lock: Mutex<()>,
}

impl JsonFileRepository {
    /// Open (creating the directory if needed) a file-backed repository.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] if the directory cannot be created.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        std::fs::create_dir_all(dir.as_ref())?;
        Ok(Self {
            dir: dir.as_ref().to_path_buf(),
            write_lock: Mutex::new(()),
        })
    }

    async fn read_collection<T: DeserializeOwned>(
        &self,
        name: &'static str,
    ) -> Result<Vec<T>, StoreError> {
        let path = self.dir.join(name);
        let raw = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::Io(e)),
        };
        serde_json::from_slice(&raw).map_err(|source| StoreError::Corrupt {
            collection: name,
            source,
        })
    }

    async fn write_collection<T: Serialize>(
        &self,
        name: &'static str,
        items: &[T],
    ) -> Result<(), StoreError> {
        let payload = serde_json::to_vec_pretty(items)?;
        tokio::fs::write(self.dir.join(name), payload).await?;
        Ok(())
    }
}

#[async_trait]
impl Repository for JsonFileRepository {
    async fn users(&self) -> Result<Vec<User>, StoreError> {
        self.read_collection(USERS).await
    }

    async fn set_users(&self, users: Vec<User>) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        self.write_collection(USERS, &users).await
    }

    async fn papers(&self) -> Result<Vec<ExamPaper>, StoreError> {
        self.read_collection(PAPERS).await
    }

    async fn set_papers(&self, papers: Vec<ExamPaper>) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        self.write_collection(PAPERS, &papers).await
    }

    async fn unlock_requests(&self) -> Result<Vec<UnlockRequest>, StoreError> {
        self.read_collection(REQUESTS).await
    }

    async fn set_unlock_requests(&self, requests: Vec<UnlockRequest>) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        self.write_collection(REQUESTS, &requests).await
    }

    async fn audit_logs(&self) -> Result<Vec<AuditLogEntry>, StoreError> {
        self.read_collection(LOGS).await
    }

    async fn append_audit_log(&self, entry: AuditLogEntry) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut logs: Vec<AuditLogEntry> = self.read_collection(LOGS).await?;
        push_capped(&mut logs, entry);
        self.write_collection(LOGS, &logs).await
    }

    async fn whitelist(&self) -> Result<Vec<String>, StoreError> {
        self.read_collection(WHITELIST).await
    }

    async fn add_to_whitelist(&self, email: &str) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut list: Vec<String> = self.read_collection(WHITELIST).await?;
        insert_email(&mut list, email);
        self.write_collection(WHITELIST, &list).await
    }
}
