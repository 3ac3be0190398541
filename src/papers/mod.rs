//! Exam paper vault.
//!
//! CRUD around the sealing protocol. Sealing is one-directional: once a
//! paper is locked only the unlock workflow's session-level grant allows
//! further edits, and nothing clears the persisted flag.

use std::sync::Arc;

use chrono::Utc;

use crate::audit::AuditTrail;
use crate::store::{Repository, StoreError};
use crate::types::{new_entity_id, ExamPaper, User};
use crate::unlock::EditGrant;

/// Errors from paper operations.
#[derive(Debug, thiserror::Error)]
pub enum PaperError {
    /// No paper with the given id exists.
    #[error("paper not found")]
    NotFound,
    /// The paper is sealed and the session holds no grant for it.
    #[error("paper is sealed; request authorization to edit")]
    Sealed,
    /// Repository failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Paper storage and sealing operations.
#[derive(Clone)]
pub struct PaperVault {
    repo: Arc<dyn Repository>,
    audit: AuditTrail,
}

impl PaperVault {
    /// Create a vault over the given repository.
    pub fn new(repo: Arc<dyn Repository>, audit: AuditTrail) -> Self {
        Self { repo, audit }
    }

    /// Create a fresh unsealed paper scaffold owned by `setter`.
    pub async fn create_paper(&self, setter: &User) -> Result<ExamPaper, PaperError> {
        let paper = ExamPaper {
            id: new_entity_id(),
            title: "Untitled Exam Paper".to_owned(),
            content: String::new(),
            setter_id: setter.id.clone(),
            created_at: Utc::now(),
            is_locked: false,
            lock_date: None,
            watermark_id: watermark_id(&setter.id),
        };
        let mut papers = self.repo.papers().await?;
        papers.insert(0, paper.clone());
        self.repo.set_papers(papers).await?;
        self.audit
            .edit(&setter.id, format!("Created paper {}", paper.id))
            .await?;
        Ok(paper)
    }

    /// Look up one paper.
    pub async fn get(&self, paper_id: &str) -> Result<ExamPaper, PaperError> {
        self.repo
            .papers()
            .await?
            .into_iter()
            .find(|p| p.id == paper_id)
            .ok_or(PaperError::NotFound)
    }

    /// Papers owned by one setter.
    pub async fn list_for_setter(&self, setter_id: &str) -> Result<Vec<ExamPaper>, PaperError> {
        let mut papers = self.repo.papers().await?;
        papers.retain(|p| p.setter_id == setter_id);
        Ok(papers)
    }

    /// Save title and content.
    ///
    /// A sealed paper requires a matching session grant; the persisted
    /// seal itself is untouched either way.
    ///
    /// # Errors
    ///
    /// [`PaperError::Sealed`] when the paper is sealed and `grant` does
    /// not cover it.
    pub async fn save(
        &self,
        paper_id: &str,
        title: String,
        content: String,
        grant: Option<&EditGrant>,
    ) -> Result<ExamPaper, PaperError> {
        let mut papers = self.repo.papers().await?;
        let paper = papers
            .iter_mut()
            .find(|p| p.id == paper_id)
            .ok_or(PaperError::NotFound)?;

        if paper.is_locked && grant.map_or(true, |g| g.paper_id != paper_id) {
            return Err(PaperError::Sealed);
        }

        paper.title = title;
        paper.content = content;
        let saved = paper.clone();
        self.repo.set_papers(papers).await?;
        Ok(saved)
    }

    /// Finalize and seal a paper. One-directional; there is no unseal.
    ///
    /// # Errors
    ///
    /// [`PaperError::Sealed`] if the paper is already sealed.
    pub async fn seal(&self, paper_id: &str, actor_id: &str) -> Result<ExamPaper, PaperError> {
        let mut papers = self.repo.papers().await?;
        let paper = papers
            .iter_mut()
            .find(|p| p.id == paper_id)
            .ok_or(PaperError::NotFound)?;
        if paper.is_locked {
            return Err(PaperError::Sealed);
        }

        paper.is_locked = true;
        paper.lock_date = Some(Utc::now());
        let sealed = paper.clone();
        self.repo.set_papers(papers).await?;
        self.audit
            .edit(actor_id, format!("Finalized and sealed paper {paper_id}"))
            .await?;
        Ok(sealed)
    }
}

/// Traceability identifier embedded in exported content:
/// `W-ST-<setter prefix>-<timestamp suffix>`.
fn watermark_id(setter_id: &str) -> String {
    let prefix: String = setter_id.chars().take(4).collect();
    let millis = Utc::now().timestamp_millis().to_string();
    let suffix = millis
        .get(millis.len().saturating_sub(6)..)
        .unwrap_or(&millis);
    format!("W-ST-{prefix}-{suffix}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryRepository;
    use crate::types::UserRole;

    fn setter() -> User {
        User {
            id: "abcd1234-ffff".to_owned(),
            email: "writer@example.org".to_owned(),
            role: UserRole::Setter,
            full_name: "WRITER".to_owned(),
            is_whitelisted: true,
            password: None,
            face_signature: Some("sig".to_owned()),
        }
    }

    fn vault() -> PaperVault {
        let repo = Arc::new(MemoryRepository::new());
        let audit = AuditTrail::new(repo.clone());
        PaperVault::new(repo, audit)
    }

    #[test]
    fn watermark_carries_setter_prefix() {
        let id = watermark_id("abcd1234");
        assert!(id.starts_with("W-ST-abcd-"));
        assert_eq!(id.chars().filter(|c| *c == '-').count(), 3);
    }

    #[tokio::test]
    async fn sealed_paper_rejects_ungranted_saves() {
        let vault = vault();
        let paper = vault.create_paper(&setter()).await.expect("create");
        vault.seal(&paper.id, &setter().id).await.expect("seal");

        let err = vault
            .save(&paper.id, "t".to_owned(), "c".to_owned(), None)
            .await;
        assert!(matches!(err, Err(PaperError::Sealed)));
    }

    #[tokio::test]
    async fn grant_opens_a_sealed_paper_for_saving() {
        let vault = vault();
        let paper = vault.create_paper(&setter()).await.expect("create");
        vault.seal(&paper.id, &setter().id).await.expect("seal");

        let grant = EditGrant {
            paper_id: paper.id.clone(),
            setter_id: setter().id,
            granted_at: Utc::now(),
        };
        let saved = vault
            .save(&paper.id, "Revised".to_owned(), "body".to_owned(), Some(&grant))
            .await
            .expect("save");
        // The grant is session-level; the persisted seal stays on.
        assert!(saved.is_locked);
        assert_eq!(saved.title, "Revised");
    }

    #[tokio::test]
    async fn sealing_twice_is_rejected() {
        let vault = vault();
        let paper = vault.create_paper(&setter()).await.expect("create");
        vault.seal(&paper.id, &setter().id).await.expect("seal");
        assert!(matches!(
            vault.seal(&paper.id, &setter().id).await,
            Err(PaperError::Sealed)
        ));
    }
}
