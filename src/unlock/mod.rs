//! Two-party dynamic-key unlock workflow.
//!
//! A setter requests access to a sealed paper; an authoriser approves,
//! which mints a short one-time key; the setter redeems the key exactly
//! once for session-level edit access. The persisted seal is never
//! touched by this workflow.
//!
//! Lifecycle of one request:
//!
//! ```text
//!         request_unlock          approve_request        redeem_key (ok)
//! (none) ───────────────▶ Pending ───────────────▶ Approved ─────────▶ (deleted)
//!                             │
//!                             └────────────────▶ Rejected   (terminal)
//! ```

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rand::Rng;
use tracing::info;

use crate::audit::AuditTrail;
use crate::store::{Repository, StoreError};
use crate::types::{new_entity_id, RequestStatus, Severity, UnlockRequest};

/// Length of a dynamic key.
const DYNAMIC_KEY_LEN: usize = 6;

/// Uppercase alphanumeric alphabet the key is drawn from.
const KEY_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Errors returned by the unlock workflow.
#[derive(Debug, thiserror::Error)]
pub enum UnlockError {
    /// A pending request already exists for this paper.
    #[error("authorization request already pending for this paper")]
    DuplicatePendingRequest,
    /// No request with the given id exists.
    #[error("unlock request not found")]
    RequestNotFound,
    /// The request was already approved, rejected, or consumed.
    #[error("unlock request already resolved")]
    AlreadyResolved,
    /// Uniform redemption failure. Deliberately does not distinguish a
    /// wrong key from a consumed or never-approved request.
    #[error("invalid or expired authorization key")]
    InvalidKey,
    /// Repository failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Session-scoped authorization to edit one sealed paper.
///
/// Granting does not clear the persisted seal; the grant dies with the
/// session that earned it.
#[derive(Debug, Clone)]
pub struct EditGrant {
    /// The paper this grant opens.
    pub paper_id: String,
    /// The setter the original request was filed by.
    pub setter_id: String,
    /// When the key was redeemed.
    pub granted_at: DateTime<Utc>,
}

/// The unlock workflow engine.
#[derive(Clone)]
pub struct UnlockEngine {
    repo: Arc<dyn Repository>,
    audit: AuditTrail,
}

impl UnlockEngine {
    /// Create an engine over the given repository.
    pub fn new(repo: Arc<dyn Repository>, audit: AuditTrail) -> Self {
        Self { repo, audit }
    }

    /// File a new unlock request for a sealed paper (setter action).
    ///
    /// Scans all existing requests; at most one pending request may
    /// exist per paper. Audit logging of the filing is the caller's
    /// concern.
    ///
    /// # Errors
    ///
    /// [`UnlockError::DuplicatePendingRequest`] if a pending request
    /// already exists for `paper_id`.
    pub async fn request_unlock(
        &self,
        paper_id: &str,
        setter_id: &str,
    ) -> Result<UnlockRequest, UnlockError> {
        let mut requests = self.repo.unlock_requests().await?;
        if requests
            .iter()
            .any(|r| r.paper_id == paper_id && r.status == RequestStatus::Pending)
        {
            return Err(UnlockError::DuplicatePendingRequest);
        }

        let request = UnlockRequest {
            id: new_entity_id(),
            paper_id: paper_id.to_owned(),
            setter_id: setter_id.to_owned(),
            status: RequestStatus::Pending,
            dynamic_key: None,
        };
        requests.push(request.clone());
        self.repo.set_unlock_requests(requests).await?;
        info!(paper = %paper_id, setter = %setter_id, "unlock request filed");
        Ok(request)
    }

    /// Approve a pending request (authoriser action), minting its
    /// one-time dynamic key.
    ///
    /// # Errors
    ///
    /// [`UnlockError::RequestNotFound`] if no such request exists;
    /// [`UnlockError::AlreadyResolved`] unless the request is pending.
    pub async fn approve_request(
        &self,
        request_id: &str,
        authoriser_id: &str,
    ) -> Result<UnlockRequest, UnlockError> {
        let mut requests = self.repo.unlock_requests().await?;
        let key = mint_dynamic_key(&requests);

        let request = requests
            .iter_mut()
            .find(|r| r.id == request_id)
            .ok_or(UnlockError::RequestNotFound)?;
        if request.status != RequestStatus::Pending {
            return Err(UnlockError::AlreadyResolved);
        }

        request.status = RequestStatus::Approved;
        request.dynamic_key = Some(key);
        let approved = request.clone();

        self.repo.set_unlock_requests(requests).await?;
        self.audit
            .unlock(
                authoriser_id,
                "Unlock request approved. Dynamic key generated.".to_owned(),
                Severity::Medium,
            )
            .await?;
        Ok(approved)
    }

    /// Decline a pending request (authoriser action). Terminal.
    ///
    /// # Errors
    ///
    /// [`UnlockError::RequestNotFound`] if no such request exists;
    /// [`UnlockError::AlreadyResolved`] unless the request is pending.
    pub async fn reject_request(
        &self,
        request_id: &str,
        authoriser_id: &str,
    ) -> Result<UnlockRequest, UnlockError> {
        let mut requests = self.repo.unlock_requests().await?;
        let request = requests
            .iter_mut()
            .find(|r| r.id == request_id)
            .ok_or(UnlockError::RequestNotFound)?;
        if request.status != RequestStatus::Pending {
            return Err(UnlockError::AlreadyResolved);
        }

        request.status = RequestStatus::Rejected;
        let rejected = request.clone();

        self.repo.set_unlock_requests(requests).await?;
        self.audit
            .unlock(
                authoriser_id,
                "Unlock request declined.".to_owned(),
                Severity::Medium,
            )
            .await?;
        Ok(rejected)
    }

    /// Redeem a dynamic key for session-level edit access (setter
    /// action). One-time: success deletes the request record.
    ///
    /// The submitted key is compared as stored (keys are uppercase).
    ///
    /// # Errors
    ///
    /// [`UnlockError::InvalidKey`] on any mismatch — the caller cannot
    /// tell a wrong key from an expired or consumed one.
    pub async fn redeem_key(
        &self,
        paper_id: &str,
        submitted_key: &str,
    ) -> Result<EditGrant, UnlockError> {
        let mut requests = self.repo.unlock_requests().await?;
        let matched = requests
            .iter()
            .position(|r| {
                r.paper_id == paper_id
                    && r.status == RequestStatus::Approved
                    && r.dynamic_key.as_deref() == Some(submitted_key)
            })
            .ok_or(UnlockError::InvalidKey)?;

        let consumed = requests.remove(matched);
        self.repo.set_unlock_requests(requests).await?;
        info!(paper = %paper_id, setter = %consumed.setter_id, "dynamic key redeemed");
        Ok(EditGrant {
            paper_id: consumed.paper_id,
            setter_id: consumed.setter_id,
            granted_at: Utc::now(),
        })
    }

    /// All current requests, for authoriser review surfaces.
    pub async fn list_requests(&self) -> Result<Vec<UnlockRequest>, UnlockError> {
        Ok(self.repo.unlock_requests().await?)
    }
}

/// Mint a fresh key, regenerating on collision with any currently
/// approved, unredeemed key. The token space is large relative to
/// outstanding requests, so this loop effectively runs once.
fn mint_dynamic_key(existing: &[UnlockRequest]) -> String {
    loop {
        let candidate = generate_key();
        let collides = existing.iter().any(|r| {
            r.status == RequestStatus::Approved && r.dynamic_key.as_deref() == Some(&candidate)
        });
        if !collides {
            return candidate;
        }
    }
}

fn generate_key() -> String {
    let mut rng = rand::thread_rng();
    (0..DYNAMIC_KEY_LEN)
        .map(|_| {
            let idx = rng.gen_range(0..KEY_ALPHABET.len());
            char::from(KEY_ALPHABET[idx])
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_keys_are_six_uppercase_alphanumerics() {
        for _ in 0..64 {
            let key = generate_key();
            assert_eq!(key.len(), DYNAMIC_KEY_LEN);
            assert!(key
                .chars()
                .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
        }
    }

    #[test]
    fn minting_avoids_live_approved_keys() {
        // Exhaust nothing; just verify the collision predicate is
        // consulted: a rejected request holding a key must not block it.
        let rejected = UnlockRequest {
            id: "r1".to_owned(),
            paper_id: "p1".to_owned(),
            setter_id: "s1".to_owned(),
            status: RequestStatus::Rejected,
            dynamic_key: Some("AAAAAA".to_owned()),
        };
        let key = mint_dynamic_key(std::slice::from_ref(&rejected));
        assert_eq!(key.len(), DYNAMIC_KEY_LEN);
    }
}
