//! Identity whitelist and user registry.

use std::sync::Arc;

use tracing::info;

use crate::audit::AuditTrail;
use crate::store::{Repository, StoreError};
use crate::types::{new_entity_id, Severity, User, UserRole};

/// Whitelist entries seeded on first run so the demo is reachable.
const DEFAULT_WHITELIST: [&str; 2] = [
    "authoriser@papersentry.local",
    "demo.setter@papersentry.local",
];

/// Errors from identity operations.
#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    /// The email does not look like an email.
    #[error("invalid email structure")]
    InvalidEmail,
    /// Repository failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Normalize an email for storage and comparison.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Minimal structural validation — this is an allowlist key, not RFC 5322.
pub fn looks_like_email(email: &str) -> bool {
    let e = email.trim();
    !e.is_empty() && e.contains('@')
}

/// Whitelist management and user enrollment over the repository.
#[derive(Clone)]
pub struct IdentityRegistry {
    repo: Arc<dyn Repository>,
    audit: AuditTrail,
}

impl IdentityRegistry {
    /// Create a registry over the given repository.
    pub fn new(repo: Arc<dyn Repository>, audit: AuditTrail) -> Self {
        Self { repo, audit }
    }

    /// Seed the default whitelist entries if the whitelist is empty.
    pub async fn seed_defaults(&self) -> Result<(), StoreError> {
        if self.repo.whitelist().await?.is_empty() {
            for email in DEFAULT_WHITELIST {
                self.repo.add_to_whitelist(email).await?;
            }
            info!("seeded default whitelist identities");
        }
        Ok(())
    }

    /// Add an identity to the whitelist (authoriser action).
    pub async fn add_to_whitelist(
        &self,
        actor_id: &str,
        email: &str,
    ) -> Result<(), IdentityError> {
        if !looks_like_email(email) {
            return Err(IdentityError::InvalidEmail);
        }
        let normalized = normalize_email(email);
        self.repo.add_to_whitelist(&normalized).await?;
        self.audit
            .security_alert(
                actor_id,
                format!("New identity whitelisted: {normalized}"),
                Severity::Low,
            )
            .await?;
        Ok(())
    }

    /// Case-insensitive whitelist membership.
    pub async fn is_whitelisted(&self, email: &str) -> Result<bool, StoreError> {
        self.repo.is_whitelisted(email).await
    }

    /// Look up a registered user by email (case-insensitive).
    pub async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let needle = normalize_email(email);
        Ok(self
            .repo
            .users()
            .await?
            .into_iter()
            .find(|u| u.email == needle))
    }

    /// Enroll a new user, replacing any stale record under the same email.
    pub async fn register(
        &self,
        email: &str,
        role: UserRole,
        password: String,
        face_signature: String,
    ) -> Result<User, StoreError> {
        let normalized = normalize_email(email);
        let full_name = normalized
            .split('@')
            .next()
            .unwrap_or(&normalized)
            .to_uppercase();
        let user = User {
            id: new_entity_id(),
            email: normalized.clone(),
            role,
            full_name,
            is_whitelisted: true,
            password: Some(password),
            face_signature: Some(face_signature),
        };
        let mut users = self.repo.users().await?;
        users.retain(|u| u.email != normalized);
        users.push(user.clone());
        self.repo.set_users(users).await?;
        info!(email = %user.email, role = %user.role, "enrolled new identity");
        Ok(user)
    }
}
