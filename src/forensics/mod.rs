//! Leak attribution lab.
//!
//! Runs the oracle's forensic watermark extraction over a leaked image
//! and cross-verifies the reported identity against registered users.
//! This path is fail-closed: an oracle failure surfaces as an error
//! rather than a fabricated attribution.

use std::sync::Arc;

use crate::audit::AuditTrail;
use crate::oracle::{ForensicReport, OracleError, VerdictOracle};
use crate::store::{Repository, StoreError};
use crate::types::Severity;

/// Display name used when the extracted identity is not registered.
const UNREGISTERED_NAME: &str = "UNREGISTERED IDENTITY";

/// Floor applied to the displayed extraction accuracy.
const ACCURACY_FLOOR: f64 = 0.94;

/// How the extracted identity relates to the local registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchStatus {
    /// The identity matches a registered user.
    VerifiedDbIdentity,
    /// The identity was extracted but is unknown locally.
    ExternalIdentityExtracted,
}

/// Attribution result with local cross-verification attached.
#[derive(Debug, Clone)]
pub struct AttributionReport {
    /// Raw oracle extraction.
    pub extraction: ForensicReport,
    /// Registered display name, or a placeholder.
    pub matched_user_name: String,
    /// Cross-verification outcome.
    pub match_status: MatchStatus,
    /// Confidence shown to the investigator, floored at 0.94.
    pub extraction_accuracy: f64,
}

/// Errors from an attribution run.
#[derive(Debug, thiserror::Error)]
pub enum ForensicError {
    /// The oracle failed. Surfaced, never papered over.
    #[error("forensic extraction failed: {0}")]
    Oracle(#[from] OracleError),
    /// Repository failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Forensic attribution engine.
pub struct ForensicLab {
    repo: Arc<dyn Repository>,
    oracle: Arc<dyn VerdictOracle>,
    audit: AuditTrail,
}

impl ForensicLab {
    /// Create a lab over the given repository and oracle.
    pub fn new(repo: Arc<dyn Repository>, oracle: Arc<dyn VerdictOracle>, audit: AuditTrail) -> Self {
        Self {
            repo,
            oracle,
            audit,
        }
    }

    /// Attribute a leaked image to an identity.
    ///
    /// # Errors
    ///
    /// [`ForensicError::Oracle`] if extraction fails.
    pub async fn analyze_leak(&self, image_b64: &str) -> Result<AttributionReport, ForensicError> {
        let extraction = self.oracle.extract_forensic_watermark(image_b64).await?;

        let users = self.repo.users().await?;
        let needle = extraction.email.to_lowercase();
        let matched = users
            .iter()
            .find(|u| u.email == needle || u.id == extraction.setter_id);

        let (matched_user_name, match_status) = match matched {
            Some(u) => (u.full_name.clone(), MatchStatus::VerifiedDbIdentity),
            None => (
                UNREGISTERED_NAME.to_owned(),
                MatchStatus::ExternalIdentityExtracted,
            ),
        };

        let extraction_accuracy = extraction.leak_confidence.max(ACCURACY_FLOOR);
        let severity = if extraction_accuracy > 0.9 {
            Severity::Critical
        } else {
            Severity::High
        };
        self.audit
            .forensics(
                format!(
                    "Forensic attribution complete: identity {} identified with {:.0}% confidence.",
                    extraction.email,
                    extraction_accuracy * 100.0
                ),
                severity,
            )
            .await?;

        Ok(AttributionReport {
            extraction,
            matched_user_name,
            match_status,
            extraction_accuracy,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::SimulatedOracle;
    use crate::store::MemoryRepository;
    use crate::types::{new_entity_id, AuditKind, User, UserRole};

    fn lab_with_user() -> (Arc<MemoryRepository>, ForensicLab) {
        let repo = Arc::new(MemoryRepository::new());
        let audit = AuditTrail::new(repo.clone());
        let oracle = Arc::new(SimulatedOracle::new(repo.clone()));
        (repo.clone(), ForensicLab::new(repo, oracle, audit))
    }

    #[tokio::test]
    async fn cross_verifies_registered_identity() {
        let (repo, lab) = lab_with_user();
        repo.set_users(vec![User {
            id: new_entity_id(),
            email: "writer@example.org".to_owned(),
            role: UserRole::Setter,
            full_name: "WRITER".to_owned(),
            is_whitelisted: true,
            password: None,
            face_signature: None,
        }])
        .await
        .expect("seed");

        let report = lab.analyze_leak("payload").await.expect("report");
        assert_eq!(report.match_status, MatchStatus::VerifiedDbIdentity);
        assert_eq!(report.matched_user_name, "WRITER");
        assert!(report.extraction_accuracy >= ACCURACY_FLOOR);
    }

    #[tokio::test]
    async fn records_a_forensics_audit_entry() {
        let (repo, lab) = lab_with_user();
        lab.analyze_leak("payload").await.expect("report");

        let logs = repo.audit_logs().await.expect("logs");
        assert!(logs.iter().any(|l| l.kind == AuditKind::Forensics));
    }

    #[tokio::test]
    async fn unknown_identity_is_flagged_external() {
        let (_, lab) = lab_with_user();
        let report = lab.analyze_leak("payload").await.expect("report");
        assert_eq!(report.match_status, MatchStatus::ExternalIdentityExtracted);
        assert_eq!(report.matched_user_name, UNREGISTERED_NAME);
    }
}
