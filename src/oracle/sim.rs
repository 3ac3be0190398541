//! Deterministic offline oracle.
//!
//! Keeps every monitoring and forensic flow demonstrable with no API key
//! configured. Face and activity verdicts are fixed benign constants;
//! forensic attribution derives a plausible report from identities
//! actually registered in the repository.

use std::sync::Arc;

use chrono::Utc;

use crate::store::Repository;
use crate::types::UserRole;

use super::{ActivityVerdict, FaceVerdict, ForensicReport, OracleError, VerdictOracle};

const UNKNOWN_SETTER_ID: &str = "UID-UNKNOWN";
const UNKNOWN_EMAIL: &str = "unknown@identity.invalid";
const DEVICE_SIGNATURE: &str = "PAPERSENTRY-NODE-X4 (screen/camera mix detected)";

/// Oracle producing deterministic verdicts without any remote call.
pub struct SimulatedOracle {
    repo: Arc<dyn Repository>,
}

impl SimulatedOracle {
    /// Create a simulated oracle reading identities from the repository.
    pub fn new(repo: Arc<dyn Repository>) -> Self {
        Self { repo }
    }
}

#[async_trait::async_trait]
impl VerdictOracle for SimulatedOracle {
    async fn verify_face(
        &self,
        _frame_b64: &str,
        _enrolled_b64: &str,
    ) -> Result<FaceVerdict, OracleError> {
        Ok(FaceVerdict {
            matched: true,
            confidence: 0.98,
            reason: Some("Simulated match".to_owned()),
        })
    }

    async fn detect_suspicious_activity(
        &self,
        _frame_b64: &str,
    ) -> Result<ActivityVerdict, OracleError> {
        Ok(ActivityVerdict {
            suspicious: false,
            kind: "CLEAR".to_owned(),
            details: "Stream stable".to_owned(),
        })
    }

    async fn extract_forensic_watermark(
        &self,
        _leaked_image_b64: &str,
    ) -> Result<ForensicReport, OracleError> {
        // Attribute to an identity that actually exists in this
        // deployment: the first registered setter, else any user.
        let users = self.repo.users().await.unwrap_or_default();
        let target = users
            .iter()
            .find(|u| u.role == UserRole::Setter)
            .or_else(|| users.first());

        let (setter_id, email) = match target {
            Some(u) => (u.id.clone(), u.email.clone()),
            None => (UNKNOWN_SETTER_ID.to_owned(), UNKNOWN_EMAIL.to_owned()),
        };

        Ok(ForensicReport {
            analysis: format!(
                "Pixel noise and luminance variance reveal high-frequency \
                 steganographic data. Metadata string 'W-ST::{email}' \
                 reconstructed from hidden frequency domains; leak source \
                 attributed to account {email}."
            ),
            setter_id,
            email,
            timestamp: Utc::now().to_rfc3339(),
            device_info: DEVICE_SIGNATURE.to_owned(),
            leak_confidence: 0.97,
        })
    }
}
