//! Core domain types shared across the engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Role an identity holds within the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserRole {
    /// Approves unlock requests and manages the whitelist.
    Authoriser,
    /// Authors exam papers.
    Setter,
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Authoriser => f.write_str("AUTHORISER"),
            Self::Setter => f.write_str("SETTER"),
        }
    }
}

/// A registered identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Opaque unique identifier.
    pub id: String,
    /// Lower-cased email identity.
    pub email: String,
    /// Role this identity registered under.
    pub role: UserRole,
    /// Display name derived at enrollment.
    pub full_name: String,
    /// Whether the identity was on the whitelist at enrollment.
    pub is_whitelisted: bool,
    /// Demo credential placeholder. Not a real password hash.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Base64 enrollment frame used for identity-consistency checks.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub face_signature: Option<String>,
}

/// An exam paper. Only the lock-related fields carry protocol meaning;
/// `content` is an opaque payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExamPaper {
    /// Opaque unique identifier.
    pub id: String,
    /// Document title.
    pub title: String,
    /// Opaque document payload.
    pub content: String,
    /// Owning setter identity.
    pub setter_id: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Sealed flag. Set once by finalization; never cleared — the unlock
    /// protocol grants session-level access without touching it.
    pub is_locked: bool,
    /// Timestamp of the sealing action.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lock_date: Option<DateTime<Utc>>,
    /// Traceability identifier embedded in exported content.
    pub watermark_id: String,
}

/// Lifecycle state of an [`UnlockRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestStatus {
    /// Awaiting an authoriser decision.
    Pending,
    /// Approved; a dynamic key is attached and redeemable.
    Approved,
    /// Declined. Terminal.
    Rejected,
}

/// One outstanding or resolved unlock negotiation between a setter and
/// an authoriser.
///
/// A successful redemption deletes the record outright, so a key is
/// never observed twice and no state ever returns to `Pending`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnlockRequest {
    /// Opaque unique identifier.
    pub id: String,
    /// The locked paper this negotiation concerns (weak reference).
    pub paper_id: String,
    /// Requesting setter identity.
    pub setter_id: String,
    /// Current lifecycle state.
    pub status: RequestStatus,
    /// One-time 6-character uppercase alphanumeric token. Present only
    /// while `status` is [`RequestStatus::Approved`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dynamic_key: Option<String>,
}

/// Audit event classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditKind {
    /// Login and logout events.
    Login,
    /// Paper editing and sealing.
    Edit,
    /// Monitor escalations and whitelist changes.
    SecurityAlert,
    /// Unlock workflow actions.
    Unlock,
    /// Leak attribution runs.
    Forensics,
}

/// Audit event severity, ordered lowest to highest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    /// Routine activity.
    Low,
    /// Privileged but expected actions.
    Medium,
    /// Degraded or suspicious conditions.
    High,
    /// Confirmed violations.
    Critical,
}

/// A single entry in the append-only, capped audit log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogEntry {
    /// Opaque unique identifier.
    pub id: String,
    /// When the event occurred.
    pub timestamp: DateTime<Utc>,
    /// Event classification.
    #[serde(rename = "type")]
    pub kind: AuditKind,
    /// Acting identity, or `"SYSTEM"`.
    pub user_id: String,
    /// Free-text description.
    pub details: String,
    /// Event severity.
    pub severity: Severity,
}

/// Generate a fresh opaque entity identifier.
pub fn new_entity_id() -> String {
    Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_status_serializes_screaming() {
        let json = serde_json::to_string(&RequestStatus::Pending).expect("serialize");
        assert_eq!(json, "\"PENDING\"");
        let back: RequestStatus = serde_json::from_str("\"APPROVED\"").expect("deserialize");
        assert_eq!(back, RequestStatus::Approved);
    }

    #[test]
    fn severity_orders_low_to_critical() {
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::Medium < Severity::High);
        assert!(Severity::High < Severity::Critical);
    }

    #[test]
    fn unlock_request_omits_absent_key() {
        let req = UnlockRequest {
            id: new_entity_id(),
            paper_id: "p1".to_owned(),
            setter_id: "s1".to_owned(),
            status: RequestStatus::Pending,
            dynamic_key: None,
        };
        let json = serde_json::to_string(&req).expect("serialize");
        assert!(!json.contains("dynamic_key"));
    }
}
