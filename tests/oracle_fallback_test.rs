//! Fail-open / fail-closed policy tests for the resilient oracle wrapper.

use std::sync::Arc;

use papersentry::oracle::{
    ActivityVerdict, FaceVerdict, ForensicReport, MonitorFailurePolicy, OracleError,
    ResilientOracle, SimulatedOracle, VerdictOracle,
};
use papersentry::store::{MemoryRepository, Repository};
use papersentry::types::{new_entity_id, User, UserRole};

/// Remote oracle whose every call fails.
struct FailingOracle;

#[async_trait::async_trait]
impl VerdictOracle for FailingOracle {
    async fn verify_face(
        &self,
        _frame_b64: &str,
        _enrolled_b64: &str,
    ) -> Result<FaceVerdict, OracleError> {
        Err(OracleError::Parse("synthetic outage".to_owned()))
    }

    async fn detect_suspicious_activity(
        &self,
        _frame_b64: &str,
    ) -> Result<ActivityVerdict, OracleError> {
        Err(OracleError::Parse("synthetic outage".to_owned()))
    }

    async fn extract_forensic_watermark(
        &self,
        _leaked_image_b64: &str,
    ) -> Result<ForensicReport, OracleError> {
        Err(OracleError::Parse("synthetic outage".to_owned()))
    }
}

fn wrapper(
    remote: Option<Arc<dyn VerdictOracle>>,
    policy: MonitorFailurePolicy,
) -> ResilientOracle {
    let repo = Arc::new(MemoryRepository::new());
    ResilientOracle::new(remote, SimulatedOracle::new(repo), policy)
}

#[tokio::test]
async fn unconfigured_oracle_runs_the_simulation() {
    let oracle = wrapper(None, MonitorFailurePolicy::FailOpen);

    let face = oracle.verify_face("frame", "sig").await.expect("verdict");
    assert!(face.matched);
    assert!((face.confidence - 0.98).abs() < f64::EPSILON);

    let activity = oracle
        .detect_suspicious_activity("frame")
        .await
        .expect("verdict");
    assert!(!activity.suspicious);
}

#[tokio::test]
async fn unconfigured_forensics_derive_from_registered_identities() {
    let repo = Arc::new(MemoryRepository::new());
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
    let oracle = ResilientOracle::new(
        None,
        SimulatedOracle::new(repo),
        MonitorFailurePolicy::FailOpen,
    );

    let report = oracle
        .extract_forensic_watermark("leak")
        .await
        .expect("report");
    assert_eq!(report.email, "writer@example.org");
    assert!((report.leak_confidence - 0.97).abs() < f64::EPSILON);
}

#[tokio::test]
async fn failing_remote_fails_open_for_monitoring_verdicts() {
    let oracle = wrapper(Some(Arc::new(FailingOracle)), MonitorFailurePolicy::FailOpen);

    // Monitoring degrades to "assume fine" so an outage does not lock
    // out a legitimate user continuously.
    let face = oracle.verify_face("frame", "sig").await.expect("verdict");
    assert!(face.matched);
    assert!((face.confidence - 0.9).abs() < f64::EPSILON);

    let activity = oracle
        .detect_suspicious_activity("frame")
        .await
        .expect("verdict");
    assert!(!activity.suspicious);
    assert_eq!(activity.kind, "OFFLINE");
}

#[tokio::test]
async fn forensic_extraction_always_fails_closed() {
    // Attribution must never fabricate an identity out of an outage,
    // under either monitoring policy.
    for policy in [MonitorFailurePolicy::FailOpen, MonitorFailurePolicy::FailClosed] {
        let oracle = wrapper(Some(Arc::new(FailingOracle)), policy);
        let result = oracle.extract_forensic_watermark("leak").await;
        assert!(matches!(result, Err(OracleError::Parse(_))));
    }
}

#[tokio::test]
async fn fail_closed_policy_propagates_monitoring_errors() {
    let oracle = wrapper(
        Some(Arc::new(FailingOracle)),
        MonitorFailurePolicy::FailClosed,
    );
    assert!(oracle.verify_face("frame", "sig").await.is_err());
    assert!(oracle.detect_suspicious_activity("frame").await.is_err());
}
