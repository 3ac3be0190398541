//! Multi-factor login pipeline and forced-lockout tests.

use std::sync::Arc;
use std::time::Duration;

use papersentry::monitor::camera::SyntheticCamera;
use papersentry::oracle::{
    ActivityVerdict, FaceVerdict, ForensicReport, OracleError, SimulatedOracle, VerdictOracle,
};
use papersentry::session::{AuthError, LoginAttempt, SessionController, SessionError};
use papersentry::store::{MemoryRepository, Repository};
use papersentry::types::{AuditKind, Severity, UserRole};

const WHITELISTED: &str = "writer@example.org";

async fn controller() -> (Arc<MemoryRepository>, Arc<SessionController>) {
    let repo = Arc::new(MemoryRepository::new());
    repo.add_to_whitelist(WHITELISTED).await.expect("seed whitelist");
    let oracle = Arc::new(SimulatedOracle::new(repo.clone()));
    let controller = Arc::new(SessionController::new(repo.clone(), oracle));
    (repo, controller)
}

fn attempt() -> LoginAttempt {
    LoginAttempt {
        email: WHITELISTED.to_owned(),
        role: UserRole::Setter,
        password: "secret-pass".to_owned(),
        otp: "882931".to_owned(),
        face_frame_b64: "frame-payload".to_owned(),
    }
}

#[tokio::test]
async fn malformed_email_is_rejected() {
    let (_, controller) = controller().await;
    let mut bad = attempt();
    bad.email = "not-an-email".to_owned();
    assert!(matches!(
        controller.login(bad).await,
        Err(AuthError::InvalidEmail)
    ));
}

#[tokio::test]
async fn non_whitelisted_identity_is_rejected() {
    let (_, controller) = controller().await;
    let mut bad = attempt();
    bad.email = "intruder@example.org".to_owned();
    assert!(matches!(
        controller.login(bad).await,
        Err(AuthError::NotWhitelisted)
    ));
    assert!(controller.current_user().await.is_none());
}

#[tokio::test]
async fn weak_password_is_rejected() {
    let (_, controller) = controller().await;
    let mut bad = attempt();
    bad.password = "short".to_owned();
    assert!(matches!(
        controller.login(bad).await,
        Err(AuthError::WeakPassword)
    ));
}

#[tokio::test]
async fn wrong_otp_is_rejected() {
    let (_, controller) = controller().await;
    let mut bad = attempt();
    bad.otp = "000000".to_owned();
    assert!(matches!(controller.login(bad).await, Err(AuthError::InvalidOtp)));
}

#[tokio::test]
async fn master_otp_bypass_is_accepted() {
    let (_, controller) = controller().await;
    let mut ok = attempt();
    ok.otp = "123456".to_owned();
    controller.login(ok).await.expect("login");
    assert!(controller.current_user().await.is_some());
}

#[tokio::test]
async fn enrollment_stores_signature_and_audits_login() {
    let (repo, controller) = controller().await;
    let user = controller.login(attempt()).await.expect("login");

    assert_eq!(user.email, WHITELISTED);
    assert_eq!(user.full_name, "WRITER");
    assert_eq!(user.face_signature.as_deref(), Some("frame-payload"));

    let logs = repo.audit_logs().await.expect("logs");
    assert!(logs
        .iter()
        .any(|l| l.kind == AuditKind::Login && l.severity == Severity::Low));
}

#[tokio::test]
async fn existing_user_must_present_matching_password() {
    let (_, controller) = controller().await;
    controller.login(attempt()).await.expect("enroll");
    controller.logout().await;

    let mut wrong = attempt();
    wrong.password = "other-secret".to_owned();
    assert!(matches!(
        controller.login(wrong).await,
        Err(AuthError::InvalidCredentials)
    ));
}

#[tokio::test]
async fn role_clash_is_rejected() {
    let (_, controller) = controller().await;
    controller.login(attempt()).await.expect("enroll as setter");
    controller.logout().await;

    let mut clash = attempt();
    clash.role = UserRole::Authoriser;
    assert!(matches!(
        controller.login(clash).await,
        Err(AuthError::RoleClash {
            registered: UserRole::Setter
        })
    ));
}

/// Oracle that confidently denies every face match.
struct DenyingOracle;

#[async_trait::async_trait]
impl VerdictOracle for DenyingOracle {
    async fn verify_face(
        &self,
        _frame_b64: &str,
        _enrolled_b64: &str,
    ) -> Result<FaceVerdict, OracleError> {
        Ok(FaceVerdict {
            matched: false,
            confidence: 0.92,
            reason: Some("different person".to_owned()),
        })
    }

    async fn detect_suspicious_activity(
        &self,
        _frame_b64: &str,
    ) -> Result<ActivityVerdict, OracleError> {
        Ok(ActivityVerdict {
            suspicious: false,
            kind: "CLEAR".to_owned(),
            details: String::new(),
        })
    }

    async fn extract_forensic_watermark(
        &self,
        _leaked_image_b64: &str,
    ) -> Result<ForensicReport, OracleError> {
        Err(OracleError::Parse("not under test".to_owned()))
    }
}

#[tokio::test]
async fn confident_face_mismatch_blocks_login() {
    let (repo, bootstrap) = controller().await;
    bootstrap.login(attempt()).await.expect("enroll");
    bootstrap.logout().await;

    // Same store, stricter oracle: the returning "user" is someone else.
    let strict = Arc::new(SessionController::new(repo, Arc::new(DenyingOracle)));
    assert!(matches!(
        strict.login(attempt()).await,
        Err(AuthError::BiometricMismatch)
    ));
    assert!(strict.current_user().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn monitor_escalation_forces_logout_with_critical_audit() {
    let (repo, controller) = controller().await;
    controller.login(attempt()).await.expect("login");
    let user = controller.current_user().await.expect("user");

    let paper = controller.vault().create_paper(&user).await.expect("paper");

    // Camera goes dark immediately; the first sampling cycle escalates.
    let camera = SyntheticCamera::new(0);
    controller
        .begin_editing(&paper.id, &camera)
        .await
        .expect("begin editing");

    tokio::time::timeout(Duration::from_secs(60), async {
        while controller.current_user().await.is_some() {
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
    })
    .await
    .expect("session must be terminated");

    let logs = repo.audit_logs().await.expect("logs");
    let violation = logs
        .iter()
        .find(|l| l.kind == AuditKind::SecurityAlert)
        .expect("violation entry");
    assert_eq!(violation.severity, Severity::Critical);
    assert!(violation.details.contains("CAMERA_OBSTRUCTED"));
    assert_eq!(violation.user_id, user.id);
}

#[tokio::test]
async fn sealed_paper_requires_a_redeemed_grant() {
    let (_, controller) = controller().await;
    controller.login(attempt()).await.expect("login");
    let user = controller.current_user().await.expect("user");

    let paper = controller.vault().create_paper(&user).await.expect("paper");
    controller.vault().seal(&paper.id, &user.id).await.expect("seal");

    let camera = SyntheticCamera::new(170);
    let denied = controller.begin_editing(&paper.id, &camera).await;
    assert!(matches!(denied, Err(SessionError::PaperSealed)));

    // File, approve, redeem: the grant opens this session only.
    let request = controller
        .unlock_engine()
        .request_unlock(&paper.id, &user.id)
        .await
        .expect("request");
    let approved = controller
        .unlock_engine()
        .approve_request(&request.id, "auth-1")
        .await
        .expect("approve");
    let key = approved.dynamic_key.expect("key");
    controller.redeem_key(&paper.id, &key).await.expect("redeem");

    let opened = controller
        .begin_editing(&paper.id, &camera)
        .await
        .expect("editing with grant");
    assert!(opened.is_locked, "the persisted seal stays on");
    controller.end_editing().await;
}
