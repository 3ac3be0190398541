//! Top-level authentication state and session lifecycle.
//!
//! Thin orchestration over the engines: runs the multi-factor login
//! pipeline, tracks the active identity and its session-level edit
//! grants, activates monitoring when an editable paper is open, and
//! forces logout when the monitor escalates. A monitor escalation is
//! fatal to the session and cannot be dismissed by the monitored user.

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tracing::{error, info, warn};

use crate::audit::AuditTrail;
use crate::identity::{looks_like_email, normalize_email, IdentityRegistry};
use crate::monitor::camera::Camera;
use crate::monitor::{MonitorError, MonitorHandle, SecurityAlert, SecurityMonitor};
use crate::oracle::{OracleError, VerdictOracle};
use crate::papers::{PaperError, PaperVault};
use crate::store::{Repository, StoreError};
use crate::types::{ExamPaper, Severity, User, UserRole};
use crate::unlock::{EditGrant, UnlockEngine, UnlockError};

/// Demo one-time password "delivered" out of band.
const DEMO_OTP: &str = "882931";
/// Master bypass token kept for demonstrations.
const MASTER_OTP: &str = "123456";
/// Minimum accepted password length.
const MIN_PASSWORD_LEN: usize = 6;
/// Minimum oracle confidence for a login face match to count.
const LOGIN_CONFIDENCE_THRESHOLD: f64 = 0.6;

/// Errors from the login pipeline. All are synchronous and recoverable;
/// none mutates state.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The email does not look like an email.
    #[error("invalid email structure")]
    InvalidEmail,
    /// The identity is not on the whitelist.
    #[error("identity is not in the system whitelist")]
    NotWhitelisted,
    /// The email is already registered under the other role.
    #[error("identity clash: registered as {registered}")]
    RoleClash {
        /// Role the identity registered under.
        registered: UserRole,
    },
    /// Password shorter than the minimum.
    #[error("password must be at least {MIN_PASSWORD_LEN} characters")]
    WeakPassword,
    /// Password did not match the enrolled credential.
    #[error("invalid credentials")]
    InvalidCredentials,
    /// One-time password verification failed.
    #[error("invalid OTP token")]
    InvalidOtp,
    /// The face in frame did not match the enrolled signature.
    #[error("biometric identity mismatch")]
    BiometricMismatch,
    /// The verdict oracle failed under a fail-closed policy.
    #[error("biometric verification unavailable: {0}")]
    Oracle(#[from] OracleError),
    /// Repository failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors from session operations outside login.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// No authenticated identity.
    #[error("not authenticated")]
    NotAuthenticated,
    /// The paper is sealed and the session holds no grant for it.
    #[error("paper is sealed; redeem an authorization key first")]
    PaperSealed,
    /// Monitoring could not start.
    #[error(transparent)]
    Monitor(#[from] MonitorError),
    /// Unlock workflow failure.
    #[error(transparent)]
    Unlock(#[from] UnlockError),
    /// Paper vault failure.
    #[error(transparent)]
    Paper(#[from] PaperError),
    /// Repository failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// One login attempt's collected factors.
#[derive(Debug, Clone)]
pub struct LoginAttempt {
    /// Claimed email identity.
    pub email: String,
    /// Role the user is logging in under.
    pub role: UserRole,
    /// Password factor.
    pub password: String,
    /// One-time password factor.
    pub otp: String,
    /// Base64 still frame captured at the face step.
    pub face_frame_b64: String,
}

#[derive(Default)]
struct SessionState {
    current_user: Option<User>,
    grants: Vec<EditGrant>,
    monitor: Option<MonitorHandle>,
}

/// Orchestrates login, session-level grants, and monitor-driven lockout.
pub struct SessionController {
    audit: AuditTrail,
    identity: IdentityRegistry,
    oracle: Arc<dyn VerdictOracle>,
    unlock: UnlockEngine,
    vault: PaperVault,
    monitor: SecurityMonitor,
    state: Arc<Mutex<SessionState>>,
}

impl SessionController {
    /// Wire a controller over the given repository and oracle.
    pub fn new(repo: Arc<dyn Repository>, oracle: Arc<dyn VerdictOracle>) -> Self {
        let audit = AuditTrail::new(Arc::clone(&repo));
        Self {
            identity: IdentityRegistry::new(Arc::clone(&repo), audit.clone()),
            unlock: UnlockEngine::new(Arc::clone(&repo), audit.clone()),
            vault: PaperVault::new(Arc::clone(&repo), audit.clone()),
            monitor: SecurityMonitor::new(Arc::clone(&oracle)),
            oracle,
            audit,
            state: Arc::new(Mutex::new(SessionState::default())),
        }
    }

    /// The unlock workflow engine.
    pub fn unlock_engine(&self) -> &UnlockEngine {
        &self.unlock
    }

    /// The paper vault.
    pub fn vault(&self) -> &PaperVault {
        &self.vault
    }

    /// The identity registry.
    pub fn identity(&self) -> &IdentityRegistry {
        &self.identity
    }

    /// The currently authenticated identity, if any.
    pub async fn current_user(&self) -> Option<User> {
        self.state.lock().await.current_user.clone()
    }

    /// Run the full multi-factor login pipeline.
    ///
    /// Factor order: identity (email shape, whitelist, role clash) →
    /// password → OTP → face. Existing identities verify against their
    /// enrolled signature; unknown identities are enrolled with the
    /// captured frame as their signature.
    ///
    /// # Errors
    ///
    /// An [`AuthError`] naming the first factor that failed.
    pub async fn login(&self, attempt: LoginAttempt) -> Result<User, AuthError> {
        if !looks_like_email(&attempt.email) {
            return Err(AuthError::InvalidEmail);
        }
        let email = normalize_email(&attempt.email);
        if !self.identity.is_whitelisted(&email).await? {
            return Err(AuthError::NotWhitelisted);
        }

        let existing = self.identity.find_by_email(&email).await?;
        if let Some(user) = &existing {
            if user.role != attempt.role {
                return Err(AuthError::RoleClash {
                    registered: user.role,
                });
            }
        }

        if attempt.password.len() < MIN_PASSWORD_LEN {
            return Err(AuthError::WeakPassword);
        }
        if let Some(user) = &existing {
            if user.password.as_deref() != Some(attempt.password.as_str()) {
                return Err(AuthError::InvalidCredentials);
            }
        }

        if attempt.otp != DEMO_OTP && attempt.otp != MASTER_OTP {
            return Err(AuthError::InvalidOtp);
        }

        let user = match existing {
            Some(user) if user.face_signature.is_some() => {
                let enrolled = user.face_signature.clone().unwrap_or_default();
                let verdict = self
                    .oracle
                    .verify_face(&attempt.face_frame_b64, &enrolled)
                    .await?;
                if !(verdict.matched && verdict.confidence > LOGIN_CONFIDENCE_THRESHOLD) {
                    return Err(AuthError::BiometricMismatch);
                }
                user
            }
            _ => {
                self.identity
                    .register(
                        &email,
                        attempt.role,
                        attempt.password.clone(),
                        attempt.face_frame_b64.clone(),
                    )
                    .await?
            }
        };

        self.state.lock().await.current_user = Some(user.clone());
        self.audit
            .login(
                &user.id,
                format!("User {email} logged in successfully via biometric verification."),
            )
            .await?;
        Ok(user)
    }

    /// End the session voluntarily: audit, clear state, stop monitoring.
    pub async fn logout(&self) {
        let (user, handle) = {
            let mut state = self.state.lock().await;
            let user = state.current_user.take();
            state.grants.clear();
            (user, state.monitor.take())
        };
        if let Some(handle) = handle {
            handle.deactivate();
        }
        if let Some(user) = user {
            if let Err(e) = self
                .audit
                .login(&user.id, format!("User {} logged out.", user.email))
                .await
            {
                warn!(error = %e, "failed to audit logout");
            }
        }
    }

    /// Redeem a dynamic key, attaching the grant to this session.
    ///
    /// # Errors
    ///
    /// Propagates the workflow's uniform invalid-key failure.
    pub async fn redeem_key(
        &self,
        paper_id: &str,
        submitted_key: &str,
    ) -> Result<EditGrant, SessionError> {
        if self.current_user().await.is_none() {
            return Err(SessionError::NotAuthenticated);
        }
        let grant = self.unlock.redeem_key(paper_id, submitted_key).await?;
        self.state.lock().await.grants.push(grant.clone());
        Ok(grant)
    }

    /// Open a paper for editing and activate session monitoring.
    ///
    /// A sealed paper requires a grant redeemed earlier in this session.
    /// Monitoring escalations force logout through the alert listener
    /// spawned here.
    ///
    /// # Errors
    ///
    /// [`SessionError::PaperSealed`] without a grant;
    /// [`SessionError::Monitor`] when the camera cannot be acquired (a
    /// `HARDWARE_TAMPER` alert has then already been processed).
    pub async fn begin_editing(
        &self,
        paper_id: &str,
        camera: &dyn Camera,
    ) -> Result<ExamPaper, SessionError> {
        let user = self
            .current_user()
            .await
            .ok_or(SessionError::NotAuthenticated)?;
        let paper = self.vault.get(paper_id).await?;

        if paper.is_locked {
            let granted = self
                .state
                .lock()
                .await
                .grants
                .iter()
                .any(|g| g.paper_id == paper_id);
            if !granted {
                return Err(SessionError::PaperSealed);
            }
        }

        // The listener holds its own handles on the audit trail and the
        // session state, so lockout works even after the controller's
        // caller has moved on.
        let (alerts_tx, mut alerts_rx) = mpsc::channel(4);
        let audit = self.audit.clone();
        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            if let Some(alert) = alerts_rx.recv().await {
                force_lockout(&audit, &state, alert).await;
            }
        });

        let handle = self.monitor.activate(&user, camera, alerts_tx).await?;
        self.state.lock().await.monitor = Some(handle);
        Ok(paper)
    }

    /// Close the editor: stop monitoring, keep the session.
    pub async fn end_editing(&self) {
        if let Some(handle) = self.state.lock().await.monitor.take() {
            handle.deactivate();
        }
    }
}

/// React to a confirmed violation: critical audit entry, then forced
/// logout. Not dismissible by the monitored user.
async fn force_lockout(audit: &AuditTrail, state: &Mutex<SessionState>, alert: SecurityAlert) {
    let (user, handle) = {
        let mut state = state.lock().await;
        let user = state.current_user.take();
        state.grants.clear();
        (user, state.monitor.take())
    };
    if let Some(handle) = handle {
        handle.deactivate();
    }
    let Some(user) = user else {
        return;
    };

    error!(kind = %alert.kind, "security violation, forcing logout");
    if let Err(e) = audit
        .security_alert(
            &user.id,
            format!("VIOLATION DETECTED: {} - {}", alert.kind, alert.details),
            Severity::Critical,
        )
        .await
    {
        warn!(error = %e, "failed to audit security violation");
    }
    if let Err(e) = audit
        .login(&user.id, format!("User {} logged out.", user.email))
        .await
    {
        warn!(error = %e, "failed to audit forced logout");
    }
    info!("session terminated by security monitor");
}
