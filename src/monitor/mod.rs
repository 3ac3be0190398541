//! Continuous session monitoring with escalation to lockout.
//!
//! While an editing session is open, a background task samples the
//! camera every three seconds and runs three checks in strict order,
//! short-circuiting on the first positive:
//!
//! 1. local blindness heuristic (pixel math, no oracle round-trip)
//! 2. behavioral scan via the verdict oracle
//! 3. identity-consistency check via the verdict oracle
//!
//! The order is a hard contract — the cheap local check must be able to
//! terminate a cycle before any oracle call is issued. The first
//! confirmed violation escalates: one typed alert on the channel, then
//! the loop stops. Escalation is not self-healing; resuming requires a
//! fresh [`SecurityMonitor::activate`], normally after re-authentication.

pub mod camera;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

use crate::oracle::VerdictOracle;
use crate::types::User;

use camera::{Camera, CameraError, FrameSource};

/// Fixed sampling cadence. Tight enough to bound the window of an
/// undetected violation, loose enough to bound oracle call volume.
pub const SAMPLE_INTERVAL: Duration = Duration::from_millis(3000);

/// Mean-luminance floor below which the camera counts as obstructed.
const DARKNESS_THRESHOLD: f64 = 15.0;

/// Minimum oracle confidence for a non-match to count as an identity
/// breach. Low-confidence non-matches are oracle noise, not evidence.
const IDENTITY_CONFIDENCE_THRESHOLD: f64 = 0.6;

/// Alert kind: capture hardware absent or stream interrupted.
pub const ALERT_HARDWARE_TAMPER: &str = "HARDWARE_TAMPER";
/// Alert kind: camera covered or feed dark.
pub const ALERT_CAMERA_OBSTRUCTED: &str = "CAMERA_OBSTRUCTED";
/// Alert kind: confident face mismatch against the enrolled owner.
pub const ALERT_IDENTITY_MISMATCH: &str = "IDENTITY_MISMATCH";
/// Alert kind: verdict oracle failed and the failure policy propagated.
pub const ALERT_ORACLE_UNAVAILABLE: &str = "ORACLE_UNAVAILABLE";

/// Monitoring state of one session instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorStatus {
    /// Sampling normally.
    Active,
    /// Reserved for soft violations; no rule currently produces it.
    Warning,
    /// A violation fired. Terminal for this instance.
    Alert,
}

/// A confirmed violation emitted on the alert channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityAlert {
    /// Machine-usable alert classification.
    pub kind: String,
    /// Human-readable description.
    pub details: String,
}

/// Errors from monitor activation.
#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    /// The capture device could not be acquired. A matching
    /// `HARDWARE_TAMPER` alert has already been emitted.
    #[error(transparent)]
    CameraUnavailable(#[from] CameraError),
    /// The session owner has no enrolled face signature to verify
    /// against.
    #[error("session owner has no enrolled face signature")]
    NotEnrolled,
}

/// Factory for monitoring sessions.
pub struct SecurityMonitor {
    oracle: Arc<dyn VerdictOracle>,
}

/// Handle to one running monitoring session.
pub struct MonitorHandle {
    status_rx: watch::Receiver<MonitorStatus>,
    shutdown_tx: watch::Sender<bool>,
}

impl SecurityMonitor {
    /// Create a monitor factory over the given oracle.
    pub fn new(oracle: Arc<dyn VerdictOracle>) -> Self {
        Self { oracle }
    }

    /// Begin monitoring a session owned by `owner`.
    ///
    /// Acquires the capture handle and spawns the sampling loop. Camera
    /// absence is itself a violation: acquisition failure emits exactly
    /// one `HARDWARE_TAMPER` alert on `alerts` and no sampling cycle
    /// ever runs.
    ///
    /// # Errors
    ///
    /// [`MonitorError::NotEnrolled`] if the owner has no face signature;
    /// [`MonitorError::CameraUnavailable`] if acquisition fails.
    pub async fn activate(
        &self,
        owner: &User,
        camera: &dyn Camera,
        alerts: mpsc::Sender<SecurityAlert>,
    ) -> Result<MonitorHandle, MonitorError> {
        let enrolled = owner
            .face_signature
            .clone()
            .ok_or(MonitorError::NotEnrolled)?;

        let source = match camera.open().await {
            Ok(source) => source,
            Err(e) => {
                let _ = alerts
                    .send(SecurityAlert {
                        kind: ALERT_HARDWARE_TAMPER.to_owned(),
                        details: "Mandatory biometric stream interrupted.".to_owned(),
                    })
                    .await;
                return Err(MonitorError::CameraUnavailable(e));
            }
        };

        let (status_tx, status_rx) = watch::channel(MonitorStatus::Active);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        info!(owner = %owner.id, "session monitoring activated");
        tokio::spawn(sampling_loop(
            source,
            Arc::clone(&self.oracle),
            enrolled,
            alerts,
            status_tx,
            shutdown_rx,
        ));

        Ok(MonitorHandle {
            status_rx,
            shutdown_tx,
        })
    }
}

impl MonitorHandle {
    /// Current monitoring status.
    pub fn status(&self) -> MonitorStatus {
        *self.status_rx.borrow()
    }

    /// Stop the sampling loop and release the capture device.
    ///
    /// Callable at any status; idempotent. Dropping the handle has the
    /// same effect, so teardown is guaranteed on every exit path.
    pub fn deactivate(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

/// Outcome of one sampling cycle.
enum CycleOutcome {
    Clear,
    Violation(SecurityAlert),
}

async fn sampling_loop(
    mut source: Box<dyn FrameSource>,
    oracle: Arc<dyn VerdictOracle>,
    enrolled: String,
    alerts: mpsc::Sender<SecurityAlert>,
    status_tx: watch::Sender<MonitorStatus>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut interval = tokio::time::interval(SAMPLE_INTERVAL);
    // A cycle that overruns delays the next tick rather than stacking a
    // second in-flight cycle on the shared capture handle.
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // Consume the immediate first tick; the first sample lands one full
    // interval after activation.
    interval.tick().await;

    loop {
        tokio::select! {
            _ = interval.tick() => {
                match run_cycle(source.as_mut(), oracle.as_ref(), &enrolled).await {
                    CycleOutcome::Clear => {}
                    CycleOutcome::Violation(alert) => {
                        let _ = status_tx.send(MonitorStatus::Alert);
                        warn!(kind = %alert.kind, details = %alert.details, "monitor escalation");
                        let _ = alerts.send(alert).await;
                        break;
                    }
                }
            }
            result = shutdown_rx.changed() => {
                if result.is_err() || *shutdown_rx.borrow() {
                    info!("session monitoring deactivated");
                    break;
                }
            }
        }
    }
    // Loop exit drops `source`, releasing the capture handle.
}

/// One sampling cycle: capture, then the three ordered checks.
async fn run_cycle(
    source: &mut dyn FrameSource,
    oracle: &dyn VerdictOracle,
    enrolled: &str,
) -> CycleOutcome {
    let frame = match source.capture().await {
        Ok(frame) => frame,
        Err(e) => {
            return CycleOutcome::Violation(SecurityAlert {
                kind: ALERT_HARDWARE_TAMPER.to_owned(),
                details: format!("Biometric stream interrupted: {e}"),
            });
        }
    };

    // 1. Local blindness heuristic. Must run every cycle and must be
    // able to end the cycle before any oracle round-trip.
    if frame.mean_luminance() < DARKNESS_THRESHOLD {
        return CycleOutcome::Violation(SecurityAlert {
            kind: ALERT_CAMERA_OBSTRUCTED.to_owned(),
            details: "Security violation: camera is covered or obscured.".to_owned(),
        });
    }

    let payload = frame.to_base64();

    // 2. Behavioral scan.
    match oracle.detect_suspicious_activity(&payload).await {
        Ok(verdict) if verdict.suspicious => {
            return CycleOutcome::Violation(SecurityAlert {
                kind: verdict.kind,
                details: verdict.details,
            });
        }
        Ok(_) => {}
        Err(e) => {
            return CycleOutcome::Violation(SecurityAlert {
                kind: ALERT_ORACLE_UNAVAILABLE.to_owned(),
                details: format!("Behavioral verdict unavailable: {e}"),
            });
        }
    }

    // 3. Identity consistency. Only a confident non-match escalates.
    match oracle.verify_face(&payload, enrolled).await {
        Ok(verdict) => {
            if !verdict.matched && verdict.confidence > IDENTITY_CONFIDENCE_THRESHOLD {
                return CycleOutcome::Violation(SecurityAlert {
                    kind: ALERT_IDENTITY_MISMATCH.to_owned(),
                    details: "Identity breach: session owner no longer detected in frame."
                        .to_owned(),
                });
            }
        }
        Err(e) => {
            return CycleOutcome::Violation(SecurityAlert {
                kind: ALERT_ORACLE_UNAVAILABLE.to_owned(),
                details: format!("Identity verdict unavailable: {e}"),
            });
        }
    }

    CycleOutcome::Clear
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::{ActivityVerdict, FaceVerdict, ForensicReport, OracleError};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedOracle {
        suspicious: bool,
        matched: bool,
        confidence: f64,
        activity_calls: AtomicUsize,
        face_calls: AtomicUsize,
    }

    impl ScriptedOracle {
        fn new(suspicious: bool, matched: bool, confidence: f64) -> Self {
            Self {
                suspicious,
                matched,
                confidence,
                activity_calls: AtomicUsize::new(0),
                face_calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait::async_trait]
    impl VerdictOracle for ScriptedOracle {
        async fn verify_face(
            &self,
            _frame_b64: &str,
            _enrolled_b64: &str,
        ) -> Result<FaceVerdict, OracleError> {
            self.face_calls.fetch_add(1, Ordering::SeqCst);
            Ok(FaceVerdict {
                matched: self.matched,
                confidence: self.confidence,
                reason: None,
            })
        }

        async fn detect_suspicious_activity(
            &self,
            _frame_b64: &str,
        ) -> Result<ActivityVerdict, OracleError> {
            self.activity_calls.fetch_add(1, Ordering::SeqCst);
            Ok(ActivityVerdict {
                suspicious: self.suspicious,
                kind: "PHONE_DETECTED".to_owned(),
                details: "mobile phone in hand".to_owned(),
            })
        }

        async fn extract_forensic_watermark(
            &self,
            _leaked_image_b64: &str,
        ) -> Result<ForensicReport, OracleError> {
            Err(OracleError::Parse("not under test".to_owned()))
        }
    }

    struct FixedSource {
        level: u8,
    }

    #[async_trait::async_trait]
    impl camera::FrameSource for FixedSource {
        async fn capture(&mut self) -> Result<camera::Frame, CameraError> {
            Ok(camera::Frame {
                width: 16,
                height: 16,
                rgb: vec![self.level; 768],
            })
        }
    }

    #[tokio::test]
    async fn dark_frame_escalates_without_any_oracle_call() {
        let oracle = ScriptedOracle::new(false, true, 0.95);
        let mut source = FixedSource { level: 4 };

        let outcome = run_cycle(&mut source, &oracle, "sig").await;
        match outcome {
            CycleOutcome::Violation(alert) => assert_eq!(alert.kind, ALERT_CAMERA_OBSTRUCTED),
            CycleOutcome::Clear => panic!("expected escalation"),
        }
        assert_eq!(oracle.activity_calls.load(Ordering::SeqCst), 0);
        assert_eq!(oracle.face_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn clean_cycle_leaves_status_untouched() {
        let oracle = ScriptedOracle::new(false, true, 0.95);
        let mut source = FixedSource { level: 140 };

        let outcome = run_cycle(&mut source, &oracle, "sig").await;
        assert!(matches!(outcome, CycleOutcome::Clear));
        assert_eq!(oracle.activity_calls.load(Ordering::SeqCst), 1);
        assert_eq!(oracle.face_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn suspicious_verdict_short_circuits_face_check() {
        let oracle = ScriptedOracle::new(true, true, 0.95);
        let mut source = FixedSource { level: 140 };

        let outcome = run_cycle(&mut source, &oracle, "sig").await;
        match outcome {
            CycleOutcome::Violation(alert) => {
                assert_eq!(alert.kind, "PHONE_DETECTED");
                assert_eq!(alert.details, "mobile phone in hand");
            }
            CycleOutcome::Clear => panic!("expected escalation"),
        }
        assert_eq!(oracle.face_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn confident_mismatch_escalates_identity_breach() {
        let oracle = ScriptedOracle::new(false, false, 0.61);
        let mut source = FixedSource { level: 140 };

        let outcome = run_cycle(&mut source, &oracle, "sig").await;
        match outcome {
            CycleOutcome::Violation(alert) => assert_eq!(alert.kind, ALERT_IDENTITY_MISMATCH),
            CycleOutcome::Clear => panic!("expected escalation"),
        }
    }

    #[tokio::test]
    async fn low_confidence_mismatch_is_tolerated() {
        let oracle = ScriptedOracle::new(false, false, 0.4);
        let mut source = FixedSource { level: 140 };

        let outcome = run_cycle(&mut source, &oracle, "sig").await;
        assert!(matches!(outcome, CycleOutcome::Clear));
    }
}
