//! Verdict oracle abstraction.
//!
//! Defines the [`VerdictOracle`] trait and the structured verdict types
//! shared by all implementations.
//!
//! Three implementations:
//! - [`gemini::GeminiOracle`] — remote generative-AI `generateContent` API
//! - [`sim::SimulatedOracle`] — deterministic offline verdicts
//! - [`resilient::ResilientOracle`] — policy wrapper that makes the
//!   fail-open / fail-closed asymmetry an explicit, reviewable choice

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};

pub mod gemini;
pub mod resilient;
pub mod sim;

pub use gemini::GeminiOracle;
pub use resilient::{MonitorFailurePolicy, ResilientOracle};
pub use sim::SimulatedOracle;

// ---------------------------------------------------------------------------
// Verdict types
// ---------------------------------------------------------------------------

/// Outcome of an identity-consistency check between a captured frame and
/// an enrolled face signature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceVerdict {
    /// Whether the frame shows the enrolled identity.
    pub matched: bool,
    /// Oracle confidence in the verdict, 0..1.
    pub confidence: f64,
    /// Optional free-text rationale.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Outcome of a behavioral scan of one frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityVerdict {
    /// Whether a behavioral red flag is visible.
    pub suspicious: bool,
    /// Short machine-usable classification (e.g. `MULTIPLE_PEOPLE`).
    #[serde(rename = "type")]
    pub kind: String,
    /// Free-text description.
    pub details: String,
}

/// Leak attribution extracted from a watermarked image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForensicReport {
    /// User id reconstructed from the watermark.
    pub setter_id: String,
    /// Email reconstructed from the watermark.
    pub email: String,
    /// Leak timestamp reconstructed from the watermark.
    pub timestamp: String,
    /// Capture device signature.
    pub device_info: String,
    /// Attribution confidence, 0..1.
    pub leak_confidence: f64,
    /// Forensic reasoning narrative.
    pub analysis: String,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors returned by oracle implementations.
#[derive(Debug, thiserror::Error)]
pub enum OracleError {
    /// HTTP transport failure (includes bounded-timeout expiry).
    #[error("oracle request failed: {0}")]
    Request(#[from] reqwest::Error),
    /// Upstream responded with a non-success status.
    #[error("oracle returned non-success status {status}: {body}")]
    HttpStatus {
        /// HTTP status code.
        status: u16,
        /// Sanitized response body.
        body: String,
    },
    /// Response did not match the documented schema.
    #[error("oracle response parse error: {0}")]
    Parse(String),
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Asynchronous capability producing face, behavior, and forensic
/// verdicts. Image inputs are opaque base64-encoded single still frames.
#[async_trait]
pub trait VerdictOracle: Send + Sync {
    /// Compare a candidate frame against an enrolled face signature.
    ///
    /// # Errors
    ///
    /// Returns [`OracleError`] on transport, API, or parse failure.
    async fn verify_face(
        &self,
        frame_b64: &str,
        enrolled_b64: &str,
    ) -> Result<FaceVerdict, OracleError>;

    /// Scan a frame for behavioral red flags.
    ///
    /// # Errors
    ///
    /// Returns [`OracleError`] on transport, API, or parse failure.
    async fn detect_suspicious_activity(
        &self,
        frame_b64: &str,
    ) -> Result<ActivityVerdict, OracleError>;

    /// Reconstruct the forensic watermark embedded in a leaked image.
    ///
    /// # Errors
    ///
    /// Returns [`OracleError`] on transport, API, or parse failure.
    async fn extract_forensic_watermark(
        &self,
        leaked_image_b64: &str,
    ) -> Result<ForensicReport, OracleError>;
}

// ---------------------------------------------------------------------------
// HTTP helpers
// ---------------------------------------------------------------------------

/// Check HTTP response status and return body text or a structured error.
///
/// # Errors
///
/// Returns `OracleError::Request` on transport failure,
/// `OracleError::HttpStatus` on non-2xx.
pub(crate) async fn check_http_response(
    response: reqwest::Response,
) -> Result<String, OracleError> {
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        return Err(OracleError::HttpStatus {
            status: status.as_u16(),
            body: sanitize_http_error_body(&body),
        });
    }
    Ok(body)
}

fn sanitize_http_error_body(raw: &str) -> String {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");

    let mut sanitized = collapsed;
    for pattern in [
        r"AIza[A-Za-z0-9_\-]{30,}",
        r"sk-[A-Za-z0-9]{32,}",
        r"(?i)bearer\s+[A-Za-z0-9._\-]{16,}",
    ] {
        if let Ok(regex) = Regex::new(pattern) {
            sanitized = regex.replace_all(&sanitized, "[REDACTED]").into_owned();
        }
    }

    const MAX_ERROR_BODY_CHARS: usize = 256;
    if sanitized.chars().count() > MAX_ERROR_BODY_CHARS {
        let shortened = sanitized
            .chars()
            .take(MAX_ERROR_BODY_CHARS)
            .collect::<String>();
        return format!("{shortened}...[truncated]");
    }

    sanitized
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_redacts_api_keys_and_truncates() {
        let body = format!(
            "error AIza{} details {}",
            "x".repeat(35),
            "y".repeat(400)
        );
        let out = sanitize_http_error_body(&body);
        assert!(out.contains("[REDACTED]"));
        assert!(!out.contains("AIza"));
        assert!(out.ends_with("...[truncated]"));
    }

    #[test]
    fn activity_verdict_uses_wire_field_name() {
        let v: ActivityVerdict =
            serde_json::from_str(r#"{"suspicious":true,"type":"MULTIPLE_PEOPLE","details":"two faces"}"#)
                .expect("deserialize");
        assert_eq!(v.kind, "MULTIPLE_PEOPLE");
    }
}
