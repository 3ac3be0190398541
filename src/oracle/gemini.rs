//! Remote oracle implementation using the Gemini `generateContent` API.
//!
//! Each capability sends one or two inline JPEG payloads plus an
//! instruction, requests a JSON response, and validates the returned
//! document against the documented verdict schema — malformed responses
//! are rejected, never trust-parsed.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::{
    check_http_response, ActivityVerdict, FaceVerdict, ForensicReport, OracleError, VerdictOracle,
};

const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";
const MODEL: &str = "gemini-3-flash-preview";
const JPEG_MIME: &str = "image/jpeg";

const FACE_PROMPT: &str = "Compare these two faces. Are they the same person? \
    Return JSON with boolean 'matched', numeric 'confidence' (0-1), and 'reason'. \
    Respond ONLY with JSON.";

const ACTIVITY_PROMPT: &str = "Security monitoring of a single webcam frame. Identify: \
    1. Face missing. 2. Multiple people. 3. Camera obstruction. 4. Mobile phone in hand. \
    Return JSON { suspicious: boolean, type: string, details: string }.";

const FORENSIC_PROMPT: &str = "Forensic leak investigation. Scan the image for microscopic \
    repeating text watermarks in the format 'WatermarkID::UserID::Email::Timestamp'. \
    Extract the exact email address, user id, and date/time, applying noise reduction \
    if the image is a photo of a screen. Return JSON with string fields 'setter_id', \
    'email', 'timestamp', 'device_info', numeric 'leak_confidence' (0-1), and 'analysis'.";

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
enum Part {
    InlineData {
        #[serde(rename = "mimeType")]
        mime_type: String,
        data: String,
    },
    Text(String),
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    #[serde(rename = "responseMimeType")]
    response_mime_type: String,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

// ---------------------------------------------------------------------------
// Oracle
// ---------------------------------------------------------------------------

/// Oracle backed by the remote generative-AI service.
pub struct GeminiOracle {
    client: reqwest::Client,
    api_key: String,
}

impl GeminiOracle {
    /// Create a remote oracle with a bounded per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns [`OracleError::Request`] if the HTTP client cannot be built.
    pub fn new(api_key: String, timeout: Duration) -> Result<Self, OracleError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, api_key })
    }

    async fn generate<T: DeserializeOwned>(&self, parts: Vec<Part>) -> Result<T, OracleError> {
        let request = GenerateRequest {
            contents: vec![Content { parts }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json".to_owned(),
            },
        };

        let url = format!("{API_BASE}/{MODEL}:generateContent");
        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await?;
        let body = check_http_response(response).await?;

        let parsed: GenerateResponse = serde_json::from_str(&body)
            .map_err(|e| OracleError::Parse(format!("response envelope: {e}")))?;
        let text = parsed
            .candidates
            .first()
            .and_then(|c| c.content.parts.first())
            .and_then(|p| p.text.as_deref())
            .ok_or_else(|| OracleError::Parse("response carried no text part".to_owned()))?;

        serde_json::from_str(text.trim())
            .map_err(|e| OracleError::Parse(format!("verdict document: {e}")))
    }

    fn image(data: &str) -> Part {
        Part::InlineData {
            mime_type: JPEG_MIME.to_owned(),
            data: data.to_owned(),
        }
    }
}

#[async_trait::async_trait]
impl VerdictOracle for GeminiOracle {
    async fn verify_face(
        &self,
        frame_b64: &str,
        enrolled_b64: &str,
    ) -> Result<FaceVerdict, OracleError> {
        let mut verdict: FaceVerdict = self
            .generate(vec![
                Self::image(enrolled_b64),
                Self::image(frame_b64),
                Part::Text(FACE_PROMPT.to_owned()),
            ])
            .await?;
        if !verdict.confidence.is_finite() {
            return Err(OracleError::Parse("non-finite confidence".to_owned()));
        }
        verdict.confidence = verdict.confidence.clamp(0.0, 1.0);
        Ok(verdict)
    }

    async fn detect_suspicious_activity(
        &self,
        frame_b64: &str,
    ) -> Result<ActivityVerdict, OracleError> {
        self.generate(vec![
            Self::image(frame_b64),
            Part::Text(ACTIVITY_PROMPT.to_owned()),
        ])
        .await
    }

    async fn extract_forensic_watermark(
        &self,
        leaked_image_b64: &str,
    ) -> Result<ForensicReport, OracleError> {
        let mut report: ForensicReport = self
            .generate(vec![
                Self::image(leaked_image_b64),
                Part::Text(FORENSIC_PROMPT.to_owned()),
            ])
            .await?;
        if !report.leak_confidence.is_finite() {
            return Err(OracleError::Parse("non-finite leak confidence".to_owned()));
        }
        report.leak_confidence = report.leak_confidence.clamp(0.0, 1.0);
        Ok(report)
    }
}
