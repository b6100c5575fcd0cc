//! Face++ style face identity client.
//!
//! `detect` takes a base64 image and returns the token of each face found;
//! `compare` takes two face tokens and returns a 0–100 confidence. Both are
//! multipart POSTs carrying the API credentials. This adapter owns transport
//! only: timeout, HTTP error mapping and JSON decoding.

use async_trait::async_trait;
use base64::Engine;
use reqwest::multipart::Form;
use reqwest::{Client, StatusCode};
use rollcall_core::{ConfidenceScore, FaceIdentity, FaceServiceError, IdentityToken, ImageRef};
use serde::Deserialize;
use std::fmt;
use std::time::Duration;

const DETECT_PATH: &str = "/facepp/v3/detect";
const COMPARE_PATH: &str = "/facepp/v3/compare";
const MAX_ERROR_BODY_CHARS: usize = 256;
const KEY_PREFIX_CHARS: usize = 4;

/// Error message prefixes the service uses when the uploaded image itself is
/// unusable. Resending the same image fails the same way.
const IMAGE_REJECTION_PREFIXES: &[&str] =
    &["INVALID_IMAGE_SIZE", "IMAGE_ERROR_", "IMAGE_FILE_TOO_LARGE"];

/// API key pair, resolved at startup from configuration.
#[derive(Clone, PartialEq, Eq)]
pub struct FaceApiCredentials {
    pub api_key: String,
    pub api_secret: String,
}

impl fmt::Debug for FaceApiCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FaceApiCredentials")
            .field("api_key", &redact_key(&self.api_key))
            .field("api_secret", &"<redacted>")
            .finish()
    }
}

fn redact_key(key: &str) -> String {
    let prefix: String = key.chars().take(KEY_PREFIX_CHARS).collect();
    format!("{prefix}...")
}

#[derive(Debug, Deserialize)]
struct DetectResponse {
    #[serde(default)]
    faces: Vec<DetectedFace>,
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DetectedFace {
    face_token: String,
}

#[derive(Debug, Deserialize)]
struct CompareResponse {
    confidence: Option<f64>,
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error_message: String,
}

pub struct FacePlusPlusClient {
    client: Client,
    base_url: String,
    credentials: FaceApiCredentials,
    timeout: Duration,
}

impl FacePlusPlusClient {
    /// Build a client whose every request is bounded by `timeout`.
    pub fn new(
        base_url: &str,
        credentials: FaceApiCredentials,
        timeout: Duration,
    ) -> Result<Self, FaceServiceError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FaceServiceError::Transport(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials,
            timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn credentials_form(&self) -> Form {
        Form::new()
            .text("api_key", self.credentials.api_key.clone())
            .text("api_secret", self.credentials.api_secret.clone())
    }

    async fn post(&self, path: &str, form: Form) -> Result<Vec<u8>, FaceServiceError> {
        let url = format!("{}{path}", self.base_url);
        let response = self
            .client
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| self.map_transport_error(e))?;
        if !status.is_success() {
            return Err(map_status_error(status, &body));
        }
        Ok(body.to_vec())
    }

    fn map_transport_error(&self, error: reqwest::Error) -> FaceServiceError {
        if error.is_timeout() {
            FaceServiceError::Timeout(self.timeout)
        } else {
            FaceServiceError::Transport(error.to_string())
        }
    }
}

#[async_trait]
impl FaceIdentity for FacePlusPlusClient {
    async fn register_face(
        &self,
        image: &ImageRef,
    ) -> Result<Option<IdentityToken>, FaceServiceError> {
        let encoded = base64::engine::general_purpose::STANDARD.encode(image.bytes());
        let form = self.credentials_form().text("image_base64", encoded);

        let body = self.post(DETECT_PATH, form).await?;
        let token = parse_detect(&body)?;
        tracing::debug!(
            location = image.location(),
            face_found = token.is_some(),
            "detect completed"
        );
        Ok(token)
    }

    async fn compare(
        &self,
        reference: &IdentityToken,
        candidate: &IdentityToken,
    ) -> Result<ConfidenceScore, FaceServiceError> {
        let form = self
            .credentials_form()
            .text("face_token1", reference.as_str().to_string())
            .text("face_token2", candidate.as_str().to_string());

        let body = self.post(COMPARE_PATH, form).await?;
        let score = parse_compare(&body)?;
        tracing::debug!(confidence = score.value(), "compare completed");
        Ok(score)
    }
}

/// Token of the first face, or `None` when the image has no face.
fn parse_detect(body: &[u8]) -> Result<Option<IdentityToken>, FaceServiceError> {
    let decoded: DetectResponse = serde_json::from_slice(body)
        .map_err(|e| FaceServiceError::Decode(format!("invalid detect payload: {e}")))?;
    if let Some(message) = decoded.error_message {
        return Err(api_error(message));
    }
    Ok(decoded
        .faces
        .into_iter()
        .next()
        .map(|face| IdentityToken::new(face.face_token)))
}

fn parse_compare(body: &[u8]) -> Result<ConfidenceScore, FaceServiceError> {
    let decoded: CompareResponse = serde_json::from_slice(body)
        .map_err(|e| FaceServiceError::Decode(format!("invalid compare payload: {e}")))?;
    if let Some(message) = decoded.error_message {
        return Err(api_error(message));
    }
    decoded
        .confidence
        .map(ConfidenceScore)
        .ok_or_else(|| FaceServiceError::Decode("compare response has no confidence".into()))
}

fn is_image_rejection(message: &str) -> bool {
    IMAGE_REJECTION_PREFIXES
        .iter()
        .any(|prefix| message.starts_with(prefix))
}

fn api_error(message: String) -> FaceServiceError {
    if is_image_rejection(&message) {
        FaceServiceError::InvalidImage(message)
    } else {
        FaceServiceError::Api(message)
    }
}

fn map_status_error(status: StatusCode, body: &[u8]) -> FaceServiceError {
    let body = match serde_json::from_slice::<ErrorBody>(body) {
        Ok(parsed) => parsed.error_message,
        Err(_) => String::from_utf8_lossy(body)
            .chars()
            .take(MAX_ERROR_BODY_CHARS)
            .collect(),
    };
    if status.is_client_error() && is_image_rejection(&body) {
        return FaceServiceError::InvalidImage(body);
    }
    FaceServiceError::Status {
        status: status.as_u16(),
        body,
    }
}
