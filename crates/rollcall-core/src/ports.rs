//! Contracts for the external collaborators the workflow drives.
//!
//! Adapters live in `rollcall-io`; the workflow only sees these traits.

use crate::attendance::{AttendanceMap, LedgerError};
use crate::types::{ConfidenceScore, IdentityToken, ImageRef};
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Three-way result of asking for an image.
#[derive(Debug, Clone)]
pub enum ImageOutcome {
    Image(ImageRef),
    /// The user backed out without choosing anything.
    Cancelled,
    /// The platform could not produce an image.
    Failed(String),
}

/// Supplies still images from a live capture or a library selection.
#[async_trait]
pub trait ImageSource: Send + Sync {
    async fn capture(&self) -> ImageOutcome;
    async fn pick_from_library(&self) -> ImageOutcome;
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FaceServiceError {
    #[error("face service unreachable: {0}")]
    Transport(String),
    #[error("face service returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("face service rejected the request: {0}")]
    Api(String),
    /// The service could not use the uploaded image (size, format, corruption).
    #[error("face service rejected the image: {0}")]
    InvalidImage(String),
    #[error("unexpected face service response: {0}")]
    Decode(String),
    #[error("face service did not answer within {0:?}")]
    Timeout(Duration),
}

/// Remote face identity service.
///
/// One request per call, no internal retries.
#[async_trait]
pub trait FaceIdentity: Send + Sync {
    /// Detect faces and return the token of the first one.
    ///
    /// `Ok(None)` means the image was processed but contained no face.
    async fn register_face(
        &self,
        image: &ImageRef,
    ) -> Result<Option<IdentityToken>, FaceServiceError>;

    async fn compare(
        &self,
        reference: &IdentityToken,
        candidate: &IdentityToken,
    ) -> Result<ConfidenceScore, FaceServiceError>;
}

/// Durable date → status mapping, read and written as a whole.
#[async_trait]
pub trait AttendanceLedger: Send + Sync {
    /// Read the full mapping. A ledger that was never written is empty.
    async fn load(&self) -> Result<AttendanceMap, LedgerError>;

    /// Replace the full mapping.
    async fn store(&self, map: &AttendanceMap) -> Result<(), LedgerError>;
}
