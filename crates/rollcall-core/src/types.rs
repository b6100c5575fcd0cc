use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

/// Confidence at or above which two faces are declared the same person.
///
/// Face++ reports confidence on a 0–100 scale.
pub const DEFAULT_MATCH_THRESHOLD: f64 = 80.0;

/// Where an image came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageOrigin {
    /// Live capture (the reference image).
    Camera,
    /// Library selection (the candidate image).
    Library,
}

impl fmt::Display for ImageOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Camera => f.write_str("camera"),
            Self::Library => f.write_str("library"),
        }
    }
}

/// Immutable handle to captured image bytes.
///
/// Cloning is cheap: the bytes are shared.
#[derive(Clone)]
pub struct ImageRef {
    origin: ImageOrigin,
    location: String,
    format: Option<String>,
    bytes: Arc<[u8]>,
}

impl ImageRef {
    pub fn new(origin: ImageOrigin, location: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            origin,
            location: location.into(),
            format: None,
            bytes: bytes.into(),
        }
    }

    /// Attach the sniffed image format (e.g. "jpeg").
    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    pub fn origin(&self) -> ImageOrigin {
        self.origin
    }

    /// Source location (file path or content URI), kept for display.
    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn format(&self) -> Option<&str> {
        self.format.as_deref()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl fmt::Debug for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageRef")
            .field("origin", &self.origin)
            .field("location", &self.location)
            .field("format", &self.format)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Opaque face token issued by the face service for one detected face.
///
/// Only meaningful within the session that acquired it. Deliberately not
/// serializable so it can never end up in the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdentityToken(String);

impl IdentityToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdentityToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Same-identity likelihood returned by a face comparison.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfidenceScore(pub f64);

impl ConfidenceScore {
    pub fn value(self) -> f64 {
        self.0
    }
}

impl fmt::Display for ConfidenceScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}", self.0)
    }
}

/// Attendance status stored per calendar day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceStatus {
    Present,
    Absent,
    Late,
}

impl AttendanceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Present => "present",
            Self::Absent => "absent",
            Self::Late => "late",
        }
    }
}

impl fmt::Display for AttendanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
#[error("unknown attendance status: {0} (expected present, absent or late)")]
pub struct UnknownStatus(String);

impl FromStr for AttendanceStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "present" => Ok(Self::Present),
            "absent" => Ok(Self::Absent),
            "late" => Ok(Self::Late),
            _ => Err(UnknownStatus(s.to_string())),
        }
    }
}

/// Outcome of classifying a confidence score against the match threshold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Verdict {
    pub matched: bool,
    pub score: ConfidenceScore,
    pub threshold: f64,
}

/// Classify a score. A score exactly equal to the threshold is a match.
///
/// NaN never matches.
pub fn classify(score: ConfidenceScore, threshold: f64) -> Verdict {
    Verdict {
        matched: score.0 >= threshold,
        score,
        threshold,
    }
}
