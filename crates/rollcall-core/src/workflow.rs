//! Verification workflow: two images in, one attendance entry out.
//!
//! A [`Session`] is owned by the caller and passed into each step. Steps
//! advance it through
//! `Idle → ReferenceCaptured → ReferenceTokenReady → CandidateSelected →
//! Comparing → {Verified | Mismatch | Failed}`. Terminal sessions are never
//! reused; start a new one for another attempt. Nothing is retried here.

use crate::attendance::{mark_attendance, Clock, LedgerError, LocalClock};
use crate::ports::{AttendanceLedger, FaceIdentity, FaceServiceError, ImageOutcome, ImageSource};
use crate::types::{
    classify, AttendanceStatus, ConfidenceScore, IdentityToken, ImageOrigin, ImageRef, Verdict,
    DEFAULT_MATCH_THRESHOLD,
};
use chrono::NaiveDate;
use std::fmt;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Upper bound on a single face service call.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Error, Debug, Clone, PartialEq)]
pub enum VerifyError {
    #[error("{origin} image was cancelled")]
    UserCancelled { origin: ImageOrigin },
    #[error("{origin} image unavailable: {reason}")]
    ImageUnavailable { origin: ImageOrigin, reason: String },
    #[error("no face detected in the {origin} image")]
    NoFaceDetected { origin: ImageOrigin },
    #[error(transparent)]
    Service(#[from] FaceServiceError),
    #[error("step out of order: {0}")]
    OrderingViolation(&'static str),
    #[error("could not record attendance: {0}")]
    Persistence(#[from] LedgerError),
}

/// What the user should do next after an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryHint {
    /// Nothing went wrong; the user backed out.
    None,
    /// Transient failure, the same photos may work on another attempt.
    TryAgain,
    /// The photo itself is unusable.
    RetakePhoto,
    /// An earlier step has to finish first.
    NotReady,
}

impl fmt::Display for RetryHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::None => "no action needed",
            Self::TryAgain => "try again",
            Self::RetakePhoto => "retake the photo",
            Self::NotReady => "capture a reference face first",
        })
    }
}

impl VerifyError {
    pub fn retry_hint(&self) -> RetryHint {
        match self {
            Self::UserCancelled { .. } => RetryHint::None,
            Self::ImageUnavailable { .. }
            | Self::NoFaceDetected { .. }
            | Self::Service(FaceServiceError::InvalidImage(_)) => RetryHint::RetakePhoto,
            Self::Service(_) | Self::Persistence(_) => RetryHint::TryAgain,
            Self::OrderingViolation(_) => RetryHint::NotReady,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    Idle,
    ReferenceCaptured,
    ReferenceTokenReady,
    CandidateSelected,
    Comparing,
    /// Same person; attendance was recorded for `date`.
    Verified { score: ConfidenceScore, date: NaiveDate },
    Mismatch { score: ConfidenceScore },
    Failed { cause: VerifyError },
}

impl SessionState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::ReferenceCaptured => "reference_captured",
            Self::ReferenceTokenReady => "reference_token_ready",
            Self::CandidateSelected => "candidate_selected",
            Self::Comparing => "comparing",
            Self::Verified { .. } => "verified",
            Self::Mismatch { .. } => "mismatch",
            Self::Failed { .. } => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Verified { .. } | Self::Mismatch { .. } | Self::Failed { .. }
        )
    }
}

/// One verification attempt.
#[derive(Debug, Clone)]
pub struct Session {
    id: Uuid,
    state: SessionState,
    reference_image: Option<ImageRef>,
    candidate_image: Option<ImageRef>,
    reference_token: Option<IdentityToken>,
    candidate_token: Option<IdentityToken>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            state: SessionState::Idle,
            reference_image: None,
            candidate_image: None,
            reference_token: None,
            candidate_token: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Captured image, kept for display even if registration failed.
    pub fn reference_image(&self) -> Option<&ImageRef> {
        self.reference_image.as_ref()
    }

    pub fn candidate_image(&self) -> Option<&ImageRef> {
        self.candidate_image.as_ref()
    }

    pub fn reference_token(&self) -> Option<&IdentityToken> {
        self.reference_token.as_ref()
    }

    pub fn candidate_token(&self) -> Option<&IdentityToken> {
        self.candidate_token.as_ref()
    }

    fn advance(&mut self, next: SessionState) {
        tracing::debug!(
            session = %self.id,
            from = self.state.name(),
            to = next.name(),
            "session transition"
        );
        self.state = next;
    }

    /// Move to `Failed` and hand the cause back for the caller's `Err`.
    fn fail(&mut self, cause: VerifyError) -> VerifyError {
        tracing::warn!(
            session = %self.id,
            from = self.state.name(),
            error = %cause,
            "session failed"
        );
        self.state = SessionState::Failed {
            cause: cause.clone(),
        };
        cause
    }
}

/// Drives sessions against the image source, face service and ledger.
pub struct Workflow<S, F, L, C = LocalClock> {
    images: S,
    faces: F,
    ledger: L,
    clock: C,
    threshold: f64,
    call_timeout: Duration,
}

impl<S, F, L> Workflow<S, F, L, LocalClock>
where
    S: ImageSource,
    F: FaceIdentity,
    L: AttendanceLedger,
{
    pub fn new(images: S, faces: F, ledger: L) -> Self {
        Self {
            images,
            faces,
            ledger,
            clock: LocalClock,
            threshold: DEFAULT_MATCH_THRESHOLD,
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }
}

impl<S, F, L, C> Workflow<S, F, L, C>
where
    S: ImageSource,
    F: FaceIdentity,
    L: AttendanceLedger,
    C: Clock,
{
    pub fn with_clock<C2: Clock>(self, clock: C2) -> Workflow<S, F, L, C2> {
        Workflow {
            images: self.images,
            faces: self.faces,
            ledger: self.ledger,
            clock,
            threshold: self.threshold,
            call_timeout: self.call_timeout,
        }
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn images(&self) -> &S {
        &self.images
    }

    pub fn faces(&self) -> &F {
        &self.faces
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    /// Capture the reference image and register its face.
    ///
    /// A cancelled or failed capture leaves the session `Idle`. Registration
    /// failures are terminal.
    pub async fn capture_reference(&self, session: &mut Session) -> Result<(), VerifyError> {
        match session.state {
            SessionState::Idle => {}
            ref s if s.is_terminal() => {
                return Err(VerifyError::OrderingViolation("session has already finished"))
            }
            _ => return Err(VerifyError::OrderingViolation("reference already captured")),
        }

        let image = self.acquire(session, ImageOrigin::Camera).await?;
        session.reference_image = Some(image.clone());
        session.advance(SessionState::ReferenceCaptured);

        let token = match self.register(&image, ImageOrigin::Camera).await {
            Ok(token) => token,
            Err(e) => return Err(session.fail(e)),
        };
        tracing::info!(session = %session.id, "reference face registered");
        session.reference_token = Some(token);
        session.advance(SessionState::ReferenceTokenReady);
        Ok(())
    }

    /// Pick the candidate image, register it, compare against the reference
    /// and, on a match, mark today present.
    ///
    /// Without a ready reference token the session fails with an ordering
    /// violation and no remote call is made. A cancelled or failed pick leaves
    /// the session in `ReferenceTokenReady`.
    pub async fn select_candidate(&self, session: &mut Session) -> Result<Verdict, VerifyError> {
        match session.state {
            SessionState::ReferenceTokenReady => {}
            SessionState::Idle | SessionState::ReferenceCaptured => {
                return Err(session.fail(VerifyError::OrderingViolation("no reference captured")))
            }
            ref s if s.is_terminal() => {
                return Err(VerifyError::OrderingViolation("session has already finished"))
            }
            _ => return Err(VerifyError::OrderingViolation("candidate already selected")),
        }
        let Some(reference) = session.reference_token.clone() else {
            return Err(session.fail(VerifyError::OrderingViolation("no reference captured")));
        };

        let image = self.acquire(session, ImageOrigin::Library).await?;
        session.candidate_image = Some(image.clone());
        session.advance(SessionState::CandidateSelected);

        let candidate = match self.register(&image, ImageOrigin::Library).await {
            Ok(token) => token,
            Err(e) => return Err(session.fail(e)),
        };
        session.candidate_token = Some(candidate.clone());
        session.advance(SessionState::Comparing);

        let score = match self.bounded(self.faces.compare(&reference, &candidate)).await {
            Ok(score) => score,
            Err(e) => return Err(session.fail(e.into())),
        };
        let verdict = classify(score, self.threshold);
        tracing::info!(
            session = %session.id,
            score = score.value(),
            threshold = self.threshold,
            matched = verdict.matched,
            "faces compared"
        );

        if !verdict.matched {
            session.advance(SessionState::Mismatch { score });
            return Ok(verdict);
        }

        match mark_attendance(&self.ledger, &self.clock, AttendanceStatus::Present).await {
            Ok(date) => {
                session.advance(SessionState::Verified { score, date });
                Ok(verdict)
            }
            Err(e) => Err(session.fail(e.into())),
        }
    }

    /// Ask the image source for one image. Only a delivered image changes
    /// the session.
    async fn acquire(
        &self,
        session: &Session,
        origin: ImageOrigin,
    ) -> Result<ImageRef, VerifyError> {
        let outcome = match origin {
            ImageOrigin::Camera => self.images.capture().await,
            ImageOrigin::Library => self.images.pick_from_library().await,
        };
        match outcome {
            ImageOutcome::Image(image) => {
                tracing::debug!(
                    session = %session.id,
                    %origin,
                    location = image.location(),
                    bytes = image.len(),
                    "image acquired"
                );
                Ok(image)
            }
            ImageOutcome::Cancelled => {
                tracing::info!(session = %session.id, %origin, "image acquisition cancelled");
                Err(VerifyError::UserCancelled { origin })
            }
            ImageOutcome::Failed(reason) => {
                tracing::warn!(session = %session.id, %origin, %reason, "image acquisition failed");
                Err(VerifyError::ImageUnavailable { origin, reason })
            }
        }
    }

    async fn register(
        &self,
        image: &ImageRef,
        origin: ImageOrigin,
    ) -> Result<IdentityToken, VerifyError> {
        self.bounded(self.faces.register_face(image))
            .await?
            .ok_or(VerifyError::NoFaceDetected { origin })
    }

    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, FaceServiceError>>,
    ) -> Result<T, FaceServiceError> {
        match tokio::time::timeout(self.call_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(FaceServiceError::Timeout(self.call_timeout)),
        }
    }
}
