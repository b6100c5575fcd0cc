//! rollcall-core — Face verification workflow and attendance ledger.
//!
//! Turns two photographs into face identity tokens through a remote face
//! service, classifies the confidence score, and records the day's
//! attendance. All I/O goes through the traits in [`ports`].

pub mod attendance;
pub mod ports;
pub mod types;
pub mod workflow;

#[cfg(test)]
mod test_support;

pub use attendance::{
    attendance_on, history, mark_attendance, AttendanceMap, Clock, LedgerError, LocalClock,
};
pub use ports::{AttendanceLedger, FaceIdentity, FaceServiceError, ImageOutcome, ImageSource};
pub use types::{
    classify, AttendanceStatus, ConfidenceScore, IdentityToken, ImageOrigin, ImageRef,
    UnknownStatus, Verdict, DEFAULT_MATCH_THRESHOLD,
};
pub use workflow::{
    RetryHint, Session, SessionState, VerifyError, Workflow, DEFAULT_CALL_TIMEOUT,
};
