//! rollcall-io — Adapters for the collaborators the verification workflow
//! drives.
//!
//! Face++ style HTTP client, file-backed image source, and a SQLite
//! key-value store holding the attendance ledger.

pub mod face_api;
pub mod image_source;
pub mod ledger_store;

pub use face_api::{FaceApiCredentials, FacePlusPlusClient};
pub use image_source::FileImageSource;
pub use ledger_store::{KvStore, SqliteLedger, ATTENDANCE_KEY};
