//! In-process fakes for the collaborator traits.

use crate::attendance::{AttendanceMap, Clock, LedgerError};
use crate::ports::{AttendanceLedger, FaceIdentity, FaceServiceError, ImageOutcome, ImageSource};
use crate::types::{ConfidenceScore, IdentityToken, ImageOrigin, ImageRef};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Barrier;

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn image(origin: ImageOrigin) -> ImageRef {
    ImageRef::new(origin, format!("/photos/{origin}.jpg"), vec![0xFF, 0xD8, 0xFF, 0xE0])
        .with_format("jpeg")
}

pub struct FixedClock(pub NaiveDate);

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        self.0
    }
}

/// Image source that returns the same outcome on every call.
pub struct ScriptedImages {
    capture: ImageOutcome,
    pick: ImageOutcome,
    capture_calls: AtomicUsize,
    pick_calls: AtomicUsize,
}

impl ScriptedImages {
    pub fn new(capture: ImageOutcome, pick: ImageOutcome) -> Self {
        Self {
            capture,
            pick,
            capture_calls: AtomicUsize::new(0),
            pick_calls: AtomicUsize::new(0),
        }
    }

    /// Both capture and pick succeed.
    pub fn ok() -> Self {
        Self::new(
            ImageOutcome::Image(image(ImageOrigin::Camera)),
            ImageOutcome::Image(image(ImageOrigin::Library)),
        )
    }

    pub fn capture_calls(&self) -> usize {
        self.capture_calls.load(Ordering::SeqCst)
    }

    pub fn pick_calls(&self) -> usize {
        self.pick_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ImageSource for ScriptedImages {
    async fn capture(&self) -> ImageOutcome {
        self.capture_calls.fetch_add(1, Ordering::SeqCst);
        self.capture.clone()
    }

    async fn pick_from_library(&self) -> ImageOutcome {
        self.pick_calls.fetch_add(1, Ordering::SeqCst);
        self.pick.clone()
    }
}

type RegisterReply = Result<Option<IdentityToken>, FaceServiceError>;

/// Face service answering register calls in order and compare with a fixed reply.
pub struct ScriptedFaces {
    register: Mutex<VecDeque<RegisterReply>>,
    compare: Option<Result<ConfidenceScore, FaceServiceError>>,
    register_calls: AtomicUsize,
    compared: Mutex<Vec<(String, String)>>,
}

impl ScriptedFaces {
    /// `compare: None` makes every compare call hang forever.
    pub fn new(
        register: Vec<RegisterReply>,
        compare: Option<Result<ConfidenceScore, FaceServiceError>>,
    ) -> Self {
        Self {
            register: Mutex::new(register.into()),
            compare,
            register_calls: AtomicUsize::new(0),
            compared: Mutex::new(Vec::new()),
        }
    }

    /// Tokens "T1" then "T2", compare returns `score`.
    pub fn scoring(score: f64) -> Self {
        Self::new(
            vec![
                Ok(Some(IdentityToken::new("T1"))),
                Ok(Some(IdentityToken::new("T2"))),
            ],
            Some(Ok(ConfidenceScore(score))),
        )
    }

    pub fn register_calls(&self) -> usize {
        self.register_calls.load(Ordering::SeqCst)
    }

    pub fn compare_calls(&self) -> usize {
        self.compared.lock().unwrap().len()
    }

    pub fn compared(&self) -> Vec<(String, String)> {
        self.compared.lock().unwrap().clone()
    }
}

#[async_trait]
impl FaceIdentity for ScriptedFaces {
    async fn register_face(&self, _image: &ImageRef) -> RegisterReply {
        self.register_calls.fetch_add(1, Ordering::SeqCst);
        let next = self.register.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Err(FaceServiceError::Api("unscripted register call".into())))
    }

    async fn compare(
        &self,
        reference: &IdentityToken,
        candidate: &IdentityToken,
    ) -> Result<ConfidenceScore, FaceServiceError> {
        self.compared
            .lock()
            .unwrap()
            .push((reference.to_string(), candidate.to_string()));
        match &self.compare {
            Some(reply) => reply.clone(),
            None => std::future::pending().await,
        }
    }
}

/// Ledger held in memory, recording every store.
#[derive(Default)]
pub struct MemoryLedger {
    map: Mutex<AttendanceMap>,
    log: Mutex<Vec<AttendanceMap>>,
    load_error: Mutex<Option<String>>,
    store_error: Mutex<Option<String>>,
    gate: Mutex<Option<(Arc<Barrier>, usize)>>,
}

impl MemoryLedger {
    pub fn with_entries(entries: AttendanceMap) -> Self {
        let ledger = Self::default();
        *ledger.map.lock().unwrap() = entries;
        ledger
    }

    pub fn fail_loads(&self, reason: &str) {
        *self.load_error.lock().unwrap() = Some(reason.to_string());
    }

    pub fn fail_stores(&self, reason: &str) {
        *self.store_error.lock().unwrap() = Some(reason.to_string());
    }

    /// Make the next `n` loads read the mapping and then wait for each other
    /// before returning, so all of them see the same snapshot.
    pub fn hold_loads(&self, n: usize) {
        *self.gate.lock().unwrap() = Some((Arc::new(Barrier::new(n)), n));
    }

    pub fn snapshot(&self) -> AttendanceMap {
        self.map.lock().unwrap().clone()
    }

    pub fn stores(&self) -> usize {
        self.log.lock().unwrap().len()
    }

    pub fn store_log(&self) -> Vec<AttendanceMap> {
        self.log.lock().unwrap().clone()
    }

    fn take_gate(&self) -> Option<Arc<Barrier>> {
        let mut gate = self.gate.lock().unwrap();
        let (barrier, remaining) = gate.as_mut()?;
        let barrier = Arc::clone(barrier);
        *remaining -= 1;
        if *remaining == 0 {
            *gate = None;
        }
        Some(barrier)
    }
}

#[async_trait]
impl AttendanceLedger for MemoryLedger {
    async fn load(&self) -> Result<AttendanceMap, LedgerError> {
        if let Some(reason) = self.load_error.lock().unwrap().clone() {
            return Err(LedgerError::Storage(reason));
        }
        let map = self.snapshot();
        if let Some(barrier) = self.take_gate() {
            barrier.wait().await;
        }
        Ok(map)
    }

    async fn store(&self, map: &AttendanceMap) -> Result<(), LedgerError> {
        if let Some(reason) = self.store_error.lock().unwrap().clone() {
            return Err(LedgerError::Storage(reason));
        }
        *self.map.lock().unwrap() = map.clone();
        self.log.lock().unwrap().push(map.clone());
        Ok(())
    }
}
