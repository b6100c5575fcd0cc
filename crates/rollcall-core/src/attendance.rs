//! Attendance ledger writer.
//!
//! The ledger is one mapping of calendar date to status. Writes are a
//! read-modify-write of the whole mapping with no locking: two writers racing
//! on the same day both succeed and the later store wins.

use crate::ports::AttendanceLedger;
use crate::types::AttendanceStatus;
use chrono::NaiveDate;
use std::collections::BTreeMap;
use thiserror::Error;

/// Date-keyed attendance entries. Serializes as `{"YYYY-MM-DD": "present"}`.
pub type AttendanceMap = BTreeMap<NaiveDate, AttendanceStatus>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LedgerError {
    #[error("ledger storage error: {0}")]
    Storage(String),
    #[error("ledger contents are corrupt: {0}")]
    Corrupt(String),
}

/// Source of "today" for ledger writes.
pub trait Clock: Send + Sync {
    fn today(&self) -> NaiveDate;
}

/// Calendar date in the local time zone, read at call time.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalClock;

impl Clock for LocalClock {
    fn today(&self) -> NaiveDate {
        chrono::Local::now().date_naive()
    }
}

/// Set today's entry to `status`, overwriting any earlier entry for today.
///
/// "Today" is resolved when this is called, not when the session started.
/// Returns the date that was written.
pub async fn mark_attendance<L, C>(
    ledger: &L,
    clock: &C,
    status: AttendanceStatus,
) -> Result<NaiveDate, LedgerError>
where
    L: AttendanceLedger + ?Sized,
    C: Clock + ?Sized,
{
    let today = clock.today();
    let mut map = ledger.load().await?;
    let previous = map.insert(today, status);
    ledger.store(&map).await?;

    tracing::info!(
        date = %today,
        status = %status,
        previous = ?previous,
        "attendance marked"
    );
    Ok(today)
}

/// Status recorded for `date`, if any.
pub async fn attendance_on<L>(
    ledger: &L,
    date: NaiveDate,
) -> Result<Option<AttendanceStatus>, LedgerError>
where
    L: AttendanceLedger + ?Sized,
{
    Ok(ledger.load().await?.get(&date).copied())
}

/// Every recorded entry, oldest date first.
pub async fn history<L>(ledger: &L) -> Result<Vec<(NaiveDate, AttendanceStatus)>, LedgerError>
where
    L: AttendanceLedger + ?Sized,
{
    Ok(ledger.load().await?.into_iter().collect())
}
