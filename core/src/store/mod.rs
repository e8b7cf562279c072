//! SQLite persistence layer.
//!
//! RULE: Only the store talks to the database.
//! The engine works through `StoreTx` handles, so every multi-step
//! change it makes is one transaction.

mod dispatch;
mod ledger;
mod loan;
mod records;

use crate::{
    config::LoanConfig,
    error::{LoanError, LoanResult},
    event::{EventLogEntry, LoanEvent},
    types::LoanId,
};
use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::Mutex;
use rusqlite::{params, types::Type, Connection, Row, TransactionBehavior};
use rust_decimal::Decimal;
use std::str::FromStr;
use std::time::Duration;

pub struct LoanStore {
    conn:         Mutex<Connection>,
    lock_timeout: Duration,
}

/// A borrowed connection inside an open transaction.
pub struct StoreTx<'conn> {
    conn: &'conn Connection,
}

impl LoanStore {
    /// Open (or create) the loan database at `path`.
    pub fn open(path: &str, config: &LoanConfig) -> LoanResult<Self> {
        let conn = Connection::open(path)?;
        if path != ":memory:" {
            let mode: String =
                conn.query_row("PRAGMA journal_mode=WAL;", [], |row| row.get(0))?;
            if !mode.eq_ignore_ascii_case("wal") {
                log::warn!("store {path}: journal_mode is {mode}, WAL not available");
            }
        }
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        conn.busy_timeout(config.busy_timeout())?;
        Ok(Self {
            conn:         Mutex::new(conn),
            lock_timeout: config.lock_timeout(),
        })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> LoanResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self {
            conn:         Mutex::new(conn),
            lock_timeout: LoanConfig::default().lock_timeout(),
        })
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> LoanResult<()> {
        let conn = self.acquire()?;
        conn.execute_batch(include_str!("../../../migrations/001_loans.sql"))?;
        Ok(())
    }

    /// Run `f` inside a `BEGIN IMMEDIATE` transaction.
    ///
    /// The write lock is taken up front, so whatever `f` reads cannot
    /// change under it before commit, even from another process.
    /// Any error rolls the whole unit back.
    pub fn atomically<T>(&self, f: impl FnOnce(&StoreTx<'_>) -> LoanResult<T>) -> LoanResult<T> {
        self.run(TransactionBehavior::Immediate, f)
    }

    /// Run read-only work against a consistent snapshot.
    pub fn read<T>(&self, f: impl FnOnce(&StoreTx<'_>) -> LoanResult<T>) -> LoanResult<T> {
        self.run(TransactionBehavior::Deferred, f)
    }

    fn run<T>(
        &self,
        behavior: TransactionBehavior,
        f: impl FnOnce(&StoreTx<'_>) -> LoanResult<T>,
    ) -> LoanResult<T> {
        let mut conn = self.acquire()?;
        let tx = conn.transaction_with_behavior(behavior)?;
        let out = f(&StoreTx { conn: &tx })?;
        tx.commit()?;
        Ok(out)
    }

    fn acquire(&self) -> LoanResult<parking_lot::MutexGuard<'_, Connection>> {
        self.conn
            .try_lock_for(self.lock_timeout)
            .ok_or(LoanError::StoreBusy)
    }

    // ── Point reads ────────────────────────────────────────────

    pub fn loan(&self, loan_id: LoanId) -> LoanResult<crate::loan::Loan> {
        self.read(|tx| tx.require_loan(loan_id))
    }

    pub fn investments(&self, loan_id: LoanId) -> LoanResult<Vec<crate::ledger::Investment>> {
        self.read(|tx| tx.investments(loan_id))
    }

    pub fn funding_position(&self, loan_id: LoanId) -> LoanResult<crate::ledger::FundingPosition> {
        self.read(|tx| tx.funding_position(loan_id))
    }

    pub fn approval(&self, loan_id: LoanId) -> LoanResult<Option<crate::loan::Approval>> {
        self.read(|tx| tx.approval(loan_id))
    }

    pub fn disbursement(&self, loan_id: LoanId) -> LoanResult<Option<crate::loan::Disbursement>> {
        self.read(|tx| tx.disbursement(loan_id))
    }

    pub fn dispatch_record(
        &self,
        loan_id: LoanId,
    ) -> LoanResult<Option<crate::dispatch::DispatchRecord>> {
        self.read(|tx| tx.dispatch_record(loan_id))
    }

    pub fn artifacts(&self, loan_id: LoanId) -> LoanResult<Vec<crate::dispatch::ArtifactRecord>> {
        self.read(|tx| tx.artifacts(loan_id))
    }

    pub fn events_for_loan(&self, loan_id: LoanId) -> LoanResult<Vec<EventLogEntry>> {
        self.read(|tx| tx.events_for_loan(loan_id))
    }
}

impl StoreTx<'_> {
    // ── Event log ──────────────────────────────────────────────

    pub fn append_event(&self, event: &LoanEvent) -> LoanResult<()> {
        self.conn.execute(
            "INSERT INTO event_log (loan_id, event_type, payload, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                event.loan_id(),
                event.type_name(),
                serde_json::to_string(event)?,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn events_for_loan(&self, loan_id: LoanId) -> LoanResult<Vec<EventLogEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, loan_id, event_type, payload, created_at
             FROM event_log WHERE loan_id = ?1
             ORDER BY id ASC",
        )?;
        let entries = stmt
            .query_map(params![loan_id], |row| {
                Ok(EventLogEntry {
                    id:         Some(row.get(0)?),
                    loan_id:    row.get(1)?,
                    event_type: row.get(2)?,
                    payload:    row.get(3)?,
                    created_at: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }
}

// ── Column decoding ────────────────────────────────────────────
//
// Decimals, dates and statuses are stored as TEXT; these helpers turn a
// malformed column into a rusqlite conversion error instead of a panic.

fn conversion_error<E>(idx: usize, e: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
}

pub(crate) fn decimal_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Decimal> {
    let text: String = row.get(idx)?;
    Decimal::from_str(&text).map_err(|e| conversion_error(idx, e))
}

pub(crate) fn timestamp_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let text: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&text)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

pub(crate) fn date_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<NaiveDate> {
    let text: String = row.get(idx)?;
    NaiveDate::parse_from_str(&text, DATE_FORMAT).map_err(|e| conversion_error(idx, e))
}

pub(crate) const DATE_FORMAT: &str = "%Y-%m-%d";
