//! Per-loan mutual exclusion.
//!
//! Each loan id maps to its own mutex. Work on one loan never waits on
//! another loan's lock; only the short-lived table lookup is shared.

use crate::{
    error::{LoanError, LoanResult},
    types::LoanId,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

#[derive(Default)]
pub struct LoanLocks {
    slots: Mutex<HashMap<LoanId, Arc<Mutex<()>>>>,
}

impl LoanLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` while holding `loan_id`'s lock, waiting at most `timeout`.
    pub fn with_loan<T>(
        &self,
        loan_id: LoanId,
        timeout: Duration,
        f: impl FnOnce() -> LoanResult<T>,
    ) -> LoanResult<T> {
        let slot = self.slot(loan_id);
        let out = match slot.try_lock_for(timeout) {
            Some(_guard) => f(),
            None => Err(LoanError::LockTimeout { loan_id }),
        };
        self.release(loan_id, slot);
        out
    }

    fn slot(&self, loan_id: LoanId) -> Arc<Mutex<()>> {
        self.slots.lock().entry(loan_id).or_default().clone()
    }

    /// Drop the table entry once no other caller holds or waits on it.
    /// Clones only happen under the table lock, so the count is stable here.
    fn release(&self, loan_id: LoanId, slot: Arc<Mutex<()>>) {
        let mut slots = self.slots.lock();
        if Arc::strong_count(&slot) == 2 {
            slots.remove(&loan_id);
        }
    }

    /// Number of loans with a lock currently held or awaited.
    pub fn tracked(&self) -> usize {
        self.slots.lock().len()
    }
}
