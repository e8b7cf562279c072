use super::{decimal_at, timestamp_at, StoreTx};
use crate::{
    error::{LoanError, LoanResult},
    loan::{Loan, LoanProposal},
    status::{LoanStatus, LoanTransition},
    types::{LoanId, UserId},
};
use chrono::{DateTime, Utc};
use rusqlite::{params, types::Type, OptionalExtension, Row};

impl StoreTx<'_> {
    // ── Loan ───────────────────────────────────────────────────────

    pub fn insert_loan(
        &self,
        proposal: &LoanProposal,
        requester_id: UserId,
        created_at: DateTime<Utc>,
    ) -> LoanResult<LoanId> {
        self.conn.execute(
            "INSERT INTO loan (borrower_id, principal, rate, roi, status, requester_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                proposal.borrower_id.trim(),
                proposal.principal.to_string(),
                proposal.rate.to_string(),
                proposal.roi.to_string(),
                LoanStatus::Proposed.as_str(),
                requester_id,
                created_at.to_rfc3339(),
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn loan(&self, loan_id: LoanId) -> LoanResult<Option<Loan>> {
        let loan = self
            .conn
            .query_row(
                "SELECT loan_id, borrower_id, principal, rate, roi, status, requester_id, created_at
                 FROM loan WHERE loan_id = ?1",
                params![loan_id],
                loan_from_row,
            )
            .optional()?;
        Ok(loan)
    }

    pub fn require_loan(&self, loan_id: LoanId) -> LoanResult<Loan> {
        self.loan(loan_id)?.ok_or(LoanError::NotFound { loan_id })
    }

    /// Compare-and-set the loan status along `transition`.
    ///
    /// The UPDATE only matches when the row is still in the transition's
    /// source status, so a stale read can never push a loan backwards or
    /// apply the same edge twice.
    pub fn apply_transition(&self, loan_id: LoanId, transition: LoanTransition) -> LoanResult<()> {
        let changed = self.conn.execute(
            "UPDATE loan SET status = ?1 WHERE loan_id = ?2 AND status = ?3",
            params![transition.to().as_str(), loan_id, transition.from().as_str()],
        )?;
        if changed == 1 {
            return Ok(());
        }
        let current = self.require_loan(loan_id)?;
        Err(LoanError::InvalidState {
            loan_id,
            expected: transition.from(),
            actual:   current.status,
        })
    }
}

fn loan_from_row(row: &Row<'_>) -> rusqlite::Result<Loan> {
    let status_text: String = row.get(5)?;
    let status = status_text.parse::<LoanStatus>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(5, Type::Text, e.into())
    })?;
    Ok(Loan {
        loan_id:      row.get(0)?,
        borrower_id:  row.get(1)?,
        principal:    decimal_at(row, 2)?,
        rate:         decimal_at(row, 3)?,
        roi:          decimal_at(row, 4)?,
        status,
        requester_id: row.get(6)?,
        created_at:   timestamp_at(row, 7)?,
    })
}
