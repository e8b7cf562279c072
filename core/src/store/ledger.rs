//! Store methods for the investment ledger. Insert and read only.

use super::{decimal_at, timestamp_at, StoreTx};
use crate::{
    error::LoanResult,
    ledger::{FundingPosition, Investment},
    types::{InvestmentId, LoanId, Money, UserId},
};
use chrono::{DateTime, Utc};
use rusqlite::params;

impl StoreTx<'_> {
    pub fn append_investment(
        &self,
        loan_id: LoanId,
        investor_id: UserId,
        amount: Money,
        invested_at: DateTime<Utc>,
    ) -> LoanResult<InvestmentId> {
        self.conn.execute(
            "INSERT INTO investment (loan_id, investor_id, amount, invested_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![loan_id, investor_id, amount.to_string(), invested_at.to_rfc3339()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// All investments for a loan, in acceptance order.
    pub fn investments(&self, loan_id: LoanId) -> LoanResult<Vec<Investment>> {
        let mut stmt = self.conn.prepare(
            "SELECT investment_id, loan_id, investor_id, amount, invested_at
             FROM investment WHERE loan_id = ?1
             ORDER BY investment_id ASC",
        )?;
        let rows = stmt.query_map(params![loan_id], |row| {
            Ok(Investment {
                investment_id: row.get(0)?,
                loan_id:       row.get(1)?,
                investor_id:   row.get(2)?,
                amount:        decimal_at(row, 3)?,
                invested_at:   timestamp_at(row, 4)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Exact running total. Summed in Rust, not SQL, to stay decimal.
    pub fn total_invested(&self, loan_id: LoanId) -> LoanResult<Money> {
        Ok(crate::ledger::total_of(&self.investments(loan_id)?))
    }

    pub fn funding_position(&self, loan_id: LoanId) -> LoanResult<FundingPosition> {
        let loan = self.require_loan(loan_id)?;
        let investments = self.investments(loan_id)?;
        Ok(FundingPosition::from_ledger(loan.principal, &investments))
    }
}
