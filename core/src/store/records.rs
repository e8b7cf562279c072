//! Store methods for approval and disbursement records.
//! One row of each per loan, keyed by loan_id.

use super::{date_at, StoreTx, DATE_FORMAT};
use crate::{
    error::LoanResult,
    loan::{Approval, Disbursement},
    types::LoanId,
};
use rusqlite::{params, OptionalExtension};

impl StoreTx<'_> {
    // ── Approval ──────────────────────────────────────────────────

    pub fn insert_approval(&self, approval: &Approval) -> LoanResult<()> {
        self.conn.execute(
            "INSERT INTO approval (loan_id, validator_id, proof_ref, approved_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                approval.loan_id,
                approval.validator_id,
                approval.proof_ref,
                approval.approved_at.format(DATE_FORMAT).to_string(),
            ],
        )?;
        Ok(())
    }

    pub fn approval(&self, loan_id: LoanId) -> LoanResult<Option<Approval>> {
        let approval = self
            .conn
            .query_row(
                "SELECT loan_id, validator_id, proof_ref, approved_at
                 FROM approval WHERE loan_id = ?1",
                params![loan_id],
                |row| {
                    Ok(Approval {
                        loan_id:      row.get(0)?,
                        validator_id: row.get(1)?,
                        proof_ref:    row.get(2)?,
                        approved_at:  date_at(row, 3)?,
                    })
                },
            )
            .optional()?;
        Ok(approval)
    }

    // ── Disbursement ──────────────────────────────────────────────

    pub fn insert_disbursement(&self, disbursement: &Disbursement) -> LoanResult<()> {
        self.conn.execute(
            "INSERT INTO disbursement (loan_id, officer_id, agreement_ref, admin_id, disbursed_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                disbursement.loan_id,
                disbursement.officer_id,
                disbursement.agreement_ref,
                disbursement.admin_id,
                disbursement.disbursed_at.format(DATE_FORMAT).to_string(),
            ],
        )?;
        Ok(())
    }

    pub fn disbursement(&self, loan_id: LoanId) -> LoanResult<Option<Disbursement>> {
        let disbursement = self
            .conn
            .query_row(
                "SELECT loan_id, officer_id, agreement_ref, admin_id, disbursed_at
                 FROM disbursement WHERE loan_id = ?1",
                params![loan_id],
                |row| {
                    Ok(Disbursement {
                        loan_id:       row.get(0)?,
                        officer_id:    row.get(1)?,
                        agreement_ref: row.get(2)?,
                        admin_id:      row.get(3)?,
                        disbursed_at:  date_at(row, 4)?,
                    })
                },
            )
            .optional()?;
        Ok(disbursement)
    }
}
