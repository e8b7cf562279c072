//! Store methods for the fully-funded dispatch guard and its outcomes.

use super::{timestamp_at, StoreTx};
use crate::{
    dispatch::{ArtifactRecord, DispatchRecord},
    error::LoanResult,
    types::LoanId,
};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

impl StoreTx<'_> {
    /// Take the loan's dispatch guard. True only for the first caller.
    pub fn claim_dispatch(
        &self,
        loan_id: LoanId,
        dispatch_id: &str,
        claimed_at: DateTime<Utc>,
    ) -> LoanResult<bool> {
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO funding_dispatch (loan_id, dispatch_id, claimed_at)
             VALUES (?1, ?2, ?3)",
            params![loan_id, dispatch_id, claimed_at.to_rfc3339()],
        )?;
        Ok(inserted == 1)
    }

    pub fn complete_dispatch(
        &self,
        loan_id: LoanId,
        delivered: i64,
        failed: i64,
        completed_at: DateTime<Utc>,
    ) -> LoanResult<()> {
        self.conn.execute(
            "UPDATE funding_dispatch
             SET completed_at = ?1, delivered = ?2, failed = ?3
             WHERE loan_id = ?4",
            params![completed_at.to_rfc3339(), delivered, failed, loan_id],
        )?;
        Ok(())
    }

    pub fn dispatch_record(&self, loan_id: LoanId) -> LoanResult<Option<DispatchRecord>> {
        let record = self
            .conn
            .query_row(
                "SELECT loan_id, dispatch_id, claimed_at, completed_at, delivered, failed
                 FROM funding_dispatch WHERE loan_id = ?1",
                params![loan_id],
                |row| {
                    let completed_at = match row.get::<_, Option<String>>(3)? {
                        Some(_) => Some(timestamp_at(row, 3)?),
                        None => None,
                    };
                    Ok(DispatchRecord {
                        loan_id:     row.get(0)?,
                        dispatch_id: row.get(1)?,
                        claimed_at:  timestamp_at(row, 2)?,
                        completed_at,
                        delivered:   row.get(4)?,
                        failed:      row.get(5)?,
                    })
                },
            )
            .optional()?;
        Ok(record)
    }

    pub fn record_artifact(&self, record: &ArtifactRecord, created_at: DateTime<Utc>) -> LoanResult<()> {
        self.conn.execute(
            "INSERT INTO agreement_artifact
                 (loan_id, investment_id, investor_id, artifact_ref, error, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                record.loan_id,
                record.investment_id,
                record.investor_id,
                record.artifact_ref,
                record.error,
                created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn artifacts(&self, loan_id: LoanId) -> LoanResult<Vec<ArtifactRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT loan_id, investment_id, investor_id, artifact_ref, error
             FROM agreement_artifact WHERE loan_id = ?1
             ORDER BY id ASC",
        )?;
        let rows = stmt.query_map(params![loan_id], |row| {
            Ok(ArtifactRecord {
                loan_id:       row.get(0)?,
                investment_id: row.get(1)?,
                investor_id:   row.get(2)?,
                artifact_ref:  row.get(3)?,
                error:         row.get(4)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }
}
