//! Loan aggregate and the records it owns.

use crate::{
    config::LoanConfig,
    error::{LoanError, LoanResult},
    status::LoanStatus,
    types::{LoanId, Money, Rate, UserId},
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Loan {
    pub loan_id:      LoanId,
    pub borrower_id:  String,
    pub principal:    Money,
    pub rate:         Rate,
    pub roi:          Rate,
    pub status:       LoanStatus,
    pub requester_id: UserId,
    pub created_at:   DateTime<Utc>,
}

/// A requester's loan proposal, before validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoanProposal {
    pub borrower_id: String,
    pub principal:   Money,
    pub rate:        Rate,
    pub roi:         Rate,
}

impl LoanProposal {
    /// Principal bounds are inclusive on both ends.
    pub fn validate(&self, config: &LoanConfig) -> LoanResult<()> {
        require_field("borrower_id", &self.borrower_id)?;
        if self.principal < config.min_principal {
            return Err(LoanError::validation(
                "principal",
                format!("minimum loan amount is {}", config.min_principal),
            ));
        }
        if self.principal > config.max_principal {
            return Err(LoanError::validation(
                "principal",
                format!("maximum loan amount is {}", config.max_principal),
            ));
        }
        if self.rate <= self.roi {
            return Err(LoanError::validation(
                "rate",
                format!("interest rate {} must be higher than roi {}", self.rate, self.roi),
            ));
        }
        Ok(())
    }
}

/// Admin submission that moves a loan from proposed to approved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalSubmission {
    pub validator_id: String,
    /// Reference to the stored proof-of-visit artifact.
    pub proof_ref:    String,
    pub approved_at:  NaiveDate,
}

impl ApprovalSubmission {
    pub fn validate(&self) -> LoanResult<()> {
        require_field("validator_id", &self.validator_id)?;
        require_field("proof_ref", &self.proof_ref)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Approval {
    pub loan_id:      LoanId,
    pub validator_id: String,
    pub proof_ref:    String,
    pub approved_at:  NaiveDate,
}

/// Admin submission that moves a loan from invested to disbursed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisbursementSubmission {
    pub officer_id:    String,
    /// Reference to the stored signed agreement.
    pub agreement_ref: String,
    pub disbursed_at:  NaiveDate,
}

impl DisbursementSubmission {
    pub fn validate(&self) -> LoanResult<()> {
        require_field("officer_id", &self.officer_id)?;
        require_field("agreement_ref", &self.agreement_ref)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Disbursement {
    pub loan_id:       LoanId,
    pub officer_id:    String,
    pub agreement_ref: String,
    pub admin_id:      UserId,
    pub disbursed_at:  NaiveDate,
}

fn require_field(field: &'static str, value: &str) -> LoanResult<()> {
    if value.trim().is_empty() {
        return Err(LoanError::validation(field, "is required"));
    }
    Ok(())
}
