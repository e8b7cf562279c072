use crate::{
    status::LoanStatus,
    types::{LoanId, Money},
};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LoanError {
    #[error("Invalid {field}: {reason}")]
    Validation { field: &'static str, reason: String },

    #[error("Loan {loan_id} is {actual}, expected {expected}")]
    InvalidState {
        loan_id:  LoanId,
        expected: LoanStatus,
        actual:   LoanStatus,
    },

    #[error("Investment of {amount} is below the minimum of {minimum}")]
    BelowMinimum { amount: Money, minimum: Money },

    #[error("Investment of {requested} would exceed principal {principal} (already raised {already_invested})")]
    Overfunding {
        principal:        Money,
        already_invested: Money,
        requested:        Money,
    },

    #[error("Investment would leave {remaining} remaining, below the minimum of {minimum}; adjust the amount to fully fund the loan")]
    UnfundableRemainder { remaining: Money, minimum: Money },

    #[error("Loan {loan_id} not found")]
    NotFound { loan_id: LoanId },

    #[error("Forbidden: requires role '{required}', caller is '{actual}'")]
    Forbidden {
        required: crate::access::Role,
        actual:   crate::access::Role,
    },

    #[error("Database error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Timed out waiting for loan {loan_id}")]
    LockTimeout { loan_id: LoanId },

    #[error("Timed out waiting for the loan store")]
    StoreBusy,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl LoanError {
    /// Transient failures may be retried by the caller unchanged.
    /// Everything else is a definitive answer for the given input.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Storage(_) | Self::LockTimeout { .. } | Self::StoreBusy)
    }

    pub(crate) fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Validation { field, reason: reason.into() }
    }
}

pub type LoanResult<T> = Result<T, LoanError>;
