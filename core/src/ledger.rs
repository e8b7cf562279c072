//! Investment ledger types.
//!
//! RULE: Investments are append-only. Nothing updates or deletes a row
//! once it is written; corrections would be new investments.

use crate::types::{InvestmentId, LoanId, Money, UserId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Investment {
    pub investment_id: InvestmentId,
    pub loan_id:       LoanId,
    pub investor_id:   UserId,
    pub amount:        Money,
    pub invested_at:   DateTime<Utc>,
}

/// Where a loan stands against its principal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundingPosition {
    pub principal:      Money,
    pub total_invested: Money,
}

impl FundingPosition {
    pub fn from_ledger(principal: Money, investments: &[Investment]) -> Self {
        Self {
            principal,
            total_invested: total_of(investments),
        }
    }

    pub fn remaining(&self) -> Money {
        self.principal - self.total_invested
    }

    pub fn is_fully_funded(&self) -> bool {
        self.total_invested == self.principal
    }
}

/// Exact decimal sum of investment amounts.
pub fn total_of(investments: &[Investment]) -> Money {
    investments.iter().map(|i| i.amount).fold(Decimal::ZERO, |acc, a| acc + a)
}

/// Receipt returned to an investor whose investment was accepted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvestmentReceipt {
    pub investment_id:  InvestmentId,
    pub loan_id:        LoanId,
    pub total_invested: Money,
    pub remaining:      Money,
    pub fully_funded:   bool,
    /// Present only on the investment that closed the loan and won the
    /// dispatch guard.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dispatch:       Option<crate::dispatch::DispatchReport>,
}
