//! Loan status machine.
//!
//! proposed → approved → invested → disbursed
//!
//! Every edge is a `LoanTransition` with exactly one source and one
//! target. There is no way to name a backwards or skipping edge.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoanStatus {
    Proposed,
    Approved,
    Invested,
    Disbursed,
}

impl LoanStatus {
    /// Stable name stored in the `loan.status` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Proposed  => "proposed",
            Self::Approved  => "approved",
            Self::Invested  => "invested",
            Self::Disbursed => "disbursed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Disbursed)
    }
}

impl fmt::Display for LoanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LoanStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "proposed"  => Ok(Self::Proposed),
            "approved"  => Ok(Self::Approved),
            "invested"  => Ok(Self::Invested),
            "disbursed" => Ok(Self::Disbursed),
            other       => Err(format!("unknown loan status '{other}'")),
        }
    }
}

/// The only status changes the engine can perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoanTransition {
    Approve,
    Fund,
    Disburse,
}

impl LoanTransition {
    pub fn from(&self) -> LoanStatus {
        match self {
            Self::Approve  => LoanStatus::Proposed,
            Self::Fund     => LoanStatus::Approved,
            Self::Disburse => LoanStatus::Invested,
        }
    }

    pub fn to(&self) -> LoanStatus {
        match self {
            Self::Approve  => LoanStatus::Approved,
            Self::Fund     => LoanStatus::Invested,
            Self::Disburse => LoanStatus::Disbursed,
        }
    }

    /// Apply this transition to `current`.
    /// Returns the new status, or the status that was required.
    pub fn apply(&self, current: LoanStatus) -> Result<LoanStatus, LoanStatus> {
        if current == self.from() {
            Ok(self.to())
        } else {
            Err(self.from())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [LoanStatus; 4] = [
        LoanStatus::Proposed,
        LoanStatus::Approved,
        LoanStatus::Invested,
        LoanStatus::Disbursed,
    ];

    #[test]
    fn each_transition_has_exactly_one_source() {
        for t in [LoanTransition::Approve, LoanTransition::Fund, LoanTransition::Disburse] {
            let accepted: Vec<_> = ALL.iter().filter(|s| t.apply(**s).is_ok()).collect();
            assert_eq!(accepted, vec![&t.from()], "{t:?} accepted {accepted:?}");
        }
    }

    #[test]
    fn transitions_chain_in_order() {
        let mut status = LoanStatus::Proposed;
        for t in [LoanTransition::Approve, LoanTransition::Fund, LoanTransition::Disburse] {
            status = t.apply(status).expect("in-order transition");
        }
        assert_eq!(status, LoanStatus::Disbursed);
        assert!(status.is_terminal());
    }

    #[test]
    fn skipping_is_rejected_with_required_status() {
        assert_eq!(
            LoanTransition::Fund.apply(LoanStatus::Proposed),
            Err(LoanStatus::Approved)
        );
        assert_eq!(
            LoanTransition::Approve.apply(LoanStatus::Invested),
            Err(LoanStatus::Proposed)
        );
    }

    #[test]
    fn column_names_round_trip() {
        for s in ALL {
            assert_eq!(s.as_str().parse::<LoanStatus>(), Ok(s));
        }
        assert!("cancelled".parse::<LoanStatus>().is_err());
    }
}
