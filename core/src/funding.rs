//! Funding rule engine.
//!
//! Pure admissibility check for a single proposed investment. No I/O;
//! the caller supplies the loan's principal, status and the ledger total
//! read inside its own transaction.
//!
//! Rules, evaluated in order:
//!   1. status must be `approved`              → InvalidState
//!   2. amount >= principal * ratio            → BelowMinimum
//!   3. total + amount <= principal            → Overfunding
//!   4. remaining == 0 or remaining >= minimum → UnfundableRemainder
//!
//! Rule 4 is rule 2 applied to the next investor: a gap smaller than the
//! minimum could never be closed by a legal investment.

use crate::{
    error::LoanError,
    status::LoanStatus,
    types::{LoanId, Money},
};
use rust_decimal::Decimal;

/// Everything the rules look at.
#[derive(Debug, Clone, Copy)]
pub struct FundingRequest {
    pub loan_id:       LoanId,
    pub principal:     Money,
    pub status:        LoanStatus,
    pub current_total: Money,
    pub amount:        Money,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FundingDecision {
    Accept {
        new_total:    Money,
        remaining:    Money,
        fully_funded: bool,
    },
    Reject(FundingRejection),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FundingRejection {
    InvalidState {
        actual: LoanStatus,
    },
    BelowMinimum {
        amount:  Money,
        minimum: Money,
    },
    Overfunding {
        principal:        Money,
        already_invested: Money,
        requested:        Money,
    },
    UnfundableRemainder {
        remaining: Money,
        minimum:   Money,
    },
}

impl FundingRejection {
    pub fn into_error(self, loan_id: LoanId) -> LoanError {
        match self {
            Self::InvalidState { actual } => LoanError::InvalidState {
                loan_id,
                expected: LoanStatus::Approved,
                actual,
            },
            Self::BelowMinimum { amount, minimum } => LoanError::BelowMinimum { amount, minimum },
            Self::Overfunding { principal, already_invested, requested } => {
                LoanError::Overfunding { principal, already_invested, requested }
            }
            Self::UnfundableRemainder { remaining, minimum } => {
                LoanError::UnfundableRemainder { remaining, minimum }
            }
        }
    }
}

/// Smallest amount any single investment into `principal` may carry.
pub fn min_investment(principal: Money, ratio: Decimal) -> Money {
    principal * ratio
}

pub fn evaluate(req: &FundingRequest, ratio: Decimal) -> FundingDecision {
    use FundingRejection::*;

    if req.status != LoanStatus::Approved {
        return FundingDecision::Reject(InvalidState { actual: req.status });
    }

    let minimum = min_investment(req.principal, ratio);
    if req.amount < minimum {
        return FundingDecision::Reject(BelowMinimum { amount: req.amount, minimum });
    }

    // An amount too large to even add to the total is overfunding too.
    let new_total = match req.current_total.checked_add(req.amount) {
        Some(total) if total <= req.principal => total,
        _ => {
            return FundingDecision::Reject(Overfunding {
                principal:        req.principal,
                already_invested: req.current_total,
                requested:        req.amount,
            })
        }
    };

    let remaining = req.principal - new_total;
    if remaining > Decimal::ZERO && remaining < minimum {
        return FundingDecision::Reject(UnfundableRemainder { remaining, minimum });
    }

    FundingDecision::Accept {
        new_total,
        remaining,
        fully_funded: remaining.is_zero(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const RATIO: Decimal = dec!(0.10);

    fn request(status: LoanStatus, current_total: Money, amount: Money) -> FundingRequest {
        FundingRequest {
            loan_id: 1,
            principal: dec!(1_000_000),
            status,
            current_total,
            amount,
        }
    }

    #[test]
    fn half_then_half_closes_the_loan() {
        let first = evaluate(&request(LoanStatus::Approved, dec!(0), dec!(500_000)), RATIO);
        assert_eq!(
            first,
            FundingDecision::Accept {
                new_total: dec!(500_000),
                remaining: dec!(500_000),
                fully_funded: false,
            }
        );
        let second = evaluate(&request(LoanStatus::Approved, dec!(500_000), dec!(500_000)), RATIO);
        assert_eq!(
            second,
            FundingDecision::Accept {
                new_total: dec!(1_000_000),
                remaining: dec!(0),
                fully_funded: true,
            }
        );
    }

    #[test]
    fn only_approved_loans_accept_investment() {
        for status in [LoanStatus::Proposed, LoanStatus::Invested, LoanStatus::Disbursed] {
            assert_eq!(
                evaluate(&request(status, dec!(0), dec!(500_000)), RATIO),
                FundingDecision::Reject(FundingRejection::InvalidState { actual: status })
            );
        }
    }

    #[test]
    fn status_is_checked_before_amount() {
        let decision = evaluate(&request(LoanStatus::Proposed, dec!(0), dec!(1)), RATIO);
        assert!(matches!(
            decision,
            FundingDecision::Reject(FundingRejection::InvalidState { .. })
        ));
    }

    #[test]
    fn minimum_is_inclusive() {
        assert!(matches!(
            evaluate(&request(LoanStatus::Approved, dec!(0), dec!(100_000)), RATIO),
            FundingDecision::Accept { .. }
        ));
        assert_eq!(
            evaluate(&request(LoanStatus::Approved, dec!(0), dec!(99_999.99)), RATIO),
            FundingDecision::Reject(FundingRejection::BelowMinimum {
                amount: dec!(99_999.99),
                minimum: dec!(100_000),
            })
        );
    }

    #[test]
    fn overfunding_reports_boundaries() {
        assert_eq!(
            evaluate(&request(LoanStatus::Approved, dec!(800_000), dec!(300_000)), RATIO),
            FundingDecision::Reject(FundingRejection::Overfunding {
                principal: dec!(1_000_000),
                already_invested: dec!(800_000),
                requested: dec!(300_000),
            })
        );
    }

    #[test]
    fn huge_amount_is_overfunding_not_overflow() {
        assert_eq!(
            evaluate(&request(LoanStatus::Approved, dec!(500_000), Decimal::MAX), RATIO),
            FundingDecision::Reject(FundingRejection::Overfunding {
                principal: dec!(1_000_000),
                already_invested: dec!(500_000),
                requested: Decimal::MAX,
            })
        );
    }

    #[test]
    fn stranding_remainder_is_rejected() {
        assert_eq!(
            evaluate(&request(LoanStatus::Approved, dec!(0), dec!(999_900)), RATIO),
            FundingDecision::Reject(FundingRejection::UnfundableRemainder {
                remaining: dec!(100),
                minimum: dec!(100_000),
            })
        );
    }

    #[test]
    fn remainder_equal_to_minimum_stays_fundable() {
        let decision = evaluate(&request(LoanStatus::Approved, dec!(0), dec!(900_000)), RATIO);
        assert_eq!(
            decision,
            FundingDecision::Accept {
                new_total: dec!(900_000),
                remaining: dec!(100_000),
                fully_funded: false,
            }
        );
    }

    #[test]
    fn below_minimum_wins_over_overfunding() {
        // Tiny top-up on a nearly full loan: rule 2 fires first.
        let decision = evaluate(&request(LoanStatus::Approved, dec!(950_000), dec!(60_000)), RATIO);
        assert!(matches!(
            decision,
            FundingDecision::Reject(FundingRejection::BelowMinimum { .. })
        ));
    }

    #[test]
    fn rejection_maps_to_error_with_loan_context() {
        let err = FundingRejection::InvalidState { actual: LoanStatus::Proposed }.into_error(7);
        match err {
            LoanError::InvalidState { loan_id, expected, actual } => {
                assert_eq!(loan_id, 7);
                assert_eq!(expected, LoanStatus::Approved);
                assert_eq!(actual, LoanStatus::Proposed);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }
}
