//! Shared primitive types used across the loan engine.

use rust_decimal::Decimal;

/// Row id of a loan. The loan is the aggregate root.
pub type LoanId = i64;

/// Row id of an accepted investment (auto-increment).
pub type InvestmentId = i64;

/// Identity of an authenticated user, as resolved by the access gate.
pub type UserId = i64;

/// All monetary values. Never f64.
pub type Money = Decimal;

/// Interest and return rates, as supplied by the requester (12 = 12%).
pub type Rate = Decimal;
