//! Loan audit events.
//!
//! RULE: every state change the engine commits is recorded as a
//! LoanEvent in the same transaction as the change itself.

use crate::{
    status::LoanStatus,
    types::{InvestmentId, LoanId, Money, UserId},
};
use serde::{Deserialize, Serialize};

/// Variants are only ever appended; the `type` tag is persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LoanEvent {
    LoanProposed {
        loan_id:      LoanId,
        requester_id: UserId,
        principal:    Money,
    },
    StatusChanged {
        loan_id:    LoanId,
        old_status: LoanStatus,
        new_status: LoanStatus,
        actor_id:   UserId,
    },
    InvestmentAccepted {
        loan_id:        LoanId,
        investment_id:  InvestmentId,
        investor_id:    UserId,
        amount:         Money,
        total_invested: Money,
    },
    LoanFullyFunded {
        loan_id:   LoanId,
        principal: Money,
        investors: usize,
    },
    AgreementsDispatched {
        loan_id:   LoanId,
        delivered: usize,
        failed:    usize,
    },
}

impl LoanEvent {
    pub fn loan_id(&self) -> LoanId {
        match self {
            Self::LoanProposed { loan_id, .. }
            | Self::StatusChanged { loan_id, .. }
            | Self::InvestmentAccepted { loan_id, .. }
            | Self::LoanFullyFunded { loan_id, .. }
            | Self::AgreementsDispatched { loan_id, .. } => *loan_id,
        }
    }

    /// Stable name for the event_type column.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::LoanProposed { .. }         => "loan_proposed",
            Self::StatusChanged { .. }        => "status_changed",
            Self::InvestmentAccepted { .. }   => "investment_accepted",
            Self::LoanFullyFunded { .. }      => "loan_fully_funded",
            Self::AgreementsDispatched { .. } => "agreements_dispatched",
        }
    }
}

/// A persisted event row.
#[derive(Debug, Clone)]
pub struct EventLogEntry {
    pub id:         Option<i64>,
    pub loan_id:    LoanId,
    pub event_type: String,
    pub payload:    String,
    pub created_at: String,
}

impl EventLogEntry {
    pub fn decode(&self) -> serde_json::Result<LoanEvent> {
        serde_json::from_str(&self.payload)
    }
}
