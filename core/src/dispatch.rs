//! Side-effect dispatcher for fully funded loans.
//!
//! Runs after the `approved → invested` transition has committed. For
//! every investment it asks the document service for an agreement and
//! the notifier for a message preview.
//!
//! RULES:
//!   - The fan-out runs at most once per loan. A `funding_dispatch` row
//!     is claimed first; whoever fails to claim it does nothing.
//!   - A failing collaborator is logged, recorded and skipped. Nothing
//!     here can touch the ledger or the loan status.

use crate::{
    error::LoanResult,
    event::LoanEvent,
    ledger::Investment,
    loan::Loan,
    store::LoanStore,
    types::{InvestmentId, LoanId, Money, UserId},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Opaque locator of a generated document, e.g. "/uploads/agreement_loan1_investor7.txt".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactRef(pub String);

impl fmt::Display for ArtifactRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Renders and stores per-investor agreement documents.
pub trait DocumentService: Send + Sync {
    fn generate_agreement(
        &self,
        loan_id: LoanId,
        investor_id: UserId,
        amount: Money,
    ) -> anyhow::Result<ArtifactRef>;

    /// Borrower's copy of the loan agreement.
    fn generate_borrower_agreement(&self, loan: &Loan) -> anyhow::Result<ArtifactRef> {
        anyhow::bail!("borrower agreements are not supported (loan {})", loan.loan_id)
    }
}

/// Composes (but does not send) a notification for one recipient.
pub trait Notifier: Send + Sync {
    fn compose(
        &self,
        recipient: UserId,
        loan_id: LoanId,
        artifact: &ArtifactRef,
    ) -> anyhow::Result<NotificationPreview>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationPreview {
    pub to:      String,
    pub subject: String,
    pub body:    String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchStage {
    Document,
    Notification,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchFailure {
    pub investment_id: InvestmentId,
    pub investor_id:   UserId,
    pub stage:         DispatchStage,
    pub error:         String,
}

/// Outcome of the one dispatch run for a loan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchReport {
    pub dispatch_id: String,
    pub loan_id:     LoanId,
    pub previews:    Vec<NotificationPreview>,
    pub failures:    Vec<DispatchFailure>,
}

impl DispatchReport {
    pub fn delivered(&self) -> usize {
        self.previews.len()
    }

    pub fn failed(&self) -> usize {
        self.failures.len()
    }
}

/// Persisted guard row.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchRecord {
    pub loan_id:      LoanId,
    pub dispatch_id:  String,
    pub claimed_at:   DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub delivered:    i64,
    pub failed:       i64,
}

/// Per-investment outcome row.
#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactRecord {
    pub loan_id:       LoanId,
    pub investment_id: InvestmentId,
    pub investor_id:   UserId,
    pub artifact_ref:  Option<String>,
    pub error:         Option<String>,
}

pub struct SideEffectDispatcher {
    documents: Arc<dyn DocumentService>,
    notifier:  Arc<dyn Notifier>,
}

impl SideEffectDispatcher {
    pub fn new(documents: Arc<dyn DocumentService>, notifier: Arc<dyn Notifier>) -> Self {
        Self { documents, notifier }
    }

    pub fn documents(&self) -> &dyn DocumentService {
        self.documents.as_ref()
    }

    /// Claim the loan's dispatch guard and fan out.
    /// Returns `None` when the guard was already taken.
    pub fn dispatch_once(
        &self,
        store: &LoanStore,
        loan_id: LoanId,
    ) -> LoanResult<Option<DispatchReport>> {
        let dispatch_id = Uuid::new_v4().to_string();
        let claimed = store.atomically(|tx| tx.claim_dispatch(loan_id, &dispatch_id, Utc::now()))?;
        if !claimed {
            log::debug!("loan={loan_id} dispatch: already claimed, skipping");
            return Ok(None);
        }

        let investments = store.investments(loan_id)?;
        let mut report = DispatchReport {
            dispatch_id,
            loan_id,
            previews: Vec::with_capacity(investments.len()),
            failures: Vec::new(),
        };
        let mut records = Vec::with_capacity(investments.len());

        for investment in &investments {
            match self.deliver(investment) {
                Ok((artifact, preview)) => {
                    records.push(ArtifactRecord {
                        loan_id,
                        investment_id: investment.investment_id,
                        investor_id:   investment.investor_id,
                        artifact_ref:  Some(artifact.0),
                        error:         None,
                    });
                    report.previews.push(preview);
                }
                Err((failure, artifact)) => {
                    log::warn!(
                        "loan={loan_id} dispatch: {:?} failed for investor {}: {}",
                        failure.stage,
                        failure.investor_id,
                        failure.error
                    );
                    records.push(ArtifactRecord {
                        loan_id,
                        investment_id: investment.investment_id,
                        investor_id:   investment.investor_id,
                        artifact_ref:  artifact.map(|a| a.0),
                        error:         Some(failure.error.clone()),
                    });
                    report.failures.push(failure);
                }
            }
        }

        // Recording the outcome is itself best-effort.
        let recorded = store.atomically(|tx| {
            for record in &records {
                tx.record_artifact(record, Utc::now())?;
            }
            tx.complete_dispatch(
                loan_id,
                report.delivered() as i64,
                report.failed() as i64,
                Utc::now(),
            )?;
            tx.append_event(&LoanEvent::AgreementsDispatched {
                loan_id,
                delivered: report.delivered(),
                failed:    report.failed(),
            })
        });
        if let Err(e) = recorded {
            log::warn!("loan={loan_id} dispatch: could not record outcome: {e}");
        }

        log::info!(
            "loan={loan_id} dispatch: {} agreements delivered, {} failed",
            report.delivered(),
            report.failed()
        );
        Ok(Some(report))
    }

    fn deliver(
        &self,
        investment: &Investment,
    ) -> Result<(ArtifactRef, NotificationPreview), (DispatchFailure, Option<ArtifactRef>)> {
        let failure = |stage, error: anyhow::Error| DispatchFailure {
            investment_id: investment.investment_id,
            investor_id:   investment.investor_id,
            stage,
            error:         format!("{error:#}"),
        };

        let artifact = self
            .documents
            .generate_agreement(investment.loan_id, investment.investor_id, investment.amount)
            .map_err(|e| (failure(DispatchStage::Document, e), None))?;

        match self
            .notifier
            .compose(investment.investor_id, investment.loan_id, &artifact)
        {
            Ok(preview) => Ok((artifact, preview)),
            Err(e) => Err((failure(DispatchStage::Notification, e), Some(artifact))),
        }
    }
}
