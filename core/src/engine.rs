//! The loan engine: the lifecycle controller for every loan.
//!
//! proposed → approved → invested → disbursed
//!
//! RULES:
//!   - Every operation checks the caller's role first, then input shape,
//!     then the loan's existence, then its status.
//!   - Each transition plus the record it creates is one transaction.
//!   - Investing runs under the loan's own lock AND inside an immediate
//!     transaction: read total → evaluate rules → append → re-read →
//!     maybe transition. Different loans never share a lock.
//!   - The side-effect dispatcher runs only after the funding commit,
//!     and its failures never reach the caller as errors.

use crate::{
    access::{Actor, Role},
    config::LoanConfig,
    dispatch::{ArtifactRef, DispatchReport, Notifier, SideEffectDispatcher},
    documents::{AgreementMailComposer, DirectoryDocumentService},
    error::{LoanError, LoanResult},
    event::LoanEvent,
    funding::{self, FundingDecision, FundingRequest},
    ledger::InvestmentReceipt,
    loan::{Approval, ApprovalSubmission, Disbursement, DisbursementSubmission, Loan, LoanProposal},
    locks::LoanLocks,
    status::{LoanStatus, LoanTransition},
    store::{LoanStore, StoreTx},
    types::{LoanId, Money},
};
use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;

pub struct LoanEngine {
    pub store:  LoanStore,
    config:     LoanConfig,
    locks:      LoanLocks,
    dispatcher: SideEffectDispatcher,
}

impl LoanEngine {
    pub fn new(config: LoanConfig, store: LoanStore, dispatcher: SideEffectDispatcher) -> Self {
        Self {
            store,
            config,
            locks: LoanLocks::new(),
            dispatcher,
        }
    }

    /// Build a fully wired engine with the bundled document service and
    /// an empty mail composer. Applies migrations.
    pub fn build(config: LoanConfig, store: LoanStore) -> LoanResult<Self> {
        let mailer = Arc::new(AgreementMailComposer::new(config.agreement_base_url.as_str()));
        Self::build_with_notifier(config, store, mailer)
    }

    /// As `build`, with the caller's notifier (e.g. a composer that
    /// already knows investor addresses).
    pub fn build_with_notifier(
        config: LoanConfig,
        store: LoanStore,
        notifier: Arc<dyn Notifier>,
    ) -> LoanResult<Self> {
        store.migrate()?;
        let documents = Arc::new(DirectoryDocumentService::new(&config.artifact_dir));
        let dispatcher = SideEffectDispatcher::new(documents, notifier);
        Ok(Self::new(config, store, dispatcher))
    }

    /// In-memory engine with test config.
    pub fn build_test() -> LoanResult<Self> {
        let config = LoanConfig::default_test();
        let store = LoanStore::in_memory()?.with_lock_timeout(config.lock_timeout());
        Self::build(config, store)
    }

    pub fn config(&self) -> &LoanConfig {
        &self.config
    }

    // ── Propose ────────────────────────────────────────────────

    pub fn propose_loan(&self, actor: &Actor, proposal: LoanProposal) -> LoanResult<LoanId> {
        actor.require(Role::Requester)?;
        proposal.validate(&self.config)?;

        let loan_id = self.store.atomically(|tx| {
            let loan_id = tx.insert_loan(&proposal, actor.user_id, Utc::now())?;
            tx.append_event(&LoanEvent::LoanProposed {
                loan_id,
                requester_id: actor.user_id,
                principal:    proposal.principal,
            })?;
            Ok(loan_id)
        })?;

        log::info!(
            "loan={loan_id} proposed by requester {}: principal={} rate={} roi={}",
            actor.user_id,
            proposal.principal,
            proposal.rate,
            proposal.roi
        );
        Ok(loan_id)
    }

    // ── Approve ────────────────────────────────────────────────

    pub fn approve_loan(
        &self,
        actor: &Actor,
        loan_id: LoanId,
        submission: ApprovalSubmission,
    ) -> LoanResult<Approval> {
        actor.require(Role::Admin)?;
        submission.validate()?;

        let approval = self.locks.with_loan(loan_id, self.config.lock_timeout(), || {
            self.store.atomically(|tx| {
                let loan = tx.require_loan(loan_id)?;
                Self::transition(tx, &loan, LoanTransition::Approve, actor)?;
                let approval = Approval {
                    loan_id,
                    validator_id: submission.validator_id.trim().to_string(),
                    proof_ref:    submission.proof_ref.clone(),
                    approved_at:  submission.approved_at,
                };
                tx.insert_approval(&approval)?;
                Ok(approval)
            })
        })?;

        log::info!(
            "loan={loan_id} approved by admin {} (validator {}, visited {})",
            actor.user_id,
            approval.validator_id,
            approval.approved_at
        );
        Ok(approval)
    }

    // ── Invest ─────────────────────────────────────────────────

    pub fn invest_in_loan(
        &self,
        actor: &Actor,
        loan_id: LoanId,
        amount: Money,
    ) -> LoanResult<InvestmentReceipt> {
        actor.require(Role::Investor)?;
        if amount <= Decimal::ZERO {
            return Err(LoanError::validation("amount", "must be positive"));
        }

        let committed = self.locks.with_loan(loan_id, self.config.lock_timeout(), || {
            self.store
                .atomically(|tx| self.commit_investment(tx, actor, loan_id, amount))
        });

        let mut receipt = match committed {
            Ok(receipt) => receipt,
            Err(e) => {
                log::warn!(
                    "loan={loan_id} invest: investor {} amount={amount} rejected: {e}",
                    actor.user_id
                );
                return Err(e);
            }
        };

        log::info!(
            "loan={loan_id} invest: investor {} amount={amount} accepted, total={} remaining={}",
            actor.user_id,
            receipt.total_invested,
            receipt.remaining
        );

        if receipt.fully_funded {
            receipt.dispatch = match self.dispatcher.dispatch_once(&self.store, loan_id) {
                Ok(report) => report,
                Err(e) => {
                    log::warn!("loan={loan_id} dispatch: aborted, retry with redispatch: {e}");
                    None
                }
            };
        }
        Ok(receipt)
    }

    /// The funding critical section. Runs inside one immediate
    /// transaction while the loan's lock is held.
    fn commit_investment(
        &self,
        tx: &StoreTx<'_>,
        actor: &Actor,
        loan_id: LoanId,
        amount: Money,
    ) -> LoanResult<InvestmentReceipt> {
        let loan = tx.require_loan(loan_id)?;
        let current_total = tx.total_invested(loan_id)?;

        let request = FundingRequest {
            loan_id,
            principal: loan.principal,
            status: loan.status,
            current_total,
            amount,
        };
        let decision = funding::evaluate(&request, self.config.min_investment_ratio);
        log::debug!("loan={loan_id} funding rules: {request:?} -> {decision:?}");
        let (expected_total, expected_closed) = match decision {
            FundingDecision::Accept { new_total, fully_funded, .. } => (new_total, fully_funded),
            FundingDecision::Reject(rejection) => return Err(rejection.into_error(loan_id)),
        };

        let investment_id = tx.append_investment(loan_id, actor.user_id, amount, Utc::now())?;

        // Re-derive from the ledger; any disagreement with the decision rolls back.
        let investments = tx.investments(loan_id)?;
        let position = crate::ledger::FundingPosition::from_ledger(loan.principal, &investments);
        if position.total_invested > position.principal
            || position.total_invested != expected_total
            || position.is_fully_funded() != expected_closed
        {
            return Err(anyhow::anyhow!(
                "loan {loan_id}: ledger total {} (principal {}) disagrees with accepted total {expected_total}",
                position.total_invested,
                position.principal
            )
            .into());
        }

        tx.append_event(&LoanEvent::InvestmentAccepted {
            loan_id,
            investment_id,
            investor_id:    actor.user_id,
            amount,
            total_invested: position.total_invested,
        })?;

        let fully_funded = position.is_fully_funded();
        if fully_funded {
            Self::transition(tx, &loan, LoanTransition::Fund, actor)?;
            tx.append_event(&LoanEvent::LoanFullyFunded {
                loan_id,
                principal: loan.principal,
                investors: investments.len(),
            })?;
            log::info!("loan={loan_id} fully funded by {} investments", investments.len());
        }

        Ok(InvestmentReceipt {
            investment_id,
            loan_id,
            total_invested: position.total_invested,
            remaining:      position.remaining(),
            fully_funded,
            dispatch:       None,
        })
    }

    // ── Disburse ───────────────────────────────────────────────

    pub fn disburse_loan(
        &self,
        actor: &Actor,
        loan_id: LoanId,
        submission: DisbursementSubmission,
    ) -> LoanResult<Disbursement> {
        actor.require(Role::Admin)?;
        submission.validate()?;

        let disbursement = self.locks.with_loan(loan_id, self.config.lock_timeout(), || {
            self.store.atomically(|tx| {
                let loan = tx.require_loan(loan_id)?;
                Self::transition(tx, &loan, LoanTransition::Disburse, actor)?;
                let disbursement = Disbursement {
                    loan_id,
                    officer_id:    submission.officer_id.trim().to_string(),
                    agreement_ref: submission.agreement_ref.clone(),
                    admin_id:      actor.user_id,
                    disbursed_at:  submission.disbursed_at,
                };
                tx.insert_disbursement(&disbursement)?;
                Ok(disbursement)
            })
        })?;

        log::info!(
            "loan={loan_id} disbursed by admin {} (officer {}, on {})",
            actor.user_id,
            disbursement.officer_id,
            disbursement.disbursed_at
        );
        Ok(disbursement)
    }

    // ── Dispatch retry ─────────────────────────────────────────

    /// Re-run the agreement fan-out for a funded loan whose dispatch never
    /// claimed its guard (e.g. the store was busy right after funding).
    /// Returns `None` when the dispatch already ran. Admin only.
    pub fn redispatch(&self, actor: &Actor, loan_id: LoanId) -> LoanResult<Option<DispatchReport>> {
        actor.require(Role::Admin)?;
        let loan = self.store.loan(loan_id)?;
        if !matches!(loan.status, LoanStatus::Invested | LoanStatus::Disbursed) {
            return Err(LoanError::InvalidState {
                loan_id,
                expected: LoanStatus::Invested,
                actual:   loan.status,
            });
        }

        let report = self.dispatcher.dispatch_once(&self.store, loan_id)?;
        if report.is_none() {
            log::info!("loan={loan_id} redispatch by admin {}: already dispatched", actor.user_id);
        }
        Ok(report)
    }

    // ── Borrower agreement ─────────────────────────────────────

    /// Render the borrower's copy of the loan agreement. Admin only.
    pub fn borrower_agreement(&self, actor: &Actor, loan_id: LoanId) -> LoanResult<ArtifactRef> {
        actor.require(Role::Admin)?;
        let loan = self.store.loan(loan_id)?;
        let artifact = self.dispatcher.documents().generate_borrower_agreement(&loan)?;
        Ok(artifact)
    }

    fn transition(
        tx: &StoreTx<'_>,
        loan: &Loan,
        transition: LoanTransition,
        actor: &Actor,
    ) -> LoanResult<()> {
        let new_status = transition
            .apply(loan.status)
            .map_err(|expected| LoanError::InvalidState {
                loan_id: loan.loan_id,
                expected,
                actual: loan.status,
            })?;
        tx.apply_transition(loan.loan_id, transition)?;
        tx.append_event(&LoanEvent::StatusChanged {
            loan_id:    loan.loan_id,
            old_status: loan.status,
            new_status,
            actor_id:   actor.user_id,
        })
    }
}
