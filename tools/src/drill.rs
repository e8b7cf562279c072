//! Concurrency drill: many investors race one loan.
//!
//! Amounts are drawn up front from a seeded PCG stream so a given seed
//! always produces the same set of attempts; only the interleaving
//! varies between runs.

use anyhow::{bail, Result};
use loanflow_core::{
    access::Actor,
    engine::LoanEngine,
    error::LoanError,
    funding::min_investment,
    ledger::total_of,
    loan::{ApprovalSubmission, LoanProposal},
    status::LoanStatus,
    types::{LoanId, Money},
};
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64Mcg;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::thread;

pub struct DrillReport {
    pub loan_id:        LoanId,
    pub principal:      Money,
    pub attempts:       usize,
    pub accepted:       usize,
    pub rejected:       BTreeMap<&'static str, usize>,
    pub total_invested: Money,
    pub final_status:   LoanStatus,
    pub dispatched:     bool,
}

pub fn run(engine: &LoanEngine, seed: u64, investors: usize) -> Result<DrillReport> {
    let principal = engine.config().min_principal;
    let loan_id = engine.propose_loan(
        &Actor::requester(1),
        LoanProposal {
            borrower_id: format!("DRILL{seed:011}"),
            principal,
            rate: Decimal::from(12),
            roi: Decimal::from(10),
        },
    )?;
    engine.approve_loan(
        &Actor::admin(2),
        loan_id,
        ApprovalSubmission {
            validator_id: "DRILL".into(),
            proof_ref:    "/uploads/drill_proof.jpg".into(),
            approved_at:  chrono::Utc::now().date_naive(),
        },
    )?;

    // Between half the minimum and four times it, in tenths of the minimum,
    // so every rejection path gets exercised.
    let step = min_investment(principal, engine.config().min_investment_ratio) / Decimal::from(10);
    let mut rng = Pcg64Mcg::seed_from_u64(seed);
    let amounts: Vec<Money> = (0..investors)
        .map(|_| step * Decimal::from(rng.gen_range(5u32..=40)))
        .collect();

    let outcomes: Vec<_> = thread::scope(|scope| {
        let handles: Vec<_> = amounts
            .iter()
            .enumerate()
            .map(|(i, &amount)| {
                let investor = Actor::investor(1_000 + i as i64);
                scope.spawn(move || engine.invest_in_loan(&investor, loan_id, amount))
            })
            .collect();
        handles.into_iter().map(|h| h.join()).collect()
    });

    let mut accepted = 0;
    let mut rejected = BTreeMap::new();
    for outcome in outcomes {
        match outcome {
            Ok(Ok(_)) => accepted += 1,
            Ok(Err(e)) => *rejected.entry(rejection_kind(&e)).or_insert(0) += 1,
            Err(_) => bail!("investor thread panicked"),
        }
    }

    let ledger = engine.store.investments(loan_id)?;
    let total_invested = total_of(&ledger);
    let final_status = engine.store.loan(loan_id)?.status;
    let dispatched = engine.store.dispatch_record(loan_id)?.is_some();

    if ledger.len() != accepted {
        bail!("ledger holds {} rows but {accepted} investments were accepted", ledger.len());
    }
    if total_invested > principal {
        bail!("ledger total {total_invested} exceeds principal {principal}");
    }
    let fully_funded = total_invested == principal;
    if fully_funded != (final_status == LoanStatus::Invested) {
        bail!("status {final_status} disagrees with ledger total {total_invested}");
    }
    if fully_funded != dispatched {
        bail!("dispatch guard state disagrees with funding (dispatched={dispatched})");
    }

    Ok(DrillReport {
        loan_id,
        principal,
        attempts: investors,
        accepted,
        rejected,
        total_invested,
        final_status,
        dispatched,
    })
}

fn rejection_kind(e: &LoanError) -> &'static str {
    match e {
        LoanError::InvalidState { .. }        => "invalid_state",
        LoanError::BelowMinimum { .. }        => "below_minimum",
        LoanError::Overfunding { .. }         => "overfunding",
        LoanError::UnfundableRemainder { .. } => "unfundable_remainder",
        LoanError::LockTimeout { .. }         => "lock_timeout",
        LoanError::StoreBusy                  => "store_busy",
        _                                     => "other",
    }
}
