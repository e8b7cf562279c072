//! Loan lifecycle tests.
//!
//! Walks loans through proposed → approved → invested → disbursed and
//! checks every guard on the way: roles, input shape, existence, status.

use chrono::NaiveDate;
use loanflow_core::{
    access::{Actor, Role},
    engine::LoanEngine,
    error::{LoanError, LoanResult},
    event::LoanEvent,
    loan::{ApprovalSubmission, DisbursementSubmission, LoanProposal},
    status::LoanStatus,
    types::{LoanId, Money, Rate},
};
use rust_decimal_macros::dec;

const REQUESTER: Actor = Actor { user_id: 1, role: Role::Requester };
const ADMIN: Actor = Actor { user_id: 2, role: Role::Admin };
const INVESTOR_A: Actor = Actor { user_id: 10, role: Role::Investor };
const INVESTOR_B: Actor = Actor { user_id: 11, role: Role::Investor };

fn build() -> LoanEngine {
    let _ = env_logger::builder().is_test(true).try_init();
    LoanEngine::build_test().expect("build test engine")
}

fn proposal(principal: Money, rate: Rate, roi: Rate) -> LoanProposal {
    LoanProposal {
        borrower_id: "1122334455667788".into(),
        principal,
        rate,
        roi,
    }
}

fn approval() -> ApprovalSubmission {
    ApprovalSubmission {
        validator_id: "EMP001".into(),
        proof_ref:    "/uploads/proof_visit.jpg".into(),
        approved_at:  NaiveDate::from_ymd_opt(2025, 6, 25).expect("date"),
    }
}

fn disbursement() -> DisbursementSubmission {
    DisbursementSubmission {
        officer_id:    "EMP999".into(),
        agreement_ref: "/uploads/signed_agreement_loan1.jpg".into(),
        disbursed_at:  NaiveDate::from_ymd_opt(2025, 6, 26).expect("date"),
    }
}

fn approved_loan(engine: &LoanEngine, principal: Money) -> LoanResult<LoanId> {
    let loan_id = engine.propose_loan(&REQUESTER, proposal(principal, dec!(12), dec!(10)))?;
    engine.approve_loan(&ADMIN, loan_id, approval())?;
    Ok(loan_id)
}

#[test]
fn full_lifecycle_happy_path() -> LoanResult<()> {
    let engine = build();

    let loan_id = engine.propose_loan(&REQUESTER, proposal(dec!(1_000_000), dec!(12), dec!(10)))?;
    assert_eq!(engine.store.loan(loan_id)?.status, LoanStatus::Proposed);

    let approval = engine.approve_loan(&ADMIN, loan_id, approval())?;
    assert_eq!(approval.validator_id, "EMP001");
    assert_eq!(engine.store.loan(loan_id)?.status, LoanStatus::Approved);
    assert_eq!(engine.store.approval(loan_id)?, Some(approval));

    let first = engine.invest_in_loan(&INVESTOR_A, loan_id, dec!(500_000))?;
    assert_eq!(first.total_invested, dec!(500_000));
    assert!(!first.fully_funded);
    assert!(first.dispatch.is_none());
    assert_eq!(engine.store.loan(loan_id)?.status, LoanStatus::Approved);

    let second = engine.invest_in_loan(&INVESTOR_B, loan_id, dec!(500_000))?;
    assert_eq!(second.total_invested, dec!(1_000_000));
    assert_eq!(second.remaining, dec!(0));
    assert!(second.fully_funded);
    assert_eq!(engine.store.loan(loan_id)?.status, LoanStatus::Invested);

    let disbursement = engine.disburse_loan(&ADMIN, loan_id, disbursement())?;
    assert_eq!(disbursement.admin_id, ADMIN.user_id);
    assert_eq!(disbursement.officer_id, "EMP999");
    assert_eq!(engine.store.loan(loan_id)?.status, LoanStatus::Disbursed);
    assert_eq!(engine.store.disbursement(loan_id)?, Some(disbursement));

    Ok(())
}

#[test]
fn proposal_stores_terms_as_given() -> LoanResult<()> {
    let engine = build();
    let loan_id =
        engine.propose_loan(&REQUESTER, proposal(dec!(2_500_000.50), dec!(12.5), dec!(9.75)))?;
    let loan = engine.store.loan(loan_id)?;
    assert_eq!(loan.principal, dec!(2_500_000.50));
    assert_eq!(loan.rate, dec!(12.5));
    assert_eq!(loan.roi, dec!(9.75));
    assert_eq!(loan.requester_id, REQUESTER.user_id);
    assert_eq!(loan.borrower_id, "1122334455667788");
    Ok(())
}

#[test]
fn principal_below_minimum_is_rejected() {
    let engine = build();
    let err = engine
        .propose_loan(&REQUESTER, proposal(dec!(500_000), dec!(12), dec!(10)))
        .expect_err("below minimum principal");
    assert!(matches!(err, LoanError::Validation { field: "principal", .. }), "{err}");
}

#[test]
fn principal_bounds_are_inclusive() -> LoanResult<()> {
    let engine = build();
    engine.propose_loan(&REQUESTER, proposal(dec!(1_000_000), dec!(12), dec!(10)))?;
    engine.propose_loan(&REQUESTER, proposal(dec!(100_000_000), dec!(12), dec!(10)))?;
    let err = engine
        .propose_loan(&REQUESTER, proposal(dec!(100_000_000.01), dec!(12), dec!(10)))
        .expect_err("above maximum principal");
    assert!(matches!(err, LoanError::Validation { field: "principal", .. }));
    Ok(())
}

#[test]
fn rate_must_exceed_roi() {
    let engine = build();
    for (rate, roi) in [(dec!(10), dec!(10)), (dec!(9), dec!(10))] {
        let err = engine
            .propose_loan(&REQUESTER, proposal(dec!(1_000_000), rate, roi))
            .expect_err("rate <= roi");
        assert!(matches!(err, LoanError::Validation { field: "rate", .. }), "{err}");
    }
}

#[test]
fn blank_borrower_is_rejected() {
    let engine = build();
    let mut p = proposal(dec!(1_000_000), dec!(12), dec!(10));
    p.borrower_id = "   ".into();
    let err = engine.propose_loan(&REQUESTER, p).expect_err("blank borrower");
    assert!(matches!(err, LoanError::Validation { field: "borrower_id", .. }));
}

#[test]
fn roles_are_enforced() -> LoanResult<()> {
    let engine = build();

    let err = engine
        .propose_loan(&INVESTOR_A, proposal(dec!(1_000_000), dec!(12), dec!(10)))
        .expect_err("investor cannot propose");
    assert!(matches!(
        err,
        LoanError::Forbidden { required: Role::Requester, actual: Role::Investor }
    ));

    let loan_id = engine.propose_loan(&REQUESTER, proposal(dec!(1_000_000), dec!(12), dec!(10)))?;
    let err = engine
        .approve_loan(&REQUESTER, loan_id, approval())
        .expect_err("requester cannot approve");
    assert!(matches!(err, LoanError::Forbidden { required: Role::Admin, .. }));

    engine.approve_loan(&ADMIN, loan_id, approval())?;
    let err = engine
        .invest_in_loan(&ADMIN, loan_id, dec!(500_000))
        .expect_err("admin cannot invest");
    assert!(matches!(err, LoanError::Forbidden { required: Role::Investor, .. }));

    let err = engine
        .disburse_loan(&INVESTOR_A, loan_id, disbursement())
        .expect_err("investor cannot disburse");
    assert!(matches!(err, LoanError::Forbidden { required: Role::Admin, .. }));
    Ok(())
}

#[test]
fn approval_without_proof_is_rejected() -> LoanResult<()> {
    let engine = build();
    let loan_id = engine.propose_loan(&REQUESTER, proposal(dec!(1_000_000), dec!(12), dec!(10)))?;

    let mut submission = approval();
    submission.proof_ref = String::new();
    let err = engine
        .approve_loan(&ADMIN, loan_id, submission)
        .expect_err("missing proof");
    assert!(matches!(err, LoanError::Validation { field: "proof_ref", .. }));

    let mut submission = approval();
    submission.validator_id = String::new();
    let err = engine
        .approve_loan(&ADMIN, loan_id, submission)
        .expect_err("missing validator");
    assert!(matches!(err, LoanError::Validation { field: "validator_id", .. }));

    assert_eq!(engine.store.loan(loan_id)?.status, LoanStatus::Proposed);
    assert_eq!(engine.store.approval(loan_id)?, None);
    Ok(())
}

#[test]
fn approval_happens_once() -> LoanResult<()> {
    let engine = build();
    let loan_id = approved_loan(&engine, dec!(1_000_000))?;

    let err = engine
        .approve_loan(&ADMIN, loan_id, approval())
        .expect_err("already approved");
    assert!(matches!(
        err,
        LoanError::InvalidState {
            expected: LoanStatus::Proposed,
            actual: LoanStatus::Approved,
            ..
        }
    ));
    Ok(())
}

#[test]
fn unknown_loan_is_not_found() {
    let engine = build();
    assert!(matches!(
        engine.approve_loan(&ADMIN, 404, approval()),
        Err(LoanError::NotFound { loan_id: 404 })
    ));
    assert!(matches!(
        engine.invest_in_loan(&INVESTOR_A, 404, dec!(100_000)),
        Err(LoanError::NotFound { loan_id: 404 })
    ));
    assert!(matches!(
        engine.disburse_loan(&ADMIN, 404, disbursement()),
        Err(LoanError::NotFound { loan_id: 404 })
    ));
}

#[test]
fn investing_in_proposed_loan_is_invalid_state() -> LoanResult<()> {
    let engine = build();
    let loan_id = engine.propose_loan(&REQUESTER, proposal(dec!(1_000_000), dec!(12), dec!(10)))?;

    let err = engine
        .invest_in_loan(&INVESTOR_A, loan_id, dec!(500_000))
        .expect_err("not approved yet");
    assert!(matches!(
        err,
        LoanError::InvalidState {
            expected: LoanStatus::Approved,
            actual: LoanStatus::Proposed,
            ..
        }
    ));
    assert!(engine.store.investments(loan_id)?.is_empty());
    Ok(())
}

#[test]
fn no_state_can_be_skipped() -> LoanResult<()> {
    let engine = build();
    let proposed = engine.propose_loan(&REQUESTER, proposal(dec!(1_000_000), dec!(12), dec!(10)))?;
    let err = engine
        .disburse_loan(&ADMIN, proposed, disbursement())
        .expect_err("proposed cannot be disbursed");
    assert!(matches!(
        err,
        LoanError::InvalidState { expected: LoanStatus::Invested, actual: LoanStatus::Proposed, .. }
    ));

    let approved = approved_loan(&engine, dec!(1_000_000))?;
    engine.invest_in_loan(&INVESTOR_A, approved, dec!(500_000))?;
    let err = engine
        .disburse_loan(&ADMIN, approved, disbursement())
        .expect_err("partially funded cannot be disbursed");
    assert!(matches!(
        err,
        LoanError::InvalidState { expected: LoanStatus::Invested, actual: LoanStatus::Approved, .. }
    ));
    assert_eq!(engine.store.disbursement(approved)?, None);
    Ok(())
}

#[test]
fn disbursed_loan_is_terminal() -> LoanResult<()> {
    let engine = build();
    let loan_id = approved_loan(&engine, dec!(1_000_000))?;
    engine.invest_in_loan(&INVESTOR_A, loan_id, dec!(1_000_000))?;
    engine.disburse_loan(&ADMIN, loan_id, disbursement())?;

    assert!(matches!(
        engine.disburse_loan(&ADMIN, loan_id, disbursement()),
        Err(LoanError::InvalidState { actual: LoanStatus::Disbursed, .. })
    ));
    assert!(matches!(
        engine.invest_in_loan(&INVESTOR_B, loan_id, dec!(100_000)),
        Err(LoanError::InvalidState { actual: LoanStatus::Disbursed, .. })
    ));
    assert!(matches!(
        engine.approve_loan(&ADMIN, loan_id, approval()),
        Err(LoanError::InvalidState { actual: LoanStatus::Disbursed, .. })
    ));
    Ok(())
}

#[test]
fn disbursement_without_agreement_is_rejected() -> LoanResult<()> {
    let engine = build();
    let loan_id = approved_loan(&engine, dec!(1_000_000))?;
    engine.invest_in_loan(&INVESTOR_A, loan_id, dec!(1_000_000))?;

    let mut submission = disbursement();
    submission.agreement_ref = " ".into();
    let err = engine
        .disburse_loan(&ADMIN, loan_id, submission)
        .expect_err("missing agreement");
    assert!(matches!(err, LoanError::Validation { field: "agreement_ref", .. }));
    assert_eq!(engine.store.loan(loan_id)?.status, LoanStatus::Invested);
    Ok(())
}

#[test]
fn event_log_records_status_changes_in_order() -> LoanResult<()> {
    let engine = build();
    let loan_id = approved_loan(&engine, dec!(1_000_000))?;
    engine.invest_in_loan(&INVESTOR_A, loan_id, dec!(400_000))?;
    engine.invest_in_loan(&INVESTOR_B, loan_id, dec!(600_000))?;
    engine.disburse_loan(&ADMIN, loan_id, disbursement())?;

    let events = engine
        .store
        .events_for_loan(loan_id)?
        .iter()
        .map(|e| e.decode())
        .collect::<Result<Vec<_>, _>>()?;

    let transitions: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            LoanEvent::StatusChanged { old_status, new_status, .. } => Some((*old_status, *new_status)),
            _ => None,
        })
        .collect();
    assert_eq!(
        transitions,
        vec![
            (LoanStatus::Proposed, LoanStatus::Approved),
            (LoanStatus::Approved, LoanStatus::Invested),
            (LoanStatus::Invested, LoanStatus::Disbursed),
        ]
    );

    assert!(matches!(events.first(), Some(LoanEvent::LoanProposed { .. })));
    let accepted = events
        .iter()
        .filter(|e| matches!(e, LoanEvent::InvestmentAccepted { .. }))
        .count();
    assert_eq!(accepted, 2);
    Ok(())
}

#[test]
fn borrower_agreement_is_admin_only() -> LoanResult<()> {
    let engine = build();
    let loan_id = approved_loan(&engine, dec!(1_000_000))?;

    assert!(matches!(
        engine.borrower_agreement(&REQUESTER, loan_id),
        Err(LoanError::Forbidden { .. })
    ));
    let artifact = engine.borrower_agreement(&ADMIN, loan_id)?;
    assert_eq!(artifact.0, format!("/uploads/agreement_loan{loan_id}_borrower.txt"));
    Ok(())
}

#[test]
fn file_store_survives_reopen() -> LoanResult<()> {
    let _ = env_logger::builder().is_test(true).try_init();
    let dir = tempfile::tempdir().map_err(anyhow::Error::from)?;
    let path = dir.path().join("loans.db");
    let path = path.to_string_lossy();
    let config = loanflow_core::config::LoanConfig {
        artifact_dir: dir.path().join("uploads").to_string_lossy().into_owned(),
        ..loanflow_core::config::LoanConfig::default_test()
    };

    let loan_id = {
        let store = loanflow_core::store::LoanStore::open(&path, &config)?;
        let engine = LoanEngine::build(config.clone(), store)?;
        let loan_id = approved_loan(&engine, dec!(1_000_000))?;
        engine.invest_in_loan(&INVESTOR_A, loan_id, dec!(250_000))?;
        loan_id
    };

    // The file was switched to WAL, and that setting persists.
    let mode: String = rusqlite::Connection::open(&*path)?
        .query_row("PRAGMA journal_mode", [], |row| row.get(0))?;
    assert_eq!(mode.to_lowercase(), "wal");

    // Migrations are idempotent on an existing file.
    let store = loanflow_core::store::LoanStore::open(&path, &config)?;
    let engine = LoanEngine::build(config, store)?;
    assert_eq!(engine.store.loan(loan_id)?.status, LoanStatus::Approved);
    assert_eq!(engine.store.funding_position(loan_id)?.total_invested, dec!(250_000));

    engine.invest_in_loan(&INVESTOR_B, loan_id, dec!(750_000))?;
    assert_eq!(engine.store.loan(loan_id)?.status, LoanStatus::Invested);
    Ok(())
}
