//! loan-runner: headless driver for the loan funding engine.
//!
//! Usage:
//!   loan-runner --db loans.db --config loans.json
//!   loan-runner --drill --seed 12345 --investors 32
//!   loan-runner --ipc-mode

mod drill;

use anyhow::Result;
use loanflow_core::{
    access::Actor,
    config::LoanConfig,
    documents::AgreementMailComposer,
    engine::LoanEngine,
    ledger::{FundingPosition, Investment},
    loan::{ApprovalSubmission, DisbursementSubmission, Loan, LoanProposal},
    store::LoanStore,
    types::{LoanId, Money, UserId},
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::env;
use std::io::{self, BufRead, Write};
use std::sync::Arc;

/// One JSON line on stdin. The caller's identity travels with each
/// command; the host process is trusted to have verified it.
#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum IpcCommand {
    Propose {
        actor:    Actor,
        proposal: LoanProposal,
    },
    Approve {
        actor:    Actor,
        loan_id:  LoanId,
        approval: ApprovalSubmission,
    },
    Invest {
        actor:   Actor,
        loan_id: LoanId,
        amount:  Money,
    },
    Disburse {
        actor:        Actor,
        loan_id:      LoanId,
        disbursement: DisbursementSubmission,
    },
    Redispatch {
        actor:   Actor,
        loan_id: LoanId,
    },
    RegisterEmail {
        investor_id: UserId,
        email:       String,
    },
    GetLoan {
        loan_id: LoanId,
    },
    Quit,
}

#[derive(Serialize)]
struct LoanView {
    loan:        Loan,
    position:    FundingPosition,
    remaining:   Money,
    investments: Vec<Investment>,
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let seed = parse_arg(&args, "--seed", 42u64);
    let investors = parse_arg(&args, "--investors", 16usize);
    let ipc_mode = args.iter().any(|a| a == "--ipc-mode");
    let drill_mode = args.iter().any(|a| a == "--drill");
    let db = string_arg(&args, "--db").unwrap_or(":memory:");

    let config = match string_arg(&args, "--config") {
        Some(path) => LoanConfig::load(path)?,
        None => LoanConfig::default(),
    };

    if !ipc_mode {
        println!("loan-runner");
        println!("  db:            {db}");
        println!("  artifact dir:  {}", config.artifact_dir);
        println!("  principal:     {} ..= {}", config.min_principal, config.max_principal);
        println!("  min ratio:     {}", config.min_investment_ratio);
        println!();
    }

    let store = if db == ":memory:" {
        LoanStore::in_memory()?.with_lock_timeout(config.lock_timeout())
    } else {
        LoanStore::open(db, &config)?
    };
    let mailer = Arc::new(AgreementMailComposer::new(config.agreement_base_url.as_str()));
    let engine = LoanEngine::build_with_notifier(config, store, mailer.clone())?;

    if ipc_mode {
        run_ipc_loop(&engine, &mailer)?;
    } else if drill_mode {
        let report = drill::run(&engine, seed, investors)?;
        print_drill(&report, seed);
    } else {
        run_scenario(&engine, &mailer)?;
    }

    Ok(())
}

fn run_ipc_loop(engine: &LoanEngine, mailer: &AgreementMailComposer) -> Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut handle = stdin.lock();
    let mut buffer = String::new();

    loop {
        buffer.clear();
        let bytes_read = handle.read_line(&mut buffer)?;
        if bytes_read == 0 {
            break; // EOF
        }
        if buffer.trim().is_empty() {
            continue;
        }

        let cmd: IpcCommand = match serde_json::from_str(&buffer) {
            Ok(c) => c,
            Err(e) => {
                let err_json = serde_json::json!({ "error": e.to_string() });
                writeln!(stdout, "{}", err_json)?;
                stdout.flush()?;
                continue;
            }
        };
        if matches!(cmd, IpcCommand::Quit) {
            break;
        }

        let reply = match handle_command(engine, mailer, cmd) {
            Ok(value) => serde_json::json!({ "ok": value }),
            Err(e) => serde_json::json!({ "error": e.to_string(), "transient": e.is_transient() }),
        };
        writeln!(stdout, "{}", reply)?;
        stdout.flush()?;
    }
    Ok(())
}

fn handle_command(
    engine: &LoanEngine,
    mailer: &AgreementMailComposer,
    cmd: IpcCommand,
) -> loanflow_core::error::LoanResult<serde_json::Value> {
    let value = match cmd {
        IpcCommand::Propose { actor, proposal } => {
            let loan_id = engine.propose_loan(&actor, proposal)?;
            serde_json::json!({ "loan_id": loan_id })
        }
        IpcCommand::Approve { actor, loan_id, approval } => {
            serde_json::to_value(engine.approve_loan(&actor, loan_id, approval)?)?
        }
        IpcCommand::Invest { actor, loan_id, amount } => {
            serde_json::to_value(engine.invest_in_loan(&actor, loan_id, amount)?)?
        }
        IpcCommand::Disburse { actor, loan_id, disbursement } => {
            serde_json::to_value(engine.disburse_loan(&actor, loan_id, disbursement)?)?
        }
        IpcCommand::Redispatch { actor, loan_id } => {
            serde_json::to_value(engine.redispatch(&actor, loan_id)?)?
        }
        IpcCommand::RegisterEmail { investor_id, email } => {
            mailer.register(investor_id, email);
            serde_json::json!({ "investor_id": investor_id })
        }
        IpcCommand::GetLoan { loan_id } => serde_json::to_value(loan_view(engine, loan_id)?)?,
        IpcCommand::Quit => serde_json::Value::Null,
    };
    Ok(value)
}

fn loan_view(engine: &LoanEngine, loan_id: LoanId) -> loanflow_core::error::LoanResult<LoanView> {
    let loan = engine.store.loan(loan_id)?;
    let investments = engine.store.investments(loan_id)?;
    let position = FundingPosition::from_ledger(loan.principal, &investments);
    Ok(LoanView {
        loan,
        remaining: position.remaining(),
        position,
        investments,
    })
}

/// The canonical walk: propose, approve, two investors close the gap,
/// an admin disburses.
fn run_scenario(engine: &LoanEngine, mailer: &AgreementMailComposer) -> Result<()> {
    let requester = Actor::requester(1);
    let admin = Actor::admin(2);
    let investors = [Actor::investor(10), Actor::investor(11)];
    for investor in &investors {
        mailer.register(investor.user_id, format!("investor{}@example.com", investor.user_id));
    }

    let principal = engine.config().min_principal;
    let loan_id = engine.propose_loan(
        &requester,
        LoanProposal {
            borrower_id: "1122334455667788".into(),
            principal,
            rate: Decimal::from(12),
            roi: Decimal::from(10),
        },
    )?;

    let today = chrono::Utc::now().date_naive();
    engine.approve_loan(
        &admin,
        loan_id,
        ApprovalSubmission {
            validator_id: "EMP001".into(),
            proof_ref:    "/uploads/proof_visit.jpg".into(),
            approved_at:  today,
        },
    )?;

    let half = principal / Decimal::from(2);
    let mut dispatch = None;
    for investor in &investors {
        let receipt = engine.invest_in_loan(investor, loan_id, half)?;
        if receipt.dispatch.is_some() {
            dispatch = receipt.dispatch;
        }
    }

    let borrower_copy = engine.borrower_agreement(&admin, loan_id)?;
    engine.disburse_loan(
        &admin,
        loan_id,
        DisbursementSubmission {
            officer_id:    "EMP999".into(),
            agreement_ref: borrower_copy.0.clone(),
            disbursed_at:  today,
        },
    )?;

    let view = loan_view(engine, loan_id)?;
    let events = engine.store.events_for_loan(loan_id)?;

    println!("=== RUN SUMMARY ===");
    println!("  loan_id:        {loan_id}");
    println!("  status:         {}", view.loan.status);
    println!("  principal:      {:.2}", view.position.principal);
    println!("  invested:       {:.2}", view.position.total_invested);
    println!("  investments:    {}", view.investments.len());
    println!("  borrower copy:  {borrower_copy}");
    println!("  events logged:  {}", events.len());

    println!();
    println!("=== AGREEMENTS ===");
    match dispatch {
        None => println!("  (dispatch did not run)"),
        Some(report) => {
            for preview in &report.previews {
                println!("  {} | {}", preview.to, preview.subject);
            }
            for failure in &report.failures {
                println!(
                    "  investor {} | {:?} failed: {}",
                    failure.investor_id, failure.stage, failure.error
                );
            }
        }
    }
    Ok(())
}

fn print_drill(report: &drill::DrillReport, seed: u64) {
    println!("=== DRILL SUMMARY ===");
    println!("  seed:           {seed}");
    println!("  loan_id:        {}", report.loan_id);
    println!("  attempts:       {}", report.attempts);
    println!("  accepted:       {}", report.accepted);
    for (kind, count) in &report.rejected {
        println!("  rejected:       {count} {kind}");
    }
    println!("  invested:       {:.2} / {:.2}", report.total_invested, report.principal);
    println!("  final status:   {}", report.final_status);
    println!("  dispatched:     {}", report.dispatched);
    println!("  invariants:     ok");
}

fn parse_arg<T: std::str::FromStr + Copy>(args: &[String], flag: &str, default: T) -> T {
    args.windows(2)
        .find(|w| w[0] == flag)
        .and_then(|w| w[1].parse().ok())
        .unwrap_or(default)
}

fn string_arg<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2).find(|w| w[0] == flag).map(|w| w[1].as_str())
}
