//! Loan funding engine.
//!
//! Drives a peer-to-peer loan from proposal to disbursement and keeps
//! the investment ledger consistent under concurrent funding.

pub mod access;
pub mod config;
pub mod dispatch;
pub mod documents;
pub mod engine;
pub mod error;
pub mod event;
pub mod funding;
pub mod ledger;
pub mod loan;
pub mod locks;
pub mod status;
pub mod store;
pub mod types;
