//! Position and bankroll ledger for a human-confirmed options strategy.
//!
//! The crate tracks three pieces of durable state per (broker, environment)
//! scope: the open-positions CSV, the bankroll ledger JSON, and the
//! append-only trade-history log. Every operation re-reads its backing file
//! so external writers (sync jobs, monitors) are always respected.

pub mod bankroll;
pub mod cli;
pub mod config;
pub mod confirm;
pub mod data_paths;
pub mod history;
pub mod logging;
pub mod portfolio;
pub mod traits;
pub mod types;
