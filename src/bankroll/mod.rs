//! Bankroll ledger: balance, risk sizing, trade history, and analytics.

pub mod analytics;
pub mod manager;
pub mod types;

pub use analytics::{decision_context, DecisionContext};
pub use manager::BankrollManager;
pub use types::{
    BankrollUpdate, LedgerData, LedgerError, PerformanceSummary, SizeRule, TradeRecord,
    TradeStatus, WIN_HISTORY_LIMIT,
};
