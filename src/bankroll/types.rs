//! Ledger type definitions and domain errors.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::portfolio::OptionSide;

/// Bound on the rolling win/loss window kept for confidence calibration.
pub const WIN_HISTORY_LIMIT: usize = 20;

/// Ledger domain errors
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("Unknown size rule: {0}")]
    UnknownSizeRule(String),

    #[error("Ledger file missing after construction: {0}")]
    MissingLedger(String),
}

/// Position sizing policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SizeRule {
    /// Trade the configured fixed quantity, or nothing at all when it would
    /// exceed the risk budget.
    FixedQty,
    /// Size from the risk budget, floored to a minimum of one contract.
    DynamicQty,
}

impl fmt::Display for SizeRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SizeRule::FixedQty => f.write_str("fixed-qty"),
            SizeRule::DynamicQty => f.write_str("dynamic-qty"),
        }
    }
}

impl FromStr for SizeRule {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fixed-qty" => Ok(SizeRule::FixedQty),
            "dynamic-qty" => Ok(SizeRule::DynamicQty),
            other => Err(LedgerError::UnknownSizeRule(other.to_string())),
        }
    }
}

/// Lifecycle status of a ledger trade record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeStatus {
    Open,
    Closed,
    Submitted,
    Cancelled,
}

/// Immutable entry in the ledger's trade history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    pub timestamp: DateTime<Utc>,
    pub symbol: String,
    pub direction: OptionSide,
    pub strike: Decimal,
    pub expiry: Option<NaiveDate>,
    pub quantity: u32,
    pub premium: Decimal,
    pub total_cost: Decimal,
    pub decision_confidence: f64,
    pub reason: String,
    /// Zero until the position closes.
    pub realized_pnl: Decimal,
    pub status: TradeStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fill_price: Option<Decimal>,
}

/// Audit entry for a manual bankroll adjustment. Kept apart from the trade
/// history because it is not a trade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BankrollUpdate {
    pub timestamp: DateTime<Utc>,
    pub old_amount: Decimal,
    pub new_amount: Decimal,
    pub change: Decimal,
    pub reason: String,
}

/// The persisted ledger for one (broker, environment) scope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerData {
    pub current_bankroll: Decimal,
    /// Seeded once at file creation; immutable across restarts even when
    /// the configured value changes.
    pub start_capital: Decimal,
    pub total_trades: u32,
    pub winning_trades: u32,
    pub total_pnl: Decimal,
    /// Maximum observed (peak − current) / peak, as a percentage. Never
    /// decreases.
    pub max_drawdown: Decimal,
    /// Monotonically non-decreasing high-water mark.
    pub peak_bankroll: Decimal,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    pub trade_history: Vec<TradeRecord>,
    /// Most recent WIN_HISTORY_LIMIT outcomes, oldest evicted first.
    #[serde(default)]
    pub win_loss_history: Vec<bool>,
    #[serde(default)]
    pub bankroll_updates: Vec<BankrollUpdate>,
}

impl LedgerData {
    pub fn new(start_capital: Decimal) -> Self {
        let now = Utc::now();
        Self {
            current_bankroll: start_capital,
            start_capital,
            total_trades: 0,
            winning_trades: 0,
            total_pnl: Decimal::ZERO,
            max_drawdown: Decimal::ZERO,
            peak_bankroll: start_capital,
            created_at: now,
            last_updated: now,
            trade_history: Vec::new(),
            win_loss_history: Vec::new(),
            bankroll_updates: Vec::new(),
        }
    }
}

/// Reporting projection over the ledger.
#[derive(Debug, Clone, Serialize)]
pub struct PerformanceSummary {
    pub current_bankroll: Decimal,
    pub start_capital: Decimal,
    pub total_pnl: Decimal,
    pub total_return_pct: Decimal,
    pub total_trades: u32,
    pub winning_trades: u32,
    pub win_rate_pct: Decimal,
    pub max_drawdown_pct: Decimal,
    pub peak_bankroll: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_size_rule_parsing() {
        assert_eq!("fixed-qty".parse::<SizeRule>().unwrap(), SizeRule::FixedQty);
        assert_eq!(
            "Dynamic-Qty".parse::<SizeRule>().unwrap(),
            SizeRule::DynamicQty
        );
        assert!(matches!(
            "martingale".parse::<SizeRule>(),
            Err(LedgerError::UnknownSizeRule(_))
        ));
    }

    #[test]
    fn test_fresh_ledger_state() {
        let ledger = LedgerData::new(dec!(500));
        assert_eq!(ledger.current_bankroll, dec!(500));
        assert_eq!(ledger.peak_bankroll, dec!(500));
        assert_eq!(ledger.max_drawdown, Decimal::ZERO);
        assert!(ledger.trade_history.is_empty());
    }
}
