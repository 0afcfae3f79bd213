//! Bankroll manager: the single source of truth for account balance.
//!
//! All balance motion funnels through one signed-delta primitive that also
//! maintains the peak/drawdown watermarks, so the trade, manual-adjustment,
//! and fill-correction paths cannot drift apart. Persistence failures
//! propagate: an inconsistent balance is worse than a visible crash.

use anyhow::{Context, Result};
use chrono::Utc;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::bankroll::types::*;
use crate::portfolio::CONTRACT_MULTIPLIER;

/// Column order of the append-only fill-adjustment audit file.
pub const ADJUSTMENT_COLUMNS: &[&str] = &[
    "timestamp",
    "position_id",
    "delta",
    "new_bankroll",
    "action",
    "fill_price",
];

/// Manages the scoped ledger file with risk controls and persistence.
pub struct BankrollManager {
    ledger_path: PathBuf,
    adjustments_path: PathBuf,
    start_capital: Decimal,
}

impl BankrollManager {
    /// Open the ledger for one scope, seeding the file with `start_capital`
    /// only if it does not already exist. An existing file is authoritative
    /// regardless of the value passed here.
    pub fn open(
        ledger_path: impl AsRef<Path>,
        adjustments_path: impl AsRef<Path>,
        start_capital: Decimal,
    ) -> Result<Self> {
        let manager = Self {
            ledger_path: ledger_path.as_ref().to_path_buf(),
            adjustments_path: adjustments_path.as_ref().to_path_buf(),
            start_capital,
        };
        if !manager.ledger_path.exists() {
            manager.save(&mut LedgerData::new(start_capital))?;
            info!(
                "Created new ledger with ${} at {}",
                start_capital.normalize(),
                manager.ledger_path.display()
            );
        }
        Ok(manager)
    }

    pub fn ledger_path(&self) -> &Path {
        &self.ledger_path
    }

    fn load(&self) -> Result<LedgerData> {
        if !self.ledger_path.exists() {
            // The file existed at construction; its disappearance means the
            // balance can no longer be trusted.
            return Err(LedgerError::MissingLedger(
                self.ledger_path.display().to_string(),
            )
            .into());
        }
        let content = std::fs::read_to_string(&self.ledger_path)
            .context("Failed to read ledger file")?;
        serde_json::from_str(&content).context("Failed to parse ledger file")
    }

    fn save(&self, data: &mut LedgerData) -> Result<()> {
        data.last_updated = Utc::now();
        if let Some(parent) = self.ledger_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).context("Failed to create ledger directory")?;
            }
        }
        let json = serde_json::to_string_pretty(data).context("Failed to serialize ledger")?;
        // Write-then-rename keeps a crashed write from truncating the ledger.
        let temp_path = self.ledger_path.with_extension("tmp");
        std::fs::write(&temp_path, json).context("Failed to write ledger temp file")?;
        std::fs::rename(&temp_path, &self.ledger_path).context("Failed to rename ledger file")?;
        Ok(())
    }

    /// Move the balance by `delta` and maintain the peak/drawdown
    /// watermarks. The single canonical mutation primitive.
    fn apply_cash_delta(data: &mut LedgerData, delta: Decimal) {
        data.current_bankroll += delta;
        if data.current_bankroll > data.peak_bankroll {
            data.peak_bankroll = data.current_bankroll;
        }
        if data.peak_bankroll > Decimal::ZERO {
            let drawdown = (data.peak_bankroll - data.current_bankroll) / data.peak_bankroll
                * Decimal::ONE_HUNDRED;
            if drawdown > data.max_drawdown {
                data.max_drawdown = drawdown;
            }
        }
    }

    pub fn get_current_bankroll(&self) -> Result<Decimal> {
        Ok(self.load()?.current_bankroll)
    }

    pub fn get_bankroll_stats(&self) -> Result<LedgerData> {
        self.load()
    }

    /// Number of contracts to trade under the configured sizing policy.
    ///
    /// `FixedQty` blocks the trade entirely (returns 0) when the fixed
    /// quantity would exceed the risk budget; `DynamicQty` never sizes below
    /// one contract.
    pub fn calculate_position_size(
        &self,
        premium: Decimal,
        risk_fraction: Decimal,
        size_rule: SizeRule,
        fixed_qty: u32,
    ) -> Result<u32> {
        let bankroll = self.get_current_bankroll()?;
        let max_risk = bankroll * risk_fraction;
        let per_contract = premium * CONTRACT_MULTIPLIER;

        match size_rule {
            SizeRule::FixedQty => {
                let total_risk = per_contract * Decimal::from(fixed_qty);
                if total_risk > max_risk {
                    warn!(
                        "Fixed quantity ${} exceeds risk limit ${}; blocking trade",
                        total_risk.normalize(),
                        max_risk.normalize()
                    );
                    return Ok(0);
                }
                Ok(fixed_qty)
            }
            SizeRule::DynamicQty => {
                if per_contract <= Decimal::ZERO {
                    return Ok(1);
                }
                let raw = (max_risk / per_contract).floor();
                let contracts = raw.to_u32().unwrap_or(0);
                Ok(contracts.max(1))
            }
        }
    }

    /// True when `premium × quantity × 100` stays within `max_risk_pct`% of
    /// the current balance.
    pub fn validate_trade_risk(
        &self,
        premium: Decimal,
        quantity: u32,
        max_risk_pct: Decimal,
    ) -> Result<bool> {
        let bankroll = self.get_current_bankroll()?;
        if bankroll <= Decimal::ZERO {
            return Ok(false);
        }
        let total_risk = premium * Decimal::from(quantity) * CONTRACT_MULTIPLIER;
        let risk_pct = total_risk / bankroll * Decimal::ONE_HUNDRED;
        if risk_pct > max_risk_pct {
            warn!(
                "Trade risk {:.1}% exceeds limit {}%",
                risk_pct.to_f64().unwrap_or(0.0),
                max_risk_pct.normalize()
            );
            return Ok(false);
        }
        Ok(true)
    }

    /// Append a trade to the ledger history and settle its cash effect.
    ///
    /// The cash delta follows the record's status: a SUBMITTED entry debits
    /// its full cost, a CLOSED entry credits the full exit proceeds while
    /// folding realized P&L into the cumulative totals, an OPEN entry with a
    /// nonzero realized P&L applies it directly, and CANCELLED moves
    /// nothing.
    pub fn record_trade(&self, record: TradeRecord) -> Result<LedgerData> {
        let mut data = self.load()?;

        let cash_delta = match record.status {
            TradeStatus::Submitted => -record.total_cost,
            TradeStatus::Closed => record
                .fill_price
                .map(|fill| fill * Decimal::from(record.quantity) * CONTRACT_MULTIPLIER)
                .unwrap_or(record.realized_pnl),
            TradeStatus::Open => record.realized_pnl,
            TradeStatus::Cancelled => Decimal::ZERO,
        };

        if !record.realized_pnl.is_zero() {
            data.total_pnl += record.realized_pnl;
            if record.realized_pnl > Decimal::ZERO {
                data.winning_trades += 1;
            }
        }
        if !cash_delta.is_zero() {
            Self::apply_cash_delta(&mut data, cash_delta);
        }

        data.total_trades += 1;
        info!(
            "Recorded trade: {} {} ({:?}), cash delta ${}",
            record.direction,
            record.symbol,
            record.status,
            cash_delta.normalize()
        );
        data.trade_history.push(record);
        self.save(&mut data)?;
        Ok(data)
    }

    /// Manual override path: set the balance to `new_amount` and append an
    /// adjustment audit record (kept apart from trade history).
    pub fn update_bankroll(&self, new_amount: Decimal, reason: &str) -> Result<LedgerData> {
        let mut data = self.load()?;
        let old_amount = data.current_bankroll;
        let change = new_amount - old_amount;

        Self::apply_cash_delta(&mut data, change);
        data.total_pnl += change;
        data.bankroll_updates.push(BankrollUpdate {
            timestamp: Utc::now(),
            old_amount,
            new_amount,
            change,
            reason: reason.to_string(),
        });
        self.save(&mut data)?;
        info!(
            "Updated bankroll: ${} -> ${} ({})",
            old_amount.normalize(),
            new_amount.normalize(),
            reason
        );
        Ok(data)
    }

    /// Replace an estimated premium with the true fill: locate the history
    /// entry by position id, re-cost it, adjust the balance by the
    /// difference, and append an undo record to the adjustment CSV so the
    /// correction is independently reconstructable.
    pub fn apply_fill(
        &self,
        position_id: &str,
        fill_price: Decimal,
        contracts: u32,
    ) -> Result<Option<LedgerData>> {
        let mut data = self.load()?;
        let Some(entry) = data
            .trade_history
            .iter_mut()
            .rev()
            .find(|t| t.position_id.as_deref() == Some(position_id))
        else {
            warn!("No trade found for position id {}; fill not applied", position_id);
            return Ok(None);
        };

        let old_cost = entry.total_cost;
        let new_cost = fill_price * Decimal::from(contracts) * CONTRACT_MULTIPLIER;
        let delta = old_cost - new_cost;
        entry.premium = fill_price;
        entry.fill_price = Some(fill_price);
        entry.total_cost = new_cost;

        Self::apply_cash_delta(&mut data, delta);
        self.save(&mut data)?;
        self.append_adjustment(position_id, delta, data.current_bankroll, fill_price)?;
        info!(
            "Applied fill for {}: cost ${} -> ${}, balance delta ${}",
            position_id,
            old_cost.normalize(),
            new_cost.normalize(),
            delta.normalize()
        );
        Ok(Some(data))
    }

    fn append_adjustment(
        &self,
        position_id: &str,
        delta: Decimal,
        new_bankroll: Decimal,
        fill_price: Decimal,
    ) -> Result<()> {
        if let Some(parent) = self.adjustments_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .context("Failed to create adjustments directory")?;
            }
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.adjustments_path)
            .context("Failed to open adjustments file")?;
        let need_header = file.metadata()?.len() == 0;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        if need_header {
            writer.write_record(ADJUSTMENT_COLUMNS)?;
        }
        writer.write_record([
            Utc::now().to_rfc3339(),
            position_id.to_string(),
            delta.normalize().to_string(),
            new_bankroll.normalize().to_string(),
            "apply_fill".to_string(),
            fill_price.normalize().to_string(),
        ])?;
        writer.flush().context("Failed to append adjustment row")?;
        Ok(())
    }

    /// The rolling win/loss window, most recent last.
    pub fn get_win_history(&self, last_n: usize) -> Result<Vec<bool>> {
        let data = self.load()?;
        let history = &data.win_loss_history;
        let start = history.len().saturating_sub(last_n);
        Ok(history[start..].to_vec())
    }

    /// Append one outcome to the bounded window, evicting the oldest entry
    /// past WIN_HISTORY_LIMIT.
    pub fn record_trade_outcome(&self, is_win: bool) -> Result<()> {
        let mut data = self.load()?;
        data.win_loss_history.push(is_win);
        if data.win_loss_history.len() > WIN_HISTORY_LIMIT {
            let excess = data.win_loss_history.len() - WIN_HISTORY_LIMIT;
            data.win_loss_history.drain(0..excess);
        }
        let wins = data.win_loss_history.iter().filter(|w| **w).count();
        let total = data.win_loss_history.len();
        self.save(&mut data)?;
        info!(
            "Recorded trade outcome: {} ({}/{} recent wins)",
            if is_win { "WIN" } else { "LOSS" },
            wins,
            total
        );
        Ok(())
    }

    pub fn get_performance_summary(&self) -> Result<PerformanceSummary> {
        let data = self.load()?;
        let win_rate_pct = if data.total_trades > 0 {
            Decimal::from(data.winning_trades) / Decimal::from(data.total_trades)
                * Decimal::ONE_HUNDRED
        } else {
            Decimal::ZERO
        };
        let total_return_pct = if data.start_capital > Decimal::ZERO {
            data.total_pnl / data.start_capital * Decimal::ONE_HUNDRED
        } else {
            Decimal::ZERO
        };
        Ok(PerformanceSummary {
            current_bankroll: data.current_bankroll,
            start_capital: data.start_capital,
            total_pnl: data.total_pnl,
            total_return_pct,
            total_trades: data.total_trades,
            winning_trades: data.winning_trades,
            win_rate_pct,
            max_drawdown_pct: data.max_drawdown,
            peak_bankroll: data.peak_bankroll,
        })
    }

    /// Destructive reinitialization to a fresh ledger. Defaults to the
    /// originally configured starting capital.
    pub fn reset_bankroll(&self, new_start_capital: Option<Decimal>) -> Result<LedgerData> {
        let start = new_start_capital.unwrap_or(self.start_capital);
        let mut data = LedgerData::new(start);
        self.save(&mut data)?;
        warn!("Bankroll reset to ${}", start.normalize());
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::portfolio::OptionSide;
    use rust_decimal_macros::dec;
    use tempfile::TempDir;

    fn manager_with(dir: &TempDir, start: Decimal) -> BankrollManager {
        BankrollManager::open(
            dir.path().join("bankroll_robinhood_live.json"),
            dir.path().join("logs").join("bankroll_adjustments.csv"),
            start,
        )
        .unwrap()
    }

    fn record(status: TradeStatus) -> TradeRecord {
        TradeRecord {
            timestamp: Utc::now(),
            symbol: "SPY".to_string(),
            direction: OptionSide::Call,
            strike: dec!(628),
            expiry: None,
            quantity: 1,
            premium: dec!(1.42),
            total_cost: dec!(142),
            decision_confidence: 0.65,
            reason: "breakout".to_string(),
            realized_pnl: Decimal::ZERO,
            status,
            position_id: Some("SPY_628_t0".to_string()),
            fill_price: None,
        }
    }

    #[test]
    fn test_seeding_is_idempotent() {
        let dir = TempDir::new().unwrap();
        {
            let manager = manager_with(&dir, dec!(500));
            assert_eq!(manager.get_current_bankroll().unwrap(), dec!(500));
            manager.record_trade(record(TradeStatus::Submitted)).unwrap();
        }
        // Reconstruction with a different start capital must not re-seed.
        let manager = manager_with(&dir, dec!(9999));
        let stats = manager.get_bankroll_stats().unwrap();
        assert_eq!(stats.start_capital, dec!(500));
        assert_eq!(stats.current_bankroll, dec!(358));
    }

    #[test]
    fn test_missing_ledger_after_construction_errors() {
        let dir = TempDir::new().unwrap();
        let manager = manager_with(&dir, dec!(500));
        std::fs::remove_file(manager.ledger_path()).unwrap();
        assert!(manager.get_current_bankroll().is_err());
    }

    #[test]
    fn test_open_then_close_scenario() {
        let dir = TempDir::new().unwrap();
        let manager = manager_with(&dir, dec!(500));

        // OPEN 1 SPY CALL 628 @ $1.42, confirmed SUBMITTED.
        manager.record_trade(record(TradeStatus::Submitted)).unwrap();
        assert_eq!(manager.get_current_bankroll().unwrap(), dec!(358));

        // CLOSE at exit premium $1.83: full proceeds credited, P&L +$41.
        let mut close = record(TradeStatus::Closed);
        close.realized_pnl = dec!(41);
        close.fill_price = Some(dec!(1.83));
        let data = manager.record_trade(close).unwrap();
        assert_eq!(data.current_bankroll, dec!(541.00));
        assert_eq!(data.total_pnl, dec!(41));
        assert_eq!(data.winning_trades, 1);
        assert_eq!(data.total_trades, 2);
    }

    #[test]
    fn test_cancelled_trade_leaves_ledger_untouched() {
        let dir = TempDir::new().unwrap();
        let manager = manager_with(&dir, dec!(500));
        let mut cancelled = record(TradeStatus::Cancelled);
        cancelled.total_cost = Decimal::ZERO;
        let data = manager.record_trade(cancelled).unwrap();
        assert_eq!(data.current_bankroll, dec!(500));
        assert_eq!(data.total_trades, 1);
        assert_eq!(data.trade_history.len(), 1);
    }

    #[test]
    fn test_peak_and_drawdown_are_monotonic() {
        let dir = TempDir::new().unwrap();
        let manager = manager_with(&dir, dec!(500));

        manager.record_trade(record(TradeStatus::Submitted)).unwrap();
        let after_open = manager.get_bankroll_stats().unwrap();
        assert_eq!(after_open.peak_bankroll, dec!(500));
        // (500 - 358) / 500 = 28.4%
        assert_eq!(after_open.max_drawdown, dec!(28.4));

        let mut close = record(TradeStatus::Closed);
        close.realized_pnl = dec!(41);
        close.fill_price = Some(dec!(1.83));
        let after_close = manager.record_trade(close).unwrap();
        assert_eq!(after_close.peak_bankroll, dec!(541.00));
        // Drawdown never decreases even though balance recovered.
        assert_eq!(after_close.max_drawdown, dec!(28.4));
    }

    #[test]
    fn test_fixed_qty_sizing_blocks_over_risk() {
        let dir = TempDir::new().unwrap();
        let manager = manager_with(&dir, dec!(100));
        // 2 contracts at $30 premium = $6000 risk against a $50 budget.
        let qty = manager
            .calculate_position_size(dec!(30.0), dec!(0.5), SizeRule::FixedQty, 2)
            .unwrap();
        assert_eq!(qty, 0);
        // A cheap contract within budget passes through unchanged.
        let qty = manager
            .calculate_position_size(dec!(0.20), dec!(0.5), SizeRule::FixedQty, 2)
            .unwrap();
        assert_eq!(qty, 2);
    }

    #[test]
    fn test_dynamic_sizing_floors_to_one() {
        let dir = TempDir::new().unwrap();
        let manager = manager_with(&dir, dec!(100));
        // $50 budget / $60 per contract = 0.83 -> floored to the 1 minimum.
        let qty = manager
            .calculate_position_size(dec!(0.60), dec!(0.5), SizeRule::DynamicQty, 1)
            .unwrap();
        assert_eq!(qty, 1);
        // $50 budget / $20 per contract = 2.5 -> 2 contracts.
        let qty = manager
            .calculate_position_size(dec!(0.20), dec!(0.5), SizeRule::DynamicQty, 1)
            .unwrap();
        assert_eq!(qty, 2);
    }

    #[test]
    fn test_validate_trade_risk() {
        let dir = TempDir::new().unwrap();
        let manager = manager_with(&dir, dec!(500));
        assert!(manager
            .validate_trade_risk(dec!(1.42), 1, dec!(50))
            .unwrap());
        assert!(!manager
            .validate_trade_risk(dec!(3.00), 1, dec!(50))
            .unwrap());
    }

    #[test]
    fn test_win_history_is_bounded_fifo() {
        let dir = TempDir::new().unwrap();
        let manager = manager_with(&dir, dec!(500));
        for i in 0..25 {
            manager.record_trade_outcome(i % 2 == 0).unwrap();
        }
        let history = manager.get_win_history(WIN_HISTORY_LIMIT).unwrap();
        assert_eq!(history.len(), WIN_HISTORY_LIMIT);
        // Entries 5..25 survive; entry 5 is a loss (odd index), entry 24 a win.
        assert!(!history[0]);
        assert!(*history.last().unwrap());
    }

    #[test]
    fn test_update_bankroll_records_audit_entry() {
        let dir = TempDir::new().unwrap();
        let manager = manager_with(&dir, dec!(500));
        let data = manager
            .update_bankroll(dec!(650), "Broker statement reconciliation")
            .unwrap();
        assert_eq!(data.current_bankroll, dec!(650));
        assert_eq!(data.total_pnl, dec!(150));
        assert_eq!(data.peak_bankroll, dec!(650));
        assert_eq!(data.bankroll_updates.len(), 1);
        assert_eq!(data.bankroll_updates[0].change, dec!(150));
        assert!(data.trade_history.is_empty());
    }

    #[test]
    fn test_apply_fill_adjusts_by_difference_and_audits() {
        let dir = TempDir::new().unwrap();
        let manager = manager_with(&dir, dec!(500));
        manager.record_trade(record(TradeStatus::Submitted)).unwrap();
        assert_eq!(manager.get_current_bankroll().unwrap(), dec!(358));

        // True fill was $1.28, not the $1.42 estimate: refund the $14.
        let data = manager
            .apply_fill("SPY_628_t0", dec!(1.28), 1)
            .unwrap()
            .unwrap();
        assert_eq!(data.current_bankroll, dec!(372));
        let entry = data.trade_history.last().unwrap();
        assert_eq!(entry.total_cost, dec!(128));
        assert_eq!(entry.fill_price, Some(dec!(1.28)));

        let audit = std::fs::read_to_string(
            dir.path().join("logs").join("bankroll_adjustments.csv"),
        )
        .unwrap();
        assert!(audit.starts_with("timestamp,position_id,delta,new_bankroll,action,fill_price"));
        assert!(audit.contains("SPY_628_t0"));
        assert!(audit.contains("apply_fill"));
    }

    #[test]
    fn test_apply_fill_unknown_position_is_noop() {
        let dir = TempDir::new().unwrap();
        let manager = manager_with(&dir, dec!(500));
        assert!(manager
            .apply_fill("GHOST_1_t0", dec!(1.00), 1)
            .unwrap()
            .is_none());
        assert_eq!(manager.get_current_bankroll().unwrap(), dec!(500));
    }

    #[test]
    fn test_reset_bankroll() {
        let dir = TempDir::new().unwrap();
        let manager = manager_with(&dir, dec!(500));
        manager.record_trade(record(TradeStatus::Submitted)).unwrap();
        let data = manager.reset_bankroll(None).unwrap();
        assert_eq!(data.current_bankroll, dec!(500));
        assert_eq!(data.total_trades, 0);
        assert!(data.trade_history.is_empty());

        let data = manager.reset_bankroll(Some(dec!(1000))).unwrap();
        assert_eq!(data.start_capital, dec!(1000));
    }
}
