//! Portfolio manager: open-position tracking and OPEN/CLOSE determination.

use anyhow::Result;
use rust_decimal::Decimal;
use std::collections::BTreeSet;
use std::path::Path;
use tracing::info;

use crate::history::{append_trade_log, TradeLogRow};
use crate::portfolio::store::PositionStore;
use crate::portfolio::types::*;
use crate::types::VolatilityContext;

/// What an incoming directional signal should do to the book.
#[derive(Debug, Clone)]
pub enum TradeAction {
    /// No opposite-side position exists; the signal opens a new lot.
    Open,
    /// An opposite-side position exists; the signal closes it.
    Close(Position),
}

/// Manages open positions and realized P&L tracking.
///
/// Every read re-parses the backing file. This trades performance for
/// correctness under concurrent external writers; see the store module.
pub struct PortfolioManager {
    store: PositionStore,
}

impl PortfolioManager {
    pub fn new(store: PositionStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &PositionStore {
        &self.store
    }

    /// Load all open positions from the store.
    pub fn load_positions(&self) -> Result<Vec<Position>> {
        self.store.load()
    }

    /// Append a new position to the store.
    pub fn add_position(&self, position: &Position) -> Result<()> {
        self.store.append(position)?;
        info!(
            "Added position: {} {} ${} x{} @ ${}",
            position.symbol,
            position.side,
            position.strike.normalize(),
            position.contracts,
            position.entry_premium.normalize()
        );
        Ok(())
    }

    /// Remove a position from the store. A missing match is a logged no-op.
    pub fn remove_position(&self, position: &Position) -> Result<bool> {
        self.store.remove(&position.key())
    }

    /// Find an open position that a trade on (symbol, side) would close.
    pub fn find_position_to_close(
        &self,
        symbol: &str,
        side: OptionSide,
    ) -> Result<Option<Position>> {
        let positions = self.load_positions()?;
        for position in positions {
            if position.matches_close_criteria(symbol, side) {
                info!(
                    "Found position to close: {} {} ${} x{}",
                    position.symbol,
                    position.side,
                    position.strike.normalize(),
                    position.contracts
                );
                return Ok(Some(position));
            }
        }
        Ok(None)
    }

    /// Decide whether a new trade opens or closes. A CALL signal closes an
    /// open PUT and vice versa; same-side signals always open.
    pub fn determine_trade_action(&self, symbol: &str, side: OptionSide) -> Result<TradeAction> {
        match self.find_position_to_close(symbol, side)? {
            Some(position) => Ok(TradeAction::Close(position)),
            None => Ok(TradeAction::Open),
        }
    }

    /// Realized P&L for closing `position` at `exit_premium`.
    pub fn calculate_realized_pnl(&self, position: &Position, exit_premium: Decimal) -> Decimal {
        let pnl = calculate_realized_pnl(position, exit_premium);
        info!(
            "Calculated P&L: entry ${} -> exit ${} = ${} for {} contract(s)",
            position.entry_premium.normalize(),
            exit_premium.normalize(),
            pnl.normalize(),
            position.contracts
        );
        pnl
    }

    /// Append a completed trade to the trade-history audit log.
    pub fn log_realized_trade(
        &self,
        position: &Position,
        exit_premium: Decimal,
        realized_pnl: Decimal,
        trade_log_file: &Path,
        volatility: Option<&VolatilityContext>,
    ) -> Result<()> {
        let row = TradeLogRow {
            timestamp: Some(chrono::Utc::now()),
            symbol: position.symbol.clone(),
            decision: format!("CLOSE_{}", position.side),
            confidence: 1.0,
            strike: position.strike,
            premium: position.entry_premium,
            quantity: position.contracts,
            total_cost: position.total_cost(),
            reason: format!("Closing {} position", position.side),
            status: "CLOSED".to_string(),
            fill_price: Some(exit_premium),
            pnl_amount: Some(realized_pnl),
            volatility: volatility.cloned().unwrap_or_default(),
            ..Default::default()
        };
        append_trade_log(trade_log_file, &row)?;
        info!(
            "Logged realized trade: {} {} P&L: ${}",
            position.symbol,
            position.side,
            realized_pnl.normalize()
        );
        Ok(())
    }

    /// Aggregate counts over the open position set.
    pub fn get_positions_summary(&self) -> Result<PositionsSummary> {
        let positions = self.load_positions()?;
        let mut summary = PositionsSummary::default();
        let mut symbols = BTreeSet::new();
        for position in &positions {
            summary.total_positions += 1;
            match position.side {
                OptionSide::Call => summary.call_positions += 1,
                OptionSide::Put => summary.put_positions += 1,
            }
            summary.total_contracts += position.contracts;
            summary.total_premium_paid +=
                position.entry_premium * Decimal::from(position.contracts);
            symbols.insert(position.symbol.clone());
        }
        summary.symbols = symbols.into_iter().collect();
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::portfolio::schema::PositionSchema;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;
    use tempfile::TempDir;

    fn manager(dir: &TempDir) -> PortfolioManager {
        let store =
            PositionStore::open(dir.path().join("positions.csv"), PositionSchema::Legacy).unwrap();
        PortfolioManager::new(store)
    }

    fn position(symbol: &str, side: OptionSide) -> Position {
        Position::new(
            symbol,
            NaiveDate::from_ymd_opt(2025, 1, 3).unwrap(),
            dec!(628),
            side,
            1,
            dec!(1.42),
        )
    }

    #[test]
    fn test_same_side_signal_opens() {
        let dir = TempDir::new().unwrap();
        let portfolio = manager(&dir);
        portfolio
            .add_position(&position("SPY", OptionSide::Call))
            .unwrap();

        match portfolio
            .determine_trade_action("SPY", OptionSide::Call)
            .unwrap()
        {
            TradeAction::Open => {}
            TradeAction::Close(_) => panic!("same-side signal must never close"),
        }
    }

    #[test]
    fn test_opposite_side_signal_closes() {
        let dir = TempDir::new().unwrap();
        let portfolio = manager(&dir);
        portfolio
            .add_position(&position("SPY", OptionSide::Call))
            .unwrap();

        match portfolio
            .determine_trade_action("SPY", OptionSide::Put)
            .unwrap()
        {
            TradeAction::Close(found) => assert_eq!(found.side, OptionSide::Call),
            TradeAction::Open => panic!("opposite-side signal must close"),
        }
    }

    #[test]
    fn test_other_symbol_does_not_close() {
        let dir = TempDir::new().unwrap();
        let portfolio = manager(&dir);
        portfolio
            .add_position(&position("SPY", OptionSide::Call))
            .unwrap();
        assert!(matches!(
            portfolio
                .determine_trade_action("QQQ", OptionSide::Put)
                .unwrap(),
            TradeAction::Open
        ));
    }

    #[test]
    fn test_positions_summary() {
        let dir = TempDir::new().unwrap();
        let portfolio = manager(&dir);
        portfolio
            .add_position(&position("SPY", OptionSide::Call))
            .unwrap();
        let mut put = position("QQQ", OptionSide::Put);
        put.contracts = 2;
        put.entry_premium = dec!(2.00);
        portfolio.add_position(&put).unwrap();

        let summary = portfolio.get_positions_summary().unwrap();
        assert_eq!(summary.total_positions, 2);
        assert_eq!(summary.call_positions, 1);
        assert_eq!(summary.put_positions, 1);
        assert_eq!(summary.total_contracts, 3);
        assert_eq!(summary.total_premium_paid, dec!(5.42));
        assert_eq!(summary.symbols, vec!["QQQ".to_string(), "SPY".to_string()]);
    }

    #[test]
    fn test_log_realized_trade_appends() {
        let dir = TempDir::new().unwrap();
        let portfolio = manager(&dir);
        let pos = position("SPY", OptionSide::Call);
        let log = dir.path().join("logs").join("trade_history.csv");
        let pnl = portfolio.calculate_realized_pnl(&pos, dec!(1.83));
        portfolio
            .log_realized_trade(&pos, dec!(1.83), pnl, &log, None)
            .unwrap();

        let content = std::fs::read_to_string(&log).unwrap();
        assert!(content.contains("CLOSE_CALL"));
        assert!(content.contains("41"));
    }
}
