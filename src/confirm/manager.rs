//! Human-gated trade confirmation workflow.
//!
//! Bridges a decided signal to the ledger: nothing moves until a human (or
//! a relay acting for one) confirms submission. Notification and monitor
//! failures after the books are updated are logged, never rolled back; the
//! ledger is the source of truth, the side channels are best effort.

use anyhow::Result;
use chrono::Utc;
use rust_decimal::Decimal;
use std::path::PathBuf;
use tracing::{info, warn};

use crate::bankroll::{BankrollManager, TradeRecord, TradeStatus};
use crate::confirm::types::{parse_relayed_decision, Decision, ProposalKind, TradeProposal};
use crate::portfolio::{PortfolioManager, Position, CONTRACT_MULTIPLIER};
use crate::traits::{DecisionSource, MonitorLauncher, Notifier};
use crate::types::VolatilityContext;

pub struct TradeConfirmationManager {
    portfolio: PortfolioManager,
    bankroll: BankrollManager,
    trade_log: PathBuf,
    notifier: Option<Box<dyn Notifier>>,
    monitor: Option<Box<dyn MonitorLauncher>>,
    volatility: Option<VolatilityContext>,
    pending: Option<TradeProposal>,
}

impl TradeConfirmationManager {
    pub fn new(
        portfolio: PortfolioManager,
        bankroll: BankrollManager,
        trade_log: PathBuf,
    ) -> Self {
        Self {
            portfolio,
            bankroll,
            trade_log,
            notifier: None,
            monitor: None,
            volatility: None,
            pending: None,
        }
    }

    pub fn with_notifier(mut self, notifier: Box<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn with_monitor(mut self, monitor: Box<dyn MonitorLauncher>) -> Self {
        self.monitor = Some(monitor);
        self
    }

    /// Volatility context attached to close-side trade-log rows.
    pub fn set_volatility(&mut self, context: VolatilityContext) {
        self.volatility = Some(context);
    }

    pub fn pending(&self) -> Option<&TradeProposal> {
        self.pending.as_ref()
    }

    /// Stage a proposal for confirmation. An unresolved earlier proposal is
    /// replaced; only one trade is ever pending at a time.
    pub fn propose(&mut self, proposal: TradeProposal) {
        if let Some(old) = &self.pending {
            warn!(
                "Replacing unresolved pending proposal {} {} with {} {}",
                old.symbol, old.side, proposal.symbol, proposal.side
            );
        }
        info!(
            "Pending confirmation: {} {} ${} x{} @ ${}",
            proposal.symbol,
            proposal.side,
            proposal.strike.normalize(),
            proposal.quantity,
            proposal.premium.normalize()
        );
        self.pending = Some(proposal);
    }

    /// Block until `source` yields a decision for the pending proposal,
    /// re-asking on input outside the grammar.
    pub fn get_user_decision(&mut self, source: &mut dyn DecisionSource) -> Result<Decision> {
        let proposal = self
            .pending
            .clone()
            .ok_or_else(|| anyhow::anyhow!("No trade is pending confirmation"))?;
        loop {
            match source.acquire(&proposal)? {
                Some(decision) => return Ok(decision),
                None => warn!("Decision not understood; asking again"),
            }
        }
    }

    /// Resolve a pending proposal from relayed free text. Returns false
    /// (keeping the proposal pending) when the text is outside the decision
    /// grammar, so an unrelated message can never settle a trade.
    pub fn handle_relayed_message(&mut self, text: &str, auto_start_monitor: bool) -> Result<bool> {
        let Some(proposal) = self.pending.clone() else {
            warn!("Relayed decision ignored: no trade is pending");
            return Ok(false);
        };
        let Some(decision) = parse_relayed_decision(text) else {
            info!("Relayed text not a decision, still pending: {:?}", text);
            return Ok(false);
        };
        self.record_trade_outcome(&proposal, &decision, auto_start_monitor)?;
        Ok(true)
    }

    /// Apply a confirmed decision to the books and clear the pending slot.
    pub fn record_trade_outcome(
        &mut self,
        proposal: &TradeProposal,
        decision: &Decision,
        auto_start_monitor: bool,
    ) -> Result<()> {
        self.pending = None;
        match decision {
            Decision::Submitted { fill_price } => match &proposal.kind {
                ProposalKind::Open => self.record_open(proposal, *fill_price, auto_start_monitor),
                ProposalKind::Close { position } => {
                    self.record_close(proposal, position.clone(), *fill_price)
                }
            },
            Decision::Cancelled => self.record_cancellation(proposal),
        }
    }

    fn record_open(
        &mut self,
        proposal: &TradeProposal,
        fill_price: Option<Decimal>,
        auto_start_monitor: bool,
    ) -> Result<()> {
        let entry_premium = fill_price.unwrap_or(proposal.premium);
        let position_id = format!(
            "{}_{}_{}",
            proposal.symbol,
            proposal.strike.normalize(),
            Utc::now().timestamp()
        );

        let position = Position::new(
            &proposal.symbol,
            proposal.expiry,
            proposal.strike,
            proposal.side,
            proposal.quantity,
            entry_premium,
        );
        self.portfolio.add_position(&position)?;

        let estimated_cost =
            proposal.premium * Decimal::from(proposal.quantity) * CONTRACT_MULTIPLIER;
        self.bankroll.record_trade(TradeRecord {
            timestamp: Utc::now(),
            symbol: proposal.symbol.clone(),
            direction: proposal.side,
            strike: proposal.strike,
            expiry: Some(proposal.expiry),
            quantity: proposal.quantity,
            premium: proposal.premium,
            total_cost: estimated_cost,
            decision_confidence: proposal.confidence,
            reason: proposal.reason.clone(),
            realized_pnl: Decimal::ZERO,
            status: TradeStatus::Submitted,
            position_id: Some(position_id.clone()),
            fill_price,
        })?;

        // The estimate was debited above; reconcile to the true fill.
        if let Some(fill) = fill_price {
            if fill != proposal.premium {
                self.bankroll
                    .apply_fill(&position_id, fill, proposal.quantity)?;
            }
        }

        if auto_start_monitor {
            self.start_monitor(&proposal.symbol);
        }

        self.notify(&format!(
            "✅ Trade recorded: {} {} @ ${:.2} · Qty {}",
            proposal.side,
            proposal.strike.normalize(),
            entry_premium,
            proposal.quantity
        ));
        Ok(())
    }

    fn record_close(
        &mut self,
        proposal: &TradeProposal,
        position: Position,
        fill_price: Option<Decimal>,
    ) -> Result<()> {
        let exit_premium = fill_price.unwrap_or(proposal.premium);
        let realized_pnl = self.portfolio.calculate_realized_pnl(&position, exit_premium);

        self.portfolio.remove_position(&position)?;
        self.portfolio.log_realized_trade(
            &position,
            exit_premium,
            realized_pnl,
            &self.trade_log,
            self.volatility.as_ref(),
        )?;

        self.bankroll.record_trade(TradeRecord {
            timestamp: Utc::now(),
            symbol: position.symbol.clone(),
            direction: proposal.side,
            strike: position.strike,
            expiry: Some(position.expiry),
            quantity: position.contracts,
            premium: exit_premium,
            total_cost: position.total_cost(),
            decision_confidence: proposal.confidence,
            reason: proposal.reason.clone(),
            realized_pnl,
            status: TradeStatus::Closed,
            position_id: None,
            fill_price: Some(exit_premium),
        })?;
        self.bankroll
            .record_trade_outcome(realized_pnl > Decimal::ZERO)?;

        self.notify(&format!(
            "✅ Trade recorded: CLOSE_{} {} @ ${:.2} · Qty {} · P&L ${}",
            position.side,
            position.strike.normalize(),
            exit_premium,
            position.contracts,
            realized_pnl.normalize()
        ));
        Ok(())
    }

    fn record_cancellation(&mut self, proposal: &TradeProposal) -> Result<()> {
        self.bankroll.record_trade(TradeRecord {
            timestamp: Utc::now(),
            symbol: proposal.symbol.clone(),
            direction: proposal.side,
            strike: proposal.strike,
            expiry: Some(proposal.expiry),
            quantity: proposal.quantity,
            premium: proposal.premium,
            total_cost: Decimal::ZERO,
            decision_confidence: proposal.confidence,
            reason: proposal.reason.clone(),
            realized_pnl: Decimal::ZERO,
            status: TradeStatus::Cancelled,
            position_id: None,
            fill_price: None,
        })?;
        self.notify(&format!(
            "❌ Trade cancelled: {} {}",
            proposal.side,
            proposal.strike.normalize()
        ));
        Ok(())
    }

    fn start_monitor(&mut self, symbol: &str) {
        let Some(monitor) = self.monitor.as_mut() else {
            return;
        };
        match monitor.ensure_running(symbol) {
            Ok(true) => info!("Position monitor running for {}", symbol),
            Ok(false) => warn!("Position monitor did not confirm startup for {}", symbol),
            Err(err) => warn!("Failed to start position monitor for {}: {:#}", symbol, err),
        }
    }

    fn notify(&mut self, message: &str) {
        if let Some(notifier) = self.notifier.as_mut() {
            if let Err(err) = notifier.send(message) {
                warn!("Notification failed: {:#}", err);
            }
        }
    }
}
