//! Interactive trade proposal and confirmation.

use anyhow::{bail, Result};
use chrono::NaiveDate;
use clap::Args;
use rust_decimal::Decimal;
use tracing::info;

use crate::bankroll::analytics;
use crate::cli::CommandContext;
use crate::confirm::{ProposalKind, TradeConfirmationManager, TradeProposal};
use crate::portfolio::{OptionSide, TradeAction};
use crate::traits::{
    AutoDetectDecisionSource, ConfirmationMethod, LogNotifier, NotificationDecisionSource,
    PromptDecisionSource,
};

#[derive(Args, Debug)]
pub struct ProposeArgs {
    /// Underlying symbol (e.g. SPY)
    symbol: String,

    /// Option side: CALL or PUT
    side: OptionSide,

    /// Strike price
    strike: Decimal,

    /// Expiration date (YYYY-MM-DD)
    #[arg(long)]
    expiry: NaiveDate,

    /// Estimated premium per contract
    #[arg(long)]
    premium: Decimal,

    /// Decision confidence in [0, 1]
    #[arg(long, default_value_t = 0.5)]
    confidence: f64,

    /// Why this trade is being proposed
    #[arg(long, default_value = "manual entry")]
    reason: String,

    /// Contracts to trade; sized from the risk budget when omitted
    #[arg(long)]
    quantity: Option<u32>,

    /// Start the external position monitor after an entry is recorded
    #[arg(long)]
    auto_monitor: bool,

    /// Decision acquisition method: prompt, notify, or auto
    #[arg(long, default_value = "prompt")]
    method: ConfirmationMethod,
}

pub fn execute(args: ProposeArgs, context: &CommandContext) -> Result<()> {
    let symbol = args.symbol.to_ascii_uppercase();
    let portfolio = context.portfolio_manager()?;
    let bankroll = context.bankroll_manager()?;

    let calibration = analytics::decision_context(
        &context.data_paths.trade_history_file(context.scope),
        crate::bankroll::WIN_HISTORY_LIMIT,
    );
    if calibration.total > 0 {
        info!(
            "Recent performance: {:.0}% wins over {} trades (streak {:+})",
            calibration.win_rate * 100.0,
            calibration.total,
            calibration.current_streak
        );
    }

    let action = portfolio.determine_trade_action(&symbol, args.side)?;
    let (kind, quantity, premium) = match action {
        TradeAction::Close(position) => {
            println!(
                "Signal closes open {} {} ${} x{}",
                position.symbol,
                position.side,
                position.strike.normalize(),
                position.contracts
            );
            let quantity = position.contracts;
            (ProposalKind::Close { position }, quantity, args.premium)
        }
        TradeAction::Open => {
            let quantity = match args.quantity {
                Some(quantity) => quantity,
                None => bankroll.calculate_position_size(
                    args.premium,
                    context.risk.risk_fraction,
                    context.risk.size_rule,
                    context.risk.fixed_qty,
                )?,
            };
            if quantity == 0 {
                bail!(
                    "Position sizing blocked the trade: ${} premium exceeds the risk budget",
                    args.premium.normalize()
                );
            }
            if !bankroll.validate_trade_risk(args.premium, quantity, context.risk.max_risk_pct)? {
                bail!(
                    "Trade risk exceeds the {}% limit",
                    context.risk.max_risk_pct.normalize()
                );
            }
            (ProposalKind::Open, quantity, args.premium)
        }
    };

    let proposal = TradeProposal {
        symbol,
        side: args.side,
        strike: args.strike,
        expiry: args.expiry,
        quantity,
        premium,
        confidence: args.confidence,
        reason: args.reason,
        kind,
    };

    let mut manager = TradeConfirmationManager::new(
        portfolio,
        bankroll,
        context.data_paths.trade_history_file(context.scope),
    )
    .with_notifier(Box::new(LogNotifier));

    manager.propose(proposal.clone());
    let decision = match args.method {
        ConfirmationMethod::Prompt => manager.get_user_decision(&mut PromptDecisionSource)?,
        ConfirmationMethod::Notification => manager.get_user_decision(
            &mut NotificationDecisionSource::new(Box::new(LogNotifier), PromptDecisionSource),
        )?,
        ConfirmationMethod::Auto => {
            manager.get_user_decision(&mut AutoDetectDecisionSource::new(PromptDecisionSource))?
        }
    };
    manager.record_trade_outcome(&proposal, &decision, args.auto_monitor)?;
    Ok(())
}
