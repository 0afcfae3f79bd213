//! Direct recording of an already-confirmed trade.
//!
//! The non-interactive path for when the order was placed out of band and
//! only the bookkeeping remains. Open-versus-close is still determined from
//! the current book, exactly as in the interactive flow.

use anyhow::Result;
use chrono::NaiveDate;
use clap::Args;
use rust_decimal::Decimal;

use crate::cli::CommandContext;
use crate::confirm::{Decision, ProposalKind, TradeConfirmationManager, TradeProposal};
use crate::portfolio::{OptionSide, TradeAction};
use crate::traits::LogNotifier;

#[derive(Args, Debug)]
pub struct RecordArgs {
    /// Underlying symbol (e.g. SPY)
    symbol: String,

    /// Option side: CALL or PUT
    side: OptionSide,

    /// Strike price
    strike: Decimal,

    /// Expiration date (YYYY-MM-DD)
    #[arg(long)]
    expiry: NaiveDate,

    /// Premium per contract as estimated at submission
    #[arg(long)]
    premium: Decimal,

    /// Contracts traded
    #[arg(long, default_value_t = 1)]
    quantity: u32,

    /// Actual fill price, when it differed from the estimate
    #[arg(long)]
    fill: Option<Decimal>,

    /// Record the trade as cancelled instead of submitted
    #[arg(long)]
    cancelled: bool,

    /// Why the trade was taken
    #[arg(long, default_value = "recorded out of band")]
    reason: String,
}

pub fn execute(args: RecordArgs, context: &CommandContext) -> Result<()> {
    let symbol = args.symbol.to_ascii_uppercase();
    let portfolio = context.portfolio_manager()?;
    let bankroll = context.bankroll_manager()?;

    let (kind, quantity) = match portfolio.determine_trade_action(&symbol, args.side)? {
        TradeAction::Close(position) => {
            let quantity = position.contracts;
            (ProposalKind::Close { position }, quantity)
        }
        TradeAction::Open => (ProposalKind::Open, args.quantity),
    };

    let proposal = TradeProposal {
        symbol,
        side: args.side,
        strike: args.strike,
        expiry: args.expiry,
        quantity,
        premium: args.premium,
        confidence: 1.0,
        reason: args.reason,
        kind,
    };
    let decision = if args.cancelled {
        Decision::Cancelled
    } else {
        Decision::Submitted {
            fill_price: args.fill,
        }
    };

    let mut manager = TradeConfirmationManager::new(
        portfolio,
        bankroll,
        context.data_paths.trade_history_file(context.scope),
    )
    .with_notifier(Box::new(LogNotifier));
    manager.record_trade_outcome(&proposal, &decision, false)?;

    let bankroll = context.bankroll_manager()?;
    println!(
        "Bankroll: ${:.2}",
        bankroll.get_current_bankroll()?
    );
    Ok(())
}
