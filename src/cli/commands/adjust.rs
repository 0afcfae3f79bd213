//! Manual bankroll adjustment.

use anyhow::Result;
use clap::Args;
use rust_decimal::Decimal;

use crate::cli::CommandContext;

#[derive(Args, Debug)]
pub struct AdjustArgs {
    /// New bankroll balance
    amount: Decimal,

    /// Why the balance is being overridden
    #[arg(long, default_value = "manual adjustment")]
    reason: String,
}

pub fn execute(args: AdjustArgs, context: &CommandContext) -> Result<()> {
    let bankroll = context.bankroll_manager()?;
    let before = bankroll.get_current_bankroll()?;
    let data = bankroll.update_bankroll(args.amount, &args.reason)?;
    println!(
        "Bankroll adjusted: ${:.2} -> ${:.2} ({:+.2})",
        before,
        data.current_bankroll,
        data.current_bankroll - before
    );
    Ok(())
}
