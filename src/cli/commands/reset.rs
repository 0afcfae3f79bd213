//! Destructive ledger reset.

use anyhow::{bail, Result};
use clap::Args;
use rust_decimal::Decimal;

use crate::cli::CommandContext;

#[derive(Args, Debug)]
pub struct ResetArgs {
    /// Starting capital for the fresh ledger; defaults to the configured value
    #[arg(long)]
    start_capital: Option<Decimal>,

    /// Required acknowledgement that history will be discarded
    #[arg(long)]
    confirm: bool,
}

pub fn execute(args: ResetArgs, context: &CommandContext) -> Result<()> {
    if !args.confirm {
        bail!("Reset discards all trade history; re-run with --confirm");
    }
    let bankroll = context.bankroll_manager()?;
    let data = bankroll.reset_bankroll(args.start_capital)?;
    println!(
        "Ledger {} reset to ${:.2}",
        context.scope, data.current_bankroll
    );
    Ok(())
}
