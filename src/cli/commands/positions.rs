//! Open-positions listing.

use anyhow::Result;
use clap::Args;
use comfy_table::{presets::UTF8_FULL, Table};

use crate::cli::CommandContext;

#[derive(Args, Debug)]
pub struct PositionsArgs {
    /// Print the aggregate summary only
    #[arg(long)]
    summary: bool,
}

pub fn execute(args: PositionsArgs, context: &CommandContext) -> Result<()> {
    let portfolio = context.portfolio_manager()?;
    let positions = portfolio.load_positions()?;

    println!("\n📋 Open positions ({})\n", context.scope);

    if positions.is_empty() {
        println!("No open positions");
        return Ok(());
    }

    if !args.summary {
        let mut table = Table::new();
        table.load_preset(UTF8_FULL);
        table.set_header(vec![
            "Symbol", "Side", "Strike", "Expiry", "Qty", "Entry", "Cost", "Opened",
        ]);
        for position in &positions {
            table.add_row(vec![
                position.symbol.clone(),
                position.side.to_string(),
                format!("${}", position.strike.normalize()),
                position.expiry.format("%Y-%m-%d").to_string(),
                position.contracts.to_string(),
                format!("${:.2}", position.entry_premium),
                format!("${:.2}", position.total_cost()),
                position.entry_time.format("%Y-%m-%d %H:%M UTC").to_string(),
            ]);
        }
        println!("{table}");
    }

    let summary = portfolio.get_positions_summary()?;
    println!(
        "\n{} position(s): {} CALL / {} PUT · {} contract(s) · ${:.2} premium at risk",
        summary.total_positions,
        summary.call_positions,
        summary.put_positions,
        summary.total_contracts,
        summary.total_premium_paid
    );
    if !summary.symbols.is_empty() {
        println!("Symbols: {}", summary.symbols.join(", "));
    }
    Ok(())
}
