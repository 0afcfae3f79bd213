//! Ledger status and performance summary.

use anyhow::Result;
use clap::Args;
use comfy_table::{presets::UTF8_FULL, Cell, Table};
use owo_colors::OwoColorize;
use rust_decimal::Decimal;

use crate::bankroll::{analytics, BankrollManager, PerformanceSummary};
use crate::cli::CommandContext;
use crate::config::Scope;

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Show every scope with a ledger on disk, not just the selected one
    #[arg(long)]
    all: bool,

    /// Include the recent win/loss window
    #[arg(long)]
    win_history: bool,
}

pub fn execute(args: StatusArgs, context: &CommandContext) -> Result<()> {
    let scopes = if args.all {
        context.data_paths.discover_scopes()?
    } else {
        vec![context.scope]
    };

    if scopes.is_empty() {
        println!("No ledgers found under {}", context.data_paths.root().display());
        return Ok(());
    }

    for scope in scopes {
        let manager = BankrollManager::open(
            context.data_paths.bankroll_file(scope),
            context.data_paths.adjustments_file(scope),
            context.risk.start_capital,
        )?;
        print_scope_status(scope, &manager, args.win_history)?;
    }
    Ok(())
}

fn print_scope_status(scope: Scope, manager: &BankrollManager, win_history: bool) -> Result<()> {
    let summary = manager.get_performance_summary()?;

    println!("\n📒 Ledger: {}\n", scope.to_string().bold());

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Metric", "Value"]);
    table.add_row(vec![
        Cell::new("Bankroll"),
        Cell::new(format!("${:.2}", summary.current_bankroll)),
    ]);
    table.add_row(vec![
        Cell::new("Start capital"),
        Cell::new(format!("${:.2}", summary.start_capital)),
    ]);
    table.add_row(vec![
        Cell::new("Total P&L"),
        Cell::new(colored_amount(summary.total_pnl)),
    ]);
    table.add_row(vec![
        Cell::new("Total return"),
        Cell::new(format!("{:.1}%", summary.total_return_pct)),
    ]);
    table.add_row(vec![
        Cell::new("Trades (wins)"),
        Cell::new(format!(
            "{} ({})",
            summary.total_trades, summary.winning_trades
        )),
    ]);
    table.add_row(vec![
        Cell::new("Win rate"),
        Cell::new(format!("{:.1}%", summary.win_rate_pct)),
    ]);
    table.add_row(vec![
        Cell::new("Peak bankroll"),
        Cell::new(format!("${:.2}", summary.peak_bankroll)),
    ]);
    table.add_row(vec![
        Cell::new("Max drawdown"),
        Cell::new(format!("{:.1}%", summary.max_drawdown_pct)),
    ]);
    println!("{table}");

    print_return_line(&summary);

    if win_history {
        let history = manager.get_win_history(crate::bankroll::WIN_HISTORY_LIMIT)?;
        if history.is_empty() {
            println!("\nNo closed trades yet");
        } else {
            let rendered: String = history
                .iter()
                .map(|w| if *w { 'W' } else { 'L' })
                .collect();
            let rate = analytics::win_rate(&history).unwrap_or(Decimal::ZERO);
            println!("\nRecent outcomes: {} ({:.0}% wins)", rendered, rate);
        }
    }
    Ok(())
}

fn print_return_line(summary: &PerformanceSummary) {
    if summary.total_pnl > Decimal::ZERO {
        println!("{}", format!("📈 Up ${:.2} overall", summary.total_pnl).green());
    } else if summary.total_pnl < Decimal::ZERO {
        println!("{}", format!("📉 Down ${:.2} overall", -summary.total_pnl).red());
    }
}

fn colored_amount(amount: Decimal) -> String {
    if amount >= Decimal::ZERO {
        format!("${:.2}", amount).green().to_string()
    } else {
        format!("-${:.2}", -amount).red().to_string()
    }
}
