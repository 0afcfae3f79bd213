//! Command-line interface.
//!
//! Uses clap for argument parsing with one module per subcommand under
//! `commands/`. Every command operates on one (broker, environment) scope
//! selected by the global `--broker`/`--env` flags.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub mod commands;

use crate::bankroll::BankrollManager;
use crate::config::{Broker, RiskConfig, Scope, TradeEnv};
use crate::data_paths::{DataPaths, DEFAULT_DATA_DIR};
use crate::logging::{init_logging, LogMode, LoggingConfig};
use crate::portfolio::{PortfolioManager, PositionStore};

use commands::adjust::AdjustArgs;
use commands::positions::PositionsArgs;
use commands::propose::ProposeArgs;
use commands::record::RecordArgs;
use commands::repair::RepairArgs;
use commands::reset::ResetArgs;
use commands::status::StatusArgs;

#[derive(Parser)]
#[command(name = "breakout-ledger")]
#[command(version)]
#[command(about = "Position and bankroll ledger for an options breakout strategy", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Data directory path (default: ./data)
    #[arg(long, global = true, default_value = DEFAULT_DATA_DIR)]
    pub data_dir: PathBuf,

    /// Brokerage scope
    #[arg(long, global = true, default_value = "robinhood")]
    pub broker: Broker,

    /// Trading environment scope
    #[arg(long, global = true, default_value = "paper")]
    pub env: TradeEnv,

    /// Verbose logging
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Log to file only, keeping the console reserved for command output
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show ledger balance and performance summary
    Status(StatusArgs),

    /// List open positions
    Positions(PositionsArgs),

    /// Propose a trade and confirm it interactively
    Propose(ProposeArgs),

    /// Record an already-confirmed trade directly
    Record(RecordArgs),

    /// Manually set the bankroll balance
    Adjust(AdjustArgs),

    /// Reset the ledger to a fresh state
    Reset(ResetArgs),

    /// Repair and normalize the positions file
    Repair(RepairArgs),
}

/// Scope-resolved handles shared by every command.
pub struct CommandContext {
    pub scope: Scope,
    pub data_paths: DataPaths,
    pub risk: RiskConfig,
}

impl CommandContext {
    pub fn bankroll_manager(&self) -> Result<BankrollManager> {
        BankrollManager::open(
            self.data_paths.bankroll_file(self.scope),
            self.data_paths.adjustments_file(self.scope),
            self.risk.start_capital,
        )
    }

    pub fn position_store(&self) -> Result<PositionStore> {
        PositionStore::open(
            self.data_paths.positions_file(self.scope),
            self.scope.default_schema(),
        )
    }

    pub fn portfolio_manager(&self) -> Result<PortfolioManager> {
        Ok(PortfolioManager::new(self.position_store()?))
    }
}

impl Cli {
    /// Execute the CLI command
    pub fn execute(self) -> Result<()> {
        let data_paths = DataPaths::new(&self.data_dir);
        data_paths.ensure_directories()?;
        let log_mode = if self.quiet {
            LogMode::FileOnly
        } else {
            LogMode::ConsoleAndFile
        };
        init_logging(LoggingConfig::new(log_mode, data_paths.clone()))?;

        let context = CommandContext {
            scope: Scope::new(self.broker, self.env),
            data_paths,
            risk: RiskConfig::from_env()?,
        };

        match self.command {
            Commands::Status(args) => commands::status::execute(args, &context),
            Commands::Positions(args) => commands::positions::execute(args, &context),
            Commands::Propose(args) => commands::propose::execute(args, &context),
            Commands::Record(args) => commands::record::execute(args, &context),
            Commands::Adjust(args) => commands::adjust::execute(args, &context),
            Commands::Reset(args) => commands::reset::execute(args, &context),
            Commands::Repair(args) => commands::repair::execute(args, &context),
        }
    }
}
