//! Broker/environment scope and risk configuration.

use anyhow::{anyhow, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::bankroll::SizeRule;
use crate::portfolio::PositionSchema;

/// Brokerage the ledger tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Broker {
    Robinhood,
    Alpaca,
}

impl Broker {
    pub fn as_str(self) -> &'static str {
        match self {
            Broker::Robinhood => "robinhood",
            Broker::Alpaca => "alpaca",
        }
    }
}

impl fmt::Display for Broker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Broker {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "robinhood" => Ok(Broker::Robinhood),
            "alpaca" => Ok(Broker::Alpaca),
            other => Err(anyhow!("Unknown broker: {}", other)),
        }
    }
}

/// Trading environment within a broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeEnv {
    Paper,
    Live,
}

impl TradeEnv {
    pub fn as_str(self) -> &'static str {
        match self {
            TradeEnv::Paper => "paper",
            TradeEnv::Live => "live",
        }
    }
}

impl fmt::Display for TradeEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TradeEnv {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "paper" => Ok(TradeEnv::Paper),
            "live" => Ok(TradeEnv::Live),
            other => Err(anyhow!("Unknown trade environment: {}", other)),
        }
    }
}

/// One (broker, environment) pair. All state files are isolated per scope
/// so paper and live ledgers can never cross-contaminate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scope {
    pub broker: Broker,
    pub env: TradeEnv,
}

impl Scope {
    pub fn new(broker: Broker, env: TradeEnv) -> Self {
        Self { broker, env }
    }

    /// The position-file schema this broker's tooling writes.
    pub fn default_schema(self) -> PositionSchema {
        match self.broker {
            Broker::Robinhood => PositionSchema::Legacy,
            Broker::Alpaca => PositionSchema::BrokerV1,
        }
    }

    /// The `{broker}_{env}` suffix embedded in every scoped file name.
    pub fn file_suffix(self) -> String {
        format!("{}_{}", self.broker, self.env)
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.broker, self.env)
    }
}

impl FromStr for Scope {
    type Err = anyhow::Error;

    /// Parse `broker/env` or `broker_env`.
    fn from_str(s: &str) -> Result<Self> {
        let (broker, env) = s
            .split_once('/')
            .or_else(|| s.split_once('_'))
            .ok_or_else(|| anyhow!("Expected broker/env, got: {}", s))?;
        Ok(Scope::new(broker.parse()?, env.parse()?))
    }
}

/// Risk and sizing parameters, normally sourced from the environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    /// Capital a fresh ledger is seeded with.
    pub start_capital: Decimal,
    /// Fraction of the bankroll a single entry may put at risk.
    pub risk_fraction: Decimal,
    pub size_rule: SizeRule,
    /// Contracts per trade under the fixed-quantity rule.
    pub fixed_qty: u32,
    /// Hard ceiling on per-trade risk as a percentage of the bankroll.
    pub max_risk_pct: Decimal,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            start_capital: Decimal::from(500),
            risk_fraction: Decimal::new(5, 1),
            size_rule: SizeRule::FixedQty,
            fixed_qty: 1,
            max_risk_pct: Decimal::from(50),
        }
    }
}

impl RiskConfig {
    /// Build from environment variables, falling back to defaults for any
    /// that are absent. Malformed values are an error, not a silent default.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        if let Ok(raw) = std::env::var("LEDGER_START_CAPITAL") {
            config.start_capital = raw
                .parse()
                .map_err(|_| anyhow!("Invalid LEDGER_START_CAPITAL: {}", raw))?;
        }
        if let Ok(raw) = std::env::var("LEDGER_RISK_FRACTION") {
            config.risk_fraction = raw
                .parse()
                .map_err(|_| anyhow!("Invalid LEDGER_RISK_FRACTION: {}", raw))?;
        }
        if let Ok(raw) = std::env::var("LEDGER_SIZE_RULE") {
            config.size_rule = raw.parse()?;
        }
        if let Ok(raw) = std::env::var("LEDGER_FIXED_QTY") {
            config.fixed_qty = raw
                .parse()
                .map_err(|_| anyhow!("Invalid LEDGER_FIXED_QTY: {}", raw))?;
        }
        if let Ok(raw) = std::env::var("LEDGER_MAX_RISK_PCT") {
            config.max_risk_pct = raw
                .parse()
                .map_err(|_| anyhow!("Invalid LEDGER_MAX_RISK_PCT: {}", raw))?;
        }
        Ok(config)
    }
}
