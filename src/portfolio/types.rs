//! Position type definitions with strong typing

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Options contract multiplier ($100 of notional per point of premium).
pub const CONTRACT_MULTIPLIER: Decimal = Decimal::ONE_HUNDRED;

/// Option side (CALL/PUT)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OptionSide {
    Call,
    Put,
}

impl OptionSide {
    /// The side that would close a position on this side.
    pub fn opposite(self) -> Self {
        match self {
            OptionSide::Call => OptionSide::Put,
            OptionSide::Put => OptionSide::Call,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OptionSide::Call => "CALL",
            OptionSide::Put => "PUT",
        }
    }
}

impl fmt::Display for OptionSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure to parse an option side token.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown option side: {0}")]
pub struct ParseSideError(String);

impl FromStr for OptionSide {
    type Err = ParseSideError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "CALL" | "C" => Ok(OptionSide::Call),
            "PUT" | "P" => Ok(OptionSide::Put),
            other => Err(ParseSideError(other.to_string())),
        }
    }
}

/// Position status as tracked by broker-scoped stores.
///
/// Anything other than `Open` counts as closed; the suffix records how the
/// close was detected (broker sync, model exit, monitor auto-close, manual).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionStatus {
    Open,
    Closed,
    ClosedSync,
    ClosedLlm,
    ClosedAuto,
    ClosedManual,
}

impl PositionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PositionStatus::Open => "open",
            PositionStatus::Closed => "closed",
            PositionStatus::ClosedSync => "closed_sync",
            PositionStatus::ClosedLlm => "closed_llm",
            PositionStatus::ClosedAuto => "closed_auto",
            PositionStatus::ClosedManual => "closed_manual",
        }
    }

    pub fn is_closed(self) -> bool {
        !matches!(self, PositionStatus::Open)
    }

    /// Parse a raw status token. Unknown `closed*` variants collapse to
    /// `Closed`; anything unrecognized is treated as `Open`.
    pub fn parse(token: &str) -> Self {
        let token = token.trim().to_ascii_lowercase();
        match token.as_str() {
            "" | "open" => PositionStatus::Open,
            "closed" => PositionStatus::Closed,
            "closed_sync" => PositionStatus::ClosedSync,
            "closed_llm" => PositionStatus::ClosedLlm,
            "closed_auto" => PositionStatus::ClosedAuto,
            "closed_manual" => PositionStatus::ClosedManual,
            other if other.starts_with("closed") => PositionStatus::Closed,
            _ => PositionStatus::Open,
        }
    }

    /// True if a raw token denotes any kind of closed state.
    pub fn token_is_closed(token: &str) -> bool {
        token.trim().to_ascii_lowercase().starts_with("closed")
    }
}

impl fmt::Display for PositionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Provenance of a position row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionSource {
    Manual,
    Sync,
}

impl PositionSource {
    pub fn as_str(self) -> &'static str {
        match self {
            PositionSource::Manual => "manual",
            PositionSource::Sync => "sync",
        }
    }

    pub fn parse(token: &str) -> Self {
        match token.trim().to_ascii_lowercase().as_str() {
            "sync" => PositionSource::Sync,
            _ => PositionSource::Manual,
        }
    }
}

/// Identity key for an open position. No two open rows may share one.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PositionKey {
    pub symbol: String,
    pub side: OptionSide,
    pub strike: Decimal,
    pub expiry: NaiveDate,
}

/// One open option contract lot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub entry_time: DateTime<Utc>,
    pub symbol: String,
    pub expiry: NaiveDate,
    pub strike: Decimal,
    pub side: OptionSide,
    pub contracts: u32,
    pub entry_premium: Decimal,
    /// OCC-style option identifier (broker-scoped stores only)
    pub occ_symbol: Option<String>,
    pub current_price: Option<Decimal>,
    pub unrealized_pnl: Option<Decimal>,
    pub status: PositionStatus,
    pub close_time: Option<DateTime<Utc>>,
    pub market_value: Option<Decimal>,
    pub source: PositionSource,
    pub sync_detected: bool,
}

impl Position {
    /// Create a freshly-opened manual position.
    pub fn new(
        symbol: impl Into<String>,
        expiry: NaiveDate,
        strike: Decimal,
        side: OptionSide,
        contracts: u32,
        entry_premium: Decimal,
    ) -> Self {
        Self {
            entry_time: Utc::now(),
            symbol: symbol.into(),
            expiry,
            strike,
            side,
            contracts,
            entry_premium,
            occ_symbol: None,
            current_price: None,
            unrealized_pnl: None,
            status: PositionStatus::Open,
            close_time: None,
            market_value: None,
            source: PositionSource::Manual,
            sync_detected: false,
        }
    }

    pub fn key(&self) -> PositionKey {
        PositionKey {
            symbol: self.symbol.clone(),
            side: self.side,
            strike: self.strike,
            expiry: self.expiry,
        }
    }

    /// A new trade on the opposite side of the same symbol closes this lot.
    pub fn matches_close_criteria(&self, symbol: &str, side: OptionSide) -> bool {
        self.symbol == symbol && self.side != side
    }

    /// Cash paid to open this lot.
    pub fn total_cost(&self) -> Decimal {
        self.entry_premium * Decimal::from(self.contracts) * CONTRACT_MULTIPLIER
    }
}

/// Realized P&L for closing a lot at `exit_premium`. Positive = profit.
pub fn calculate_realized_pnl(position: &Position, exit_premium: Decimal) -> Decimal {
    (exit_premium - position.entry_premium) * Decimal::from(position.contracts) * CONTRACT_MULTIPLIER
}

/// Read-side aggregate over the open position set.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PositionsSummary {
    pub total_positions: usize,
    pub call_positions: usize,
    pub put_positions: usize,
    pub total_contracts: u32,
    pub total_premium_paid: Decimal,
    pub symbols: Vec<String>,
}
