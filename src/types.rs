//! Shared types for collaborator contracts.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::portfolio::OptionSide;

/// Direction of an analysis decision signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalDirection {
    Call,
    Put,
    NoTrade,
}

impl SignalDirection {
    /// The option side this signal trades, if any.
    pub fn side(self) -> Option<OptionSide> {
        match self {
            SignalDirection::Call => Some(OptionSide::Call),
            SignalDirection::Put => Some(OptionSide::Put),
            SignalDirection::NoTrade => None,
        }
    }
}

/// Decision signal produced by the (out-of-scope) analysis collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub symbol: String,
    pub direction: SignalDirection,
    /// Decision confidence in [0, 1].
    pub confidence: f64,
    pub reason: String,
}

/// Market-volatility context supplied by an external collaborator for
/// trade-log enrichment. Defaults describe "no data".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolatilityContext {
    pub level: Option<Decimal>,
    pub adjustment_factor: Decimal,
    pub regime: String,
}

impl Default for VolatilityContext {
    fn default() -> Self {
        Self {
            level: None,
            adjustment_factor: Decimal::ONE,
            regime: "UNKNOWN".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_trade_has_no_side() {
        assert_eq!(SignalDirection::Call.side(), Some(OptionSide::Call));
        assert_eq!(SignalDirection::Put.side(), Some(OptionSide::Put));
        assert_eq!(SignalDirection::NoTrade.side(), None);
    }
}
