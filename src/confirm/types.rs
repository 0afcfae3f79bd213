//! Proposal and decision types for human-gated trade confirmation.

use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::portfolio::{OptionSide, Position};

/// Whether a proposal opens a new lot or closes an existing one.
#[derive(Debug, Clone)]
pub enum ProposalKind {
    Open,
    Close { position: Position },
}

/// A trade awaiting human confirmation. Nothing in the ledger or the
/// position store moves until the decision arrives.
#[derive(Debug, Clone)]
pub struct TradeProposal {
    pub symbol: String,
    pub side: OptionSide,
    pub strike: Decimal,
    pub expiry: NaiveDate,
    pub quantity: u32,
    /// Estimated premium at proposal time; superseded by the fill price.
    pub premium: Decimal,
    pub confidence: f64,
    pub reason: String,
    pub kind: ProposalKind,
}

impl TradeProposal {
    pub fn is_close(&self) -> bool {
        matches!(self.kind, ProposalKind::Close { .. })
    }
}

/// The human's verdict on a pending proposal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Order was placed. A fill price, when reported, replaces the
    /// proposal's premium estimate.
    Submitted { fill_price: Option<Decimal> },
    Cancelled,
}

/// Parse a relayed free-text decision. Returns `None` for anything outside
/// the grammar so the caller keeps waiting instead of guessing.
pub fn parse_relayed_decision(text: &str) -> Option<Decision> {
    let lowered = text.trim().to_ascii_lowercase();
    let mut words = lowered.split_whitespace();
    let first = words.next()?;

    match first {
        "cancelled" | "canceled" | "cancel" | "no" | "abort" => Some(Decision::Cancelled),
        "submitted" | "submit" | "yes" => Some(Decision::Submitted { fill_price: None }),
        "filled" => match words.next() {
            Some(raw) => {
                let price = raw.trim_start_matches('$').parse::<Decimal>().ok()?;
                Some(Decision::Submitted {
                    fill_price: Some(price),
                })
            }
            None => Some(Decision::Submitted { fill_price: None }),
        },
        // Bare "fill" is ambiguous; only the "fill <price>" form settles.
        "fill" => {
            let price = words
                .next()?
                .trim_start_matches('$')
                .parse::<Decimal>()
                .ok()?;
            Some(Decision::Submitted {
                fill_price: Some(price),
            })
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_cancellation_words() {
        for text in ["cancelled", "CANCEL", "no", "Abort", "  canceled  "] {
            assert_eq!(parse_relayed_decision(text), Some(Decision::Cancelled));
        }
    }

    #[test]
    fn test_submission_words() {
        for text in ["submitted", "Submit", "yes", "filled"] {
            assert_eq!(
                parse_relayed_decision(text),
                Some(Decision::Submitted { fill_price: None })
            );
        }
    }

    #[test]
    fn test_fill_with_price() {
        assert_eq!(
            parse_relayed_decision("filled 1.28"),
            Some(Decision::Submitted {
                fill_price: Some(dec!(1.28))
            })
        );
        assert_eq!(
            parse_relayed_decision("Fill $1.83"),
            Some(Decision::Submitted {
                fill_price: Some(dec!(1.83))
            })
        );
    }

    #[test]
    fn test_bare_fill_is_ambiguous() {
        assert_eq!(parse_relayed_decision("fill"), None);
        assert_eq!(parse_relayed_decision("fill soon"), None);
    }

    #[test]
    fn test_unrecognized_text_parses_to_none() {
        for text in ["", "maybe later", "filled at some point soon?", "1.28"] {
            assert_eq!(parse_relayed_decision(text), None, "text: {text:?}");
        }
    }
}
