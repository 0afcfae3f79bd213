//! Human-gated trade confirmation: proposals, decisions, and bookkeeping.

pub mod manager;
pub mod types;

pub use manager::TradeConfirmationManager;
pub use types::{parse_relayed_decision, Decision, ProposalKind, TradeProposal};
