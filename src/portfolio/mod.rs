//! Open-position tracking: store, schema handling, and trade-action logic.

pub mod manager;
pub mod schema;
pub mod store;
pub mod types;

pub use manager::{PortfolioManager, TradeAction};
pub use schema::PositionSchema;
pub use store::PositionStore;
pub use types::{
    calculate_realized_pnl, OptionSide, Position, PositionKey, PositionStatus, PositionsSummary,
    CONTRACT_MULTIPLIER,
};
