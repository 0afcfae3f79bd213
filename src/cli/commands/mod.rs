//! CLI command implementations, one module per subcommand.

pub mod adjust;
pub mod positions;
pub mod propose;
pub mod record;
pub mod repair;
pub mod reset;
pub mod status;
