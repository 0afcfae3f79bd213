//! Positions-file repair and normalization.

use anyhow::Result;
use clap::Args;

use crate::cli::CommandContext;

#[derive(Args, Debug)]
pub struct RepairArgs {}

pub fn execute(_args: RepairArgs, context: &CommandContext) -> Result<()> {
    let store = context.position_store()?;
    let changed = store.normalize()?;
    if changed == 0 {
        println!("Positions file is already clean");
    } else {
        println!("Repaired {} row(s) in {}", changed, context.scope);
    }
    let open = store.load()?.len();
    println!("{} open position(s) after repair", open);
    Ok(())
}
