//! Append-only trade-history audit log.
//!
//! This CSV is the audit trail for realized and attempted trades, separate
//! from the ledger's internal history. It is only ever appended to, never
//! rewritten. The last three columns carry the volatility-regime context
//! supplied by an external collaborator at close time.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::fs::OpenOptions;
use std::path::Path;
use tracing::warn;

use crate::types::VolatilityContext;

pub const TRADE_LOG_COLUMNS: &[&str] = &[
    "timestamp",
    "symbol",
    "decision",
    "confidence",
    "current_price",
    "strike",
    "premium",
    "quantity",
    "total_cost",
    "reason",
    "status",
    "fill_price",
    "pnl_pct",
    "pnl_amount",
    "exit_reason",
    "vol_level",
    "vol_adjustment_factor",
    "vol_regime",
];

/// One row of the trade-history log. Optional fields serialize as empty
/// cells, matching the historical file contents.
#[derive(Debug, Clone, Default)]
pub struct TradeLogRow {
    pub timestamp: Option<DateTime<Utc>>,
    pub symbol: String,
    pub decision: String,
    pub confidence: f64,
    pub current_price: Option<Decimal>,
    pub strike: Decimal,
    pub premium: Decimal,
    pub quantity: u32,
    pub total_cost: Decimal,
    pub reason: String,
    pub status: String,
    pub fill_price: Option<Decimal>,
    pub pnl_pct: Option<Decimal>,
    pub pnl_amount: Option<Decimal>,
    pub exit_reason: String,
    pub volatility: VolatilityContext,
}

impl TradeLogRow {
    fn to_record(&self) -> Vec<String> {
        let opt = |v: &Option<Decimal>| v.map(|d| d.normalize().to_string()).unwrap_or_default();
        vec![
            self.timestamp.unwrap_or_else(Utc::now).to_rfc3339(),
            self.symbol.clone(),
            self.decision.clone(),
            format!("{:.2}", self.confidence),
            opt(&self.current_price),
            self.strike.normalize().to_string(),
            self.premium.normalize().to_string(),
            self.quantity.to_string(),
            self.total_cost.normalize().to_string(),
            self.reason.clone(),
            self.status.clone(),
            opt(&self.fill_price),
            opt(&self.pnl_pct),
            opt(&self.pnl_amount),
            self.exit_reason.clone(),
            self.volatility
                .level
                .map(|l| l.normalize().to_string())
                .unwrap_or_default(),
            self.volatility.adjustment_factor.normalize().to_string(),
            self.volatility.regime.clone(),
        ]
    }
}

/// Append one row, creating the file (with header) and parent directory on
/// first use.
pub fn append_trade_log(path: &Path, row: &TradeLogRow) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).context("Failed to create trade log directory")?;
        }
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .context("Failed to open trade log")?;
    let need_header = file.metadata()?.len() == 0;
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(file);
    if need_header {
        writer.write_record(TRADE_LOG_COLUMNS)?;
    }
    writer.write_record(row.to_record())?;
    writer.flush().context("Failed to append trade log row")?;
    Ok(())
}

/// Best-effort read for the analytics paths. Malformed rows are skipped
/// individually; a missing file yields an empty list rather than an error.
pub fn read_trade_log(path: &Path) -> Vec<HashMap<String, String>> {
    if !path.exists() {
        return Vec::new();
    }
    let mut reader = match csv::ReaderBuilder::new().flexible(true).from_path(path) {
        Ok(reader) => reader,
        Err(err) => {
            warn!("Trade log unreadable, treating as empty: {}", err);
            return Vec::new();
        }
    };
    let headers: Vec<String> = match reader.headers() {
        Ok(headers) => headers.iter().map(|h| h.trim().to_string()).collect(),
        Err(err) => {
            warn!("Trade log header unreadable, treating as empty: {}", err);
            return Vec::new();
        }
    };
    let mut rows = Vec::new();
    for record in reader.records() {
        match record {
            Ok(record) => rows.push(
                headers
                    .iter()
                    .cloned()
                    .zip(record.iter().map(|f| f.to_string()))
                    .collect(),
            ),
            Err(err) => warn!("Skipping unreadable trade log row: {}", err),
        }
    }
    rows
}
