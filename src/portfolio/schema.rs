//! Position store schema versions and row-level (de)serialization.
//!
//! Two on-disk layouts exist: the minimal legacy layout and the richer
//! broker-scoped layout (canonical v1.1) that carries sync/status metadata.
//! The active version is an explicit configuration choice, never inferred
//! from the file name. All known historical row corruptions are repaired by
//! `migrate_legacy_row`, which is idempotent.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use tracing::warn;

use crate::portfolio::types::*;

/// Broker-scoped positions schema version.
pub const POSITIONS_SCHEMA_VERSION: &str = "1.1";

pub const LEGACY_COLUMNS: &[&str] = &[
    "entry_time",
    "symbol",
    "expiry",
    "strike",
    "side",
    "contracts",
    "entry_premium",
];

/// Canonical broker-scoped column order. Single source of truth for all
/// writers and readers of the broker store.
pub const BROKER_COLUMNS_V1: &[&str] = &[
    "symbol",
    "occ_symbol",
    "strike",
    "option_type",
    "expiry",
    "quantity",
    "contracts",
    "entry_price",
    "current_price",
    "pnl_pct",
    "pnl_amount",
    "timestamp",
    "status",
    "close_time",
    "market_value",
    "unrealized_pnl",
    "entry_time",
    "source",
    "sync_detected",
];

/// Supported position store layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionSchema {
    /// Minimal legacy layout: one row per open lot, no lifecycle metadata.
    Legacy,
    /// Broker-scoped layout v1.1 with sync/status metadata; closed rows are
    /// retained in the file and filtered on load.
    BrokerV1,
}

impl PositionSchema {
    pub fn columns(self) -> &'static [&'static str] {
        match self {
            PositionSchema::Legacy => LEGACY_COLUMNS,
            PositionSchema::BrokerV1 => BROKER_COLUMNS_V1,
        }
    }
}

/// A raw CSV row keyed by header name.
pub type RawRow = HashMap<String, String>;

fn field<'a>(row: &'a RawRow, name: &str) -> &'a str {
    row.get(name).map(String::as_str).unwrap_or("").trim()
}

pub(crate) fn parse_decimal(s: &str) -> Option<Decimal> {
    s.trim().replace('$', "").parse::<Decimal>().ok()
}

fn parse_u32(s: &str) -> Option<u32> {
    s.trim().parse::<u32>().ok()
}

/// Parse the timestamp formats that have historically appeared in the files.
pub(crate) fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(naive.and_utc());
        }
    }
    None
}

fn parse_expiry(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok()
}

/// Outcome of parsing one stored row.
#[derive(Debug)]
pub enum RowParse {
    Parsed(Position),
    /// Structurally unusable; carries the reason for the skip log.
    Skipped(&'static str),
}

/// Parse a row under the given schema. Numeric fields are coerced
/// defensively: an unparseable strike invalidates the row, while bad
/// quantity/premium values fall back to 1 contract / $0.01 since upstream
/// writers are known to occasionally misalign columns.
pub fn parse_position(schema: PositionSchema, row: &RawRow) -> RowParse {
    match schema {
        PositionSchema::Legacy => parse_legacy(row),
        PositionSchema::BrokerV1 => parse_broker(row),
    }
}

fn parse_legacy(row: &RawRow) -> RowParse {
    let symbol = field(row, "symbol");
    let side = match field(row, "side").parse::<OptionSide>() {
        Ok(side) => side,
        Err(_) => return RowParse::Skipped("missing or invalid side"),
    };
    if symbol.is_empty() {
        return RowParse::Skipped("missing symbol");
    }
    let expiry = match parse_expiry(field(row, "expiry")) {
        Some(expiry) => expiry,
        None => return RowParse::Skipped("missing or invalid expiry"),
    };
    let strike = match parse_decimal(field(row, "strike")) {
        Some(strike) if strike > Decimal::ZERO => strike,
        _ => return RowParse::Skipped("invalid strike"),
    };

    let contracts = parse_u32(field(row, "contracts")).filter(|c| *c > 0).unwrap_or(1);
    let entry_premium = parse_decimal(field(row, "entry_premium"))
        .filter(|p| *p > Decimal::ZERO)
        .unwrap_or_else(|| Decimal::new(1, 2));
    let entry_time =
        parse_timestamp(field(row, "entry_time")).unwrap_or(DateTime::<Utc>::UNIX_EPOCH);

    let mut position = Position::new(symbol, expiry, strike, side, contracts, entry_premium);
    position.entry_time = entry_time;
    RowParse::Parsed(position)
}

fn parse_broker(row: &RawRow) -> RowParse {
    let symbol = field(row, "symbol");
    if symbol.is_empty() {
        return RowParse::Skipped("missing symbol");
    }
    let side = match field(row, "option_type").parse::<OptionSide>() {
        Ok(side) => side,
        Err(_) => return RowParse::Skipped("missing or invalid option_type"),
    };
    let expiry = match parse_expiry(field(row, "expiry")) {
        Some(expiry) => expiry,
        None => return RowParse::Skipped("missing or invalid expiry"),
    };
    let strike = match parse_decimal(field(row, "strike")) {
        Some(strike) if strike > Decimal::ZERO => strike,
        _ => return RowParse::Skipped("invalid strike"),
    };

    let contracts = parse_u32(field(row, "contracts"))
        .or_else(|| parse_u32(field(row, "quantity")))
        .filter(|c| *c > 0)
        .unwrap_or(1);
    let entry_premium = parse_decimal(field(row, "entry_price"))
        .filter(|p| *p > Decimal::ZERO)
        .unwrap_or_else(|| Decimal::new(1, 2));
    let entry_time = parse_timestamp(field(row, "entry_time"))
        .or_else(|| parse_timestamp(field(row, "timestamp")))
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);

    let close_time = parse_timestamp(field(row, "close_time"));
    let mut status = PositionStatus::parse(field(row, "status"));
    // A populated close time marks the row closed even if the status token
    // never got updated.
    if close_time.is_some() && !status.is_closed() {
        status = PositionStatus::Closed;
    }

    let mut position = Position::new(symbol, expiry, strike, side, contracts, entry_premium);
    position.entry_time = entry_time;
    position.status = status;
    position.close_time = close_time;
    position.occ_symbol = match field(row, "occ_symbol") {
        "" => None,
        occ => Some(occ.to_string()),
    };
    position.current_price = parse_decimal(field(row, "current_price"));
    position.unrealized_pnl = parse_decimal(field(row, "unrealized_pnl"));
    position.market_value = parse_decimal(field(row, "market_value"));
    position.source = PositionSource::parse(field(row, "source"));
    position.sync_detected = matches!(
        field(row, "sync_detected").to_ascii_lowercase().as_str(),
        "true" | "1" | "yes"
    );
    RowParse::Parsed(position)
}

/// Serialize a position into the column order of the given schema.
pub fn position_to_record(schema: PositionSchema, position: &Position) -> Vec<String> {
    match schema {
        PositionSchema::Legacy => vec![
            position.entry_time.to_rfc3339(),
            position.symbol.clone(),
            position.expiry.format("%Y-%m-%d").to_string(),
            position.strike.normalize().to_string(),
            position.side.to_string(),
            position.contracts.to_string(),
            position.entry_premium.normalize().to_string(),
        ],
        PositionSchema::BrokerV1 => vec![
            position.symbol.clone(),
            position.occ_symbol.clone().unwrap_or_default(),
            position.strike.normalize().to_string(),
            position.side.to_string(),
            position.expiry.format("%Y-%m-%d").to_string(),
            position.contracts.to_string(),
            position.contracts.to_string(),
            position.entry_premium.normalize().to_string(),
            position
                .current_price
                .map(|p| p.normalize().to_string())
                .unwrap_or_default(),
            String::new(),
            String::new(),
            position.entry_time.to_rfc3339(),
            position.status.to_string(),
            position
                .close_time
                .map(|t| t.to_rfc3339())
                .unwrap_or_default(),
            position
                .market_value
                .map(|v| v.normalize().to_string())
                .unwrap_or_default(),
            position
                .unrealized_pnl
                .map(|v| v.normalize().to_string())
                .unwrap_or_default(),
            position.entry_time.to_rfc3339(),
            position.source.as_str().to_string(),
            position.sync_detected.to_string(),
        ],
    }
}

/// Re-serialize a raw broker row in canonical column order.
pub fn raw_row_to_record(columns: &[&str], row: &RawRow) -> Vec<String> {
    columns
        .iter()
        .map(|col| row.get(*col).cloned().unwrap_or_default())
        .collect()
}

/// Repair a broker-scoped row for every known historical corruption
/// pattern. Returns true if the row was modified. Running this twice on the
/// same row produces no further changes.
pub fn migrate_legacy_row(row: &mut RawRow) -> bool {
    let mut changed = repair_shifted_columns(row);
    changed |= repair_close_time_status(row);
    changed |= repair_fractional_contracts(row);
    changed
}

/// A writer that omitted `occ_symbol` shifts every later value one column
/// to the right, which surfaces as the strike column holding the literal
/// side token. Slide the tail back into place and blank the OCC symbol.
fn repair_shifted_columns(row: &mut RawRow) -> bool {
    if field(row, "strike").parse::<OptionSide>().is_err() {
        return false;
    }
    let cols = BROKER_COLUMNS_V1;
    // Walk from the tail so each source cell is read before it is
    // overwritten by the slide.
    for i in (2..cols.len()).rev() {
        let value = row.get(cols[i - 1]).cloned().unwrap_or_default();
        row.insert(cols[i].to_string(), value);
    }
    row.insert("occ_symbol".to_string(), String::new());
    warn!("Repaired right-shifted position row for {}", field(row, "symbol"));
    true
}

/// Some writers dropped a status token into the close-time column. Move it
/// where it belongs and clear the timestamp field.
fn repair_close_time_status(row: &mut RawRow) -> bool {
    let close_time = field(row, "close_time").to_string();
    if close_time.is_empty() || parse_timestamp(&close_time).is_some() {
        return false;
    }
    let token = close_time.to_ascii_lowercase();
    if token == "open" || PositionStatus::token_is_closed(&token) {
        row.insert("status".to_string(), token);
        row.insert("close_time".to_string(), String::new());
        warn!(
            "Repaired status token in close_time column for {}",
            field(row, "symbol")
        );
        return true;
    }
    false
}

/// A contracts cell holding a fractional value is a misplaced price. Move
/// it to entry_price when that cell is unusable and restore an integral
/// contract count from the quantity column.
fn repair_fractional_contracts(row: &mut RawRow) -> bool {
    let contracts = field(row, "contracts").to_string();
    let Some(value) = parse_decimal(&contracts) else {
        return false;
    };
    if value.fract().is_zero() {
        return false;
    }
    if parse_decimal(field(row, "entry_price")).is_none() {
        row.insert("entry_price".to_string(), contracts);
    }
    let restored = parse_u32(field(row, "quantity"))
        .filter(|q| *q > 0)
        .unwrap_or(1);
    row.insert("contracts".to_string(), restored.to_string());
    warn!(
        "Repaired fractional contracts column for {}",
        field(row, "symbol")
    );
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn broker_row(values: &[(&str, &str)]) -> RawRow {
        let mut row = RawRow::new();
        for (k, v) in values {
            row.insert(k.to_string(), v.to_string());
        }
        row
    }

    fn healthy_row() -> RawRow {
        broker_row(&[
            ("symbol", "SPY"),
            ("occ_symbol", "SPY250103C00628000"),
            ("strike", "628"),
            ("option_type", "CALL"),
            ("expiry", "2025-01-03"),
            ("quantity", "1"),
            ("contracts", "1"),
            ("entry_price", "1.42"),
            ("timestamp", "2025-01-02T15:04:05+00:00"),
            ("status", "open"),
            ("entry_time", "2025-01-02T15:04:05+00:00"),
            ("source", "manual"),
            ("sync_detected", "false"),
        ])
    }

    #[test]
    fn test_parse_healthy_broker_row() {
        let row = healthy_row();
        match parse_position(PositionSchema::BrokerV1, &row) {
            RowParse::Parsed(pos) => {
                assert_eq!(pos.symbol, "SPY");
                assert_eq!(pos.side, OptionSide::Call);
                assert_eq!(pos.contracts, 1);
                assert!(!pos.status.is_closed());
            }
            RowParse::Skipped(reason) => panic!("unexpected skip: {reason}"),
        }
    }

    #[test]
    fn test_invalid_strike_skips_row() {
        let mut row = healthy_row();
        row.insert("strike".to_string(), "not-a-number".to_string());
        assert!(matches!(
            parse_position(PositionSchema::BrokerV1, &row),
            RowParse::Skipped(_)
        ));
    }

    #[test]
    fn test_bad_quantity_and_premium_fall_back() {
        let mut row = healthy_row();
        row.insert("contracts".to_string(), "".to_string());
        row.insert("quantity".to_string(), "garbage".to_string());
        row.insert("entry_price".to_string(), "-3".to_string());
        match parse_position(PositionSchema::BrokerV1, &row) {
            RowParse::Parsed(pos) => {
                assert_eq!(pos.contracts, 1);
                assert_eq!(pos.entry_premium, Decimal::new(1, 2));
            }
            RowParse::Skipped(reason) => panic!("unexpected skip: {reason}"),
        }
    }

    #[test]
    fn test_close_time_marks_row_closed() {
        let mut row = healthy_row();
        row.insert(
            "close_time".to_string(),
            "2025-01-02T19:00:00+00:00".to_string(),
        );
        match parse_position(PositionSchema::BrokerV1, &row) {
            RowParse::Parsed(pos) => assert!(pos.status.is_closed()),
            RowParse::Skipped(reason) => panic!("unexpected skip: {reason}"),
        }
    }

    #[test]
    fn test_repair_shifted_columns() {
        // Row written without the occ_symbol column: strike holds the side.
        let mut row = broker_row(&[
            ("symbol", "SPY"),
            ("occ_symbol", "628"),
            ("strike", "CALL"),
            ("option_type", "2025-01-03"),
            ("expiry", "1"),
            ("quantity", "1"),
            ("contracts", "1.42"),
        ]);
        assert!(migrate_legacy_row(&mut row));
        assert_eq!(row["strike"], "628");
        assert_eq!(row["option_type"], "CALL");
        assert_eq!(row["expiry"], "2025-01-03");
        assert_eq!(row["occ_symbol"], "");
        // The whole tail slides intact; no cell is smeared into its neighbor.
        assert_eq!(row["quantity"], "1");
        assert_eq!(row["contracts"], "1");
        assert_eq!(row["entry_price"], "1.42");
        // Idempotent: a second pass changes nothing further.
        let snapshot = row.clone();
        assert!(!migrate_legacy_row(&mut row));
        assert_eq!(row, snapshot);
    }

    #[test]
    fn test_repair_status_token_in_close_time() {
        let mut row = healthy_row();
        row.insert("close_time".to_string(), "closed_sync".to_string());
        assert!(migrate_legacy_row(&mut row));
        assert_eq!(row["status"], "closed_sync");
        assert_eq!(row["close_time"], "");
        assert!(!migrate_legacy_row(&mut row));
    }

    #[test]
    fn test_repair_fractional_contracts() {
        let mut row = healthy_row();
        row.insert("contracts".to_string(), "1.42".to_string());
        row.insert("entry_price".to_string(), "".to_string());
        assert!(migrate_legacy_row(&mut row));
        assert_eq!(row["contracts"], "1");
        assert_eq!(row["entry_price"], "1.42");
        assert!(!migrate_legacy_row(&mut row));
    }

    #[test]
    fn test_legacy_round_trip() {
        let pos = Position::new(
            "SPY",
            NaiveDate::from_ymd_opt(2025, 1, 3).unwrap(),
            Decimal::from(628),
            OptionSide::Call,
            1,
            Decimal::new(142, 2),
        );
        let record = position_to_record(PositionSchema::Legacy, &pos);
        let row: RawRow = LEGACY_COLUMNS
            .iter()
            .map(|c| c.to_string())
            .zip(record.into_iter())
            .collect();
        match parse_position(PositionSchema::Legacy, &row) {
            RowParse::Parsed(parsed) => assert_eq!(parsed.key(), pos.key()),
            RowParse::Skipped(reason) => panic!("unexpected skip: {reason}"),
        }
    }
}
