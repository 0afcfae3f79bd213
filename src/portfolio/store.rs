//! Durable CSV-backed position store.
//!
//! The store deliberately keeps no in-memory cache: every operation re-reads
//! the file so an out-of-process writer (a broker-side sync job) is always
//! observed. There is no file locking; the normalization pass exists as the
//! defensive second line against interleaved writes.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::portfolio::schema::{
    migrate_legacy_row, parse_position, position_to_record, raw_row_to_record, PositionSchema,
    RawRow, RowParse,
};
use crate::portfolio::types::{Position, PositionKey, PositionStatus};

pub struct PositionStore {
    path: PathBuf,
    schema: PositionSchema,
}

impl PositionStore {
    /// Open a store at `path` with the configured schema. For broker-scoped
    /// stores the file is normalized on construction (see [`Self::normalize`]).
    pub fn open(path: impl AsRef<Path>, schema: PositionSchema) -> Result<Self> {
        let store = Self {
            path: path.as_ref().to_path_buf(),
            schema,
        };
        store.ensure_file()?;
        if schema == PositionSchema::BrokerV1 {
            store.normalize()?;
        }
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn schema(&self) -> PositionSchema {
        self.schema
    }

    fn ensure_file(&self) -> Result<()> {
        if self.path.exists() {
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .context("Failed to create position store directory")?;
            }
        }
        let mut writer = csv::Writer::from_path(&self.path)
            .context("Failed to create position store file")?;
        writer.write_record(self.schema.columns())?;
        writer.flush()?;
        info!("Created new positions file: {}", self.path.display());
        Ok(())
    }

    /// Read every data row as a header-keyed map, tolerating ragged rows.
    fn read_raw_rows(&self) -> Result<Vec<RawRow>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_path(&self.path)
            .context("Failed to open position store")?;
        let headers: Vec<String> = reader
            .headers()
            .context("Failed to read position store header")?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();

        let mut rows = Vec::new();
        for (idx, record) in reader.records().enumerate() {
            match record {
                Ok(record) => {
                    let row: RawRow = headers
                        .iter()
                        .cloned()
                        .zip(record.iter().map(|f| f.to_string()))
                        .collect();
                    if row.values().all(|v| v.trim().is_empty()) {
                        continue;
                    }
                    rows.push(row);
                }
                Err(err) => {
                    warn!("Skipping unreadable position row {}: {}", idx + 2, err);
                }
            }
        }
        Ok(rows)
    }

    fn write_raw_rows(&self, rows: &[RawRow]) -> Result<()> {
        let mut writer = csv::Writer::from_path(&self.path)
            .context("Failed to rewrite position store")?;
        writer.write_record(self.schema.columns())?;
        for row in rows {
            writer.write_record(raw_row_to_record(self.schema.columns(), row))?;
        }
        writer.flush().context("Failed to flush position store")?;
        Ok(())
    }

    /// Repair known corruption patterns and collapse duplicate open rows.
    ///
    /// Multiple simultaneously-open rows for one identity key are collapsed
    /// to the most recently timestamped one; the rest are force-marked
    /// closed with a synthetic close time. Idempotent: a second run rewrites
    /// nothing.
    pub fn normalize(&self) -> Result<usize> {
        let mut rows = self.read_raw_rows()?;
        let mut repaired = 0usize;
        for row in &mut rows {
            if migrate_legacy_row(row) {
                repaired += 1;
            }
        }

        // Collapse duplicate open keys, newest entry wins.
        let mut latest_open: HashMap<PositionKey, (usize, chrono::DateTime<chrono::Utc>)> =
            HashMap::new();
        let mut force_close = Vec::new();
        for (idx, row) in rows.iter().enumerate() {
            let RowParse::Parsed(position) = parse_position(self.schema, row) else {
                continue;
            };
            if position.status.is_closed() {
                continue;
            }
            let key = position.key();
            match latest_open.get(&key) {
                Some(&(prev_idx, prev_time)) => {
                    if position.entry_time >= prev_time {
                        force_close.push(prev_idx);
                        latest_open.insert(key, (idx, position.entry_time));
                    } else {
                        force_close.push(idx);
                    }
                }
                None => {
                    latest_open.insert(key, (idx, position.entry_time));
                }
            }
        }
        for idx in &force_close {
            let row = &mut rows[*idx];
            row.insert(
                "status".to_string(),
                PositionStatus::ClosedManual.to_string(),
            );
            row.insert("close_time".to_string(), chrono::Utc::now().to_rfc3339());
            warn!(
                "Collapsed duplicate open row for {} (force-closed)",
                row.get("symbol").map(String::as_str).unwrap_or("?")
            );
        }

        let changes = repaired + force_close.len();
        if changes > 0 {
            self.write_raw_rows(&rows)?;
            info!(
                "Normalized position store {}: {} row(s) repaired, {} duplicate(s) closed",
                self.path.display(),
                repaired,
                force_close.len()
            );
        } else {
            debug!("Position store {} already canonical", self.path.display());
        }
        Ok(changes)
    }

    /// Load the deduplicated open position set.
    ///
    /// Malformed rows are skipped with a warning, never fatal. A missing
    /// file means zero open positions. Broker-scoped rows already marked
    /// closed are excluded.
    pub fn load(&self) -> Result<Vec<Position>> {
        let rows = self.read_raw_rows()?;
        let mut positions: Vec<Position> = Vec::new();
        let mut by_key: HashMap<PositionKey, usize> = HashMap::new();

        for (idx, row) in rows.iter().enumerate() {
            let position = match parse_position(self.schema, row) {
                RowParse::Parsed(position) => position,
                RowParse::Skipped(reason) => {
                    warn!("Skipping position row {}: {}", idx + 2, reason);
                    continue;
                }
            };
            if position.status.is_closed() {
                continue;
            }
            let key = position.key();
            match by_key.get(&key) {
                Some(&existing) => {
                    warn!(
                        "Duplicate open position for {} {} {} {}; keeping most recent entry",
                        key.symbol, key.side, key.strike, key.expiry
                    );
                    if position.entry_time >= positions[existing].entry_time {
                        positions[existing] = position;
                    }
                }
                None => {
                    by_key.insert(key, positions.len());
                    positions.push(position);
                }
            }
        }

        debug!("Loaded {} open positions", positions.len());
        Ok(positions)
    }

    /// Append one position row. Durable write; no cache is updated because
    /// none exists.
    pub fn append(&self, position: &Position) -> Result<()> {
        self.ensure_file()?;
        let file = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .context("Failed to open position store for append")?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        writer.write_record(position_to_record(self.schema, position))?;
        writer.flush().context("Failed to append position row")?;
        Ok(())
    }

    /// Rewrite the store without the row matching `key`. Closed broker rows
    /// are preserved. Returns false (after a warning) when no match exists.
    pub fn remove(&self, key: &PositionKey) -> Result<bool> {
        let rows = self.read_raw_rows()?;
        let mut remaining = Vec::with_capacity(rows.len());
        let mut removed = false;
        for row in rows {
            if !removed {
                if let RowParse::Parsed(position) = parse_position(self.schema, &row) {
                    if !position.status.is_closed() && &position.key() == key {
                        removed = true;
                        info!(
                            "Removing position: {} {} ${} x{}",
                            position.symbol, position.side, position.strike, position.contracts
                        );
                        continue;
                    }
                }
            }
            remaining.push(row);
        }
        if !removed {
            warn!("Position to remove not found in positions file");
            return Ok(false);
        }
        self.write_raw_rows(&remaining)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::portfolio::types::OptionSide;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;
    use std::io::Write as _;
    use tempfile::TempDir;

    fn position(symbol: &str, side: OptionSide, strike: rust_decimal::Decimal) -> Position {
        Position::new(
            symbol,
            NaiveDate::from_ymd_opt(2025, 1, 3).unwrap(),
            strike,
            side,
            1,
            dec!(1.42),
        )
    }

    #[test]
    fn test_missing_file_means_empty() {
        let dir = TempDir::new().unwrap();
        let store =
            PositionStore::open(dir.path().join("positions.csv"), PositionSchema::Legacy).unwrap();
        std::fs::remove_file(store.path()).unwrap();
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn test_append_and_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let store =
            PositionStore::open(dir.path().join("positions.csv"), PositionSchema::Legacy).unwrap();
        store
            .append(&position("SPY", OptionSide::Call, dec!(628)))
            .unwrap();
        store
            .append(&position("QQQ", OptionSide::Put, dec!(520)))
            .unwrap();
        let loaded = store.load().unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].symbol, "SPY");
    }

    #[test]
    fn test_load_deduplicates_by_identity_key() {
        let dir = TempDir::new().unwrap();
        let store =
            PositionStore::open(dir.path().join("positions.csv"), PositionSchema::Legacy).unwrap();
        let mut first = position("SPY", OptionSide::Call, dec!(628));
        first.entry_time = "2025-01-02T14:00:00Z".parse().unwrap();
        let mut second = first.clone();
        second.entry_time = "2025-01-02T15:00:00Z".parse().unwrap();
        second.entry_premium = dec!(1.55);
        store.append(&first).unwrap();
        store.append(&second).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].entry_premium, dec!(1.55));
    }

    #[test]
    fn test_remove_missing_position_is_noop() {
        let dir = TempDir::new().unwrap();
        let store =
            PositionStore::open(dir.path().join("positions.csv"), PositionSchema::Legacy).unwrap();
        let pos = position("SPY", OptionSide::Call, dec!(628));
        assert!(!store.remove(&pos.key()).unwrap());
    }

    #[test]
    fn test_remove_rewrites_file() {
        let dir = TempDir::new().unwrap();
        let store =
            PositionStore::open(dir.path().join("positions.csv"), PositionSchema::Legacy).unwrap();
        let spy = position("SPY", OptionSide::Call, dec!(628));
        let qqq = position("QQQ", OptionSide::Put, dec!(520));
        store.append(&spy).unwrap();
        store.append(&qqq).unwrap();

        assert!(store.remove(&spy.key()).unwrap());
        let loaded = store.load().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].symbol, "QQQ");
    }

    #[test]
    fn test_broker_load_excludes_closed_rows() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("positions_alpaca_paper.csv");
        let store = PositionStore::open(&path, PositionSchema::BrokerV1).unwrap();
        let open = position("SPY", OptionSide::Call, dec!(628));
        let mut closed = position("SPY", OptionSide::Put, dec!(620));
        closed.status = PositionStatus::ClosedSync;
        closed.close_time = Some(chrono::Utc::now());
        store.append(&open).unwrap();
        store.append(&closed).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].side, OptionSide::Call);
    }

    #[test]
    fn test_normalize_repairs_and_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("positions_alpaca_paper.csv");
        // Seed a file containing a right-shifted row before opening the store.
        {
            let mut file = std::fs::File::create(&path).unwrap();
            writeln!(
                file,
                "symbol,occ_symbol,strike,option_type,expiry,quantity,contracts,entry_price,current_price,pnl_pct,pnl_amount,timestamp,status,close_time,market_value,unrealized_pnl,entry_time,source,sync_detected"
            )
            .unwrap();
            writeln!(
                file,
                "SPY,628,CALL,2025-01-03,1,1,1.42,,,,2025-01-02T15:00:00+00:00,open,,,,2025-01-02T15:00:00+00:00,manual,false"
            )
            .unwrap();
        }
        let store = PositionStore::open(&path, PositionSchema::BrokerV1).unwrap();
        let loaded = store.load().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].strike, dec!(628));
        assert_eq!(loaded[0].side, OptionSide::Call);
        // The constructor pass already normalized; nothing further changes.
        assert_eq!(store.normalize().unwrap(), 0);
    }

    #[test]
    fn test_normalize_collapses_duplicate_open_rows() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("positions_alpaca_paper.csv");
        {
            let store = PositionStore::open(&path, PositionSchema::BrokerV1).unwrap();
            let mut older = position("SPY", OptionSide::Call, dec!(628));
            older.entry_time = "2025-01-02T14:00:00Z".parse().unwrap();
            let mut newer = older.clone();
            newer.entry_time = "2025-01-02T15:00:00Z".parse().unwrap();
            store.append(&older).unwrap();
            store.append(&newer).unwrap();
        }
        // Re-opening triggers normalization of the duplicate.
        let store = PositionStore::open(&path, PositionSchema::BrokerV1).unwrap();
        let loaded = store.load().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(
            loaded[0].entry_time,
            "2025-01-02T15:00:00Z".parse::<chrono::DateTime<chrono::Utc>>().unwrap()
        );
        assert_eq!(store.normalize().unwrap(), 0);
    }
}
