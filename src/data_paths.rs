//! Scoped state-file layout.
//!
//! Every persistent file embeds its `{broker}_{env}` suffix so scopes stay
//! isolated on disk and a directory listing shows at a glance which ledgers
//! exist.

use anyhow::Result;
use std::path::{Path, PathBuf};

use crate::config::Scope;

/// Default data directory (relative to current working directory)
pub const DEFAULT_DATA_DIR: &str = "./data";

pub const LOGS_DIR: &str = "logs";

/// Helper struct to manage data paths
#[derive(Clone, Debug)]
pub struct DataPaths {
    root: PathBuf,
}

impl DataPaths {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &PathBuf {
        &self.root
    }

    pub fn logs(&self) -> PathBuf {
        self.root.join(LOGS_DIR)
    }

    /// Ledger JSON for one scope.
    pub fn bankroll_file(&self, scope: Scope) -> PathBuf {
        self.root
            .join(format!("bankroll_{}.json", scope.file_suffix()))
    }

    /// Open-positions CSV for one scope.
    pub fn positions_file(&self, scope: Scope) -> PathBuf {
        self.root
            .join(format!("positions_{}.csv", scope.file_suffix()))
    }

    /// Append-only trade-history CSV for one scope.
    pub fn trade_history_file(&self, scope: Scope) -> PathBuf {
        self.logs()
            .join(format!("trade_history_{}.csv", scope.file_suffix()))
    }

    /// Append-only fill-adjustment audit CSV for one scope.
    pub fn adjustments_file(&self, scope: Scope) -> PathBuf {
        self.logs()
            .join(format!("bankroll_adjustments_{}.csv", scope.file_suffix()))
    }

    /// Ensure all directories exist
    pub fn ensure_directories(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.root)?;
        std::fs::create_dir_all(self.logs())?;
        Ok(())
    }

    /// Scopes that have a ledger file on disk, from the file names alone.
    pub fn discover_scopes(&self) -> Result<Vec<Scope>> {
        let mut scopes = Vec::new();
        if !self.root.exists() {
            return Ok(scopes);
        }
        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            let Some(suffix) = name
                .strip_prefix("bankroll_")
                .and_then(|rest| rest.strip_suffix(".json"))
            else {
                continue;
            };
            if let Ok(scope) = suffix.parse::<Scope>() {
                scopes.push(scope);
            }
        }
        scopes.sort_by_key(|s| (s.broker.as_str(), s.env.as_str()));
        Ok(scopes)
    }
}
