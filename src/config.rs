//! Ledger backend selection.
//!
//! ```
//! use certledger::config::LedgerConfig;
//!
//! let config = LedgerConfig::from_json_str(r#"{"backend": "file", "path": "ledger.json"}"#).unwrap();
//! assert_eq!(config, LedgerConfig::File { path: "ledger.json".into() });
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{LedgerError, LedgerResult};
use crate::ledger::{FileLedger, Ledger, SqlLedger};

pub use crate::ledger::sql::SqlDialect;

/// Path used by [`LedgerConfig::default`].
pub const DEFAULT_FILE_PATH: &str = "file.db";

/// Which ledger backend to use and where it keeps its data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum LedgerConfig {
    /// JSON snapshot at `path`.
    File { path: PathBuf },
    /// SQL database. For SQLite the connection string is a file path or `:memory:`.
    Sql {
        #[serde(default)]
        dialect: SqlDialect,
        connection_string: String,
    },
}

impl Default for LedgerConfig {
    fn default() -> Self {
        LedgerConfig::File {
            path: PathBuf::from(DEFAULT_FILE_PATH),
        }
    }
}

impl LedgerConfig {
    pub fn from_json_str(text: &str) -> LedgerResult<Self> {
        serde_json::from_str(text).map_err(|e| LedgerError::InvalidConfig(e.to_string()))
    }

    /// Builds the configured backend without opening it.
    pub fn build(&self) -> LedgerResult<Box<dyn Ledger>> {
        match self {
            LedgerConfig::File { path } => {
                if path.as_os_str().is_empty() {
                    return Err(LedgerError::InvalidConfig("empty file path".to_string()));
                }
                Ok(Box::new(FileLedger::new(path)))
            }
            LedgerConfig::Sql {
                dialect,
                connection_string,
            } => {
                if connection_string.is_empty() {
                    return Err(LedgerError::InvalidConfig(
                        "empty connection string".to_string(),
                    ));
                }
                Ok(Box::new(SqlLedger::new(*dialect, connection_string.clone())))
            }
        }
    }

    /// Builds, opens and provisions the configured backend.
    pub fn connect(&self) -> LedgerResult<Box<dyn Ledger>> {
        debug!(config = ?self, "connecting ledger");
        let ledger = self.build()?;
        ledger.open()?;
        ledger.provision()?;
        Ok(ledger)
    }
}
