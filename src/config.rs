//! Configuration
//!
//! Settings come from an optional TOML file. Relative paths are resolved
//! against `base_path`, which defaults to `$BASE_PATH` or the working
//! directory.
//!
//! ```toml
//! header_rows = 12
//! input_file = "files/input.csv"
//!
//! [alerts]
//! maintenance_minimum = 8
//!
//! [[sectors]]
//! name = "Setor 9.1"
//! responsible = "Setor 9.1"
//! localities = ["INTERLAGOS"]
//! ```

use crate::alerts::AlertRules;
use crate::error::ReportError;
use crate::sectors::SectorTable;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable pointing at a TOML config file
pub const ENV_CONFIG_PATH: &str = "LEDGER_CONFIG";
/// Environment variable overriding the base path
pub const ENV_BASE_PATH: &str = "BASE_PATH";

/// Header rows in the exported attendance CSV
pub const DEFAULT_HEADER_ROWS: usize = 12;

/// Runtime configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    pub base_path: PathBuf,
    pub input_file: PathBuf,
    pub books_file: PathBuf,
    pub output_dir: PathBuf,
    pub reports_dir: PathBuf,
    /// Leading rows to skip in both input files
    pub header_rows: usize,
    pub alerts: AlertRules,
    /// Sector table; the built-in reference table when omitted
    pub sectors: Option<SectorTable>,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            base_path: PathBuf::from("."),
            input_file: PathBuf::from("files/input.csv"),
            books_file: PathBuf::from("files/books.csv"),
            output_dir: PathBuf::from("files/output"),
            reports_dir: PathBuf::from("data/reports"),
            header_rows: DEFAULT_HEADER_ROWS,
            alerts: AlertRules::default(),
            sectors: None,
        }
    }
}

impl ReportConfig {
    /// Parse configuration from TOML text
    pub fn from_toml(s: &str) -> Result<Self, ReportError> {
        toml::from_str(s).map_err(|e| ReportError::Config(e.to_string()))
    }

    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self, ReportError> {
        let content = fs::read_to_string(path).map_err(|e| {
            ReportError::Config(format!("reading {}: {}", path.display(), e))
        })?;
        Self::from_toml(&content)
    }

    /// Load from `$LEDGER_CONFIG` if set, else defaults; `$BASE_PATH` overrides the base path
    pub fn from_env() -> Result<Self, ReportError> {
        let mut config = match std::env::var(ENV_CONFIG_PATH) {
            Ok(path) => Self::load(Path::new(&path))?,
            Err(_) => Self::default(),
        };
        if let Some(base) = std::env::var(ENV_BASE_PATH).ok().filter(|v| !v.is_empty()) {
            config.base_path = PathBuf::from(base);
        }
        Ok(config)
    }

    pub fn input_path(&self) -> PathBuf {
        self.resolve(&self.input_file)
    }

    pub fn books_path(&self) -> PathBuf {
        self.resolve(&self.books_file)
    }

    pub fn output_path(&self) -> PathBuf {
        self.resolve(&self.output_dir)
    }

    pub fn reports_path(&self) -> PathBuf {
        self.resolve(&self.reports_dir)
    }

    /// Configured sector table, or the built-in one
    pub fn sector_table(&self) -> SectorTable {
        self.sectors.clone().unwrap_or_else(SectorTable::reference)
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_path.join(path)
        }
    }
}
