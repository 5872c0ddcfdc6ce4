// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Spooler configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;

/// Process-wide settings for a spooler provider instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpoolerConfig {
    /// Directory where spool files are created.
    pub spool_dir: PathBuf,
    /// Name this machine answers to in `\\server\printer` names.
    pub computer_name: String,
    /// Print processor used when a printer has none configured.
    pub default_print_processor: String,
    /// Data type used when neither the document nor the printer names one.
    pub default_datatype: String,
    /// Upper bound of the job-id counter before it wraps back to 1.
    pub max_job_id: u32,
    /// LPD host used by `LPR:` ports.
    pub lpd_host: String,
    /// LPD port (default 515).
    pub lpd_port: u16,
    /// `host:port` of the CUPS server used by `CUPS:` ports.
    pub cups_server: String,
    /// Timeout for network deliveries, in seconds.
    pub network_timeout_secs: u64,
    /// SQLite database holding monitors, ports and printers.
    pub database_path: Option<PathBuf>,
}

impl Default for SpoolerConfig {
    fn default() -> Self {
        Self {
            spool_dir: std::env::temp_dir().join("spoolwerk"),
            computer_name: "localhost".into(),
            default_print_processor: "winprint".into(),
            default_datatype: crate::types::DATATYPE_RAW.into(),
            max_job_id: 99_999,
            lpd_host: "localhost".into(),
            lpd_port: 515,
            cups_server: "localhost:631".into(),
            network_timeout_secs: 30,
            database_path: None,
        }
    }
}

impl SpoolerConfig {
    /// Read a JSON configuration file. Missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        debug!(path = %path.display(), "spooler configuration loaded");
        Ok(config)
    }

    /// Write the configuration as pretty-printed JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        let raw = serde_json::to_string_pretty(self)?;
        std::fs::write(path, raw)?;
        Ok(())
    }
}
