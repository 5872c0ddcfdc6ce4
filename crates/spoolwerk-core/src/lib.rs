// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Spoolwerk — Core types, status codes and configuration contracts shared
// across all crates.

pub mod config;
pub mod enumerate;
pub mod error;
pub mod forms;
pub mod status;
pub mod store;
pub mod types;

pub use config::SpoolerConfig;
pub use error::{Result, SpoolError};
pub use store::{ConfigStore, MonitorEntry, PrinterEntry};
pub use types::*;
