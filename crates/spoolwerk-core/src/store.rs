// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Configuration store contract.
//
// Monitors, their ports, printers, user forms and port redirections live in a
// persistent store owned outside the provider. Monitor names compare
// case-insensitively; printer and form names are exact.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::{FormInfo, PrinterAttributes};

/// A registered port monitor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorEntry {
    pub name: String,
    /// Module path (or built-in module name) implementing the monitor.
    pub driver: String,
    pub environment: String,
}

/// Stored configuration of one printer queue.
///
/// `port` and `print_processor` are required to open the printer; a record
/// missing either is treated as an unknown printer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrinterEntry {
    pub name: String,
    pub port: Option<String>,
    pub print_processor: Option<String>,
    pub datatype: Option<String>,
    pub attributes: PrinterAttributes,
    pub devmode: Option<Vec<u8>>,
}

impl PrinterEntry {
    /// Entry with the required fields filled in.
    pub fn new(name: &str, port: &str, print_processor: &str) -> Self {
        Self {
            name: name.to_string(),
            port: Some(port.to_string()),
            print_processor: Some(print_processor.to_string()),
            ..Self::default()
        }
    }
}

/// Backing store for spooler configuration.
///
/// Implementations must be safe to share between threads; every method takes
/// `&self`.
pub trait ConfigStore: Send + Sync {
    // -- Monitors --
    fn monitor_names(&self) -> Result<Vec<String>>;
    fn monitor(&self, name: &str) -> Result<Option<MonitorEntry>>;
    /// Fails with `AlreadyExists` if a monitor of that name is registered.
    fn add_monitor(&self, entry: &MonitorEntry) -> Result<()>;
    /// Returns `false` if nothing was registered under `name`.
    fn delete_monitor(&self, name: &str) -> Result<bool>;

    // -- Ports, grouped by owning monitor --
    fn monitor_ports(&self, monitor: &str) -> Result<Vec<String>>;
    /// Fails with `AlreadyExists` if the monitor already lists the port.
    fn add_monitor_port(&self, monitor: &str, port: &str) -> Result<()>;
    fn delete_monitor_port(&self, monitor: &str, port: &str) -> Result<bool>;

    // -- Free-form per-monitor values --
    fn monitor_value(&self, monitor: &str, key: &str) -> Result<Option<String>>;
    fn set_monitor_value(&self, monitor: &str, key: &str, value: &str) -> Result<()>;

    // -- Printers --
    fn printer(&self, name: &str) -> Result<Option<PrinterEntry>>;
    fn put_printer(&self, entry: &PrinterEntry) -> Result<()>;
    fn delete_printer(&self, name: &str) -> Result<bool>;
    fn printer_names(&self) -> Result<Vec<String>>;

    // -- User forms; built-in forms are never stored --
    fn form_names(&self) -> Result<Vec<String>>;
    fn form(&self, name: &str) -> Result<Option<FormInfo>>;
    /// Fails with `AlreadyExists` if a form of that name is stored.
    fn add_form(&self, form: &FormInfo) -> Result<()>;
    /// Replaces the stored form named `form.name`; `false` if there is none.
    fn update_form(&self, form: &FormInfo) -> Result<bool>;
    fn delete_form(&self, name: &str) -> Result<bool>;

    // -- Port redirection (`|command` or a file path) --
    fn port_redirect(&self, port: &str) -> Result<Option<String>>;
    fn set_port_redirect(&self, port: &str, target: Option<&str>) -> Result<()>;

    // -- DOS device map, e.g. `LPT1:` -> `/dev/lp0` --
    fn device_path(&self, dos_name: &str) -> Result<Option<String>>;
    fn set_device_path(&self, dos_name: &str, path: Option<&str>) -> Result<()>;

    /// Name of the registered monitor listing `port`, if any.
    fn port_owner(&self, port: &str) -> Result<Option<String>> {
        for monitor in self.monitor_names()? {
            let ports = self.monitor_ports(&monitor)?;
            if ports.iter().any(|p| p.eq_ignore_ascii_case(port)) {
                return Ok(Some(monitor));
            }
        }
        Ok(None)
    }
}
