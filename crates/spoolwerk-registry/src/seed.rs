// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Default configuration for a fresh store.

use tracing::info;

use spoolwerk_core::error::Result;
use spoolwerk_core::store::{ConfigStore, MonitorEntry};
use spoolwerk_core::types::{LOCAL_ENVIRONMENT, LOCAL_PORT_MONITOR};

/// Built-in module implementing the "Local Port" monitor.
pub const LOCAL_MONITOR_DRIVER: &str = "localspl";

/// Ports the "Local Port" monitor starts with, and the devices they map to.
const DEFAULT_PORTS: &[(&str, Option<&str>)] = &[
    ("LPT1:", Some("/dev/lp0")),
    ("LPT2:", Some("/dev/lp1")),
    ("COM1:", Some("/dev/ttyS0")),
    ("COM2:", Some("/dev/ttyS1")),
    ("FILE:", None),
];

/// Register the "Local Port" monitor and its default ports.
///
/// Does nothing when the monitor is already registered, so it is safe to
/// call on every start.
pub fn seed_defaults(store: &dyn ConfigStore) -> Result<()> {
    if store.monitor(LOCAL_PORT_MONITOR)?.is_some() {
        return Ok(());
    }
    store.add_monitor(&MonitorEntry {
        name: LOCAL_PORT_MONITOR.to_string(),
        driver: LOCAL_MONITOR_DRIVER.to_string(),
        environment: LOCAL_ENVIRONMENT.to_string(),
    })?;
    for (port, device) in DEFAULT_PORTS {
        store.add_monitor_port(LOCAL_PORT_MONITOR, port)?;
        if let Some(path) = device {
            store.set_device_path(port, Some(path))?;
        }
    }
    info!(ports = DEFAULT_PORTS.len(), "seeded default Local Port monitor");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MemoryStore, SqliteStore};

    #[test]
    fn seeding_is_idempotent() {
        let store = SqliteStore::open_in_memory().expect("open");
        seed_defaults(&store).expect("seed");
        seed_defaults(&store).expect("seed again");
        assert_eq!(store.monitor_names().expect("names"), vec![LOCAL_PORT_MONITOR.to_string()]);
        assert_eq!(store.monitor_ports(LOCAL_PORT_MONITOR).expect("ports").len(), 5);
    }

    #[test]
    fn seeded_parallel_port_maps_to_device() {
        let store = MemoryStore::new();
        seed_defaults(&store).expect("seed");
        assert_eq!(store.device_path("LPT1:").expect("device").as_deref(), Some("/dev/lp0"));
        assert!(store.device_path("FILE:").expect("device").is_none());
        assert_eq!(
            store.monitor(LOCAL_PORT_MONITOR).expect("get").map(|m| m.driver),
            Some(LOCAL_MONITOR_DRIVER.to_string())
        );
    }
}
