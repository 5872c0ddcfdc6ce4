// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// In-memory configuration store.
//
// Keeps everything in insertion-ordered vectors behind one mutex.  Used by
// tests and by callers that do not need configuration to survive a restart.

use std::sync::{Mutex, MutexGuard, PoisonError};

use spoolwerk_core::error::{Result, SpoolError};
use spoolwerk_core::store::{ConfigStore, MonitorEntry, PrinterEntry};
use spoolwerk_core::types::FormInfo;

#[derive(Default)]
struct Inner {
    monitors: Vec<MonitorEntry>,
    /// (monitor, port)
    ports: Vec<(String, String)>,
    /// (monitor, key, value)
    values: Vec<(String, String, String)>,
    printers: Vec<PrinterEntry>,
    forms: Vec<FormInfo>,
    redirects: Vec<(String, String)>,
    devices: Vec<(String, String)>,
}

/// Volatile [`ConfigStore`].
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn same(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

/// Insert or replace a keyed pair, or remove it when `value` is `None`.
fn set_pair(pairs: &mut Vec<(String, String)>, key: &str, value: Option<&str>) {
    pairs.retain(|(k, _)| !same(k, key));
    if let Some(v) = value {
        pairs.push((key.to_string(), v.to_string()));
    }
}

fn get_pair(pairs: &[(String, String)], key: &str) -> Option<String> {
    pairs
        .iter()
        .find(|(k, _)| same(k, key))
        .map(|(_, v)| v.clone())
}

impl ConfigStore for MemoryStore {
    fn monitor_names(&self) -> Result<Vec<String>> {
        Ok(self.inner().monitors.iter().map(|m| m.name.clone()).collect())
    }

    fn monitor(&self, name: &str) -> Result<Option<MonitorEntry>> {
        Ok(self
            .inner()
            .monitors
            .iter()
            .find(|m| same(&m.name, name))
            .cloned())
    }

    fn add_monitor(&self, entry: &MonitorEntry) -> Result<()> {
        let mut inner = self.inner();
        if inner.monitors.iter().any(|m| same(&m.name, &entry.name)) {
            return Err(SpoolError::AlreadyExists(entry.name.clone()));
        }
        inner.monitors.push(entry.clone());
        Ok(())
    }

    fn delete_monitor(&self, name: &str) -> Result<bool> {
        let mut inner = self.inner();
        let before = inner.monitors.len();
        inner.monitors.retain(|m| !same(&m.name, name));
        let removed = inner.monitors.len() != before;
        if removed {
            inner.ports.retain(|(m, _)| !same(m, name));
            inner.values.retain(|(m, _, _)| !same(m, name));
        }
        Ok(removed)
    }

    fn monitor_ports(&self, monitor: &str) -> Result<Vec<String>> {
        Ok(self
            .inner()
            .ports
            .iter()
            .filter(|(m, _)| same(m, monitor))
            .map(|(_, p)| p.clone())
            .collect())
    }

    fn add_monitor_port(&self, monitor: &str, port: &str) -> Result<()> {
        let mut inner = self.inner();
        if inner
            .ports
            .iter()
            .any(|(m, p)| same(m, monitor) && same(p, port))
        {
            return Err(SpoolError::AlreadyExists(port.to_string()));
        }
        inner.ports.push((monitor.to_string(), port.to_string()));
        Ok(())
    }

    fn delete_monitor_port(&self, monitor: &str, port: &str) -> Result<bool> {
        let mut inner = self.inner();
        let before = inner.ports.len();
        inner
            .ports
            .retain(|(m, p)| !(same(m, monitor) && same(p, port)));
        Ok(inner.ports.len() != before)
    }

    fn monitor_value(&self, monitor: &str, key: &str) -> Result<Option<String>> {
        Ok(self
            .inner()
            .values
            .iter()
            .find(|(m, k, _)| same(m, monitor) && same(k, key))
            .map(|(_, _, v)| v.clone()))
    }

    fn set_monitor_value(&self, monitor: &str, key: &str, value: &str) -> Result<()> {
        let mut inner = self.inner();
        inner
            .values
            .retain(|(m, k, _)| !(same(m, monitor) && same(k, key)));
        inner
            .values
            .push((monitor.to_string(), key.to_string(), value.to_string()));
        Ok(())
    }

    fn printer(&self, name: &str) -> Result<Option<PrinterEntry>> {
        Ok(self
            .inner()
            .printers
            .iter()
            .find(|p| p.name == name)
            .cloned())
    }

    fn put_printer(&self, entry: &PrinterEntry) -> Result<()> {
        let mut inner = self.inner();
        match inner.printers.iter_mut().find(|p| p.name == entry.name) {
            Some(existing) => *existing = entry.clone(),
            None => inner.printers.push(entry.clone()),
        }
        Ok(())
    }

    fn delete_printer(&self, name: &str) -> Result<bool> {
        let mut inner = self.inner();
        let before = inner.printers.len();
        inner.printers.retain(|p| p.name != name);
        Ok(inner.printers.len() != before)
    }

    fn printer_names(&self) -> Result<Vec<String>> {
        Ok(self.inner().printers.iter().map(|p| p.name.clone()).collect())
    }

    fn form_names(&self) -> Result<Vec<String>> {
        Ok(self.inner().forms.iter().map(|f| f.name.clone()).collect())
    }

    fn form(&self, name: &str) -> Result<Option<FormInfo>> {
        Ok(self.inner().forms.iter().find(|f| f.name == name).cloned())
    }

    fn add_form(&self, form: &FormInfo) -> Result<()> {
        let mut inner = self.inner();
        if inner.forms.iter().any(|f| f.name == form.name) {
            return Err(SpoolError::AlreadyExists(form.name.clone()));
        }
        inner.forms.push(form.clone());
        Ok(())
    }

    fn update_form(&self, form: &FormInfo) -> Result<bool> {
        Ok(match self.inner().forms.iter_mut().find(|f| f.name == form.name) {
            Some(existing) => {
                *existing = form.clone();
                true
            }
            None => false,
        })
    }

    fn delete_form(&self, name: &str) -> Result<bool> {
        let mut inner = self.inner();
        let before = inner.forms.len();
        inner.forms.retain(|f| f.name != name);
        Ok(inner.forms.len() != before)
    }

    fn port_redirect(&self, port: &str) -> Result<Option<String>> {
        Ok(get_pair(&self.inner().redirects, port))
    }

    fn set_port_redirect(&self, port: &str, target: Option<&str>) -> Result<()> {
        set_pair(&mut self.inner().redirects, port, target);
        Ok(())
    }

    fn device_path(&self, dos_name: &str) -> Result<Option<String>> {
        Ok(get_pair(&self.inner().devices, dos_name))
    }

    fn set_device_path(&self, dos_name: &str, path: Option<&str>) -> Result<()> {
        set_pair(&mut self.inner().devices, dos_name, path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monitor(name: &str) -> MonitorEntry {
        MonitorEntry {
            name: name.into(),
            driver: "localspl".into(),
            environment: "Windows x64".into(),
        }
    }

    #[test]
    fn monitor_names_compare_case_insensitively() {
        let store = MemoryStore::new();
        store.add_monitor(&monitor("Local Port")).expect("add");
        assert!(store.monitor("local port").expect("lookup").is_some());
        assert!(matches!(
            store.add_monitor(&monitor("LOCAL PORT")),
            Err(SpoolError::AlreadyExists(_))
        ));
    }

    #[test]
    fn deleting_monitor_drops_its_ports() {
        let store = MemoryStore::new();
        store.add_monitor(&monitor("Net Port")).expect("add");
        store.add_monitor_port("Net Port", "NET1:").expect("port");
        assert_eq!(store.port_owner("net1:").expect("owner").as_deref(), Some("Net Port"));

        assert!(store.delete_monitor("Net Port").expect("delete"));
        assert!(store.monitor_ports("Net Port").expect("ports").is_empty());
        assert!(!store.delete_monitor("Net Port").expect("delete again"));
    }

    #[test]
    fn printers_are_exact_and_replaceable() {
        let store = MemoryStore::new();
        store
            .put_printer(&PrinterEntry::new("Laser", "LPT1:", "winprint"))
            .expect("put");
        assert!(store.printer("laser").expect("lookup").is_none());

        let mut updated = PrinterEntry::new("Laser", "FILE:", "winprint");
        updated.datatype = Some("TEXT".into());
        store.put_printer(&updated).expect("replace");
        assert_eq!(store.printer_names().expect("names"), vec!["Laser".to_string()]);
        assert_eq!(store.printer("Laser").expect("lookup"), Some(updated));
    }

    #[test]
    fn forms_are_exact_and_unique() {
        let store = MemoryStore::new();
        store.add_form(&FormInfo::new("Label", 100_000, 50_000)).expect("add");
        assert!(store.form("label").expect("lookup").is_none());
        assert!(matches!(
            store.add_form(&FormInfo::new("Label", 1, 1)),
            Err(SpoolError::AlreadyExists(_))
        ));

        let wider = FormInfo::new("Label", 120_000, 50_000);
        assert!(store.update_form(&wider).expect("update"));
        assert_eq!(store.form("Label").expect("lookup"), Some(wider));
        assert!(!store.update_form(&FormInfo::new("Other", 1, 1)).expect("update"));

        assert!(store.delete_form("Label").expect("delete"));
        assert!(store.form_names().expect("names").is_empty());
    }

    #[test]
    fn redirect_can_be_cleared() {
        let store = MemoryStore::new();
        store.set_port_redirect("LPT1:", Some("|cat")).expect("set");
        assert_eq!(store.port_redirect("lpt1:").expect("get").as_deref(), Some("|cat"));
        store.set_port_redirect("LPT1:", None).expect("clear");
        assert!(store.port_redirect("LPT1:").expect("get").is_none());
    }
}
