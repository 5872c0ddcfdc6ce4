// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Port-monitor plugin contract.
//
// A monitor module exports up to four initializers.  Three of them belong to
// successive generations of the monitor interface and return differently
// shaped function tables:
//
//   InitializePrintMonitor2  (gen 3)  instance token + table taking it
//   InitializePrintMonitor   (gen 2)  table without an instance token
//   InitializeMonitorEx      (gen 1)  caller-allocated table filled in place
//
// The fourth, InitializePrintMonitorUI, returns the port dialog table.  The
// loader probes newest-first and folds whichever table it gets into one
// `MonitorTable` whose slots are all optional.

use std::sync::Arc;

use spoolwerk_core::error::Result;
use spoolwerk_core::store::ConfigStore;
use spoolwerk_core::types::{DocInfo, PortInfo, XcvReply};

/// Opaque monitor instance returned by a generation-3 initializer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MonitorInstance(pub u64);

/// Token for an open port, assigned by the monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PortToken(pub u64);

/// Token for an open administrative channel, assigned by the monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct XcvToken(pub u64);

/// Context handed to every monitor initializer.
#[derive(Clone)]
pub struct MonitorInit {
    /// Registered monitor name.
    pub name: String,
    /// Configuration the monitor may read and update (its port list).
    pub store: Arc<dyn ConfigStore>,
    pub local: bool,
}

/// Which initializer produced a monitor's table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Generation {
    /// `InitializePrintMonitor2`.
    Monitor2,
    /// `InitializePrintMonitor`.
    PrintMonitor,
    /// `InitializeMonitorEx`.
    MonitorEx,
    /// Only `InitializePrintMonitorUI` was found.
    UiOnly,
}

// -- Slots shared by every generation --

pub type StartDocFn = Arc<dyn Fn(PortToken, &str, u32, &DocInfo) -> Result<()> + Send + Sync>;
pub type WritePortFn = Arc<dyn Fn(PortToken, &[u8]) -> Result<usize> + Send + Sync>;
pub type ReadPortFn = Arc<dyn Fn(PortToken, &mut [u8]) -> Result<usize> + Send + Sync>;
/// `end_doc` and `close_port`.
pub type PortTokenFn = Arc<dyn Fn(PortToken) -> Result<()> + Send + Sync>;
pub type XcvDataFn = Arc<dyn Fn(XcvToken, &str, &[u8], &mut [u8]) -> XcvReply + Send + Sync>;
pub type XcvCloseFn = Arc<dyn Fn(XcvToken) -> Result<()> + Send + Sync>;

// -- Normalized (instance-free) slots --

/// Arguments: server name.
pub type EnumPortsFn = Arc<dyn Fn(Option<&str>) -> Result<Vec<PortInfo>> + Send + Sync>;
pub type OpenPortFn = Arc<dyn Fn(&str) -> Result<PortToken> + Send + Sync>;
/// Arguments: server name, monitor name, port name.
pub type AddPortFn = Arc<dyn Fn(Option<&str>, &str, &str) -> Result<()> + Send + Sync>;
/// Arguments: server name, structure level, port, monitor name.
pub type AddPortExFn = Arc<dyn Fn(Option<&str>, u32, &PortInfo, &str) -> Result<()> + Send + Sync>;
/// `configure_port` and `delete_port`.  Arguments: server name, port name.
pub type PortNameFn = Arc<dyn Fn(Option<&str>, &str) -> Result<()> + Send + Sync>;
/// Arguments: object (port name or empty), granted access.
pub type XcvOpenFn = Arc<dyn Fn(&str, u32) -> Result<XcvToken> + Send + Sync>;
pub type ShutdownFn = Arc<dyn Fn() + Send + Sync>;

// -- Generation-3 slots taking the instance token --

pub type EnumPorts2Fn =
    Arc<dyn Fn(MonitorInstance, Option<&str>) -> Result<Vec<PortInfo>> + Send + Sync>;
pub type OpenPort2Fn = Arc<dyn Fn(MonitorInstance, &str) -> Result<PortToken> + Send + Sync>;
pub type AddPort2Fn =
    Arc<dyn Fn(MonitorInstance, Option<&str>, &str, &str) -> Result<()> + Send + Sync>;
pub type AddPortEx2Fn = Arc<
    dyn Fn(MonitorInstance, Option<&str>, u32, &PortInfo, &str) -> Result<()> + Send + Sync,
>;
pub type PortName2Fn =
    Arc<dyn Fn(MonitorInstance, Option<&str>, &str) -> Result<()> + Send + Sync>;
pub type XcvOpen2Fn = Arc<dyn Fn(MonitorInstance, &str, u32) -> Result<XcvToken> + Send + Sync>;
pub type Shutdown2Fn = Arc<dyn Fn(MonitorInstance) + Send + Sync>;

/// Generation-3 table.
#[derive(Clone, Default)]
pub struct Monitor2 {
    pub enum_ports: Option<EnumPorts2Fn>,
    pub open_port: Option<OpenPort2Fn>,
    pub start_doc: Option<StartDocFn>,
    pub write_port: Option<WritePortFn>,
    pub read_port: Option<ReadPortFn>,
    pub end_doc: Option<PortTokenFn>,
    pub close_port: Option<PortTokenFn>,
    pub add_port: Option<AddPort2Fn>,
    pub add_port_ex: Option<AddPortEx2Fn>,
    pub configure_port: Option<PortName2Fn>,
    pub delete_port: Option<PortName2Fn>,
    pub xcv_open: Option<XcvOpen2Fn>,
    pub xcv_data: Option<XcvDataFn>,
    pub xcv_close: Option<XcvCloseFn>,
    pub shutdown: Option<Shutdown2Fn>,
}

/// Generation-1/2 table. These generations have no shutdown hook.
#[derive(Clone, Default)]
pub struct PrintMonitor {
    pub enum_ports: Option<EnumPortsFn>,
    pub open_port: Option<OpenPortFn>,
    pub start_doc: Option<StartDocFn>,
    pub write_port: Option<WritePortFn>,
    pub read_port: Option<ReadPortFn>,
    pub end_doc: Option<PortTokenFn>,
    pub close_port: Option<PortTokenFn>,
    pub add_port: Option<AddPortFn>,
    pub add_port_ex: Option<AddPortExFn>,
    pub configure_port: Option<PortNameFn>,
    pub delete_port: Option<PortNameFn>,
    pub xcv_open: Option<XcvOpenFn>,
    pub xcv_data: Option<XcvDataFn>,
    pub xcv_close: Option<XcvCloseFn>,
}

/// Request/response channel to a monitor's administrative interface.
///
/// UI modules drive the monitor through this instead of opening their own
/// handle.
pub trait XcvChannel {
    fn xcv_data(&mut self, command: &str, input: &[u8], output: &mut [u8]) -> Result<XcvReply>;
}

/// Arguments: server name, monitor name, requested port name, channel.
/// Returns the name of the port that was added.
pub type AddPortUiFn =
    Arc<dyn Fn(Option<&str>, &str, &str, &mut dyn XcvChannel) -> Result<String> + Send + Sync>;
/// Arguments: server name, port name, channel.
pub type PortUiFn =
    Arc<dyn Fn(Option<&str>, &str, &mut dyn XcvChannel) -> Result<()> + Send + Sync>;

/// Table returned by `InitializePrintMonitorUI`.
#[derive(Clone, Default)]
pub struct MonitorUi {
    pub add_port_ui: Option<AddPortUiFn>,
    pub configure_port_ui: Option<PortUiFn>,
    pub delete_port_ui: Option<PortUiFn>,
}

pub type InitializePrintMonitor2 = fn(&MonitorInit) -> Option<(MonitorInstance, Monitor2)>;
pub type InitializePrintMonitor = fn(&MonitorInit) -> Option<PrintMonitor>;
pub type InitializeMonitorEx = fn(&MonitorInit, &mut PrintMonitor) -> bool;
pub type InitializePrintMonitorUi = fn() -> Option<MonitorUi>;

/// The single internal dispatch table every generation is folded into.
#[derive(Clone, Default)]
pub struct MonitorTable {
    pub enum_ports: Option<EnumPortsFn>,
    pub open_port: Option<OpenPortFn>,
    pub start_doc: Option<StartDocFn>,
    pub write_port: Option<WritePortFn>,
    pub read_port: Option<ReadPortFn>,
    pub end_doc: Option<PortTokenFn>,
    pub close_port: Option<PortTokenFn>,
    pub add_port: Option<AddPortFn>,
    pub add_port_ex: Option<AddPortExFn>,
    pub configure_port: Option<PortNameFn>,
    pub delete_port: Option<PortNameFn>,
    pub xcv_open: Option<XcvOpenFn>,
    pub xcv_data: Option<XcvDataFn>,
    pub xcv_close: Option<XcvCloseFn>,
    pub shutdown: Option<ShutdownFn>,
}

impl MonitorTable {
    /// True when no slot at all is populated.
    pub fn is_empty(&self) -> bool {
        self.enum_ports.is_none()
            && self.open_port.is_none()
            && self.start_doc.is_none()
            && self.write_port.is_none()
            && self.read_port.is_none()
            && self.end_doc.is_none()
            && self.close_port.is_none()
            && self.add_port.is_none()
            && self.add_port_ex.is_none()
            && self.configure_port.is_none()
            && self.delete_port.is_none()
            && self.xcv_open.is_none()
            && self.xcv_data.is_none()
            && self.xcv_close.is_none()
            && self.shutdown.is_none()
    }

    /// Bind a generation-3 table to its instance token.
    pub fn from_monitor2(instance: MonitorInstance, m: Monitor2) -> Self {
        Self {
            enum_ports: m.enum_ports.map(|f| -> EnumPortsFn {
                Arc::new(move |server: Option<&str>| f(instance, server))
            }),
            open_port: m
                .open_port
                .map(|f| -> OpenPortFn { Arc::new(move |name: &str| f(instance, name)) }),
            start_doc: m.start_doc,
            write_port: m.write_port,
            read_port: m.read_port,
            end_doc: m.end_doc,
            close_port: m.close_port,
            add_port: m.add_port.map(|f| -> AddPortFn {
                Arc::new(move |server: Option<&str>, monitor: &str, port: &str| {
                    f(instance, server, monitor, port)
                })
            }),
            add_port_ex: m.add_port_ex.map(|f| -> AddPortExFn {
                Arc::new(move |server: Option<&str>, level: u32, port: &PortInfo, monitor: &str| {
                    f(instance, server, level, port, monitor)
                })
            }),
            configure_port: m.configure_port.map(|f| -> PortNameFn {
                Arc::new(move |server: Option<&str>, port: &str| f(instance, server, port))
            }),
            delete_port: m.delete_port.map(|f| -> PortNameFn {
                Arc::new(move |server: Option<&str>, port: &str| f(instance, server, port))
            }),
            xcv_open: m.xcv_open.map(|f| -> XcvOpenFn {
                Arc::new(move |object: &str, access: u32| f(instance, object, access))
            }),
            xcv_data: m.xcv_data,
            xcv_close: m.xcv_close,
            shutdown: m
                .shutdown
                .map(|f| -> ShutdownFn { Arc::new(move || f(instance)) }),
        }
    }

    /// Adopt a generation-1/2 table.
    pub fn from_print_monitor(m: PrintMonitor) -> Self {
        Self {
            enum_ports: m.enum_ports,
            open_port: m.open_port,
            start_doc: m.start_doc,
            write_port: m.write_port,
            read_port: m.read_port,
            end_doc: m.end_doc,
            close_port: m.close_port,
            add_port: m.add_port,
            add_port_ex: m.add_port_ex,
            configure_port: m.configure_port,
            delete_port: m.delete_port,
            xcv_open: m.xcv_open,
            xcv_data: m.xcv_data,
            xcv_close: m.xcv_close,
            shutdown: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[test]
    fn monitor2_slots_receive_instance() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_open = Arc::clone(&seen);
        let seen_down = Arc::clone(&seen);
        let m2 = Monitor2 {
            open_port: Some(Arc::new(move |inst: MonitorInstance, name: &str| {
                seen_open.lock().expect("lock").push((inst.0, name.to_string()));
                Ok(PortToken(7))
            })),
            shutdown: Some(Arc::new(move |inst: MonitorInstance| {
                seen_down.lock().expect("lock").push((inst.0, "shutdown".into()));
            })),
            ..Monitor2::default()
        };

        let table = MonitorTable::from_monitor2(MonitorInstance(42), m2);
        assert!(!table.is_empty());
        let open = table.open_port.clone().expect("open slot");
        assert_eq!(open("LPT1:").expect("open"), PortToken(7));
        (table.shutdown.clone().expect("shutdown slot"))();

        let seen = seen.lock().expect("lock");
        assert_eq!(seen[0], (42, "LPT1:".to_string()));
        assert_eq!(seen[1], (42, "shutdown".to_string()));
        assert!(table.write_port.is_none());
    }

    #[test]
    fn print_monitor_has_no_shutdown() {
        let pm = PrintMonitor {
            close_port: Some(Arc::new(|_: PortToken| Ok(()))),
            ..PrintMonitor::default()
        };
        let table = MonitorTable::from_print_monitor(pm);
        assert!(table.close_port.is_some());
        assert!(table.shutdown.is_none());
        assert!(MonitorTable::default().is_empty());
    }
}
