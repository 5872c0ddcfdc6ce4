// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Loaded port monitors.
//
// Exactly one `Monitor` exists per distinct name.  Every lookup hands out a
// counted `MonitorRef`; the module is released when the last reference goes.
// The first "Local Port" monitor to load carries one extra reference for the
// life of the registry, so it stays resident between jobs.
//
// List scans, refcount changes and insertion/removal all happen under the one
// registry lock.  Shutdown hooks run under it too and must not call back in.

use std::ops::Deref;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info, instrument, warn};

use spoolwerk_core::error::{Result, SpoolError};
use spoolwerk_core::status;
use spoolwerk_core::store::{ConfigStore, MonitorEntry};
use spoolwerk_core::types::{
    LOCAL_ENVIRONMENT, LOCAL_PORT_MONITOR, PortInfo, SERVER_ACCESS_ADMINISTER, XcvReply,
};

use crate::abi::{
    Generation, MonitorInit, MonitorTable, MonitorUi, PrintMonitor, XcvChannel, XcvToken,
};
use crate::module::{
    EntryPoint, INITIALIZE_MONITOR_EX, INITIALIZE_PRINT_MONITOR, INITIALIZE_PRINT_MONITOR2,
    INITIALIZE_PRINT_MONITOR_UI, ModuleLoader, PluginModule,
};

/// One loaded monitor module and its normalized tables.
pub struct Monitor {
    id: u64,
    name: String,
    dll_name: String,
    generation: Generation,
    table: MonitorTable,
    ui: Option<MonitorUi>,
    // Last field: dropped after the tables that point into it.
    _module: Box<dyn PluginModule>,
}

impl Monitor {
    /// Registered name; empty for a UI module loaded by path.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dll_name(&self) -> &str {
        &self.dll_name
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn table(&self) -> &MonitorTable {
        &self.table
    }

    pub fn ui(&self) -> Option<&MonitorUi> {
        self.ui.as_ref()
    }

    pub fn is_local_port(&self) -> bool {
        self.name.eq_ignore_ascii_case(LOCAL_PORT_MONITOR)
    }

    // -- Wrappers with slot checks --

    pub fn enum_ports(&self, server: Option<&str>) -> Result<Vec<PortInfo>> {
        match &self.table.enum_ports {
            Some(f) => f(server),
            None => Err(self.missing("EnumPorts")),
        }
    }

    pub fn add_port(&self, server: Option<&str>, monitor: &str, port: &str) -> Result<()> {
        match &self.table.add_port {
            Some(f) => f(server, monitor, port),
            None => Err(self.missing("AddPort")),
        }
    }

    pub fn add_port_ex(
        &self,
        server: Option<&str>,
        level: u32,
        port: &PortInfo,
        monitor: &str,
    ) -> Result<()> {
        match &self.table.add_port_ex {
            Some(f) => f(server, level, port, monitor),
            None => Err(self.missing("AddPortEx")),
        }
    }

    pub fn configure_port(&self, server: Option<&str>, port: &str) -> Result<()> {
        match &self.table.configure_port {
            Some(f) => f(server, port),
            None => Err(self.missing("ConfigurePort")),
        }
    }

    pub fn delete_port(&self, server: Option<&str>, port: &str) -> Result<()> {
        match &self.table.delete_port {
            Some(f) => f(server, port),
            None => Err(self.missing("DeletePort")),
        }
    }

    pub fn xcv_open(&self, object: &str, access: u32) -> Result<XcvToken> {
        match &self.table.xcv_open {
            Some(f) => f(object, access),
            None => Err(self.missing("XcvOpenPort")),
        }
    }

    pub fn xcv_data(
        &self,
        token: XcvToken,
        command: &str,
        input: &[u8],
        output: &mut [u8],
    ) -> Result<XcvReply> {
        match &self.table.xcv_data {
            Some(f) => Ok(f(token, command, input, output)),
            None => Err(self.missing("XcvDataPort")),
        }
    }

    pub fn xcv_close(&self, token: XcvToken) -> Result<()> {
        match &self.table.xcv_close {
            Some(f) => f(token),
            None => Ok(()),
        }
    }

    fn missing(&self, slot: &str) -> SpoolError {
        SpoolError::NotSupported(format!("{slot} is not implemented by monitor {:?}", self.name))
    }
}

struct Slot {
    monitor: Arc<Monitor>,
    refs: usize,
}

#[derive(Default)]
struct State {
    slots: Vec<Slot>,
    pinned_local: Option<u64>,
    next_id: u64,
}

impl State {
    fn slot_mut(&mut self, id: u64) -> Option<&mut Slot> {
        self.slots.iter_mut().find(|s| s.monitor.id == id)
    }

    /// Drop one reference; remove and shut down at zero.
    fn release(&mut self, id: u64) {
        let Some(pos) = self.slots.iter().position(|s| s.monitor.id == id) else {
            return;
        };
        let slot = &mut self.slots[pos];
        slot.refs = slot.refs.saturating_sub(1);
        if slot.refs == 0 {
            let slot = self.slots.remove(pos);
            shut_down(&slot.monitor);
        }
    }
}

fn shut_down(monitor: &Monitor) {
    if let Some(shutdown) = &monitor.table.shutdown {
        shutdown();
    }
    debug!(monitor = %monitor.name, dll = %monitor.dll_name, "monitor unloaded");
}

struct Shared {
    loader: Arc<dyn ModuleLoader>,
    store: Arc<dyn ConfigStore>,
    state: Mutex<State>,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Counted reference to a loaded monitor.  Dropping it releases the count.
pub struct MonitorRef {
    monitor: Arc<Monitor>,
    shared: Arc<Shared>,
}

impl Deref for MonitorRef {
    type Target = Monitor;

    fn deref(&self) -> &Monitor {
        &self.monitor
    }
}

impl Clone for MonitorRef {
    fn clone(&self) -> Self {
        if let Some(slot) = self.shared.state().slot_mut(self.monitor.id) {
            slot.refs += 1;
        }
        Self {
            monitor: Arc::clone(&self.monitor),
            shared: Arc::clone(&self.shared),
        }
    }
}

impl Drop for MonitorRef {
    fn drop(&mut self) {
        self.shared.state().release(self.monitor.id);
    }
}

impl std::fmt::Debug for MonitorRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MonitorRef")
            .field("name", &self.monitor.name)
            .field("dll", &self.monitor.dll_name)
            .finish()
    }
}

/// Owner of every loaded monitor.  Cloning shares the same registry.
#[derive(Clone)]
pub struct MonitorRegistry {
    shared: Arc<Shared>,
}

impl MonitorRegistry {
    pub fn new(loader: Arc<dyn ModuleLoader>, store: Arc<dyn ConfigStore>) -> Self {
        Self {
            shared: Arc::new(Shared {
                loader,
                store,
                state: Mutex::new(State::default()),
            }),
        }
    }

    pub fn store(&self) -> &Arc<dyn ConfigStore> {
        &self.shared.store
    }

    /// Return the loaded monitor `name`, loading it on first use.
    ///
    /// With no name, `module_path` is loaded as an anonymous UI module.
    #[instrument(skip(self))]
    pub fn load(&self, name: Option<&str>, module_path: Option<&str>) -> Result<MonitorRef> {
        let mut state = self.shared.state();

        if let Some(name) = name {
            if let Some(slot) = state
                .slots
                .iter_mut()
                .find(|s| !s.monitor.name.is_empty() && s.monitor.name.eq_ignore_ascii_case(name))
            {
                slot.refs += 1;
                return Ok(self.wrap(Arc::clone(&slot.monitor)));
            }
        }

        let driver = match (module_path, name) {
            (Some(path), _) => path.to_string(),
            (None, Some(name)) => self
                .shared
                .store
                .monitor(name)?
                .map(|entry| entry.driver)
                .ok_or_else(|| SpoolError::ModuleNotFound(format!("no driver for monitor {name:?}")))?,
            (None, None) => {
                return Err(SpoolError::InvalidParameter(
                    "monitor name or module path required".into(),
                ));
            }
        };

        let module = self.shared.loader.load(&driver)?;
        let registered_name = name.unwrap_or_default().to_string();
        let (generation, table, ui) = self.initialize(module.as_ref(), &registered_name)?;

        state.next_id += 1;
        let monitor = Arc::new(Monitor {
            id: state.next_id,
            name: registered_name,
            dll_name: driver,
            generation,
            table,
            ui,
            _module: module,
        });
        let mut refs = 1;
        if state.pinned_local.is_none() && monitor.is_local_port() {
            refs += 1;
            state.pinned_local = Some(monitor.id);
            debug!("Local Port monitor pinned");
        }
        info!(
            monitor = %monitor.name,
            dll = %monitor.dll_name,
            generation = ?monitor.generation,
            "monitor loaded"
        );
        state.slots.push(Slot {
            monitor: Arc::clone(&monitor),
            refs,
        });
        Ok(self.wrap(monitor))
    }

    /// Probe the initializers newest-first and fold the result.
    fn initialize(
        &self,
        module: &dyn PluginModule,
        name: &str,
    ) -> Result<(Generation, MonitorTable, Option<MonitorUi>)> {
        let ui = match module.entry_point(INITIALIZE_PRINT_MONITOR_UI) {
            Some(EntryPoint::PrintMonitorUi(init)) => init(),
            _ => None,
        };

        let mut found: Option<(Generation, MonitorTable)> = None;
        if !name.is_empty() {
            let init = MonitorInit {
                name: name.to_string(),
                store: Arc::clone(&self.shared.store),
                local: true,
            };
            if let Some(EntryPoint::PrintMonitor2(f)) =
                module.entry_point(INITIALIZE_PRINT_MONITOR2)
            {
                found = f(&init).map(|(instance, m2)| {
                    (Generation::Monitor2, MonitorTable::from_monitor2(instance, m2))
                });
            } else if let Some(EntryPoint::PrintMonitor(f)) =
                module.entry_point(INITIALIZE_PRINT_MONITOR)
            {
                found = f(&init)
                    .map(|pm| (Generation::PrintMonitor, MonitorTable::from_print_monitor(pm)));
            } else if let Some(EntryPoint::MonitorEx(f)) = module.entry_point(INITIALIZE_MONITOR_EX)
            {
                let mut pm = PrintMonitor::default();
                if f(&init, &mut pm) {
                    found = Some((Generation::MonitorEx, MonitorTable::from_print_monitor(pm)));
                }
            }
        }

        match (found, ui) {
            (Some((generation, table)), ui) if !table.is_empty() => Ok((generation, table, ui)),
            (_, Some(ui)) => Ok((Generation::UiOnly, MonitorTable::default(), Some(ui))),
            _ => {
                warn!(module = module.path(), "no usable monitor table");
                Err(SpoolError::EntryPointNotFound(format!(
                    "{}: no monitor initializer produced a table",
                    module.path()
                )))
            }
        }
    }

    fn wrap(&self, monitor: Arc<Monitor>) -> MonitorRef {
        MonitorRef {
            monitor,
            shared: Arc::clone(&self.shared),
        }
    }

    /// Release one reference.  Same as dropping it.
    pub fn unload(&self, monitor: MonitorRef) {
        drop(monitor);
    }

    /// Load the monitor owning `port_name`.
    ///
    /// Pipe, unix-path, LPR and CUPS names belong to "Local Port"; anything
    /// else is looked up in each registered monitor's port list.
    pub fn resolve_by_port_name(&self, port_name: &str) -> Result<MonitorRef> {
        if crate::port::is_local_only(port_name) {
            return self.load(Some(LOCAL_PORT_MONITOR), None);
        }
        match self.shared.store.port_owner(port_name)? {
            Some(owner) => self.load(Some(&owner), None),
            None => Err(SpoolError::UnknownPort(port_name.to_string())),
        }
    }

    /// Load every registered monitor, skipping those that fail.
    pub fn load_all(&self) -> Result<Vec<MonitorRef>> {
        let names = self.shared.store.monitor_names()?;
        let mut loaded = Vec::with_capacity(names.len());
        for name in names {
            match self.load(Some(&name), None) {
                Ok(monitor) => loaded.push(monitor),
                Err(e) => warn!(monitor = %name, error = %e, "monitor failed to load"),
            }
        }
        debug!(loaded = loaded.len(), "monitors loaded");
        Ok(loaded)
    }

    /// Drop the references the registry holds itself (the Local Port pin).
    pub fn unload_all(&self) {
        let mut state = self.shared.state();
        if let Some(id) = state.pinned_local.take() {
            state.release(id);
        }
    }

    /// Register a monitor and load it once to prove it works.
    ///
    /// The configuration entry is rolled back if the module fails to load.
    #[instrument(skip(self))]
    pub fn add_monitor(
        &self,
        name: &str,
        environment: Option<&str>,
        module_path: &str,
    ) -> Result<()> {
        if name.is_empty() || module_path.is_empty() {
            return Err(SpoolError::InvalidParameter(
                "monitor name and module path are required".into(),
            ));
        }
        if self.shared.store.monitor(name)?.is_some() {
            return Err(SpoolError::MonitorAlreadyInstalled(name.to_string()));
        }
        self.shared.store.add_monitor(&MonitorEntry {
            name: name.to_string(),
            driver: module_path.to_string(),
            environment: environment.unwrap_or(LOCAL_ENVIRONMENT).to_string(),
        })?;
        match self.load(Some(name), Some(module_path)) {
            Ok(monitor) => {
                info!(monitor = name, "monitor installed");
                drop(monitor);
                Ok(())
            }
            Err(e) => {
                if let Err(rollback) = self.shared.store.delete_monitor(name) {
                    warn!(error = %rollback, "failed to roll back monitor registration");
                }
                Err(e)
            }
        }
    }

    /// Unload `name` regardless of outstanding references and remove its
    /// configuration.
    #[instrument(skip(self))]
    pub fn delete_monitor(&self, name: &str) -> Result<()> {
        if name.is_empty() {
            return Err(SpoolError::InvalidParameter("monitor name required".into()));
        }
        {
            let mut state = self.shared.state();
            if let Some(pos) = state
                .slots
                .iter()
                .position(|s| s.monitor.name.eq_ignore_ascii_case(name))
            {
                let slot = state.slots.remove(pos);
                if state.pinned_local == Some(slot.monitor.id) {
                    state.pinned_local = None;
                }
                shut_down(&slot.monitor);
            }
        }
        if self.shared.store.delete_monitor(name)? {
            info!(monitor = name, "monitor deleted");
            Ok(())
        } else {
            Err(SpoolError::UnknownMonitor(name.to_string()))
        }
    }

    /// The module providing port dialogs for `monitor`.
    ///
    /// That is the monitor itself when it carries a UI table; otherwise the
    /// monitor is asked for its companion module, which is loaded by path.
    pub fn load_ui(&self, monitor: &MonitorRef) -> Result<MonitorRef> {
        if monitor.ui().is_some() {
            return Ok(monitor.clone());
        }
        let mut xcv = XcvSession::open(monitor.clone(), "", SERVER_ACCESS_ADMINISTER)?;
        let mut buf = [0u8; 260];
        let reply = xcv.xcv_data("MonitorUI", &[], &mut buf)?;
        if !reply.is_success() {
            return Err(SpoolError::from_code(reply.status, "MonitorUI")
                .unwrap_or_else(|| SpoolError::NotSupported("MonitorUI".into())));
        }
        let end = buf[..reply.needed.min(buf.len())]
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(reply.needed.min(buf.len()));
        let dll = std::str::from_utf8(&buf[..end])
            .map_err(|e| SpoolError::InvalidParameter(format!("MonitorUI reply: {e}")))?;
        debug!(monitor = %monitor.name(), ui = dll, "loading companion UI module");
        self.load(None, Some(dll))
    }

    /// Number of references held on `name`, or `None` when not loaded.
    pub fn refcount(&self, name: &str) -> Option<usize> {
        self.shared
            .state()
            .slots
            .iter()
            .find(|s| s.monitor.name.eq_ignore_ascii_case(name))
            .map(|s| s.refs)
    }

    pub fn loaded_count(&self) -> usize {
        self.shared.state().slots.len()
    }
}

/// An open administrative channel on a monitor.  Closed on drop.
pub struct XcvSession {
    monitor: MonitorRef,
    token: XcvToken,
    open: bool,
}

impl XcvSession {
    pub fn open(monitor: MonitorRef, object: &str, access: u32) -> Result<Self> {
        if monitor.table().xcv_data.is_none() {
            return Err(SpoolError::NotSupported(format!(
                "monitor {:?} has no administrative interface",
                monitor.name()
            )));
        }
        let token = monitor.xcv_open(object, access)?;
        Ok(Self {
            monitor,
            token,
            open: true,
        })
    }

    pub fn monitor(&self) -> &MonitorRef {
        &self.monitor
    }

    pub fn close(mut self) -> Result<()> {
        self.open = false;
        self.monitor.xcv_close(self.token)
    }
}

impl XcvChannel for XcvSession {
    fn xcv_data(&mut self, command: &str, input: &[u8], output: &mut [u8]) -> Result<XcvReply> {
        self.monitor.xcv_data(self.token, command, input, output)
    }
}

impl Drop for XcvSession {
    fn drop(&mut self) {
        if self.open {
            if let Err(e) = self.monitor.xcv_close(self.token) {
                warn!(error = %e, "closing administrative channel failed");
            }
        }
    }
}

/// `ERROR_SUCCESS` status, or the error it encodes.
pub fn check_status(reply: XcvReply, context: &str) -> Result<XcvReply> {
    if reply.status == status::ERROR_SUCCESS {
        Ok(reply)
    } else {
        Err(SpoolError::from_code(reply.status, context)
            .unwrap_or_else(|| SpoolError::NotSupported(context.to_string())))
    }
}
