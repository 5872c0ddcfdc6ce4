// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// The local print provider.
//
// `LocalProvider` owns every piece of process-wide state (monitor registry,
// printer cache, job-id counter, processor catalog) and exposes the public
// entry points.  Each entry point stores its outcome in the calling thread's
// last-error slot before returning.

use std::io::Read;
use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use spoolwerk_core::config::SpoolerConfig;
use spoolwerk_core::enumerate::{Filled, check_level, fill};
use spoolwerk_core::error::{Result, SpoolError};
use spoolwerk_core::forms;
use spoolwerk_core::status;
use spoolwerk_core::store::{ConfigStore, PrinterEntry};
use spoolwerk_core::types::{
    AddJobInfo, DocInfo, FORM_USER, FormInfo, JobInfo, LOCAL_ENVIRONMENT, MonitorInfo,
    PRINTER_ACCESS_ADMINISTER, PortInfo, PrinterDefaults, SERVER_ACCESS_ADMINISTER, XcvReply,
};
use spoolwerk_monitor::{
    DefaultLoader, DeviceConfig, ModuleLoader, MonitorRef, MonitorRegistry, MonitorUi,
    PortDispatch, XcvChannel, XcvSession,
};

use crate::handle::{
    Handle, JobHandle, OpenTarget, PortHandle, PrinterHandle, XcvHandle, is_local_server,
    parse_name,
};
use crate::pipeline::{DocumentState, PrintPipeline};
use crate::printer::PrinterRegistry;
use crate::processor::ProcessorCatalog;

/// Environments a monitor or print processor may be registered for.
const ENVIRONMENTS: &[&str] = &[LOCAL_ENVIRONMENT, "Windows NT x86", "Windows ARM64", "Windows 4.0"];

/// Run an entry point body and record its outcome.
fn recorded<T>(body: impl FnOnce() -> Result<T>) -> Result<T> {
    status::record(body())
}

/// Access mask of a handle that may carry form requests.
fn form_access(handle: &Handle) -> Result<u32> {
    match handle {
        Handle::Server { access } => Ok(*access),
        Handle::Printer(h) => Ok(h.access()),
        _ => Err(SpoolError::InvalidHandle),
    }
}

/// Fail with `AccessDenied` unless `handle` may change the form table.
fn form_admin(handle: &Handle) -> Result<()> {
    if form_access(handle)? & (SERVER_ACCESS_ADMINISTER | PRINTER_ACCESS_ADMINISTER) == 0 {
        return Err(SpoolError::AccessDenied);
    }
    Ok(())
}

fn validate_environment(env: Option<&str>) -> Result<()> {
    match env {
        None | Some("") => Ok(()),
        Some(env) if ENVIRONMENTS.iter().any(|e| e.eq_ignore_ascii_case(env)) => Ok(()),
        Some(env) => Err(SpoolError::InvalidParameter(format!("unknown environment {env:?}"))),
    }
}

pub struct LocalProvider {
    config: SpoolerConfig,
    store: Arc<dyn ConfigStore>,
    monitors: MonitorRegistry,
    printers: PrinterRegistry,
    pipeline: PrintPipeline,
}

impl LocalProvider {
    pub fn new(
        config: SpoolerConfig,
        store: Arc<dyn ConfigStore>,
        loader: Arc<dyn ModuleLoader>,
    ) -> Self {
        let monitors = MonitorRegistry::new(loader, Arc::clone(&store));
        let printers = PrinterRegistry::new(Arc::clone(&store), &config.default_datatype);
        let pipeline = PrintPipeline::new(
            &config,
            ProcessorCatalog::new(),
            PortDispatch::new(monitors.clone(), DeviceConfig::from_config(&config)),
            Arc::clone(&store),
        );
        info!(
            computer = %config.computer_name,
            spool_dir = %config.spool_dir.display(),
            "local print provider ready"
        );
        Self {
            config,
            store,
            monitors,
            printers,
            pipeline,
        }
    }

    /// Provider using the built-in monitor catalog and shared libraries.
    pub fn with_defaults(config: SpoolerConfig, store: Arc<dyn ConfigStore>) -> Self {
        Self::new(config, store, Arc::new(DefaultLoader::default()))
    }

    pub fn config(&self) -> &SpoolerConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn ConfigStore> {
        &self.store
    }

    pub fn monitors(&self) -> &MonitorRegistry {
        &self.monitors
    }

    pub fn printers(&self) -> &PrinterRegistry {
        &self.printers
    }

    pub fn pipeline(&self) -> &PrintPipeline {
        &self.pipeline
    }

    fn local_only(&self, server: Option<&str>, err: fn(String) -> SpoolError) -> Result<()> {
        if is_local_server(server, &self.config.computer_name) {
            Ok(())
        } else {
            let server = server.unwrap_or_default();
            warn!(server, "remote servers are not supported");
            Err(err(server.to_string()))
        }
    }

    // -- Handles --

    /// Open a server, printer, port, job or administrative handle by name.
    #[instrument(skip(self, defaults))]
    pub fn open_printer(
        &self,
        name: Option<&str>,
        defaults: Option<&PrinterDefaults>,
    ) -> Result<Handle> {
        status::record(self.open_handle(name, defaults))
    }

    fn open_handle(&self, name: Option<&str>, defaults: Option<&PrinterDefaults>) -> Result<Handle> {
        let handle = match parse_name(name, &self.config.computer_name)? {
            OpenTarget::Server => Handle::Server {
                access: defaults.cloned().unwrap_or_default().desired_access,
            },
            OpenTarget::Printer(name) => {
                let printer = self.printers.get_or_create(&name)?;
                let defaults = defaults.cloned().unwrap_or_default();
                Handle::Printer(PrinterHandle {
                    printer,
                    datatype: defaults.datatype,
                    devmode: defaults.devmode,
                    print_processor: defaults.print_processor,
                    access: defaults.desired_access,
                    doc: DocumentState::default(),
                })
            }
            OpenTarget::Port(port) => Handle::Port(PortHandle {
                session: self.pipeline.ports().open_port(&port)?,
            }),
            OpenTarget::Job { printer, job_id } => {
                let printer = self.printers.get_or_create(&printer)?;
                let job = printer.jobs().find(job_id).ok_or_else(|| {
                    SpoolError::InvalidParameter(format!("no job {job_id} on {}", printer.name()))
                })?;
                let spool = std::fs::File::open(&job.spool_path)?;
                Handle::Job(JobHandle {
                    printer,
                    job_id,
                    spool,
                })
            }
            OpenTarget::XcvMonitor(monitor) => {
                let loaded = self.monitors.load(Some(&monitor), None).map_err(|e| {
                    debug!(monitor = %monitor, error = %e, "administrative target not loadable");
                    SpoolError::UnknownPort(monitor.clone())
                })?;
                self.open_xcv(loaded, &monitor, defaults)?
            }
            OpenTarget::XcvPort(port) => {
                let loaded = self.monitors.resolve_by_port_name(&port).map_err(|e| {
                    debug!(port = %port, error = %e, "no monitor owns port");
                    SpoolError::UnknownPort(port.clone())
                })?;
                self.open_xcv(loaded, &port, defaults)?
            }
        };
        debug!(handle = ?handle, "handle opened");
        Ok(handle)
    }

    fn open_xcv(
        &self,
        monitor: MonitorRef,
        object: &str,
        defaults: Option<&PrinterDefaults>,
    ) -> Result<Handle> {
        let access = defaults.map(|d| d.desired_access).unwrap_or(0);
        let session = XcvSession::open(monitor, object, access).map_err(|e| {
            warn!(object, error = %e, "administrative channel refused");
            SpoolError::InvalidParameter(format!("{object}: {e}"))
        })?;
        Ok(Handle::Xcv(XcvHandle { session }))
    }

    /// Release a handle and everything it holds.
    #[instrument(skip(self))]
    pub fn close_printer(&self, handle: Handle) -> Result<()> {
        status::record(match handle {
            Handle::Xcv(h) => h.session.close(),
            Handle::Port(h) => h.session.close(),
            Handle::Printer(h) => {
                if let Some(job_id) = h.active_job() {
                    warn!(printer = %h.printer().name(), job_id, "closing with an unfinished document");
                }
                drop(h);
                Ok(())
            }
            Handle::Server { .. } | Handle::Job(_) => Ok(()),
        })
    }

    // -- Documents --

    /// Begin a document on a printer or port handle; returns the job id.
    pub fn start_doc_printer(&self, handle: &mut Handle, doc: &DocInfo) -> Result<u32> {
        status::record(match handle {
            Handle::Printer(h) => self.pipeline.start_doc(h, doc),
            Handle::Port(h) => {
                let job_id = self.pipeline.ids().allocate();
                let name = h.session.name().to_string();
                h.session.start_doc(&name, job_id, doc).map(|()| job_id)
            }
            _ => Err(SpoolError::InvalidHandle),
        })
    }

    pub fn write_printer(&self, handle: &mut Handle, data: &[u8]) -> Result<usize> {
        status::record(match handle {
            Handle::Printer(h) => self.pipeline.write(h, data),
            Handle::Port(h) => h.session.write(data),
            _ => Err(SpoolError::InvalidHandle),
        })
    }

    /// Read spooled content from a job handle, or device input from a port.
    pub fn read_printer(&self, handle: &mut Handle, buf: &mut [u8]) -> Result<usize> {
        status::record(match handle {
            Handle::Job(h) => h.spool.read(buf).map_err(SpoolError::from),
            Handle::Port(h) => h.session.read(buf),
            _ => Err(SpoolError::InvalidHandle),
        })
    }

    pub fn end_doc_printer(&self, handle: &mut Handle) -> Result<()> {
        status::record(match handle {
            Handle::Printer(h) => self.pipeline.end_doc(h),
            Handle::Port(h) => h.session.end_doc(),
            _ => Err(SpoolError::InvalidHandle),
        })
    }

    pub fn abort_printer(&self, handle: &mut Handle) -> Result<()> {
        status::record(handle.as_printer().and_then(|h| self.pipeline.abort(h)))
    }

    // -- Jobs --

    /// Reserve a job whose spool file the caller writes; see `schedule_job`.
    pub fn add_job(&self, handle: &mut Handle, level: u32) -> Result<AddJobInfo> {
        status::record(
            check_level(level, &[1])
                .and_then(|()| handle.as_printer())
                .and_then(|h| self.pipeline.add_job(h)),
        )
    }

    /// Deliver a reserved or previously failed job.  A job that is already
    /// printing is refused.
    pub fn schedule_job(&self, handle: &mut Handle, job_id: u32) -> Result<()> {
        status::record(handle.as_printer().and_then(|h| {
            self.pipeline
                .schedule(&h.printer, job_id, h.print_processor.as_deref())
        }))
    }

    pub fn get_job(&self, handle: &mut Handle, job_id: u32, level: u32) -> Result<JobInfo> {
        status::record(check_level(level, &[1]).and_then(|()| {
            let h = handle.as_printer()?;
            h.printer
                .jobs()
                .find(job_id)
                .map(|j| j.info())
                .ok_or_else(|| SpoolError::InvalidParameter(format!("no job {job_id}")))
        }))
    }

    /// Pack `count` jobs starting at position `first` into `buf`.
    pub fn enum_jobs(
        &self,
        handle: &mut Handle,
        first: u32,
        count: u32,
        level: u32,
        buf: &mut [u8],
    ) -> Result<Filled> {
        status::record(handle.as_printer().and_then(|h| {
            let jobs: Vec<JobInfo> = h
                .printer
                .jobs()
                .list()
                .iter()
                .skip(first as usize)
                .take(count as usize)
                .map(|j| j.info())
                .collect();
            fill(&jobs, level, buf)
        }))
    }

    /// Rename a queued job's document.
    pub fn set_job(&self, handle: &mut Handle, job_id: u32, document: &str) -> Result<()> {
        status::record(handle.as_printer().and_then(|h| {
            if document.is_empty() {
                return Err(SpoolError::InvalidParameter("empty document name".into()));
            }
            h.printer
                .jobs()
                .update(job_id, |j| j.document = document.to_string())
                .ok_or_else(|| SpoolError::InvalidParameter(format!("no job {job_id}")))
        }))
    }

    // -- Enumeration --

    /// Ports of every registered monitor.
    #[instrument(skip(self, buf), fields(size = buf.len()))]
    pub fn enum_ports(&self, server: Option<&str>, level: u32, buf: &mut [u8]) -> Result<Filled> {
        status::record(self.collect_ports(server, level).and_then(|ports| fill(&ports, level, buf)))
    }

    fn collect_ports(&self, server: Option<&str>, level: u32) -> Result<Vec<PortInfo>> {
        self.local_only(server, SpoolError::InvalidName)?;
        check_level(level, &[1, 2])?;
        let loaded = self.monitors.load_all()?;
        let mut ports = Vec::new();
        for monitor in &loaded {
            if monitor.table().enum_ports.is_none() {
                continue;
            }
            match monitor.enum_ports(server) {
                Ok(found) => ports.extend(found),
                Err(e) => warn!(monitor = %monitor.name(), error = %e, "port enumeration failed"),
            }
        }
        drop(loaded);
        Ok(ports)
    }

    pub fn enum_monitors(&self, server: Option<&str>, level: u32, buf: &mut [u8]) -> Result<Filled> {
        recorded(|| {
            self.local_only(server, SpoolError::InvalidName)?;
            check_level(level, &[1, 2])?;
            let mut monitors = Vec::new();
            for name in self.store.monitor_names()? {
                if let Some(entry) = self.store.monitor(&name)? {
                    monitors.push(MonitorInfo {
                        name: entry.name,
                        environment: entry.environment,
                        dll_name: entry.driver,
                    });
                }
            }
            fill(&monitors, level, buf)
        })
    }

    pub fn enum_print_processors(
        &self,
        server: Option<&str>,
        environment: Option<&str>,
        level: u32,
        buf: &mut [u8],
    ) -> Result<Filled> {
        recorded(|| {
            self.local_only(server, SpoolError::InvalidName)?;
            validate_environment(environment)?;
            check_level(level, &[1])?;
            fill(&self.pipeline.processors().names(), level, buf)
        })
    }

    pub fn enum_print_processor_datatypes(
        &self,
        server: Option<&str>,
        processor: &str,
        level: u32,
        buf: &mut [u8],
    ) -> Result<Filled> {
        recorded(|| {
            self.local_only(server, SpoolError::InvalidName)?;
            check_level(level, &[1])?;
            let processor = self.pipeline.processors().load(processor)?;
            fill(&processor.datatypes(), level, buf)
        })
    }

    // -- Port administration --

    /// Run `f` against the UI table serving `monitor`, with an administrative
    /// channel to the monitor itself.
    fn with_ui<T>(
        &self,
        monitor: Option<&MonitorRef>,
        what: &str,
        f: impl FnOnce(&MonitorUi, &mut dyn XcvChannel) -> Option<Result<T>>,
    ) -> Result<T> {
        let not_supported = || SpoolError::NotSupported(format!("{what} is not implemented"));
        let monitor = monitor.ok_or_else(not_supported)?;
        let ui = self.monitors.load_ui(monitor).map_err(|e| {
            debug!(monitor = %monitor.name(), error = %e, "no UI module");
            not_supported()
        })?;
        let table = ui.ui().ok_or_else(not_supported)?;
        let mut xcv = XcvSession::open(monitor.clone(), monitor.name(), SERVER_ACCESS_ADMINISTER)?;
        let result = f(table, &mut xcv).ok_or_else(not_supported)?;
        xcv.close()?;
        result
    }

    /// Add a port to `monitor`, through its table or its UI module.
    #[instrument(skip(self))]
    pub fn add_port(&self, server: Option<&str>, monitor: &str, port: &str) -> Result<()> {
        recorded(|| {
            self.local_only(server, SpoolError::InvalidParameter)?;
            if monitor.is_empty() {
                return Err(SpoolError::NotSupported("empty monitor name".into()));
            }
            let loaded = self.monitors.load(Some(monitor), None).ok();
            if let Some(m) = loaded.as_ref().filter(|m| m.table().add_port.is_some()) {
                return m.add_port(server, monitor, port);
            }
            let added = self.with_ui(loaded.as_ref(), "AddPort", |ui: &MonitorUi, xcv: &mut dyn XcvChannel| {
                ui.add_port_ui.as_ref().map(|f| f(server, monitor, port, xcv))
            })?;
            info!(monitor, port = %added, "port added");
            Ok(())
        })
    }

    pub fn add_port_ex(
        &self,
        server: Option<&str>,
        level: u32,
        port: &PortInfo,
        monitor: &str,
    ) -> Result<()> {
        recorded(|| {
            self.local_only(server, SpoolError::InvalidParameter)?;
            check_level(level, &[1, 2])?;
            if monitor.is_empty() || port.name.is_empty() {
                return Err(SpoolError::InvalidParameter(
                    "port and monitor names are required".into(),
                ));
            }
            match self.monitors.load(Some(monitor), None) {
                Ok(m) if m.table().add_port_ex.is_some() => m.add_port_ex(server, level, port, monitor),
                _ => Err(SpoolError::InvalidParameter(format!(
                    "monitor {monitor:?} cannot add ports"
                ))),
            }
        })
    }

    #[instrument(skip(self))]
    pub fn configure_port(&self, server: Option<&str>, port: &str) -> Result<()> {
        recorded(|| {
            self.local_only(server, SpoolError::InvalidName)?;
            if port.is_empty() {
                return Err(SpoolError::NotSupported("empty port name".into()));
            }
            let loaded = self.monitors.resolve_by_port_name(port).ok();
            if let Some(m) = loaded.as_ref().filter(|m| m.table().configure_port.is_some()) {
                return m.configure_port(server, port);
            }
            self.with_ui(loaded.as_ref(), "ConfigurePort", |ui: &MonitorUi, xcv: &mut dyn XcvChannel| {
                ui.configure_port_ui.as_ref().map(|f| f(server, port, xcv))
            })
        })
    }

    #[instrument(skip(self))]
    pub fn delete_port(&self, server: Option<&str>, port: &str) -> Result<()> {
        recorded(|| {
            self.local_only(server, SpoolError::InvalidName)?;
            if port.is_empty() {
                return Err(SpoolError::NotSupported("empty port name".into()));
            }
            let loaded = self.monitors.resolve_by_port_name(port).ok();
            if let Some(m) = loaded.as_ref().filter(|m| m.table().delete_port.is_some()) {
                return m.delete_port(server, port);
            }
            self.with_ui(loaded.as_ref(), "DeletePort", |ui: &MonitorUi, xcv: &mut dyn XcvChannel| {
                ui.delete_port_ui.as_ref().map(|f| f(server, port, xcv))
            })?;
            info!(port, "port deleted");
            Ok(())
        })
    }

    // -- Monitor administration --

    #[instrument(skip(self))]
    pub fn add_monitor(
        &self,
        server: Option<&str>,
        name: &str,
        environment: Option<&str>,
        module_path: &str,
    ) -> Result<()> {
        recorded(|| {
            self.local_only(server, SpoolError::AccessDenied)?;
            if name.is_empty() {
                return Err(SpoolError::InvalidParameter("monitor name required".into()));
            }
            validate_environment(environment)?;
            self.monitors.add_monitor(name, environment, module_path)
        })
    }

    #[instrument(skip(self))]
    pub fn delete_monitor(
        &self,
        server: Option<&str>,
        environment: Option<&str>,
        name: &str,
    ) -> Result<()> {
        recorded(|| {
            self.local_only(server, SpoolError::InvalidName)?;
            if let Some(env) = environment {
                debug!(environment = env, "environment ignored for local monitors");
            }
            self.monitors.delete_monitor(name)
        })
    }

    /// Send an administrative command through an Xcv handle.
    ///
    /// The returned reply carries the monitor's own status; the call itself
    /// only fails when the handle is wrong or the monitor has no channel.
    #[instrument(skip(self, handle, input, output))]
    pub fn xcv_data(
        &self,
        handle: &mut Handle,
        command: &str,
        input: &[u8],
        output: &mut [u8],
    ) -> Result<XcvReply> {
        status::record(match handle {
            Handle::Xcv(h) => h.session.xcv_data(command, input, output),
            _ => Err(SpoolError::InvalidHandle),
        })
    }

    // -- Forms --

    /// Built-in forms followed by the stored user forms.
    pub fn enum_forms(&self, handle: &Handle, level: u32, buf: &mut [u8]) -> Result<Filled> {
        recorded(|| {
            form_access(handle)?;
            check_level(level, &[1, 2])?;
            let mut all = forms::builtin_forms();
            for name in self.store.form_names()? {
                all.extend(self.store.form(&name)?);
            }
            fill(&all, level, buf)
        })
    }

    /// Look up one form by exact name, built-ins first.
    pub fn get_form(&self, handle: &Handle, name: &str, level: u32, buf: &mut [u8]) -> Result<Filled> {
        recorded(|| {
            form_access(handle)?;
            check_level(level, &[1, 2])?;
            let form = match forms::builtin_form(name) {
                Some(form) => form,
                None => self
                    .store
                    .form(name)?
                    .ok_or_else(|| SpoolError::InvalidFormName(name.to_string()))?,
            };
            fill(&[form], level, buf)
        })
    }

    /// Store a user form.  Names taken by a built-in or stored form are refused.
    #[instrument(skip(self, handle, form), fields(form = %form.name))]
    pub fn add_form(&self, handle: &Handle, level: u32, form: &FormInfo) -> Result<()> {
        recorded(|| {
            form_access(handle)?;
            check_level(level, &[1, 2])?;
            form_admin(handle)?;
            forms::validate(form)?;
            if forms::is_builtin(&form.name) {
                return Err(SpoolError::AlreadyExists(form.name.clone()));
            }
            self.store.add_form(&FormInfo {
                flags: FORM_USER,
                ..form.clone()
            })?;
            info!("form added");
            Ok(())
        })
    }

    /// Replace the size and imageable area of user form `name`.
    #[instrument(skip(self, handle, form))]
    pub fn set_form(&self, handle: &Handle, name: &str, level: u32, form: &FormInfo) -> Result<()> {
        recorded(|| {
            form_access(handle)?;
            check_level(level, &[1, 2])?;
            form_admin(handle)?;
            if forms::is_builtin(name) {
                return Err(SpoolError::AccessDenied);
            }
            let updated = FormInfo {
                name: name.to_string(),
                flags: FORM_USER,
                ..form.clone()
            };
            forms::validate(&updated)?;
            if !self.store.update_form(&updated)? {
                return Err(SpoolError::InvalidFormName(name.to_string()));
            }
            debug!("form updated");
            Ok(())
        })
    }

    #[instrument(skip(self, handle))]
    pub fn delete_form(&self, handle: &Handle, name: &str) -> Result<()> {
        recorded(|| {
            form_admin(handle)?;
            if forms::is_builtin(name) {
                return Err(SpoolError::AccessDenied);
            }
            if !self.store.delete_form(name)? {
                return Err(SpoolError::InvalidFormName(name.to_string()));
            }
            info!("form deleted");
            Ok(())
        })
    }

    // -- Printers --

    /// Register a printer queue.
    #[instrument(skip(self, entry), fields(printer = %entry.name))]
    pub fn add_printer(&self, entry: &PrinterEntry) -> Result<()> {
        recorded(|| {
            if entry.name.is_empty() || entry.name.contains([',', '\\']) {
                return Err(SpoolError::InvalidPrinterName(entry.name.clone()));
            }
            if self.store.printer(&entry.name)?.is_some() {
                return Err(SpoolError::AlreadyExists(entry.name.clone()));
            }
            if entry.port.as_deref().unwrap_or_default().is_empty() {
                return Err(SpoolError::InvalidParameter("printer port required".into()));
            }
            let processor = entry
                .print_processor
                .clone()
                .unwrap_or_else(|| self.config.default_print_processor.clone());
            self.pipeline.processors().load(&processor)?;
            self.store.put_printer(&PrinterEntry {
                print_processor: Some(processor),
                ..entry.clone()
            })?;
            info!(port = ?entry.port, "printer added");
            Ok(())
        })
    }

    pub fn printer_names(&self) -> Result<Vec<String>> {
        status::record(self.store.printer_names())
    }
}

impl Drop for LocalProvider {
    fn drop(&mut self) {
        self.monitors.unload_all();
        debug!("local print provider shut down");
    }
}
