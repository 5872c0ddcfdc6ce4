// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Port dispatch.
//
// A port name is classified by prefix first:
//
//   |cmd        pipe            (in-layer)
//   /path       unix path       (in-layer)
//   LPR:queue   lpr queue       (in-layer)
//   CUPS:queue  cups queue      (in-layer)
//   FILE:       file port       (Local Port monitor)
//   LPTn / COMn parallel/serial (Local Port monitor)
//
// Any other name registered to a monitor other than "Local Port" is handed to
// that monitor.  What remains is probed on the filesystem and printed to as a
// plain file when writable.

use std::fs::OpenOptions;
use std::path::Path;
use std::thread::{self, ThreadId};
use std::time::Duration;

use tracing::{debug, instrument, warn};

use spoolwerk_core::config::SpoolerConfig;
use spoolwerk_core::error::{Result, SpoolError};
use spoolwerk_core::types::{DocInfo, LOCAL_PORT_MONITOR};

use crate::abi::PortToken;
use crate::device::lpr::LprTarget;
use crate::device::{CupsDevice, DeviceBackend, FileDevice, LprDevice, PipeDevice};
use crate::localmon::{is_com, is_lpt};
use crate::registry::{MonitorRef, MonitorRegistry};

/// How a port name is serviced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortClass {
    /// Writable local file path.
    FileName,
    Pipe,
    UnixPath,
    Lpr,
    Cups,
    /// `FILE:`.
    File,
    Lpt,
    Com,
    /// Owned by a plugin monitor.
    Monitor,
    Unknown,
}

impl PortClass {
    /// Served by a device backend in this layer rather than a monitor.
    pub fn is_in_layer(self) -> bool {
        matches!(
            self,
            Self::FileName | Self::Pipe | Self::UnixPath | Self::Lpr | Self::Cups
        )
    }
}

fn strip_prefix_ci<'a>(name: &'a str, prefix: &str) -> Option<&'a str> {
    if name.len() >= prefix.len()
        && name.is_char_boundary(prefix.len())
        && name[..prefix.len()].eq_ignore_ascii_case(prefix)
    {
        Some(&name[prefix.len()..])
    } else {
        None
    }
}

/// Class implied by the name alone, if any.
pub fn classify_prefix(name: &str) -> Option<PortClass> {
    if name.starts_with('|') {
        Some(PortClass::Pipe)
    } else if name.starts_with('/') {
        Some(PortClass::UnixPath)
    } else if strip_prefix_ci(name, "LPR:").is_some() {
        Some(PortClass::Lpr)
    } else if strip_prefix_ci(name, "CUPS:").is_some() {
        Some(PortClass::Cups)
    } else if name.eq_ignore_ascii_case("FILE:") {
        Some(PortClass::File)
    } else if is_lpt(name) {
        Some(PortClass::Lpt)
    } else if is_com(name) {
        Some(PortClass::Com)
    } else {
        None
    }
}

/// Names that always belong to "Local Port" whatever the configuration says.
pub fn is_local_only(name: &str) -> bool {
    matches!(
        classify_prefix(name),
        Some(PortClass::Pipe | PortClass::UnixPath | PortClass::Lpr | PortClass::Cups)
    )
}

/// Whether `name` can be written as a local file.
///
/// An existing file must open for writing; otherwise the file is created and
/// removed again.
pub fn probe_file(name: &str) -> bool {
    let path = Path::new(name);
    if path.exists() {
        return OpenOptions::new().write(true).open(path).is_ok();
    }
    match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(file) => {
            drop(file);
            if let Err(e) = std::fs::remove_file(path) {
                warn!(path = name, error = %e, "could not remove probe file");
            }
            true
        }
        Err(_) => false,
    }
}

/// Settings the network device classes need.
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    pub computer_name: String,
    pub lpd_host: String,
    pub lpd_port: u16,
    pub cups_server: String,
    pub timeout: Duration,
}

impl DeviceConfig {
    pub fn from_config(config: &SpoolerConfig) -> Self {
        Self {
            computer_name: config.computer_name.clone(),
            lpd_host: config.lpd_host.clone(),
            lpd_port: config.lpd_port,
            cups_server: config.cups_server.clone(),
            timeout: Duration::from_secs(config.network_timeout_secs),
        }
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self::from_config(&SpoolerConfig::default())
    }
}

/// Opens ports by name.
#[derive(Clone)]
pub struct PortDispatch {
    monitors: MonitorRegistry,
    config: DeviceConfig,
}

impl PortDispatch {
    pub fn new(monitors: MonitorRegistry, config: DeviceConfig) -> Self {
        Self { monitors, config }
    }

    pub fn monitors(&self) -> &MonitorRegistry {
        &self.monitors
    }

    /// Class of `name`, with the monitor it will be forwarded to.
    pub fn classify(&self, name: &str) -> Result<(PortClass, Option<MonitorRef>)> {
        if name.is_empty() {
            return Err(SpoolError::InvalidParameter("empty port name".into()));
        }
        match classify_prefix(name) {
            Some(class) if class.is_in_layer() => return Ok((class, None)),
            Some(class) => {
                let local = self.monitors.load(Some(LOCAL_PORT_MONITOR), None)?;
                return Ok((class, Some(local)));
            }
            None => {}
        }

        let owner = self.monitors.store().port_owner(name)?;
        if let Some(owner) = &owner {
            if !owner.eq_ignore_ascii_case(LOCAL_PORT_MONITOR) {
                let monitor = self.monitors.load(Some(owner), None)?;
                return Ok((PortClass::Monitor, Some(monitor)));
            }
        }
        if probe_file(name) {
            return Ok((PortClass::FileName, None));
        }
        match owner {
            Some(owner) => {
                let monitor = self.monitors.load(Some(&owner), None)?;
                Ok((PortClass::Monitor, Some(monitor)))
            }
            None => Ok((PortClass::Unknown, None)),
        }
    }

    #[instrument(skip(self))]
    pub fn open_port(&self, name: &str) -> Result<PortSession> {
        let (class, monitor) = self.classify(name)?;
        let backend = match (class, monitor) {
            (PortClass::Unknown, _) => return Err(SpoolError::UnknownPort(name.to_string())),
            (_, Some(monitor)) => {
                let open = monitor.table().open_port.clone().ok_or_else(|| {
                    SpoolError::NotSupported(format!(
                        "monitor {:?} cannot open ports",
                        monitor.name()
                    ))
                })?;
                let token = open(name)?;
                Backend::Monitor { monitor, token }
            }
            (class, None) => Backend::Device(self.device(class, name)?),
        };
        debug!(port = name, ?class, "port opened");
        Ok(PortSession {
            name: name.to_string(),
            class,
            backend,
            state: DocState::Idle,
            started_on: None,
            closed: false,
        })
    }

    fn device(&self, class: PortClass, name: &str) -> Result<Box<dyn DeviceBackend>> {
        let device: Box<dyn DeviceBackend> = match class {
            PortClass::FileName | PortClass::UnixPath => Box::new(FileDevice::new(name)),
            PortClass::Pipe => Box::new(PipeDevice::new(&name[1..])),
            PortClass::Lpr => {
                let queue = strip_prefix_ci(name, "LPR:").unwrap_or_default();
                Box::new(LprDevice::new(LprTarget {
                    host: self.config.lpd_host.clone(),
                    port: self.config.lpd_port,
                    queue: queue.to_string(),
                    client_host: self.config.computer_name.clone(),
                    timeout: self.config.timeout,
                }))
            }
            PortClass::Cups => {
                let queue = strip_prefix_ci(name, "CUPS:").unwrap_or_default();
                Box::new(CupsDevice::new(&self.config.cups_server, queue))
            }
            other => {
                return Err(SpoolError::NotSupported(format!(
                    "{other:?} ports need a monitor"
                )));
            }
        };
        Ok(device)
    }
}

/// Where a session's bytes go.
pub trait PortSink {
    fn write(&mut self, data: &[u8]) -> Result<usize>;
}

enum Backend {
    Device(Box<dyn DeviceBackend>),
    Monitor { monitor: MonitorRef, token: PortToken },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DocState {
    Idle,
    Started,
    Ended,
}

/// An open port.  Ends any active document and closes the port on drop.
pub struct PortSession {
    name: String,
    class: PortClass,
    backend: Backend,
    state: DocState,
    started_on: Option<ThreadId>,
    closed: bool,
}

impl PortSession {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn class(&self) -> PortClass {
        self.class
    }

    pub fn monitor(&self) -> Option<&MonitorRef> {
        match &self.backend {
            Backend::Monitor { monitor, .. } => Some(monitor),
            Backend::Device(_) => None,
        }
    }

    pub fn is_started(&self) -> bool {
        self.state == DocState::Started
    }

    fn check_thread(&self, op: &str) -> Result<()> {
        let affine = match &self.backend {
            Backend::Device(device) => device.thread_affine(),
            Backend::Monitor { .. } => false,
        };
        if affine && self.started_on.is_some_and(|t| t != thread::current().id()) {
            return Err(SpoolError::NotImplemented(format!(
                "{op} on {} from a different thread",
                self.name
            )));
        }
        Ok(())
    }

    /// Start a document.  A second call while started does nothing.
    pub fn start_doc(&mut self, printer: &str, job_id: u32, doc: &DocInfo) -> Result<()> {
        if self.state == DocState::Started {
            return Ok(());
        }
        match &mut self.backend {
            Backend::Device(device) => device.start_doc(printer, job_id, doc)?,
            Backend::Monitor { monitor, token } => {
                if let Some(start) = &monitor.table().start_doc {
                    start(*token, printer, job_id, doc)?;
                }
            }
        }
        self.state = DocState::Started;
        self.started_on = Some(thread::current().id());
        Ok(())
    }

    pub fn write(&mut self, data: &[u8]) -> Result<usize> {
        self.check_thread("write")?;
        match &mut self.backend {
            Backend::Device(device) => {
                if self.state != DocState::Started {
                    return Err(SpoolError::NoStartDoc);
                }
                device.write(data)
            }
            Backend::Monitor { monitor, token } => match &monitor.table().write_port {
                Some(write) => write(*token, data),
                None => Err(SpoolError::NotSupported(format!(
                    "monitor {:?} cannot write",
                    monitor.name()
                ))),
            },
        }
    }

    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        match &mut self.backend {
            Backend::Device(device) => device.read(buf),
            Backend::Monitor { monitor, token } => match &monitor.table().read_port {
                Some(read) => read(*token, buf),
                None => Err(SpoolError::NotSupported(format!(
                    "monitor {:?} cannot read",
                    monitor.name()
                ))),
            },
        }
    }

    /// End the document.  A second call after ending does nothing.
    pub fn end_doc(&mut self) -> Result<()> {
        match self.state {
            DocState::Idle => return Err(SpoolError::NoStartDoc),
            DocState::Ended => return Ok(()),
            DocState::Started => {}
        }
        self.check_thread("end_doc")?;
        self.state = DocState::Ended;
        match &mut self.backend {
            Backend::Device(device) => device.end_doc(),
            Backend::Monitor { monitor, token } => match &monitor.table().end_doc {
                Some(end) => end(*token),
                None => Ok(()),
            },
        }
    }

    fn shut(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let ended = if self.state == DocState::Started {
            self.end_doc()
        } else {
            Ok(())
        };
        let closed = match &self.backend {
            Backend::Device(_) => Ok(()),
            Backend::Monitor { monitor, token } => match &monitor.table().close_port {
                Some(close) => close(*token),
                None => Ok(()),
            },
        };
        debug!(port = %self.name, "port closed");
        ended.and(closed)
    }

    /// End any active document and close the port.
    pub fn close(mut self) -> Result<()> {
        self.shut()
    }
}

impl PortSink for PortSession {
    fn write(&mut self, data: &[u8]) -> Result<usize> {
        PortSession::write(self, data)
    }
}

impl Drop for PortSession {
    fn drop(&mut self) {
        if let Err(e) = self.shut() {
            warn!(port = %self.name, error = %e, "closing port failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use spoolwerk_core::store::ConfigStore;
    use spoolwerk_registry::{MemoryStore, seed_defaults};

    use super::*;
    use crate::module::DefaultLoader;

    struct Recorder {
        log: Arc<std::sync::Mutex<Vec<String>>>,
        affine: bool,
    }

    impl DeviceBackend for Recorder {
        fn start_doc(&mut self, _: &str, job_id: u32, _: &DocInfo) -> Result<()> {
            self.log.lock().expect("lock").push(format!("start {job_id}"));
            Ok(())
        }

        fn write(&mut self, data: &[u8]) -> Result<usize> {
            self.log.lock().expect("lock").push(format!("write {}", data.len()));
            Ok(data.len())
        }

        fn end_doc(&mut self) -> Result<()> {
            self.log.lock().expect("lock").push("end".into());
            Ok(())
        }

        fn thread_affine(&self) -> bool {
            self.affine
        }
    }

    fn session(affine: bool) -> (PortSession, Arc<std::sync::Mutex<Vec<String>>>) {
        let log = Arc::new(std::sync::Mutex::new(Vec::new()));
        let session = PortSession {
            name: "TEST:".into(),
            class: PortClass::Cups,
            backend: Backend::Device(Box::new(Recorder {
                log: Arc::clone(&log),
                affine,
            })),
            state: DocState::Idle,
            started_on: None,
            closed: false,
        };
        (session, log)
    }

    fn dispatch() -> (PortDispatch, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        seed_defaults(store.as_ref()).expect("seed");
        let registry = MonitorRegistry::new(Arc::new(DefaultLoader::default()), store.clone());
        (PortDispatch::new(registry, DeviceConfig::default()), store)
    }

    #[test]
    fn prefixes_classify_without_configuration() {
        assert_eq!(classify_prefix("|lpr -Plaser"), Some(PortClass::Pipe));
        assert_eq!(classify_prefix("/dev/usb/lp0"), Some(PortClass::UnixPath));
        assert_eq!(classify_prefix("lpr:office"), Some(PortClass::Lpr));
        assert_eq!(classify_prefix("CUPS:office"), Some(PortClass::Cups));
        assert_eq!(classify_prefix("file:"), Some(PortClass::File));
        assert_eq!(classify_prefix("LPT1:"), Some(PortClass::Lpt));
        assert_eq!(classify_prefix("COM3:"), Some(PortClass::Com));
        assert_eq!(classify_prefix("MyPort"), None);
        assert!(is_local_only("|cat"));
        assert!(!is_local_only("LPT1:"));
    }

    #[test]
    fn start_and_end_are_idempotent() {
        let (mut s, log) = session(false);
        assert!(matches!(s.write(b"early"), Err(SpoolError::NoStartDoc)));
        assert!(matches!(s.end_doc(), Err(SpoolError::NoStartDoc)));
        s.start_doc("Queue", 7, &DocInfo::default()).expect("start");
        s.start_doc("Queue", 7, &DocInfo::default()).expect("start again");
        s.write(b"abc").expect("write");
        s.end_doc().expect("end");
        s.end_doc().expect("end again");
        s.close().expect("close");
        assert_eq!(*log.lock().expect("lock"), ["start 7", "write 3", "end"]);
    }

    #[test]
    fn affine_backend_refuses_other_threads() {
        let (mut s, _) = session(true);
        s.start_doc("Queue", 1, &DocInfo::default()).expect("start");
        let mut s = thread::spawn(move || {
            assert!(matches!(s.write(b"x"), Err(SpoolError::NotImplemented(_))));
            assert!(matches!(s.end_doc(), Err(SpoolError::NotImplemented(_))));
            s
        })
        .join()
        .expect("thread");
        s.write(b"x").expect("write on starting thread");
        s.end_doc().expect("end on starting thread");
    }

    #[test]
    fn drop_ends_active_document() {
        let (mut s, log) = session(false);
        s.start_doc("Queue", 2, &DocInfo::default()).expect("start");
        drop(s);
        assert_eq!(log.lock().expect("lock").last().map(String::as_str), Some("end"));
    }

    #[test]
    fn file_path_port_receives_bytes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let out = dir.path().join("printed.prn");
        let (dispatch, _) = dispatch();
        let name = out.to_str().expect("utf8");

        let mut port = dispatch.open_port(name).expect("open");
        assert_eq!(port.class(), PortClass::UnixPath);
        port.start_doc("Queue", 1, &DocInfo::default()).expect("start");
        port.write(b"\x1b%-12345X@PJL\r\n").expect("write");
        port.close().expect("close");

        assert_eq!(std::fs::read(&out).expect("read"), b"\x1b%-12345X@PJL\r\n");
    }

    #[cfg(unix)]
    #[test]
    fn device_node_port_ends_cleanly() {
        let (dispatch, _) = dispatch();
        let mut port = dispatch.open_port("/dev/null").expect("open");
        assert_eq!(port.class(), PortClass::UnixPath);
        port.start_doc("Queue", 7, &DocInfo::default()).expect("start");
        port.write(b"discarded").expect("write");
        port.end_doc().expect("end");
        port.close().expect("close");
    }

    #[test]
    fn lpt_is_forwarded_to_local_port() {
        let dir = tempfile::tempdir().expect("tempdir");
        let device = dir.path().join("lp0");
        let (dispatch, store) = dispatch();
        store
            .set_device_path("LPT1:", Some(device.to_str().expect("utf8")))
            .expect("map");

        let mut port = dispatch.open_port("LPT1:").expect("open");
        assert_eq!(port.class(), PortClass::Lpt);
        assert!(port.monitor().is_some_and(|m| m.is_local_port()));
        port.start_doc("Queue", 1, &DocInfo::default()).expect("start");
        port.write(b"parallel").expect("write");
        port.close().expect("close");

        assert_eq!(std::fs::read(&device).expect("read"), b"parallel");
    }

    #[test]
    fn unwritable_unregistered_name_is_unknown() {
        let (dispatch, _) = dispatch();
        assert!(matches!(
            dispatch.open_port("no-such-dir/sub/port"),
            Err(SpoolError::UnknownPort(_))
        ));
        assert!(matches!(
            dispatch.open_port(""),
            Err(SpoolError::InvalidParameter(_))
        ));
    }
}
