// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Built-in "Local Port" monitor.
//
// Owns the `LPTn:`/`COMn:`/`FILE:` ports and any port added through its
// administrative interface.  Port names map to device paths through the
// store's device table; a port with no device entry cannot be printed to
// directly (the provider routes such names through its own file backend).

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info, warn};

use spoolwerk_core::error::{Result, SpoolError};
use spoolwerk_core::status;
use spoolwerk_core::store::ConfigStore;
use spoolwerk_core::types::{
    DocInfo, LOCAL_PORT_MONITOR, PORT_TYPE_READ, PORT_TYPE_WRITE, PortInfo,
    SERVER_ACCESS_ADMINISTER, XcvReply,
};

use crate::abi::{Monitor2, MonitorInit, MonitorInstance, PortToken, XcvToken};
use crate::module::{EntryPoint, PluginModule, StaticModule};

pub const MODULE_NAME: &str = "localspl";

/// Companion UI module reported by the `MonitorUI` command.
pub const UI_MODULE: &str = "localui";

/// Default for `GetTransmissionRetryTimeout`, in seconds.
pub const DEFAULT_TRANSMISSION_RETRY_TIMEOUT: u32 = 90;

const RETRY_TIMEOUT_KEY: &str = "TransmissionRetryTimeout";

pub fn module() -> Box<dyn PluginModule> {
    Box::new(StaticModule::new(MODULE_NAME).export(EntryPoint::PrintMonitor2(initialize)))
}

/// `LPTn:` or `LPTn` with a numeric suffix.
pub fn is_lpt(name: &str) -> bool {
    has_device_prefix(name, "LPT")
}

/// `COMn:` or `COMn` with a numeric suffix.
pub fn is_com(name: &str) -> bool {
    has_device_prefix(name, "COM")
}

fn has_device_prefix(name: &str, prefix: &str) -> bool {
    if name.len() <= prefix.len() || !name.is_char_boundary(prefix.len()) {
        return false;
    }
    let (head, tail) = name.split_at(prefix.len());
    let digits = tail.strip_suffix(':').unwrap_or(tail);
    head.eq_ignore_ascii_case(prefix)
        && !digits.is_empty()
        && digits.bytes().all(|b| b.is_ascii_digit())
}

/// Decode a UTF-8 port name, dropping an optional NUL terminator.
fn decode_name(input: &[u8]) -> Option<&str> {
    let end = input.iter().position(|&b| b == 0).unwrap_or(input.len());
    std::str::from_utf8(&input[..end]).ok().filter(|s| !s.is_empty())
}

struct OpenPort {
    name: String,
    device: Option<File>,
    readable: bool,
}

struct XcvState {
    access: u32,
}

struct LocalMonitor {
    name: String,
    store: Arc<dyn ConfigStore>,
    ports: Mutex<HashMap<u64, OpenPort>>,
    xcv: Mutex<HashMap<u64, XcvState>>,
    next_token: AtomicU64,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl LocalMonitor {
    fn token(&self) -> u64 {
        self.next_token.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn registered(&self, port: &str) -> Result<bool> {
        Ok(self
            .store
            .monitor_ports(&self.name)?
            .iter()
            .any(|p| p.eq_ignore_ascii_case(port)))
    }

    fn enum_ports(&self) -> Result<Vec<PortInfo>> {
        let ports = self.store.monitor_ports(&self.name)?;
        Ok(ports
            .into_iter()
            .map(|name| {
                let port_type = if is_com(&name) {
                    PORT_TYPE_WRITE | PORT_TYPE_READ
                } else {
                    PORT_TYPE_WRITE
                };
                PortInfo {
                    name,
                    monitor_name: LOCAL_PORT_MONITOR.to_string(),
                    description: LOCAL_PORT_MONITOR.to_string(),
                    port_type,
                }
            })
            .collect())
    }

    fn open_port(&self, name: &str) -> Result<PortToken> {
        if name.eq_ignore_ascii_case("FILE:") {
            return Err(SpoolError::NotSupported(
                "FILE: needs an output file name".into(),
            ));
        }
        if !(is_lpt(name) || is_com(name) || self.registered(name)?) {
            return Err(SpoolError::UnknownPort(name.to_string()));
        }
        let token = self.token();
        lock(&self.ports).insert(
            token,
            OpenPort {
                name: name.to_string(),
                device: None,
                readable: is_com(name),
            },
        );
        debug!(port = name, token, "local port opened");
        Ok(PortToken(token))
    }

    fn start_doc(&self, token: PortToken, printer: &str, job_id: u32) -> Result<()> {
        let mut ports = lock(&self.ports);
        let port = ports.get_mut(&token.0).ok_or(SpoolError::InvalidHandle)?;
        if port.device.is_some() {
            return Ok(());
        }
        let path = self
            .store
            .device_path(&port.name)?
            .ok_or_else(|| SpoolError::PathNotFound(format!("no device for {}", port.name)))?;
        let file = OpenOptions::new()
            .write(true)
            .read(port.readable)
            .create(true)
            .truncate(!port.readable)
            .open(&path)?;
        debug!(port = %port.name, device = %path, printer, job_id, "device opened");
        port.device = Some(file);
        Ok(())
    }

    fn write(&self, token: PortToken, data: &[u8]) -> Result<usize> {
        let mut ports = lock(&self.ports);
        let port = ports.get_mut(&token.0).ok_or(SpoolError::InvalidHandle)?;
        let device = port.device.as_mut().ok_or(SpoolError::NoStartDoc)?;
        device.write_all(data)?;
        Ok(data.len())
    }

    fn read(&self, token: PortToken, buf: &mut [u8]) -> Result<usize> {
        let mut ports = lock(&self.ports);
        let port = ports.get_mut(&token.0).ok_or(SpoolError::InvalidHandle)?;
        if !port.readable {
            return Err(SpoolError::NotSupported(format!("{} is write-only", port.name)));
        }
        let device = port.device.as_mut().ok_or(SpoolError::NoStartDoc)?;
        Ok(device.read(buf)?)
    }

    fn end_doc(&self, token: PortToken) -> Result<()> {
        let mut ports = lock(&self.ports);
        let port = ports.get_mut(&token.0).ok_or(SpoolError::InvalidHandle)?;
        if let Some(mut device) = port.device.take() {
            device.flush()?;
        }
        Ok(())
    }

    fn close_port(&self, token: PortToken) -> Result<()> {
        match lock(&self.ports).remove(&token.0) {
            Some(port) => {
                debug!(port = %port.name, "local port closed");
                Ok(())
            }
            None => Err(SpoolError::InvalidHandle),
        }
    }

    fn add_port(&self, port: &str) -> Result<()> {
        if port.is_empty() {
            return Err(SpoolError::InvalidParameter("empty port name".into()));
        }
        self.store.add_monitor_port(&self.name, port)?;
        info!(port, "local port added");
        Ok(())
    }

    fn delete_port(&self, port: &str) -> Result<()> {
        if !self.store.delete_monitor_port(&self.name, port)? {
            return Err(SpoolError::PathNotFound(port.to_string()));
        }
        self.store.set_device_path(port, None)?;
        info!(port, "local port deleted");
        Ok(())
    }

    fn xcv_open(&self, object: &str, access: u32) -> Result<XcvToken> {
        let token = self.token();
        lock(&self.xcv).insert(token, XcvState { access });
        debug!(object, access, token, "local monitor admin channel opened");
        Ok(XcvToken(token))
    }

    fn xcv_close(&self, token: XcvToken) -> Result<()> {
        lock(&self.xcv)
            .remove(&token.0)
            .map(|_| ())
            .ok_or(SpoolError::InvalidHandle)
    }

    fn xcv_data(&self, token: XcvToken, command: &str, input: &[u8], output: &mut [u8]) -> XcvReply {
        let Some(access) = lock(&self.xcv).get(&token.0).map(|s| s.access) else {
            return XcvReply::status(status::ERROR_INVALID_HANDLE);
        };
        let admin = access & SERVER_ACCESS_ADMINISTER != 0;

        let result = match command {
            "AddPort" | "DeletePort" | "ConfigureLPTPortCommandOK" if !admin => {
                return XcvReply::status(status::ERROR_ACCESS_DENIED);
            }
            "AddPort" => self.cmd_add_port(input),
            "DeletePort" => self.cmd_delete_port(input),
            "MonitorUI" => return write_string(UI_MODULE, output),
            "PortIsValid" => self.cmd_port_is_valid(input),
            "PortExists" => {
                return match decode_name(input).map(|p| self.registered(p)) {
                    Some(Ok(exists)) => write_u32(u32::from(exists), output),
                    Some(Err(e)) => XcvReply::status(e.code()),
                    None => XcvReply::status(status::ERROR_INVALID_PARAMETER),
                };
            }
            "ConfigureLPTPortCommandOK" => self.cmd_set_timeout(input),
            "GetTransmissionRetryTimeout" => {
                return match self.retry_timeout() {
                    Ok(secs) => write_u32(secs, output),
                    Err(e) => XcvReply::status(e.code()),
                };
            }
            other => {
                debug!(command = other, "unsupported local monitor command");
                return XcvReply::status(status::ERROR_NOT_SUPPORTED);
            }
        };
        match result {
            Ok(()) => XcvReply::ok(0),
            Err(e) => {
                debug!(command, error = %e, "local monitor command failed");
                XcvReply::status(e.code())
            }
        }
    }

    fn cmd_add_port(&self, input: &[u8]) -> Result<()> {
        let port = decode_name(input)
            .ok_or_else(|| SpoolError::InvalidParameter("AddPort needs a port name".into()))?;
        if self.registered(port)? {
            return Err(SpoolError::AlreadyExists(port.to_string()));
        }
        self.add_port(port)
    }

    fn cmd_delete_port(&self, input: &[u8]) -> Result<()> {
        let port = decode_name(input)
            .ok_or_else(|| SpoolError::InvalidParameter("DeletePort needs a port name".into()))?;
        self.delete_port(port)
    }

    fn cmd_port_is_valid(&self, input: &[u8]) -> Result<()> {
        let port = decode_name(input)
            .ok_or_else(|| SpoolError::InvalidParameter("PortIsValid needs a port name".into()))?;
        if is_lpt(port) || is_com(port) || port.eq_ignore_ascii_case("FILE:") || self.registered(port)? {
            Ok(())
        } else {
            Err(SpoolError::PathNotFound(port.to_string()))
        }
    }

    fn cmd_set_timeout(&self, input: &[u8]) -> Result<()> {
        let bytes: [u8; 4] = input
            .get(..4)
            .and_then(|b| b.try_into().ok())
            .ok_or_else(|| SpoolError::InvalidParameter("timeout must be a u32".into()))?;
        let secs = u32::from_le_bytes(bytes);
        self.store
            .set_monitor_value(&self.name, RETRY_TIMEOUT_KEY, &secs.to_string())?;
        debug!(secs, "transmission retry timeout updated");
        Ok(())
    }

    fn retry_timeout(&self) -> Result<u32> {
        let stored = self.store.monitor_value(&self.name, RETRY_TIMEOUT_KEY)?;
        Ok(stored
            .and_then(|v| match v.parse::<u32>() {
                Ok(secs) => Some(secs),
                Err(_) => {
                    warn!(value = %v, "ignoring malformed retry timeout");
                    None
                }
            })
            .unwrap_or(DEFAULT_TRANSMISSION_RETRY_TIMEOUT))
    }
}

fn write_string(value: &str, output: &mut [u8]) -> XcvReply {
    let needed = value.len() + 1;
    if output.len() < needed {
        return XcvReply {
            status: status::ERROR_INSUFFICIENT_BUFFER,
            needed,
        };
    }
    output[..value.len()].copy_from_slice(value.as_bytes());
    output[value.len()] = 0;
    XcvReply::ok(needed)
}

fn write_u32(value: u32, output: &mut [u8]) -> XcvReply {
    match output.get_mut(..4) {
        Some(slot) => {
            slot.copy_from_slice(&value.to_le_bytes());
            XcvReply::ok(4)
        }
        None => XcvReply {
            status: status::ERROR_INSUFFICIENT_BUFFER,
            needed: 4,
        },
    }
}

fn initialize(init: &MonitorInit) -> Option<(MonitorInstance, Monitor2)> {
    if !init.local {
        return None;
    }
    let mon = Arc::new(LocalMonitor {
        name: init.name.clone(),
        store: Arc::clone(&init.store),
        ports: Mutex::new(HashMap::new()),
        xcv: Mutex::new(HashMap::new()),
        next_token: AtomicU64::new(0),
    });
    debug!(monitor = %init.name, "local port monitor initialized");

    let m = Arc::clone(&mon);
    let enum_ports = move |_: MonitorInstance, _server: Option<&str>| m.enum_ports();
    let m = Arc::clone(&mon);
    let open_port = move |_: MonitorInstance, name: &str| m.open_port(name);
    let m = Arc::clone(&mon);
    let start_doc = move |t: PortToken, printer: &str, job_id: u32, _doc: &DocInfo| {
        m.start_doc(t, printer, job_id)
    };
    let m = Arc::clone(&mon);
    let write_port = move |t: PortToken, data: &[u8]| m.write(t, data);
    let m = Arc::clone(&mon);
    let read_port = move |t: PortToken, buf: &mut [u8]| m.read(t, buf);
    let m = Arc::clone(&mon);
    let end_doc = move |t: PortToken| m.end_doc(t);
    let m = Arc::clone(&mon);
    let close_port = move |t: PortToken| m.close_port(t);
    let m = Arc::clone(&mon);
    let configure_port = move |_: MonitorInstance, _server: Option<&str>, port: &str| {
        if m.registered(port)? || is_lpt(port) || is_com(port) {
            Ok(())
        } else {
            Err(SpoolError::UnknownPort(port.to_string()))
        }
    };
    let m = Arc::clone(&mon);
    let delete_port =
        move |_: MonitorInstance, _server: Option<&str>, port: &str| m.delete_port(port);
    let m = Arc::clone(&mon);
    let xcv_open = move |_: MonitorInstance, object: &str, access: u32| m.xcv_open(object, access);
    let m = Arc::clone(&mon);
    let xcv_data = move |t: XcvToken, command: &str, input: &[u8], output: &mut [u8]| {
        m.xcv_data(t, command, input, output)
    };
    let m = Arc::clone(&mon);
    let xcv_close = move |t: XcvToken| m.xcv_close(t);
    let m = mon;
    let shutdown = move |_: MonitorInstance| {
        let open = lock(&m.ports).len();
        if open > 0 {
            warn!(open, "local port monitor shut down with ports still open");
        }
    };

    Some((
        MonitorInstance(0),
        Monitor2 {
            enum_ports: Some(Arc::new(enum_ports)),
            open_port: Some(Arc::new(open_port)),
            start_doc: Some(Arc::new(start_doc)),
            write_port: Some(Arc::new(write_port)),
            read_port: Some(Arc::new(read_port)),
            end_doc: Some(Arc::new(end_doc)),
            close_port: Some(Arc::new(close_port)),
            // Port creation goes through the UI module and `AddPort`.
            add_port: None,
            add_port_ex: None,
            configure_port: Some(Arc::new(configure_port)),
            delete_port: Some(Arc::new(delete_port)),
            xcv_open: Some(Arc::new(xcv_open)),
            xcv_data: Some(Arc::new(xcv_data)),
            xcv_close: Some(Arc::new(xcv_close)),
            shutdown: Some(Arc::new(shutdown)),
        },
    ))
}
