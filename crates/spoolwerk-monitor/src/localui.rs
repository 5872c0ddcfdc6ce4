// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Companion UI module for the "Local Port" monitor.
//
// There are no dialogs: the port name arrives with the request and every
// change is made through the monitor's administrative channel.

use std::sync::Arc;

use tracing::debug;

use spoolwerk_core::error::{Result, SpoolError};
use spoolwerk_core::types::XcvReply;

use crate::abi::{MonitorUi, XcvChannel};
use crate::localmon::{is_com, is_lpt};
use crate::module::{EntryPoint, PluginModule, StaticModule};

pub const MODULE_NAME: &str = "localui";

pub fn module() -> Box<dyn PluginModule> {
    Box::new(StaticModule::new(MODULE_NAME).export(EntryPoint::PrintMonitorUi(initialize)))
}

fn initialize() -> Option<MonitorUi> {
    Some(MonitorUi {
        add_port_ui: Some(Arc::new(
            |_server: Option<&str>, _monitor: &str, port: &str, xcv: &mut dyn XcvChannel| {
                add_port(port, xcv)
            },
        )),
        configure_port_ui: Some(Arc::new(
            |_server: Option<&str>, port: &str, xcv: &mut dyn XcvChannel| configure_port(port, xcv),
        )),
        delete_port_ui: Some(Arc::new(
            |_server: Option<&str>, port: &str, xcv: &mut dyn XcvChannel| {
                command(xcv, "DeletePort", port).map(|_| ())
            },
        )),
    })
}

fn name_bytes(port: &str) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(port.len() + 1);
    bytes.extend_from_slice(port.as_bytes());
    bytes.push(0);
    bytes
}

/// Send `cmd` with a port name and turn a failing status into an error.
fn command(xcv: &mut dyn XcvChannel, cmd: &str, port: &str) -> Result<XcvReply> {
    let mut out = [0u8; 4];
    let reply = xcv.xcv_data(cmd, &name_bytes(port), &mut out)?;
    match SpoolError::from_code(reply.status, port) {
        None => Ok(reply),
        Some(e) => Err(e),
    }
}

fn add_port(port: &str, xcv: &mut dyn XcvChannel) -> Result<String> {
    if port.is_empty() {
        return Err(SpoolError::InvalidParameter("port name required".into()));
    }
    let mut out = [0u8; 4];
    let reply = xcv.xcv_data("PortExists", &name_bytes(port), &mut out)?;
    if reply.is_success() && u32::from_le_bytes(out) != 0 {
        return Err(SpoolError::AlreadyExists(port.to_string()));
    }
    command(xcv, "AddPort", port)?;
    debug!(port, "port added through UI module");
    Ok(port.to_string())
}

fn configure_port(port: &str, xcv: &mut dyn XcvChannel) -> Result<()> {
    if is_lpt(port) {
        let mut out = [0u8; 4];
        let reply = xcv.xcv_data("GetTransmissionRetryTimeout", &[], &mut out)?;
        if let Some(e) = SpoolError::from_code(reply.status, port) {
            return Err(e);
        }
        let reply = xcv.xcv_data("ConfigureLPTPortCommandOK", &out, &mut [])?;
        if let Some(e) = SpoolError::from_code(reply.status, port) {
            return Err(e);
        }
        debug!(port, timeout = u32::from_le_bytes(out), "parallel port configured");
        Ok(())
    } else if is_com(port) {
        command(xcv, "PortIsValid", port).map(|_| ())
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use spoolwerk_core::status;

    use super::*;

    /// Channel that answers from a fixed table and records commands.
    struct Scripted {
        sent: Vec<String>,
        exists: bool,
    }

    impl XcvChannel for Scripted {
        fn xcv_data(&mut self, command: &str, _input: &[u8], output: &mut [u8]) -> Result<XcvReply> {
            self.sent.push(command.to_string());
            Ok(match command {
                "PortExists" => {
                    output[..4].copy_from_slice(&u32::from(self.exists).to_le_bytes());
                    XcvReply::ok(4)
                }
                "GetTransmissionRetryTimeout" => {
                    output[..4].copy_from_slice(&90u32.to_le_bytes());
                    XcvReply::ok(4)
                }
                "PortIsValid" => XcvReply::status(status::ERROR_PATH_NOT_FOUND),
                _ => XcvReply::ok(0),
            })
        }
    }

    fn ui() -> MonitorUi {
        initialize().expect("ui table")
    }

    #[test]
    fn add_port_checks_existence_first() {
        let mut xcv = Scripted { sent: Vec::new(), exists: false };
        let add = ui().add_port_ui.expect("slot");
        assert_eq!(add(None, "Local Port", "NewPort", &mut xcv).expect("add"), "NewPort");
        assert_eq!(xcv.sent, ["PortExists", "AddPort"]);

        let mut xcv = Scripted { sent: Vec::new(), exists: true };
        assert!(matches!(
            add(None, "Local Port", "NewPort", &mut xcv),
            Err(SpoolError::AlreadyExists(_))
        ));
        assert!(matches!(
            add(None, "Local Port", "", &mut xcv),
            Err(SpoolError::InvalidParameter(_))
        ));
    }

    #[test]
    fn configure_dispatches_on_port_kind() {
        let configure = ui().configure_port_ui.expect("slot");

        let mut xcv = Scripted { sent: Vec::new(), exists: true };
        configure(None, "LPT1:", &mut xcv).expect("lpt");
        assert_eq!(xcv.sent, ["GetTransmissionRetryTimeout", "ConfigureLPTPortCommandOK"]);

        let mut xcv = Scripted { sent: Vec::new(), exists: true };
        assert!(matches!(
            configure(None, "COM1:", &mut xcv),
            Err(SpoolError::PathNotFound(_))
        ));

        let mut xcv = Scripted { sent: Vec::new(), exists: true };
        configure(None, "MyPort", &mut xcv).expect("other ports need nothing");
        assert!(xcv.sent.is_empty());
    }
}
