// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Client handles and the names that open them.
//
//   (none)                    server
//   ,XcvMonitor <monitor>     administrative channel on a monitor
//   ,XcvPort <port>           administrative channel on the port's monitor
//   <port>,Port               raw port
//   <printer>,Job <n>         spooled content of job n
//   <printer>                 printer queue
//
// Any of these may carry a leading `\\server\` naming this computer.

use std::fs::File;

use spoolwerk_core::error::{Result, SpoolError};
use spoolwerk_monitor::{PortSession, XcvSession};

use crate::pipeline::DocumentState;
use crate::printer::PrinterRef;

const XCV_MONITOR: &str = "XcvMonitor ";
const XCV_PORT: &str = "XcvPort ";

/// What a name passed to `open_printer` refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpenTarget {
    Server,
    Printer(String),
    Port(String),
    Job { printer: String, job_id: u32 },
    XcvMonitor(String),
    XcvPort(String),
}

/// Whether `server` names this computer.  Absent and empty names do.
pub fn is_local_server(server: Option<&str>, computer_name: &str) -> bool {
    match server {
        None | Some("") => true,
        Some(name) => {
            let name = name.strip_prefix("\\\\").unwrap_or(name);
            let name = name.strip_suffix('\\').unwrap_or(name);
            name.eq_ignore_ascii_case(computer_name)
        }
    }
}

/// Split `\\server\rest` into the server and the rest.
fn split_server(name: &str) -> Option<(&str, &str)> {
    let rest = name.strip_prefix("\\\\")?;
    Some(rest.split_once('\\').unwrap_or((rest, "")))
}

/// Parse a name passed to `open_printer`.
pub fn parse_name(name: Option<&str>, computer_name: &str) -> Result<OpenTarget> {
    let Some(name) = name else {
        return Ok(OpenTarget::Server);
    };
    if name.is_empty() {
        return Err(SpoolError::InvalidParameter("empty printer name".into()));
    }

    let rest = match split_server(name) {
        Some((server, rest)) => {
            if !server.eq_ignore_ascii_case(computer_name) {
                return Err(SpoolError::InvalidPrinterName(format!(
                    "remote server {server:?} is not supported"
                )));
            }
            if rest.is_empty() {
                return Ok(OpenTarget::Server);
            }
            rest
        }
        None => name,
    };

    let lead = rest.trim_start_matches([',', ' ']);
    if let Some(monitor) = lead.strip_prefix(XCV_MONITOR) {
        return Ok(OpenTarget::XcvMonitor(monitor.to_string()));
    }
    if let Some(port) = lead.strip_prefix(XCV_PORT) {
        return Ok(OpenTarget::XcvPort(port.to_string()));
    }

    if let Some((head, tail)) = rest.split_once(',') {
        let tail = tail.trim_start_matches(' ');
        if head.is_empty() {
            return Err(SpoolError::InvalidPrinterName(rest.to_string()));
        }
        if tail == "Port" {
            return Ok(OpenTarget::Port(head.to_string()));
        }
        if let Some(n) = tail.strip_prefix("Job ") {
            let job_id = n
                .trim()
                .parse()
                .map_err(|_| SpoolError::InvalidParameter(format!("bad job number {n:?}")))?;
            return Ok(OpenTarget::Job {
                printer: head.to_string(),
                job_id,
            });
        }
        return Err(SpoolError::InvalidPrinterName(rest.to_string()));
    }

    if rest.contains('\\') {
        return Err(SpoolError::InvalidPrinterName(rest.to_string()));
    }
    Ok(OpenTarget::Printer(rest.to_string()))
}

/// An open printer queue.
pub struct PrinterHandle {
    pub(crate) printer: PrinterRef,
    pub(crate) datatype: Option<String>,
    pub(crate) devmode: Option<Vec<u8>>,
    pub(crate) print_processor: Option<String>,
    pub(crate) access: u32,
    pub(crate) doc: DocumentState,
}

impl PrinterHandle {
    pub fn printer(&self) -> &PrinterRef {
        &self.printer
    }

    pub fn access(&self) -> u32 {
        self.access
    }

    /// Job being written through this handle, if any.
    pub fn active_job(&self) -> Option<u32> {
        self.doc.active_job()
    }
}

impl Drop for PrinterHandle {
    fn drop(&mut self) {
        self.doc.abandon(&self.printer);
    }
}

/// Read access to one job's spool file.
pub struct JobHandle {
    pub(crate) printer: PrinterRef,
    pub(crate) job_id: u32,
    pub(crate) spool: File,
}

impl JobHandle {
    pub fn job_id(&self) -> u32 {
        self.job_id
    }

    pub fn printer(&self) -> &PrinterRef {
        &self.printer
    }
}

pub struct XcvHandle {
    pub(crate) session: XcvSession,
}

pub struct PortHandle {
    pub(crate) session: PortSession,
}

impl PortHandle {
    pub fn session(&self) -> &PortSession {
        &self.session
    }
}

/// Every handle `open_printer` returns.
pub enum Handle {
    Server { access: u32 },
    Printer(PrinterHandle),
    Xcv(XcvHandle),
    Port(PortHandle),
    Job(JobHandle),
}

impl Handle {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Server { .. } => "server",
            Self::Printer(_) => "printer",
            Self::Xcv(_) => "xcv",
            Self::Port(_) => "port",
            Self::Job(_) => "job",
        }
    }

    pub(crate) fn as_printer(&mut self) -> Result<&mut PrinterHandle> {
        match self {
            Self::Printer(h) => Ok(h),
            _ => Err(SpoolError::InvalidHandle),
        }
    }
}

impl std::fmt::Debug for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Printer(h) => write!(f, "Handle::Printer({:?})", h.printer.name()),
            Self::Port(h) => write!(f, "Handle::Port({:?})", h.session.name()),
            Self::Job(h) => write!(f, "Handle::Job({:?}, {})", h.printer.name(), h.job_id),
            other => write!(f, "Handle::{}", other.kind()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(name: &str) -> Result<OpenTarget> {
        parse_name(Some(name), "localhost")
    }

    #[test]
    fn plain_names() {
        assert_eq!(parse_name(None, "localhost").expect("server"), OpenTarget::Server);
        assert_eq!(parse("Office").expect("printer"), OpenTarget::Printer("Office".into()));
        assert!(matches!(parse(""), Err(SpoolError::InvalidParameter(_))));
    }

    #[test]
    fn xcv_names() {
        assert_eq!(
            parse(",XcvMonitor Local Port").expect("xcv"),
            OpenTarget::XcvMonitor("Local Port".into())
        );
        assert_eq!(
            parse("\\\\LOCALHOST\\, XcvPort LPT1:").expect("xcv"),
            OpenTarget::XcvPort("LPT1:".into())
        );
        // The keyword is case-sensitive.
        assert!(matches!(
            parse(",xcvmonitor Local Port"),
            Err(SpoolError::InvalidPrinterName(_))
        ));
    }

    #[test]
    fn suffixed_names() {
        assert_eq!(parse("LPT1:, Port").expect("port"), OpenTarget::Port("LPT1:".into()));
        assert_eq!(
            parse("Office,Job 17").expect("job"),
            OpenTarget::Job { printer: "Office".into(), job_id: 17 }
        );
        assert!(matches!(parse("Office,Job x"), Err(SpoolError::InvalidParameter(_))));
        assert!(matches!(parse("Office,Ports"), Err(SpoolError::InvalidPrinterName(_))));
    }

    #[test]
    fn server_prefix_must_name_this_computer() {
        assert_eq!(parse("\\\\localhost\\Office").expect("local"), OpenTarget::Printer("Office".into()));
        assert_eq!(parse("\\\\localhost").expect("server"), OpenTarget::Server);
        assert!(matches!(
            parse("\\\\elsewhere\\Office"),
            Err(SpoolError::InvalidPrinterName(_))
        ));
        assert!(is_local_server(Some("\\\\LocalHost"), "localhost"));
        assert!(!is_local_server(Some("remote"), "localhost"));
        assert!(is_local_server(None, "localhost"));
    }
}
