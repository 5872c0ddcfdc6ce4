// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the Spoolwerk print spooler.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Name of the monitor that implicitly owns pipe, unix-path, LPR and CUPS
/// ports as well as plain file paths.
pub const LOCAL_PORT_MONITOR: &str = "Local Port";

/// Environment string reported for monitors installed without one.
pub const LOCAL_ENVIRONMENT: &str = "Windows x64";

/// The pass-through data type every spooler understands.
pub const DATATYPE_RAW: &str = "RAW";
/// Plain text handled by the built-in processor as raw bytes.
pub const DATATYPE_TEXT: &str = "TEXT";

/// Document title used when a job is created without one.
pub const DEFAULT_DOC_TITLE: &str = "Local Downlevel Document";

// -- Access rights (requested through `PrinterDefaults::desired_access`) --
pub const SERVER_ACCESS_ADMINISTER: u32 = 0x0000_0001;
pub const SERVER_ACCESS_ENUMERATE: u32 = 0x0000_0002;
pub const PRINTER_ACCESS_ADMINISTER: u32 = 0x0000_0004;
pub const PRINTER_ACCESS_USE: u32 = 0x0000_0008;

// -- Port type bits reported by `enum_ports` level 2 --
pub const PORT_TYPE_WRITE: u32 = 0x0001;
pub const PORT_TYPE_READ: u32 = 0x0002;
pub const PORT_TYPE_REDIRECTED: u32 = 0x0004;
pub const PORT_TYPE_NET_ATTACHED: u32 = 0x0008;

/// Printer attribute bitmask.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PrinterAttributes(pub u32);

impl PrinterAttributes {
    pub const DEFAULT: Self = Self(0x0004);
    pub const SHARED: Self = Self(0x0008);
    pub const NETWORK: Self = Self(0x0010);
    pub const LOCAL: Self = Self(0x0040);
    /// Keep spool files after the job has been delivered.
    pub const KEEP_PRINTED_JOBS: Self = Self(0x0100);
    /// Only the `RAW` data type may be spooled.
    pub const RAW_ONLY: Self = Self(0x1000);

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for PrinterAttributes {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// One entry returned by a monitor's port enumeration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortInfo {
    pub name: String,
    pub monitor_name: String,
    pub description: String,
    pub port_type: u32,
}

/// One registered port monitor, as reported by `enum_monitors`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorInfo {
    pub name: String,
    pub environment: String,
    pub dll_name: String,
}

/// Document description passed to `start_doc`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocInfo {
    pub document_name: Option<String>,
    /// Deliver to this port or file instead of the printer's port.
    pub output_file: Option<String>,
    pub datatype: Option<String>,
}

impl DocInfo {
    pub fn named(document_name: &str) -> Self {
        Self {
            document_name: Some(document_name.to_string()),
            ..Self::default()
        }
    }
}

/// Per-open overrides supplied to `open_printer`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrinterDefaults {
    pub datatype: Option<String>,
    pub devmode: Option<Vec<u8>>,
    pub print_processor: Option<String>,
    pub desired_access: u32,
}

impl Default for PrinterDefaults {
    fn default() -> Self {
        Self {
            datatype: None,
            devmode: None,
            print_processor: None,
            desired_access: SERVER_ACCESS_ADMINISTER | PRINTER_ACCESS_USE,
        }
    }
}

/// Lifecycle states of a spooled job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    /// Spool file reserved or being written.
    Spooling,
    /// Spool file complete, waiting for delivery.
    Spooled,
    /// Being delivered to the port.
    Printing,
}

impl JobStatus {
    pub fn as_u32(self) -> u32 {
        match self {
            Self::Spooling => 0x0008,
            Self::Spooled => 0x0000,
            Self::Printing => 0x0010,
        }
    }
}

/// Snapshot of a job's metadata as returned by `get_job` / `enum_jobs`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobInfo {
    pub job_id: u32,
    pub printer_name: String,
    pub document: String,
    pub datatype: String,
    pub status: JobStatus,
    pub submitted: DateTime<Utc>,
    pub spool_path: String,
}

/// Result of `add_job`: the id and the spool file the caller should write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddJobInfo {
    pub job_id: u32,
    pub path: String,
}

// -- Form flags --
pub const FORM_USER: u32 = 0x0000_0000;
pub const FORM_BUILTIN: u32 = 0x0000_0001;
pub const FORM_PRINTER: u32 = 0x0000_0002;

/// Printable rectangle of a form, measured from its top-left corner.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormArea {
    pub left: u32,
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
}

/// A paper form.  Dimensions are thousandths of a millimetre.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormInfo {
    pub name: String,
    pub flags: u32,
    pub width: u32,
    pub height: u32,
    pub imageable: FormArea,
}

impl FormInfo {
    /// User form whose imageable area is the whole sheet.
    pub fn new(name: &str, width: u32, height: u32) -> Self {
        Self {
            name: name.to_string(),
            flags: FORM_USER,
            width,
            height,
            imageable: FormArea {
                left: 0,
                top: 0,
                right: width,
                bottom: height,
            },
        }
    }

    pub fn is_builtin(&self) -> bool {
        self.flags & FORM_BUILTIN != 0
    }

    /// Single-byte keyword for the form: its name with every non-ASCII
    /// character replaced by `?`.
    pub fn keyword(&self) -> String {
        self.name
            .chars()
            .map(|c| if c.is_ascii() { c } else { '?' })
            .collect()
    }
}

/// Outcome of a monitor administrative command.
///
/// `status` is the monitor's own status code; a failing status does not make
/// the `XcvData` call itself fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct XcvReply {
    pub status: u32,
    pub needed: usize,
}

impl XcvReply {
    pub fn ok(needed: usize) -> Self {
        Self {
            status: crate::status::ERROR_SUCCESS,
            needed,
        }
    }

    pub fn status(status: u32) -> Self {
        Self { status, needed: 0 }
    }

    pub fn is_success(&self) -> bool {
        self.status == crate::status::ERROR_SUCCESS
    }
}

/// Case-insensitive data-type comparison.
pub fn datatype_eq(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attributes_compose() {
        let attrs = PrinterAttributes::LOCAL | PrinterAttributes::RAW_ONLY;
        assert!(attrs.contains(PrinterAttributes::RAW_ONLY));
        assert!(!attrs.contains(PrinterAttributes::KEEP_PRINTED_JOBS));
    }

    #[test]
    fn form_keyword_is_ascii() {
        let form = FormInfo::new("Enveloppe n\u{b0}9", 98_425, 225_425);
        assert_eq!(form.keyword(), "Enveloppe n?9");
        assert!(!form.is_builtin());
        assert_eq!(form.imageable.bottom, 225_425);
    }

    #[test]
    fn datatype_compare_ignores_case() {
        assert!(datatype_eq("raw", DATATYPE_RAW));
        assert!(!datatype_eq("TEXT", DATATYPE_RAW));
    }
}
