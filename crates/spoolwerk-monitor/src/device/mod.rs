// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// In-layer port backends.
//
// These classes are driven directly by the port layer instead of through a
// monitor table:
//   - `file`  local file paths and `/`-prefixed unix device paths
//   - `pipe`  `|command` ports, fed through `/bin/sh -c`
//   - `lpr`   `LPR:queue` ports, RFC 1179 over TCP
//   - `cups`  `CUPS:queue` ports, IPP Print-Job against the CUPS server

pub mod cups;
pub mod file;
pub mod lpr;
pub mod pipe;

use spoolwerk_core::error::{Result, SpoolError};
use spoolwerk_core::types::DocInfo;

pub use cups::CupsDevice;
pub use file::FileDevice;
pub use lpr::LprDevice;
pub use pipe::PipeDevice;

/// One document sink driven by a `PortSession`.
pub trait DeviceBackend: Send {
    fn start_doc(&mut self, printer: &str, job_id: u32, doc: &DocInfo) -> Result<()>;

    fn write(&mut self, data: &[u8]) -> Result<usize>;

    /// Finish the document.  Network backends deliver here.
    fn end_doc(&mut self) -> Result<()>;

    fn read(&mut self, _buf: &mut [u8]) -> Result<usize> {
        Err(SpoolError::NotSupported("port is write-only".into()))
    }

    /// Whether `write`/`end_doc` must run on the thread that called
    /// `start_doc`.
    fn thread_affine(&self) -> bool {
        false
    }
}

/// Document title, falling back to `default` when unnamed.
pub(crate) fn job_title<'a>(doc: &'a DocInfo, default: &'a str) -> &'a str {
    doc.document_name
        .as_deref()
        .filter(|n| !n.is_empty())
        .unwrap_or(default)
}
