// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// `CUPS:queue` ports, submitted as an IPP Print-Job to the CUPS server.
//
// A CUPS job belongs to the thread that started it: `write` and `end_doc`
// from any other thread are refused by the port session.

use std::io::Cursor;

use ipp::prelude::*;
use tracing::{error, info, instrument};

use spoolwerk_core::error::{Result, SpoolError};
use spoolwerk_core::types::{DEFAULT_DOC_TITLE, DocInfo};

use super::{DeviceBackend, job_title};

pub struct CupsDevice {
    uri: String,
    buffer: Option<Vec<u8>>,
    title: String,
}

impl CupsDevice {
    /// `server` is `host[:port]` of the CUPS scheduler.
    pub fn new(server: &str, queue: &str) -> Self {
        Self {
            uri: printer_uri(server, queue),
            buffer: None,
            title: String::new(),
        }
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }
}

pub fn printer_uri(server: &str, queue: &str) -> String {
    format!("ipp://{server}/printers/{queue}")
}

impl DeviceBackend for CupsDevice {
    fn start_doc(&mut self, _printer: &str, _job_id: u32, doc: &DocInfo) -> Result<()> {
        self.buffer = Some(Vec::new());
        self.title = job_title(doc, DEFAULT_DOC_TITLE).to_string();
        Ok(())
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        let buffer = self.buffer.as_mut().ok_or(SpoolError::NoStartDoc)?;
        buffer.extend_from_slice(data);
        Ok(data.len())
    }

    fn end_doc(&mut self) -> Result<()> {
        let Some(document) = self.buffer.take() else {
            return Ok(());
        };
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        runtime.block_on(print_job(&self.uri, document, &self.title))
    }

    fn thread_affine(&self) -> bool {
        true
    }
}

/// Submit `document` as a raw Print-Job.
#[instrument(skip(document), fields(bytes = document.len()))]
pub async fn print_job(uri: &str, document: Vec<u8>, job_name: &str) -> Result<()> {
    let uri: Uri = uri
        .parse()
        .map_err(|e| SpoolError::InvalidParameter(format!("invalid CUPS URI '{uri}': {e}")))?;
    let payload = IppPayload::new(Cursor::new(document));
    let operation = IppOperationBuilder::print_job(uri.clone(), payload)
        .job_title(job_name)
        .document_format("application/octet-stream")
        .build();

    let client = AsyncIppClient::new(uri);
    let response = client
        .send(operation)
        .await
        .map_err(|e| SpoolError::Network(format!("Print-Job: {e}")))?;

    if !response.header().status_code().is_success() {
        let code = response.header().status_code();
        error!(status = ?code, "Print-Job failed");
        return Err(SpoolError::Network(format!(
            "Print-Job returned status {code:?}"
        )));
    }
    info!(job = job_name, "CUPS job accepted");
    Ok(())
}
