// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Local file and unix device path ports.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

use tracing::debug;

use spoolwerk_core::error::{Result, SpoolError};
use spoolwerk_core::types::DocInfo;

use super::DeviceBackend;

pub struct FileDevice {
    path: PathBuf,
    file: Option<File>,
}

impl FileDevice {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file: None,
        }
    }
}

impl DeviceBackend for FileDevice {
    fn start_doc(&mut self, printer: &str, job_id: u32, _doc: &DocInfo) -> Result<()> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&self.path)?;
        debug!(path = %self.path.display(), printer, job_id, "file port opened");
        self.file = Some(file);
        Ok(())
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        let file = self.file.as_mut().ok_or(SpoolError::NoStartDoc)?;
        file.write_all(data)?;
        Ok(data.len())
    }

    fn end_doc(&mut self) -> Result<()> {
        if let Some(mut file) = self.file.take() {
            file.flush()?;
            // Character devices reject fdatasync with EINVAL.
            if file.metadata()?.is_file() {
                file.sync_data()?;
            }
        }
        Ok(())
    }
}
