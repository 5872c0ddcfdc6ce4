// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// `|command` ports: the document is fed to `/bin/sh -c command` on stdin.

use std::io::Write;
use std::process::{Child, Command, Stdio};

use tracing::{debug, warn};

use spoolwerk_core::error::{Result, SpoolError};
use spoolwerk_core::types::DocInfo;

use super::DeviceBackend;

pub struct PipeDevice {
    command: String,
    child: Option<Child>,
}

impl PipeDevice {
    /// `command` is the port name with its leading `|` already removed.
    pub fn new(command: &str) -> Self {
        Self {
            command: command.trim_start().to_string(),
            child: None,
        }
    }
}

impl DeviceBackend for PipeDevice {
    fn start_doc(&mut self, printer: &str, job_id: u32, _doc: &DocInfo) -> Result<()> {
        if self.command.is_empty() {
            return Err(SpoolError::InvalidParameter("empty pipe command".into()));
        }
        let child = Command::new("/bin/sh")
            .arg("-c")
            .arg(&self.command)
            .stdin(Stdio::piped())
            .spawn()?;
        debug!(command = %self.command, pid = child.id(), printer, job_id, "pipe started");
        self.child = Some(child);
        Ok(())
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        let stdin = self
            .child
            .as_mut()
            .and_then(|c| c.stdin.as_mut())
            .ok_or(SpoolError::NoStartDoc)?;
        stdin.write_all(data)?;
        Ok(data.len())
    }

    fn end_doc(&mut self) -> Result<()> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };
        drop(child.stdin.take());
        let status = child.wait()?;
        if status.success() {
            debug!(command = %self.command, "pipe finished");
        } else {
            warn!(command = %self.command, %status, "pipe command exited with failure");
        }
        Ok(())
    }
}

impl Drop for PipeDevice {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take() {
            drop(child.stdin.take());
            match child.wait() {
                Ok(status) if status.success() => {}
                Ok(status) => {
                    warn!(command = %self.command, %status, "unfinished pipe command exited with failure")
                }
                Err(e) => warn!(command = %self.command, error = %e, "could not reap pipe command"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_receives_document_on_stdin() {
        let dir = tempfile::tempdir().expect("tempdir");
        let out = dir.path().join("piped.txt");
        let mut dev = PipeDevice::new(&format!(" cat > '{}'", out.display()));

        dev.start_doc("Queue", 1, &DocInfo::default()).expect("start");
        dev.write(b"through the pipe").expect("write");
        dev.end_doc().expect("end");

        assert_eq!(std::fs::read(&out).expect("read"), b"through the pipe");
    }

    #[test]
    fn failing_command_is_only_logged() {
        let mut dev = PipeDevice::new("exit 3");
        dev.start_doc("Queue", 1, &DocInfo::default()).expect("start");
        dev.end_doc().expect("non-zero exit is not an error");
    }

    #[test]
    fn dropped_pipe_still_delivers() {
        let dir = tempfile::tempdir().expect("tempdir");
        let out = dir.path().join("dropped.txt");
        let mut dev = PipeDevice::new(&format!("cat > '{}'", out.display()));
        dev.start_doc("Queue", 2, &DocInfo::default()).expect("start");
        dev.write(b"no end_doc").expect("write");
        drop(dev);
        assert_eq!(std::fs::read(&out).expect("read"), b"no end_doc");
    }

    #[test]
    fn empty_command_is_rejected() {
        let mut dev = PipeDevice::new("   ");
        assert!(matches!(
            dev.start_doc("Queue", 1, &DocInfo::default()),
            Err(SpoolError::InvalidParameter(_))
        ));
    }
}
