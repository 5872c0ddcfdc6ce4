// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Cache of open printers.
//
// One `PrinterInfo` per printer name, loaded from the configuration store on
// first open and shared by every handle on that printer.  The list lock only
// guards scan/insert/remove; each printer's jobs have their own lock.

use std::ops::Deref;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info, instrument, warn};

use spoolwerk_core::error::{Result, SpoolError};
use spoolwerk_core::store::ConfigStore;
use spoolwerk_core::types::PrinterAttributes;

use crate::queue::JobQueue;

/// Static configuration of one printer plus its job list.
#[derive(Debug)]
pub struct PrinterInfo {
    name: String,
    port: String,
    print_processor: String,
    datatype: String,
    attributes: PrinterAttributes,
    devmode: Option<Vec<u8>>,
    jobs: JobQueue,
}

impl PrinterInfo {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn port(&self) -> &str {
        &self.port
    }

    pub fn print_processor(&self) -> &str {
        &self.print_processor
    }

    /// Default data type for documents on this printer.
    pub fn datatype(&self) -> &str {
        &self.datatype
    }

    pub fn attributes(&self) -> PrinterAttributes {
        self.attributes
    }

    pub fn devmode(&self) -> Option<&[u8]> {
        self.devmode.as_deref()
    }

    pub fn jobs(&self) -> &JobQueue {
        &self.jobs
    }
}

struct Slot {
    info: Arc<PrinterInfo>,
    refs: usize,
}

struct Shared {
    store: Arc<dyn ConfigStore>,
    default_datatype: String,
    slots: Mutex<Vec<Slot>>,
}

impl Shared {
    fn slots(&self) -> MutexGuard<'_, Vec<Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Frees the spool files of jobs still queued on a printer being dropped.
fn discard_jobs(info: &PrinterInfo) {
    for job in info.jobs.drain() {
        warn!(printer = %info.name, job_id = job.id, "discarding unprinted job");
        if let Err(e) = std::fs::remove_file(&job.spool_path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %job.spool_path.display(), error = %e, "could not remove spool file");
            }
        }
    }
}

/// Counted reference to an open printer.
pub struct PrinterRef {
    info: Arc<PrinterInfo>,
    shared: Arc<Shared>,
}

impl Deref for PrinterRef {
    type Target = PrinterInfo;

    fn deref(&self) -> &PrinterInfo {
        &self.info
    }
}

impl Clone for PrinterRef {
    fn clone(&self) -> Self {
        if let Some(slot) = self
            .shared
            .slots()
            .iter_mut()
            .find(|s| Arc::ptr_eq(&s.info, &self.info))
        {
            slot.refs += 1;
        }
        Self {
            info: Arc::clone(&self.info),
            shared: Arc::clone(&self.shared),
        }
    }
}

impl Drop for PrinterRef {
    fn drop(&mut self) {
        let freed = {
            let mut slots = self.shared.slots();
            match slots.iter().position(|s| Arc::ptr_eq(&s.info, &self.info)) {
                Some(pos) => {
                    slots[pos].refs -= 1;
                    if slots[pos].refs == 0 {
                        Some(slots.remove(pos))
                    } else {
                        None
                    }
                }
                None => None,
            }
        };
        if let Some(slot) = freed {
            discard_jobs(&slot.info);
            debug!(printer = %slot.info.name, "printer released");
        }
    }
}

impl std::fmt::Debug for PrinterRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("PrinterRef").field(&self.info.name).finish()
    }
}

#[derive(Clone)]
pub struct PrinterRegistry {
    shared: Arc<Shared>,
}

impl PrinterRegistry {
    pub fn new(store: Arc<dyn ConfigStore>, default_datatype: &str) -> Self {
        Self {
            shared: Arc::new(Shared {
                store,
                default_datatype: default_datatype.to_string(),
                slots: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Open `name`, loading its configuration on first use.  Names match
    /// exactly.
    #[instrument(skip(self))]
    pub fn get_or_create(&self, name: &str) -> Result<PrinterRef> {
        let mut slots = self.shared.slots();
        if let Some(slot) = slots.iter_mut().find(|s| s.info.name == name) {
            slot.refs += 1;
            return Ok(self.wrap(Arc::clone(&slot.info)));
        }

        let entry = self
            .shared
            .store
            .printer(name)?
            .ok_or_else(|| SpoolError::InvalidPrinterName(name.to_string()))?;
        let (Some(port), Some(print_processor)) = (entry.port, entry.print_processor) else {
            warn!(printer = name, "printer configuration is missing its port or processor");
            return Err(SpoolError::InvalidPrinterName(name.to_string()));
        };
        let info = Arc::new(PrinterInfo {
            name: entry.name,
            port,
            print_processor,
            datatype: entry
                .datatype
                .unwrap_or_else(|| self.shared.default_datatype.clone()),
            attributes: entry.attributes,
            devmode: entry.devmode,
            jobs: JobQueue::new(),
        });
        info!(printer = name, port = %info.port, "printer loaded");
        slots.push(Slot {
            info: Arc::clone(&info),
            refs: 1,
        });
        Ok(self.wrap(info))
    }

    fn wrap(&self, info: Arc<PrinterInfo>) -> PrinterRef {
        PrinterRef {
            info,
            shared: Arc::clone(&self.shared),
        }
    }

    /// Release one reference.  Same as dropping it.
    pub fn release(&self, printer: PrinterRef) {
        drop(printer);
    }

    pub fn refcount(&self, name: &str) -> Option<usize> {
        self.shared
            .slots()
            .iter()
            .find(|s| s.info.name == name)
            .map(|s| s.refs)
    }

    pub fn len(&self) -> usize {
        self.shared.slots().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::thread;

    use chrono::Utc;
    use spoolwerk_core::store::PrinterEntry;
    use spoolwerk_core::types::JobStatus;
    use spoolwerk_registry::MemoryStore;

    use super::*;
    use crate::queue::{Job, JobIdAllocator};

    fn registry() -> PrinterRegistry {
        let store = Arc::new(MemoryStore::new());
        store
            .put_printer(&PrinterEntry::new("Office", "LPT1:", "winprint"))
            .expect("put");
        store
            .put_printer(&PrinterEntry {
                name: "Broken".into(),
                port: None,
                ..PrinterEntry::new("Broken", "LPT1:", "winprint")
            })
            .expect("put");
        PrinterRegistry::new(store, "RAW")
    }

    #[test]
    fn concurrent_opens_share_one_entry() {
        let reg = registry();
        let refs: Vec<PrinterRef> = (0..8)
            .map(|_| {
                let reg = reg.clone();
                thread::spawn(move || reg.get_or_create("Office").expect("open"))
            })
            .collect::<Vec<_>>()
            .into_iter()
            .map(|h| h.join().expect("thread"))
            .collect();
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.refcount("Office"), Some(8));
        assert!(refs.iter().all(|r| Arc::ptr_eq(&r.info, &refs[0].info)));

        for r in refs {
            reg.release(r);
        }
        assert_eq!(reg.refcount("Office"), None);
        assert!(reg.is_empty());
    }

    #[test]
    fn unknown_or_incomplete_printer_leaves_no_entry() {
        let reg = registry();
        assert!(matches!(
            reg.get_or_create("MyQueue"),
            Err(SpoolError::InvalidPrinterName(_))
        ));
        assert!(matches!(
            reg.get_or_create("Broken"),
            Err(SpoolError::InvalidPrinterName(_))
        ));
        assert!(matches!(
            reg.get_or_create("office"),
            Err(SpoolError::InvalidPrinterName(_))
        ));
        assert!(reg.is_empty());
    }

    #[test]
    fn last_release_discards_queued_jobs() {
        let dir = tempfile::tempdir().expect("tempdir");
        let spool = dir.path().join("00001-Office.SPL");
        std::fs::write(&spool, b"pending").expect("spool");

        let reg = registry();
        let printer = reg.get_or_create("Office").expect("open");
        assert_eq!(printer.datatype(), "RAW");
        let ids = JobIdAllocator::new(10);
        let path = spool.clone();
        printer
            .jobs()
            .add(&ids, move |id| Job {
                id,
                printer: "Office".into(),
                document: "left behind".into(),
                datatype: "RAW".into(),
                output_port: None,
                devmode: None,
                spool_path: PathBuf::from(path),
                submitted: Utc::now(),
                status: JobStatus::Spooled,
            })
            .expect("add");

        let second = printer.clone();
        drop(printer);
        assert!(spool.exists());
        drop(second);
        assert!(!spool.exists());
    }
}
