// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Print processors.
//
// A processor turns a finished spool file into bytes for the port.  The
// built-in `winprint` passes RAW and TEXT through unchanged.  Other processors
// are shared libraries exporting `InitializePrintProcessor`.

use std::collections::HashMap;
use std::io::Read;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use libloading::Library;
use tracing::{debug, info};

use spoolwerk_core::error::{Result, SpoolError};
use spoolwerk_core::types::{DATATYPE_RAW, DATATYPE_TEXT, datatype_eq};
use spoolwerk_monitor::PortSink;

pub const WINPRINT: &str = "winprint";

/// Symbol a processor library exports.
pub const INITIALIZE_PRINT_PROCESSOR: &str = "InitializePrintProcessor";

/// Signature of [`INITIALIZE_PRINT_PROCESSOR`].
pub type InitializePrintProcessor = fn() -> Box<dyn PrintProcessor>;

/// What a processor is told about the job it is about to print.
#[derive(Debug, Clone, Copy)]
pub struct ProcessorJob<'a> {
    pub printer: &'a str,
    pub job_id: u32,
    pub document: &'a str,
    pub datatype: &'a str,
    pub devmode: Option<&'a [u8]>,
}

/// Processor-assigned token for one `open`..`close` bracket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProcessorSession(pub u64);

pub trait PrintProcessor: Send + Sync {
    fn name(&self) -> &str;

    fn datatypes(&self) -> Vec<String>;

    fn open(&self, job: &ProcessorJob<'_>) -> Result<ProcessorSession>;

    /// Copy the spooled document to the port.  Returns bytes written.
    fn print_document(
        &self,
        session: ProcessorSession,
        spool: &mut dyn Read,
        port: &mut dyn PortSink,
    ) -> Result<u64>;

    fn close(&self, session: ProcessorSession) -> Result<()>;

    fn supports(&self, datatype: &str) -> bool {
        self.datatypes().iter().any(|d| datatype_eq(d, datatype))
    }
}

/// Byte-exact pass-through for RAW and TEXT.
#[derive(Debug, Default)]
pub struct WinPrint {
    sessions: Mutex<HashMap<u64, String>>,
    next: AtomicU64,
}

impl WinPrint {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PrintProcessor for WinPrint {
    fn name(&self) -> &str {
        WINPRINT
    }

    fn datatypes(&self) -> Vec<String> {
        vec![DATATYPE_RAW.to_string(), DATATYPE_TEXT.to_string()]
    }

    fn open(&self, job: &ProcessorJob<'_>) -> Result<ProcessorSession> {
        if !self.supports(job.datatype) {
            return Err(SpoolError::InvalidDatatype(job.datatype.to_string()));
        }
        let id = self.next.fetch_add(1, Ordering::Relaxed) + 1;
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, job.document.to_string());
        Ok(ProcessorSession(id))
    }

    fn print_document(
        &self,
        session: ProcessorSession,
        spool: &mut dyn Read,
        port: &mut dyn PortSink,
    ) -> Result<u64> {
        if !self
            .sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&session.0)
        {
            return Err(SpoolError::InvalidHandle);
        }
        let mut buf = vec![0u8; 64 * 1024];
        let mut total = 0u64;
        loop {
            let n = spool.read(&mut buf)?;
            if n == 0 {
                break;
            }
            let mut chunk = &buf[..n];
            while !chunk.is_empty() {
                let written = port.write(chunk)?;
                if written == 0 {
                    return Err(SpoolError::Io(std::io::ErrorKind::WriteZero.into()));
                }
                chunk = &chunk[written..];
            }
            total += n as u64;
        }
        debug!(session = session.0, bytes = total, "document passed through");
        Ok(total)
    }

    fn close(&self, session: ProcessorSession) -> Result<()> {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&session.0)
            .map(|_| ())
            .ok_or(SpoolError::InvalidHandle)
    }
}

/// A processor from a shared library.  Keeps the library loaded.
struct DylibProcessor {
    processor: Box<dyn PrintProcessor>,
    // Last field: dropped after the processor it provided.
    _library: Library,
}

impl PrintProcessor for DylibProcessor {
    fn name(&self) -> &str {
        self.processor.name()
    }

    fn datatypes(&self) -> Vec<String> {
        self.processor.datatypes()
    }

    fn open(&self, job: &ProcessorJob<'_>) -> Result<ProcessorSession> {
        self.processor.open(job)
    }

    fn print_document(
        &self,
        session: ProcessorSession,
        spool: &mut dyn Read,
        port: &mut dyn PortSink,
    ) -> Result<u64> {
        self.processor.print_document(session, spool, port)
    }

    fn close(&self, session: ProcessorSession) -> Result<()> {
        self.processor.close(session)
    }
}

fn load_dylib(path: &str) -> Result<Box<dyn PrintProcessor>> {
    // SAFETY: processor libraries are administrator-installed and export
    // `InitializePrintProcessor` with exactly this Rust signature.
    unsafe {
        let library = Library::new(Path::new(path))
            .map_err(|e| SpoolError::ModuleNotFound(format!("{path}: {e}")))?;
        let init = *library
            .get::<InitializePrintProcessor>(format!("{INITIALIZE_PRINT_PROCESSOR}\0").as_bytes())
            .map_err(|e| SpoolError::EntryPointNotFound(format!("{path}: {e}")))?;
        let processor = init();
        info!(processor = processor.name(), path, "print processor library loaded");
        Ok(Box::new(DylibProcessor {
            processor,
            _library: library,
        }))
    }
}

/// Processors by name, case-insensitive.
pub struct ProcessorCatalog {
    processors: Mutex<Vec<Arc<dyn PrintProcessor>>>,
}

impl Default for ProcessorCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessorCatalog {
    /// Catalog holding `winprint`.
    pub fn new() -> Self {
        let winprint: Arc<dyn PrintProcessor> = Arc::new(WinPrint::new());
        Self {
            processors: Mutex::new(vec![winprint]),
        }
    }

    pub fn register(&self, processor: Arc<dyn PrintProcessor>) {
        let mut list = self.processors.lock().unwrap_or_else(PoisonError::into_inner);
        list.retain(|p| !p.name().eq_ignore_ascii_case(processor.name()));
        list.push(processor);
    }

    /// Processor `name`.  A name containing a path separator that is not yet
    /// registered is loaded as a shared library.
    pub fn load(&self, name: &str) -> Result<Arc<dyn PrintProcessor>> {
        if let Some(found) = self
            .processors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|p| p.name().eq_ignore_ascii_case(name))
        {
            return Ok(Arc::clone(found));
        }
        if name.contains('/') {
            let processor: Arc<dyn PrintProcessor> = Arc::from(load_dylib(name)?);
            self.register(Arc::clone(&processor));
            return Ok(processor);
        }
        Err(SpoolError::ModuleNotFound(format!("print processor {name:?}")))
    }

    pub fn names(&self) -> Vec<String> {
        self.processors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|p| p.name().to_string())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    /// Sink accepting at most `limit` bytes per call.
    struct Trickle {
        out: Vec<u8>,
        limit: usize,
    }

    impl PortSink for Trickle {
        fn write(&mut self, data: &[u8]) -> Result<usize> {
            let n = data.len().min(self.limit);
            self.out.extend_from_slice(&data[..n]);
            Ok(n)
        }
    }

    fn job(datatype: &str) -> ProcessorJob<'_> {
        ProcessorJob {
            printer: "Office",
            job_id: 1,
            document: "doc",
            datatype,
            devmode: None,
        }
    }

    #[test]
    fn passes_bytes_through_across_short_writes() {
        let wp = WinPrint::new();
        let data: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        let session = wp.open(&job("raw")).expect("open");
        let mut sink = Trickle { out: Vec::new(), limit: 1000 };
        let n = wp
            .print_document(session, &mut Cursor::new(&data), &mut sink)
            .expect("print");
        wp.close(session).expect("close");
        assert_eq!(n, data.len() as u64);
        assert_eq!(sink.out, data);
        assert!(matches!(wp.close(session), Err(SpoolError::InvalidHandle)));
    }

    #[test]
    fn rejects_unknown_datatype() {
        let wp = WinPrint::new();
        assert!(wp.supports("TEXT"));
        assert!(!wp.supports("EMF"));
        assert!(matches!(wp.open(&job("EMF")), Err(SpoolError::InvalidDatatype(_))));
    }

    #[test]
    fn catalog_lookup_is_case_insensitive() {
        let catalog = ProcessorCatalog::new();
        assert_eq!(catalog.load("WinPrint").expect("load").name(), WINPRINT);
        assert!(matches!(
            catalog.load("nosuchproc"),
            Err(SpoolError::ModuleNotFound(_))
        ));
        assert!(matches!(
            catalog.load("/nonexistent/libproc.so"),
            Err(SpoolError::ModuleNotFound(_))
        ));
        assert_eq!(catalog.names(), [WINPRINT]);
    }
}
