// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Document pipeline.
//
// A document on a printer handle moves Idle -> Started -> Writing -> Ended
// -> Scheduled, or to Aborted from any state past Idle.  Ending a document
// schedules it at once: the spool file is run through the printer's print
// processor into the destination port, then deleted with its job.
//
// A delivery failure leaves the job queued in the Spooled state so that
// `schedule_job` can retry it.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use spoolwerk_core::config::SpoolerConfig;
use spoolwerk_core::error::{Result, SpoolError};
use spoolwerk_core::store::ConfigStore;
use spoolwerk_core::types::{
    AddJobInfo, DATATYPE_RAW, DEFAULT_DOC_TITLE, DocInfo, JobStatus, PrinterAttributes,
    datatype_eq,
};
use spoolwerk_monitor::PortDispatch;

use crate::handle::PrinterHandle;
use crate::printer::PrinterInfo;
use crate::processor::{PrintProcessor, ProcessorCatalog, ProcessorJob};
use crate::queue::{Job, JobIdAllocator, spool_file_name};

/// Where a printer handle's document is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocPhase {
    Idle,
    Started,
    Writing,
    Ended,
    Scheduled,
    Aborted,
}

struct ActiveDoc {
    job_id: u32,
    spool: File,
    path: PathBuf,
}

/// Per-handle document state.
pub struct DocumentState {
    phase: DocPhase,
    active: Option<ActiveDoc>,
}

impl Default for DocumentState {
    fn default() -> Self {
        Self {
            phase: DocPhase::Idle,
            active: None,
        }
    }
}

impl DocumentState {
    pub fn phase(&self) -> DocPhase {
        self.phase
    }

    pub fn active_job(&self) -> Option<u32> {
        self.active.as_ref().map(|a| a.job_id)
    }

    /// Drop the active document without printing it.  Returns its job id.
    pub(crate) fn abandon(&mut self, printer: &PrinterInfo) -> Option<u32> {
        let active = self.active.take()?;
        drop(active.spool);
        remove_spool(&active.path);
        printer.jobs().remove(active.job_id);
        self.phase = DocPhase::Aborted;
        debug!(printer = %printer.name(), job_id = active.job_id, "document abandoned");
        Some(active.job_id)
    }
}

fn remove_spool(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "could not remove spool file");
        }
    }
}

/// Shared machinery every printer handle drives its documents through.
pub struct PrintPipeline {
    spool_dir: PathBuf,
    ids: JobIdAllocator,
    processors: ProcessorCatalog,
    ports: PortDispatch,
    store: Arc<dyn ConfigStore>,
}

impl PrintPipeline {
    pub fn new(
        config: &SpoolerConfig,
        processors: ProcessorCatalog,
        ports: PortDispatch,
        store: Arc<dyn ConfigStore>,
    ) -> Self {
        Self {
            spool_dir: config.spool_dir.clone(),
            ids: JobIdAllocator::new(config.max_job_id),
            processors,
            ports,
            store,
        }
    }

    pub fn spool_dir(&self) -> &Path {
        &self.spool_dir
    }

    pub fn ids(&self) -> &JobIdAllocator {
        &self.ids
    }

    pub fn processors(&self) -> &ProcessorCatalog {
        &self.processors
    }

    pub fn ports(&self) -> &PortDispatch {
        &self.ports
    }

    /// First of the printer's processor and the handle's override that loads
    /// and lists `datatype`.
    fn select_processor(
        &self,
        printer: &PrinterInfo,
        fallback: Option<&str>,
        datatype: &str,
    ) -> Result<Arc<dyn PrintProcessor>> {
        if printer.attributes().contains(PrinterAttributes::RAW_ONLY)
            && !datatype_eq(datatype, DATATYPE_RAW)
        {
            return Err(SpoolError::InvalidDatatype(format!(
                "{datatype} on raw-only printer {}",
                printer.name()
            )));
        }
        for name in std::iter::once(printer.print_processor()).chain(fallback) {
            match self.processors.load(name) {
                Ok(p) if p.supports(datatype) => return Ok(p),
                Ok(_) => debug!(processor = name, datatype, "processor does not list data type"),
                Err(e) => warn!(processor = name, error = %e, "print processor unavailable"),
            }
        }
        Err(SpoolError::InvalidDatatype(datatype.to_string()))
    }

    fn queue_job(&self, h: &PrinterHandle, doc: &DocInfo, datatype: &str) -> Result<Job> {
        std::fs::create_dir_all(&self.spool_dir)?;
        let printer = &h.printer;
        let document = doc
            .document_name
            .clone()
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| DEFAULT_DOC_TITLE.to_string());
        printer.jobs().add(&self.ids, |id| Job {
            id,
            printer: printer.name().to_string(),
            document,
            datatype: datatype.to_string(),
            output_port: doc.output_file.clone().filter(|f| !f.is_empty()),
            devmode: h
                .devmode
                .clone()
                .or_else(|| printer.devmode().map(<[u8]>::to_vec)),
            spool_path: self.spool_dir.join(spool_file_name(id, printer.name())),
            submitted: Utc::now(),
            status: JobStatus::Spooling,
        })
    }

    /// Begin a document and return its job id.
    #[instrument(skip(self, h, doc), fields(printer = %h.printer.name()))]
    pub fn start_doc(&self, h: &mut PrinterHandle, doc: &DocInfo) -> Result<u32> {
        if h.doc.active.is_some() {
            return Err(SpoolError::InvalidPrinterState);
        }
        let datatype = doc
            .datatype
            .clone()
            .or_else(|| h.datatype.clone())
            .unwrap_or_else(|| h.printer.datatype().to_string());
        self.select_processor(&h.printer, h.print_processor.as_deref(), &datatype)?;

        let job = self.queue_job(h, doc, &datatype)?;
        let spool = match OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&job.spool_path)
        {
            Ok(f) => f,
            Err(e) => {
                h.printer.jobs().remove(job.id);
                return Err(e.into());
            }
        };
        info!(job_id = job.id, document = %job.document, %datatype, "document started");
        h.doc = DocumentState {
            phase: DocPhase::Started,
            active: Some(ActiveDoc {
                job_id: job.id,
                spool,
                path: job.spool_path,
            }),
        };
        Ok(job.id)
    }

    pub fn write(&self, h: &mut PrinterHandle, data: &[u8]) -> Result<usize> {
        let active = h.doc.active.as_mut().ok_or(SpoolError::NoStartDoc)?;
        active.spool.write_all(data)?;
        h.doc.phase = DocPhase::Writing;
        Ok(data.len())
    }

    /// Finish the document and print it.
    ///
    /// The document stays active until its spool file is on disk, so a
    /// failure before scheduling can still be aborted.  After a failed
    /// delivery the job stays queued for `schedule_job` and a repeated
    /// `end_doc` reports `NoStartDoc`.
    #[instrument(skip(self, h), fields(printer = %h.printer.name()))]
    pub fn end_doc(&self, h: &mut PrinterHandle) -> Result<()> {
        let Some(active) = h.doc.active.as_ref() else {
            return match h.doc.phase {
                DocPhase::Scheduled => Ok(()),
                _ => Err(SpoolError::NoStartDoc),
            };
        };
        active.spool.sync_data()?;
        let job_id = active.job_id;
        h.doc.active = None;
        h.printer.jobs().update(job_id, |j| j.status = JobStatus::Spooled);
        h.doc.phase = DocPhase::Ended;

        self.schedule(&h.printer, job_id, h.print_processor.as_deref())?;
        h.doc.phase = DocPhase::Scheduled;
        Ok(())
    }

    /// Discard the active document.
    pub fn abort(&self, h: &mut PrinterHandle) -> Result<()> {
        match h.doc.abandon(&h.printer) {
            Some(job_id) => {
                info!(printer = %h.printer.name(), job_id, "document aborted");
                Ok(())
            }
            None => Err(SpoolError::NoStartDoc),
        }
    }

    /// Reserve a job and spool path for the caller to fill in.
    pub fn add_job(&self, h: &PrinterHandle) -> Result<AddJobInfo> {
        let datatype = h
            .datatype
            .clone()
            .unwrap_or_else(|| h.printer.datatype().to_string());
        let job = self.queue_job(h, &DocInfo::default(), &datatype)?;
        debug!(printer = %h.printer.name(), job_id = job.id, "job reserved");
        Ok(AddJobInfo {
            job_id: job.id,
            path: job.spool_path.display().to_string(),
        })
    }

    /// Deliver a spooled job to its port and remove it.
    ///
    /// The job is claimed under its queue lock first; a job already being
    /// delivered is refused.
    #[instrument(skip(self, printer, processor_override), fields(printer = %printer.name()))]
    pub fn schedule(
        &self,
        printer: &PrinterInfo,
        job_id: u32,
        processor_override: Option<&str>,
    ) -> Result<()> {
        let job = printer.jobs().claim(job_id)?;
        let delivered = self.destination(printer, &job).and_then(|dest: String| {
            let processor = self.select_processor(printer, processor_override, &job.datatype)?;
            let bytes = self.deliver(printer, &job, &dest, processor.as_ref())?;
            Ok((dest, bytes))
        });
        match delivered {
            Ok((dest, bytes)) => {
                if !printer
                    .attributes()
                    .contains(PrinterAttributes::KEEP_PRINTED_JOBS)
                {
                    remove_spool(&job.spool_path);
                }
                printer.jobs().remove(job_id);
                info!(job_id, port = %dest, bytes, "job printed");
                Ok(())
            }
            Err(e) => {
                printer.jobs().update(job_id, |j| j.status = JobStatus::Spooled);
                warn!(job_id, error = %e, "job delivery failed");
                Err(e)
            }
        }
    }

    /// Port a job goes to: its own override or the printer's port, after
    /// redirection.
    fn destination(&self, printer: &PrinterInfo, job: &Job) -> Result<String> {
        let port = job
            .output_port
            .clone()
            .unwrap_or_else(|| printer.port().to_string());
        let dest = match self.store.port_redirect(&port)? {
            Some(target) => {
                debug!(port = %port, target = %target, "port redirected");
                target
            }
            None => port,
        };
        if dest.eq_ignore_ascii_case("FILE:") {
            return Err(SpoolError::NotSupported(
                "FILE: port needs an output file".into(),
            ));
        }
        Ok(dest)
    }

    fn deliver(
        &self,
        printer: &PrinterInfo,
        job: &Job,
        dest: &str,
        processor: &dyn PrintProcessor,
    ) -> Result<u64> {
        let mut spool = File::open(&job.spool_path)?;
        let mut port = self.ports.open_port(dest)?;
        port.start_doc(
            printer.name(),
            job.id,
            &DocInfo {
                document_name: Some(job.document.clone()),
                output_file: None,
                datatype: Some(job.datatype.clone()),
            },
        )?;

        let session = processor.open(&ProcessorJob {
            printer: printer.name(),
            job_id: job.id,
            document: &job.document,
            datatype: &job.datatype,
            devmode: job.devmode.as_deref(),
        })?;
        let printed = processor.print_document(session, &mut spool, &mut port);
        let closed = processor.close(session);
        let bytes = printed?;
        closed?;

        port.end_doc()?;
        port.close()?;
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use spoolwerk_core::store::PrinterEntry;
    use spoolwerk_monitor::{DefaultLoader, DeviceConfig, MonitorRegistry};
    use spoolwerk_registry::{MemoryStore, seed_defaults};

    use super::*;
    use crate::printer::{PrinterRef, PrinterRegistry};

    struct Fixture {
        printers: PrinterRegistry,
        pipeline: PrintPipeline,
        store: Arc<MemoryStore>,
        dir: tempfile::TempDir,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = Arc::new(MemoryStore::new());
        seed_defaults(store.as_ref()).expect("seed");
        let shared: Arc<dyn ConfigStore> = store.clone();
        let monitors = MonitorRegistry::new(Arc::new(DefaultLoader::default()), Arc::clone(&shared));
        let config = SpoolerConfig {
            spool_dir: dir.path().join("spool"),
            ..SpoolerConfig::default()
        };
        let pipeline = PrintPipeline::new(
            &config,
            ProcessorCatalog::new(),
            PortDispatch::new(monitors, DeviceConfig::default()),
            Arc::clone(&shared),
        );
        Fixture {
            printers: PrinterRegistry::new(shared, "RAW"),
            pipeline,
            store,
            dir,
        }
    }

    impl Fixture {
        fn output(&self) -> PathBuf {
            self.dir.path().join("out.prn")
        }

        fn printer(&self, entry: PrinterEntry) -> PrinterRef {
            self.store.put_printer(&entry).expect("put");
            self.printers.get_or_create(&entry.name).expect("open")
        }

        fn office(&self) -> PrinterRef {
            let port = self.output().display().to_string();
            self.printer(PrinterEntry::new("Office", &port, "winprint"))
        }
    }

    fn handle(printer: PrinterRef) -> PrinterHandle {
        PrinterHandle {
            printer,
            datatype: None,
            devmode: None,
            print_processor: None,
            access: 0,
            doc: DocumentState::default(),
        }
    }

    #[test]
    fn document_reaches_file_port_unchanged() {
        let fx = fixture();
        let mut h = handle(fx.office());
        let payload: Vec<u8> = (0..=255u8).cycle().take(10_000).collect();

        let job_id = fx.pipeline.start_doc(&mut h, &DocInfo::named("report")).expect("start");
        assert_eq!(h.doc.phase(), DocPhase::Started);
        let spool = fx.pipeline.spool_dir().join(spool_file_name(job_id, "Office"));
        assert!(spool.exists());

        for chunk in payload.chunks(999) {
            fx.pipeline.write(&mut h, chunk).expect("write");
        }
        assert_eq!(h.doc.phase(), DocPhase::Writing);
        fx.pipeline.end_doc(&mut h).expect("end");

        assert_eq!(std::fs::read(fx.output()).expect("output"), payload);
        assert_eq!(h.doc.phase(), DocPhase::Scheduled);
        assert!(h.printer.jobs().is_empty());
        assert!(!spool.exists());

        // A second end_doc is harmless.
        fx.pipeline.end_doc(&mut h).expect("second end");
    }

    #[test]
    fn end_or_abort_without_document() {
        let fx = fixture();
        let mut h = handle(fx.office());
        assert!(matches!(fx.pipeline.end_doc(&mut h), Err(SpoolError::NoStartDoc)));
        assert!(matches!(fx.pipeline.abort(&mut h), Err(SpoolError::NoStartDoc)));
        assert!(matches!(fx.pipeline.write(&mut h, b"x"), Err(SpoolError::NoStartDoc)));
    }

    #[test]
    fn unsupported_datatype_creates_no_job() {
        let fx = fixture();
        let mut h = handle(fx.office());
        let doc = DocInfo {
            datatype: Some("NT EMF 1.008".into()),
            ..DocInfo::named("emf")
        };
        assert!(matches!(
            fx.pipeline.start_doc(&mut h, &doc),
            Err(SpoolError::InvalidDatatype(_))
        ));
        assert!(h.printer.jobs().is_empty());
        assert_eq!(h.active_job(), None);
    }

    #[test]
    fn raw_only_printer_rejects_text() {
        let fx = fixture();
        let port = fx.output().display().to_string();
        let mut h = handle(fx.printer(PrinterEntry {
            attributes: PrinterAttributes::RAW_ONLY,
            ..PrinterEntry::new("RawOnly", &port, "winprint")
        }));
        let text = DocInfo {
            datatype: Some("TEXT".into()),
            ..DocInfo::default()
        };
        assert!(matches!(
            fx.pipeline.start_doc(&mut h, &text),
            Err(SpoolError::InvalidDatatype(_))
        ));
        fx.pipeline.start_doc(&mut h, &DocInfo::default()).expect("raw is fine");
    }

    #[test]
    fn handle_processor_is_the_fallback() {
        let fx = fixture();
        let port = fx.output().display().to_string();
        let mut h = handle(fx.printer(PrinterEntry::new("Odd", &port, "no-such-processor")));
        assert!(matches!(
            fx.pipeline.start_doc(&mut h, &DocInfo::default()),
            Err(SpoolError::InvalidDatatype(_))
        ));

        h.print_processor = Some("WinPrint".into());
        fx.pipeline.start_doc(&mut h, &DocInfo::default()).expect("start");
        fx.pipeline.write(&mut h, b"ok").expect("write");
        fx.pipeline.end_doc(&mut h).expect("end");
        assert_eq!(std::fs::read(fx.output()).expect("output"), b"ok");
    }

    #[test]
    fn second_start_is_invalid_state() {
        let fx = fixture();
        let mut h = handle(fx.office());
        fx.pipeline.start_doc(&mut h, &DocInfo::default()).expect("start");
        assert!(matches!(
            fx.pipeline.start_doc(&mut h, &DocInfo::default()),
            Err(SpoolError::InvalidPrinterState)
        ));
        assert_eq!(h.printer.jobs().len(), 1);
    }

    #[test]
    fn abort_discards_job_and_spool_file() {
        let fx = fixture();
        let mut h = handle(fx.office());
        let job_id = fx.pipeline.start_doc(&mut h, &DocInfo::default()).expect("start");
        fx.pipeline.write(&mut h, b"never printed").expect("write");
        let spool = fx.pipeline.spool_dir().join(spool_file_name(job_id, "Office"));

        fx.pipeline.abort(&mut h).expect("abort");
        assert_eq!(h.doc.phase(), DocPhase::Aborted);
        assert!(!spool.exists());
        assert!(h.printer.jobs().is_empty());
        assert!(!fx.output().exists());
        assert!(matches!(fx.pipeline.end_doc(&mut h), Err(SpoolError::NoStartDoc)));
    }

    #[test]
    fn dropped_handle_abandons_its_document() {
        let fx = fixture();
        let printer = fx.office();
        let mut h = handle(printer.clone());
        let job_id = fx.pipeline.start_doc(&mut h, &DocInfo::default()).expect("start");
        let spool = fx.pipeline.spool_dir().join(spool_file_name(job_id, "Office"));
        drop(h);
        assert!(!spool.exists());
        assert!(printer.jobs().is_empty());
    }

    #[test]
    fn failed_delivery_keeps_job_spooled() {
        let fx = fixture();
        let mut h = handle(fx.printer(PrinterEntry::new(
            "Nowhere",
            "/nonexistent-spoolwerk-dir/out.prn",
            "winprint",
        )));
        let job_id = fx.pipeline.start_doc(&mut h, &DocInfo::default()).expect("start");
        fx.pipeline.write(&mut h, b"stuck").expect("write");
        assert!(fx.pipeline.end_doc(&mut h).is_err());

        let job = h.printer.jobs().find(job_id).expect("still queued");
        assert_eq!(job.status, JobStatus::Spooled);
        assert!(job.spool_path.exists());

        // The document is over; only schedule_job can retry it.
        assert_eq!(h.doc.phase(), DocPhase::Ended);
        assert!(matches!(fx.pipeline.end_doc(&mut h), Err(SpoolError::NoStartDoc)));
        assert!(h.printer.jobs().find(job_id).is_some());
    }

    #[cfg(unix)]
    #[test]
    fn failed_spool_sync_keeps_document_abortable() {
        let fx = fixture();
        let mut h = handle(fx.office());
        let job_id = fx.pipeline.start_doc(&mut h, &DocInfo::default()).expect("start");
        fx.pipeline.write(&mut h, b"partial").expect("write");
        let spool = fx.pipeline.spool_dir().join(spool_file_name(job_id, "Office"));

        // fdatasync on a character device fails with EINVAL.
        h.doc.active.as_mut().expect("active").spool = OpenOptions::new()
            .write(true)
            .open("/dev/null")
            .expect("open /dev/null");
        assert!(matches!(fx.pipeline.end_doc(&mut h), Err(SpoolError::Io(_))));
        assert_eq!(h.active_job(), Some(job_id));
        assert_eq!(
            h.printer.jobs().find(job_id).expect("queued").status,
            JobStatus::Spooling
        );

        fx.pipeline.abort(&mut h).expect("abort");
        assert!(h.printer.jobs().is_empty());
        assert!(!spool.exists());
        assert!(!fx.output().exists());
    }

    #[test]
    fn concurrent_schedules_deliver_once() {
        let fx = fixture();
        let out = fx.output();
        let port = format!("|sleep 0.2; cat >> '{}'", out.display());
        let h = handle(fx.printer(PrinterEntry::new("Slow", &port, "winprint")));
        let reserved = fx.pipeline.add_job(&h).expect("add job");
        std::fs::write(&reserved.path, b"once").expect("fill spool");

        let results: Vec<Result<()>> = std::thread::scope(|s| {
            let workers: Vec<_> = (0..2)
                .map(|_| s.spawn(|| fx.pipeline.schedule(&h.printer, reserved.job_id, None)))
                .collect();
            workers
                .into_iter()
                .map(|w| w.join().expect("worker"))
                .collect()
        });

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(
            results
                .iter()
                .any(|r| matches!(r, Err(SpoolError::InvalidParameter(_))))
        );
        assert_eq!(std::fs::read(&out).expect("output"), b"once");
        assert!(h.printer.jobs().is_empty());
    }

    #[test]
    fn file_port_without_output_file_is_not_supported() {
        let fx = fixture();
        let mut h = handle(fx.printer(PrinterEntry::new("ToFile", "FILE:", "winprint")));
        fx.pipeline.start_doc(&mut h, &DocInfo::default()).expect("start");
        assert!(matches!(
            fx.pipeline.end_doc(&mut h),
            Err(SpoolError::NotSupported(_))
        ));

        // An explicit output file takes the place of the printer's port.
        let out = fx.dir.path().join("explicit.prn");
        let mut h = handle(fx.printer(PrinterEntry::new("ToFile2", "FILE:", "winprint")));
        let doc = DocInfo {
            output_file: Some(out.display().to_string()),
            ..DocInfo::default()
        };
        fx.pipeline.start_doc(&mut h, &doc).expect("start");
        fx.pipeline.write(&mut h, b"to file").expect("write");
        fx.pipeline.end_doc(&mut h).expect("end");
        assert_eq!(std::fs::read(out).expect("read"), b"to file");
    }

    #[test]
    fn redirected_port_is_followed() {
        let fx = fixture();
        let target = fx.dir.path().join("redirected.prn");
        fx.store
            .set_port_redirect("LPT2:", Some(&target.display().to_string()))
            .expect("redirect");
        let mut h = handle(fx.printer(PrinterEntry::new("Legacy", "LPT2:", "winprint")));
        fx.pipeline.start_doc(&mut h, &DocInfo::default()).expect("start");
        fx.pipeline.write(&mut h, b"via redirect").expect("write");
        fx.pipeline.end_doc(&mut h).expect("end");
        assert_eq!(std::fs::read(target).expect("read"), b"via redirect");
    }

    #[test]
    fn add_job_then_schedule() {
        let fx = fixture();
        let h = handle(fx.office());
        let reserved = fx.pipeline.add_job(&h).expect("add job");
        assert!(!Path::new(&reserved.path).exists());
        let job = h.printer.jobs().find(reserved.job_id).expect("queued");
        assert_eq!(job.document, DEFAULT_DOC_TITLE);
        assert_eq!(job.status, JobStatus::Spooling);

        std::fs::write(&reserved.path, b"written elsewhere").expect("fill spool");
        fx.pipeline
            .schedule(&h.printer, reserved.job_id, None)
            .expect("schedule");
        assert_eq!(std::fs::read(fx.output()).expect("output"), b"written elsewhere");
        assert!(h.printer.jobs().is_empty());
    }

    #[test]
    fn kept_jobs_leave_spool_file() {
        let fx = fixture();
        let port = fx.output().display().to_string();
        let mut h = handle(fx.printer(PrinterEntry {
            attributes: PrinterAttributes::KEEP_PRINTED_JOBS,
            ..PrinterEntry::new("Archive", &port, "winprint")
        }));
        let job_id = fx.pipeline.start_doc(&mut h, &DocInfo::default()).expect("start");
        fx.pipeline.write(&mut h, b"keep me").expect("write");
        fx.pipeline.end_doc(&mut h).expect("end");
        let spool = fx.pipeline.spool_dir().join(spool_file_name(job_id, "Archive"));
        assert_eq!(std::fs::read(spool).expect("kept"), b"keep me");
        assert!(h.printer.jobs().is_empty());
    }
}
