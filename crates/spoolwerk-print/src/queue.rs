// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Per-printer job lists and the shared job-id counter.
//
// Job ids come from one counter for the whole provider.  It wraps back to 1
// past its bound, so two printers may briefly hold the same id; within one
// printer an id is never handed out while a job still holds it.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use spoolwerk_core::error::{Result, SpoolError};
use spoolwerk_core::types::{JobInfo, JobStatus};

/// Wrapping job-id counter.
#[derive(Debug)]
pub struct JobIdAllocator {
    last: AtomicU32,
    max: u32,
}

impl JobIdAllocator {
    pub fn new(max: u32) -> Self {
        Self {
            last: AtomicU32::new(0),
            max: max.max(1),
        }
    }

    pub fn max(&self) -> u32 {
        self.max
    }

    /// Next id in `1..=max`.
    pub fn allocate(&self) -> u32 {
        let mut current = self.last.load(Ordering::Relaxed);
        loop {
            let next = if current >= self.max { 1 } else { current + 1 };
            match self
                .last
                .compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => return next,
                Err(actual) => current = actual,
            }
        }
    }
}

/// One spooled job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: u32,
    pub printer: String,
    pub document: String,
    pub datatype: String,
    /// Port or file to deliver to instead of the printer's port.
    pub output_port: Option<String>,
    pub devmode: Option<Vec<u8>>,
    pub spool_path: PathBuf,
    pub submitted: DateTime<Utc>,
    pub status: JobStatus,
}

impl Job {
    pub fn info(&self) -> JobInfo {
        JobInfo {
            job_id: self.id,
            printer_name: self.printer.clone(),
            document: self.document.clone(),
            datatype: self.datatype.clone(),
            status: self.status,
            submitted: self.submitted,
            spool_path: self.spool_path.display().to_string(),
        }
    }
}

/// Spool file name for a job: zero-padded id plus the printer name with every
/// byte outside `[A-Za-z0-9_-]` written as `%XX`, so distinct printers never
/// share a name.
pub fn spool_file_name(job_id: u32, printer: &str) -> String {
    let mut safe = String::with_capacity(printer.len());
    for b in printer.bytes() {
        if b.is_ascii_alphanumeric() || b == b'-' || b == b'_' {
            safe.push(char::from(b));
        } else {
            safe.push_str(&format!("%{b:02X}"));
        }
    }
    format!("{job_id:05}-{safe}.SPL")
}

/// Ordered list of one printer's jobs.
#[derive(Debug, Default)]
pub struct JobQueue {
    jobs: Mutex<Vec<Job>>,
}

impl JobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Job>> {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Allocate an id not live in this queue and append the job `build`
    /// makes for it.
    pub fn add(&self, ids: &JobIdAllocator, build: impl FnOnce(u32) -> Job) -> Result<Job> {
        let mut jobs = self.lock();
        if jobs.len() >= ids.max() as usize {
            return Err(SpoolError::OutOfMemory);
        }
        let id = loop {
            let id = ids.allocate();
            if !jobs.iter().any(|j| j.id == id) {
                break id;
            }
        };
        let mut job = build(id);
        job.id = id;
        debug!(job_id = id, printer = %job.printer, "job queued");
        jobs.push(job.clone());
        Ok(job)
    }

    pub fn remove(&self, id: u32) -> Option<Job> {
        let mut jobs = self.lock();
        let pos = jobs.iter().position(|j| j.id == id)?;
        Some(jobs.remove(pos))
    }

    pub fn find(&self, id: u32) -> Option<Job> {
        self.lock().iter().find(|j| j.id == id).cloned()
    }

    /// Apply `f` to job `id` in place.
    pub fn update<T>(&self, id: u32, f: impl FnOnce(&mut Job) -> T) -> Option<T> {
        self.lock().iter_mut().find(|j| j.id == id).map(f)
    }

    /// Mark job `id` as printing and return a snapshot of it.
    ///
    /// Fails if the job is gone or another caller is already delivering it.
    pub fn claim(&self, id: u32) -> Result<Job> {
        let mut jobs = self.lock();
        let job = jobs
            .iter_mut()
            .find(|j| j.id == id)
            .ok_or_else(|| SpoolError::InvalidParameter(format!("no job {id}")))?;
        if job.status == JobStatus::Printing {
            return Err(SpoolError::InvalidParameter(format!("job {id} is already printing")));
        }
        job.status = JobStatus::Printing;
        Ok(job.clone())
    }

    pub fn list(&self) -> Vec<Job> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Remove and return every job.
    pub fn drain(&self) -> Vec<Job> {
        std::mem::take(&mut *self.lock())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::thread;

    use super::*;

    fn job(printer: &str) -> impl FnOnce(u32) -> Job + '_ {
        move |id| Job {
            id,
            printer: printer.to_string(),
            document: "doc".into(),
            datatype: "RAW".into(),
            output_port: None,
            devmode: None,
            spool_path: PathBuf::from(spool_file_name(id, printer)),
            submitted: Utc::now(),
            status: JobStatus::Spooling,
        }
    }

    #[test]
    fn allocator_wraps_to_one() {
        let ids = JobIdAllocator::new(3);
        let seq: Vec<u32> = (0..7).map(|_| ids.allocate()).collect();
        assert_eq!(seq, [1, 2, 3, 1, 2, 3, 1]);
    }

    #[test]
    fn live_ids_are_skipped_after_wrap() {
        let ids = JobIdAllocator::new(3);
        let queue = JobQueue::new();
        let first = queue.add(&ids, job("P")).expect("add").id;
        let second = queue.add(&ids, job("P")).expect("add").id;
        queue.remove(second).expect("remove");
        ids.allocate(); // 3, discarded
        // Counter wraps to 1, which is still live.
        let next = queue.add(&ids, job("P")).expect("add").id;
        assert_eq!(first, 1);
        assert_eq!(next, 2);
    }

    #[test]
    fn full_queue_is_refused() {
        let ids = JobIdAllocator::new(2);
        let queue = JobQueue::new();
        queue.add(&ids, job("P")).expect("add");
        queue.add(&ids, job("P")).expect("add");
        assert!(matches!(queue.add(&ids, job("P")), Err(SpoolError::OutOfMemory)));
    }

    #[test]
    fn concurrent_ids_are_distinct() {
        let ids = Arc::new(JobIdAllocator::new(99_999));
        let queue = Arc::new(JobQueue::new());
        let workers: Vec<_> = (0..8)
            .map(|_| {
                let ids = Arc::clone(&ids);
                let queue = Arc::clone(&queue);
                thread::spawn(move || {
                    (0..250)
                        .map(|_| queue.add(&ids, job("Shared")).expect("add").id)
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        let mut seen = HashSet::new();
        for w in workers {
            for id in w.join().expect("worker") {
                assert!(seen.insert(id), "duplicate job id {id}");
            }
        }
        assert_eq!(queue.len(), 2000);
    }

    #[test]
    fn spool_names_are_padded_and_sanitized() {
        assert_eq!(spool_file_name(42, "HP LaserJet/4"), "00042-HP%20LaserJet%2F4.SPL");
    }

    #[test]
    fn similar_printer_names_get_distinct_spool_files() {
        let names = ["A B", "A/B", "A_B", "A%20B", "A\u{e9}B", "A?B"];
        let files: HashSet<String> = names.iter().map(|n| spool_file_name(1, n)).collect();
        assert_eq!(files.len(), names.len());
        assert!(files.iter().all(|f| !f.contains(['/', ' ', '\\'])));
    }

    #[test]
    fn a_job_is_claimed_once() {
        let ids = JobIdAllocator::new(10);
        let queue = JobQueue::new();
        let id = queue.add(&ids, job("P")).expect("add").id;
        assert_eq!(queue.claim(id).expect("first claim").status, JobStatus::Printing);
        assert!(matches!(queue.claim(id), Err(SpoolError::InvalidParameter(_))));

        queue.update(id, |j| j.status = JobStatus::Spooled).expect("present");
        queue.claim(id).expect("claimable again after release");
        queue.remove(id).expect("remove");
        assert!(matches!(queue.claim(id), Err(SpoolError::InvalidParameter(_))));
    }

    #[test]
    fn update_and_drain() {
        let ids = JobIdAllocator::new(10);
        let queue = JobQueue::new();
        let id = queue.add(&ids, job("P")).expect("add").id;
        queue
            .update(id, |j| j.document = "renamed".into())
            .expect("present");
        assert_eq!(queue.find(id).expect("find").document, "renamed");
        assert!(queue.update(99, |_| ()).is_none());
        assert_eq!(queue.drain().len(), 1);
        assert!(queue.is_empty());
    }
}
