// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// spoolwerk-print — printers, jobs, print processors and the local provider.

pub mod handle;
pub mod pipeline;
pub mod printer;
pub mod processor;
pub mod provider;
pub mod queue;

pub use handle::{Handle, OpenTarget, parse_name};
pub use pipeline::{DocPhase, PrintPipeline};
pub use printer::{PrinterInfo, PrinterRef, PrinterRegistry};
pub use processor::{PrintProcessor, ProcessorCatalog, WinPrint};
pub use provider::LocalProvider;
pub use queue::{Job, JobIdAllocator, JobQueue};
