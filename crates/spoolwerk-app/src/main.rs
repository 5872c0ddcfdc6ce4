// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Spoolwerk command-line front end.
//
// Entry point. Initialises logging, loads the configuration and store, and
// runs one command against the provider.

mod data_dir;

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{error, info, warn};

use spoolwerk_core::enumerate::{EnumRecord, Filled, decode_records};
use spoolwerk_core::status;
use spoolwerk_core::store::{ConfigStore, PrinterEntry};
use spoolwerk_core::types::{
    DocInfo, FormInfo, LOCAL_PORT_MONITOR, MonitorInfo, PortInfo, PrinterAttributes,
};
use spoolwerk_core::{Result, SpoolError, SpoolerConfig};
use spoolwerk_print::LocalProvider;
use spoolwerk_registry::{SqliteStore, seed_defaults};

const CONFIG_FILE: &str = "spoolwerk.json";
const DATABASE_FILE: &str = "spoolwerk.db";

/// Local print spooler with runtime-loaded port monitors
#[derive(Parser, Debug)]
#[command(name = "spoolwerk", version, long_about = None)]
struct Cli {
    /// JSON configuration file (default: spoolwerk.json in the data directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// SQLite database holding monitors, ports and printers
    #[arg(short, long)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the ports of every registered monitor
    Ports {
        #[arg(short, long, default_value_t = 2)]
        level: u32,
    },
    /// List registered port monitors
    Monitors,
    /// List print processors and the data types they accept
    Processors,
    /// List configured printers
    Printers,
    /// Spool a file to a printer and deliver it
    Print {
        printer: String,
        file: PathBuf,
        /// Data type of the document (default: the printer's)
        #[arg(long)]
        datatype: Option<String>,
        /// Document title (default: the file name)
        #[arg(long)]
        title: Option<String>,
        /// Deliver to this port or file instead of the printer's port
        #[arg(short, long)]
        output: Option<String>,
    },
    /// Register a printer queue
    AddPrinter {
        name: String,
        #[arg(short, long)]
        port: String,
        #[arg(long)]
        processor: Option<String>,
        #[arg(long)]
        datatype: Option<String>,
        /// Accept only RAW documents
        #[arg(long)]
        raw_only: bool,
        /// Keep spool files after delivery
        #[arg(long)]
        keep_printed: bool,
    },
    /// Add a port to a monitor
    AddPort {
        name: String,
        #[arg(short, long, default_value = LOCAL_PORT_MONITOR)]
        monitor: String,
    },
    /// Check a port's configuration with its monitor
    ConfigurePort { name: String },
    /// Remove a port
    DeletePort { name: String },
    /// Install a port monitor from a shared library
    AddMonitor {
        name: String,
        module: String,
        #[arg(long)]
        environment: Option<String>,
    },
    /// Remove a port monitor
    DeleteMonitor { name: String },
    /// List built-in and user forms (sizes in thousandths of a millimetre)
    Forms,
    /// Add a user form covering the whole sheet
    AddForm {
        name: String,
        /// Sheet width in thousandths of a millimetre
        width: u32,
        /// Sheet height in thousandths of a millimetre
        height: u32,
    },
    /// Remove a user form
    DeleteForm { name: String },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(code = status::code_name(e.code()), error = %e, "command failed");
            ExitCode::FAILURE
        }
    }
}

fn load_config(explicit: Option<&Path>, data_dir: &Path) -> Result<SpoolerConfig> {
    match explicit {
        Some(path) => SpoolerConfig::load(path),
        None => {
            let path = data_dir.join(CONFIG_FILE);
            if path.exists() {
                SpoolerConfig::load(&path)
            } else {
                Ok(SpoolerConfig::default())
            }
        }
    }
}

/// Open the database, falling back to an in-memory store.
fn open_store(path: &Path) -> Result<Arc<dyn ConfigStore>> {
    let store = match SqliteStore::open(path) {
        Ok(store) => store,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "database unavailable, using in-memory store");
            SqliteStore::open_in_memory()?
        }
    };
    seed_defaults(&store)?;
    Ok(Arc::new(store))
}

fn run(cli: Cli) -> Result<()> {
    let dir = data_dir::data_dir();
    let config = load_config(cli.config.as_deref(), &dir)?;
    let db_path = cli
        .database
        .or_else(|| config.database_path.clone())
        .unwrap_or_else(|| dir.join(DATABASE_FILE));
    let store = open_store(&db_path)?;
    let provider = LocalProvider::with_defaults(config, store);
    execute(&provider, cli.command)
}

/// Probe for the size, then fill and decode.
fn enumerate<T: EnumRecord>(
    level: u32,
    mut call: impl FnMut(&mut [u8]) -> Result<Filled>,
) -> Result<Vec<T>> {
    let needed = match call(&mut []) {
        Ok(filled) => filled.needed,
        Err(SpoolError::InsufficientBuffer { needed }) => needed,
        Err(e) => return Err(e),
    };
    let mut buf = vec![0u8; needed];
    let filled = call(&mut buf)?;
    decode_records(&buf[..filled.needed], level, filled.returned)
}

fn execute(provider: &LocalProvider, command: Command) -> Result<()> {
    match command {
        Command::Ports { level } => {
            let ports: Vec<PortInfo> =
                enumerate(level, |buf: &mut [u8]| provider.enum_ports(None, level, buf))?;
            for port in ports {
                if level == 1 {
                    println!("{}", port.name);
                } else {
                    println!("{:<24} {:<16} type={:#06x}", port.name, port.monitor_name, port.port_type);
                }
            }
        }
        Command::Monitors => {
            let monitors: Vec<MonitorInfo> =
                enumerate(2, |buf: &mut [u8]| provider.enum_monitors(None, 2, buf))?;
            for m in monitors {
                println!("{:<24} {:<16} {}", m.name, m.environment, m.dll_name);
            }
        }
        Command::Processors => {
            let names: Vec<String> =
                enumerate(1, |buf: &mut [u8]| provider.enum_print_processors(None, None, 1, buf))?;
            for name in names {
                let datatypes: Vec<String> = enumerate(1, |buf: &mut [u8]| {
                    provider.enum_print_processor_datatypes(None, &name, 1, buf)
                })?;
                println!("{name}: {}", datatypes.join(", "));
            }
        }
        Command::Printers => {
            for name in provider.printer_names()? {
                match provider.store().printer(&name)? {
                    Some(p) => println!(
                        "{:<24} {:<24} {}",
                        p.name,
                        p.port.unwrap_or_default(),
                        p.print_processor.unwrap_or_default()
                    ),
                    None => println!("{name}"),
                }
            }
        }
        Command::Print {
            printer,
            file,
            datatype,
            title,
            output,
        } => {
            let title = title.unwrap_or_else(|| {
                file.file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| file.display().to_string())
            });
            let doc = DocInfo {
                document_name: Some(title),
                output_file: output,
                datatype,
            };
            let bytes = print_file(provider, &printer, &file, &doc)?;
            info!(printer = %printer, bytes, "document printed");
        }
        Command::AddPrinter {
            name,
            port,
            processor,
            datatype,
            raw_only,
            keep_printed,
        } => {
            let mut attributes = PrinterAttributes::LOCAL;
            if raw_only {
                attributes = attributes | PrinterAttributes::RAW_ONLY;
            }
            if keep_printed {
                attributes = attributes | PrinterAttributes::KEEP_PRINTED_JOBS;
            }
            provider.add_printer(&PrinterEntry {
                name,
                port: Some(port),
                print_processor: processor,
                datatype,
                attributes,
                devmode: None,
            })?;
        }
        Command::AddPort { name, monitor } => provider.add_port(None, &monitor, &name)?,
        Command::ConfigurePort { name } => provider.configure_port(None, &name)?,
        Command::DeletePort { name } => provider.delete_port(None, &name)?,
        Command::AddMonitor {
            name,
            module,
            environment,
        } => provider.add_monitor(None, &name, environment.as_deref(), &module)?,
        Command::DeleteMonitor { name } => provider.delete_monitor(None, None, &name)?,
        Command::Forms => {
            let server = provider.open_printer(None, None)?;
            let forms: Vec<FormInfo> =
                enumerate(1, |buf: &mut [u8]| provider.enum_forms(&server, 1, buf))?;
            for form in forms {
                let origin = if form.is_builtin() { "builtin" } else { "user" };
                println!("{:<40} {:>8} x {:<8} {origin}", form.name, form.width, form.height);
            }
            provider.close_printer(server)?;
        }
        Command::AddForm {
            name,
            width,
            height,
        } => {
            let server = provider.open_printer(None, None)?;
            provider.add_form(&server, 1, &FormInfo::new(&name, width, height))?;
            provider.close_printer(server)?;
        }
        Command::DeleteForm { name } => {
            let server = provider.open_printer(None, None)?;
            provider.delete_form(&server, &name)?;
            provider.close_printer(server)?;
        }
    }
    Ok(())
}

/// Spool `path` to `printer` in chunks; the document is delivered on
/// `end_doc`.
fn print_file(provider: &LocalProvider, printer: &str, path: &Path, doc: &DocInfo) -> Result<u64> {
    let mut input = File::open(path)?;
    let mut handle = provider.open_printer(Some(printer), None)?;
    let job_id = provider.start_doc_printer(&mut handle, doc)?;
    info!(printer, job_id, file = %path.display(), "spooling");

    let mut buf = vec![0u8; 64 * 1024];
    let mut total = 0u64;
    loop {
        let n = match input.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                provider.abort_printer(&mut handle)?;
                return Err(e.into());
            }
        };
        provider.write_printer(&mut handle, &buf[..n])?;
        total += n as u64;
    }
    provider.end_doc_printer(&mut handle)?;
    provider.close_printer(handle)?;
    Ok(total)
}
