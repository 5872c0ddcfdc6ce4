// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// `LPR:queue` ports (RFC 1179).
//
// The document is buffered until `end_doc` and then sent in one job: a
// receive-job command, the control file, then the data file.  Each step waits
// for the daemon's one-byte acknowledgement.

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, info, instrument, warn};

use spoolwerk_core::error::{Result, SpoolError};
use spoolwerk_core::types::{DEFAULT_DOC_TITLE, DocInfo};

use super::{DeviceBackend, job_title};

/// Default LPD port.
pub const LPR_PORT: u16 = 515;

/// Where and how to reach the line printer daemon.
#[derive(Debug, Clone)]
pub struct LprTarget {
    pub host: String,
    pub port: u16,
    pub queue: String,
    /// Name sent in the `H` and `P` control lines.
    pub client_host: String,
    pub timeout: Duration,
}

pub struct LprDevice {
    target: LprTarget,
    buffer: Option<Vec<u8>>,
    job_id: u32,
    title: String,
}

impl LprDevice {
    pub fn new(target: LprTarget) -> Self {
        Self {
            target,
            buffer: None,
            job_id: 0,
            title: String::new(),
        }
    }
}

impl DeviceBackend for LprDevice {
    fn start_doc(&mut self, _printer: &str, job_id: u32, doc: &DocInfo) -> Result<()> {
        self.buffer = Some(Vec::new());
        self.job_id = job_id;
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
        runtime.block_on(send_lpr(&self.target, &document, &self.title, self.job_id))
    }
}

/// Read the daemon's acknowledgement byte.
async fn ack(stream: &mut TcpStream, step: &str) -> Result<u8> {
    let mut ack = [0u8; 1];
    stream
        .read_exact(&mut ack)
        .await
        .map_err(|e| SpoolError::Network(format!("LPR {step} ack: {e}")))?;
    Ok(ack[0])
}

async fn send(stream: &mut TcpStream, bytes: &[u8], step: &str) -> Result<()> {
    stream
        .write_all(bytes)
        .await
        .map_err(|e| SpoolError::Network(format!("LPR {step}: {e}")))
}

/// Send one document to an LPD queue.
#[instrument(skip(target, document), fields(host = %target.host, queue = %target.queue, bytes = document.len()))]
pub async fn send_lpr(target: &LprTarget, document: &[u8], job_name: &str, job_id: u32) -> Result<()> {
    let addr = format!("{}:{}", target.host, target.port);
    debug!(addr = %addr, "connecting via LPR");

    let mut stream = tokio::time::timeout(target.timeout, TcpStream::connect(&addr))
        .await
        .map_err(|_| {
            SpoolError::Network(format!(
                "LPR connection to {addr} timed out after {}s",
                target.timeout.as_secs()
            ))
        })?
        .map_err(|e| SpoolError::Network(format!("LPR connect to {addr}: {e}")))?;

    send(&mut stream, format!("\x02{}\n", target.queue).as_bytes(), "command").await?;
    if ack(&mut stream, "command").await? != 0 {
        return Err(SpoolError::Network(format!(
            "LPR daemon rejected queue {:?}",
            target.queue
        )));
    }

    // Job numbers are three digits on the wire.
    let job_num = job_id % 1000;
    let host = &target.client_host;
    let control = format!(
        "H{host}\nP{host}\nJ{job_name}\nldfA{job_num:03}{host}\nUdfA{job_num:03}{host}\nN{job_name}\n"
    );
    send(
        &mut stream,
        format!("\x02{} cfA{job_num:03}{host}\n", control.len()).as_bytes(),
        "control header",
    )
    .await?;
    ack(&mut stream, "control header").await?;
    send(&mut stream, control.as_bytes(), "control file").await?;
    send(&mut stream, &[0], "control terminator").await?;
    ack(&mut stream, "control file").await?;

    send(
        &mut stream,
        format!("\x03{} dfA{job_num:03}{host}\n", document.len()).as_bytes(),
        "data header",
    )
    .await?;
    ack(&mut stream, "data header").await?;
    send(&mut stream, document, "data file").await?;
    send(&mut stream, &[0], "data terminator").await?;
    if ack(&mut stream, "data file").await? != 0 {
        warn!("LPR daemon returned non-zero ack after data transfer");
    }

    info!(job = job_name, "LPR job sent");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::{TcpListener, TcpStream};
    use std::thread;

    use super::*;

    /// Read one `\x02`/`\x03` sub-command and the sized body after it.
    fn read_sized(reader: &mut BufReader<TcpStream>, writer: &mut TcpStream) -> Vec<u8> {
        let mut header = String::new();
        reader.read_line(&mut header).expect("header");
        let len: usize = header[1..]
            .split(' ')
            .next()
            .and_then(|n| n.parse().ok())
            .expect("length");
        writer.write_all(&[0]).expect("ack");
        let mut body = vec![0u8; len + 1];
        reader.read_exact(&mut body).expect("body");
        writer.write_all(&[0]).expect("ack");
        body.truncate(len);
        body
    }

    /// Minimal LPD that acknowledges every step and returns the data file.
    fn fake_lpd() -> (u16, thread::JoinHandle<(String, Vec<u8>)>) {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let port = listener.local_addr().expect("addr").port();
        let handle = thread::spawn(move || {
            let (stream, _) = listener.accept().expect("accept");
            let mut writer = stream.try_clone().expect("clone");
            let mut reader = BufReader::new(stream);

            let mut line = String::new();
            reader.read_line(&mut line).expect("command");
            let queue = line.trim_start_matches('\x02').trim_end().to_string();
            writer.write_all(&[0]).expect("ack");

            let _control = read_sized(&mut reader, &mut writer);
            let data = read_sized(&mut reader, &mut writer);
            (queue, data)
        });
        (port, handle)
    }

    #[test]
    fn delivers_buffered_document() {
        let (port, server) = fake_lpd();
        let mut dev = LprDevice::new(LprTarget {
            host: "127.0.0.1".into(),
            port,
            queue: "laser".into(),
            client_host: "spoolwerk".into(),
            timeout: Duration::from_secs(5),
        });
        dev.start_doc("Queue", 12, &DocInfo::named("report")).expect("start");
        dev.write(b"line one\n").expect("write");
        dev.write(b"line two\n").expect("write");
        dev.end_doc().expect("deliver");

        let (queue, data) = server.join().expect("server");
        assert_eq!(queue, "laser");
        assert_eq!(data, b"line one\nline two\n");
    }

    #[test]
    fn unreachable_daemon_is_network_error() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let port = listener.local_addr().expect("addr").port();
        drop(listener);

        let mut dev = LprDevice::new(LprTarget {
            host: "127.0.0.1".into(),
            port,
            queue: "lp".into(),
            client_host: "spoolwerk".into(),
            timeout: Duration::from_secs(2),
        });
        dev.start_doc("Queue", 1, &DocInfo::default()).expect("start");
        assert!(matches!(dev.end_doc(), Err(SpoolError::Network(_))));
    }
}
