// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Probe/fill enumeration buffers.
//
// Enumeration calls write a packed array of records into a caller buffer.
// Strings are NUL-terminated UTF-8 and integers are u32 little-endian.  A
// buffer that is too small fails with `InsufficientBuffer { needed }`; the
// caller retries with exactly `needed` bytes.

use chrono::{DateTime, Utc};

use crate::error::{Result, SpoolError};
use crate::types::{FormArea, FormInfo, JobInfo, JobStatus, MonitorInfo, PortInfo};

/// Outcome of a successful fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Filled {
    /// Bytes the complete result occupies.
    pub needed: usize,
    /// Number of records written.
    pub returned: usize,
}

/// A record that can be packed into an enumeration buffer.
pub trait EnumRecord: Sized {
    /// Structure levels this record supports.
    const LEVELS: &'static [u32];

    fn encode(&self, level: u32, out: &mut Vec<u8>);

    fn decode(level: u32, reader: &mut RecordReader<'_>) -> Result<Self>;
}

/// Fail with `InvalidLevel` unless `level` is one of `supported`.
pub fn check_level(level: u32, supported: &[u32]) -> Result<()> {
    if supported.contains(&level) {
        Ok(())
    } else {
        Err(SpoolError::InvalidLevel(level))
    }
}

/// Pack `records` at `level` into `buf`.
///
/// With an empty or short buffer nothing is written and the exact size is
/// reported through `InsufficientBuffer`.
pub fn fill<T: EnumRecord>(records: &[T], level: u32, buf: &mut [u8]) -> Result<Filled> {
    check_level(level, T::LEVELS)?;
    let mut packed = Vec::new();
    for record in records {
        record.encode(level, &mut packed);
    }
    let needed = packed.len();
    if buf.len() < needed {
        return Err(SpoolError::InsufficientBuffer { needed });
    }
    buf[..needed].copy_from_slice(&packed);
    Ok(Filled {
        needed,
        returned: records.len(),
    })
}

/// Unpack `count` records previously written by [`fill`].
pub fn decode_records<T: EnumRecord>(buf: &[u8], level: u32, count: usize) -> Result<Vec<T>> {
    check_level(level, T::LEVELS)?;
    let mut reader = RecordReader::new(buf);
    (0..count).map(|_| T::decode(level, &mut reader)).collect()
}

/// Sequential reader over a packed buffer.
pub struct RecordReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> RecordReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn string(&mut self) -> Result<String> {
        let rest = &self.buf[self.pos..];
        let end = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| SpoolError::InvalidParameter("unterminated string in buffer".into()))?;
        let s = std::str::from_utf8(&rest[..end])
            .map_err(|e| SpoolError::InvalidParameter(format!("non UTF-8 string: {e}")))?;
        self.pos += end + 1;
        Ok(s.to_string())
    }

    pub fn u32(&mut self) -> Result<u32> {
        let bytes: [u8; 4] = self
            .buf
            .get(self.pos..self.pos + 4)
            .and_then(|s| s.try_into().ok())
            .ok_or_else(|| SpoolError::InvalidParameter("truncated integer in buffer".into()))?;
        self.pos += 4;
        Ok(u32::from_le_bytes(bytes))
    }
}

/// Append a NUL-terminated UTF-8 string.
pub fn put_str(out: &mut Vec<u8>, s: &str) {
    out.extend_from_slice(s.as_bytes());
    out.push(0);
}

/// Append a little-endian u32.
pub fn put_u32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_le_bytes());
}

impl EnumRecord for PortInfo {
    const LEVELS: &'static [u32] = &[1, 2];

    fn encode(&self, level: u32, out: &mut Vec<u8>) {
        put_str(out, &self.name);
        if level == 2 {
            put_str(out, &self.monitor_name);
            put_str(out, &self.description);
            put_u32(out, self.port_type);
            // reserved
            put_u32(out, 0);
        }
    }

    fn decode(level: u32, reader: &mut RecordReader<'_>) -> Result<Self> {
        let name = reader.string()?;
        if level == 1 {
            return Ok(Self {
                name,
                monitor_name: String::new(),
                description: String::new(),
                port_type: 0,
            });
        }
        let monitor_name = reader.string()?;
        let description = reader.string()?;
        let port_type = reader.u32()?;
        let _reserved = reader.u32()?;
        Ok(Self {
            name,
            monitor_name,
            description,
            port_type,
        })
    }
}

impl EnumRecord for MonitorInfo {
    const LEVELS: &'static [u32] = &[1, 2];

    fn encode(&self, level: u32, out: &mut Vec<u8>) {
        put_str(out, &self.name);
        if level == 2 {
            put_str(out, &self.environment);
            put_str(out, &self.dll_name);
        }
    }

    fn decode(level: u32, reader: &mut RecordReader<'_>) -> Result<Self> {
        let name = reader.string()?;
        let (environment, dll_name) = if level == 2 {
            (reader.string()?, reader.string()?)
        } else {
            (String::new(), String::new())
        };
        Ok(Self {
            name,
            environment,
            dll_name,
        })
    }
}

/// Plain names: print processors and data types.
impl EnumRecord for String {
    const LEVELS: &'static [u32] = &[1];

    fn encode(&self, _level: u32, out: &mut Vec<u8>) {
        put_str(out, self);
    }

    fn decode(_level: u32, reader: &mut RecordReader<'_>) -> Result<Self> {
        reader.string()
    }
}

impl EnumRecord for JobInfo {
    const LEVELS: &'static [u32] = &[1];

    fn encode(&self, _level: u32, out: &mut Vec<u8>) {
        put_u32(out, self.job_id);
        put_str(out, &self.printer_name);
        put_str(out, &self.document);
        put_str(out, &self.datatype);
        put_u32(out, self.status.as_u32());
        put_str(out, &self.submitted.to_rfc3339());
        put_str(out, &self.spool_path);
    }

    fn decode(_level: u32, reader: &mut RecordReader<'_>) -> Result<Self> {
        let job_id = reader.u32()?;
        let printer_name = reader.string()?;
        let document = reader.string()?;
        let datatype = reader.string()?;
        let status = match reader.u32()? {
            0x0008 => JobStatus::Spooling,
            0x0010 => JobStatus::Printing,
            _ => JobStatus::Spooled,
        };
        let submitted = DateTime::parse_from_rfc3339(&reader.string()?)
            .map_err(|e| SpoolError::InvalidParameter(format!("bad timestamp: {e}")))?
            .with_timezone(&Utc);
        let spool_path = reader.string()?;
        Ok(Self {
            job_id,
            printer_name,
            document,
            datatype,
            status,
            submitted,
            spool_path,
        })
    }
}

/// Module named as the string source of built-in form display names.
const FORM_STRING_MODULE: &str = "localspl";

impl EnumRecord for FormInfo {
    const LEVELS: &'static [u32] = &[1, 2];

    fn encode(&self, level: u32, out: &mut Vec<u8>) {
        put_u32(out, self.flags);
        put_str(out, &self.name);
        put_u32(out, self.width);
        put_u32(out, self.height);
        let FormArea {
            left,
            top,
            right,
            bottom,
        } = self.imageable;
        for edge in [left, top, right, bottom] {
            put_u32(out, edge);
        }
        if level == 2 {
            put_str(out, &self.keyword());
            put_str(out, if self.is_builtin() { FORM_STRING_MODULE } else { "" });
        }
    }

    fn decode(level: u32, reader: &mut RecordReader<'_>) -> Result<Self> {
        let flags = reader.u32()?;
        let name = reader.string()?;
        let width = reader.u32()?;
        let height = reader.u32()?;
        let imageable = FormArea {
            left: reader.u32()?,
            top: reader.u32()?,
            right: reader.u32()?,
            bottom: reader.u32()?,
        };
        if level == 2 {
            let _keyword = reader.string()?;
            let _string_module = reader.string()?;
        }
        Ok(Self {
            name,
            flags,
            width,
            height,
            imageable,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ports() -> Vec<PortInfo> {
        vec![
            PortInfo {
                name: "LPT1:".into(),
                monitor_name: "Local Port".into(),
                description: "Local Port".into(),
                port_type: crate::types::PORT_TYPE_WRITE,
            },
            PortInfo {
                name: "FILE:".into(),
                monitor_name: "Local Port".into(),
                description: "Local Port".into(),
                port_type: crate::types::PORT_TYPE_WRITE,
            },
        ]
    }

    #[test]
    fn short_buffer_reports_exact_size() {
        let ports = ports();
        let needed = match fill(&ports, 2, &mut []) {
            Err(SpoolError::InsufficientBuffer { needed }) => needed,
            other => panic!("expected InsufficientBuffer, got {other:?}"),
        };

        let mut short = vec![0u8; needed - 1];
        assert!(matches!(
            fill(&ports, 2, &mut short),
            Err(SpoolError::InsufficientBuffer { needed: n }) if n == needed
        ));

        let mut exact = vec![0u8; needed];
        let filled = fill(&ports, 2, &mut exact).expect("fill");
        assert_eq!(filled.needed, needed);
        assert_eq!(filled.returned, 2);

        let decoded: Vec<PortInfo> = decode_records(&exact, 2, filled.returned).expect("decode");
        assert_eq!(decoded, ports);
    }

    #[test]
    fn level_one_carries_names_only() {
        let mut buf = vec![0u8; 64];
        let filled = fill(&ports(), 1, &mut buf).expect("fill");
        assert_eq!(filled.needed, "LPT1:\0FILE:\0".len());
        assert_eq!(&buf[..filled.needed], b"LPT1:\0FILE:\0");
    }

    #[test]
    fn unsupported_level_is_rejected() {
        let names = vec!["winprint".to_string()];
        assert!(matches!(
            fill(&names, 2, &mut [0u8; 32]),
            Err(SpoolError::InvalidLevel(2))
        ));
        assert!(matches!(
            fill(&ports(), 3, &mut [0u8; 32]),
            Err(SpoolError::InvalidLevel(3))
        ));
    }

    #[test]
    fn form_level_two_appends_keyword() {
        let forms = vec![FormInfo::new("Label", 100_000, 50_000)];
        let mut one = vec![0u8; 128];
        let short = fill(&forms, 1, &mut one).expect("level 1").needed;
        let mut two = vec![0u8; 128];
        let long = fill(&forms, 2, &mut two).expect("level 2").needed;
        assert_eq!(long, short + "Label\0\0".len());

        let decoded: Vec<FormInfo> = decode_records(&two[..long], 2, 1).expect("decode");
        assert_eq!(decoded, forms);
    }

    #[test]
    fn empty_result_needs_zero_bytes() {
        let none: Vec<MonitorInfo> = Vec::new();
        let filled = fill(&none, 1, &mut []).expect("fill");
        assert_eq!(filled, Filled { needed: 0, returned: 0 });
    }
}
