// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for Spoolwerk.

use thiserror::Error;

use crate::status;

/// Top-level error type for all spooler operations.
///
/// Every public entry point of the provider returns one of these kinds; the
/// matching Win32-style code is available through [`SpoolError::code`] and is
/// also stored in the calling thread's last-error slot.
#[derive(Debug, Error)]
pub enum SpoolError {
    // -- Caller misuse --
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("invalid handle")]
    InvalidHandle,

    #[error("unsupported structure level {0}")]
    InvalidLevel(u32),

    #[error("invalid name: {0}")]
    InvalidName(String),

    #[error("insufficient buffer: {needed} bytes required")]
    InsufficientBuffer { needed: usize },

    // -- Lookup misses --
    #[error("unknown port: {0}")]
    UnknownPort(String),

    #[error("unknown print monitor: {0}")]
    UnknownMonitor(String),

    #[error("invalid printer name: {0}")]
    InvalidPrinterName(String),

    #[error("path not found: {0}")]
    PathNotFound(String),

    #[error("unknown form: {0}")]
    InvalidFormName(String),

    #[error("invalid form size: {0}")]
    InvalidFormSize(String),

    // -- Duplicates --
    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("print monitor already installed: {0}")]
    MonitorAlreadyInstalled(String),

    // -- Job lifecycle --
    #[error("invalid printer state")]
    InvalidPrinterState,

    #[error("no print processor supports data type {0}")]
    InvalidDatatype(String),

    #[error("no StartDoc issued on this handle")]
    NoStartDoc,

    // -- Capabilities --
    #[error("not supported: {0}")]
    NotSupported(String),

    #[error("not implemented: {0}")]
    NotImplemented(String),

    #[error("access denied: {0}")]
    AccessDenied(String),

    // -- Modules --
    #[error("module not found: {0}")]
    ModuleNotFound(String),

    #[error("entry point not found: {0}")]
    EntryPointNotFound(String),

    #[error("out of memory")]
    OutOfMemory,

    // -- Storage / transport --
    #[error("configuration store error: {0}")]
    Database(String),

    #[error("network transport error: {0}")]
    Network(String),

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SpoolError {
    /// Win32-style error code reported through the last-error slot.
    pub fn code(&self) -> u32 {
        match self {
            Self::InvalidParameter(_) => status::ERROR_INVALID_PARAMETER,
            Self::InvalidHandle => status::ERROR_INVALID_HANDLE,
            Self::InvalidLevel(_) => status::ERROR_INVALID_LEVEL,
            Self::InvalidName(_) => status::ERROR_INVALID_NAME,
            Self::InsufficientBuffer { .. } => status::ERROR_INSUFFICIENT_BUFFER,
            Self::UnknownPort(_) => status::ERROR_UNKNOWN_PORT,
            Self::UnknownMonitor(_) => status::ERROR_UNKNOWN_PRINT_MONITOR,
            Self::InvalidPrinterName(_) => status::ERROR_INVALID_PRINTER_NAME,
            Self::PathNotFound(_) => status::ERROR_PATH_NOT_FOUND,
            Self::InvalidFormName(_) => status::ERROR_INVALID_FORM_NAME,
            Self::InvalidFormSize(_) => status::ERROR_INVALID_FORM_SIZE,
            Self::AlreadyExists(_) => status::ERROR_ALREADY_EXISTS,
            Self::MonitorAlreadyInstalled(_) => status::ERROR_PRINT_MONITOR_ALREADY_INSTALLED,
            Self::InvalidPrinterState => status::ERROR_INVALID_PRINTER_STATE,
            Self::InvalidDatatype(_) => status::ERROR_INVALID_DATATYPE,
            Self::NoStartDoc => status::ERROR_SPL_NO_STARTDOC,
            Self::NotSupported(_) => status::ERROR_NOT_SUPPORTED,
            Self::NotImplemented(_) => status::ERROR_CALL_NOT_IMPLEMENTED,
            Self::AccessDenied(_) => status::ERROR_ACCESS_DENIED,
            Self::ModuleNotFound(_) => status::ERROR_MOD_NOT_FOUND,
            Self::EntryPointNotFound(_) => status::ERROR_PROC_NOT_FOUND,
            Self::OutOfMemory => status::ERROR_NOT_ENOUGH_MEMORY,
            Self::Database(_) => status::ERROR_CANTWRITE,
            Self::Network(_) => status::ERROR_NOT_CONNECTED,
            Self::Io(e) => match e.kind() {
                std::io::ErrorKind::NotFound => status::ERROR_FILE_NOT_FOUND,
                std::io::ErrorKind::PermissionDenied => status::ERROR_ACCESS_DENIED,
                std::io::ErrorKind::OutOfMemory => status::ERROR_NOT_ENOUGH_MEMORY,
                _ => status::ERROR_WRITE_FAULT,
            },
            Self::Serialization(_) => status::ERROR_INVALID_DATA,
        }
    }

    /// Build the error matching a status code returned by a monitor command.
    ///
    /// Returns `None` for `ERROR_SUCCESS`.
    pub fn from_code(code: u32, context: &str) -> Option<Self> {
        let err = match code {
            status::ERROR_SUCCESS => return None,
            status::ERROR_INVALID_PARAMETER => Self::InvalidParameter(context.into()),
            status::ERROR_INVALID_HANDLE => Self::InvalidHandle,
            status::ERROR_INVALID_NAME => Self::InvalidName(context.into()),
            status::ERROR_UNKNOWN_PORT => Self::UnknownPort(context.into()),
            status::ERROR_PATH_NOT_FOUND | status::ERROR_FILE_NOT_FOUND => {
                Self::PathNotFound(context.into())
            }
            status::ERROR_ALREADY_EXISTS => Self::AlreadyExists(context.into()),
            status::ERROR_ACCESS_DENIED => Self::AccessDenied(context.into()),
            status::ERROR_CALL_NOT_IMPLEMENTED => Self::NotImplemented(context.into()),
            status::ERROR_NOT_ENOUGH_MEMORY => Self::OutOfMemory,
            _ => Self::NotSupported(format!("{context} (status {code})")),
        };
        Some(err)
    }
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, SpoolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_startdoc_is_distinct_from_invalid_parameter() {
        let a = SpoolError::NoStartDoc.code();
        let b = SpoolError::InvalidParameter("x".into()).code();
        assert_ne!(a, b);
        assert_eq!(a, status::ERROR_SPL_NO_STARTDOC);
    }

    #[test]
    fn io_not_found_maps_to_file_not_found() {
        let err = SpoolError::from(std::io::Error::from(std::io::ErrorKind::NotFound));
        assert_eq!(err.code(), status::ERROR_FILE_NOT_FOUND);
    }

    #[test]
    fn success_code_has_no_error() {
        assert!(SpoolError::from_code(status::ERROR_SUCCESS, "AddPort").is_none());
        assert!(matches!(
            SpoolError::from_code(status::ERROR_PATH_NOT_FOUND, "MyPort"),
            Some(SpoolError::PathNotFound(_))
        ));
    }
}
