// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Win32-compatible status codes and the per-thread last-error slot.
//
// Clients of a spooler provider read the reason for a failed call from the
// last-error slot right after the call returns.  The provider stores the code
// before every failing return; on success the slot is cleared.

use std::cell::Cell;

use crate::error::SpoolError;

pub const ERROR_SUCCESS: u32 = 0;
pub const ERROR_FILE_NOT_FOUND: u32 = 2;
pub const ERROR_PATH_NOT_FOUND: u32 = 3;
pub const ERROR_ACCESS_DENIED: u32 = 5;
pub const ERROR_INVALID_HANDLE: u32 = 6;
pub const ERROR_NOT_ENOUGH_MEMORY: u32 = 8;
pub const ERROR_INVALID_DATA: u32 = 13;
pub const ERROR_WRITE_FAULT: u32 = 29;
pub const ERROR_NOT_SUPPORTED: u32 = 50;
pub const ERROR_INVALID_PARAMETER: u32 = 87;
pub const ERROR_CALL_NOT_IMPLEMENTED: u32 = 120;
pub const ERROR_INSUFFICIENT_BUFFER: u32 = 122;
pub const ERROR_INVALID_NAME: u32 = 123;
pub const ERROR_INVALID_LEVEL: u32 = 124;
pub const ERROR_MOD_NOT_FOUND: u32 = 126;
pub const ERROR_PROC_NOT_FOUND: u32 = 127;
pub const ERROR_ALREADY_EXISTS: u32 = 183;
pub const ERROR_NOT_CONNECTED: u32 = 2250;
pub const ERROR_CANTWRITE: u32 = 1013;
pub const ERROR_UNKNOWN_PORT: u32 = 1796;
pub const ERROR_INVALID_PRINTER_NAME: u32 = 1801;
pub const ERROR_INVALID_DATATYPE: u32 = 1804;
pub const ERROR_INVALID_FORM_NAME: u32 = 1902;
pub const ERROR_INVALID_FORM_SIZE: u32 = 1903;
pub const ERROR_INVALID_PRINTER_STATE: u32 = 1906;
pub const ERROR_UNKNOWN_PRINT_MONITOR: u32 = 3000;
pub const ERROR_SPL_NO_STARTDOC: u32 = 3003;
pub const ERROR_PRINT_MONITOR_ALREADY_INSTALLED: u32 = 3006;

thread_local! {
    static LAST_ERROR: Cell<u32> = const { Cell::new(ERROR_SUCCESS) };
}

/// Code stored by the most recent failing spooler call on this thread.
pub fn last_error() -> u32 {
    LAST_ERROR.with(Cell::get)
}

/// Overwrite the calling thread's last-error slot.
pub fn set_last_error(code: u32) {
    LAST_ERROR.with(|slot| slot.set(code));
}

/// Record the outcome of a public entry point and pass it through unchanged.
pub fn record<T>(result: Result<T, SpoolError>) -> Result<T, SpoolError> {
    match &result {
        Ok(_) => set_last_error(ERROR_SUCCESS),
        Err(e) => set_last_error(e.code()),
    }
    result
}

/// Short symbolic name for a status code, used in log output.
pub fn code_name(code: u32) -> &'static str {
    match code {
        ERROR_SUCCESS => "ERROR_SUCCESS",
        ERROR_FILE_NOT_FOUND => "ERROR_FILE_NOT_FOUND",
        ERROR_PATH_NOT_FOUND => "ERROR_PATH_NOT_FOUND",
        ERROR_ACCESS_DENIED => "ERROR_ACCESS_DENIED",
        ERROR_INVALID_HANDLE => "ERROR_INVALID_HANDLE",
        ERROR_NOT_ENOUGH_MEMORY => "ERROR_NOT_ENOUGH_MEMORY",
        ERROR_NOT_SUPPORTED => "ERROR_NOT_SUPPORTED",
        ERROR_INVALID_PARAMETER => "ERROR_INVALID_PARAMETER",
        ERROR_CALL_NOT_IMPLEMENTED => "ERROR_CALL_NOT_IMPLEMENTED",
        ERROR_INSUFFICIENT_BUFFER => "ERROR_INSUFFICIENT_BUFFER",
        ERROR_INVALID_NAME => "ERROR_INVALID_NAME",
        ERROR_INVALID_LEVEL => "ERROR_INVALID_LEVEL",
        ERROR_MOD_NOT_FOUND => "ERROR_MOD_NOT_FOUND",
        ERROR_PROC_NOT_FOUND => "ERROR_PROC_NOT_FOUND",
        ERROR_ALREADY_EXISTS => "ERROR_ALREADY_EXISTS",
        ERROR_UNKNOWN_PORT => "ERROR_UNKNOWN_PORT",
        ERROR_INVALID_PRINTER_NAME => "ERROR_INVALID_PRINTER_NAME",
        ERROR_INVALID_DATATYPE => "ERROR_INVALID_DATATYPE",
        ERROR_INVALID_FORM_NAME => "ERROR_INVALID_FORM_NAME",
        ERROR_INVALID_FORM_SIZE => "ERROR_INVALID_FORM_SIZE",
        ERROR_INVALID_PRINTER_STATE => "ERROR_INVALID_PRINTER_STATE",
        ERROR_UNKNOWN_PRINT_MONITOR => "ERROR_UNKNOWN_PRINT_MONITOR",
        ERROR_SPL_NO_STARTDOC => "ERROR_SPL_NO_STARTDOC",
        ERROR_PRINT_MONITOR_ALREADY_INSTALLED => "ERROR_PRINT_MONITOR_ALREADY_INSTALLED",
        _ => "ERROR_UNKNOWN",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_sets_and_clears_slot() {
        let failed: Result<(), SpoolError> = record(Err(SpoolError::InvalidHandle));
        assert!(failed.is_err());
        assert_eq!(last_error(), ERROR_INVALID_HANDLE);

        let ok: Result<u8, SpoolError> = record(Ok(1));
        assert_eq!(ok.ok(), Some(1));
        assert_eq!(last_error(), ERROR_SUCCESS);
    }

    #[test]
    fn slot_is_per_thread() {
        set_last_error(ERROR_UNKNOWN_PORT);
        let other = std::thread::spawn(last_error).join().expect("join");
        assert_eq!(other, ERROR_SUCCESS);
        assert_eq!(last_error(), ERROR_UNKNOWN_PORT);
    }
}
