//! Integer codes of the underlying host library.
//!
//! These follow libusb's numbering. Every backend, including the simulated
//! one, reports results with these values so that errors look the same
//! regardless of what is underneath.

/// Success (no error).
pub const SUCCESS: i32 = 0;

/// Input/output error.
pub const ERROR_IO: i32 = -1;

/// Invalid parameter.
pub const ERROR_INVALID_PARAM: i32 = -2;

/// Access denied (insufficient permissions).
pub const ERROR_ACCESS: i32 = -3;

/// No such device (it may have been disconnected).
pub const ERROR_NO_DEVICE: i32 = -4;

/// Entity not found.
pub const ERROR_NOT_FOUND: i32 = -5;

/// Resource busy.
pub const ERROR_BUSY: i32 = -6;

/// Operation timed out.
pub const ERROR_TIMEOUT: i32 = -7;

/// Overflow.
pub const ERROR_OVERFLOW: i32 = -8;

/// Pipe error.
pub const ERROR_PIPE: i32 = -9;

/// System call interrupted.
pub const ERROR_INTERRUPTED: i32 = -10;

/// Insufficient memory.
pub const ERROR_NO_MEM: i32 = -11;

/// Operation not supported or unimplemented on this platform.
pub const ERROR_NOT_SUPPORTED: i32 = -12;

/// Other error.
pub const ERROR_OTHER: i32 = -99;

/// Transfer completed without error. Does not mean the entire buffer was
/// filled.
pub const TRANSFER_COMPLETED: i32 = 0;

/// Transfer failed.
pub const TRANSFER_ERROR: i32 = 1;

/// Transfer timed out.
pub const TRANSFER_TIMED_OUT: i32 = 2;

/// Transfer was cancelled.
pub const TRANSFER_CANCELLED: i32 = 3;

/// Endpoint stalled (for bulk/interrupt) or request not supported (for
/// control).
pub const TRANSFER_STALL: i32 = 4;

/// Device was disconnected.
pub const TRANSFER_NO_DEVICE: i32 = 5;

/// Device sent more data than requested.
pub const TRANSFER_OVERFLOW: i32 = 6;

/// Control endpoint.
pub const TRANSFER_TYPE_CONTROL: u8 = 0;

/// Isochronous endpoint.
pub const TRANSFER_TYPE_ISOCHRONOUS: u8 = 1;

/// Bulk endpoint.
pub const TRANSFER_TYPE_BULK: u8 = 2;

/// Interrupt endpoint.
pub const TRANSFER_TYPE_INTERRUPT: u8 = 3;

pub(crate) fn error_name(code: i32) -> &'static str {
    match code {
        SUCCESS => "LIBUSB_SUCCESS",
        ERROR_IO => "LIBUSB_ERROR_IO",
        ERROR_INVALID_PARAM => "LIBUSB_ERROR_INVALID_PARAM",
        ERROR_ACCESS => "LIBUSB_ERROR_ACCESS",
        ERROR_NO_DEVICE => "LIBUSB_ERROR_NO_DEVICE",
        ERROR_NOT_FOUND => "LIBUSB_ERROR_NOT_FOUND",
        ERROR_BUSY => "LIBUSB_ERROR_BUSY",
        ERROR_TIMEOUT => "LIBUSB_ERROR_TIMEOUT",
        ERROR_OVERFLOW => "LIBUSB_ERROR_OVERFLOW",
        ERROR_PIPE => "LIBUSB_ERROR_PIPE",
        ERROR_INTERRUPTED => "LIBUSB_ERROR_INTERRUPTED",
        ERROR_NO_MEM => "LIBUSB_ERROR_NO_MEM",
        ERROR_NOT_SUPPORTED => "LIBUSB_ERROR_NOT_SUPPORTED",
        _ => "LIBUSB_ERROR_OTHER",
    }
}

pub(crate) fn error_message(code: i32) -> &'static str {
    match code {
        SUCCESS => "success",
        ERROR_IO => "input/output error",
        ERROR_INVALID_PARAM => "invalid parameter",
        ERROR_ACCESS => "access denied (insufficient permissions)",
        ERROR_NO_DEVICE => "no such device (it may have been disconnected)",
        ERROR_NOT_FOUND => "entity not found",
        ERROR_BUSY => "resource busy",
        ERROR_TIMEOUT => "operation timed out",
        ERROR_OVERFLOW => "overflow",
        ERROR_PIPE => "pipe error",
        ERROR_INTERRUPTED => "system call interrupted",
        ERROR_NO_MEM => "insufficient memory",
        ERROR_NOT_SUPPORTED => "operation not supported or unimplemented on this platform",
        _ => "other error",
    }
}
