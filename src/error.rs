use std::{fmt::Display, io};

use crate::codes;

/// Error returned from `usbio` operations.
///
/// Failures of a submitted transfer are never returned from a method call.
/// They arrive as a [`TransferError`] in the transfer's
/// [`Completion`][crate::Completion].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// The operation requires an open device, but the device is closed.
    NotOpen,

    /// The device can't be closed because a transfer on it is still pending.
    Busy,

    /// A transfer is already underway for this transfer object.
    AlreadySubmitted,

    /// The library rejected the transfer submission.
    Submit(NativeError),

    /// A submitted transfer completed with an error.
    ///
    /// Only produced by converting a [`TransferError`] with `?` or `into()`.
    Transfer(TransferError),

    /// The library failed to cancel a transfer.
    Cancel(NativeError),

    /// A device-level operation (open, claim, release, reset, ...) failed.
    Device(NativeError),
}

impl Error {
    #[track_caller]
    pub(crate) fn log_error(self) -> Self {
        log::error!("{}", self);
        self
    }

    #[track_caller]
    pub(crate) fn log_debug(self) -> Self {
        log::debug!("{}", self);
        self
    }

    /// Get the native library error code, if the error came from the library.
    pub fn native_code(&self) -> Option<i32> {
        match self {
            Error::Submit(e) | Error::Cancel(e) | Error::Device(e) => Some(e.code()),
            Error::Transfer(e) => Some(e.code()),
            Error::NotOpen | Error::Busy | Error::AlreadySubmitted => None,
        }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::NotOpen => write!(f, "the device must be open"),
            Error::Busy => write!(f, "can't close device with a pending request"),
            Error::AlreadySubmitted => {
                write!(f, "a transfer is already underway for this transfer object")
            }
            Error::Submit(e) => write!(f, "failed to submit transfer: {e}"),
            Error::Transfer(e) => write!(f, "transfer failed: {e}"),
            Error::Cancel(e) => write!(f, "failed to cancel transfer: {e}"),
            Error::Device(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Submit(e) | Error::Cancel(e) | Error::Device(e) => Some(e),
            Error::Transfer(e) => Some(e),
            _ => None,
        }
    }
}

impl From<TransferError> for Error {
    fn from(err: TransferError) -> Self {
        Error::Transfer(err)
    }
}

impl From<Error> for io::Error {
    fn from(err: Error) -> Self {
        let kind = match err {
            Error::NotOpen => io::ErrorKind::NotConnected,
            Error::Busy | Error::AlreadySubmitted => io::ErrorKind::Other, // TODO: ResourceBusy once MSRV allows
            Error::Submit(e) | Error::Cancel(e) | Error::Device(e) => e.kind().into(),
            Error::Transfer(e) => return e.into(),
        };
        io::Error::new(kind, err)
    }
}

/// General category of a [`NativeError`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// Device is disconnected.
    Disconnected,

    /// Device, interface, or endpoint is in use by another application, kernel driver, or handle.
    Busy,

    /// This user or application does not have permission to perform the requested operation.
    PermissionDenied,

    /// Requested device, interface, alternate setting or transfer not found.
    NotFound,

    /// The operation timed out.
    Timeout,

    /// The requested operation is not supported by the platform or its currently-configured driver.
    Unsupported,

    /// An argument was out of range or otherwise invalid.
    InvalidArgument,

    /// Uncategorized error.
    Other,
}

impl From<ErrorKind> for io::ErrorKind {
    fn from(kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::Disconnected => io::ErrorKind::NotConnected,
            ErrorKind::Busy => io::ErrorKind::Other,
            ErrorKind::PermissionDenied => io::ErrorKind::PermissionDenied,
            ErrorKind::NotFound => io::ErrorKind::NotFound,
            ErrorKind::Timeout => io::ErrorKind::TimedOut,
            ErrorKind::Unsupported => io::ErrorKind::Unsupported,
            ErrorKind::InvalidArgument => io::ErrorKind::InvalidInput,
            ErrorKind::Other => io::ErrorKind::Other,
        }
    }
}

/// Error code reported by the underlying host library.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct NativeError {
    code: i32,
}

impl NativeError {
    /// Wrap a native error code, one of the `codes::ERROR_*` constants.
    pub const fn new(code: i32) -> Self {
        NativeError { code }
    }

    /// Convert a native return value: negative values are errors, anything
    /// else is success.
    pub fn check(ret: i32) -> Result<i32, NativeError> {
        if ret < codes::SUCCESS {
            Err(NativeError::new(ret))
        } else {
            Ok(ret)
        }
    }

    /// The raw native code.
    pub fn code(&self) -> i32 {
        self.code
    }

    /// The library's symbolic name for the code, e.g. `LIBUSB_ERROR_NO_DEVICE`.
    pub fn name(&self) -> &'static str {
        codes::error_name(self.code)
    }

    /// Get the error kind.
    pub fn kind(&self) -> ErrorKind {
        match self.code {
            codes::ERROR_NO_DEVICE => ErrorKind::Disconnected,
            codes::ERROR_BUSY => ErrorKind::Busy,
            codes::ERROR_ACCESS => ErrorKind::PermissionDenied,
            codes::ERROR_NOT_FOUND => ErrorKind::NotFound,
            codes::ERROR_TIMEOUT => ErrorKind::Timeout,
            codes::ERROR_NOT_SUPPORTED => ErrorKind::Unsupported,
            codes::ERROR_INVALID_PARAM => ErrorKind::InvalidArgument,
            _ => ErrorKind::Other,
        }
    }
}

impl Display for NativeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} ({}, code {})",
            codes::error_message(self.code),
            self.name(),
            self.code
        )
    }
}

impl std::error::Error for NativeError {}

impl From<NativeError> for io::Error {
    fn from(err: NativeError) -> Self {
        io::Error::new(err.kind().into(), err)
    }
}

/// Transfer error.
///
/// Carries the native completion status of a transfer that did not complete
/// successfully.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TransferError {
    /// Transfer failed at the host controller or driver.
    Fault,

    /// Transfer timed out before it completed.
    TimedOut,

    /// Transfer was cancelled.
    Cancelled,

    /// Endpoint in a STALL condition.
    ///
    /// This is used by the device to signal that an error occurred. For bulk
    /// and interrupt endpoints, the stall condition can be cleared with a
    /// `CLEAR_FEATURE` request. Control requests automatically clear the stall
    /// condition.
    Stall,

    /// Device disconnected.
    Disconnected,

    /// Device sent more data than requested.
    Overflow,

    /// Unknown status code.
    Unknown(i32),
}

impl TransferError {
    /// Map a native completion status. `TRANSFER_COMPLETED` is not an error.
    pub fn from_status(status: i32) -> Result<(), TransferError> {
        Err(match status {
            codes::TRANSFER_COMPLETED => return Ok(()),
            codes::TRANSFER_ERROR => TransferError::Fault,
            codes::TRANSFER_TIMED_OUT => TransferError::TimedOut,
            codes::TRANSFER_CANCELLED => TransferError::Cancelled,
            codes::TRANSFER_STALL => TransferError::Stall,
            codes::TRANSFER_NO_DEVICE => TransferError::Disconnected,
            codes::TRANSFER_OVERFLOW => TransferError::Overflow,
            other => TransferError::Unknown(other),
        })
    }

    /// The native completion status.
    pub fn code(&self) -> i32 {
        match self {
            TransferError::Fault => codes::TRANSFER_ERROR,
            TransferError::TimedOut => codes::TRANSFER_TIMED_OUT,
            TransferError::Cancelled => codes::TRANSFER_CANCELLED,
            TransferError::Stall => codes::TRANSFER_STALL,
            TransferError::Disconnected => codes::TRANSFER_NO_DEVICE,
            TransferError::Overflow => codes::TRANSFER_OVERFLOW,
            TransferError::Unknown(code) => *code,
        }
    }
}

impl Display for TransferError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransferError::Fault => write!(f, "hardware fault or protocol violation"),
            TransferError::TimedOut => write!(f, "transfer timed out"),
            TransferError::Cancelled => write!(f, "transfer was cancelled"),
            TransferError::Stall => write!(f, "endpoint stalled"),
            TransferError::Disconnected => write!(f, "device disconnected"),
            TransferError::Overflow => write!(f, "device sent more data than requested"),
            TransferError::Unknown(s) => write!(f, "unknown transfer status {s}"),
        }
    }
}

impl std::error::Error for TransferError {}

impl From<TransferError> for io::Error {
    fn from(value: TransferError) -> Self {
        let kind = match value {
            TransferError::Cancelled => io::ErrorKind::Interrupted,
            TransferError::TimedOut => io::ErrorKind::TimedOut,
            TransferError::Stall => io::ErrorKind::ConnectionReset,
            TransferError::Disconnected => io::ErrorKind::ConnectionAborted,
            TransferError::Overflow => io::ErrorKind::InvalidData,
            TransferError::Fault | TransferError::Unknown(_) => io::ErrorKind::Other,
        };
        io::Error::new(kind, value)
    }
}
