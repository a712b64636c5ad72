//! Seam between the transfer engine and the host USB library.
//!
//! A [`Backend`] wraps the native library: opening and closing device
//! handles, the synchronous interface operations, and allocating
//! [`RawTransfer`]s which submit buffers for asynchronous execution. The
//! library reports each finished submission from its own thread by calling
//! [`Completer::complete`].

use std::{fmt::Debug, time::Duration};

use crate::{
    queue::{CompletionRecord, CompletionSender},
    DeviceId, DeviceInfo, NativeError, TransferType,
};

#[cfg(feature = "libusb")]
pub mod libusb;

pub mod sim;

/// Key of an open device handle within a [`Backend`].
///
/// Only meaningful to the backend that returned it, and only until it is
/// passed to [`Backend::close`].
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct RawHandle(pub usize);

/// Everything a backend needs to start one transfer.
#[derive(Debug)]
pub struct SubmitRequest {
    /// Handle of the open device, read at submit time.
    pub handle: RawHandle,

    /// Endpoint address including the direction bit.
    pub endpoint: u8,

    /// Transfer type.
    pub transfer_type: TransferType,

    /// Timeout for the whole transfer, `Duration::ZERO` for none.
    pub timeout: Duration,

    /// Start of the caller's buffer.
    pub buffer: *mut u8,

    /// Length of the caller's buffer.
    pub length: usize,
}

/// Notifies the consumer thread that a submitted transfer has finished.
///
/// Handed to the backend with each submission and consumed exactly once. It
/// is `Send`, so the backend can move it to whatever thread runs its
/// completion callbacks.
pub struct Completer {
    sender: CompletionSender,
    key: usize,
}

impl Completer {
    pub(crate) fn new(sender: CompletionSender, key: usize) -> Self {
        Completer { sender, key }
    }

    /// Report the final status (one of the `codes::TRANSFER_*` values) and
    /// the number of bytes transferred.
    ///
    /// After this call the backend must not access the submitted buffer
    /// again.
    pub fn complete(self, status: i32, actual_length: usize) {
        self.sender.post(CompletionRecord {
            key: self.key,
            status,
            actual_length,
        });
    }
}

impl Debug for Completer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Completer").field("key", &self.key).finish()
    }
}

/// The host USB library.
pub trait Backend: Send + Sync + 'static {
    /// Enumerate connected devices.
    fn list_devices(&self) -> Result<Vec<DeviceInfo>, NativeError>;

    /// Open a device for exclusive use by this process.
    fn open(&self, device: DeviceId) -> Result<RawHandle, NativeError>;

    /// Close a handle returned by [`open`][Backend::open].
    ///
    /// The caller guarantees no transfer on the handle is outstanding.
    fn close(&self, handle: RawHandle);

    /// Claim an interface.
    fn claim_interface(&self, handle: RawHandle, interface: u8) -> Result<(), NativeError>;

    /// Release a claimed interface.
    fn release_interface(&self, handle: RawHandle, interface: u8) -> Result<(), NativeError>;

    /// Select an alternate setting of a claimed interface.
    fn set_alt_setting(
        &self,
        handle: RawHandle,
        interface: u8,
        alt_setting: u8,
    ) -> Result<(), NativeError>;

    /// Reset the device.
    fn reset(&self, handle: RawHandle) -> Result<(), NativeError>;

    /// Whether a kernel driver is bound to the interface.
    fn kernel_driver_active(&self, handle: RawHandle, interface: u8) -> Result<bool, NativeError>;

    /// Detach the kernel driver from the interface.
    fn detach_kernel_driver(&self, handle: RawHandle, interface: u8) -> Result<(), NativeError>;

    /// Re-attach the kernel driver to the interface.
    fn attach_kernel_driver(&self, handle: RawHandle, interface: u8) -> Result<(), NativeError>;

    /// Allocate the native state for one transfer object.
    fn alloc_transfer(&self) -> Result<Box<dyn RawTransfer>, NativeError>;
}

/// Native state of one transfer object, reused across submissions.
///
/// Owned and driven by the consumer thread. Only the backend's completion
/// path runs elsewhere, and it communicates solely through the [`Completer`].
pub trait RawTransfer {
    /// Start the transfer described by `request`. On success the backend
    /// eventually calls `completer.complete(..)` exactly once, from any
    /// thread. On failure the completer is dropped unused and nothing was
    /// started.
    ///
    /// # Safety
    ///
    /// `request.buffer` must be valid for reads and writes of
    /// `request.length` bytes, and not otherwise accessed, until the
    /// completion is posted. No other submission of this transfer may be
    /// outstanding.
    unsafe fn submit(
        &mut self,
        request: &SubmitRequest,
        completer: Completer,
    ) -> Result<(), NativeError>;

    /// Request cancellation of the outstanding submission.
    ///
    /// Returns `Err` with `codes::ERROR_NOT_FOUND` when nothing is
    /// outstanding. Success means the completion will arrive, carrying a
    /// cancelled status if the transfer had not finished yet.
    fn cancel(&mut self) -> Result<(), NativeError>;
}
