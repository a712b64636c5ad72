use std::{
    ffi::{c_int, c_uint, c_void},
    ptr::NonNull,
    sync::Arc,
};

use log::debug;
use rusb::{constants::*, ffi::*};

use super::Shared;
use crate::{
    codes,
    platform::{Completer, RawTransfer, SubmitRequest},
    transfer::is_valid_control_buffer,
    NativeError, TransferType,
};

/// A `libusb_transfer` reused across submissions.
pub(super) struct LibusbTransfer {
    ptr: NonNull<libusb_transfer>,

    /// Keeps the device handles, the event thread and the libusb context
    /// alive while the transfer exists.
    shared: Arc<Shared>,

    /// Whether `libusb_submit_transfer` succeeded at least once. The
    /// completion callback runs on the event thread, so whether the last
    /// submission is still in flight is only known to libusb.
    submitted: bool,
}

impl LibusbTransfer {
    pub(super) fn new(shared: Arc<Shared>) -> Result<Self, NativeError> {
        // SAFETY: plain allocation, checked for NULL below.
        let ptr = unsafe { libusb_alloc_transfer(0) };
        let ptr = NonNull::new(ptr).ok_or(NativeError::new(codes::ERROR_NO_MEM))?;
        Ok(LibusbTransfer {
            ptr,
            shared,
            submitted: false,
        })
    }
}

impl RawTransfer for LibusbTransfer {
    unsafe fn submit(
        &mut self,
        request: &SubmitRequest,
        completer: Completer,
    ) -> Result<(), NativeError> {
        let length: c_int = request
            .length
            .try_into()
            .map_err(|_| NativeError::new(codes::ERROR_INVALID_PARAM))?;
        let timeout = c_uint::try_from(request.timeout.as_millis()).unwrap_or(c_uint::MAX);
        let dev_handle = self.shared.raw_handle(request.handle)?;
        let transfer = self.ptr.as_ptr();

        // The completer travels through `user_data` and is reclaimed by
        // `transfer_finished`, or below if the submission fails.
        let user_data = Box::into_raw(Box::new(completer)) as *mut c_void;

        match request.transfer_type {
            TransferType::Control => {
                // libusb sizes the transfer from `wLength` in the setup
                // packet, so the buffer must cover it.
                let buffer = std::slice::from_raw_parts(request.buffer, request.length);
                if !is_valid_control_buffer(buffer) {
                    drop(Box::from_raw(user_data as *mut Completer));
                    return Err(NativeError::new(codes::ERROR_INVALID_PARAM));
                }
                libusb_fill_control_transfer(
                    transfer,
                    dev_handle,
                    request.buffer,
                    transfer_finished as _,
                    user_data,
                    timeout,
                );
            }
            TransferType::Bulk => libusb_fill_bulk_transfer(
                transfer,
                dev_handle,
                request.endpoint,
                request.buffer,
                length,
                transfer_finished as _,
                user_data,
                timeout,
            ),
            TransferType::Interrupt => libusb_fill_interrupt_transfer(
                transfer,
                dev_handle,
                request.endpoint,
                request.buffer,
                length,
                transfer_finished as _,
                user_data,
                timeout,
            ),
            TransferType::Isochronous => {
                drop(Box::from_raw(user_data as *mut Completer));
                return Err(NativeError::new(codes::ERROR_NOT_SUPPORTED));
            }
        }

        self.shared.events.ensure_started();

        let ret = libusb_submit_transfer(transfer);
        if let Err(e) = NativeError::check(ret) {
            // Not submitted, so the callback will never run.
            (*transfer).user_data = std::ptr::null_mut();
            drop(Box::from_raw(user_data as *mut Completer));
            debug!("libusb_submit_transfer failed: {e}");
            return Err(e);
        }
        self.submitted = true;
        Ok(())
    }

    fn cancel(&mut self) -> Result<(), NativeError> {
        if !self.submitted {
            return Err(NativeError::new(codes::ERROR_NOT_FOUND));
        }
        // SAFETY: `ptr` is live. libusb reports NOT_FOUND itself if the
        // transfer already finished.
        NativeError::check(unsafe { libusb_cancel_transfer(self.ptr.as_ptr()) }).map(|_| ())
    }
}

impl Drop for LibusbTransfer {
    fn drop(&mut self) {
        // SAFETY: allocated by `libusb_alloc_transfer`. A submitted transfer
        // is kept alive by the dispatcher until its completion is delivered.
        unsafe { libusb_free_transfer(self.ptr.as_ptr()) }
    }
}

extern "system" fn transfer_finished(transfer: *mut libusb_transfer) {
    if transfer.is_null() {
        return;
    }

    // SAFETY: libusb passes the transfer it finished, which we allocated.
    let transfer = unsafe { &mut *transfer };
    let user_data = std::mem::replace(&mut transfer.user_data, std::ptr::null_mut());
    if user_data.is_null() {
        return;
    }

    // SAFETY: `submit` stored a boxed `Completer` and nothing else reclaims
    // it once the submission succeeded.
    let completer = unsafe { Box::from_raw(user_data as *mut Completer) };
    let status = map_status(transfer.status);
    let actual_length = usize::try_from(transfer.actual_length).unwrap_or(0);
    debug!(
        "libusb transfer on ep {:02x} finished: status={} actual_length={}",
        transfer.endpoint, transfer.status, actual_length
    );
    completer.complete(status, actual_length);
}

fn map_status(status: c_int) -> i32 {
    match status {
        LIBUSB_TRANSFER_COMPLETED => codes::TRANSFER_COMPLETED,
        LIBUSB_TRANSFER_TIMED_OUT => codes::TRANSFER_TIMED_OUT,
        LIBUSB_TRANSFER_CANCELLED => codes::TRANSFER_CANCELLED,
        LIBUSB_TRANSFER_STALL => codes::TRANSFER_STALL,
        LIBUSB_TRANSFER_NO_DEVICE => codes::TRANSFER_NO_DEVICE,
        LIBUSB_TRANSFER_OVERFLOW => codes::TRANSFER_OVERFLOW,
        _ => codes::TRANSFER_ERROR,
    }
}
