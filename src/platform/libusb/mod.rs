//! [`Backend`] on top of libusb, through the `rusb` crate.
//!
//! Device handles are kept in a slab and identified by their key. Transfers
//! are raw `libusb_transfer`s whose completion callback runs on a dedicated
//! event thread and posts to the [`Completer`][crate::Completer].

use std::{
    fmt::Debug,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use log::debug;
use rusb::{ffi::libusb_device_handle, DeviceHandle, UsbContext};
use slab::Slab;

use super::{Backend, RawHandle, RawTransfer};
use crate::{codes, DeviceId, DeviceInfo, NativeError};

mod events;
use events::EventThread;

mod transfer;
use transfer::LibusbTransfer;

/// Map a `rusb` error to the native error code.
pub(crate) fn native_error(err: rusb::Error) -> NativeError {
    NativeError::new(match err {
        rusb::Error::Io => codes::ERROR_IO,
        rusb::Error::InvalidParam => codes::ERROR_INVALID_PARAM,
        rusb::Error::Access => codes::ERROR_ACCESS,
        rusb::Error::NoDevice => codes::ERROR_NO_DEVICE,
        rusb::Error::NotFound => codes::ERROR_NOT_FOUND,
        rusb::Error::Busy => codes::ERROR_BUSY,
        rusb::Error::Timeout => codes::ERROR_TIMEOUT,
        rusb::Error::Overflow => codes::ERROR_OVERFLOW,
        rusb::Error::Pipe => codes::ERROR_PIPE,
        rusb::Error::Interrupted => codes::ERROR_INTERRUPTED,
        rusb::Error::NoMem => codes::ERROR_NO_MEM,
        rusb::Error::NotSupported => codes::ERROR_NOT_SUPPORTED,
        rusb::Error::BadDescriptor | rusb::Error::Other => codes::ERROR_OTHER,
    })
}

fn device_id(bus_number: u8, address: u8) -> DeviceId {
    DeviceId(u64::from(bus_number) << 8 | u64::from(address))
}

/// Binary-coded decimal form of a version, as in the descriptor.
fn bcd(version: rusb::Version) -> u16 {
    u16::from(version.major()) << 8
        | u16::from(version.minor()) << 4
        | u16::from(version.sub_minor())
}

pub(super) struct Shared {
    context: rusb::Context,
    handles: Mutex<Slab<DeviceHandle<rusb::Context>>>,
    events: EventThread,
}

impl Shared {
    fn handles(&self) -> MutexGuard<'_, Slab<DeviceHandle<rusb::Context>>> {
        self.handles.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn with_handle<T>(
        &self,
        handle: RawHandle,
        f: impl FnOnce(&mut DeviceHandle<rusb::Context>) -> rusb::Result<T>,
    ) -> Result<T, NativeError> {
        let mut handles = self.handles();
        let dev = handles
            .get_mut(handle.0)
            .ok_or(NativeError::new(codes::ERROR_INVALID_PARAM))?;
        f(dev).map_err(native_error)
    }

    /// The libusb handle behind `handle`, for filling in a transfer.
    ///
    /// Stays valid until [`Backend::close`], which is only called with no
    /// transfer in flight.
    pub(super) fn raw_handle(
        &self,
        handle: RawHandle,
    ) -> Result<*mut libusb_device_handle, NativeError> {
        self.with_handle(handle, |dev| Ok(dev.as_raw()))
    }
}

/// A [`Backend`] that talks to real devices through libusb.
pub struct LibusbBackend {
    shared: Arc<Shared>,
}

impl LibusbBackend {
    /// Initialize a libusb context.
    pub fn new() -> Result<LibusbBackend, NativeError> {
        let context = rusb::Context::new().map_err(native_error)?;
        debug!("Initialized libusb context");
        Ok(LibusbBackend {
            shared: Arc::new(Shared {
                events: EventThread::new(context.clone()),
                context,
                handles: Mutex::new(Slab::new()),
            }),
        })
    }

    fn find(&self, id: DeviceId) -> Result<rusb::Device<rusb::Context>, NativeError> {
        let devices = self.shared.context.devices().map_err(native_error)?;
        devices
            .iter()
            .find(|d| device_id(d.bus_number(), d.address()) == id)
            .ok_or(NativeError::new(codes::ERROR_NO_DEVICE))
    }
}

impl Debug for LibusbBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LibusbBackend")
            .field("open_handles", &self.shared.handles().len())
            .finish()
    }
}

impl Backend for LibusbBackend {
    fn list_devices(&self) -> Result<Vec<DeviceInfo>, NativeError> {
        let devices = self.shared.context.devices().map_err(native_error)?;
        let mut infos = Vec::with_capacity(devices.len());
        for device in devices.iter() {
            let desc = match device.device_descriptor() {
                Ok(desc) => desc,
                Err(e) => {
                    debug!(
                        "Skipping device {:03}:{:03}, no descriptor: {e}",
                        device.bus_number(),
                        device.address()
                    );
                    continue;
                }
            };
            let info = DeviceInfo::new(
                device_id(device.bus_number(), device.address()),
                device.bus_number(),
                device.address(),
            )
            .with_ids(desc.vendor_id(), desc.product_id())
            .with_port_chain(device.port_numbers().unwrap_or_default())
            .with_class(desc.class_code(), desc.sub_class_code(), desc.protocol_code())
            .with_versions(bcd(desc.usb_version()), bcd(desc.device_version()))
            .with_limits(desc.max_packet_size(), desc.num_configurations());
            infos.push(info);
        }
        Ok(infos)
    }

    fn open(&self, id: DeviceId) -> Result<RawHandle, NativeError> {
        let handle = self.find(id)?.open().map_err(native_error)?;
        Ok(RawHandle(self.shared.handles().insert(handle)))
    }

    fn close(&self, handle: RawHandle) {
        // Dropping the `DeviceHandle` calls `libusb_close`.
        if self.shared.handles().try_remove(handle.0).is_none() {
            debug!("Closing unknown handle {handle:?}");
        }
    }

    fn claim_interface(&self, handle: RawHandle, interface: u8) -> Result<(), NativeError> {
        self.shared
            .with_handle(handle, |dev| dev.claim_interface(interface))
    }

    fn release_interface(&self, handle: RawHandle, interface: u8) -> Result<(), NativeError> {
        self.shared
            .with_handle(handle, |dev| dev.release_interface(interface))
    }

    fn set_alt_setting(
        &self,
        handle: RawHandle,
        interface: u8,
        alt_setting: u8,
    ) -> Result<(), NativeError> {
        self.shared.with_handle(handle, |dev| {
            dev.set_alternate_setting(interface, alt_setting)
        })
    }

    fn reset(&self, handle: RawHandle) -> Result<(), NativeError> {
        self.shared.with_handle(handle, |dev| dev.reset())
    }

    fn kernel_driver_active(&self, handle: RawHandle, interface: u8) -> Result<bool, NativeError> {
        self.shared
            .with_handle(handle, |dev| dev.kernel_driver_active(interface))
    }

    fn detach_kernel_driver(&self, handle: RawHandle, interface: u8) -> Result<(), NativeError> {
        self.shared
            .with_handle(handle, |dev| dev.detach_kernel_driver(interface))
    }

    fn attach_kernel_driver(&self, handle: RawHandle, interface: u8) -> Result<(), NativeError> {
        self.shared
            .with_handle(handle, |dev| dev.attach_kernel_driver(interface))
    }

    fn alloc_transfer(&self) -> Result<Box<dyn RawTransfer>, NativeError> {
        Ok(Box::new(LibusbTransfer::new(self.shared.clone())?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rusb_errors_map_to_native_codes() {
        assert_eq!(native_error(rusb::Error::Pipe).code(), codes::ERROR_PIPE);
        assert_eq!(native_error(rusb::Error::NoDevice).code(), codes::ERROR_NO_DEVICE);
        assert_eq!(native_error(rusb::Error::BadDescriptor).code(), codes::ERROR_OTHER);
    }

    #[test]
    fn device_id_packs_bus_and_address() {
        assert_eq!(device_id(3, 17), DeviceId(0x0311));
    }
}
