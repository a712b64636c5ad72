use std::{
    cell::Cell,
    fmt::Debug,
    rc::Rc,
};

use log::debug;

use crate::{
    context::ContextInner,
    platform::{Backend, RawHandle},
    DeviceInfo, Error, NativeError,
};

/// A USB device that can be opened and closed repeatedly.
///
/// Obtain a `Device` from [`Context::device`][crate::Context::device] or
/// [`Context::find_by_ids`][crate::Context::find_by_ids]. It starts out
/// closed:
///
/// ```
/// use std::time::Duration;
/// use usbio::{platform::sim::SimBackend, Context, DeviceInfo, DeviceId};
///
/// let sim = SimBackend::new();
/// sim.add_device(DeviceInfo::new(DeviceId(1), 1, 4).with_ids(0x59e3, 0x0a23));
///
/// let context = Context::new(sim.clone());
/// let device = context.find_by_ids(0x59e3, 0x0a23).unwrap().expect("device not connected");
/// device.open().unwrap();
/// device.claim_interface(0).unwrap();
/// device.close().unwrap();
/// ```
///
/// This type is reference-counted and can be cloned cheaply. Clones share the
/// open/closed state. The handle is closed when the last clone is dropped.
#[derive(Clone)]
pub struct Device {
    inner: Rc<DeviceInner>,
}

struct DeviceInner {
    context: Rc<ContextInner>,
    info: DeviceInfo,

    /// Present only while the device is open.
    handle: Cell<Option<RawHandle>>,

    /// Submitted transfers whose completion has not been delivered yet.
    pending: Cell<usize>,
}

impl Device {
    pub(crate) fn wrap(context: Rc<ContextInner>, info: DeviceInfo) -> Device {
        Device {
            inner: Rc::new(DeviceInner {
                context,
                info,
                handle: Cell::new(None),
                pending: Cell::new(0),
            }),
        }
    }

    pub(crate) fn context(&self) -> &ContextInner {
        &self.inner.context
    }

    fn backend(&self) -> &dyn Backend {
        &*self.inner.context.backend
    }

    /// Information obtained at enumeration.
    pub fn info(&self) -> &DeviceInfo {
        &self.inner.info
    }

    /// Open the device. Does nothing if it is already open.
    pub fn open(&self) -> Result<(), Error> {
        if self.is_open() {
            return Ok(());
        }

        let info = &self.inner.info;
        debug!(
            "Opening device bus={} addr={}",
            info.bus_number(),
            info.device_address()
        );
        let handle = self
            .backend()
            .open(info.id())
            .map_err(|e| Error::Device(e).log_debug())?;
        self.inner.handle.set(Some(handle));
        debug!("Opened device with handle {:?}", handle);
        Ok(())
    }

    /// Close the device. Does nothing if it is already closed.
    ///
    /// Fails with [`Error::Busy`] while any transfer on the device is
    /// submitted. Cancel them and wait for their completions first.
    pub fn close(&self) -> Result<(), Error> {
        let pending = self.inner.pending.get();
        if pending > 0 {
            debug!("Can't close device with {pending} transfers pending");
            return Err(Error::Busy);
        }

        if let Some(handle) = self.inner.handle.take() {
            debug!("Closing device handle {:?}", handle);
            self.backend().close(handle);
        }
        Ok(())
    }

    /// Whether the device is open.
    pub fn is_open(&self) -> bool {
        self.inner.handle.get().is_some()
    }

    /// Get the current native handle, failing with [`Error::NotOpen`] if the
    /// device is closed.
    pub fn require_open(&self) -> Result<RawHandle, Error> {
        self.inner.handle.get().ok_or(Error::NotOpen)
    }

    /// Number of submitted transfers on this device whose completion has not
    /// been delivered yet.
    pub fn pending_transfers(&self) -> usize {
        self.inner.pending.get()
    }

    pub(crate) fn add_pending(&self) {
        self.inner.pending.set(self.inner.pending.get() + 1);
    }

    pub(crate) fn remove_pending(&self) {
        let pending = self.inner.pending.get();
        debug_assert!(pending > 0, "unbalanced device pending count");
        self.inner.pending.set(pending.saturating_sub(1));
    }

    fn native<T>(
        &self,
        what: &str,
        f: impl FnOnce(&dyn Backend, RawHandle) -> Result<T, NativeError>,
    ) -> Result<T, Error> {
        let handle = self.require_open()?;
        let res = f(self.backend(), handle).map_err(|e| Error::Device(e).log_debug());
        debug!("{what} on handle {handle:?}: {}", if res.is_ok() { "ok" } else { "failed" });
        res
    }

    /// Claim an interface for exclusive use.
    pub fn claim_interface(&self, interface: u8) -> Result<(), Error> {
        self.native("Claim interface", |b, h| b.claim_interface(h, interface))
    }

    /// Release a claimed interface.
    pub fn release_interface(&self, interface: u8) -> Result<(), Error> {
        self.native("Release interface", |b, h| b.release_interface(h, interface))
    }

    /// Select the alternate setting of a claimed interface.
    pub fn set_interface(&self, interface: u8, alt_setting: u8) -> Result<(), Error> {
        self.native("Set interface", |b, h| {
            b.set_alt_setting(h, interface, alt_setting)
        })
    }

    /// Reset the device.
    pub fn reset(&self) -> Result<(), Error> {
        self.native("Reset", |b, h| b.reset(h))
    }

    /// Whether a kernel driver is bound to the interface.
    pub fn is_kernel_driver_active(&self, interface: u8) -> Result<bool, Error> {
        self.native("Query kernel driver", |b, h| {
            b.kernel_driver_active(h, interface)
        })
    }

    /// Detach the kernel driver from the interface.
    pub fn detach_kernel_driver(&self, interface: u8) -> Result<(), Error> {
        self.native("Detach kernel driver", |b, h| {
            b.detach_kernel_driver(h, interface)
        })
    }

    /// Re-attach the kernel driver to the interface.
    pub fn attach_kernel_driver(&self, interface: u8) -> Result<(), Error> {
        self.native("Attach kernel driver", |b, h| {
            b.attach_kernel_driver(h, interface)
        })
    }
}

impl Drop for DeviceInner {
    fn drop(&mut self) {
        // Submitted transfers hold a `Device`, so nothing can be pending here.
        if let Some(handle) = self.handle.take() {
            debug!("Closing device handle {:?} on drop", handle);
            self.context.backend.close(handle);
        }
    }
}

impl Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("info", &self.inner.info)
            .field("handle", &self.inner.handle.get())
            .field("pending", &self.inner.pending.get())
            .finish()
    }
}
