//! Asynchronous USB transfers on top of a host USB library.
//!
//! `usbio` enumerates devices, opens handles to them and runs bulk,
//! interrupt and control transfers. The host library performs the I/O on its
//! own event thread. Finished transfers are handed back to the thread that
//! owns the [`Context`] and delivered to their completion callbacks there, so
//! [`Device`] and [`Transfer`] need no locking and callbacks may freely touch
//! the caller's state.
//!
//! ### Overview
//!
//! * A [`Context`] owns a [`Backend`] and the completion queue. Use
//!   [`Context::libusb`] (with the `libusb` feature) for real hardware, or
//!   [`platform::sim::SimBackend`] for a scriptable in-process device.
//! * [`Context::list_devices`] returns a [`DeviceInfo`] per device and
//!   [`Context::device`] wraps one as a [`Device`], which can be opened and
//!   closed repeatedly.
//! * A [`Transfer`] is bound to one endpoint. [`Transfer::submit`] moves a
//!   buffer in. The buffer comes back in the [`Completion`] passed to the
//!   callback, which may resubmit right away.
//! * Callbacks run when the owning thread calls [`Context::handle_events`],
//!   [`Context::run`] or awaits [`Context::wait_idle`].
//!
//! ```
//! use std::time::Duration;
//! use usbio::{platform::sim::SimBackend, Context, DeviceId, DeviceInfo, Transfer, TransferType};
//!
//! let sim = SimBackend::new();
//! let dev = sim.add_device(DeviceInfo::new(DeviceId(1), 1, 2).with_ids(0x59e3, 0x0a23));
//! dev.push_in(0x81, b"hello".to_vec());
//!
//! let context = Context::new(sim.clone());
//! let device = context.find_by_ids(0x59e3, 0x0a23).unwrap().unwrap();
//! device.open().unwrap();
//! device.claim_interface(0).unwrap();
//!
//! let transfer = Transfer::new(&device, 0x81, TransferType::Bulk, Duration::from_secs(1)).unwrap();
//! transfer
//!     .submit(vec![0; 64], |_, completion| {
//!         assert_eq!(completion.data(), b"hello");
//!     })
//!     .unwrap();
//! context.run();
//! ```
//!
//! ### Logging
//!
//! `usbio` uses the [`log`](https://docs.rs/log) crate. Failures returned to
//! the caller are logged at `debug` level, failures of the host library that
//! indicate a problem outside the caller's control at `error` level.

pub mod codes;

mod context;
pub use context::Context;

mod device;
pub use device::Device;

mod dispatch;

mod enumeration;
pub use enumeration::{DeviceId, DeviceInfo};

mod error;
pub use error::{Error, ErrorKind, NativeError, TransferError};

pub mod platform;
pub use platform::{Backend, Completer, RawHandle, RawTransfer, SubmitRequest};

mod queue;

pub mod transfer;
pub use transfer::{
    Completion, ControlIn, ControlOut, ControlType, Direction, Recipient, SubmitRejected,
    Transfer, TransferState, TransferType,
};
