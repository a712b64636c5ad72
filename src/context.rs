use std::{
    cell::RefCell,
    fmt::Debug,
    future::{poll_fn, Future},
    rc::Rc,
    sync::Arc,
    task::Poll,
    time::Duration,
};

use log::debug;

use crate::{
    dispatch::{self, Dispatcher},
    platform::Backend,
    queue::CompletionQueue,
    Device, DeviceInfo, Error,
};

pub(crate) struct ContextInner {
    pub(crate) backend: Arc<dyn Backend>,
    pub(crate) queue: CompletionQueue,
    pub(crate) dispatcher: RefCell<Dispatcher>,
}

/// The runtime that owns a [`Backend`], the completion queue and the
/// dispatcher.
///
/// All [`Device`] and [`Transfer`][crate::Transfer] state lives on the thread
/// that created the `Context`, which is why it is neither `Send` nor `Sync`.
/// Completions reported by the backend's own thread are queued and only
/// delivered to their callbacks when this thread calls
/// [`handle_events`][Context::handle_events],
/// [`dispatch_pending`][Context::dispatch_pending], [`run`][Context::run] or
/// awaits [`wait_idle`][Context::wait_idle].
///
/// `Context` is reference-counted and cheap to clone. Devices and transfers
/// keep it alive. A transfer that is still submitted keeps itself, its device
/// and the context alive until its completion is dispatched, so abandoning
/// the event loop with transfers in flight leaks them rather than freeing
/// buffers the library may still write to.
#[derive(Clone)]
pub struct Context {
    inner: Rc<ContextInner>,
}

impl Context {
    /// Create a context on the current thread using `backend`.
    pub fn new(backend: impl Backend) -> Context {
        Context::from_arc(Arc::new(backend))
    }

    /// Create a context on the current thread from a shared backend.
    pub fn from_arc(backend: Arc<dyn Backend>) -> Context {
        Context {
            inner: Rc::new(ContextInner {
                backend,
                queue: CompletionQueue::new(),
                dispatcher: RefCell::new(Dispatcher::new()),
            }),
        }
    }

    /// Create a context backed by libusb.
    #[cfg(feature = "libusb")]
    pub fn libusb() -> Result<Context, Error> {
        let backend = crate::platform::libusb::LibusbBackend::new()
            .map_err(|e| Error::Device(e).log_error())?;
        Ok(Context::new(backend))
    }

    /// Enumerate the devices currently connected.
    pub fn list_devices(&self) -> Result<Vec<DeviceInfo>, Error> {
        self.inner
            .backend
            .list_devices()
            .map_err(|e| Error::Device(e).log_error())
    }

    /// Wrap a device found by [`list_devices`][Context::list_devices].
    ///
    /// The returned [`Device`] is closed.
    pub fn device(&self, info: DeviceInfo) -> Device {
        Device::wrap(self.inner.clone(), info)
    }

    /// Find the first device with the given vendor and product IDs.
    pub fn find_by_ids(&self, vendor_id: u16, product_id: u16) -> Result<Option<Device>, Error> {
        Ok(self
            .list_devices()?
            .into_iter()
            .find(|d| d.vendor_id() == vendor_id && d.product_id() == product_id)
            .map(|d| self.device(d)))
    }

    /// Number of submitted transfers whose completion has not been delivered
    /// yet.
    pub fn pending(&self) -> usize {
        self.inner.queue.refs()
    }

    /// Deliver every completion queued so far without blocking.
    ///
    /// Returns the number of completions delivered.
    pub fn dispatch_pending(&self) -> usize {
        dispatch::dispatch(&self.inner)
    }

    /// Wait until the backend reports at least one completion, or until
    /// `timeout` elapses, then deliver every queued completion.
    ///
    /// With `timeout` of `None` this waits indefinitely, even if nothing is
    /// pending. Returns the number of completions delivered.
    pub fn handle_events(&self, timeout: Option<Duration>) -> usize {
        if self.inner.queue.wait(timeout) {
            self.dispatch_pending()
        } else {
            0
        }
    }

    /// Deliver completions until no submitted transfer is outstanding.
    ///
    /// Completion callbacks that resubmit keep this running.
    pub fn run(&self) {
        debug!("Running event loop with {} transfers pending", self.pending());
        while self.pending() > 0 {
            self.handle_events(None);
        }
    }

    /// Async version of [`run`][Context::run].
    ///
    /// Must be polled on the thread that owns the context.
    pub fn wait_idle(&self) -> impl Future<Output = ()> + '_ {
        poll_fn(move |cx| loop {
            self.dispatch_pending();
            if self.pending() == 0 {
                return Poll::Ready(());
            }
            if self.inner.queue.poll_ready(cx).is_pending() {
                return Poll::Pending;
            }
        })
    }
}

impl Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("pending", &self.pending())
            .field(
                "in_flight",
                &self.inner.dispatcher.try_borrow().map(|d| d.len()).ok(),
            )
            .finish_non_exhaustive()
    }
}
