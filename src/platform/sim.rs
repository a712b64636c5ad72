//! In-process simulated USB host.
//!
//! [`SimBackend`] implements [`Backend`] without any hardware. Devices are
//! scripted through [`SimDevice`]: queue data for IN endpoints, read back
//! what was written to OUT endpoints, stall endpoints, fail operations or
//! unplug the device. Like a real host library, it finishes transfers on a
//! worker thread of its own, launched when the first transfer is submitted,
//! and reports them through the [`Completer`].
//!
//! Transfer semantics:
//!
//! * A read completes as soon as data is queued for its endpoint. If the
//!   queued packet is larger than the buffer, the buffer is filled and the
//!   status is `TRANSFER_OVERFLOW`.
//! * A write completes right away and records the buffer.
//! * Control transfers use the direction bit of `bmRequestType` in the setup
//!   packet and move at most `wLength` bytes; a buffer too short for
//!   `wLength` is refused at submit with `ERROR_INVALID_PARAM`. Control reads
//!   take data queued with [`SimDevice::push_control_in`], control writes are
//!   recorded under endpoint `0x00` including the setup packet.
//! * A transfer on a stalled endpoint completes with `TRANSFER_STALL`.
//! * A read with nothing queued completes with `TRANSFER_TIMED_OUT` once its
//!   timeout elapses, or waits forever if the timeout is zero.
//! * Isochronous transfers are not supported.

use std::{
    collections::{BTreeMap, BTreeSet, VecDeque},
    fmt::Debug,
    sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError},
    thread::{self, JoinHandle},
    time::Instant,
};

use log::{debug, warn};
use once_cell::sync::OnceCell;
use slab::Slab;

use super::{Backend, Completer, RawHandle, RawTransfer, SubmitRequest};
use crate::{
    codes,
    transfer::{is_valid_control_buffer, setup_length, SETUP_PACKET_SIZE},
    DeviceId, DeviceInfo, Direction, NativeError, TransferType,
};

/// Buffer lent to the worker thread for the duration of one submission.
struct LentBuffer {
    ptr: *mut u8,
    len: usize,
}

// SAFETY: the submitter guarantees exclusive access to the buffer until the
// completion is posted, and only the worker thread touches it until then.
unsafe impl Send for LentBuffer {}

impl LentBuffer {
    /// # Safety
    /// See [`RawTransfer::submit`].
    unsafe fn as_mut_slice(&mut self) -> &mut [u8] {
        std::slice::from_raw_parts_mut(self.ptr, self.len)
    }

    /// Bounds of the data stage: after the setup packet and up to `wLength`
    /// for control transfers, the whole buffer otherwise.
    ///
    /// # Safety
    /// See [`RawTransfer::submit`].
    unsafe fn data_range(&mut self, transfer_type: TransferType) -> (usize, usize) {
        let buf = self.as_mut_slice();
        match (transfer_type, buf.first_chunk::<SETUP_PACKET_SIZE>()) {
            (TransferType::Control, Some(setup)) => {
                let end = (SETUP_PACKET_SIZE + setup_length(setup)).min(buf.len());
                (SETUP_PACKET_SIZE, end)
            }
            _ => (0, buf.len()),
        }
    }
}

struct Pending {
    device: DeviceId,
    endpoint: u8,
    transfer_type: TransferType,
    buffer: LentBuffer,
    deadline: Option<Instant>,
    completer: Completer,
    cancelled: bool,
}

impl Pending {
    fn direction(&mut self) -> Direction {
        match self.transfer_type {
            // SAFETY: the buffer is valid until the completion is posted.
            TransferType::Control => {
                Direction::from_address(unsafe { self.buffer.as_mut_slice() }[0])
            }
            _ => Direction::from_address(self.endpoint),
        }
    }
}

#[derive(Default)]
struct Endpoint {
    in_packets: VecDeque<Vec<u8>>,
    written: Vec<Vec<u8>>,
    stalled: bool,
    fail_submit: Option<i32>,

    /// Bytes a pending transfer moved before the device went away.
    partial: Option<Vec<u8>>,
}

struct SimDeviceState {
    info: DeviceInfo,
    connected: bool,
    fail_open: Option<i32>,
    open_handles: usize,
    claimed: BTreeSet<u8>,
    alt_settings: BTreeMap<u8, u8>,
    kernel_driver: BTreeSet<u8>,
    resets: usize,
    endpoints: BTreeMap<u8, Endpoint>,
    control_in: VecDeque<Vec<u8>>,
}

impl SimDeviceState {
    fn new(info: DeviceInfo) -> Self {
        SimDeviceState {
            info,
            connected: true,
            fail_open: None,
            open_handles: 0,
            claimed: BTreeSet::new(),
            alt_settings: BTreeMap::new(),
            kernel_driver: BTreeSet::new(),
            resets: 0,
            endpoints: BTreeMap::new(),
            control_in: VecDeque::new(),
        }
    }

    fn endpoint(&mut self, endpoint: u8) -> &mut Endpoint {
        self.endpoints.entry(endpoint).or_default()
    }
}

#[derive(Default)]
struct SimState {
    devices: BTreeMap<DeviceId, SimDeviceState>,
    handles: Slab<DeviceId>,

    /// Submitted transfers by submission ID, so they finish in submission
    /// order when several are ready at once.
    pending: BTreeMap<u64, Pending>,
    next_submission: u64,
    shutdown: bool,
}

impl SimState {
    fn device(&mut self, id: DeviceId) -> Result<&mut SimDeviceState, NativeError> {
        self.devices
            .get_mut(&id)
            .ok_or(NativeError::new(codes::ERROR_NOT_FOUND))
    }

    /// Device behind an open handle, failing if it was unplugged.
    fn connected(&mut self, handle: RawHandle) -> Result<&mut SimDeviceState, NativeError> {
        let id = *self
            .handles
            .get(handle.0)
            .ok_or(NativeError::new(codes::ERROR_INVALID_PARAM))?;
        let device = self.device(id)?;
        if !device.connected {
            return Err(NativeError::new(codes::ERROR_NO_DEVICE));
        }
        Ok(device)
    }
}

struct SimInner {
    state: Mutex<SimState>,
    changed: Condvar,
}

impl SimInner {
    fn state(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` on the state and wake the worker.
    fn update<T>(&self, f: impl FnOnce(&mut SimState) -> T) -> T {
        let res = f(&mut self.state());
        self.changed.notify_all();
        res
    }
}

/// Stops the worker when the last [`SimBackend`] clone is dropped.
struct Worker {
    inner: Arc<SimInner>,
    thread: OnceCell<JoinHandle<()>>,
}

impl Worker {
    fn ensure_started(&self) {
        self.thread.get_or_init(|| {
            debug!("Starting simulator worker thread");
            let inner = self.inner.clone();
            thread::spawn(move || worker_loop(&inner))
        });
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.inner.update(|s| s.shutdown = true);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("Simulator worker thread panicked");
            }
        }
    }
}

/// A [`Backend`] that simulates devices in-process.
///
/// Cheap to clone; clones share the same set of devices.
#[derive(Clone)]
pub struct SimBackend {
    worker: Arc<Worker>,
}

impl SimBackend {
    /// Create a simulated host with no devices.
    pub fn new() -> SimBackend {
        let inner = Arc::new(SimInner {
            state: Mutex::new(SimState::default()),
            changed: Condvar::new(),
        });
        SimBackend {
            worker: Arc::new(Worker {
                inner,
                thread: OnceCell::new(),
            }),
        }
    }

    fn inner(&self) -> &Arc<SimInner> {
        &self.worker.inner
    }

    /// Plug in a device. Replaces any device with the same ID.
    ///
    /// Devices stay registered for the life of the backend, including after
    /// [`SimDevice::disconnect`], so the returned handle never dangles.
    pub fn add_device(&self, info: DeviceInfo) -> SimDevice {
        let id = info.id();
        self.inner()
            .update(|s| s.devices.insert(id, SimDeviceState::new(info)));
        SimDevice {
            inner: self.inner().clone(),
            id,
        }
    }

    /// Scripting handle for a device added earlier.
    pub fn device(&self, id: DeviceId) -> Option<SimDevice> {
        self.inner()
            .state()
            .devices
            .contains_key(&id)
            .then(|| SimDevice {
                inner: self.inner().clone(),
                id,
            })
    }

    /// Number of handles currently open, across all devices.
    pub fn open_handles(&self) -> usize {
        self.inner().state().handles.len()
    }

    /// Number of transfers submitted and not finished yet.
    pub fn pending_transfers(&self) -> usize {
        self.inner().state().pending.len()
    }
}

impl Default for SimBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for SimBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner().state();
        f.debug_struct("SimBackend")
            .field("devices", &state.devices.len())
            .field("open_handles", &state.handles.len())
            .field("pending", &state.pending.len())
            .finish()
    }
}

impl Backend for SimBackend {
    fn list_devices(&self) -> Result<Vec<DeviceInfo>, NativeError> {
        Ok(self
            .inner()
            .state()
            .devices
            .values()
            .filter(|d| d.connected)
            .map(|d| d.info.clone())
            .collect())
    }

    fn open(&self, id: DeviceId) -> Result<RawHandle, NativeError> {
        let mut state = self.inner().state();
        let device = state.device(id)?;
        if !device.connected {
            return Err(NativeError::new(codes::ERROR_NO_DEVICE));
        }
        if let Some(code) = device.fail_open {
            return Err(NativeError::new(code));
        }
        device.open_handles += 1;
        Ok(RawHandle(state.handles.insert(id)))
    }

    fn close(&self, handle: RawHandle) {
        let mut state = self.inner().state();
        let Some(id) = state.handles.try_remove(handle.0) else {
            warn!("Closing unknown handle {handle:?}");
            return;
        };
        if let Ok(device) = state.device(id) {
            device.open_handles -= 1;
            if device.open_handles == 0 {
                device.claimed.clear();
                device.alt_settings.clear();
            }
        }
    }

    fn claim_interface(&self, handle: RawHandle, interface: u8) -> Result<(), NativeError> {
        let mut state = self.inner().state();
        let device = state.connected(handle)?;
        if device.kernel_driver.contains(&interface) || !device.claimed.insert(interface) {
            return Err(NativeError::new(codes::ERROR_BUSY));
        }
        Ok(())
    }

    fn release_interface(&self, handle: RawHandle, interface: u8) -> Result<(), NativeError> {
        let mut state = self.inner().state();
        let device = state.connected(handle)?;
        if !device.claimed.remove(&interface) {
            return Err(NativeError::new(codes::ERROR_NOT_FOUND));
        }
        device.alt_settings.remove(&interface);
        Ok(())
    }

    fn set_alt_setting(
        &self,
        handle: RawHandle,
        interface: u8,
        alt_setting: u8,
    ) -> Result<(), NativeError> {
        let mut state = self.inner().state();
        let device = state.connected(handle)?;
        if !device.claimed.contains(&interface) {
            return Err(NativeError::new(codes::ERROR_NOT_FOUND));
        }
        device.alt_settings.insert(interface, alt_setting);
        Ok(())
    }

    fn reset(&self, handle: RawHandle) -> Result<(), NativeError> {
        let mut state = self.inner().state();
        state.connected(handle)?.resets += 1;
        Ok(())
    }

    fn kernel_driver_active(&self, handle: RawHandle, interface: u8) -> Result<bool, NativeError> {
        let mut state = self.inner().state();
        Ok(state.connected(handle)?.kernel_driver.contains(&interface))
    }

    fn detach_kernel_driver(&self, handle: RawHandle, interface: u8) -> Result<(), NativeError> {
        let mut state = self.inner().state();
        if !state.connected(handle)?.kernel_driver.remove(&interface) {
            return Err(NativeError::new(codes::ERROR_NOT_FOUND));
        }
        Ok(())
    }

    fn attach_kernel_driver(&self, handle: RawHandle, interface: u8) -> Result<(), NativeError> {
        let mut state = self.inner().state();
        let device = state.connected(handle)?;
        if device.claimed.contains(&interface) || !device.kernel_driver.insert(interface) {
            return Err(NativeError::new(codes::ERROR_BUSY));
        }
        Ok(())
    }

    fn alloc_transfer(&self) -> Result<Box<dyn RawTransfer>, NativeError> {
        Ok(Box::new(SimTransfer {
            worker: self.worker.clone(),
            submission: None,
        }))
    }
}

/// Scripting handle for one simulated device.
///
/// Obtained from [`SimBackend::add_device`] or [`SimBackend::device`]; the
/// device it names is never removed from the backend.
#[derive(Clone)]
pub struct SimDevice {
    inner: Arc<SimInner>,
    id: DeviceId,
}

impl SimDevice {
    fn update<T>(&self, f: impl FnOnce(&mut SimDeviceState) -> T) -> T {
        // `SimBackend` has no way to remove a device, only to replace it.
        self.inner
            .update(|s| f(s.devices.get_mut(&self.id).expect("device present")))
    }

    /// The device's ID.
    pub fn id(&self) -> DeviceId {
        self.id
    }

    /// Queue one packet to be returned by the next read on `endpoint`.
    pub fn push_in(&self, endpoint: u8, data: Vec<u8>) {
        self.update(|d| d.endpoint(endpoint).in_packets.push_back(data));
    }

    /// Queue the data stage of the next control read.
    pub fn push_control_in(&self, data: Vec<u8>) {
        self.update(|d| d.control_in.push_back(data));
    }

    /// Take the buffers written to `endpoint` so far, oldest first.
    pub fn take_out(&self, endpoint: u8) -> Vec<Vec<u8>> {
        self.update(|d| std::mem::take(&mut d.endpoint(endpoint).written))
    }

    /// Set or clear the halt condition of `endpoint`.
    pub fn stall(&self, endpoint: u8, stalled: bool) {
        self.update(|d| d.endpoint(endpoint).stalled = stalled);
    }

    /// Make submissions on `endpoint` fail with `code`, or succeed again
    /// with `None`.
    pub fn fail_submit(&self, endpoint: u8, code: Option<i32>) {
        self.update(|d| d.endpoint(endpoint).fail_submit = code);
    }

    /// Make opening the device fail with `code`, or succeed again with
    /// `None`.
    pub fn fail_open(&self, code: Option<i32>) {
        self.update(|d| d.fail_open = code);
    }

    /// Bind or unbind the kernel driver of `interface`.
    pub fn set_kernel_driver(&self, interface: u8, active: bool) {
        self.update(|d| {
            if active {
                d.kernel_driver.insert(interface);
            } else {
                d.kernel_driver.remove(&interface);
            }
        });
    }

    /// Unplug the device. Pending transfers complete with
    /// `TRANSFER_NO_DEVICE`, later operations fail with `ERROR_NO_DEVICE`.
    pub fn disconnect(&self) {
        debug!("Disconnecting simulated device {:?}", self.id);
        self.update(|d| d.connected = false);
    }

    /// Unplug the device while a transfer on `endpoint` is under way.
    ///
    /// The oldest pending transfer on `endpoint` completes with
    /// `TRANSFER_NO_DEVICE` and `partial.len()` bytes transferred, clamped to
    /// its buffer. For a read, `partial` is copied into the buffer. Other
    /// pending transfers behave as for [`disconnect`][Self::disconnect].
    pub fn disconnect_after(&self, endpoint: u8, partial: Vec<u8>) {
        debug!(
            "Disconnecting simulated device {:?} after {} bytes on ep {endpoint:02x}",
            self.id,
            partial.len()
        );
        self.update(|d| {
            d.endpoint(endpoint).partial = Some(partial);
            d.connected = false;
        });
    }

    /// Number of resets requested.
    pub fn resets(&self) -> usize {
        self.update(|d| d.resets)
    }

    /// Whether `interface` is claimed.
    pub fn is_claimed(&self, interface: u8) -> bool {
        self.update(|d| d.claimed.contains(&interface))
    }

    /// Alternate setting selected on `interface`, if any.
    pub fn alt_setting(&self, interface: u8) -> Option<u8> {
        self.update(|d| d.alt_settings.get(&interface).copied())
    }

    /// Whether no transfer on this device is waiting to finish.
    pub fn idle(&self) -> bool {
        let state = self.inner.state();
        !state.pending.values().any(|p| p.device == self.id)
    }
}

impl Debug for SimDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimDevice").field("id", &self.id).finish()
    }
}

struct SimTransfer {
    worker: Arc<Worker>,
    submission: Option<u64>,
}

impl RawTransfer for SimTransfer {
    unsafe fn submit(
        &mut self,
        request: &SubmitRequest,
        completer: Completer,
    ) -> Result<(), NativeError> {
        let inner = &self.worker.inner;
        let mut state = inner.state();

        if let Some(submission) = self.submission {
            if state.pending.contains_key(&submission) {
                return Err(NativeError::new(codes::ERROR_BUSY));
            }
        }

        let device = state.connected(request.handle)?;
        let id = device.info.id();
        match request.transfer_type {
            TransferType::Isochronous => {
                return Err(NativeError::new(codes::ERROR_NOT_SUPPORTED));
            }
            TransferType::Control
                if !is_valid_control_buffer(std::slice::from_raw_parts(
                    request.buffer,
                    request.length,
                )) =>
            {
                return Err(NativeError::new(codes::ERROR_INVALID_PARAM));
            }
            _ => {}
        }
        if let Some(code) = device.endpoint(request.endpoint).fail_submit {
            return Err(NativeError::new(code));
        }

        let submission = state.next_submission;
        state.next_submission += 1;
        state.pending.insert(
            submission,
            Pending {
                device: id,
                endpoint: request.endpoint,
                transfer_type: request.transfer_type,
                buffer: LentBuffer {
                    ptr: request.buffer,
                    len: request.length,
                },
                deadline: (!request.timeout.is_zero()).then(|| Instant::now() + request.timeout),
                completer,
                cancelled: false,
            },
        );
        self.submission = Some(submission);
        drop(state);

        self.worker.ensure_started();
        inner.changed.notify_all();
        Ok(())
    }

    fn cancel(&mut self) -> Result<(), NativeError> {
        let Some(submission) = self.submission else {
            return Err(NativeError::new(codes::ERROR_NOT_FOUND));
        };
        self.worker.inner.update(|s| match s.pending.get_mut(&submission) {
            Some(pending) if !pending.cancelled => {
                pending.cancelled = true;
                Ok(())
            }
            _ => Err(NativeError::new(codes::ERROR_NOT_FOUND)),
        })
    }
}

/// Try to finish a pending transfer, returning its status and length.
fn try_finish(
    device: Option<&mut SimDeviceState>,
    p: &mut Pending,
    now: Instant,
) -> Option<(i32, usize)> {
    if p.cancelled {
        return Some((codes::TRANSFER_CANCELLED, 0));
    }
    let Some(device) = device else {
        return Some((codes::TRANSFER_NO_DEVICE, 0));
    };

    let control = p.transfer_type == TransferType::Control;
    let direction = p.direction();

    // SAFETY: the buffer is valid until the completion is posted.
    let (start, end) = unsafe { p.buffer.data_range(p.transfer_type) };
    let buf = unsafe { p.buffer.as_mut_slice() };

    if !device.connected {
        let partial = device.endpoint(p.endpoint).partial.take().unwrap_or_default();
        let dest = &mut buf[start..end];
        let len = partial.len().min(dest.len());
        if direction == Direction::In {
            dest[..len].copy_from_slice(&partial[..len]);
        }
        return Some((codes::TRANSFER_NO_DEVICE, len));
    }
    if device.endpoint(p.endpoint).stalled {
        return Some((codes::TRANSFER_STALL, 0));
    }

    match direction {
        Direction::Out => {
            device.endpoint(p.endpoint).written.push(buf[..end].to_vec());
            Some((codes::TRANSFER_COMPLETED, end - start))
        }
        Direction::In => {
            let queued = if control {
                device.control_in.pop_front()
            } else {
                device.endpoint(p.endpoint).in_packets.pop_front()
            };
            match queued {
                Some(packet) => {
                    let dest = &mut buf[start..end];
                    let len = packet.len().min(dest.len());
                    dest[..len].copy_from_slice(&packet[..len]);
                    let status = if packet.len() > dest.len() {
                        codes::TRANSFER_OVERFLOW
                    } else {
                        codes::TRANSFER_COMPLETED
                    };
                    Some((status, len))
                }
                None if p.deadline.is_some_and(|d| d <= now) => {
                    Some((codes::TRANSFER_TIMED_OUT, 0))
                }
                None => None,
            }
        }
    }
}

fn worker_loop(inner: &SimInner) {
    let mut state = inner.state();
    loop {
        if state.shutdown {
            if !state.pending.is_empty() {
                warn!(
                    "Simulator stopping with {} transfers pending",
                    state.pending.len()
                );
            }
            return;
        }

        let now = Instant::now();
        let SimState {
            devices, pending, ..
        } = &mut *state;

        let mut ready = Vec::new();
        for (&submission, p) in pending.iter_mut() {
            if let Some(result) = try_finish(devices.get_mut(&p.device), p, now) {
                ready.push((submission, result));
            }
        }

        if !ready.is_empty() {
            let finished: Vec<_> = ready
                .into_iter()
                .filter_map(|(submission, result)| {
                    pending.remove(&submission).map(|p| (submission, p, result))
                })
                .collect();

            // Post without holding the lock; the consumer may react by
            // submitting or cancelling right away.
            drop(state);
            for (submission, p, (status, actual_length)) in finished {
                debug!(
                    "Simulated transfer {submission} on ep {:02x} finished: status={status} len={actual_length}",
                    p.endpoint
                );
                p.completer.complete(status, actual_length);
            }
            state = inner.state();
            continue;
        }

        let next_deadline = pending.values().filter_map(|p| p.deadline).min();
        state = match next_deadline {
            Some(deadline) => {
                let timeout = deadline.saturating_duration_since(Instant::now());
                inner
                    .changed
                    .wait_timeout(state, timeout)
                    .unwrap_or_else(PoisonError::into_inner)
                    .0
            }
            None => inner
                .changed
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner),
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_unknown_or_unplugged_device() {
        let sim = SimBackend::new();
        assert_eq!(
            sim.open(DeviceId(1)).unwrap_err().code(),
            codes::ERROR_NOT_FOUND
        );

        let dev = sim.add_device(DeviceInfo::new(DeviceId(1), 1, 1));
        let handle = sim.open(DeviceId(1)).unwrap();
        dev.disconnect();
        assert_eq!(
            sim.open(DeviceId(1)).unwrap_err().code(),
            codes::ERROR_NO_DEVICE
        );
        assert_eq!(
            sim.claim_interface(handle, 0).unwrap_err().code(),
            codes::ERROR_NO_DEVICE
        );
        assert!(sim.list_devices().unwrap().is_empty());
        sim.close(handle);
        assert_eq!(sim.open_handles(), 0);
    }

    #[test]
    fn close_releases_interfaces() {
        let sim = SimBackend::new();
        let dev = sim.add_device(DeviceInfo::new(DeviceId(2), 1, 1));
        let handle = sim.open(DeviceId(2)).unwrap();
        sim.claim_interface(handle, 0).unwrap();
        sim.set_alt_setting(handle, 0, 3).unwrap();
        assert!(dev.is_claimed(0));
        assert_eq!(dev.alt_setting(0), Some(3));

        sim.close(handle);
        assert!(!dev.is_claimed(0));
        assert_eq!(dev.alt_setting(0), None);
    }

    #[test]
    fn control_buffer_must_hold_wlength() {
        let sim = SimBackend::new();
        sim.add_device(DeviceInfo::new(DeviceId(4), 1, 1));
        let handle = sim.open(DeviceId(4)).unwrap();
        let queue = crate::queue::CompletionQueue::new();
        let mut transfer = sim.alloc_transfer().unwrap();

        let mut buf = vec![0x80, 0x06, 0x00, 0x01, 0x00, 0x00, 0x00, 0x10];
        let request = SubmitRequest {
            handle,
            endpoint: 0x00,
            transfer_type: TransferType::Control,
            timeout: std::time::Duration::ZERO,
            buffer: buf.as_mut_ptr(),
            length: buf.len(),
        };
        // SAFETY: rejected, so the buffer is never lent out.
        let res = unsafe { transfer.submit(&request, Completer::new(queue.sender(), 0)) };
        assert_eq!(res.unwrap_err().code(), codes::ERROR_INVALID_PARAM);
        assert_eq!(sim.pending_transfers(), 0);
        sim.close(handle);
    }

    #[test]
    fn cancel_without_submission() {
        let sim = SimBackend::new();
        let mut transfer = sim.alloc_transfer().unwrap();
        assert_eq!(transfer.cancel().unwrap_err().code(), codes::ERROR_NOT_FOUND);
    }
}
