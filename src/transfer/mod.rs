//! Transfer-related types.
//!
//! A [`Transfer`] is bound to one endpoint of a [`Device`] and carries at
//! most one submission at a time. Submitting moves the buffer into the
//! transfer; the buffer comes back in the [`Completion`] passed to the
//! callback, which runs on the thread that owns the
//! [`Context`][crate::Context].

use std::{
    cell::RefCell,
    fmt::{Debug, Display},
    rc::Rc,
    time::Duration,
};

use log::{debug, error};

use crate::{
    codes,
    platform::{Completer, RawTransfer, SubmitRequest},
    queue::CompletionRecord,
    Device, Error, NativeError, TransferError,
};

mod control;
pub use control::{ControlIn, ControlOut, ControlType, Direction, Recipient, SETUP_PACKET_SIZE};
pub(crate) use control::{is_valid_control_buffer, setup_length};

/// Endpoint type.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
pub enum TransferType {
    /// Control endpoint.
    Control = 0,

    /// Isochronous endpoint.
    Isochronous = 1,

    /// Bulk endpoint.
    Bulk = 2,

    /// Interrupt endpoint.
    Interrupt = 3,
}

impl TransferType {
    /// Map a native transfer type code.
    pub fn from_code(code: u8) -> Option<TransferType> {
        match code {
            codes::TRANSFER_TYPE_CONTROL => Some(TransferType::Control),
            codes::TRANSFER_TYPE_ISOCHRONOUS => Some(TransferType::Isochronous),
            codes::TRANSFER_TYPE_BULK => Some(TransferType::Bulk),
            codes::TRANSFER_TYPE_INTERRUPT => Some(TransferType::Interrupt),
            _ => None,
        }
    }
}

/// Externally visible state of a [`Transfer`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TransferState {
    /// No submission is outstanding. The transfer can be submitted.
    Idle,

    /// A buffer is submitted and the completion has not been delivered yet.
    Submitted,

    /// Like `Submitted`, and cancellation was requested. The completion is
    /// still delivered, usually with [`TransferError::Cancelled`].
    Cancelling,
}

/// Status and data returned on transfer completion.
///
/// A transfer can return partial data even in the case of failure or
/// cancellation, thus this is a struct containing both rather than a `Result`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    /// Indicates successful completion or error.
    pub status: Result<(), TransferError>,

    /// The buffer that was submitted, returned for reuse.
    pub buffer: Vec<u8>,

    /// Number of bytes transferred, not counting the setup packet of a
    /// control transfer.
    pub actual_length: usize,

    data_offset: usize,
}

impl Completion {
    /// The bytes transferred: the start of the buffer, or for control
    /// transfers the bytes following the setup packet.
    pub fn data(&self) -> &[u8] {
        let start = self.data_offset.min(self.buffer.len());
        let end = (self.data_offset + self.actual_length).min(self.buffer.len());
        &self.buffer[start..end]
    }
}

/// Error returned by [`Transfer::submit`], handing back the buffer.
#[derive(Debug)]
pub struct SubmitRejected {
    error: Error,
    buffer: Vec<u8>,
}

impl SubmitRejected {
    fn new(error: Error, buffer: Vec<u8>) -> Self {
        SubmitRejected { error, buffer }
    }

    /// Why the submission was rejected.
    pub fn error(&self) -> Error {
        self.error
    }

    /// Take back the buffer that was not submitted.
    pub fn into_buffer(self) -> Vec<u8> {
        self.buffer
    }
}

impl Display for SubmitRejected {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.error, f)
    }
}

impl std::error::Error for SubmitRejected {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

impl From<SubmitRejected> for Error {
    fn from(value: SubmitRejected) -> Self {
        value.error
    }
}

type Callback = Box<dyn FnOnce(&Transfer, Completion)>;

enum State {
    Idle,
    Submitted(Outstanding),
}

struct Outstanding {
    /// Key of this transfer's keep-alive entry in the dispatcher.
    key: usize,

    /// Lent to the backend until the completion is posted. Not accessed
    /// here in the meantime.
    buffer: Vec<u8>,

    on_complete: Callback,
    cancelling: bool,
}

struct TransferInner {
    device: Device,
    endpoint: u8,
    transfer_type: TransferType,
    timeout: Duration,
    raw: RefCell<Box<dyn RawTransfer>>,
    state: RefCell<State>,
}

/// An asynchronous transfer on one endpoint of a [`Device`].
///
/// ### Example (streaming read)
///
/// Resubmitting from the completion callback keeps a read outstanding at all
/// times:
///
/// ```
/// use std::time::Duration;
/// use usbio::{platform::sim::SimBackend, Context, DeviceId, DeviceInfo, Transfer, TransferType};
///
/// fn read_next(transfer: &Transfer, remaining: usize) {
///     if remaining == 0 {
///         return;
///     }
///     transfer
///         .submit(vec![0; 64], move |t, completion| {
///             println!("{:?}", completion.data());
///             if completion.status.is_ok() {
///                 read_next(t, remaining - 1);
///             }
///         })
///         .unwrap();
/// }
///
/// let sim = SimBackend::new();
/// let dev = sim.add_device(DeviceInfo::new(DeviceId(1), 1, 2).with_ids(0x59e3, 0x0a23));
/// for i in 0..3 {
///     dev.push_in(0x81, vec![i; 10]);
/// }
///
/// let context = Context::new(sim.clone());
/// let device = context.find_by_ids(0x59e3, 0x0a23).unwrap().unwrap();
/// device.open().unwrap();
///
/// let transfer = Transfer::new(&device, 0x81, TransferType::Bulk, Duration::from_secs(1)).unwrap();
/// read_next(&transfer, 3);
/// context.run();
/// ```
///
/// `Transfer` is reference-counted and cheap to clone. While a submission is
/// outstanding the transfer keeps itself alive, so dropping every handle does
/// not cancel it or free its buffer early.
#[derive(Clone)]
pub struct Transfer {
    inner: Rc<TransferInner>,
}

impl Transfer {
    /// Create an idle transfer for `endpoint` of `device`.
    ///
    /// `timeout` applies to each submission; `Duration::ZERO` means none.
    /// The device does not need to be open yet.
    pub fn new(
        device: &Device,
        endpoint: u8,
        transfer_type: TransferType,
        timeout: Duration,
    ) -> Result<Transfer, Error> {
        let raw = device
            .context()
            .backend
            .alloc_transfer()
            .map_err(|e| Error::Device(e).log_error())?;

        Ok(Transfer {
            inner: Rc::new(TransferInner {
                device: device.clone(),
                endpoint,
                transfer_type,
                timeout,
                raw: RefCell::new(raw),
                state: RefCell::new(State::Idle),
            }),
        })
    }

    /// The device this transfer is bound to.
    pub fn device(&self) -> &Device {
        &self.inner.device
    }

    /// Endpoint address including the direction bit.
    pub fn endpoint(&self) -> u8 {
        self.inner.endpoint
    }

    /// Endpoint type.
    pub fn transfer_type(&self) -> TransferType {
        self.inner.transfer_type
    }

    /// Timeout applied to each submission.
    pub fn timeout(&self) -> Duration {
        self.inner.timeout
    }

    /// Current state.
    pub fn state(&self) -> TransferState {
        match &*self.inner.state.borrow() {
            State::Idle => TransferState::Idle,
            State::Submitted(o) if o.cancelling => TransferState::Cancelling,
            State::Submitted(_) => TransferState::Submitted,
        }
    }

    /// Whether a submission is outstanding.
    pub fn is_pending(&self) -> bool {
        self.state() != TransferState::Idle
    }

    /// Submit `buffer` for asynchronous transfer.
    ///
    /// For an IN endpoint, the buffer's length is the number of bytes
    /// requested. For an OUT endpoint, the buffer's contents are sent. For a
    /// control transfer the buffer starts with the setup packet; see
    /// [`ControlIn::to_buffer`] and [`ControlOut::to_buffer`].
    ///
    /// `on_complete` is called exactly once, on the context's thread, from
    /// [`Context::handle_events`][crate::Context::handle_events] or one of
    /// its siblings. It receives the buffer back and may submit this transfer
    /// again.
    ///
    /// Fails without side effects, handing back the buffer, with
    /// * [`Error::NotOpen`] if the device is closed,
    /// * [`Error::AlreadySubmitted`] if a submission is outstanding,
    /// * [`Error::Submit`] with `ERROR_INVALID_PARAM` if a control buffer is
    ///   shorter than its setup packet plus `wLength`,
    /// * [`Error::Submit`] if the library rejected the request.
    pub fn submit<F>(&self, buffer: Vec<u8>, on_complete: F) -> Result<(), SubmitRejected>
    where
        F: FnOnce(&Transfer, Completion) + 'static,
    {
        let inner = &self.inner;

        // Read at every submission: the device may have been closed and
        // reopened since this transfer was created.
        let handle = match inner.device.require_open() {
            Ok(handle) => handle,
            Err(e) => return Err(SubmitRejected::new(e.log_debug(), buffer)),
        };

        if let State::Submitted(_) = &*inner.state.borrow() {
            return Err(SubmitRejected::new(
                Error::AlreadySubmitted.log_debug(),
                buffer,
            ));
        }

        if inner.transfer_type == TransferType::Control && !is_valid_control_buffer(&buffer) {
            let e = Error::Submit(NativeError::new(codes::ERROR_INVALID_PARAM));
            return Err(SubmitRejected::new(e.log_debug(), buffer));
        }

        let mut buffer = buffer;
        let request = SubmitRequest {
            handle,
            endpoint: inner.endpoint,
            transfer_type: inner.transfer_type,
            timeout: inner.timeout,
            buffer: buffer.as_mut_ptr(),
            length: buffer.len(),
        };

        let context = inner.device.context();
        let key = context.dispatcher.borrow_mut().register(self.clone());
        context.queue.add_ref();
        inner.device.add_pending();

        debug!(
            "Submitting transfer {key} on ep {:02x} type {:?} len {} timeout {:?}",
            request.endpoint, request.transfer_type, request.length, request.timeout
        );

        // SAFETY: the buffer's heap allocation is moved into `Outstanding`
        // below and not touched until `handle_completion`, which runs only
        // after the backend posted the completion. The state is idle, so no
        // other submission is outstanding.
        let res = unsafe {
            inner
                .raw
                .borrow_mut()
                .submit(&request, Completer::new(context.queue.sender(), key))
        };

        match res {
            Ok(()) => {
                *inner.state.borrow_mut() = State::Submitted(Outstanding {
                    key,
                    buffer,
                    on_complete: Box::new(on_complete),
                    cancelling: false,
                });
                Ok(())
            }
            Err(e) => {
                let keep_alive = context.dispatcher.borrow_mut().unregister(key);
                drop(keep_alive);
                context.queue.unref();
                inner.device.remove_pending();
                Err(SubmitRejected::new(Error::Submit(e).log_debug(), buffer))
            }
        }
    }

    /// Request cancellation of the outstanding submission.
    ///
    /// Returns `Ok(true)` if the request was accepted: the completion will
    /// still be delivered, with [`TransferError::Cancelled`] unless the
    /// transfer finished first. Returns `Ok(false)` if there was nothing to
    /// cancel, because the transfer was never submitted or has already
    /// finished. Other failures of the library are reported as
    /// [`Error::Cancel`].
    pub fn cancel(&self) -> Result<bool, Error> {
        let mut state = self.inner.state.borrow_mut();
        let State::Submitted(outstanding) = &mut *state else {
            debug!("Nothing to cancel on ep {:02x}", self.inner.endpoint);
            return Ok(false);
        };

        match self.inner.raw.borrow_mut().cancel() {
            Ok(()) => {
                debug!("Cancelling transfer {}", outstanding.key);
                outstanding.cancelling = true;
                Ok(true)
            }
            Err(e) if e.code() == codes::ERROR_NOT_FOUND => {
                debug!("Transfer {} already finished", outstanding.key);
                Ok(false)
            }
            Err(e) => Err(Error::Cancel(e).log_error()),
        }
    }

    pub(crate) fn handle_completion(&self, record: CompletionRecord) {
        let inner = &self.inner;

        let state = std::mem::replace(&mut *inner.state.borrow_mut(), State::Idle);
        let Outstanding {
            key,
            buffer,
            on_complete,
            ..
        } = match state {
            State::Submitted(outstanding) => outstanding,
            State::Idle => {
                error!("Completion delivered to idle transfer {}", record.key);
                return;
            }
        };
        debug_assert_eq!(key, record.key);

        let status = TransferError::from_status(record.status);
        let context = inner.device.context();
        context.queue.unref();
        inner.device.remove_pending();
        let keep_alive = context.dispatcher.borrow_mut().unregister(key);
        drop(keep_alive);

        debug!(
            "Transfer {key} on ep {:02x} completed, status={} actual_length={}",
            inner.endpoint, record.status, record.actual_length
        );

        let data_offset = match inner.transfer_type {
            TransferType::Control => SETUP_PACKET_SIZE,
            _ => 0,
        };

        let completion = Completion {
            status,
            buffer,
            actual_length: record.actual_length,
            data_offset,
        };

        on_complete(self, completion);
    }
}

impl Debug for Transfer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transfer")
            .field("endpoint", &format_args!("0x{:02x}", self.inner.endpoint))
            .field("type", &self.inner.transfer_type)
            .field("timeout", &self.inner.timeout)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, rc::Rc, time::Duration};

    use super::*;
    use crate::{
        platform::sim::{SimBackend, SimDevice},
        Context, DeviceId, DeviceInfo,
    };

    const TIMEOUT: Duration = Duration::from_secs(2);

    fn setup() -> (SimDevice, Context, Device) {
        let sim = SimBackend::new();
        let dev = sim.add_device(DeviceInfo::new(DeviceId(3), 1, 5).with_ids(0xaaaa, 0xbbbb));
        let context = Context::new(sim);
        let device = context.find_by_ids(0xaaaa, 0xbbbb).unwrap().unwrap();
        device.open().unwrap();
        (dev, context, device)
    }

    fn collect(log: &Rc<RefCell<Vec<Completion>>>) -> impl FnOnce(&Transfer, Completion) {
        let log = log.clone();
        move |_: &Transfer, c: Completion| log.borrow_mut().push(c)
    }

    fn wait_for(context: &Context, n: usize, log: &Rc<RefCell<Vec<Completion>>>) {
        while log.borrow().len() < n {
            assert!(
                context.handle_events(Some(TIMEOUT)) > 0,
                "timed out waiting for completion"
            );
        }
    }

    #[test]
    fn transfer_type_codes() {
        assert_eq!(TransferType::from_code(2), Some(TransferType::Bulk));
        assert_eq!(
            TransferType::from_code(TransferType::Interrupt as u8),
            Some(TransferType::Interrupt)
        );
        assert_eq!(TransferType::from_code(4), None);
    }

    #[test]
    fn bulk_out_records_data() {
        let (dev, context, device) = setup();
        let t = Transfer::new(&device, 0x02, TransferType::Bulk, TIMEOUT).unwrap();
        let log = Rc::new(RefCell::new(Vec::new()));

        t.submit(vec![1, 2, 3, 4], collect(&log)).unwrap();
        assert_eq!(t.state(), TransferState::Submitted);
        wait_for(&context, 1, &log);

        let c = &log.borrow()[0];
        assert_eq!(c.status, Ok(()));
        assert_eq!(c.actual_length, 4);
        assert_eq!(c.buffer, vec![1, 2, 3, 4]);
        assert_eq!(dev.take_out(0x02), vec![vec![1, 2, 3, 4]]);
        assert_eq!(t.state(), TransferState::Idle);
    }

    #[test]
    fn submit_on_closed_device_returns_buffer() {
        let (_dev, context, device) = setup();
        let t = Transfer::new(&device, 0x81, TransferType::Bulk, TIMEOUT).unwrap();
        device.close().unwrap();

        let err = t.submit(vec![9; 16], |_, _| unreachable!()).unwrap_err();
        assert_eq!(err.error(), Error::NotOpen);
        assert_eq!(err.into_buffer(), vec![9; 16]);
        assert_eq!(context.pending(), 0);
        assert!(!t.is_pending());
    }

    #[test]
    fn rejected_submission_is_rolled_back() {
        let (dev, context, device) = setup();
        dev.fail_submit(0x81, Some(codes::ERROR_PIPE));
        let t = Transfer::new(&device, 0x81, TransferType::Bulk, TIMEOUT).unwrap();

        let err = t.submit(vec![0; 8], |_, _| unreachable!()).unwrap_err();
        assert!(matches!(err.error(), Error::Submit(e) if e.code() == codes::ERROR_PIPE));
        assert_eq!(context.pending(), 0);
        assert_eq!(device.pending_transfers(), 0);
        assert_eq!(t.state(), TransferState::Idle);
        device.close().unwrap();

        // The transfer is usable again once the endpoint accepts requests.
        device.open().unwrap();
        dev.fail_submit(0x81, None);
        dev.push_in(0x81, vec![5; 3]);
        let log = Rc::new(RefCell::new(Vec::new()));
        t.submit(vec![0; 8], collect(&log)).unwrap();
        wait_for(&context, 1, &log);
        assert_eq!(log.borrow()[0].data(), &[5, 5, 5]);
    }

    #[test]
    fn cancel_pending_read() {
        let (_dev, context, device) = setup();
        let t = Transfer::new(&device, 0x81, TransferType::Bulk, Duration::ZERO).unwrap();
        let log = Rc::new(RefCell::new(Vec::new()));

        t.submit(vec![0; 64], collect(&log)).unwrap();
        assert_eq!(t.cancel(), Ok(true));
        assert_eq!(t.state(), TransferState::Cancelling);
        assert_eq!(device.close(), Err(Error::Busy));

        wait_for(&context, 1, &log);
        let c = &log.borrow()[0];
        assert_eq!(c.status, Err(TransferError::Cancelled));
        assert_eq!(c.actual_length, 0);
        assert_eq!(t.cancel(), Ok(false));
        assert_eq!(context.pending(), 0);
        device.close().unwrap();
    }

    #[test]
    fn cancel_after_finish_reports_nothing_to_cancel() {
        let (dev, context, device) = setup();
        let t = Transfer::new(&device, 0x02, TransferType::Bulk, TIMEOUT).unwrap();
        let log = Rc::new(RefCell::new(Vec::new()));

        t.submit(vec![1], collect(&log)).unwrap();
        // Give the simulator time to finish the write before cancelling.
        while !dev.idle() {
            std::thread::yield_now();
        }
        assert_eq!(t.cancel(), Ok(false));
        assert_eq!(t.state(), TransferState::Submitted);

        wait_for(&context, 1, &log);
        assert_eq!(log.borrow()[0].status, Ok(()));
    }

    #[test]
    fn timeout_status() {
        let (_dev, context, device) = setup();
        let t = Transfer::new(&device, 0x83, TransferType::Interrupt, Duration::from_millis(20))
            .unwrap();
        let log = Rc::new(RefCell::new(Vec::new()));

        t.submit(vec![0; 8], collect(&log)).unwrap();
        wait_for(&context, 1, &log);
        assert_eq!(log.borrow()[0].status, Err(TransferError::TimedOut));
    }

    #[test]
    fn stall_and_overflow_status() {
        let (dev, context, device) = setup();
        let t = Transfer::new(&device, 0x81, TransferType::Bulk, TIMEOUT).unwrap();
        let log = Rc::new(RefCell::new(Vec::new()));

        dev.stall(0x81, true);
        t.submit(vec![0; 8], collect(&log)).unwrap();
        wait_for(&context, 1, &log);
        assert_eq!(log.borrow()[0].status, Err(TransferError::Stall));

        dev.stall(0x81, false);
        dev.push_in(0x81, vec![7; 12]);
        t.submit(vec![0; 8], collect(&log)).unwrap();
        wait_for(&context, 2, &log);
        let c = &log.borrow()[1];
        assert_eq!(c.status, Err(TransferError::Overflow));
        assert_eq!(c.actual_length, 8);
        assert_eq!(c.data(), &[7; 8]);
    }

    #[test]
    fn control_in_payload_follows_setup_packet() {
        let (dev, context, device) = setup();
        dev.push_control_in(vec![0x12, 0x01, 0x00, 0x02]);
        let t = Transfer::new(&device, 0x00, TransferType::Control, TIMEOUT).unwrap();
        let log = Rc::new(RefCell::new(Vec::new()));

        let buffer = ControlIn {
            control_type: ControlType::Standard,
            recipient: Recipient::Device,
            request: 0x06,
            value: 0x0100,
            index: 0,
            length: 18,
        }
        .to_buffer();
        t.submit(buffer, collect(&log)).unwrap();
        wait_for(&context, 1, &log);

        let c = &log.borrow()[0];
        assert_eq!(c.status, Ok(()));
        assert_eq!(c.actual_length, 4);
        assert_eq!(c.data(), &[0x12, 0x01, 0x00, 0x02]);
        assert_eq!(c.buffer.len(), SETUP_PACKET_SIZE + 18);
    }

    #[test]
    fn control_out_records_setup_and_data() {
        let (dev, context, device) = setup();
        let t = Transfer::new(&device, 0x00, TransferType::Control, TIMEOUT).unwrap();
        let log = Rc::new(RefCell::new(Vec::new()));

        let buffer = ControlOut {
            control_type: ControlType::Vendor,
            recipient: Recipient::Device,
            request: 0x01,
            value: 0,
            index: 0,
            data: &[0xAA, 0xBB],
        }
        .to_buffer()
        .unwrap();
        t.submit(buffer.clone(), collect(&log)).unwrap();
        wait_for(&context, 1, &log);

        assert_eq!(log.borrow()[0].actual_length, 2);
        assert_eq!(dev.take_out(0x00), vec![buffer]);
    }

    #[test]
    fn control_buffer_shorter_than_wlength_is_rejected() {
        let (dev, context, device) = setup();
        let t = Transfer::new(&device, 0x00, TransferType::Control, TIMEOUT).unwrap();

        // GET_DESCRIPTOR announcing 0x1000 bytes with no room for them.
        let setup_only = vec![0x80, 0x06, 0x00, 0x01, 0x00, 0x00, 0x00, 0x10];
        let err = t.submit(setup_only.clone(), |_, _| unreachable!()).unwrap_err();
        assert_eq!(err.error().native_code(), Some(codes::ERROR_INVALID_PARAM));
        assert_eq!(err.into_buffer(), setup_only);

        let err = t.submit(vec![0x80, 0x06], |_, _| unreachable!()).unwrap_err();
        assert_eq!(err.error().native_code(), Some(codes::ERROR_INVALID_PARAM));

        assert_eq!(t.state(), TransferState::Idle);
        assert_eq!(context.pending(), 0);
        assert_eq!(device.pending_transfers(), 0);
        assert!(dev.idle());
        device.close().unwrap();
    }

    #[test]
    fn control_in_is_limited_to_wlength() {
        let (dev, context, device) = setup();
        dev.push_control_in(vec![0x55; 10]);
        let t = Transfer::new(&device, 0x00, TransferType::Control, TIMEOUT).unwrap();
        let log = Rc::new(RefCell::new(Vec::new()));

        let mut buffer = ControlIn {
            control_type: ControlType::Vendor,
            recipient: Recipient::Device,
            request: 0x01,
            value: 0,
            index: 0,
            length: 4,
        }
        .to_buffer();
        buffer.resize(SETUP_PACKET_SIZE + 16, 0);
        t.submit(buffer, collect(&log)).unwrap();
        wait_for(&context, 1, &log);

        let c = &log.borrow()[0];
        assert_eq!(c.status, Err(TransferError::Overflow));
        assert_eq!(c.actual_length, 4);
        assert_eq!(c.data(), &[0x55; 4]);
        assert!(c.buffer[SETUP_PACKET_SIZE + 4..].iter().all(|&b| b == 0));
    }

    #[test]
    fn dropped_handle_still_completes() {
        let (dev, context, device) = setup();
        let done = Rc::new(RefCell::new(None));

        {
            let t = Transfer::new(&device, 0x81, TransferType::Bulk, TIMEOUT).unwrap();
            let done = done.clone();
            t.submit(vec![0; 4], move |t, c| {
                *done.borrow_mut() = Some((t.endpoint(), c.data().to_vec()));
            })
            .unwrap();
        }

        dev.push_in(0x81, vec![1, 2]);
        context.run();
        assert_eq!(*done.borrow(), Some((0x81, vec![1, 2])));
        device.close().unwrap();
    }
}
