use std::{cell::RefCell, rc::Rc, time::Duration};

use usbio::{
    codes, platform::sim::SimBackend, platform::sim::SimDevice, Completion, Context, Device,
    DeviceId, DeviceInfo, Error, Transfer, TransferError, TransferState, TransferType,
};

const VID: u16 = 0x59e3;
const PID: u16 = 0x0a23;
const TIMEOUT: Duration = Duration::from_millis(1000);

struct Fixture {
    sim: SimBackend,
    dev: SimDevice,
    context: Context,
    device: Device,
}

fn setup() -> Fixture {
    let _ = env_logger::builder().is_test(true).try_init();

    let sim = SimBackend::new();
    let dev = sim.add_device(DeviceInfo::new(DeviceId(0x0102), 1, 2).with_ids(VID, PID));
    let context = Context::new(sim.clone());
    let device = context
        .find_by_ids(VID, PID)
        .unwrap()
        .expect("simulated device should be listed");
    device.open().unwrap();
    Fixture {
        sim,
        dev,
        context,
        device,
    }
}

type Log = Rc<RefCell<Vec<Completion>>>;

fn recorder(log: &Log) -> impl FnOnce(&Transfer, Completion) + 'static {
    let log = log.clone();
    move |_: &Transfer, completion: Completion| log.borrow_mut().push(completion)
}

fn assert_balanced(f: &Fixture) {
    assert_eq!(f.context.pending(), 0);
    assert_eq!(f.device.pending_transfers(), 0);
    assert_eq!(f.sim.pending_transfers(), 0);
}

#[test]
fn bulk_read_completes() {
    let f = setup();
    f.dev.push_in(0x81, vec![0xAB; 40]);
    let t1 = Transfer::new(&f.device, 0x81, TransferType::Bulk, TIMEOUT).unwrap();
    let log = Log::default();

    t1.submit(vec![0; 64], recorder(&log)).unwrap();
    f.context.run();

    let log = log.borrow();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].status, Ok(()));
    assert!(log[0].actual_length <= 64);
    assert_eq!(log[0].data(), &[0xAB; 40][..]);
    assert_eq!(log[0].buffer.len(), 64);
    assert_balanced(&f);
}

#[test]
fn second_submit_is_rejected() {
    let f = setup();
    let t1 = Transfer::new(&f.device, 0x81, TransferType::Bulk, TIMEOUT).unwrap();
    let log = Log::default();

    t1.submit(vec![0; 64], recorder(&log)).unwrap();
    let rejected = t1.submit(vec![1; 32], recorder(&log)).unwrap_err();
    assert_eq!(rejected.error(), Error::AlreadySubmitted);
    assert_eq!(rejected.into_buffer(), vec![1; 32]);
    assert_eq!(t1.state(), TransferState::Submitted);
    assert_eq!(f.context.pending(), 1);

    f.dev.push_in(0x81, vec![7; 5]);
    f.context.run();

    let log = log.borrow();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].buffer.len(), 64);
    assert_eq!(log[0].data(), &[7; 5]);
    assert_balanced(&f);
}

#[test]
fn close_is_busy_while_submitted() {
    let f = setup();
    let t1 = Transfer::new(&f.device, 0x81, TransferType::Bulk, TIMEOUT).unwrap();
    let log = Log::default();

    t1.submit(vec![0; 64], recorder(&log)).unwrap();
    assert_eq!(f.device.close(), Err(Error::Busy));
    assert!(f.device.is_open());

    f.dev.push_in(0x81, vec![1]);
    f.context.run();
    assert_eq!(log.borrow().len(), 1);

    f.device.close().unwrap();
    assert!(!f.device.is_open());
    assert_eq!(f.sim.open_handles(), 0);
}

#[test]
fn disconnect_completes_pending_transfer() {
    let f = setup();
    let t1 = Transfer::new(&f.device, 0x81, TransferType::Bulk, Duration::ZERO).unwrap();
    let log = Log::default();

    t1.submit(vec![0; 64], recorder(&log)).unwrap();
    f.dev.disconnect();
    f.context.run();

    {
        let log = log.borrow();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].status, Err(TransferError::Disconnected));
        assert_eq!(log[0].actual_length, 0);
    }

    let rejected = t1.submit(vec![0; 64], recorder(&log)).unwrap_err();
    assert!(matches!(rejected.error(), Error::Submit(e) if e.code() == codes::ERROR_NO_DEVICE));
    assert_balanced(&f);
    f.device.close().unwrap();
    assert_eq!(
        f.device.open().unwrap_err().native_code(),
        Some(codes::ERROR_NO_DEVICE)
    );
}

#[test]
fn disconnect_reports_bytes_received_before_removal() {
    let f = setup();
    let t1 = Transfer::new(&f.device, 0x81, TransferType::Bulk, Duration::ZERO).unwrap();
    let t2 = Transfer::new(&f.device, 0x82, TransferType::Bulk, Duration::ZERO).unwrap();
    let log = Log::default();

    t1.submit(vec![0; 64], recorder(&log)).unwrap();
    t2.submit(vec![0; 64], recorder(&log)).unwrap();
    f.dev.disconnect_after(0x81, vec![0x5A; 12]);
    f.context.run();

    let log = log.borrow();
    assert_eq!(log.len(), 2);
    for c in log.iter() {
        assert_eq!(c.status, Err(TransferError::Disconnected));
        assert_eq!(c.buffer.len(), 64);
    }
    let partial = log.iter().find(|c| c.actual_length > 0).unwrap();
    assert_eq!(partial.actual_length, 12);
    assert_eq!(partial.data(), &[0x5A; 12][..]);
    assert_eq!(log.iter().filter(|c| c.actual_length == 0).count(), 1);
    assert_balanced(&f);
}

#[test]
fn cancel_never_submitted() {
    let f = setup();
    let t1 = Transfer::new(&f.device, 0x81, TransferType::Bulk, TIMEOUT).unwrap();

    assert_eq!(t1.cancel(), Ok(false));
    assert_eq!(t1.state(), TransferState::Idle);
    assert_eq!(f.context.handle_events(Some(Duration::from_millis(50))), 0);
    assert_balanced(&f);
}

#[test]
fn resubmit_from_callback_delivers_each_completion_once() {
    let f = setup();
    const PACKETS: u8 = 20;
    for i in 0..PACKETS {
        f.dev.push_in(0x81, vec![i; 8]);
    }

    fn read(t: &Transfer, seen: Rc<RefCell<Vec<u8>>>, remaining: u8) {
        t.submit(vec![0; 8], move |t, completion| {
            assert_eq!(completion.status, Ok(()));
            assert_eq!(t.state(), TransferState::Idle);
            seen.borrow_mut().push(completion.data()[0]);
            if remaining > 1 {
                read(t, seen, remaining - 1);
            }
        })
        .unwrap();
    }

    let seen = Rc::new(RefCell::new(Vec::new()));
    let t1 = Transfer::new(&f.device, 0x81, TransferType::Bulk, TIMEOUT).unwrap();
    read(&t1, seen.clone(), PACKETS);
    f.context.run();

    assert_eq!(*seen.borrow(), (0..PACKETS).collect::<Vec<_>>());
    assert_balanced(&f);
}

#[test]
fn keep_alive_counts_stay_balanced() {
    let f = setup();
    let transfers: Vec<Transfer> = [0x81, 0x82, 0x02, 0x83]
        .into_iter()
        .map(|ep| Transfer::new(&f.device, ep, TransferType::Bulk, Duration::ZERO).unwrap())
        .collect();
    let log = Log::default();

    for round in 0..10 {
        for (i, t) in transfers.iter().enumerate() {
            t.submit(vec![0; 16], recorder(&log)).unwrap();
            match (round + i) % 3 {
                0 => assert!(t.cancel().is_ok()),
                1 if t.endpoint() & 0x80 != 0 => f.dev.push_in(t.endpoint(), vec![1; 4]),
                _ => {}
            }
        }
        assert_eq!(f.context.pending(), transfers.len());
        assert_eq!(f.device.pending_transfers(), transfers.len());

        // Whatever is still waiting gets cancelled.
        for t in &transfers {
            let _ = t.cancel();
        }
        f.context.run();
        assert_balanced(&f);
    }

    assert_eq!(log.borrow().len(), 10 * transfers.len());
    f.device.close().unwrap();
}

#[test]
fn failed_submit_leaves_no_trace() {
    let f = setup();
    f.dev.fail_submit(0x81, Some(codes::ERROR_PIPE));
    let t1 = Transfer::new(&f.device, 0x81, TransferType::Bulk, TIMEOUT).unwrap();

    let rejected = t1.submit(vec![3; 10], |_, _| panic!("no completion expected")).unwrap_err();
    assert_eq!(rejected.error().native_code(), Some(codes::ERROR_PIPE));
    assert_eq!(rejected.into_buffer(), vec![3; 10]);
    assert_balanced(&f);
    f.device.close().unwrap();
}

#[test]
fn isochronous_is_not_supported() {
    let f = setup();
    let t1 = Transfer::new(&f.device, 0x84, TransferType::Isochronous, TIMEOUT).unwrap();
    let rejected = t1.submit(vec![0; 8], |_, _| unreachable!()).unwrap_err();
    assert_eq!(
        rejected.error().native_code(),
        Some(codes::ERROR_NOT_SUPPORTED)
    );
    assert_balanced(&f);
}

#[test]
fn submit_uses_handle_from_reopen() {
    let f = setup();
    let t1 = Transfer::new(&f.device, 0x02, TransferType::Bulk, TIMEOUT).unwrap();
    let log = Log::default();

    for i in 0..3u8 {
        f.device.close().unwrap();
        assert_eq!(
            t1.submit(vec![i], recorder(&log)).unwrap_err().error(),
            Error::NotOpen
        );
        f.device.open().unwrap();
        t1.submit(vec![i], recorder(&log)).unwrap();
        f.context.run();
    }

    assert_eq!(f.dev.take_out(0x02), vec![vec![0], vec![1], vec![2]]);
    assert_eq!(log.borrow().len(), 3);
}

#[test]
fn wait_idle_drives_completions() {
    let f = setup();
    f.dev.push_in(0x81, vec![9; 3]);
    let t1 = Transfer::new(&f.device, 0x81, TransferType::Bulk, TIMEOUT).unwrap();
    let t2 = Transfer::new(&f.device, 0x83, TransferType::Interrupt, Duration::from_millis(30))
        .unwrap();
    let log = Log::default();

    t1.submit(vec![0; 3], recorder(&log)).unwrap();
    t2.submit(vec![0; 3], recorder(&log)).unwrap();
    pollster::block_on(f.context.wait_idle());

    let log = log.borrow();
    assert_eq!(log.len(), 2);
    let statuses: Vec<_> = log.iter().map(|c| c.status).collect();
    assert!(statuses.contains(&Ok(())));
    assert!(statuses.contains(&Err(TransferError::TimedOut)));
    assert_balanced(&f);
}

#[pollster::test]
async fn wait_idle_returns_immediately_when_nothing_pending() {
    let f = setup();
    f.context.wait_idle().await;
    assert_eq!(f.context.pending(), 0);
}

#[test]
fn dispatch_pending_does_not_block() {
    let f = setup();
    let t1 = Transfer::new(&f.device, 0x81, TransferType::Bulk, Duration::ZERO).unwrap();
    let log = Log::default();

    t1.submit(vec![0; 8], recorder(&log)).unwrap();
    assert_eq!(f.context.dispatch_pending(), 0);
    assert!(log.borrow().is_empty());

    t1.cancel().unwrap();
    while f.context.pending() > 0 {
        f.context.handle_events(Some(Duration::from_millis(100)));
    }
    assert_eq!(log.borrow()[0].status, Err(TransferError::Cancelled));
}
