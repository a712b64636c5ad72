//! Thread that drives libusb's event handling.
//!
//! libusb runs transfer completion callbacks from inside
//! `libusb_handle_events`, so some thread has to call it in a loop for
//! transfers to ever finish. It is launched when the first transfer is
//! submitted and stopped when the backend is dropped.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use log::{debug, warn};
use once_cell::sync::OnceCell;
use rusb::UsbContext;

/// How long one `handle_events` call may block before the stop flag is
/// checked again.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

pub(super) struct EventThread {
    context: rusb::Context,
    stop: Arc<AtomicBool>,
    thread: OnceCell<JoinHandle<()>>,
}

impl EventThread {
    pub(super) fn new(context: rusb::Context) -> Self {
        EventThread {
            context,
            stop: Arc::new(AtomicBool::new(false)),
            thread: OnceCell::new(),
        }
    }

    pub(super) fn ensure_started(&self) {
        self.thread.get_or_init(|| {
            debug!("Starting libusb event thread");
            let context = self.context.clone();
            let stop = self.stop.clone();
            thread::spawn(move || event_loop(&context, &stop))
        });
    }
}

impl Drop for EventThread {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("libusb event thread panicked");
            }
        }
    }
}

fn event_loop(context: &rusb::Context, stop: &AtomicBool) {
    while !stop.load(Ordering::Acquire) {
        match context.handle_events(Some(POLL_INTERVAL)) {
            Ok(()) => {}
            Err(rusb::Error::Interrupted) => debug!("libusb event handling interrupted"),
            Err(e) => {
                warn!("Error handling libusb events: {e}");
                thread::sleep(POLL_INTERVAL);
            }
        }
    }
    debug!("libusb event thread stopped");
}
