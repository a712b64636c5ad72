//! Consumer-side delivery of queued completions.

use log::error;
use slab::Slab;

use crate::{context::ContextInner, Transfer};

/// Transfers with an outstanding submission.
///
/// The slab entry is the transfer's keep-alive reference: it holds the
/// transfer (and through it the buffer, device and context) alive while the
/// backend may still use them, even if the caller dropped every handle. Its
/// key is the opaque back-reference carried by the completion record.
pub(crate) struct Dispatcher {
    in_flight: Slab<Transfer>,
}

impl Dispatcher {
    pub(crate) fn new() -> Self {
        Dispatcher {
            in_flight: Slab::new(),
        }
    }

    pub(crate) fn register(&mut self, transfer: Transfer) -> usize {
        self.in_flight.insert(transfer)
    }

    pub(crate) fn unregister(&mut self, key: usize) -> Option<Transfer> {
        self.in_flight.try_remove(key)
    }

    fn resolve(&self, key: usize) -> Option<Transfer> {
        self.in_flight.get(key).cloned()
    }

    pub(crate) fn len(&self) -> usize {
        self.in_flight.len()
    }
}

/// Drain the completion queue and run each transfer's completion handling.
///
/// Only the records queued when this is called are delivered; completions of
/// transfers resubmitted from a callback wait for the next call.
pub(crate) fn dispatch(context: &ContextInner) -> usize {
    let records = context.queue.drain();
    let count = records.len();

    for record in records {
        // Keep the borrow short: the callback may submit and register again.
        let transfer = context.dispatcher.borrow().resolve(record.key);
        match transfer {
            Some(transfer) => transfer.handle_completion(record),
            None => error!(
                "Completion for unknown transfer key {} (status {})",
                record.key, record.status
            ),
        }
    }

    count
}
