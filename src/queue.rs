//! Handoff of finished transfers from the backend's event thread to the
//! consumer thread.
//!
//! The backend invokes its completion callbacks on a thread it owns (libusb's
//! event thread, or the simulator's worker). Those callbacks must not touch
//! any [`Transfer`][crate::Transfer] or [`Device`][crate::Device] state: all
//! of that lives on the consumer thread without locks. Instead, the callback
//! posts an immutable [`CompletionRecord`] through a [`CompletionSender`] and
//! returns. The consumer thread is woken, drains the queue and dispatches the
//! records.

use std::{
    cell::Cell,
    collections::VecDeque,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    task::{Context, Poll},
    thread::{self, Thread},
    time::{Duration, Instant},
};

use atomic_waker::AtomicWaker;

/// Result of a finished low-level transfer.
///
/// Produced on the backend's thread, never modified after it is posted, and
/// consumed exactly once on the consumer thread.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) struct CompletionRecord {
    pub(crate) key: usize,
    pub(crate) status: i32,
    pub(crate) actual_length: usize,
}

/// Wakes the consumer thread, whether it is parked in
/// [`CompletionQueue::wait`] or polled by an async executor.
struct Notify {
    consumer: Thread,
    waker: AtomicWaker,
}

impl Notify {
    fn new() -> Self {
        Notify {
            consumer: thread::current(),
            waker: AtomicWaker::new(),
        }
    }

    fn subscribe(&self, cx: &mut Context) {
        self.waker.register(cx.waker());
    }

    fn notify(&self) {
        self.waker.wake();
        self.consumer.unpark();
    }
}

struct Shared {
    records: Mutex<VecDeque<CompletionRecord>>,
    notify: Notify,
}

impl Shared {
    fn records(&self) -> MutexGuard<'_, VecDeque<CompletionRecord>> {
        // Records are plain data, so a panic while holding the lock can't
        // leave them half-written.
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Producer side of the [`CompletionQueue`].
///
/// Cheap to clone and safe to use from any thread, including threads owned by
/// the native library.
#[derive(Clone)]
pub(crate) struct CompletionSender {
    shared: Arc<Shared>,
}

impl CompletionSender {
    /// Hand a finished record to the consumer thread and wake it.
    ///
    /// Does not wait for the consumer. Records posted from one thread are
    /// delivered in the order they were posted.
    pub(crate) fn post(&self, record: CompletionRecord) {
        self.shared.records().push_back(record);
        self.shared.notify.notify();
    }
}

/// Consumer side of the completion handoff, owned by a
/// [`Context`][crate::Context].
///
/// Besides the record queue it holds the keep-alive count: the number of
/// submitted transfers whose completion has not been delivered yet.
pub(crate) struct CompletionQueue {
    shared: Arc<Shared>,
    refs: Cell<usize>,
}

impl CompletionQueue {
    /// Create a queue whose consumer is the current thread.
    pub(crate) fn new() -> Self {
        CompletionQueue {
            shared: Arc::new(Shared {
                records: Mutex::new(VecDeque::new()),
                notify: Notify::new(),
            }),
            refs: Cell::new(0),
        }
    }

    pub(crate) fn sender(&self) -> CompletionSender {
        CompletionSender {
            shared: self.shared.clone(),
        }
    }

    pub(crate) fn add_ref(&self) {
        self.refs.set(self.refs.get() + 1);
    }

    pub(crate) fn unref(&self) {
        let refs = self.refs.get();
        debug_assert!(refs > 0, "unbalanced completion queue unref");
        self.refs.set(refs.saturating_sub(1));
    }

    /// Number of completions still expected.
    pub(crate) fn refs(&self) -> usize {
        self.refs.get()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.shared.records().is_empty()
    }

    /// Take every record queued so far.
    pub(crate) fn drain(&self) -> VecDeque<CompletionRecord> {
        std::mem::take(&mut *self.shared.records())
    }

    /// Block the consumer thread until a record is queued or the timeout
    /// elapses. Returns whether records are available.
    pub(crate) fn wait(&self, timeout: Option<Duration>) -> bool {
        debug_assert_eq!(
            thread::current().id(),
            self.shared.notify.consumer.id(),
            "completion queue waited on from a thread other than its consumer"
        );

        let deadline = timeout.map(|t| Instant::now() + t);
        loop {
            if !self.is_empty() {
                return true;
            }
            match deadline {
                None => thread::park(),
                Some(deadline) => {
                    let Some(remaining) = deadline.checked_duration_since(Instant::now()) else {
                        return false;
                    };
                    thread::park_timeout(remaining);
                }
            }
        }
    }

    /// Register the task for wakeup and report whether records are available.
    pub(crate) fn poll_ready(&self, cx: &mut Context) -> Poll<()> {
        self.shared.notify.subscribe(cx);
        if self.is_empty() {
            Poll::Pending
        } else {
            Poll::Ready(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(key: usize) -> CompletionRecord {
        CompletionRecord {
            key,
            status: 0,
            actual_length: key * 2,
        }
    }

    #[test]
    fn drains_in_post_order() {
        let queue = CompletionQueue::new();
        let sender = queue.sender();
        for key in 0..5 {
            sender.post(record(key));
        }

        let drained: Vec<usize> = queue.drain().into_iter().map(|r| r.key).collect();
        assert_eq!(drained, vec![0, 1, 2, 3, 4]);
        assert!(queue.is_empty());
    }

    #[test]
    fn post_from_other_thread_wakes_consumer() {
        let queue = CompletionQueue::new();
        let sender = queue.sender();

        let producer = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            for key in 0..100 {
                sender.post(record(key));
            }
        });

        let mut received = Vec::new();
        while received.len() < 100 {
            assert!(queue.wait(Some(Duration::from_secs(5))));
            received.extend(queue.drain().into_iter().map(|r| r.key));
        }
        producer.join().unwrap();

        assert_eq!(received, (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn wait_times_out_when_nothing_posted() {
        let queue = CompletionQueue::new();
        let start = Instant::now();
        assert!(!queue.wait(Some(Duration::from_millis(30))));
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn keep_alive_refs() {
        let queue = CompletionQueue::new();
        queue.add_ref();
        queue.add_ref();
        assert_eq!(queue.refs(), 2);
        queue.unref();
        queue.unref();
        assert_eq!(queue.refs(), 0);
    }

    #[test]
    fn per_producer_order_with_many_producers() {
        let queue = CompletionQueue::new();
        let producers: Vec<_> = (0..4)
            .map(|p| {
                let sender = queue.sender();
                thread::spawn(move || {
                    for i in 0..50 {
                        sender.post(record(p * 1000 + i));
                    }
                })
            })
            .collect();
        for p in producers {
            p.join().unwrap();
        }

        let keys: Vec<usize> = queue.drain().into_iter().map(|r| r.key).collect();
        assert_eq!(keys.len(), 200);
        for p in 0..4 {
            let mine: Vec<usize> = keys.iter().copied().filter(|k| k / 1000 == p).collect();
            assert_eq!(mine, (0..50).map(|i| p * 1000 + i).collect::<Vec<_>>());
        }
    }
}
