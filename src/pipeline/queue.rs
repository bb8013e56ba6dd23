//! # Bounded Record Queues
//!
//! The intake and outtake queues between pipeline stages. Each queue is a
//! bounded crossbeam channel of single records plus:
//!
//! - a one-shot readiness signal fired by the first successful enqueue, which
//!   the orchestrator waits on before starting the consuming stage
//! - a retry lane for records requeued after a rejected write; it is never full,
//!   so a pusher can always hand a record back even when the channel is saturated

use crossbeam::channel::{self, Receiver, RecvTimeoutError, SendTimeoutError, Sender};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::debug;

use crate::models::Record;

/// One-shot "first item arrived" notification
#[derive(Debug, Default)]
struct ReadySignal {
    fired: AtomicBool,
    lock: Mutex<()>,
    condvar: Condvar,
}

impl ReadySignal {
    fn fire(&self) {
        if self.fired.load(Ordering::Acquire) {
            return;
        }
        let _guard = self.lock.lock();
        self.fired.store(true, Ordering::Release);
        self.condvar.notify_all();
    }

    fn is_fired(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }

    fn wait(&self, timeout: Duration) -> bool {
        if self.is_fired() {
            return true;
        }
        let mut guard = self.lock.lock();
        if !self.is_fired() {
            self.condvar.wait_for(&mut guard, timeout);
        }
        self.is_fired()
    }
}

/// Capacity-bounded FIFO of records shared by a producer and a consumer stage
#[derive(Debug)]
pub struct RecordQueue {
    name: &'static str,
    capacity: usize,
    sender: Sender<Record>,
    receiver: Receiver<Record>,
    retry_lane: Mutex<VecDeque<Record>>,
    ready: ReadySignal,
}

impl RecordQueue {
    pub fn new(name: &'static str, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, receiver) = channel::bounded(capacity);
        Self {
            name,
            capacity,
            sender,
            receiver,
            retry_lane: Mutex::new(VecDeque::new()),
            ready: ReadySignal::default(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Records currently buffered, including requeued ones
    pub fn len(&self) -> usize {
        self.receiver.len() + self.retry_lane.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Enqueue, waiting up to `timeout` for space; hands the record back on timeout
    pub fn put(&self, record: Record, timeout: Duration) -> Result<(), Record> {
        match self.sender.send_timeout(record, timeout) {
            Ok(()) => {
                self.ready.fire();
                Ok(())
            }
            Err(SendTimeoutError::Timeout(record)) | Err(SendTimeoutError::Disconnected(record)) => {
                Err(record)
            }
        }
    }

    /// Enqueue, blocking while the queue is full
    ///
    /// Wakes every `wait` to check `should_stop`; returns `false` if it gave up.
    pub fn put_blocking(
        &self,
        mut record: Record,
        wait: Duration,
        should_stop: impl Fn() -> bool,
    ) -> bool {
        loop {
            match self.put(record, wait) {
                Ok(()) => return true,
                Err(returned) => {
                    if should_stop() {
                        return false;
                    }
                    debug!(
                        queue = self.name,
                        capacity = self.capacity,
                        "QUEUE: Full, waiting for consumers"
                    );
                    record = returned;
                }
            }
        }
    }

    /// Dequeue without waiting
    pub fn try_get(&self) -> Option<Record> {
        if let Some(record) = self.retry_lane.lock().pop_front() {
            return Some(record);
        }
        self.receiver.try_recv().ok()
    }

    /// Dequeue, waiting up to `timeout`; `None` means nothing arrived in time
    pub fn get(&self, timeout: Duration) -> Option<Record> {
        if let Some(record) = self.try_get() {
            return Some(record);
        }
        match self.receiver.recv_timeout(timeout) {
            Ok(record) => Some(record),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                self.retry_lane.lock().pop_front()
            }
        }
    }

    /// Return a record for another attempt; never blocks
    pub fn requeue(&self, record: Record) {
        match self.sender.try_send(record) {
            Ok(()) => {}
            Err(err) => self.retry_lane.lock().push_back(err.into_inner()),
        }
        self.ready.fire();
    }

    /// Whether anything was ever enqueued
    pub fn is_ready(&self) -> bool {
        self.ready.is_fired()
    }

    /// Wait up to `timeout` for the first enqueue
    pub fn wait_ready(&self, timeout: Duration) -> bool {
        self.ready.wait(timeout)
    }
}

/// The intake (pre-transform) and outtake (pre-write) queues of one run
#[derive(Debug)]
pub struct QueuePair {
    pub intake: RecordQueue,
    pub outtake: RecordQueue,
}

impl QueuePair {
    pub fn new(capacity_per_queue: usize) -> Self {
        Self {
            intake: RecordQueue::new("intake", capacity_per_queue),
            outtake: RecordQueue::new("outtake", capacity_per_queue),
        }
    }
}
