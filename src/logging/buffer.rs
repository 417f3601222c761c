// SPDX-License-Identifier: Apache-2.0 OR MIT
// Bounded multi-producer / single-consumer event buffer
//
// Producers push lock-free into an ArrayQueue. The mutex + condvars are only
// touched while someone is parked: a successful push/pop checks an atomic
// waiter count and takes the lock to notify only when it is non-zero.

use super::LogEvent;
use crossbeam_queue::ArrayQueue;
use std::sync::atomic::{fence, AtomicBool, AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Upper bound on a single condvar park; waiters re-check state after it
const PARK_SLICE: Duration = Duration::from_millis(50);

/// Why an enqueue did not happen. Both variants hand the event back.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum EnqueueError {
    #[error("event buffer is full")]
    Full(LogEvent),

    #[error("event buffer is closed")]
    Closed(LogEvent),
}

impl EnqueueError {
    /// Recover the event that could not be enqueued
    pub fn into_event(self) -> LogEvent {
        match self {
            EnqueueError::Full(event) | EnqueueError::Closed(event) => event,
        }
    }
}

/// Fixed-capacity FIFO of log events
///
/// Any number of threads may enqueue. Exactly one consumer should dequeue;
/// the backpressure controller may additionally evict the head when the
/// DROP_OLDEST policy is active.
pub struct BoundedEventBuffer {
    queue: ArrayQueue<LogEvent>,
    capacity: usize,
    closed: AtomicBool,
    wait_lock: Mutex<()>,
    not_empty: Condvar,
    not_full: Condvar,
    /// Parked on `not_empty` (the consumer)
    consumers_waiting: AtomicUsize,
    /// Parked on `not_full` (blocked producers)
    producers_waiting: AtomicUsize,
}

impl BoundedEventBuffer {
    /// Create a new buffer
    ///
    /// # Panics
    /// Panics if capacity is zero (rejected earlier by config validation)
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "Capacity must be non-zero");

        Self {
            queue: ArrayQueue::new(capacity),
            capacity,
            closed: AtomicBool::new(false),
            wait_lock: Mutex::new(()),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            consumers_waiting: AtomicUsize::new(0),
            producers_waiting: AtomicUsize::new(0),
        }
    }

    /// Enqueue without blocking
    pub fn try_enqueue(&self, event: LogEvent) -> Result<(), EnqueueError> {
        if self.is_closed() {
            return Err(EnqueueError::Closed(event));
        }

        match self.queue.push(event) {
            Ok(()) => {
                self.signal(&self.not_empty, &self.consumers_waiting);
                Ok(())
            }
            Err(event) => Err(EnqueueError::Full(event)),
        }
    }

    /// Enqueue, waiting for room
    ///
    /// `timeout = None` waits until room is available or the buffer is
    /// closed. On timeout the event is returned as `Full`.
    pub fn enqueue_blocking(
        &self,
        event: LogEvent,
        timeout: Option<Duration>,
    ) -> Result<(), EnqueueError> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut event = event;

        loop {
            match self.try_enqueue(event) {
                Ok(()) => return Ok(()),
                Err(EnqueueError::Closed(e)) => return Err(EnqueueError::Closed(e)),
                Err(EnqueueError::Full(e)) => event = e,
            }

            let slice = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(EnqueueError::Full(event));
                    }
                    (deadline - now).min(PARK_SLICE)
                }
                None => PARK_SLICE,
            };

            self.park(&self.not_full, &self.producers_waiting, slice, || {
                self.queue.is_full()
            });
        }
    }

    /// Push, evicting the oldest event if the buffer is full
    ///
    /// Returns the evicted event. Never fails; a closed buffer still accepts
    /// so that events racing with shutdown are drained rather than lost.
    pub fn force_enqueue(&self, event: LogEvent) -> Option<LogEvent> {
        let evicted = self.queue.force_push(event);
        self.signal(&self.not_empty, &self.consumers_waiting);
        evicted
    }

    /// Dequeue without blocking
    pub fn try_dequeue(&self) -> Option<LogEvent> {
        let event = self.queue.pop()?;
        self.signal(&self.not_full, &self.producers_waiting);
        Some(event)
    }

    /// Dequeue, blocking until an event is available
    ///
    /// Returns `None` only once the buffer is closed and fully drained.
    pub fn dequeue(&self) -> Option<LogEvent> {
        loop {
            if let Some(event) = self.try_dequeue() {
                return Some(event);
            }
            if self.is_closed() {
                // Producers may have raced the close; drain what is left
                return self.try_dequeue();
            }
            self.park_consumer(PARK_SLICE);
        }
    }

    /// Dequeue, blocking for at most `timeout`
    pub fn dequeue_timeout(&self, timeout: Duration) -> Option<LogEvent> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(event) = self.try_dequeue() {
                return Some(event);
            }
            let now = Instant::now();
            if self.is_closed() || now >= deadline {
                return None;
            }
            self.park_consumer((deadline - now).min(PARK_SLICE));
        }
    }

    /// Stop accepting new events and wake every waiter
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        let _guard = self.lock();
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Number of buffered events
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.queue.is_full()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Fill level as an integer percentage (0-100)
    pub fn utilization_percent(&self) -> u8 {
        ((self.len() * 100) / self.capacity).min(100) as u8
    }

    fn park_consumer(&self, slice: Duration) {
        self.park(&self.not_empty, &self.consumers_waiting, slice, || {
            self.queue.is_empty()
        });
    }

    /// Wait on `condvar` for at most `slice` while `blocked()` holds
    ///
    /// The waiter count is raised under the lock and fenced before the
    /// queue is re-checked, pairing with the fence in [`Self::signal`]:
    /// either the waiter sees the new state or the signaller sees the waiter.
    fn park(
        &self,
        condvar: &Condvar,
        waiters: &AtomicUsize,
        slice: Duration,
        blocked: impl Fn() -> bool,
    ) {
        let guard = self.lock();
        waiters.fetch_add(1, Ordering::SeqCst);
        fence(Ordering::SeqCst);
        if blocked() && !self.is_closed() {
            let _ = condvar.wait_timeout(guard, slice);
        }
        waiters.fetch_sub(1, Ordering::SeqCst);
    }

    /// Notify one parked waiter, if any
    ///
    /// The lock is taken only when someone is parked, so that a waiter that
    /// has just checked the queue cannot miss the wakeup.
    fn signal(&self, condvar: &Condvar, waiters: &AtomicUsize) {
        fence(Ordering::SeqCst);
        if waiters.load(Ordering::SeqCst) == 0 {
            return;
        }
        let _guard = self.lock();
        condvar.notify_one();
    }

    #[cfg(test)]
    fn parked(&self) -> usize {
        self.consumers_waiting.load(Ordering::SeqCst)
            + self.producers_waiting.load(Ordering::SeqCst)
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        // The guarded unit value cannot be left inconsistent by a panic
        self.wait_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for BoundedEventBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundedEventBuffer")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .field("closed", &self.is_closed())
            .finish()
    }
}
