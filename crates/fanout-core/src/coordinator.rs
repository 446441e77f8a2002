//! Fan-in coordinator for one fan-out operation
//!
//! A [`FanoutCoordinator`] is sized to the number of sub-requests before any
//! of them is issued. Each sub-request reports exactly once, from whatever
//! thread finishes it. The report that brings the outstanding count to zero
//! sets the completion latch, releases waiters, and runs the completion
//! callback; no other report can.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::signal::Signal;
use crate::{Error, FanoutStatus, OperationId, Result, SlotIndex};

/// Callback run once when the last sub-request reports
pub type CompletionCallback<T, S> = Box<dyn FnOnce(&FanoutCoordinator<T, S>) + Send + 'static>;

/// Exactly-once join over a fixed set of concurrent sub-requests
pub struct FanoutCoordinator<T, S = ()> {
    /// Operation identifier
    id: OperationId,

    /// Fan-out count, fixed at construction
    expected: usize,

    /// Sub-requests still outstanding
    remaining: AtomicUsize,

    /// One write-once slot per sub-request
    slots: Box<[OnceLock<T>]>,

    /// Next slot handed out by `report_next`
    cursor: AtomicUsize,

    /// One-shot completion latch
    completed: AtomicBool,

    /// Wait primitive, created by the first waiter that needs one.
    /// The lock also orders the latch store against signal creation.
    signal: Mutex<Option<Arc<Signal>>>,

    /// Completion callback, taken by the completing reporter
    on_complete: Mutex<Option<CompletionCallback<T, S>>>,

    /// Caller state handed back through the callback
    state: S,

    created_at: DateTime<Utc>,
    completed_at: OnceLock<DateTime<Utc>>,
}

/// Builder for [`FanoutCoordinator`]
pub struct FanoutBuilder<T, S = ()> {
    expected: usize,
    state: S,
    id: Option<OperationId>,
    on_complete: Option<CompletionCallback<T, S>>,
}

impl<T, S> FanoutBuilder<T, S> {
    /// Use a caller-chosen operation id instead of a fresh one
    pub fn id(mut self, id: OperationId) -> Self {
        self.id = Some(id);
        self
    }

    /// Register the completion callback
    pub fn on_complete<F>(mut self, callback: F) -> Self
    where
        F: FnOnce(&FanoutCoordinator<T, S>) + Send + 'static,
    {
        self.on_complete = Some(Box::new(callback));
        self
    }

    /// Build the coordinator
    ///
    /// A fan-out of zero sub-requests is complete before this returns,
    /// and its callback has already run.
    pub fn build(self) -> Arc<FanoutCoordinator<T, S>> {
        let coord = Arc::new(FanoutCoordinator {
            id: self.id.unwrap_or_else(Uuid::new_v4),
            expected: self.expected,
            remaining: AtomicUsize::new(self.expected),
            slots: (0..self.expected).map(|_| OnceLock::new()).collect(),
            cursor: AtomicUsize::new(0),
            completed: AtomicBool::new(false),
            signal: Mutex::new(None),
            on_complete: Mutex::new(self.on_complete),
            state: self.state,
            created_at: Utc::now(),
            completed_at: OnceLock::new(),
        });

        debug!(
            operation_id = %coord.id,
            expected = coord.expected,
            "Fan-out created"
        );

        if coord.expected == 0 {
            coord.complete();
        }

        coord
    }
}

impl<T> FanoutCoordinator<T, ()> {
    /// Create a coordinator with no caller state and no callback
    pub fn new(expected: usize) -> Arc<Self> {
        Self::builder(expected).build()
    }

    /// Start building a coordinator with no caller state
    pub fn builder(expected: usize) -> FanoutBuilder<T, ()> {
        Self::builder_with_state(expected, ())
    }
}

impl<T, S> FanoutCoordinator<T, S> {
    /// Start building a coordinator that carries `state` to its callback
    pub fn builder_with_state(expected: usize, state: S) -> FanoutBuilder<T, S> {
        FanoutBuilder {
            expected,
            state,
            id: None,
            on_complete: None,
        }
    }

    /// Report the result of sub-request `index`
    ///
    /// Each slot accepts exactly one result. Reporting outside the slot
    /// range or twice into the same slot is rejected without touching
    /// the outstanding count.
    pub fn report(&self, index: SlotIndex, result: T) -> Result<()> {
        let slot = self.slots.get(index).ok_or_else(|| {
            error!(
                operation_id = %self.id,
                index,
                expected = self.expected,
                "Report outside fan-out slot range"
            );
            Error::SlotOutOfRange {
                operation_id: self.id,
                index,
                expected: self.expected,
            }
        })?;

        if slot.set(result).is_err() {
            error!(operation_id = %self.id, index, "Duplicate report for fan-out slot");
            return Err(Error::DuplicateReport {
                operation_id: self.id,
                index,
            });
        }

        self.record_report(index)
    }

    /// Report a result into the next unclaimed slot, in arrival order
    ///
    /// Do not mix with [`report`](Self::report) on the same coordinator.
    pub fn report_next(&self, result: T) -> Result<SlotIndex> {
        let index = self.cursor.fetch_add(1, Ordering::AcqRel);
        if index >= self.expected {
            error!(
                operation_id = %self.id,
                expected = self.expected,
                "Fan-out over-reported"
            );
            return Err(Error::OverReported {
                operation_id: self.id,
                expected: self.expected,
            });
        }

        self.report(index, result)?;
        Ok(index)
    }

    fn record_report(&self, index: SlotIndex) -> Result<()> {
        let previous = self
            .remaining
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |r| r.checked_sub(1))
            .map_err(|_| Error::OverReported {
                operation_id: self.id,
                expected: self.expected,
            })?;

        debug!(
            operation_id = %self.id,
            index,
            remaining = previous - 1,
            "Sub-request reported"
        );

        if previous == 1 {
            self.complete();
        }
        Ok(())
    }

    /// Completion transition; runs once, on the reporter that reached zero
    fn complete(&self) {
        let _ = self.completed_at.set(Utc::now());

        let signal = {
            let signal = self.signal.lock();
            self.completed.store(true, Ordering::Release);
            signal.clone()
        };

        if let Some(signal) = signal {
            signal.set();
        }

        info!(
            operation_id = %self.id,
            expected = self.expected,
            "Fan-out completed"
        );

        let callback = self.on_complete.lock().take();
        if let Some(callback) = callback {
            callback(self);
        }
    }

    /// Returns the wait signal, or None if the latch is already set
    fn signal_for_wait(&self) -> Option<Arc<Signal>> {
        if self.is_completed() {
            return None;
        }

        let mut signal = self.signal.lock();
        if self.completed.load(Ordering::Acquire) {
            return None;
        }
        Some(Arc::clone(
            signal.get_or_insert_with(|| Arc::new(Signal::new())),
        ))
    }

    /// Block until every sub-request has reported
    pub fn wait(&self) {
        if let Some(signal) = self.signal_for_wait() {
            signal.wait();
        }
    }

    /// Block until completion or until `timeout` elapses
    ///
    /// Returns whether the fan-out completed in time.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        match self.signal_for_wait() {
            Some(signal) => signal.wait_timeout(timeout),
            None => true,
        }
    }

    /// Wait for completion without blocking the async runtime
    pub async fn wait_async(&self) {
        if let Some(signal) = self.signal_for_wait() {
            let mut rx = signal.subscribe();
            let _ = rx.wait_for(|done| *done).await;
        }
    }

    /// Async wait bounded by `timeout`; returns whether the fan-out completed
    pub async fn wait_async_timeout(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.wait_async()).await.is_ok()
    }

    /// Non-blocking read of the completion latch
    pub fn is_completed(&self) -> bool {
        self.completed.load(Ordering::Acquire)
    }

    pub fn id(&self) -> OperationId {
        self.id
    }

    pub fn expected(&self) -> usize {
        self.expected
    }

    pub fn remaining(&self) -> usize {
        self.remaining.load(Ordering::Acquire)
    }

    pub fn reported(&self) -> usize {
        self.expected - self.remaining()
    }

    /// Caller state supplied at construction
    pub fn state(&self) -> &S {
        &self.state
    }

    /// Result in slot `index`, if that sub-request has reported
    pub fn get(&self, index: SlotIndex) -> Option<&T> {
        self.slots.get(index).and_then(OnceLock::get)
    }

    /// All results in slot order, once the fan-out has completed
    pub fn results(&self) -> Option<Vec<&T>> {
        if !self.is_completed() {
            return None;
        }
        self.slots.iter().map(OnceLock::get).collect()
    }

    /// Take ownership of the results from the last handle to a completed fan-out
    ///
    /// Hands the coordinator back if it is incomplete or still shared.
    pub fn try_into_results(this: Arc<Self>) -> std::result::Result<Vec<T>, Arc<Self>> {
        if !this.is_completed() {
            return Err(this);
        }
        let coord = Arc::try_unwrap(this)?;
        Ok(coord
            .slots
            .into_vec()
            .into_iter()
            .filter_map(OnceLock::into_inner)
            .collect())
    }

    /// Snapshot of the fan-out's progress
    pub fn status(&self) -> FanoutStatus {
        let remaining = self.remaining();
        FanoutStatus {
            id: self.id,
            expected: self.expected,
            reported: self.expected - remaining,
            remaining,
            completed: self.is_completed(),
            created_at: self.created_at,
            completed_at: self.completed_at.get().copied(),
        }
    }
}

impl<T, S> fmt::Debug for FanoutCoordinator<T, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FanoutCoordinator")
            .field("id", &self.id)
            .field("expected", &self.expected)
            .field("remaining", &self.remaining())
            .field("completed", &self.is_completed())
            .finish()
    }
}
