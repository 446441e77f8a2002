//! Level-triggered completion signal
//!
//! Once set, the signal stays set: blocking waiters and async subscribers
//! that arrive after `set()` return immediately.

use parking_lot::{Condvar, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::watch;

pub(crate) struct Signal {
    set: Mutex<bool>,
    cond: Condvar,
    watch: watch::Sender<bool>,
}

impl Signal {
    pub(crate) fn new() -> Self {
        let (watch, _) = watch::channel(false);
        Self {
            set: Mutex::new(false),
            cond: Condvar::new(),
            watch,
        }
    }

    /// Release every current and future waiter
    pub(crate) fn set(&self) {
        {
            let mut set = self.set.lock();
            *set = true;
            self.cond.notify_all();
        }
        self.watch.send_replace(true);
    }

    pub(crate) fn wait(&self) {
        let mut set = self.set.lock();
        while !*set {
            self.cond.wait(&mut set);
        }
    }

    /// Returns whether the signal was set before the deadline
    pub(crate) fn wait_timeout(&self, timeout: Duration) -> bool {
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            self.wait();
            return true;
        };

        let mut set = self.set.lock();
        while !*set {
            if self.cond.wait_until(&mut set, deadline).timed_out() {
                return *set;
            }
        }
        true
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<bool> {
        self.watch.subscribe()
    }
}
