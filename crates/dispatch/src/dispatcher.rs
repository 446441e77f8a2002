//! Fan-out dispatcher
//!
//! Issues one sub-request per endpoint on the dispatch runtime and reports
//! each outcome into the fan-out's coordinator. Every issued sub-request
//! reports exactly once: with the transport's answer, a transport error,
//! a timeout, a cancellation, or, if its task is dropped first, as
//! abandoned.

use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use fanout_core::{
    DispatchConfig, Error, FanoutCoordinator, FanoutStatus, OperationId, Result, SlotIndex,
};
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, error, info, warn};

use crate::runtime::{ShutdownReceiver, ShutdownSender};
use crate::{Endpoint, Fanout, SubResponse, Transport, TransportError};

/// Progress source for the in-flight registry
trait InFlight: Send + Sync {
    fn status(&self) -> FanoutStatus;
    fn is_completed(&self) -> bool;
}

impl<T, S> InFlight for FanoutCoordinator<T, S>
where
    T: Send + Sync,
    S: Send + Sync,
{
    fn status(&self) -> FanoutStatus {
        FanoutCoordinator::status(self)
    }

    fn is_completed(&self) -> bool {
        FanoutCoordinator::is_completed(self)
    }
}

type InFlightRegistry = DashMap<OperationId, Weak<dyn InFlight>>;

/// Issues fan-outs through a transport
pub struct FanoutDispatcher<T: Transport> {
    /// Transport carrying each sub-request
    transport: Arc<T>,

    /// Runtime the sub-request tasks run on
    handle: Handle,

    /// Dispatch settings
    config: DispatchConfig,

    /// Fan-outs issued by this dispatcher and not yet complete
    in_flight: Arc<InFlightRegistry>,

    /// Serializes the in-flight limit check with registration
    admission: Mutex<()>,

    /// Cancels outstanding sub-requests of this dispatcher
    cancel_tx: ShutdownSender,

    /// Runtime-wide shutdown signal, if attached to a DispatchRuntime
    shutdown_tx: Option<ShutdownSender>,
}

impl<T: Transport> FanoutDispatcher<T> {
    /// Create a dispatcher that spawns sub-requests onto `handle`
    pub fn new(transport: Arc<T>, handle: Handle, config: DispatchConfig) -> Self {
        let (cancel_tx, _) = broadcast::channel(1);
        Self {
            transport,
            handle,
            config,
            in_flight: Arc::new(DashMap::new()),
            admission: Mutex::new(()),
            cancel_tx,
            shutdown_tx: None,
        }
    }

    /// Create a dispatcher on the runtime the caller is running in
    pub fn from_current(transport: T, config: DispatchConfig) -> Result<Self> {
        let handle = Handle::try_current().map_err(|e| Error::RuntimeUnavailable {
            message: e.to_string(),
        })?;
        Ok(Self::new(Arc::new(transport), handle, config))
    }

    /// Also cancel sub-requests when `shutdown_tx` fires
    pub fn with_shutdown(mut self, shutdown_tx: ShutdownSender) -> Self {
        self.shutdown_tx = Some(shutdown_tx);
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Issue `request` to every endpoint
    pub fn dispatch(
        &self,
        endpoints: Vec<Endpoint>,
        request: T::Request,
    ) -> Result<Fanout<T::Response>> {
        self.dispatch_with(endpoints, request, (), |_| {})
    }

    /// Issue `request` to every endpoint, running `on_complete` with `state`
    /// once the last sub-request reports
    ///
    /// # Errors
    /// Returns `Error::TooManyInFlight` if `max_in_flight` fan-outs are
    /// already outstanding; nothing is sent in that case.
    pub fn dispatch_with<S, F>(
        &self,
        endpoints: Vec<Endpoint>,
        request: T::Request,
        state: S,
        on_complete: F,
    ) -> Result<Fanout<T::Response, S>>
    where
        S: Send + Sync + 'static,
        F: FnOnce(&FanoutCoordinator<SubResponse<T::Response>, S>) + Send + 'static,
    {
        let registry = Arc::clone(&self.in_flight);
        let fanout = FanoutCoordinator::<SubResponse<T::Response>, S>::builder_with_state(
            endpoints.len(),
            state,
        )
        .on_complete(move |coord| {
            registry.remove(&coord.id());
            on_complete(coord);
        })
        .build();

        // An empty fan-out is already complete and never counts as in flight.
        // Otherwise nothing has been spawned yet, so a rejected coordinator
        // is dropped without ever reporting or running its callback.
        if !fanout.is_completed() {
            let _admission = self.admission.lock();
            let limit = self.config.max_in_flight;
            if self.in_flight() >= limit {
                warn!(limit, "Rejecting fan-out, in-flight limit reached");
                return Err(Error::TooManyInFlight { limit });
            }
            let tracked: Arc<dyn InFlight> = fanout.clone();
            self.in_flight.insert(fanout.id(), Arc::downgrade(&tracked));
        }

        info!(
            operation_id = %fanout.id(),
            transport = self.transport.name(),
            endpoints = endpoints.len(),
            "Dispatching fan-out"
        );

        let request = Arc::new(request);
        let timeout = self.config.sub_request_timeout;
        for (slot, endpoint) in endpoints.into_iter().enumerate() {
            let guard = ReportGuard::new(Arc::clone(&fanout), slot, endpoint);
            let transport = Arc::clone(&self.transport);
            let request = Arc::clone(&request);
            let cancel_rx = self.cancel_tx.subscribe();
            let shutdown_rx = self.shutdown_tx.as_ref().map(|tx| tx.subscribe());

            self.handle.spawn(async move {
                let outcome = tokio::select! {
                    res = tokio::time::timeout(timeout, transport.send(&guard.endpoint, &request)) => {
                        match res {
                            Ok(outcome) => outcome,
                            Err(_) => {
                                warn!(
                                    endpoint = %guard.endpoint,
                                    timeout_ms = timeout.as_millis() as u64,
                                    "Sub-request timed out"
                                );
                                Err(TransportError::TimedOut {
                                    timeout_ms: timeout.as_millis() as u64,
                                })
                            }
                        }
                    }
                    _ = cancelled(Some(cancel_rx)) => Err(TransportError::Cancelled),
                    _ = cancelled(shutdown_rx) => Err(TransportError::Cancelled),
                };
                guard.report(outcome);
            });
        }

        Ok(fanout)
    }

    /// Dispatch and wait asynchronously for every endpoint to report
    ///
    /// # Errors
    /// Returns `Error::Timeout` if the fan-out is still incomplete after
    /// `timeout`; its sub-requests keep running and still report.
    pub async fn dispatch_and_wait(
        &self,
        endpoints: Vec<Endpoint>,
        request: T::Request,
        timeout: Duration,
    ) -> Result<Fanout<T::Response>> {
        let fanout = self.dispatch(endpoints, request)?;
        if fanout.wait_async_timeout(timeout).await {
            Ok(fanout)
        } else {
            Err(Error::Timeout {
                operation: format!("fan-out {}", fanout.id()),
                timeout_ms: timeout.as_millis() as u64,
            })
        }
    }

    /// Cancel every outstanding sub-request issued by this dispatcher
    pub fn cancel_all(&self) {
        info!(in_flight = self.in_flight(), "Cancelling outstanding sub-requests");
        let _ = self.cancel_tx.send(());
    }

    /// Number of fan-outs issued and not yet complete
    pub fn in_flight(&self) -> usize {
        self.prune();
        self.in_flight.len()
    }

    /// Drop registry entries whose fan-out completed before its callback
    /// got to remove them
    fn prune(&self) {
        self.in_flight
            .retain(|_, coord| coord.upgrade().is_some_and(|c| !c.is_completed()));
    }

    /// Progress of every fan-out still in flight
    pub fn in_flight_status(&self) -> Vec<FanoutStatus> {
        self.in_flight
            .iter()
            .filter_map(|entry| entry.value().upgrade())
            .map(|coord| coord.status())
            .filter(|status| !status.completed)
            .collect()
    }
}

/// Resolves when a cancellation signal arrives; never, without a receiver
async fn cancelled(rx: Option<ShutdownReceiver>) {
    let Some(mut rx) = rx else {
        return std::future::pending().await;
    };
    match rx.recv().await {
        Ok(()) | Err(RecvError::Lagged(_)) => {}
        // Sender gone without a signal, nothing will cancel this sub-request
        Err(RecvError::Closed) => std::future::pending().await,
    }
}

/// Reports a sub-request's outcome into its slot exactly once
///
/// Dropping the guard without reporting records the sub-request as
/// abandoned, so a fan-out completes even if its tasks are torn down.
struct ReportGuard<R, S> {
    fanout: Option<Fanout<R, S>>,
    slot: SlotIndex,
    endpoint: Endpoint,
    started: Instant,
}

impl<R, S> ReportGuard<R, S> {
    fn new(fanout: Fanout<R, S>, slot: SlotIndex, endpoint: Endpoint) -> Self {
        Self {
            fanout: Some(fanout),
            slot,
            endpoint,
            started: Instant::now(),
        }
    }

    fn report(mut self, outcome: std::result::Result<R, TransportError>) {
        self.deliver(outcome);
    }

    fn deliver(&mut self, outcome: std::result::Result<R, TransportError>) {
        let Some(fanout) = self.fanout.take() else {
            return;
        };

        debug!(
            operation_id = %fanout.id(),
            slot = self.slot,
            endpoint = %self.endpoint,
            success = outcome.is_ok(),
            "Sub-request finished"
        );

        let response = SubResponse {
            slot: self.slot,
            endpoint: self.endpoint.clone(),
            elapsed: self.started.elapsed(),
            outcome,
        };
        if let Err(e) = fanout.report(self.slot, response) {
            error!(error = %e, "Sub-request report rejected");
        }
    }
}

impl<R, S> Drop for ReportGuard<R, S> {
    fn drop(&mut self) {
        if self.fanout.is_some() {
            warn!(
                slot = self.slot,
                endpoint = %self.endpoint,
                "Sub-request dropped before reporting"
            );
            self.deliver(Err(TransportError::Abandoned));
        }
    }
}
