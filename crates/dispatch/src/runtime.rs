//! Async runtime that drives sub-requests

use std::sync::Arc;
use std::time::Duration;

use fanout_core::{Error, FanoutConfig, Result};
use tokio::runtime::{Builder, Handle, Runtime};
use tokio::sync::broadcast;
use tracing::info;

use crate::{FanoutDispatcher, Transport};

/// Shutdown signal sender
pub type ShutdownSender = broadcast::Sender<()>;

/// Shutdown signal receiver
pub type ShutdownReceiver = broadcast::Receiver<()>;

/// Owns the I/O threads that sub-requests run and report on
///
/// Dropping it from synchronous code waits up to five seconds for tasks to
/// wind down; dropping it inside an async context shuts down in the
/// background without waiting.
pub struct DispatchRuntime {
    /// Tokio runtime, taken on drop
    runtime: Option<Runtime>,

    /// Handle for spawning onto the runtime
    handle: Handle,

    /// Configuration
    config: FanoutConfig,

    /// Shutdown signal sender
    shutdown_tx: ShutdownSender,
}

impl DispatchRuntime {
    /// Create a new dispatch runtime
    pub fn new(config: FanoutConfig) -> Result<Self> {
        config.validate()?;

        let runtime = Builder::new_multi_thread()
            .worker_threads(config.dispatch.io_threads)
            .enable_all()
            .thread_name("fanout-io")
            .build()
            .map_err(|e| Error::RuntimeUnavailable {
                message: format!("Failed to build Tokio runtime: {}", e),
            })?;
        let handle = runtime.handle().clone();

        let (shutdown_tx, _) = broadcast::channel(1);

        info!(
            io_threads = config.dispatch.io_threads,
            "Dispatch runtime started"
        );

        Ok(Self {
            runtime: Some(runtime),
            handle,
            config,
            shutdown_tx,
        })
    }

    /// Get the runtime handle for spawning tasks
    pub fn handle(&self) -> Handle {
        self.handle.clone()
    }

    /// Get configuration
    pub fn config(&self) -> &FanoutConfig {
        &self.config
    }

    /// Get a shutdown receiver
    pub fn shutdown_receiver(&self) -> ShutdownReceiver {
        self.shutdown_tx.subscribe()
    }

    /// Signal shutdown; outstanding sub-requests report as cancelled
    pub fn shutdown(&self) {
        info!("Initiating dispatch runtime shutdown");
        let _ = self.shutdown_tx.send(());
    }

    /// Block on a future until completion
    pub fn block_on<F: std::future::Future>(&self, future: F) -> F::Output {
        self.handle.block_on(future)
    }

    /// Spawn a task on the runtime
    pub fn spawn<F>(&self, future: F) -> tokio::task::JoinHandle<F::Output>
    where
        F: std::future::Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.handle.spawn(future)
    }

    /// Create a dispatcher whose sub-requests run on this runtime
    pub fn dispatcher<T: Transport>(&self, transport: T) -> FanoutDispatcher<T> {
        FanoutDispatcher::new(
            Arc::new(transport),
            self.handle(),
            self.config.dispatch.clone(),
        )
        .with_shutdown(self.shutdown_tx.clone())
    }
}

impl Drop for DispatchRuntime {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            // Signal shutdown
            let _ = self.shutdown_tx.send(());

            // Tasks still pending after this are dropped and report abandoned.
            // Blocking on shutdown is not allowed from inside an async context.
            if Handle::try_current().is_ok() {
                runtime.shutdown_background();
            } else {
                runtime.shutdown_timeout(Duration::from_secs(5));
            }
            info!("Dispatch runtime shut down");
        }
    }
}

/// Builder for DispatchRuntime
pub struct DispatchRuntimeBuilder {
    config: FanoutConfig,
}

impl DispatchRuntimeBuilder {
    /// Create a new builder with default config
    pub fn new() -> Self {
        Self {
            config: FanoutConfig::default(),
        }
    }

    /// Set the configuration
    pub fn config(mut self, config: FanoutConfig) -> Self {
        self.config = config;
        self
    }

    /// Set I/O thread count
    pub fn io_threads(mut self, threads: usize) -> Self {
        self.config.dispatch.io_threads = threads;
        self
    }

    /// Set the per-sub-request timeout
    pub fn sub_request_timeout(mut self, timeout: Duration) -> Self {
        self.config.dispatch.sub_request_timeout = timeout;
        self
    }

    /// Set the in-flight fan-out limit
    pub fn max_in_flight(mut self, max: usize) -> Self {
        self.config.dispatch.max_in_flight = max;
        self
    }

    /// Build the dispatch runtime
    pub fn build(self) -> Result<DispatchRuntime> {
        DispatchRuntime::new(self.config)
    }
}

impl Default for DispatchRuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}
