//! Dispatch - concurrent multi-endpoint fan-out over pluggable transports
//!
//! Issues one logical request as one sub-request per endpoint and joins
//! the results through a [`fanout_core::FanoutCoordinator`]:
//! - **Transports** carry a sub-request to one endpoint ([`Transport`])
//! - **Dispatcher** spawns sub-requests, bounds each with a timeout, and
//!   guarantees every one reports exactly once ([`FanoutDispatcher`])
//! - **Runtime** owns the I/O threads sub-requests run on ([`DispatchRuntime`])
//!
//! # Example
//!
//! ```no_run
//! use dispatch::{DispatchRuntimeBuilder, Endpoint, TcpProbeTransport};
//! use std::time::Duration;
//!
//! # fn example() -> fanout_core::Result<()> {
//! let runtime = DispatchRuntimeBuilder::new().io_threads(2).build()?;
//! let dispatcher = runtime.dispatcher(TcpProbeTransport::new());
//!
//! let fanout = dispatcher.dispatch(
//!     vec![
//!         Endpoint::new("resolver-a", "1.1.1.1:53"),
//!         Endpoint::new("resolver-b", "8.8.8.8:53"),
//!     ],
//!     (),
//! )?;
//!
//! if fanout.wait_timeout(Duration::from_secs(5)) {
//!     for response in fanout.results().unwrap_or_default() {
//!         println!("{}: {:?}", response.endpoint, response.outcome);
//!     }
//! }
//! # Ok(())
//! # }
//! ```

mod dispatcher;
mod runtime;
mod tcp;
pub mod testing;
mod transport;

pub use dispatcher::FanoutDispatcher;
pub use runtime::{DispatchRuntime, DispatchRuntimeBuilder, ShutdownReceiver, ShutdownSender};
pub use tcp::{TcpProbe, TcpProbeTransport};
pub use transport::{Endpoint, Fanout, SubResponse, Transport, TransportError};

// Re-export the coordinator types for convenience
pub use fanout_core::{FanoutConfig, FanoutCoordinator, FanoutStatus, OperationId};
