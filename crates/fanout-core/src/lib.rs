//! Fanout Core - exactly-once fan-in for concurrent sub-requests
//!
//! Provides the coordinator primitive, error handling, and configuration
//! types shared by the dispatch layer.
//!
//! # Example
//!
//! ```rust
//! use fanout_core::FanoutCoordinator;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let coord = FanoutCoordinator::<&str>::new(2);
//!
//! let handles: Vec<_> = ["a", "b"]
//!     .into_iter()
//!     .enumerate()
//!     .map(|(slot, value)| {
//!         let coord = Arc::clone(&coord);
//!         std::thread::spawn(move || coord.report(slot, value).unwrap())
//!     })
//!     .collect();
//!
//! assert!(coord.wait_timeout(Duration::from_secs(5)));
//! assert_eq!(coord.results().unwrap(), vec![&"a", &"b"]);
//! # for h in handles { h.join().unwrap(); }
//! ```

pub mod config;
pub mod coordinator;
pub mod error;
mod signal;
pub mod types;

pub use config::{DispatchConfig, FanoutConfig, WaitConfig};
pub use coordinator::{CompletionCallback, FanoutBuilder, FanoutCoordinator};
pub use error::{Error, Result};
pub use types::*;
