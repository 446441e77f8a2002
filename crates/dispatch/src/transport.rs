//! Transport trait definition
//!
//! Defines the async interface a transport implements to carry one
//! sub-request to one endpoint, plus the per-sub-request result types.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fanout_core::{FanoutCoordinator, SlotIndex};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A destination for one sub-request
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    /// Human-readable label used in logs and output
    pub name: String,

    /// Transport-specific address (e.g. `host:port`)
    pub address: String,
}

impl Endpoint {
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.address)
    }
}

impl FromStr for Endpoint {
    type Err = fanout_core::Error;

    /// Parses `name=address`, or a bare `address` that doubles as the name
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (name, address) = match s.split_once('=') {
            Some((name, address)) => (name.trim(), address.trim()),
            None => (s, s),
        };

        if name.is_empty() || address.is_empty() {
            return Err(fanout_core::Error::InvalidConfig {
                message: format!("Invalid endpoint '{}', expected name=address", s),
            });
        }
        Ok(Endpoint::new(name, address))
    }
}

/// Failure of a single sub-request
///
/// Carried as data inside [`SubResponse`]; it never fails the fan-out itself.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Connect to {endpoint} failed: {message}")]
    Connect { endpoint: String, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Protocol error: {message}")]
    Protocol { message: String },

    #[error("Sub-request timed out after {timeout_ms}ms")]
    TimedOut { timeout_ms: u64 },

    #[error("Sub-request cancelled")]
    Cancelled,

    #[error("Sub-request abandoned before completion")]
    Abandoned,
}

impl TransportError {
    /// Returns true if the sub-request never produced a transport answer
    pub fn is_unanswered(&self) -> bool {
        matches!(
            self,
            TransportError::TimedOut { .. } | TransportError::Cancelled | TransportError::Abandoned
        )
    }
}

/// Outcome of one sub-request, as stored in its fan-out slot
#[derive(Debug)]
pub struct SubResponse<R> {
    /// Position of the endpoint in the dispatched list
    pub slot: SlotIndex,

    /// Endpoint the sub-request went to
    pub endpoint: Endpoint,

    /// Time from issue to report
    pub elapsed: Duration,

    /// Transport answer or error marker
    pub outcome: Result<R, TransportError>,
}

impl<R> SubResponse<R> {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn response(&self) -> Option<&R> {
        self.outcome.as_ref().ok()
    }

    pub fn error(&self) -> Option<&TransportError> {
        self.outcome.as_ref().err()
    }
}

/// Shared handle to a dispatched fan-out
pub type Fanout<R, S = ()> = Arc<FanoutCoordinator<SubResponse<R>, S>>;

/// Async trait for sub-request transports
///
/// Implementors carry one request to one endpoint and return its raw
/// response. They need not bound their own latency; the dispatcher
/// applies the per-sub-request timeout.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Request shared by every sub-request of a fan-out
    type Request: Send + Sync + 'static;

    /// Per-endpoint response
    type Response: Send + Sync + 'static;

    /// Short transport name for logs
    fn name(&self) -> &str;

    /// Send `request` to `endpoint`
    ///
    /// # Errors
    /// Returns a [`TransportError`] describing why this endpoint failed
    async fn send(
        &self,
        endpoint: &Endpoint,
        request: &Self::Request,
    ) -> Result<Self::Response, TransportError>;
}
