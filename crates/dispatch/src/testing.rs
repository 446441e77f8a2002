//! Scripted in-memory transport for tests and benchmarks

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;

use crate::{Endpoint, Transport, TransportError};

/// How the mock answers one endpoint address
#[derive(Debug, Clone)]
pub enum MockBehavior {
    /// Answer with `value` after `delay`
    Respond { value: String, delay: Duration },

    /// Fail with a protocol error after `delay`
    Fail { message: String, delay: Duration },

    /// Never answer
    Hang,
}

/// Transport whose answers are scripted per endpoint address
///
/// Unscripted addresses answer immediately with `"<name>:<request>"`.
#[derive(Debug, Default)]
pub struct MockTransport {
    behaviors: DashMap<String, MockBehavior>,
    calls: AtomicUsize,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(self, address: &str, value: &str, delay: Duration) -> Self {
        self.script(
            address,
            MockBehavior::Respond {
                value: value.to_string(),
                delay,
            },
        )
    }

    pub fn fail(self, address: &str, message: &str, delay: Duration) -> Self {
        self.script(
            address,
            MockBehavior::Fail {
                message: message.to_string(),
                delay,
            },
        )
    }

    pub fn hang(self, address: &str) -> Self {
        self.script(address, MockBehavior::Hang)
    }

    pub fn script(self, address: &str, behavior: MockBehavior) -> Self {
        self.behaviors.insert(address.to_string(), behavior);
        self
    }

    /// Number of sub-requests the mock has received
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for MockTransport {
    type Request = String;
    type Response = String;

    fn name(&self) -> &str {
        "mock"
    }

    async fn send(&self, endpoint: &Endpoint, request: &String) -> Result<String, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let behavior = self
            .behaviors
            .get(&endpoint.address)
            .map(|entry| entry.value().clone());

        match behavior {
            None => Ok(format!("{}:{}", endpoint.name, request)),
            Some(MockBehavior::Respond { value, delay }) => {
                tokio::time::sleep(delay).await;
                Ok(value)
            }
            Some(MockBehavior::Fail { message, delay }) => {
                tokio::time::sleep(delay).await;
                Err(TransportError::Protocol { message })
            }
            Some(MockBehavior::Hang) => std::future::pending().await,
        }
    }
}
