//! Core type definitions for fan-out coordination

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for one logical fan-out operation
pub type OperationId = Uuid;

/// Position of a sub-request within its fan-out
pub type SlotIndex = usize;

/// Point-in-time view of a coordinator's progress
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FanoutStatus {
    /// Operation identifier
    pub id: OperationId,

    /// Number of sub-requests the fan-out waits for
    pub expected: usize,

    /// Sub-requests that have reported so far
    pub reported: usize,

    /// Sub-requests still outstanding
    pub remaining: usize,

    /// Whether the completion latch is set
    pub completed: bool,

    /// Timestamp when the coordinator was built
    pub created_at: DateTime<Utc>,

    /// Timestamp of the completing report
    pub completed_at: Option<DateTime<Utc>>,
}

impl FanoutStatus {
    /// Fraction of sub-requests that have reported, in `[0, 1]`
    pub fn progress(&self) -> f64 {
        if self.expected == 0 {
            return 1.0;
        }
        self.reported as f64 / self.expected as f64
    }

    /// Wall-clock time between construction and completion
    pub fn elapsed_ms(&self) -> Option<i64> {
        self.completed_at
            .map(|done| done.signed_duration_since(self.created_at).num_milliseconds())
    }
}
