// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Run-time parameters of the reconciler

use derive_builder::Builder;
use platform::RetryPolicy;
use std::fmt::Display;
use std::time::Duration;

/// Parameters of a [`crate::Reconciler`]. N.B. we derive a builder type
/// `ReconcilerParamsBuilder` and provide defaults for each field.
#[derive(Builder, Clone, Debug, PartialEq, Eq)]
pub struct ReconcilerParams {
    /// Deadline of each platform call.
    #[builder(default = Duration::from_secs(10))]
    pub deadline: Duration,

    /// Attempts per platform call, first one included.
    #[builder(default = 5)]
    pub attempts: u32,

    /// Delay before the first retry of a platform call. Doubles on every retry.
    #[builder(default = Duration::from_millis(200))]
    pub backoff: Duration,

    #[builder(default = Duration::from_secs(5))]
    pub max_backoff: Duration,

    /// Sectors reconciled concurrently.
    #[builder(default = 4)]
    pub parallelism: usize,
}

impl Default for ReconcilerParams {
    fn default() -> Self {
        Self {
            deadline: Duration::from_secs(10),
            attempts: 5,
            backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(5),
            parallelism: 4,
        }
    }
}

impl ReconcilerParams {
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            deadline: self.deadline,
            attempts: self.attempts.max(1),
            backoff: self.backoff,
            max_backoff: self.max_backoff,
        }
    }
}

impl Display for ReconcilerParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
        writeln!(f, "Reconciler parameters")?;
        writeln!(f, "  deadline   : {:?}", self.deadline)?;
        writeln!(f, "  attempts   : {}", self.attempts)?;
        writeln!(f, "  backoff    : {:?} (max {:?})", self.backoff, self.max_backoff)?;
        writeln!(f, "  parallelism: {}", self.parallelism)
    }
}
