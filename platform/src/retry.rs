// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Deadlines and bounded retries around platform calls

use crate::errors::PlatformError;
use crate::objects::{Resource, ResourceKey};
use crate::state::ObservedState;
use crate::Platform;
use std::time::Duration;
use tracing::warn;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Deadline of each individual call.
    pub deadline: Duration,
    /// Total number of attempts, first one included.
    pub attempts: u32,
    /// Delay before the first retry. Doubles on every retry.
    pub backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            deadline: Duration::from_secs(10),
            attempts: 5,
            backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-based).
    #[must_use]
    pub fn delay(&self, retry: u32) -> Duration {
        let factor = 1u32.checked_shl(retry.saturating_sub(1)).unwrap_or(u32::MAX);
        self.backoff
            .checked_mul(factor)
            .map_or(self.max_backoff, |d| d.min(self.max_backoff))
    }
}

/// A [`Platform`] whose calls are bounded by a deadline and retried on transient failure.
///
/// A call exceeding its deadline counts as a transient failure. Non-transient failures are
/// returned at once. Once attempts run out, the last failure is returned.
pub struct RetryingPlatform<P> {
    inner: P,
    policy: RetryPolicy,
}

impl<P: Platform> RetryingPlatform<P> {
    pub fn new(inner: P, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    async fn call<T, F, Fut>(&self, what: &str, f: F) -> Result<T, PlatformError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, PlatformError>>,
    {
        let mut attempt = 1;
        loop {
            let result = tokio::time::timeout(self.policy.deadline, f())
                .await
                .unwrap_or(Err(PlatformError::Timeout(self.policy.deadline)));
            match result {
                Err(e) if e.is_transient() && attempt < self.policy.attempts => {
                    let delay = self.policy.delay(attempt);
                    warn!(
                        "{what} failed (attempt {attempt}/{}): {e}. Retrying in {delay:?}",
                        self.policy.attempts
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}

impl<P: Platform> Platform for RetryingPlatform<P> {
    async fn observe(&self) -> Result<ObservedState, PlatformError> {
        self.call("observe", || self.inner.observe()).await
    }

    async fn create(&self, resource: &Resource) -> Result<(), PlatformError> {
        let what = format!("create {}", resource.key());
        self.call(&what, || self.inner.create(resource)).await
    }

    async fn update(&self, resource: &Resource) -> Result<(), PlatformError> {
        let what = format!("update {}", resource.key());
        self.call(&what, || self.inner.update(resource)).await
    }

    async fn delete(&self, key: &ResourceKey) -> Result<(), PlatformError> {
        let what = format!("delete {key}");
        self.call(&what, || self.inner.delete(key)).await
    }
}
