// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Contract with the virtualization platform.
//!
//! The [`Platform`] trait is everything the reconciler needs from the platform's SDN and
//! appliance APIs: observe what exists, and create, update or delete one object at a time.
//! [`RetryingPlatform`] wraps any implementation with per-call deadlines and bounded retries of
//! transient failures. [`SimPlatform`] is an in-memory platform with failure injection.

#![deny(
    unsafe_code,
    clippy::all,
    clippy::pedantic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic
)]
#![allow(clippy::missing_errors_doc)]

pub mod errors;
pub mod objects;
pub mod retry;
pub mod sim;
pub mod state;

pub use errors::PlatformError;
pub use objects::{
    Appliance, DnsZone, EvpnController, GatewayConfig, Nic, Resource, ResourceKey, Scope, Subnet,
    Vnet, Zone, ZoneKind,
};
pub use retry::{RetryPolicy, RetryingPlatform};
pub use sim::{Fault, Mutation, MutationKind, SimPlatform};
pub use state::ObservedState;

use tracectl::trace_target;
trace_target!("platform", LevelFilter::INFO, &["orbit"]);

/// Access to the platform's objects.
///
/// # Contract
///
/// Calls are independent; an implementation keeps no session. `observe` does not mutate the
/// platform. `create` fails if the object exists, `update` and `delete` fail with
/// [`PlatformError::NotFound`] if it does not.
pub trait Platform: Send + Sync {
    /// Query every object the platform currently holds.
    fn observe(&self) -> impl Future<Output = Result<ObservedState, PlatformError>> + Send;

    fn create(&self, resource: &Resource)
    -> impl Future<Output = Result<(), PlatformError>> + Send;

    /// Drive an existing object to `resource`. Only valid for keys that are
    /// [`updatable`](ResourceKey::updatable).
    fn update(&self, resource: &Resource)
    -> impl Future<Output = Result<(), PlatformError>> + Send;

    fn delete(&self, key: &ResourceKey) -> impl Future<Output = Result<(), PlatformError>> + Send;
}
