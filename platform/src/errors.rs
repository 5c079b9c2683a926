// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Platform errors

use crate::objects::ResourceKey;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PlatformError {
    /// The platform could not be reached or answered with a temporary failure.
    #[error("Transient platform failure: {0}")]
    Transient(String),
    #[error("Platform call exceeded its deadline of {0:?}")]
    Timeout(Duration),
    /// The platform refused the operation; retrying will not help.
    #[error("Platform rejected operation on {key}: {reason}")]
    Rejected { key: ResourceKey, reason: String },
    #[error("{0} does not exist on the platform")]
    NotFound(ResourceKey),
}

impl PlatformError {
    /// Whether retrying the same call may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, PlatformError::Transient(_) | PlatformError::Timeout(_))
    }
}
