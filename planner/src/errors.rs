// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Planning errors

use ipam::IpamError;
use model::ValidationError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlanError {
    #[error("Invalid manifest: {0}")]
    Validation(#[from] ValidationError),
    #[error("Cannot change {field} of {entity} from {current} to {requested}")]
    ImmutableFieldViolation {
        entity: String,
        field: &'static str,
        current: String,
        requested: String,
    },
    #[error("Sector {sector} has no subnet named {subnet}")]
    UnknownSubnet { sector: String, subnet: String },
    #[error(transparent)]
    Ipam(#[from] IpamError),
}
