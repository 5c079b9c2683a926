// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! IPAM errors

use crate::pool::{AllocatedValue, Owner, PoolId, PoolKind};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O failure on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Malformed pool record {path}: {reason}")]
    Malformed { path: PathBuf, reason: String },
    #[error("Failed to encode pool {pool}: {reason}")]
    Encode { pool: PoolId, reason: String },
}

#[derive(Debug, Error)]
pub enum IpamError {
    #[error("Pool {0} does not exist")]
    NoSuchPool(PoolId),
    #[error("Pool {pool} is a {existing} pool, not {requested}")]
    PoolKindMismatch {
        pool: PoolId,
        existing: PoolKind,
        requested: String,
    },
    #[error("{requested} conflicts with {existing} held by '{owner}' in pool {pool}")]
    AllocationConflict {
        pool: PoolId,
        requested: AllocatedValue,
        existing: AllocatedValue,
        owner: Owner,
    },
    #[error("Pool {pool} has no free {what}")]
    PoolExhausted { pool: PoolId, what: String },
    #[error("Invalid request on pool {pool}: {reason}")]
    InvalidRequest { pool: PoolId, reason: String },
    #[error("Allocation store failure: {0}")]
    Store(#[from] StoreError),
}

impl IpamError {
    /// The pool the failure concerns, if any.
    #[must_use]
    pub fn pool(&self) -> Option<&PoolId> {
        match self {
            IpamError::NoSuchPool(pool)
            | IpamError::PoolKindMismatch { pool, .. }
            | IpamError::AllocationConflict { pool, .. }
            | IpamError::PoolExhausted { pool, .. }
            | IpamError::InvalidRequest { pool, .. }
            | IpamError::Store(StoreError::Encode { pool, .. }) => Some(pool),
            IpamError::Store(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_name_the_file() {
        let err = StoreError::Io {
            path: PathBuf::from("/var/lib/orbit/ipam/tags.yaml"),
            source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        };
        assert!(err.to_string().starts_with("I/O failure on /var/lib/orbit/ipam/tags.yaml: "));
        let err = IpamError::from(StoreError::Malformed {
            path: PathBuf::from("backplane.yaml"),
            reason: "not a mapping".to_owned(),
        });
        assert_eq!(
            err.to_string(),
            "Allocation store failure: Malformed pool record backplane.yaml: not a mapping"
        );
        assert_eq!(err.pool(), None);
    }
}
