// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Per-Sector leases.
//!
//! Every reconciliation of a Sector runs under a lease. Taking a new lease for a Sector
//! supersedes the one before it: the worker holding the old lease notices before dispatching its
//! next action and stops. Manifest generations only move forward; a lease for an older
//! generation than one already seen is refused.

use crate::errors::ReconcileError;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use tracing::debug;

#[derive(Debug, Default)]
struct Entry {
    generation: u64,
    epoch: u64,
}

/// Right to act on a Sector, until superseded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Lease {
    sector: String,
    generation: Option<u64>,
    epoch: u64,
}

impl Lease {
    #[must_use]
    pub fn sector(&self) -> &str {
        &self.sector
    }
}

#[derive(Debug, Default)]
pub struct SectorLeases {
    entries: Mutex<BTreeMap<String, Entry>>,
}

impl SectorLeases {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the lease of `sector` for manifest `generation`, or for a deletion if `None`.
    pub fn acquire(&self, sector: &str, generation: Option<u64>) -> Result<Lease, ReconcileError> {
        let mut entries = self.entries.lock();
        let entry = entries.entry(sector.to_owned()).or_default();
        if let Some(generation) = generation {
            if generation < entry.generation {
                return Err(ReconcileError::Superseded {
                    sector: sector.to_owned(),
                    generation,
                    current: entry.generation,
                });
            }
            entry.generation = generation;
        }
        entry.epoch += 1;
        debug!("Sector {sector}: lease {} for {generation:?}", entry.epoch);
        Ok(Lease {
            sector: sector.to_owned(),
            generation,
            epoch: entry.epoch,
        })
    }

    /// Whether `lease` still holds.
    pub fn check(&self, lease: &Lease) -> Result<(), ReconcileError> {
        let entries = self.entries.lock();
        match entries.get(&lease.sector) {
            Some(entry) if entry.epoch != lease.epoch => Err(ReconcileError::Superseded {
                sector: lease.sector.clone(),
                generation: lease.generation.unwrap_or_default(),
                current: entry.generation,
            }),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newer_leases_supersede() {
        let leases = SectorLeases::new();
        let first = leases.acquire("web", Some(1)).unwrap();
        leases.check(&first).unwrap();
        let second = leases.acquire("web", Some(2)).unwrap();
        assert!(matches!(
            leases.check(&first),
            Err(ReconcileError::Superseded { current: 2, .. })
        ));
        leases.check(&second).unwrap();

        // other sectors are independent
        let other = leases.acquire("db", Some(0)).unwrap();
        leases.check(&second).unwrap();
        leases.check(&other).unwrap();
    }

    #[test]
    fn stale_generations_are_refused() {
        let leases = SectorLeases::new();
        leases.acquire("web", Some(3)).unwrap();
        assert!(leases.acquire("web", Some(2)).is_err());
        // reapplying the same generation is fine
        leases.acquire("web", Some(3)).unwrap();
    }

    #[test]
    fn deletion_supersedes_any_generation() {
        let leases = SectorLeases::new();
        let apply = leases.acquire("web", Some(7)).unwrap();
        let delete = leases.acquire("web", None).unwrap();
        assert!(leases.check(&apply).is_err());
        leases.check(&delete).unwrap();
    }
}
