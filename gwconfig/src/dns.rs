// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Sector DNS records, published as a managed block of a hosts file

use model::Sector;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Display;
use std::net::Ipv4Addr;
use thiserror::Error;
use tracing::debug;

pub const BLOCK_BEGIN: &str = "# --- managed entries ---";
pub const BLOCK_END: &str = "# --- end managed entries ---";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ZoneFileError {
    #[error("Managed block starting at line {0} is never closed")]
    Unterminated(usize),
    #[error("Managed block end at line {0} has no start")]
    Unopened(usize),
}

/// Host records of a Sector, sorted by address, names sorted and deduplicated.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ZoneRecords {
    entries: BTreeMap<Ipv4Addr, BTreeSet<String>>,
}

impl ZoneRecords {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
    pub fn add(&mut self, address: Ipv4Addr, name: &str) {
        self.entries
            .entry(address)
            .or_default()
            .insert(name.to_owned());
    }
    #[must_use]
    pub fn names(&self, address: Ipv4Addr) -> Option<&BTreeSet<String>> {
        self.entries.get(&address)
    }
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Replace the managed block of `existing` with these records, keeping every other line.
    /// Without a managed block, one is appended.
    pub fn merge_into(&self, existing: &str) -> Result<String, ZoneFileError> {
        let mut out = vec![];
        let mut begin = None;
        let mut placed = false;
        for (n, line) in existing.lines().enumerate() {
            match (line.trim(), begin) {
                (BLOCK_BEGIN, None) => begin = Some(n + 1),
                (BLOCK_BEGIN, Some(start)) => return Err(ZoneFileError::Unterminated(start)),
                (BLOCK_END, None) => return Err(ZoneFileError::Unopened(n + 1)),
                (BLOCK_END, Some(_)) => {
                    begin = None;
                    if !placed {
                        out.push(self.to_string());
                        placed = true;
                    }
                }
                (_, Some(_)) => {}
                (_, None) => out.push(format!("{line}\n")),
            }
        }
        if let Some(start) = begin {
            return Err(ZoneFileError::Unterminated(start));
        }
        if !placed {
            out.push(self.to_string());
        }
        Ok(out.concat())
    }
}

/// The managed block, markers included.
impl Display for ZoneRecords {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "{BLOCK_BEGIN}")?;
        for (address, names) in &self.entries {
            let names: Vec<&str> = names.iter().map(String::as_str).collect();
            writeln!(f, "{address}\t{}", names.join(" "))?;
        }
        writeln!(f, "{BLOCK_END}")
    }
}

/// Records published for a Sector: its gateway, its DNS appliance if it has one, and the static
/// records of its manifest.
#[must_use]
pub fn render_dns_zone(sector: &Sector) -> ZoneRecords {
    let mut records = ZoneRecords::new();
    records.add(sector.gateway.address, &sector.gateway.hostname);
    if let Some(dns) = &sector.dns {
        records.add(dns.address.addr(), &dns.hostname);
        for (address, names) in &dns.static_records {
            for name in names {
                records.add(*address, name);
            }
        }
    }
    debug!(
        "Rendered {} DNS addresses for sector {}",
        records.len(),
        sector.name
    );
    records
}
