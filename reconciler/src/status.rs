// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Durable Sector status records

use crate::errors::StatusStoreError;
use chrono::{DateTime, Utc};
use ipam::store::write_atomic;
use model::{InvalidTransition, SectorEvent, SectorState};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Display;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, trace};

/// Where a chain of actions stopped.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailurePoint {
    pub action_index: usize,
    pub action: String,
    pub reason: String,
}

impl Display for FailurePoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "action #{} ({}): {}",
            self.action_index, self.action, self.reason
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectorStatus {
    pub name: String,
    pub state: SectorState,
    /// Known once the Sector was planned.
    pub tag: Option<u32>,
    /// Generation of the manifest last acted upon.
    pub generation: u64,
    #[serde(default)]
    pub failure: Option<FailurePoint>,
    pub updated_at: DateTime<Utc>,
}

impl SectorStatus {
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            state: SectorState::Requested,
            tag: None,
            generation: 0,
            failure: None,
            updated_at: Utc::now(),
        }
    }

    /// Apply `events` in turn. Nothing changes if any of them is not allowed.
    ///
    /// The failure point is kept while the Sector is degraded, or when the last event is itself a
    /// failure (a failed teardown stays [`SectorState::TearingDown`]).
    pub fn advance(&mut self, events: &[SectorEvent]) -> Result<(), InvalidTransition> {
        let mut state = self.state;
        for event in events {
            state = state.on(*event)?;
        }
        let failed = events.last() == Some(&SectorEvent::ApplyFailed);
        if state != SectorState::Degraded && !failed {
            self.failure = None;
        }
        self.state = state;
        self.updated_at = Utc::now();
        Ok(())
    }
}

impl Display for SectorStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:<16} {:<13}", self.name, self.state.to_string())?;
        match self.tag {
            Some(tag) => write!(f, " tag {tag:<5}")?,
            None => write!(f, " tag -    ")?,
        }
        write!(f, " gen {:<4} {}", self.generation, self.updated_at.to_rfc3339())?;
        if let Some(failure) = &self.failure {
            write!(f, " failed at {failure}")?;
        }
        Ok(())
    }
}

pub trait StatusStore: Send + Sync {
    fn load(&self, name: &str) -> Result<Option<SectorStatus>, StatusStoreError>;
    fn store(&self, status: &SectorStatus) -> Result<(), StatusStoreError>;
    /// Every record, ordered by Sector name.
    fn list(&self) -> Result<Vec<SectorStatus>, StatusStoreError>;
}

#[derive(Debug, Default)]
pub struct MemoryStatusStore(Mutex<BTreeMap<String, SectorStatus>>);

impl MemoryStatusStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl StatusStore for MemoryStatusStore {
    fn load(&self, name: &str) -> Result<Option<SectorStatus>, StatusStoreError> {
        Ok(self.0.lock().get(name).cloned())
    }
    fn store(&self, status: &SectorStatus) -> Result<(), StatusStoreError> {
        self.0.lock().insert(status.name.clone(), status.clone());
        Ok(())
    }
    fn list(&self) -> Result<Vec<SectorStatus>, StatusStoreError> {
        Ok(self.0.lock().values().cloned().collect())
    }
}

/// One YAML document per Sector in a directory.
#[derive(Debug)]
pub struct FileStatusStore {
    dir: PathBuf,
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> StatusStoreError + '_ {
    move |source| StatusStoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

impl FileStatusStore {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StatusStoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(io_err(&dir))?;
        info!("Sector status records in {}", dir.display());
        Ok(Self { dir })
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.yaml"))
    }

    fn read(path: &Path) -> Result<SectorStatus, StatusStoreError> {
        let text = fs::read_to_string(path).map_err(io_err(path))?;
        serde_yaml_ng::from_str(&text).map_err(|e| StatusStoreError::Malformed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }
}

impl StatusStore for FileStatusStore {
    fn load(&self, name: &str) -> Result<Option<SectorStatus>, StatusStoreError> {
        let path = self.path(name);
        if !path.exists() {
            return Ok(None);
        }
        Self::read(&path).map(Some)
    }

    fn store(&self, status: &SectorStatus) -> Result<(), StatusStoreError> {
        let path = self.path(&status.name);
        let text = serde_yaml_ng::to_string(status).map_err(|e| StatusStoreError::Malformed {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        write_atomic(&path, text.as_bytes())?;
        trace!("Persisted status of sector {}: {}", status.name, status.state);
        Ok(())
    }

    fn list(&self) -> Result<Vec<SectorStatus>, StatusStoreError> {
        let mut records = vec![];
        for entry in fs::read_dir(&self.dir).map_err(io_err(&self.dir))? {
            let path = entry.map_err(io_err(&self.dir))?.path();
            if path.extension().is_some_and(|ext| ext == "yaml") {
                records.push(Self::read(&path)?);
            }
        }
        records.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(records)
    }
}
