// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Durable storage of pool records

use crate::errors::StoreError;
use crate::pool::{PoolId, PoolRecord};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::trace;

/// Where pool records live. A stored record replaces the previous record of the same pool.
pub trait AllocationStore: Send + Sync {
    fn load(&self, pool: &PoolId) -> Result<Option<PoolRecord>, StoreError>;
    fn store(&self, record: &PoolRecord) -> Result<(), StoreError>;
    fn remove(&self, pool: &PoolId) -> Result<(), StoreError>;
    fn list(&self) -> Result<Vec<PoolId>, StoreError>;
}

/// Volatile store, for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryStore(Mutex<BTreeMap<PoolId, PoolRecord>>);

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl AllocationStore for MemoryStore {
    fn load(&self, pool: &PoolId) -> Result<Option<PoolRecord>, StoreError> {
        Ok(self.0.lock().get(pool).cloned())
    }
    fn store(&self, record: &PoolRecord) -> Result<(), StoreError> {
        self.0.lock().insert(record.id.clone(), record.clone());
        Ok(())
    }
    fn remove(&self, pool: &PoolId) -> Result<(), StoreError> {
        self.0.lock().remove(pool);
        Ok(())
    }
    fn list(&self) -> Result<Vec<PoolId>, StoreError> {
        Ok(self.0.lock().keys().cloned().collect())
    }
}

/// One YAML document per pool in a directory.
#[derive(Debug)]
pub struct FileStore {
    dir: PathBuf,
}

const EXTENSION: &str = "yaml";

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> StoreError + '_ {
    move |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

impl FileStore {
    /// Open (and create if needed) a store in `dir`.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(io_err(&dir))?;
        Ok(Self { dir })
    }

    fn path(&self, pool: &PoolId) -> PathBuf {
        // pool names are lowercase alphanumerics, dashes and slashes
        let file = pool.as_str().replace('/', "__");
        self.dir.join(format!("{file}.{EXTENSION}"))
    }

    fn read(path: &Path) -> Result<PoolRecord, StoreError> {
        let text = fs::read_to_string(path).map_err(io_err(path))?;
        serde_yaml_ng::from_str(&text).map_err(|e| StoreError::Malformed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }
}

/// Write `contents` to `path` through a sibling temporary file, so that readers see either the
/// old or the new contents, never a mix.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), StoreError> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    let mut file = fs::File::create(&tmp).map_err(io_err(&tmp))?;
    file.write_all(contents).map_err(io_err(&tmp))?;
    file.sync_all().map_err(io_err(&tmp))?;
    fs::rename(&tmp, path).map_err(io_err(path))
}

impl AllocationStore for FileStore {
    fn load(&self, pool: &PoolId) -> Result<Option<PoolRecord>, StoreError> {
        let path = self.path(pool);
        if !path.exists() {
            return Ok(None);
        }
        Self::read(&path).map(Some)
    }

    fn store(&self, record: &PoolRecord) -> Result<(), StoreError> {
        let path = self.path(&record.id);
        let text = serde_yaml_ng::to_string(record).map_err(|e| StoreError::Encode {
            pool: record.id.clone(),
            reason: e.to_string(),
        })?;
        write_atomic(&path, text.as_bytes())?;
        trace!(
            "Persisted pool {} ({} allocations) to {}",
            record.id,
            record.allocations.len(),
            path.display()
        );
        Ok(())
    }

    fn remove(&self, pool: &PoolId) -> Result<(), StoreError> {
        let path = self.path(pool);
        match fs::remove_file(&path) {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(io_err(&path)(e)),
            _ => Ok(()),
        }
    }

    fn list(&self) -> Result<Vec<PoolId>, StoreError> {
        let mut pools = vec![];
        for entry in fs::read_dir(&self.dir).map_err(io_err(&self.dir))? {
            let path = entry.map_err(io_err(&self.dir))?.path();
            if path.extension().is_some_and(|ext| ext == EXTENSION) {
                pools.push(Self::read(&path)?.id);
            }
        }
        pools.sort();
        Ok(pools)
    }
}
