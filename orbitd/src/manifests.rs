// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Loading of manifests from disk

use color_eyre::eyre::{Result, WrapErr, eyre};
use model::{ClusterManifest, SectorManifest};
use serde::de::DeserializeOwned;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

fn load<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text =
        fs::read_to_string(path).wrap_err_with(|| format!("Cannot read {}", path.display()))?;
    serde_yaml_ng::from_str(&text).wrap_err_with(|| format!("Malformed manifest {}", path.display()))
}

pub fn load_cluster(path: &Path) -> Result<ClusterManifest> {
    let cluster: ClusterManifest = load(path)?;
    debug!("Loaded cluster manifest {} from {}", cluster.name, path.display());
    Ok(cluster)
}

fn manifest_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.exists() {
        warn!("No sector manifests: {} does not exist", dir.display());
        return Ok(vec![]);
    }
    let mut files = vec![];
    for entry in fs::read_dir(dir).wrap_err_with(|| format!("Cannot list {}", dir.display()))? {
        let path = entry?.path();
        if path
            .extension()
            .is_some_and(|ext| ext == "yaml" || ext == "yml")
        {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Every Sector manifest in `dir`, ordered by file name. Two manifests may not share a name.
pub fn load_sectors(dir: &Path) -> Result<Vec<SectorManifest>> {
    let mut sectors: Vec<SectorManifest> = vec![];
    for path in manifest_files(dir)? {
        let sector: SectorManifest = load(&path)?;
        if sectors.iter().any(|s| s.name == sector.name) {
            return Err(eyre!(
                "Sector {} is declared twice (again in {})",
                sector.name,
                path.display()
            ));
        }
        sectors.push(sector);
    }
    debug!("Loaded {} sector manifests from {}", sectors.len(), dir.display());
    Ok(sectors)
}

pub fn find_sector(dir: &Path, name: &str) -> Result<SectorManifest> {
    load_sectors(dir)?
        .into_iter()
        .find(|s| s.name == name)
        .ok_or_else(|| eyre!("No manifest for sector {name} in {}", dir.display()))
}
