//! # Dataset Store
//!
//! The local dataset is one GeoJSON document, rewritten in full on every
//! successful run.
//!
//! - **Load** never fails: a missing, unreadable or malformed document is
//!   treated as an empty dataset (first run).
//! - **Persist** serializes the whole dataset before touching disk, writes it
//!   to a temporary file next to the target and renames it into place, so a
//!   failed write leaves the previous document intact.
//! - Single writer: concurrent runs against the same document are not
//!   supported.

use std::collections::HashSet;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use tempfile::NamedTempFile;

use crate::error::Result;
use crate::types::{ActivityId, Dataset, Feature, RemoteActivitySummary};

/// Owns the on-disk location of the dataset document.
#[derive(Debug, Clone)]
pub struct DatasetStore {
    path: PathBuf,
}

impl DatasetStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the persisted dataset, or an empty one if there is nothing usable.
    pub fn load(&self) -> Dataset {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("[DatasetStore] No dataset at {}", self.path.display());
                return Dataset::default();
            }
            Err(e) => {
                warn!(
                    "[DatasetStore] Cannot read {}: {}, starting empty",
                    self.path.display(),
                    e
                );
                return Dataset::default();
            }
        };

        match serde_json::from_slice::<Dataset>(&bytes) {
            Ok(dataset) => {
                info!(
                    "[DatasetStore] Loaded {} existing routes from {}",
                    dataset.len(),
                    self.path.display()
                );
                dataset
            }
            Err(e) => {
                warn!(
                    "[DatasetStore] Malformed dataset {}: {}, starting empty",
                    self.path.display(),
                    e
                );
                Dataset::default()
            }
        }
    }

    /// Atomically replace the persisted document with `dataset`.
    pub fn persist(&self, dataset: &Dataset) -> Result<()> {
        let bytes = serde_json::to_vec(dataset)?;

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir)?;

        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(&bytes)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;

        info!(
            "[DatasetStore] Wrote {} routes ({} bytes) to {}",
            dataset.len(),
            bytes.len(),
            self.path.display()
        );
        Ok(())
    }
}

/// Remote activities not yet in the dataset, in listing order.
///
/// An identifier listed more than once is returned only for its first
/// occurrence.
pub fn diff<'a>(
    existing_ids: &HashSet<ActivityId>,
    remote: &'a [RemoteActivitySummary],
) -> Vec<&'a RemoteActivitySummary> {
    let mut seen = HashSet::new();
    remote
        .iter()
        .filter(|summary| !existing_ids.contains(&summary.activity_id))
        .filter(|summary| seen.insert(summary.activity_id.clone()))
        .collect()
}

/// Append new features after all existing ones.
///
/// Existing features are moved across untouched. Does not re-check
/// identifiers; `new_features` must come from [`diff`].
pub fn merge(existing: Dataset, new_features: &[Feature]) -> Result<Dataset> {
    let mut merged = existing;
    for feature in new_features {
        merged.push(feature)?;
    }
    Ok(merged)
}
