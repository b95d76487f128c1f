//! JSON-file implementation of the state store

use crate::config::OutputConfig;
use crate::model::PropertyRecord;
use crate::store::{ScrapeState, StateStore};
use crate::{StoreError, StoreResult};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Locations of the three state documents
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorePaths {
    pub checkpoint: PathBuf,
    pub data: PathBuf,
    pub failed_pages: PathBuf,
}

impl StorePaths {
    /// Paths for a single-process run, taken from the output config
    pub fn from_output(output: &OutputConfig) -> Self {
        Self {
            checkpoint: output.directory.join(&output.checkpoint_file),
            data: output.directory.join(&output.data_file),
            failed_pages: output.directory.join(&output.failed_pages_file),
        }
    }

    /// Paths private to the fan-out worker covering `[start, end]`
    pub fn for_worker(directory: &Path, start: u32, end: u32) -> Self {
        let worker_id = format!("worker_{}_{}", start, end);
        Self {
            checkpoint: directory.join(format!("checkpoint_{}.json", worker_id)),
            data: directory.join(format!("properties_{}.json", worker_id)),
            failed_pages: directory.join(format!("failed_pages_{}.json", worker_id)),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct CheckpointDocument {
    #[serde(default)]
    last_page: u32,
    #[serde(default)]
    timestamp: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct FailedPagesDocument {
    #[serde(default)]
    failed_pages: Vec<u32>,
    #[serde(default)]
    timestamp: String,
    #[serde(default)]
    count: usize,
}

/// State store backed by three JSON files
#[derive(Debug, Clone)]
pub struct FileStore {
    paths: StorePaths,
}

impl FileStore {
    pub fn new(paths: StorePaths) -> Self {
        Self { paths }
    }

    pub fn paths(&self) -> &StorePaths {
        &self.paths
    }

    /// Reads the last checkpointed page, 0 if no checkpoint exists
    pub fn load_checkpoint(&self) -> StoreResult<u32> {
        Ok(read_document::<CheckpointDocument>(&self.paths.checkpoint)?
            .map(|doc| doc.last_page)
            .unwrap_or(0))
    }

    pub fn load_records(&self) -> StoreResult<Vec<PropertyRecord>> {
        Ok(read_document(&self.paths.data)?.unwrap_or_default())
    }

    pub fn load_failed_pages(&self) -> StoreResult<BTreeSet<u32>> {
        Ok(read_document::<FailedPagesDocument>(&self.paths.failed_pages)?
            .map(|doc| doc.failed_pages.into_iter().collect())
            .unwrap_or_default())
    }
}

impl StateStore for FileStore {
    fn load(&self) -> StoreResult<ScrapeState> {
        Ok(ScrapeState {
            last_completed_page: self.load_checkpoint()?,
            records: self.load_records()?,
            failed_pages: self.load_failed_pages()?,
        })
    }

    fn save_records(&self, records: &[PropertyRecord]) -> StoreResult<()> {
        write_document(&self.paths.data, &records)
    }

    fn save_checkpoint(&self, last_page: u32) -> StoreResult<()> {
        write_document(
            &self.paths.checkpoint,
            &CheckpointDocument {
                last_page,
                timestamp: now_timestamp(),
            },
        )
    }

    fn save_failed_pages(&self, failed: &BTreeSet<u32>) -> StoreResult<()> {
        write_document(
            &self.paths.failed_pages,
            &FailedPagesDocument {
                failed_pages: failed.iter().copied().collect(),
                timestamp: now_timestamp(),
                count: failed.len(),
            },
        )
    }
}

/// Writes any serializable value as a JSON document
///
/// The document is written to a sibling temp file and renamed over the
/// target, so readers never observe a half-written file.
pub fn write_document<T: Serialize + ?Sized>(path: &Path, value: &T) -> StoreResult<()> {
    let io_err = |source| StoreError::Io {
        path: path.display().to_string(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_err)?;
    }

    let content = serde_json::to_vec(value).map_err(|source| StoreError::Serialization {
        path: path.display().to_string(),
        source,
    })?;

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    fs::write(&tmp, content).map_err(io_err)?;
    fs::rename(&tmp, path).map_err(io_err)
}

/// Reads a JSON document; a missing file is `Ok(None)`
fn read_document<T: DeserializeOwned>(path: &Path) -> StoreResult<Option<T>> {
    let content = match fs::read(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(StoreError::Io {
                path: path.display().to_string(),
                source,
            })
        }
    };

    serde_json::from_slice(&content)
        .map(Some)
        .map_err(|source| StoreError::Serialization {
            path: path.display().to_string(),
            source,
        })
}

fn now_timestamp() -> String {
    chrono::Local::now().format(TIMESTAMP_FORMAT).to_string()
}
