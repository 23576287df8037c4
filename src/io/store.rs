use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;

use super::output::{write_atomic, write_json};
use crate::error::{PipelineError, Result};
use crate::models::UnitKind;

/// On-disk store of per-unit artifacts.
///
/// Each batch or window has a payload file (`batch_3.json`) and optionally the
/// raw model response it came from (`batch_3.json.raw.txt`). Presence of a
/// parseable payload file is what marks a unit complete across runs. Windows
/// also get a stamp (`task_chunk_2.json.input.json`) describing the sentences
/// the payload was built from.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Open the store, creating its directory if needed
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let store = Self::new(dir);
        fs::create_dir_all(&store.dir).map_err(|e| PipelineError::persistence(&store.dir, e))?;
        Ok(store)
    }

    /// Path of the validated payload for a unit (file names are 1-based)
    pub fn payload_path(&self, kind: UnitKind, index: usize) -> PathBuf {
        self.dir.join(format!("{}_{}.json", kind.file_stem(), index + 1))
    }

    /// Path of the raw model response for a unit
    pub fn raw_path(&self, kind: UnitKind, index: usize) -> PathBuf {
        self.dir
            .join(format!("{}_{}.json.raw.txt", kind.file_stem(), index + 1))
    }

    /// Path of the input stamp for a unit
    pub fn stamp_path(&self, kind: UnitKind, index: usize) -> PathBuf {
        self.dir
            .join(format!("{}_{}.json.input.json", kind.file_stem(), index + 1))
    }

    pub fn has_payload(&self, kind: UnitKind, index: usize) -> bool {
        self.payload_path(kind, index).is_file()
    }

    /// Load a unit's payload.
    ///
    /// Returns `Ok(None)` if no payload exists, and `MalformedPayload` if one
    /// exists but does not parse as `T`.
    pub fn load_payload<T: DeserializeOwned>(
        &self,
        kind: UnitKind,
        index: usize,
    ) -> Result<Option<T>> {
        load_json(&self.payload_path(kind, index))
    }

    /// Load a unit's input stamp, with the same missing/malformed rules as payloads
    pub fn load_stamp<T: DeserializeOwned>(
        &self,
        kind: UnitKind,
        index: usize,
    ) -> Result<Option<T>> {
        load_json(&self.stamp_path(kind, index))
    }

    pub fn save_stamp<T: Serialize + ?Sized>(
        &self,
        kind: UnitKind,
        index: usize,
        stamp: &T,
    ) -> Result<PathBuf> {
        let path = self.stamp_path(kind, index);
        write_json(&path, stamp)?;
        Ok(path)
    }

    pub fn save_payload<T: Serialize + ?Sized>(
        &self,
        kind: UnitKind,
        index: usize,
        value: &T,
    ) -> Result<PathBuf> {
        let path = self.payload_path(kind, index);
        write_json(&path, value)?;
        Ok(path)
    }

    pub fn save_raw(&self, kind: UnitKind, index: usize, content: &str) -> Result<PathBuf> {
        let path = self.raw_path(kind, index);
        write_atomic(&path, content.as_bytes())?;
        Ok(path)
    }
}

fn load_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(PipelineError::persistence(path, e)),
    };
    let value = serde_json::from_str(&content)
        .map_err(|e| PipelineError::MalformedPayload(format!("{}: {}", path.display(), e)))?;
    Ok(Some(value))
}
