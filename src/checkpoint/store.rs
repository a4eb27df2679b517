use log::{debug, info};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use crate::checkpoint::record::CheckpointRecord;
use crate::error::{FerError, Result};
use crate::network::network::Network;

/// A single checkpoint slot on disk. Each save replaces the previous record.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> CheckpointStore {
        CheckpointStore { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Serializes `record` to JSON and atomically replaces the slot.
    ///
    /// The record is written to a temporary file in the same directory, synced,
    /// then renamed over the target, so readers see either the old record or
    /// the new one in full.
    pub fn save(&self, record: &CheckpointRecord) -> Result<()> {
        let persistence = |msg: String| FerError::Persistence { path: self.path.clone(), msg };
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };

        let mut tmp = NamedTempFile::new_in(dir)
            .map_err(|e| persistence(format!("cannot create temporary file in {}: {e}", dir.display())))?;
        {
            let mut writer = BufWriter::new(tmp.as_file_mut());
            serde_json::to_writer(&mut writer, record)
                .map_err(|e| persistence(format!("serialization failed: {e}")))?;
            writer.flush().map_err(|e| persistence(format!("write failed: {e}")))?;
        }
        tmp.as_file()
            .sync_all()
            .map_err(|e| persistence(format!("sync failed: {e}")))?;
        debug!("renaming {} over {}", tmp.path().display(), self.path.display());
        tmp.persist(&self.path)
            .map_err(|e| persistence(format!("rename failed: {}", e.error)))?;

        info!("saved checkpoint (epoch {}) to {}", record.epoch, self.path.display());
        Ok(())
    }

    /// Reads a record without checking it against any model.
    pub fn read(path: &Path) -> Result<CheckpointRecord> {
        let file = File::open(path).map_err(|source| FerError::Io { path: path.to_path_buf(), source })?;
        serde_json::from_reader(BufReader::new(file))
            .map_err(|e| FerError::load(path, format!("malformed checkpoint: {e}")))
    }

    /// Reads a record and verifies every tensor shape against `network`.
    /// Nothing is applied; see [`CheckpointRecord::restore`].
    pub fn load(path: &Path, network: &Network) -> Result<CheckpointRecord> {
        let record = CheckpointStore::read(path)?;
        record.validate(network)?;
        info!("loaded checkpoint from {} (resume at epoch {})", path.display(), record.epoch);
        Ok(record)
    }
}
