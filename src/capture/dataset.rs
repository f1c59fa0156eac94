//! Offline entropy-assessment dataset capture.
//!
//! Writes packed sample files for an external SP 800-90B estimator run
//! and records a SHA-256 digest per dataset kind.

use super::source::{BitSource, SourceError};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

/// Errors from dataset capture.
#[derive(Debug, Error)]
pub enum DatasetError {
    /// Kind is not `raw`, `cond` or `restart`.
    #[error("invalid dataset kind {0:?} (expected raw, cond or restart)")]
    InvalidKind(String),
    /// Zero samples requested.
    #[error("sample count must be positive")]
    EmptyDataset,
    /// The bit source failed.
    #[error(transparent)]
    Source(#[from] SourceError),
    /// Writing the dataset file failed.
    #[error("failed to write dataset: {0}")]
    Io(String),
}

/// Dataset categories expected by the estimator workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatasetKind {
    /// Unconditioned source output.
    Raw,
    /// Conditioned output.
    Cond,
    /// Output collected across source restarts.
    Restart,
}

impl DatasetKind {
    /// Every kind, in registry order.
    pub const ALL: [DatasetKind; 3] = [DatasetKind::Raw, DatasetKind::Cond, DatasetKind::Restart];

    /// Lowercase name used in file names.
    pub fn as_str(&self) -> &'static str {
        match self {
            DatasetKind::Raw => "raw",
            DatasetKind::Cond => "cond",
            DatasetKind::Restart => "restart",
        }
    }
}

impl fmt::Display for DatasetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DatasetKind {
    type Err = DatasetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "raw" => Ok(DatasetKind::Raw),
            "cond" => Ok(DatasetKind::Cond),
            "restart" => Ok(DatasetKind::Restart),
            other => Err(DatasetError::InvalidKind(other.to_string())),
        }
    }
}

/// Result of one capture.
#[derive(Debug, Clone, Serialize)]
pub struct DatasetRecord {
    /// Dataset category.
    pub kind: DatasetKind,
    /// Number of bits captured.
    pub samples: usize,
    /// Path of the written file.
    pub file: PathBuf,
    /// Hex SHA-256 of the packed file contents.
    pub sha256: String,
}

/// Latest digest per dataset kind, as `sha256:<hex>`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DatasetRegistry {
    hashes: BTreeMap<DatasetKind, Option<String>>,
}

impl DatasetRegistry {
    /// Creates a registry with no digests recorded.
    pub fn new() -> Self {
        Self {
            hashes: DatasetKind::ALL.iter().map(|&k| (k, None)).collect(),
        }
    }

    /// Records a capture, replacing any earlier digest of the same kind.
    pub fn record(&mut self, record: &DatasetRecord) {
        self.hashes
            .insert(record.kind, Some(format!("sha256:{}", record.sha256)));
    }

    /// Digest recorded for `kind`, if any.
    pub fn get(&self, kind: DatasetKind) -> Option<&str> {
        self.hashes.get(&kind).and_then(|h| h.as_deref())
    }
}

fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Samples `samples` bits and writes them packed to `dir`.
///
/// The file is named `<kind>_<unix-seconds>_<samples>.bin`.
pub fn capture_dataset<S>(
    source: &mut S,
    kind: DatasetKind,
    samples: usize,
    dir: &Path,
) -> Result<DatasetRecord, DatasetError>
where
    S: BitSource + ?Sized,
{
    if samples == 0 {
        return Err(DatasetError::EmptyDataset);
    }

    let sample = source.sample(samples, samples.saturating_mul(2).max(4096))?;
    let data = sample.bits.to_packed_bytes();

    std::fs::create_dir_all(dir).map_err(|e| DatasetError::Io(e.to_string()))?;
    let filename = format!("{}_{}_{}.bin", kind, chrono::Utc::now().timestamp(), samples);
    let file = dir.join(filename);
    std::fs::write(&file, &data).map_err(|e| DatasetError::Io(e.to_string()))?;

    let sha256 = sha256_hex(&data);
    tracing::info!(
        kind = %kind,
        samples,
        file = %file.display(),
        sha256 = %sha256,
        "Captured entropy dataset"
    );

    Ok(DatasetRecord {
        kind,
        samples,
        file,
        sha256,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::PatternBitSource;

    #[test]
    fn test_kind_parsing() {
        assert_eq!("cond".parse::<DatasetKind>().unwrap(), DatasetKind::Cond);
        assert!(matches!(
            "conditioned".parse::<DatasetKind>(),
            Err(DatasetError::InvalidKind(_))
        ));
    }

    #[test]
    fn test_capture_writes_packed_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut source = PatternBitSource::new("10".parse().unwrap()).unwrap();

        let record = capture_dataset(&mut source, DatasetKind::Raw, 20, dir.path()).unwrap();
        let contents = std::fs::read(&record.file).unwrap();

        // 20 bits of 1010... packed and right-padded to 3 bytes.
        assert_eq!(contents, vec![0xAA, 0xAA, 0xA0]);
        assert_eq!(
            record.sha256,
            "05a20eaca74f1e665f636ca7ac500393d403037873d22d50d21016230fbf6dc8"
        );
        assert!(record
            .file
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("raw_"));
    }

    #[test]
    fn test_registry_tracks_latest_per_kind() {
        let dir = tempfile::tempdir().unwrap();
        let mut source = PatternBitSource::stuck(true);
        let mut registry = DatasetRegistry::new();
        assert!(registry.get(DatasetKind::Restart).is_none());

        let record = capture_dataset(&mut source, DatasetKind::Restart, 8, dir.path()).unwrap();
        registry.record(&record);

        assert_eq!(
            registry.get(DatasetKind::Restart),
            Some(format!("sha256:{}", record.sha256).as_str())
        );
        assert!(registry.get(DatasetKind::Raw).is_none());
    }

    #[test]
    fn test_zero_samples_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut source = PatternBitSource::stuck(false);
        assert!(matches!(
            capture_dataset(&mut source, DatasetKind::Raw, 0, dir.path()),
            Err(DatasetError::EmptyDataset)
        ));
    }
}
