//! Engine Snapshots
//!
//! The whole engine state serialized as one JSON document. On disk it is
//! wrapped in an envelope carrying a SHA-256 checksum of the snapshot body
//! and replaced atomically (write to a temp file, then rename).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

use crate::domain::{DatasetListing, EscrowEntry, ResourceOffer, TrainingRequest};
use crate::error::{Result, TrustrainError};

/// Snapshot format version written by this build
pub const SNAPSHOT_VERSION: u32 = 1;

/// Highest id issued per collection, so ids are never reused after restore
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdCounters {
    pub offers: u64,
    pub datasets: u64,
    pub requests: u64,
}

/// Point-in-time copy of every collection the engine owns
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineSnapshot {
    pub version: u32,
    pub created_at: DateTime<Utc>,
    /// Registration order
    pub offers: Vec<ResourceOffer>,
    /// Publication order
    pub datasets: Vec<DatasetListing>,
    /// Submission order
    pub requests: Vec<TrainingRequest>,
    /// Ordered by context
    pub escrow: Vec<EscrowEntry>,
    /// Settled entries displaced by a reopened context, oldest first
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub escrow_history: Vec<EscrowEntry>,
    pub counters: IdCounters,
}

impl EngineSnapshot {
    pub fn empty() -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            created_at: Utc::now(),
            offers: Vec::new(),
            datasets: Vec::new(),
            requests: Vec::new(),
            escrow: Vec::new(),
            escrow_history: Vec::new(),
            counters: IdCounters::default(),
        }
    }

    /// SHA-256 over the compact JSON form, hex encoded
    pub fn checksum(&self) -> Result<String> {
        let bytes = serde_json::to_vec(self)?;
        Ok(hex::encode(Sha256::digest(&bytes)))
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    checksum: String,
    snapshot: EngineSnapshot,
}

/// A snapshot stored at a fixed path
#[derive(Debug, Clone)]
pub struct SnapshotFile {
    path: PathBuf,
}

impl SnapshotFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    /// Load the stored snapshot; `None` when nothing has been saved yet
    pub async fn load(&self) -> Result<Option<EngineSnapshot>> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No snapshot at {}, starting empty", self.path.display());
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let envelope: Envelope = serde_json::from_slice(&raw).map_err(|e| {
            error!("Unreadable snapshot {}: {}", self.path.display(), e);
            TrustrainError::Persistence(format!(
                "snapshot {} is not valid: {}",
                self.path.display(),
                e
            ))
        })?;

        if envelope.snapshot.version > SNAPSHOT_VERSION {
            return Err(TrustrainError::Persistence(format!(
                "snapshot {} has version {}, this build reads up to {}",
                self.path.display(),
                envelope.snapshot.version,
                SNAPSHOT_VERSION
            )));
        }

        let actual = envelope.snapshot.checksum()?;
        if actual != envelope.checksum {
            error!(
                "Checksum mismatch for {}: stored {}, computed {}",
                self.path.display(),
                envelope.checksum,
                actual
            );
            return Err(TrustrainError::Persistence(format!(
                "snapshot {} failed checksum verification",
                self.path.display()
            )));
        }

        debug!(
            "Loaded snapshot {} ({} offers, {} datasets, {} requests, {} escrow entries)",
            self.path.display(),
            envelope.snapshot.offers.len(),
            envelope.snapshot.datasets.len(),
            envelope.snapshot.requests.len(),
            envelope.snapshot.escrow.len()
        );
        Ok(Some(envelope.snapshot))
    }

    /// Write the snapshot, replacing any previous one atomically
    pub async fn save(&self, snapshot: &EngineSnapshot) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let envelope = Envelope {
            checksum: snapshot.checksum()?,
            snapshot: snapshot.clone(),
        };
        let body = serde_json::to_vec_pretty(&envelope)?;

        let temp = self.temp_path();
        tokio::fs::write(&temp, &body).await?;
        if let Err(e) = tokio::fs::rename(&temp, &self.path).await {
            error!("Failed to move snapshot into {}: {}", self.path.display(), e);
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(e.into());
        }

        info!("Saved snapshot to {}", self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Address, ContextId, OfferId, NewOffer, RequestId, StorageType};

    fn scratch_path() -> PathBuf {
        std::env::temp_dir()
            .join(format!("trustrain-snapshot-{}", uuid::Uuid::new_v4()))
            .join("state.json")
    }

    fn sample() -> EngineSnapshot {
        let mut snapshot = EngineSnapshot::empty();
        for (id, gpu) in [(2, "A100"), (1, "H100")] {
            snapshot.offers.push(ResourceOffer::from_new(
                OfferId(id),
                Address::from("0xprovider"),
                NewOffer {
                    cpu: "EPYC".to_string(),
                    gpu: gpu.to_string(),
                    ram_gb: 64,
                    storage_gb: 1000,
                    storage_type: StorageType::Hdd,
                    is_external: false,
                },
            ));
        }
        snapshot.escrow.push(EscrowEntry::open(
            Address::from("0xtrainer"),
            Address::from("0xprovider"),
            ContextId::training(RequestId(1)),
            25,
        ));
        snapshot.counters = IdCounters {
            offers: 2,
            datasets: 0,
            requests: 1,
        };
        snapshot
    }

    #[tokio::test]
    async fn test_missing_file_loads_as_none() {
        let file = SnapshotFile::new(scratch_path());
        assert!(file.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_then_load_preserves_order() {
        let path = scratch_path();
        let file = SnapshotFile::new(&path);
        let snapshot = sample();

        file.save(&snapshot).await.unwrap();
        let loaded = file.load().await.unwrap().unwrap();

        assert_eq!(loaded, snapshot);
        assert_eq!(loaded.offers[0].id, OfferId(2));
        assert!(!file.temp_path().exists());

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[tokio::test]
    async fn test_tampered_snapshot_is_rejected() {
        let path = scratch_path();
        let file = SnapshotFile::new(&path);
        file.save(&sample()).await.unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        std::fs::write(&path, raw.replace("\"amount_owed\": 25", "\"amount_owed\": 1")).unwrap();

        let err = file.load().await.unwrap_err();
        assert!(matches!(err, TrustrainError::Persistence(_)));

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[tokio::test]
    async fn test_garbage_is_a_persistence_error() {
        let path = scratch_path();
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"not json").unwrap();

        let err = SnapshotFile::new(&path).load().await.unwrap_err();
        assert!(matches!(err, TrustrainError::Persistence(_)));

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }
}
