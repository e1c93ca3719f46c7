//! Heightfield snapshots
//!
//! Terrain is the only state that outlives a run: particles are transient, but
//! the ground they deposited can be saved and restored.
//!
//! Features:
//! - Versioned JSON envelope
//! - Shape check before anything is overwritten
//! - Atomic save (write to `.tmp`, then rename over the target)

use std::io;
use std::path::Path;

use glam::{Vec2, Vec3};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::sim::terrain::{Heightfield, TerrainError};

/// Current snapshot format version
pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("snapshot I/O failed: {0}")]
    Io(#[from] io::Error),
    #[error("snapshot is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported snapshot version {found} (expected {})", SNAPSHOT_VERSION)]
    Version { found: u32 },
    #[error("snapshot does not fit this heightfield: {0}")]
    Terrain(#[from] TerrainError),
}

/// Committed heights of a heightfield plus the grid they belong to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeightSnapshot {
    pub version: u32,
    pub width: u32,
    pub depth: u32,
    pub spacing: Vec2,
    pub origin: Vec3,
    pub heights: Vec<f32>,
}

impl HeightSnapshot {
    /// Snapshot the committed heights (pending deposits are not included)
    pub fn capture(terrain: &Heightfield) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            width: terrain.width(),
            depth: terrain.depth(),
            spacing: terrain.spacing(),
            origin: terrain.origin(),
            heights: terrain.export_heights(),
        }
    }

    /// Rebuild a standalone heightfield from the snapshot
    pub fn to_heightfield(&self) -> Result<Heightfield, PersistenceError> {
        self.check_version()?;
        Ok(Heightfield::from_heights(
            self.width,
            self.depth,
            self.spacing,
            self.origin,
            self.heights.clone(),
        )?)
    }

    /// Overwrite `terrain`'s heights; the grid dimensions must match
    pub fn apply(&self, terrain: &mut Heightfield) -> Result<(), PersistenceError> {
        self.check_version()?;
        if self.width != terrain.width() || self.depth != terrain.depth() {
            return Err(TerrainError::ShapeMismatch {
                expected: terrain.heights().len(),
                got: self.width as usize * self.depth as usize,
            }
            .into());
        }
        if self.spacing != terrain.spacing() || self.origin != terrain.origin() {
            log::warn!(
                "snapshot grid placement differs (spacing {} origin {}), applying heights anyway",
                self.spacing,
                self.origin
            );
        }
        terrain.import_heights(&self.heights)?;
        Ok(())
    }

    fn check_version(&self) -> Result<(), PersistenceError> {
        if self.version != SNAPSHOT_VERSION {
            return Err(PersistenceError::Version {
                found: self.version,
            });
        }
        Ok(())
    }

    pub fn to_json(&self) -> Result<String, PersistenceError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, PersistenceError> {
        let snapshot: Self = serde_json::from_str(json)?;
        snapshot.check_version()?;
        Ok(snapshot)
    }

    /// Write the snapshot to `path` atomically
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), PersistenceError> {
        let path = path.as_ref();
        let json = self.to_json()?;
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, path)?;
        log::info!(
            "Height snapshot saved to {} ({}x{})",
            path.display(),
            self.width,
            self.depth
        );
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, PersistenceError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)?;
        let snapshot = Self::from_json(&json)?;
        log::info!("Height snapshot loaded from {}", path.display());
        Ok(snapshot)
    }
}
