//! Block table persisted next to the block files.

use std::fs;
use std::path::Path;

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::constants::MANIFEST_FILE_NAME;
use crate::error::ManifestError;
use crate::types::Block;

/// Everything a streaming session needs to start without re-partitioning.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BlockManifest {
  /// Grid resolution per axis.
  pub grid: u32,
  /// Global bounding box of the source cloud.
  pub bb_min: Vec3,
  pub bb_max: Vec3,
  pub total_points: u64,
  /// Full G³ table, empty cells included, indexed by block id.
  pub blocks: Vec<Block>,
}

impl BlockManifest {
  pub fn save(&self, dir: &Path) -> Result<(), ManifestError> {
    let json = serde_json::to_string_pretty(self)?;
    fs::write(dir.join(MANIFEST_FILE_NAME), json)?;
    Ok(())
  }

  pub fn load(dir: &Path) -> Result<Self, ManifestError> {
    let json = fs::read_to_string(dir.join(MANIFEST_FILE_NAME))?;
    Ok(serde_json::from_str(&json)?)
  }

  pub fn non_empty_blocks(&self) -> impl Iterator<Item = &Block> {
    self.blocks.iter().filter(|b| !b.is_empty())
  }
}
