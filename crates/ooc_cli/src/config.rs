//! Optional TOML configuration.
//!
//! Every section and field may be omitted; missing values fall back to the
//! library defaults. Command-line flags are applied on top afterwards.
//!
//! ```toml
//! [partition]
//! grid = 16
//! file_cache_capacity = 64
//!
//! [residency]
//! num_slots = 300
//! num_subslots = 32
//! # points_per_slot omitted: derived from the block table
//!
//! [stream]
//! num_workers = 8
//!
//! [replay]
//! frames = 720
//! view_scale = 0.4
//! ```

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use ooc_stream::{PartitionConfig, ResidencyConfig, StreamConfig, MAX_GRID};

/// Root configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
  pub partition: PartitionSection,
  pub residency: ResidencySection,
  pub stream: StreamSection,
  pub replay: ReplaySection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PartitionSection {
  pub grid: Option<u32>,
  pub file_cache_capacity: Option<usize>,
  pub flush_points: Option<usize>,
  pub batch_points: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResidencySection {
  pub num_slots: Option<usize>,
  pub num_subslots: Option<usize>,
  /// Fixed per-slot capacity. Derived from the block table when absent.
  pub points_per_slot: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StreamSection {
  pub num_workers: Option<usize>,
}

/// Headless orbit parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReplaySection {
  /// Frames per full orbit.
  pub frames: u32,
  /// Orbit radius as a multiple of the cloud's half diagonal.
  pub orbit_scale: f32,
  /// View radius as a multiple of the cloud's half diagonal.
  pub view_scale: f32,
}

impl Default for ReplaySection {
  fn default() -> Self {
    Self {
      frames: 360,
      orbit_scale: 1.2,
      view_scale: 0.8,
    }
  }
}

impl Config {
  /// Load configuration from a TOML file.
  pub fn load(path: &Path) -> Result<Self> {
    let content = std::fs::read_to_string(path)
      .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    let config: Config = toml::from_str(&content).context("Failed to parse config TOML")?;
    config.validate()?;
    Ok(config)
  }

  /// Load `path` if given, otherwise use defaults.
  pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
    match path {
      Some(path) => Self::load(path),
      None => Ok(Self::default()),
    }
  }

  fn validate(&self) -> Result<()> {
    if let Some(grid) = self.partition.grid {
      if grid == 0 || grid > MAX_GRID {
        anyhow::bail!("partition.grid must be within 1..={MAX_GRID}, got {grid}");
      }
    }
    if self.partition.file_cache_capacity == Some(0) {
      anyhow::bail!("partition.file_cache_capacity must be at least 1");
    }
    if self.partition.flush_points == Some(0) || self.partition.batch_points == Some(0) {
      anyhow::bail!("partition.flush_points and partition.batch_points must be non-zero");
    }
    if self.residency.points_per_slot == Some(0) {
      anyhow::bail!("residency.points_per_slot must be non-zero");
    }
    if self.stream.num_workers == Some(0) {
      anyhow::bail!("stream.num_workers must be at least 1");
    }
    if self.replay.frames == 0 {
      anyhow::bail!("replay.frames must be non-zero");
    }
    if !(self.replay.orbit_scale > 0.0 && self.replay.view_scale > 0.0) {
      anyhow::bail!("replay scales must be positive");
    }
    Ok(())
  }

  pub fn partition_config(&self) -> PartitionConfig {
    let defaults = PartitionConfig::default();
    let s = &self.partition;
    PartitionConfig {
      grid: s.grid.unwrap_or(defaults.grid),
      file_cache_capacity: s.file_cache_capacity.unwrap_or(defaults.file_cache_capacity),
      flush_points: s.flush_points.unwrap_or(defaults.flush_points),
      batch_points: s.batch_points.unwrap_or(defaults.batch_points),
    }
  }

  pub fn stream_config(&self) -> StreamConfig {
    let defaults = StreamConfig::default();
    let r = &self.residency;
    StreamConfig {
      residency: ResidencyConfig {
        num_slots: r.num_slots.unwrap_or(defaults.residency.num_slots),
        num_subslots: r.num_subslots.unwrap_or(defaults.residency.num_subslots),
        points_per_slot: r
          .points_per_slot
          .unwrap_or(defaults.residency.points_per_slot),
      },
      num_workers: self.stream.num_workers.unwrap_or(defaults.num_workers),
      derive_points_per_slot: r.points_per_slot.is_none(),
    }
  }
}
