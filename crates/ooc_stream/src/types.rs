//! Core data types shared by partitioning and streaming.

use glam::{DVec3, Vec3};
use serde::{Deserialize, Serialize};

use crate::constants::MAX_GRID;

/// Stable identifier of a grid block: `ix + G·iy + G²·iz`.
pub type BlockId = u32;

/// Linearize integer cell coordinates into a block id.
#[inline(always)]
pub fn linearize(ix: u32, iy: u32, iz: u32, grid: u32) -> BlockId {
  debug_assert!(grid <= MAX_GRID);
  ix + grid * iy + grid * grid * iz
}

/// Inverse of [`linearize`].
#[inline(always)]
pub fn delinearize(id: BlockId, grid: u32) -> (u32, u32, u32) {
  (id % grid, (id / grid) % grid, id / (grid * grid))
}

/// In-memory / GPU point layout.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Point {
  /// World-space position.
  pub position: [f32; 3],

  /// Normalized color, each channel in [0, 1].
  pub color: [f32; 3],
}

impl Point {
  /// Convert an ingestion record to the in-memory layout.
  #[inline]
  pub fn from_source(p: &SourcePoint) -> Self {
    let pos = p.position.as_vec3();
    Self {
      position: pos.to_array(),
      color: [
        p.rgb[0] as f32 / 255.0,
        p.rgb[1] as f32 / 255.0,
        p.rgb[2] as f32 / 255.0,
      ],
    }
  }

  /// Color quantized back to bytes. Exact inverse of the `/ 255` conversion.
  #[inline]
  pub fn rgb(&self) -> [u8; 3] {
    self.color.map(|c| (c * 255.0).round().clamp(0.0, 255.0) as u8)
  }
}

/// One record of the raw ingestion stream (double-precision position).
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SourcePoint {
  pub position: DVec3,
  pub rgb: [u8; 3],
}

/// Axis-aligned bounding box.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
  pub min: Vec3,
  pub max: Vec3,
}

impl Aabb {
  /// Create AABB with inverted extents (ready for expansion).
  pub fn empty() -> Self {
    Self {
      min: Vec3::splat(f32::INFINITY),
      max: Vec3::splat(f32::NEG_INFINITY),
    }
  }

  /// Create AABB from min/max corners.
  pub fn new(min: Vec3, max: Vec3) -> Self {
    Self { min, max }
  }

  /// True until at least one point has been added.
  pub fn is_empty(&self) -> bool {
    self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
  }

  /// Grow to contain `p`.
  #[inline]
  pub fn expand(&mut self, p: Vec3) {
    self.min = self.min.min(p);
    self.max = self.max.max(p);
  }

  /// Union of two boxes.
  #[inline]
  pub fn merge(self, other: Aabb) -> Aabb {
    Aabb {
      min: self.min.min(other.min),
      max: self.max.max(other.max),
    }
  }

  /// Edge lengths, zero for an empty box.
  pub fn extent(&self) -> Vec3 {
    if self.is_empty() {
      Vec3::ZERO
    } else {
      self.max - self.min
    }
  }

  pub fn center(&self) -> Vec3 {
    (self.min + self.max) * 0.5
  }
}

impl Default for Aabb {
  fn default() -> Self {
    Self::empty()
  }
}

/// A spatial partition of the cloud, stored as one block file.
///
/// Created once by the partitioner and never mutated afterwards. Per-frame
/// visibility lives in [`crate::ranking::BlockCandidate`].
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Block {
  pub id: BlockId,
  pub bb_min: Vec3,
  pub bb_max: Vec3,
  /// Points stored in the block file.
  pub count: u32,
}

impl Block {
  pub fn new(id: BlockId) -> Self {
    Self {
      id,
      bb_min: Vec3::ZERO,
      bb_max: Vec3::ZERO,
      count: 0,
    }
  }

  pub fn is_empty(&self) -> bool {
    self.count == 0
  }

  pub fn center(&self) -> Vec3 {
    (self.bb_min + self.bb_max) * 0.5
  }

  pub fn bounds(&self) -> Aabb {
    Aabb::new(self.bb_min, self.bb_max)
  }
}

#[cfg(test)]
#[path = "types_test.rs"]
mod types_test;
