//! Headless stand-in for a camera and frustum culler.
//!
//! A viewer circles the cloud in the XZ plane at the height of its center.
//! Blocks whose center lies within the view radius are visible, at their
//! Euclidean distance; all others are hidden with margin `radius - distance`.

use std::f32::consts::TAU;

use glam::Vec3;
use ooc_stream::{Block, BlockCandidate, BlockManifest};

pub struct Orbit {
  center: Vec3,
  orbit_radius: f32,
  view_radius: f32,
  frames: u32,
}

impl Orbit {
  /// Orbit sized from the cloud's bounds.
  pub fn around(manifest: &BlockManifest, frames: u32, orbit_scale: f32, view_scale: f32) -> Self {
    let half_diagonal = ((manifest.bb_max - manifest.bb_min).length() * 0.5).max(f32::EPSILON);
    Self {
      center: (manifest.bb_min + manifest.bb_max) * 0.5,
      orbit_radius: half_diagonal * orbit_scale,
      view_radius: half_diagonal * view_scale,
      frames: frames.max(1),
    }
  }

  pub fn view_radius(&self) -> f32 {
    self.view_radius
  }

  /// Viewer position at `frame`, wrapping every full orbit.
  pub fn viewer(&self, frame: u32) -> Vec3 {
    let angle = TAU * (frame % self.frames) as f32 / self.frames as f32;
    self.center + Vec3::new(angle.cos(), 0.0, angle.sin()) * self.orbit_radius
  }

  /// Candidates for every non-empty block, refilled into `out`.
  pub fn candidates(&self, frame: u32, blocks: &[Block], out: &mut Vec<BlockCandidate>) {
    let viewer = self.viewer(frame);
    out.clear();
    out.extend(blocks.iter().filter(|b| !b.is_empty()).map(|b| {
      let distance = viewer.distance(b.center());
      if distance <= self.view_radius {
        BlockCandidate::visible(b.id, distance)
      } else {
        BlockCandidate::hidden(b.id, self.view_radius - distance)
      }
    }));
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn manifest() -> BlockManifest {
    let blocks = vec![
      Block {
        id: 0,
        bb_min: Vec3::new(-2.0, -1.0, -1.0),
        bb_max: Vec3::new(0.0, 1.0, 1.0),
        count: 10,
      },
      Block {
        id: 1,
        bb_min: Vec3::new(0.0, -1.0, -1.0),
        bb_max: Vec3::new(2.0, 1.0, 1.0),
        count: 10,
      },
      Block {
        id: 2,
        bb_min: Vec3::ZERO,
        bb_max: Vec3::ONE,
        count: 0,
      },
    ];
    BlockManifest {
      grid: 2,
      bb_min: Vec3::new(-2.0, -1.0, -1.0),
      bb_max: Vec3::new(2.0, 1.0, 1.0),
      total_points: 20,
      blocks,
    }
  }

  #[test]
  fn test_viewer_starts_on_positive_x() {
    let m = manifest();
    let orbit = Orbit::around(&m, 4, 2.0, 1.0);
    let v = orbit.viewer(0);
    assert!(v.x > 0.0);
    assert!(v.z.abs() < 1e-5);
    // Full orbit wraps
    assert!(orbit.viewer(4).distance(v) < 1e-5);
  }

  #[test]
  fn test_near_block_visible_far_block_hidden() {
    let m = manifest();
    // Viewer and view radius both at 1.5 half diagonals: block 1 (center x = 1)
    // is a unit inside, block 0 (center x = -1) a unit outside
    let orbit = Orbit::around(&m, 4, 1.5, 1.5);
    let mut c = Vec::new();
    orbit.candidates(0, &m.blocks, &mut c);

    // Empty block skipped
    assert_eq!(c.len(), 2);
    let near = c.iter().find(|c| c.id == 1).unwrap();
    let far = c.iter().find(|c| c.id == 0).unwrap();
    assert!(near.visible);
    assert!(!far.visible);
    assert!((far.distance + 1.0).abs() < 1e-4);
  }
}
