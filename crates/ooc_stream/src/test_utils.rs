//! Test utilities: synthetic clouds, in-memory sources and a scripted loader.

use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};

use glam::{DVec3, Vec3};
use rand::prelude::*;

use crate::error::{BlockReadError, IngestError};
use crate::job::{Destination, Job, LoadResult};
use crate::ply::{write_ply_file, PointSource};
use crate::ranking::BlockCandidate;
use crate::residency::BlockLoader;
use crate::types::{Block, BlockId, Point, SourcePoint};

// =============================================================================
// Point fixtures
// =============================================================================

/// Random in-memory points with byte-exact colors.
pub fn random_points(n: usize, seed: u64) -> Vec<Point> {
  random_cloud(n, seed).iter().map(Point::from_source).collect()
}

/// Random source records inside `[-10, 10]³`.
pub fn random_cloud(n: usize, seed: u64) -> Vec<SourcePoint> {
  let mut rng = StdRng::seed_from_u64(seed);
  (0..n)
    .map(|_| SourcePoint {
      position: DVec3::new(
        rng.random_range(-10.0..10.0),
        rng.random_range(-10.0..10.0),
        rng.random_range(-10.0..10.0),
      ),
      rgb: [rng.random(), rng.random(), rng.random()],
    })
    .collect()
}

/// Write `points` as `cloud.ply` inside `dir`.
pub fn write_cloud(dir: &Path, points: &[SourcePoint]) -> PathBuf {
  let path = dir.join("cloud.ply");
  write_ply_file(&path, points).unwrap();
  path
}

// =============================================================================
// In-memory point source
// =============================================================================

/// [`PointSource`] over a `Vec`, optionally announcing a wrong count.
pub struct VecSource {
  points: Vec<SourcePoint>,
  declared: u64,
  cursor: usize,
}

impl VecSource {
  pub fn new(points: Vec<SourcePoint>) -> Self {
    let declared = points.len() as u64;
    Self {
      points,
      declared,
      cursor: 0,
    }
  }

  /// Header claims `declared` points regardless of the data.
  pub fn with_declared(points: Vec<SourcePoint>, declared: u64) -> Self {
    Self {
      declared,
      ..Self::new(points)
    }
  }
}

impl PointSource for VecSource {
  fn declared_count(&self) -> u64 {
    self.declared
  }

  fn rewind(&mut self) -> Result<(), IngestError> {
    self.cursor = 0;
    Ok(())
  }

  fn read_batch(&mut self, out: &mut Vec<SourcePoint>, max: usize) -> Result<usize, IngestError> {
    out.clear();
    let end = (self.cursor + max).min(self.points.len());
    out.extend_from_slice(&self.points[self.cursor..end]);
    let n = end - self.cursor;
    self.cursor = end;
    Ok(n)
  }
}

// =============================================================================
// Block tables and candidates
// =============================================================================

/// Dense table of `n` blocks, each holding `count` points.
pub fn uniform_blocks(n: u32, count: u32) -> Vec<Block> {
  (0..n)
    .map(|id| Block {
      id,
      bb_min: Vec3::splat(id as f32),
      bb_max: Vec3::splat(id as f32 + 1.0),
      count,
    })
    .collect()
}

/// Visible candidates in the given order, distance increasing.
pub fn visible(ids: &[BlockId]) -> Vec<BlockCandidate> {
  ids
    .iter()
    .enumerate()
    .map(|(rank, &id)| BlockCandidate::visible(id, rank as f32))
    .collect()
}

// =============================================================================
// Scripted loader
// =============================================================================

/// Synchronous [`BlockLoader`] that fabricates results on submit.
///
/// Results carry `count` points whose x coordinate equals the block id.
#[derive(Default)]
pub struct ScriptedLoader {
  /// Every job seen, in submission order.
  pub submitted: Vec<(BlockId, Destination, u32)>,
  /// Jobs that arrived with a preallocated buffer.
  pub recycled_buffers: usize,
  /// Blocks whose loads fail.
  pub failing: HashSet<BlockId>,
  /// Deliver results newest first.
  pub reverse: bool,
  /// Behave like a stopped queue.
  pub stopped: bool,
  pending: VecDeque<LoadResult>,
}

impl ScriptedLoader {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn failing(ids: &[BlockId]) -> Self {
    Self {
      failing: ids.iter().copied().collect(),
      ..Self::default()
    }
  }

  /// Deliver results newest first.
  pub fn reversed() -> Self {
    Self {
      reverse: true,
      ..Self::default()
    }
  }

  /// Accept jobs but never answer, like a stopped result queue.
  pub fn stopped() -> Self {
    Self {
      stopped: true,
      ..Self::default()
    }
  }

  /// Take the submission log, leaving it empty.
  pub fn take_submitted(&mut self) -> Vec<(BlockId, Destination, u32)> {
    std::mem::take(&mut self.submitted)
  }

  pub fn pending(&self) -> usize {
    self.pending.len()
  }
}

impl BlockLoader for ScriptedLoader {
  fn submit(&mut self, job: Job) {
    self.submitted.push((job.block_id, job.destination, job.count));
    if job.buffer.capacity() > 0 {
      self.recycled_buffers += 1;
    }

    let mut points = job.buffer;
    points.clear();
    let error = if self.failing.contains(&job.block_id) {
      Some(BlockReadError::Header { path: job.path })
    } else {
      points.extend((0..job.count).map(|i| Point {
        position: [job.block_id as f32, i as f32, 0.0],
        color: [1.0, 1.0, 1.0],
      }));
      None
    };

    self.pending.push_back(LoadResult {
      block_id: job.block_id,
      destination: job.destination,
      points,
      error,
      load_us: 1,
    });
  }

  fn next_result(&mut self) -> Option<LoadResult> {
    if self.stopped {
      return None;
    }
    if self.reverse {
      self.pending.pop_back()
    } else {
      self.pending.pop_front()
    }
  }
}
