//! Two-pass spatial partitioning of a point stream into block files.
//!
//! # Algorithm
//!
//! 1. **Bounds**: stream every point in fixed-size batches and reduce a global
//!    bounding box (per-batch reduction runs on rayon).
//! 2. **Assign**: rewind, compute each point's grid cell, append the converted
//!    record to that cell's in-memory buffer and flush full buffers through
//!    the [`FileStreamCache`].
//! 3. **Finalize**: flush leftovers, close all streams, patch each block
//!    file's count header and write the manifest.
//!
//! Cell indices are clamped into `[0, G-1]`, so points exactly on the upper
//! boundary land in the last cell.

use glam::{UVec3, Vec3};
use rayon::prelude::*;

use crate::block_store::{encode_points, BlockStore};
use crate::constants::{
  DEFAULT_BATCH_POINTS, DEFAULT_FILE_CACHE_CAPACITY, DEFAULT_FLUSH_POINTS, DEFAULT_GRID,
  MAX_GRID, MIN_CELL_SIZE,
};
use crate::error::IngestError;
use crate::file_cache::FileStreamCache;
use crate::manifest::BlockManifest;
use crate::ply::PointSource;
use crate::types::{linearize, Aabb, Block, BlockId, Point, SourcePoint};

/// Points per rayon task when reducing a batch.
const PAR_CHUNK: usize = 4096;

/// Partitioning parameters.
#[derive(Clone, Debug)]
pub struct PartitionConfig {
  /// Cells per axis (G). Produces G³ blocks.
  pub grid: u32,

  /// Output streams kept open at once.
  pub file_cache_capacity: usize,

  /// Per-block buffer size that triggers a write.
  pub flush_points: usize,

  /// Points read from the source per batch.
  pub batch_points: usize,
}

impl Default for PartitionConfig {
  fn default() -> Self {
    Self {
      grid: DEFAULT_GRID,
      file_cache_capacity: DEFAULT_FILE_CACHE_CAPACITY,
      flush_points: DEFAULT_FLUSH_POINTS,
      batch_points: DEFAULT_BATCH_POINTS,
    }
  }
}

impl PartitionConfig {
  /// Total number of grid cells.
  #[inline]
  pub fn num_blocks(&self) -> usize {
    (self.grid as usize).pow(3)
  }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PartitionPhase {
  Bounds,
  Assign,
  Finalize,
}

/// Progress callback payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PartitionProgress {
  pub phase: PartitionPhase,
  pub points_done: u64,
  pub points_total: u64,
}

/// Result of a successful partition.
#[derive(Clone, Debug)]
pub struct PartitionOutput {
  /// G³ blocks indexed by id, empty cells included.
  pub blocks: Vec<Block>,
  pub bounds: Aabb,
  pub total_points: u64,
  pub non_empty_blocks: usize,
}

/// Uniform grid over the cloud bounds.
#[derive(Clone, Copy, Debug)]
struct Grid {
  origin: Vec3,
  cell: Vec3,
  resolution: u32,
}

impl Grid {
  fn new(bounds: &Aabb, resolution: u32) -> Self {
    let cell = (bounds.extent() / resolution as f32).max(Vec3::splat(MIN_CELL_SIZE));
    Self {
      origin: bounds.min,
      cell,
      resolution,
    }
  }

  #[inline]
  fn cell_of(&self, p: Vec3) -> UVec3 {
    let max = (self.resolution - 1) as f32;
    ((p - self.origin) / self.cell)
      .floor()
      .clamp(Vec3::ZERO, Vec3::splat(max))
      .as_uvec3()
  }

  #[inline]
  fn block_of(&self, p: Vec3) -> BlockId {
    let c = self.cell_of(p);
    linearize(c.x, c.y, c.z, self.resolution)
  }

  fn block_bounds(&self, id: BlockId) -> (Vec3, Vec3) {
    let (x, y, z) = crate::types::delinearize(id, self.resolution);
    let min = self.origin + UVec3::new(x, y, z).as_vec3() * self.cell;
    (min, min + self.cell)
  }
}

/// Splits a point stream into G³ block files inside a [`BlockStore`].
pub struct BlockPartitioner {
  store: BlockStore,
  config: PartitionConfig,
}

impl BlockPartitioner {
  pub fn new(store: BlockStore, config: PartitionConfig) -> Self {
    assert!(
      config.grid > 0 && config.grid <= MAX_GRID,
      "grid resolution must be within 1..={MAX_GRID}"
    );
    assert!(config.flush_points > 0 && config.batch_points > 0);
    Self { store, config }
  }

  pub fn config(&self) -> &PartitionConfig {
    &self.config
  }

  pub fn partition(&self, source: &mut impl PointSource) -> Result<PartitionOutput, IngestError> {
    self.partition_with_progress(source, |_| {})
  }

  /// Partition, reporting progress after every batch.
  pub fn partition_with_progress(
    &self,
    source: &mut impl PointSource,
    mut progress: impl FnMut(PartitionProgress),
  ) -> Result<PartitionOutput, IngestError> {
    let mut blocks = Vec::new();
    let (bounds, total_points) = self.run(source, &mut blocks, &mut progress)?;
    let non_empty_blocks = blocks.iter().filter(|b| !b.is_empty()).count();

    Ok(PartitionOutput {
      blocks,
      bounds,
      total_points,
      non_empty_blocks,
    })
  }

  /// Partition into a caller-owned block table, which is cleared and filled
  /// with all G³ blocks. Returns the global bounds.
  pub fn partition_into(
    &self,
    source: &mut impl PointSource,
    blocks: &mut Vec<Block>,
  ) -> Result<Aabb, IngestError> {
    self.run(source, blocks, &mut |_: PartitionProgress| {}).map(|(bounds, _)| bounds)
  }

  #[cfg_attr(feature = "profiling", tracing::instrument(skip_all, name = "partition::run"))]
  fn run(
    &self,
    source: &mut impl PointSource,
    blocks: &mut Vec<Block>,
    progress: &mut dyn FnMut(PartitionProgress),
  ) -> Result<(Aabb, u64), IngestError> {
    let total = source.declared_count();
    tracing::info!(
      points = total,
      grid = self.config.grid,
      dir = %self.store.dir().display(),
      "partitioning point cloud"
    );

    let removed = self.store.remove_block_files()?;
    if removed > 0 {
      tracing::debug!(removed, "removed stale block files");
    }

    let bounds = self.compute_bounds(source, progress)?;
    tracing::info!(min = ?bounds.min, max = ?bounds.max, "computed bounds");

    let grid = Grid::new(&bounds, self.config.grid);
    let counts = self.write_blocks(source, &grid, progress)?;

    blocks.clear();
    blocks.extend(counts.iter().enumerate().map(|(id, &count)| {
      let id = id as BlockId;
      let (bb_min, bb_max) = grid.block_bounds(id);
      Block {
        id,
        bb_min,
        bb_max,
        count,
      }
    }));

    BlockManifest {
      grid: self.config.grid,
      bb_min: bounds.min,
      bb_max: bounds.max,
      total_points: total,
      blocks: blocks.clone(),
    }
    .save(self.store.dir())?;

    progress(PartitionProgress {
      phase: PartitionPhase::Finalize,
      points_done: total,
      points_total: total,
    });
    tracing::info!(
      non_empty = blocks.iter().filter(|b| !b.is_empty()).count(),
      "partitioning complete"
    );

    Ok((bounds, total))
  }

  /// Pass 1: global bounding box.
  fn compute_bounds(
    &self,
    source: &mut impl PointSource,
    progress: &mut dyn FnMut(PartitionProgress),
  ) -> Result<Aabb, IngestError> {
    #[cfg(feature = "profiling")]
    let _span = tracing::info_span!("compute_bounds").entered();

    let total = source.declared_count();
    let mut batch: Vec<SourcePoint> = Vec::with_capacity(self.config.batch_points);
    let mut bounds = Aabb::empty();
    let mut done = 0u64;

    source.rewind()?;
    loop {
      let n = source.read_batch(&mut batch, self.config.batch_points)?;
      if n == 0 {
        break;
      }
      let local = batch
        .par_chunks(PAR_CHUNK)
        .map(|chunk| {
          chunk.iter().fold(Aabb::empty(), |mut bb, p| {
            bb.expand(p.position.as_vec3());
            bb
          })
        })
        .reduce(Aabb::empty, Aabb::merge);
      bounds = bounds.merge(local);

      done += n as u64;
      progress(PartitionProgress {
        phase: PartitionPhase::Bounds,
        points_done: done,
        points_total: total,
      });
    }

    if done != total {
      return Err(IngestError::ShortRead {
        expected: total,
        available: done,
      });
    }
    if done == 0 {
      return Err(IngestError::EmptyCloud);
    }
    Ok(bounds)
  }

  /// Pass 2: cell assignment and block writing. Returns per-block counts.
  fn write_blocks(
    &self,
    source: &mut impl PointSource,
    grid: &Grid,
    progress: &mut dyn FnMut(PartitionProgress),
  ) -> Result<Vec<u32>, IngestError> {
    #[cfg(feature = "profiling")]
    let _span = tracing::info_span!("write_blocks").entered();

    let total = source.declared_count();
    let num_blocks = self.config.num_blocks();
    let flush_points = self.config.flush_points;

    let mut cache = FileStreamCache::new(self.store.clone(), self.config.file_cache_capacity);
    let mut buffers: Vec<Vec<Point>> = (0..num_blocks).map(|_| Vec::new()).collect();
    let mut counts = vec![0u32; num_blocks];
    let mut batch: Vec<SourcePoint> = Vec::with_capacity(self.config.batch_points);
    let mut ids: Vec<BlockId> = Vec::with_capacity(self.config.batch_points);
    let mut scratch: Vec<u8> = Vec::new();
    let mut done = 0u64;

    source.rewind()?;
    loop {
      let n = source.read_batch(&mut batch, self.config.batch_points)?;
      if n == 0 {
        break;
      }

      batch
        .par_iter()
        .map(|p| grid.block_of(p.position.as_vec3()))
        .collect_into_vec(&mut ids);

      for (p, &id) in batch.iter().zip(&ids) {
        let buf = &mut buffers[id as usize];
        if buf.capacity() == 0 {
          buf.reserve_exact(flush_points);
        }
        buf.push(Point::from_source(p));
        counts[id as usize] += 1;

        if buf.len() >= flush_points {
          flush_block(&mut cache, id, buf, &mut scratch)?;
        }
      }

      done += n as u64;
      progress(PartitionProgress {
        phase: PartitionPhase::Assign,
        points_done: done,
        points_total: total,
      });
    }

    if done != total {
      return Err(IngestError::ShortRead {
        expected: total,
        available: done,
      });
    }

    for (id, buf) in buffers.iter_mut().enumerate() {
      if !buf.is_empty() {
        flush_block(&mut cache, id as BlockId, buf, &mut scratch)?;
      }
    }
    cache.close_all()?;

    for (id, &count) in counts.iter().enumerate() {
      if count > 0 {
        self.store.patch_count(id as BlockId, count)?;
      }
    }

    Ok(counts)
  }
}

/// Write `buf` through the stream cache and clear it, keeping its capacity.
fn flush_block(
  cache: &mut FileStreamCache,
  id: BlockId,
  buf: &mut Vec<Point>,
  scratch: &mut Vec<u8>,
) -> Result<(), IngestError> {
  scratch.clear();
  encode_points(buf, scratch);
  cache.write(id, scratch)?;
  buf.clear();
  Ok(())
}

#[cfg(test)]
#[path = "partition_test.rs"]
mod partition_test;
