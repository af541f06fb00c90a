//! Session wiring: residency cache, job/result queues and the worker pool.
//!
//! The render thread owns the session and calls [`StreamingSession::frame`]
//! once per frame; workers only ever see jobs and produce results.

use std::io;
use std::path::Path;
use std::sync::Arc;

use web_time::Instant;

use crate::block_store::BlockStore;
use crate::constants::DEFAULT_NUM_WORKERS;
use crate::error::SessionError;
use crate::manifest::BlockManifest;
use crate::metrics::StreamingMetrics;
use crate::queue::WorkQueue;
use crate::ranking::{rank_candidates, BlockCandidate};
use crate::residency::{FrameReport, QueueLoader, ResidencyCache, ResidencyConfig, SlotView};
use crate::types::Block;
use crate::worker::WorkerPool;

/// Session parameters.
#[derive(Clone, Debug)]
pub struct StreamConfig {
  pub residency: ResidencyConfig,

  /// Block-loading threads.
  pub num_workers: usize,

  /// Replace `residency.points_per_slot` with the average non-empty block
  /// size of the table at startup.
  pub derive_points_per_slot: bool,
}

impl Default for StreamConfig {
  fn default() -> Self {
    Self {
      residency: ResidencyConfig::default(),
      num_workers: DEFAULT_NUM_WORKERS,
      derive_points_per_slot: true,
    }
  }
}

pub struct StreamingSession {
  blocks: Vec<Block>,
  cache: ResidencyCache,
  loader: QueueLoader,
  pool: WorkerPool,
  metrics: StreamingMetrics,
  running: bool,
}

impl StreamingSession {
  /// Spawn the worker pool and set up empty tiers over `blocks`.
  pub fn start(config: StreamConfig, store: BlockStore, blocks: Vec<Block>) -> io::Result<Self> {
    let mut residency = config.residency;
    if config.derive_points_per_slot {
      residency = residency.with_derived_capacity(&blocks);
    }

    let jobs = Arc::new(WorkQueue::new());
    let results = Arc::new(WorkQueue::new());
    let pool = WorkerPool::spawn(config.num_workers, Arc::clone(&jobs), Arc::clone(&results))?;

    tracing::info!(
      blocks = blocks.len(),
      num_slots = residency.num_slots,
      num_subslots = residency.num_subslots,
      points_per_slot = residency.points_per_slot,
      "streaming session started"
    );

    Ok(Self {
      blocks,
      cache: ResidencyCache::new(residency, store),
      loader: QueueLoader::new(jobs, results),
      pool,
      metrics: StreamingMetrics::new(),
      running: true,
    })
  }

  /// Start from a directory written by the partitioner.
  pub fn from_manifest(config: StreamConfig, dir: impl AsRef<Path>) -> Result<Self, SessionError> {
    let dir = dir.as_ref();
    let manifest = BlockManifest::load(dir)?;
    let store = BlockStore::new(dir)?;
    Ok(Self::start(config, store, manifest.blocks)?)
  }

  /// Rank `candidates` in place, then reconcile residency against them.
  ///
  /// Blocks until every job issued this frame has been answered. After
  /// [`Self::quit`] this is a no-op returning an empty report.
  pub fn frame(&mut self, candidates: &mut [BlockCandidate]) -> FrameReport {
    if !self.running {
      return FrameReport::default();
    }

    let start = Instant::now();
    rank_candidates(candidates);
    let report = self
      .cache
      .update_frame(candidates, &self.blocks, &mut self.loader);
    self
      .metrics
      .record_frame(&report, start.elapsed().as_micros() as u64);
    report
  }

  pub fn drawable(&self) -> impl Iterator<Item = SlotView<'_>> + '_ {
    self.cache.drawable()
  }

  pub fn metrics(&self) -> &StreamingMetrics {
    &self.metrics
  }

  pub fn cache(&self) -> &ResidencyCache {
    &self.cache
  }

  pub fn blocks(&self) -> &[Block] {
    &self.blocks
  }

  /// Change tier sizes between frames.
  pub fn resize(&mut self, num_slots: usize, num_subslots: usize) {
    self.cache.resize(num_slots, num_subslots);
  }

  pub fn is_running(&self) -> bool {
    self.running
  }

  /// Stop both queues and join the workers. Idempotent.
  pub fn quit(&mut self) {
    if !self.running {
      return;
    }
    self.running = false;
    self.loader.stop();
    self.pool.shutdown();
    tracing::info!(frames = self.metrics.frames, "streaming session stopped");
  }
}

impl Drop for StreamingSession {
  fn drop(&mut self) {
    self.quit();
  }
}

#[cfg(test)]
#[path = "streaming_test.rs"]
mod streaming_test;
