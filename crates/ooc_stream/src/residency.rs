//! Two-tier residency cache reconciled once per frame.
//!
//! # Frame Algorithm
//!
//! Given candidates already in rank order:
//!
//! 1. `limit = min(num_slots, visible)`; the first `limit` distinct visible
//!    blocks claim slots `0..limit` in rank order.
//! 2. For slot `i`, in priority order:
//!    - **Slot hit**: the block already sits in slot `j >= i`; swap `i` and
//!      `j`. A hit at `j < i` means the candidate is a duplicate and is
//!      skipped.
//!    - **Subslot hit**: move the warm entry into slot `i`; slot `i`'s loaded
//!      occupant goes to the subslot tier in its place.
//!    - **Miss**: offer the occupant to the subslot tier, mark slot `i`
//!      `Loading` and issue a job. Empty blocks have no file and settle at
//!      once with zero points.
//! 3. Once after setup or `resize`, backfill the subslot tier with the next
//!    ranked non-empty blocks not resident anywhere.
//! 4. Drain exactly as many results as jobs were issued and install each into
//!    the slot or subslot named by the result.
//!
//! A block is never in both tiers, and never has more than one outstanding
//! job. Exceeding a capacity is a bug and panics.

use std::collections::HashSet;
use std::sync::Arc;

use web_time::Instant;

use crate::block_store::BlockStore;
use crate::constants::{DEFAULT_NUM_SLOTS, DEFAULT_NUM_SUBSLOTS, DEFAULT_POINTS_PER_SLOT};
use crate::job::{Destination, Job, LoadResult};
use crate::queue::WorkQueue;
use crate::ranking::{visible_count, BlockCandidate};
use crate::slots::{BufferHandle, Slot, SlotStatus, SubslotCache, SubslotEntry};
use crate::types::{Block, BlockId, Point};

// =============================================================================
// Configuration
// =============================================================================

/// Tier sizes and per-slot point capacity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResidencyConfig {
  /// Renderer-visible slots.
  pub num_slots: usize,

  /// Host-memory warm entries.
  pub num_subslots: usize,

  /// Most points loaded for any one block.
  pub points_per_slot: u32,
}

impl Default for ResidencyConfig {
  fn default() -> Self {
    Self {
      num_slots: DEFAULT_NUM_SLOTS,
      num_subslots: DEFAULT_NUM_SUBSLOTS,
      points_per_slot: DEFAULT_POINTS_PER_SLOT,
    }
  }
}

impl ResidencyConfig {
  /// Average point count of the non-empty blocks, rounded up (at least 1).
  pub fn derive_points_per_slot(blocks: &[Block]) -> u32 {
    let (sum, n) = blocks
      .iter()
      .filter(|b| !b.is_empty())
      .fold((0u64, 0u64), |(sum, n), b| (sum + b.count as u64, n + 1));
    if n == 0 {
      return 1;
    }
    sum.div_ceil(n).clamp(1, u32::MAX as u64) as u32
  }

  /// Replace `points_per_slot` with [`Self::derive_points_per_slot`].
  pub fn with_derived_capacity(mut self, blocks: &[Block]) -> Self {
    self.points_per_slot = Self::derive_points_per_slot(blocks);
    self
  }
}

// =============================================================================
// Loader seam
// =============================================================================

/// Where jobs go and results come from.
pub trait BlockLoader {
  fn submit(&mut self, job: Job);

  /// Block for the next result. `None` if the loader has shut down.
  fn next_result(&mut self) -> Option<LoadResult>;
}

/// [`BlockLoader`] over the shared job and result queues.
#[derive(Clone)]
pub struct QueueLoader {
  jobs: Arc<WorkQueue<Job>>,
  results: Arc<WorkQueue<LoadResult>>,
}

impl QueueLoader {
  pub fn new(jobs: Arc<WorkQueue<Job>>, results: Arc<WorkQueue<LoadResult>>) -> Self {
    Self { jobs, results }
  }

  /// Wake any thread blocked on either queue; later pops drain then
  /// return `None`.
  pub fn stop(&self) {
    self.jobs.stop();
    self.results.stop();
  }
}

impl BlockLoader for QueueLoader {
  fn submit(&mut self, job: Job) {
    self.jobs.push(job);
  }

  fn next_result(&mut self) -> Option<LoadResult> {
    self.results.pop()
  }
}

// =============================================================================
// Reports and views
// =============================================================================

/// What one `update_frame` did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameReport {
  /// Visible candidates supplied.
  pub visible: usize,
  /// Slots claimed this frame.
  pub limit: usize,
  /// Jobs issued (primary misses plus backfill).
  pub jobs_issued: usize,
  pub slot_hits: usize,
  pub subslot_hits: usize,
  /// Primary misses.
  pub misses: usize,
  /// Empty blocks given a slot without a read.
  pub empty_blocks: usize,
  pub backfill_jobs: usize,
  pub results_drained: usize,
  pub failed_loads: usize,
  pub duplicates_skipped: usize,
  /// Slots whose contents changed and need re-upload.
  pub changed_slots: usize,
  /// Summed worker read time of drained results.
  pub load_us: u64,
  /// Time blocked draining results.
  pub drain_us: u64,
}

/// Draw data for one loaded slot.
#[derive(Clone, Copy, Debug)]
pub struct SlotView<'a> {
  pub slot: usize,
  pub handle: BufferHandle,
  pub block_id: BlockId,
  pub count: u32,
  pub points: &'a [Point],
  /// Re-upload required.
  pub changed: bool,
}

// =============================================================================
// Cache
// =============================================================================

pub struct ResidencyCache {
  config: ResidencyConfig,
  store: BlockStore,
  slots: Vec<Slot>,
  subslots: SubslotCache,
  in_flight: HashSet<BlockId>,
  /// Buffers freed by evictions, reused for the next jobs.
  spare_buffers: Vec<Vec<Point>>,
  next_handle: u32,
  backfill_pending: bool,
  frames: u64,
}

impl ResidencyCache {
  pub fn new(config: ResidencyConfig, store: BlockStore) -> Self {
    let mut cache = Self {
      subslots: SubslotCache::new(config.num_subslots),
      slots: Vec::with_capacity(config.num_slots),
      config,
      store,
      in_flight: HashSet::new(),
      spare_buffers: Vec::new(),
      next_handle: 0,
      backfill_pending: true,
      frames: 0,
    };
    cache.grow_slots(cache.config.num_slots);
    cache
  }

  pub fn config(&self) -> &ResidencyConfig {
    &self.config
  }

  pub fn slots(&self) -> &[Slot] {
    &self.slots
  }

  pub fn subslots(&self) -> &SubslotCache {
    &self.subslots
  }

  /// Frames reconciled so far.
  pub fn frames(&self) -> u64 {
    self.frames
  }

  /// Block resident in either tier (or loading into a slot).
  pub fn contains(&self, id: BlockId) -> bool {
    self.slot_of(id).is_some() || self.subslots.contains(id)
  }

  pub fn slot_of(&self, id: BlockId) -> Option<usize> {
    self.slots.iter().position(|s| s.holds(id))
  }

  pub fn in_flight(&self) -> usize {
    self.in_flight.len()
  }

  /// Reconcile residency against `ranked` (already in rank order).
  #[cfg_attr(feature = "profiling", tracing::instrument(skip_all, name = "residency::update_frame"))]
  pub fn update_frame(
    &mut self,
    ranked: &[BlockCandidate],
    blocks: &[Block],
    loader: &mut impl BlockLoader,
  ) -> FrameReport {
    self.frames += 1;
    for slot in &mut self.slots {
      slot.changed = false;
    }

    let mut report = FrameReport {
      visible: visible_count(ranked),
      ..Default::default()
    };
    report.limit = self.slots.len().min(report.visible);

    self.assign_slots(ranked, blocks, loader, &mut report);

    if self.backfill_pending {
      self.backfill_pending = false;
      self.backfill(ranked, blocks, loader, &mut report);
    }

    self.drain(loader, &mut report);

    report.changed_slots = self.slots.iter().filter(|s| s.changed).count();
    tracing::debug!(
      frame = self.frames,
      jobs = report.jobs_issued,
      slot_hits = report.slot_hits,
      subslot_hits = report.subslot_hits,
      misses = report.misses,
      "residency frame"
    );

    #[cfg(debug_assertions)]
    self.check_invariants();

    report
  }

  /// Loaded slots, in slot order.
  pub fn drawable(&self) -> impl Iterator<Item = SlotView<'_>> + '_ {
    self.slots.iter().enumerate().filter_map(|(i, s)| {
      let block_id = s.occupant?;
      s.is_loaded().then(|| SlotView {
        slot: i,
        handle: s.handle,
        block_id,
        count: s.count,
        points: &s.points,
        changed: s.changed,
      })
    })
  }

  /// Change tier sizes and re-arm the one-shot backfill.
  ///
  /// Slots past the new count are dropped together with their handles; new
  /// slots get fresh handles.
  pub fn resize(&mut self, num_slots: usize, num_subslots: usize) {
    assert!(
      self.in_flight.is_empty(),
      "resize while loads are outstanding"
    );
    self.config.num_slots = num_slots;
    self.config.num_subslots = num_subslots;

    if num_slots < self.slots.len() {
      let dropped: Vec<Slot> = self.slots.drain(num_slots..).collect();
      for mut slot in dropped {
        if let Some(entry) = slot.evict() {
          self.recycle(entry.points);
        }
      }
    } else {
      self.grow_slots(num_slots);
    }

    for entry in self.subslots.set_capacity(num_subslots) {
      self.recycle(entry.points);
    }

    self.backfill_pending = true;
    tracing::debug!(num_slots, num_subslots, "residency resized");
  }

  /// Panic if a block is resident twice or a tier exceeds its capacity.
  pub fn check_invariants(&self) {
    assert!(self.slots.len() == self.config.num_slots, "slot count drifted");
    assert!(
      self.subslots.len() <= self.subslots.capacity(),
      "subslot capacity exceeded"
    );

    let mut seen = HashSet::with_capacity(self.slots.len() + self.subslots.len());
    for slot in &self.slots {
      if let Some(id) = slot.occupant {
        assert!(seen.insert(id), "block {id} occupies two slots");
      }
    }
    for id in self.subslots.ids() {
      assert!(seen.insert(id), "block {id} is in a slot and a subslot");
    }
  }

  // ---------------------------------------------------------------------------
  // Frame phases
  // ---------------------------------------------------------------------------

  fn assign_slots(
    &mut self,
    ranked: &[BlockCandidate],
    blocks: &[Block],
    loader: &mut impl BlockLoader,
    report: &mut FrameReport,
  ) {
    let mut i = 0;
    for candidate in ranked.iter().take(report.visible) {
      if i >= report.limit {
        break;
      }
      let id = candidate.id;

      if let Some(j) = self.slot_of(id) {
        if j < i {
          report.duplicates_skipped += 1;
          continue;
        }
        self.slots.swap(i, j);
        report.slot_hits += 1;
      } else if let Some(entry) = self.subslots.extract(id) {
        if let Some(displaced) = self.slots[i].fill(entry) {
          self.offer_subslot(displaced);
        }
        report.subslot_hits += 1;
      } else {
        if self.in_flight.contains(&id) {
          report.duplicates_skipped += 1;
          continue;
        }
        let Some(block) = find_block(blocks, id) else {
          tracing::warn!(block = id, "candidate not in block table");
          continue;
        };
        if let Some(displaced) = self.slots[i].evict() {
          self.offer_subslot(displaced);
        }
        self.slots[i].mark_loading(id);
        if block.is_empty() {
          // Empty cells have no block file; settle without a read
          let old = self.slots[i].complete(Vec::new());
          self.recycle(old);
          report.empty_blocks += 1;
        } else {
          self.issue(block, Destination::Slot(i), loader);
          report.misses += 1;
          report.jobs_issued += 1;
        }
      }

      i += 1;
    }
  }

  fn backfill(
    &mut self,
    ranked: &[BlockCandidate],
    blocks: &[Block],
    loader: &mut impl BlockLoader,
    report: &mut FrameReport,
  ) {
    let mut room = self.subslots.capacity().saturating_sub(self.subslots.len());
    for candidate in ranked {
      if room == 0 {
        break;
      }
      let id = candidate.id;
      if self.contains(id) || self.in_flight.contains(&id) {
        continue;
      }
      let Some(block) = find_block(blocks, id) else {
        continue;
      };
      if block.is_empty() {
        continue;
      }
      self.issue(block, Destination::Subslot, loader);
      report.backfill_jobs += 1;
      report.jobs_issued += 1;
      room -= 1;
    }
  }

  fn drain(&mut self, loader: &mut impl BlockLoader, report: &mut FrameReport) {
    let start = Instant::now();
    for _ in 0..report.jobs_issued {
      let Some(result) = loader.next_result() else {
        tracing::warn!(
          missing = report.jobs_issued - report.results_drained,
          "loader stopped before all results arrived"
        );
        break;
      };
      report.results_drained += 1;
      report.load_us += result.load_us;
      if !result.is_ok() {
        report.failed_loads += 1;
      }
      self.install(result);
    }
    report.drain_us = start.elapsed().as_micros() as u64;
  }

  fn install(&mut self, result: LoadResult) {
    let LoadResult {
      block_id,
      destination,
      points,
      error,
      ..
    } = result;
    self.in_flight.remove(&block_id);

    match destination {
      Destination::Slot(i) => {
        let target = match self.slots.get(i) {
          Some(s) if s.holds(block_id) => Some(i),
          _ => self.slot_of(block_id),
        };
        match target {
          Some(t) if self.slots[t].status == SlotStatus::Loading => {
            // A failed load still settles the slot, with zero points
            let old = self.slots[t].complete(points);
            self.recycle(old);
          }
          _ => {
            tracing::warn!(block = block_id, slot = i, "dropping result for released slot");
            self.recycle(points);
          }
        }
      }
      Destination::Subslot => {
        if error.is_some() || self.slot_of(block_id).is_some() {
          self.recycle(points);
          return;
        }
        let entry = SubslotEntry {
          block_id,
          count: points.len() as u32,
          points,
        };
        if let Some(evicted) = self.subslots.put(entry) {
          self.recycle(evicted.points);
        }
      }
    }
  }

  // ---------------------------------------------------------------------------
  // Helpers
  // ---------------------------------------------------------------------------

  fn issue(&mut self, block: &Block, destination: Destination, loader: &mut impl BlockLoader) {
    debug_assert!(!self.in_flight.contains(&block.id));
    let buffer = self.spare_buffers.pop().unwrap_or_default();
    self.in_flight.insert(block.id);
    loader.submit(Job {
      block_id: block.id,
      destination,
      count: block.count.min(self.config.points_per_slot),
      path: self.store.path_for(block.id),
      buffer,
    });
  }

  fn offer_subslot(&mut self, entry: SubslotEntry) {
    if let Some(evicted) = self.subslots.put(entry) {
      self.recycle(evicted.points);
    }
  }

  fn recycle(&mut self, mut buffer: Vec<Point>) {
    let max_spare = self.config.num_slots + self.config.num_subslots;
    if buffer.capacity() > 0 && self.spare_buffers.len() < max_spare {
      buffer.clear();
      self.spare_buffers.push(buffer);
    }
  }

  fn grow_slots(&mut self, num_slots: usize) {
    while self.slots.len() < num_slots {
      let handle = BufferHandle(self.next_handle);
      self.next_handle += 1;
      self.slots.push(Slot::new(handle));
    }
  }
}

/// Look a block up by id; tables from the partitioner are indexed by id.
fn find_block(blocks: &[Block], id: BlockId) -> Option<&Block> {
  match blocks.get(id as usize) {
    Some(b) if b.id == id => Some(b),
    _ => blocks.iter().find(|b| b.id == id),
  }
}

#[cfg(test)]
#[path = "residency_test.rs"]
mod residency_test;
