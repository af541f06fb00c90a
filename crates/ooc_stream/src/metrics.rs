//! Streaming statistics.
//!
//! Compiled in by the `metrics` feature and toggled at runtime through
//! [`COLLECT_METRICS`]. With the feature off every `record_*` call is a no-op.
//!
//! # Usage
//!
//! ```ignore
//! use ooc_stream::metrics::COLLECT_METRICS;
//!
//! COLLECT_METRICS.store(false, Ordering::Relaxed);
//!
//! let report = session.frame(&mut candidates);
//! println!("hit rate {:.1}%", session.metrics().hit_rate() * 100.0);
//! ```

use std::collections::VecDeque;
use std::sync::atomic::AtomicBool;
#[cfg(feature = "metrics")]
use std::sync::atomic::Ordering;

use crate::residency::FrameReport;

/// Runtime toggle for metrics collection.
pub static COLLECT_METRICS: AtomicBool = AtomicBool::new(true);

/// Metrics compiled in and switched on.
#[inline]
pub fn is_enabled() -> bool {
  #[cfg(feature = "metrics")]
  {
    COLLECT_METRICS.load(Ordering::Relaxed)
  }
  #[cfg(not(feature = "metrics"))]
  {
    false
  }
}

/// Fixed-capacity history of recent samples.
#[derive(Debug, Clone)]
pub struct RollingWindow<T> {
  buffer: VecDeque<T>,
  capacity: usize,
}

impl<T> RollingWindow<T> {
  pub fn new(capacity: usize) -> Self {
    Self {
      buffer: VecDeque::with_capacity(capacity),
      capacity,
    }
  }

  /// Append, dropping the oldest sample when full.
  pub fn push(&mut self, value: T) {
    if self.capacity == 0 {
      return;
    }
    if self.buffer.len() >= self.capacity {
      self.buffer.pop_front();
    }
    self.buffer.push_back(value);
  }

  pub fn len(&self) -> usize {
    self.buffer.len()
  }

  pub fn is_empty(&self) -> bool {
    self.buffer.is_empty()
  }

  pub fn clear(&mut self) {
    self.buffer.clear();
  }

  /// Oldest to newest.
  pub fn iter(&self) -> impl Iterator<Item = &T> {
    self.buffer.iter()
  }

  pub fn last(&self) -> Option<&T> {
    self.buffer.back()
  }
}

impl RollingWindow<u64> {
  pub fn sum(&self) -> u64 {
    self.buffer.iter().sum()
  }

  pub fn average(&self) -> f64 {
    if self.buffer.is_empty() {
      0.0
    } else {
      self.sum() as f64 / self.buffer.len() as f64
    }
  }

  pub fn min_max(&self) -> Option<(u64, u64)> {
    let min = *self.buffer.iter().min()?;
    let max = *self.buffer.iter().max()?;
    Some((min, max))
  }
}

impl Default for RollingWindow<u64> {
  fn default() -> Self {
    Self::new(128)
  }
}

/// Cumulative counters plus rolling timings, fed one [`FrameReport`] at a
/// time.
#[derive(Debug, Clone, Default)]
pub struct StreamingMetrics {
  pub frames: u64,
  pub jobs_issued: u64,
  pub slot_hits: u64,
  pub subslot_hits: u64,
  pub misses: u64,
  /// Empty blocks settled without a read.
  pub empty_blocks: u64,
  pub backfill_jobs: u64,
  pub failed_loads: u64,
  pub duplicates_skipped: u64,
  /// Slots re-uploaded after their contents changed.
  pub slot_uploads: u64,

  /// Mean worker read time per result, one sample per frame with loads.
  pub load_timings: RollingWindow<u64>,
  /// Time the frame thread spent blocked on results.
  pub drain_timings: RollingWindow<u64>,
  /// Whole `frame` call.
  pub frame_timings: RollingWindow<u64>,
}

impl StreamingMetrics {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn record_frame(&mut self, report: &FrameReport, frame_us: u64) {
    if !is_enabled() {
      return;
    }

    self.frames += 1;
    self.jobs_issued += report.jobs_issued as u64;
    self.slot_hits += report.slot_hits as u64;
    self.subslot_hits += report.subslot_hits as u64;
    self.misses += report.misses as u64;
    self.empty_blocks += report.empty_blocks as u64;
    self.backfill_jobs += report.backfill_jobs as u64;
    self.failed_loads += report.failed_loads as u64;
    self.duplicates_skipped += report.duplicates_skipped as u64;
    self.slot_uploads += report.changed_slots as u64;

    if report.results_drained > 0 {
      self
        .load_timings
        .push(report.load_us / report.results_drained as u64);
    }
    self.drain_timings.push(report.drain_us);
    self.frame_timings.push(frame_us);
  }

  /// Fraction of slot requests served without a disk read.
  pub fn hit_rate(&self) -> f64 {
    let hits = self.slot_hits + self.subslot_hits;
    let total = hits + self.misses;
    if total == 0 {
      0.0
    } else {
      hits as f64 / total as f64
    }
  }

  /// Clear rolling timings; cumulative counters are kept.
  pub fn reset_timings(&mut self) {
    self.load_timings.clear();
    self.drain_timings.clear();
    self.frame_timings.clear();
  }
}
