//! Load requests and their results.

use std::path::PathBuf;

use crate::error::BlockReadError;
use crate::types::{BlockId, Point};

/// Where a loaded block is installed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Destination {
  /// Primary slot at this index.
  Slot(usize),
  /// The warm subslot tier.
  Subslot,
}

/// Request to read the first `count` points of one block file.
#[derive(Debug)]
pub struct Job {
  pub block_id: BlockId,
  pub destination: Destination,
  /// Points to read, at most the slot capacity.
  pub count: u32,
  pub path: PathBuf,
  /// Recycled storage for the result; cleared before reading.
  pub buffer: Vec<Point>,
}

/// Outcome of a [`Job`]. Always produced, even on failure.
#[derive(Debug)]
pub struct LoadResult {
  pub block_id: BlockId,
  pub destination: Destination,
  /// Loaded points; empty when `error` is set.
  pub points: Vec<Point>,
  pub error: Option<BlockReadError>,
  /// Wall time spent reading, in microseconds.
  pub load_us: u64,
}

impl LoadResult {
  #[inline]
  pub fn is_ok(&self) -> bool {
    self.error.is_none()
  }
}
