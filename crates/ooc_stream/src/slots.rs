//! Primary slots and the warm subslot tier.

use crate::lru::LruList;
use crate::types::{BlockId, Point};

/// Opaque renderer buffer id. One per slot, created at setup.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferHandle(pub u32);

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SlotStatus {
  #[default]
  Empty,
  /// A job targeting this slot is outstanding; contents are invalid.
  Loading,
  Loaded,
}

/// Renderer-visible residency unit.
///
/// The handle travels with the contents when slots are reordered, so moving
/// a block between slot indices never requires a re-upload.
#[derive(Debug)]
pub struct Slot {
  pub occupant: Option<BlockId>,
  pub count: u32,
  pub status: SlotStatus,
  pub points: Vec<Point>,
  pub handle: BufferHandle,
  /// Contents replaced during the current frame.
  pub changed: bool,
}

impl Slot {
  pub fn new(handle: BufferHandle) -> Self {
    Self {
      occupant: None,
      count: 0,
      status: SlotStatus::Empty,
      points: Vec::new(),
      handle,
      changed: false,
    }
  }

  #[inline]
  pub fn holds(&self, id: BlockId) -> bool {
    self.occupant == Some(id)
  }

  #[inline]
  pub fn is_loaded(&self) -> bool {
    self.status == SlotStatus::Loaded
  }

  /// Move a loaded occupant out as a subslot entry, leaving the slot empty.
  ///
  /// A slot that is not loaded is simply reset and yields nothing.
  pub fn evict(&mut self) -> Option<SubslotEntry> {
    let was_loaded = self.is_loaded();
    let occupant = self.occupant.take();
    let points = std::mem::take(&mut self.points);
    let count = std::mem::replace(&mut self.count, 0);
    self.status = SlotStatus::Empty;

    match occupant {
      Some(block_id) if was_loaded => Some(SubslotEntry {
        block_id,
        count,
        points,
      }),
      _ => None,
    }
  }

  /// Install a warm entry, returning the previous loaded occupant.
  pub fn fill(&mut self, entry: SubslotEntry) -> Option<SubslotEntry> {
    let previous = self.evict();
    self.occupant = Some(entry.block_id);
    self.count = entry.count;
    self.points = entry.points;
    self.status = SlotStatus::Loaded;
    self.changed = true;
    previous
  }

  /// Reserve the slot for `block_id` while its job is outstanding.
  pub fn mark_loading(&mut self, block_id: BlockId) {
    self.occupant = Some(block_id);
    self.count = 0;
    self.status = SlotStatus::Loading;
  }

  /// Install loaded points. Returns the buffer they replaced.
  pub fn complete(&mut self, points: Vec<Point>) -> Vec<Point> {
    let old = std::mem::replace(&mut self.points, points);
    self.count = self.points.len() as u32;
    self.status = SlotStatus::Loaded;
    self.changed = true;
    old
  }
}

/// Block data held in host memory only.
#[derive(Debug)]
pub struct SubslotEntry {
  pub block_id: BlockId,
  pub count: u32,
  pub points: Vec<Point>,
}

/// Capacity-bounded LRU of [`SubslotEntry`].
pub struct SubslotCache {
  capacity: usize,
  entries: LruList<SubslotEntry>,
}

impl SubslotCache {
  pub fn new(capacity: usize) -> Self {
    Self {
      capacity,
      entries: LruList::with_capacity(capacity),
    }
  }

  /// Insert as most recently used.
  ///
  /// Returns whatever had to leave: the LRU entry when full, a replaced
  /// entry for the same block, or `entry` itself when capacity is zero.
  pub fn put(&mut self, entry: SubslotEntry) -> Option<SubslotEntry> {
    if self.capacity == 0 {
      return Some(entry);
    }
    if self.entries.contains(entry.block_id) {
      return self.entries.push_mru(entry.block_id, entry);
    }

    let evicted = if self.entries.len() >= self.capacity {
      self.entries.pop_lru().map(|(_, e)| e)
    } else {
      None
    };
    self.entries.push_mru(entry.block_id, entry);
    assert!(
      self.entries.len() <= self.capacity,
      "subslot capacity exceeded"
    );
    evicted
  }

  /// Remove and return the entry for `id`.
  pub fn extract(&mut self, id: BlockId) -> Option<SubslotEntry> {
    self.entries.remove(id)
  }

  pub fn touch(&mut self, id: BlockId) -> bool {
    self.entries.touch(id)
  }

  #[inline]
  pub fn contains(&self, id: BlockId) -> bool {
    self.entries.contains(id)
  }

  /// Change capacity, returning entries evicted to fit.
  pub fn set_capacity(&mut self, capacity: usize) -> Vec<SubslotEntry> {
    self.capacity = capacity;
    let mut evicted = Vec::new();
    while self.entries.len() > capacity {
      if let Some((_, e)) = self.entries.pop_lru() {
        evicted.push(e);
      }
    }
    evicted
  }

  pub fn clear(&mut self) {
    self.entries.clear();
  }

  #[inline]
  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  #[inline]
  pub fn capacity(&self) -> usize {
    self.capacity
  }

  pub fn is_full(&self) -> bool {
    self.entries.len() >= self.capacity
  }

  /// Cached block ids, least recently used first.
  pub fn ids(&self) -> Vec<BlockId> {
    self.entries.iter_lru_to_mru().map(|(id, _)| id).collect()
  }
}
