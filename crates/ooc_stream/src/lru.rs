//! Index-based LRU list keyed by block id.
//!
//! Nodes live in a dense arena (`Vec`) and link to each other by index, with a
//! `BlockId → index` map for O(1) lookup. Removal swap-removes the node and
//! re-points the neighbours of whichever node moved into the hole, so the
//! arena never has vacant entries.
//!
//! ```text
//!   head (LRU)                                  tail (MRU)
//!      │                                           │
//!      ▼                                           ▼
//!   ┌──────┐ next ┌──────┐ next ┌──────┐ next ┌──────┐
//!   │ id 4 │─────▶│ id 9 │─────▶│ id 1 │─────▶│ id 7 │
//!   │      │◀─────│      │◀─────│      │◀─────│      │
//!   └──────┘ prev └──────┘ prev └──────┘ prev └──────┘
//! ```

use std::collections::HashMap;

use crate::types::BlockId;

/// Arena index of a node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct NodeIdx(u32);

struct Node<V> {
  key: BlockId,
  value: V,
  prev: Option<NodeIdx>,
  next: Option<NodeIdx>,
}

/// Doubly linked LRU list over an arena.
pub struct LruList<V> {
  nodes: Vec<Node<V>>,
  index: HashMap<BlockId, NodeIdx>,
  head: Option<NodeIdx>,
  tail: Option<NodeIdx>,
}

impl<V> Default for LruList<V> {
  fn default() -> Self {
    Self::new()
  }
}

impl<V> LruList<V> {
  pub fn new() -> Self {
    Self::with_capacity(0)
  }

  /// Pre-size the arena and index for `capacity` entries.
  pub fn with_capacity(capacity: usize) -> Self {
    Self {
      nodes: Vec::with_capacity(capacity),
      index: HashMap::with_capacity(capacity),
      head: None,
      tail: None,
    }
  }

  #[inline]
  pub fn len(&self) -> usize {
    self.index.len()
  }

  #[inline]
  pub fn is_empty(&self) -> bool {
    self.index.is_empty()
  }

  #[inline]
  pub fn contains(&self, key: BlockId) -> bool {
    self.index.contains_key(&key)
  }

  /// Insert `value` at the MRU end. An existing entry for `key` is replaced
  /// (and moved to MRU); its old value is returned.
  pub fn push_mru(&mut self, key: BlockId, value: V) -> Option<V> {
    if let Some(&idx) = self.index.get(&key) {
      let old = std::mem::replace(&mut self.nodes[idx.0 as usize].value, value);
      self.move_to_tail(idx);
      return Some(old);
    }

    self.insert_tail(key, value);
    None
  }

  /// Return the entry for `key` as MRU, creating it with `make` if absent.
  /// A failing `make` leaves the list untouched.
  pub fn get_or_try_insert_with<E>(
    &mut self,
    key: BlockId,
    make: impl FnOnce() -> Result<V, E>,
  ) -> Result<&mut V, E> {
    let idx = match self.index.get(&key) {
      Some(&idx) => {
        self.move_to_tail(idx);
        idx
      }
      None => {
        let value = make()?;
        self.insert_tail(key, value)
      }
    };
    Ok(&mut self.nodes[idx.0 as usize].value)
  }

  /// Mark `key` most recently used. Returns false if absent.
  pub fn touch(&mut self, key: BlockId) -> bool {
    match self.index.get(&key) {
      Some(&idx) => {
        self.move_to_tail(idx);
        true
      }
      None => false,
    }
  }

  /// Unlink `key` and return its value.
  pub fn remove(&mut self, key: BlockId) -> Option<V> {
    let idx = self.index.remove(&key)?;
    self.unlink(idx);
    Some(self.release(idx))
  }

  /// Remove the least recently used entry.
  pub fn pop_lru(&mut self) -> Option<(BlockId, V)> {
    let head = self.head?;
    let key = self.nodes[head.0 as usize].key;
    self.remove(key).map(|v| (key, v))
  }

  /// Key of the least recently used entry.
  pub fn peek_lru(&self) -> Option<BlockId> {
    self.head.map(|idx| self.nodes[idx.0 as usize].key)
  }

  pub fn get(&self, key: BlockId) -> Option<&V> {
    let idx = *self.index.get(&key)?;
    Some(&self.nodes[idx.0 as usize].value)
  }

  /// Mutable access without changing recency.
  pub fn get_mut(&mut self, key: BlockId) -> Option<&mut V> {
    let idx = *self.index.get(&key)?;
    Some(&mut self.nodes[idx.0 as usize].value)
  }

  /// Entries from least to most recently used.
  pub fn iter_lru_to_mru(&self) -> impl Iterator<Item = (BlockId, &V)> + '_ {
    let mut cursor = self.head;
    std::iter::from_fn(move || {
      let idx = cursor?;
      let node = &self.nodes[idx.0 as usize];
      cursor = node.next;
      Some((node.key, &node.value))
    })
  }

  /// Drop every entry, keeping arena capacity.
  pub fn clear(&mut self) {
    self.nodes.clear();
    self.index.clear();
    self.head = None;
    self.tail = None;
  }

  // ---------------------------------------------------------------------------
  // Arena internals
  // ---------------------------------------------------------------------------

  fn insert_tail(&mut self, key: BlockId, value: V) -> NodeIdx {
    let idx = NodeIdx(self.nodes.len() as u32);
    self.nodes.push(Node {
      key,
      value,
      prev: None,
      next: None,
    });
    self.link_tail(idx);
    self.index.insert(key, idx);
    idx
  }

  /// Swap-remove an unlinked node, patching the node moved into its place.
  fn release(&mut self, idx: NodeIdx) -> V {
    let last = self.nodes.len() - 1;
    let removed = self.nodes.swap_remove(idx.0 as usize);

    if idx.0 as usize != last {
      let (key, prev, next) = {
        let moved = &self.nodes[idx.0 as usize];
        (moved.key, moved.prev, moved.next)
      };
      match prev {
        Some(p) => self.nodes[p.0 as usize].next = Some(idx),
        None => self.head = Some(idx),
      }
      match next {
        Some(n) => self.nodes[n.0 as usize].prev = Some(idx),
        None => self.tail = Some(idx),
      }
      self.index.insert(key, idx);
    }

    removed.value
  }

  fn link_tail(&mut self, idx: NodeIdx) {
    let old_tail = self.tail;
    {
      let node = &mut self.nodes[idx.0 as usize];
      node.prev = old_tail;
      node.next = None;
    }
    match old_tail {
      Some(t) => self.nodes[t.0 as usize].next = Some(idx),
      None => self.head = Some(idx),
    }
    self.tail = Some(idx);
  }

  fn unlink(&mut self, idx: NodeIdx) {
    let (prev, next) = {
      let node = &self.nodes[idx.0 as usize];
      (node.prev, node.next)
    };
    match prev {
      Some(p) => self.nodes[p.0 as usize].next = next,
      None => self.head = next,
    }
    match next {
      Some(n) => self.nodes[n.0 as usize].prev = prev,
      None => self.tail = prev,
    }
    let node = &mut self.nodes[idx.0 as usize];
    node.prev = None;
    node.next = None;
  }

  fn move_to_tail(&mut self, idx: NodeIdx) {
    if self.tail == Some(idx) {
      return;
    }
    self.unlink(idx);
    self.link_tail(idx);
  }
}

#[cfg(test)]
#[path = "lru_test.rs"]
mod lru_test;
