//! Per-frame block ordering.
//!
//! Visible blocks come first, nearest first. Invisible blocks follow, ordered
//! by how close they are to entering the view: their `distance` is the signed
//! frustum margin (negative outside), ranked descending.

use std::cmp::Ordering;

use crate::types::BlockId;

/// Visibility verdict for one block, supplied by the culler each frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BlockCandidate {
  pub id: BlockId,
  pub visible: bool,
  /// Camera distance when visible, signed frustum margin otherwise.
  pub distance: f32,
}

impl BlockCandidate {
  pub fn visible(id: BlockId, distance: f32) -> Self {
    Self {
      id,
      visible: true,
      distance,
    }
  }

  pub fn hidden(id: BlockId, margin: f32) -> Self {
    Self {
      id,
      visible: false,
      distance: margin,
    }
  }
}

fn rank_order(a: &BlockCandidate, b: &BlockCandidate) -> Ordering {
  b.visible
    .cmp(&a.visible)
    .then_with(|| {
      if a.visible {
        a.distance.total_cmp(&b.distance)
      } else {
        b.distance.total_cmp(&a.distance)
      }
    })
    .then_with(|| a.id.cmp(&b.id))
}

/// Sort candidates into residency priority order.
pub fn rank_candidates(candidates: &mut [BlockCandidate]) {
  candidates.sort_by(rank_order);
}

/// Number of visible candidates.
pub fn visible_count(candidates: &[BlockCandidate]) -> usize {
  candidates.iter().filter(|c| c.visible).count()
}
