//! Union of child-pair probabilities over every midpoint of a cell.

use crate::chart::ChartView;
use crate::config::Objective;
use crate::grammar::Grammar;
use crate::packing::{PackedChildren, PackingFunction};
use crate::utils::{log_sum_exp, NEG_INF};

/// Dense over the packed key space, reused from cell to cell.
///
/// For every packed `(left, right)` pair it holds the combined probability over all midpoints
/// tried so far and the midpoint of the single best split. Under [`Objective::Viterbi`] the two
/// coincide; under [`Objective::Inside`] `probabilities` is a log-sum and `best` keeps the
/// winning split's own score.
#[derive(Debug, Clone)]
pub struct CrossProductVector {
  probabilities: Vec<f32>,
  best: Vec<f32>,
  midpoints: Vec<u16>,
  populated: usize,
}

impl CrossProductVector {
  pub fn new(size: usize) -> Self {
    Self {
      probabilities: vec![NEG_INF; size],
      best: vec![NEG_INF; size],
      midpoints: vec![0; size],
      populated: 0,
    }
  }

  /// Resizes to `size` keys and clears every one to −∞.
  pub fn reset(&mut self, size: usize) {
    self.probabilities.clear();
    self.probabilities.resize(size, NEG_INF);
    self.best.clear();
    self.best.resize(size, NEG_INF);
    self.midpoints.clear();
    self.midpoints.resize(size, 0);
    self.populated = 0;
  }

  pub fn len(&self) -> usize {
    self.probabilities.len()
  }

  /// Number of keys holding a finite probability.
  pub fn populated(&self) -> usize {
    self.populated
  }

  pub fn is_empty(&self) -> bool {
    self.populated == 0
  }

  /// Combined probability of `key`, −∞ when absent or outside the key space.
  #[inline]
  pub fn probability(&self, key: PackedChildren) -> f32 {
    usize::try_from(key)
      .ok()
      .and_then(|k| self.probabilities.get(k))
      .copied()
      .unwrap_or(NEG_INF)
  }

  /// Score of the best single split of `key`.
  #[inline]
  pub fn best_probability(&self, key: PackedChildren) -> f32 {
    usize::try_from(key)
      .ok()
      .and_then(|k| self.best.get(k))
      .copied()
      .unwrap_or(NEG_INF)
  }

  /// Only meaningful when [`probability`](Self::probability) is finite.
  #[inline]
  pub fn midpoint(&self, key: PackedChildren) -> u16 {
    self.midpoints[key as usize]
  }

  #[inline]
  pub(crate) fn add(&mut self, objective: Objective, key: usize, probability: f32, midpoint: u16) {
    let current = self.probabilities[key];
    if current == NEG_INF {
      self.populated += 1;
      self.probabilities[key] = probability;
      self.best[key] = probability;
      self.midpoints[key] = midpoint;
      return;
    }

    // an equal score at a later midpoint never replaces the stored split
    if probability > self.best[key] {
      self.best[key] = probability;
      self.midpoints[key] = midpoint;
    }
    self.probabilities[key] = match objective {
      Objective::Viterbi => self.best[key],
      Objective::Inside => log_sum_exp(current, probability),
    };
  }
}

/// Fills `cpv` with the union of left × right child pairs over every midpoint of
/// `(start, end)`. All cells narrower than `end - start` must be finalized.
pub fn cross_product_union(
  view: ChartView<'_>,
  grammar: &Grammar,
  objective: Objective,
  start: usize,
  end: usize,
  cpv: &mut CrossProductVector,
) {
  let packing = grammar.packing();
  cpv.reset(packing.packed_array_size());

  for mid in start + 1..end {
    let left = view.get_cell(start, mid).valid_left_children();
    if left.is_empty() {
      continue;
    }
    let right = view.get_cell(mid, end).valid_right_children();
    if right.is_empty() {
      continue;
    }

    for (l, lp) in left.iter() {
      for (r, rp) in right.iter() {
        let key = packing.pack(l, r);
        if !packing.is_valid(key) {
          continue;
        }
        cpv.add(objective, key as usize, lp + rp, mid as u16);
      }
    }
  }

  tracing::trace!(start, end, pairs = cpv.populated(), "cross-product");
}
