//! Sparse matrix × vector multiplies that populate a cell.
//!
//! Each routine writes a contiguous range of parents into slices of the cell's temporary storage,
//! so the parent loop of one cell can be split across threads without locking.

use std::ops::Range;

use crate::chart::CellVector;
use crate::config::Objective;
use crate::cross_product::CrossProductVector;
use crate::grammar::Grammar;
use crate::packing::{PackedChildren, PackingFunction, RightChild};
use crate::utils::{log_sum_exp, NEG_INF};

/// Output slices for the parents in `parents`; slot `i` belongs to `parents.start + i`.
pub(crate) struct ParentSlices<'a> {
  pub parents: Range<u32>,
  pub probabilities: &'a mut [f32],
  pub children: &'a mut [PackedChildren],
  pub midpoints: &'a mut [u16],
}

impl<'a> ParentSlices<'a> {
  pub fn whole(v: &'a mut CellVector) -> Self {
    let len = v.len() as u32;
    let (probabilities, children, midpoints) = v.arrays_mut();
    Self {
      parents: 0..len,
      probabilities,
      children,
      midpoints,
    }
  }

  /// Cuts the slices at the boundaries of `ranges`, which must tile `self.parents` in order.
  pub fn split(self, ranges: &[Range<usize>]) -> Vec<ParentSlices<'a>> {
    let mut out = Vec::with_capacity(ranges.len());
    let (mut probabilities, mut children, mut midpoints) =
      (self.probabilities, self.children, self.midpoints);
    for range in ranges {
      let len = range.len();
      let (p, p_rest) = probabilities.split_at_mut(len);
      let (c, c_rest) = children.split_at_mut(len);
      let (m, m_rest) = midpoints.split_at_mut(len);
      out.push(ParentSlices {
        parents: self.parents.start + range.start as u32..self.parents.start + range.end as u32,
        probabilities: p,
        children: c,
        midpoints: m,
      });
      probabilities = p_rest;
      children = c_rest;
      midpoints = m_rest;
    }
    out
  }
}

/// Multiplies the binary rule matrix by the cross-product vector for each parent in `out`.
///
/// A parent keeps its prior value when no row entry has a finite joint probability.
pub(crate) fn binary_spmv(
  grammar: &Grammar,
  objective: Objective,
  cpv: &CrossProductVector,
  out: ParentSlices<'_>,
) {
  let matrix = grammar.binary_matrix();
  for (slot, parent) in out.parents.clone().enumerate() {
    let (keys, rule_probabilities) = matrix.row(parent as usize);

    let mut total = NEG_INF;
    let mut best = NEG_INF;
    let mut best_key = 0;
    for (&key, &rule_lp) in keys.iter().zip(rule_probabilities) {
      let joint = cpv.probability(key);
      if joint == NEG_INF {
        continue;
      }
      let x = rule_lp + joint;
      let individual = match objective {
        Objective::Viterbi => x,
        Objective::Inside => rule_lp + cpv.best_probability(key),
      };
      if individual > best {
        best = individual;
        best_key = key;
      }
      total = objective.combine(total, x);
    }

    if total != NEG_INF {
      out.probabilities[slot] = total;
      out.children[slot] = best_key;
      out.midpoints[slot] = cpv.midpoint(best_key);
    }
  }
}

/// Applies unary rules once, reading children from `snapshot` (the cell as it was before this
/// pass). A parent only takes a unary backpointer when the contribution strictly beats both its
/// snapshot value and every earlier unary contribution.
pub(crate) fn unary_spmv(
  grammar: &Grammar,
  objective: Objective,
  snapshot: &[f32],
  end: usize,
  out: ParentSlices<'_>,
) {
  let packing = grammar.packing();
  let matrix = grammar.unary_matrix();
  for (slot, parent) in out.parents.clone().enumerate() {
    let (children, rule_probabilities) = matrix.row(parent as usize);
    let mut best = out.probabilities[slot];
    for (&child, &rule_lp) in children.iter().zip(rule_probabilities) {
      let child_p = snapshot[child as usize];
      if child_p == NEG_INF {
        continue;
      }
      let x = rule_lp + child_p;
      if objective == Objective::Inside {
        out.probabilities[slot] = log_sum_exp(out.probabilities[slot], x);
      }
      if x > best {
        best = x;
        if objective == Objective::Viterbi {
          out.probabilities[slot] = x;
        }
        out.children[slot] = packing.pack_unary(child);
        out.midpoints[slot] = end as u16;
      }
    }
  }
}

/// Re-scores every unary entry of `cell` against its child's final entry.
///
/// The unary pass scores a parent from the child's snapshot value, but the child may itself take
/// a unary backpointer in the same pass. Walking each chain bottom-up makes every value the score
/// of the derivation its backpointers describe. Chains are acyclic: each link points at a child
/// whose snapshot value was strictly greater.
pub(crate) fn resolve_unary_chains(
  grammar: &Grammar,
  end: usize,
  cell: &mut CellVector,
  resolved: &mut Vec<bool>,
) {
  let packing = grammar.packing();
  let end = end as u16;
  let unary_child = |cell: &CellVector, nt: u32| {
    if cell.probability(nt) == NEG_INF || cell.midpoint(nt) != end {
      return None;
    }
    let key = cell.packed_children(nt);
    match packing.unpack_right_child(key) {
      RightChild::Unary => Some(packing.unpack_left_child(key)),
      _ => None,
    }
  };

  resolved.clear();
  resolved.resize(cell.len(), false);
  let mut chain = Vec::new();
  for nt in 0..cell.len() as u32 {
    let mut current = nt;
    while !resolved[current as usize] {
      resolved[current as usize] = true;
      match unary_child(&*cell, current) {
        Some(child) => {
          chain.push((current, child));
          current = child;
        }
        None => break,
      }
    }

    while let Some((parent, child)) = chain.pop() {
      let p = grammar.unary_log_probability(parent, child) + cell.probability(child);
      let key = cell.packed_children(parent);
      cell.set(parent, p, key, end);
    }
  }
}

/// Seeds a span-1 cell from the lexical productions of `word`. Words outside the lexicon leave
/// the cell empty.
pub(crate) fn seed_lexical(grammar: &Grammar, word: u32, end: usize, cell: &mut CellVector) {
  let productions = grammar.lexical_productions(word);
  if productions.is_empty() {
    return;
  }
  let key = grammar.packing().pack_lexical(word);
  for &(parent, lp) in productions {
    cell.set(parent, lp, key, end as u16);
  }
}
