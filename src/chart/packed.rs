use super::dense::CellVector;
use crate::packing::PackedChildren;

/// Storage for only the populated nonterminals of a cell. `nonterminals` is sorted, and serves
/// as the index into the three parallel arrays.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PackedStorage {
  nonterminals: Vec<u32>,
  probabilities: Vec<f32>,
  children: Vec<PackedChildren>,
  midpoints: Vec<u16>,
}

impl PackedStorage {
  pub fn from_vector(v: &CellVector) -> Self {
    let nonterminals = v.populated().collect::<Vec<_>>();
    let probabilities = nonterminals.iter().map(|&nt| v.probability(nt)).collect();
    let children = nonterminals.iter().map(|&nt| v.packed_children(nt)).collect();
    let midpoints = nonterminals.iter().map(|&nt| v.midpoint(nt)).collect();
    Self {
      nonterminals,
      probabilities,
      children,
      midpoints,
    }
  }

  pub fn len(&self) -> usize {
    self.nonterminals.len()
  }

  pub fn is_empty(&self) -> bool {
    self.nonterminals.is_empty()
  }

  /// Position of `nt` in the parallel arrays.
  #[inline]
  pub fn find(&self, nt: u32) -> Option<usize> {
    self.nonterminals.binary_search(&nt).ok()
  }

  pub fn nonterminal(&self, idx: usize) -> u32 {
    self.nonterminals[idx]
  }

  pub fn probability(&self, idx: usize) -> f32 {
    self.probabilities[idx]
  }

  pub fn packed_children(&self, idx: usize) -> PackedChildren {
    self.children[idx]
  }

  pub fn midpoint(&self, idx: usize) -> u16 {
    self.midpoints[idx]
  }
}
