use crate::packing::PackedChildren;
use crate::utils::NEG_INF;

/// One slot per nonterminal: inside probability, packed children and midpoint.
///
/// This is both the storage of a [`ChartLayout::Dense`](crate::ChartLayout::Dense) cell and the
/// temporary storage every cell is populated through.
#[derive(Debug, Clone, PartialEq)]
pub struct CellVector {
  pub(crate) probabilities: Vec<f32>,
  pub(crate) children: Vec<PackedChildren>,
  pub(crate) midpoints: Vec<u16>,
}

impl CellVector {
  pub fn new(num_nonterminals: usize) -> Self {
    Self {
      probabilities: vec![NEG_INF; num_nonterminals],
      children: vec![0; num_nonterminals],
      midpoints: vec![0; num_nonterminals],
    }
  }

  /// Resizes to `num_nonterminals` slots and clears every one of them to −∞.
  pub fn reset(&mut self, num_nonterminals: usize) {
    self.probabilities.clear();
    self.probabilities.resize(num_nonterminals, NEG_INF);
    self.children.clear();
    self.children.resize(num_nonterminals, 0);
    self.midpoints.clear();
    self.midpoints.resize(num_nonterminals, 0);
  }

  pub fn len(&self) -> usize {
    self.probabilities.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  #[inline]
  pub fn set(&mut self, nt: u32, probability: f32, children: PackedChildren, midpoint: u16) {
    let nt = nt as usize;
    self.probabilities[nt] = probability;
    self.children[nt] = children;
    self.midpoints[nt] = midpoint;
  }

  #[inline]
  pub fn probability(&self, nt: u32) -> f32 {
    self
      .probabilities
      .get(nt as usize)
      .copied()
      .unwrap_or(NEG_INF)
  }

  pub fn probabilities(&self) -> &[f32] {
    &self.probabilities
  }

  #[inline]
  pub fn packed_children(&self, nt: u32) -> PackedChildren {
    self.children[nt as usize]
  }

  #[inline]
  pub fn midpoint(&self, nt: u32) -> u16 {
    self.midpoints[nt as usize]
  }

  /// Indices of every nonterminal with a finite probability, ascending.
  pub fn populated(&self) -> impl Iterator<Item = u32> + '_ {
    self
      .probabilities
      .iter()
      .enumerate()
      .filter(|&(_, &p)| p != NEG_INF)
      .map(|(nt, _)| nt as u32)
  }

  /// Mutable views of the three parallel arrays, for splitting across threads.
  pub(crate) fn arrays_mut(&mut self) -> (&mut [f32], &mut [PackedChildren], &mut [u16]) {
    (
      &mut self.probabilities,
      &mut self.children,
      &mut self.midpoints,
    )
  }
}
