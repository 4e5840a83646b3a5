//! The triangular chart and its cells.
//!
//! A cell `(start, end)` is filled once through its temporary storage, then frozen by
//! [`Cell::finalize_cell`], which also caches the populated nonterminals that may serve as left
//! and right children of wider constituents.

mod dense;
mod packed;

use std::fmt;
use std::mem;

pub use dense::CellVector;
pub use packed::PackedStorage;

use crate::config::ChartLayout;
use crate::grammar::Grammar;
use crate::packing::{PackedChildren, PackingFunction, RightChild};
use crate::syntree::{Constituent, SynTree, Word};
use crate::utils::NEG_INF;
use crate::{Error, Result};

/// Midpoints are stored as `u16`, which bounds the sentence length.
pub const MAX_SENTENCE_LENGTH: usize = u16::MAX as usize;

/// One populated slot of a cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellEntry {
  pub nonterminal: u32,
  pub inside_probability: f32,
  pub packed_children: PackedChildren,
  /// Equal to the cell's `end` for unary and lexical entries.
  pub midpoint: u16,
}

/// Nonterminals of a finalized cell usable on one side of a binary rule, with their inside
/// probabilities.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChildList {
  nonterminals: Vec<u32>,
  probabilities: Vec<f32>,
}

impl ChildList {
  fn push(&mut self, nt: u32, probability: f32) {
    self.nonterminals.push(nt);
    self.probabilities.push(probability);
  }

  pub fn len(&self) -> usize {
    self.nonterminals.len()
  }

  pub fn is_empty(&self) -> bool {
    self.nonterminals.is_empty()
  }

  pub fn nonterminals(&self) -> &[u32] {
    &self.nonterminals
  }

  pub fn probabilities(&self) -> &[f32] {
    &self.probabilities
  }

  pub fn iter(&self) -> impl Iterator<Item = (u32, f32)> + '_ {
    self
      .nonterminals
      .iter()
      .copied()
      .zip(self.probabilities.iter().copied())
  }
}

#[derive(Debug, Clone)]
enum CellStorage {
  /// Nothing allocated yet, reads as all −∞.
  Empty,
  /// Being populated through temporary storage.
  Building(CellVector),
  Dense(CellVector),
  Packed(PackedStorage),
}

#[derive(Debug, Clone)]
pub struct Cell {
  start: usize,
  end: usize,
  num_nonterminals: usize,
  layout: ChartLayout,
  storage: CellStorage,
  valid_left_children: ChildList,
  valid_right_children: ChildList,
  num_populated: usize,
  finalized: bool,
}

impl Cell {
  pub fn new(start: usize, end: usize, num_nonterminals: usize, layout: ChartLayout) -> Self {
    Self {
      start,
      end,
      num_nonterminals,
      layout,
      storage: CellStorage::Empty,
      valid_left_children: ChildList::default(),
      valid_right_children: ChildList::default(),
      num_populated: 0,
      finalized: false,
    }
  }

  pub fn start(&self) -> usize {
    self.start
  }

  pub fn end(&self) -> usize {
    self.end
  }

  pub fn span(&self) -> usize {
    self.end - self.start
  }

  pub fn layout(&self) -> ChartLayout {
    self.layout
  }

  pub fn is_finalized(&self) -> bool {
    self.finalized
  }

  /// Hands out the scratch arrays this cell is populated through, all cleared to −∞. A recycled
  /// vector from an earlier cell is reused when given. Calling this again before finalizing
  /// returns the same storage untouched.
  pub fn allocate_temporary_storage(
    &mut self,
    recycled: Option<CellVector>,
  ) -> Result<&mut CellVector> {
    if self.finalized {
      return Err(Error::CellFinalized {
        start: self.start,
        end: self.end,
      });
    }

    if !matches!(self.storage, CellStorage::Building(_)) {
      let mut v = recycled.unwrap_or_else(|| CellVector::new(self.num_nonterminals));
      v.reset(self.num_nonterminals);
      self.storage = CellStorage::Building(v);
    }

    match &mut self.storage {
      CellStorage::Building(v) => Ok(v),
      _ => unreachable!("temporary storage was just allocated"),
    }
  }

  /// Freezes the cell and caches its valid left and right children. Only the first call has any
  /// effect. Returns the temporary storage when the layout no longer needs it, so it can be
  /// recycled for another cell.
  pub fn finalize_cell(&mut self, grammar: &Grammar) -> Option<CellVector> {
    if self.finalized {
      return None;
    }

    let storage = mem::replace(&mut self.storage, CellStorage::Empty);
    let (storage, recycled) = match (storage, self.layout) {
      (CellStorage::Building(v), ChartLayout::Dense) => (CellStorage::Dense(v), None),
      (CellStorage::Building(v), ChartLayout::Packed) => {
        (CellStorage::Packed(PackedStorage::from_vector(&v)), Some(v))
      }
      (other, _) => (other, None),
    };
    self.storage = storage;

    let mut left = ChildList::default();
    let mut right = ChildList::default();
    let mut populated = 0;
    for entry in self.entries() {
      populated += 1;
      if grammar.is_valid_left_child(entry.nonterminal) {
        left.push(entry.nonterminal, entry.inside_probability);
      }
      if grammar.is_valid_right_child(entry.nonterminal) {
        right.push(entry.nonterminal, entry.inside_probability);
      }
    }

    tracing::trace!(
      start = self.start,
      end = self.end,
      populated,
      left = left.len(),
      right = right.len(),
      "finalized cell"
    );

    self.valid_left_children = left;
    self.valid_right_children = right;
    self.num_populated = populated;
    self.finalized = true;
    recycled
  }

  pub fn valid_left_children(&self) -> &ChildList {
    &self.valid_left_children
  }

  pub fn valid_right_children(&self) -> &ChildList {
    &self.valid_right_children
  }

  pub fn entry(&self, nt: u32) -> Option<CellEntry> {
    let entry = |v: &CellVector| {
      let p = v.probability(nt);
      (p != NEG_INF).then(|| CellEntry {
        nonterminal: nt,
        inside_probability: p,
        packed_children: v.packed_children(nt),
        midpoint: v.midpoint(nt),
      })
    };

    match &self.storage {
      CellStorage::Empty => None,
      CellStorage::Building(v) | CellStorage::Dense(v) => entry(v),
      CellStorage::Packed(p) => p.find(nt).map(|idx| CellEntry {
        nonterminal: nt,
        inside_probability: p.probability(idx),
        packed_children: p.packed_children(idx),
        midpoint: p.midpoint(idx),
      }),
    }
  }

  #[inline]
  pub fn inside_probability(&self, nt: u32) -> f32 {
    match &self.storage {
      CellStorage::Empty => NEG_INF,
      CellStorage::Building(v) | CellStorage::Dense(v) => v.probability(nt),
      CellStorage::Packed(p) => p.find(nt).map(|idx| p.probability(idx)).unwrap_or(NEG_INF),
    }
  }

  pub fn packed_children(&self, nt: u32) -> Option<PackedChildren> {
    self.entry(nt).map(|e| e.packed_children)
  }

  pub fn midpoint(&self, nt: u32) -> Option<u16> {
    self.entry(nt).map(|e| e.midpoint)
  }

  /// Every populated entry, ascending by nonterminal.
  pub fn entries(&self) -> Vec<CellEntry> {
    match &self.storage {
      CellStorage::Empty => Vec::new(),
      CellStorage::Building(v) | CellStorage::Dense(v) => {
        v.populated().filter_map(|nt| self.entry(nt)).collect()
      }
      CellStorage::Packed(p) => (0..p.len())
        .map(|idx| CellEntry {
          nonterminal: p.nonterminal(idx),
          inside_probability: p.probability(idx),
          packed_children: p.packed_children(idx),
          midpoint: p.midpoint(idx),
        })
        .collect(),
    }
  }

  pub fn num_populated(&self) -> usize {
    if self.finalized {
      self.num_populated
    } else {
      self.entries().len()
    }
  }

  /// The most probable entry; the lowest nonterminal wins ties.
  pub fn best_parent(&self) -> Option<CellEntry> {
    self.entries().into_iter().fold(None, |best, e| match best {
      Some(b) if b.inside_probability >= e.inside_probability => Some(b),
      _ => Some(e),
    })
  }
}

/// Read-only access to the cells of a chart, or to the narrower spans of one during a fill.
#[derive(Debug, Clone, Copy)]
pub struct ChartView<'a> {
  cells: &'a [Vec<Cell>],
}

impl<'a> ChartView<'a> {
  /// Panics if `(start, end)` is outside the chart or wider than this view.
  #[inline]
  pub fn get_cell(&self, start: usize, end: usize) -> &'a Cell {
    &self.cells[end - start - 1][start]
  }
}

/// Cells are stored by span length, then start: `cells[end - start - 1][start]`.
#[derive(Debug, Clone)]
pub struct Chart {
  size: usize,
  num_nonterminals: usize,
  layout: ChartLayout,
  cells: Vec<Vec<Cell>>,
}

impl Chart {
  pub fn new(size: usize, num_nonterminals: usize, layout: ChartLayout) -> Result<Self> {
    if size > MAX_SENTENCE_LENGTH {
      return Err(Error::SentenceTooLong {
        length: size,
        max: MAX_SENTENCE_LENGTH,
      });
    }

    let cells = (1..=size)
      .map(|span| {
        (0..=size - span)
          .map(|start| Cell::new(start, start + span, num_nonterminals, layout))
          .collect()
      })
      .collect();

    Ok(Self {
      size,
      num_nonterminals,
      layout,
      cells,
    })
  }

  /// Sentence length.
  pub fn size(&self) -> usize {
    self.size
  }

  pub fn num_nonterminals(&self) -> usize {
    self.num_nonterminals
  }

  pub fn layout(&self) -> ChartLayout {
    self.layout
  }

  pub fn get_cell(&self, start: usize, end: usize) -> &Cell {
    self.view().get_cell(start, end)
  }

  pub fn get_cell_mut(&mut self, start: usize, end: usize) -> &mut Cell {
    &mut self.cells[end - start - 1][start]
  }

  pub fn view(&self) -> ChartView<'_> {
    ChartView { cells: &self.cells }
  }

  /// Splits the chart into the finalized spans below `span` and the cells of length `span`.
  pub(crate) fn split_at_span(&mut self, span: usize) -> (ChartView<'_>, &mut [Cell]) {
    let (narrower, rest) = self.cells.split_at_mut(span - 1);
    (ChartView { cells: narrower }, rest[0].as_mut_slice())
  }

  pub fn top_cell(&self) -> Option<&Cell> {
    (self.size > 0).then(|| self.get_cell(0, self.size))
  }

  /// Inside probability of the start symbol over the whole sentence, −∞ if there is no parse.
  pub fn top_probability(&self, grammar: &Grammar) -> f32 {
    self
      .top_cell()
      .map(|c| c.inside_probability(grammar.start_symbol()))
      .unwrap_or(NEG_INF)
  }

  pub fn cells(&self) -> impl Iterator<Item = &Cell> {
    self.cells.iter().flatten()
  }

  /// Follows backpointers from the start symbol in the top cell.
  pub fn extract_best_parse(&self, grammar: &Grammar) -> Option<SynTree<String, String>> {
    if self.top_probability(grammar) == NEG_INF {
      return None;
    }
    self.extract(grammar, 0, self.size, grammar.start_symbol(), self.num_nonterminals)
  }

  /// `unary_budget` bounds a chain of unary entries within one cell.
  fn extract(
    &self,
    grammar: &Grammar,
    start: usize,
    end: usize,
    nt: u32,
    unary_budget: usize,
  ) -> Option<SynTree<String, String>> {
    let entry = self.get_cell(start, end).entry(nt)?;
    let packing = grammar.packing();
    let key = entry.packed_children;
    let mid = entry.midpoint as usize;

    let children = if mid == end {
      let child = packing.unpack_left_child(key);
      match packing.unpack_right_child(key) {
        RightChild::Lexical => vec![SynTree::Leaf(Word {
          value: grammar.lexicon().name(child).to_string(),
          span: (start, end),
        })],
        _ if unary_budget == 0 => return None,
        _ => vec![self.extract(grammar, start, end, child, unary_budget - 1)?],
      }
    } else {
      let left = packing.unpack_left_child(key);
      let right = packing.unpack_right_child(key).child()?;
      vec![
        self.extract(grammar, start, mid, left, self.num_nonterminals)?,
        self.extract(grammar, mid, end, right, self.num_nonterminals)?,
      ]
    };

    Some(SynTree::Branch(
      Constituent {
        value: grammar.nonterminals().name(nt).to_string(),
        span: (start, end),
      },
      children,
    ))
  }

  /// Displays every populated cell with symbol names.
  pub fn display<'a>(&'a self, grammar: &'a Grammar) -> ChartDisplay<'a> {
    ChartDisplay {
      chart: self,
      grammar,
    }
  }
}

pub struct ChartDisplay<'a> {
  chart: &'a Chart,
  grammar: &'a Grammar,
}

impl fmt::Display for ChartDisplay<'_> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let names = self.grammar.nonterminals();
    for cell in self.chart.cells() {
      let entries = cell.entries();
      if entries.is_empty() {
        continue;
      }
      writeln!(f, "Cell {}..{}:", cell.start(), cell.end())?;
      for e in entries {
        writeln!(
          f,
          "  {}: {:.4} (mid {})",
          names.name(e.nonterminal),
          e.inside_probability,
          e.midpoint
        )?;
      }
    }
    Ok(())
  }
}
