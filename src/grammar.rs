use std::fmt;
use std::ops::Range;
use std::path::Path;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::packing::{
  ExactFilterFunction, LeftShiftFunction, PackedChildren, Packing, PackingFunction, PackingKind,
  RightChild, UnfilteredFunction,
};
use crate::rules::{Children, Production, Rule, Vocabulary};
use crate::utils::NEG_INF;
use crate::{Error, Result};

/// Word index for tokens missing from the lexicon. It has no lexical productions.
pub const UNKNOWN_WORD: u32 = u32::MAX;

/// Slack allowed when checking that a parent's rule probabilities sum to at most 1.
const STOCHASTIC_TOLERANCE: f64 = 1e-3;

/// Compressed sparse rows: row `r` owns `columns[row_starts[r]..row_starts[r + 1]]`, sorted
/// ascending, with the matching log probabilities alongside.
#[derive(Debug, Clone)]
pub struct CsrMatrix<C> {
  row_starts: Vec<usize>,
  columns: Vec<C>,
  probabilities: Vec<f32>,
}

impl<C: Copy + Ord> CsrMatrix<C> {
  /// Rows must already be sorted by column without duplicates.
  fn from_rows(rows: Vec<Vec<(C, f32)>>) -> Self {
    let nnz = rows.iter().map(Vec::len).sum();
    let mut row_starts = Vec::with_capacity(rows.len() + 1);
    let mut columns = Vec::with_capacity(nnz);
    let mut probabilities = Vec::with_capacity(nnz);

    row_starts.push(0);
    for row in rows {
      for (col, prob) in row {
        columns.push(col);
        probabilities.push(prob);
      }
      row_starts.push(columns.len());
    }

    Self {
      row_starts,
      columns,
      probabilities,
    }
  }

  pub fn num_rows(&self) -> usize {
    self.row_starts.len() - 1
  }

  /// Number of stored (non-zero) entries.
  pub fn nnz(&self) -> usize {
    self.columns.len()
  }

  #[inline]
  pub fn row(&self, row: usize) -> (&[C], &[f32]) {
    let range = self.row_starts[row]..self.row_starts[row + 1];
    (&self.columns[range.clone()], &self.probabilities[range])
  }

  /// Log probability at `(row, col)`, or −∞ if nothing is stored there.
  pub fn get(&self, row: usize, col: C) -> f32 {
    if row >= self.num_rows() {
      return NEG_INF;
    }
    let (cols, probs) = self.row(row);
    cols
      .binary_search(&col)
      .map(|idx| probs[idx])
      .unwrap_or(NEG_INF)
  }
}

/// An immutable probabilistic grammar laid out for sparse matrix-vector parsing.
///
/// Nonterminal `0` is always the start symbol. The remaining nonterminals are ordered so that
/// valid right children, valid left children and POS tags each occupy a contiguous range.
#[derive(Debug)]
pub struct Grammar {
  nonterminals: Vocabulary,
  lexicon: Vocabulary,
  left_children: Range<u32>,
  right_children: Range<u32>,
  pos: Range<u32>,
  unary_only: Range<u32>,
  packing: Packing,
  binary: CsrMatrix<PackedChildren>,
  unary: CsrMatrix<u32>,
  /// Indexed by word, sorted by parent.
  lexical: Vec<Vec<(u32, f32)>>,
  num_lexical: usize,
  valid_production_pairs: usize,
}

impl Grammar {
  pub fn builder() -> GrammarBuilder {
    GrammarBuilder::new()
  }

  /// Reads a grammar in the text format accepted by [`str::parse`].
  pub fn read_from_file(path: impl AsRef<Path>) -> Result<Self> {
    GrammarBuilder::read_from_file(path)?.build()
  }

  pub fn num_nonterminals(&self) -> usize {
    self.nonterminals.len()
  }

  pub fn start_symbol(&self) -> u32 {
    0
  }

  pub fn nonterminals(&self) -> &Vocabulary {
    &self.nonterminals
  }

  pub fn lexicon(&self) -> &Vocabulary {
    &self.lexicon
  }

  pub fn left_child_range(&self) -> Range<u32> {
    self.left_children.clone()
  }

  pub fn right_child_range(&self) -> Range<u32> {
    self.right_children.clone()
  }

  pub fn pos_range(&self) -> Range<u32> {
    self.pos.clone()
  }

  pub fn unary_only_range(&self) -> Range<u32> {
    self.unary_only.clone()
  }

  #[inline]
  pub fn is_valid_left_child(&self, nt: u32) -> bool {
    self.left_children.contains(&nt)
  }

  #[inline]
  pub fn is_valid_right_child(&self, nt: u32) -> bool {
    self.right_children.contains(&nt)
  }

  pub fn is_pos(&self, nt: u32) -> bool {
    self.pos.contains(&nt)
  }

  pub fn packing(&self) -> &Packing {
    &self.packing
  }

  pub fn binary_matrix(&self) -> &CsrMatrix<PackedChildren> {
    &self.binary
  }

  pub fn unary_matrix(&self) -> &CsrMatrix<u32> {
    &self.unary
  }

  pub fn num_binary_productions(&self) -> usize {
    self.binary.nnz()
  }

  pub fn num_unary_productions(&self) -> usize {
    self.unary.nnz()
  }

  pub fn num_lexical_productions(&self) -> usize {
    self.num_lexical
  }

  /// Number of distinct child pairs across all binary productions.
  pub fn valid_production_pairs(&self) -> usize {
    self.valid_production_pairs
  }

  pub fn binary_log_probability(&self, parent: u32, children: PackedChildren) -> f32 {
    self.binary.get(parent as usize, children)
  }

  pub fn unary_log_probability(&self, parent: u32, child: u32) -> f32 {
    self.unary.get(parent as usize, child)
  }

  pub fn lexical_log_probability(&self, parent: u32, word: u32) -> f32 {
    let prods = self.lexical_productions(word);
    prods
      .binary_search_by_key(&parent, |&(p, _)| p)
      .map(|idx| prods[idx].1)
      .unwrap_or(NEG_INF)
  }

  /// All `(parent, log probability)` pairs that produce `word`. Empty for unknown words.
  pub fn lexical_productions(&self, word: u32) -> &[(u32, f32)] {
    self
      .lexical
      .get(word as usize)
      .map(Vec::as_slice)
      .unwrap_or(&[])
  }

  /// Looks up a binary production by symbol names, mostly useful for inspection and tests.
  pub fn binary_log_probability_str(&self, parent: &str, left: &str, right: &str) -> f32 {
    match (
      self.nonterminals.index(parent),
      self.nonterminals.index(left),
      self.nonterminals.index(right),
    ) {
      (Some(p), Some(l), Some(r)) => self.binary_log_probability(p, self.packing.pack(l, r)),
      _ => NEG_INF,
    }
  }

  pub fn unary_log_probability_str(&self, parent: &str, child: &str) -> f32 {
    match (self.nonterminals.index(parent), self.nonterminals.index(child)) {
      (Some(p), Some(c)) => self.unary_log_probability(p, c),
      _ => NEG_INF,
    }
  }

  pub fn lexical_log_probability_str(&self, parent: &str, word: &str) -> f32 {
    match (self.nonterminals.index(parent), self.lexicon.index(word)) {
      (Some(p), Some(w)) => self.lexical_log_probability(p, w),
      _ => NEG_INF,
    }
  }

  /// Maps words to lexicon indices, sending unknown words to [`UNKNOWN_WORD`].
  pub fn map_sentence(&self, words: &[&str]) -> Vec<u32> {
    words
      .iter()
      .map(|w| self.lexicon.index(w).unwrap_or(UNKNOWN_WORD))
      .collect()
  }

  /// Every binary production, in row order.
  pub fn binary_productions(&self) -> impl Iterator<Item = Production> + '_ {
    (0..self.binary.num_rows()).flat_map(move |parent| {
      let (cols, probs) = self.binary.row(parent);
      cols.iter().zip(probs).map(move |(&key, &log_probability)| Production {
        parent: parent as u32,
        left_child: self.packing.unpack_left_child(key),
        right_child: self.packing.unpack_right_child(key),
        log_probability,
      })
    })
  }

  /// Every unary production, in row order.
  pub fn unary_productions(&self) -> impl Iterator<Item = Production> + '_ {
    (0..self.unary.num_rows()).flat_map(move |parent| {
      let (cols, probs) = self.unary.row(parent);
      cols.iter().zip(probs).map(move |(&child, &log_probability)| Production {
        parent: parent as u32,
        left_child: child,
        right_child: RightChild::Unary,
        log_probability,
      })
    })
  }
}

impl fmt::Display for Grammar {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    writeln!(f, "//** start: {}", self.nonterminals.name(0))?;
    writeln!(f, "//** packing: {}", self.packing.kind())?;
    writeln!(f, "//** nonterminals: {}", self.num_nonterminals())?;
    writeln!(f, "//** lexicon: {}", self.lexicon.len())?;
    writeln!(f, "//** binary rules: {}", self.num_binary_productions())?;
    writeln!(f, "//** unary rules: {}", self.num_unary_productions())?;
    writeln!(f, "//** lexical rules: {}", self.num_lexical_productions())?;
    writeln!(f, "//** valid production pairs: {}", self.valid_production_pairs)?;
    writeln!(f, "//** left children: {:?}", self.left_children)?;
    writeln!(f, "//** right children: {:?}", self.right_children)?;
    writeln!(f, "//** pos: {:?}", self.pos)?;
    write!(f, "//** unary only: {:?}", self.unary_only)
  }
}

/// Where a nonterminal lands in the index ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum SymbolClass {
  Start,
  RightOnly,
  Pos,
  BothChildren,
  LeftOnly,
  Other,
}

/// Collects rules and lays them out into a [`Grammar`].
#[derive(Debug, Default)]
pub struct GrammarBuilder {
  rules: Vec<Rule>,
  start: Option<String>,
  packing: PackingKind,
}

impl GrammarBuilder {
  pub fn new() -> Self {
    Self::default()
  }

  /// Overrides the start symbol. Defaults to the first rule's parent.
  pub fn start_symbol(mut self, start: &str) -> Self {
    self.start = Some(start.to_string());
    self
  }

  pub fn packing(mut self, kind: PackingKind) -> Self {
    self.packing = kind;
    self
  }

  pub fn rule(mut self, rule: Rule) -> Self {
    self.rules.push(rule);
    self
  }

  pub fn rules(mut self, rules: impl IntoIterator<Item = Rule>) -> Self {
    self.rules.extend(rules);
    self
  }

  /// Reads the rules of a grammar file.
  pub fn read_from_file(path: impl AsRef<Path>) -> Result<Self> {
    let path = path.as_ref();
    let src = std::fs::read_to_string(path).map_err(|source| Error::ReadGrammar {
      path: path.to_path_buf(),
      source,
    })?;
    src.parse()
  }

  fn classify(
    start: &str,
    name: &str,
    pos: &FxHashSet<&str>,
    left: &FxHashSet<&str>,
    right: &FxHashSet<&str>,
  ) -> SymbolClass {
    if name == start {
      SymbolClass::Start
    } else if pos.contains(name) {
      SymbolClass::Pos
    } else {
      match (left.contains(name), right.contains(name)) {
        (true, true) => SymbolClass::BothChildren,
        (false, true) => SymbolClass::RightOnly,
        (true, false) => SymbolClass::LeftOnly,
        (false, false) => SymbolClass::Other,
      }
    }
  }

  fn validate(&self, start: &str) -> Result<()> {
    let parents: FxHashSet<&str> = self.rules.iter().map(|r| r.parent.as_str()).collect();
    if !parents.contains(start) {
      return Err(Error::UndefinedSymbol(start.to_string()));
    }

    let mut mass: FxHashMap<&str, f64> = FxHashMap::default();
    for rule in &self.rules {
      let lp = rule.log_probability;
      if lp.is_nan() || lp > 0.0 || lp == NEG_INF {
        return Err(Error::InvalidProbability {
          rule: rule.to_string(),
          probability: (lp as f64).exp(),
        });
      }

      for child in rule.children.nonterminals() {
        if child == start {
          return Err(Error::StartSymbolAsChild(start.to_string()));
        }
        if !parents.contains(child) {
          return Err(Error::UndefinedSymbol(child.to_string()));
        }
      }

      if !rule.children.is_lexical() {
        *mass.entry(rule.parent.as_str()).or_default() += (lp as f64).exp();
      }
    }

    // report the first offending parent in rule order
    for rule in &self.rules {
      let total = mass.get(rule.parent.as_str()).copied().unwrap_or(0.0);
      if total > 1.0 + STOCHASTIC_TOLERANCE {
        return Err(Error::NonStochastic {
          parent: rule.parent.clone(),
          mass: total,
        });
      }
    }

    Ok(())
  }

  /// Orders nonterminals by [`SymbolClass`], breaking ties by first appearance.
  fn order_nonterminals(&self, start: &str) -> (Vocabulary, [usize; 6]) {
    let mut pos = FxHashSet::default();
    let mut left = FxHashSet::default();
    let mut right = FxHashSet::default();
    let mut seen = FxHashSet::default();
    let mut appearance = vec![start];
    seen.insert(start);

    for rule in &self.rules {
      match &rule.children {
        Children::Binary(l, r) => {
          left.insert(l.as_str());
          right.insert(r.as_str());
        }
        Children::Lexical(_) => {
          pos.insert(rule.parent.as_str());
        }
        Children::Unary(_) => {}
      }
      for name in std::iter::once(rule.parent.as_str()).chain(rule.children.nonterminals()) {
        if seen.insert(name) {
          appearance.push(name);
        }
      }
    }

    let mut classified: Vec<(SymbolClass, &str)> = appearance
      .into_iter()
      .map(|name| (Self::classify(start, name, &pos, &left, &right), name))
      .collect();
    // stable, so first appearance wins within a class
    classified.sort_by_key(|&(class, _)| class);

    let mut counts = [0usize; 6];
    for &(class, _) in &classified {
      counts[class as usize] += 1;
    }

    (classified.into_iter().map(|(_, name)| name).collect(), counts)
  }

  #[tracing::instrument(skip_all, fields(rules = self.rules.len()))]
  pub fn build(self) -> Result<Grammar> {
    if self.rules.is_empty() {
      return Err(Error::EmptyGrammar);
    }
    let start = self
      .start
      .clone()
      .unwrap_or_else(|| self.rules[0].parent.clone());

    self.validate(&start)?;
    let (nonterminals, counts) = self.order_nonterminals(&start);
    let num_nonterminals = nonterminals.len();

    // class boundaries as running offsets
    let mut bounds = [0u32; 7];
    for (i, count) in counts.iter().enumerate() {
      bounds[i + 1] = bounds[i] + *count as u32;
    }
    let class_start = |c: SymbolClass| bounds[c as usize];
    let class_end = |c: SymbolClass| bounds[c as usize + 1];

    let right_children = class_start(SymbolClass::RightOnly)..class_end(SymbolClass::BothChildren);
    let left_children = class_start(SymbolClass::Pos)..class_end(SymbolClass::LeftOnly);
    let pos = class_start(SymbolClass::Pos)..class_end(SymbolClass::Pos);
    let unary_only = class_start(SymbolClass::Other)..class_end(SymbolClass::Other);

    let lexicon: Vocabulary = self
      .rules
      .iter()
      .filter_map(|r| match &r.children {
        Children::Lexical(w) => Some(w.as_str()),
        _ => None,
      })
      .collect();
    if lexicon.len() + num_nonterminals > i32::MAX as usize {
      return Err(Error::LexiconTooLarge {
        words: lexicon.len(),
        nonterminals: num_nonterminals,
      });
    }

    let nt = |name: &str| {
      nonterminals
        .index(name)
        .ok_or_else(|| Error::UndefinedSymbol(name.to_string()))
    };

    let mut binary_pairs = Vec::new();
    for rule in &self.rules {
      if let Children::Binary(l, r) = &rule.children {
        binary_pairs.push((nt(l)?, nt(r)?));
      }
    }

    let shift_function = || LeftShiftFunction::new(num_nonterminals, right_children.end);
    let packing = match self.packing {
      PackingKind::LeftShift => Packing::LeftShift(shift_function()?),
      PackingKind::Unfiltered => Packing::Unfiltered(UnfilteredFunction::new(num_nonterminals)?),
      PackingKind::ExactFilter => Packing::ExactFilter(ExactFilterFunction::new(
        shift_function()?,
        binary_pairs,
      )),
    };
    if let Packing::LeftShift(f) = &packing {
      tracing::debug!(
        shift = f.left_child_shift(),
        size = f.packed_array_size(),
        "left-shift packing"
      );
    }

    let mut binary_rows: Vec<Vec<(PackedChildren, f32)>> = vec![Vec::new(); num_nonterminals];
    let mut unary_rows: Vec<Vec<(u32, f32)>> = vec![Vec::new(); num_nonterminals];
    let mut lexical: Vec<Vec<(u32, f32)>> = vec![Vec::new(); lexicon.len()];

    for rule in &self.rules {
      let parent = nt(&rule.parent)?;
      let lp = rule.log_probability;
      match &rule.children {
        Children::Binary(l, r) => {
          binary_rows[parent as usize].push((packing.pack(nt(l)?, nt(r)?), lp));
        }
        Children::Unary(c) => unary_rows[parent as usize].push((nt(c)?, lp)),
        Children::Lexical(w) => {
          let word = lexicon
            .index(w)
            .ok_or_else(|| Error::UndefinedSymbol(w.clone()))?;
          lexical[word as usize].push((parent, lp));
        }
      }
    }

    let describe_binary = |parent: usize, key: PackedChildren| {
      format!(
        "{} -> {} {}",
        nonterminals.name(parent as u32),
        nonterminals.name(packing.unpack_left_child(key)),
        packing
          .unpack_right_child(key)
          .child()
          .map(|c| nonterminals.name(c))
          .unwrap_or("?")
      )
    };
    sort_rows(&mut binary_rows, |parent, key| describe_binary(parent, key))?;
    sort_rows(&mut unary_rows, |parent, child| {
      format!(
        "{} -> {}",
        nonterminals.name(parent as u32),
        nonterminals.name(child)
      )
    })?;
    sort_rows(&mut lexical, |word, parent| {
      format!(
        "{} -> {:?}",
        nonterminals.name(parent),
        lexicon.name(word as u32)
      )
    })?;

    let valid_production_pairs = binary_rows
      .iter()
      .flatten()
      .map(|&(key, _)| key)
      .collect::<FxHashSet<_>>()
      .len();
    let num_lexical = lexical.iter().map(Vec::len).sum();

    let grammar = Grammar {
      nonterminals,
      lexicon,
      left_children,
      right_children,
      pos,
      unary_only,
      packing,
      binary: CsrMatrix::from_rows(binary_rows),
      unary: CsrMatrix::from_rows(unary_rows),
      lexical,
      num_lexical,
      valid_production_pairs,
    };

    tracing::info!(
      nonterminals = grammar.num_nonterminals(),
      words = grammar.lexicon.len(),
      binary = grammar.num_binary_productions(),
      unary = grammar.num_unary_productions(),
      lexical = grammar.num_lexical_productions(),
      packing = %grammar.packing.kind(),
      "built grammar"
    );

    Ok(grammar)
  }
}

/// Sorts every row by column, failing on duplicated entries.
fn sort_rows<C: Copy + Ord>(
  rows: &mut [Vec<(C, f32)>],
  describe: impl Fn(usize, C) -> String,
) -> Result<()> {
  for (idx, row) in rows.iter_mut().enumerate() {
    row.sort_by_key(|&(col, _)| col);
    if let Some(dup) = row.windows(2).find(|w| w[0].0 == w[1].0) {
      return Err(Error::GrammarFormat(format!(
        "duplicate rule {}",
        describe(idx, dup[0].0)
      )));
    }
  }
  Ok(())
}
