use std::str::FromStr;

use crate::utils::log_sum_exp;
use crate::Error;

/// Storage strategy for chart cells. Both produce identical parses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChartLayout {
  /// One slot per nonterminal in every cell.
  #[default]
  Dense,
  /// Only populated nonterminals are stored, sorted by index.
  Packed,
}

/// How alternative derivations of the same constituent are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Objective {
  /// Keep the best derivation (max).
  #[default]
  Viterbi,
  /// Sum over derivations (log-sum-exp). Backpointers still follow the best contribution.
  Inside,
}

impl Objective {
  #[inline]
  pub fn combine(self, acc: f32, x: f32) -> f32 {
    match self {
      Self::Viterbi => acc.max(x),
      Self::Inside => log_sum_exp(acc, x),
    }
  }
}

/// How work is spread over worker threads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParallelMode {
  /// All cells of one span length run concurrently, with a barrier between span lengths.
  #[default]
  Row,
  /// Cells run one at a time, and the parent loop of each cell is split across threads.
  Cell,
}

#[derive(Debug, Clone)]
pub struct ParserConfig {
  pub layout: ChartLayout,
  pub objective: Objective,
  pub threads: usize,
  pub parallel_mode: ParallelMode,
  /// Cell-parallel mode only splits a cell when the grammar has at least this many nonterminals.
  pub min_parallel_rows: usize,
}

impl Default for ParserConfig {
  fn default() -> Self {
    Self {
      layout: ChartLayout::default(),
      objective: Objective::default(),
      threads: num_cpus::get(),
      parallel_mode: ParallelMode::default(),
      min_parallel_rows: 256,
    }
  }
}

impl ParserConfig {
  /// A single-threaded Viterbi configuration.
  pub fn sequential() -> Self {
    Self::default().with_threads(1)
  }

  pub fn with_layout(mut self, layout: ChartLayout) -> Self {
    self.layout = layout;
    self
  }

  pub fn with_objective(mut self, objective: Objective) -> Self {
    self.objective = objective;
    self
  }

  pub fn with_threads(mut self, threads: usize) -> Self {
    self.threads = threads.max(1);
    self
  }

  pub fn with_parallel_mode(mut self, mode: ParallelMode) -> Self {
    self.parallel_mode = mode;
    self
  }

  pub fn with_min_parallel_rows(mut self, rows: usize) -> Self {
    self.min_parallel_rows = rows;
    self
  }

  /// Worker count actually used, never zero.
  pub fn worker_count(&self) -> usize {
    self.threads.max(1)
  }
}

macro_rules! from_str_options {
  ($ty:ty, $what:expr, { $($s:pat => $v:expr),+ $(,)? }) => {
    impl FromStr for $ty {
      type Err = Error;

      fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
          $($s => Ok($v),)+
          _ => Err(Error::GrammarFormat(format!("unknown {} {}", $what, s))),
        }
      }
    }
  };
}

from_str_options!(ChartLayout, "chart layout", {
  "dense" => ChartLayout::Dense,
  "packed" => ChartLayout::Packed,
});

from_str_options!(Objective, "objective", {
  "viterbi" | "max" => Objective::Viterbi,
  "inside" | "sum" => Objective::Inside,
});

from_str_options!(ParallelMode, "parallel mode", {
  "row" => ParallelMode::Row,
  "cell" => ParallelMode::Cell,
});
