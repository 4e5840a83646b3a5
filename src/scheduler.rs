//! Bottom-up fill of a chart, optionally across worker threads.
//!
//! In [`ParallelMode::Row`] every cell of one span length is independent, so the row is split
//! into chunks with one worker per chunk, and the end of the crossbeam scope is the barrier before
//! the next span. In [`ParallelMode::Cell`] cells run one at a time and the parent loops of the
//! binary and unary multiplies are split instead.

use crate::cell_selector::CellSelector;
use crate::chart::{Cell, CellVector, Chart, ChartView};
use crate::config::{Objective, ParallelMode, ParserConfig};
use crate::cross_product::{cross_product_union, CrossProductVector};
use crate::grammar::Grammar;
use crate::spmv::{binary_spmv, resolve_unary_chains, seed_lexical, unary_spmv, ParentSlices};
use crate::utils::split_ranges;
use crate::{Error, Result};

/// Buffers owned by one worker and reused from cell to cell. Each is cleared before use.
#[derive(Debug)]
pub struct WorkerScratch {
  cross_product: CrossProductVector,
  /// Temporary cell storage handed back by a finalized packed cell.
  spare_cell: Option<CellVector>,
  /// Cell probabilities as they were before the unary pass.
  snapshot: Vec<f32>,
  /// Nonterminals whose unary chain has been re-scored.
  resolved: Vec<bool>,
}

impl WorkerScratch {
  pub fn new() -> Self {
    Self {
      cross_product: CrossProductVector::new(0),
      spare_cell: None,
      snapshot: Vec::new(),
      resolved: Vec::new(),
    }
  }
}

impl Default for WorkerScratch {
  fn default() -> Self {
    Self::new()
  }
}

/// One [`WorkerScratch`] per worker id.
#[derive(Debug, Default)]
pub struct ScratchPool {
  workers: Vec<WorkerScratch>,
}

impl ScratchPool {
  pub fn new(workers: usize) -> Self {
    let mut pool = Self::default();
    pool.ensure(workers);
    pool
  }

  /// Grows the pool to at least `workers` entries.
  pub fn ensure(&mut self, workers: usize) {
    if self.workers.len() < workers {
      self.workers.resize_with(workers, WorkerScratch::new);
    }
  }

  pub fn worker(&mut self, id: usize) -> &mut WorkerScratch {
    &mut self.workers[id]
  }
}

/// Everything a cell visit reads besides the chart itself.
#[derive(Clone, Copy)]
pub(crate) struct FillContext<'a> {
  pub grammar: &'a Grammar,
  pub config: &'a ParserConfig,
  pub sentence: &'a [u32],
  pub selector: &'a dyn CellSelector,
}

impl FillContext<'_> {
  /// Fills every cell of `chart`, narrowest spans first.
  pub fn fill(&self, chart: &mut Chart, pool: &mut ScratchPool) -> Result<()> {
    let workers = self.config.worker_count();
    pool.ensure(workers);

    let split = match self.config.parallel_mode {
      ParallelMode::Cell if self.grammar.num_nonterminals() >= self.config.min_parallel_rows => {
        workers
      }
      _ => 1,
    };

    for span in 1..=chart.size() {
      let (view, row) = chart.split_at_span(span);
      let row_workers = match self.config.parallel_mode {
        ParallelMode::Row => workers.min(row.len()),
        ParallelMode::Cell => 1,
      };
      tracing::debug!(span, cells = row.len(), workers = row_workers, split, "visiting span");

      if row_workers <= 1 {
        let scratch = pool.worker(0);
        for cell in row.iter_mut() {
          self.visit_cell(view, cell, scratch, split)?;
        }
      } else {
        self.fill_row(view, row, pool, row_workers)?;
      }
    }
    Ok(())
  }

  /// Visits the cells of one span concurrently. Every worker is joined before the first error,
  /// if any, is returned.
  fn fill_row(
    &self,
    view: ChartView<'_>,
    row: &mut [Cell],
    pool: &mut ScratchPool,
    workers: usize,
  ) -> Result<()> {
    let chunk = row.len().div_ceil(workers);
    let outcomes = crossbeam::scope(|scope| {
      let handles = row
        .chunks_mut(chunk)
        .zip(pool.workers.iter_mut())
        .enumerate()
        .map(|(id, (cells, scratch))| {
          scope
            .builder()
            .name(format!("spmv-worker-{}", id))
            .spawn(move |_| -> Result<()> {
              for cell in cells.iter_mut() {
                self.visit_cell(view, cell, scratch, 1)?;
              }
              Ok(())
            })
        })
        .collect::<Vec<_>>();

      handles
        .into_iter()
        .map(|handle| match handle {
          Ok(handle) => handle.join().map_err(Error::from_panic).and_then(|r| r),
          Err(e) => Err(Error::Io(e)),
        })
        .collect::<Vec<_>>()
    })
    .map_err(Error::from_panic)?;

    outcomes.into_iter().collect()
  }

  /// Populates and finalizes one cell. Every narrower cell must already be finalized.
  fn visit_cell(
    &self,
    view: ChartView<'_>,
    cell: &mut Cell,
    scratch: &mut WorkerScratch,
    split: usize,
  ) -> Result<()> {
    let (start, end) = (cell.start(), cell.end());
    if !self.selector.is_cell_open(start, end) {
      tracing::trace!(start, end, "cell closed");
      cell.finalize_cell(self.grammar);
      return Ok(());
    }

    let grammar = self.grammar;
    let objective = self.config.objective;
    let WorkerScratch {
      cross_product,
      spare_cell,
      snapshot,
      resolved,
    } = scratch;

    let tmp = cell.allocate_temporary_storage(spare_cell.take())?;
    if end - start == 1 {
      seed_lexical(grammar, self.sentence[start], end, tmp);
    } else {
      cross_product_union(view, grammar, objective, start, end, cross_product);
      if !cross_product.is_empty() {
        let cpv = &*cross_product;
        for_parent_ranges(tmp, split, |out| binary_spmv(grammar, objective, cpv, out))?;
      }
    }

    snapshot.clear();
    snapshot.extend_from_slice(tmp.probabilities());
    let snapshot = &snapshot[..];
    for_parent_ranges(tmp, split, |out| {
      unary_spmv(grammar, objective, snapshot, end, out)
    })?;
    if objective == Objective::Viterbi {
      resolve_unary_chains(grammar, end, tmp, resolved);
    }

    if let Some(recycled) = cell.finalize_cell(grammar) {
      *spare_cell = Some(recycled);
    }
    Ok(())
  }
}

/// Runs `f` over the parents of `cell`, split into `parts` contiguous ranges on scoped threads.
fn for_parent_ranges<F>(cell: &mut CellVector, parts: usize, f: F) -> Result<()>
where
  F: Fn(ParentSlices<'_>) + Sync,
{
  if parts <= 1 {
    f(ParentSlices::whole(cell));
    return Ok(());
  }

  let ranges = split_ranges(cell.len(), parts);
  let mut slices = ParentSlices::whole(cell).split(&ranges).into_iter();
  let f = &f;
  crossbeam::scope(|scope| {
    let first = slices.next();
    for part in slices {
      scope.spawn(move |_| f(part));
    }
    // the calling thread takes the first range
    if let Some(part) = first {
      f(part);
    }
  })
  .map_err(Error::from_panic)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cell_selector::ExhaustiveSelector;
  use crate::config::ChartLayout;
  use crate::rules::Rule;

  fn grammar() -> Grammar {
    Grammar::builder()
      .rules(vec![
        Rule::unary("TOP", "S", 1.0),
        Rule::binary("S", "S", "S", 0.5),
        Rule::lexical("S", "x", 0.5),
      ])
      .build()
      .unwrap()
  }

  fn fill(g: &Grammar, config: &ParserConfig, words: usize) -> Chart {
    let sentence = vec![g.lexicon().index("x").unwrap(); words];
    let mut chart = Chart::new(words, g.num_nonterminals(), config.layout).unwrap();
    let ctx = FillContext {
      grammar: g,
      config,
      sentence: &sentence,
      selector: &ExhaustiveSelector,
    };
    ctx.fill(&mut chart, &mut ScratchPool::new(1)).unwrap();
    chart
  }

  #[test]
  fn test_every_cell_is_finalized() {
    let g = grammar();
    let chart = fill(&g, &ParserConfig::sequential(), 4);
    assert!(chart.cells().all(|c| c.is_finalized()));
    assert!((chart.top_probability(&g) - 0.0078125f32.ln()).abs() < 1e-5);
  }

  #[test]
  fn test_row_workers_match_sequential() {
    let g = grammar();
    for layout in [ChartLayout::Dense, ChartLayout::Packed] {
      let sequential = fill(&g, &ParserConfig::sequential().with_layout(layout), 6);
      let parallel = fill(&g, &ParserConfig::sequential().with_layout(layout).with_threads(4), 6);
      for (a, b) in sequential.cells().zip(parallel.cells()) {
        assert_eq!(a.entries(), b.entries());
      }
    }
  }

  #[test]
  fn test_cell_split_matches_sequential() {
    let g = grammar();
    let config = ParserConfig::sequential()
      .with_threads(3)
      .with_parallel_mode(ParallelMode::Cell)
      .with_min_parallel_rows(0);
    let sequential = fill(&g, &ParserConfig::sequential(), 5);
    let split = fill(&g, &config, 5);
    for (a, b) in sequential.cells().zip(split.cells()) {
      assert_eq!(a.entries(), b.entries());
    }
  }

  #[test]
  fn test_closed_cells_stay_empty() {
    let g = grammar();
    let sentence = vec![0; 3];
    let config = ParserConfig::sequential();
    let mut chart = Chart::new(3, g.num_nonterminals(), config.layout).unwrap();
    let no_wide = |start: usize, end: usize| end - start < 3;
    let ctx = FillContext {
      grammar: &g,
      config: &config,
      sentence: &sentence,
      selector: &no_wide,
    };
    ctx.fill(&mut chart, &mut ScratchPool::default()).unwrap();

    assert!(chart.top_cell().unwrap().is_finalized());
    assert_eq!(chart.top_cell().unwrap().num_populated(), 0);
    assert!(chart.get_cell(0, 2).num_populated() > 0);
  }

  #[test]
  fn test_panicking_selector_is_reported() {
    let g = grammar();
    let sentence = vec![0; 4];
    let config = ParserConfig::sequential().with_threads(2);
    let mut chart = Chart::new(4, g.num_nonterminals(), config.layout).unwrap();
    let selector = |start: usize, end: usize| {
      if (start, end) == (1, 2) {
        panic!("selector failed");
      }
      true
    };
    let ctx = FillContext {
      grammar: &g,
      config: &config,
      sentence: &sentence,
      selector: &selector,
    };
    let err = ctx.fill(&mut chart, &mut ScratchPool::new(2)).unwrap_err();
    assert!(matches!(err, Error::WorkerPanicked(msg) if msg.contains("selector failed")));
  }
}
