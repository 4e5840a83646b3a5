/// Decides which cells of the chart are visited at all. A closed cell is finalized empty and
/// contributes nothing to wider cells.
///
/// Selectors are consulted from worker threads, so they must be `Sync`.
pub trait CellSelector: Sync {
  fn is_cell_open(&self, start: usize, end: usize) -> bool;
}

/// Opens every cell.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExhaustiveSelector;

impl CellSelector for ExhaustiveSelector {
  fn is_cell_open(&self, _start: usize, _end: usize) -> bool {
    true
  }
}

impl<F> CellSelector for F
where
  F: Fn(usize, usize) -> bool + Sync,
{
  fn is_cell_open(&self, start: usize, end: usize) -> bool {
    self(start, end)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_selectors() {
    assert!(ExhaustiveSelector.is_cell_open(0, 5));

    let max_span = |start: usize, end: usize| end - start <= 2;
    let selector: &dyn CellSelector = &max_span;
    assert!(selector.is_cell_open(3, 5));
    assert!(!selector.is_cell_open(0, 3));
  }
}
