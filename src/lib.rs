//! A probabilistic CKY chart parser that fills each cell with sparse matrix × vector multiplies.
//!
//! ```
//! use spmvparse::Grammar;
//!
//! let g: Grammar = r#"
//!   TOP -> NP;
//!   NP -> NN NN 0.5;
//!   NN -> "time";
//!   NN -> "flies";
//! "#
//! .parse()
//! .unwrap();
//!
//! let tree = g.parse(&["time", "flies"]).unwrap().unwrap();
//! assert_eq!(tree.bracketed().to_string(), "(TOP (NP (NN time) (NN flies)))");
//! ```

#[macro_use]
extern crate lazy_static;

pub mod cell_selector;
pub mod chart;
pub mod config;
pub mod cross_product;
pub mod error;
pub mod grammar;
pub mod packing;
pub mod parse_grammar;
pub mod parser;
pub mod rules;
pub mod scheduler;
pub mod spmv;
pub mod syntree;
pub mod utils;

pub use crate::cell_selector::{CellSelector, ExhaustiveSelector};
pub use crate::chart::{Cell, CellEntry, Chart, ChartView, ChildList, MAX_SENTENCE_LENGTH};
pub use crate::config::{ChartLayout, Objective, ParallelMode, ParserConfig};
pub use crate::error::{Error, Result};
pub use crate::grammar::{Grammar, GrammarBuilder, UNKNOWN_WORD};
pub use crate::packing::{PackedChildren, Packing, PackingFunction, PackingKind, RightChild};
pub use crate::parser::{ParseResult, Parser};
pub use crate::rules::{Children, Rule};
pub use crate::syntree::SynTree;

impl Grammar {
  /// Parses `input` with the default configuration and returns the best tree, or `None` when the
  /// sentence has no derivation.
  pub fn parse(&self, input: &[&str]) -> Result<Option<SynTree<String, String>>> {
    let result = Parser::new(self, ParserConfig::default()).parse_words(input)?;
    Ok(result.tree(self))
  }
}

#[test]
fn test_parse_convenience() {
  let g: Grammar = r#"
    S -> NP VP;
    NP -> "she" 0.5;
    NP -> D N 0.5;
    D -> "the";
    N -> "fish";
    VP -> V NP;
    V -> "eats";
  "#
  .parse()
  .unwrap();

  let tree = g.parse(&["she", "eats", "the", "fish"]).unwrap().unwrap();
  assert_eq!(
    tree.bracketed().to_string(),
    "(S (NP she) (VP (V eats) (NP (D the) (N fish))))"
  );
  assert!(g.parse(&["the", "she", "eats"]).unwrap().is_none());
}
