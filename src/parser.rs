use crate::cell_selector::{CellSelector, ExhaustiveSelector};
use crate::chart::Chart;
use crate::config::ParserConfig;
use crate::grammar::Grammar;
use crate::scheduler::{FillContext, ScratchPool};
use crate::syntree::SynTree;
use crate::utils::NEG_INF;
use crate::Result;

/// A filled chart and the inside probability of the start symbol over the whole sentence.
#[derive(Debug, Clone)]
pub struct ParseResult {
  pub chart: Chart,
  /// −∞ when the sentence has no derivation.
  pub log_probability: f32,
}

impl ParseResult {
  pub fn is_parsed(&self) -> bool {
    self.log_probability != NEG_INF
  }

  /// The best tree, following backpointers from the top cell.
  pub fn tree(&self, grammar: &Grammar) -> Option<SynTree<String, String>> {
    self.chart.extract_best_parse(grammar)
  }
}

/// Parses sentences against one grammar, reusing worker scratch buffers between sentences.
#[derive(Debug)]
pub struct Parser<'g> {
  grammar: &'g Grammar,
  config: ParserConfig,
  pool: ScratchPool,
}

impl<'g> Parser<'g> {
  pub fn new(grammar: &'g Grammar, config: ParserConfig) -> Self {
    let pool = ScratchPool::new(config.worker_count());
    Self {
      grammar,
      config,
      pool,
    }
  }

  pub fn grammar(&self) -> &'g Grammar {
    self.grammar
  }

  pub fn config(&self) -> &ParserConfig {
    &self.config
  }

  /// Parses a sentence of lexicon indices, visiting every cell.
  pub fn parse(&mut self, sentence: &[u32]) -> Result<ParseResult> {
    self.parse_with_selector(sentence, &ExhaustiveSelector)
  }

  /// Maps `words` through the grammar's lexicon and parses them. Unknown words have no lexical
  /// productions, so a sentence containing one simply fails to parse.
  pub fn parse_words(&mut self, words: &[&str]) -> Result<ParseResult> {
    let sentence = self.grammar.map_sentence(words);
    self.parse(&sentence)
  }

  /// Parses a sentence, skipping every cell `selector` closes.
  #[tracing::instrument(skip_all, fields(length = sentence.len()))]
  pub fn parse_with_selector(
    &mut self,
    sentence: &[u32],
    selector: &dyn CellSelector,
  ) -> Result<ParseResult> {
    let grammar = self.grammar;
    let mut chart = Chart::new(sentence.len(), grammar.num_nonterminals(), self.config.layout)?;

    let ctx = FillContext {
      grammar,
      config: &self.config,
      sentence,
      selector,
    };
    ctx.fill(&mut chart, &mut self.pool)?;

    let log_probability = chart.top_probability(grammar);
    tracing::debug!(
      log_probability,
      populated = chart.cells().map(|c| c.num_populated()).sum::<usize>(),
      "parsed"
    );

    Ok(ParseResult {
      chart,
      log_probability,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::{ChartLayout, Objective};
  use crate::packing::PackingKind;
  use crate::rules::Rule;

  fn time_flies(kind: PackingKind) -> Grammar {
    Grammar::builder()
      .packing(kind)
      .rules(vec![
        Rule::unary("TOP", "NP", 1.0),
        Rule::binary("NP", "NN", "NN", 0.5),
        Rule::lexical("NN", "time", 1.0),
        Rule::lexical("NN", "flies", 1.0),
      ])
      .build()
      .unwrap()
  }

  #[test]
  fn test_time_flies() {
    for kind in [PackingKind::LeftShift, PackingKind::Unfiltered, PackingKind::ExactFilter] {
      for layout in [ChartLayout::Dense, ChartLayout::Packed] {
        let g = time_flies(kind);
        let mut parser = Parser::new(&g, ParserConfig::sequential().with_layout(layout));
        let result = parser.parse_words(&["time", "flies"]).unwrap();

        assert!(result.is_parsed());
        assert!((result.log_probability - 0.5f32.ln()).abs() < 1e-6);
        assert_eq!(
          result.tree(&g).unwrap().bracketed().to_string(),
          "(TOP (NP (NN time) (NN flies)))"
        );
      }
    }
  }

  #[test]
  fn test_no_parse() {
    let g = time_flies(PackingKind::LeftShift);
    let mut parser = Parser::new(&g, ParserConfig::sequential());

    let result = parser.parse_words(&["time", "banana"]).unwrap();
    assert!(!result.is_parsed());
    assert_eq!(result.log_probability, NEG_INF);
    assert!(result.tree(&g).is_none());

    // a lone noun never reaches TOP through NP
    assert!(!parser.parse_words(&["time"]).unwrap().is_parsed());
    assert!(!parser.parse(&[]).unwrap().is_parsed());
  }

  #[test]
  fn test_parser_is_reusable() {
    let g = time_flies(PackingKind::LeftShift);
    let mut parser = Parser::new(&g, ParserConfig::sequential().with_layout(ChartLayout::Packed));
    let first = parser.parse_words(&["time", "flies"]).unwrap();
    let _ = parser.parse_words(&["flies", "time", "flies"]).unwrap();
    let again = parser.parse_words(&["time", "flies"]).unwrap();
    assert_eq!(first.log_probability, again.log_probability);
  }

  #[test]
  fn test_inside_objective() {
    let g = Grammar::builder()
      .rules(vec![
        Rule::unary("TOP", "S", 1.0),
        Rule::binary("S", "S", "S", 0.5),
        Rule::lexical("S", "x", 0.5),
      ])
      .build()
      .unwrap();

    let mut viterbi = Parser::new(&g, ParserConfig::sequential());
    let mut inside = Parser::new(&g, ParserConfig::sequential().with_objective(Objective::Inside));

    let best = viterbi.parse_words(&["x", "x", "x"]).unwrap();
    let total = inside.parse_words(&["x", "x", "x"]).unwrap();
    assert!((best.log_probability - 0.03125f32.ln()).abs() < 1e-5);
    assert!((total.log_probability - 0.0625f32.ln()).abs() < 1e-5);
    assert_eq!(
      total.tree(&g).unwrap().bracketed().to_string(),
      "(TOP (S (S x) (S (S x) (S x))))"
    );
  }
}
