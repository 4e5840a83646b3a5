use spmvparse::{
  ChartLayout, Error, Grammar, GrammarBuilder, Objective, PackingKind, ParallelMode, Parser,
  ParserConfig, SynTree,
};

const PACKINGS: [PackingKind; 3] = [
  PackingKind::LeftShift,
  PackingKind::Unfiltered,
  PackingKind::ExactFilter,
];
const LAYOUTS: [ChartLayout; 2] = [ChartLayout::Dense, ChartLayout::Packed];

const TIME_FLIES: &str = r#"
  TOP -> NP;
  NP -> NN NN 0.5;
  NN -> "time";
  NN -> "flies";
"#;

/// Small ambiguous grammar: noun compounds and PP attachment.
const AMBIGUOUS: &str = r#"
  TOP -> S;
  S -> NP VP;
  VP -> V NP 0.6;
  VP -> VP PP 0.3;
  VP -> V 0.1;
  NP -> NP PP 0.2;
  NP -> D N 0.4;
  NP -> N N 0.1;
  NP -> N 0.3;
  PP -> P NP;
  D -> "the";
  D -> "a";
  N -> "man" 0.3;
  N -> "telescope" 0.2;
  N -> "hill" 0.2;
  N -> "saw" 0.1;
  V -> "saw" 0.5;
  V -> "walks" 0.5;
  P -> "with" 0.5;
  P -> "on" 0.5;
"#;

fn grammar(src: &str, packing: PackingKind) -> Grammar {
  src
    .parse::<GrammarBuilder>()
    .unwrap()
    .packing(packing)
    .build()
    .unwrap()
}

/// A lexical entry that is also reachable through a longer unary chain.
const UNARY_CHAIN: &str = r#"
  TOP -> C C;
  C -> B;
  B -> A 0.9;
  A -> "a";
  B -> "a" 0.1;
"#;

fn tree_string(tree: &SynTree<String, String>) -> String {
  tree.bracketed().to_string()
}

fn label(tree: &SynTree<String, String>) -> &str {
  tree.get_branch().map(|(c, _)| c.value.as_str()).unwrap()
}

/// Sum of the log probabilities of every rule used in `tree`.
fn tree_log_probability(g: &Grammar, tree: &SynTree<String, String>) -> f32 {
  let (parent, children) = tree.get_branch().unwrap();
  match children.as_slice() {
    [child] => match child.get_leaf() {
      Some(word) => g.lexical_log_probability_str(&parent.value, &word.value),
      None => {
        g.unary_log_probability_str(&parent.value, label(child)) + tree_log_probability(g, child)
      }
    },
    [left, right] => {
      g.binary_log_probability_str(&parent.value, label(left), label(right))
        + tree_log_probability(g, left)
        + tree_log_probability(g, right)
    }
    _ => panic!("{} has {} children", parent.value, children.len()),
  }
}

#[test]
fn time_flies_parses_everywhere() {
  for packing in PACKINGS {
    let g = grammar(TIME_FLIES, packing);
    for layout in LAYOUTS {
      let mut parser = Parser::new(&g, ParserConfig::sequential().with_layout(layout));
      let result = parser.parse_words(&["time", "flies"]).unwrap();
      assert!((result.log_probability - 0.5f32.ln()).abs() < 1e-6);
      assert_eq!(
        tree_string(&result.tree(&g).unwrap()),
        "(TOP (NP (NN time) (NN flies)))"
      );

      let top = result.chart.top_cell().unwrap();
      let entry = top.entry(g.start_symbol()).unwrap();
      assert_eq!(entry.midpoint, 2, "unary entries point at the cell end");
      let np = g.nonterminals().index("NP").unwrap();
      assert_eq!(result.chart.get_cell(0, 2).midpoint(np), Some(1));
    }
  }
}

#[test]
fn unknown_word_is_a_normal_no_parse() {
  let g = grammar(TIME_FLIES, PackingKind::LeftShift);
  let mut parser = Parser::new(&g, ParserConfig::default());
  let result = parser.parse_words(&["time", "xylophone"]).unwrap();
  assert!(!result.is_parsed());
  assert_eq!(result.log_probability, f32::NEG_INFINITY);
  assert!(result.tree(&g).is_none());
  assert_eq!(result.chart.get_cell(1, 2).num_populated(), 0);
}

#[test]
fn layouts_agree() {
  let sentences: [&[&str]; 3] = [
    &["the", "man", "saw", "a", "man", "with", "a", "telescope"],
    &["the", "man", "walks", "on", "the", "hill", "with", "a", "telescope"],
    &["man", "saw", "saw"],
  ];
  for packing in PACKINGS {
    let g = grammar(AMBIGUOUS, packing);
    let mut dense = Parser::new(&g, ParserConfig::sequential());
    let mut packed = Parser::new(
      &g,
      ParserConfig::sequential().with_layout(ChartLayout::Packed),
    );
    for words in sentences {
      let a = dense.parse_words(words).unwrap();
      let b = packed.parse_words(words).unwrap();
      assert!(a.is_parsed(), "{:?}", words);
      assert_eq!(a.log_probability, b.log_probability);
      assert_eq!(
        a.tree(&g).map(|t| tree_string(&t)),
        b.tree(&g).map(|t| tree_string(&t))
      );
    }
  }
}

#[test]
fn packing_functions_agree() {
  let words = ["the", "man", "saw", "a", "man", "on", "the", "hill", "with", "a", "telescope"];
  let results = PACKINGS
    .iter()
    .map(|&packing| {
      let g = grammar(AMBIGUOUS, packing);
      let result = Parser::new(&g, ParserConfig::sequential())
        .parse_words(&words)
        .unwrap();
      (result.log_probability, tree_string(&result.tree(&g).unwrap()))
    })
    .collect::<Vec<_>>();
  assert!(results.windows(2).all(|w| w[0] == w[1]), "{:?}", results);
}

#[test]
fn threads_are_bit_identical() {
  let g = grammar(AMBIGUOUS, PackingKind::LeftShift);
  let words = ["the", "man", "saw", "a", "man", "on", "the", "hill", "with", "a", "telescope"];

  let reference = Parser::new(&g, ParserConfig::sequential())
    .parse_words(&words)
    .unwrap();

  let configs = [
    ParserConfig::sequential().with_threads(4),
    ParserConfig::sequential()
      .with_threads(3)
      .with_layout(ChartLayout::Packed),
    ParserConfig::sequential()
      .with_threads(4)
      .with_parallel_mode(ParallelMode::Cell)
      .with_min_parallel_rows(0),
  ];
  for config in configs {
    let result = Parser::new(&g, config.clone()).parse_words(&words).unwrap();
    assert_eq!(
      result.log_probability.to_bits(),
      reference.log_probability.to_bits(),
      "{:?}",
      config
    );
    for (a, b) in reference.chart.cells().zip(result.chart.cells()) {
      assert_eq!(a.entries(), b.entries(), "{:?}", config);
    }
  }
}

#[test]
fn inside_is_at_least_viterbi() {
  let g = grammar(AMBIGUOUS, PackingKind::LeftShift);
  let words = ["the", "man", "saw", "a", "man", "with", "a", "telescope"];

  let best = Parser::new(&g, ParserConfig::sequential())
    .parse_words(&words)
    .unwrap();
  let total = Parser::new(
    &g,
    ParserConfig::sequential().with_objective(Objective::Inside),
  )
  .parse_words(&words)
  .unwrap();

  assert!(total.log_probability > best.log_probability);
  assert!(total.tree(&g).is_some());
}

#[test]
fn pp_attachment_ambiguity() {
  let g = grammar(AMBIGUOUS, PackingKind::LeftShift);
  let tree = g
    .parse(&["the", "man", "saw", "a", "man", "with", "a", "telescope"])
    .unwrap()
    .unwrap();
  // VP -> VP PP (0.3) beats NP -> NP PP (0.2) once VP -> V NP is paid for either way
  assert_eq!(
    tree_string(&tree),
    "(TOP (S (NP (D the) (N man)) (VP (VP (V saw) (NP (D a) (N man))) (PP (P with) (NP (D a) (N telescope))))))"
  );
}

#[test]
fn selector_closes_cells() {
  let g = grammar(AMBIGUOUS, PackingKind::LeftShift);
  let words = g.map_sentence(&["the", "man", "walks"]);
  let mut parser = Parser::new(&g, ParserConfig::sequential());

  let open = parser.parse(&words).unwrap();
  assert!(open.is_parsed());

  // without (0, 2) there is no NP for the subject
  let closed = parser
    .parse_with_selector(&words, &|start: usize, end: usize| (start, end) != (0, 2))
    .unwrap();
  assert!(!closed.is_parsed());
  assert!(closed.chart.get_cell(0, 2).is_finalized());
  assert_eq!(closed.chart.get_cell(0, 2).num_populated(), 0);
}

#[test]
fn grammar_file_round_trip() {
  let path = std::env::temp_dir().join(format!("spmvparse-{}.grammar", std::process::id()));
  std::fs::write(&path, TIME_FLIES).unwrap();
  let g = Grammar::read_from_file(&path).unwrap();
  std::fs::remove_file(&path).unwrap();
  assert_eq!(g.num_nonterminals(), 3);

  let missing = Grammar::read_from_file(path.with_extension("missing")).unwrap_err();
  assert!(matches!(missing, Error::ReadGrammar { .. }));
}

#[test]
fn display_summaries() {
  let g = grammar(TIME_FLIES, PackingKind::LeftShift);
  let stats = g.to_string();
  assert!(stats.contains("//** start: TOP"));
  assert!(stats.contains("//** binary rules: 1"));

  let result = Parser::new(&g, ParserConfig::sequential())
    .parse_words(&["time", "flies"])
    .unwrap();
  let chart = result.chart.display(&g).to_string();
  assert!(chart.contains("Cell 0..2:"));
  assert!(chart.contains("TOP"));
}

#[test]
fn tree_matches_reported_probability() {
  let configs = [
    ParserConfig::sequential(),
    ParserConfig::sequential().with_layout(ChartLayout::Packed),
    ParserConfig::sequential()
      .with_threads(3)
      .with_parallel_mode(ParallelMode::Cell)
      .with_min_parallel_rows(0),
  ];
  let cases: [(&str, &[&str]); 3] = [
    (UNARY_CHAIN, &["a", "a"]),
    (AMBIGUOUS, &["the", "man", "saw", "a", "man", "with", "a", "telescope"]),
    (AMBIGUOUS, &["man", "saw", "saw"]),
  ];
  for packing in PACKINGS {
    for (src, words) in cases {
      let g = grammar(src, packing);
      for config in &configs {
        let result = Parser::new(&g, config.clone()).parse_words(words).unwrap();
        let tree = result.tree(&g).unwrap();
        let from_tree = tree_log_probability(&g, &tree);
        assert!(
          (from_tree - result.log_probability).abs() < 1e-5,
          "{:?} {:?}: tree {} scores {}, chart reports {}",
          words,
          config,
          tree_string(&tree),
          from_tree,
          result.log_probability
        );
      }
    }
  }
}

#[test]
fn unary_chain_scores_the_whole_chain() {
  let g = grammar(UNARY_CHAIN, PackingKind::LeftShift);
  let result = Parser::new(&g, ParserConfig::sequential())
    .parse_words(&["a", "a"])
    .unwrap();
  assert!((result.log_probability - 0.81f32.ln()).abs() < 1e-5);
  assert_eq!(
    tree_string(&result.tree(&g).unwrap()),
    "(TOP (C (B (A a))) (C (B (A a))))"
  );
}

#[test]
fn out_of_lexicon_index_is_a_normal_no_parse() {
  let g = grammar(TIME_FLIES, PackingKind::LeftShift);
  let time = g.lexicon().index("time").unwrap();
  let mut parser = Parser::new(&g, ParserConfig::sequential());
  for word in [i32::MAX as u32, u32::MAX - 1, g.lexicon().len() as u32] {
    let result = parser.parse(&[time, word]).unwrap();
    assert!(!result.is_parsed());
    assert_eq!(result.chart.get_cell(1, 2).num_populated(), 0);
  }
}
