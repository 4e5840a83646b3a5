use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use spmvparse::{ChartLayout, Grammar, PackingKind, Parser, ParserConfig, Rule};

const NONTERMINALS: usize = 40;
const TAGS: usize = 12;
const WORDS: usize = 60;

/// Deterministic pseudo-random grammar: every phrase symbol has a handful of binary rules and one
/// unary rule, every tag covers a handful of words.
fn synthetic_grammar(packing: PackingKind) -> Grammar {
  let mut state = 0x2545_f491_u64;
  let mut next = move |n: usize| {
    state ^= state << 13;
    state ^= state >> 7;
    state ^= state << 17;
    (state % n as u64) as usize
  };

  let symbol = |i: usize| {
    if i < TAGS {
      format!("T{}", i)
    } else {
      format!("X{}", i)
    }
  };

  let mut rules = vec![Rule::unary("TOP", &symbol(TAGS), 1.0)];
  for parent in TAGS..NONTERMINALS {
    rules.push(Rule::unary(&symbol(parent), &symbol(next(TAGS)), 0.1));
    let mut seen = Vec::new();
    while seen.len() < 6 {
      let pair = (next(NONTERMINALS), next(NONTERMINALS));
      if !seen.contains(&pair) {
        seen.push(pair);
        rules.push(Rule::binary(&symbol(parent), &symbol(pair.0), &symbol(pair.1), 0.15));
      }
    }
  }
  for word in 0..WORDS {
    let tag = word % TAGS;
    rules.push(Rule::lexical(&symbol(tag), &format!("w{}", word), 0.1));
  }

  Grammar::builder().packing(packing).rules(rules).build().unwrap()
}

fn sentence(g: &Grammar, len: usize) -> Vec<u32> {
  (0..len)
    .map(|i| g.lexicon().index(&format!("w{}", (i * 7) % WORDS)).unwrap())
    .collect()
}

fn criterion_benchmark(c: &mut Criterion) {
  let mut group = c.benchmark_group("parse");
  for packing in [PackingKind::LeftShift, PackingKind::ExactFilter, PackingKind::Unfiltered] {
    let grammar = synthetic_grammar(packing);
    let input = sentence(&grammar, 20);
    for layout in [ChartLayout::Dense, ChartLayout::Packed] {
      let mut parser = Parser::new(&grammar, ParserConfig::sequential().with_layout(layout));
      group.bench_with_input(
        BenchmarkId::new(format!("{}", packing), format!("{:?}", layout)),
        &input,
        |b, input| b.iter(|| parser.parse(black_box(input)).unwrap().log_probability),
      );
    }
  }
  group.finish();

  let grammar = synthetic_grammar(PackingKind::LeftShift);
  let input = sentence(&grammar, 30);
  let mut parser = Parser::new(&grammar, ParserConfig::default());
  c.bench_function("parse row-parallel", |b| {
    b.iter(|| parser.parse(black_box(&input)).unwrap().log_probability)
  });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
