use std::env;
use std::io;
use std::io::Write;
use std::process;

use spmvparse::{
  ChartLayout, GrammarBuilder, Objective, PackingKind, ParallelMode, Parser, ParserConfig, Result,
};
use tracing_subscriber::EnvFilter;

fn usage(prog_name: &str) -> String {
  format!(
    r"Usage: {} FILE [options]

Options:
  -h, --help              Print this message
  -c, --chart             Print the parse chart (defaults to not printing)
  -g, --grammar           Print grammar statistics after loading
  --layout dense|packed   Chart cell storage (default dense)
  --packing KIND          left-shift, unfiltered or exact-filter (default left-shift)
  --objective viterbi|inside
  --mode row|cell         How work is split across threads (default row)
  --threads N             Worker threads (default: number of CPUs)

Set RUST_LOG=spmvparse=debug for scheduling and timing events.",
    prog_name
  )
}

fn parse(parser: &mut Parser<'_>, sentence: &str, print_chart: bool) -> Result<()> {
  let words = sentence.split_whitespace().collect::<Vec<_>>();
  let grammar = parser.grammar();
  let result = parser.parse_words(&words)?;

  if print_chart {
    println!("chart:\n{}", result.chart.display(grammar));
  }

  match result.tree(grammar) {
    Some(tree) => {
      println!("log probability {}", result.log_probability);
      println!("{}", tree.bracketed());
      println!("{}", tree);
    }
    None => println!("No parse"),
  }
  println!();

  Ok(())
}

struct Args {
  filename: String,
  print_chart: bool,
  print_grammar: bool,
  packing: PackingKind,
  config: ParserConfig,
}

impl Args {
  fn make_error_message(msg: &str, prog_name: impl AsRef<str>) -> String {
    format!("argument error: {}.\n\n{}", msg, usage(prog_name.as_ref()))
  }

  fn parse(v: Vec<String>) -> Result<Self, String> {
    let mut iter = v.into_iter();
    let prog_name = match iter.next() {
      Some(name) => name,
      None => return Err(Self::make_error_message("bad argument vector", "spmvparse")),
    };

    let mut filename: Option<String> = None;
    let mut print_chart = false;
    let mut print_grammar = false;
    let mut packing = PackingKind::default();
    let mut config = ParserConfig::default();

    while let Some(o) = iter.next() {
      let mut value = |flag: &str| {
        iter
          .next()
          .ok_or_else(|| Self::make_error_message(&format!("{} needs a value", flag), &prog_name))
      };
      let bad = |e: spmvparse::Error| Self::make_error_message(&e.to_string(), &prog_name);

      match o.as_str() {
        "-h" | "--help" => {
          println!("{}", usage(&prog_name));
          process::exit(0);
        }
        "-c" | "--chart" => print_chart = true,
        "-g" | "--grammar" => print_grammar = true,
        "--layout" => config.layout = value(o.as_str())?.parse::<ChartLayout>().map_err(bad)?,
        "--packing" => packing = value(o.as_str())?.parse().map_err(bad)?,
        "--objective" => {
          config.objective = value(o.as_str())?.parse::<Objective>().map_err(bad)?
        }
        "--mode" => {
          config.parallel_mode = value(o.as_str())?.parse::<ParallelMode>().map_err(bad)?
        }
        "--threads" => {
          let n = value(o.as_str())?;
          let n = n
            .parse::<usize>()
            .map_err(|_| {
              Self::make_error_message(&format!("bad thread count {}", n), &prog_name)
            })?;
          config = config.with_threads(n);
        }
        _ if filename.is_none() && !o.starts_with('-') => filename = Some(o),
        _ => return Err(Self::make_error_message("invalid arguments", &prog_name)),
      }
    }

    if let Some(filename) = filename {
      Ok(Self {
        filename,
        print_chart,
        print_grammar,
        packing,
        config,
      })
    } else {
      Err(Self::make_error_message("missing filename", &prog_name))
    }
  }
}

fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::from_default_env())
    .with_writer(io::stderr)
    .init();

  let opts = match Args::parse(env::args().collect()) {
    Ok(opts) => opts,
    Err(msg) => {
      eprintln!("{}", msg);
      process::exit(255);
    }
  };

  let g = GrammarBuilder::read_from_file(&opts.filename)?
    .packing(opts.packing)
    .build()?;
  if opts.print_grammar {
    println!("{}", g);
  }

  let mut parser = Parser::new(&g, opts.config);
  let mut input = String::new();
  loop {
    print!("> ");
    io::stdout().flush()?;

    input.clear();
    if io::stdin().read_line(&mut input)? == 0 {
      // ctrl+d
      return Ok(());
    }
    parse(&mut parser, input.trim(), opts.print_chart)?;
  }
}
