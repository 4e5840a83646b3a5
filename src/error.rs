use std::path::PathBuf;

/// Result type used throughout the crate, defaulting to [`Error`].
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Everything that can go wrong while building a grammar or running a parse.
///
/// Grammar and packing errors are fatal configuration errors raised at load time. A sentence
/// without a derivation is *not* an error; see [`crate::ParseResult::is_parsed`].
#[derive(Debug, thiserror::Error)]
pub enum Error {
  #[error("grammar format: {0}")]
  GrammarFormat(String),

  #[error("empty ruleset")]
  EmptyGrammar,

  #[error("symbol `{0}` is used as a child but no production derives it")]
  UndefinedSymbol(String),

  #[error("start symbol `{0}` may not appear as a child")]
  StartSymbolAsChild(String),

  #[error("invalid probability {probability} for `{rule}`")]
  InvalidProbability { rule: String, probability: f64 },

  #[error("productions of `{parent}` sum to {mass}, which exceeds 1")]
  NonStochastic { parent: String, mass: f64 },

  #[error(
    "{nonterminals} nonterminals do not fit a packed key with a {shift}-bit right child field"
  )]
  PackingOverflow { nonterminals: usize, shift: u32 },

  #[error("a lexicon of {words} words cannot be packed next to {nonterminals} nonterminals")]
  LexiconTooLarge { words: usize, nonterminals: usize },

  #[error("sentence of length {length} exceeds the representable maximum of {max}")]
  SentenceTooLong { length: usize, max: usize },

  #[error("cell {start},{end} is already finalized")]
  CellFinalized { start: usize, end: usize },

  #[error("worker thread panicked: {0}")]
  WorkerPanicked(String),

  #[error("couldn't read {}: {source}", path.display())]
  ReadGrammar {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error(transparent)]
  Io(#[from] std::io::Error),
}

impl Error {
  /// Turns the payload of a panicked worker into an [`Error::WorkerPanicked`].
  pub(crate) fn from_panic(payload: Box<dyn std::any::Any + Send + 'static>) -> Self {
    let msg = if let Some(s) = payload.downcast_ref::<&str>() {
      s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
      s.clone()
    } else {
      "unknown panic payload".to_string()
    };
    Error::WorkerPanicked(msg)
  }
}
