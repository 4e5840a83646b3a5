use std::fmt;

use rustc_hash::FxHashMap;

use crate::packing::RightChild;

/// Right-hand side of a symbolic rule, before symbols are interned.
#[derive(Debug, Clone, PartialEq)]
pub enum Children {
  Binary(String, String),
  Unary(String),
  Lexical(String),
}

impl Children {
  /// The nonterminals this right-hand side mentions.
  pub fn nonterminals(&self) -> impl Iterator<Item = &str> {
    let (a, b) = match self {
      Self::Binary(l, r) => (Some(l.as_str()), Some(r.as_str())),
      Self::Unary(c) => (Some(c.as_str()), None),
      Self::Lexical(_) => (None, None),
    };
    a.into_iter().chain(b)
  }

  pub fn is_lexical(&self) -> bool {
    matches!(self, Self::Lexical(_))
  }
}

impl fmt::Display for Children {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Binary(l, r) => write!(f, "{} {}", l, r),
      Self::Unary(c) => write!(f, "{}", c),
      Self::Lexical(w) => write!(f, "{:?}", w),
    }
  }
}

/// A weighted rule as written in a grammar file.
#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
  pub parent: String,
  pub children: Children,
  /// Natural log of the rule probability.
  pub log_probability: f32,
}

impl Rule {
  pub fn new(parent: &str, children: Children, probability: f64) -> Self {
    Self {
      parent: parent.to_string(),
      children,
      log_probability: probability.ln() as f32,
    }
  }

  pub fn binary(parent: &str, left: &str, right: &str, probability: f64) -> Self {
    Self::new(parent, Children::Binary(left.into(), right.into()), probability)
  }

  pub fn unary(parent: &str, child: &str, probability: f64) -> Self {
    Self::new(parent, Children::Unary(child.into()), probability)
  }

  pub fn lexical(parent: &str, word: &str, probability: f64) -> Self {
    Self::new(parent, Children::Lexical(word.into()), probability)
  }
}

impl fmt::Display for Rule {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "{} -> {} {}",
      self.parent,
      self.children,
      self.log_probability.exp()
    )
  }
}

/// An interned production. `right_child` is [`RightChild::Unary`] or [`RightChild::Lexical`]
/// for the non-binary kinds, in which case `left_child` is the only child (a word index for
/// lexical productions).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Production {
  pub parent: u32,
  pub left_child: u32,
  pub right_child: RightChild,
  pub log_probability: f32,
}

/// Bidirectional map between symbol strings and dense indices.
#[derive(Debug, Clone, Default)]
pub struct Vocabulary {
  names: Vec<String>,
  indices: FxHashMap<String, u32>,
}

impl Vocabulary {
  pub fn new() -> Self {
    Self::default()
  }

  /// Returns the index of `name`, adding it if it's new.
  pub fn intern(&mut self, name: &str) -> u32 {
    if let Some(&idx) = self.indices.get(name) {
      return idx;
    }
    let idx = self.names.len() as u32;
    self.names.push(name.to_string());
    self.indices.insert(name.to_string(), idx);
    idx
  }

  pub fn index(&self, name: &str) -> Option<u32> {
    self.indices.get(name).copied()
  }

  pub fn name(&self, idx: u32) -> &str {
    &self.names[idx as usize]
  }

  pub fn len(&self) -> usize {
    self.names.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

impl<S: AsRef<str>> FromIterator<S> for Vocabulary {
  fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
    let mut vocab = Self::new();
    for name in iter {
      vocab.intern(name.as_ref());
    }
    vocab
  }
}
