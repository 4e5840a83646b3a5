//! Simple recursive-descent parsing of grammar files
//!
//! ```text
//! // comment
//! TOP -> NP 1.0;
//! NP -> NN NN 0.5;
//! NN -> "time";
//! ```
use std::str::FromStr;

use regex::Regex;

use crate::grammar::{Grammar, GrammarBuilder};
use crate::rules::{Children, Rule};
use crate::{Error, Result};

/// Parses a grammar from a string with the default packing function. The first rule's parent is
/// the start symbol.
impl FromStr for Grammar {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    s.parse::<GrammarBuilder>()?.build()
  }
}

/// Reads the rules of a grammar without building it, so the packing function can still be chosen.
impl FromStr for GrammarBuilder {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let (rules, s) = parse_rules(s)?;
    if !s.is_empty() {
      return Err(format_error(format!("trailing input at {}", preview(s))));
    }
    Ok(GrammarBuilder::new().rules(rules))
  }
}

type Infallible<'a, T> = (T, &'a str);
type ParseResult<'a, T> = Result<(T, &'a str)>;

/// helper macro for initializing a regex with lazy_static!
macro_rules! regex_static {
  ($name:ident, $pattern:expr) => {
    lazy_static! {
      static ref $name: Regex = Regex::new($pattern).unwrap();
    }
  };
}

fn format_error(msg: impl Into<String>) -> Error {
  Error::GrammarFormat(msg.into())
}

/// First line of the remaining input, for error messages
fn preview(s: &str) -> &str {
  s.lines().next().unwrap_or("")
}

/// Try to consume a regex, returning None if it doesn't match
fn optional_re<'a>(re: &'static Regex, s: &'a str) -> Infallible<'a, Option<&'a str>> {
  match re.find(s) {
    Some(m) if m.start() == 0 => (Some(m.as_str()), &s[m.end()..]),
    _ => (None, s),
  }
}

/// Try to consume a regex, failing if it doesn't match
fn needed_re<'a>(re: &'static Regex, s: &'a str) -> ParseResult<'a, &'a str> {
  if let (Some(c), rest) = optional_re(re, s) {
    Ok((c, rest))
  } else {
    Err(format_error(format!("couldn't match {} at {}", re, preview(s))))
  }
}

/// Try to consume a char, returning None if it doesn't match
fn optional_char(c: char, s: &str) -> Infallible<'_, Option<char>> {
  match s.strip_prefix(c) {
    Some(rest) => (Some(c), rest),
    None => (None, s),
  }
}

/// Skips whitespace and `//` comments
fn skip_whitespace(s: &str) -> &str {
  regex_static!(WHITESPACE_OR_COMMENT, r"(\s|//[^\n]*)*");
  optional_re(&WHITESPACE_OR_COMMENT, s).1
}

/// Nonterminal names: anything but whitespace, quotes and `;`, not starting with a digit or `-`
fn parse_name(s: &str) -> ParseResult<'_, &str> {
  regex_static!(NAME, r#"[^\s";0-9\-][^\s";]*"#);
  needed_re(&NAME, s).map_err(|e| format_error(format!("name: {}", e)))
}

/// A double-quoted terminal. `\"` and `\\` escape.
fn parse_terminal(s: &str) -> ParseResult<'_, String> {
  regex_static!(TERMINAL, r#""((?:[^"\\]|\\.)*)""#);
  let (quoted, rest) = needed_re(&TERMINAL, s).map_err(|e| format_error(format!("terminal: {}", e)))?;
  let inner = &quoted[1..quoted.len() - 1];

  let mut word = String::with_capacity(inner.len());
  let mut chars = inner.chars();
  while let Some(c) = chars.next() {
    if c == '\\' {
      word.extend(chars.next());
    } else {
      word.push(c);
    }
  }
  Ok((word, rest))
}

fn parse_probability(s: &str) -> ParseResult<'_, Option<f64>> {
  regex_static!(NUMBER, r"[0-9]*\.?[0-9]+([eE][-+]?[0-9]+)?");
  match optional_re(&NUMBER, s) {
    (Some(n), rest) => {
      let p = n
        .parse::<f64>()
        .map_err(|e| format_error(format!("probability {}: {}", n, e)))?;
      Ok((Some(p), rest))
    }
    (None, rest) => Ok((None, rest)),
  }
}

enum Item {
  Symbol(String),
  Terminal(String),
}

/// Parent, arrow, one or two children, optional probability, terminated by `;`
fn parse_rule(s: &str) -> ParseResult<'_, Rule> {
  #![allow(clippy::trivial_regex)]
  regex_static!(ARROW, "->");

  let (parent, s) = parse_name(s).map_err(|e| format_error(format!("rule parent: {}", e)))?;
  let s = skip_whitespace(s);
  let (_, s) = needed_re(&ARROW, s).map_err(|e| format_error(format!("rule arrow: {}", e)))?;

  let mut items = Vec::new();
  let mut probability = None;
  let mut rem = s;
  loop {
    rem = skip_whitespace(rem);
    if let (Some(_), s) = optional_char(';', rem) {
      rem = s;
      break;
    }
    if probability.is_some() {
      return Err(format_error(format!(
        "rule {}: expected ; after probability at {}",
        parent,
        preview(rem)
      )));
    }

    if rem.starts_with('"') {
      let (word, s) = parse_terminal(rem)?;
      items.push(Item::Terminal(word));
      rem = s;
    } else if let (Some(p), s) = parse_probability(rem)? {
      probability = Some(p);
      rem = s;
    } else {
      let (name, s) =
        parse_name(rem).map_err(|e| format_error(format!("rule {}: {}", parent, e)))?;
      items.push(Item::Symbol(name.to_string()));
      rem = s;
    }
  }

  let children = match items.as_slice() {
    [Item::Symbol(l), Item::Symbol(r)] => Children::Binary(l.clone(), r.clone()),
    [Item::Symbol(c)] => Children::Unary(c.clone()),
    [Item::Terminal(w)] => Children::Lexical(w.clone()),
    [] => return Err(format_error(format!("rule {} has no children", parent))),
    _ => {
      return Err(format_error(format!(
        "rule {} must have two nonterminals, one nonterminal or one terminal",
        parent
      )))
    }
  };

  Ok((Rule::new(parent, children, probability.unwrap_or(1.0)), rem))
}

fn parse_rules(s: &str) -> ParseResult<'_, Vec<Rule>> {
  let mut rules = Vec::new();
  let mut rem = s;
  loop {
    rem = skip_whitespace(rem);
    if rem.is_empty() {
      return Ok((rules, rem));
    }
    let (rule, s) = parse_rule(rem)?;
    rules.push(rule);
    rem = s;
  }
}
