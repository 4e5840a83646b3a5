//! Packing of production right-hand sides into a single signed key.
//!
//! A binary right-hand side `(left, right)` packs to a non-negative key that doubles as an index
//! into the cross-product vector. Negative keys are reserved: `-child` is a unary production on
//! `child`, and anything `<= -V` is a lexical production on word `-key - V`, where `V` is the
//! number of nonterminals.

use std::fmt;
use std::str::FromStr;

use crate::utils::bits_needed;
use crate::{Error, Result};

/// A packed right-hand side.
pub type PackedChildren = i32;

/// What [`PackingFunction::unpack_right_child`] finds in the right-child field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RightChild {
  Child(u32),
  Unary,
  Lexical,
}

impl RightChild {
  pub fn child(self) -> Option<u32> {
    match self {
      Self::Child(c) => Some(c),
      _ => None,
    }
  }
}

/// The operations the rest of the parser uses to talk about child pairs.
pub trait PackingFunction {
  /// Number of nonterminals `V` in the grammar this function was built for.
  fn num_nonterminals(&self) -> usize;

  /// Size of a dense array indexed by every key `pack` can return.
  fn packed_array_size(&self) -> usize;

  fn pack(&self, left_child: u32, right_child: u32) -> PackedChildren;

  fn unpack_left_child(&self, key: PackedChildren) -> u32;

  fn unpack_right_child(&self, key: PackedChildren) -> RightChild;

  /// True if `key` may hold a cross-product entry.
  fn is_valid(&self, key: PackedChildren) -> bool;

  fn pack_unary(&self, child: u32) -> PackedChildren {
    -(child as i32)
  }

  /// Only words inside the lexicon round-trip; the grammar build rejects lexicons whose keys
  /// would not fit. Anything larger wraps.
  fn pack_lexical(&self, word: u32) -> PackedChildren {
    (-(self.num_nonterminals() as i32)).wrapping_sub(word as i32)
  }
}

/// Shared decoding of the reserved negative keys.
#[inline]
fn unpack_negative(v: i32, key: PackedChildren) -> (u32, RightChild) {
  if key <= -v {
    ((-key - v) as u32, RightChild::Lexical)
  } else {
    (-key as u32, RightChild::Unary)
  }
}

/// Packs `(left, right)` as `right * V + left`. The key space is `V * V`, so every pair of
/// nonterminals is representable, at the price of a sparse cross-product vector.
#[derive(Debug, Clone)]
pub struct UnfilteredFunction {
  modulus: i32,
}

impl UnfilteredFunction {
  pub fn new(num_nonterminals: usize) -> Result<Self> {
    if num_nonterminals.saturating_mul(num_nonterminals) > i32::MAX as usize {
      return Err(Error::PackingOverflow {
        nonterminals: num_nonterminals,
        shift: 0,
      });
    }
    Ok(Self {
      modulus: num_nonterminals as i32,
    })
  }
}

impl PackingFunction for UnfilteredFunction {
  fn num_nonterminals(&self) -> usize {
    self.modulus as usize
  }

  fn packed_array_size(&self) -> usize {
    (self.modulus as usize) * (self.modulus as usize)
  }

  #[inline]
  fn pack(&self, left_child: u32, right_child: u32) -> PackedChildren {
    right_child as i32 * self.modulus + left_child as i32
  }

  #[inline]
  fn unpack_left_child(&self, key: PackedChildren) -> u32 {
    if key < 0 {
      return unpack_negative(self.modulus, key).0;
    }
    (key % self.modulus) as u32
  }

  #[inline]
  fn unpack_right_child(&self, key: PackedChildren) -> RightChild {
    if key < 0 {
      return unpack_negative(self.modulus, key).1;
    }
    RightChild::Child((key / self.modulus) as u32)
  }

  #[inline]
  fn is_valid(&self, key: PackedChildren) -> bool {
    key >= 0 && (key as usize) < self.packed_array_size()
  }
}

/// Packs `(left, right)` as `left << shift | right & mask`, where the right-child field is just
/// wide enough for the largest valid right child plus a sign bit.
#[derive(Debug, Clone)]
pub struct LeftShiftFunction {
  num_nonterminals: i32,
  left_child_shift: u32,
  right_child_shift: u32,
  mask: i32,
}

impl LeftShiftFunction {
  /// `right_child_end` is the exclusive upper bound of the valid right-child range.
  pub fn new(num_nonterminals: usize, right_child_end: u32) -> Result<Self> {
    let left_child_shift = bits_needed(right_child_end.saturating_sub(1)) + 1;
    let overflow = || Error::PackingOverflow {
      nonterminals: num_nonterminals,
      shift: left_child_shift,
    };

    if left_child_shift >= i32::BITS
      || (num_nonterminals as u128) << left_child_shift > i32::MAX as u128
    {
      return Err(overflow());
    }

    Ok(Self {
      num_nonterminals: num_nonterminals as i32,
      left_child_shift,
      right_child_shift: i32::BITS - left_child_shift,
      mask: (1 << left_child_shift) - 1,
    })
  }

  pub fn left_child_shift(&self) -> u32 {
    self.left_child_shift
  }

  pub fn mask(&self) -> i32 {
    self.mask
  }
}

impl PackingFunction for LeftShiftFunction {
  fn num_nonterminals(&self) -> usize {
    self.num_nonterminals as usize
  }

  fn packed_array_size(&self) -> usize {
    (self.num_nonterminals as usize) << self.left_child_shift
  }

  #[inline]
  fn pack(&self, left_child: u32, right_child: u32) -> PackedChildren {
    (left_child as i32) << self.left_child_shift | (right_child as i32 & self.mask)
  }

  #[inline]
  fn unpack_left_child(&self, key: PackedChildren) -> u32 {
    if key < 0 {
      return unpack_negative(self.num_nonterminals, key).0;
    }
    (key as u32) >> self.left_child_shift
  }

  #[inline]
  fn unpack_right_child(&self, key: PackedChildren) -> RightChild {
    if key < 0 {
      return unpack_negative(self.num_nonterminals, key).1;
    }
    // sign-extend the right-child field
    let right = (key << self.right_child_shift) >> self.right_child_shift;
    RightChild::Child(right as u32)
  }

  #[inline]
  fn is_valid(&self, key: PackedChildren) -> bool {
    key >= 0 && (key as usize) < self.packed_array_size()
  }
}

/// [`LeftShiftFunction`] plus a bitset of the child pairs that actually occur in the binary
/// grammar, so that `is_valid` rejects pairs no rule can consume.
#[derive(Debug, Clone)]
pub struct ExactFilterFunction {
  inner: LeftShiftFunction,
  valid_pairs: Vec<u64>,
}

impl ExactFilterFunction {
  pub fn new(inner: LeftShiftFunction, pairs: impl IntoIterator<Item = (u32, u32)>) -> Self {
    let mut valid_pairs = vec![0u64; inner.packed_array_size().div_ceil(64)];
    for (left, right) in pairs {
      let key = inner.pack(left, right) as usize;
      valid_pairs[key / 64] |= 1 << (key % 64);
    }
    Self { inner, valid_pairs }
  }

  pub fn inner(&self) -> &LeftShiftFunction {
    &self.inner
  }
}

impl PackingFunction for ExactFilterFunction {
  fn num_nonterminals(&self) -> usize {
    self.inner.num_nonterminals()
  }

  fn packed_array_size(&self) -> usize {
    self.inner.packed_array_size()
  }

  #[inline]
  fn pack(&self, left_child: u32, right_child: u32) -> PackedChildren {
    self.inner.pack(left_child, right_child)
  }

  #[inline]
  fn unpack_left_child(&self, key: PackedChildren) -> u32 {
    self.inner.unpack_left_child(key)
  }

  #[inline]
  fn unpack_right_child(&self, key: PackedChildren) -> RightChild {
    self.inner.unpack_right_child(key)
  }

  #[inline]
  fn is_valid(&self, key: PackedChildren) -> bool {
    self.inner.is_valid(key) && {
      let key = key as usize;
      self.valid_pairs[key / 64] & (1 << (key % 64)) != 0
    }
  }
}

/// Which packing function a grammar is built with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PackingKind {
  #[default]
  LeftShift,
  Unfiltered,
  ExactFilter,
}

impl FromStr for PackingKind {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    match s {
      "left-shift" | "default" => Ok(Self::LeftShift),
      "unfiltered" => Ok(Self::Unfiltered),
      "exact-filter" | "exact" => Ok(Self::ExactFilter),
      _ => Err(Error::GrammarFormat(format!("unknown packing function {}", s))),
    }
  }
}

impl fmt::Display for PackingKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      Self::LeftShift => "left-shift",
      Self::Unfiltered => "unfiltered",
      Self::ExactFilter => "exact-filter",
    };
    write!(f, "{}", s)
  }
}

/// The packing function a grammar was built with.
#[derive(Debug, Clone)]
pub enum Packing {
  LeftShift(LeftShiftFunction),
  Unfiltered(UnfilteredFunction),
  ExactFilter(ExactFilterFunction),
}

impl Packing {
  pub fn kind(&self) -> PackingKind {
    match self {
      Self::LeftShift(_) => PackingKind::LeftShift,
      Self::Unfiltered(_) => PackingKind::Unfiltered,
      Self::ExactFilter(_) => PackingKind::ExactFilter,
    }
  }
}

macro_rules! dispatch {
  ($self:ident, $f:ident => $body:expr) => {
    match $self {
      Packing::LeftShift($f) => $body,
      Packing::Unfiltered($f) => $body,
      Packing::ExactFilter($f) => $body,
    }
  };
}

impl PackingFunction for Packing {
  fn num_nonterminals(&self) -> usize {
    dispatch!(self, f => f.num_nonterminals())
  }

  fn packed_array_size(&self) -> usize {
    dispatch!(self, f => f.packed_array_size())
  }

  #[inline]
  fn pack(&self, left_child: u32, right_child: u32) -> PackedChildren {
    dispatch!(self, f => f.pack(left_child, right_child))
  }

  #[inline]
  fn unpack_left_child(&self, key: PackedChildren) -> u32 {
    dispatch!(self, f => f.unpack_left_child(key))
  }

  #[inline]
  fn unpack_right_child(&self, key: PackedChildren) -> RightChild {
    dispatch!(self, f => f.unpack_right_child(key))
  }

  #[inline]
  fn is_valid(&self, key: PackedChildren) -> bool {
    dispatch!(self, f => f.is_valid(key))
  }
}
