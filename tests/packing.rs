use proptest::prelude::*;

use spmvparse::packing::{LeftShiftFunction, UnfilteredFunction};
use spmvparse::{PackingFunction, RightChild};

/// `(num_nonterminals, right_child_end, left, right)` with both children in range.
fn arb_pair() -> impl Strategy<Value = (usize, u32, u32, u32)> {
  (2usize..20_000)
    .prop_flat_map(|v| (Just(v), 2u32..=v as u32))
    .prop_flat_map(|(v, right_end)| (Just(v), Just(right_end), 1u32..v as u32, 1u32..right_end))
}

proptest! {
  #[test]
  fn left_shift_round_trips((v, right_end, left, right) in arb_pair()) {
    let f = LeftShiftFunction::new(v, right_end).unwrap();
    let key = f.pack(left, right);
    prop_assert!(key >= 0);
    prop_assert!(f.is_valid(key));
    prop_assert!((key as usize) < f.packed_array_size());
    prop_assert_eq!(f.unpack_left_child(key), left);
    prop_assert_eq!(f.unpack_right_child(key), RightChild::Child(right));
  }

  #[test]
  fn unfiltered_round_trips((v, _right_end, left, right) in arb_pair()) {
    let f = UnfilteredFunction::new(v).unwrap();
    let key = f.pack(left, right);
    prop_assert!(f.is_valid(key));
    prop_assert_eq!(f.unpack_left_child(key), left);
    prop_assert_eq!(f.unpack_right_child(key), RightChild::Child(right));
  }

  #[test]
  fn reserved_keys_round_trip(v in 2usize..20_000, child in 1u32..20_000, word in 0u32..1_000_000) {
    let child = child % v as u32;
    prop_assume!(child > 0);
    let f = LeftShiftFunction::new(v, v as u32).unwrap();

    let unary = f.pack_unary(child);
    prop_assert!(!f.is_valid(unary));
    prop_assert_eq!(f.unpack_left_child(unary), child);
    prop_assert_eq!(f.unpack_right_child(unary), RightChild::Unary);

    let lexical = f.pack_lexical(word);
    prop_assert!(!f.is_valid(lexical));
    prop_assert_eq!(f.unpack_left_child(lexical), word);
    prop_assert_eq!(f.unpack_right_child(lexical), RightChild::Lexical);
  }
}
