use std::ops::Range;

/// Log-space "no value". Every score in the chart starts here.
pub const NEG_INF: f32 = f32::NEG_INFINITY;

/// Adds two natural-log probabilities: `ln(exp(a) + exp(b))`.
///
/// ```
/// use spmvparse::utils::log_sum_exp;
///
/// let half = 0.5f32.ln();
/// assert!((log_sum_exp(half, half) - 0.0).abs() < 1e-6);
/// assert_eq!(log_sum_exp(f32::NEG_INFINITY, half), half);
/// ```
#[inline]
pub fn log_sum_exp(a: f32, b: f32) -> f32 {
  let (hi, lo) = if a >= b { (a, b) } else { (b, a) };
  if lo == NEG_INF {
    return hi;
  }
  hi + (lo - hi).exp().ln_1p()
}

/// Number of bits needed to represent every value in `0..=max`.
///
/// ```
/// use spmvparse::utils::bits_needed;
///
/// assert_eq!(bits_needed(0), 0);
/// assert_eq!(bits_needed(1), 1);
/// assert_eq!(bits_needed(3), 2);
/// assert_eq!(bits_needed(4), 3);
/// ```
pub fn bits_needed(max: u32) -> u32 {
  u32::BITS - max.leading_zeros()
}

/// Splits `0..len` into at most `parts` contiguous ranges of near-equal size.
/// Returns no ranges when `len` is zero.
pub fn split_ranges(len: usize, parts: usize) -> Vec<Range<usize>> {
  let parts = parts.clamp(1, len.max(1));
  let chunk = len.div_ceil(parts);
  (0..len)
    .step_by(chunk.max(1))
    .map(|start| start..(start + chunk).min(len))
    .collect()
}
