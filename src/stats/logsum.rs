//! Stable log-space addition for the Forward/Backward recursions.

/// Differences beyond this bound contribute less than f32 can resolve.
const LOGSUM_MAX_DIFF: f32 = 15.7;

/// log(exp(a) + exp(b)), guarded against -inf operands.
///
/// Forward and Backward spend most of their time here; the early-out on a
/// large difference keeps the common case to one comparison.
#[inline]
pub fn logsum(a: f32, b: f32) -> f32 {
    let (hi, lo) = if a >= b { (a, b) } else { (b, a) };
    if lo == f32::NEG_INFINITY || hi - lo >= LOGSUM_MAX_DIFF {
        hi
    } else {
        hi + (-(hi - lo)).exp().ln_1p()
    }
}

/// log(Σ exp(x_i)) over a slice.
pub fn logsum_slice(xs: &[f32]) -> f32 {
    xs.iter().copied().fold(f32::NEG_INFINITY, logsum)
}
