//! Problem scaling.
//!
//! Scaling factors are powers of two throughout, so applying and undoing
//! them only touches floating point exponents and round-trips bit-exactly.

pub mod curtis_reid;

pub use curtis_reid::{curtis_reid_exponents, ScalingError};

/// Largest exponent magnitude a scaling pass may produce.
pub const MAX_SCALING_EXPONENT: i32 = 1024;

/// Multiply by 2^exp touching only the exponent bits.
///
/// Equivalent to `ldexp`. The power of two is built in two halves so the
/// intermediate factors stay representable for any `exp` within
/// [-2 * MAX_SCALING_EXPONENT, 2 * MAX_SCALING_EXPONENT].
pub fn ldexp(x: f64, exp: i32) -> f64 {
    let half = exp / 2;
    x * pow2(half) * pow2(exp - half)
}

fn pow2(exp: i32) -> f64 {
    2f64.powi(exp)
}
