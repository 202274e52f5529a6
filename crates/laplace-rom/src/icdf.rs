//! Laplace inverse CDF and fixed-point quantisation
//!
//! ```text
//! F^(-1)(p) = mu - b * sign(p - 0.5) * ln(1 - 2|p - 0.5|)
//! ```
//!
//! Table entries store the quantised magnitude `round(2^scale_exp * |F^(-1)(p)|)`
//! with ties going to the even integer.

/// Inverse cumulative distribution function of Laplace(mu, b)
///
/// Evaluated per half as `mu + b*ln(2p)` and `mu - b*ln(2 - 2p)`, which keeps
/// full precision for `p` close to 0 where `0.5 - p` rounds to 0.5. The
/// median maps exactly to `mu`.
pub fn laplace_inv_cdf(p: f64, mu: f64, b: f64) -> f64 {
    if p < 0.5 {
        mu + b * (2.0 * p).ln()
    } else {
        mu - b * (2.0 - 2.0 * p).ln()
    }
}

/// Quantised absolute value of the standard Laplace ICDF
///
/// Quantisation step is `2^-scale_exp`.
pub fn icdf_abs_quantised(p: f64, scale_exp: i32) -> u64 {
    quantise(laplace_inv_cdf(p, 0.0, 1.0), scale_exp)
}

/// `round(2^scale_exp * |x|)`, ties to even
pub fn quantise(x: f64, scale_exp: i32) -> u64 {
    (exp2i(scale_exp as i64) * x.abs()).round_ties_even() as u64
}

/// `2^e` for integer `e`, saturating to 0 or infinity outside the f64 range
pub(crate) fn exp2i(e: i64) -> f64 {
    2f64.powi(e.clamp(-1100, 1100) as i32)
}
