// src/math/legendre.rs
/*!
Closed-form Legendre expansion used to turn accumulated `⟨μ^ℓ |δ|²⟩` moments
into Legendre multipoles `⟨L_ℓ(μ) |δ|²⟩`.

`L_ℓ(μ) = Σ_{k=0}^{⌊ℓ/2⌋} c(k, ℓ) μ^{ℓ-2k}` with
`c(k, ℓ) = (-1)^k C(ℓ, k) C(2ℓ-2k, ℓ) / 2^ℓ`.
*/

/// Binomial coefficient as `f64`, `Π_{i<k} (n-i)/(k-i)`.
///
/// Returns `0` for `k > n`.
#[inline]
pub fn binomial(n: usize, k: usize) -> f64 {
    if k > n {
        return 0.0;
    }
    (0..k).fold(1.0, |acc, i| acc * (n - i) as f64 / (k - i) as f64)
}

/// Coefficient of `μ^{ℓ-2k}` in `L_ℓ(μ)`.
#[inline]
pub fn legendre_coefficient(k: usize, ell: usize) -> f64 {
    debug_assert!(2 * k <= ell, "legendre_coefficient: 2k must not exceed ell");
    let sign = if k % 2 == 0 { 1.0 } else { -1.0 };
    sign * binomial(ell, k) * binomial(2 * ell - 2 * k, ell) / 2f64.powi(ell as i32)
}

/// Evaluate `L_ℓ(μ)` through the closed-form sum.
pub fn legendre_polynomial(ell: usize, mu: f64) -> f64 {
    (0..=ell / 2)
        .map(|k| legendre_coefficient(k, ell) * mu.powi((ell - 2 * k) as i32))
        .sum()
}

/// Convert moment arrays in place: on input `moments[ℓ][b] = ⟨μ^ℓ P⟩_b`, on
/// output `moments[ℓ][b] = ⟨L_ℓ(μ) P⟩_b`.
///
/// Every output row is built from the unconverted inputs.
///
/// # Panics
/// If the rows have different lengths.
pub fn moments_to_multipoles(moments: &mut [Vec<f64>]) {
    let Some(nbins) = moments.first().map(Vec::len) else { return };
    assert!(
        moments.iter().all(|row| row.len() == nbins),
        "moments_to_multipoles: all rows must have the same length"
    );

    let converted: Vec<Vec<f64>> = (0..moments.len())
        .map(|ell| {
            let mut row = vec![0.0; nbins];
            for k in 0..=ell / 2 {
                let c = legendre_coefficient(k, ell);
                let src = &moments[ell - 2 * k];
                for (out, m) in row.iter_mut().zip(src.iter()) {
                    *out += c * m;
                }
            }
            row
        })
        .collect();

    for (dst, src) in moments.iter_mut().zip(converted) {
        *dst = src;
    }
}
