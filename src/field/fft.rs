// src/field/fft.rs
/*!
Unnormalized N-dimensional complex FFT over a row-major buffer.

One `rustfft` plan per axis; lines along each axis are transformed in
parallel with `rayon`. Lines that are not contiguous (every axis but the last)
are gathered into a scratch line, transformed, and scattered back.
*/

use num_complex::Complex64;
use rayon::prelude::*;
use rustfft::{FftDirection, FftPlanner};

/// Transform `data` (shape `shape`, row-major) in place along every axis.
///
/// # Panics
/// If `data.len()` differs from the product of `shape`.
pub fn fft_nd(data: &mut [Complex64], shape: &[usize], direction: FftDirection) {
    let total: usize = shape.iter().product();
    assert_eq!(data.len(), total, "fft_nd: buffer length {} does not match shape {:?}", data.len(), shape);
    if total == 0 {
        return;
    }

    let mut planner = FftPlanner::<f64>::new();
    for axis in 0..shape.len() {
        let len = shape[axis];
        if len <= 1 {
            continue;
        }
        let inner: usize = shape[axis + 1..].iter().product();
        let fft = planner.plan_fft(len, direction);

        if inner == 1 {
            data.par_chunks_mut(len).for_each_init(
                || vec![Complex64::new(0.0, 0.0); fft.get_inplace_scratch_len()],
                |scratch, line| fft.process_with_scratch(line, scratch),
            );
        } else {
            data.par_chunks_mut(len * inner).for_each_init(
                || {
                    (
                        vec![Complex64::new(0.0, 0.0); len],
                        vec![Complex64::new(0.0, 0.0); fft.get_inplace_scratch_len()],
                    )
                },
                |(line, scratch), block| {
                    for offset in 0..inner {
                        for (j, v) in line.iter_mut().enumerate() {
                            *v = block[j * inner + offset];
                        }
                        fft.process_with_scratch(line, scratch);
                        for (j, v) in line.iter().enumerate() {
                            block[j * inner + offset] = *v;
                        }
                    }
                },
            );
        }
    }
}
