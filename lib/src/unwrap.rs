//! Two-pass phase unwrapping
//!
//! Columns are unwrapped independently, then tied together through the
//! unwrapped centre row. Finally the whole image is shifted by a multiple of
//! 2π so that the pixel on the optical axis (assumed at the image centre)
//! lies in (-π, π].
//!
//! This is a row/column heuristic, not a branch-cut or least-squares
//! unwrapper: genuine discontinuities that are not aligned with the scan
//! order show up as seams.

use crate::error::DemodError;
use crate::Result;
use ndarray::{Array2, Axis};
use std::f64::consts::PI;

/// Index of the middle element, `round((n - 1) / 2)` with ties to even
pub fn centre_index(n: usize) -> usize {
    (n.saturating_sub(1) as f64 / 2.0).round_ties_even() as usize
}

/// Pixel assumed to be the projection of the optical axis
pub fn centre_pixel(shape: (usize, usize)) -> (usize, usize) {
    (centre_index(shape.0), centre_index(shape.1))
}

/// Row used as the reference contour, `round(n / 2)` with ties to even
fn reference_row(height: usize) -> usize {
    ((height as f64 / 2.0).round_ties_even() as usize).min(height.saturating_sub(1))
}

/// Unwrap a 1D phase sequence
///
/// Jumps of at least π between neighbours are replaced by their 2π
/// complement; a jump of exactly +π is kept as +π.
pub fn unwrap_1d(phase: &[f64]) -> Vec<f64> {
    let mut unwrapped = Vec::with_capacity(phase.len());
    let Some(&first) = phase.first() else {
        return unwrapped;
    };
    unwrapped.push(first);

    let mut correction = 0.0;
    for pair in phase.windows(2) {
        let delta = pair[1] - pair[0];
        if delta.abs() >= PI {
            let mut wrapped = (delta + PI).rem_euclid(2.0 * PI) - PI;
            if wrapped == -PI && delta > 0.0 {
                wrapped = PI;
            }
            correction += wrapped - delta;
        }
        unwrapped.push(pair[1] + correction);
    }
    unwrapped
}

/// Unwrap a wrapped phase image and re-centre it
///
/// Fails with [`DemodError::UnwrapDivergence`] if more than `max_iterations`
/// steps of 2π are needed to bring the centre pixel into (-π, π], or if the
/// centre value is not finite.
pub fn unwrap_2d(phase: &Array2<f64>, max_iterations: usize) -> Result<Array2<f64>> {
    let (h, w) = phase.dim();
    if h == 0 || w == 0 {
        return Err(DemodError::mismatch("cannot unwrap an empty phase image"));
    }

    let row_idx = reference_row(h);
    let row: Vec<f64> = phase.row(row_idx).to_vec();
    let mut contour: Vec<f64> = unwrap_1d(&row).into_iter().map(|v| -v).collect();

    let mut unwrapped = phase.clone();
    for mut column in unwrapped.axis_iter_mut(Axis(1)) {
        let values = unwrap_1d(&column.to_vec());
        for (dst, src) in column.iter_mut().zip(values) {
            *dst = src;
        }
    }

    for (c, value) in contour.iter_mut().enumerate() {
        *value += unwrapped[[row_idx, c]];
    }
    for mut row in unwrapped.axis_iter_mut(Axis(0)) {
        for (value, bias) in row.iter_mut().zip(&contour) {
            *value -= bias;
        }
    }

    recenter(&mut unwrapped, max_iterations)?;
    Ok(unwrapped)
}

/// Shift `phase` by the multiple of 2π that puts its centre pixel in (-π, π]
pub fn recenter(phase: &mut Array2<f64>, max_iterations: usize) -> Result<()> {
    let centre = centre_pixel(phase.dim());
    let value = phase[centre];
    if !value.is_finite() {
        return Err(DemodError::UnwrapDivergence {
            value,
            iterations: 0,
        });
    }

    let mut shift = 0.0;
    let mut iterations = 0;
    while value + shift > PI || value + shift <= -PI {
        if iterations == max_iterations {
            return Err(DemodError::UnwrapDivergence {
                value,
                iterations,
            });
        }
        shift += if value + shift > PI { -2.0 * PI } else { 2.0 * PI };
        iterations += 1;
    }

    if iterations > 0 {
        log::debug!(
            "Re-centred phase by {:.0} x 2pi (centre was {:.3})",
            shift / (2.0 * PI),
            value
        );
        phase.mapv_inplace(|v| v + shift);
    }
    Ok(())
}
