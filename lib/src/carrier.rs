//! Fringe carrier detection
//!
//! The carrier is the dominant spatial frequency of the interference fringes.
//! It is found on the centre row of the centred 2D spectrum as the last local
//! maximum above a relative threshold.

use crate::config::DemodConfig;
use crate::error::DemodError;
use crate::fft2d::{fftshift, Fft2D};
use crate::Result;
use ndarray::Array2;
use num_complex::Complex64;

/// Pixel coordinate of the carrier peak in the centred spectrum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CarrierPeak {
    pub row: usize,
    pub col: usize,
}

impl CarrierPeak {
    /// Offset from the zero-frequency bin in cycles per image (row, col)
    pub fn frequency(&self, shape: (usize, usize)) -> (isize, isize) {
        (
            self.row as isize - (shape.0 / 2) as isize,
            self.col as isize - (shape.1 / 2) as isize,
        )
    }
}

/// Indices of local maxima of `y` above `threshold` of its range
///
/// A sample is a peak when the signal strictly rises into it and strictly
/// falls out of it. Flat runs are split at their median so that a plateau
/// top reports one index. With `min_dist > 1` the highest peaks win and
/// weaker neighbours closer than `min_dist` are dropped. Output is sorted.
pub fn find_peaks(y: &[f64], threshold: f64, min_dist: usize) -> Vec<usize> {
    if y.len() < 3 {
        return Vec::new();
    }

    let (min, max) = y
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    let level = threshold * (max - min) + min;

    let mut dy: Vec<f64> = y.windows(2).map(|w| w[1] - w[0]).collect();
    if dy.iter().all(|&d| d == 0.0) {
        return Vec::new();
    }
    resolve_plateaus(&mut dy);

    let mut peaks: Vec<usize> = (1..y.len() - 1)
        .filter(|&i| dy[i - 1] > 0.0 && dy[i] < 0.0 && y[i] > level)
        .collect();

    if peaks.len() > 1 && min_dist > 1 {
        peaks = suppress_close_peaks(y, peaks, min_dist);
    }
    peaks
}

/// Replace zero derivatives with their neighbours' slopes
fn resolve_plateaus(dy: &mut [f64]) {
    let n = dy.len();
    let mut runs = Vec::new();
    let mut i = 0;
    while i < n {
        if dy[i] == 0.0 {
            let start = i;
            while i < n && dy[i] == 0.0 {
                i += 1;
            }
            runs.push((start, i - 1));
        } else {
            i += 1;
        }
    }

    for (start, end) in runs {
        if start == 0 {
            // leading flat run takes the slope that follows it
            let next = dy[end + 1];
            dy[start..=end].fill(next);
        } else if end == n - 1 {
            let prev = dy[start - 1];
            dy[start..=end].fill(prev);
        } else {
            let prev = dy[start - 1];
            let next = dy[end + 1];
            let median = (start + end) as f64 / 2.0;
            for (k, d) in dy[start..=end].iter_mut().enumerate() {
                *d = if ((start + k) as f64) < median { prev } else { next };
            }
        }
    }
}

fn suppress_close_peaks(y: &[f64], peaks: Vec<usize>, min_dist: usize) -> Vec<usize> {
    let mut by_height = peaks.clone();
    by_height.sort_by(|&a, &b| y[b].total_cmp(&y[a]));

    let mut keep = vec![false; y.len()];
    let mut rejected = vec![false; y.len()];
    for &peak in &by_height {
        if rejected[peak] {
            continue;
        }
        keep[peak] = true;
        let lo = peak.saturating_sub(min_dist);
        let hi = (peak + min_dist).min(y.len() - 1);
        for r in lo..=hi {
            if r != peak {
                rejected[r] = true;
            }
        }
    }

    peaks.into_iter().filter(|&p| keep[p]).collect()
}

/// Locate the fringe carrier of a normalised image
///
/// The carrier is the last peak of the centre row and must lie on the
/// positive-frequency side of the zero-frequency bin.
///
/// Returns the carrier coordinate together with the centred spectrum it was
/// found in, so the bandpass stage does not transform the image twice.
pub fn locate_carrier(
    image: &Array2<f64>,
    fft: &Fft2D,
    config: &DemodConfig,
) -> Result<(CarrierPeak, Array2<Complex64>)> {
    let spectrum = fftshift(&fft.forward_real(image)?);
    let centre_row = image.nrows() / 2;

    let magnitudes: Vec<f64> = spectrum.row(centre_row).iter().map(|v| v.norm()).collect();
    let peaks = find_peaks(&magnitudes, config.peak_threshold, config.min_peak_distance);

    // the zero-frequency lobe and its mirror side never qualify as carrier
    let col = match peaks.last() {
        Some(&col) if col > image.ncols() / 2 => col,
        _ => {
            return Err(DemodError::NoCarrierFound {
                threshold: config.peak_threshold,
            })
        }
    };
    let peak = CarrierPeak {
        row: centre_row,
        col,
    };

    log::debug!(
        "Carrier at ({}, {}) among {} peak(s), |F| = {:.3e}",
        peak.row,
        peak.col,
        peaks.len(),
        magnitudes[col]
    );

    Ok((peak, spectrum))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn fringe(h: usize, w: usize, cycles: usize, phase: f64) -> Array2<f64> {
        Array2::from_shape_fn((h, w), |(_, c)| {
            0.5 + 0.5 * (2.0 * PI * cycles as f64 * c as f64 / w as f64 + phase).cos()
        })
    }

    #[test]
    fn test_find_peaks_basic() {
        let y = [0.0, 1.0, 0.0, 0.2, 3.0, 0.1, 0.0, 2.0, 0.0];
        assert_eq!(find_peaks(&y, 0.1, 1), vec![1, 4, 7]);
        assert_eq!(find_peaks(&y, 0.5, 1), vec![4, 7]);
        assert_eq!(find_peaks(&y, 0.9, 1), vec![4]);
    }

    #[test]
    fn test_find_peaks_edges_and_flat() {
        // endpoints are never peaks
        assert!(find_peaks(&[5.0, 1.0, 0.0, 1.0, 5.0], 0.0, 1).is_empty());
        assert!(find_peaks(&[1.0, 1.0, 1.0, 1.0], 0.0, 1).is_empty());
        assert!(find_peaks(&[1.0, 2.0], 0.0, 1).is_empty());
    }

    #[test]
    fn test_find_peaks_plateau() {
        let y = [0.0, 1.0, 2.0, 2.0, 2.0, 1.0, 0.0];
        assert_eq!(find_peaks(&y, 0.1, 1), vec![3]);

        let y = [0.0, 2.0, 2.0, 0.0];
        assert_eq!(find_peaks(&y, 0.1, 1), vec![1]);
    }

    #[test]
    fn test_find_peaks_min_distance() {
        let y = [0.0, 3.0, 0.0, 2.0, 0.0, 0.0, 0.0, 1.0, 0.0];
        assert_eq!(find_peaks(&y, 0.0, 1), vec![1, 3, 7]);
        assert_eq!(find_peaks(&y, 0.0, 3), vec![1, 7]);
    }

    #[test]
    fn test_locate_injected_carrier() {
        let (h, w) = (32, 128);
        let fft = Fft2D::new(h, w).unwrap();
        let config = DemodConfig::default();

        for &cycles in &[5usize, 17, 32, 40] {
            let image = fringe(h, w, cycles, 0.3);
            let (peak, spectrum) = locate_carrier(&image, &fft, &config).unwrap();

            assert_eq!(
                peak,
                CarrierPeak {
                    row: h / 2,
                    col: w / 2 + cycles
                },
                "carrier of {} cycles",
                cycles
            );
            assert_eq!(peak.frequency((h, w)), (0, cycles as isize));
            assert_eq!(spectrum.dim(), (h, w));
        }
    }

    #[test]
    fn test_no_carrier_in_flat_image() {
        let (h, w) = (16, 16);
        let fft = Fft2D::new(h, w).unwrap();
        let image = Array2::from_elem((h, w), 1.0);

        let err = locate_carrier(&image, &fft, &DemodConfig::default()).unwrap_err();
        assert!(matches!(err, DemodError::NoCarrierFound { .. }));
    }

    #[test]
    fn test_no_carrier_on_centre_row() {
        // fringes running along the rows put the carrier off the centre row
        let (h, w) = (32, 32);
        let fft = Fft2D::new(h, w).unwrap();
        let image = Array2::from_shape_fn((h, w), |(r, _)| {
            0.5 + 0.5 * (2.0 * PI * 6.0 * r as f64 / h as f64).cos()
        });

        assert!(matches!(
            locate_carrier(&image, &fft, &DemodConfig::default()),
            Err(DemodError::NoCarrierFound { .. })
        ));
    }
}
