//! Spatial bandpass around the fringe carrier
//!
//! Isolates the carrier lobe of the centred spectrum with a hard circular
//! mask and inverse-transforms it. The argument of the result is the wrapped
//! fringe phase.

use crate::carrier::{locate_carrier, CarrierPeak};
use crate::config::{DemodConfig, Demodulation};
use crate::error::DemodError;
use crate::fft2d::{ifftshift, roll_to_origin, Fft2D};
use crate::Result;
use ndarray::{Array2, Zip};
use num_complex::Complex64;
use std::f64::consts::PI;

/// Binary disk of `radius` pixels around `centre` = (row, col)
///
/// A pixel belongs to the disk when its Euclidean distance to the centre is
/// at most `radius`. Values are exactly 0.0 or 1.0.
pub fn circular_mask(
    height: usize,
    width: usize,
    centre: (usize, usize),
    radius: f64,
) -> Array2<f64> {
    let (cr, cc) = (centre.0 as f64, centre.1 as f64);
    Array2::from_shape_fn((height, width), |(r, c)| {
        let dist = ((r as f64 - cr).powi(2) + (c as f64 - cc).powi(2)).sqrt();
        if dist <= radius {
            1.0
        } else {
            0.0
        }
    })
}

/// Fold a phase into (-pi, pi]
#[inline]
pub fn wrap_phase(phase: f64) -> f64 {
    let wrapped = (phase + PI).rem_euclid(2.0 * PI) - PI;
    if wrapped <= -PI {
        wrapped + 2.0 * PI
    } else {
        wrapped
    }
}

/// Apply `mask` to the centred `spectrum` and return the wrapped phase
///
/// In [`Demodulation::Baseband`] mode the carrier bin becomes the new zero
/// frequency, otherwise the spectrum is only un-centred and the carrier ramp
/// stays in the phase.
pub fn filter_image(
    spectrum: &Array2<Complex64>,
    mask: &Array2<f64>,
    carrier: CarrierPeak,
    fft: &Fft2D,
    mode: Demodulation,
) -> Result<Array2<f64>> {
    if spectrum.dim() != fft.shape() || mask.dim() != fft.shape() {
        return Err(DemodError::mismatch(format!(
            "spectrum {:?} and mask {:?} do not match the {:?} transform",
            spectrum.dim(),
            mask.dim(),
            fft.shape()
        )));
    }

    let mut masked = spectrum.clone();
    Zip::from(&mut masked).and(mask).for_each(|s, &m| *s *= m);

    let mut field = match mode {
        Demodulation::Baseband => roll_to_origin(&masked, (carrier.row, carrier.col)),
        Demodulation::CarrierRamp => ifftshift(&masked),
    };
    fft.inverse(&mut field)?;

    Ok(field.mapv(|z| {
        let phase = z.im.atan2(z.re);
        // atan2 may return exactly -pi for a negative real part with -0.0 imaginary
        if phase <= -PI {
            phase + 2.0 * PI
        } else {
            phase
        }
    }))
}

/// Carrier search, mask construction and filtering for one normalised frame
pub fn wrapped_phase(
    image: &Array2<f64>,
    fft: &Fft2D,
    config: &DemodConfig,
) -> Result<(CarrierPeak, Array2<f64>)> {
    let (carrier, spectrum) = locate_carrier(image, fft, config)?;
    let (h, w) = image.dim();

    let (_, carrier_cycles) = carrier.frequency((h, w));
    if (carrier_cycles as f64) <= config.mask_radius {
        log::warn!(
            "Mask radius {} reaches the zero-frequency bin ({} cycles away), DC will leak into the phase",
            config.mask_radius,
            carrier_cycles
        );
    }

    let mask = circular_mask(h, w, (carrier.row, carrier.col), config.mask_radius);
    let phase = filter_image(&spectrum, &mask, carrier, fft, config.demodulation)?;
    Ok((carrier, phase))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fringe(h: usize, w: usize, cycles: usize, phase: f64) -> Array2<f64> {
        Array2::from_shape_fn((h, w), |(_, c)| {
            0.5 + 0.5 * (2.0 * PI * cycles as f64 * c as f64 / w as f64 + phase).cos()
        })
    }

    #[test]
    fn test_mask_geometry() {
        let mask = circular_mask(9, 11, (4, 6), 2.0);

        assert!(mask.iter().all(|&v| v == 0.0 || v == 1.0));
        assert_eq!(mask[[4, 6]], 1.0);
        assert_eq!(mask[[4, 8]], 1.0); // distance exactly 2
        assert_eq!(mask[[6, 8]], 0.0); // distance sqrt(8)
        assert_eq!(mask[[0, 0]], 0.0);
        // 13 lattice points within distance 2 of a centre
        assert_eq!(mask.sum(), 13.0);
    }

    #[test]
    fn test_wrap_phase_range() {
        assert!((wrap_phase(2.5 * PI) - 0.5 * PI).abs() < 1e-12);
        assert!((wrap_phase(-PI) - PI).abs() < 1e-12);
        assert!((wrap_phase(0.5) - 0.5).abs() < 1e-12);
        assert!((wrap_phase(-7.0) - (-7.0 + 2.0 * PI)).abs() < 1e-12);
    }

    #[test]
    fn test_baseband_recovers_phase_offset() {
        let (h, w) = (32, 128);
        let fft = Fft2D::new(h, w).unwrap();
        let config = DemodConfig::default();

        for &phi0 in &[0.0, 0.3, 1.2, -2.0, 3.0] {
            let image = fringe(h, w, 32, phi0);
            let (carrier, phase) = wrapped_phase(&image, &fft, &config).unwrap();
            assert_eq!(carrier.col, w / 2 + 32);

            for ((r, c), &value) in phase.indexed_iter() {
                assert!(
                    (value - phi0).abs() < 1e-6,
                    "phi0 = {}: got {} at ({}, {})",
                    phi0,
                    value,
                    r,
                    c
                );
            }
        }
    }

    #[test]
    fn test_carrier_ramp_mode_keeps_ramp() {
        let (h, w) = (16, 64);
        let fft = Fft2D::new(h, w).unwrap();
        let config = DemodConfig {
            mask_radius: 8.0,
            demodulation: Demodulation::CarrierRamp,
            ..DemodConfig::default()
        };

        let cycles = 16;
        let phi0 = 0.7;
        let image = fringe(h, w, cycles, phi0);
        let (_, phase) = wrapped_phase(&image, &fft, &config).unwrap();

        for ((r, c), &value) in phase.indexed_iter() {
            let expected = wrap_phase(phi0 + 2.0 * PI * cycles as f64 * c as f64 / w as f64);
            let diff = wrap_phase(value - expected);
            assert!(diff.abs() < 1e-6, "({}, {}): {} vs {}", r, c, value, expected);
        }
    }

    #[test]
    fn test_filter_shape_mismatch() {
        let fft = Fft2D::new(8, 8).unwrap();
        let spectrum = Array2::<Complex64>::zeros((8, 8));
        let mask = circular_mask(8, 6, (4, 3), 2.0);
        let carrier = CarrierPeak { row: 4, col: 6 };
        assert!(matches!(
            filter_image(&spectrum, &mask, carrier, &fft, Demodulation::Baseband),
            Err(DemodError::DimensionMismatch(_))
        ));
    }

    #[test]
    fn test_output_range() {
        let (h, w) = (16, 32);
        let fft = Fft2D::new(h, w).unwrap();
        // off-bin carrier so the lobe leaks across the mask
        let image = Array2::from_shape_fn((h, w), |(_, c)| {
            0.5 + 0.4 * (2.0 * PI * 9.3 * c as f64 / w as f64 + 0.2).cos()
        });
        let config = DemodConfig {
            mask_radius: 4.0,
            ..DemodConfig::default()
        };

        let (_, phase) = wrapped_phase(&image, &fft, &config).unwrap();
        assert!(phase.iter().all(|&v| v > -PI && v <= PI));
    }
}
