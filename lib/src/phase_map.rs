//! Phase map and spectrum rendering
//!
//! Scales 2D phase or magnitude arrays into the unit interval and, with the
//! `image` feature, writes them as colour-mapped PNG files for inspection.

use ndarray::Array2;
use num_complex::Complex64;

/// Display range used for log-magnitude spectra, `log10 |F|`
pub const LOG_SPECTRUM_RANGE: (f64, f64) = (0.0, 6.0);

/// Finite minimum and maximum of `data`, `None` if nothing is finite
pub fn finite_range(data: &Array2<f64>) -> Option<(f64, f64)> {
    data.iter()
        .filter(|v| v.is_finite())
        .fold(None, |acc, &v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })
}

/// Map `data` linearly onto [0, 1], clipping to `range`
///
/// Without an explicit range the finite extent of the data is used. A flat
/// range maps everything to 0; non-finite samples map to 0 as well.
pub fn normalize(data: &Array2<f64>, range: Option<(f64, f64)>) -> Array2<f64> {
    let (lo, hi) = range.or_else(|| finite_range(data)).unwrap_or((0.0, 0.0));
    let span = hi - lo;
    data.mapv(|v| {
        if !v.is_finite() || span <= 0.0 {
            0.0
        } else {
            ((v - lo) / span).clamp(0.0, 1.0)
        }
    })
}

/// `log10 |F|` of a spectrum, empty bins clamped to the smallest positive float
pub fn log_magnitude(spectrum: &Array2<Complex64>) -> Array2<f64> {
    spectrum.mapv(|z| z.norm().max(f64::MIN_POSITIVE).log10())
}

#[cfg(feature = "image")]
pub mod image {
    use super::*;
    use crate::Result;
    use ::image::{ImageBuffer, Rgb, RgbImage};
    use std::path::Path;

    /// Color maps for phase and spectrum images
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub enum ColorMap {
        #[default]
        Viridis,
        Grayscale,
        Jet,
        /// Cyclic map, suited to wrapped phase
        Twilight,
    }

    impl ColorMap {
        pub fn all() -> &'static [ColorMap] {
            &[
                ColorMap::Viridis,
                ColorMap::Grayscale,
                ColorMap::Jet,
                ColorMap::Twilight,
            ]
        }

        pub fn name(&self) -> &'static str {
            match self {
                ColorMap::Viridis => "viridis",
                ColorMap::Grayscale => "grayscale",
                ColorMap::Jet => "jet",
                ColorMap::Twilight => "twilight",
            }
        }

        pub fn parse(name: &str) -> Option<Self> {
            let name = name.to_lowercase();
            Self::all().iter().copied().find(|c| c.name() == name)
        }
    }

    /// Convert a value (0.0 to 1.0) to RGB color using the specified colormap
    fn value_to_color(value: f64, colormap: ColorMap) -> Rgb<u8> {
        let v = value.clamp(0.0, 1.0);

        match colormap {
            ColorMap::Viridis => {
                // Viridis colormap approximation
                let r = (v * v * v * 0.3 + v * 0.1) * 255.0;
                let g = (v.sqrt() * 0.8 + v * 0.2) * 255.0;
                let b = (v.powf(0.3) * 0.9 + v * 0.1) * 255.0;
                Rgb([r as u8, g as u8, b as u8])
            }
            ColorMap::Grayscale => {
                let gray = (v * 255.0) as u8;
                Rgb([gray, gray, gray])
            }
            ColorMap::Jet => {
                let ramp = |centre: f64| (1.5 - (4.0 * v - centre).abs()).clamp(0.0, 1.0);
                Rgb([
                    (ramp(3.0) * 255.0) as u8,
                    (ramp(2.0) * 255.0) as u8,
                    (ramp(1.0) * 255.0) as u8,
                ])
            }
            ColorMap::Twilight => {
                // equal colour at both ends so a 2pi wrap is invisible
                let angle = 2.0 * std::f64::consts::PI * v;
                let r = 0.5 + 0.4 * angle.cos();
                let g = 0.5 + 0.4 * (angle - 2.0).cos();
                let b = 0.5 + 0.4 * (angle + 2.0).cos();
                Rgb([(r * 255.0) as u8, (g * 255.0) as u8, (b * 255.0) as u8])
            }
        }
    }

    /// Render an array row by row, clipped to `range` (data extent if `None`)
    pub fn render(data: &Array2<f64>, range: Option<(f64, f64)>, colormap: ColorMap) -> RgbImage {
        let scaled = normalize(data, range);
        let (h, w) = scaled.dim();
        let mut img = ImageBuffer::new(w as u32, h as u32);
        for ((r, c), &v) in scaled.indexed_iter() {
            img.put_pixel(c as u32, r as u32, value_to_color(v, colormap));
        }
        img
    }

    /// Save a wrapped, unwrapped or difference phase map as PNG
    pub fn save_phase_map<P: AsRef<Path>>(
        path: P,
        phase: &Array2<f64>,
        range: Option<(f64, f64)>,
        colormap: ColorMap,
    ) -> Result<()> {
        render(phase, range, colormap).save(path.as_ref())?;
        log::info!(
            "Saved {}x{} phase map to {}",
            phase.ncols(),
            phase.nrows(),
            path.as_ref().display()
        );
        Ok(())
    }

    /// Save `log10 |F|` of a centred spectrum clipped to [`LOG_SPECTRUM_RANGE`]
    pub fn save_log_spectrum<P: AsRef<Path>>(
        path: P,
        spectrum: &Array2<Complex64>,
        colormap: ColorMap,
    ) -> Result<()> {
        let magnitude = log_magnitude(spectrum);
        render(&magnitude, Some(LOG_SPECTRUM_RANGE), colormap).save(path.as_ref())?;
        log::info!("Saved log spectrum to {}", path.as_ref().display());
        Ok(())
    }

}
