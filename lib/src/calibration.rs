//! Frame differencing and FLC calibration fits
//!
//! A calibration sweep rotates a polariser on a stage in fixed steps while
//! the FLC toggles between states, so consecutive frames form pairs whose
//! phase difference at the image centre depends linearly on stage angle.

use crate::error::DemodError;
use crate::unwrap::centre_pixel;
use crate::Result;
use ndarray::{s, Array2, Array3, Axis};
use serde::{Deserialize, Serialize};
use std::f64::consts::{FRAC_PI_2, PI};

/// Least-squares line `y = gradient * x + intercept`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinearFit {
    pub gradient: f64,
    pub intercept: f64,
}

impl LinearFit {
    pub fn eval(&self, x: f64) -> f64 {
        self.gradient * x + self.intercept
    }
}

/// Ordinary least-squares line through `(x, y)`
pub fn linear_fit(x: &[f64], y: &[f64]) -> Result<LinearFit> {
    if x.len() != y.len() {
        return Err(DemodError::mismatch(format!(
            "{} abscissae for {} ordinates",
            x.len(),
            y.len()
        )));
    }

    let n = x.len();
    let insufficient = |points| DemodError::InsufficientCalibrationData {
        start: 0,
        end: n,
        points,
    };
    if n < 2 {
        return Err(insufficient(n));
    }

    let mean_x = x.iter().sum::<f64>() / n as f64;
    let mean_y = y.iter().sum::<f64>() / n as f64;
    let (sxx, sxy) = x
        .iter()
        .zip(y)
        .fold((0.0, 0.0), |(sxx, sxy), (&xi, &yi)| {
            let dx = xi - mean_x;
            (sxx + dx * dx, sxy + dx * (yi - mean_y))
        });

    if sxx == 0.0 {
        // all abscissae coincide, only one distinct point
        return Err(insufficient(1));
    }

    let gradient = sxy / sxx;
    Ok(LinearFit {
        gradient,
        intercept: mean_y - gradient * mean_x,
    })
}

/// Range of difference pairs fitted together, plus the FLC phase flip
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationWindow {
    pub start: usize,
    pub end: usize,
    pub flip: f64,
}

impl CalibrationWindow {
    pub fn new(start: usize, end: usize, flip: f64) -> Self {
        Self { start, end, flip }
    }

    /// The three FLC state windows of the standard 18-position sweep
    pub fn flc_defaults() -> [CalibrationWindow; 3] {
        [
            CalibrationWindow::new(0, 7, 0.0),
            CalibrationWindow::new(8, 13, FRAC_PI_2),
            CalibrationWindow::new(14, 18, PI),
        ]
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Outcome of fitting one calibration window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationFit {
    pub window: CalibrationWindow,
    pub fit: LinearFit,
    /// `intercept / 4 + flip`
    pub offset: f64,
    /// Stage angles inside the window, degrees
    pub angles: Vec<f64>,
    /// Central phase differences inside the window, degrees
    pub measured: Vec<f64>,
    /// Fitted line evaluated at `angles`
    pub fitted: Vec<f64>,
    /// `(measured / 4 - angle) - offset`
    pub residuals: Vec<f64>,
}

/// Differences of consecutive unwrapped phases, `[height, width, pair]`
pub fn phase_differences(phases: &[Array2<f64>]) -> Result<Array3<f64>> {
    if phases.len() < 2 {
        return Err(DemodError::mismatch(format!(
            "phase differencing needs at least 2 frames, got {}",
            phases.len()
        )));
    }

    let (h, w) = phases[0].dim();
    let mut diffs = Array3::<f64>::zeros((h, w, phases.len() - 1));
    for (n, pair) in phases.windows(2).enumerate() {
        if pair[1].dim() != (h, w) {
            return Err(DemodError::mismatch(format!(
                "phase {} is {}x{}, expected {}x{}",
                n + 1,
                pair[1].nrows(),
                pair[1].ncols(),
                h,
                w
            )));
        }
        diffs
            .slice_mut(s![.., .., n])
            .assign(&(&pair[1] - &pair[0]));
    }
    Ok(diffs)
}

/// Every `stride`-th pair of a difference stack
pub fn subsample_pairs(diffs: &Array3<f64>, stride: usize) -> Array3<f64> {
    let stride = stride.max(1) as isize;
    diffs.slice(s![.., .., ..;stride]).to_owned()
}

/// Subtract the first difference image from every difference image
pub fn reference_offsets(diffs: &Array3<f64>) -> Array3<f64> {
    let reference = diffs.index_axis(Axis(2), 0).to_owned();
    let mut offsets = diffs.clone();
    for mut pair in offsets.axis_iter_mut(Axis(2)) {
        pair -= &reference;
    }
    offsets
}

/// Central-pixel value of every pair, converted to degrees
pub fn central_offsets_deg(diffs: &Array3<f64>) -> Vec<f64> {
    let (h, w, _) = diffs.dim();
    let (cy, cx) = centre_pixel((h, w));
    diffs
        .slice(s![cy, cx, ..])
        .iter()
        .map(|v| v.to_degrees())
        .collect()
}

/// Fit measured central offsets against stage angles over `window`
///
/// `flip` is added to the quarter intercept as given.
pub fn calibrate_window(
    central_deg: &[f64],
    angles: &[f64],
    window: CalibrationWindow,
) -> Result<CalibrationFit> {
    if window.len() < 2 {
        return Err(DemodError::InsufficientCalibrationData {
            start: window.start,
            end: window.end,
            points: window.len(),
        });
    }
    if window.end > central_deg.len() || window.end > angles.len() {
        return Err(DemodError::mismatch(format!(
            "window [{}, {}) exceeds {} difference pair(s) / {} stage angle(s)",
            window.start,
            window.end,
            central_deg.len(),
            angles.len()
        )));
    }

    let measured = central_deg[window.start..window.end].to_vec();
    let angles = angles[window.start..window.end].to_vec();
    let fit = linear_fit(&angles, &measured).map_err(|e| match e {
        DemodError::InsufficientCalibrationData { points, .. } => {
            DemodError::InsufficientCalibrationData {
                start: window.start,
                end: window.end,
                points,
            }
        }
        other => other,
    })?;

    let offset = fit.intercept / 4.0 + window.flip;
    let fitted = angles.iter().map(|&a| fit.eval(a)).collect();
    let residuals = measured
        .iter()
        .zip(&angles)
        .map(|(&m, &a)| (m / 4.0 - a) - offset)
        .collect();

    log::info!(
        "Window [{}, {}): offset {:.4}, gradient {:.4}",
        window.start,
        window.end,
        offset,
        fit.gradient
    );

    Ok(CalibrationFit {
        window,
        fit,
        offset,
        angles,
        measured,
        fitted,
        residuals,
    })
}
