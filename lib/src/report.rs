//! Serialisable calibration summary

use crate::calibration::CalibrationFit;
use crate::Result;
use serde::{Deserialize, Serialize};
#[cfg(not(target_arch = "wasm32"))]
use std::path::Path;

/// How the fitted offsets were obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalibrationMethod {
    /// Consecutive-pair differences fitted per FLC window
    FlcWindows,
    /// Differences relative to the first pair
    Reference,
}

/// Result of one calibration run over a demodulated stack
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationReport {
    pub method: CalibrationMethod,
    pub height: usize,
    pub width: usize,
    /// Pixel whose phase difference was fitted
    pub centre: (usize, usize),
    /// Frames that went into the difference stack
    pub frames: Vec<usize>,
    /// Carrier coordinate (row, col) found in each frame
    pub carriers: Vec<(usize, usize)>,
    pub fits: Vec<CalibrationFit>,
}

impl CalibrationReport {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    #[cfg(not(target_arch = "wasm32"))]
    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        std::fs::write(path.as_ref(), self.to_json()?)?;
        log::info!("Wrote calibration report to {}", path.as_ref().display());
        Ok(())
    }

    /// Human readable summary, one line per fitted window
    pub fn summary(&self) -> String {
        let mut summary = format!(
            "Calibration ({:?}) on {}x{} frames, centre pixel ({}, {}), {} frame(s)\n",
            self.method,
            self.height,
            self.width,
            self.centre.0,
            self.centre.1,
            self.frames.len()
        );
        for fit in &self.fits {
            let worst = fit
                .residuals
                .iter()
                .fold(0.0f64, |acc, r| acc.max(r.abs()));
            summary.push_str(&format!(
                "  [{:>2}, {:>2}) flip {:.4}: offset {:.4}, gradient {:.4}, max |residual| {:.4}\n",
                fit.window.start, fit.window.end, fit.window.flip, fit.offset, fit.fit.gradient, worst
            ));
        }
        summary
    }
}
