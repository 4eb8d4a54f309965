//! Main demodulation processor
//!
//! Provides the DemodProcessor struct that coordinates carrier search,
//! filtering, unwrapping, differencing and calibration over a frame stack.

use crate::bandpass::wrapped_phase;
use crate::calibration::{
    calibrate_window, central_offsets_deg, phase_differences, reference_offsets,
    subsample_pairs, CalibrationFit, CalibrationWindow,
};
use crate::carrier::CarrierPeak;
use crate::config::DemodConfig;
use crate::error::DemodError;
use crate::fft2d::{fftshift, Fft2D};
use crate::frame_io::FrameStack;
use crate::report::{CalibrationMethod, CalibrationReport};
use crate::unwrap::{centre_pixel, unwrap_2d};
use crate::Result;
use ndarray::{Array2, Array3};
use num_complex::Complex64;

/// Demodulated phase of one frame
#[derive(Debug, Clone)]
pub struct FrameResult {
    /// Index of the frame in the loaded stack
    pub frame_index: usize,
    pub carrier: CarrierPeak,
    pub wrapped: Array2<f64>,
    pub unwrapped: Array2<f64>,
}

/// Stateful pipeline over one frame stack
pub struct DemodProcessor {
    config: DemodConfig,
    stack: Option<FrameStack>,
    frames: Option<Vec<FrameResult>>,
    differences: Option<Array3<f64>>,
}

impl Default for DemodProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl DemodProcessor {
    /// Create a new processor with default configuration
    pub fn new() -> Self {
        Self::with_config(DemodConfig::default())
    }

    pub fn with_config(config: DemodConfig) -> Self {
        Self {
            config,
            stack: None,
            frames: None,
            differences: None,
        }
    }

    pub fn config(&self) -> &DemodConfig {
        &self.config
    }

    /// Replace the configuration, dropping results computed with the old one
    pub fn set_config(&mut self, config: DemodConfig) -> Result<()> {
        config.validate()?;
        self.config = config;
        self.frames = None;
        self.differences = None;
        Ok(())
    }

    /// Load a frame stack, discarding previous results
    pub fn load_stack(&mut self, stack: FrameStack) {
        log::info!(
            "Loaded stack: {}x{} pixels, {} frame(s)",
            stack.height(),
            stack.width(),
            stack.num_frames()
        );
        self.stack = Some(stack);
        self.frames = None;
        self.differences = None;
    }

    pub fn stack(&self) -> Option<&FrameStack> {
        self.stack.as_ref()
    }

    /// Demodulate one frame of the loaded stack without storing it
    pub fn demodulate_frame(&self, index: usize) -> Result<FrameResult> {
        let stack = self
            .stack
            .as_ref()
            .ok_or(DemodError::NotReady("no frame stack loaded"))?;
        let fft = Fft2D::new(stack.height(), stack.width())?;
        self.process_frame(stack, &fft, index)
    }

    /// Centred 2D spectrum of one normalised frame
    pub fn centred_spectrum(&self, index: usize) -> Result<Array2<Complex64>> {
        let stack = self
            .stack
            .as_ref()
            .ok_or(DemodError::NotReady("no frame stack loaded"))?;
        let fft = Fft2D::new(stack.height(), stack.width())?;
        Ok(fftshift(&fft.forward_real(&stack.normalized_frame(index)?)?))
    }

    fn process_frame(&self, stack: &FrameStack, fft: &Fft2D, index: usize) -> Result<FrameResult> {
        let image = stack.normalized_frame(index)?;
        let (carrier, wrapped) = wrapped_phase(&image, fft, &self.config)?;
        let unwrapped = unwrap_2d(&wrapped, self.config.max_recenter_iterations)?;

        log::debug!(
            "Frame {}: carrier ({}, {})",
            index,
            carrier.row,
            carrier.col
        );

        Ok(FrameResult {
            frame_index: index,
            carrier,
            wrapped,
            unwrapped,
        })
    }

    /// Demodulate every frame of the stack
    pub fn demodulate(&mut self) -> Result<()> {
        let count = self
            .stack
            .as_ref()
            .ok_or(DemodError::NotReady("no frame stack loaded"))?
            .num_frames();
        let selection: Vec<usize> = (0..count).collect();
        self.demodulate_frames(&selection)
    }

    /// Demodulate the given frames in order and difference consecutive ones
    pub fn demodulate_frames(&mut self, selection: &[usize]) -> Result<()> {
        let stack = self
            .stack
            .as_ref()
            .ok_or(DemodError::NotReady("no frame stack loaded"))?;
        let fft = Fft2D::new(stack.height(), stack.width())?;

        let mut results = Vec::with_capacity(selection.len());
        for (i, &index) in selection.iter().enumerate() {
            log::info!(
                "Demodulating frame {} ({}/{})",
                index,
                i + 1,
                selection.len()
            );
            results.push(self.process_frame(stack, &fft, index)?);
        }

        let differences = if results.len() >= 2 {
            let phases: Vec<Array2<f64>> = results.iter().map(|r| r.unwrapped.clone()).collect();
            Some(phase_differences(&phases)?)
        } else {
            log::warn!("Fewer than two frames demodulated, no phase differences available");
            None
        };

        self.frames = Some(results);
        self.differences = differences;
        Ok(())
    }

    pub fn frame_results(&self) -> Option<&[FrameResult]> {
        self.frames.as_deref()
    }

    /// Unwrapped phase of every demodulated frame
    pub fn phases(&self) -> Option<Vec<&Array2<f64>>> {
        self.frames
            .as_ref()
            .map(|frames| frames.iter().map(|f| &f.unwrapped).collect())
    }

    /// All consecutive-frame differences, `[height, width, pair]`
    pub fn phase_differences(&self) -> Option<&Array3<f64>> {
        self.differences.as_ref()
    }

    /// Differences subsampled by the configured pair stride
    pub fn calibration_differences(&self) -> Result<Array3<f64>> {
        let diffs = self
            .differences
            .as_ref()
            .ok_or(DemodError::NotReady("no phase differences, demodulate at least two frames"))?;
        Ok(subsample_pairs(diffs, self.config.pair_stride))
    }

    /// Fit each window against the configured stage angles
    pub fn calibrate(&self, windows: &[CalibrationWindow]) -> Result<CalibrationReport> {
        let diffs = self.calibration_differences()?;
        let central = central_offsets_deg(&diffs);
        let angles = self.config.stage_angles();

        let fits = windows
            .iter()
            .map(|&window| calibrate_window(&central, &angles, window))
            .collect::<Result<Vec<_>>>()?;

        self.report(CalibrationMethod::FlcWindows, &diffs, fits)
    }

    /// Fit `window` on differences taken relative to the first pair
    pub fn calibrate_against_reference(
        &self,
        window: CalibrationWindow,
    ) -> Result<CalibrationReport> {
        let diffs = self.calibration_differences()?;
        let offsets = reference_offsets(&diffs);
        let central = central_offsets_deg(&offsets);
        let angles: Vec<f64> = (0..central.len())
            .map(|i| i as f64 * self.config.stage_step_deg)
            .collect();

        let fit = calibrate_window(&central, &angles, window)?;
        self.report(CalibrationMethod::Reference, &diffs, vec![fit])
    }

    fn report(
        &self,
        method: CalibrationMethod,
        diffs: &Array3<f64>,
        fits: Vec<CalibrationFit>,
    ) -> Result<CalibrationReport> {
        let frames = self
            .frames
            .as_ref()
            .ok_or(DemodError::NotReady("no demodulated frames"))?;
        let (height, width, _) = diffs.dim();

        Ok(CalibrationReport {
            method,
            height,
            width,
            centre: centre_pixel((height, width)),
            frames: frames.iter().map(|f| f.frame_index).collect(),
            carriers: frames
                .iter()
                .map(|f| (f.carrier.row, f.carrier.col))
                .collect(),
            fits,
        })
    }

    /// Drop the stack and all results
    pub fn clear(&mut self) {
        self.stack = None;
        self.frames = None;
        self.differences = None;
    }

    pub fn has_stack(&self) -> bool {
        self.stack.is_some()
    }

    pub fn has_phases(&self) -> bool {
        self.frames.is_some()
    }
}
