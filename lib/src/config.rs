//! Pipeline configuration
//!
//! Every tunable of the demodulation pipeline lives in [`DemodConfig`] and is
//! passed explicitly to each stage. Defaults reproduce the lab settings used
//! for the FLC calibration runs.

use crate::error::DemodError;
use crate::Result;
use std::fmt;

/// How the band-passed carrier lobe is brought back to the image domain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Demodulation {
    /// Roll the carrier bin onto zero frequency before the inverse FFT
    #[default]
    Baseband,
    /// Keep the carrier phase ramp in the recovered phase
    CarrierRamp,
}

impl fmt::Display for Demodulation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl Demodulation {
    pub fn all() -> &'static [Demodulation] {
        &[Demodulation::Baseband, Demodulation::CarrierRamp]
    }

    pub fn name(&self) -> &'static str {
        match self {
            Demodulation::Baseband => "baseband",
            Demodulation::CarrierRamp => "carrier_ramp",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::all()
            .iter()
            .copied()
            .find(|mode| mode.name() == name.to_lowercase())
    }
}

/// Configuration threaded through carrier search, filtering, unwrapping and calibration
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DemodConfig {
    /// Radius of the circular bandpass mask in pixels
    pub mask_radius: f64,
    /// Relative peak threshold on the centre-row magnitude range (0..1)
    pub peak_threshold: f64,
    /// Minimum separation between detected peaks in samples
    pub min_peak_distance: usize,
    /// Upper bound on 2π steps applied while re-centring the unwrapped phase
    pub max_recenter_iterations: usize,
    pub demodulation: Demodulation,
    /// Rotary stage step between calibration positions, degrees
    pub stage_step_deg: f64,
    /// Number of stage positions recorded in a calibration sweep
    pub stage_positions: usize,
    /// Stride applied to consecutive frame pairs before calibration
    pub pair_stride: usize,
}

impl Default for DemodConfig {
    fn default() -> Self {
        Self {
            mask_radius: 20.0,
            peak_threshold: 0.1,
            min_peak_distance: 1,
            max_recenter_iterations: 100,
            demodulation: Demodulation::Baseband,
            stage_step_deg: 10.0,
            stage_positions: 18,
            pair_stride: 2,
        }
    }
}

impl DemodConfig {
    /// Create a configuration with validation, calibration settings left at default
    pub fn new(
        mask_radius: f64,
        peak_threshold: f64,
        min_peak_distance: usize,
        demodulation: Demodulation,
    ) -> Result<Self> {
        let config = Self {
            mask_radius,
            peak_threshold,
            min_peak_distance,
            demodulation,
            ..Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Check every field, used after piecemeal edits from the CLI
    pub fn validate(&self) -> Result<()> {
        if !(self.mask_radius.is_finite() && self.mask_radius > 0.0) {
            return Err(DemodError::InvalidConfig(format!(
                "mask radius must be positive, got {}",
                self.mask_radius
            )));
        }
        if !(0.0..1.0).contains(&self.peak_threshold) {
            return Err(DemodError::InvalidConfig(format!(
                "peak threshold must be in [0, 1), got {}",
                self.peak_threshold
            )));
        }
        if self.min_peak_distance < 1 {
            return Err(DemodError::InvalidConfig(
                "minimum peak distance must be at least 1".to_string(),
            ));
        }
        if self.max_recenter_iterations == 0 {
            return Err(DemodError::InvalidConfig(
                "re-centring needs at least one iteration".to_string(),
            ));
        }
        if !(self.stage_step_deg.is_finite() && self.stage_step_deg > 0.0) {
            return Err(DemodError::InvalidConfig(format!(
                "stage step must be positive, got {}",
                self.stage_step_deg
            )));
        }
        if self.pair_stride == 0 {
            return Err(DemodError::InvalidConfig(
                "pair stride must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Stage angles in degrees for the configured sweep
    pub fn stage_angles(&self) -> Vec<f64> {
        (0..self.stage_positions)
            .map(|i| i as f64 * self.stage_step_deg)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DemodConfig::default();
        assert_eq!(config.mask_radius, 20.0);
        assert_eq!(config.peak_threshold, 0.1);
        assert_eq!(config.min_peak_distance, 1);
        assert_eq!(config.max_recenter_iterations, 100);
        assert_eq!(config.demodulation, Demodulation::Baseband);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        assert!(DemodConfig::new(12.0, 0.2, 3, Demodulation::CarrierRamp).is_ok());

        assert!(DemodConfig::new(0.0, 0.1, 1, Demodulation::Baseband).is_err());
        assert!(DemodConfig::new(f64::NAN, 0.1, 1, Demodulation::Baseband).is_err());
        assert!(DemodConfig::new(20.0, 1.5, 1, Demodulation::Baseband).is_err());
        assert!(DemodConfig::new(20.0, 0.1, 0, Demodulation::Baseband).is_err());

        let config = DemodConfig {
            pair_stride: 0,
            ..DemodConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(DemodError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_stage_angles() {
        let angles = DemodConfig::default().stage_angles();
        assert_eq!(angles.len(), 18);
        assert_eq!(angles[0], 0.0);
        assert_eq!(angles[17], 170.0);
    }

    #[test]
    fn test_demodulation_names() {
        for &mode in Demodulation::all() {
            assert_eq!(Demodulation::parse(mode.name()), Some(mode));
        }
        assert_eq!(Demodulation::parse("Baseband"), Some(Demodulation::Baseband));
        assert_eq!(Demodulation::parse("hilbert"), None);
    }
}
