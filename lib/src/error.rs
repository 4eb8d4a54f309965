//! Error type shared by every stage of the demodulation pipeline

/// Failures that abort a single pipeline run
#[derive(thiserror::Error, Debug)]
pub enum DemodError {
    #[error("no spectral peak above {threshold} of the centre-row magnitude range")]
    NoCarrierFound { threshold: f64 },

    #[error("calibration window [{start}, {end}) holds {points} usable point(s), need at least 2")]
    InsufficientCalibrationData {
        start: usize,
        end: usize,
        points: usize,
    },

    #[error("dimension mismatch: {0}")]
    DimensionMismatch(String),

    #[error("re-centring did not bring the centre phase {value} into (-pi, pi] within {iterations} iterations")]
    UnwrapDivergence { value: f64, iterations: usize },

    #[error("frame {index} has no positive finite maximum, cannot normalise")]
    DegenerateFrame { index: usize },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("{0}")]
    NotReady(&'static str),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[cfg(feature = "image")]
    #[error("failed to write image: {0}")]
    Image(#[from] ::image::ImageError),

    #[error("report JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl DemodError {
    pub(crate) fn mismatch(message: impl Into<String>) -> Self {
        DemodError::DimensionMismatch(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_carry_context() {
        let err = DemodError::InsufficientCalibrationData {
            start: 3,
            end: 4,
            points: 1,
        };
        assert_eq!(
            err.to_string(),
            "calibration window [3, 4) holds 1 usable point(s), need at least 2"
        );

        let err = DemodError::mismatch("expected 10 bytes, got 8");
        assert!(matches!(err, DemodError::DimensionMismatch(_)));
        assert!(err.to_string().contains("expected 10 bytes"));
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing.raw");
        let err: DemodError = io.into();
        assert!(matches!(err, DemodError::Io(_)));
    }
}
