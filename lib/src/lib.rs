//! Fringe Library
//!
//! A library for spatial carrier demodulation of interferometric fringe
//! images. Locates the fringe carrier in the 2D spectrum, band-passes it,
//! unwraps the recovered phase and fits FLC calibration offsets from
//! consecutive frame differences.

pub mod bandpass;
pub mod calibration;
pub mod carrier;
pub mod config;
pub mod error;
pub mod fft2d;
pub mod frame_io;
pub mod phase_map;
pub mod processor;
pub mod report;
pub mod unwrap;
pub mod utils;

pub use config::DemodConfig;
pub use error::DemodError;
pub use num_complex::Complex64;
pub use processor::DemodProcessor;
pub use rustfft; // Re-export rustfft for external use if needed

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the library
///
/// Sets up logging when the `env_logger` feature is enabled. Safe to call
/// more than once.
pub fn init() {
    #[cfg(all(not(target_arch = "wasm32"), feature = "env_logger"))]
    {
        let _ = env_logger::try_init();
    }
}

/// Result type for demodulation operations
pub type Result<T> = std::result::Result<T, DemodError>;
