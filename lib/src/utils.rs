//! Utility functions for loading, checking and formatting
//!
//! Provides helper functions for file I/O, layout validation and formatting
//! that are used by client applications.

use crate::carrier::CarrierPeak;
use crate::config::DemodConfig;
use crate::error::DemodError;
use crate::frame_io::RawLayout;
#[cfg(not(target_arch = "wasm32"))]
use crate::frame_io::FrameStack;
use crate::processor::DemodProcessor;
use crate::Result;

/// Load raw frames into a DemodProcessor and demodulate all of them
///
/// A single path is read as a stack of `layout.frames` frames; several paths
/// are read as one frame each.
#[cfg(not(target_arch = "wasm32"))]
pub fn load_and_demodulate<P: AsRef<std::path::Path>>(
    processor: &mut DemodProcessor,
    paths: &[P],
    layout: &RawLayout,
) -> Result<()> {
    validate_layout(layout, processor.config())?;

    let stack = match paths {
        [] => return Err(DemodError::mismatch("no raw files given")),
        [path] => FrameStack::read_raw(path, layout)?,
        paths => FrameStack::read_raw_frames(paths, layout)?,
    };
    processor.load_stack(stack);
    processor.demodulate()?;

    log::info!(
        "Demodulation complete: {} phase map(s), {} difference pair(s)",
        processor.frame_results().map_or(0, |f| f.len()),
        processor.phase_differences().map_or(0, |d| d.dim().2)
    );
    Ok(())
}

/// Summarise the loaded stack, configuration and demodulation results
pub fn analysis_summary(processor: &DemodProcessor) -> String {
    let mut summary = String::new();

    if let Some(stack) = processor.stack() {
        summary.push_str(&format!(
            "Stack: {}x{} pixels, {} frame(s)\n",
            stack.height(),
            stack.width(),
            stack.num_frames()
        ));
    }

    let config = processor.config();
    summary.push_str("Demodulation Config:\n");
    summary.push_str(&format!("  Mask radius: {} px\n", config.mask_radius));
    summary.push_str(&format!("  Peak threshold: {}\n", config.peak_threshold));
    summary.push_str(&format!("  Min peak distance: {}\n", config.min_peak_distance));
    summary.push_str(&format!("  Mode: {}\n", config.demodulation));
    summary.push_str(&format!(
        "  Max re-centre steps: {}\n",
        config.max_recenter_iterations
    ));

    if let Some(frames) = processor.frame_results() {
        summary.push_str(&format!("  Demodulated frames: {}\n", frames.len()));
        if let (Some(first), Some(stack)) = (frames.first(), processor.stack()) {
            summary.push_str(&format!(
                "  Carrier (frame {}): {}\n",
                first.frame_index,
                format_carrier(&first.carrier, (stack.height(), stack.width()))
            ));
        }
    }

    if let Some(diffs) = processor.phase_differences() {
        summary.push_str(&format!("  Difference pairs: {}\n", diffs.dim().2));
    }

    summary
}

/// Check a raw layout against the configuration before reading gigabytes
pub fn validate_layout(layout: &RawLayout, config: &DemodConfig) -> Result<()> {
    if layout.height == 0 || layout.width == 0 || layout.frames == 0 {
        return Err(DemodError::mismatch(format!(
            "layout {}x{}x{} has an empty dimension",
            layout.height, layout.width, layout.frames
        )));
    }
    config.validate()?;
    let pixels = layout.pixels_per_frame()?;
    let expected = layout.expected_bytes()?;

    log::info!("Layout validation:");
    log::info!(
        "  Frame size: {}x{} ({} {} samples)",
        layout.height,
        layout.width,
        pixels,
        layout.sample_format
    );
    log::info!("  Frames: {} ({})", layout.frames, layout.frame_order.name());
    log::info!("  Expected size: {}", format_bytes(expected));

    let max_cycles = (layout.width / 2) as f64;
    if config.mask_radius * 2.0 >= max_cycles {
        log::warn!(
            "Mask radius {} is large for {} columns, the carrier lobe will overlap DC",
            config.mask_radius,
            layout.width
        );
    }

    let pairs = layout.frames.saturating_sub(1).div_ceil(config.pair_stride);
    if layout.frames > 1 && pairs < config.stage_positions {
        log::warn!(
            "{} frame(s) give {} calibration pair(s), fewer than {} stage positions",
            layout.frames,
            pairs,
            config.stage_positions
        );
    }

    Ok(())
}

/// Format a phase in radians together with degrees
pub fn format_phase(radians: f64) -> String {
    format!("{:.4} rad ({:.2}°)", radians, radians.to_degrees())
}

/// Format a carrier as its bin and its spatial frequency in cycles per frame
pub fn format_carrier(carrier: &CarrierPeak, shape: (usize, usize)) -> String {
    let (fy, fx) = carrier.frequency(shape);
    format!(
        "({}, {}) = {} cycle(s) across, {} down",
        carrier.row, carrier.col, fx, fy
    )
}

/// Format a byte count for display
pub fn format_bytes(bytes: usize) -> String {
    const KIB: f64 = 1024.0;
    let b = bytes as f64;
    if b >= KIB * KIB * KIB {
        format!("{:.2} GiB", b / (KIB * KIB * KIB))
    } else if b >= KIB * KIB {
        format!("{:.2} MiB", b / (KIB * KIB))
    } else if b >= KIB {
        format!("{:.2} KiB", b / KIB)
    } else {
        format!("{} B", bytes)
    }
}

/// Parse `start..end` or `start,end` into a half-open pair range
pub fn parse_range(text: &str) -> Option<(usize, usize)> {
    let (start, end) = text.split_once("..").or_else(|| text.split_once(','))?;
    let start = start.trim().parse().ok()?;
    let end = end.trim().parse().ok()?;
    (start < end).then_some((start, end))
}

/// Camera layouts and matching configurations used in the lab
pub mod presets {
    use super::*;
    use crate::config::Demodulation;
    use crate::frame_io::{FrameOrder, SampleFormat};

    /// Preset information structure
    pub struct PresetInfo {
        pub id: usize,
        pub name: &'static str,
        pub description: &'static str,
        pub layout: RawLayout,
        pub config: DemodConfig,
    }

    /// Full FLC calibration sweep: 18 stage positions, two FLC states each
    pub fn flc_sweep() -> (RawLayout, DemodConfig) {
        (
            RawLayout::new(1280, 1080, 37, SampleFormat::U16Le).with_order(FrameOrder::Interleaved),
            DemodConfig::default(),
        )
    }

    /// Single RAW grab from the acquisition script
    pub fn single_grab() -> (RawLayout, DemodConfig) {
        (
            RawLayout::new(1200, 1920, 1, SampleFormat::U8),
            DemodConfig::default(),
        )
    }

    /// FLC sweep keeping the carrier ramp, which needs many 2pi steps to re-centre
    pub fn carrier_ramp_sweep() -> (RawLayout, DemodConfig) {
        let (layout, config) = flc_sweep();
        (
            layout,
            DemodConfig {
                demodulation: Demodulation::CarrierRamp,
                max_recenter_iterations: 5000,
                ..config
            },
        )
    }

    /// List all presets with detailed info
    pub fn list_presets() -> Vec<PresetInfo> {
        let (layout, config) = flc_sweep();
        let (grab_layout, grab_config) = single_grab();
        let (ramp_layout, ramp_config) = carrier_ramp_sweep();
        vec![
            PresetInfo {
                id: 0,
                name: "FLC Sweep",
                description: "1280x1080, 37 frames, u16le interleaved, baseband",
                layout,
                config,
            },
            PresetInfo {
                id: 1,
                name: "Single Grab",
                description: "1200x1920, 1 frame, u8",
                layout: grab_layout,
                config: grab_config,
            },
            PresetInfo {
                id: 2,
                name: "Carrier Ramp Sweep",
                description: "FLC Sweep layout, carrier ramp kept in the phase",
                layout: ramp_layout,
                config: ramp_config,
            },
        ]
    }

    /// Get a preset by ID
    pub fn get_preset(id: usize) -> Option<PresetInfo> {
        list_presets().into_iter().find(|p| p.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame_io::SampleFormat;

    #[test]
    fn test_phase_formatting() {
        assert_eq!(format_phase(0.0), "0.0000 rad (0.00°)");
        assert_eq!(
            format_phase(std::f64::consts::FRAC_PI_4),
            "0.7854 rad (45.00°)"
        );
    }

    #[test]
    fn test_byte_formatting() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.00 KiB");
        assert_eq!(format_bytes(1280 * 1080 * 37 * 2), "97.56 MiB");
    }

    #[test]
    fn test_carrier_formatting() {
        let carrier = CarrierPeak { row: 16, col: 96 };
        assert_eq!(
            format_carrier(&carrier, (32, 128)),
            "(16, 96) = 32 cycle(s) across, 0 down"
        );
    }

    #[test]
    fn test_parse_range() {
        assert_eq!(parse_range("0..7"), Some((0, 7)));
        assert_eq!(parse_range("8, 13"), Some((8, 13)));
        assert_eq!(parse_range("5..5"), None);
        assert_eq!(parse_range("a..3"), None);
        assert_eq!(parse_range("7"), None);
    }

    #[test]
    fn test_validate_layout() {
        let config = DemodConfig::default();
        assert!(validate_layout(&RawLayout::new(64, 128, 3, SampleFormat::U8), &config).is_ok());
        assert!(matches!(
            validate_layout(&RawLayout::new(0, 128, 3, SampleFormat::U8), &config),
            Err(DemodError::DimensionMismatch(_))
        ));
        assert!(matches!(
            validate_layout(&RawLayout::new(1usize << 62, 8, 1, SampleFormat::U16Le), &config),
            Err(DemodError::DimensionMismatch(_))
        ));
    }

    #[test]
    fn test_presets() {
        let presets = presets::list_presets();
        assert_eq!(presets.len(), 3);
        for preset in &presets {
            assert!(preset.config.validate().is_ok(), "{}", preset.name);
            assert!(validate_layout(&preset.layout, &preset.config).is_ok());
        }

        let sweep = presets::get_preset(0).unwrap();
        assert_eq!(sweep.layout.frames, 37);
        assert_eq!(sweep.layout.expected_bytes().unwrap(), 1280 * 1080 * 37 * 2);
        assert!(presets::get_preset(9).is_none());
    }

    #[test]
    fn test_load_and_demodulate_files() {
        use std::f64::consts::PI;

        let (h, w) = (16, 64);
        let dir = std::env::temp_dir();
        let paths: Vec<_> = (0..2)
            .map(|k| dir.join(format!("fringe_utils_{}_{}.raw", std::process::id(), k)))
            .collect();
        for (k, path) in paths.iter().enumerate() {
            let bytes: Vec<u8> = (0..h * w)
                .map(|i| {
                    let c = (i % w) as f64;
                    let phase = 2.0 * PI * 16.0 * c / w as f64 + 0.5 * k as f64;
                    (127.5 + 120.0 * phase.cos()).round() as u8
                })
                .collect();
            std::fs::write(path, bytes).unwrap();
        }

        let mut processor = DemodProcessor::new();
        let config = DemodConfig {
            mask_radius: 8.0,
            ..DemodConfig::default()
        };
        processor.set_config(config).unwrap();
        let layout = RawLayout::new(h, w, 1, SampleFormat::U8);
        load_and_demodulate(&mut processor, &paths, &layout).unwrap();

        let diffs = processor.phase_differences().unwrap();
        assert_eq!(diffs.dim(), (h, w, 1));
        let summary = analysis_summary(&processor);
        println!("{}", summary);
        assert!(summary.contains("Stack: 16x64 pixels, 2 frame(s)"));
        assert!(summary.contains("Difference pairs: 1"));
        // 8-bit quantisation limits the accuracy
        assert!((diffs[[8, 32, 0]] - 0.5).abs() < 0.05);

        for path in &paths {
            std::fs::remove_file(path).ok();
        }
        let empty: [&str; 0] = [];
        assert!(load_and_demodulate(&mut processor, &empty, &layout).is_err());

        // an overflowing layout fails before any file is touched
        let huge = RawLayout::new(1usize << 62, 8, 1, SampleFormat::U16Le);
        assert!(matches!(
            load_and_demodulate(&mut processor, &["does_not_exist.raw"], &huge),
            Err(DemodError::DimensionMismatch(_))
        ));
    }
}
