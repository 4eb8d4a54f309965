//! Fringe Demodulator CLI
//!
//! Command-line interface for the fringe demodulation library.
//! Provides an interactive shell for loading raw frame stacks, demodulating
//! them and fitting FLC calibration offsets.

use std::process;

use clap::{Arg, ArgAction, Command};
use fringe_lib::{
    calibration::{central_offsets_deg, CalibrationWindow},
    config::Demodulation,
    frame_io::{FrameOrder, RawLayout, SampleFormat},
    processor::DemodProcessor,
    report::CalibrationReport,
    utils::{self, presets},
    DemodConfig,
};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

#[cfg(feature = "image")]
use fringe_lib::phase_map::image::{save_log_spectrum, save_phase_map, ColorMap};
#[cfg(feature = "image")]
use ndarray::Axis;

/// Application state
struct AppState {
    processor: DemodProcessor,
    layout: RawLayout,
    current_files: Vec<String>,
    last_report: Option<CalibrationReport>,
}

impl AppState {
    fn new() -> Self {
        let (layout, config) = presets::flc_sweep();
        Self {
            processor: DemodProcessor::with_config(config),
            layout,
            current_files: Vec::new(),
            last_report: None,
        }
    }

    fn load(&mut self, files: &[&str]) {
        println!("Loading {} file(s) as {}", files.len(), describe_layout(&self.layout));

        match utils::load_and_demodulate(&mut self.processor, files, &self.layout) {
            Ok(_) => {
                self.current_files = files.iter().map(|f| f.to_string()).collect();
                self.last_report = None;
                println!("Stack loaded and demodulated!");
                println!("{}", utils::analysis_summary(&self.processor));
            }
            Err(e) => println!("Error loading stack: {}", e),
        }
    }
}

fn describe_layout(layout: &RawLayout) -> String {
    format!(
        "{}x{} x {} frame(s), {}, {}",
        layout.height,
        layout.width,
        layout.frames,
        layout.sample_format,
        layout.frame_order.name()
    )
}

/// Print the help message showing available commands
fn print_help() {
    println!("Available commands:");
    println!("  load <file> [file...]              - Load a raw stack (or one raw file per frame) and demodulate");
    println!("  config                             - Show current layout and demodulation configuration");
    println!("  set height|width|frames <n>        - Set the raw layout shape");
    println!("  set format <fmt>                   - Set sample format (u8, u16le, u16be, f32le, f64le)");
    println!("  set order <order>                  - Set frame order (planar, interleaved)");
    println!("  set radius <px>                    - Set bandpass mask radius");
    println!("  set threshold <0..1>               - Set relative carrier peak threshold");
    println!("  set distance <n>                   - Set minimum peak distance");
    println!("  set mode <mode>                    - Set demodulation mode (baseband, carrier_ramp)");
    println!("  set iterations <n>                 - Set maximum re-centring steps");
    println!("  set stride <n>                     - Set pair stride used for calibration");
    println!("  set step <deg>                     - Set rotary stage step");
    println!("  set positions <n>                  - Set number of stage positions");
    println!("  preset <n>                         - Load a layout/configuration preset");
    println!("  presets                            - List available presets");
    println!("  demodulate [start..end | i j ...]  - Demodulate all or selected frames again");
    println!("  diff                               - Show central phase difference of every pair");
    println!("  calibrate [start..end flip]        - Fit FLC windows (default: the three standard windows)");
    println!("  reference [start..end]             - Fit against the first pair (default 0..7)");
    #[cfg(feature = "image")]
    {
        println!("  phase_map <file.png> <wrapped|unwrapped|diff> <n> [colormap]");
        println!("                                     - Save a phase map (viridis, grayscale, jet, twilight)");
        println!("  spectrum <file.png> <frame> [colormap] - Save log10 |F| of a frame");
    }
    println!("  report <file.json>                 - Save the last calibration report");
    println!("  status                             - Show current status");
    println!("  help                               - Show this help message");
    println!("  quit/exit                          - Exit the program");
    println!();
    println!("Example workflow:");
    println!("  preset 0");
    println!("  load sam_8.dat");
    println!("  diff");
    println!("  calibrate");
    println!("  report calibration.json");
}

fn apply_config(state: &mut AppState, config: DemodConfig) {
    match state.processor.set_config(config) {
        Ok(_) => {
            state.last_report = None;
            println!("Configuration updated, run 'demodulate' to refresh results");
        }
        Err(e) => println!("Error: {}", e),
    }
}

fn set_parameter(state: &mut AppState, param: &str, value: &str) {
    let mut config = *state.processor.config();

    match param {
        "height" | "width" | "frames" => match value.parse::<usize>() {
            Ok(n) if n > 0 => {
                match param {
                    "height" => state.layout.height = n,
                    "width" => state.layout.width = n,
                    _ => state.layout.frames = n,
                }
                println!("Layout: {}", describe_layout(&state.layout));
            }
            _ => println!("Invalid {}: {}", param, value),
        },
        "format" => match SampleFormat::parse(value) {
            Some(format) => {
                state.layout.sample_format = format;
                println!("Layout: {}", describe_layout(&state.layout));
            }
            None => println!("Unknown sample format: {}", value),
        },
        "order" => match FrameOrder::parse(value) {
            Some(order) => {
                state.layout.frame_order = order;
                println!("Layout: {}", describe_layout(&state.layout));
            }
            None => println!("Unknown frame order: {}", value),
        },
        "radius" | "threshold" | "step" => match value.parse::<f64>() {
            Ok(v) => {
                match param {
                    "radius" => config.mask_radius = v,
                    "threshold" => config.peak_threshold = v,
                    _ => config.stage_step_deg = v,
                }
                apply_config(state, config);
            }
            Err(_) => println!("Invalid {}: {}", param, value),
        },
        "distance" | "iterations" | "stride" | "positions" => match value.parse::<usize>() {
            Ok(v) => {
                match param {
                    "distance" => config.min_peak_distance = v,
                    "iterations" => config.max_recenter_iterations = v,
                    "stride" => config.pair_stride = v,
                    _ => config.stage_positions = v,
                }
                apply_config(state, config);
            }
            Err(_) => println!("Invalid {}: {}", param, value),
        },
        "mode" => match Demodulation::parse(value) {
            Some(mode) => {
                config.demodulation = mode;
                apply_config(state, config);
            }
            None => println!("Unknown demodulation mode: {}", value),
        },
        _ => {
            println!("Unknown parameter: {}", param);
            println!("Valid parameters: height, width, frames, format, order, radius, threshold, distance, mode, iterations, stride, step, positions");
        }
    }
}

/// Frame indices from `start..end` or a list of indices
fn parse_selection(args: &[&str]) -> Option<Vec<usize>> {
    if let [single] = args {
        if let Some((start, end)) = utils::parse_range(single) {
            return Some((start..end).collect());
        }
    }
    args.iter().map(|a| a.parse().ok()).collect()
}

/// Process a user command
fn process_command(command: &str, state: &mut AppState) {
    let parts: Vec<&str> = command.split_whitespace().collect();

    if parts.is_empty() {
        return;
    }

    match parts[0] {
        "load" => {
            if parts.len() < 2 {
                println!("Usage: load <file> [file...]");
                return;
            }
            state.load(&parts[1..]);
        }

        "config" => {
            let config = state.processor.config();
            println!("Raw layout: {}", describe_layout(&state.layout));
            println!("Current Demodulation Configuration:");
            println!("  Mask radius: {} px", config.mask_radius);
            println!("  Peak threshold: {}", config.peak_threshold);
            println!("  Min peak distance: {}", config.min_peak_distance);
            println!("  Mode: {}", config.demodulation);
            println!("  Max re-centre steps: {}", config.max_recenter_iterations);
            println!("  Pair stride: {}", config.pair_stride);
            println!(
                "  Stage: {} positions, {}° step",
                config.stage_positions, config.stage_step_deg
            );
        }

        "set" => {
            if parts.len() < 3 {
                println!("Usage: set <parameter> <value>");
                return;
            }
            set_parameter(state, parts[1], parts[2]);
        }

        "preset" => {
            if parts.len() != 2 {
                println!("Usage: preset <number>");
                return;
            }

            match parts[1].parse::<usize>() {
                Ok(n) => {
                    if let Some(preset) = presets::get_preset(n) {
                        state.layout = preset.layout;
                        apply_config(state, preset.config);
                        println!("Applied preset {}: {}", n, preset.name);
                        println!("{}", preset.description);
                    } else {
                        println!("Invalid preset number: {}", n);
                    }
                }
                Err(_) => println!("Invalid preset number: {}", parts[1]),
            }
        }

        "presets" => {
            println!("Available presets:");
            for preset in presets::list_presets() {
                println!("  {}: {} - {}", preset.id, preset.name, preset.description);
            }
        }

        "demodulate" => {
            if !state.processor.has_stack() {
                println!("No stack loaded. Load a file first.");
                return;
            }

            let result = if parts.len() == 1 {
                state.processor.demodulate()
            } else {
                match parse_selection(&parts[1..]) {
                    Some(selection) => state.processor.demodulate_frames(&selection),
                    None => {
                        println!("Usage: demodulate [start..end | i j ...]");
                        return;
                    }
                }
            };

            state.last_report = None;
            match result {
                Ok(_) => {
                    println!("Demodulation complete!");
                    println!("{}", utils::analysis_summary(&state.processor));
                }
                Err(e) => println!("Error during demodulation: {}", e),
            }
        }

        "diff" => match state.processor.phase_differences() {
            Some(diffs) => {
                let central = central_offsets_deg(diffs);
                println!("Central phase difference per pair:");
                for (n, deg) in central.iter().enumerate() {
                    println!("  {:>3}: {}", n, utils::format_phase(deg.to_radians()));
                }
            }
            None => println!("No phase differences. Demodulate at least two frames first."),
        },

        "calibrate" => {
            let windows = match parts.len() {
                1 => CalibrationWindow::flc_defaults().to_vec(),
                3 => match (utils::parse_range(parts[1]), parts[2].parse::<f64>()) {
                    (Some((start, end)), Ok(flip)) => vec![CalibrationWindow::new(start, end, flip)],
                    _ => {
                        println!("Usage: calibrate [start..end flip]");
                        return;
                    }
                },
                _ => {
                    println!("Usage: calibrate [start..end flip]");
                    return;
                }
            };

            match state.processor.calibrate(&windows) {
                Ok(report) => {
                    print!("{}", report.summary());
                    state.last_report = Some(report);
                }
                Err(e) => println!("Calibration failed: {}", e),
            }
        }

        "reference" => {
            let (start, end) = match parts.get(1) {
                None => (0, 7),
                Some(arg) => match utils::parse_range(arg) {
                    Some(range) => range,
                    None => {
                        println!("Usage: reference [start..end]");
                        return;
                    }
                },
            };

            match state
                .processor
                .calibrate_against_reference(CalibrationWindow::new(start, end, 0.0))
            {
                Ok(report) => {
                    print!("{}", report.summary());
                    state.last_report = Some(report);
                }
                Err(e) => println!("Calibration failed: {}", e),
            }
        }

        #[cfg(feature = "image")]
        "phase_map" => {
            if parts.len() < 4 {
                println!("Usage: phase_map <file.png> <wrapped|unwrapped|diff> <n> [colormap]");
                return;
            }

            let filename = parts[1];
            let Ok(index) = parts[3].parse::<usize>() else {
                println!("Invalid index: {}", parts[3]);
                return;
            };
            let default_map = if parts[2] == "wrapped" {
                ColorMap::Twilight
            } else {
                ColorMap::Viridis
            };
            let colormap = match parts.get(4) {
                None => default_map,
                Some(name) => match ColorMap::parse(name) {
                    Some(map) => map,
                    None => {
                        println!("Unknown colormap: {}", name);
                        return;
                    }
                },
            };

            let frame = state
                .processor
                .frame_results()
                .and_then(|frames| frames.iter().find(|f| f.frame_index == index));

            let result = match parts[2] {
                "wrapped" => frame.map(|f| {
                    save_phase_map(
                        filename,
                        &f.wrapped,
                        Some((-std::f64::consts::PI, std::f64::consts::PI)),
                        colormap,
                    )
                }),
                "unwrapped" => frame.map(|f| save_phase_map(filename, &f.unwrapped, None, colormap)),
                "diff" => state
                    .processor
                    .phase_differences()
                    .filter(|d| index < d.dim().2)
                    .map(|d| save_phase_map(filename, &d.index_axis(Axis(2), index).to_owned(), None, colormap)),
                other => {
                    println!("Unknown phase kind: {}", other);
                    return;
                }
            };

            match result {
                Some(Ok(_)) => println!("Phase map saved to {}", filename),
                Some(Err(e)) => println!("Error saving phase map: {}", e),
                None => println!("No {} phase for index {}", parts[2], index),
            }
        }

        #[cfg(feature = "image")]
        "spectrum" => {
            if parts.len() < 3 {
                println!("Usage: spectrum <file.png> <frame> [colormap]");
                return;
            }

            let filename = parts[1];
            let Ok(index) = parts[2].parse::<usize>() else {
                println!("Invalid frame: {}", parts[2]);
                return;
            };
            let colormap = parts
                .get(3)
                .and_then(|name| ColorMap::parse(name))
                .unwrap_or_default();

            match state
                .processor
                .centred_spectrum(index)
                .and_then(|spectrum| save_log_spectrum(filename, &spectrum, colormap))
            {
                Ok(_) => println!("Spectrum saved to {}", filename),
                Err(e) => println!("Error saving spectrum: {}", e),
            }
        }

        "report" => {
            if parts.len() != 2 {
                println!("Usage: report <file.json>");
                return;
            }

            match &state.last_report {
                Some(report) => match report.save_json(parts[1]) {
                    Ok(_) => println!("Report saved to {}", parts[1]),
                    Err(e) => println!("Error saving report: {}", e),
                },
                None => println!("No calibration report yet. Run 'calibrate' or 'reference' first."),
            }
        }

        "status" => {
            println!("Status:");
            println!(
                "  Stack loaded: {}",
                if state.processor.has_stack() { "Yes" } else { "No" }
            );
            println!(
                "  Demodulated: {}",
                if state.processor.has_phases() { "Yes" } else { "No" }
            );
            println!(
                "  Calibration report: {}",
                if state.last_report.is_some() { "Yes" } else { "No" }
            );

            if !state.current_files.is_empty() {
                println!("  Current file(s): {}", state.current_files.join(", "));
            }
            println!("  Layout: {}", describe_layout(&state.layout));
        }

        "help" => print_help(),

        "quit" | "exit" => {
            println!("Goodbye!");
            process::exit(0);
        }

        _ => {
            println!("Unknown command: '{}'", parts[0]);
            println!("Type 'help' for available commands");
        }
    }
}

fn main() {
    // Parse command line arguments
    let matches = Command::new("Fringe Demodulator")
        .version(fringe_lib::VERSION)
        .about("Fringe carrier demodulation and FLC calibration tool")
        .arg(
            Arg::new("file")
                .help("Raw stack (or one raw file per frame) to load on startup")
                .value_name("FILE")
                .action(ArgAction::Append)
                .num_args(1..)
                .index(1),
        )
        .arg(
            Arg::new("preset")
                .long("preset")
                .short('p')
                .help("Start from a layout/configuration preset")
                .value_name("N"),
        )
        .arg(
            Arg::new("height")
                .long("height")
                .help("Frame height in pixels")
                .value_name("ROWS"),
        )
        .arg(
            Arg::new("width")
                .long("width")
                .help("Frame width in pixels")
                .value_name("COLS"),
        )
        .arg(
            Arg::new("frames")
                .long("frames")
                .short('n')
                .help("Number of frames in the stack")
                .value_name("N"),
        )
        .arg(
            Arg::new("format")
                .long("format")
                .short('f')
                .help("Sample format (u8, u16le, u16be, f32le, f64le)")
                .value_name("FMT"),
        )
        .arg(
            Arg::new("order")
                .long("order")
                .help("Frame order (planar, interleaved)")
                .value_name("ORDER"),
        )
        .arg(
            Arg::new("radius")
                .long("radius")
                .short('r')
                .help("Bandpass mask radius in pixels")
                .value_name("PX"),
        )
        .arg(
            Arg::new("threshold")
                .long("threshold")
                .short('t')
                .help("Relative carrier peak threshold (0-1)")
                .value_name("T"),
        )
        .get_matches();

    println!("Fringe Demodulator v{}", fringe_lib::VERSION);
    println!("Type 'help' for available commands\n");

    // Initialize the library
    fringe_lib::init();

    let mut state = AppState::new();

    if let Some(preset) = matches.get_one::<String>("preset") {
        process_command(&format!("preset {}", preset), &mut state);
    }

    // Apply command line configuration on top of the preset
    for param in ["height", "width", "frames", "format", "order", "radius", "threshold"] {
        if let Some(value) = matches.get_one::<String>(param) {
            set_parameter(&mut state, param, value);
        }
    }

    // Load files from command line if provided
    if let Some(files) = matches.get_many::<String>("file") {
        let files: Vec<&str> = files.map(|f| f.as_str()).collect();
        state.load(&files);
    }

    // Setup readline
    let mut rl = match DefaultEditor::new() {
        Ok(rl) => rl,
        Err(e) => {
            eprintln!("Failed to create readline: {}", e);
            process::exit(1);
        }
    };

    // Main command loop
    loop {
        let readline = rl.readline("fringe> ");
        match readline {
            Ok(line) => {
                let trimmed = line.trim();
                if !trimmed.is_empty() {
                    rl.add_history_entry(trimmed).ok();
                    process_command(trimmed, &mut state);
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                continue;
            }
            Err(ReadlineError::Eof) => {
                println!("^D");
                break;
            }
            Err(err) => {
                println!("Error: {:?}", err);
                break;
            }
        }
    }

    println!("Goodbye!");
}
