// ============================================================================
// InkScan CLI — headless tracing of scanned drawings
// ============================================================================
//
// Usage examples:
//   inkscan -i page.jpg -o page_ink.png
//   inkscan -i scans/*.jpg --output-dir traced/ --red --threshold 180
//   inkscan -i "frames/*.png" --output-dir out/ --parallel --no-crop
//
// Sequential mode loads every input as a key frame and runs the batch
// orchestrator on one frame at a time, writing each result before the next
// frame starts.  --parallel traces each file independently on the rayon
// pool instead.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;
use rayon::prelude::*;

use crate::batch::{
    FrameStore, NullProgress, ProgressSink, RectSelection, TraceScope, trace_scanned_drawings,
};
use crate::io::{load_frame, output_path_in};
use crate::logger;
use crate::project::{KeyFrameStore, TimedContent};
use crate::settings::TraceSettings;

// ============================================================================
// CLI argument definition (clap Derive)
// ============================================================================

/// InkScan headless line-art tracer.
///
/// Turns scans of pencil drawings on white paper into transparent PNGs with
/// single-pixel ink lines.
#[derive(Parser, Debug)]
#[command(
    name = "inkscan",
    about = "Trace scanned drawings into transparent line art",
    long_about = "Remove the paper from scanned drawings, thin the ink to one-pixel lines\n\
                  and drop colored construction lines.  Output is always PNG.\n\n\
                  Example:\n  \
                  inkscan -i page.jpg -o page_ink.png\n  \
                  inkscan -i scans/*.jpg --output-dir traced/ --red --blue"
)]
pub struct CliArgs {
    /// Input file(s). Glob patterns accepted (e.g. "*.png", "scans/*.jpg").
    #[arg(short, long, required = true, num_args = 1..)]
    pub input: Vec<String>,

    /// Output file path. Only valid for single-file input.
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Output directory for batch processing (files keep their stem, extension .png).
    #[arg(long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Gray level (0-255) at or above which a pixel counts as paper.
    #[arg(short, long, value_name = "0-255")]
    pub threshold: Option<i32>,

    /// Enclosed holes smaller than this many pixels are filled.
    #[arg(long, value_name = "PIXELS")]
    pub spot_area: Option<i32>,

    /// Treat red lines as construction lines and remove them.
    #[arg(long)]
    pub red: bool,

    /// Treat green lines as construction lines and remove them.
    #[arg(long)]
    pub green: bool,

    /// Treat blue lines as construction lines and remove them.
    #[arg(long)]
    pub blue: bool,

    /// Keep the full page size instead of cropping to the ink.
    #[arg(long)]
    pub no_crop: bool,

    /// Settings file to use instead of the per-user one.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Store the effective settings as the new defaults.
    #[arg(long)]
    pub save_settings: bool,

    /// Trace files independently on all cores.
    #[arg(long)]
    pub parallel: bool,

    /// Write the session log here instead of the data directory.
    #[arg(long, value_name = "FILE")]
    pub log_file: Option<PathBuf>,

    /// Print per-file timing information.
    #[arg(short, long)]
    pub verbose: bool,
}

impl CliArgs {
    /// Settings file values with command-line overrides applied.
    pub fn effective_settings(&self) -> TraceSettings {
        let mut settings = match &self.config {
            Some(path) => TraceSettings::load_from(path),
            None => TraceSettings::load(),
        };
        if let Some(t) = self.threshold {
            settings.threshold = t;
        }
        if let Some(s) = self.spot_area {
            settings.spot_area = s;
        }
        settings.red |= self.red;
        settings.green |= self.green;
        settings.blue |= self.blue;
        if self.no_crop {
            settings.auto_crop = false;
        }
        settings.clamped()
    }
}

// ============================================================================
// Public entry point
// ============================================================================

/// Run all CLI processing and return an OS exit code.
/// `0` = all files succeeded, `1` = one or more files failed.
pub fn run(args: CliArgs) -> ExitCode {
    let inputs = resolve_inputs(&args.input);
    if inputs.is_empty() {
        eprintln!("error: no input files matched the given pattern(s).");
        return ExitCode::FAILURE;
    }

    if inputs.len() > 1 && args.output.is_some() && args.output_dir.is_none() {
        eprintln!(
            "error: {} input files given but --output only accepts a single file path.\n\
             Use --output-dir to specify a destination directory for batch processing.",
            inputs.len()
        );
        return ExitCode::FAILURE;
    }

    let settings = args.effective_settings();
    if args.save_settings {
        match &args.config {
            Some(path) => {
                if let Err(e) = settings.save_to(path) {
                    eprintln!("warning: could not save settings to '{}': {}", path.display(), e);
                }
            }
            None => settings.save(),
        }
    }

    if let Some(dir) = &args.output_dir
        && let Err(e) = std::fs::create_dir_all(dir)
    {
        eprintln!(
            "error: could not create output directory '{}': {}",
            dir.display(), e
        );
        return ExitCode::FAILURE;
    }

    let mut outputs = Vec::with_capacity(inputs.len());
    for input in &inputs {
        match build_output_path(input, args.output.as_deref(), args.output_dir.as_deref()) {
            Some(p) => outputs.push(p),
            None => {
                eprintln!("error: cannot determine output path for '{}'.", input.display());
                return ExitCode::FAILURE;
            }
        }
    }

    log_info!(
        "Batch start: {} file(s), threshold {}, spot area {}, red {}, green {}, blue {}, crop {}",
        inputs.len(),
        settings.threshold,
        settings.spot_area,
        settings.red,
        settings.green,
        settings.blue,
        settings.auto_crop
    );

    let started = Instant::now();
    let failures = if args.parallel {
        run_parallel(&inputs, &outputs, &settings, args.verbose)
    } else {
        run_sequential(&inputs, &outputs, &settings, args.verbose)
    };

    for (input, err) in &failures {
        eprintln!("  error: {}: {}", input.display(), err);
    }
    log_info!(
        "Batch done: {} ok, {} failed in {:.0}ms",
        inputs.len() - failures.len(),
        failures.len(),
        started.elapsed().as_secs_f64() * 1000.0
    );
    let (warnings, errors) = logger::tally();
    if warnings + errors > 0
        && let Some(log) = logger::log_path()
    {
        eprintln!("{} warning(s), {} error(s) logged to {}", warnings, errors, log.display());
    }

    if failures.is_empty() { ExitCode::SUCCESS } else { ExitCode::FAILURE }
}

// ============================================================================
// Processing modes
// ============================================================================

/// Prints `[n/total] file` lines as the orchestrator advances.
struct ConsoleProgress<'a> {
    inputs: &'a [PathBuf],
    enabled: bool,
}

impl ProgressSink for ConsoleProgress<'_> {
    fn set_progress(&mut self, current: usize, max: usize) {
        if self.enabled
            && let Some(path) = self.inputs.get(current)
            && current < max
        {
            println!("[{}/{}] {}", current + 1, max, path.display());
        }
    }

    fn was_canceled(&self) -> bool {
        false
    }
}

/// All inputs become consecutive key frames (1, 2, …) of one store.  Each
/// frame is written and unloaded right after it is traced, so finished
/// files survive a later failure and only one page is resident at a time.
fn run_sequential(
    inputs:   &[PathBuf],
    outputs:  &[PathBuf],
    settings: &TraceSettings,
    verbose:  bool,
) -> Vec<(PathBuf, String)> {
    let mut store = KeyFrameStore::from_files(inputs);
    let mut progress = ConsoleProgress { inputs, enabled: verbose || inputs.len() > 1 };
    let total = inputs.len();
    let mut failures = Vec::new();

    for (idx, (input, output)) in inputs.iter().zip(outputs).enumerate() {
        progress.set_progress(idx, total);
        if progress.was_canceled() {
            break;
        }
        let pos = idx as i32 + 1;
        let file_start = Instant::now();
        let report = trace_scanned_drawings(
            &mut store,
            &mut RectSelection::none(),
            &mut NullProgress,
            settings,
            TraceScope::CurrentKeyFrame(pos),
        );
        if let Some((_, reason)) = report.failed.first() {
            failures.push((input.clone(), format!("load failed: {}", reason)));
            continue;
        }
        let Some(frame) = store.buffer_at_frame(pos) else { continue };

        match frame.write_file(output) {
            Ok(()) => {
                if verbose {
                    println!(
                        "  → {} ({:.0}ms)",
                        output.display(),
                        file_start.elapsed().as_secs_f64() * 1000.0
                    );
                }
                frame.unload();
            }
            Err(e) => {
                log_err!("Write failed for {}: {}", output.display(), e);
                failures.push((input.clone(), format!("save failed: {}", e)));
                store.remove_key_frame(pos);
            }
        }
    }
    failures
}

/// Each input is loaded, traced and written on its own rayon task.
fn run_parallel(
    inputs:   &[PathBuf],
    outputs:  &[PathBuf],
    settings: &TraceSettings,
    verbose:  bool,
) -> Vec<(PathBuf, String)> {
    inputs
        .par_iter()
        .zip(outputs.par_iter())
        .filter_map(|(input, output)| {
            let file_start = Instant::now();
            match run_one(input, output, settings) {
                Ok(()) => {
                    if verbose {
                        println!(
                            "{} → {} ({:.0}ms)",
                            input.display(),
                            output.display(),
                            file_start.elapsed().as_secs_f64() * 1000.0
                        );
                    }
                    None
                }
                Err(e) => {
                    log_err!("{}: {}", input.display(), e);
                    Some((input.clone(), e))
                }
            }
        })
        .collect()
}

fn run_one(input: &Path, output: &Path, settings: &TraceSettings) -> Result<(), String> {
    // -- Step 1: Load ----------------------------------------------------
    let mut frame = load_frame(input).map_err(|e| format!("load failed: {}", e))?;
    frame.set_threshold(settings.threshold);
    frame.set_spot_area(settings.spot_area);
    let page = frame.bounds();

    // -- Step 2: Trace ---------------------------------------------------
    let mut traced = settings.processor().scan_to_transparent(&frame);
    if !settings.auto_crop {
        traced.set_bounds(page);
    }

    // -- Step 3: Save ----------------------------------------------------
    traced
        .write_file(output)
        .map_err(|e| format!("save failed: {}", e))
}

// ============================================================================
// Helpers
// ============================================================================

/// Expand glob patterns and literal paths into a deduplicated, ordered list.
fn resolve_inputs(patterns: &[String]) -> Vec<PathBuf> {
    let mut result: Vec<PathBuf> = Vec::new();

    for pattern in patterns {
        let as_path = Path::new(pattern);

        if as_path.exists() {
            if !result.iter().any(|p| p.as_path() == as_path) {
                result.push(as_path.to_path_buf());
            }
            continue;
        }

        match glob::glob(pattern) {
            Ok(entries) => {
                let mut matched = false;
                for entry in entries.flatten() {
                    if !result.contains(&entry) {
                        result.push(entry);
                    }
                    matched = true;
                }
                if !matched {
                    eprintln!("warning: pattern '{}' matched no files.", pattern);
                    log_warn!("Pattern '{}' matched no files", pattern);
                }
            }
            Err(e) => {
                eprintln!("warning: invalid glob '{}': {}", pattern, e);
            }
        }
    }

    result
}

/// Compute the output path for a single input file.
///
/// Priority:
/// 1. `--output` (explicit path, used for single-file input)
/// 2. `--output-dir` (batch directory, derives filename from input stem)
/// 3. Fallback: next to the input as `<stem>.png`, or `<stem>_out.png`
///    if that would overwrite the input
fn build_output_path(input: &Path, output: Option<&Path>, output_dir: Option<&Path>) -> Option<PathBuf> {
    if let Some(out) = output {
        return Some(out.to_path_buf());
    }
    input.file_stem()?;

    if let Some(dir) = output_dir {
        return Some(output_path_in(dir, input, ""));
    }

    let parent = input.parent().unwrap_or(Path::new("."));
    let candidate = output_path_in(parent, input, "");
    if candidate == input {
        Some(output_path_in(parent, input, "_out"))
    } else {
        Some(candidate)
    }
}
