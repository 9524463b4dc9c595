//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - loads `.env` and sets up logging
//! - parses CLI arguments
//! - reads input files
//! - runs the peak or EoS workflow
//! - prints reports and writes optional exports

use std::path::{Path, PathBuf};

use clap::Parser;
use rayon::prelude::*;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::cli::{Command, DemoArgs, EosArgs, EosOptionArgs, PeakOptionArgs, PeaksArgs};
use crate::data::synthetic::{diffraction_pattern, eos_dataset, SyntheticPeak};
use crate::domain::EosParameters;
use crate::error::AppError;
use crate::io::EosResultFile;
use crate::session::PeakSession;

pub mod pipeline;

use pipeline::{EosPipeline, EosRun, PeakPipeline, StartValues};

/// Entry point for the `xrdfit` binary.
pub fn run() -> Result<(), AppError> {
    // A missing .env is fine; settings then come from the real environment.
    let _ = dotenvy::dotenv();
    init_logging();

    let cli = crate::cli::Cli::parse();
    match cli.command {
        Command::Peaks(args) => handle_peaks(args),
        Command::Eos(args) => handle_eos(args),
        Command::Demo(args) => handle_demo(args),
    }
}

fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("xrd_fit=info"));
    // Ignore a second initialization (tests, embedding).
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn handle_peaks(args: PeaksArgs) -> Result<(), AppError> {
    let config = peak_pipeline_from_args(&args.options);

    // Files are independent; each runs its whole workflow on the rayon pool.
    let runs: Vec<(PathBuf, Result<PeakSession, AppError>)> = args
        .files
        .par_iter()
        .map(|path| {
            let run = crate::io::read_trace(path)
                .and_then(|trace| pipeline::run_peaks(trace, &config))
                .map_err(AppError::from);
            (path.clone(), run)
        })
        .collect();

    let mut first_error = None;
    for (path, run) in runs {
        match run {
            Ok(session) => {
                println!("=== {} ===", path.display());
                println!("{}", crate::report::format_peak_table(session.results()));
                if let Some(dir) = &args.export_dir {
                    let out = peaks_export_path(dir, &path);
                    crate::io::write_peaks_csv(&out, session.results())?;
                    info!(path = %out.display(), "peak table exported");
                }
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "pattern skipped");
                first_error.get_or_insert(err);
            }
        }
    }

    match first_error {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

fn handle_eos(args: EosArgs) -> Result<(), AppError> {
    let (volumes, pressures) = crate::io::read_pv(&args.file)?;
    let config = eos_pipeline_from_args(&args.options);
    let run = pipeline::run_eos(volumes, pressures, &config)?;

    print_eos_run(&run);

    if let Some(path) = &args.export_json {
        let file = EosResultFile::new(
            run.session.model(),
            run.session.effective_locks(),
            &run.result,
            run.session.volumes(),
        );
        crate::io::write_eos_json(path, &file)?;
        info!(path = %path.display(), "EoS result exported");
    }

    if run.result.success {
        Ok(())
    } else {
        Err(AppError::new(4, format!("EoS fit failed: {}", run.result.message)))
    }
}

fn handle_demo(args: DemoArgs) -> Result<(), AppError> {
    let reflections = [
        SyntheticPeak::new(12.0, 300.0, 0.08),
        SyntheticPeak::new(15.3, 120.0, 0.1).with_lorentzian(0.06, 0.4),
        SyntheticPeak::new(18.5, 180.0, 0.1),
        SyntheticPeak::new(22.1, 90.0, 0.12).with_lorentzian(0.1, 0.7),
    ];
    let trace = diffraction_pattern(
        10.0,
        25.0,
        1500,
        &reflections,
        args.intensity_noise,
        args.seed,
    )?;
    let session = pipeline::run_peaks(trace, &peak_pipeline_from_args(&args.peaks))?;

    println!("=== demo pattern ({} reflections) ===", reflections.len());
    println!("{}", crate::report::format_peak_table(session.results()));

    let truth = EosParameters::new(11.5, 130.0, 4.0);
    let (volumes, pressures) = eos_dataset(
        &args.eos.model,
        &truth,
        11.4,
        9.6,
        15,
        args.pressure_noise,
        args.seed,
    )?;
    println!(
        "=== demo P-V data: {} truth V0={} B0={} B0'={} ===",
        args.eos.model, truth.v0, truth.b0, truth.b0_prime
    );
    let run = pipeline::run_eos(volumes, pressures, &eos_pipeline_from_args(&args.eos))?;
    print_eos_run(&run);
    Ok(())
}

fn print_eos_run(run: &EosRun) {
    println!(
        "{}",
        crate::report::format_eos_summary(
            run.session.model().display_name(),
            run.session.volumes().len(),
            &run.result
        )
    );
    if let Some(source) = run.source {
        println!("Auto-fit source: {source:?}\n");
    }
    if let Some(report) = &run.strategies {
        println!("{}", crate::report::format_strategy_table(report));
    }
    println!("{}", run.session.report());
}

fn peaks_export_path(dir: &Path, input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "pattern".to_string());
    dir.join(format!("{stem}_peaks.csv"))
}

pub fn peak_pipeline_from_args(args: &PeakOptionArgs) -> PeakPipeline {
    PeakPipeline {
        smoothing: args.smoothing(),
        background_windows: args.background_windows,
        search: args.search(),
        candidates: args.candidates.clone(),
        fit: args.fit_options(),
    }
}

pub fn eos_pipeline_from_args(args: &EosOptionArgs) -> EosPipeline {
    EosPipeline {
        model: args.model,
        mode: args.mode,
        start: StartValues {
            v0: args.v0,
            b0: args.b0,
            b0_prime: args.bp,
        },
        locks: args.locks(),
        regularization: args.regularization,
        regularization_target: args.regularization_target,
    }
}
