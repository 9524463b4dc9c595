//! Command-line parsing for the XRD peak and EoS fitter.
//!
//! The goal of this module is to keep **argument parsing** separate from the
//! fitting code: every argument struct converts into the engine's typed
//! configuration (`PeakFitOptions`, `PeakSearch`, `EosFitter` settings).

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::domain::{EosMode, LockFlags, ProfileKind, SmoothingMethod};
use crate::eos::EosKind;
use crate::peaks::{PeakFitOptions, PeakSearch};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(
    name = "xrdfit",
    version,
    about = "XRD peak fitting and equation-of-state refinement"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Smooth, remove background, detect and fit peaks in one or more patterns.
    Peaks(PeaksArgs),
    /// Fit an equation of state to pressure–volume data.
    Eos(EosArgs),
    /// Run both workflows on generated data.
    Demo(DemoArgs),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SmoothKind {
    None,
    Gaussian,
    Savgol,
}

/// Preprocessing and peak options shared by `peaks` and `demo`.
#[derive(Debug, Parser, Clone)]
pub struct PeakOptionArgs {
    /// Smoothing applied to the working copy before anything else.
    #[arg(long, value_enum, default_value_t = SmoothKind::None)]
    pub smooth: SmoothKind,

    /// Gaussian smoothing sigma (samples).
    #[arg(long, default_value_t = 2.0)]
    pub sigma: f64,

    /// Savitzky–Golay window length (samples).
    #[arg(long, default_value_t = 11)]
    pub window: usize,

    /// Savitzky–Golay polynomial order.
    #[arg(long, default_value_t = 3)]
    pub polyorder: usize,

    /// Number of windows for automatic background anchors (0 disables background removal).
    #[arg(long, default_value_t = crate::signal::DEFAULT_BACKGROUND_WINDOWS)]
    pub background_windows: usize,

    /// Peak prominence threshold as a fraction of the y-range.
    #[arg(long, default_value_t = 0.05)]
    pub prominence: f64,

    /// Minimum separation between detected peaks (samples).
    #[arg(long, default_value_t = 5)]
    pub min_distance: usize,

    /// Fit these positions instead of running the automatic search.
    #[arg(long, value_delimiter = ',', value_name = "X,...")]
    pub candidates: Vec<f64>,

    /// Line shape to fit.
    #[arg(long, value_enum, default_value_t = ProfileKind::PseudoVoigt)]
    pub profile: ProfileKind,

    /// Half width of each fit window (x units).
    #[arg(long, default_value_t = 3.0)]
    pub half_window: f64,
}

impl PeakOptionArgs {
    pub fn smoothing(&self) -> SmoothingMethod {
        match self.smooth {
            SmoothKind::None => SmoothingMethod::None,
            SmoothKind::Gaussian => SmoothingMethod::Gaussian { sigma: self.sigma },
            SmoothKind::Savgol => SmoothingMethod::SavitzkyGolay {
                window: self.window,
                polyorder: self.polyorder,
            },
        }
    }

    pub fn search(&self) -> PeakSearch {
        PeakSearch {
            relative_prominence: self.prominence,
            min_distance: self.min_distance,
            ..PeakSearch::default()
        }
    }

    pub fn fit_options(&self) -> PeakFitOptions {
        PeakFitOptions {
            half_window: self.half_window,
            profile: self.profile,
            ..PeakFitOptions::default()
        }
    }
}

#[derive(Debug, Parser)]
pub struct PeaksArgs {
    /// Pattern files (two or more numeric columns: x, intensity).
    #[arg(required = true, value_name = "FILE")]
    pub files: Vec<PathBuf>,

    #[command(flatten)]
    pub options: PeakOptionArgs,

    /// Write `<stem>_peaks.csv` per input file into this directory.
    #[arg(long, value_name = "DIR")]
    pub export_dir: Option<PathBuf>,
}

/// EoS settings shared by `eos` and `demo`.
#[derive(Debug, Parser, Clone)]
pub struct EosOptionArgs {
    #[arg(long, value_enum, default_value_t = EosKind::Bm3)]
    pub model: EosKind,

    #[arg(long, value_enum, default_value_t = EosMode::Fit)]
    pub mode: EosMode,

    /// Starting V0 (defaults to the smart guess).
    #[arg(long)]
    pub v0: Option<f64>,

    /// Starting B0.
    #[arg(long)]
    pub b0: Option<f64>,

    /// Starting B0'.
    #[arg(long)]
    pub bp: Option<f64>,

    #[arg(long)]
    pub lock_v0: bool,

    #[arg(long)]
    pub lock_b0: bool,

    #[arg(long)]
    pub lock_bp: bool,

    /// Strength of the pull of B0' toward the target (0 disables it).
    #[arg(long, default_value_t = 0.0)]
    pub regularization: f64,

    /// B0' value the regularization pulls toward.
    #[arg(long, default_value_t = 4.0)]
    pub regularization_target: f64,
}

impl EosOptionArgs {
    pub fn locks(&self) -> LockFlags {
        LockFlags {
            v0: self.lock_v0,
            b0: self.lock_b0,
            b0_prime: self.lock_bp,
        }
    }
}

#[derive(Debug, Parser)]
pub struct EosArgs {
    /// P–V file (volume, pressure columns).
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    #[command(flatten)]
    pub options: EosOptionArgs,

    /// Export the fit (parameters, errors, P(V) grid) to JSON.
    #[arg(long, value_name = "JSON")]
    pub export_json: Option<PathBuf>,
}

#[derive(Debug, Parser)]
pub struct DemoArgs {
    /// Random seed for the generated data.
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Noise standard deviation on the pattern intensities.
    #[arg(long, default_value_t = 2.0)]
    pub intensity_noise: f64,

    /// Noise standard deviation on the pressures.
    #[arg(long, default_value_t = 0.05)]
    pub pressure_noise: f64,

    #[command(flatten)]
    pub peaks: PeakOptionArgs,

    #[command(flatten)]
    pub eos: EosOptionArgs,
}
