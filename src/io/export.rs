//! CSV exports: fitted peaks and processed traces.
//!
//! Meant to be easy to consume in spreadsheets or downstream scripts.

use std::path::Path;

use serde::Serialize;

use crate::domain::{PeakBatch, Trace};
use crate::error::{FitError, Result};

#[derive(Debug, Serialize)]
struct PeakRow<'a> {
    index: usize,
    profile: &'a str,
    center: f64,
    amplitude: f64,
    sigma: f64,
    gamma: f64,
    eta: f64,
    fwhm: f64,
}

/// Write one row per fitted peak (1-based `index`). Failures are not exported.
pub fn write_peaks_csv(path: &Path, batch: &PeakBatch) -> Result<()> {
    let mut writer = csv::Writer::from_path(path).map_err(|e| csv_error(path, e))?;
    for (i, r) in batch.results.iter().enumerate() {
        writer
            .serialize(PeakRow {
                index: i + 1,
                profile: r.profile.display_name(),
                center: r.center,
                amplitude: r.amplitude,
                sigma: r.sigma,
                gamma: r.gamma,
                eta: r.eta,
                fwhm: r.fwhm,
            })
            .map_err(|e| csv_error(path, e))?;
    }
    if batch.results.is_empty() {
        writer
            .write_record([
                "index",
                "profile",
                "center",
                "amplitude",
                "sigma",
                "gamma",
                "eta",
                "fwhm",
            ])
            .map_err(|e| csv_error(path, e))?;
    }
    writer.flush().map_err(|source| FitError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Write a trace as `x,y` rows with a header.
pub fn write_trace_csv(path: &Path, trace: &Trace) -> Result<()> {
    let mut writer = csv::Writer::from_path(path).map_err(|e| csv_error(path, e))?;
    writer
        .write_record(["x", "y"])
        .map_err(|e| csv_error(path, e))?;
    for (x, y) in trace.x().iter().zip(trace.y()) {
        writer
            .write_record([x.to_string(), y.to_string()])
            .map_err(|e| csv_error(path, e))?;
    }
    writer.flush().map_err(|source| FitError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn csv_error(path: &Path, err: csv::Error) -> FitError {
    let line = err.position().map_or(0, |p| p.line() as usize);
    match err.into_kind() {
        csv::ErrorKind::Io(source) => FitError::Io {
            path: path.to_path_buf(),
            source,
        },
        other => FitError::Parse {
            path: path.to_path_buf(),
            line,
            message: format!("{other:?}"),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{PeakFitResult, ProfileKind};
    use crate::io::ingest::read_trace;

    fn peak(center: f64) -> PeakFitResult {
        PeakFitResult {
            profile: ProfileKind::Voigt,
            candidate_x: center,
            amplitude: 12.5,
            center,
            sigma: 0.1,
            gamma: 0.05,
            eta: 0.3,
            fwhm: 0.3,
            rms: 0.01,
        }
    }

    #[test]
    fn peaks_csv_has_header_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("peaks.csv");
        let batch = PeakBatch {
            results: vec![peak(12.0), peak(18.5)],
            failures: Vec::new(),
        };
        write_peaks_csv(&path, &batch).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "index,profile,center,amplitude,sigma,gamma,eta,fwhm");
        assert_eq!(lines.len(), 3);
        assert!(lines[2].starts_with("2,voigt,18.5,12.5,"));
    }

    #[test]
    fn empty_batch_still_writes_a_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("none.csv");
        write_peaks_csv(&path, &PeakBatch::default()).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.trim_end(), "index,profile,center,amplitude,sigma,gamma,eta,fwhm");
    }

    #[test]
    fn trace_csv_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trace.csv");
        let trace = Trace::new(vec![1.0, 2.0, 3.5], vec![4.0, 0.25, 9.0]).unwrap();
        write_trace_csv(&path, &trace).unwrap();
        assert_eq!(read_trace(&path).unwrap(), trace);
    }

    #[test]
    fn unwritable_path_is_an_io_error() {
        let batch = PeakBatch::default();
        let err = write_peaks_csv(Path::new("/no/such/dir/peaks.csv"), &batch).unwrap_err();
        assert!(matches!(err, FitError::Io { .. }));
    }
}
