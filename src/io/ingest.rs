//! Text/CSV ingest for traces and P–V data.
//!
//! Accepted layout:
//! - two or more numeric columns, comma or whitespace separated
//! - `#` starts a comment line
//! - non-numeric lines before the first data row are headers and skipped
//!
//! A non-numeric row after data has started is an error, reported with its
//! 1-based line number.

use std::fs;
use std::path::Path;

use tracing::debug;

use crate::domain::Trace;
use crate::error::{FitError, Result};

/// Numeric rows of a delimited text file, one `Vec` per data line.
pub fn read_columns(path: &Path) -> Result<Vec<Vec<f64>>> {
    let text = fs::read_to_string(path).map_err(|source| FitError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_columns(&text, path)
}

/// Load a diffraction pattern from the first two columns of `path`.
pub fn read_trace(path: &Path) -> Result<Trace> {
    let (x, y) = read_two_columns(path)?;
    Trace::new(x, y)
}

/// Load compression data: volume in the first column, pressure in the second.
///
/// Unlike a trace, the volumes may come in any order.
pub fn read_pv(path: &Path) -> Result<(Vec<f64>, Vec<f64>)> {
    read_two_columns(path)
}

fn read_two_columns(path: &Path) -> Result<(Vec<f64>, Vec<f64>)> {
    let rows = read_columns(path)?;
    if rows.is_empty() {
        return Err(FitError::InsufficientData {
            operation: "file ingest",
            required: 1,
            actual: 0,
        });
    }
    let (x, y) = rows.iter().map(|r| (r[0], r[1])).unzip();
    debug!(path = %path.display(), rows = rows.len(), "loaded two-column data");
    Ok((x, y))
}

fn parse_columns(text: &str, path: &Path) -> Result<Vec<Vec<f64>>> {
    // The csv reader splits on a single delimiter, so whitespace-separated
    // lines are rewritten with commas first. Line count is preserved.
    let normalized: String = text
        .lines()
        .map(|line| {
            if line.contains(',') || line.trim_start().starts_with('#') {
                line.to_string()
            } else {
                line.split_whitespace().collect::<Vec<_>>().join(",")
            }
        })
        .collect::<Vec<_>>()
        .join("\n");

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .comment(Some(b'#'))
        .from_reader(normalized.as_bytes());

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result.map_err(|e| FitError::Parse {
            path: path.to_path_buf(),
            line: e.position().map_or(0, |p| p.line() as usize),
            message: e.to_string(),
        })?;
        let line = record.position().map_or(0, |p| p.line() as usize);

        let fields: Vec<&str> = record.iter().filter(|f| !f.is_empty()).collect();
        let values: Option<Vec<f64>> = fields.iter().map(|f| f.parse::<f64>().ok()).collect();
        match values {
            Some(v) if v.len() >= 2 => rows.push(v),
            // Headers and blank-ish rows before the data.
            _ if rows.is_empty() => continue,
            _ => {
                return Err(FitError::Parse {
                    path: path.to_path_buf(),
                    line,
                    message: format!(
                        "expected at least two numeric columns, got '{}'",
                        fields.join(",")
                    ),
                });
            }
        }
    }
    Ok(rows)
}
