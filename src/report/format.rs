//! Plain-text reports for terminal output.
//!
//! Formatting lives here so:
//! - the fitting code stays free of presentation concerns
//! - output changes are localized (the EoS block layout is fixed-width)

use crate::domain::{EosFitResult, EosParameters, LockFlags, ParameterErrors, PeakBatch};
use crate::eos::StrategyReport;

const RULE_WIDTH: usize = 72;

/// One refinement block of the EoS report.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleBlock {
    pub title: &'static str,
    pub params: EosParameters,
    pub errors: ParameterErrors,
    /// Values the shifts are measured from; `None` reports zero shifts.
    pub reference: Option<EosParameters>,
    pub locks: LockFlags,
    pub b0_double_prime: f64,
    /// `None` when the model could not be evaluated on the data.
    pub chi_squared: Option<f64>,
    pub max_delta_pressure: Option<f64>,
}

/// All blocks separated by a blank line.
pub fn format_eos_report(blocks: &[CycleBlock]) -> String {
    blocks
        .iter()
        .map(format_cycle)
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// One block:
///
/// ```text
/// RESULTS FROM CYCLE 1
/// ========================================================================
///
/// PARA  REF          NEW        SHIFT       E.S.D.     SHIFT/ERROR
/// ------------------------------------------------------------------------
/// V0   1     11.50000      0.12000      0.00100     120.00
/// ...
/// ```
pub fn format_cycle(block: &CycleBlock) -> String {
    let reference = block.reference.unwrap_or(block.params);
    let mut lines = vec![
        block.title.to_string(),
        "=".repeat(RULE_WIDTH),
        String::new(),
        "PARA  REF          NEW        SHIFT       E.S.D.     SHIFT/ERROR".to_string(),
        "-".repeat(RULE_WIDTH),
    ];

    lines.push(param_line(
        "V0",
        block.locks.v0,
        block.params.v0,
        reference.v0,
        block.errors.v0,
    ));
    lines.push(param_line(
        "K0",
        block.locks.b0,
        block.params.b0,
        reference.b0,
        block.errors.b0,
    ));

    let kp = block.params.b0_prime;
    if block.locks.b0_prime {
        lines.push(format!("Kp   0   {kp:10.5}   [NOT REFINED]"));
    } else {
        let shift = kp - reference.b0_prime;
        let esd = block.errors.b0_prime;
        lines.push(format!(
            "Kp   1   {kp:10.5}   {shift:10.5}   {esd:10.5}   {:8.2}",
            shift_over_error(shift, esd)
        ));
    }
    lines.push(format!(
        "Kpp  0   {:10.5}   [IMPLIED VALUE]",
        block.b0_double_prime
    ));

    lines.push(String::new());
    lines.push(format!(
        "W-CHI^2 = {:5.2} (AND ESD'S RESCALED BY W-CHI^2)",
        block.chi_squared.unwrap_or(1.0)
    ));
    lines.push(format!(
        "MAXIMUM DELTA-PRESSURE = {:+.2}",
        block.max_delta_pressure.unwrap_or(0.0)
    ));
    lines.join("\n")
}

fn param_line(label: &str, locked: bool, value: f64, reference: f64, esd: f64) -> String {
    let marker = if locked { 0 } else { 1 };
    let shift = value - reference;
    format!(
        "{label:<4}{marker:>2}   {value:10.5}   {shift:10.5}   {esd:10.5}   {:8.2}",
        shift_over_error(shift, esd)
    )
}

fn shift_over_error(shift: f64, esd: f64) -> f64 {
    if esd != 0.0 && esd.is_finite() {
        shift / esd
    } else {
        0.0
    }
}

/// Short summary of one EoS fit.
pub fn format_eos_summary(model: &str, n_points: usize, result: &EosFitResult) -> String {
    let mut out = String::new();
    out.push_str(&format!("=== xrdfit - EoS fit ({model}) ===\n"));
    out.push_str(&format!("Points: n={n_points}\n"));
    out.push_str(&format!(
        "Status: {} ({})\n",
        if result.success { "converged" } else { "FAILED" },
        result.message
    ));
    let p = &result.params;
    let e = &result.errors;
    out.push_str(&format!("V0  = {:.4} ± {:.4}\n", p.v0, e.v0));
    out.push_str(&format!("B0  = {:.4} ± {:.4}\n", p.b0, e.b0));
    out.push_str(&format!("B0' = {:.4} ± {:.4}\n", p.b0_prime, e.b0_prime));
    out.push_str(&format!(
        "RMS = {:.4} | chi2 = {:.6} | R2 = {:.6} | iterations = {}\n",
        result.rms, result.chi_squared, result.r_squared, result.iterations
    ));
    out
}

/// One row per retry strategy; the selected one is starred.
pub fn format_strategy_table(report: &StrategyReport) -> String {
    let mut out = String::new();
    push_row(
        &mut out,
        format!(
            "{:<2} {:<18} {:>10} {:>10} {:>8} {:>12}  {}",
            "", "strategy", "V0", "B0", "B0'", "rms", "status"
        ),
    );
    push_row(
        &mut out,
        format!(
            "{:-<2} {:-<18} {:-<10} {:-<10} {:-<8} {:-<12}  {:-<10}",
            "", "", "", "", "", "", ""
        ),
    );
    for (i, attempt) in report.attempts.iter().enumerate() {
        let r = &attempt.result;
        let mark = if report.best == Some(i) { "*" } else { "" };
        let status = if r.success { "ok" } else { r.message.as_str() };
        push_row(
            &mut out,
            format!(
                "{:<2} {:<18} {:>10.4} {:>10.3} {:>8.4} {:>12.6}  {}",
                mark, attempt.label, r.params.v0, r.params.b0, r.params.b0_prime, r.rms, status
            ),
        );
    }
    out
}

/// Fitted peaks as a fixed-width table, followed by any failures.
pub fn format_peak_table(batch: &PeakBatch) -> String {
    let mut out = String::new();
    push_row(
        &mut out,
        format!(
            "{:>4} {:<12} {:>10} {:>12} {:>8} {:>8} {:>6} {:>8} {:>10}",
            "#", "profile", "center", "amplitude", "sigma", "gamma", "eta", "fwhm", "rms"
        ),
    );
    push_row(
        &mut out,
        format!(
            "{:-<4} {:-<12} {:-<10} {:-<12} {:-<8} {:-<8} {:-<6} {:-<8} {:-<10}",
            "", "", "", "", "", "", "", "", ""
        ),
    );

    for (i, r) in batch.results.iter().enumerate() {
        push_row(
            &mut out,
            format!(
                "{:>4} {:<12} {:>10.4} {:>12.2} {:>8.4} {:>8.4} {:>6.3} {:>8.4} {:>10.3}",
                i + 1,
                r.profile.display_name(),
                r.center,
                r.amplitude,
                r.sigma,
                r.gamma,
                r.eta,
                r.fwhm,
                r.rms
            ),
        );
    }

    if !batch.failures.is_empty() {
        out.push_str("\nFailed candidates:\n");
        for f in &batch.failures {
            out.push_str(&format!("  x={:.4}: {}\n", f.candidate_x, f.reason));
        }
    }
    out
}

fn push_row(out: &mut String, row: String) {
    out.push_str(row.trim_end());
    out.push('\n');
}
