use tracing::info;

use crate::domain::{AnchorPoint, PeakBatch, SmoothingMethod, Trace};
use crate::error::{FitError, Result};
use crate::peaks::{self, PeakFitOptions, PeakSearch};
use crate::signal;

/// Interactive peak-fitting workflow over one diffraction pattern.
///
/// The loaded trace is never modified; smoothing and background removal act
/// on a working copy that [`PeakSession::reset`] restores.
#[derive(Debug, Clone)]
pub struct PeakSession {
    original: Trace,
    working: Trace,
    anchors: Vec<AnchorPoint>,
    candidates: Vec<f64>,
    batch: PeakBatch,
    pub search: PeakSearch,
}

impl PeakSession {
    pub fn new(trace: Trace) -> Self {
        Self {
            working: trace.clone(),
            original: trace,
            anchors: Vec::new(),
            candidates: Vec::new(),
            batch: PeakBatch::default(),
            search: PeakSearch::default(),
        }
    }

    pub fn original(&self) -> &Trace {
        &self.original
    }

    pub fn working(&self) -> &Trace {
        &self.working
    }

    pub fn anchors(&self) -> &[AnchorPoint] {
        &self.anchors
    }

    pub fn candidates(&self) -> &[f64] {
        &self.candidates
    }

    pub fn results(&self) -> &PeakBatch {
        &self.batch
    }

    /// Smooth the working copy. Repeated calls accumulate.
    pub fn smooth(&mut self, method: SmoothingMethod) {
        self.working = signal::smooth(&self.working, method);
    }

    /// Replace the anchors with the per-window minima of the working copy.
    pub fn auto_select_background(&mut self, n_windows: usize) -> &[AnchorPoint] {
        self.anchors = signal::auto_select_background(&self.working, n_windows);
        &self.anchors
    }

    pub fn add_anchor(&mut self, anchor: AnchorPoint) {
        self.anchors.push(anchor);
    }

    pub fn clear_background(&mut self) {
        self.anchors.clear();
    }

    /// Subtract the spline through the current anchors from the working copy.
    pub fn subtract_background(&mut self) -> Result<()> {
        self.working = signal::subtract_background(&self.working, &self.anchors)?;
        Ok(())
    }

    /// Replace the candidates with an automatic search on the working copy.
    pub fn find_peaks(&mut self) -> &[f64] {
        self.candidates = peaks::find_peaks_with(&self.working, &self.search);
        info!(count = self.candidates.len(), "peak candidates found");
        &self.candidates
    }

    /// Add a hand-picked candidate; it must lie inside the trace x-range.
    pub fn add_candidate(&mut self, x: f64) -> Result<()> {
        let (Some(&lo), Some(&hi)) = (self.working.x().first(), self.working.x().last()) else {
            return Err(FitError::InvalidInput("empty trace".to_string()));
        };
        if !(lo..=hi).contains(&x) {
            return Err(FitError::InvalidInput(format!(
                "candidate {x} outside trace range [{lo}, {hi}]"
            )));
        }
        self.candidates.push(x);
        self.candidates.sort_by(f64::total_cmp);
        Ok(())
    }

    /// Fit every candidate on the working copy, replacing earlier results.
    pub fn fit_peaks(&mut self, opts: &PeakFitOptions) -> Result<&PeakBatch> {
        if self.candidates.is_empty() {
            return Err(FitError::InsufficientData {
                operation: "peak fitting",
                required: 1,
                actual: 0,
            });
        }
        self.batch = peaks::fit_peaks(&self.working, &self.candidates, opts);
        Ok(&self.batch)
    }

    pub fn clear_peaks(&mut self) {
        self.candidates.clear();
        self.batch = PeakBatch::default();
    }

    /// Back to the loaded trace with no anchors, candidates or results.
    pub fn reset(&mut self) {
        self.working = self.original.clone();
        self.anchors.clear();
        self.clear_peaks();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::synthetic::{diffraction_pattern, SyntheticPeak};

    fn session() -> PeakSession {
        let peaks = [
            SyntheticPeak::new(12.0, 300.0, 0.08),
            SyntheticPeak::new(18.5, 180.0, 0.1),
        ];
        PeakSession::new(diffraction_pattern(10.0, 25.0, 1500, &peaks, 0.0, 7).unwrap())
    }

    #[test]
    fn full_workflow_fits_both_peaks() {
        let mut s = session();
        s.smooth(SmoothingMethod::SavitzkyGolay {
            window: 7,
            polyorder: 3,
        });
        s.auto_select_background(15);
        s.subtract_background().unwrap();
        assert!(s.working().y().iter().all(|&v| v >= 0.0));

        let found = s.find_peaks().to_vec();
        assert_eq!(found.len(), 2, "{found:?}");

        let batch = s.fit_peaks(&PeakFitOptions::default()).unwrap();
        assert_eq!(batch.results.len(), 2);
        assert!((batch.results[0].center - 12.0).abs() < 0.05);
        assert!((batch.results[1].center - 18.5).abs() < 0.05);
    }

    #[test]
    fn reset_restores_the_loaded_trace() {
        let mut s = session();
        s.smooth(SmoothingMethod::Gaussian { sigma: 3.0 });
        s.auto_select_background(15);
        s.find_peaks();
        assert_ne!(s.working(), s.original());

        s.reset();
        assert_eq!(s.working(), s.original());
        assert!(s.anchors().is_empty());
        assert!(s.candidates().is_empty());
        assert!(s.results().results.is_empty());
    }

    #[test]
    fn fitting_without_candidates_is_an_error() {
        let mut s = session();
        assert!(matches!(
            s.fit_peaks(&PeakFitOptions::default()),
            Err(FitError::InsufficientData { .. })
        ));
    }

    #[test]
    fn manual_candidates_must_be_in_range() {
        let mut s = session();
        assert!(s.add_candidate(30.0).is_err());
        s.add_candidate(18.5).unwrap();
        s.add_candidate(12.0).unwrap();
        assert_eq!(s.candidates(), &[12.0, 18.5]);
    }

    #[test]
    fn background_needs_four_anchors() {
        let mut s = session();
        s.add_anchor(AnchorPoint { x: 10.0, y: 1.0 });
        s.add_anchor(AnchorPoint { x: 20.0, y: 1.0 });
        assert!(s.subtract_background().is_err());
        s.clear_background();
        assert!(s.anchors().is_empty());
    }
}
