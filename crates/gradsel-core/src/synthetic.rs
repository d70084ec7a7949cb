//! Deterministic in-memory reconstruction engine.
//!
//! [`SyntheticChunk`] stands in for a real chunk in tests, examples, and the
//! CLI's simulation mode. Per-criterion scores are fixed per point; each
//! optimization scales the reprojection residuals by a configurable gain
//! and relaxes sigma-naught halfway toward 1.0, so deletion and
//! optimization genuinely reduce the measured error.

use crate::criterion::FilterCriterion;
use crate::engine::{
    CameraRecord, EngineError, EngineStat, FilterId, ReconstructionEngine,
};
use crate::math::Real;
use crate::params::CameraOptParams;

#[derive(Debug, Clone)]
struct TiePoint {
    valid: bool,
    selected: bool,
    ru: Real,
    pa: Real,
    re: Real,
}

impl TiePoint {
    fn score(&self, criterion: FilterCriterion) -> Real {
        match criterion {
            FilterCriterion::ReconstructionUncertainty => self.ru,
            FilterCriterion::ProjectionAccuracy => self.pa,
            FilterCriterion::ReprojectionError => self.re,
        }
    }
}

/// In-memory chunk implementing [`ReconstructionEngine`].
#[derive(Debug, Clone)]
pub struct SyntheticChunk {
    points: Vec<TiePoint>,
    cameras: Vec<CameraRecord>,
    aligned: bool,
    tie_point_accuracy: Real,
    initial_sigma: Real,
    sigma: Option<Real>,
    residual_scale: Real,
    optimize_gain: Real,
    optimizations: usize,
    active_filter: Option<(FilterId, FilterCriterion)>,
    next_filter: u64,
}

impl SyntheticChunk {
    fn from_points(points: Vec<TiePoint>, aligned: bool) -> Self {
        Self {
            points,
            cameras: Vec::new(),
            aligned,
            tie_point_accuracy: 1.0,
            initial_sigma: 1.6,
            sigma: None,
            residual_scale: 1.0,
            optimize_gain: 0.5,
            optimizations: 0,
            active_filter: None,
            next_filter: 0,
        }
    }

    /// Chunk with `n` points whose scores for every criterion are evenly
    /// spread over `(lo, hi)`.
    pub fn uniform(n: usize, lo: Real, hi: Real) -> Self {
        let scores: Vec<Real> = (0..n)
            .map(|i| lo + (i as Real + 0.5) / n as Real * (hi - lo))
            .collect();
        Self::from_ranges_scores(&scores, &scores, &scores)
    }

    /// Chunk with explicit scores for one criterion; the other criteria
    /// score zero.
    pub fn with_scores(criterion: FilterCriterion, scores: &[Real]) -> Self {
        let zeros = vec![0.0; scores.len()];
        match criterion {
            FilterCriterion::ReconstructionUncertainty => {
                Self::from_ranges_scores(scores, &zeros, &zeros)
            }
            FilterCriterion::ProjectionAccuracy => {
                Self::from_ranges_scores(&zeros, scores, &zeros)
            }
            FilterCriterion::ReprojectionError => {
                Self::from_ranges_scores(&zeros, &zeros, scores)
            }
        }
    }

    /// Chunk with per-criterion evenly spread score ranges.
    pub fn from_ranges(n: usize, ru: [Real; 2], pa: [Real; 2], re: [Real; 2]) -> Self {
        let spread = |range: [Real; 2]| -> Vec<Real> {
            (0..n)
                .map(|i| range[0] + (i as Real + 0.5) / n as Real * (range[1] - range[0]))
                .collect()
        };
        Self::from_ranges_scores(&spread(ru), &spread(pa), &spread(re))
    }

    fn from_ranges_scores(ru: &[Real], pa: &[Real], re: &[Real]) -> Self {
        assert_eq!(ru.len(), pa.len());
        assert_eq!(ru.len(), re.len());
        let points = ru
            .iter()
            .zip(pa)
            .zip(re)
            .map(|((&ru, &pa), &re)| TiePoint {
                valid: true,
                selected: false,
                ru,
                pa,
                re,
            })
            .collect();
        Self::from_points(points, true)
    }

    /// Chunk where every point shares one score for every criterion.
    /// Degenerate: any raised threshold selects nothing.
    pub fn degenerate(n: usize, score: Real) -> Self {
        let scores = vec![score; n];
        Self::from_ranges_scores(&scores, &scores, &scores)
    }

    /// Chunk that was never aligned: no tie-point cloud at all.
    pub fn empty() -> Self {
        Self::from_points(Vec::new(), false)
    }

    /// Builder: keep the points but mark alignment as not yet run.
    pub fn pending_alignment(mut self) -> Self {
        self.aligned = false;
        self
    }

    /// Builder: attach camera records.
    pub fn with_cameras(mut self, cameras: Vec<CameraRecord>) -> Self {
        self.cameras = cameras;
        self
    }

    /// Builder: sigma-naught reported after the first optimization.
    pub fn with_initial_sigma(mut self, sigma: Real) -> Self {
        self.initial_sigma = sigma;
        self
    }

    /// Builder: factor the residual scale shrinks by per optimization.
    pub fn with_optimize_gain(mut self, gain: Real) -> Self {
        self.optimize_gain = gain;
        self
    }

    /// Mark alignment as done (the project's align call-through).
    pub fn mark_aligned(&mut self) {
        self.aligned = true;
    }

    /// Number of optimizations run so far.
    pub fn optimizations(&self) -> usize {
        self.optimizations
    }

    /// Current residual scale (1.0 until the first optimization).
    pub fn residual_scale(&self) -> Real {
        self.residual_scale
    }

    fn check_filter(&self, filter: FilterId) -> Result<FilterCriterion, EngineError> {
        match self.active_filter {
            Some((id, criterion)) if id == filter => Ok(criterion),
            _ => Err(EngineError::StaleFilter(filter)),
        }
    }
}

impl ReconstructionEngine for SyntheticChunk {
    fn has_tie_points(&self) -> bool {
        self.aligned
    }

    fn total_points(&self) -> usize {
        self.points.len()
    }

    fn valid_points(&self) -> usize {
        self.points.iter().filter(|p| p.valid).count()
    }

    fn init_filter(&mut self, criterion: FilterCriterion) -> Result<FilterId, EngineError> {
        if !self.aligned {
            return Err(EngineError::MissingPointCloud);
        }
        for p in &mut self.points {
            p.selected = false;
        }
        let id = FilterId::new(self.next_filter);
        self.next_filter += 1;
        self.active_filter = Some((id, criterion));
        Ok(id)
    }

    fn select_points(&mut self, filter: FilterId, threshold: Real) -> Result<(), EngineError> {
        let criterion = self.check_filter(filter)?;
        for p in &mut self.points {
            p.selected = p.valid && p.score(criterion) > threshold;
        }
        Ok(())
    }

    fn count_selected(&self, filter: FilterId) -> Result<usize, EngineError> {
        self.check_filter(filter)?;
        Ok(self.points.iter().filter(|p| p.valid && p.selected).count())
    }

    fn delete_selected(&mut self, filter: FilterId) -> Result<usize, EngineError> {
        self.check_filter(filter)?;
        let before = self.points.len();
        self.points.retain(|p| !(p.valid && p.selected));
        Ok(before - self.points.len())
    }

    fn reset_selection(&mut self, filter: FilterId) -> Result<(), EngineError> {
        self.check_filter(filter)?;
        for p in &mut self.points {
            p.selected = false;
        }
        Ok(())
    }

    fn optimize_cameras(&mut self, _params: &CameraOptParams) -> Result<(), EngineError> {
        if !self.aligned {
            return Err(EngineError::MissingPointCloud);
        }
        self.residual_scale *= self.optimize_gain;
        let sigma = self.sigma.unwrap_or(self.initial_sigma);
        self.sigma = Some(1.0 + (sigma - 1.0) * 0.5);
        self.optimizations += 1;
        Ok(())
    }

    fn tie_point_accuracy(&self) -> Real {
        self.tie_point_accuracy
    }

    fn set_tie_point_accuracy(&mut self, accuracy: Real) {
        self.tie_point_accuracy = accuracy;
    }

    fn statistic(&self, stat: EngineStat) -> Option<Real> {
        match stat {
            EngineStat::UnitWeightSigma => self.sigma,
            EngineStat::OptimizationCount => Some(self.optimizations as Real),
        }
    }

    fn camera_records(&self) -> Vec<CameraRecord> {
        self.cameras.clone()
    }

    fn reprojection_residuals(&self) -> Vec<Real> {
        self.points
            .iter()
            .filter(|p| p.valid)
            .map(|p| p.re * self.residual_scale)
            .collect()
    }
}
