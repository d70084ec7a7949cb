//! Reconstruction-engine collaborator interface.
//!
//! The gradual-selection core never touches camera poses, calibrations, or
//! tie-point geometry directly; everything it needs from the underlying
//! reconstruction engine goes through [`ReconstructionEngine`]. Engine calls
//! are blocking and possibly long-running; the core issues them sequentially
//! and waits. Implementations are handle-explicit: there is no ambient
//! "active chunk" state, every call names its target.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::criterion::FilterCriterion;
use crate::math::{Real, Vec3};
use crate::params::CameraOptParams;

/// Opaque handle to an initialized tie-point filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FilterId(u64);

impl FilterId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for FilterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FilterId({})", self.0)
    }
}

/// Scalar metadata exposed by the engine's latest optimization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngineStat {
    /// Bundle-adjustment scale of unit weight (sigma-naught).
    UnitWeightSigma,
    /// Number of camera optimizations run so far.
    OptimizationCount,
}

/// Reference measurement attached to a camera (GNSS position of the
/// exposure station).
#[derive(Debug, Clone)]
pub struct CameraReference {
    /// Measured position.
    pub location: Vec3,
    /// Whether the reference participates in adjustment.
    pub enabled: bool,
    /// Declared per-axis accuracy, if any (vertical is the `z` component).
    pub accuracy: Option<Vec3>,
}

/// Per-camera state the quality metrics need: the estimated position (if the
/// pose resolved during alignment) and the reference measurement.
#[derive(Debug, Clone)]
pub struct CameraRecord {
    pub estimated: Option<Vec3>,
    pub reference: Option<CameraReference>,
}

/// Engine-side failure.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("chunk has no tie point cloud (alignment has not been run)")]
    MissingPointCloud,
    #[error("{0} no longer matches the point cloud")]
    StaleFilter(FilterId),
    #[error("reconstruction engine failure: {0}")]
    Backend(String),
}

/// Interface the gradual-selection core consumes from the reconstruction
/// engine.
///
/// Select/delete/optimize mutate global reconstruction state that is not
/// reentrant, so the trait is used strictly single-threaded: one chunk at a
/// time, one call at a time.
pub trait ReconstructionEngine {
    /// Whether alignment has produced a tie-point cloud.
    fn has_tie_points(&self) -> bool;

    /// Total number of tie points, valid or not.
    fn total_points(&self) -> usize;

    /// Number of valid tie points.
    fn valid_points(&self) -> usize;

    /// Initialize a selection filter, scoring every valid point against the
    /// criterion. Clears any previous selection.
    fn init_filter(&mut self, criterion: FilterCriterion) -> Result<FilterId, EngineError>;

    /// Select every valid point whose score exceeds the threshold.
    fn select_points(&mut self, filter: FilterId, threshold: Real) -> Result<(), EngineError>;

    /// Number of points currently both valid and selected.
    fn count_selected(&self, filter: FilterId) -> Result<usize, EngineError>;

    /// Remove the selected points from the cloud. Irreversible. Returns the
    /// number of points removed.
    fn delete_selected(&mut self, filter: FilterId) -> Result<usize, EngineError>;

    /// Clear the selection without deleting anything.
    fn reset_selection(&mut self, filter: FilterId) -> Result<(), EngineError>;

    /// Re-estimate camera poses and calibration over the current tie-point
    /// set. Blocking, possibly minutes.
    fn optimize_cameras(&mut self, params: &CameraOptParams) -> Result<(), EngineError>;

    /// Tie-point accuracy input to the bundle adjustment (pixels).
    fn tie_point_accuracy(&self) -> Real;

    /// Change the tie-point accuracy weighting. Takes effect at the next
    /// optimization.
    fn set_tie_point_accuracy(&mut self, accuracy: Real);

    /// Scalar metadata from the latest optimization, if available.
    fn statistic(&self, stat: EngineStat) -> Option<Real>;

    /// Camera state for the quality metrics.
    fn camera_records(&self) -> Vec<CameraRecord>;

    /// Per-observation reprojection residual norms over valid points and
    /// cameras with a resolved pose.
    fn reprojection_residuals(&self) -> Vec<Real>;
}
