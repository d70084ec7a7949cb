//! Gradual-selection error reduction for structure-from-motion tie-point
//! clouds.
//!
//! This crate contains the control logic of the refinement workflow:
//! - quality metrics over the current reconstruction state ([`metrics`]),
//! - an adaptive threshold search bounding per-iteration removals
//!   ([`threshold`]),
//! - the convergence loop that deletes the worst-scoring points and
//!   re-optimizes the cameras between rounds ([`selection`]),
//! - the camera optimization parameter set ([`params`]).
//!
//! Everything the loop needs from the underlying reconstruction engine
//! (point filtering, deletion, camera optimization, statistics) goes
//! through the [`ReconstructionEngine`] trait; [`synthetic::SyntheticChunk`]
//! is a deterministic in-memory implementation for tests and demos.
//!
//! ```
//! use gradsel_core::{run_gradual_selection, SelectionConfig, SyntheticChunk};
//!
//! let mut chunk = SyntheticChunk::uniform(1000, 0.0, 20.0);
//! let config = SelectionConfig::reconstruction_uncertainty(10.0);
//! let report = run_gradual_selection(&mut chunk, &config)?;
//! assert_eq!(report.deleted, report.initial_points - report.final_points);
//! # Ok::<(), gradsel_core::SelectionError>(())
//! ```

/// Filter criteria.
pub mod criterion;
/// Reconstruction-engine collaborator interface.
pub mod engine;
/// Scalar and vector aliases.
pub mod math;
/// Quality metric provider.
pub mod metrics;
/// Camera optimization parameter set.
pub mod params;
/// The gradual-selection convergence loop.
pub mod selection;
/// Deterministic in-memory engine.
pub mod synthetic;
/// Adaptive threshold search.
pub mod threshold;

pub use criterion::FilterCriterion;
pub use engine::{
    CameraRecord, CameraReference, EngineError, EngineStat, FilterId, ReconstructionEngine,
};
pub use math::{Real, Vec3};
pub use metrics::QualitySnapshot;
pub use params::CameraOptParams;
pub use selection::{
    run_gradual_selection, AdaptiveWidening, CycleRecord, ReprojectionGoals, RoundTwoSummary,
    SelectionConfig, SelectionError, SelectionReport, StopReason,
};
pub use synthetic::SyntheticChunk;
pub use threshold::{SearchOutcome, ShrinkBudget, ThresholdSearch};
