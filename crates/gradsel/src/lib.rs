//! High-level entry crate for the `gradsel` error-reduction library.
//!
//! Gradual selection refines a photogrammetric sparse cloud by repeatedly
//! deleting the worst-scoring tie points and re-optimizing camera parameters
//! between deletion rounds. Three selection criteria are supported:
//! reconstruction uncertainty, projection accuracy, and reprojection error.
//!
//! # Quick Start
//!
//! ```
//! use gradsel::prelude::*;
//!
//! # fn main() -> Result<(), SelectionError> {
//! let mut chunk = SyntheticChunk::uniform(1000, 0.0, 20.0);
//! let config = SelectionConfig::reconstruction_uncertainty(10.0);
//! let report = run_gradual_selection(&mut chunk, &config)?;
//! assert_eq!(report.deleted, report.initial_points - report.final_points);
//! # Ok(())
//! # }
//! ```
//!
//! # Module Organization
//!
//! ## Selection Core
//!
//! - [`selection`] - The gradual-selection loop and its configuration
//! - [`threshold`] - Threshold search with adaptive increment shrinking
//! - [`metrics`] - Reconstruction quality metrics
//! - [`engine`] - The [`ReconstructionEngine`] backend abstraction
//!
//! ## Workflow
//!
//! - [`workflow`] - Multi-chunk stage orchestration with resume support
//! - [`config`] - JSON-loadable workflow configuration
//! - [`proclog`] - Plain-text processing log
//!
//! The common pattern for a whole-project run is:
//! 1. Implement [`Project`] for your backend (or build a [`SyntheticProject`])
//! 2. Pick the stages with a [`StagePlan`]
//! 3. Call [`run_workflow`] and inspect the [`WorkflowReport`]

/// The gradual-selection loop: configuration presets, the two-round
/// reprojection-error schedule, and per-cycle trace records.
pub mod selection {
    pub use gradsel_core::selection::{
        run_gradual_selection, AdaptiveWidening, CycleRecord, ReprojectionGoals, RoundTwoSummary,
        SelectionConfig, SelectionError, SelectionReport, StopReason,
    };
}

/// Threshold search over a selection criterion.
pub mod threshold {
    pub use gradsel_core::threshold::{SearchOutcome, ShrinkBudget, ThresholdSearch};
}

/// Reconstruction quality metrics and snapshots.
pub mod metrics {
    pub use gradsel_core::metrics::{
        mean_vertical_accuracy, rms_reprojection_error, rms_vertical_camera_error,
        unit_weight_sigma, QualitySnapshot,
    };
}

/// Backend abstraction over a reconstruction engine, plus the synthetic
/// engine used for testing and examples.
pub mod engine {
    pub use gradsel_core::engine::{
        CameraRecord, CameraReference, EngineError, EngineStat, FilterId, ReconstructionEngine,
    };
    pub use gradsel_core::synthetic::SyntheticChunk;
}

/// Multi-chunk workflow orchestration.
pub mod workflow {
    pub use gradsel_pipeline::project::{
        AlignmentOptions, ChunkId, ChunkState, DenseCloudOptions, DepthFiltering, ExportOptions,
        Project, ProjectError, RasterOptions, SyntheticProject,
    };
    pub use gradsel_pipeline::scenario::{ChunkScenario, ProjectScenario};
    pub use gradsel_pipeline::stages::{Stage, StagePlan};
    pub use gradsel_pipeline::workflow::{
        run_workflow, ChunkOutcome, StageRecord, StageStatus, WorkflowReport,
    };
}

/// Workflow configuration with JSON loading.
pub mod config {
    pub use gradsel_pipeline::config::RefinementConfig;
}

/// Plain-text processing log appended to across a run.
pub mod proclog {
    pub use gradsel_pipeline::proclog::ProcessingLog;
}

pub use engine::{ReconstructionEngine, SyntheticChunk};
pub use gradsel_core::criterion::FilterCriterion;
pub use gradsel_core::math::{Real, Vec3};
pub use gradsel_core::params::CameraOptParams;
pub use selection::{run_gradual_selection, SelectionConfig, SelectionError, SelectionReport};
pub use workflow::{run_workflow, Project, StagePlan, SyntheticProject, WorkflowReport};

/// Everything most callers need.
pub mod prelude {
    // Selection loop
    pub use crate::selection::{
        run_gradual_selection, ReprojectionGoals, SelectionConfig, SelectionError,
        SelectionReport, StopReason,
    };

    // Engine abstraction
    pub use crate::engine::{ReconstructionEngine, SyntheticChunk};

    // Workflow
    pub use crate::workflow::{
        run_workflow, Project, ProjectScenario, StagePlan, SyntheticProject, WorkflowReport,
    };

    // Common types
    pub use crate::config::RefinementConfig;
    pub use crate::{CameraOptParams, FilterCriterion, Real, Vec3};
}
