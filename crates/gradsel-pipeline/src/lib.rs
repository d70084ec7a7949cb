//! Pipeline orchestration for gradual-selection error reduction.
//!
//! This crate sequences the photogrammetric refinement workflow around
//! `gradsel-core`: per-chunk stage execution (align → reconstruction
//! uncertainty → projection accuracy → reprojection error → dense cloud →
//! DEM/orthomosaic products), stage-isolation chunk copies with
//! label-encoded levels, a plain-text processing log, and per-unit outcome
//! reports.
//!
//! The project/document side of the reconstruction engine is abstracted by
//! the [`Project`] trait; [`SyntheticProject`] is an in-memory
//! implementation driven by JSON [`scenario`]s for tests and the CLI's
//! simulation mode.
//!
//! ```
//! use gradsel_pipeline::{
//!     run_workflow, RefinementConfig, StagePlan, SyntheticProject,
//! };
//! use gradsel_core::SyntheticChunk;
//!
//! let mut project = SyntheticProject::new();
//! project.add_chunk(
//!     "Raw_Photos",
//!     SyntheticChunk::uniform(1000, 0.0, 20.0).pending_alignment(),
//! );
//! let report = run_workflow(
//!     &mut project,
//!     &StagePlan::all(),
//!     &RefinementConfig::default(),
//!     None,
//!     None,
//! );
//! assert_eq!(report.failed(), 0);
//! ```

/// Workflow configuration and production defaults.
pub mod config;
/// Append-only processing log.
pub mod proclog;
/// Project/chunk management.
pub mod project;
/// JSON-loadable synthetic project scenarios.
pub mod scenario;
/// Workflow stages and the stage plan.
pub mod stages;
/// The workflow runner.
pub mod workflow;

pub use config::RefinementConfig;
pub use proclog::ProcessingLog;
pub use project::{
    AlignmentOptions, ChunkId, ChunkState, DenseCloudOptions, DepthFiltering, ExportOptions,
    Project, ProjectError, RasterOptions, SyntheticProject,
};
pub use scenario::{ChunkScenario, ProjectScenario};
pub use stages::{Stage, StagePlan};
pub use workflow::{
    run_workflow, ChunkOutcome, StageRecord, StageStatus, WorkflowReport,
};
