//! Synthetic project scenarios.
//!
//! A JSON-loadable description of a [`SyntheticProject`], used by the CLI's
//! simulation mode and by integration tests: per-chunk point counts,
//! per-criterion score ranges, and a simple camera block.

use serde::{Deserialize, Serialize};

use gradsel_core::{CameraRecord, CameraReference, Real, SyntheticChunk, Vec3};

use crate::project::SyntheticProject;

fn default_points() -> usize {
    1000
}

fn default_ru_scores() -> [Real; 2] {
    [0.0, 20.0]
}

fn default_pa_scores() -> [Real; 2] {
    [0.0, 6.0]
}

fn default_re_scores() -> [Real; 2] {
    [0.0, 1.0]
}

fn default_sigma() -> Real {
    1.6
}

fn default_gain() -> Real {
    0.5
}

/// One synthetic chunk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkScenario {
    pub label: String,
    #[serde(default = "default_points")]
    pub points: usize,
    /// `[low, high]` score range per criterion; scores are spread evenly.
    #[serde(default = "default_ru_scores")]
    pub ru_scores: [Real; 2],
    #[serde(default = "default_pa_scores")]
    pub pa_scores: [Real; 2],
    #[serde(default = "default_re_scores")]
    pub re_scores: [Real; 2],
    /// Sigma-naught reported after the first optimization.
    #[serde(default = "default_sigma")]
    pub initial_sigma: Real,
    /// Residual shrink factor per optimization.
    #[serde(default = "default_gain")]
    pub optimize_gain: Real,
    /// Whether alignment has already been run on the chunk.
    #[serde(default)]
    pub aligned: bool,
    /// Number of cameras with reference positions.
    #[serde(default)]
    pub cameras: usize,
    /// Vertical offset between measured and estimated camera positions.
    #[serde(default)]
    pub camera_vertical_error: Real,
    /// Declared vertical reference accuracy.
    #[serde(default)]
    pub camera_vertical_accuracy: Real,
    /// Camera group names (one dense build per group).
    #[serde(default)]
    pub camera_groups: Vec<String>,
}

impl ChunkScenario {
    fn build_engine(&self) -> SyntheticChunk {
        let mut chunk = SyntheticChunk::from_ranges(
            self.points,
            self.ru_scores,
            self.pa_scores,
            self.re_scores,
        )
        .with_initial_sigma(self.initial_sigma)
        .with_optimize_gain(self.optimize_gain)
        .with_cameras(self.build_cameras());
        if !self.aligned {
            chunk = chunk.pending_alignment();
        }
        chunk
    }

    fn build_cameras(&self) -> Vec<CameraRecord> {
        (0..self.cameras)
            .map(|i| {
                let estimated = Vec3::new(i as Real * 50.0, 0.0, 120.0);
                CameraRecord {
                    estimated: Some(estimated),
                    reference: Some(CameraReference {
                        location: estimated + Vec3::new(0.0, 0.0, self.camera_vertical_error),
                        enabled: true,
                        accuracy: Some(Vec3::new(
                            0.05,
                            0.05,
                            self.camera_vertical_accuracy,
                        )),
                    }),
                }
            })
            .collect()
    }
}

/// A whole synthetic project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectScenario {
    pub chunks: Vec<ChunkScenario>,
}

impl ProjectScenario {
    pub fn build(&self) -> SyntheticProject {
        let mut project = SyntheticProject::new();
        for chunk in &self.chunks {
            project.add_chunk_with_groups(
                &chunk.label,
                chunk.build_engine(),
                chunk.camera_groups.clone(),
            );
        }
        project
    }
}
