//! Project and chunk management.
//!
//! [`Project`] abstracts the reconstruction engine's document: labelled
//! chunks, stage-isolation copies, and the long-running call-throughs
//! (alignment, dense cloud, raster products) the orchestrator sequences
//! around the refinement core. Chunks are addressed by explicit
//! [`ChunkId`] handles; there is no ambient "active chunk".

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use gradsel_core::{Real, ReconstructionEngine};

/// Opaque chunk handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChunkId(u64);

impl ChunkId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChunkId({})", self.0)
    }
}

/// Chunk lookup or call-through failure.
#[derive(Debug, Error)]
pub enum ProjectError {
    #[error("no chunk labelled {0:?}")]
    NotFound(String),
    /// Duplicate labels make name-based stage resumption unsafe.
    #[error("{count} chunks share the label {label:?}")]
    Ambiguous { label: String, count: usize },
    #[error("unknown chunk {0}")]
    UnknownChunk(ChunkId),
    #[error("chunk {label:?}: {message}")]
    InvalidState { label: String, message: String },
    #[error("project backend failure: {0}")]
    Backend(String),
}

/// Image alignment options (call-through to the engine's matcher).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlignmentOptions {
    /// 0 = highest, 4 = lowest.
    pub downscale: u32,
    pub generic_preselection: bool,
    pub reference_preselection: bool,
    pub keypoint_limit: u32,
    pub tiepoint_limit: u32,
    pub guided_matching: bool,
    pub reset_matches: bool,
}

impl Default for AlignmentOptions {
    fn default() -> Self {
        Self {
            downscale: 1,
            generic_preselection: true,
            reference_preselection: true,
            keypoint_limit: 60_000,
            tiepoint_limit: 10_000,
            guided_matching: true,
            reset_matches: true,
        }
    }
}

/// Depth-map filtering strength for dense reconstruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DepthFiltering {
    Disabled,
    Mild,
    Moderate,
    Aggressive,
}

/// Dense point cloud build options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DenseCloudOptions {
    pub downscale: u32,
    pub depth_filtering: DepthFiltering,
}

impl Default for DenseCloudOptions {
    fn default() -> Self {
        Self {
            downscale: 2,
            depth_filtering: DepthFiltering::Mild,
        }
    }
}

/// DEM and orthomosaic build options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RasterOptions {
    /// 0 = native resolution.
    pub dem_resolution: Real,
    pub ortho_resolution: Real,
}

impl Default for RasterOptions {
    fn default() -> Self {
        Self {
            dem_resolution: 0.0,
            ortho_resolution: 0.0,
        }
    }
}

/// Product export options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportOptions {
    pub directory: String,
    pub dem: bool,
    pub ortho: bool,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            directory: ".".into(),
            dem: true,
            ortho: true,
        }
    }
}

/// The project/document abstraction the workflow runner operates on.
///
/// Alignment, dense reconstruction, and raster building are engine-owned,
/// possibly long-running blocking work; the orchestrator only sequences
/// them. Refinement stages reach the chunk's engine through
/// [`Project::engine_mut`].
pub trait Project {
    type Engine: ReconstructionEngine;

    /// Handles of every chunk, in document order.
    fn chunk_ids(&self) -> Vec<ChunkId>;

    fn label(&self, id: ChunkId) -> Result<&str, ProjectError>;

    /// Find a chunk by exact label. Zero matches is `NotFound`; two or
    /// more is `Ambiguous`.
    fn find_chunk(&self, label: &str) -> Result<ChunkId, ProjectError>;

    /// Copy a chunk under a new label. Stage isolation: every refinement
    /// stage works on a copy.
    fn duplicate_chunk(&mut self, id: ChunkId, new_label: &str) -> Result<ChunkId, ProjectError>;

    fn rename_chunk(&mut self, id: ChunkId, label: &str) -> Result<(), ProjectError>;

    fn engine(&self, id: ChunkId) -> Result<&Self::Engine, ProjectError>;

    fn engine_mut(&mut self, id: ChunkId) -> Result<&mut Self::Engine, ProjectError>;

    /// Match photos and triangulate the tie-point cloud.
    fn align_chunk(&mut self, id: ChunkId, opts: &AlignmentOptions) -> Result<(), ProjectError>;

    fn build_dense_cloud(
        &mut self,
        id: ChunkId,
        opts: &DenseCloudOptions,
    ) -> Result<(), ProjectError>;

    /// Remove dense points with confidence in `[0, max_confidence]` and
    /// reset the dense filters afterwards.
    fn filter_dense_cloud(&mut self, id: ChunkId, max_confidence: u32) -> Result<(), ProjectError>;

    /// Build the DEM, then the orthomosaic on top of it.
    fn build_products(&mut self, id: ChunkId, opts: &RasterOptions) -> Result<(), ProjectError>;

    fn export_products(&mut self, id: ChunkId, opts: &ExportOptions) -> Result<(), ProjectError>;

    /// Camera group names present in the chunk (one dense build per group).
    fn camera_groups(&self, id: ChunkId) -> Result<Vec<String>, ProjectError>;

    /// Drop every camera not in the given group.
    fn retain_camera_group(&mut self, id: ChunkId, group: &str) -> Result<(), ProjectError>;

    /// Persist the document.
    fn save(&mut self) -> Result<(), ProjectError>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Synthetic project
// ─────────────────────────────────────────────────────────────────────────────

use gradsel_core::SyntheticChunk;

/// Bookkeeping flags of one synthetic chunk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkState {
    pub dense_built: bool,
    pub dense_filtered: bool,
    pub products_built: bool,
    pub products_exported: bool,
}

#[derive(Debug, Clone)]
struct Entry {
    id: ChunkId,
    label: String,
    engine: SyntheticChunk,
    state: ChunkState,
    groups: Vec<String>,
}

/// In-memory [`Project`] over [`SyntheticChunk`]s, for tests, examples,
/// and the CLI's simulation mode.
#[derive(Debug, Default)]
pub struct SyntheticProject {
    entries: Vec<Entry>,
    next: u64,
    saves: usize,
}

impl SyntheticProject {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a chunk with no camera groups.
    pub fn add_chunk(&mut self, label: &str, engine: SyntheticChunk) -> ChunkId {
        self.add_chunk_with_groups(label, engine, Vec::new())
    }

    pub fn add_chunk_with_groups(
        &mut self,
        label: &str,
        engine: SyntheticChunk,
        groups: Vec<String>,
    ) -> ChunkId {
        let id = ChunkId::new(self.next);
        self.next += 1;
        self.entries.push(Entry {
            id,
            label: label.to_string(),
            engine,
            state: ChunkState::default(),
            groups,
        });
        id
    }

    /// Bookkeeping flags of a chunk.
    pub fn state(&self, id: ChunkId) -> Result<ChunkState, ProjectError> {
        Ok(self.entry(id)?.state)
    }

    /// Every chunk label, in document order.
    pub fn labels(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.label.clone()).collect()
    }

    /// Number of `save` calls so far.
    pub fn saves(&self) -> usize {
        self.saves
    }

    fn entry(&self, id: ChunkId) -> Result<&Entry, ProjectError> {
        self.entries
            .iter()
            .find(|e| e.id == id)
            .ok_or(ProjectError::UnknownChunk(id))
    }

    fn entry_mut(&mut self, id: ChunkId) -> Result<&mut Entry, ProjectError> {
        self.entries
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or(ProjectError::UnknownChunk(id))
    }
}

impl Project for SyntheticProject {
    type Engine = SyntheticChunk;

    fn chunk_ids(&self) -> Vec<ChunkId> {
        self.entries.iter().map(|e| e.id).collect()
    }

    fn label(&self, id: ChunkId) -> Result<&str, ProjectError> {
        Ok(&self.entry(id)?.label)
    }

    fn find_chunk(&self, label: &str) -> Result<ChunkId, ProjectError> {
        let matches: Vec<ChunkId> = self
            .entries
            .iter()
            .filter(|e| e.label == label)
            .map(|e| e.id)
            .collect();
        match matches.len() {
            0 => Err(ProjectError::NotFound(label.to_string())),
            1 => Ok(matches[0]),
            count => Err(ProjectError::Ambiguous {
                label: label.to_string(),
                count,
            }),
        }
    }

    fn duplicate_chunk(&mut self, id: ChunkId, new_label: &str) -> Result<ChunkId, ProjectError> {
        let source = self.entry(id)?.clone();
        let new_id = ChunkId::new(self.next);
        self.next += 1;
        self.entries.push(Entry {
            id: new_id,
            label: new_label.to_string(),
            ..source
        });
        Ok(new_id)
    }

    fn rename_chunk(&mut self, id: ChunkId, label: &str) -> Result<(), ProjectError> {
        self.entry_mut(id)?.label = label.to_string();
        Ok(())
    }

    fn engine(&self, id: ChunkId) -> Result<&SyntheticChunk, ProjectError> {
        Ok(&self.entry(id)?.engine)
    }

    fn engine_mut(&mut self, id: ChunkId) -> Result<&mut SyntheticChunk, ProjectError> {
        Ok(&mut self.entry_mut(id)?.engine)
    }

    fn align_chunk(&mut self, id: ChunkId, _opts: &AlignmentOptions) -> Result<(), ProjectError> {
        self.entry_mut(id)?.engine.mark_aligned();
        Ok(())
    }

    fn build_dense_cloud(
        &mut self,
        id: ChunkId,
        _opts: &DenseCloudOptions,
    ) -> Result<(), ProjectError> {
        let entry = self.entry_mut(id)?;
        if !entry.engine.has_tie_points() {
            return Err(ProjectError::InvalidState {
                label: entry.label.clone(),
                message: "dense reconstruction needs an aligned tie point cloud".into(),
            });
        }
        entry.state.dense_built = true;
        Ok(())
    }

    fn filter_dense_cloud(&mut self, id: ChunkId, _max_confidence: u32) -> Result<(), ProjectError> {
        let entry = self.entry_mut(id)?;
        if !entry.state.dense_built {
            return Err(ProjectError::InvalidState {
                label: entry.label.clone(),
                message: "no dense point cloud to filter".into(),
            });
        }
        entry.state.dense_filtered = true;
        Ok(())
    }

    fn build_products(&mut self, id: ChunkId, _opts: &RasterOptions) -> Result<(), ProjectError> {
        let entry = self.entry_mut(id)?;
        if !entry.state.dense_built {
            return Err(ProjectError::InvalidState {
                label: entry.label.clone(),
                message: "raster products need a dense point cloud".into(),
            });
        }
        entry.state.products_built = true;
        Ok(())
    }

    fn export_products(&mut self, id: ChunkId, _opts: &ExportOptions) -> Result<(), ProjectError> {
        let entry = self.entry_mut(id)?;
        if !entry.state.products_built {
            return Err(ProjectError::InvalidState {
                label: entry.label.clone(),
                message: "no products to export".into(),
            });
        }
        entry.state.products_exported = true;
        Ok(())
    }

    fn camera_groups(&self, id: ChunkId) -> Result<Vec<String>, ProjectError> {
        Ok(self.entry(id)?.groups.clone())
    }

    fn retain_camera_group(&mut self, id: ChunkId, group: &str) -> Result<(), ProjectError> {
        let entry = self.entry_mut(id)?;
        if !entry.groups.iter().any(|g| g == group) {
            return Err(ProjectError::InvalidState {
                label: entry.label.clone(),
                message: format!("no camera group named {group:?}"),
            });
        }
        entry.groups.retain(|g| g == group);
        Ok(())
    }

    fn save(&mut self) -> Result<(), ProjectError> {
        self.saves += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn project_with(labels: &[&str]) -> SyntheticProject {
        let mut project = SyntheticProject::new();
        for label in labels {
            project.add_chunk(label, SyntheticChunk::uniform(100, 0.0, 10.0));
        }
        project
    }

    #[test]
    fn find_chunk_by_label() {
        let project = project_with(&["Raw_Photos", "Raw_Photos_Align"]);
        let id = project.find_chunk("Raw_Photos_Align").unwrap();
        assert_eq!(project.label(id).unwrap(), "Raw_Photos_Align");
    }

    #[test]
    fn missing_label_is_not_found() {
        let project = project_with(&["Raw_Photos"]);
        assert!(matches!(
            project.find_chunk("Nope"),
            Err(ProjectError::NotFound(_))
        ));
    }

    #[test]
    fn duplicate_labels_are_ambiguous() {
        let project = project_with(&["A", "A"]);
        assert!(matches!(
            project.find_chunk("A"),
            Err(ProjectError::Ambiguous { count: 2, .. })
        ));
    }

    #[test]
    fn duplicate_chunk_copies_state_under_new_label() {
        let mut project = project_with(&["Base"]);
        let base = project.find_chunk("Base").unwrap();
        let copy = project.duplicate_chunk(base, "Base_Align").unwrap();
        assert_ne!(base, copy);
        assert_eq!(project.label(copy).unwrap(), "Base_Align");
        assert_eq!(
            project.engine(copy).unwrap().valid_points(),
            project.engine(base).unwrap().valid_points()
        );
    }

    #[test]
    fn call_through_order_is_enforced() {
        let mut project = SyntheticProject::new();
        let id = project.add_chunk(
            "Chunk",
            SyntheticChunk::uniform(100, 0.0, 10.0).pending_alignment(),
        );
        assert!(matches!(
            project.build_dense_cloud(id, &DenseCloudOptions::default()),
            Err(ProjectError::InvalidState { .. })
        ));
        project.align_chunk(id, &AlignmentOptions::default()).unwrap();
        project
            .build_dense_cloud(id, &DenseCloudOptions::default())
            .unwrap();
        assert!(matches!(
            project.export_products(id, &ExportOptions::default()),
            Err(ProjectError::InvalidState { .. })
        ));
        project.build_products(id, &RasterOptions::default()).unwrap();
        project.export_products(id, &ExportOptions::default()).unwrap();
        let state = project.state(id).unwrap();
        assert!(state.dense_built && state.products_built && state.products_exported);
    }
}
