//! Workflow runner.
//!
//! Sequences the planned stages over every root chunk of a project. Each
//! refinement stage works on a freshly duplicated chunk whose label encodes
//! the stage and level (`<base>_Align`, `<base>_RU10`, `<base>_PA3`,
//! `<base>_RE0.3_TPA0.1`, dense copies suffixed `_PostError` /
//! `_PCFiltered`), so a re-run finds existing stage chunks and resumes
//! instead of duplicating work. A failed stage skips the chunk's remaining
//! stages; the workflow proceeds to the next chunk and reports per-unit
//! outcomes instead of aborting.

use anyhow::{bail, Context, Result};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::time::Instant;

use gradsel_core::{run_gradual_selection, ReconstructionEngine, SelectionConfig, SelectionReport};

use crate::config::RefinementConfig;
use crate::proclog::ProcessingLog;
use crate::project::{ChunkId, Project, ProjectError};
use crate::stages::{Stage, StagePlan};

/// How one stage of one chunk ended.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StageStatus {
    /// A gradual-selection stage completed.
    Refined(SelectionReport),
    /// A call-through stage (align, dense, products) completed.
    CallThrough,
    /// The stage did not need to run.
    Skipped { reason: String },
    Failed { message: String },
}

impl StageStatus {
    pub fn is_failed(&self) -> bool {
        matches!(self, StageStatus::Failed { .. })
    }
}

/// One executed (or skipped) stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageRecord {
    pub stage: Stage,
    pub status: StageStatus,
    /// Wall-clock duration.
    pub seconds: f64,
}

/// All stage records of one root chunk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkOutcome {
    pub label: String,
    pub records: Vec<StageRecord>,
}

impl ChunkOutcome {
    pub fn failed(&self) -> bool {
        self.records.iter().any(|r| r.status.is_failed())
    }

    /// The selection report of a refinement stage, if it ran.
    pub fn report_for(&self, stage: Stage) -> Option<&SelectionReport> {
        self.records.iter().find_map(|r| match (&r.status, r.stage) {
            (StageStatus::Refined(report), s) if s == stage => Some(report),
            _ => None,
        })
    }
}

/// Per-unit outcomes of a whole workflow run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowReport {
    pub outcomes: Vec<ChunkOutcome>,
}

impl WorkflowReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| !o.failed()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.failed()).count()
    }

    pub fn any_failed(&self) -> bool {
        self.failed() > 0
    }
}

/// Working position of one chunk's run through the stages.
struct ChunkCtx {
    current: ChunkId,
    /// `_PCFiltered` chunks produced by the dense stage, consumed by the
    /// products stage.
    filtered: Vec<ChunkId>,
}

/// Run the planned stages over every root chunk (chunks present when the
/// run starts; stage copies created along the way are not revisited).
///
/// `chunk_filter` restricts the run to one root chunk by exact label.
pub fn run_workflow<P: Project>(
    project: &mut P,
    plan: &StagePlan,
    config: &RefinementConfig,
    chunk_filter: Option<&str>,
    mut log: Option<&mut ProcessingLog>,
) -> WorkflowReport {
    let roots: Vec<ChunkId> = project
        .chunk_ids()
        .into_iter()
        .filter(|&id| match chunk_filter {
            Some(label) => project.label(id).map(|l| l == label).unwrap_or(false),
            None => true,
        })
        .collect();

    let mut outcomes = Vec::with_capacity(roots.len());
    for id in roots {
        outcomes.push(run_chunk(project, id, plan, config, log.as_deref_mut()));
    }
    WorkflowReport { outcomes }
}

fn run_chunk<P: Project>(
    project: &mut P,
    id: ChunkId,
    plan: &StagePlan,
    config: &RefinementConfig,
    mut log: Option<&mut ProcessingLog>,
) -> ChunkOutcome {
    let label = project
        .label(id)
        .map(str::to_string)
        .unwrap_or_else(|_| format!("{id}"));
    info!("workflow: processing chunk {label:?}");

    let mut ctx = ChunkCtx {
        current: id,
        filtered: Vec::new(),
    };
    let stages = plan.stages();
    let mut records = Vec::with_capacity(stages.len());
    let mut failed = false;

    for stage in stages {
        if failed {
            records.push(StageRecord {
                stage,
                status: StageStatus::Skipped {
                    reason: "earlier stage failed".into(),
                },
                seconds: 0.0,
            });
            continue;
        }
        let start = Instant::now();
        let status = run_stage(project, &mut ctx, stage, config, log.as_deref_mut())
            .unwrap_or_else(|err| {
                warn!("workflow: {stage} failed on chunk {label:?}: {err:#}");
                StageStatus::Failed {
                    message: format!("{err:#}"),
                }
            });
        failed = status.is_failed();
        records.push(StageRecord {
            stage,
            status,
            seconds: start.elapsed().as_secs_f64(),
        });
    }

    ChunkOutcome { label, records }
}

/// Find an existing stage chunk by label or duplicate the source under it.
/// Returns the chunk and whether it already existed.
fn stage_chunk<P: Project>(
    project: &mut P,
    source: ChunkId,
    label: &str,
) -> Result<(ChunkId, bool), ProjectError> {
    match project.find_chunk(label) {
        Ok(existing) => Ok((existing, true)),
        Err(ProjectError::NotFound(_)) => Ok((project.duplicate_chunk(source, label)?, false)),
        Err(err) => Err(err),
    }
}

fn run_stage<P: Project>(
    project: &mut P,
    ctx: &mut ChunkCtx,
    stage: Stage,
    config: &RefinementConfig,
    log: Option<&mut ProcessingLog>,
) -> Result<StageStatus> {
    match stage {
        Stage::Align => run_align(project, ctx, config),
        Stage::ReconstructionUncertainty | Stage::ProjectionAccuracy | Stage::ReprojectionError => {
            run_refinement(project, ctx, stage, config, log)
        }
        Stage::DenseCloud => run_dense_cloud(project, ctx, config),
        Stage::Products => run_products(project, ctx, config),
    }
}

fn run_align<P: Project>(
    project: &mut P,
    ctx: &mut ChunkCtx,
    config: &RefinementConfig,
) -> Result<StageStatus> {
    let label = project.label(ctx.current)?.to_string();
    let target_label = format!("{label}_Align");
    let (target, existed) = stage_chunk(project, ctx.current, &target_label)?;
    ctx.current = target;
    if existed {
        info!("workflow: reusing existing chunk {target_label:?}");
        return Ok(StageStatus::Skipped {
            reason: format!("chunk {target_label:?} already exists"),
        });
    }
    project
        .align_chunk(target, &config.alignment)
        .with_context(|| format!("aligning {target_label:?}"))?;
    project.save()?;
    Ok(StageStatus::CallThrough)
}

fn run_refinement<P: Project>(
    project: &mut P,
    ctx: &mut ChunkCtx,
    stage: Stage,
    config: &RefinementConfig,
    log: Option<&mut ProcessingLog>,
) -> Result<StageStatus> {
    let source_label = project.label(ctx.current)?.to_string();
    if !project.engine(ctx.current)?.has_tie_points() {
        bail!("chunk {source_label:?} has no tie point cloud; run alignment first");
    }

    let (selection, target_label): (SelectionConfig, String) = match stage {
        Stage::ReconstructionUncertainty => (
            config.ru_selection(),
            format!("{source_label}_RU{}", config.ru_level),
        ),
        Stage::ProjectionAccuracy => (
            config.pa_selection(),
            format!("{source_label}_PA{}", config.pa_level),
        ),
        Stage::ReprojectionError => (
            config.re_selection(),
            format!(
                "{source_label}_RE{}_TPA{}",
                config.re_level, config.re_round2_tie_point_accuracy
            ),
        ),
        _ => unreachable!("not a refinement stage"),
    };

    let (target, existed) = stage_chunk(project, ctx.current, &target_label)?;
    ctx.current = target;
    if existed {
        info!("workflow: reusing existing chunk {target_label:?}");
        return Ok(StageStatus::Skipped {
            reason: format!("chunk {target_label:?} already exists"),
        });
    }

    let start = Instant::now();
    let report = run_gradual_selection(project.engine_mut(target)?, &selection)
        .with_context(|| format!("{stage} on {target_label:?}"))?;
    let seconds = start.elapsed().as_secs_f64();

    if let Some(log) = log {
        for cycle in &report.trace {
            log.cycle(cycle);
        }
        log.selection_summary(&target_label, &report, &selection.params, seconds);
    }
    project.save()?;
    Ok(StageStatus::Refined(report))
}

fn run_dense_cloud<P: Project>(
    project: &mut P,
    ctx: &mut ChunkCtx,
    config: &RefinementConfig,
) -> Result<StageStatus> {
    let label = project.label(ctx.current)?.to_string();
    if !project.engine(ctx.current)?.has_tie_points() {
        bail!("chunk {label:?} has no tie point cloud; run alignment first");
    }

    let groups = project.camera_groups(ctx.current)?;
    // one dense build per camera group, or a single build when ungrouped
    let targets: Vec<(Option<String>, String)> = if groups.is_empty() {
        vec![(None, format!("{label}_PostError"))]
    } else {
        groups
            .into_iter()
            .map(|g| {
                let post = format!("{label}_{g}_PostError");
                (Some(g), post)
            })
            .collect()
    };

    for (group, post_label) in targets {
        let (post, existed) = stage_chunk(project, ctx.current, &post_label)?;
        if !existed {
            if let Some(group) = &group {
                project
                    .retain_camera_group(post, group)
                    .with_context(|| format!("splitting group {group:?} into {post_label:?}"))?;
            }
            project
                .build_dense_cloud(post, &config.dense_cloud)
                .with_context(|| format!("building dense cloud on {post_label:?}"))?;
        }

        let filtered_label = format!("{post_label}_PCFiltered");
        let (filtered, existed) = stage_chunk(project, post, &filtered_label)?;
        if !existed {
            project
                .filter_dense_cloud(filtered, config.max_confidence)
                .with_context(|| format!("filtering dense cloud on {filtered_label:?}"))?;
        }
        ctx.filtered.push(filtered);
    }

    project.save()?;
    Ok(StageStatus::CallThrough)
}

fn run_products<P: Project>(
    project: &mut P,
    ctx: &mut ChunkCtx,
    config: &RefinementConfig,
) -> Result<StageStatus> {
    // resume case: pick up filtered chunks from an earlier run
    let targets: Vec<ChunkId> = if ctx.filtered.is_empty() {
        let base = project.label(ctx.current)?.to_string();
        project
            .chunk_ids()
            .into_iter()
            .filter(|&id| {
                project
                    .label(id)
                    .map(|l| l.starts_with(&base) && l.ends_with("_PCFiltered"))
                    .unwrap_or(false)
            })
            .collect()
    } else {
        ctx.filtered.clone()
    };

    if targets.is_empty() {
        bail!("no filtered point cloud chunks to build products from");
    }

    for id in targets {
        let label = project.label(id)?.to_string();
        project
            .build_products(id, &config.raster)
            .with_context(|| format!("building DEM/orthomosaic on {label:?}"))?;
        if let Some(export) = &config.export {
            project
                .export_products(id, export)
                .with_context(|| format!("exporting products of {label:?}"))?;
        }
    }

    project.save()?;
    Ok(StageStatus::CallThrough)
}
