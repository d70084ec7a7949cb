use std::{fs, path::Path};

use anyhow::{Context, Result};
use clap::Parser;
use log::info;

use gradsel_pipeline::{
    run_workflow, ProcessingLog, ProjectScenario, RefinementConfig, StagePlan, WorkflowReport,
};

/// Gradual-selection refinement workflow over a synthetic project scenario.
///
/// With no stage flags the whole workflow runs: align, the three
/// gradual-selection stages, dense cloud, and DEM/orthomosaic products.
#[derive(Debug, Parser)]
#[command(author, version, about = "Gradual-selection error reduction pipeline")]
struct Args {
    /// Path to a JSON project scenario.
    #[arg(long)]
    project: String,

    /// Optional path to a JSON RefinementConfig. Defaults are used if omitted.
    #[arg(long)]
    config: Option<String>,

    /// Run image alignment.
    #[arg(long)]
    align: bool,

    /// Run reconstruction-uncertainty gradual selection.
    #[arg(long)]
    ru: bool,

    /// Run projection-accuracy gradual selection.
    #[arg(long)]
    pa: bool,

    /// Run reprojection-error gradual selection.
    #[arg(long)]
    re: bool,

    /// Build and filter the dense point cloud.
    #[arg(long)]
    pcbuild: bool,

    /// Build DEM and orthomosaic products.
    #[arg(long)]
    build: bool,

    /// Override the reconstruction-uncertainty level.
    #[arg(long)]
    ru_level: Option<f64>,

    /// Override the projection-accuracy level.
    #[arg(long)]
    pa_level: Option<f64>,

    /// Override the reprojection-error level.
    #[arg(long)]
    re_level: Option<f64>,

    /// Restrict the run to one chunk by exact label.
    #[arg(long)]
    chunk: Option<String>,

    /// Append a plain-text processing log to this path.
    #[arg(long)]
    log: Option<String>,

    /// Write the JSON report here instead of stdout.
    #[arg(long)]
    output: Option<String>,
}

impl Args {
    fn plan(&self) -> StagePlan {
        let plan = StagePlan {
            align: self.align,
            reconstruction_uncertainty: self.ru,
            projection_accuracy: self.pa,
            reprojection_error: self.re,
            dense_cloud: self.pcbuild,
            products: self.build,
        };
        if plan.is_empty() {
            StagePlan::all()
        } else {
            plan
        }
    }

    fn config(&self) -> Result<RefinementConfig> {
        let mut config = match &self.config {
            Some(path) => RefinementConfig::from_json_file(Path::new(path))?,
            None => RefinementConfig::default(),
        };
        if let Some(level) = self.ru_level {
            config.ru_level = level;
        }
        if let Some(level) = self.pa_level {
            config.pa_level = level;
        }
        if let Some(level) = self.re_level {
            config.re_level = level;
        }
        Ok(config)
    }
}

fn load_scenario(path: &Path) -> Result<ProjectScenario> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("reading scenario {}", path.display()))?;
    serde_json::from_str(&data).with_context(|| format!("parsing scenario {}", path.display()))
}

fn run(args: &Args) -> Result<WorkflowReport> {
    let scenario = load_scenario(Path::new(&args.project))?;
    let mut project = scenario.build();
    let plan = args.plan();
    let config = args.config()?;
    let mut log = args.log.as_ref().map(ProcessingLog::new);

    info!(
        "running {} stages over {} chunks",
        plan.stages().len(),
        scenario.chunks.len()
    );
    Ok(run_workflow(
        &mut project,
        &plan,
        &config,
        args.chunk.as_deref(),
        log.as_mut(),
    ))
}

fn write_report(report: &WorkflowReport, output: Option<&str>) -> Result<()> {
    let json = serde_json::to_string_pretty(report)?;
    match output {
        Some(path) => fs::write(path, json)
            .with_context(|| format!("writing report {path}"))?,
        None => println!("{json}"),
    }
    Ok(())
}

fn try_main() -> Result<i32> {
    let args = Args::parse();
    let report = run(&args)?;
    write_report(&report, args.output.as_deref())?;
    if report.any_failed() {
        eprintln!(
            "{} of {} chunks failed",
            report.failed(),
            report.outcomes.len()
        );
        return Ok(1);
    }
    Ok(0)
}

fn main() {
    env_logger::init();
    match try_main() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err:#}");
            std::process::exit(1);
        }
    }
}
