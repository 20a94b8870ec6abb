use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use bs_runner::{init_logging, Experiment, ProvisionReport, VariantAggregation};
use clap::{Parser, Subcommand};
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "batchsweep", version, about = "Hyperparameter sweeps over batch-scheduled trials")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the experiment tree with one job description per trial
    Provision {
        experiment: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Copy job outputs from scratch storage into the trial directories
    Collect {
        experiment: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Summarise trial results into CSV files
    Aggregate {
        experiment: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Spread the remaining configurations across launch templates
    Retarget {
        experiment: PathBuf,
        /// Last configuration that keeps its current launch file
        #[arg(long)]
        resume_after: Option<String>,
        #[arg(long = "template", required = true)]
        templates: Vec<PathBuf>,
        #[arg(long)]
        json: bool,
    },
    /// List configuration identifiers with their resolved values
    Plan {
        experiment: PathBuf,
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    if let Some(payload) = run_command(cli.command)? {
        println!("{}", serde_json::to_string_pretty(&payload)?);
    }
    Ok(())
}

fn load(path: &Path) -> Result<Experiment> {
    Experiment::from_file(path).with_context(|| format!("loading experiment {}", path.display()))
}

fn run_command(command: Commands) -> Result<Option<Value>> {
    match command {
        Commands::Provision { experiment, json } => {
            let report = load(&experiment)?.provision().context("provisioning")?;
            if json {
                return Ok(Some(provision_to_json(&report)));
            }
            println!("run_id: {}", report.run_id);
            println!("configurations: {}", report.provisioned.len());
            println!("trials: {}", report.trial_count());
            for failure in &report.failed {
                println!("failed: {} ({})", failure.configuration, failure.error);
            }
        }
        Commands::Collect { experiment, json } => {
            let report = load(&experiment)?.collect().context("collecting job outputs")?;
            if json {
                return Ok(Some(serde_json::to_value(&report)?));
            }
            println!("run_id: {}", report.run_id);
            println!("jobs: {}", report.pairs);
            println!("collected: {}", report.collected.len());
            println!("files: {}", report.files_copied());
            for skip in &report.skipped {
                let job = skip.job_id.as_ref().map(|id| id.to_string()).unwrap_or_default();
                println!("skipped: {} {} ({})", job, skip.trial.display(), skip.reason);
            }
        }
        Commands::Aggregate { experiment, json } => {
            let reports = load(&experiment)?.aggregate().context("aggregating results")?;
            if json {
                return Ok(Some(serde_json::to_value(&reports)?));
            }
            reports.iter().for_each(print_aggregation);
        }
        Commands::Retarget {
            experiment,
            resume_after,
            templates,
            json,
        } => {
            let assignments = load(&experiment)?
                .retarget(resume_after.as_deref(), &templates)
                .context("retargeting launch templates")?;
            let rows: Vec<Value> = assignments
                .iter()
                .map(|a| json!({"configuration": a.configuration, "template": a.template}))
                .collect();
            if json {
                return Ok(Some(json!({ "assignments": rows })));
            }
            for assignment in &assignments {
                println!("{} -> {}", assignment.configuration, assignment.template.display());
            }
        }
        Commands::Plan { experiment, json } => {
            let experiment = load(&experiment)?;
            let plan = experiment.plan()?;
            if json {
                return Ok(Some(json!({
                    "name": experiment.config().name,
                    "size": plan.len(),
                    "trial_count": experiment.config().trial_count,
                    "configurations": plan,
                })));
            }
            for entry in &plan {
                let values: Vec<String> = entry
                    .values
                    .iter()
                    .map(|(key, value)| format!("{key}={value}"))
                    .collect();
                println!("{} {}", entry.configuration, values.join(" "));
            }
        }
    }
    Ok(None)
}

fn provision_to_json(report: &ProvisionReport) -> Value {
    json!({
        "run_id": report.run_id,
        "started_at": report.started_at,
        "finished_at": report.finished_at,
        "provisioned": report
            .provisioned
            .iter()
            .map(|p| json!({"configuration": p.configuration, "dir": p.dir, "trials": p.trial_dirs.len()}))
            .collect::<Vec<_>>(),
        "failed": report.failed,
    })
}

fn print_aggregation(aggregation: &VariantAggregation) {
    let report = &aggregation.report;
    if let Some(variant) = &aggregation.variant {
        println!("variant: {}", variant);
    }
    println!("run_id: {}", report.run_id);
    println!("records: {}", report.records.len());
    println!("successful: {}", report.success_count());
    println!("skipped: {}", report.skipped.len());
    println!("summary: {}", report.summary_path.display());
    println!("parameter_summary: {}", report.parameter_summary_path.display());
}
