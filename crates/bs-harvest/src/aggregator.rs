use std::fs;
use std::path::{Path, PathBuf};

use bs_provision::{ensure_clean_dir, ExperimentLayout};
use bs_space::ParameterSpace;
use bs_types::{classify_success, ConfigurationId, HarvestError, ResultRecord};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::artifact::{self, ArtifactLoader, ArtifactPattern, JsonSnapshotLoader, ParsedArtifact};
use crate::collaborators::{ExpressionNormalizer, Plotter, Simplifier};
use crate::summary::{ParameterBuckets, SummaryWriter};

/// Point a trial passed through during aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrialStage {
    NoArtifact,
    ArtifactFound,
    Parsed,
    Plotted,
    Recorded,
}

/// Stages one trial went through, in order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrialOutcome {
    pub configuration: ConfigurationId,
    pub trial: usize,
    pub stages: Vec<TrialStage>,
}

impl TrialOutcome {
    /// Furthest stage reached.
    pub fn reached(&self) -> Option<TrialStage> {
        self.stages.last().copied()
    }

    pub fn is_recorded(&self) -> bool {
        self.reached() == Some(TrialStage::Recorded)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregationSettings {
    pub artifact: ArtifactPattern,
    pub success_threshold: f64,
    pub summary_name: String,
    pub parameter_summary_name: String,
}

impl Default for AggregationSettings {
    fn default() -> Self {
        Self {
            artifact: ArtifactPattern::default(),
            success_threshold: 1e-12,
            summary_name: "results.csv".to_string(),
            parameter_summary_name: "param_fit.csv".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SkippedTrial {
    pub configuration: ConfigurationId,
    pub trial: usize,
    pub dir: PathBuf,
    pub stage: TrialStage,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AggregationReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub records: Vec<ResultRecord>,
    pub skipped: Vec<SkippedTrial>,
    /// One entry per visited trial, in visiting order.
    pub outcomes: Vec<TrialOutcome>,
    /// Configurations that do not belong to the parameter space.
    pub rejected: Vec<String>,
    pub simplification_fallbacks: usize,
    pub plots: Vec<PathBuf>,
    pub summary_path: PathBuf,
    pub parameter_summary_path: PathBuf,
}

impl AggregationReport {
    pub fn success_count(&self) -> usize {
        self.records.iter().filter(|r| r.success).count()
    }
}

/// Walks trial directories and turns result artifacts into summary rows.
pub struct ResultAggregator {
    space: ParameterSpace,
    settings: AggregationSettings,
    loader: Box<dyn ArtifactLoader>,
    simplifier: Box<dyn Simplifier>,
    plotter: Option<Box<dyn Plotter>>,
}

impl ResultAggregator {
    pub fn new(space: ParameterSpace, settings: AggregationSettings) -> Self {
        Self {
            space,
            settings,
            loader: Box::new(JsonSnapshotLoader),
            simplifier: Box::new(ExpressionNormalizer),
            plotter: None,
        }
    }

    pub fn with_loader(mut self, loader: Box<dyn ArtifactLoader>) -> Self {
        self.loader = loader;
        self
    }

    pub fn with_simplifier(mut self, simplifier: Box<dyn Simplifier>) -> Self {
        self.simplifier = simplifier;
        self
    }

    pub fn with_plotter(mut self, plotter: Box<dyn Plotter>) -> Self {
        self.plotter = Some(plotter);
        self
    }

    pub fn settings(&self) -> &AggregationSettings {
        &self.settings
    }

    pub fn locate_artifact(&self, trial_dir: &Path) -> Result<Option<PathBuf>, HarvestError> {
        artifact::locate_artifact(trial_dir, &self.settings.artifact)
    }

    pub fn parse(&self, artifact: &Path) -> Result<ParsedArtifact, HarvestError> {
        self.loader.load(artifact)
    }

    /// Simplified solution text, or `None` when the simplifier failed.
    pub fn simplify(&self, raw: &str) -> Option<String> {
        match self.simplifier.simplify(raw) {
            Ok(simplified) => Some(simplified),
            Err(e) => {
                warn!("{} failed, keeping raw solution: {}", self.simplifier.name(), e);
                None
            }
        }
    }

    pub fn classify_success(&self, fitness: f64) -> bool {
        classify_success(fitness, self.settings.success_threshold)
    }

    /// Aggregate every trial of `ids` under `layout`.
    ///
    /// Trial-level problems are recorded as skips. Only failures to write
    /// the summary files abort the run.
    pub fn run(&self, layout: &ExperimentLayout, ids: &[ConfigurationId]) -> Result<AggregationReport, HarvestError> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        info!(
            "Aggregating {} configurations x {} trials under {} (run {})",
            ids.len(),
            layout.trial_count(),
            layout.root().display(),
            run_id
        );

        let plots_dir = self.prepare_plots_dir(layout.root());
        let summary_path = layout.root().join(&self.settings.summary_name);
        let parameter_summary_path = layout.root().join(&self.settings.parameter_summary_name);
        let mut summary = SummaryWriter::create(&summary_path)?;
        let mut buckets = ParameterBuckets::new(&self.space);

        let mut records = Vec::new();
        let mut skipped = Vec::new();
        let mut outcomes = Vec::new();
        let mut rejected = Vec::new();
        let mut simplification_fallbacks = 0;
        let mut plots = Vec::new();

        for id in ids {
            let digits = match self.space.digits(id.as_str()) {
                Ok(digits) => digits,
                Err(e) => {
                    error!("Skipping configuration {}: {}", id, e);
                    rejected.push(id.to_string());
                    continue;
                }
            };

            for trial in 0..layout.trial_count() {
                let dir = layout.trial_dir(id, trial);
                let outcome = |stages: Vec<TrialStage>| TrialOutcome {
                    configuration: id.clone(),
                    trial,
                    stages,
                };
                let skip = |stage: TrialStage, reason: String| {
                    warn!("Skipping {} at {:?}: {}", dir.display(), stage, reason);
                    SkippedTrial {
                        configuration: id.clone(),
                        trial,
                        dir: dir.clone(),
                        stage,
                        reason,
                    }
                };

                let artifact = match self.locate_artifact(&dir) {
                    Ok(Some(artifact)) => artifact,
                    Ok(None) => {
                        let missing = HarvestError::ArtifactMissing { trial: dir.clone() };
                        skipped.push(skip(TrialStage::NoArtifact, missing.to_string()));
                        outcomes.push(outcome(vec![TrialStage::NoArtifact]));
                        continue;
                    }
                    Err(e) => {
                        skipped.push(skip(TrialStage::NoArtifact, e.to_string()));
                        outcomes.push(outcome(vec![TrialStage::NoArtifact]));
                        continue;
                    }
                };
                let mut stages = vec![TrialStage::ArtifactFound];

                let parsed = match self.parse(&artifact) {
                    Ok(parsed) => parsed,
                    Err(e) => {
                        skipped.push(skip(TrialStage::ArtifactFound, e.to_string()));
                        outcomes.push(outcome(stages));
                        continue;
                    }
                };
                stages.push(TrialStage::Parsed);

                let solution = self.simplify(&parsed.raw_solution).unwrap_or_else(|| {
                    simplification_fallbacks += 1;
                    parsed.raw_solution.clone()
                });

                if let (Some(plotter), Some(plots_dir)) = (&self.plotter, &plots_dir) {
                    let name = format!("{}_{}.png", id, trial);
                    if let Some(plot) = self.plot_trial(plotter.as_ref(), &artifact, &dir, &plots_dir.join(name)) {
                        stages.push(TrialStage::Plotted);
                        plots.push(plot);
                    }
                }

                let record = ResultRecord::new(
                    id.clone(),
                    trial,
                    parsed.fitness,
                    parsed.generations,
                    solution,
                    self.settings.success_threshold,
                );
                summary.append_record(&record)?;
                buckets.record(&digits, record.fitness);
                stages.push(TrialStage::Recorded);
                outcomes.push(outcome(stages));
                debug!(
                    "Recorded {} trial {}: fitness {:e}, success {}",
                    id, trial, record.fitness, record.success
                );
                records.push(record);
            }
        }

        buckets.write_csv(&parameter_summary_path)?;

        let report = AggregationReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            records,
            skipped,
            outcomes,
            rejected,
            simplification_fallbacks,
            plots,
            summary_path,
            parameter_summary_path,
        };
        info!(
            "Aggregation finished: {} records ({} successful), {} trials skipped",
            report.records.len(),
            report.success_count(),
            report.skipped.len()
        );
        Ok(report)
    }

    /// Recreate `root/plots` when a plotter is configured.
    fn prepare_plots_dir(&self, root: &Path) -> Option<PathBuf> {
        let plotter = self.plotter.as_ref()?;
        let dir = root.join("plots");
        match ensure_clean_dir(&dir) {
            Ok(()) => Some(dir),
            Err(e) => {
                warn!("Plotting with {} disabled for this run: {}", plotter.name(), e);
                None
            }
        }
    }

    fn plot_trial(&self, plotter: &dyn Plotter, artifact: &Path, trial_dir: &Path, dest: &Path) -> Option<PathBuf> {
        let image = match plotter.plot(artifact, trial_dir) {
            Ok(Some(image)) => image,
            Ok(None) => {
                debug!("{} produced no image for {}", plotter.name(), trial_dir.display());
                return None;
            }
            Err(e) => {
                warn!("{}", e);
                return None;
            }
        };
        match fs::copy(&image, dest) {
            Ok(_) => Some(dest.to_path_buf()),
            Err(e) => {
                let failure = HarvestError::PlotFailure {
                    message: format!("copying {} to {}: {}", image.display(), dest.display(), e),
                };
                warn!("{}", failure);
                None
            }
        }
    }
}
