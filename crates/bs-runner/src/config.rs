use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use bs_harvest::{AggregationSettings, ArtifactPattern, JobDiscovery};
use bs_provision::ExperimentLayout;
use bs_space::{Dimension, Hyperparameters, JobDescription, ParameterSpace};
use bs_types::{config_error, validation_error, ConfigurationId, ParameterValue, SweepResult, TemplateError};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Overrides [`ExperimentConfig::root`].
pub const ROOT_ENV: &str = "BATCHSWEEP_ROOT";
/// Overrides [`ExperimentConfig::scratch_root`].
pub const SCRATCH_ENV: &str = "BATCHSWEEP_SCRATCH";
/// Log filter for the `batchsweep` binary.
pub const LOG_ENV: &str = "BATCHSWEEP_LOG";

/// Where the base job description comes from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TemplateSource {
    /// The beam-bending baseline.
    #[default]
    Builtin,
    File(PathBuf),
    Inline(Box<JobDescription>),
}

/// A subtree of the experiment that reruns every configuration with other
/// problem arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variant {
    pub label: String,
    pub problem_args: Vec<ParameterValue>,
}

/// External program invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

/// One parameter study, as read from its JSON description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExperimentConfig {
    pub name: String,
    pub root: PathBuf,
    #[serde(default = "default_trial_count")]
    pub trial_count: usize,
    pub dimensions: Vec<Dimension>,
    /// Explicit subset of identifiers; the whole space when absent.
    #[serde(default)]
    pub configurations: Option<Vec<String>>,
    #[serde(default)]
    pub base_template: TemplateSource,
    /// File name of the rendered document; `<problem>.json` when absent.
    #[serde(default)]
    pub document_name: Option<String>,
    #[serde(default)]
    pub launch_templates: Vec<PathBuf>,
    /// Name under which retargeted launch templates are installed.
    #[serde(default = "default_launch_file_name")]
    pub launch_file_name: String,
    #[serde(default)]
    pub variants: Vec<Variant>,
    #[serde(default)]
    pub scratch_root: Option<PathBuf>,
    #[serde(default = "default_collect_suffixes")]
    pub collect_suffixes: Vec<String>,
    #[serde(default)]
    pub job_discovery: Option<JobDiscovery>,
    #[serde(default)]
    pub artifact: ArtifactPattern,
    #[serde(default = "default_success_threshold")]
    pub success_threshold: f64,
    #[serde(default)]
    pub simplifier: Option<CommandSpec>,
    #[serde(default)]
    pub plotter: Option<CommandSpec>,
    #[serde(default = "default_summary_name")]
    pub summary_name: String,
    #[serde(default = "default_parameter_summary_name")]
    pub parameter_summary_name: String,
}

fn default_trial_count() -> usize {
    5
}

fn default_launch_file_name() -> String {
    "doit.slurm".to_string()
}

fn default_collect_suffixes() -> Vec<String> {
    vec![".pkl".to_string(), ".log".to_string()]
}

fn default_success_threshold() -> f64 {
    1e-12
}

fn default_summary_name() -> String {
    "results.csv".to_string()
}

fn default_parameter_summary_name() -> String {
    "param_fit.csv".to_string()
}

impl ExperimentConfig {
    /// Minimal configuration over `dimensions`, everything else defaulted.
    pub fn new(name: impl Into<String>, root: impl Into<PathBuf>, dimensions: Vec<Dimension>) -> Self {
        Self {
            name: name.into(),
            root: root.into(),
            trial_count: default_trial_count(),
            dimensions,
            configurations: None,
            base_template: TemplateSource::default(),
            document_name: None,
            launch_templates: Vec::new(),
            launch_file_name: default_launch_file_name(),
            variants: Vec::new(),
            scratch_root: None,
            collect_suffixes: default_collect_suffixes(),
            job_discovery: None,
            artifact: ArtifactPattern::default(),
            success_threshold: default_success_threshold(),
            simplifier: None,
            plotter: None,
            summary_name: default_summary_name(),
            parameter_summary_name: default_parameter_summary_name(),
        }
    }

    /// Load, apply environment overrides and validate.
    ///
    /// Relative paths in the file are taken relative to the file's directory.
    pub fn from_file<P: AsRef<Path>>(path: P) -> SweepResult<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .map_err(|e| config_error!("Failed to read {}: {}", path.display(), e))?;
        let mut config: Self = serde_json::from_str(&raw)?;
        if let Some(base_dir) = path.parent() {
            config.resolve_relative_to(base_dir);
        }
        config.apply_env_overrides();
        config.validate()?;
        info!("Loaded experiment {} from {}", config.name, path.display());
        Ok(config)
    }

    pub fn resolve_relative_to(&mut self, base_dir: &Path) {
        let resolve = |path: &mut PathBuf| {
            if path.is_relative() {
                *path = base_dir.join(&*path);
            }
        };
        resolve(&mut self.root);
        if let Some(scratch) = self.scratch_root.as_mut() {
            resolve(scratch);
        }
        if let TemplateSource::File(template) = &mut self.base_template {
            resolve(template);
        }
        self.launch_templates.iter_mut().for_each(resolve);
    }

    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(std::env::var(ROOT_ENV).ok(), std::env::var(SCRATCH_ENV).ok());
    }

    fn apply_overrides(&mut self, root: Option<String>, scratch: Option<String>) {
        if let Some(root) = root.filter(|r| !r.is_empty()) {
            debug!("{} overrides experiment root with {}", ROOT_ENV, root);
            self.root = PathBuf::from(root);
        }
        if let Some(scratch) = scratch.filter(|s| !s.is_empty()) {
            debug!("{} overrides scratch root with {}", SCRATCH_ENV, scratch);
            self.scratch_root = Some(PathBuf::from(scratch));
        }
    }

    /// Check everything that can be checked before touching the experiment tree.
    pub fn validate(&self) -> SweepResult<()> {
        if self.name.trim().is_empty() {
            return Err(validation_error!("Experiment name cannot be empty"));
        }
        if self.trial_count == 0 {
            return Err(validation_error!("trial_count must be at least 1"));
        }
        if !self.success_threshold.is_finite() {
            return Err(validation_error!("success_threshold must be finite"));
        }

        let space = self.space()?;
        for dimension in space.dimensions() {
            if !Hyperparameters::KEYS.contains(&dimension.name.as_str()) {
                return Err(TemplateError::KeyMismatch {
                    key: dimension.name.clone(),
                }
                .into());
            }
        }
        self.identifiers()?;
        self.base_template()?;

        if matches!(&self.document_name, Some(name) if name.trim().is_empty()) {
            return Err(validation_error!("document_name cannot be empty"));
        }
        if self.launch_file_name.trim().is_empty() {
            return Err(validation_error!("launch_file_name cannot be empty"));
        }
        for template in &self.launch_templates {
            if template.file_name().is_none() || !template.is_file() {
                return Err(validation_error!(
                    "Launch template {} is not a readable file",
                    template.display()
                ));
            }
        }

        let mut labels = HashSet::new();
        for variant in &self.variants {
            let label = variant.label.as_str();
            if label.is_empty() || label.contains(['/', '\\']) || label == "." || label == ".." {
                return Err(validation_error!("Invalid variant label {:?}", label));
            }
            if !labels.insert(label) {
                return Err(validation_error!("Duplicate variant label {:?}", label));
            }
        }

        if let Some(JobDiscovery::Sequential { ranges }) = &self.job_discovery {
            for range in ranges {
                range.validate()?;
            }
        }
        if self.collect_suffixes.iter().any(|s| s.is_empty()) {
            return Err(validation_error!("collect_suffixes entries cannot be empty"));
        }
        if self.artifact.suffix.is_empty() {
            return Err(validation_error!("artifact suffix cannot be empty"));
        }
        Ok(())
    }

    pub fn space(&self) -> SweepResult<ParameterSpace> {
        Ok(ParameterSpace::new(self.dimensions.clone())?)
    }

    /// Identifiers to work on, in enumeration order for the full space.
    pub fn identifiers(&self) -> SweepResult<Vec<ConfigurationId>> {
        let space = self.space()?;
        match &self.configurations {
            None => Ok(space.all_identifiers()),
            Some(subset) => {
                let mut seen = HashSet::new();
                let mut ids = Vec::with_capacity(subset.len());
                for raw in subset {
                    let id = space.parse(raw)?;
                    if !seen.insert(id.clone()) {
                        return Err(validation_error!("Configuration {} listed twice", id));
                    }
                    ids.push(id);
                }
                Ok(ids)
            }
        }
    }

    pub fn base_template(&self) -> SweepResult<JobDescription> {
        match &self.base_template {
            TemplateSource::Builtin => Ok(JobDescription::default()),
            TemplateSource::Inline(template) => Ok(template.as_ref().clone()),
            TemplateSource::File(path) => {
                let raw = fs::read_to_string(path)
                    .map_err(|e| config_error!("Failed to read base template {}: {}", path.display(), e))?;
                Ok(JobDescription::from_json_str(&raw)?)
            }
        }
    }

    pub fn document_name(&self, template: &JobDescription) -> String {
        self.document_name
            .clone()
            .unwrap_or_else(|| template.document_name())
    }

    /// Experiment layouts, one per variant or a single one at the root.
    pub fn layouts(&self) -> Vec<(Option<&Variant>, ExperimentLayout)> {
        let base = ExperimentLayout::new(&self.root, self.trial_count);
        if self.variants.is_empty() {
            return vec![(None, base)];
        }
        self.variants
            .iter()
            .map(|variant| (Some(variant), base.variant(&variant.label)))
            .collect()
    }

    pub fn aggregation_settings(&self) -> AggregationSettings {
        AggregationSettings {
            artifact: self.artifact.clone(),
            success_threshold: self.success_threshold,
            summary_name: self.summary_name.clone(),
            parameter_summary_name: self.parameter_summary_name.clone(),
        }
    }
}
