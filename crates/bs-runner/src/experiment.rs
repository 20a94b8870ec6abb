use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use bs_harvest::{
    AggregationReport, CollectionReport, CommandPlotter, CommandSimplifier, JobArtifactCollector,
    ResultAggregator,
};
use bs_provision::{
    apply_template_assignment, ensure_clean_dir, plan_template_assignment, DirectoryProvisioner,
    ProvisionedConfiguration, TemplateAssignment,
};
use bs_space::{render, JobDescription, ParameterSpace};
use bs_types::{config_error, ConfigurationId, ParameterValue, SweepResult};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::ExperimentConfig;

/// One configuration with its resolved hyperparameter values.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlannedConfiguration {
    pub configuration: ConfigurationId,
    pub values: BTreeMap<String, ParameterValue>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FailedConfiguration {
    pub variant: Option<String>,
    pub configuration: ConfigurationId,
    pub error: String,
}

#[derive(Debug, Clone)]
pub struct ProvisionReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub provisioned: Vec<ProvisionedConfiguration>,
    pub failed: Vec<FailedConfiguration>,
}

impl ProvisionReport {
    pub fn trial_count(&self) -> usize {
        self.provisioned.iter().map(|p| p.trial_dirs.len()).sum()
    }
}

/// Aggregation outcome of one experiment subtree.
#[derive(Debug, Clone, Serialize)]
pub struct VariantAggregation {
    pub variant: Option<String>,
    pub report: AggregationReport,
}

/// A validated experiment, ready to run any of its passes.
#[derive(Debug, Clone)]
pub struct Experiment {
    config: ExperimentConfig,
    space: ParameterSpace,
    template: JobDescription,
    identifiers: Vec<ConfigurationId>,
}

impl Experiment {
    pub fn new(config: ExperimentConfig) -> SweepResult<Self> {
        config.validate()?;
        let space = config.space()?;
        let template = config.base_template()?;
        let identifiers = config.identifiers()?;
        Ok(Self {
            config,
            space,
            template,
            identifiers,
        })
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> SweepResult<Self> {
        Self::new(ExperimentConfig::from_file(path)?)
    }

    pub fn config(&self) -> &ExperimentConfig {
        &self.config
    }

    pub fn space(&self) -> &ParameterSpace {
        &self.space
    }

    pub fn identifiers(&self) -> &[ConfigurationId] {
        &self.identifiers
    }

    /// Every configuration of the experiment with its resolved values.
    pub fn plan(&self) -> SweepResult<Vec<PlannedConfiguration>> {
        self.identifiers
            .iter()
            .map(|id| -> SweepResult<PlannedConfiguration> {
                Ok(PlannedConfiguration {
                    configuration: id.clone(),
                    values: self.space.overrides(id.as_str())?,
                })
            })
            .collect()
    }

    /// All trial directories in creation order: variants, then
    /// configurations, then trials.
    pub fn trial_paths(&self) -> Vec<PathBuf> {
        self.config
            .layouts()
            .iter()
            .flat_map(|(_, layout)| layout.trial_paths(&self.identifiers))
            .collect()
    }

    /// Create the experiment tree.
    ///
    /// Provisioning the full space starts from an empty experiment root.
    /// With a configuration subset only the listed configuration directories
    /// are replaced and their siblings are kept. A configuration that fails
    /// is reported and the batch carries on.
    pub fn provision(&self) -> SweepResult<ProvisionReport> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let provisioner = DirectoryProvisioner::new(self.config.document_name(&self.template));
        info!(
            "Provisioning experiment {} ({} configurations x {} trials, run {})",
            self.config.name,
            self.identifiers.len(),
            self.config.trial_count,
            run_id
        );
        if self.config.configurations.is_none() {
            ensure_clean_dir(&self.config.root)?;
            info!("Recreated experiment root {}", self.config.root.display());
        }

        let mut provisioned = Vec::new();
        let mut failed = Vec::new();
        for (variant, layout) in self.config.layouts() {
            let extra_args = variant.map(|v| v.problem_args.as_slice());
            for id in &self.identifiers {
                let outcome = self
                    .render(id, extra_args)
                    .and_then(|document| {
                        Ok(provisioner.provision_configuration(
                            layout.root(),
                            id,
                            &document,
                            &self.config.launch_templates,
                            layout.trial_count(),
                        )?)
                    });
                match outcome {
                    Ok(configuration) => provisioned.push(configuration),
                    Err(e) => {
                        error!("Failed to provision {} under {}: {}", id, layout.root().display(), e);
                        failed.push(FailedConfiguration {
                            variant: variant.map(|v| v.label.clone()),
                            configuration: id.clone(),
                            error: e.to_string(),
                        });
                    }
                }
            }
        }

        let report = ProvisionReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            provisioned,
            failed,
        };
        info!(
            "Provisioned {} configurations ({} trials), {} failed",
            report.provisioned.len(),
            report.trial_count(),
            report.failed.len()
        );
        Ok(report)
    }

    fn render(&self, id: &ConfigurationId, extra_args: Option<&[ParameterValue]>) -> SweepResult<JobDescription> {
        let overrides = self.space.overrides(id.as_str())?;
        Ok(render(&self.template, &overrides, extra_args)?)
    }

    /// Copy job outputs from scratch storage into the trial directories.
    pub fn collect(&self) -> SweepResult<CollectionReport> {
        let scratch_root = self
            .config
            .scratch_root
            .as_ref()
            .ok_or_else(|| config_error!("scratch_root is required to collect job outputs"))?;
        let discovery = self
            .config
            .job_discovery
            .as_ref()
            .ok_or_else(|| config_error!("job_discovery is required to collect job outputs"))?;

        let discovered = discovery.resolve(self.trial_paths())?;
        if !discovered.undiscovered.is_empty() {
            warn!("{} trials have no discoverable job", discovered.undiscovered.len());
        }
        let collector =
            JobArtifactCollector::new(scratch_root).with_suffixes(self.config.collect_suffixes.iter().cloned());
        Ok(collector
            .collect(&discovered.mapping)
            .with_undiscovered(discovered.undiscovered))
    }

    /// Summarise results, once per experiment subtree.
    pub fn aggregate(&self) -> SweepResult<Vec<VariantAggregation>> {
        let aggregator = self.aggregator();
        self.config
            .layouts()
            .into_iter()
            .map(|(variant, layout)| -> SweepResult<VariantAggregation> {
                Ok(VariantAggregation {
                    variant: variant.map(|v| v.label.clone()),
                    report: aggregator.run(&layout, &self.identifiers)?,
                })
            })
            .collect()
    }

    fn aggregator(&self) -> ResultAggregator {
        let mut aggregator = ResultAggregator::new(self.space.clone(), self.config.aggregation_settings());
        if let Some(command) = &self.config.simplifier {
            aggregator = aggregator.with_simplifier(Box::new(CommandSimplifier::new(
                command.program.clone(),
                command.args.clone(),
            )));
        }
        if let Some(command) = &self.config.plotter {
            aggregator = aggregator.with_plotter(Box::new(CommandPlotter::new(
                command.program.clone(),
                command.args.clone(),
            )));
        }
        aggregator
    }

    /// Spread the configurations after `resume_after` across `templates`,
    /// replacing the launch file of each of their trials.
    pub fn retarget(
        &self,
        resume_after: Option<&str>,
        templates: &[PathBuf],
    ) -> SweepResult<Vec<TemplateAssignment>> {
        let resume_after = resume_after.map(|raw| self.space.parse(raw)).transpose()?;
        let assignments = plan_template_assignment(&self.identifiers, resume_after.as_ref(), templates)?;
        for (_, layout) in self.config.layouts() {
            let written = apply_template_assignment(&layout, &assignments, &self.config.launch_file_name)?;
            info!("Replaced {} launch files under {}", written, layout.root().display());
        }
        Ok(assignments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Variant;
    use bs_space::Dimension;
    use std::fs;
    use tempfile::tempdir;

    fn config(root: &Path) -> ExperimentConfig {
        ExperimentConfig::new(
            "mini",
            root,
            vec![
                Dimension::new("pop_size", vec![ParameterValue::Int(100), ParameterValue::Int(300)]),
                Dimension::new(
                    "evolution_algorithm",
                    vec![
                        ParameterValue::Text("AgeFitness".to_string()),
                        ParameterValue::Text("DeterministicCrowding".to_string()),
                    ],
                ),
            ],
        )
    }

    #[test]
    fn plan_resolves_every_identifier() {
        let temp_dir = tempdir().unwrap();
        let experiment = Experiment::new(config(temp_dir.path())).unwrap();
        let plan = experiment.plan().unwrap();
        let ids: Vec<&str> = plan.iter().map(|p| p.configuration.as_str()).collect();
        assert_eq!(ids, vec!["00", "01", "10", "11"]);
        assert_eq!(plan[2].values["pop_size"], ParameterValue::Int(300));
    }

    #[test]
    fn provision_writes_variant_subtrees() {
        let temp_dir = tempdir().unwrap();
        let mut config = config(temp_dir.path());
        config.trial_count = 2;
        config.variants = vec![Variant {
            label: "t8".to_string(),
            problem_args: vec![ParameterValue::Float(0.05), ParameterValue::Int(8)],
        }];
        let experiment = Experiment::new(config).unwrap();

        let report = experiment.provision().unwrap();
        assert!(report.failed.is_empty());
        assert_eq!(report.trial_count(), 8);

        let doc = fs::read_to_string(temp_dir.path().join("t8/01/trial1/beam_bending.json")).unwrap();
        let parsed = JobDescription::from_json_str(&doc).unwrap();
        assert_eq!(parsed.problem_args, vec![ParameterValue::Float(0.05), ParameterValue::Int(8)]);
        assert_eq!(parsed.hyperparameters.evolution_algorithm, "DeterministicCrowding");
        assert_eq!(parsed.hyperparameters.pop_size, 100);
    }

    #[test]
    fn provision_reports_failed_configurations_and_continues() {
        let temp_dir = tempdir().unwrap();
        let root = temp_dir.path().join("study");
        let launch = temp_dir.path().join("doit.slurm");
        fs::write(&launch, "#!/bin/bash").unwrap();
        let mut config = config(&root);
        config.launch_templates = vec![launch.clone()];
        let experiment = Experiment::new(config).unwrap();
        fs::remove_file(&launch).unwrap();

        let report = experiment.provision().unwrap();
        assert!(report.provisioned.is_empty());
        assert_eq!(report.failed.len(), 4);
        assert_eq!(report.failed[3].configuration.as_str(), "11");
        let leftovers = fs::read_dir(&root).unwrap().count();
        assert_eq!(leftovers, 0);
    }

    fn seed_stale_tree(root: &Path) {
        fs::create_dir_all(root.join("99/trial0")).unwrap();
        fs::write(root.join("99/trial0/stale.res.json"), "{}").unwrap();
        fs::write(root.join("results.csv"), "configuration-id\n").unwrap();
    }

    fn entries(root: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(root)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn full_provision_recreates_experiment_root() {
        let temp_dir = tempdir().unwrap();
        let root = temp_dir.path().join("study");
        seed_stale_tree(&root);
        let experiment = Experiment::new(config(&root)).unwrap();

        experiment.provision().unwrap();
        assert_eq!(entries(&root), vec!["00", "01", "10", "11"]);
    }

    #[test]
    fn subset_provision_keeps_sibling_configurations() {
        let temp_dir = tempdir().unwrap();
        let root = temp_dir.path().join("study");
        seed_stale_tree(&root);
        let mut config = config(&root);
        config.configurations = Some(vec!["01".to_string()]);
        let experiment = Experiment::new(config).unwrap();

        let report = experiment.provision().unwrap();
        assert_eq!(report.provisioned.len(), 1);
        assert_eq!(entries(&root), vec!["01", "99", "results.csv"]);
        assert!(root.join("99/trial0/stale.res.json").exists());
    }

    #[test]
    fn collect_requires_scratch_and_discovery() {
        let temp_dir = tempdir().unwrap();
        let experiment = Experiment::new(config(temp_dir.path())).unwrap();
        assert!(experiment.collect().is_err());
    }

    #[test]
    fn retarget_rejects_unknown_resume_point() {
        let temp_dir = tempdir().unwrap();
        let experiment = Experiment::new(config(temp_dir.path())).unwrap();
        assert!(experiment.retarget(Some("22"), &[PathBuf::from("doit.slurm")]).is_err());
    }
}
