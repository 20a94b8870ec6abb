use std::fs;
use std::path::Path;

use bs_harvest::{JobDiscovery, JobIdRange};
use bs_runner::{Experiment, ExperimentConfig};
use bs_space::{Dimension, JobDescription};
use bs_types::ParameterValue;
use tempfile::tempdir;

fn write_experiment(dir: &Path, discovery: &str) -> std::path::PathBuf {
    fs::write(dir.join("doit.slurm"), "#!/bin/bash\n#SBATCH --nodelist=notch204\n").unwrap();
    let experiment = format!(
        r#"{{
            "name": "beam-bending-pairs",
            "root": "study",
            "trial_count": 3,
            "dimensions": [
                {{"name": "pop_size", "values": [100, 300]}},
                {{"name": "crossover_rate", "values": [0.4, 0.8]}}
            ],
            "launch_templates": ["doit.slurm"],
            "scratch_root": "scratch",
            "collect_suffixes": [".res.json", ".log"],
            "job_discovery": {discovery}
        }}"#
    );
    let path = dir.join("experiment.json");
    fs::write(&path, experiment).unwrap();
    path
}

fn fake_job(scratch: &Path, job: u64, fitness: f64) {
    let dir = scratch.join(job.to_string());
    fs::create_dir_all(&dir).unwrap();
    fs::write(
        dir.join("beam_bending.res.json"),
        format!(r#"{{"fitness": {fitness:e}, "generations": {job}, "solution": "X_0*(X_0)(1.0)"}}"#),
    )
    .unwrap();
    fs::write(dir.join("beam_bending.log"), "generation log").unwrap();
}

#[test]
fn provision_collect_aggregate_with_sequential_ids() {
    let temp_dir = tempdir().unwrap();
    let path = write_experiment(
        temp_dir.path(),
        r#"{"mode": "sequential", "ranges": [{"start": 1000, "end": 1006}, {"start": 2000, "end": 2006}]}"#,
    );
    let mut config = ExperimentConfig::from_file(&path).unwrap();
    config.root = temp_dir.path().join("study");
    config.scratch_root = Some(temp_dir.path().join("scratch"));
    let experiment = Experiment::new(config).unwrap();

    let provisioned = experiment.provision().unwrap();
    assert!(provisioned.failed.is_empty());
    assert_eq!(provisioned.trial_count(), 12);

    let study = temp_dir.path().join("study");
    let doc = fs::read_to_string(study.join("10/trial2/beam_bending.json")).unwrap();
    let doc = JobDescription::from_json_str(&doc).unwrap();
    assert_eq!(doc.hyperparameters.pop_size, 300);
    assert_eq!(doc.hyperparameters.crossover_rate, 0.4);
    assert!(study.join("10/trial2/doit.slurm").exists());

    // Jobs 1000..1006 ran configurations 00 and 01, 2000..2006 ran 10 and 11.
    // Job 2004 (configuration 11, trial 1) never wrote anything.
    let scratch = temp_dir.path().join("scratch");
    for job in (1000..1006).chain(2000..2006).filter(|job| *job != 2004) {
        let fitness = if job < 2000 { 1e-13 } else { 0.5 };
        fake_job(&scratch, job, fitness);
    }

    let collected = experiment.collect().unwrap();
    assert_eq!(collected.pairs, 12);
    assert_eq!(collected.collected.len(), 11);
    assert_eq!(collected.files_copied(), 22);
    assert_eq!(collected.skipped.len(), 1);
    assert_eq!(collected.skipped[0].trial, study.join("11/trial1"));

    let aggregated = experiment.aggregate().unwrap();
    assert_eq!(aggregated.len(), 1);
    let report = &aggregated[0].report;
    assert_eq!(report.records.len(), 11);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.success_count(), 6);

    let summary = fs::read_to_string(study.join("results.csv")).unwrap();
    let mut lines = summary.lines();
    assert_eq!(lines.next(), Some("configuration-id,success,fitness,generations,solution"));
    assert_eq!(lines.next(), Some("00,1,1e-13,1000,x*(x)*(1.0)"));
    assert_eq!(summary.lines().count(), 12);

    let buckets = fs::read_to_string(study.join("param_fit.csv")).unwrap();
    assert_eq!(
        buckets.lines().next(),
        Some("pop_size=0,pop_size=1,crossover_rate=0,crossover_rate=1")
    );
}

#[test]
fn log_filename_discovery_skips_trials_without_logs() {
    let temp_dir = tempdir().unwrap();
    let path = write_experiment(
        temp_dir.path(),
        r#"{"mode": "log_filename", "suffix": ".out-notch204"}"#,
    );
    let mut config = ExperimentConfig::from_file(&path).unwrap();
    config.root = temp_dir.path().join("study");
    config.scratch_root = Some(temp_dir.path().join("scratch"));
    config.configurations = Some(vec!["01".to_string()]);
    let experiment = Experiment::new(config).unwrap();
    experiment.provision().unwrap();

    let study = temp_dir.path().join("study");
    let scratch = temp_dir.path().join("scratch");
    for (trial, job) in [(0, 7001u64), (2, 7003u64)] {
        fs::write(study.join(format!("01/trial{trial}/{job}.out-notch204")), "").unwrap();
        fake_job(&scratch, job, 1e-3);
    }

    let collected = experiment.collect().unwrap();
    assert_eq!(collected.pairs, 2);
    assert_eq!(collected.collected.len(), 2);
    assert_eq!(collected.skipped.len(), 1);
    assert!(collected.skipped[0].job_id.is_none());
    assert!(study.join("01/trial2/beam_bending.res.json").exists());
    assert!(!study.join("01/trial1/beam_bending.res.json").exists());
}

#[test]
fn retarget_spreads_remaining_configurations() {
    let temp_dir = tempdir().unwrap();
    let root = temp_dir.path().join("study");
    let mut config = ExperimentConfig::new(
        "retarget",
        &root,
        vec![
            Dimension::new("pop_size", vec![ParameterValue::Int(100), ParameterValue::Int(300)]),
            Dimension::new("stack_size", vec![ParameterValue::Int(50), ParameterValue::Int(100)]),
        ],
    );
    config.trial_count = 1;
    let original = temp_dir.path().join("doit.slurm");
    fs::write(&original, "original").unwrap();
    config.launch_templates = vec![original];
    config.job_discovery = Some(JobDiscovery::Sequential {
        ranges: vec![JobIdRange::new(1, 5).unwrap()],
    });
    let experiment = Experiment::new(config).unwrap();
    experiment.provision().unwrap();

    let nodes: Vec<_> = ["doit_notch272.slurm", "doit_notch273.slurm"]
        .iter()
        .map(|name| {
            let path = temp_dir.path().join(name);
            fs::write(&path, *name).unwrap();
            path
        })
        .collect();

    let assignments = experiment.retarget(Some("00"), &nodes).unwrap();
    let ids: Vec<&str> = assignments.iter().map(|a| a.configuration.as_str()).collect();
    assert_eq!(ids, vec!["01", "10", "11"]);

    let read = |id: &str| fs::read_to_string(root.join(id).join("trial0/doit.slurm")).unwrap();
    assert_eq!(read("00"), "original");
    assert_eq!(read("01"), "doit_notch272.slurm");
    assert_eq!(read("10"), "doit_notch273.slurm");
    assert_eq!(read("11"), "doit_notch273.slurm");
}
