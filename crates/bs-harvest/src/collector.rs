use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use bs_types::{HarvestError, JobId};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::mapping::JobMapping;

/// Copies job outputs from per-job scratch directories into their trials.
#[derive(Debug, Clone)]
pub struct JobArtifactCollector {
    scratch_root: PathBuf,
    suffixes: Vec<String>,
}

/// Files copied for one job.
#[derive(Debug, Clone, Serialize)]
pub struct CollectedJob {
    pub job_id: JobId,
    pub trial: PathBuf,
    pub files: Vec<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum SkipReason {
    ScratchMissing,
    NoMatchingFiles,
    CopyFailed(String),
    NoJobId,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::ScratchMissing => write!(f, "scratch directory missing"),
            SkipReason::NoMatchingFiles => write!(f, "no matching files in scratch directory"),
            SkipReason::CopyFailed(message) => write!(f, "copy failed: {}", message),
            SkipReason::NoJobId => write!(f, "no job identifier discovered"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SkippedJob {
    pub job_id: Option<JobId>,
    pub trial: PathBuf,
    pub reason: SkipReason,
}

/// Summary of one collection pass.
#[derive(Debug, Clone, Serialize)]
pub struct CollectionReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub pairs: usize,
    pub collected: Vec<CollectedJob>,
    pub skipped: Vec<SkippedJob>,
}

impl CollectionReport {
    pub fn files_copied(&self) -> usize {
        self.collected.iter().map(|job| job.files.len()).sum()
    }

    /// Record trials whose job identifier could not be discovered.
    pub fn with_undiscovered(mut self, trials: Vec<PathBuf>) -> Self {
        self.skipped.extend(trials.into_iter().map(|trial| SkippedJob {
            job_id: None,
            trial,
            reason: SkipReason::NoJobId,
        }));
        self
    }
}

impl JobArtifactCollector {
    pub fn new<P: AsRef<Path>>(scratch_root: P) -> Self {
        Self {
            scratch_root: scratch_root.as_ref().to_path_buf(),
            suffixes: Vec::new(),
        }
    }

    /// Restrict collection to files ending in one of `suffixes`.
    pub fn with_suffixes<I, S>(mut self, suffixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.suffixes = suffixes.into_iter().map(Into::into).collect();
        self
    }

    pub fn scratch_root(&self) -> &Path {
        &self.scratch_root
    }

    pub fn suffixes(&self) -> &[String] {
        &self.suffixes
    }

    pub fn scratch_dir(&self, job_id: &JobId) -> PathBuf {
        self.scratch_root.join(job_id.as_str())
    }

    /// Pair `job_ids` with `trial_paths` and collect.
    ///
    /// The pairing is validated before anything is copied.
    pub fn collect_pairs(
        &self,
        job_ids: Vec<JobId>,
        trial_paths: Vec<PathBuf>,
    ) -> Result<CollectionReport, HarvestError> {
        let mapping = JobMapping::pair(job_ids, trial_paths)?;
        Ok(self.collect(&mapping))
    }

    /// Copy matching scratch files for every pair in `mapping`.
    ///
    /// Per-job problems are recorded as skips and never abort the pass.
    pub fn collect(&self, mapping: &JobMapping) -> CollectionReport {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        info!(
            "Collecting {} jobs from {} (run {})",
            mapping.len(),
            self.scratch_root.display(),
            run_id
        );

        let mut collected = Vec::new();
        let mut skipped = Vec::new();

        for (job_id, trial) in mapping.pairs() {
            match self.collect_job(job_id, trial) {
                Ok(files) => {
                    debug!("Copied {} files for job {} into {}", files.len(), job_id, trial.display());
                    collected.push(CollectedJob {
                        job_id: job_id.clone(),
                        trial: trial.clone(),
                        files,
                    });
                }
                Err(reason) => {
                    warn!("Skipping job {} ({}): {}", job_id, trial.display(), reason);
                    skipped.push(SkippedJob {
                        job_id: Some(job_id.clone()),
                        trial: trial.clone(),
                        reason,
                    });
                }
            }
        }

        let report = CollectionReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            pairs: mapping.len(),
            collected,
            skipped,
        };
        info!(
            "Collection finished: {} jobs collected, {} files copied, {} skipped",
            report.collected.len(),
            report.files_copied(),
            report.skipped.len()
        );
        report
    }

    fn collect_job(&self, job_id: &JobId, trial: &Path) -> Result<Vec<PathBuf>, SkipReason> {
        let scratch = self.scratch_dir(job_id);
        let sources = match self.matching_files(&scratch) {
            Ok(sources) => sources,
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(SkipReason::ScratchMissing),
            Err(e) => return Err(SkipReason::CopyFailed(format!("{}: {}", scratch.display(), e))),
        };
        if sources.is_empty() {
            return Err(SkipReason::NoMatchingFiles);
        }

        let mut copied = Vec::with_capacity(sources.len());
        for source in sources {
            let Some(name) = source.file_name() else { continue };
            let dest = trial.join(name);
            fs::copy(&source, &dest)
                .map_err(|e| SkipReason::CopyFailed(format!("{}: {}", dest.display(), e)))?;
            copied.push(dest);
        }
        Ok(copied)
    }

    fn matching_files(&self, scratch: &Path) -> std::io::Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in fs::read_dir(scratch)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if self.matches(name) {
                files.push(entry.path());
            }
        }
        files.sort();
        Ok(files)
    }

    fn matches(&self, name: &str) -> bool {
        self.suffixes.is_empty() || self.suffixes.iter().any(|suffix| name.ends_with(suffix.as_str()))
    }
}
