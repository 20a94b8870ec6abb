//! Correspondence between scheduler job identifiers and trial directories.

use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use bs_types::{HarvestError, JobId};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Half-open range `[start, end)` of sequentially issued job identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobIdRange {
    pub start: u64,
    pub end: u64,
}

impl JobIdRange {
    pub fn new(start: u64, end: u64) -> Result<Self, HarvestError> {
        let range = Self { start, end };
        range.validate()?;
        Ok(range)
    }

    pub fn validate(&self) -> Result<(), HarvestError> {
        if self.start >= self.end {
            return Err(HarvestError::InvalidJobRange {
                start: self.start,
                end: self.end,
            });
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn ids(&self) -> impl Iterator<Item = JobId> {
        (self.start..self.end).map(JobId::from)
    }
}

/// How job identifiers are matched to trial directories.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum JobDiscovery {
    /// Identifiers were issued in trial creation order, possibly across
    /// several submission blocks.
    Sequential { ranges: Vec<JobIdRange> },
    /// Each trial directory holds a scheduler log named `<job_id>.<...><suffix>`.
    LogFilename { suffix: String },
}

impl JobDiscovery {
    /// Build the mapping for `trial_paths`, given in creation order.
    pub fn resolve(&self, trial_paths: Vec<PathBuf>) -> Result<LogDiscovery, HarvestError> {
        match self {
            Self::Sequential { ranges } => {
                for range in ranges {
                    range.validate()?;
                }
                let job_ids: Vec<JobId> = ranges.iter().flat_map(JobIdRange::ids).collect();
                Ok(LogDiscovery {
                    mapping: JobMapping::pair(job_ids, trial_paths)?,
                    undiscovered: Vec::new(),
                })
            }
            Self::LogFilename { suffix } => discover_from_logs(trial_paths, suffix),
        }
    }
}

/// Validated one-to-one pairing of job identifiers and trial directories.
#[derive(Debug, Clone, PartialEq)]
pub struct JobMapping {
    pairs: Vec<(JobId, PathBuf)>,
}

impl JobMapping {
    /// Pair two equally long sequences in lock-step.
    pub fn pair(job_ids: Vec<JobId>, trial_paths: Vec<PathBuf>) -> Result<Self, HarvestError> {
        if job_ids.len() != trial_paths.len() {
            return Err(HarvestError::JobMappingLengthMismatch {
                job_ids: job_ids.len(),
                trial_paths: trial_paths.len(),
            });
        }
        Self::from_pairs(job_ids.into_iter().zip(trial_paths).collect())
    }

    /// Accept explicit pairs, rejecting any repeated job or trial.
    pub fn from_pairs(pairs: Vec<(JobId, PathBuf)>) -> Result<Self, HarvestError> {
        let mut by_job: HashMap<&JobId, &Path> = HashMap::with_capacity(pairs.len());
        let mut by_trial: HashMap<&Path, &JobId> = HashMap::with_capacity(pairs.len());
        for (job_id, trial) in &pairs {
            if let Some(previous) = by_job.insert(job_id, trial) {
                return Err(HarvestError::JobMappingConflict {
                    message: format!(
                        "job {} maps to both {} and {}",
                        job_id,
                        previous.display(),
                        trial.display()
                    ),
                });
            }
            if let Some(previous) = by_trial.insert(trial, job_id) {
                return Err(HarvestError::JobMappingConflict {
                    message: format!(
                        "{} maps to both job {} and job {}",
                        trial.display(),
                        previous,
                        job_id
                    ),
                });
            }
        }
        Ok(Self { pairs })
    }

    pub fn pairs(&self) -> &[(JobId, PathBuf)] {
        &self.pairs
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn job_for(&self, trial: &Path) -> Option<&JobId> {
        self.pairs
            .iter()
            .find(|(_, path)| path == trial)
            .map(|(job_id, _)| job_id)
    }
}

/// Outcome of resolving a [`JobDiscovery`].
#[derive(Debug, Clone, PartialEq)]
pub struct LogDiscovery {
    pub mapping: JobMapping,
    /// Trials for which no job identifier could be found.
    pub undiscovered: Vec<PathBuf>,
}

/// Derive each trial's job identifier from a scheduler log file it contains.
///
/// Trials without such a file are reported as undiscovered. Logs naming two
/// different jobs in the same trial, or one job claimed by two trials, make
/// the whole mapping invalid.
pub fn discover_from_logs(trial_paths: Vec<PathBuf>, suffix: &str) -> Result<LogDiscovery, HarvestError> {
    let mut pairs = Vec::with_capacity(trial_paths.len());
    let mut undiscovered = Vec::new();

    for trial in trial_paths {
        let ids = job_ids_in(&trial, suffix)?;
        let mut ids = ids.into_iter();
        match (ids.next(), ids.next()) {
            (None, _) => {
                warn!("No scheduler log ending in {:?} in {}", suffix, trial.display());
                undiscovered.push(trial);
            }
            (Some(job_id), None) => {
                debug!("{} belongs to job {}", trial.display(), job_id);
                pairs.push((job_id, trial));
            }
            (Some(first), Some(second)) => {
                return Err(HarvestError::JobMappingConflict {
                    message: format!(
                        "{} holds logs of jobs {} and {}",
                        trial.display(),
                        first,
                        second
                    ),
                });
            }
        }
    }

    Ok(LogDiscovery {
        mapping: JobMapping::from_pairs(pairs)?,
        undiscovered,
    })
}

fn job_ids_in(trial: &Path, suffix: &str) -> Result<BTreeSet<JobId>, HarvestError> {
    let entries = match fs::read_dir(trial) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(BTreeSet::new()),
        Err(e) => return Err(HarvestError::io(trial, e)),
    };

    let mut ids = BTreeSet::new();
    for entry in entries {
        let entry = entry.map_err(|e| HarvestError::io(trial, e))?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if !name.ends_with(suffix) {
            continue;
        }
        if let Some(job_id) = name.split('.').next().filter(|id| !id.is_empty()) {
            ids.insert(JobId::new(job_id));
        }
    }
    Ok(ids)
}
