use std::path::{Path, PathBuf};

use bs_types::ConfigurationId;

/// Deterministic path scheme of an experiment tree:
/// `root/<configuration-id>/trial<N>/`.
#[derive(Debug, Clone, PartialEq)]
pub struct ExperimentLayout {
    root: PathBuf,
    trial_count: usize,
}

impl ExperimentLayout {
    pub fn new<P: AsRef<Path>>(root: P, trial_count: usize) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            trial_count,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn trial_count(&self) -> usize {
        self.trial_count
    }

    /// Layout of a variant subtree (`root/<label>/...`).
    pub fn variant(&self, label: &str) -> Self {
        Self {
            root: self.root.join(label),
            trial_count: self.trial_count,
        }
    }

    pub fn configuration_dir(&self, id: &ConfigurationId) -> PathBuf {
        self.root.join(id.as_str())
    }

    pub fn trial_dir(&self, id: &ConfigurationId, trial: usize) -> PathBuf {
        self.configuration_dir(id).join(trial_dir_name(trial))
    }

    pub fn trial_dirs(&self, id: &ConfigurationId) -> Vec<PathBuf> {
        (0..self.trial_count)
            .map(|trial| self.trial_dir(id, trial))
            .collect()
    }

    /// All trial directories in provisioning order: configurations in the
    /// given order, trials `0..trial_count` within each.
    pub fn trial_paths(&self, ids: &[ConfigurationId]) -> Vec<PathBuf> {
        ids.iter().flat_map(|id| self.trial_dirs(id)).collect()
    }
}

pub fn trial_dir_name(trial: usize) -> String {
    format!("trial{trial}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(raw: &[usize]) -> ConfigurationId {
        ConfigurationId::from_digits(raw).unwrap()
    }

    #[test]
    fn paths_are_deterministic() {
        let layout = ExperimentLayout::new("/data/tuning_params", 5);
        let cfg = id(&[1, 0, 1, 0, 1]);
        assert_eq!(
            layout.trial_dir(&cfg, 3),
            PathBuf::from("/data/tuning_params/10101/trial3")
        );
        assert_eq!(layout.trial_dirs(&cfg).len(), 5);
    }

    #[test]
    fn trial_paths_follow_configuration_then_trial_order() {
        let layout = ExperimentLayout::new("root", 2);
        let paths = layout.trial_paths(&[id(&[0, 0]), id(&[0, 1])]);
        let expected: Vec<PathBuf> = ["root/00/trial0", "root/00/trial1", "root/01/trial0", "root/01/trial1"]
            .iter()
            .map(PathBuf::from)
            .collect();
        assert_eq!(paths, expected);
    }

    #[test]
    fn variant_nests_under_root() {
        let layout = ExperimentLayout::new("root", 5).variant("t64");
        assert_eq!(
            layout.trial_dir(&id(&[0, 0, 1]), 0),
            PathBuf::from("root/t64/001/trial0")
        );
    }
}
