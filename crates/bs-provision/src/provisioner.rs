use std::fs;
use std::path::{Path, PathBuf};

use bs_space::JobDescription;
use bs_types::{ConfigurationId, ProvisionError};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::layout::trial_dir_name;

/// Remove `path` if it exists and recreate it empty.
///
/// Callers must be the only writer of `path`.
pub fn ensure_clean_dir<P: AsRef<Path>>(path: P) -> Result<(), ProvisionError> {
    let path = path.as_ref();
    if path.is_dir() {
        fs::remove_dir_all(path).map_err(|e| ProvisionError::io(path, e))?;
    } else if path.exists() {
        fs::remove_file(path).map_err(|e| ProvisionError::io(path, e))?;
    }
    fs::create_dir_all(path).map_err(|e| ProvisionError::io(path, e))?;
    debug!("Recreated clean directory {}", path.display());
    Ok(())
}

/// A configuration directory that was fully provisioned.
#[derive(Debug, Clone, PartialEq)]
pub struct ProvisionedConfiguration {
    pub configuration: ConfigurationId,
    pub dir: PathBuf,
    /// Trial directories in index order.
    pub trial_dirs: Vec<PathBuf>,
}

/// Writes configuration directories into an experiment tree.
#[derive(Debug, Clone)]
pub struct DirectoryProvisioner {
    document_name: String,
}

impl DirectoryProvisioner {
    pub fn new(document_name: impl Into<String>) -> Self {
        Self {
            document_name: document_name.into(),
        }
    }

    pub fn document_name(&self) -> &str {
        &self.document_name
    }

    /// Build `root/<id>/trial0..trial{N-1}` with the document and launch
    /// templates in every trial.
    ///
    /// The tree is assembled in a staging directory under `root` and renamed
    /// into place once complete, replacing any previous directory. On failure
    /// the staging directory is discarded and the previous directory, if any,
    /// is left as it was.
    pub fn provision_configuration(
        &self,
        root: &Path,
        id: &ConfigurationId,
        document: &JobDescription,
        launch_templates: &[PathBuf],
        trial_count: usize,
    ) -> Result<ProvisionedConfiguration, ProvisionError> {
        if trial_count == 0 {
            return Err(ProvisionError::NoTrials);
        }
        let templates = launch_templates
            .iter()
            .map(|path| {
                path.file_name()
                    .map(|name| (path.as_path(), name.to_os_string()))
                    .ok_or_else(|| ProvisionError::InvalidLaunchTemplate { path: path.clone() })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let target = root.join(id.as_str());
        let text = document
            .to_document_string()
            .map_err(|e| ProvisionError::Document {
                path: target.join(&self.document_name),
                message: e.to_string(),
            })?;

        fs::create_dir_all(root).map_err(|e| ProvisionError::io(root, e))?;
        let staging = root.join(format!(".staging-{}-{}", id, Uuid::new_v4()));
        fs::create_dir(&staging).map_err(|e| ProvisionError::io(&staging, e))?;

        let filled = (0..trial_count).try_for_each(|trial| -> Result<(), ProvisionError> {
            let trial_dir = staging.join(trial_dir_name(trial));
            fs::create_dir(&trial_dir).map_err(|e| ProvisionError::io(&trial_dir, e))?;

            let doc_path = trial_dir.join(&self.document_name);
            fs::write(&doc_path, &text).map_err(|e| ProvisionError::io(&doc_path, e))?;

            for (source, name) in &templates {
                fs::copy(source, trial_dir.join(name)).map_err(|e| ProvisionError::io(*source, e))?;
            }
            Ok(())
        });

        if let Err(e) = filled.and_then(|_| swap_into_place(root, &staging, &target, id)) {
            if staging.exists() {
                if let Err(cleanup) = fs::remove_dir_all(&staging) {
                    warn!("Failed to remove staging directory {}: {}", staging.display(), cleanup);
                }
            }
            return Err(e);
        }

        info!("Provisioned {} with {} trials", target.display(), trial_count);
        Ok(ProvisionedConfiguration {
            configuration: id.clone(),
            trial_dirs: (0..trial_count)
                .map(|trial| target.join(trial_dir_name(trial)))
                .collect(),
            dir: target,
        })
    }
}

/// Replace `target` with the completed `staging` directory.
fn swap_into_place(
    root: &Path,
    staging: &Path,
    target: &Path,
    id: &ConfigurationId,
) -> Result<(), ProvisionError> {
    if !target.exists() {
        return fs::rename(staging, target).map_err(|e| ProvisionError::io(target, e));
    }

    let retired = root.join(format!(".retired-{}-{}", id, Uuid::new_v4()));
    fs::rename(target, &retired).map_err(|e| ProvisionError::io(target, e))?;
    if let Err(e) = fs::rename(staging, target) {
        // Put the previous tree back so the target never goes missing.
        if let Err(restore) = fs::rename(&retired, target) {
            warn!("Failed to restore {}: {}", target.display(), restore);
        }
        return Err(ProvisionError::io(target, e));
    }

    let removed = if retired.is_dir() {
        fs::remove_dir_all(&retired)
    } else {
        fs::remove_file(&retired)
    };
    if let Err(e) = removed {
        warn!("Left retired directory {} behind: {}", retired.display(), e);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn id(raw: &str) -> ConfigurationId {
        ConfigurationId::from_digits(&ConfigurationId::parse_digits(raw).unwrap()).unwrap()
    }

    fn sorted_names(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn ensure_clean_dir_empties_existing_tree() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("study");
        fs::create_dir_all(path.join("stale/nested")).unwrap();
        fs::write(path.join("stale.txt"), "old").unwrap();

        ensure_clean_dir(&path).unwrap();
        assert!(path.is_dir());
        assert!(sorted_names(&path).is_empty());

        ensure_clean_dir(temp_dir.path().join("fresh")).unwrap();
        assert!(temp_dir.path().join("fresh").is_dir());
    }

    #[test]
    fn provisions_trials_with_document_and_templates() {
        let temp_dir = tempdir().unwrap();
        let template = temp_dir.path().join("doit.slurm");
        fs::write(&template, "#!/bin/bash\n#SBATCH --time=72:00:00\n").unwrap();
        let root = temp_dir.path().join("tuning_params");

        let mut doc = JobDescription::default();
        doc.hyperparameters.pop_size = 100;
        let provisioner = DirectoryProvisioner::new("beam_bending.json");
        let result = provisioner
            .provision_configuration(&root, &id("00000"), &doc, &[template.clone()], 5)
            .unwrap();

        assert_eq!(result.dir, root.join("00000"));
        assert_eq!(
            sorted_names(&result.dir),
            vec!["trial0", "trial1", "trial2", "trial3", "trial4"]
        );
        for trial_dir in &result.trial_dirs {
            assert_eq!(sorted_names(trial_dir), vec!["beam_bending.json", "doit.slurm"]);
            let text = fs::read_to_string(trial_dir.join("beam_bending.json")).unwrap();
            let back = JobDescription::from_json_str(&text).unwrap();
            assert_eq!(back.hyperparameters.pop_size, 100);
            assert_eq!(
                fs::read(trial_dir.join("doit.slurm")).unwrap(),
                fs::read(&template).unwrap()
            );
        }
        // Staging directories never survive a successful run.
        assert_eq!(sorted_names(&root), vec!["00000"]);
    }

    #[test]
    fn reprovisioning_replaces_stale_content() {
        let temp_dir = tempdir().unwrap();
        let root = temp_dir.path().join("study");
        let provisioner = DirectoryProvisioner::new("job.json");
        let doc = JobDescription::default();

        provisioner
            .provision_configuration(&root, &id("01"), &doc, &[], 3)
            .unwrap();
        fs::write(root.join("01/trial1/beam_bending_1234.pkl"), "stale").unwrap();
        fs::create_dir_all(root.join("01/trial7")).unwrap();

        let result = provisioner
            .provision_configuration(&root, &id("01"), &doc, &[], 3)
            .unwrap();
        assert_eq!(sorted_names(&result.dir), vec!["trial0", "trial1", "trial2"]);
        for trial_dir in &result.trial_dirs {
            assert_eq!(sorted_names(trial_dir), vec!["job.json"]);
        }
        assert_eq!(sorted_names(&root), vec!["01"]);
    }

    #[test]
    fn failure_keeps_previous_tree_and_cleans_staging() {
        let temp_dir = tempdir().unwrap();
        let root = temp_dir.path().join("study");
        let provisioner = DirectoryProvisioner::new("job.json");
        let doc = JobDescription::default();

        provisioner
            .provision_configuration(&root, &id("10"), &doc, &[], 2)
            .unwrap();

        let missing = temp_dir.path().join("missing.slurm");
        let err = provisioner
            .provision_configuration(&root, &id("10"), &doc, &[missing], 2)
            .unwrap_err();
        assert!(matches!(err, ProvisionError::Io { .. }));

        assert_eq!(sorted_names(&root), vec!["10"]);
        assert_eq!(sorted_names(&root.join("10/trial0")), vec!["job.json"]);
    }

    #[test]
    fn zero_trials_is_rejected() {
        let temp_dir = tempdir().unwrap();
        let err = DirectoryProvisioner::new("job.json")
            .provision_configuration(temp_dir.path(), &id("0"), &JobDescription::default(), &[], 0)
            .unwrap_err();
        assert!(matches!(err, ProvisionError::NoTrials));
    }
}
