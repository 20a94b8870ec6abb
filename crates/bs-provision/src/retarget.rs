//! Reassigning launch templates after provisioning, e.g. to spread the
//! remaining configurations of a sweep across several scheduler nodes.

use std::fs;
use std::path::{Path, PathBuf};

use bs_types::{ConfigurationId, ProvisionError, SpaceError};
use tracing::info;

use crate::layout::ExperimentLayout;

#[derive(Debug, Clone, PartialEq)]
pub struct TemplateAssignment {
    pub configuration: ConfigurationId,
    pub template: PathBuf,
}

/// Assign `templates` to every configuration after `resume_after`.
///
/// The remaining configurations are cut into `templates.len()` contiguous,
/// near-equal chunks; position `i` of `n` goes to the first chunk `j` with
/// `i < (j + 1) * n / k`.
pub fn plan_template_assignment(
    identifiers: &[ConfigurationId],
    resume_after: Option<&ConfigurationId>,
    templates: &[PathBuf],
) -> Result<Vec<TemplateAssignment>, SpaceError> {
    let start = match resume_after {
        None => 0,
        Some(resume) => {
            identifiers
                .iter()
                .position(|id| id == resume)
                .ok_or_else(|| SpaceError::InvalidIdentifier {
                    identifier: resume.to_string(),
                    reason: "resume point is not among the experiment configurations".to_string(),
                })?
                + 1
        }
    };
    if templates.is_empty() {
        return Ok(Vec::new());
    }

    let remaining = &identifiers[start..];
    let n = remaining.len();
    let k = templates.len();
    Ok(remaining
        .iter()
        .enumerate()
        .map(|(i, id)| {
            let chunk = (0..k).find(|j| i < (j + 1) * n / k).unwrap_or(k - 1);
            TemplateAssignment {
                configuration: id.clone(),
                template: templates[chunk].clone(),
            }
        })
        .collect())
}

/// Replace the launch file `dest_name` in `trial_dir` with `source`.
pub fn install_launch_template(
    trial_dir: &Path,
    source: &Path,
    dest_name: &str,
) -> Result<PathBuf, ProvisionError> {
    let dest = trial_dir.join(dest_name);
    if dest.exists() {
        fs::remove_file(&dest).map_err(|e| ProvisionError::io(&dest, e))?;
    }
    fs::copy(source, &dest).map_err(|e| ProvisionError::io(&dest, e))?;
    Ok(dest)
}

/// Apply a plan to every trial of every assigned configuration.
///
/// Returns the number of launch files written.
pub fn apply_template_assignment(
    layout: &ExperimentLayout,
    assignments: &[TemplateAssignment],
    dest_name: &str,
) -> Result<usize, ProvisionError> {
    let mut written = 0;
    for assignment in assignments {
        for trial_dir in layout.trial_dirs(&assignment.configuration) {
            install_launch_template(&trial_dir, &assignment.template, dest_name)?;
            written += 1;
        }
        info!(
            "{} now launches with {}",
            assignment.configuration,
            assignment.template.display()
        );
    }
    Ok(written)
}
