//! Locating and reading the optimization framework's result artifacts.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use bs_types::HarvestError;
use serde::{Deserialize, Serialize};

/// File name pattern of a result artifact: optional prefix, required suffix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactPattern {
    #[serde(default)]
    pub prefix: Option<String>,
    pub suffix: String,
}

impl ArtifactPattern {
    pub fn new(suffix: impl Into<String>) -> Self {
        Self {
            prefix: None,
            suffix: suffix.into(),
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    pub fn matches(&self, name: &str) -> bool {
        let prefix_ok = self
            .prefix
            .as_deref()
            .map_or(true, |prefix| name.starts_with(prefix));
        prefix_ok && name.ends_with(&self.suffix)
    }
}

impl Default for ArtifactPattern {
    fn default() -> Self {
        Self::new(".res.json")
    }
}

/// Lexicographically last file in `dir` matching `pattern`.
///
/// A missing directory counts as having no artifact.
pub fn locate_artifact(dir: &Path, pattern: &ArtifactPattern) -> Result<Option<PathBuf>, HarvestError> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(HarvestError::io(dir, e)),
    };

    let mut latest: Option<String> = None;
    for entry in entries {
        let entry = entry.map_err(|e| HarvestError::io(dir, e))?;
        let file_type = entry.file_type().map_err(|e| HarvestError::io(entry.path(), e))?;
        if !file_type.is_file() {
            continue;
        }
        let Ok(name) = entry.file_name().into_string() else {
            continue;
        };
        if pattern.matches(&name) && latest.as_deref().map_or(true, |current| name.as_str() > current) {
            latest = Some(name);
        }
    }
    Ok(latest.map(|name| dir.join(name)))
}

/// The three values aggregation needs from an artifact.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedArtifact {
    pub fitness: f64,
    pub generations: u64,
    pub raw_solution: String,
}

/// Reader for one artifact format.
pub trait ArtifactLoader: Send + Sync {
    fn load(&self, path: &Path) -> Result<ParsedArtifact, HarvestError>;

    fn name(&self) -> &str;
}

/// Loader for the framework's JSON result file.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSnapshotLoader;

#[derive(Deserialize)]
struct Snapshot {
    fitness: f64,
    #[serde(alias = "generational_age")]
    generations: u64,
    #[serde(alias = "best_individual")]
    solution: String,
}

impl ArtifactLoader for JsonSnapshotLoader {
    fn load(&self, path: &Path) -> Result<ParsedArtifact, HarvestError> {
        let raw = fs::read_to_string(path).map_err(|e| HarvestError::io(path, e))?;
        let snapshot: Snapshot = serde_json::from_str(&raw).map_err(|e| HarvestError::ArtifactParse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Ok(ParsedArtifact {
            fitness: snapshot.fitness,
            generations: snapshot.generations,
            raw_solution: snapshot.solution,
        })
    }

    fn name(&self) -> &str {
        "JSON Snapshot"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn pattern_honours_prefix_and_suffix() {
        let pattern = ArtifactPattern::new(".pkl").with_prefix("beam_bending");
        assert!(pattern.matches("beam_bending_00042.pkl"));
        assert!(!pattern.matches("other_00042.pkl"));
        assert!(!pattern.matches("beam_bending.log"));
        assert!(ArtifactPattern::new(".pkl").matches("anything.pkl"));
    }

    #[test]
    fn locate_picks_last_name() {
        let temp_dir = tempdir().unwrap();
        for name in ["bb_0010.pkl", "bb_0200.pkl", "bb_0100.pkl", "bb_9999.log"] {
            fs::write(temp_dir.path().join(name), "").unwrap();
        }
        fs::create_dir(temp_dir.path().join("zz.pkl")).unwrap();

        let found = locate_artifact(temp_dir.path(), &ArtifactPattern::new(".pkl")).unwrap();
        assert_eq!(found, Some(temp_dir.path().join("bb_0200.pkl")));
    }

    #[test]
    fn locate_in_missing_or_empty_dir_is_none() {
        let temp_dir = tempdir().unwrap();
        let pattern = ArtifactPattern::default();
        assert_eq!(locate_artifact(temp_dir.path(), &pattern).unwrap(), None);
        assert_eq!(locate_artifact(&temp_dir.path().join("trial9"), &pattern).unwrap(), None);
    }

    #[test]
    fn json_loader_accepts_framework_field_names() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("beam_bending.res.json");
        fs::write(
            &path,
            r#"{"fitness": 2.5e-13, "generational_age": 1840, "best_individual": "X_0*(X_0 - 1.0)"}"#,
        )
        .unwrap();

        let parsed = JsonSnapshotLoader.load(&path).unwrap();
        assert_eq!(parsed.generations, 1840);
        assert_eq!(parsed.raw_solution, "X_0*(X_0 - 1.0)");
        assert!((parsed.fitness - 2.5e-13).abs() < 1e-20);
    }

    #[test]
    fn json_loader_reports_parse_errors() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("beam_bending.res.json");
        fs::write(&path, r#"{"fitness": "nope"}"#).unwrap();
        assert!(matches!(
            JsonSnapshotLoader.load(&path),
            Err(HarvestError::ArtifactParse { .. })
        ));
    }
}
