//! External collaborators used during aggregation: the symbolic simplifier
//! and the per-trial plotting routine.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;

use bs_types::HarvestError;
use tracing::debug;

/// Rewrite the framework's expression syntax into the simplifier's.
pub fn normalize_expression(raw: &str) -> String {
    raw.replace("X_0", "x").replace(")(", ")*(")
}

/// Drop imaginary-unit factors left over by symbolic simplification.
pub fn strip_imaginary(expression: &str) -> String {
    expression.replace("*I", "")
}

pub trait Simplifier: Send + Sync {
    fn simplify(&self, raw: &str) -> Result<String, HarvestError>;

    fn name(&self) -> &str;
}

/// Only normalises syntax; used when no external simplifier is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExpressionNormalizer;

impl Simplifier for ExpressionNormalizer {
    fn simplify(&self, raw: &str) -> Result<String, HarvestError> {
        Ok(normalize_expression(raw))
    }

    fn name(&self) -> &str {
        "Expression Normalizer"
    }
}

/// Simplifier backed by an external program reading stdin and writing stdout.
#[derive(Debug, Clone)]
pub struct CommandSimplifier {
    program: String,
    args: Vec<String>,
}

impl CommandSimplifier {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    fn failure(&self, message: impl std::fmt::Display) -> HarvestError {
        HarvestError::SimplificationFailure {
            message: format!("{}: {}", self.program, message),
        }
    }
}

impl Simplifier for CommandSimplifier {
    fn simplify(&self, raw: &str) -> Result<String, HarvestError> {
        let input = normalize_expression(raw);
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| self.failure(e))?;

        // Feed stdin from its own thread while stdout drains.
        let output = thread::scope(|scope| {
            let writer = child.stdin.take().map(|mut stdin| {
                let bytes = input.as_bytes();
                scope.spawn(move || stdin.write_all(bytes))
            });
            let output = child.wait_with_output().map_err(|e| self.failure(e))?;
            if let Some(writer) = writer {
                writer
                    .join()
                    .map_err(|_| self.failure("stdin writer panicked"))?
                    .map_err(|e| self.failure(e))?;
            }
            Ok::<_, HarvestError>(output)
        })?;
        if !output.status.success() {
            return Err(self.failure(format!(
                "exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let simplified = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if simplified.is_empty() {
            return Err(self.failure("produced no output"));
        }
        debug!("Simplified {:?} to {:?}", input, simplified);
        Ok(strip_imaginary(&simplified))
    }

    fn name(&self) -> &str {
        &self.program
    }
}

pub trait Plotter: Send + Sync {
    /// Render the solution held in `artifact`, returning the image produced, if any.
    fn plot(&self, artifact: &Path, trial_dir: &Path) -> Result<Option<PathBuf>, HarvestError>;

    fn name(&self) -> &str;
}

/// Plotter backed by an external program.
///
/// The program receives the artifact path and the trial directory and prints
/// the image path as its last line of output. Without output the image is
/// expected at `<trial_dir>/best_individual.png`.
#[derive(Debug, Clone)]
pub struct CommandPlotter {
    program: String,
    args: Vec<String>,
}

impl CommandPlotter {
    pub const DEFAULT_IMAGE: &'static str = "best_individual.png";

    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

impl Plotter for CommandPlotter {
    fn plot(&self, artifact: &Path, trial_dir: &Path) -> Result<Option<PathBuf>, HarvestError> {
        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(artifact)
            .arg(trial_dir)
            .current_dir(trial_dir)
            .output()
            .map_err(|e| HarvestError::PlotFailure {
                message: format!("{}: {}", self.program, e),
            })?;

        if !output.status.success() {
            return Err(HarvestError::PlotFailure {
                message: format!(
                    "{} exited with {}: {}",
                    self.program,
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let image = match stdout.lines().map(str::trim).filter(|l| !l.is_empty()).last() {
            Some(line) => {
                let path = PathBuf::from(line);
                if path.is_absolute() {
                    path
                } else {
                    trial_dir.join(path)
                }
            }
            None => trial_dir.join(Self::DEFAULT_IMAGE),
        };
        Ok(image.is_file().then_some(image))
    }

    fn name(&self) -> &str {
        &self.program
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_rewrites_variable_and_products() {
        assert_eq!(
            normalize_expression("(X_0 + 1.0)(X_0 - 2.0)"),
            "(x + 1.0)*(x - 2.0)"
        );
        assert_eq!(strip_imaginary("0.5*x**2*I"), "0.5*x**2");
    }

    #[test]
    fn normalizer_is_infallible() {
        let simplified = ExpressionNormalizer.simplify("X_0*X_0").unwrap();
        assert_eq!(simplified, "x*x");
    }

    #[cfg(unix)]
    #[test]
    fn command_simplifier_round_trips_through_stdin() {
        let simplifier = CommandSimplifier::new("cat", Vec::new());
        assert_eq!(simplifier.simplify("(X_0)(X_0)*I").unwrap(), "(x)*(x)");
    }

    #[cfg(unix)]
    #[test]
    fn command_simplifier_streams_large_expressions() {
        let raw = "(X_0 + 1.0)".repeat(40_000);
        let simplifier = CommandSimplifier::new("cat", Vec::new());
        assert_eq!(simplifier.simplify(&raw).unwrap(), normalize_expression(&raw));
    }

    #[cfg(unix)]
    #[test]
    fn command_simplifier_reports_failing_program() {
        let simplifier = CommandSimplifier::new("false", Vec::new());
        assert!(matches!(
            simplifier.simplify("X_0"),
            Err(HarvestError::SimplificationFailure { .. })
        ));
    }

    #[test]
    fn missing_program_is_a_failure() {
        let plotter = CommandPlotter::new("batchsweep-no-such-plotter", Vec::new());
        let dir = std::env::temp_dir();
        assert!(matches!(
            plotter.plot(&dir.join("a.pkl"), &dir),
            Err(HarvestError::PlotFailure { .. })
        ));
    }
}
