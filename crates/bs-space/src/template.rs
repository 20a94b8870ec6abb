//! Job-description documents and the override renderer.

use bs_types::{ParameterValue, TemplateError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Hyperparameter section of a job description.
///
/// Field order is the serialized key order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Hyperparameters {
    pub pop_size: u64,
    pub stack_size: u64,
    pub max_generations: u64,
    pub fitness_threshold: f64,
    pub stagnation_threshold: u64,
    pub differential_weight: f64,
    pub check_frequency: u64,
    pub min_generations: u64,
    pub crossover_rate: f64,
    pub mutation_rate: f64,
    pub evolution_algorithm: String,
}

impl Hyperparameters {
    pub const KEYS: [&'static str; 11] = [
        "pop_size",
        "stack_size",
        "max_generations",
        "fitness_threshold",
        "stagnation_threshold",
        "differential_weight",
        "check_frequency",
        "min_generations",
        "crossover_rate",
        "mutation_rate",
        "evolution_algorithm",
    ];

    /// Overwrite one hyperparameter by key.
    pub fn set(&mut self, key: &str, value: &ParameterValue) -> Result<(), TemplateError> {
        match key {
            "pop_size" => self.pop_size = as_count(key, value)?,
            "stack_size" => self.stack_size = as_count(key, value)?,
            "max_generations" => self.max_generations = as_count(key, value)?,
            "fitness_threshold" => self.fitness_threshold = as_real(key, value)?,
            "stagnation_threshold" => self.stagnation_threshold = as_count(key, value)?,
            "differential_weight" => self.differential_weight = as_real(key, value)?,
            "check_frequency" => self.check_frequency = as_count(key, value)?,
            "min_generations" => self.min_generations = as_count(key, value)?,
            "crossover_rate" => self.crossover_rate = as_real(key, value)?,
            "mutation_rate" => self.mutation_rate = as_real(key, value)?,
            "evolution_algorithm" => {
                self.evolution_algorithm = value
                    .as_str()
                    .ok_or_else(|| type_mismatch(key, "text", value))?
                    .to_string()
            }
            _ => {
                return Err(TemplateError::KeyMismatch {
                    key: key.to_string(),
                })
            }
        }
        Ok(())
    }
}

fn type_mismatch(key: &str, expected: &str, value: &ParameterValue) -> TemplateError {
    TemplateError::TypeMismatch {
        key: key.to_string(),
        expected: expected.to_string(),
        value: value.to_string(),
    }
}

fn as_count(key: &str, value: &ParameterValue) -> Result<u64, TemplateError> {
    value
        .as_i64()
        .and_then(|v| u64::try_from(v).ok())
        .ok_or_else(|| type_mismatch(key, "a non-negative integer", value))
}

fn as_real(key: &str, value: &ParameterValue) -> Result<f64, TemplateError> {
    value
        .as_f64()
        .ok_or_else(|| type_mismatch(key, "a number", value))
}

/// A job description consumed by the optimization framework on the cluster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JobDescription {
    pub problem: String,
    pub operators: Vec<String>,
    pub problem_args: Vec<ParameterValue>,
    #[serde(rename = "hyperparams")]
    pub hyperparameters: Hyperparameters,
    pub result_file: String,
    pub log_file: String,
    pub checkpoint_file: String,
}

impl JobDescription {
    pub fn from_json_str(raw: &str) -> Result<Self, TemplateError> {
        serde_json::from_str(raw).map_err(|e| TemplateError::Invalid {
            message: e.to_string(),
        })
    }

    /// Serialize with four-space indentation and the fixed key order.
    pub fn to_document_string(&self) -> Result<String, TemplateError> {
        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
        self.serialize(&mut ser).map_err(|e| TemplateError::Invalid {
            message: e.to_string(),
        })?;
        String::from_utf8(buf).map_err(|e| TemplateError::Invalid {
            message: e.to_string(),
        })
    }

    /// Default file name for the document inside a trial directory.
    pub fn document_name(&self) -> String {
        format!("{}.json", self.problem)
    }
}

impl Default for JobDescription {
    /// The beam-bending baseline used by the original parameter studies.
    fn default() -> Self {
        Self {
            problem: "beam_bending".to_string(),
            operators: ["+", "-", "*", "/", "^"]
                .iter()
                .map(|op| op.to_string())
                .collect(),
            problem_args: vec![
                ParameterValue::Float(5.0e-2),
                ParameterValue::Float(0.0),
                ParameterValue::Float(10.0),
                ParameterValue::Int(5),
            ],
            hyperparameters: Hyperparameters {
                pop_size: 500,
                stack_size: 120,
                max_generations: 100_000,
                fitness_threshold: 1e-12,
                stagnation_threshold: 100_000,
                differential_weight: 0.1,
                check_frequency: 10,
                min_generations: 10,
                crossover_rate: 0.8,
                mutation_rate: 0.2,
                evolution_algorithm: "DeterministicCrowding".to_string(),
            },
            result_file: "beam_bending.res.json".to_string(),
            log_file: "beam_bending".to_string(),
            checkpoint_file: "beam_bending".to_string(),
        }
    }
}

/// Render one configuration onto a copy of `base`.
///
/// `overrides` replace individual hyperparameters; `extra_args`, when given,
/// replaces the problem arguments wholesale. Any unknown key rejects the whole
/// render, so the base template is never partially applied.
pub fn render(
    base: &JobDescription,
    overrides: &BTreeMap<String, ParameterValue>,
    extra_args: Option<&[ParameterValue]>,
) -> Result<JobDescription, TemplateError> {
    let mut doc = base.clone();
    for (key, value) in overrides {
        doc.hyperparameters.set(key, value)?;
    }
    if let Some(args) = extra_args {
        doc.problem_args = args.to_vec();
    }
    tracing::trace!(overrides = overrides.len(), "Rendered job description");
    Ok(doc)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn overrides(pairs: &[(&str, ParameterValue)]) -> BTreeMap<String, ParameterValue> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn render_applies_overrides_to_a_copy() {
        let base = JobDescription::default();
        let doc = render(
            &base,
            &overrides(&[
                ("pop_size", ParameterValue::Int(100)),
                ("crossover_rate", ParameterValue::Float(0.4)),
            ]),
            None,
        )
        .unwrap();

        assert_eq!(doc.hyperparameters.pop_size, 100);
        assert_eq!(doc.hyperparameters.crossover_rate, 0.4);
        assert_eq!(doc.hyperparameters.stack_size, 120);
        assert_eq!(base.hyperparameters.pop_size, 500);
    }

    #[test]
    fn render_rejects_unknown_key() {
        let base = JobDescription::default();
        let err = render(
            &base,
            &overrides(&[("pop_sise", ParameterValue::Int(100))]),
            None,
        )
        .unwrap_err();
        assert_eq!(
            err,
            TemplateError::KeyMismatch {
                key: "pop_sise".to_string()
            }
        );
    }

    #[test]
    fn render_rejects_wrong_value_type() {
        let base = JobDescription::default();
        let err = render(
            &base,
            &overrides(&[("pop_size", ParameterValue::Float(0.5))]),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, TemplateError::TypeMismatch { .. }));
    }

    #[test]
    fn extra_args_replace_problem_args_wholesale() {
        let base = JobDescription::default();
        let args = [
            ParameterValue::Float(5.0e-5),
            ParameterValue::Float(0.0),
            ParameterValue::Float(10.0),
        ];
        let doc = render(&base, &BTreeMap::new(), Some(&args)).unwrap();
        assert_eq!(doc.problem_args, args.to_vec());
    }

    #[test]
    fn document_keeps_framework_key_order() {
        let text = JobDescription::default().to_document_string().unwrap();
        let problem = text.find("\"problem\"").unwrap();
        let hyper = text.find("\"hyperparams\"").unwrap();
        let pop = text.find("\"pop_size\"").unwrap();
        let algo = text.find("\"evolution_algorithm\"").unwrap();
        let checkpoint = text.find("\"checkpoint_file\"").unwrap();
        assert!(problem < hyper && hyper < pop && pop < algo && algo < checkpoint);
        assert!(text.contains("\n    \"problem\": \"beam_bending\""));

        let back = JobDescription::from_json_str(&text).unwrap();
        assert_eq!(back, JobDescription::default());
    }

    #[test]
    fn every_listed_key_is_settable() {
        let mut hp = JobDescription::default().hyperparameters;
        for key in Hyperparameters::KEYS {
            let value = if key == "evolution_algorithm" {
                ParameterValue::from("AgeFitness")
            } else {
                ParameterValue::Int(7)
            };
            hp.set(key, &value).unwrap();
        }
        assert_eq!(hp.evolution_algorithm, "AgeFitness");
        assert_eq!(hp.mutation_rate, 7.0);
    }
}
