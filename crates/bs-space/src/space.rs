//! Discrete parameter space and its digit-string encoding.

use bs_types::{ConfigurationId, ParameterValue, SpaceError, DIGIT_RADIX};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// A single parameter dimension: a name and its ordered list of values.
///
/// The position of a value in `values` is the digit that encodes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dimension {
    /// Hyperparameter key the dimension overrides (e.g. "pop_size").
    pub name: String,
    pub values: Vec<ParameterValue>,
}

impl Dimension {
    pub fn new(name: impl Into<String>, values: Vec<ParameterValue>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }

    pub fn cardinality(&self) -> usize {
        self.values.len()
    }

    fn index_of(&self, value: &ParameterValue) -> Option<usize> {
        self.values.iter().position(|v| v.same_value(value))
    }
}

/// The full search space: an ordered list of dimensions.
///
/// Identifiers are read most-significant first: the first dimension owns the
/// first digit, and enumeration varies the last dimension fastest.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParameterSpace {
    dimensions: Vec<Dimension>,
}

impl ParameterSpace {
    pub fn new(dimensions: Vec<Dimension>) -> Result<Self, SpaceError> {
        if dimensions.is_empty() {
            return Err(SpaceError::NoDimensions);
        }
        let max = DIGIT_RADIX as usize;
        let mut seen = HashSet::new();
        for dim in &dimensions {
            if !seen.insert(dim.name.as_str()) {
                return Err(SpaceError::DuplicateDimension {
                    dimension: dim.name.clone(),
                });
            }
            if dim.values.is_empty() {
                return Err(SpaceError::EmptyDimension {
                    dimension: dim.name.clone(),
                });
            }
            if dim.cardinality() > max {
                return Err(SpaceError::CardinalityTooLarge {
                    dimension: dim.name.clone(),
                    cardinality: dim.cardinality(),
                    max,
                });
            }
        }
        Ok(Self { dimensions })
    }

    pub fn dimensions(&self) -> &[Dimension] {
        &self.dimensions
    }

    pub fn arity(&self) -> usize {
        self.dimensions.len()
    }

    /// Total number of configurations (product of all cardinalities).
    pub fn size(&self) -> usize {
        self.dimensions
            .iter()
            .map(Dimension::cardinality)
            .product()
    }

    /// Map a concrete value tuple to its identifier.
    pub fn encode(&self, values: &[ParameterValue]) -> Result<ConfigurationId, SpaceError> {
        if values.len() != self.arity() {
            return Err(SpaceError::ArityMismatch {
                expected: self.arity(),
                actual: values.len(),
            });
        }
        let digits = self
            .dimensions
            .iter()
            .zip(values)
            .map(|(dim, value)| {
                dim.index_of(value).ok_or_else(|| SpaceError::ValueNotInDimension {
                    dimension: dim.name.clone(),
                    value: value.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        ConfigurationId::from_digits(&digits)
    }

    /// Validate a raw digit string against this space.
    pub fn parse(&self, raw: &str) -> Result<ConfigurationId, SpaceError> {
        let digits = self.checked_digits(raw)?;
        ConfigurationId::from_digits(&digits)
    }

    /// Resolve an identifier to its concrete value tuple.
    pub fn decode(&self, identifier: &str) -> Result<Vec<ParameterValue>, SpaceError> {
        let digits = self.checked_digits(identifier)?;
        Ok(self
            .dimensions
            .iter()
            .zip(digits)
            .map(|(dim, digit)| dim.values[digit].clone())
            .collect())
    }

    /// Per-dimension digit indices of a validated identifier.
    pub fn digits(&self, identifier: &str) -> Result<Vec<usize>, SpaceError> {
        self.checked_digits(identifier)
    }

    /// Hyperparameter overrides (dimension name → value) for one identifier.
    pub fn overrides(&self, identifier: &str) -> Result<BTreeMap<String, ParameterValue>, SpaceError> {
        let values = self.decode(identifier)?;
        Ok(self
            .dimensions
            .iter()
            .map(|dim| dim.name.clone())
            .zip(values)
            .collect())
    }

    /// Every identifier of the space, last dimension varying fastest.
    pub fn all_identifiers(&self) -> Vec<ConfigurationId> {
        let mut combos: Vec<Vec<usize>> = vec![Vec::new()];
        for dim in &self.dimensions {
            let mut next = Vec::with_capacity(combos.len() * dim.cardinality());
            for existing in &combos {
                for digit in 0..dim.cardinality() {
                    let mut combo = existing.clone();
                    combo.push(digit);
                    next.push(combo);
                }
            }
            combos = next;
        }

        combos
            .iter()
            .filter_map(|digits| ConfigurationId::from_digits(digits).ok())
            .collect()
    }

    fn checked_digits(&self, identifier: &str) -> Result<Vec<usize>, SpaceError> {
        let invalid = |reason: String| SpaceError::InvalidIdentifier {
            identifier: identifier.to_string(),
            reason,
        };

        let digits = ConfigurationId::parse_digits(identifier)?;
        if digits.len() != self.arity() {
            return Err(invalid(format!(
                "length {} does not match {} dimensions",
                digits.len(),
                self.arity()
            )));
        }
        for (dim, &digit) in self.dimensions.iter().zip(&digits) {
            if digit >= dim.cardinality() {
                return Err(invalid(format!(
                    "digit {digit} out of range for {} ({} values)",
                    dim.name,
                    dim.cardinality()
                )));
            }
        }
        Ok(digits)
    }
}
