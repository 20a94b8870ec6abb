//! Parameter values and the identifiers that tie configurations, trials and
//! scheduler jobs together.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::SpaceError;

/// Radix of the configuration digit alphabet (`0-9a-z`).
pub const DIGIT_RADIX: u32 = 36;

/// A concrete hyperparameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterValue {
    Int(i64),
    Float(f64),
    Text(String),
}

impl ParameterValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            Self::Text(_) => None,
        }
    }

    /// Integer view. Floats are accepted only when they carry no fraction
    /// and fit in an `i64`.
    pub fn as_i64(&self) -> Option<i64> {
        // i64::MAX as f64 rounds up to 2^63, which is already out of range.
        const UPPER: f64 = i64::MAX as f64;
        const LOWER: f64 = i64::MIN as f64;
        match self {
            Self::Int(v) => Some(*v),
            Self::Float(v) if v.fract() == 0.0 && *v >= LOWER && *v < UPPER => Some(*v as i64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Value equality that treats `1` and `1.0` as the same point.
    pub fn same_value(&self, other: &ParameterValue) -> bool {
        match (self, other) {
            (Self::Text(a), Self::Text(b)) => a == b,
            (Self::Text(_), _) | (_, Self::Text(_)) => false,
            (a, b) => a.as_f64() == b.as_f64(),
        }
    }
}

impl fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v:?}"),
            Self::Text(v) => write!(f, "{v}"),
        }
    }
}

impl From<i64> for ParameterValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for ParameterValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for ParameterValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

/// Digit-string identifier of one configuration, one digit per dimension.
///
/// Only the digit alphabet is checked here; range checks against a concrete
/// space happen in `bs-space`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct ConfigurationId(String);

impl ConfigurationId {
    /// Build an identifier from per-dimension digit indices.
    pub fn from_digits(digits: &[usize]) -> Result<Self, SpaceError> {
        let mut id = String::with_capacity(digits.len());
        for &digit in digits {
            let ch = u32::try_from(digit)
                .ok()
                .and_then(|d| char::from_digit(d, DIGIT_RADIX))
                .ok_or_else(|| SpaceError::InvalidIdentifier {
                    identifier: format!("{digits:?}"),
                    reason: format!("digit {digit} is not encodable"),
                })?;
            id.push(ch);
        }
        Ok(Self(id))
    }

    /// Parse the digit alphabet of `raw` without range checks.
    pub fn parse_digits(raw: &str) -> Result<Vec<usize>, SpaceError> {
        raw.chars()
            .map(|ch| {
                ch.to_digit(DIGIT_RADIX)
                    .filter(|_| !ch.is_ascii_uppercase())
                    .map(|d| d as usize)
                    .ok_or_else(|| SpaceError::InvalidIdentifier {
                        identifier: raw.to_string(),
                        reason: format!("character {ch:?} is not a digit"),
                    })
            })
            .collect()
    }

    pub fn digits(&self) -> Vec<usize> {
        // The alphabet was checked on construction.
        self.0
            .chars()
            .filter_map(|ch| ch.to_digit(DIGIT_RADIX))
            .map(|d| d as usize)
            .collect()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ConfigurationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ConfigurationId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Identifier issued by the cluster scheduler at submission time.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<u64> for JobId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

impl From<&str> for JobId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}
