use serde::Serialize;

use crate::values::ConfigurationId;

/// One harvested trial result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultRecord {
    pub configuration: ConfigurationId,
    pub trial: usize,
    pub fitness: f64,
    pub generations: u64,
    pub solution: String,
    pub success: bool,
}

impl ResultRecord {
    pub fn new(
        configuration: ConfigurationId,
        trial: usize,
        fitness: f64,
        generations: u64,
        solution: String,
        threshold: f64,
    ) -> Self {
        Self {
            configuration,
            trial,
            fitness,
            generations,
            solution,
            success: classify_success(fitness, threshold),
        }
    }
}

/// A trial is successful iff its fitness reached the experiment threshold.
///
/// NaN fitness is never successful.
pub fn classify_success(fitness: f64, threshold: f64) -> bool {
    fitness <= threshold
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_is_inclusive_at_threshold() {
        assert!(classify_success(1e-12, 1e-12));
        assert!(classify_success(0.0, 1e-12));
        assert!(!classify_success(2e-12, 1e-12));
        assert!(!classify_success(f64::NAN, 1e-12));
    }

    #[test]
    fn record_derives_success_flag() {
        let id = ConfigurationId::from_digits(&[0, 0, 0, 0, 0]).unwrap();
        let record = ResultRecord::new(id, 3, 4.2e-3, 1200, "x**2".into(), 1e-6);
        assert!(!record.success);
        assert_eq!(record.trial, 3);
    }
}
