//! Run configuration for the generators and the merge step.
//!
//! Everything is constructor-level configuration: defaults come from `Default`
//! impls, CLI flags override them, and nothing is read from the environment.

use serde::{Deserialize, Serialize};
use std::fmt;

/// All recognized generator options.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GeneratorConfig {
    /// Base row count before the duplicate tail.
    pub rows: usize,
    /// Fraction of `rows` re-appended as exact duplicate copies.
    pub duplicate_ratio: f64,
    /// Per-field null probability.
    pub null_ratio: f64,
    /// Per-numeric-field outlier probability.
    pub outlier_ratio: f64,
    /// Probability of a garbage timestamp (weather only).
    pub malformed_ratio: f64,
    /// Seed for the general per-field stream.
    pub seed: u64,
    /// Seed for the numeric sampling stream (duplicate tail).
    pub numeric_seed: u64,
}

impl GeneratorConfig {
    /// Defaults for the weather run.
    pub fn weather_defaults() -> Self {
        Self {
            rows: 5000,
            duplicate_ratio: 0.05,
            null_ratio: 0.1,
            outlier_ratio: 0.1,
            malformed_ratio: 0.01,
            seed: 42,
            numeric_seed: 42,
        }
    }

    /// Defaults for the traffic run. Distinct seeds keep the two tables'
    /// randomness independent while both stay reproducible.
    pub fn traffic_defaults() -> Self {
        Self {
            malformed_ratio: 0.0,
            seed: 43,
            numeric_seed: 43,
            ..Self::weather_defaults()
        }
    }

    /// A fully clean configuration, handy for tests that need invariants to
    /// hold on every row.
    pub fn clean(rows: usize, seed: u64) -> Self {
        Self {
            rows,
            duplicate_ratio: 0.0,
            null_ratio: 0.0,
            outlier_ratio: 0.0,
            malformed_ratio: 0.0,
            seed,
            numeric_seed: seed,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rows == 0 {
            return Err(ConfigError::ZeroRows);
        }
        for (name, value) in [
            ("duplicate_ratio", self.duplicate_ratio),
            ("null_ratio", self.null_ratio),
            ("outlier_ratio", self.outlier_ratio),
            ("malformed_ratio", self.malformed_ratio),
        ] {
            // duplicate_ratio may exceed 1.0 only in theory; the sample is
            // without replacement, so it is capped at the table length.
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::RatioOutOfRange {
                    name,
                    value,
                });
            }
        }
        Ok(())
    }
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self::weather_defaults()
    }
}

/// Invalid run configuration.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    ZeroRows,
    RatioOutOfRange { name: &'static str, value: f64 },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ZeroRows => write!(f, "row count must be positive"),
            Self::RatioOutOfRange { name, value } => {
                write!(f, "{} must be within [0, 1], got {}", name, value)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        GeneratorConfig::weather_defaults().validate().unwrap();
        GeneratorConfig::traffic_defaults().validate().unwrap();
        GeneratorConfig::clean(10, 1).validate().unwrap();
    }

    #[test]
    fn bad_ratios_are_rejected() {
        let mut cfg = GeneratorConfig::weather_defaults();
        cfg.null_ratio = 1.5;
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::RatioOutOfRange { name: "null_ratio", .. })
        ));
        cfg = GeneratorConfig::weather_defaults();
        cfg.rows = 0;
        assert_eq!(cfg.validate(), Err(ConfigError::ZeroRows));
    }
}
