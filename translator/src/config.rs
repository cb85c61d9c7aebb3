// config.rs — Analysis limits
//
// Integer limits used for overflow obligations, the feedback-simulation round
// budget and the oracle's DNF size bound. Loaded from JSON; every field is
// optional and falls back to its default.
//
// Failure modes: I/O and JSON errors → `ConfigError`.
// Side effects: `AnalysisConfig::load` reads a file.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub max_int: i64,
    pub min_int: i64,
    pub max_simulation_rounds: usize,
    pub max_oracle_clauses: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        AnalysisConfig {
            max_int: i64::from(i32::MAX),
            min_int: i64::from(i32::MIN),
            max_simulation_rounds: 100,
            max_oracle_clauses: 64,
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Json(serde_json::Error),
    /// `min_int` is not below `max_int`.
    EmptyRange { min_int: i64, max_int: i64 },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io { path, source } => write!(f, "{}: {}", path.display(), source),
            ConfigError::Json(e) => write!(f, "invalid config JSON: {}", e),
            ConfigError::EmptyRange { min_int, max_int } => write!(
                f,
                "min_int ({}) must be below max_int ({})",
                min_int, max_int
            ),
        }
    }
}

impl std::error::Error for ConfigError {}

impl AnalysisConfig {
    pub fn from_json(source: &str) -> Result<Self, ConfigError> {
        let config: AnalysisConfig = serde_json::from_str(source).map_err(ConfigError::Json)?;
        if config.min_int >= config.max_int {
            return Err(ConfigError::EmptyRange {
                min_int: config.min_int,
                max_int: config.max_int,
            });
        }
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let source = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_json(&source)
    }

    pub fn max_int_f64(&self) -> f64 {
        self.max_int as f64
    }

    pub fn min_int_f64(&self) -> f64 {
        self.min_int as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_32_bit_limits() {
        let c = AnalysisConfig::default();
        assert_eq!(c.max_int, 2147483647);
        assert_eq!(c.min_int, -2147483648);
        assert_eq!(c.max_simulation_rounds, 100);
    }

    #[test]
    fn partial_json_keeps_other_defaults() {
        let c = AnalysisConfig::from_json(r#"{"max_simulation_rounds": 10}"#).unwrap();
        assert_eq!(c.max_simulation_rounds, 10);
        assert_eq!(c.max_oracle_clauses, 64);
    }

    #[test]
    fn inverted_range_is_rejected() {
        let err = AnalysisConfig::from_json(r#"{"max_int": 0, "min_int": 5}"#).unwrap_err();
        assert!(matches!(err, ConfigError::EmptyRange { .. }));
    }
}
