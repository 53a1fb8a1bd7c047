//! Analysis configuration: input/output paths and every tunable threshold.
//!
//! Stored as a JSON object on disk. Every field is optional and falls back
//! to its default:
//! ```json
//! {
//!   "paths": { "output_dir": "out" },
//!   "thresholds": { "high_percentile": 0.95, "twin": { "strategy": "nearest" } }
//! }
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::classify::PercentileSplit;
use crate::error::{AnalysisError, Result};
use crate::quality::{CleanFilter, QualityThresholds};
use crate::twins::TwinTolerance;

/// Environment variable naming a config file when `--config` is not given.
pub const CONFIG_ENV: &str = "RESILIENCE_CONFIG";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataPaths {
    pub model_results: PathBuf,
    pub tract_attributes: PathBuf,
    pub centroids: Option<PathBuf>,
    pub output_dir: PathBuf,
    pub tables_dir: PathBuf,
}

impl Default for DataPaths {
    fn default() -> Self {
        Self {
            model_results: PathBuf::from("data/processed/model_table_with_residuals.csv"),
            tract_attributes: PathBuf::from("data/interim/fara_2019.csv"),
            centroids: Some(PathBuf::from("data/census_gazetteer/2019_Gaz_tracts_national.txt")),
            output_dir: PathBuf::from("data/processed"),
            tables_dir: PathBuf::from("tables"),
        }
    }
}

/// Tracts in deep economic distress on three fronts at once.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AbandonmentThresholds {
    pub poverty_rate: f64,
    pub no_vehicle_far_pct: f64,
    pub snap_pct: f64,
}

impl Default for AbandonmentThresholds {
    fn default() -> Self {
        Self {
            poverty_rate: 40.0,
            no_vehicle_far_pct: 20.0,
            snap_pct: 30.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    pub low_percentile: f64,
    pub high_percentile: f64,
    pub high_poverty_rate: f64,
    pub tiny_population: u64,
    pub high_group_quarters_pct: f64,
    pub twin: TwinTolerance,
    pub abandonment: AbandonmentThresholds,
    pub clean: CleanFilter,
    pub min_state_tracts: usize,
    pub min_autocorrelation_tracts: usize,
    pub significant_autocorrelation: f64,
    pub min_county_cluster: usize,
    pub top_n: usize,
    pub top_tracts: usize,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            low_percentile: 0.10,
            high_percentile: 0.90,
            high_poverty_rate: 30.0,
            tiny_population: 500,
            high_group_quarters_pct: 20.0,
            twin: TwinTolerance::default(),
            abandonment: AbandonmentThresholds::default(),
            clean: CleanFilter::default(),
            min_state_tracts: 10,
            min_autocorrelation_tracts: 30,
            significant_autocorrelation: 0.3,
            min_county_cluster: 3,
            top_n: 15,
            top_tracts: 20,
        }
    }
}

impl Thresholds {
    pub fn split(&self) -> PercentileSplit {
        PercentileSplit {
            low: self.low_percentile,
            high: self.high_percentile,
        }
    }

    pub fn quality(&self) -> QualityThresholds {
        QualityThresholds {
            tiny_population: self.tiny_population,
            high_group_quarters_pct: self.high_group_quarters_pct,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub paths: DataPaths,
    pub thresholds: Thresholds,
}

impl AnalysisConfig {
    /// Loads and validates the config from a JSON file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        debug!(path = %path.display(), "Config loaded");
        Ok(config)
    }

    /// `explicit` if given, else the file named by [`CONFIG_ENV`], else
    /// defaults.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        match std::env::var_os(CONFIG_ENV) {
            Some(path) if !path.is_empty() => Self::load(Path::new(&path)),
            _ => {
                info!("No config file given, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// # Errors
    ///
    /// [`AnalysisError::Config`] for percentiles outside [0, 1], a low
    /// percentile not below the high one, or a negative tolerance.
    pub fn validate(&self) -> Result<()> {
        let t = &self.thresholds;

        for (name, p) in [("low_percentile", t.low_percentile), ("high_percentile", t.high_percentile)] {
            if !(0.0..=1.0).contains(&p) {
                return Err(AnalysisError::Config(format!("{name} must be within [0, 1], got {p}")));
            }
        }
        if t.low_percentile >= t.high_percentile {
            return Err(AnalysisError::Config(format!(
                "low_percentile ({}) must be below high_percentile ({})",
                t.low_percentile, t.high_percentile
            )));
        }

        let tolerances = [
            ("twin.poverty_rate_points", t.twin.poverty_rate_points),
            ("twin.population", t.twin.population),
            ("high_poverty_rate", t.high_poverty_rate),
            ("high_group_quarters_pct", t.high_group_quarters_pct),
            ("significant_autocorrelation", t.significant_autocorrelation),
        ];
        for (name, value) in tolerances {
            if value.is_nan() || value < 0.0 {
                return Err(AnalysisError::Config(format!("{name} must be non-negative, got {value}")));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::twins::MatchStrategy;
    use std::env;
    use std::fs;

    fn temp_path(name: &str) -> PathBuf {
        env::temp_dir().join(name)
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = AnalysisConfig::default();
        config.validate().unwrap();
        assert_eq!(config.thresholds.split(), PercentileSplit::default());
        assert_eq!(config.thresholds.top_n, 15);
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let path = temp_path("food_desert_resilience_test_partial.json");
        fs::write(
            &path,
            r#"{"paths": {"output_dir": "out"}, "thresholds": {"high_percentile": 0.95, "twin": {"strategy": "nearest"}}}"#,
        )
        .unwrap();

        let config = AnalysisConfig::load(&path).unwrap();

        assert_eq!(config.paths.output_dir, PathBuf::from("out"));
        assert_eq!(config.paths.tables_dir, PathBuf::from("tables"));
        assert_eq!(config.thresholds.high_percentile, 0.95);
        assert_eq!(config.thresholds.low_percentile, 0.10);
        assert_eq!(config.thresholds.twin.strategy, MatchStrategy::Nearest);
        assert_eq!(config.thresholds.twin.population, 500.0);

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_inverted_percentiles_rejected() {
        let mut config = AnalysisConfig::default();
        config.thresholds.low_percentile = 0.9;
        config.thresholds.high_percentile = 0.1;
        assert!(matches!(config.validate(), Err(AnalysisError::Config(_))));
    }

    #[test]
    fn test_out_of_range_percentile_rejected() {
        let mut config = AnalysisConfig::default();
        config.thresholds.high_percentile = 1.5;
        assert!(matches!(config.validate(), Err(AnalysisError::Config(_))));
    }

    #[test]
    fn test_negative_tolerance_rejected() {
        let mut config = AnalysisConfig::default();
        config.thresholds.twin.population = -1.0;
        assert!(matches!(config.validate(), Err(AnalysisError::Config(_))));
    }

    #[test]
    fn test_malformed_file_is_json_error() {
        let path = temp_path("food_desert_resilience_test_malformed.json");
        fs::write(&path, "{ not json").unwrap();

        assert!(matches!(AnalysisConfig::load(&path), Err(AnalysisError::Json(_))));

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_resolve_explicit_path_wins() {
        let path = temp_path("food_desert_resilience_test_explicit.json");
        fs::write(&path, r#"{"thresholds": {"top_n": 3}}"#).unwrap();

        let config = AnalysisConfig::resolve(Some(&path)).unwrap();
        assert_eq!(config.thresholds.top_n, 3);

        fs::remove_file(&path).unwrap();
    }
}
