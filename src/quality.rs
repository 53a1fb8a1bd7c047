//! Data quality findings and the explicitly labelled "clean" subset.
//!
//! Suspect tracts are reported, never dropped or clamped in place. Reports
//! that want to exclude them build a separate [`CleanDataset`] and say so
//! in their output.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::stats;
use crate::tract::Tract;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DataQualityWarning {
    /// Poverty rate of exactly 0% or 100%.
    PovertyBoundary { tract: String, poverty_rate: f64 },
    TinyPopulation { tract: String, population: u64 },
    HighGroupQuarters { tract: String, group_quarters_pct: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityThresholds {
    /// Populations strictly below this are implausibly small.
    pub tiny_population: u64,
    /// Group-quarters shares strictly above this suggest an institution.
    pub high_group_quarters_pct: f64,
}

impl Default for QualityThresholds {
    fn default() -> Self {
        Self {
            tiny_population: 500,
            high_group_quarters_pct: 20.0,
        }
    }
}

/// Every warning raised by `tracts`, in tract order. A tract can raise
/// more than one.
pub fn scan(tracts: &[&Tract], thresholds: &QualityThresholds) -> Vec<DataQualityWarning> {
    let mut warnings = Vec::new();

    for tract in tracts {
        if let Some(rate) = tract.poverty_rate {
            if rate == 0.0 || rate == 100.0 {
                warnings.push(DataQualityWarning::PovertyBoundary {
                    tract: tract.id.clone(),
                    poverty_rate: rate,
                });
            }
        }
        if let Some(population) = tract.population {
            if population < thresholds.tiny_population {
                warnings.push(DataQualityWarning::TinyPopulation {
                    tract: tract.id.clone(),
                    population,
                });
            }
        }
        if let Some(pct) = tract.group_quarters_pct {
            if pct > thresholds.high_group_quarters_pct {
                warnings.push(DataQualityWarning::HighGroupQuarters {
                    tract: tract.id.clone(),
                    group_quarters_pct: pct,
                });
            }
        }
    }

    warnings
}

/// Per-kind warning counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QualitySummary {
    pub poverty_boundary: usize,
    pub tiny_population: usize,
    pub high_group_quarters: usize,
}

impl QualitySummary {
    pub fn from_warnings(warnings: &[DataQualityWarning]) -> Self {
        let mut summary = Self::default();
        for w in warnings {
            match w {
                DataQualityWarning::PovertyBoundary { .. } => summary.poverty_boundary += 1,
                DataQualityWarning::TinyPopulation { .. } => summary.tiny_population += 1,
                DataQualityWarning::HighGroupQuarters { .. } => summary.high_group_quarters += 1,
            }
        }
        summary
    }
}

/// Logs each warning at debug level and a per-kind summary at warn level.
pub fn report(warnings: &[DataQualityWarning]) -> QualitySummary {
    for w in warnings {
        debug!(warning = ?w, "Data quality");
    }
    let summary = QualitySummary::from_warnings(warnings);
    if !warnings.is_empty() {
        warn!(
            poverty_boundary = summary.poverty_boundary,
            tiny_population = summary.tiny_population,
            high_group_quarters = summary.high_group_quarters,
            "Suspect tracts kept in the sample; review before publishing"
        );
    }
    summary
}

/// Bounds a tract must fall strictly inside to count as "clean". A tract
/// with any of these attributes null is excluded.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanFilter {
    pub max_group_quarters_pct: f64,
    pub min_population: u64,
    pub min_poverty_rate: f64,
    pub max_poverty_rate: f64,
}

impl Default for CleanFilter {
    fn default() -> Self {
        Self {
            max_group_quarters_pct: 10.0,
            min_population: 1000,
            min_poverty_rate: 5.0,
            max_poverty_rate: 90.0,
        }
    }
}

impl CleanFilter {
    pub fn keeps(&self, tract: &Tract) -> bool {
        let (Some(gq), Some(population), Some(poverty)) =
            (tract.group_quarters_pct, tract.population, tract.poverty_rate)
        else {
            return false;
        };

        gq < self.max_group_quarters_pct
            && population > self.min_population
            && poverty > self.min_poverty_rate
            && poverty < self.max_poverty_rate
    }
}

/// A separately labelled subset with special populations removed.
#[derive(Debug, Clone)]
pub struct CleanDataset<'a> {
    pub label: &'static str,
    pub tracts: Vec<&'a Tract>,
    pub original_count: usize,
}

impl<'a> CleanDataset<'a> {
    pub fn new(tracts: &[&'a Tract], filter: &CleanFilter) -> Self {
        Self {
            label: "clean",
            tracts: tracts.iter().copied().filter(|t| filter.keeps(t)).collect(),
            original_count: tracts.len(),
        }
    }

    pub fn removed(&self) -> usize {
        self.original_count - self.tracts.len()
    }

    pub fn removed_pct(&self) -> f64 {
        stats::pct(self.removed(), self.original_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tract(id: &str, poverty: f64, population: u64, gq: f64) -> Tract {
        let mut t = Tract::new(id, 0.0, 0.0);
        t.poverty_rate = Some(poverty);
        t.population = Some(population);
        t.group_quarters_pct = Some(gq);
        t
    }

    #[test]
    fn test_scan_flags_each_kind() {
        let prison = tract("a", 100.0, 300, 85.0);
        let normal = tract("b", 25.0, 4000, 1.0);
        let zero = tract("c", 0.0, 2000, 0.0);

        let warnings = scan(&[&prison, &normal, &zero], &QualityThresholds::default());
        let summary = QualitySummary::from_warnings(&warnings);

        assert_eq!(warnings.len(), 4);
        assert_eq!(summary.poverty_boundary, 2);
        assert_eq!(summary.tiny_population, 1);
        assert_eq!(summary.high_group_quarters, 1);
    }

    #[test]
    fn test_scan_ignores_nulls() {
        let unknown = Tract::new("a", 0.0, 0.0);
        assert!(scan(&[&unknown], &QualityThresholds::default()).is_empty());
    }

    #[test]
    fn test_clean_dataset_is_a_separate_subset() {
        let prison = tract("a", 100.0, 300, 85.0);
        let normal = tract("b", 25.0, 4000, 1.0);
        let unknown = Tract::new("c", 0.0, 0.0);
        let all = [&prison, &normal, &unknown];

        let clean = CleanDataset::new(&all, &CleanFilter::default());

        assert_eq!(clean.label, "clean");
        assert_eq!(clean.tracts.len(), 1);
        assert_eq!(clean.tracts[0].id, "b");
        assert_eq!(clean.removed(), 2);
        assert!((clean.removed_pct() - 66.666).abs() < 0.01);
        // the source slice is untouched
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn test_clean_bounds_are_strict() {
        let filter = CleanFilter::default();
        assert!(!filter.keeps(&tract("a", 5.0, 2000, 1.0)));
        assert!(!filter.keeps(&tract("a", 50.0, 1000, 1.0)));
        assert!(!filter.keeps(&tract("a", 50.0, 2000, 10.0)));
        assert!(filter.keeps(&tract("a", 50.0, 1001, 9.9)));
    }
}
