//! Percentile-based bucketing of tract populations.
//!
//! Cut points are always computed over the collection being classified, so
//! "resilient" means top decile *of this selection*, never of some global
//! reference population.

use std::fmt;

use tracing::{debug, warn};

use crate::error::{AnalysisError, Result};
use crate::stats::percentile;
use crate::tract::{CategoricalField, Fields, NumericField, Tract};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bucket {
    Low,
    Middle,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResilienceBucket {
    Resilient,
    Vulnerable,
    Neither,
}

impl From<Bucket> for ResilienceBucket {
    fn from(bucket: Bucket) -> Self {
        match bucket {
            Bucket::Low => ResilienceBucket::Vulnerable,
            Bucket::Middle => ResilienceBucket::Neither,
            Bucket::High => ResilienceBucket::Resilient,
        }
    }
}

impl fmt::Display for ResilienceBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResilienceBucket::Resilient => f.write_str("Resilient"),
            ResilienceBucket::Vulnerable => f.write_str("Vulnerable"),
            ResilienceBucket::Neither => f.write_str("Neither"),
        }
    }
}

/// Lower and upper percentile, as fractions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PercentileSplit {
    pub low: f64,
    pub high: f64,
}

impl Default for PercentileSplit {
    fn default() -> Self {
        Self {
            low: 0.10,
            high: 0.90,
        }
    }
}

/// Concrete cut values for one population.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cutoffs {
    pub low: f64,
    pub high: f64,
}

impl Cutoffs {
    /// `value <= low` is low, `value >= high` is high, anything else middle.
    /// When both cuts coincide the low test wins.
    pub fn bucket(&self, value: f64) -> Bucket {
        if value <= self.low {
            Bucket::Low
        } else if value >= self.high {
            Bucket::High
        } else {
            Bucket::Middle
        }
    }

    /// Computes both cut points over `values`.
    ///
    /// # Errors
    ///
    /// [`AnalysisError::EmptyInput`] when `values` is empty.
    pub fn from_values(values: &[f64], split: PercentileSplit) -> Result<Self> {
        if values.is_empty() {
            return Err(AnalysisError::EmptyInput {
                operation: "threshold classification",
            });
        }
        Ok(Self {
            low: percentile(values, split.low)?,
            high: percentile(values, split.high)?,
        })
    }
}

/// Bucket assignment for every item of a classified collection, in input
/// order. Items with a null value for the field get `None`.
#[derive(Debug, Clone)]
pub struct Classification {
    pub cutoffs: Cutoffs,
    pub buckets: Vec<Option<Bucket>>,
    /// Fewer than two distinct values: both cut points are the same value.
    pub degenerate: bool,
}

impl Classification {
    pub fn count(&self, bucket: Bucket) -> usize {
        self.buckets.iter().filter(|b| **b == Some(bucket)).count()
    }
}

/// Splits `items` into low/middle/high buckets on `field` using
/// percentiles of exactly these items.
///
/// # Errors
///
/// [`AnalysisError::EmptyInput`] when no item has a value for `field`.
pub fn classify<T: Fields>(items: &[T], field: NumericField, split: PercentileSplit) -> Result<Classification> {
    let values: Vec<f64> = items.iter().filter_map(|i| i.numeric(field)).collect();
    let cutoffs = Cutoffs::from_values(&values, split)?;

    let degenerate = values.iter().all(|v| *v == values[0]);
    if degenerate {
        warn!(
            field = field.name(),
            value = values[0],
            rows = values.len(),
            "Fewer than two distinct values; percentile cut points collapse"
        );
    }

    let buckets = items
        .iter()
        .map(|i| i.numeric(field).map(|v| cutoffs.bucket(v)))
        .collect();

    debug!(
        field = field.name(),
        rows = items.len(),
        low_cut = cutoffs.low,
        high_cut = cutoffs.high,
        "Classified"
    );

    Ok(Classification {
        cutoffs,
        buckets,
        degenerate,
    })
}

/// A tract viewed through one resilience classification.
#[derive(Debug, Clone, Copy)]
pub struct Classified<'a> {
    pub tract: &'a Tract,
    pub bucket: ResilienceBucket,
}

impl Fields for Classified<'_> {
    fn categorical(&self, field: CategoricalField) -> Option<String> {
        match field {
            CategoricalField::Bucket => Some(self.bucket.to_string()),
            other => self.tract.categorical(other),
        }
    }

    fn numeric(&self, field: NumericField) -> Option<f64> {
        let flag = |b: bool| Some(if b { 1.0 } else { 0.0 });
        match field {
            NumericField::Resilient => flag(self.bucket == ResilienceBucket::Resilient),
            NumericField::Vulnerable => flag(self.bucket == ResilienceBucket::Vulnerable),
            other => self.tract.numeric(other),
        }
    }
}

/// Resilience buckets for a selection of tracts.
#[derive(Debug, Clone)]
pub struct ResilienceClassification<'a> {
    pub cutoffs: Cutoffs,
    pub tracts: Vec<Classified<'a>>,
}

impl<'a> ResilienceClassification<'a> {
    /// Classifies `tracts` on resilience score against their own percentiles.
    pub fn new(tracts: &[&'a Tract], split: PercentileSplit) -> Result<Self> {
        let classification = classify(tracts, NumericField::ResilienceScore, split)?;
        let tracts = tracts
            .iter()
            .zip(&classification.buckets)
            .map(|(&tract, bucket)| Classified {
                tract,
                // the score is never null, so every tract has a bucket
                bucket: bucket.map(ResilienceBucket::from).unwrap_or(ResilienceBucket::Neither),
            })
            .collect();

        Ok(Self {
            cutoffs: classification.cutoffs,
            tracts,
        })
    }

    pub fn in_bucket(&self, bucket: ResilienceBucket) -> Vec<&'a Tract> {
        self.tracts
            .iter()
            .filter(|c| c.bucket == bucket)
            .map(|c| c.tract)
            .collect()
    }

    pub fn resilient(&self) -> Vec<&'a Tract> {
        self.in_bucket(ResilienceBucket::Resilient)
    }

    pub fn vulnerable(&self) -> Vec<&'a Tract> {
        self.in_bucket(ResilienceBucket::Vulnerable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracts_with_scores(scores: &[f64]) -> Vec<Tract> {
        scores
            .iter()
            .enumerate()
            .map(|(i, s)| Tract::new(format!("{:011}", i + 1), *s, 0.0))
            .collect()
    }

    #[test]
    fn test_even_spacing_splits_10_80_10() {
        let scores: Vec<f64> = (1..=100).map(f64::from).collect();
        let tracts = tracts_with_scores(&scores);

        let c = classify(&tracts, NumericField::ResilienceScore, PercentileSplit::default()).unwrap();

        assert!((c.cutoffs.low - 10.9).abs() < 1e-9);
        assert!((c.cutoffs.high - 90.1).abs() < 1e-9);
        assert_eq!(c.count(Bucket::Low), 10);
        assert_eq!(c.count(Bucket::Middle), 80);
        assert_eq!(c.count(Bucket::High), 10);
        assert!(!c.degenerate);
    }

    #[test]
    fn test_five_scores() {
        let tracts = tracts_with_scores(&[-2.0, -1.0, 0.0, 1.0, 2.0]);
        let c = classify(&tracts, NumericField::ResilienceScore, PercentileSplit::default()).unwrap();

        assert_eq!(
            c.buckets,
            vec![
                Some(Bucket::Low),
                Some(Bucket::Middle),
                Some(Bucket::Middle),
                Some(Bucket::Middle),
                Some(Bucket::High)
            ]
        );
    }

    #[test]
    fn test_empty_collection_is_error() {
        let tracts: Vec<Tract> = Vec::new();
        assert!(matches!(
            classify(&tracts, NumericField::ResilienceScore, PercentileSplit::default()),
            Err(AnalysisError::EmptyInput { .. })
        ));
    }

    #[test]
    fn test_single_value_degenerates_to_low() {
        let tracts = tracts_with_scores(&[0.5, 0.5, 0.5]);
        let c = classify(&tracts, NumericField::ResilienceScore, PercentileSplit::default()).unwrap();

        assert!(c.degenerate);
        assert_eq!(c.cutoffs.low, c.cutoffs.high);
        assert_eq!(c.count(Bucket::Low), 3);
    }

    #[test]
    fn test_null_values_are_unclassified() {
        let mut tracts = tracts_with_scores(&[1.0, 2.0, 3.0]);
        tracts[0].poverty_rate = Some(10.0);
        tracts[2].poverty_rate = Some(30.0);

        let c = classify(&tracts, NumericField::PovertyRate, PercentileSplit::default()).unwrap();

        assert_eq!(c.buckets[1], None);
        assert_eq!(c.buckets[0], Some(Bucket::Low));
        assert_eq!(c.buckets[2], Some(Bucket::High));
    }

    #[test]
    fn test_percentiles_follow_the_selection() {
        let all = tracts_with_scores(&(1..=20).map(f64::from).collect::<Vec<_>>());
        let top_half: Vec<&Tract> = all.iter().filter(|t| t.resilience_score > 10.0).collect();

        let classification = ResilienceClassification::new(&top_half, PercentileSplit::default()).unwrap();

        // 11..=20: the low cut sits just above 11, not near 2
        assert!(classification.cutoffs.low > 11.0);
        assert_eq!(classification.vulnerable().len(), 1);
        assert_eq!(classification.resilient().len(), 1);
        assert_eq!(classification.resilient()[0].resilience_score, 20.0);
    }

    #[test]
    fn test_classified_fields() {
        let tract = Tract::new("00100000001", 2.0, 0.0);
        let view = Classified {
            tract: &tract,
            bucket: ResilienceBucket::Resilient,
        };

        assert_eq!(view.categorical(CategoricalField::Bucket).as_deref(), Some("Resilient"));
        assert_eq!(view.numeric(NumericField::Resilient), Some(1.0));
        assert_eq!(view.numeric(NumericField::Vulnerable), Some(0.0));
        assert_eq!(view.numeric(NumericField::ResilienceScore), Some(2.0));
    }
}
