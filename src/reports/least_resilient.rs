//! Least resilient LILA communities: low-access tracts doing worse than the
//! model predicts, and how they differ from the most resilient ones.

use anyhow::Result;
use serde::Serialize;
use tracing::info;

use crate::aggregate::{Aggregation, GroupBy, Measure, SortOrder};
use crate::classify::ResilienceClassification;
use crate::config::AnalysisConfig;
use crate::output::write_records;
use crate::reports::types::{ComparisonRow, LocatedTractRow};
use crate::reports::{lila_tracts, share, sort_by_score};
use crate::stats;
use crate::tract::{CategoricalField, Fields, NumericField, Tract};

pub const TRACTS_FILE: &str = "least_resilient_lila_tracts.csv";
pub const COMPARISON_FILE: &str = "least_vs_most_resilient_comparison.csv";

pub const SOUTHERN_STATES: &[&str] = &[
    "Texas",
    "Louisiana",
    "Mississippi",
    "Alabama",
    "Georgia",
    "Florida",
    "South Carolina",
    "North Carolina",
    "Tennessee",
    "Kentucky",
    "West Virginia",
    "Virginia",
    "Arkansas",
    "Oklahoma",
];

#[derive(Debug, Clone, Serialize)]
pub struct LeastResilientSummary {
    pub lila_tracts: usize,
    pub cutoff: f64,
    pub least_resilient: usize,
    pub rural_pct: f64,
    pub high_poverty_pct: f64,
    pub southern_pct: f64,
}

fn values(tracts: &[&Tract], field: NumericField) -> Vec<f64> {
    tracts.iter().filter_map(|t| t.numeric(field)).collect()
}

/// Side-by-side profile of the least and most resilient groups.
pub fn compare(least: &[&Tract], most: &[&Tract]) -> Vec<ComparisonRow> {
    let metrics: [(&'static str, NumericField, fn(&[f64]) -> Option<f64>); 6] = [
        ("Mean Resilience Score", NumericField::ResilienceScore, stats::mean),
        ("Mean Health Burden", NumericField::Burden, stats::mean),
        ("Mean Poverty Rate", NumericField::PovertyRate, stats::mean),
        ("Median Income", NumericField::MedianFamilyIncome, stats::median),
        ("Percent Urban", NumericField::Urban, |v| stats::mean(v).map(|m| m * 100.0)),
        ("Mean Population", NumericField::Population, stats::mean),
    ];

    metrics
        .into_iter()
        .map(|(metric, field, summarize)| {
            ComparisonRow::new(metric, summarize(&values(least, field)), summarize(&values(most, field)))
        })
        .collect()
}

fn log_counts(tracts: &[&Tract], keys: &[CategoricalField], top_n: usize, message: &str) -> Result<()> {
    let table = GroupBy::new(keys)
        .measure(Measure::new(NumericField::ResilienceScore, Aggregation::Count).named("Count"))
        .sort_by("Count")
        .limit(top_n)
        .run(tracts)?;

    for row in &table.rows {
        let place = row
            .keys
            .iter()
            .map(|k| k.as_deref().unwrap_or("unknown"))
            .collect::<Vec<_>>()
            .join(", ");
        info!(place, tracts = row.values[0], "{message}");
    }
    Ok(())
}

#[tracing::instrument(skip_all)]
pub fn run(config: &AnalysisConfig, tracts: &[Tract]) -> Result<LeastResilientSummary> {
    let out = &config.paths.output_dir;
    let thresholds = &config.thresholds;

    let lila = lila_tracts(tracts);
    let classification = ResilienceClassification::new(&lila, thresholds.split())?;
    let mut least = classification.vulnerable();
    sort_by_score(&mut least, SortOrder::Ascending);

    info!(
        lila_tracts = lila.len(),
        cutoff = classification.cutoffs.low,
        least_resilient = least.len(),
        "Least resilient LILA tracts"
    );

    for (rank, tract) in least.iter().take(thresholds.top_tracts).enumerate() {
        info!(
            rank = rank + 1,
            tract = %tract.id,
            county = tract.county.as_deref().unwrap_or("unknown"),
            state = tract.state.as_deref().unwrap_or("unknown"),
            resilience_score = stats::round_to(tract.resilience_score, 2),
            burden = stats::round_to(tract.burden, 2),
            poverty_rate = tract.poverty_rate,
            population = tract.population,
            settlement = %tract.settlement().map(|s| s.to_string()).unwrap_or_default(),
            map = %tract.map_url().unwrap_or_default(),
            "Least resilient tract"
        );
    }

    log_counts(&least, &[CategoricalField::State], thresholds.top_n, "Least resilient tracts by state")?;
    log_counts(
        &least,
        &[CategoricalField::County, CategoricalField::State],
        thresholds.top_n,
        "Least resilient tracts by county",
    )?;

    let mut most = lila.clone();
    sort_by_score(&mut most, SortOrder::Descending);
    most.truncate(least.len());

    let comparison = compare(&least, &most);
    for row in &comparison {
        info!(
            metric = row.metric,
            least = row.least,
            most = row.most,
            difference = row.difference,
            "Most vs least resilient"
        );
    }
    write_records(&out.join(COMPARISON_FILE), &comparison)?;

    let rows: Vec<LocatedTractRow> = least.iter().map(|t| LocatedTractRow::new(t, "full")).collect();
    write_records(&out.join(TRACTS_FILE), &rows)?;

    let rural_pct = share(&least, |t| t.is_urban == Some(false));
    let high_poverty_pct = share(&least, |t| {
        t.poverty_rate.is_some_and(|p| p > thresholds.high_poverty_rate)
    });
    let southern_pct = share(&least, |t| {
        t.state.as_deref().is_some_and(|s| SOUTHERN_STATES.contains(&s))
    });
    info!(
        rural_pct = stats::round_to(rural_pct, 1),
        high_poverty_pct = stats::round_to(high_poverty_pct, 1),
        southern_pct = stats::round_to(southern_pct, 1),
        "Patterns in least resilient communities"
    );

    Ok(LeastResilientSummary {
        lila_tracts: lila.len(),
        cutoff: classification.cutoffs.low,
        least_resilient: least.len(),
        rural_pct,
        high_poverty_pct,
        southern_pct,
    })
}
