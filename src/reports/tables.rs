//! Publication tables and robustness checks, written as CSV.

use anyhow::Result;
use serde::Serialize;
use tracing::info;

use crate::aggregate::{AggregateTable, Aggregation, GroupBy, Measure, SortOrder};
use crate::classify::{Classified, ResilienceClassification};
use crate::config::AnalysisConfig;
use crate::output::{write_aggregate, write_matrix, write_records};
use crate::reports::types::{DescriptiveRow, QuantileRow, SpatialRow, TopTractRow};
use crate::reports::{lila_tracts, sort_by_score};
use crate::stats;
use crate::tract::{CategoricalField, Fields, LilaDefinition, NumericField, Tract};

pub const DESCRIPTIVE_FILE: &str = "table1_descriptive_stats.csv";
pub const STATE_FILE: &str = "table3_state_resilience.csv";
pub const TOP_TRACTS_FILE: &str = "top_20_resilient_lila.csv";
pub const CORRELATION_FILE: &str = "correlation_matrix.csv";
pub const SPATIAL_FILE: &str = "spatial_autocorrelation.csv";
pub const QUANTILE_FILE: &str = "quantile_summary.csv";

pub const QUANTILES: [f64; 5] = [0.10, 0.25, 0.50, 0.75, 0.90];

const CORRELATION_FIELDS: [NumericField; 7] = [
    NumericField::Burden,
    NumericField::ResilienceScore,
    NumericField::Lila(LilaDefinition::OneAndTen),
    NumericField::LowIncome,
    NumericField::PovertyRate,
    NumericField::MedianFamilyIncome,
    NumericField::Rural,
];

#[derive(Debug, Clone, Serialize)]
pub struct TablesSummary {
    pub global_autocorrelation: Option<f64>,
    pub significant_states: usize,
}

fn fixed(value: Option<f64>, places: usize) -> String {
    value.map(|v| format!("{v:.places$}")).unwrap_or_else(|| "-".to_string())
}

fn continuous_row(variable: &'static str, tracts: &[Tract], field: NumericField) -> DescriptiveRow {
    let values: Vec<f64> = tracts.iter().filter_map(|t| t.numeric(field)).collect();
    DescriptiveRow {
        variable,
        n: values.len(),
        mean: fixed(stats::mean(&values), 3),
        sd: fixed(stats::sample_stddev(&values), 3),
        min: fixed(stats::min(&values), 2),
        max: fixed(stats::max(&values), 2),
        missing: tracts.len() - values.len(),
    }
}

fn indicator_row(variable: &'static str, tracts: &[Tract], field: NumericField) -> DescriptiveRow {
    let values: Vec<f64> = tracts.iter().filter_map(|t| t.numeric(field)).collect();
    let pct = stats::mean(&values).map(|m| m * 100.0).unwrap_or(0.0);
    DescriptiveRow {
        variable,
        n: values.len(),
        mean: format!("{pct:.1}%"),
        sd: "-".to_string(),
        min: "0".to_string(),
        max: "1".to_string(),
        missing: tracts.len() - values.len(),
    }
}

/// Table 1: continuous measures, then the distance LILA definitions, the
/// low-income flag and rural status.
pub fn descriptive_stats(tracts: &[Tract]) -> Vec<DescriptiveRow> {
    let mut rows = vec![
        continuous_row("Health Burden Index", tracts, NumericField::Burden),
        continuous_row("Resilience Score", tracts, NumericField::ResilienceScore),
    ];
    for definition in LilaDefinition::DISTANCE {
        rows.push(indicator_row(definition.label(), tracts, NumericField::Lila(definition)));
    }
    rows.push(indicator_row("Low Income Tract", tracts, NumericField::LowIncome));
    rows.push(indicator_row("Rural", tracts, NumericField::Rural));
    rows
}

/// Table 3: per state, LILA tracts at or above the high percentile of all
/// tracts.
pub fn state_resilience(config: &AnalysisConfig, tracts: &[Tract]) -> Result<AggregateTable> {
    let all: Vec<&Tract> = tracts.iter().collect();
    let classification = ResilienceClassification::new(&all, config.thresholds.split())?;
    let lila: Vec<Classified> = classification
        .tracts
        .iter()
        .filter(|c| c.tract.is_lila(LilaDefinition::OneAndTen))
        .copied()
        .collect();

    let mut table = GroupBy::new(&[CategoricalField::StateAbbr])
        .measure(Measure::new(NumericField::Resilient, Aggregation::CountTrue).named("Resilient_LILA_Tracts"))
        .measure(Measure::new(NumericField::ResilienceScore, Aggregation::Count).named("Total_LILA_Tracts"))
        .measure(Measure::new(NumericField::ResilienceScore, Aggregation::Mean).named("Mean_Resilience"))
        .measure(Measure::new(NumericField::Resilient, Aggregation::PercentTrue).named("Pct_Resilient"))
        .sort_by("Resilient_LILA_Tracts")
        .limit(config.thresholds.top_n)
        .run(&lila)?;
    table.round_column("Mean_Resilience", 3);
    table.round_column("Pct_Resilient", 1);
    Ok(table)
}

/// Pairwise-complete Pearson correlations of the key variables.
pub fn correlation_matrix(tracts: &[Tract]) -> Vec<Vec<Option<f64>>> {
    CORRELATION_FIELDS
        .iter()
        .map(|&x| {
            CORRELATION_FIELDS
                .iter()
                .map(|&y| {
                    let (xs, ys): (Vec<f64>, Vec<f64>) = tracts
                        .iter()
                        .filter_map(|t| Some((t.numeric(x)?, t.numeric(y)?)))
                        .unzip();
                    stats::pearson(&xs, &ys)
                })
                .collect()
        })
        .collect()
}

/// Per-state lag-1 autocorrelation of residuals in input order, a proxy
/// for spatial clustering. Returns the rows for states with more than the
/// configured number of tracts and the mean over every state.
pub fn spatial_autocorrelation(config: &AnalysisConfig, tracts: &[Tract]) -> Result<(Vec<SpatialRow>, Option<f64>)> {
    let table = GroupBy::new(&[CategoricalField::StateAbbr])
        .measure(Measure::new(NumericField::ResilienceScore, Aggregation::Count).named("N_Tracts"))
        .measure(Measure::new(NumericField::Residual, Aggregation::Autocorrelation).named("Spatial_Correlation"))
        .run(tracts)?;

    let all: Vec<f64> = table.rows.iter().filter_map(|r| r.values[1]).collect();
    let global = stats::mean(&all);

    let rows = table
        .rows
        .into_iter()
        .map(|r| SpatialRow {
            state: r.keys[0].clone(),
            n_tracts: r.values[0].unwrap_or_default() as usize,
            correlation: r.values[1],
        })
        .filter(|r| r.n_tracts > config.thresholds.min_autocorrelation_tracts)
        .collect();

    Ok((rows, global))
}

/// Burden thresholds across the distribution, and the gap between the
/// LILA and non-LILA burden at each quantile.
pub fn quantile_summary(tracts: &[Tract]) -> Result<Vec<QuantileRow>> {
    let burden: Vec<f64> = tracts.iter().map(|t| t.burden).collect();
    let by_flag = |flag: bool| -> Vec<f64> {
        tracts
            .iter()
            .filter(|t| t.lila_flag(LilaDefinition::OneAndTen) == Some(flag))
            .map(|t| t.burden)
            .collect()
    };
    let lila = by_flag(true);
    let other = by_flag(false);

    QUANTILES
        .iter()
        .map(|&q| -> Result<QuantileRow> {
            let threshold = stats::percentile(&burden, q)?;
            let lila_effect = match (stats::percentile(&lila, q), stats::percentile(&other, q)) {
                (Ok(l), Ok(o)) => Some(l - o),
                _ => None,
            };
            Ok(QuantileRow {
                quantile: q,
                burden_threshold: threshold,
                lila_effect,
                n_above: burden.iter().filter(|b| **b > threshold).count(),
            })
        })
        .collect()
}

#[tracing::instrument(skip_all)]
pub fn run(config: &AnalysisConfig, tracts: &[Tract]) -> Result<TablesSummary> {
    let dir = &config.paths.tables_dir;

    write_records(&dir.join(DESCRIPTIVE_FILE), &descriptive_stats(tracts))?;

    let states = state_resilience(config, tracts)?;
    write_aggregate(&dir.join(STATE_FILE), &states, 3)?;

    let mut top = lila_tracts(tracts);
    sort_by_score(&mut top, SortOrder::Descending);
    top.truncate(config.thresholds.top_tracts);
    let top_rows: Vec<TopTractRow> = top.iter().map(|t| TopTractRow::from(*t)).collect();
    write_records(&dir.join(TOP_TRACTS_FILE), &top_rows)?;

    let labels: Vec<&str> = CORRELATION_FIELDS.iter().map(|f| f.name()).collect();
    write_matrix(&dir.join(CORRELATION_FILE), &labels, &correlation_matrix(tracts), 4)?;

    let (spatial, global) = spatial_autocorrelation(config, tracts)?;
    let significant_states = spatial
        .iter()
        .filter(|r| {
            r.correlation
                .is_some_and(|c| c.abs() > config.thresholds.significant_autocorrelation)
        })
        .count();
    info!(
        global_correlation = global,
        states = spatial.len(),
        significant_states,
        "Spatial autocorrelation (simplified)"
    );
    write_records(&dir.join(SPATIAL_FILE), &spatial)?;

    let quantiles = quantile_summary(tracts)?;
    let effects: Vec<f64> = quantiles.iter().filter_map(|q| q.lila_effect).collect();
    info!(
        effect_spread = stats::sample_stddev(&effects),
        "LILA burden effect across the distribution"
    );
    write_records(&dir.join(QUANTILE_FILE), &quantiles)?;

    info!(dir = %dir.display(), "Tables written");
    Ok(TablesSummary {
        global_autocorrelation: global,
        significant_states,
    })
}
