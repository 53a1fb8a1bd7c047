//! How the resilient set moves when the LILA definition changes, plus the
//! headline summary of the whole dataset.

use std::collections::HashSet;

use anyhow::Result;
use chrono::Utc;
use tracing::info;

use crate::aggregate::{Aggregation, GroupBy, Measure, SortOrder};
use crate::classify::ResilienceClassification;
use crate::config::AnalysisConfig;
use crate::output::{write_json, write_matrix, write_records};
use crate::reports::types::{CaseStudyRow, ResilienceSummary, SensitivityRow};
use crate::reports::{mean_score, sort_by_score};
use crate::stats;
use crate::tract::{CategoricalField, LilaDefinition, NumericField, Tract};

pub const OVERLAP_FILE: &str = "lila_overlap.csv";
pub const SENSITIVITY_FILE: &str = "lila_sensitivity.csv";
pub const CASE_STUDY_FILE: &str = "case_study_candidates.csv";
pub const SUMMARY_FILE: &str = "resilience_summary.json";

const TOP_STATE_TRACTS: usize = 30;

/// Tracts flagged under each LILA definition, as (definition, count, % of all).
pub fn prevalence(tracts: &[Tract]) -> Vec<(LilaDefinition, usize, f64)> {
    LilaDefinition::ALL
        .iter()
        .map(|&d| {
            let n = tracts.iter().filter(|t| t.is_lila(d)).count();
            (d, n, stats::pct(n, tracts.len()))
        })
        .collect()
}

/// Tracts flagged under both definitions. Only the upper triangle and the
/// diagonal are filled.
pub fn overlap(tracts: &[Tract]) -> Vec<Vec<Option<f64>>> {
    let defs = LilaDefinition::ALL;
    defs.iter()
        .enumerate()
        .map(|(i, &a)| {
            defs.iter()
                .enumerate()
                .map(|(j, &b)| {
                    (i <= j).then(|| tracts.iter().filter(|t| t.is_lila(a) && t.is_lila(b)).count() as f64)
                })
                .collect()
        })
        .collect()
}

/// Resilience within one LILA set, the cutoff recomputed over that set.
pub fn sensitivity_row(config: &AnalysisConfig, tracts: &[Tract], definition: LilaDefinition) -> Result<SensitivityRow> {
    let set: Vec<&Tract> = tracts.iter().filter(|t| t.is_lila(definition)).collect();
    if set.is_empty() {
        return Ok(SensitivityRow {
            threshold: definition.name(),
            n_lila: 0,
            n_resilient: 0,
            pct_resilient: None,
            mean_resilience: None,
            std_resilience: None,
        });
    }

    let classification = ResilienceClassification::new(&set, config.thresholds.split())?;
    let n_resilient = classification.resilient().len();
    let scores: Vec<f64> = set.iter().map(|t| t.resilience_score).collect();

    Ok(SensitivityRow {
        threshold: definition.name(),
        n_lila: set.len(),
        n_resilient,
        pct_resilient: Some(stats::pct(n_resilient, set.len())),
        mean_resilience: stats::mean(&scores),
        std_resilience: stats::sample_stddev(&scores),
    })
}

fn describe(name: &str, values: &[f64]) {
    let quartile = |p| stats::percentile(values, p).ok();
    info!(
        variable = name,
        count = values.len(),
        mean = stats::mean(values),
        std = stats::sample_stddev(values),
        min = stats::min(values),
        q25 = quartile(0.25),
        median = quartile(0.5),
        q75 = quartile(0.75),
        max = stats::max(values),
        "Describe"
    );
}

fn states_covered(tracts: &[Tract]) -> usize {
    tracts
        .iter()
        .filter_map(|t| t.state_abbr.as_deref())
        .collect::<HashSet<_>>()
        .len()
}

#[tracing::instrument(skip_all)]
pub fn run(config: &AnalysisConfig, tracts: &[Tract]) -> Result<ResilienceSummary> {
    for (definition, n, pct) in prevalence(tracts) {
        info!(
            definition = definition.name(),
            tracts = n,
            pct = stats::round_to(pct, 1),
            "LILA prevalence"
        );
    }

    let labels: Vec<&str> = LilaDefinition::ALL.iter().map(|d| d.column()).collect();
    write_matrix(&config.paths.tables_dir.join(OVERLAP_FILE), &labels, &overlap(tracts), 0)?;

    let sensitivity = LilaDefinition::DISTANCE
        .iter()
        .map(|&d| sensitivity_row(config, tracts, d))
        .collect::<Result<Vec<_>>>()?;
    for row in &sensitivity {
        info!(
            threshold = row.threshold,
            n_lila = row.n_lila,
            n_resilient = row.n_resilient,
            pct_resilient = row.pct_resilient,
            "Resilience under LILA definition"
        );
    }
    write_records(&config.paths.tables_dir.join(SENSITIVITY_FILE), &sensitivity)?;

    let states = states_covered(tracts);
    info!(tracts = tracts.len(), states, "Dataset");
    describe("burden", &tracts.iter().map(|t| t.burden).collect::<Vec<_>>());
    describe(
        "resilience_score",
        &tracts.iter().map(|t| t.resilience_score).collect::<Vec<_>>(),
    );

    let mut ranked: Vec<&Tract> = tracts.iter().collect();
    sort_by_score(&mut ranked, SortOrder::Descending);
    ranked.truncate(TOP_STATE_TRACTS);
    let by_state = GroupBy::new(&[CategoricalField::StateAbbr])
        .measure(Measure::new(NumericField::ResilienceScore, Aggregation::Count).named("Count"))
        .sort_by("Count")
        .run(&ranked)?;
    for row in &by_state.rows {
        info!(
            state = row.keys[0].as_deref().unwrap_or("unknown"),
            tracts = row.values[0],
            "Top resilient tracts by state"
        );
    }

    let all: Vec<&Tract> = tracts.iter().collect();
    let classification = ResilienceClassification::new(&all, config.thresholds.split())?;
    let resilient = classification.resilient();
    let mut candidates: Vec<&Tract> = resilient
        .iter()
        .copied()
        .filter(|t| t.is_lila(LilaDefinition::OneAndTen))
        .collect();
    sort_by_score(&mut candidates, SortOrder::Descending);
    let lila_high_resilience = candidates.len();

    let rows: Vec<CaseStudyRow> = candidates
        .iter()
        .take(config.thresholds.top_tracts)
        .map(|t| CaseStudyRow::from(*t))
        .collect();
    write_records(&config.paths.output_dir.join(CASE_STUDY_FILE), &rows)?;
    info!(
        cutoff = classification.cutoffs.high,
        candidates = lila_high_resilience,
        "Case study candidates"
    );

    let summary = ResilienceSummary {
        total_tracts: tracts.len(),
        states_covered: states,
        mean_resilience: mean_score(&all),
        resilient_tracts: resilient.len(),
        lila_high_resilience,
        sensitivity,
        generated_at: Utc::now(),
    };
    write_json(&config.paths.output_dir.join(SUMMARY_FILE), &summary)?;

    Ok(summary)
}
