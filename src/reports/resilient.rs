//! Resilient LILA communities: low-access tracts whose health outcomes
//! beat the model's prediction by a top-decile margin.

use anyhow::Result;
use serde::Serialize;
use tracing::info;

use crate::aggregate::{AggregateTable, Aggregation, GroupBy, Measure, SortOrder};
use crate::classify::ResilienceClassification;
use crate::config::AnalysisConfig;
use crate::output::{write_aggregate, write_records};
use crate::reports::sort_by_score;
use crate::reports::types::{CollegeTractRow, MilitaryTractRow, ResilientTractRow};
use crate::stats::round_to;
use crate::tract::{
    COLLEGE_COUNTIES, CategoricalField, LilaDefinition, MILITARY_COUNTIES, NumericField, Tract, institution,
};

pub const COMMUNITIES_FILE: &str = "all_resilient_lila_communities.csv";
pub const COUNTIES_FILE: &str = "top_counties_resilient_lila.csv";
pub const COLLEGE_FILE: &str = "potential_college_resilient_tracts.csv";
pub const MILITARY_FILE: &str = "potential_military_resilient_tracts.csv";

const TOP_COUNTIES: usize = 30;

#[derive(Debug, Clone, Serialize)]
pub struct ResilientSummary {
    pub cutoff: f64,
    pub resilient_lila: usize,
    pub college_tracts: usize,
    pub military_tracts: usize,
    /// Counties with at least the configured number of resilient tracts.
    pub county_clusters: usize,
}

/// Resilient tracts are those at or above the high percentile of *all*
/// scored tracts that are also LILA, sorted by score descending.
pub fn resilient_lila<'a>(config: &AnalysisConfig, tracts: &'a [Tract]) -> Result<(f64, Vec<&'a Tract>)> {
    let all: Vec<&Tract> = tracts.iter().collect();
    let classification = ResilienceClassification::new(&all, config.thresholds.split())?;

    let mut resilient: Vec<&Tract> = classification
        .resilient()
        .into_iter()
        .filter(|t| t.is_lila(LilaDefinition::OneAndTen))
        .collect();
    sort_by_score(&mut resilient, SortOrder::Descending);

    Ok((classification.cutoffs.high, resilient))
}

fn state_summary(resilient: &[&Tract]) -> Result<AggregateTable> {
    let table = GroupBy::new(&[CategoricalField::State, CategoricalField::StateAbbr])
        .measure(Measure::new(NumericField::ResilienceScore, Aggregation::Count).named("Count"))
        .measure(Measure::new(NumericField::ResilienceScore, Aggregation::Mean).named("Mean_Resilience"))
        .measure(Measure::new(NumericField::Urban, Aggregation::CountTrue).named("Urban_Count"))
        .measure(Measure::new(NumericField::Rural, Aggregation::CountTrue).named("Rural_Count"))
        .sort_by("Count")
        .run(resilient)?;
    Ok(table)
}

fn county_summary() -> GroupBy {
    GroupBy::new(&[CategoricalField::County, CategoricalField::State])
        .measure(Measure::new(NumericField::ResilienceScore, Aggregation::Count).named("Tract_Count"))
        .measure(Measure::new(NumericField::ResilienceScore, Aggregation::Mean).named("Mean_Resilience"))
        .measure(Measure::new(NumericField::Population, Aggregation::Sum).named("Total_Population"))
        .sort_by("Tract_Count")
}

fn special_populations(resilient: &[&Tract]) -> (Vec<CollegeTractRow>, Vec<MilitaryTractRow>) {
    let mut college = Vec::new();
    let mut military = Vec::new();

    for tract in resilient {
        let Some(county) = tract.county.as_deref() else {
            continue;
        };
        if let Some(name) = institution(COLLEGE_COUNTIES, county) {
            college.push(CollegeTractRow {
                tract: tract.id.clone(),
                county: county.to_string(),
                state: tract.state.clone(),
                institution: name,
                resilience: round_to(tract.resilience_score, 3),
            });
        }
        if let Some(name) = institution(MILITARY_COUNTIES, county) {
            military.push(MilitaryTractRow {
                tract: tract.id.clone(),
                county: county.to_string(),
                state: tract.state.clone(),
                base: name,
                resilience: round_to(tract.resilience_score, 3),
            });
        }
    }

    (college, military)
}

#[tracing::instrument(skip_all)]
pub fn run(config: &AnalysisConfig, tracts: &[Tract]) -> Result<ResilientSummary> {
    let out = &config.paths.output_dir;
    let thresholds = &config.thresholds;

    let (cutoff, resilient) = resilient_lila(config, tracts)?;
    info!(cutoff, resilient_lila = resilient.len(), "Resilient LILA communities");

    let rows: Vec<ResilientTractRow> = resilient.iter().map(|t| ResilientTractRow::from(*t)).collect();
    write_records(&out.join(COMMUNITIES_FILE), &rows)?;

    let states = state_summary(&resilient)?;
    for row in states.rows.iter().take(thresholds.top_n) {
        info!(
            state = row.keys[0].as_deref().unwrap_or("unknown"),
            count = row.values[0],
            mean_resilience = row.values[1],
            urban = row.values[2],
            rural = row.values[3],
            "Resilient tracts by state"
        );
    }

    let counties = county_summary().limit(TOP_COUNTIES).run(&resilient)?;
    write_aggregate(&out.join(COUNTIES_FILE), &counties, 3)?;

    let mut clusters = county_summary().run(&resilient)?;
    let min_cluster = thresholds.min_county_cluster as f64;
    clusters.retain(|row| row.values[0].is_some_and(|n| n >= min_cluster));
    for row in &clusters.rows {
        info!(
            county = row.keys[0].as_deref().unwrap_or("unknown"),
            state = row.keys[1].as_deref().unwrap_or("unknown"),
            tracts = row.values[0],
            "County cluster of resilient tracts"
        );
    }

    let (college, military) = special_populations(&resilient);
    if !college.is_empty() {
        write_records(&out.join(COLLEGE_FILE), &college)?;
    }
    if !military.is_empty() {
        write_records(&out.join(MILITARY_FILE), &military)?;
    }
    info!(
        college = college.len(),
        military = military.len(),
        "Potential college town and military base tracts"
    );

    Ok(ResilientSummary {
        cutoff,
        resilient_lila: resilient.len(),
        college_tracts: college.len(),
        military_tracts: military.len(),
        county_clusters: clusters.len(),
    })
}
