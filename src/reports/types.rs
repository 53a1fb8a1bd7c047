//! Row and summary types written by the report workflows.
//!
//! Column names are part of the output contract and are fixed with serde
//! renames; numeric rounding happens when a row is built.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::output::Record;
use crate::quality::QualitySummary;
use crate::stats::round_to;
use crate::tract::{LilaDefinition, Tract};
use crate::twins::TwinPair;

fn round(value: Option<f64>, places: u32) -> Option<f64> {
    value.map(|v| round_to(v, places))
}

fn settlement(tract: &Tract) -> Option<String> {
    tract.settlement().map(|s| s.to_string())
}

/// One resilient LILA tract, as listed in `all_resilient_lila_communities.csv`.
#[derive(Debug, Serialize)]
pub struct ResilientTractRow {
    #[serde(rename = "Census_Tract")]
    pub(crate) tract: String,
    #[serde(rename = "County")]
    pub(crate) county: Option<String>,
    #[serde(rename = "State")]
    pub(crate) state: Option<String>,
    #[serde(rename = "State_Abbr")]
    pub(crate) state_abbr: Option<String>,
    #[serde(rename = "Resilience_Score")]
    pub(crate) resilience_score: f64,
    #[serde(rename = "Health_Burden")]
    pub(crate) burden: f64,
    #[serde(rename = "Urban_Rural")]
    pub(crate) urban_rural: Option<String>,
    #[serde(rename = "Population_2010")]
    pub(crate) population: Option<u64>,
    #[serde(rename = "Poverty_Rate")]
    pub(crate) poverty_rate: Option<f64>,
    #[serde(rename = "Median_Income")]
    pub(crate) median_income: Option<f64>,
}

impl Record for ResilientTractRow {
    const COLUMNS: &'static [&'static str] = &[
        "Census_Tract",
        "County",
        "State",
        "State_Abbr",
        "Resilience_Score",
        "Health_Burden",
        "Urban_Rural",
        "Population_2010",
        "Poverty_Rate",
        "Median_Income",
    ];
}

impl From<&Tract> for ResilientTractRow {
    fn from(t: &Tract) -> Self {
        Self {
            tract: t.id.clone(),
            county: t.county.clone(),
            state: t.state.clone(),
            state_abbr: t.state_abbr.clone(),
            resilience_score: round_to(t.resilience_score, 3),
            burden: round_to(t.burden, 3),
            urban_rural: settlement(t),
            population: t.population,
            poverty_rate: round(t.poverty_rate, 1),
            median_income: t.median_family_income,
        }
    }
}

/// A resilient tract in a county hosting a university.
#[derive(Debug, Serialize)]
pub struct CollegeTractRow {
    #[serde(rename = "Tract")]
    pub(crate) tract: String,
    #[serde(rename = "County")]
    pub(crate) county: String,
    #[serde(rename = "State")]
    pub(crate) state: Option<String>,
    #[serde(rename = "Institution")]
    pub(crate) institution: &'static str,
    #[serde(rename = "Resilience")]
    pub(crate) resilience: f64,
}

impl Record for CollegeTractRow {
    const COLUMNS: &'static [&'static str] = &["Tract", "County", "State", "Institution", "Resilience"];
}

/// A resilient tract in a county hosting a military installation.
#[derive(Debug, Serialize)]
pub struct MilitaryTractRow {
    #[serde(rename = "Tract")]
    pub(crate) tract: String,
    #[serde(rename = "County")]
    pub(crate) county: String,
    #[serde(rename = "State")]
    pub(crate) state: Option<String>,
    #[serde(rename = "Base")]
    pub(crate) base: &'static str,
    #[serde(rename = "Resilience")]
    pub(crate) resilience: f64,
}

impl Record for MilitaryTractRow {
    const COLUMNS: &'static [&'static str] = &["Tract", "County", "State", "Base", "Resilience"];
}

/// One tract with its centroid, for the least-resilient listing and the
/// clean subsets.
#[derive(Debug, Serialize)]
pub struct LocatedTractRow {
    #[serde(rename = "Census_Tract")]
    pub(crate) tract: String,
    #[serde(rename = "County")]
    pub(crate) county: Option<String>,
    #[serde(rename = "State")]
    pub(crate) state: Option<String>,
    #[serde(rename = "State_Abbr")]
    pub(crate) state_abbr: Option<String>,
    #[serde(rename = "Resilience_Score")]
    pub(crate) resilience_score: f64,
    #[serde(rename = "Health_Burden")]
    pub(crate) burden: f64,
    #[serde(rename = "Urban_Rural")]
    pub(crate) urban_rural: Option<String>,
    #[serde(rename = "Population_2010")]
    pub(crate) population: Option<u64>,
    #[serde(rename = "Poverty_Rate")]
    pub(crate) poverty_rate: Option<f64>,
    #[serde(rename = "Median_Income")]
    pub(crate) median_income: Option<f64>,
    #[serde(rename = "Group_Quarters_Pct")]
    pub(crate) group_quarters_pct: Option<f64>,
    pub(crate) latitude: Option<f64>,
    pub(crate) longitude: Option<f64>,
    /// Which dataset the row came from: `full` or `clean`.
    #[serde(rename = "Dataset")]
    pub(crate) dataset: &'static str,
}

impl Record for LocatedTractRow {
    const COLUMNS: &'static [&'static str] = &[
        "Census_Tract",
        "County",
        "State",
        "State_Abbr",
        "Resilience_Score",
        "Health_Burden",
        "Urban_Rural",
        "Population_2010",
        "Poverty_Rate",
        "Median_Income",
        "Group_Quarters_Pct",
        "latitude",
        "longitude",
        "Dataset",
    ];
}

impl LocatedTractRow {
    pub fn new(t: &Tract, dataset: &'static str) -> Self {
        Self {
            tract: t.id.clone(),
            county: t.county.clone(),
            state: t.state.clone(),
            state_abbr: t.state_abbr.clone(),
            resilience_score: round_to(t.resilience_score, 3),
            burden: round_to(t.burden, 3),
            urban_rural: settlement(t),
            population: t.population,
            poverty_rate: round(t.poverty_rate, 1),
            median_income: t.median_family_income,
            group_quarters_pct: round(t.group_quarters_pct, 1),
            latitude: t.latitude,
            longitude: t.longitude,
            dataset,
        }
    }
}

/// One line of the most-vs-least resilient comparison.
#[derive(Debug, Serialize)]
pub struct ComparisonRow {
    #[serde(rename = "Metric")]
    pub(crate) metric: &'static str,
    #[serde(rename = "Least_Resilient")]
    pub(crate) least: Option<f64>,
    #[serde(rename = "Most_Resilient")]
    pub(crate) most: Option<f64>,
    #[serde(rename = "Difference")]
    pub(crate) difference: Option<f64>,
}

impl Record for ComparisonRow {
    const COLUMNS: &'static [&'static str] = &["Metric", "Least_Resilient", "Most_Resilient", "Difference"];
}

impl ComparisonRow {
    pub fn new(metric: &'static str, least: Option<f64>, most: Option<f64>) -> Self {
        let difference = match (least, most) {
            (Some(l), Some(m)) => Some(round_to(m - l, 3)),
            _ => None,
        };
        Self {
            metric,
            least: round(least, 3),
            most: round(most, 3),
            difference,
        }
    }
}

/// Table 1 line. Mean/SD/Min/Max are preformatted text so boolean rows can
/// show percentages and dashes.
#[derive(Debug, Serialize)]
pub struct DescriptiveRow {
    #[serde(rename = "Variable")]
    pub(crate) variable: &'static str,
    #[serde(rename = "N")]
    pub(crate) n: usize,
    #[serde(rename = "Mean")]
    pub(crate) mean: String,
    #[serde(rename = "SD")]
    pub(crate) sd: String,
    #[serde(rename = "Min")]
    pub(crate) min: String,
    #[serde(rename = "Max")]
    pub(crate) max: String,
    #[serde(rename = "Missing")]
    pub(crate) missing: usize,
}

impl Record for DescriptiveRow {
    const COLUMNS: &'static [&'static str] = &["Variable", "N", "Mean", "SD", "Min", "Max", "Missing"];
}

#[derive(Debug, Serialize)]
pub struct TopTractRow {
    #[serde(rename = "Census Tract")]
    pub(crate) tract: String,
    #[serde(rename = "County")]
    pub(crate) county: Option<String>,
    #[serde(rename = "State")]
    pub(crate) state: Option<String>,
    #[serde(rename = "Resilience Score")]
    pub(crate) resilience_score: f64,
    #[serde(rename = "Health Burden")]
    pub(crate) burden: f64,
    #[serde(rename = "Poverty Rate (%)")]
    pub(crate) poverty_rate: Option<f64>,
    #[serde(rename = "Median Income ($)")]
    pub(crate) median_income: Option<f64>,
    #[serde(rename = "Population")]
    pub(crate) population: Option<u64>,
}

impl Record for TopTractRow {
    const COLUMNS: &'static [&'static str] = &[
        "Census Tract",
        "County",
        "State",
        "Resilience Score",
        "Health Burden",
        "Poverty Rate (%)",
        "Median Income ($)",
        "Population",
    ];
}

impl From<&Tract> for TopTractRow {
    fn from(t: &Tract) -> Self {
        Self {
            tract: t.id.clone(),
            county: t.county.clone(),
            state: t.state.clone(),
            resilience_score: round_to(t.resilience_score, 2),
            burden: round_to(t.burden, 2),
            poverty_rate: t.poverty_rate,
            median_income: t.median_family_income,
            population: t.population,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SpatialRow {
    #[serde(rename = "State")]
    pub(crate) state: Option<String>,
    #[serde(rename = "N_Tracts")]
    pub(crate) n_tracts: usize,
    #[serde(rename = "Spatial_Correlation")]
    pub(crate) correlation: Option<f64>,
}

impl Record for SpatialRow {
    const COLUMNS: &'static [&'static str] = &["State", "N_Tracts", "Spatial_Correlation"];
}

#[derive(Debug, Serialize)]
pub struct QuantileRow {
    #[serde(rename = "Quantile")]
    pub(crate) quantile: f64,
    #[serde(rename = "Burden_Threshold")]
    pub(crate) burden_threshold: f64,
    #[serde(rename = "LILA_Effect")]
    pub(crate) lila_effect: Option<f64>,
    #[serde(rename = "N_Above")]
    pub(crate) n_above: usize,
}

impl Record for QuantileRow {
    const COLUMNS: &'static [&'static str] = &["Quantile", "Burden_Threshold", "LILA_Effect", "N_Above"];
}

/// Resilience under one LILA definition.
#[derive(Debug, Clone, Serialize)]
pub struct SensitivityRow {
    pub threshold: &'static str,
    pub n_lila: usize,
    pub n_resilient: usize,
    pub pct_resilient: Option<f64>,
    pub mean_resilience: Option<f64>,
    pub std_resilience: Option<f64>,
}

impl Record for SensitivityRow {
    const COLUMNS: &'static [&'static str] = &[
        "threshold",
        "n_lila",
        "n_resilient",
        "pct_resilient",
        "mean_resilience",
        "std_resilience",
    ];
}

#[derive(Debug, Serialize)]
pub struct CaseStudyRow {
    #[serde(rename = "GEOID")]
    pub(crate) tract: String,
    #[serde(rename = "StateAbbr")]
    pub(crate) state_abbr: Option<String>,
    pub(crate) burden: f64,
    pub(crate) resilience_score: f64,
    #[serde(rename = "LILATracts_1And10")]
    pub(crate) lila_1_and_10: Option<u8>,
    #[serde(rename = "LILATracts_Vehicle")]
    pub(crate) lila_vehicle: Option<u8>,
}

impl Record for CaseStudyRow {
    const COLUMNS: &'static [&'static str] = &[
        "GEOID",
        "StateAbbr",
        "burden",
        "resilience_score",
        "LILATracts_1And10",
        "LILATracts_Vehicle",
    ];
}

impl From<&Tract> for CaseStudyRow {
    fn from(t: &Tract) -> Self {
        let flag = |d| t.lila_flag(d).map(u8::from);
        Self {
            tract: t.id.clone(),
            state_abbr: t.state_abbr.clone(),
            burden: t.burden,
            resilience_score: t.resilience_score,
            lila_1_and_10: flag(LilaDefinition::OneAndTen),
            lila_vehicle: flag(LilaDefinition::Vehicle),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PovertyAnomalies {
    pub poverty_100_count: usize,
    pub poverty_0_count: usize,
    pub poverty_100_mean_resilience: Option<f64>,
    pub poverty_0_mean_resilience: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PopulationAnomalies {
    pub tiny_population_count: usize,
    pub smallest_population: Option<u64>,
    pub tiny_pop_mean_resilience: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GroupQuartersFindings {
    pub high_gq_count: usize,
    pub high_gq_mean_resilience: Option<f64>,
}

/// Mean racial shares of resilient vs vulnerable tracts. Majority-minority
/// values are fractions in [0, 1].
#[derive(Debug, Clone, Serialize)]
pub struct RacialPatterns {
    pub resilient_pct_white: Option<f64>,
    pub vulnerable_pct_white: Option<f64>,
    pub resilient_pct_black: Option<f64>,
    pub vulnerable_pct_black: Option<f64>,
    pub resilient_majority_minority: Option<f64>,
    pub vulnerable_majority_minority: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatePatterns {
    pub most_resilient_state: Option<String>,
    pub least_resilient_state: Option<String>,
    pub largest_state_difference: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TwinFindings {
    pub pairs: usize,
    pub top: Vec<TwinPair>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AbandonmentFindings {
    pub abandoned_count: usize,
    pub abandoned_mean_resilience: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CleanAnalysis {
    pub removed_count: usize,
    pub removed_pct: f64,
    pub clean_resilient_count: usize,
    pub clean_vulnerable_count: usize,
}

/// Contents of `anomaly_findings.json`.
#[derive(Debug, Clone, Serialize)]
pub struct AnomalyFindings {
    pub poverty_anomalies: PovertyAnomalies,
    pub population_anomalies: PopulationAnomalies,
    pub group_quarters: GroupQuartersFindings,
    pub racial_patterns: RacialPatterns,
    pub state_patterns: StatePatterns,
    pub twin_tracts: TwinFindings,
    pub economic_abandonment: AbandonmentFindings,
    pub clean_analysis: CleanAnalysis,
    pub data_quality: QualitySummary,
}

/// Contents of `resilience_summary.json`.
#[derive(Debug, Clone, Serialize)]
pub struct ResilienceSummary {
    pub total_tracts: usize,
    pub states_covered: usize,
    pub mean_resilience: Option<f64>,
    pub resilient_tracts: usize,
    pub lila_high_resilience: usize,
    pub sensitivity: Vec<SensitivityRow>,
    pub generated_at: DateTime<Utc>,
}
