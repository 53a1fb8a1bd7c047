//! Anomaly investigation over LILA tracts: implausible values,
//! institutional populations, demographic and state patterns, twin tracts
//! and a re-run on an explicitly labelled clean subset.

use anyhow::Result;
use tracing::{info, warn};

use crate::aggregate::{Aggregation, GroupBy, Measure};
use crate::classify::ResilienceClassification;
use crate::config::{AbandonmentThresholds, AnalysisConfig};
use crate::output::{write_json, write_records};
use crate::quality::{self, CleanDataset};
use crate::reports::types::{
    AbandonmentFindings, AnomalyFindings, CleanAnalysis, GroupQuartersFindings, LocatedTractRow, PopulationAnomalies,
    PovertyAnomalies, RacialPatterns, StatePatterns, TwinFindings,
};
use crate::reports::{lila_tracts, mean_score};
use crate::stats;
use crate::tract::{CategoricalField, Fields, NumericField, Tract};
use crate::twins::find_twins;

pub const FINDINGS_FILE: &str = "anomaly_findings.json";
pub const CLEAN_RESILIENT_FILE: &str = "clean_resilient_lila.csv";
pub const CLEAN_VULNERABLE_FILE: &str = "clean_vulnerable_lila.csv";

const TOP_TWINS: usize = 5;

fn subset<'a>(tracts: &[&'a Tract], pred: impl Fn(&Tract) -> bool) -> Vec<&'a Tract> {
    tracts.iter().copied().filter(|t| pred(t)).collect()
}

fn field_mean(tracts: &[&Tract], field: NumericField) -> Option<f64> {
    let values: Vec<f64> = tracts.iter().filter_map(|t| t.numeric(field)).collect();
    stats::mean(&values)
}

fn poverty_anomalies(lila: &[&Tract]) -> PovertyAnomalies {
    let all_poor = subset(lila, |t| t.poverty_rate == Some(100.0));
    let none_poor = subset(lila, |t| t.poverty_rate == Some(0.0));

    PovertyAnomalies {
        poverty_100_count: all_poor.len(),
        poverty_0_count: none_poor.len(),
        poverty_100_mean_resilience: mean_score(&all_poor),
        poverty_0_mean_resilience: mean_score(&none_poor),
    }
}

fn population_anomalies(lila: &[&Tract], tiny_population: u64) -> PopulationAnomalies {
    let tiny = subset(lila, |t| t.population.is_some_and(|p| p < tiny_population));

    PopulationAnomalies {
        tiny_population_count: tiny.len(),
        smallest_population: lila.iter().filter_map(|t| t.population).min(),
        tiny_pop_mean_resilience: mean_score(&tiny),
    }
}

fn group_quarters(lila: &[&Tract], high_pct: f64) -> GroupQuartersFindings {
    let high = subset(lila, |t| t.group_quarters_pct.is_some_and(|p| p > high_pct));

    GroupQuartersFindings {
        high_gq_count: high.len(),
        high_gq_mean_resilience: mean_score(&high),
    }
}

/// Fraction of tracts with a known white share under 50%.
fn majority_minority(tracts: &[&Tract]) -> Option<f64> {
    let flags: Vec<f64> = tracts
        .iter()
        .filter_map(|t| t.numeric(NumericField::PctWhite))
        .map(|w| if w < 50.0 { 1.0 } else { 0.0 })
        .collect();
    stats::mean(&flags)
}

fn racial_patterns(resilient: &[&Tract], vulnerable: &[&Tract]) -> RacialPatterns {
    RacialPatterns {
        resilient_pct_white: field_mean(resilient, NumericField::PctWhite),
        vulnerable_pct_white: field_mean(vulnerable, NumericField::PctWhite),
        resilient_pct_black: field_mean(resilient, NumericField::PctBlack),
        vulnerable_pct_black: field_mean(vulnerable, NumericField::PctBlack),
        resilient_majority_minority: majority_minority(resilient),
        vulnerable_majority_minority: majority_minority(vulnerable),
    }
}

/// Highest and lowest state mean among states with enough LILA tracts.
/// The largest pairwise difference is the spread between those two.
fn state_patterns(lila: &[&Tract], min_tracts: usize) -> Result<StatePatterns> {
    let mut table = GroupBy::new(&[CategoricalField::StateAbbr])
        .measure(Measure::new(NumericField::ResilienceScore, Aggregation::Count).named("count"))
        .measure(Measure::new(NumericField::ResilienceScore, Aggregation::Mean).named("mean"))
        .measure(Measure::new(NumericField::ResilienceScore, Aggregation::StdDev).named("std"))
        .sort_by("mean")
        .run(lila)?;
    let min_tracts = min_tracts as f64;
    table.retain(|row| row.keys[0].is_some() && row.values[0].is_some_and(|n| n >= min_tracts));

    for row in &table.rows {
        info!(
            state = row.keys[0].as_deref().unwrap_or_default(),
            mean = row.values[1],
            std = row.values[2],
            tracts = row.values[0],
            "State resilience"
        );
    }

    let (Some(top), Some(bottom)) = (table.rows.first(), table.rows.last()) else {
        return Ok(StatePatterns {
            most_resilient_state: None,
            least_resilient_state: None,
            largest_state_difference: 0.0,
        });
    };

    let difference = match (top.values[1], bottom.values[1]) {
        (Some(hi), Some(lo)) => hi - lo,
        _ => 0.0,
    };

    Ok(StatePatterns {
        most_resilient_state: top.keys[0].clone(),
        least_resilient_state: bottom.keys[0].clone(),
        largest_state_difference: difference,
    })
}

fn abandonment(lila: &[&Tract], thresholds: &AbandonmentThresholds) -> AbandonmentFindings {
    let abandoned = subset(lila, |t| {
        t.poverty_rate.is_some_and(|p| p > thresholds.poverty_rate)
            && t.no_vehicle_far_rate().is_some_and(|r| r > thresholds.no_vehicle_far_pct)
            && t.snap_rate().is_some_and(|r| r > thresholds.snap_pct)
    });

    AbandonmentFindings {
        abandoned_count: abandoned.len(),
        abandoned_mean_resilience: mean_score(&abandoned),
    }
}

fn labelled_rows(tracts: &[&Tract], label: &'static str) -> Vec<LocatedTractRow> {
    tracts.iter().map(|t| LocatedTractRow::new(t, label)).collect()
}

/// Investigates every anomaly class and writes the findings file and the
/// clean subsets.
#[tracing::instrument(skip_all)]
pub fn run(config: &AnalysisConfig, tracts: &[Tract]) -> Result<AnomalyFindings> {
    let out = &config.paths.output_dir;
    let thresholds = &config.thresholds;

    let lila = lila_tracts(tracts);
    let classification = ResilienceClassification::new(&lila, thresholds.split())?;
    let resilient = classification.resilient();
    let vulnerable = classification.vulnerable();
    info!(
        lila_tracts = lila.len(),
        resilient = resilient.len(),
        vulnerable = vulnerable.len(),
        "Investigating anomalies"
    );

    let warnings = quality::scan(&lila, &thresholds.quality());
    let data_quality = quality::report(&warnings);

    let poverty_anomalies = poverty_anomalies(&lila);
    info!(
        poverty_100 = poverty_anomalies.poverty_100_count,
        poverty_0 = poverty_anomalies.poverty_0_count,
        "Impossible poverty rates"
    );

    let population_anomalies = population_anomalies(&lila, thresholds.tiny_population);
    info!(
        tiny = population_anomalies.tiny_population_count,
        smallest = population_anomalies.smallest_population,
        "Tiny populations"
    );

    let group_quarters = group_quarters(&lila, thresholds.high_group_quarters_pct);
    info!(high_group_quarters = group_quarters.high_gq_count, "Institutional populations");

    let racial_patterns = racial_patterns(&resilient, &vulnerable);
    info!(
        resilient_pct_white = racial_patterns.resilient_pct_white,
        vulnerable_pct_white = racial_patterns.vulnerable_pct_white,
        resilient_pct_black = racial_patterns.resilient_pct_black,
        vulnerable_pct_black = racial_patterns.vulnerable_pct_black,
        "Racial composition"
    );

    let state_patterns = state_patterns(&lila, thresholds.min_state_tracts)?;
    info!(
        most = state_patterns.most_resilient_state.as_deref().unwrap_or_default(),
        least = state_patterns.least_resilient_state.as_deref().unwrap_or_default(),
        difference = state_patterns.largest_state_difference,
        "State patterns"
    );

    let mut pairs = find_twins(&resilient, &vulnerable, &thresholds.twin);
    let pair_count = pairs.len();
    pairs.sort_by(|a, b| b.resilience_diff.total_cmp(&a.resilience_diff));
    pairs.truncate(TOP_TWINS);
    for pair in &pairs {
        info!(
            resilient = %pair.resilient_tract,
            vulnerable = %pair.vulnerable_tract,
            poverty_rate = pair.poverty_rate,
            population = pair.population,
            difference = pair.resilience_diff,
            "Twin tracts with opposite outcomes"
        );
    }
    let twin_tracts = TwinFindings {
        pairs: pair_count,
        top: pairs,
    };

    let economic_abandonment = abandonment(&lila, &thresholds.abandonment);
    info!(abandoned = economic_abandonment.abandoned_count, "Economic abandonment");

    let clean = CleanDataset::new(&lila, &thresholds.clean);
    let (clean_resilient, clean_vulnerable) = if clean.tracts.is_empty() {
        warn!("No tracts left after removing special populations");
        (Vec::new(), Vec::new())
    } else {
        let c = ResilienceClassification::new(&clean.tracts, thresholds.split())?;
        (c.resilient(), c.vulnerable())
    };
    let clean_analysis = CleanAnalysis {
        removed_count: clean.removed(),
        removed_pct: clean.removed_pct(),
        clean_resilient_count: clean_resilient.len(),
        clean_vulnerable_count: clean_vulnerable.len(),
    };
    info!(
        original = clean.original_count,
        removed = clean_analysis.removed_count,
        removed_pct = stats::round_to(clean_analysis.removed_pct, 1),
        resilient = clean_analysis.clean_resilient_count,
        vulnerable = clean_analysis.clean_vulnerable_count,
        "Clean subset"
    );

    write_records(&out.join(CLEAN_RESILIENT_FILE), &labelled_rows(&clean_resilient, clean.label))?;
    write_records(&out.join(CLEAN_VULNERABLE_FILE), &labelled_rows(&clean_vulnerable, clean.label))?;

    let findings = AnomalyFindings {
        poverty_anomalies,
        population_anomalies,
        group_quarters,
        racial_patterns,
        state_patterns,
        twin_tracts,
        economic_abandonment,
        clean_analysis,
        data_quality,
    };
    write_json(&out.join(FINDINGS_FILE), &findings)?;

    Ok(findings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reports::fixtures;

    #[test]
    fn test_poverty_and_population_anomalies() {
        let mut a = fixtures::tract("00100000001", "AL", 1.0, 100.0, 300, true);
        a.group_quarters_pct = Some(60.0);
        let b = fixtures::tract("00100000002", "AL", -1.0, 0.0, 4000, true);
        let c = fixtures::tract("00100000003", "AL", 3.0, 25.0, 450, true);
        let lila = [&a, &b, &c];

        let poverty = poverty_anomalies(&lila);
        assert_eq!(poverty.poverty_100_count, 1);
        assert_eq!(poverty.poverty_0_count, 1);
        assert_eq!(poverty.poverty_100_mean_resilience, Some(1.0));

        let population = population_anomalies(&lila, 500);
        assert_eq!(population.tiny_population_count, 2);
        assert_eq!(population.smallest_population, Some(300));
        assert_eq!(population.tiny_pop_mean_resilience, Some(2.0));

        let gq = group_quarters(&lila, 20.0);
        assert_eq!(gq.high_gq_count, 1);
    }

    #[test]
    fn test_empty_subsets_have_null_means() {
        let a = fixtures::tract("00100000001", "AL", 1.0, 50.0, 3000, true);
        let poverty = poverty_anomalies(&[&a]);
        assert_eq!(poverty.poverty_100_count, 0);
        assert_eq!(poverty.poverty_100_mean_resilience, None);
    }

    #[test]
    fn test_state_patterns_respect_minimum() {
        let tracts = fixtures::sample();
        let lila = lila_tracts(&tracts);

        let patterns = state_patterns(&lila, 10).unwrap();
        assert_eq!(patterns.most_resilient_state.as_deref(), Some("GA"));
        assert_eq!(patterns.least_resilient_state.as_deref(), Some("AL"));
        assert!((patterns.largest_state_difference - 1.0).abs() < 1e-9);

        let none = state_patterns(&lila, 11).unwrap();
        assert_eq!(none.most_resilient_state, None);
        assert_eq!(none.largest_state_difference, 0.0);
    }

    #[test]
    fn test_abandonment_needs_all_three() {
        let mut a = fixtures::tract("00100000001", "AL", -1.0, 55.0, 1000, true);
        a.no_vehicle_far = Some(250.0);
        a.snap = Some(400.0);
        let mut b = a.clone();
        b.snap = Some(100.0);

        let found = abandonment(&[&a, &b], &AbandonmentThresholds::default());
        assert_eq!(found.abandoned_count, 1);
        assert_eq!(found.abandoned_mean_resilience, Some(-1.0));
    }

    #[test]
    fn test_run_writes_fixed_keys() {
        let dir = std::env::temp_dir().join("food_desert_resilience_test_anomalies");
        let _ = std::fs::remove_dir_all(&dir);
        let mut config = AnalysisConfig::default();
        config.paths.output_dir = dir.clone();

        let findings = run(&config, &fixtures::sample()).unwrap();

        assert_eq!(findings.clean_analysis.removed_count, 0);
        assert_eq!(findings.clean_analysis.clean_resilient_count, 2);
        assert_eq!(findings.clean_analysis.clean_vulnerable_count, 2);
        assert_eq!(findings.racial_patterns.resilient_majority_minority, Some(0.0));

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(dir.join(FINDINGS_FILE)).unwrap()).unwrap();
        let keys: Vec<&String> = json.as_object().unwrap().keys().collect();
        assert_eq!(
            keys,
            vec![
                "clean_analysis",
                "data_quality",
                "economic_abandonment",
                "group_quarters",
                "population_anomalies",
                "poverty_anomalies",
                "racial_patterns",
                "state_patterns",
                "twin_tracts",
            ]
        );

        let clean = std::fs::read_to_string(dir.join(CLEAN_RESILIENT_FILE)).unwrap();
        assert!(clean.lines().nth(1).unwrap().ends_with(",clean"));

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_empty_clean_subset_keeps_header() {
        let dir = std::env::temp_dir().join("food_desert_resilience_test_anomalies_empty_clean");
        let _ = std::fs::remove_dir_all(&dir);
        let mut config = AnalysisConfig::default();
        config.paths.output_dir = dir.clone();
        let mut tracts = fixtures::sample();
        for t in &mut tracts {
            t.group_quarters_pct = Some(50.0);
        }

        let findings = run(&config, &tracts).unwrap();

        assert_eq!(findings.clean_analysis.removed_count, 20);
        for file in [CLEAN_RESILIENT_FILE, CLEAN_VULNERABLE_FILE] {
            let content = std::fs::read_to_string(dir.join(file)).unwrap();
            let lines: Vec<_> = content.lines().collect();
            assert_eq!(lines.len(), 1);
            assert!(lines[0].starts_with("Census_Tract,County,"));
            assert!(lines[0].ends_with(",Dataset"));
        }

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
