//! Fixed report workflows.
//!
//! Every report loads tracts through [`load`] and then only picks
//! parameters for the shared join, classification, aggregation and twin
//! operations. Files go under the configured output (or tables) directory
//! and are overwritten on every run.

pub mod anomalies;
pub mod least_resilient;
pub mod resilient;
pub mod sensitivity;
pub mod tables;
pub mod types;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::aggregate::SortOrder;
use crate::config::AnalysisConfig;
use crate::parser::{read_centroids, read_table};
use crate::stats;
use crate::tract::{LilaDefinition, Tract, load_tracts};

/// Reads the configured inputs and joins them into tracts.
///
/// A configured centroid file that does not exist is skipped with a
/// warning; every other read failure is fatal.
#[tracing::instrument(skip_all)]
pub fn load(config: &AnalysisConfig) -> Result<Vec<Tract>> {
    let paths = &config.paths;

    let model = read_table(&paths.model_results)
        .with_context(|| format!("reading model results {}", paths.model_results.display()))?;
    let attributes = read_table(&paths.tract_attributes)
        .with_context(|| format!("reading tract attributes {}", paths.tract_attributes.display()))?;

    let centroids = match &paths.centroids {
        Some(path) if path.exists() => Some(
            read_centroids(path).with_context(|| format!("reading centroids {}", path.display()))?,
        ),
        Some(path) => {
            warn!(path = %path.display(), "Centroid file not found, continuing without coordinates");
            None
        }
        None => None,
    };

    let tracts = load_tracts(&model, &attributes, centroids.as_ref())?;
    Ok(tracts)
}

/// Runs every report over the same loaded tracts.
#[tracing::instrument(skip_all)]
pub fn run_all(config: &AnalysisConfig, tracts: &[Tract]) -> Result<()> {
    resilient::run(config, tracts)?;
    least_resilient::run(config, tracts)?;
    anomalies::run(config, tracts)?;
    tables::run(config, tracts)?;
    sensitivity::run(config, tracts)?;

    info!("All reports written");
    Ok(())
}

/// Tracts meeting the headline 1-mile/10-mile LILA definition.
pub(crate) fn lila_tracts(tracts: &[Tract]) -> Vec<&Tract> {
    tracts
        .iter()
        .filter(|t| t.is_lila(LilaDefinition::OneAndTen))
        .collect()
}

/// Stable sort on resilience score.
pub(crate) fn sort_by_score(tracts: &mut [&Tract], order: SortOrder) {
    tracts.sort_by(|a, b| match order {
        SortOrder::Descending => b.resilience_score.total_cmp(&a.resilience_score),
        SortOrder::Ascending => a.resilience_score.total_cmp(&b.resilience_score),
    });
}

pub(crate) fn mean_score(tracts: &[&Tract]) -> Option<f64> {
    let scores: Vec<f64> = tracts.iter().map(|t| t.resilience_score).collect();
    stats::mean(&scores)
}

/// Percentage of `tracts` for which `pred` holds.
pub(crate) fn share(tracts: &[&Tract], pred: impl Fn(&Tract) -> bool) -> f64 {
    stats::pct(tracts.iter().filter(|t| pred(t)).count(), tracts.len())
}

#[cfg(test)]
pub(crate) mod fixtures {
    use crate::tract::{LilaDefinition, Tract};

    /// A LILA tract with every attribute the reports read.
    pub fn tract(id: &str, state: &str, score: f64, poverty: f64, population: u64, urban: bool) -> Tract {
        let mut t = Tract::new(id, score, -score);
        t.state_abbr = Some(state.to_string());
        t.state = Some(format!("State {state}"));
        t.county = Some(format!("County {id}"));
        t.is_urban = Some(urban);
        t.population = Some(population);
        t.poverty_rate = Some(poverty);
        t.median_family_income = Some(40000.0 + score * 1000.0);
        t.group_quarters_pct = Some(1.0);
        t.residual = Some(score / 2.0);
        t.low_income = Some(true);
        t.white = Some(population as f64 * 0.6);
        t.black = Some(population as f64 * 0.3);
        t.snap = Some(population as f64 * 0.1);
        t.no_vehicle_far = Some(0.0);
        for d in LilaDefinition::ALL {
            t.lila.insert(d, true);
        }
        t
    }

    /// Twenty LILA tracts in two states with scores -9.5..=9.5, plus two
    /// non-LILA tracts.
    pub fn sample() -> Vec<Tract> {
        let mut tracts: Vec<Tract> = (0..20)
            .map(|i| {
                let state = if i % 2 == 0 { "AL" } else { "GA" };
                tract(
                    &format!("{:011}", i + 1),
                    state,
                    i as f64 - 9.5,
                    20.0 + i as f64,
                    2000 + 10 * i as u64,
                    i % 3 != 0,
                )
            })
            .collect();

        for (i, score) in [(21, 0.0), (22, 3.0)] {
            let mut t = tract(&format!("{i:011}"), "MS", score, 15.0, 3000, true);
            t.lila.insert(LilaDefinition::OneAndTen, false);
            tracts.push(t);
        }
        tracts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lila_tracts_excludes_unknown_and_false() {
        let tracts = fixtures::sample();
        let mut unknown = Tract::new("x", 0.0, 0.0);
        unknown.lila.clear();

        assert_eq!(lila_tracts(&tracts).len(), 20);
        assert!(lila_tracts(&[unknown]).is_empty());
    }

    #[test]
    fn test_sort_by_score_is_stable() {
        let a = Tract::new("a", 1.0, 0.0);
        let b = Tract::new("b", 2.0, 0.0);
        let c = Tract::new("c", 1.0, 0.0);
        let mut tracts = vec![&a, &b, &c];

        sort_by_score(&mut tracts, SortOrder::Descending);
        let ids: Vec<_> = tracts.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a", "c"]);

        sort_by_score(&mut tracts, SortOrder::Ascending);
        let ids: Vec<_> = tracts.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c", "b"]);
    }

    #[test]
    fn test_share() {
        let a = Tract::new("a", 1.0, 0.0);
        let b = Tract::new("b", -1.0, 0.0);
        assert_eq!(share(&[&a, &b], |t| t.resilience_score > 0.0), 50.0);
        assert_eq!(share(&[], |_| true), 0.0);
    }
}
