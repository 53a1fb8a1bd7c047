//! Pairs each resilient tract with a look-alike vulnerable tract.
//!
//! Two tracts are twins when their poverty rates and populations fall
//! within fixed absolute tolerances and they share urban/rural status.
//! The scan is a plain nested loop over both sets; both are top/bottom
//! deciles, so this stays in the thousands-by-thousands range.

use serde::{Deserialize, Serialize};

use crate::tract::Tract;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchStrategy {
    /// First qualifying vulnerable tract in input order.
    #[default]
    First,
    /// Qualifying tract with the smallest tolerance-scaled distance. Ties
    /// go to input order.
    Nearest,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TwinTolerance {
    /// Strict bound on |Δ poverty rate|, in percentage points.
    pub poverty_rate_points: f64,
    /// Strict bound on |Δ population|, in people.
    pub population: f64,
    pub strategy: MatchStrategy,
}

impl Default for TwinTolerance {
    fn default() -> Self {
        Self {
            poverty_rate_points: 5.0,
            population: 500.0,
            strategy: MatchStrategy::First,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TwinPair {
    pub resilient_tract: String,
    pub resilient_state: Option<String>,
    pub vulnerable_tract: String,
    pub vulnerable_state: Option<String>,
    pub poverty_rate: f64,
    pub population: u64,
    pub resilience_diff: f64,
}

/// Comparable attributes; `None` if any is missing, in which case the
/// tract never matches.
fn profile(tract: &Tract) -> Option<(f64, f64, bool)> {
    Some((tract.poverty_rate?, tract.population? as f64, tract.is_urban?))
}

impl TwinTolerance {
    /// Tolerance-scaled distance between two tracts, or `None` if they are
    /// not twins.
    fn distance(&self, a: &Tract, b: &Tract) -> Option<f64> {
        let (pa, na, ua) = profile(a)?;
        let (pb, nb, ub) = profile(b)?;

        let dp = (pa - pb).abs();
        let dn = (na - nb).abs();
        if dp < self.poverty_rate_points && dn < self.population && ua == ub {
            Some(dp / self.poverty_rate_points + dn / self.population)
        } else {
            None
        }
    }

    pub fn is_twin(&self, a: &Tract, b: &Tract) -> bool {
        self.distance(a, b).is_some()
    }

    /// The twin of `tract` among `candidates`, per [`MatchStrategy`].
    pub fn best_match<'a>(&self, tract: &Tract, candidates: &[&'a Tract]) -> Option<&'a Tract> {
        let mut qualifying = candidates
            .iter()
            .filter_map(|c| self.distance(tract, c).map(|d| (*c, d)));

        match self.strategy {
            MatchStrategy::First => qualifying.next().map(|(c, _)| c),
            MatchStrategy::Nearest => qualifying
                .fold(None, |best: Option<(&'a Tract, f64)>, (c, d)| match best {
                    Some((_, bd)) if bd <= d => best,
                    _ => Some((c, d)),
                })
                .map(|(c, _)| c),
        }
    }
}

/// Finds a twin for every resilient tract that has one, in resilient-set
/// order.
pub fn find_twins(resilient: &[&Tract], vulnerable: &[&Tract], tolerance: &TwinTolerance) -> Vec<TwinPair> {
    resilient
        .iter()
        .filter_map(|tract| {
            let twin = tolerance.best_match(tract, vulnerable)?;
            Some(TwinPair {
                resilient_tract: tract.id.clone(),
                resilient_state: tract.state_abbr.clone(),
                vulnerable_tract: twin.id.clone(),
                vulnerable_state: twin.state_abbr.clone(),
                poverty_rate: tract.poverty_rate.unwrap_or_default(),
                population: tract.population.unwrap_or_default(),
                resilience_diff: tract.resilience_score - twin.resilience_score,
            })
        })
        .collect()
}
