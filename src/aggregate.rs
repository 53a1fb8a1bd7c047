//! Group-by summaries over tract collections.
//!
//! Groups appear in the order their key combination is first seen, and the
//! final sort is stable, so re-running on the same input reproduces the
//! same row order.

use std::collections::HashMap;

use crate::error::{AnalysisError, Result};
use crate::stats;
use crate::tract::{CategoricalField, Fields, NumericField};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregation {
    /// Non-null values.
    Count,
    Sum,
    Mean,
    Median,
    /// Sample standard deviation.
    StdDev,
    Min,
    Max,
    /// Non-zero values as a percentage of non-null values.
    PercentTrue,
    /// Non-zero values.
    CountTrue,
    /// Lag-1 autocorrelation of the values in input order.
    Autocorrelation,
}

impl Aggregation {
    fn suffix(self) -> &'static str {
        match self {
            Aggregation::Count => "count",
            Aggregation::Sum => "sum",
            Aggregation::Mean => "mean",
            Aggregation::Median => "median",
            Aggregation::StdDev => "std",
            Aggregation::Min => "min",
            Aggregation::Max => "max",
            Aggregation::PercentTrue => "pct_true",
            Aggregation::CountTrue => "count_true",
            Aggregation::Autocorrelation => "autocorr",
        }
    }

    fn apply(self, values: &[f64]) -> Option<f64> {
        match self {
            Aggregation::Count => Some(values.len() as f64),
            Aggregation::Sum => Some(values.iter().sum()),
            Aggregation::Mean => stats::mean(values),
            Aggregation::Median => stats::median(values),
            Aggregation::StdDev => stats::sample_stddev(values),
            Aggregation::Min => stats::min(values),
            Aggregation::Max => stats::max(values),
            Aggregation::PercentTrue => {
                if values.is_empty() {
                    None
                } else {
                    let set = values.iter().filter(|v| **v != 0.0).count();
                    Some(stats::pct(set, values.len()))
                }
            }
            Aggregation::CountTrue => Some(values.iter().filter(|v| **v != 0.0).count() as f64),
            Aggregation::Autocorrelation => stats::lag1_autocorrelation(values),
        }
    }
}

/// One output column: an aggregation applied to a field.
#[derive(Debug, Clone, PartialEq)]
pub struct Measure {
    pub field: NumericField,
    pub aggregation: Aggregation,
    pub name: String,
}

impl Measure {
    /// Named `<field>_<aggregation>` unless renamed with [`Measure::named`].
    pub fn new(field: NumericField, aggregation: Aggregation) -> Self {
        Self {
            field,
            aggregation,
            name: format!("{}_{}", field.name(), aggregation.suffix()),
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Descending,
    Ascending,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroupRow {
    pub keys: Vec<Option<String>>,
    pub values: Vec<Option<f64>>,
}

/// Result of a [`GroupBy`]: key columns, then one column per measure.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateTable {
    pub key_columns: Vec<String>,
    pub value_columns: Vec<String>,
    pub rows: Vec<GroupRow>,
}

impl AggregateTable {
    pub fn value_index(&self, name: &str) -> Option<usize> {
        self.value_columns.iter().position(|c| c == name)
    }

    pub fn value(&self, row: usize, name: &str) -> Option<f64> {
        let col = self.value_index(name)?;
        self.rows.get(row)?.values[col]
    }

    /// Rounds one value column in place. Unknown names are ignored.
    pub fn round_column(&mut self, name: &str, places: u32) {
        if let Some(col) = self.value_index(name) {
            for row in &mut self.rows {
                row.values[col] = row.values[col].map(|v| stats::round_to(v, places));
            }
        }
    }

    /// Keeps the rows for which `keep` returns true.
    pub fn retain(&mut self, mut keep: impl FnMut(&GroupRow) -> bool) {
        self.rows.retain(|row| keep(row));
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// A group-by query: keys, measures, sort and limit.
///
/// Null keys form their own group rather than being dropped.
#[derive(Debug, Clone)]
pub struct GroupBy {
    keys: Vec<CategoricalField>,
    measures: Vec<Measure>,
    sort_by: Option<String>,
    order: SortOrder,
    limit: Option<usize>,
}

impl GroupBy {
    pub fn new(keys: &[CategoricalField]) -> Self {
        Self {
            keys: keys.to_vec(),
            measures: Vec::new(),
            sort_by: None,
            order: SortOrder::Descending,
            limit: None,
        }
    }

    pub fn measure(mut self, measure: Measure) -> Self {
        self.measures.push(measure);
        self
    }

    /// Sorts by the named measure column, descending unless
    /// [`GroupBy::ascending`] is set. Nulls sort last.
    pub fn sort_by(mut self, column: impl Into<String>) -> Self {
        self.sort_by = Some(column.into());
        self
    }

    pub fn ascending(mut self) -> Self {
        self.order = SortOrder::Ascending;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Runs the query.
    ///
    /// # Errors
    ///
    /// [`AnalysisError::Schema`] if the sort column is not one of the
    /// measures.
    pub fn run<T: Fields>(&self, items: &[T]) -> Result<AggregateTable> {
        let sort_col = match &self.sort_by {
            Some(name) => Some(
                self.measures
                    .iter()
                    .position(|m| &m.name == name)
                    .ok_or_else(|| AnalysisError::schema("aggregate", name))?,
            ),
            None => None,
        };

        let mut order: Vec<Vec<Option<String>>> = Vec::new();
        let mut groups: HashMap<Vec<Option<String>>, Vec<&T>> = HashMap::new();
        for item in items {
            let key: Vec<Option<String>> = self.keys.iter().map(|k| item.categorical(*k)).collect();
            groups
                .entry(key.clone())
                .or_insert_with(|| {
                    order.push(key);
                    Vec::new()
                })
                .push(item);
        }

        let mut rows: Vec<GroupRow> = order
            .into_iter()
            .map(|key| {
                let members = &groups[&key];
                let values = self
                    .measures
                    .iter()
                    .map(|m| {
                        let series: Vec<f64> = members.iter().filter_map(|i| i.numeric(m.field)).collect();
                        m.aggregation.apply(&series)
                    })
                    .collect();
                GroupRow { keys: key, values }
            })
            .collect();

        if let Some(col) = sort_col {
            let order = self.order;
            rows.sort_by(|a, b| match (a.values[col], b.values[col]) {
                (Some(x), Some(y)) => match order {
                    SortOrder::Descending => y.total_cmp(&x),
                    SortOrder::Ascending => x.total_cmp(&y),
                },
                (Some(_), None) => std::cmp::Ordering::Less,
                (None, Some(_)) => std::cmp::Ordering::Greater,
                (None, None) => std::cmp::Ordering::Equal,
            });
        }

        if let Some(limit) = self.limit {
            rows.truncate(limit);
        }

        Ok(AggregateTable {
            key_columns: self.keys.iter().map(|k| k.name().to_string()).collect(),
            value_columns: self.measures.iter().map(|m| m.name.clone()).collect(),
            rows,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tract::Tract;

    fn tract(id: &str, state: &str, score: f64, urban: Option<bool>) -> Tract {
        let mut t = Tract::new(id, score, 0.0);
        t.state_abbr = Some(state.to_string());
        t.is_urban = urban;
        t
    }

    fn sample() -> Vec<Tract> {
        vec![
            tract("00100000001", "AL", 1.0, Some(true)),
            tract("00100000002", "GA", 2.0, Some(false)),
            tract("00100000003", "AL", 3.0, Some(false)),
            tract("00100000004", "MS", 0.5, None),
            tract("00100000005", "GA", -1.0, Some(true)),
        ]
    }

    fn by_state() -> GroupBy {
        GroupBy::new(&[CategoricalField::StateAbbr])
            .measure(Measure::new(NumericField::ResilienceScore, Aggregation::Count).named("count"))
            .measure(Measure::new(NumericField::ResilienceScore, Aggregation::Mean))
            .measure(Measure::new(NumericField::Urban, Aggregation::PercentTrue))
            .sort_by("count")
    }

    #[test]
    fn test_group_counts_and_means() {
        let table = by_state().run(&sample()).unwrap();

        assert_eq!(table.key_columns, vec!["StateAbbr"]);
        assert_eq!(table.value_columns, vec!["count", "resilience_score_mean", "Urban_pct_true"]);
        assert_eq!(table.len(), 3);

        // AL and GA tie on count: AL was seen first
        assert_eq!(table.rows[0].keys, vec![Some("AL".to_string())]);
        assert_eq!(table.value(0, "count"), Some(2.0));
        assert_eq!(table.value(0, "resilience_score_mean"), Some(2.0));
        assert_eq!(table.value(0, "Urban_pct_true"), Some(50.0));
        assert_eq!(table.rows[1].keys, vec![Some("GA".to_string())]);
        assert_eq!(table.value(1, "resilience_score_mean"), Some(0.5));

        // MS has no urban flag at all
        assert_eq!(table.value(2, "Urban_pct_true"), None);
    }

    #[test]
    fn test_grouping_is_deterministic() {
        let tracts = sample();
        let first = by_state().run(&tracts).unwrap();
        let second = by_state().run(&tracts).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_ascending_sort_and_limit() {
        let table = GroupBy::new(&[CategoricalField::StateAbbr])
            .measure(Measure::new(NumericField::ResilienceScore, Aggregation::Sum))
            .sort_by("resilience_score_sum")
            .ascending()
            .limit(2)
            .run(&sample())
            .unwrap();

        assert_eq!(table.len(), 2);
        assert_eq!(table.rows[0].keys, vec![Some("MS".to_string())]);
        assert_eq!(table.rows[1].keys, vec![Some("GA".to_string())]);
    }

    #[test]
    fn test_null_key_is_its_own_group() {
        let table = GroupBy::new(&[CategoricalField::Type])
            .measure(Measure::new(NumericField::ResilienceScore, Aggregation::Count))
            .run(&sample())
            .unwrap();

        let keys: Vec<_> = table.rows.iter().map(|r| r.keys[0].clone()).collect();
        assert_eq!(
            keys,
            vec![Some("Urban".to_string()), Some("Rural".to_string()), None]
        );
    }

    #[test]
    fn test_unknown_sort_column() {
        let err = GroupBy::new(&[CategoricalField::StateAbbr])
            .measure(Measure::new(NumericField::ResilienceScore, Aggregation::Mean))
            .sort_by("nope")
            .run(&sample())
            .unwrap_err();

        assert!(matches!(err, AnalysisError::Schema { .. }));
    }

    #[test]
    fn test_autocorrelation_follows_input_order() {
        let mut tracts = sample();
        for (t, r) in tracts.iter_mut().zip([1.0, 2.0, 3.0, 4.0, 5.0]) {
            t.residual = Some(r);
            t.state_abbr = Some("AL".to_string());
        }

        let mut table = GroupBy::new(&[CategoricalField::StateAbbr])
            .measure(Measure::new(NumericField::Residual, Aggregation::Autocorrelation))
            .run(&tracts)
            .unwrap();
        table.round_column("resid_autocorr", 6);

        assert_eq!(table.value(0, "resid_autocorr"), Some(1.0));
    }

    #[test]
    fn test_no_keys_is_one_group() {
        let table = GroupBy::new(&[])
            .measure(Measure::new(NumericField::ResilienceScore, Aggregation::Max))
            .run(&sample())
            .unwrap();

        assert_eq!(table.len(), 1);
        assert_eq!(table.value(0, "resilience_score_max"), Some(3.0));
    }
}
