//! Tract-keyed left joins.
//!
//! Source files disagree on how a tract id is written: zero-padded text in
//! one, a bare integer (or a float like `1001020100.0`) in another. Every
//! key is normalized to the 11-character form before rows are matched.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::error::{AnalysisError, Result};
use crate::table::Table;

/// 2-digit state + 3-digit county + 6-digit tract.
pub const TRACT_ID_WIDTH: usize = 11;

/// Normalizes a tract id to its zero-padded 11-character form.
///
/// Accepts integer text (`"1001020100"`), padded text (`"01001020100"`)
/// and integral float text (`"1001020100.0"`). Idempotent.
pub fn normalize_tract_id(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    let digits = match trimmed.split_once('.') {
        None => trimmed,
        Some((int, frac)) if frac.bytes().all(|b| b == b'0') => int,
        Some(_) => return Err(AnalysisError::InvalidTractId(raw.to_string())),
    };

    if digits.is_empty()
        || digits.len() > TRACT_ID_WIDTH
        || !digits.bytes().all(|b| b.is_ascii_digit())
    {
        return Err(AnalysisError::InvalidTractId(raw.to_string()));
    }

    Ok(format!("{:0>width$}", digits, width = TRACT_ID_WIDTH))
}

/// Integer form of [`normalize_tract_id`].
pub fn tract_id_from_int(id: u64) -> Result<String> {
    normalize_tract_id(&id.to_string())
}

/// A secondary table to attach in [`left_join`], and the columns to take
/// from it.
pub struct JoinSource<'a> {
    pub table: &'a Table,
    pub key: &'a str,
    pub columns: &'a [&'a str],
}

/// Left-joins `sources` onto `primary` by tract id.
///
/// The result has exactly one row per primary row, in primary order, with
/// the key column rewritten to its normalized form. Requested columns
/// follow the primary's columns. A name already present gets a
/// `_<table name>` suffix. Rows with no match get nulls for that source.
///
/// # Errors
///
/// - [`AnalysisError::Schema`] if a key or requested column is missing.
/// - [`AnalysisError::DuplicateKey`] if a tract id repeats in any table.
/// - [`AnalysisError::InvalidTractId`] if a key cannot be normalized.
pub fn left_join(primary: &Table, primary_key: &str, sources: &[JoinSource<'_>]) -> Result<Table> {
    let key_col = primary.column_index(primary_key)?;

    let mut columns = primary.columns().to_vec();
    let mut lookups = Vec::with_capacity(sources.len());

    for source in sources {
        let source_key = source.table.column_index(source.key)?;
        let picked = source
            .columns
            .iter()
            .map(|c| source.table.column_index(c))
            .collect::<Result<Vec<_>>>()?;
        let index = index_by_tract(source.table, source_key)?;

        for column in source.columns {
            if columns.iter().any(|c| c == column) {
                columns.push(format!("{}_{}", column, source.table.name()));
            } else {
                columns.push(column.to_string());
            }
        }
        lookups.push((source.table, picked, index));
    }

    let mut joined = Table::new(primary.name(), columns);
    let mut seen = HashSet::with_capacity(primary.len());
    let mut unmatched = vec![0usize; lookups.len()];

    for row in primary.rows() {
        let raw = row[key_col]
            .as_deref()
            .ok_or_else(|| AnalysisError::InvalidTractId(String::new()))?;
        let id = normalize_tract_id(raw)?;
        if !seen.insert(id.clone()) {
            return Err(AnalysisError::DuplicateKey {
                table: primary.name().to_string(),
                id,
            });
        }

        let mut out = row.clone();
        out[key_col] = Some(id.clone());

        for (n, (table, picked, index)) in lookups.iter().enumerate() {
            match index.get(&id) {
                Some(&r) => out.extend(picked.iter().map(|&c| table.rows()[r][c].clone())),
                None => {
                    unmatched[n] += 1;
                    out.extend(picked.iter().map(|_| None));
                }
            }
        }

        joined.push_row(out);
    }

    for ((table, _, _), missing) in lookups.iter().zip(&unmatched) {
        debug!(
            primary = primary.name(),
            source = table.name(),
            rows = joined.len(),
            unmatched = missing,
            "Left join complete"
        );
    }

    Ok(joined)
}

/// Maps normalized tract id to row position. Rows with a null key cannot
/// be joined and are skipped.
fn index_by_tract(table: &Table, key_col: usize) -> Result<HashMap<String, usize>> {
    let mut index = HashMap::with_capacity(table.len());

    for (i, row) in table.rows().iter().enumerate() {
        let Some(raw) = row[key_col].as_deref() else {
            continue;
        };
        let id = normalize_tract_id(raw)?;
        if index.insert(id.clone(), i).is_some() {
            return Err(AnalysisError::DuplicateKey {
                table: table.name().to_string(),
                id,
            });
        }
    }

    Ok(index)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_pads_integer_text() {
        assert_eq!(normalize_tract_id("1001020100").unwrap(), "01001020100");
        assert_eq!(tract_id_from_int(1001020100).unwrap(), "01001020100");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        for raw in ["1", "1001020100", "01001020100", "1001020100.0", " 36061000100 "] {
            let once = normalize_tract_id(raw).unwrap();
            let twice = normalize_tract_id(&once).unwrap();
            assert_eq!(once, twice);
            assert_eq!(once.len(), TRACT_ID_WIDTH);
        }
    }

    #[test]
    fn test_normalize_rejects_garbage() {
        assert!(normalize_tract_id("").is_err());
        assert!(normalize_tract_id("12AB").is_err());
        assert!(normalize_tract_id("123456789012").is_err());
        assert!(normalize_tract_id("1001020100.5").is_err());
    }

    fn model() -> Table {
        Table::from_records(
            "model",
            &["GEOID", "resilience_score"],
            &[&["1001020100", "1.0"], &["1001020200", "-0.5"], &["1001020300", "0.2"]],
        )
    }

    fn fara() -> Table {
        Table::from_records(
            "fara",
            &["CensusTract", "County", "Urban"],
            &[&["01001020100", "Autauga County", "1"], &["1001020300.0", "Autauga County", "0"]],
        )
    }

    #[test]
    fn test_left_join_keeps_every_primary_row() {
        let model = model();
        let fara = fara();
        let joined = left_join(
            &model,
            "GEOID",
            &[JoinSource {
                table: &fara,
                key: "CensusTract",
                columns: &["County", "Urban"],
            }],
        )
        .unwrap();

        assert_eq!(joined.len(), model.len());
        assert_eq!(joined.columns(), &["GEOID", "resilience_score", "County", "Urban"]);
        assert_eq!(joined.value(0, "GEOID").unwrap(), Some("01001020100"));
        assert_eq!(joined.value(0, "County").unwrap(), Some("Autauga County"));
        // 1001020200 has no attributes: every right-hand field is null
        assert_eq!(joined.value(1, "County").unwrap(), None);
        assert_eq!(joined.value(1, "Urban").unwrap(), None);
        assert_eq!(joined.value(2, "Urban").unwrap(), Some("0"));
    }

    #[test]
    fn test_left_join_missing_key_column() {
        let model = model();
        let fara = fara();
        let err = left_join(
            &model,
            "GEOID",
            &[JoinSource {
                table: &fara,
                key: "GEOID",
                columns: &["County"],
            }],
        )
        .unwrap_err();

        assert!(matches!(err, AnalysisError::Schema { ref column, .. } if column == "GEOID"));
    }

    #[test]
    fn test_left_join_rejects_duplicate_secondary_keys() {
        let model = model();
        let dupes = Table::from_records(
            "fara",
            &["CensusTract", "County"],
            &[&["1001020100", "A"], &["01001020100", "B"]],
        );
        let err = left_join(
            &model,
            "GEOID",
            &[JoinSource {
                table: &dupes,
                key: "CensusTract",
                columns: &["County"],
            }],
        )
        .unwrap_err();

        assert!(matches!(err, AnalysisError::DuplicateKey { .. }));
    }

    #[test]
    fn test_left_join_suffixes_colliding_columns() {
        let left = Table::from_records("model", &["GEOID", "State"], &[&["1", "AL"]]);
        let right = Table::from_records("fara", &["CensusTract", "State"], &[&["1", "Alabama"]]);
        let joined = left_join(
            &left,
            "GEOID",
            &[JoinSource {
                table: &right,
                key: "CensusTract",
                columns: &["State"],
            }],
        )
        .unwrap();

        assert_eq!(joined.columns(), &["GEOID", "State", "State_fara"]);
        assert_eq!(joined.value(0, "State_fara").unwrap(), Some("Alabama"));
    }
}
