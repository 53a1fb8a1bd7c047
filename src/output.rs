//! Output formatting and persistence for report results.
//!
//! Supports pretty-printing to the log, JSON files and CSV tables. Every
//! file writer overwrites its target, so re-running a report reproduces it.

use std::fs::{self, File};
use std::path::Path;

use anyhow::Result;
use csv::WriterBuilder;
use serde::Serialize;
use tracing::{debug, info};

use crate::aggregate::AggregateTable;
use crate::stats::round_to;

fn create_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

/// Logs any serializable value using Rust's debug pretty-print format.
pub fn print_pretty<T: std::fmt::Debug>(value: &T) {
    debug!("{:#?}", value);
}

/// Logs a value as pretty-printed JSON.
pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    info!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// A CSV row type with a fixed header.
///
/// `COLUMNS` must list the serialized field names in order, so a file with
/// no rows still carries its header.
pub trait Record: Serialize {
    const COLUMNS: &'static [&'static str];
}

/// Writes the header from [`Record::COLUMNS`], then one line per record.
/// An empty slice writes a header-only file.
pub fn write_records<T: Record>(path: &Path, records: &[T]) -> Result<()> {
    create_parent(path)?;
    debug!(path = %path.display(), rows = records.len(), "Writing CSV");

    let mut writer = WriterBuilder::new().has_headers(false).from_path(path)?;
    writer.write_record(T::COLUMNS)?;
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;

    Ok(())
}

/// Writes a group-by result, rounding every value to `decimals` places.
/// Null keys and values become empty cells.
pub fn write_aggregate(path: &Path, table: &AggregateTable, decimals: u32) -> Result<()> {
    create_parent(path)?;
    debug!(path = %path.display(), rows = table.len(), "Writing aggregate");

    let mut writer = WriterBuilder::new().from_path(path)?;
    writer.write_record(table.key_columns.iter().chain(&table.value_columns))?;

    for row in &table.rows {
        let keys = row.keys.iter().map(|k| k.clone().unwrap_or_default());
        let values = row
            .values
            .iter()
            .map(|v| v.map(|v| round_to(v, decimals).to_string()).unwrap_or_default());
        writer.write_record(keys.chain(values))?;
    }
    writer.flush()?;

    Ok(())
}

/// Writes a square labelled matrix: a header of `labels` after an empty
/// corner cell, then one row per label. Null cells are left empty.
pub fn write_matrix(path: &Path, labels: &[&str], cells: &[Vec<Option<f64>>], decimals: u32) -> Result<()> {
    create_parent(path)?;
    debug!(path = %path.display(), size = labels.len(), "Writing matrix");

    let mut writer = WriterBuilder::new().from_path(path)?;
    writer.write_record(std::iter::once("").chain(labels.iter().copied()))?;

    for (label, row) in labels.iter().zip(cells) {
        let values = row
            .iter()
            .map(|v| v.map(|v| round_to(v, decimals).to_string()).unwrap_or_default());
        writer.write_record(std::iter::once(label.to_string()).chain(values))?;
    }
    writer.flush()?;

    Ok(())
}

/// Writes `value` as pretty-printed JSON.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    create_parent(path)?;
    debug!(path = %path.display(), "Writing JSON");

    let file = File::create(path)?;
    serde_json::to_writer_pretty(file, value)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::GroupRow;
    use std::env;
    use std::path::PathBuf;

    fn temp_path(name: &str) -> PathBuf {
        env::temp_dir().join(name)
    }

    #[derive(Debug, Serialize)]
    struct Row {
        #[serde(rename = "Census_Tract")]
        id: String,
        score: f64,
        county: Option<String>,
    }

    impl Record for Row {
        const COLUMNS: &'static [&'static str] = &["Census_Tract", "score", "county"];
    }

    fn rows() -> Vec<Row> {
        vec![
            Row {
                id: "01001020100".to_string(),
                score: 1.5,
                county: Some("Autauga County".to_string()),
            },
            Row {
                id: "01001020200".to_string(),
                score: -0.25,
                county: None,
            },
        ]
    }

    #[test]
    fn test_print_pretty_does_not_panic() {
        print_pretty(&rows());
    }

    #[test]
    fn test_print_json_does_not_panic() {
        print_json(&rows()).unwrap();
    }

    #[test]
    fn test_write_records_keeps_leading_zeros() {
        let path = temp_path("food_desert_resilience_test_records.csv");
        let _ = fs::remove_file(&path);

        write_records(&path, &rows()).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines[0], "Census_Tract,score,county");
        assert_eq!(lines[1], "01001020100,1.5,Autauga County");
        assert_eq!(lines[2], "01001020200,-0.25,");

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_write_records_overwrites() {
        let path = temp_path("food_desert_resilience_test_overwrite.csv");
        let _ = fs::remove_file(&path);

        write_records(&path, &rows()).unwrap();
        write_records(&path, &rows()).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        // 1 header + 2 data rows
        assert_eq!(content.lines().count(), 3);

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_write_records_empty_keeps_header() {
        let path = temp_path("food_desert_resilience_test_empty_records.csv");
        let _ = fs::remove_file(&path);

        write_records::<Row>(&path, &[]).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content, "Census_Tract,score,county\n");

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_write_aggregate_rounds_and_blanks_nulls() {
        let path = temp_path("food_desert_resilience_test_aggregate.csv");
        let table = AggregateTable {
            key_columns: vec!["StateAbbr".to_string()],
            value_columns: vec!["count".to_string(), "mean".to_string()],
            rows: vec![
                GroupRow {
                    keys: vec![Some("AL".to_string())],
                    values: vec![Some(2.0), Some(0.123456)],
                },
                GroupRow {
                    keys: vec![None],
                    values: vec![Some(1.0), None],
                },
            ],
        };

        write_aggregate(&path, &table, 3).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines, vec!["StateAbbr,count,mean", "AL,2,0.123", ",1,"]);

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_write_matrix() {
        let path = temp_path("food_desert_resilience_test_matrix.csv");
        let cells = vec![vec![Some(1.0), Some(0.12345)], vec![None, Some(1.0)]];

        write_matrix(&path, &["a", "b"], &cells, 2).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines, vec![",a,b", "a,1,0.12", "b,,1"]);

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_write_json_creates_parent_dir() {
        let dir = temp_path("food_desert_resilience_test_json_dir");
        let _ = fs::remove_dir_all(&dir);
        let path = dir.join("summary.json");

        write_json(&path, &serde_json::json!({ "total_tracts": 5 })).unwrap();

        let parsed: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(parsed["total_tracts"], 5);

        fs::remove_dir_all(&dir).unwrap();
    }
}
