//! CSV and tab-separated readers for the pipeline's input files.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use csv::{ReaderBuilder, Trim};
use tracing::debug;

use crate::error::Result;
use crate::table::{Table, cell};

/// Gazetteer column names mapped to the names used downstream.
const CENTROID_COLUMNS: &[(&str, &str)] = &[
    ("GEOID", "GEOID"),
    ("INTPTLAT", "latitude"),
    ("INTPTLONG", "longitude"),
];

/// Decodes a delimited table from `reader`.
///
/// Header names are trimmed of surrounding whitespace. Ragged rows are
/// accepted and padded with nulls.
///
/// # Errors
///
/// Returns an error if the bytes are not valid delimited text.
pub fn parse_table<R: Read>(name: &str, reader: R, delimiter: u8) -> Result<Table> {
    let mut rdr = ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .trim(Trim::Headers)
        .from_reader(reader);

    let columns = rdr
        .headers()?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();
    let mut table = Table::new(name, columns);

    for record in rdr.records() {
        let record = record?;
        table.push_row(record.iter().map(cell).collect());
    }

    Ok(table)
}

/// Reads a comma-separated file. The table is named after the file stem.
pub fn read_table(path: &Path) -> Result<Table> {
    let name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("table");
    let table = parse_table(name, File::open(path)?, b',')?;
    debug!(path = %path.display(), rows = table.len(), "Loaded table");
    Ok(table)
}

/// Reads the tab-separated tract gazetteer and keeps only the id and the
/// internal point, renamed to `latitude`/`longitude`.
pub fn read_centroids(path: &Path) -> Result<Table> {
    let raw = parse_table("centroids", File::open(path)?, b'\t')?;
    let centroids = select_centroid_columns(&raw)?;
    debug!(path = %path.display(), rows = centroids.len(), "Loaded centroids");
    Ok(centroids)
}

fn select_centroid_columns(raw: &Table) -> Result<Table> {
    let indices = CENTROID_COLUMNS
        .iter()
        .map(|(source, _)| raw.column_index(source))
        .collect::<Result<Vec<_>>>()?;

    let mut table = Table::new(
        raw.name(),
        CENTROID_COLUMNS.iter().map(|(_, t)| t.to_string()).collect(),
    );
    for row in raw.rows() {
        table.push_row(indices.iter().map(|&i| row[i].clone()).collect());
    }
    Ok(table)
}
