//! CSV ingestion
//!
//! Reads exported CSV files into raw records. Headers are not interpreted
//! here (callers skip a configurable number of leading rows) and ragged rows
//! are kept so the aggregator can drop them.

use crate::error::ReportError;
use crate::types::RawRecord;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Read every row of a comma-separated input
pub fn read_records<R: Read>(reader: R) -> Result<Vec<RawRecord>, ReportError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(b',')
        .from_reader(reader);

    let mut records = Vec::new();
    for record in csv_reader.records() {
        records.push(RawRecord::from(record?));
    }
    Ok(records)
}

/// Read every row of the CSV file at `path`
pub fn read_records_from_path(path: &Path) -> Result<Vec<RawRecord>, ReportError> {
    let file = File::open(path).map_err(|e| {
        ReportError::InvalidInputFormat(format!("cannot open {}: {}", path.display(), e))
    })?;
    let records = read_records(file)?;
    tracing::debug!(path = %path.display(), rows = records.len(), "input read");
    Ok(records)
}
