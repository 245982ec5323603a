//! Core types for the report pipeline
//!
//! This module defines the data structures that flow through each stage:
//! raw records, per-locality reports, alert flags, routing destinations and
//! the cross-locality summary handed to renderers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Name of the bucket for localities that belong to no sector
pub const UNASSIGNED_BUCKET: &str = "outros";

/// One input row, as parsed by the CSV layer
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RawRecord {
    pub fields: Vec<String>,
}

impl RawRecord {
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn field(&self, index: usize) -> Option<&str> {
        self.fields.get(index).map(String::as_str)
    }
}

impl From<Vec<String>> for RawRecord {
    fn from(fields: Vec<String>) -> Self {
        Self { fields }
    }
}

impl From<csv::StringRecord> for RawRecord {
    fn from(record: csv::StringRecord) -> Self {
        Self::new(record.iter())
    }
}

/// Count of recorded activities for one book at one locality
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookSummary {
    pub name: String,
    pub count: u32,
}

/// Aggregated activity for a single locality
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalityReport {
    /// Canonical locality key
    pub key: String,
    /// Book name to summary, ordered by book name
    pub books: BTreeMap<String, BookSummary>,
    /// Sum of all book counts
    pub total_count: u32,
    /// When the aggregation run produced this report
    pub generated_at: DateTime<Utc>,
}

impl LocalityReport {
    /// Create a report with no books
    pub fn empty(key: impl Into<String>, generated_at: DateTime<Utc>) -> Self {
        Self {
            key: key.into(),
            books: BTreeMap::new(),
            total_count: 0,
            generated_at,
        }
    }

    /// Record one more activity for `book`
    pub fn record(&mut self, book: &str) {
        self.books
            .entry(book.to_string())
            .or_insert_with(|| BookSummary {
                name: book.to_string(),
                count: 0,
            })
            .count += 1;
        self.total_count += 1;
    }

    /// Count for `book`, if the book was observed
    pub fn count_of(&self, book: &str) -> Option<u32> {
        self.books.get(book).map(|summary| summary.count)
    }

    /// Sum of the per-book counts
    pub fn books_total(&self) -> u32 {
        self.books.values().map(|summary| summary.count).sum()
    }
}

/// Attention flags derived from a locality report
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertSet {
    pub missing_administration: bool,
    pub insufficient_maintenance: bool,
    pub missing_fire_brigade: bool,
}

/// Individual alert condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    MissingAdministration,
    InsufficientMaintenance,
    MissingFireBrigade,
}

/// Output destination of a locality document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Destination {
    Sector(String),
    Unassigned,
}

impl Destination {
    pub fn as_str(&self) -> &str {
        match self {
            Destination::Sector(name) => name.as_str(),
            Destination::Unassigned => UNASSIGNED_BUCKET,
        }
    }
}

/// Everything a renderer needs for one locality
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalityDocument {
    pub report: LocalityReport,
    pub alerts: AlertSet,
    pub destination: Destination,
    /// Relative output location, `"{destination}/{lowercase key}"`
    pub path_fragment: String,
}

/// One cell of the cross-locality summary
///
/// `Count(0)` means the book applies to the locality but nothing was
/// recorded; `NotApplicable` means the locality's allow-list excludes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SummaryCell {
    Count(u32),
    NotApplicable,
}

/// Summary row for one locality, cells aligned with `CrossLocalitySummary::books`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryRow {
    pub locality: String,
    pub cells: Vec<SummaryCell>,
}

/// Book-by-locality matrix across every locality in a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossLocalitySummary {
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub books: Vec<String>,
    pub rows: Vec<SummaryRow>,
}

impl CrossLocalitySummary {
    /// Look up the cell for a (locality, book) pair
    pub fn cell(&self, locality: &str, book: &str) -> Option<SummaryCell> {
        let column = self.books.iter().position(|b| b == book)?;
        self.rows
            .iter()
            .find(|row| row.locality == locality)
            .and_then(|row| row.cells.get(column).copied())
    }
}

/// A locality that could not be assembled or persisted during a batch run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalityFailure {
    pub locality: String,
    pub error: String,
}

/// Result of a batch run over all localities
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunOutput {
    pub documents: Vec<LocalityDocument>,
    pub summary: CrossLocalitySummary,
    pub failures: Vec<LocalityFailure>,
}
