//! Record aggregation
//!
//! Groups raw records into per-locality, per-book counts:
//! - locality key derived from the site field (field 0)
//! - book name taken from field 2, trimmed
//! - optional scope filter and allow-list filtering

use crate::allowlist::AllowList;
use crate::error::ReportError;
use crate::normalizer::Normalizer;
use crate::types::{LocalityReport, RawRecord};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

const SITE_FIELD: usize = 0;
const BOOK_FIELD: usize = 2;
const MIN_FIELDS: usize = 3;

/// Parameters for one aggregation run
#[derive(Debug, Clone, Default)]
pub struct AggregationOptions {
    /// Leading rows to skip before data starts
    pub header_rows: usize,
    /// Only keep rows for this locality key, when set and non-empty
    pub scope: Option<String>,
    /// Timestamp stamped on every report; defaults to the start of the run
    pub generated_at: Option<DateTime<Utc>>,
}

impl AggregationOptions {
    pub fn new(header_rows: usize) -> Self {
        Self {
            header_rows,
            ..Default::default()
        }
    }

    pub fn with_scope(mut self, locality: impl Into<String>) -> Self {
        self.scope = Some(locality.into());
        self
    }

    pub fn generated_at(mut self, at: DateTime<Utc>) -> Self {
        self.generated_at = Some(at);
        self
    }

    fn active_scope(&self) -> Option<&str> {
        self.scope.as_deref().filter(|scope| !scope.is_empty())
    }
}

#[derive(Debug, Default)]
struct SkipCounts {
    malformed: usize,
    empty_book: usize,
    out_of_scope: usize,
    not_allowed: usize,
}

/// Aggregator for turning raw records into locality reports
pub struct Aggregator;

impl Aggregator {
    /// Aggregate all rows into one report per locality key
    pub fn aggregate(
        rows: &[RawRecord],
        options: &AggregationOptions,
        allow_list: Option<&AllowList>,
    ) -> Result<BTreeMap<String, LocalityReport>, ReportError> {
        if rows.len() <= options.header_rows {
            return Err(ReportError::InvalidInputFormat(format!(
                "input has {} rows, expected more than {} header rows",
                rows.len(),
                options.header_rows
            )));
        }

        let generated_at = options.generated_at.unwrap_or_else(Utc::now);
        let scope = options.active_scope();
        let mut reports: BTreeMap<String, LocalityReport> = BTreeMap::new();
        let mut skipped = SkipCounts::default();

        for row in &rows[options.header_rows..] {
            if row.len() < MIN_FIELDS {
                skipped.malformed += 1;
                continue;
            }

            let key = Normalizer::locality_key(row.field(SITE_FIELD).unwrap_or_default());
            let book = row.field(BOOK_FIELD).unwrap_or_default().trim();

            if book.is_empty() {
                skipped.empty_book += 1;
                continue;
            }

            if scope.is_some_and(|scope| scope != key) {
                skipped.out_of_scope += 1;
                continue;
            }

            if let Some(allow) = allow_list {
                if !allow.permits(&key, book) {
                    skipped.not_allowed += 1;
                    continue;
                }
            }

            reports
                .entry(key)
                .or_insert_with_key(|key| LocalityReport::empty(key.clone(), generated_at))
                .record(book);
        }

        tracing::debug!(
            rows = rows.len() - options.header_rows,
            localities = reports.len(),
            malformed = skipped.malformed,
            empty_book = skipped.empty_book,
            out_of_scope = skipped.out_of_scope,
            not_allowed = skipped.not_allowed,
            "aggregation finished"
        );

        Ok(reports)
    }

    /// Aggregate a single locality
    ///
    /// Returns an empty report when no row matched the locality.
    pub fn aggregate_locality(
        rows: &[RawRecord],
        options: &AggregationOptions,
        allow_list: Option<&AllowList>,
        locality: &str,
    ) -> Result<LocalityReport, ReportError> {
        if locality.is_empty() {
            return Err(ReportError::InvalidLocality);
        }

        let generated_at = options.generated_at.unwrap_or_else(Utc::now);
        let scoped = options
            .clone()
            .with_scope(locality)
            .generated_at(generated_at);

        let mut reports = Self::aggregate(rows, &scoped, allow_list)?;
        Ok(reports
            .remove(locality)
            .unwrap_or_else(|| LocalityReport::empty(locality, generated_at)))
    }
}
