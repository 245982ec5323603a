//! Allow-list of valid books per locality
//!
//! The books file lists, per row, a book name (field 0) and the locality it is
//! valid for (field 2). Localities without an entry are unrestricted.

use crate::error::ReportError;
use crate::normalizer::remove_diacritics;
use crate::types::RawRecord;
use std::collections::{BTreeMap, BTreeSet};

const BOOK_FIELD: usize = 0;
const LOCALITY_FIELD: usize = 2;
const MIN_FIELDS: usize = 3;

/// Read-only mapping of locality key to the set of books valid there
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllowList {
    entries: BTreeMap<String, BTreeSet<String>>,
}

impl AllowList {
    /// Build from an already-parsed mapping
    pub fn from_map<K, I, B>(map: impl IntoIterator<Item = (K, I)>) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = B>,
        B: Into<String>,
    {
        let entries = map
            .into_iter()
            .map(|(locality, books)| {
                (
                    locality.into(),
                    books.into_iter().map(Into::into).collect::<BTreeSet<_>>(),
                )
            })
            .collect();
        Self { entries }
    }

    /// Build from books-file rows, skipping `header_rows` leading rows
    pub fn from_rows(rows: &[RawRecord], header_rows: usize) -> Result<Self, ReportError> {
        if rows.len() <= header_rows {
            return Err(ReportError::InvalidInputFormat(format!(
                "books input has {} rows, expected more than {} header rows",
                rows.len(),
                header_rows
            )));
        }

        let mut entries: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        let mut skipped = 0usize;

        for row in &rows[header_rows..] {
            if row.len() < MIN_FIELDS {
                skipped += 1;
                continue;
            }

            let book = row.field(BOOK_FIELD).unwrap_or_default().trim();
            let locality = remove_diacritics(row.field(LOCALITY_FIELD).unwrap_or_default());
            let locality = locality.trim();

            if book.is_empty() || locality.is_empty() {
                skipped += 1;
                continue;
            }

            entries
                .entry(locality.to_string())
                .or_default()
                .insert(book.to_string());
        }

        tracing::debug!(
            localities = entries.len(),
            skipped,
            "allow-list loaded"
        );

        Ok(Self { entries })
    }

    /// Books configured for `locality`, if it has an entry
    pub fn books_for(&self, locality: &str) -> Option<&BTreeSet<String>> {
        self.entries.get(locality)
    }

    /// Whether `book` passes the filter for `locality`
    ///
    /// Localities without an entry accept every book.
    pub fn permits(&self, locality: &str, book: &str) -> bool {
        self.entries
            .get(locality)
            .map_or(true, |books| books.contains(book))
    }

    /// Every book named by any entry
    pub fn all_books(&self) -> BTreeSet<&str> {
        self.entries
            .values()
            .flat_map(|books| books.iter().map(String::as_str))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
