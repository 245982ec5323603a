//! Report assembly
//!
//! Combines aggregated reports with alert evaluation and sector routing into
//! the documents handed to renderers, plus the cross-locality summary.

use crate::alerts::AlertEvaluator;
use crate::allowlist::AllowList;
use crate::error::ReportError;
use crate::normalizer::file_stem;
use crate::sectors::SectorTable;
use crate::types::{
    CrossLocalitySummary, Destination, LocalityDocument, LocalityFailure, LocalityReport,
    RunOutput, SummaryCell, SummaryRow,
};
use chrono::Utc;
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

/// Relative output location for a locality document
///
/// Both segments must be usable as a single path component.
pub fn path_fragment(destination: &Destination, locality: &str) -> Result<String, ReportError> {
    let folder = file_stem(destination.as_str())?;
    let name = file_stem(locality)?.to_lowercase();
    Ok(format!("{folder}/{name}"))
}

/// Assembler for locality documents and summaries
pub struct ReportAssembler<'a> {
    evaluator: &'a AlertEvaluator,
    sectors: &'a SectorTable,
    run_id: Uuid,
}

impl<'a> ReportAssembler<'a> {
    pub fn new(evaluator: &'a AlertEvaluator, sectors: &'a SectorTable) -> Self {
        Self {
            evaluator,
            sectors,
            run_id: Uuid::new_v4(),
        }
    }

    /// Use a specific run id for summaries
    pub fn with_run_id(mut self, run_id: Uuid) -> Self {
        self.run_id = run_id;
        self
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Build the document for one locality
    pub fn assemble(&self, report: LocalityReport) -> Result<LocalityDocument, ReportError> {
        let destination = self.sectors.resolve(&report.key);
        let path_fragment = path_fragment(&destination, &report.key)?;
        let alerts = self.evaluator.evaluate(&report);

        Ok(LocalityDocument {
            report,
            alerts,
            destination,
            path_fragment,
        })
    }

    /// Build documents for every locality plus the summary
    ///
    /// A locality that fails to assemble is recorded in `failures`; the
    /// others are unaffected.
    pub fn assemble_all(
        &self,
        reports: BTreeMap<String, LocalityReport>,
        allow_list: Option<&AllowList>,
    ) -> RunOutput {
        let summary = self.summarize(&reports, allow_list);
        let mut documents = Vec::with_capacity(reports.len());
        let mut failures = Vec::new();

        for (locality, report) in reports {
            match self.assemble(report) {
                Ok(document) => documents.push(document),
                Err(e) => {
                    tracing::warn!(error = %e, locality = %locality, "skipping locality");
                    failures.push(LocalityFailure {
                        locality,
                        error: e.to_string(),
                    });
                }
            }
        }

        RunOutput {
            documents,
            summary,
            failures,
        }
    }

    /// Book-by-locality matrix across all reports
    ///
    /// Columns are every book observed in a report or named by the
    /// allow-list. A cell is `NotApplicable` when the locality has an
    /// allow-list entry that excludes the book.
    pub fn summarize(
        &self,
        reports: &BTreeMap<String, LocalityReport>,
        allow_list: Option<&AllowList>,
    ) -> CrossLocalitySummary {
        let mut books: BTreeSet<&str> = reports
            .values()
            .flat_map(|report| report.books.keys().map(String::as_str))
            .collect();
        if let Some(allow) = allow_list {
            books.extend(allow.all_books());
        }
        let books: Vec<String> = books.into_iter().map(str::to_string).collect();

        let rows = reports
            .values()
            .map(|report| SummaryRow {
                locality: report.key.clone(),
                cells: books
                    .iter()
                    .map(|book| summary_cell(report, book, allow_list))
                    .collect(),
            })
            .collect();

        let generated_at = reports
            .values()
            .map(|report| report.generated_at)
            .max()
            .unwrap_or_else(Utc::now);

        CrossLocalitySummary {
            run_id: self.run_id,
            generated_at,
            books,
            rows,
        }
    }
}

fn summary_cell(report: &LocalityReport, book: &str, allow_list: Option<&AllowList>) -> SummaryCell {
    let applicable = allow_list.map_or(true, |allow| allow.permits(&report.key, book));
    if applicable {
        SummaryCell::Count(report.count_of(book).unwrap_or(0))
    } else {
        SummaryCell::NotApplicable
    }
}
