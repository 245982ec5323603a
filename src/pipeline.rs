//! Pipeline orchestration
//!
//! This module provides the public API for generating reports. It runs raw
//! records through the full pipeline and persists the results.

use crate::aggregator::{AggregationOptions, Aggregator};
use crate::alerts::{AlertEvaluator, AlertRules};
use crate::allowlist::AllowList;
use crate::assembler::ReportAssembler;
use crate::config::ReportConfig;
use crate::error::ReportError;
use crate::sectors::SectorTable;
use crate::store::ReportStore;
use crate::types::{LocalityDocument, LocalityFailure, LocalityReport, RawRecord, RunOutput};
use chrono::Utc;

/// Aggregate rows and assemble documents for every locality, without persistence.
///
/// Pipeline stages:
/// 1. Aggregator - Normalize keys, filter and count books
/// 2. AlertEvaluator - Derive attention flags per locality
/// 3. SectorTable - Route each locality to its sector folder
/// 4. ReportAssembler - Build documents and the cross-locality summary
pub fn rows_to_documents(
    rows: &[RawRecord],
    header_rows: usize,
    allow_list: Option<&AllowList>,
    evaluator: &AlertEvaluator,
    sectors: &SectorTable,
) -> Result<RunOutput, ReportError> {
    let reports = Aggregator::aggregate(rows, &AggregationOptions::new(header_rows), allow_list)?;
    Ok(ReportAssembler::new(evaluator, sectors).assemble_all(reports, allow_list))
}

/// Report service with injected reference data and storage
pub struct ReportService<S: ReportStore> {
    header_rows: usize,
    evaluator: AlertEvaluator,
    sectors: SectorTable,
    store: S,
}

impl<S: ReportStore> ReportService<S> {
    pub fn new(header_rows: usize, rules: AlertRules, sectors: SectorTable, store: S) -> Self {
        for (locality, owners) in sectors.overlaps() {
            tracing::warn!(
                locality = %locality,
                sectors = ?owners,
                routed_to = %owners[0],
                "locality claimed by more than one sector"
            );
        }

        Self {
            header_rows,
            evaluator: AlertEvaluator::new(rules),
            sectors,
            store,
        }
    }

    /// Create a service from configuration
    pub fn from_config(config: &ReportConfig, store: S) -> Self {
        Self::new(
            config.header_rows,
            config.alerts.clone(),
            config.sector_table(),
            store,
        )
    }

    pub fn evaluator(&self) -> &AlertEvaluator {
        &self.evaluator
    }

    pub fn sectors(&self) -> &SectorTable {
        &self.sectors
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Generate and persist the report for a single locality
    pub fn generate_report(
        &self,
        rows: &[RawRecord],
        allow_list: Option<&AllowList>,
        locality: &str,
    ) -> Result<LocalityDocument, ReportError> {
        if locality.is_empty() {
            return Err(ReportError::InvalidLocality);
        }

        let options = AggregationOptions::new(self.header_rows);
        let report = Aggregator::aggregate_locality(rows, &options, allow_list, locality)?;
        let document = self.assembler().assemble(report)?;
        self.store.save(&document.report)?;

        tracing::info!(
            locality = %locality,
            total = document.report.total_count,
            destination = %document.destination.as_str(),
            "report generated"
        );
        Ok(document)
    }

    /// Generate and persist reports for every locality
    ///
    /// A locality that cannot be assembled or saved is listed in
    /// `failures` and left out of `documents`; the run continues.
    pub fn generate_all(
        &self,
        rows: &[RawRecord],
        allow_list: Option<&AllowList>,
    ) -> Result<RunOutput, ReportError> {
        let options = AggregationOptions::new(self.header_rows).generated_at(Utc::now());
        let reports = Aggregator::aggregate(rows, &options, allow_list)?;
        let mut output = self.assembler().assemble_all(reports, allow_list);

        let mut saved = Vec::with_capacity(output.documents.len());
        for document in output.documents.drain(..) {
            match self.store.save(&document.report) {
                Ok(()) => saved.push(document),
                Err(e) => {
                    tracing::warn!(error = %e, locality = %document.report.key, "failed to persist report");
                    output.failures.push(LocalityFailure {
                        locality: document.report.key.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }
        output.documents = saved;

        tracing::info!(
            localities = output.documents.len(),
            failures = output.failures.len(),
            run_id = %output.summary.run_id,
            "report run finished"
        );
        Ok(output)
    }

    /// Load a previously persisted report
    pub fn get_report(&self, locality: &str) -> Result<LocalityReport, ReportError> {
        if locality.is_empty() {
            return Err(ReportError::InvalidLocality);
        }
        self.store.find_by_locality(locality)
    }

    /// Load every persisted report
    pub fn get_all_reports(&self) -> Result<Vec<LocalityReport>, ReportError> {
        self.store.find_all()
    }

    fn assembler(&self) -> ReportAssembler<'_> {
        ReportAssembler::new(&self.evaluator, &self.sectors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::{ADMINISTRATION_BOOK, FIRE_BRIGADE_BOOK, MAINTENANCE_BOOK};
    use crate::sectors::Sector;
    use crate::store::{FileReportStore, MemoryReportStore};
    use crate::types::{Destination, SummaryCell};
    use pretty_assertions::assert_eq;

    fn row(site: &str, book: &str) -> RawRecord {
        RawRecord::new([site, "2024-01-01", book])
    }

    fn sample_rows() -> Vec<RawRecord> {
        let mut rows = vec![RawRecord::new(["Localidade", "Data", "Livro"])];
        rows.push(row("BR 21 - INTERLAGOS - SP", ADMINISTRATION_BOOK));
        rows.push(row("BR 21 - INTERLAGOS - SP", FIRE_BRIGADE_BOOK));
        for _ in 0..8 {
            rows.push(row("BR 21 - INTERLAGOS - SP", MAINTENANCE_BOOK));
        }
        rows.push(row("BR 22 - VILA NOVA - SP", "1 - BOOKX"));
        rows.push(row("BR 22 - VILA NOVA - SP", "9 - NOT ALLOWED"));
        rows.push(row("BR 23 - PARQUE GRAJAÚ - SP", MAINTENANCE_BOOK));
        rows
    }

    fn sample_allow_list() -> AllowList {
        AllowList::from_map([("VILA NOVA", vec!["1 - BOOKX", "2 - BOOKY"])])
    }

    fn service<S: ReportStore>(store: S) -> ReportService<S> {
        ReportService::new(1, AlertRules::default(), SectorTable::reference(), store)
    }

    #[test]
    fn test_rows_to_documents() {
        let output = rows_to_documents(
            &sample_rows(),
            1,
            Some(&sample_allow_list()),
            &AlertEvaluator::default(),
            &SectorTable::reference(),
        )
        .unwrap();

        let keys: Vec<&str> = output
            .documents
            .iter()
            .map(|d| d.report.key.as_str())
            .collect();
        assert_eq!(keys, vec!["INTERLAGOS", "PARQUE GRAJAU", "VILA NOVA"]);
        assert!(output.failures.is_empty());
        assert!(output.documents[1].alerts.insufficient_maintenance);
    }

    #[test]
    fn test_rows_to_documents_uses_given_rules() {
        let rules = AlertRules {
            maintenance_minimum: 1,
            ..AlertRules::default()
        };
        let output = rows_to_documents(
            &sample_rows(),
            1,
            None,
            &AlertEvaluator::new(rules),
            &SectorTable::reference(),
        )
        .unwrap();

        let grajau = &output.documents[1];
        assert_eq!(grajau.report.key, "PARQUE GRAJAU");
        assert!(!grajau.alerts.insufficient_maintenance);
    }

    #[test]
    fn test_generate_all_records_traversal_key_as_failure() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(FileReportStore::new(dir.path().join("reports")));
        let mut rows = sample_rows();
        rows.push(row("BR 1 - ../escaped - SP", "1 - BOOKX"));

        let output = svc.generate_all(&rows, None).unwrap();

        assert_eq!(output.documents.len(), 3);
        assert_eq!(output.failures.len(), 1);
        assert_eq!(output.failures[0].locality, "../escaped");
        assert!(!dir.path().join("escaped.csv").exists());
        assert_eq!(svc.get_all_reports().unwrap().len(), 3);
    }

    #[test]
    fn test_generate_all() {
        let svc = service(MemoryReportStore::new());
        let output = svc
            .generate_all(&sample_rows(), Some(&sample_allow_list()))
            .unwrap();

        let interlagos = &output.documents[0];
        assert_eq!(interlagos.report.total_count, 10);
        assert!(!interlagos.alerts.has_any_alert());
        assert_eq!(interlagos.path_fragment, "Setor 9.1/interlagos");

        let grajau = &output.documents[1];
        assert_eq!(grajau.destination, Destination::Sector("Setor 9.2".into()));
        assert!(grajau.alerts.insufficient_maintenance);

        let vila = &output.documents[2];
        assert_eq!(vila.destination, Destination::Unassigned);
        assert_eq!(vila.path_fragment, "outros/vila nova");
        assert_eq!(vila.report.books.len(), 1);
        assert_eq!(vila.report.count_of("9 - NOT ALLOWED"), None);

        assert_eq!(
            output.summary.cell("VILA NOVA", "2 - BOOKY"),
            Some(SummaryCell::Count(0))
        );
        assert_eq!(
            output.summary.cell("VILA NOVA", MAINTENANCE_BOOK),
            Some(SummaryCell::NotApplicable)
        );
        assert_eq!(
            output.summary.cell("PARQUE GRAJAU", MAINTENANCE_BOOK),
            Some(SummaryCell::Count(1))
        );

        // Every report of the run carries the same timestamp
        let stamps: Vec<_> = output
            .documents
            .iter()
            .map(|d| d.report.generated_at)
            .collect();
        assert!(stamps.windows(2).all(|w| w[0] == w[1]));

        assert_eq!(svc.get_all_reports().unwrap().len(), 3);
        assert_eq!(svc.get_report("INTERLAGOS").unwrap(), interlagos.report);
    }

    #[test]
    fn test_generate_all_invalid_input() {
        let svc = service(MemoryReportStore::new());
        let rows = vec![RawRecord::new(["Localidade", "Data", "Livro"])];
        assert!(matches!(
            svc.generate_all(&rows, None),
            Err(ReportError::InvalidInputFormat(_))
        ));
        assert!(svc.get_all_reports().unwrap().is_empty());
    }

    #[test]
    fn test_generate_report_single_locality() {
        let svc = service(MemoryReportStore::new());
        let doc = svc
            .generate_report(&sample_rows(), None, "VILA NOVA")
            .unwrap();

        assert_eq!(doc.report.total_count, 2);
        assert_eq!(svc.get_all_reports().unwrap().len(), 1);
        assert_eq!(svc.get_report("VILA NOVA").unwrap().total_count, 2);
    }

    #[test]
    fn test_generate_report_unknown_locality_is_empty() {
        let svc = service(MemoryReportStore::new());
        let doc = svc
            .generate_report(&sample_rows(), None, "NOWHERE")
            .unwrap();

        assert_eq!(doc.report.total_count, 0);
        assert!(doc.alerts.missing_administration);
        assert_eq!(doc.destination, Destination::Unassigned);
    }

    #[test]
    fn test_empty_locality_is_rejected() {
        let svc = service(MemoryReportStore::new());
        assert!(matches!(
            svc.generate_report(&sample_rows(), None, ""),
            Err(ReportError::InvalidLocality)
        ));
        assert!(matches!(svc.get_report(""), Err(ReportError::InvalidLocality)));
        assert!(svc.get_all_reports().unwrap().is_empty());
    }

    #[test]
    fn test_get_report_not_found() {
        let svc = service(MemoryReportStore::new());
        assert!(matches!(
            svc.get_report("INTERLAGOS"),
            Err(ReportError::NotFound(_))
        ));
    }

    #[test]
    fn test_persist_and_reload_through_files() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(FileReportStore::new(dir.path()));
        let output = svc.generate_all(&sample_rows(), None).unwrap();

        for document in &output.documents {
            let reloaded = svc.get_report(&document.report.key).unwrap();
            assert_eq!(reloaded.books, document.report.books);
            assert_eq!(reloaded.total_count, document.report.total_count);
            assert_eq!(reloaded.books_total(), reloaded.total_count);
        }
    }

    #[test]
    fn test_first_match_sector_table() {
        let sectors = SectorTable::new(vec![
            Sector::new("First", "A", ["INTERLAGOS"]),
            Sector::new("Second", "B", ["INTERLAGOS"]),
        ]);
        let svc = ReportService::new(1, AlertRules::default(), sectors, MemoryReportStore::new());

        let doc = svc
            .generate_report(&sample_rows(), None, "INTERLAGOS")
            .unwrap();
        assert_eq!(doc.destination, Destination::Sector("First".into()));
    }

    #[test]
    fn test_from_config() {
        let config = ReportConfig::from_toml("header_rows = 1\n[alerts]\nmaintenance_minimum = 1\n")
            .unwrap();
        let svc = ReportService::from_config(&config, MemoryReportStore::new());

        let doc = svc
            .generate_report(&sample_rows(), None, "PARQUE GRAJAU")
            .unwrap();
        assert!(!doc.alerts.insufficient_maintenance);
        assert_eq!(svc.evaluator().rules().maintenance_minimum, 1);
    }
}
