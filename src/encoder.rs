//! Document encoding
//!
//! Renderers turn assembled documents into output bytes. The JSON encoder
//! wraps each document with producer metadata so output files are
//! self-describing.

use crate::alerts::AlertEvaluator;
use crate::error::ReportError;
use crate::types::{AlertKind, CrossLocalitySummary, LocalityDocument, LocalityFailure, RunOutput};
use crate::{PRODUCER_NAME, VERSION};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// File name of the cross-locality summary, without extension
pub const SUMMARY_FILE: &str = "resumo_localidades";

/// Output format for assembled documents
pub trait DocumentEncoder {
    /// File extension for encoded documents, without the dot
    fn extension(&self) -> &'static str;

    fn encode_locality(&self, document: &LocalityDocument) -> Result<Vec<u8>, ReportError>;

    fn encode_summary(&self, summary: &CrossLocalitySummary) -> Result<Vec<u8>, ReportError>;
}

/// Producer metadata embedded in every encoded document
#[derive(Debug, Clone, Serialize)]
pub struct Producer {
    pub name: String,
    pub version: String,
    pub instance_id: String,
}

#[derive(Serialize)]
struct Notice {
    kind: AlertKind,
    message: String,
}

#[derive(Serialize)]
struct LocalityEnvelope<'a> {
    producer: &'a Producer,
    #[serde(flatten)]
    document: &'a LocalityDocument,
    has_any_alert: bool,
    notices: Vec<Notice>,
}

#[derive(Serialize)]
struct SummaryEnvelope<'a> {
    producer: &'a Producer,
    #[serde(flatten)]
    summary: &'a CrossLocalitySummary,
}

/// JSON encoder for locality documents and summaries
pub struct JsonEncoder {
    producer: Producer,
    evaluator: AlertEvaluator,
}

impl JsonEncoder {
    /// Create an encoder with a unique instance ID
    pub fn new(evaluator: AlertEvaluator) -> Self {
        Self::with_instance_id(evaluator, Uuid::new_v4().to_string())
    }

    /// Create an encoder with a specific instance ID
    pub fn with_instance_id(evaluator: AlertEvaluator, instance_id: String) -> Self {
        Self {
            producer: Producer {
                name: PRODUCER_NAME.to_string(),
                version: VERSION.to_string(),
                instance_id,
            },
            evaluator,
        }
    }
}

impl DocumentEncoder for JsonEncoder {
    fn extension(&self) -> &'static str {
        "json"
    }

    fn encode_locality(&self, document: &LocalityDocument) -> Result<Vec<u8>, ReportError> {
        let notices = document
            .alerts
            .active()
            .into_iter()
            .map(|kind| Notice {
                kind,
                message: self.evaluator.notice(kind),
            })
            .collect();

        let envelope = LocalityEnvelope {
            producer: &self.producer,
            document,
            has_any_alert: document.alerts.has_any_alert(),
            notices,
        };
        serde_json::to_vec_pretty(&envelope).map_err(ReportError::Json)
    }

    fn encode_summary(&self, summary: &CrossLocalitySummary) -> Result<Vec<u8>, ReportError> {
        let envelope = SummaryEnvelope {
            producer: &self.producer,
            summary,
        };
        serde_json::to_vec_pretty(&envelope).map_err(ReportError::Json)
    }
}

/// Write every document to `output_dir/{path_fragment}.{ext}`, then the summary
///
/// A document that cannot be encoded or written is moved from `documents`
/// to `failures` and the remaining documents are still written. The summary
/// is always written; its path is returned.
pub fn write_run<E: DocumentEncoder + ?Sized>(
    encoder: &E,
    output_dir: &Path,
    run: &mut RunOutput,
) -> Result<PathBuf, ReportError> {
    let mut written = Vec::with_capacity(run.documents.len());
    for document in run.documents.drain(..) {
        let path = output_dir.join(format!("{}.{}", document.path_fragment, encoder.extension()));
        let result = encoder
            .encode_locality(&document)
            .and_then(|bytes| write_file(&path, &bytes));

        match result {
            Ok(()) => written.push(document),
            Err(e) => {
                tracing::warn!(error = %e, locality = %document.report.key, "failed to write document");
                run.failures.push(LocalityFailure {
                    locality: document.report.key.clone(),
                    error: e.to_string(),
                });
            }
        }
    }
    run.documents = written;

    let summary_path = output_dir.join(format!("{SUMMARY_FILE}.{}", encoder.extension()));
    write_file(&summary_path, &encoder.encode_summary(&run.summary)?)?;
    Ok(summary_path)
}

/// Write `bytes` to `path`, creating parent directories
pub fn write_file(path: &Path, bytes: &[u8]) -> Result<(), ReportError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, bytes)?;
    tracing::debug!(path = %path.display(), bytes = bytes.len(), "document written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::{ADMINISTRATION_BOOK, FIRE_BRIGADE_BOOK};
    use crate::assembler::ReportAssembler;
    use crate::sectors::SectorTable;
    use crate::types::LocalityReport;
    use crate::types::RawRecord;
    use crate::pipeline::rows_to_documents;
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn sample_document() -> LocalityDocument {
        let mut report = LocalityReport::empty("INTERLAGOS", Utc::now());
        report.record(ADMINISTRATION_BOOK);
        report.record(FIRE_BRIGADE_BOOK);

        let evaluator = AlertEvaluator::default();
        let sectors = SectorTable::reference();
        ReportAssembler::new(&evaluator, &sectors)
            .assemble(report)
            .unwrap()
    }

    #[test]
    fn test_encode_locality() {
        let encoder = JsonEncoder::with_instance_id(AlertEvaluator::default(), "test".into());
        let bytes = encoder.encode_locality(&sample_document()).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(value["producer"]["name"], "ledger-report");
        assert_eq!(value["producer"]["instance_id"], "test");
        assert_eq!(value["report"]["key"], "INTERLAGOS");
        assert_eq!(value["report"]["total_count"], 2);
        assert_eq!(value["destination"]["sector"], "Setor 9.1");
        assert_eq!(value["path_fragment"], "Setor 9.1/interlagos");
        assert_eq!(value["has_any_alert"], true);
        assert_eq!(value["alerts"]["insufficient_maintenance"], true);
        assert_eq!(value["notices"].as_array().unwrap().len(), 1);
        assert_eq!(value["notices"][0]["kind"], "insufficient_maintenance");
    }

    #[test]
    fn test_encode_summary() {
        let evaluator = AlertEvaluator::default();
        let sectors = SectorTable::reference();
        let assembler = ReportAssembler::new(&evaluator, &sectors);

        let mut reports = BTreeMap::new();
        let mut report = LocalityReport::empty("A", Utc::now());
        report.record("foo");
        reports.insert("A".to_string(), report);
        let summary = assembler.summarize(&reports, None);

        let encoder = JsonEncoder::new(AlertEvaluator::default());
        let bytes = encoder.encode_summary(&summary).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(value["books"][0], "foo");
        assert_eq!(value["rows"][0]["locality"], "A");
        assert_eq!(value["rows"][0]["cells"][0]["count"], 1);
        assert_eq!(value["run_id"], summary.run_id.to_string());
        assert_eq!(encoder.extension(), "json");
    }

    #[test]
    fn test_write_run_continues_past_failed_document() {
        let rows = vec![
            RawRecord::new(["BR - INTERLAGOS - SP", "_", "1 - BOOKX"]),
            RawRecord::new(["BR - VILA NOVA - SP", "_", "1 - BOOKX"]),
            RawRecord::new(["BR - ZONA LESTE - SP", "_", "1 - BOOKX"]),
        ];
        let mut run = rows_to_documents(
            &rows,
            0,
            None,
            &AlertEvaluator::default(),
            &SectorTable::reference(),
        )
        .unwrap();

        // A plain file where the "outros" folder should be blocks both unassigned documents
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("outros"), "not a directory").unwrap();

        let encoder = JsonEncoder::new(AlertEvaluator::default());
        let summary_path = write_run(&encoder, dir.path(), &mut run).unwrap();

        assert_eq!(summary_path, dir.path().join("resumo_localidades.json"));
        assert!(summary_path.exists());
        assert!(dir.path().join("Setor 9.1/interlagos.json").exists());

        assert_eq!(run.documents.len(), 1);
        let failed: Vec<&str> = run.failures.iter().map(|f| f.locality.as_str()).collect();
        assert_eq!(failed, vec!["VILA NOVA", "ZONA LESTE"]);
        assert_eq!(run.summary.rows.len(), 3);
    }
}
