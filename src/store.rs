//! Report persistence
//!
//! Reports are persisted as a two-column CSV per locality:
//!
//! ```text
//! Livro,TotalTrabalhos
//! 1 - BOOKX,2
//! ```
//!
//! The generation timestamp is not stored; loaders supply it.

use crate::error::ReportError;
use crate::normalizer::file_stem;
use crate::types::{BookSummary, LocalityReport};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

/// Header row of a persisted report
pub const REPORT_HEADER: [&str; 2] = ["Livro", "TotalTrabalhos"];

const REPORT_EXTENSION: &str = "csv";

/// Storage for locality reports
pub trait ReportStore {
    /// Persist a report, replacing any previous one for the same locality
    fn save(&self, report: &LocalityReport) -> Result<(), ReportError>;

    /// Load the report for `locality`, or `NotFound`
    fn find_by_locality(&self, locality: &str) -> Result<LocalityReport, ReportError>;

    /// Load every stored report, ordered by locality
    fn find_all(&self) -> Result<Vec<LocalityReport>, ReportError>;
}

/// Encode a report into its persisted CSV form
pub fn encode_report(report: &LocalityReport) -> Result<String, ReportError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(REPORT_HEADER)?;
    for summary in report.books.values() {
        let count = summary.count.to_string();
        writer.write_record([summary.name.as_str(), count.as_str()])?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| ReportError::Encoding(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| ReportError::Encoding(e.to_string()))
}

/// Decode a persisted report
///
/// The total is recomputed from the rows. A header-only file is an empty report;
/// counts that overflow `u32` are rejected.
pub fn decode_report(
    locality: &str,
    data: &str,
    generated_at: DateTime<Utc>,
) -> Result<LocalityReport, ReportError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(data.as_bytes());

    let mut records = reader.records();
    if records.next().transpose()?.is_none() {
        return Err(ReportError::InvalidInputFormat(format!(
            "persisted report for {locality} is empty"
        )));
    }

    let mut report = LocalityReport::empty(locality, generated_at);
    for record in records {
        let record = record?;
        if record.len() < 2 {
            continue;
        }

        let name = record[0].trim();
        let count: u32 = record[1].trim().parse().map_err(|_| {
            ReportError::InvalidInputFormat(format!(
                "invalid count {:?} for book {:?} in report {locality}",
                &record[1], name
            ))
        })?;

        let overflow = || {
            ReportError::InvalidInputFormat(format!(
                "count for book {name:?} in report {locality} overflows"
            ))
        };

        let summary = report
            .books
            .entry(name.to_string())
            .or_insert_with(|| BookSummary {
                name: name.to_string(),
                count: 0,
            });
        summary.count = summary.count.checked_add(count).ok_or_else(overflow)?;
        report.total_count = report.total_count.checked_add(count).ok_or_else(overflow)?;
    }

    Ok(report)
}

/// File-backed store, one `{locality}.csv` per report
#[derive(Debug, Clone)]
pub struct FileReportStore {
    dir: PathBuf,
}

impl FileReportStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, locality: &str) -> Result<PathBuf, ReportError> {
        let stem = file_stem(locality)?;
        Ok(self.dir.join(format!("{stem}.{REPORT_EXTENSION}")))
    }
}

impl ReportStore for FileReportStore {
    fn save(&self, report: &LocalityReport) -> Result<(), ReportError> {
        let path = self.path_for(&report.key)?;
        fs::create_dir_all(&self.dir)?;
        fs::write(&path, encode_report(report)?)?;
        tracing::debug!(path = %path.display(), books = report.books.len(), "report saved");
        Ok(())
    }

    fn find_by_locality(&self, locality: &str) -> Result<LocalityReport, ReportError> {
        let path = self.path_for(locality)?;
        let data = match fs::read_to_string(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ReportError::NotFound(locality.to_string()))
            }
            Err(e) => return Err(e.into()),
        };

        let generated_at = fs::metadata(&path)
            .and_then(|meta| meta.modified())
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());

        decode_report(locality, &data, generated_at)
    }

    fn find_all(&self) -> Result<Vec<LocalityReport>, ReportError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut localities = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if !path.is_file()
                || path.extension().and_then(|ext| ext.to_str()) != Some(REPORT_EXTENSION)
            {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
                localities.push(stem.to_string());
            }
        }
        localities.sort();

        let mut reports = Vec::with_capacity(localities.len());
        for locality in localities {
            match self.find_by_locality(&locality) {
                Ok(report) => reports.push(report),
                Err(e) => {
                    tracing::warn!(error = %e, locality = %locality, "skipping unreadable report")
                }
            }
        }
        Ok(reports)
    }
}

/// In-process store
///
/// Accepts the same keys as [`FileReportStore`]. A lock poisoned by a
/// panicking writer is recovered, since every write replaces a whole entry.
#[derive(Debug, Default)]
pub struct MemoryReportStore {
    reports: RwLock<BTreeMap<String, LocalityReport>>,
}

impl MemoryReportStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ReportStore for MemoryReportStore {
    fn save(&self, report: &LocalityReport) -> Result<(), ReportError> {
        file_stem(&report.key)?;
        let mut reports = self.reports.write().unwrap_or_else(PoisonError::into_inner);
        reports.insert(report.key.clone(), report.clone());
        Ok(())
    }

    fn find_by_locality(&self, locality: &str) -> Result<LocalityReport, ReportError> {
        file_stem(locality)?;
        let reports = self.reports.read().unwrap_or_else(PoisonError::into_inner);
        reports
            .get(locality)
            .cloned()
            .ok_or_else(|| ReportError::NotFound(locality.to_string()))
    }

    fn find_all(&self) -> Result<Vec<LocalityReport>, ReportError> {
        let reports = self.reports.read().unwrap_or_else(PoisonError::into_inner);
        Ok(reports.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::{AggregationOptions, Aggregator};
    use crate::types::RawRecord;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn sample_report() -> LocalityReport {
        let rows = vec![
            RawRecord::new(["S - LOC1", "_", "1 - BOOKX"]),
            RawRecord::new(["S - LOC1", "_", "1 - BOOKX"]),
            RawRecord::new(["S - LOC1", "_", "2 - MANUTENÇÃO PREVENTIVA"]),
            RawRecord::new(["S - LOC1", "_", "3 - \"QUOTED\", BOOK"]),
        ];
        let mut reports = Aggregator::aggregate(&rows, &AggregationOptions::new(0), None).unwrap();
        reports.remove("LOC1").unwrap()
    }

    #[test]
    fn test_encode_report() {
        let mut report = LocalityReport::empty("LOC", Utc::now());
        report.record("1 - BOOKX");
        report.record("1 - BOOKX");

        let encoded = encode_report(&report).unwrap();
        assert_eq!(encoded, "Livro,TotalTrabalhos\n1 - BOOKX,2\n");
    }

    #[test]
    fn test_round_trip() {
        let report = sample_report();
        let encoded = encode_report(&report).unwrap();
        let decoded = decode_report("LOC1", &encoded, report.generated_at).unwrap();

        assert_eq!(decoded.books, report.books);
        assert_eq!(decoded.total_count, report.total_count);
        assert_eq!(decoded, report);
    }

    #[test]
    fn test_decode_tolerates_short_rows_and_whitespace() {
        let data = "Livro,TotalTrabalhos\n 1 - BOOKX , 3\nlonely\n";
        let report = decode_report("LOC", data, Utc::now()).unwrap();
        assert_eq!(report.count_of("1 - BOOKX"), Some(3));
        assert_eq!(report.total_count, 3);
    }

    #[test]
    fn test_decode_header_only_is_empty_report() {
        let report = decode_report("LOC", "Livro,TotalTrabalhos\n", Utc::now()).unwrap();
        assert!(report.books.is_empty());
        assert_eq!(report.total_count, 0);
    }

    #[test]
    fn test_decode_rejects_bad_input() {
        assert!(matches!(
            decode_report("LOC", "", Utc::now()),
            Err(ReportError::InvalidInputFormat(_))
        ));
        assert!(matches!(
            decode_report("LOC", "Livro,TotalTrabalhos\nX,many\n", Utc::now()),
            Err(ReportError::InvalidInputFormat(_))
        ));
    }

    #[test]
    fn test_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileReportStore::new(dir.path().join("reports"));
        let report = sample_report();

        store.save(&report).unwrap();
        let loaded = store.find_by_locality("LOC1").unwrap();

        assert_eq!(loaded.key, "LOC1");
        assert_eq!(loaded.books, report.books);
        assert_eq!(loaded.total_count, report.total_count);
    }

    #[test]
    fn test_decode_rejects_overflowing_counts() {
        for data in [
            "Livro,TotalTrabalhos\nA,4000000000\nB,4000000000\n",
            "Livro,TotalTrabalhos\nA,4000000000\nA,4000000000\n",
        ] {
            assert!(matches!(
                decode_report("L", data, Utc::now()),
                Err(ReportError::InvalidInputFormat(_))
            ));
        }

        let max = format!("Livro,TotalTrabalhos\nA,{}\n", u32::MAX);
        assert_eq!(decode_report("L", &max, Utc::now()).unwrap().total_count, u32::MAX);
    }

    #[test]
    fn test_file_store_keeps_writes_inside_its_directory() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileReportStore::new(dir.path().join("reports"));

        let rows = vec![RawRecord::new(["BR 1 - ../escaped - SP", "_", "1 - BOOKX"])];
        let mut reports = Aggregator::aggregate(&rows, &AggregationOptions::new(0), None).unwrap();
        let report = reports.remove("../escaped").unwrap();

        assert!(matches!(store.save(&report), Err(ReportError::InvalidLocality)));
        assert!(!dir.path().join("escaped.csv").exists());
        assert!(matches!(
            store.find_by_locality("../escaped"),
            Err(ReportError::InvalidLocality)
        ));
    }

    #[test]
    fn test_file_store_missing_report() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileReportStore::new(dir.path());

        assert!(matches!(
            store.find_by_locality("NOWHERE"),
            Err(ReportError::NotFound(ref l)) if l == "NOWHERE"
        ));
        assert!(matches!(
            store.find_by_locality(""),
            Err(ReportError::InvalidLocality)
        ));
    }

    #[test]
    fn test_file_store_find_all_skips_unreadable() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileReportStore::new(dir.path());

        let mut b = LocalityReport::empty("B", Utc::now());
        b.record("x");
        let mut a = LocalityReport::empty("A", Utc::now());
        a.record("y");
        store.save(&b).unwrap();
        store.save(&a).unwrap();
        fs::write(dir.path().join("BROKEN.csv"), "").unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let all = store.find_all().unwrap();
        let keys: Vec<&str> = all.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(keys, vec!["A", "B"]);
    }

    #[test]
    fn test_file_store_find_all_without_directory() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileReportStore::new(dir.path().join("missing"));
        assert!(store.find_all().unwrap().is_empty());
    }

    #[test]
    fn test_memory_store_recovers_poisoned_lock() {
        let store = Arc::new(MemoryReportStore::new());
        let writer = Arc::clone(&store);
        let _ = std::thread::spawn(move || {
            let _guard = writer.reports.write().unwrap();
            panic!("writer died holding the lock");
        })
        .join();
        assert!(store.reports.is_poisoned());

        let report = sample_report();
        store.save(&report).unwrap();
        assert_eq!(store.find_by_locality("LOC1").unwrap(), report);
        assert_eq!(store.find_all().unwrap().len(), 1);
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryReportStore::new();
        let report = sample_report();

        store.save(&report).unwrap();
        assert_eq!(store.find_by_locality("LOC1").unwrap(), report);
        assert_eq!(store.find_all().unwrap().len(), 1);
        assert!(matches!(
            store.find_by_locality("OTHER"),
            Err(ReportError::NotFound(_))
        ));
    }
}
