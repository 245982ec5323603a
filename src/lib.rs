//! Ledger Report - Aggregation and routing engine for per-locality work-log books
//!
//! Turns exported attendance rows into one report per locality through a
//! deterministic pipeline: key normalization → allow-list filtering →
//! aggregation → alert evaluation → sector routing → document assembly.
//!
//! ## Modules
//!
//! - **Engine**: normalizer, aggregator, alerts, sectors, assembler
//! - **I/O**: CSV ingest, persisted report store, JSON document encoder
//! - **Service**: configuration and the [`ReportService`] facade

pub mod aggregator;
pub mod alerts;
pub mod allowlist;
pub mod assembler;
pub mod config;
pub mod encoder;
pub mod error;
pub mod ingest;
pub mod normalizer;
pub mod pipeline;
pub mod sectors;
pub mod store;
pub mod types;

pub use aggregator::{AggregationOptions, Aggregator};
pub use alerts::{AlertEvaluator, AlertRules};
pub use allowlist::AllowList;
pub use assembler::ReportAssembler;
pub use config::ReportConfig;
pub use encoder::{DocumentEncoder, JsonEncoder};
pub use error::ReportError;
pub use normalizer::{extract_locality_key, remove_diacritics, Normalizer};
pub use pipeline::{rows_to_documents, ReportService};
pub use sectors::{Sector, SectorTable};
pub use store::{FileReportStore, MemoryReportStore, ReportStore};

/// Crate version embedded in every encoded document
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name for encoded documents
pub const PRODUCER_NAME: &str = "ledger-report";
