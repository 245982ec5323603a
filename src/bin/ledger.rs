//! Ledger CLI - Command-line interface for Ledger Report
//!
//! Commands:
//! - generate: Build and persist reports for every locality
//! - report: Build and persist the report for one locality
//! - show: Print a persisted report
//! - list: List persisted reports
//! - doctor: Diagnose configuration and input files

use clap::{Parser, Subcommand};
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use ledger_report::encoder::{write_file, write_run, DocumentEncoder, JsonEncoder};
use ledger_report::ingest::read_records_from_path;
use ledger_report::types::{LocalityReport, RawRecord};
use ledger_report::{
    AllowList, FileReportStore, ReportConfig, ReportError, ReportService, PRODUCER_NAME, VERSION,
};

/// Ledger - Per-locality work-log book reports
#[derive(Parser)]
#[command(name = "ledger")]
#[command(version = VERSION)]
#[command(about = "Aggregate work-log book entries into per-locality reports", long_about = None)]
struct Cli {
    /// TOML configuration file (overrides $LEDGER_CONFIG)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build, persist and write documents for every locality
    Generate {
        #[command(flatten)]
        inputs: InputArgs,

        /// Output directory for JSON documents
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Build and persist the report for one locality
    Report {
        /// Locality key, e.g. "INTERLAGOS"
        #[arg(short, long)]
        locality: String,

        #[command(flatten)]
        inputs: InputArgs,

        /// Output directory for the JSON document
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print a persisted report
    Show {
        /// Locality key
        #[arg(short, long)]
        locality: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List persisted reports
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Diagnose configuration and input files
    Doctor {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(clap::Args)]
struct InputArgs {
    /// Attendance CSV export
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Books CSV (allow-list); skipped when absent
    #[arg(short, long)]
    books: Option<PathBuf>,

    /// Leading rows to skip in both CSV files
    #[arg(long)]
    header_rows: Option<usize>,
}

fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e))
                    .unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("ledger_report=info,warn"));
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry.with(fmt::layer().json().with_writer(io::stderr)).init();
    } else {
        registry
            .with(fmt::layer().compact().with_writer(io::stderr))
            .init();
    }
}

fn run(cli: Cli) -> Result<(), LedgerCliError> {
    let config = match &cli.config {
        Some(path) => ReportConfig::load(path)?,
        None => ReportConfig::from_env()?,
    };

    match cli.command {
        Commands::Generate { inputs, output } => cmd_generate(config, &inputs, output),
        Commands::Report {
            locality,
            inputs,
            output,
        } => cmd_report(config, &locality, &inputs, output),
        Commands::Show { locality, json } => cmd_show(&config, &locality, json),
        Commands::List { json } => cmd_list(&config, json),
        Commands::Doctor { json } => cmd_doctor(&config, json),
    }
}

fn cmd_generate(
    mut config: ReportConfig,
    inputs: &InputArgs,
    output: Option<PathBuf>,
) -> Result<(), LedgerCliError> {
    let (rows, allow_list) = load_inputs(&mut config, inputs)?;
    let output_dir = output.unwrap_or_else(|| config.output_path());

    let service = service_for(&config);
    let mut run = service.generate_all(&rows, allow_list.as_ref())?;
    let encoder = JsonEncoder::new(service.evaluator().clone());
    let summary_path = write_run(&encoder, &output_dir, &mut run)?;

    for failure in &run.failures {
        eprintln!("Skipped {}: {}", failure.locality, failure.error);
    }
    println!(
        "Generated {} reports in {} ({} skipped), summary at {}",
        run.documents.len(),
        output_dir.display(),
        run.failures.len(),
        summary_path.display()
    );

    Ok(())
}

fn cmd_report(
    mut config: ReportConfig,
    locality: &str,
    inputs: &InputArgs,
    output: Option<PathBuf>,
) -> Result<(), LedgerCliError> {
    let (rows, allow_list) = load_inputs(&mut config, inputs)?;
    let output_dir = output.unwrap_or_else(|| config.output_path());

    let service = service_for(&config);
    let document = service.generate_report(&rows, allow_list.as_ref(), locality)?;
    let encoder = JsonEncoder::new(service.evaluator().clone());

    let path = document_path(&output_dir, &document.path_fragment, encoder.extension());
    write_file(&path, &encoder.encode_locality(&document)?)?;

    for kind in document.alerts.active() {
        println!("[ALERT] {}", service.evaluator().notice(kind));
    }
    println!(
        "{}: {} entries -> {}",
        document.report.key,
        document.report.total_count,
        path.display()
    );

    Ok(())
}

fn cmd_show(config: &ReportConfig, locality: &str, json: bool) -> Result<(), LedgerCliError> {
    let service = service_for(config);
    let report = service.get_report(locality)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(())
}

fn cmd_list(config: &ReportConfig, json: bool) -> Result<(), LedgerCliError> {
    let service = service_for(config);
    let reports = service.get_all_reports()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
        return Ok(());
    }

    if reports.is_empty() {
        println!("No reports in {}", config.reports_path().display());
    }
    for report in &reports {
        println!(
            "{:<40} {:>6} entries  {:>3} books",
            report.key,
            report.total_count,
            report.books.len()
        );
    }
    Ok(())
}

fn cmd_doctor(config: &ReportConfig, json: bool) -> Result<(), LedgerCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "version".to_string(),
        status: CheckStatus::Ok,
        message: format!("Ledger version {}", VERSION),
    });

    checks.push(csv_check("input", &config.input_path(), config.header_rows, true));
    checks.push(csv_check("books", &config.books_path(), config.header_rows, false));

    let sectors = config.sector_table();
    let overlaps = sectors.overlaps();
    checks.push(if overlaps.is_empty() {
        DoctorCheck {
            name: "sectors".to_string(),
            status: CheckStatus::Ok,
            message: format!("{} sectors configured", sectors.sectors().len()),
        }
    } else {
        DoctorCheck {
            name: "sectors".to_string(),
            status: CheckStatus::Warning,
            message: format!(
                "Localities listed by more than one sector: {}",
                overlaps.keys().cloned().collect::<Vec<_>>().join(", ")
            ),
        }
    });

    let reports_dir = config.reports_path();
    checks.push(if reports_dir.is_dir() {
        DoctorCheck {
            name: "reports_dir".to_string(),
            status: CheckStatus::Ok,
            message: format!("{} exists", reports_dir.display()),
        }
    } else {
        DoctorCheck {
            name: "reports_dir".to_string(),
            status: CheckStatus::Warning,
            message: format!("{} does not exist yet", reports_dir.display()),
        }
    });

    let stdout_check = if atty::is(atty::Stream::Stdout) {
        DoctorCheck {
            name: "stdout".to_string(),
            status: CheckStatus::Ok,
            message: "stdout is a TTY (interactive mode)".to_string(),
        }
    } else {
        DoctorCheck {
            name: "stdout".to_string(),
            status: CheckStatus::Ok,
            message: "stdout is redirected".to_string(),
        }
    };
    checks.push(stdout_check);

    let report = DoctorReport {
        producer: PRODUCER_NAME.to_string(),
        version: VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Ledger Doctor Report");
        println!("====================");
        println!("Producer: {}", report.producer);
        println!("Version:  {}", report.version);
        println!("\nChecks:");

        for check in &report.checks {
            let status_icon = match check.status {
                CheckStatus::Ok => "[OK]",
                CheckStatus::Warning => "[WARN]",
                CheckStatus::Error => "[ERR]",
            };
            println!("  {} {}: {}", status_icon, check.name, check.message);
        }
    }

    let has_errors = report.checks.iter().any(|c| matches!(c.status, CheckStatus::Error));
    if has_errors {
        Err(LedgerCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

// Helper functions

fn service_for(config: &ReportConfig) -> ReportService<FileReportStore> {
    ReportService::from_config(config, FileReportStore::new(config.reports_path()))
}

fn load_inputs(
    config: &mut ReportConfig,
    inputs: &InputArgs,
) -> Result<(Vec<RawRecord>, Option<AllowList>), LedgerCliError> {
    if let Some(rows) = inputs.header_rows {
        config.header_rows = rows;
    }

    let input_path = inputs.input.clone().unwrap_or_else(|| config.input_path());
    let rows = read_records_from_path(&input_path)?;

    let books_path = inputs.books.clone().unwrap_or_else(|| config.books_path());
    let allow_list = if books_path.exists() {
        let books = read_records_from_path(&books_path)?;
        let allow_list = AllowList::from_rows(&books, config.header_rows)?;
        tracing::info!(path = %books_path.display(), localities = allow_list.len(), "allow-list loaded");
        Some(allow_list)
    } else {
        tracing::warn!(path = %books_path.display(), "books file not found, not filtering books");
        None
    };

    Ok((rows, allow_list))
}

fn document_path(output_dir: &Path, fragment: &str, extension: &str) -> PathBuf {
    output_dir.join(format!("{fragment}.{extension}"))
}

fn print_report(report: &LocalityReport) {
    println!("Locality: {}", report.key);
    println!("Generated: {}", report.generated_at.to_rfc3339());
    println!();
    for summary in report.books.values() {
        println!("  {:<45} {:>6}", summary.name, summary.count);
    }
    println!("  {:<45} {:>6}", "TOTAL", report.total_count);
}

fn csv_check(name: &str, path: &Path, header_rows: usize, required: bool) -> DoctorCheck {
    if !path.exists() {
        return DoctorCheck {
            name: name.to_string(),
            status: if required {
                CheckStatus::Error
            } else {
                CheckStatus::Warning
            },
            message: format!("{} does not exist", path.display()),
        };
    }

    match read_records_from_path(path) {
        Ok(rows) if rows.len() > header_rows => DoctorCheck {
            name: name.to_string(),
            status: CheckStatus::Ok,
            message: format!(
                "{} data rows after {} header rows",
                rows.len() - header_rows,
                header_rows
            ),
        },
        Ok(rows) => DoctorCheck {
            name: name.to_string(),
            status: CheckStatus::Error,
            message: format!(
                "Only {} rows, expected more than {} header rows",
                rows.len(),
                header_rows
            ),
        },
        Err(e) => DoctorCheck {
            name: name.to_string(),
            status: CheckStatus::Error,
            message: format!("Cannot read {}: {}", path.display(), e),
        },
    }
}

// Error types

#[derive(Debug)]
enum LedgerCliError {
    Io(io::Error),
    Report(ReportError),
    Json(serde_json::Error),
    DoctorFailed,
}

impl From<io::Error> for LedgerCliError {
    fn from(e: io::Error) -> Self {
        LedgerCliError::Io(e)
    }
}

impl From<ReportError> for LedgerCliError {
    fn from(e: ReportError) -> Self {
        LedgerCliError::Report(e)
    }
}

impl From<serde_json::Error> for LedgerCliError {
    fn from(e: serde_json::Error) -> Self {
        LedgerCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<LedgerCliError> for CliError {
    fn from(e: LedgerCliError) -> Self {
        match e {
            LedgerCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            LedgerCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: None,
            },
            LedgerCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
            },
            LedgerCliError::Report(e) => {
                let (code, hint) = match &e {
                    ReportError::InvalidInputFormat(_) => (
                        "INVALID_INPUT",
                        Some("Check the CSV export and --header-rows"),
                    ),
                    ReportError::InvalidLocality => {
                        ("INVALID_LOCALITY", Some("Pass a non-empty --locality"))
                    }
                    ReportError::NotFound(_) => (
                        "NOT_FOUND",
                        Some("Run 'ledger generate' or 'ledger list' first"),
                    ),
                    ReportError::Csv(_) => ("CSV_ERROR", Some("Check CSV quoting and encoding")),
                    ReportError::Io(_) => ("IO_ERROR", Some("Check file paths and permissions")),
                    ReportError::Json(_) => ("JSON_ERROR", None),
                    ReportError::Config(_) => (
                        "CONFIG_ERROR",
                        Some("Check the TOML file given by --config or $LEDGER_CONFIG"),
                    ),
                    ReportError::Encoding(_) => ("ENCODING_ERROR", None),
                };
                CliError {
                    code: code.to_string(),
                    message: e.to_string(),
                    hint: hint.map(str::to_string),
                }
            }
        }
    }
}

// Report types

#[derive(serde::Serialize)]
struct DoctorReport {
    producer: String,
    version: String,
    checks: Vec<DoctorCheck>,
}

#[derive(serde::Serialize)]
struct DoctorCheck {
    name: String,
    status: CheckStatus,
    message: String,
}

#[derive(serde::Serialize)]
enum CheckStatus {
    Ok,
    Warning,
    Error,
}
