use crate::scheduler::{JobOutcome, RunSummary};
use serde::Serialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

const REPORT_VERSION: u32 = 1;

#[derive(Serialize)]
struct RunReport<'a> {
    version: u32,
    generated_at: String,
    #[serde(flatten)]
    summary: &'a RunSummary,
}

/// Human-readable run summary: counts on stdout, one line per failed job
/// on stderr with the file, the stage, and the reason.
pub fn print_summary(summary: &RunSummary) {
    println!(
        "{} generated, {} skipped (fresh), {} failed",
        summary.generated, summary.skipped, summary.failed
    );
    for failure in &summary.failures {
        if let JobOutcome::Failed { stage, reason } = &failure.outcome {
            eprintln!("  {} [{}]: {}", failure.path.display(), stage, reason);
        }
    }
}

/// Writes the full summary as pretty JSON for scripted consumers.
pub fn write_report(summary: &RunSummary, output_path: &Path) -> Result<(), ReportingError> {
    let report = RunReport {
        version: REPORT_VERSION,
        generated_at: OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_else(|_| String::from("unknown")),
        summary,
    };
    let file = File::create(output_path).map_err(ReportingError::Io)?;
    let writer = BufWriter::new(file);
    serde_json::to_writer_pretty(writer, &report).map_err(ReportingError::Serialization)
}

#[derive(Debug)]
pub enum ReportingError {
    Io(std::io::Error),
    Serialization(serde_json::Error),
}

impl Display for ReportingError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(error) => write!(f, "io error: {}", error),
            Self::Serialization(error) => write!(f, "serialization error: {}", error),
        }
    }
}

impl Error for ReportingError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(error) => Some(error),
            Self::Serialization(error) => Some(error),
        }
    }
}
