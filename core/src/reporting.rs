use crate::reconcile::ReconcileSummary;
use serde::Serialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

#[derive(Serialize)]
struct Report<'a> {
    generated_at: String,
    #[serde(flatten)]
    summary: &'a ReconcileSummary,
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

impl Error for ReportingError {}

/// Prints the pass counts and every mismatch to stdout.
pub fn print_summary(summary: &ReconcileSummary) {
    println!("Removed {} images from the table", summary.removed.len());
    println!("Added {} images to the table", summary.added.len());
    if summary.padded > 0 {
        println!("Padded {} short records", summary.padded);
    }
    for mismatch in &summary.mismatches {
        println!(
            "Fingerprint of {} is not the same. Found: {}, expected: {}",
            mismatch.filename, mismatch.found, mismatch.expected
        );
    }
    if !summary.vanished.is_empty() {
        println!(
            "{} images vanished while fingerprinting",
            summary.vanished.len()
        );
    }
    if summary.refreshed > 0 {
        println!("Refreshed {} fingerprints", summary.refreshed);
    }
    if summary.saved {
        println!("Table written to {}", summary.table.display());
    }
}

/// Writes `summary` as pretty JSON with a generation timestamp.
pub fn write_report(summary: &ReconcileSummary, output_path: &Path) -> Result<(), ReportingError> {
    let report = Report {
        generated_at: OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_else(|_| String::from("unknown")),
        summary,
    };

    let file = File::create(output_path).map_err(ReportingError::Io)?;
    let writer = BufWriter::new(file);
    serde_json::to_writer_pretty(writer, &report).map_err(ReportingError::Serialization)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::FileStamp;
    use crate::reconcile::RunMode;
    use crate::sync::Mismatch;
    use serde_json::Value;
    use std::path::PathBuf;
    use tempfile::tempdir;

    #[test]
    fn report_contains_summary_fields() {
        let dir = tempdir().unwrap();
        let output = dir.path().join("report.json");
        let expected = FileStamp {
            size_bytes: 100,
            created: 1_700_000_000.5,
            extension: String::from(".png"),
        }
        .fingerprint();
        let summary = ReconcileSummary {
            mode: RunMode::Validate,
            table: PathBuf::from("file_tags.csv"),
            removed: vec![String::from("gone.png")],
            padded: 0,
            added: Vec::new(),
            mismatches: vec![Mismatch {
                filename: String::from("a.png"),
                found: String::from("stale"),
                expected,
            }],
            mismatches_dropped: 1,
            vanished: Vec::new(),
            refreshed: 0,
            saved: true,
        };

        write_report(&summary, &output).unwrap();
        let json: Value =
            serde_json::from_str(&std::fs::read_to_string(&output).unwrap()).unwrap();
        assert_eq!(json["mode"], "validate");
        assert_eq!(json["removed"][0], "gone.png");
        assert_eq!(json["mismatches"][0]["expected"], "MjQ3OTEyMDMzMS41");
        assert!(json["generated_at"].is_string());
    }
}
