//! Individual reconciliation passes.
//!
//! Every pass consumes the record list and returns a new one, so records are
//! never removed from a sequence while it is being walked.

use crate::fingerprint::{Fingerprint, FingerprintError, Fingerprinter};
use crate::table::Record;
use indicatif::ProgressBar;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// A record whose stored fingerprint differs from the file on disk.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mismatch {
    pub filename: String,
    /// Value found in the identifier column.
    pub found: String,
    /// Value computed from the file now.
    pub expected: Fingerprint,
}

/// Outcome of checking one record against its file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Validation {
    Match,
    Mismatch { found: String, expected: Fingerprint },
    /// The file vanished, no fingerprint could be produced.
    Missing,
}

/// Result of [`drop_missing`] and [`add_untracked`]: the surviving records
/// plus the file names that were removed or added.
#[derive(Debug, Default)]
pub struct PassOutcome {
    pub records: Vec<Record>,
    pub affected: Vec<String>,
}

/// Result of [`validate_records`].
#[derive(Debug, Default)]
pub struct ValidationOutcome {
    pub records: Vec<Record>,
    pub mismatches: Vec<Mismatch>,
    /// Mismatched records that were left out of `records`.
    pub dropped: usize,
    /// Records whose file disappeared before it could be fingerprinted.
    pub missing: Vec<String>,
}

/// Result of [`recompute_records`].
#[derive(Debug, Default)]
pub struct RecomputeOutcome {
    pub records: Vec<Record>,
    /// Records whose identifier value changed.
    pub refreshed: usize,
    pub missing: Vec<String>,
}

/// Keeps only records whose file exists under `base`.
pub fn drop_missing(base: &Path, records: Vec<Record>, bar: &ProgressBar) -> PassOutcome {
    let mut outcome = PassOutcome::default();
    for record in records {
        bar.inc(1);
        if file_exists(base, record.filename()) {
            outcome.records.push(record);
        } else {
            log::debug!("dropping record for missing file {}", record.filename());
            outcome.affected.push(record.filename().to_string());
        }
    }
    outcome
}

/// Right-pads every record shorter than `width`. Returns how many grew.
pub fn pad_records(records: &mut [Record], width: usize) -> usize {
    records
        .iter_mut()
        .map(|record| record.pad_to(width))
        .filter(|&padded| padded)
        .count()
}

/// Appends a blank record for every image in `images` that no record names.
pub fn add_untracked(
    mut records: Vec<Record>,
    images: &[String],
    width: usize,
    bar: &ProgressBar,
) -> PassOutcome {
    let known: HashSet<String> = records
        .iter()
        .map(|record| record.filename().to_string())
        .collect();

    let mut affected = Vec::new();
    for image in images {
        bar.inc(1);
        if !known.contains(image) {
            log::debug!("adding record for untracked file {}", image);
            records.push(Record::blank(image.clone(), width));
            affected.push(image.clone());
        }
    }

    PassOutcome { records, affected }
}

/// Compares the identifier stored in `record` with the file's fingerprint.
pub fn check_record<F: Fingerprinter>(
    fingerprinter: &F,
    base: &Path,
    record: &Record,
    identifier: usize,
) -> Result<Validation, FingerprintError> {
    let Some(expected) = fingerprint_of(fingerprinter, base, record.filename())? else {
        return Ok(Validation::Missing);
    };

    let found = record.get(identifier).unwrap_or_default();
    if expected == found {
        Ok(Validation::Match)
    } else {
        Ok(Validation::Mismatch {
            found: found.to_string(),
            expected,
        })
    }
}

/// Checks every record's stored fingerprint without rewriting any of them.
///
/// Mismatched records are kept as they are when `keep_mismatched` is set and
/// left out otherwise. Records whose file vanished are always left out.
pub fn validate_records<F: Fingerprinter>(
    fingerprinter: &F,
    base: &Path,
    records: Vec<Record>,
    identifier: usize,
    keep_mismatched: bool,
    bar: &ProgressBar,
) -> Result<ValidationOutcome, FingerprintError> {
    let mut outcome = ValidationOutcome::default();
    for record in records {
        bar.inc(1);
        match check_record(fingerprinter, base, &record, identifier)? {
            Validation::Match => outcome.records.push(record),
            Validation::Mismatch { found, expected } => {
                log::warn!(
                    "fingerprint of {} differs: found {:?}, expected {}",
                    record.filename(),
                    found,
                    expected
                );
                outcome.mismatches.push(Mismatch {
                    filename: record.filename().to_string(),
                    found,
                    expected,
                });
                if keep_mismatched {
                    outcome.records.push(record);
                } else {
                    outcome.dropped += 1;
                }
            }
            Validation::Missing => {
                log::warn!("{} vanished during validation", record.filename());
                outcome.missing.push(record.filename().to_string());
            }
        }
    }
    Ok(outcome)
}

/// Overwrites every record's identifier with a freshly computed fingerprint.
pub fn recompute_records<F: Fingerprinter>(
    fingerprinter: &F,
    base: &Path,
    records: Vec<Record>,
    identifier: usize,
    bar: &ProgressBar,
) -> Result<RecomputeOutcome, FingerprintError> {
    let mut outcome = RecomputeOutcome::default();
    for mut record in records {
        bar.inc(1);
        let fingerprint = match fingerprint_of(fingerprinter, base, record.filename())? {
            Some(fingerprint) => fingerprint,
            None => {
                log::warn!("{} vanished before it could be fingerprinted", record.filename());
                outcome.missing.push(record.filename().to_string());
                continue;
            }
        };

        if record.get(identifier) != Some(fingerprint.as_str()) {
            outcome.refreshed += 1;
        }
        record.set(identifier, fingerprint.into_string());
        outcome.records.push(record);
    }
    Ok(outcome)
}

/// Fingerprints `base/filename`, mapping a missing file to `None`.
fn fingerprint_of<F: Fingerprinter>(
    fingerprinter: &F,
    base: &Path,
    filename: &str,
) -> Result<Option<Fingerprint>, FingerprintError> {
    if filename.is_empty() {
        return Ok(None);
    }
    match fingerprinter.fingerprint(&base.join(filename)) {
        Ok(fingerprint) => Ok(Some(fingerprint)),
        Err(FingerprintError::NotFound(_)) => Ok(None),
        Err(error) => Err(error),
    }
}

fn file_exists(base: &Path, filename: &str) -> bool {
    !filename.is_empty() && base.join(filename).exists()
}
