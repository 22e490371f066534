//! Reconciliation runs over a whole table.
//!
//! A run always walks the same stages in order: load the table, drop
//! records for files that no longer exist, pad short records, add records
//! for untracked images, then optionally validate or recompute fingerprints
//! and save. Any error aborts the run before the table is written.

use crate::fingerprint::{FingerprintError, Fingerprinter, MetadataFingerprinter};
use crate::progress::ProgressMode;
use crate::scanner::{list_images, ScanConfig, ScanError};
use crate::sync::{
    add_untracked, drop_missing, pad_records, recompute_records, validate_records, Mismatch,
};
use crate::table::{read_table, write_table, ColumnSet, Record, Table, TableError};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

/// Which entry point produced a summary.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    Sync,
    Validate,
    Recompute,
}

impl Display for RunMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sync => write!(f, "sync"),
            Self::Validate => write!(f, "validate"),
            Self::Recompute => write!(f, "recompute"),
        }
    }
}

/// What a run changed, collected per record instead of aborting.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileSummary {
    pub mode: RunMode,
    pub table: PathBuf,
    /// Records dropped because their file does not exist.
    pub removed: Vec<String>,
    /// Records that were padded to the column count.
    pub padded: usize,
    /// Records appended for untracked images.
    pub added: Vec<String>,
    pub mismatches: Vec<Mismatch>,
    /// Mismatched records left out of the saved table.
    pub mismatches_dropped: usize,
    /// Records whose file vanished while fingerprints were computed.
    pub vanished: Vec<String>,
    /// Records whose identifier value was rewritten by a recompute.
    pub refreshed: usize,
    pub saved: bool,
}

impl ReconcileSummary {
    fn new(mode: RunMode, table: PathBuf) -> Self {
        Self {
            mode,
            table,
            removed: Vec::new(),
            padded: 0,
            added: Vec::new(),
            mismatches: Vec::new(),
            mismatches_dropped: 0,
            vanished: Vec::new(),
            refreshed: 0,
            saved: false,
        }
    }

    /// Whether the record list differs from what was loaded.
    ///
    /// Mismatches that were kept do not count: validation never rewrites a
    /// stored identifier.
    pub fn changed(&self) -> bool {
        !self.removed.is_empty()
            || self.padded > 0
            || !self.added.is_empty()
            || self.mismatches_dropped > 0
            || !self.vanished.is_empty()
            || self.refreshed > 0
    }
}

/// The reconciled table together with its summary.
#[derive(Clone, Debug)]
pub struct Reconciliation {
    pub table: Table,
    pub summary: ReconcileSummary,
}

impl Reconciliation {
    pub fn into_parts(self) -> (Vec<Record>, ColumnSet) {
        (self.table.records, self.table.columns)
    }
}

/// Parameters shared by every run.
#[derive(Clone, Debug)]
pub struct ReconcileOptions {
    /// Directory the file names in the table are relative to.
    pub base_dir: PathBuf,
    pub scan: ScanConfig,
    pub progress: ProgressMode,
    /// Run every pass but leave the table file untouched.
    pub dry_run: bool,
}

impl ReconcileOptions {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            scan: ScanConfig::default(),
            progress: ProgressMode::Visible,
            dry_run: false,
        }
    }

    pub fn with_scan_config(mut self, scan: ScanConfig) -> Self {
        self.scan = scan;
        self
    }

    pub fn with_progress(mut self, progress: ProgressMode) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_dry_run(mut self, enabled: bool) -> Self {
        self.dry_run = enabled;
        self
    }
}

/// Keeps a tag table in step with the images in one directory.
pub struct Reconciler<F = MetadataFingerprinter> {
    options: ReconcileOptions,
    fingerprinter: F,
}

impl Reconciler<MetadataFingerprinter> {
    pub fn new(options: ReconcileOptions) -> Self {
        Self {
            options,
            fingerprinter: MetadataFingerprinter,
        }
    }
}

impl<F: Fingerprinter> Reconciler<F> {
    pub fn with_fingerprinter<G: Fingerprinter>(self, fingerprinter: G) -> Reconciler<G> {
        Reconciler {
            options: self.options,
            fingerprinter,
        }
    }

    pub fn options(&self) -> &ReconcileOptions {
        &self.options
    }

    /// Resolves a table path; relative paths are taken from the base directory.
    pub fn table_path(&self, table: &Path) -> PathBuf {
        if table.is_absolute() {
            table.to_path_buf()
        } else {
            self.options.base_dir.join(table)
        }
    }

    /// Synchronises the table with the directory without touching
    /// fingerprints. Saves only when records changed.
    pub fn reconcile(&self, table: &Path) -> Result<Reconciliation, ReconcileError> {
        let path = self.table_path(table);
        let loaded = read_table(&path)?;
        let mut summary = ReconcileSummary::new(RunMode::Sync, path.clone());

        let table = self.synchronise(loaded, &mut summary)?;
        self.finish(&path, table, summary)
    }

    /// Synchronises the table, then checks every stored fingerprint.
    ///
    /// Mismatched records are dropped unless `keep_mismatched` is set, in
    /// which case they keep their stale value. Stored identifiers are never
    /// rewritten here; the table is saved only when records were dropped,
    /// padded or added.
    pub fn validate(
        &self,
        table: &Path,
        identifier_column: &str,
        keep_mismatched: bool,
    ) -> Result<Reconciliation, ReconcileError> {
        let path = self.table_path(table);
        let loaded = read_table(&path)?;
        let identifier = loaded.columns.index_of(identifier_column)?;
        let mut summary = ReconcileSummary::new(RunMode::Validate, path.clone());

        let mut table = self.synchronise(loaded, &mut summary)?;

        let bar = self
            .options
            .progress
            .bar(table.records.len(), "Checking fingerprints");
        let outcome = validate_records(
            &self.fingerprinter,
            &self.options.base_dir,
            table.records,
            identifier,
            keep_mismatched,
            &bar,
        )?;
        bar.finish_and_clear();

        log::info!(
            "Found {} fingerprint mismatches ({} dropped)",
            outcome.mismatches.len(),
            outcome.dropped
        );
        table.records = outcome.records;
        summary.mismatches = outcome.mismatches;
        summary.mismatches_dropped = outcome.dropped;
        summary.vanished = outcome.missing;

        self.finish(&path, table, summary)
    }

    /// Synchronises the table, then overwrites every record's identifier
    /// with a freshly computed fingerprint. Always saves.
    pub fn recompute(
        &self,
        table: &Path,
        identifier_column: &str,
    ) -> Result<Reconciliation, ReconcileError> {
        let path = self.table_path(table);
        let loaded = read_table(&path)?;
        let identifier = loaded.columns.index_of(identifier_column)?;
        let mut summary = ReconcileSummary::new(RunMode::Recompute, path.clone());

        let mut table = self.synchronise(loaded, &mut summary)?;

        let bar = self
            .options
            .progress
            .bar(table.records.len(), "Computing fingerprints");
        let outcome = recompute_records(
            &self.fingerprinter,
            &self.options.base_dir,
            table.records,
            identifier,
            &bar,
        )?;
        bar.finish_and_clear();

        log::info!("Refreshed {} fingerprints", outcome.refreshed);
        table.records = outcome.records;
        summary.refreshed = outcome.refreshed;
        summary.vanished = outcome.missing;

        self.finish(&path, table, summary)
    }

    /// Drops records for missing files, pads short records and adds records
    /// for untracked images, in that order.
    pub fn synchronise(
        &self,
        table: Table,
        summary: &mut ReconcileSummary,
    ) -> Result<Table, ReconcileError> {
        let Table { columns, records } = table;
        let base = &self.options.base_dir;

        let bar = self
            .options
            .progress
            .bar(records.len(), "Checking if images exist");
        let pruned = drop_missing(base, records, &bar);
        bar.finish_and_clear();
        log::info!("Removed {} images from the table", pruned.affected.len());
        summary.removed = pruned.affected;

        let mut records = pruned.records;
        summary.padded = pad_records(&mut records, columns.len());
        if summary.padded > 0 {
            log::info!("Padded {} short records", summary.padded);
        }

        let images = list_images(base, &self.options.scan)?;
        let bar = self
            .options
            .progress
            .bar(images.len(), "Checking for untracked images");
        let augmented = add_untracked(records, &images, columns.len(), &bar);
        bar.finish_and_clear();
        log::info!("Added {} images to the table", augmented.affected.len());
        summary.added = augmented.affected;

        Ok(Table::new(columns, augmented.records))
    }

    fn finish(
        &self,
        path: &Path,
        table: Table,
        mut summary: ReconcileSummary,
    ) -> Result<Reconciliation, ReconcileError> {
        let wanted = match summary.mode {
            RunMode::Recompute => true,
            RunMode::Sync | RunMode::Validate => summary.changed(),
        };

        if wanted && self.options.dry_run {
            log::info!("Dry run, leaving {} untouched", path.display());
        } else if wanted {
            write_table(path, &table)?;
            summary.saved = true;
            log::info!("Saved {} records to {}", table.records.len(), path.display());
        } else {
            log::debug!("{} unchanged, not saving", path.display());
        }

        Ok(Reconciliation { table, summary })
    }
}

#[derive(Debug)]
pub enum ReconcileError {
    Table(TableError),
    Scan(ScanError),
    Fingerprint(FingerprintError),
}

impl Display for ReconcileError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Table(error) => write!(f, "{}", error),
            Self::Scan(error) => write!(f, "{}", error),
            Self::Fingerprint(error) => write!(f, "{}", error),
        }
    }
}

impl Error for ReconcileError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Table(error) => Some(error),
            Self::Scan(error) => Some(error),
            Self::Fingerprint(error) => Some(error),
        }
    }
}

impl From<TableError> for ReconcileError {
    fn from(error: TableError) -> Self {
        Self::Table(error)
    }
}

impl From<ScanError> for ReconcileError {
    fn from(error: ScanError) -> Self {
        Self::Scan(error)
    }
}

impl From<FingerprintError> for ReconcileError {
    fn from(error: FingerprintError) -> Self {
        Self::Fingerprint(error)
    }
}
