//! Core reconciliation engine for tagsync.
//!
//! A tag table is a CSV file whose first column names image files in one
//! directory and whose identifier column holds a fingerprint derived from
//! each file's metadata. This crate keeps that table in step with the
//! directory: records for vanished files are dropped, short records are
//! padded, untracked images are appended, and stored fingerprints can be
//! validated or recomputed.

pub mod config;
pub mod fingerprint;
pub mod progress;
pub mod reconcile;
pub mod reporting;
pub mod scanner;
pub mod sync;
pub mod table;

pub use config::{ConfigError, ReconcileConfig, DEFAULT_CONFIG_FILE};
pub use fingerprint::{
    fingerprint, FileStamp, Fingerprint, FingerprintError, Fingerprinter, MetadataFingerprinter,
};
pub use progress::ProgressMode;
pub use reconcile::{
    ReconcileError, ReconcileOptions, ReconcileSummary, Reconciler, Reconciliation, RunMode,
};
pub use reporting::{print_summary, write_report, ReportingError};
pub use scanner::{default_extensions, list_images, ScanConfig, ScanError, DEFAULT_EXTENSIONS};
pub use sync::{Mismatch, Validation};
pub use table::{read_table, write_table, ColumnSet, Record, Table, TableError};
