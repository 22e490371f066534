//! Settings for a reconciliation run.
//!
//! Values come from a `tagsync.toml` file when one exists, with command-line
//! flags layered on top by the binary.

use crate::scanner::{default_extensions, ScanConfig};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

/// Configuration file looked up in the image directory.
pub const DEFAULT_CONFIG_FILE: &str = "tagsync.toml";
/// Table used when none is given.
pub const DEFAULT_TABLE: &str = "file_tags.csv";
/// Identifier column used when none is given.
pub const DEFAULT_IDENTIFIER_COLUMN: &str = "Identifier";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileConfig {
    /// Table file, relative paths resolve against the image directory.
    #[serde(default = "default_table")]
    pub table: PathBuf,

    /// Column holding each image's fingerprint.
    #[serde(default = "default_identifier_column")]
    pub identifier_column: String,

    /// Keep records whose stored fingerprint no longer matches.
    #[serde(default)]
    pub keep_mismatched: bool,

    /// Image extensions, each with its leading dot.
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,

    /// Match extensions without regard to ASCII case.
    #[serde(default)]
    pub ignore_case: bool,
}

fn default_table() -> PathBuf {
    PathBuf::from(DEFAULT_TABLE)
}

fn default_identifier_column() -> String {
    DEFAULT_IDENTIFIER_COLUMN.to_string()
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            table: default_table(),
            identifier_column: default_identifier_column(),
            keep_mismatched: false,
            extensions: default_extensions(),
            ignore_case: false,
        }
    }
}

impl ReconcileConfig {
    /// Loads configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Loads `tagsync.toml` from `base`, then from the user config
    /// directory, falling back to defaults.
    ///
    /// A file that exists but cannot be parsed is an error rather than a
    /// silent fallback.
    pub fn load_or_default(base: &Path) -> Result<Self, ConfigError> {
        let candidates = [Some(base.join(DEFAULT_CONFIG_FILE)), user_config_path()];
        for candidate in candidates.into_iter().flatten() {
            if candidate.is_file() {
                log::debug!("loading configuration from {}", candidate.display());
                return Self::load(&candidate);
            }
        }
        Ok(Self::default())
    }

    pub fn scan_config(&self) -> ScanConfig {
        ScanConfig::new(self.extensions.clone()).with_ignore_case(self.ignore_case)
    }
}

/// `<config dir>/tagsync/tagsync.toml`, when the platform has a config dir.
pub fn user_config_path() -> Option<PathBuf> {
    let mut dir = dirs::config_dir()?;
    dir.push("tagsync");
    dir.push(DEFAULT_CONFIG_FILE);
    Some(dir)
}

#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "failed to read config {}: {}", path.display(), source)
            }
            Self::Parse { path, source } => {
                write!(f, "invalid config TOML {}: {}", path.display(), source)
            }
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse { source, .. } => Some(source),
        }
    }
}
