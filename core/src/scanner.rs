use crate::fingerprint::split_extension;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Extensions recognised as images when none are configured.
pub const DEFAULT_EXTENSIONS: [&str; 5] = [".bmp", ".gif", ".jpeg", ".jpg", ".png"];

pub fn default_extensions() -> Vec<String> {
    DEFAULT_EXTENSIONS.iter().map(|ext| ext.to_string()).collect()
}

/// Which files in the base directory count as images.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScanConfig {
    /// Extensions with their leading dot, e.g. `.png`.
    pub extensions: Vec<String>,
    /// When true, `.PNG` matches `.png`.
    pub ignore_case: bool,
}

impl ScanConfig {
    pub fn new(extensions: Vec<String>) -> Self {
        Self {
            extensions,
            ignore_case: false,
        }
    }

    pub fn with_ignore_case(mut self, enabled: bool) -> Self {
        self.ignore_case = enabled;
        self
    }

    /// Checks whether `name` carries one of the configured extensions.
    pub fn matches(&self, name: &str) -> bool {
        let extension = split_extension(name);
        if extension.is_empty() {
            return false;
        }
        self.extensions.iter().any(|candidate| {
            if self.ignore_case {
                candidate.eq_ignore_ascii_case(extension)
            } else {
                candidate == extension
            }
        })
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self::new(default_extensions())
    }
}

/// Lists image file names directly inside `base`, sorted by name.
///
/// Subdirectories are not descended into.
pub fn list_images(base: &Path, config: &ScanConfig) -> Result<Vec<String>, ScanError> {
    let mut names = Vec::new();
    for entry in WalkDir::new(base).min_depth(1).max_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|error| ScanError {
            path: base.to_path_buf(),
            message: error.to_string(),
        })?;
        let Some(name) = entry.file_name().to_str() else {
            log::debug!("skipping non UTF-8 name {}", entry.path().display());
            continue;
        };
        if entry.path().is_file() && config.matches(name) {
            names.push(name.to_string());
        }
    }
    Ok(names)
}

#[derive(Debug)]
pub struct ScanError {
    pub path: PathBuf,
    pub message: String,
}

impl Display for ScanError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "failed to list {}: {}", self.path.display(), self.message)
    }
}

impl Error for ScanError {}
