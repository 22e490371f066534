//! Metadata-derived image fingerprints.
//!
//! A fingerprint is built from the file size, its creation timestamp and its
//! extension, never from the pixel data. Renaming a file keeps the
//! fingerprint, copying it does not (the copy gets a new timestamp), and two
//! files that agree on all three inputs collide. Existing tables rely on
//! exactly this behaviour, so the arithmetic and text rendering below mirror
//! the values those tables already hold.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::fs::{self, Metadata};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Magnitudes at or above this switch to exponent notation.
const EXPONENT_UPPER: f64 = 1e16;
/// Non-zero magnitudes below this switch to exponent notation.
const EXPONENT_LOWER: f64 = 1e-4;

/// Printable identifier stored in a table's identifier column.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl Display for Fingerprint {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl PartialEq<str> for Fingerprint {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for Fingerprint {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// The three metadata inputs a fingerprint is derived from.
#[derive(Clone, Debug, PartialEq)]
pub struct FileStamp {
    pub size_bytes: u64,
    /// Creation time in seconds since the Unix epoch, sub-second part kept.
    pub created: f64,
    /// Extension including the leading dot, empty when the name has none.
    pub extension: String,
}

impl FileStamp {
    /// Reads the stamp for the file at `path`.
    pub fn read(path: &Path) -> Result<Self, FingerprintError> {
        let metadata = fs::metadata(path).map_err(|source| match source.kind() {
            ErrorKind::NotFound => FingerprintError::NotFound(path.to_path_buf()),
            _ => FingerprintError::Io {
                path: path.to_path_buf(),
                source,
            },
        })?;

        let created = creation_seconds(&metadata).map_err(|source| FingerprintError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let extension = path
            .file_name()
            .map(|name| name.to_string_lossy())
            .map(|name| split_extension(&name).to_string())
            .unwrap_or_default();

        Ok(Self {
            size_bytes: metadata.len(),
            created,
            extension,
        })
    }

    /// Numeric value the fingerprint text is rendered from.
    ///
    /// Size and timestamp are summed first, then the extension value is
    /// added, all in `f64`.
    pub fn value(&self) -> f64 {
        (self.size_bytes as f64 + self.created) + extension_value(&self.extension)
    }

    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint(STANDARD.encode(render_float(self.value())))
    }
}

/// Computes fingerprints for files on disk.
///
/// The reconciler only depends on this trait, so tests can swap in a
/// deterministic source instead of real filesystem timestamps.
pub trait Fingerprinter {
    fn fingerprint(&self, path: &Path) -> Result<Fingerprint, FingerprintError>;
}

/// Fingerprints files from their filesystem metadata.
#[derive(Clone, Copy, Debug, Default)]
pub struct MetadataFingerprinter;

impl Fingerprinter for MetadataFingerprinter {
    fn fingerprint(&self, path: &Path) -> Result<Fingerprint, FingerprintError> {
        fingerprint(path)
    }
}

/// Computes the fingerprint of the file at `path`.
///
/// Returns [`FingerprintError::NotFound`] when nothing exists at `path`.
pub fn fingerprint(path: &Path) -> Result<Fingerprint, FingerprintError> {
    FileStamp::read(path).map(|stamp| stamp.fingerprint())
}

/// Splits the extension off a file name, keeping the leading dot.
///
/// Dots at the very start of the name never begin an extension, so
/// `.hidden` and `..` have none while `name.` has `"."`.
pub fn split_extension(name: &str) -> &str {
    let Some(dot) = name.rfind('.') else {
        return "";
    };
    if name[..dot].bytes().any(|byte| byte != b'.') {
        &name[dot..]
    } else {
        ""
    }
}

/// Big-endian integer value of the extension's UTF-8 bytes, as `f64`.
pub fn extension_value(extension: &str) -> f64 {
    let bytes = extension.as_bytes();
    if bytes.len() <= 16 {
        let value = bytes
            .iter()
            .fold(0u128, |acc, &byte| (acc << 8) | u128::from(byte));
        value as f64
    } else {
        bytes
            .iter()
            .fold(0f64, |acc, &byte| acc * 256.0 + f64::from(byte))
    }
}

/// Renders `value` as the shortest decimal text that reads back to it.
///
/// Integral values keep a trailing `.0`, and very large or very small
/// magnitudes use exponent notation with a signed, two-digit exponent.
pub fn render_float(value: f64) -> String {
    if value.is_nan() {
        return String::from("nan");
    }
    if value.is_infinite() {
        return String::from(if value > 0.0 { "inf" } else { "-inf" });
    }
    if value == 0.0 {
        return String::from(if value.is_sign_negative() { "-0.0" } else { "0.0" });
    }

    let magnitude = value.abs();
    if (EXPONENT_LOWER..EXPONENT_UPPER).contains(&magnitude) {
        let text = format!("{}", value);
        if text.contains('.') {
            text
        } else {
            format!("{}.0", text)
        }
    } else {
        let text = format!("{:e}", value);
        match text.split_once('e') {
            Some((mantissa, exponent)) => {
                let (sign, digits) = match exponent.strip_prefix('-') {
                    Some(digits) => ('-', digits),
                    None => ('+', exponent),
                };
                format!("{}e{}{:0>2}", mantissa, sign, digits)
            }
            None => text,
        }
    }
}

#[cfg(unix)]
fn creation_seconds(metadata: &Metadata) -> std::io::Result<f64> {
    use std::os::unix::fs::MetadataExt;
    Ok(metadata.ctime() as f64 + metadata.ctime_nsec() as f64 * 1e-9)
}

#[cfg(not(unix))]
fn creation_seconds(metadata: &Metadata) -> std::io::Result<f64> {
    use std::time::UNIX_EPOCH;
    let created = metadata.created()?;
    let elapsed = created
        .duration_since(UNIX_EPOCH)
        .map_err(|error| std::io::Error::new(ErrorKind::InvalidData, error))?;
    Ok(elapsed.as_secs_f64())
}

#[derive(Debug)]
pub enum FingerprintError {
    /// Nothing exists at the path; no fingerprint can be produced.
    NotFound(PathBuf),
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl Display for FingerprintError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(path) => write!(f, "file not found: {}", path.display()),
            Self::Io { path, source } => {
                write!(f, "failed to read metadata for {}: {}", path.display(), source)
            }
        }
    }
}

impl Error for FingerprintError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn stamp(size_bytes: u64, created: f64, extension: &str) -> FileStamp {
        FileStamp {
            size_bytes,
            created,
            extension: extension.to_string(),
        }
    }

    #[test]
    fn splits_extensions_like_existing_tables() {
        assert_eq!(split_extension("photo.png"), ".png");
        assert_eq!(split_extension("archive.tar.jpeg"), ".jpeg");
        assert_eq!(split_extension("README"), "");
        assert_eq!(split_extension(".hidden"), "");
        assert_eq!(split_extension("..png"), "");
        assert_eq!(split_extension("name."), ".");
        assert_eq!(split_extension("..name.gif"), ".gif");
    }

    #[test]
    fn extension_value_is_big_endian_bytes() {
        assert_eq!(extension_value(""), 0.0);
        assert_eq!(extension_value(".png"), 779_120_231.0);
        assert_eq!(extension_value(".jpeg"), 199_354_246_503.0);
    }

    #[test]
    fn renders_floats_with_shortest_round_trip_text() {
        assert_eq!(render_float(2_479_120_331.5), "2479120331.5");
        assert_eq!(render_float(2_479_120_331.0), "2479120331.0");
        assert_eq!(render_float(0.0), "0.0");
        assert_eq!(render_float(1e16), "1e+16");
        assert_eq!(render_float(3.3e18), "3.3e+18");
        assert_eq!(render_float(1.5e-5), "1.5e-05");
        assert_eq!(render_float(0.0001), "0.0001");
    }

    #[test]
    fn fingerprint_matches_recorded_values() {
        let value = stamp(100, 1_700_000_000.5, ".png");
        assert_eq!(value.value(), 2_479_120_331.5);
        assert_eq!(value.fingerprint(), "MjQ3OTEyMDMzMS41");

        let quarter = stamp(12, 0.25, ".gif");
        assert_eq!(render_float(quarter.value()), "778529138.25");
    }

    #[test]
    fn sub_second_timestamps_are_not_aliased() {
        let first = stamp(2048, 1_700_000_000.25, ".jpg");
        let second = stamp(2048, 1_700_000_000.75, ".jpg");
        assert_ne!(first.fingerprint(), second.fingerprint());
    }

    #[test]
    fn extension_change_changes_fingerprint() {
        let png = stamp(2048, 1_700_000_000.0, ".png");
        let gif = stamp(2048, 1_700_000_000.0, ".gif");
        assert_ne!(png.fingerprint(), gif.fingerprint());
    }

    #[test]
    fn missing_file_has_no_fingerprint() {
        let dir = tempdir().unwrap();
        let result = fingerprint(&dir.path().join("absent.png"));
        assert!(matches!(result, Err(FingerprintError::NotFound(_))));
    }

    #[test]
    fn reads_stamp_from_disk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cat.png");
        fs::write(&path, b"12345").unwrap();

        let stamp = FileStamp::read(&path).unwrap();
        assert_eq!(stamp.size_bytes, 5);
        assert_eq!(stamp.extension, ".png");
        assert!(stamp.created > 0.0);
        assert_eq!(fingerprint(&path).unwrap(), stamp.fingerprint());
    }

    #[test]
    fn fingerprint_is_stable_for_unchanged_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("dog.jpg");
        fs::write(&path, b"woof").unwrap();

        let first = MetadataFingerprinter.fingerprint(&path).unwrap();
        let second = MetadataFingerprinter.fingerprint(&path).unwrap();
        assert_eq!(first, second);
    }
}
