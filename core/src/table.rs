//! Reading and writing the tag table.
//!
//! The first row of the file names the columns; every other row is a record
//! whose first field is an image file name. Rows may be shorter than the
//! header, so the reader is flexible about field counts.

use csv::{ReaderBuilder, Terminator, WriterBuilder};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Ordered column names taken from the table's first row.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColumnSet {
    names: Vec<String>,
}

impl ColumnSet {
    pub fn new(names: Vec<String>) -> Self {
        Self { names }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Index of the first column called `name`.
    pub fn index_of(&self, name: &str) -> Result<usize, TableError> {
        self.names
            .iter()
            .position(|candidate| candidate == name)
            .ok_or_else(|| TableError::MissingColumn(name.to_string()))
    }
}

/// One data row. Field 0 is the file name relative to the base directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Record {
    fields: Vec<String>,
}

impl Record {
    pub fn new(fields: Vec<String>) -> Self {
        Self { fields }
    }

    /// A record for `filename` with every other column left empty.
    pub fn blank(filename: impl Into<String>, width: usize) -> Self {
        let mut fields = vec![String::new(); width.max(1)];
        fields[0] = filename.into();
        Self { fields }
    }

    pub fn filename(&self) -> &str {
        self.fields.first().map(String::as_str).unwrap_or("")
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.fields.get(index).map(String::as_str)
    }

    /// Overwrites field `index`, growing the record with empty fields first
    /// when it is too short.
    pub fn set(&mut self, index: usize, value: impl Into<String>) {
        if self.fields.len() <= index {
            self.fields.resize(index + 1, String::new());
        }
        self.fields[index] = value.into();
    }

    /// Right-pads with empty fields up to `width`. Returns whether anything
    /// was appended.
    pub fn pad_to(&mut self, width: usize) -> bool {
        if self.fields.len() >= width {
            return false;
        }
        self.fields.resize(width, String::new());
        true
    }
}

impl From<Vec<String>> for Record {
    fn from(fields: Vec<String>) -> Self {
        Self::new(fields)
    }
}

impl<'a> From<Vec<&'a str>> for Record {
    fn from(fields: Vec<&'a str>) -> Self {
        Self::new(fields.into_iter().map(String::from).collect())
    }
}

/// A whole table held in memory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Table {
    pub columns: ColumnSet,
    pub records: Vec<Record>,
}

impl Table {
    pub fn new(columns: ColumnSet, records: Vec<Record>) -> Self {
        Self { columns, records }
    }

    /// Parses a table from CSV text.
    pub fn parse(source: &str, origin: &Path) -> Result<Self, TableError> {
        let mut reader = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(source.as_bytes());

        let mut rows = reader.records();
        let header = match rows.next() {
            Some(row) => row.map_err(|source| TableError::Csv {
                path: origin.to_path_buf(),
                source,
            })?,
            None => {
                return Err(TableError::Malformed {
                    path: origin.to_path_buf(),
                    reason: String::from("missing header row"),
                })
            }
        };
        let columns = ColumnSet::new(header.iter().map(String::from).collect());

        let mut records = Vec::new();
        for row in rows {
            let row = row.map_err(|source| TableError::Csv {
                path: origin.to_path_buf(),
                source,
            })?;
            records.push(Record::new(row.iter().map(String::from).collect()));
        }

        Ok(Self { columns, records })
    }

    /// Serialises the table, header first, one record per line.
    ///
    /// Lines end in `\r\n`, the terminator tag tables have always been
    /// written with, so a save only touches the lines that changed.
    pub fn to_csv(&self) -> Result<Vec<u8>, TableError> {
        let mut writer = WriterBuilder::new()
            .flexible(true)
            .terminator(Terminator::CRLF)
            .from_writer(Vec::new());

        writer
            .write_record(self.columns.names())
            .map_err(TableError::Encode)?;
        for record in &self.records {
            writer
                .write_record(record.fields())
                .map_err(TableError::Encode)?;
        }

        writer
            .into_inner()
            .map_err(|error| TableError::Encode(error.into_error().into()))
    }
}

/// Loads the table stored at `path`.
pub fn read_table(path: &Path) -> Result<Table, TableError> {
    let bytes = fs::read(path).map_err(|source| TableError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let text = String::from_utf8(bytes).map_err(|error| TableError::Malformed {
        path: path.to_path_buf(),
        reason: format!("not valid UTF-8: {}", error),
    })?;
    Table::parse(&text, path)
}

/// Replaces the file at `path` with `table`.
///
/// The contents go to a temporary file next to the target which is then
/// renamed over it, so readers never observe a half-written table. A
/// symlinked `path` is followed so the link survives, and an existing
/// table keeps its permissions.
pub fn write_table(path: &Path, table: &Table) -> Result<(), TableError> {
    let contents = table.to_csv()?;
    let io_error = |source| TableError::Io {
        path: path.to_path_buf(),
        source,
    };

    let target = match fs::canonicalize(path) {
        Ok(resolved) => resolved,
        Err(error) if error.kind() == ErrorKind::NotFound => path.to_path_buf(),
        Err(error) => return Err(io_error(error)),
    };
    let directory = match target.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };

    let mut temporary = NamedTempFile::new_in(&directory).map_err(io_error)?;
    temporary.write_all(&contents).map_err(io_error)?;
    if let Ok(existing) = fs::metadata(&target) {
        temporary
            .as_file()
            .set_permissions(existing.permissions())
            .map_err(io_error)?;
    }
    temporary.as_file().sync_all().map_err(io_error)?;
    temporary
        .persist(&target)
        .map_err(|error| io_error(error.error))?;
    Ok(())
}

#[derive(Debug)]
pub enum TableError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Csv {
        path: PathBuf,
        source: csv::Error,
    },
    Encode(csv::Error),
    /// The file has no header row or is not text.
    Malformed {
        path: PathBuf,
        reason: String,
    },
    /// No column with this name exists in the header.
    MissingColumn(String),
}

impl Display for TableError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => write!(f, "io error for {}: {}", path.display(), source),
            Self::Csv { path, source } => {
                write!(f, "invalid table {}: {}", path.display(), source)
            }
            Self::Encode(error) => write!(f, "failed to encode table: {}", error),
            Self::Malformed { path, reason } => {
                write!(f, "malformed table {}: {}", path.display(), reason)
            }
            Self::MissingColumn(name) => write!(f, "column '{}' not found in table header", name),
        }
    }
}

impl Error for TableError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Csv { source, .. } => Some(source),
            Self::Encode(error) => Some(error),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn parses_header_and_records() {
        let table = Table::parse(
            "Filename,Tags,Identifier\na.png,\"cat, dog\",abc\nb.jpg\n",
            Path::new("tags.csv"),
        )
        .unwrap();

        assert_eq!(table.columns.names(), ["Filename", "Tags", "Identifier"]);
        assert_eq!(table.records.len(), 2);
        assert_eq!(table.records[0].get(1), Some("cat, dog"));
        assert_eq!(table.records[1].fields(), ["b.jpg"]);
    }

    #[test]
    fn empty_file_is_malformed() {
        let result = Table::parse("", Path::new("tags.csv"));
        assert!(matches!(result, Err(TableError::Malformed { .. })));
    }

    #[test]
    fn missing_column_names_the_column() {
        let columns = ColumnSet::new(vec![String::from("Filename")]);
        match columns.index_of("Identifier") {
            Err(TableError::MissingColumn(name)) => assert_eq!(name, "Identifier"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn padding_keeps_existing_fields() {
        let mut record = Record::from(vec!["a.png", "cat"]);
        assert!(record.pad_to(4));
        assert_eq!(record.fields(), ["a.png", "cat", "", ""]);
        assert!(!record.pad_to(3));
    }

    #[test]
    fn blank_record_has_full_width() {
        let record = Record::blank("new.png", 3);
        assert_eq!(record.fields(), ["new.png", "", ""]);
    }

    #[test]
    fn writes_and_reads_table() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tags.csv");
        let table = Table::new(
            ColumnSet::new(vec![String::from("Filename"), String::from("Notes")]),
            vec![
                Record::from(vec!["a.png", "line one\nline two"]),
                Record::from(vec!["b.gif", "quoted, \"text\""]),
            ],
        );

        write_table(&path, &table).unwrap();
        let loaded = read_table(&path).unwrap();
        assert_eq!(loaded, table);

        let entries: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn writes_crlf_line_endings() {
        let table = Table::new(
            ColumnSet::new(vec![String::from("Filename"), String::from("Tags")]),
            vec![Record::from(vec!["a.png", "cat"])],
        );
        let bytes = table.to_csv().unwrap();
        assert_eq!(bytes, b"Filename,Tags\r\na.png,cat\r\n".to_vec());
    }

    #[cfg(unix)]
    #[test]
    fn save_keeps_existing_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let path = dir.path().join("tags.csv");
        fs::write(&path, "Filename\nstale.png\n").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).unwrap();

        let table = read_table(&path).unwrap();
        write_table(&path, &Table::new(table.columns, Vec::new())).unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o644);
        assert_eq!(fs::read_to_string(&path).unwrap(), "Filename\r\n");
    }

    #[cfg(unix)]
    #[test]
    fn save_through_symlink_keeps_the_link() {
        let dir = tempdir().unwrap();
        let real = dir.path().join("real.csv");
        let link = dir.path().join("tags.csv");
        fs::write(&real, "Filename\n").unwrap();
        std::os::unix::fs::symlink(&real, &link).unwrap();

        let table = Table::new(
            ColumnSet::new(vec![String::from("Filename")]),
            vec![Record::from(vec!["a.png"])],
        );
        write_table(&link, &table).unwrap();

        assert!(fs::symlink_metadata(&link).unwrap().file_type().is_symlink());
        assert_eq!(read_table(&real).unwrap(), table);
    }

    #[test]
    fn invalid_utf8_is_malformed() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tags.csv");
        fs::write(&path, [0x66, 0x6f, 0xff, 0x0a]).unwrap();
        assert!(matches!(read_table(&path), Err(TableError::Malformed { .. })));
    }

    #[test]
    fn unreadable_path_is_io_error() {
        let dir = tempdir().unwrap();
        let result = read_table(&dir.path().join("absent.csv"));
        assert!(matches!(result, Err(TableError::Io { .. })));
    }
}
