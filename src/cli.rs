use std::env;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use tagsync_core::{ReconcileConfig, RunMode};

pub const USAGE: &str = "\
usage: tagsync <command> [TABLE] [options]

commands:
  sync          drop records for missing images, pad short rows, add untracked images
  validate      sync, then check stored fingerprints against the images
  recompute     sync, then rewrite every fingerprint
  fingerprint   print the fingerprint of each FILE argument

options:
  --base=DIR          directory holding the images (default: current directory)
  --column=NAME       identifier column (default: Identifier)
  --keep-mismatched   keep records whose fingerprint no longer matches (validate)
  --no-keep-mismatched
                      drop them even when the config keeps them (validate)
  --ignore-case       match image extensions regardless of case
  --case-sensitive    match extensions exactly even when the config ignores case
  --dry-run           report changes without writing the table
  --report=FILE       write a JSON summary to FILE
  --quiet             only log warnings and errors
  -h, --help          print this message
  --version           print the version";

#[derive(Debug, PartialEq, Eq)]
pub enum Command {
    Run(RunMode, RunArgs),
    Fingerprint(Vec<PathBuf>),
}

/// Options for `sync`, `validate` and `recompute`. Unset values fall back
/// to the configuration file.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct RunArgs {
    pub table: Option<PathBuf>,
    pub base: Option<PathBuf>,
    pub column: Option<String>,
    pub keep_mismatched: Option<bool>,
    pub ignore_case: Option<bool>,
    pub dry_run: bool,
    pub report: Option<PathBuf>,
    pub quiet: bool,
}

#[derive(Debug, PartialEq, Eq)]
pub enum CliError {
    Help,
    Version,
    MissingCommand,
    UnknownCommand(String),
    MissingFiles,
    InvalidFlag(String),
}

impl Command {
    pub fn from_env() -> Result<Self, CliError> {
        Self::from_iter(env::args().skip(1))
    }

    pub fn from_iter<I>(args: I) -> Result<Self, CliError>
    where
        I: IntoIterator<Item = String>,
    {
        let args: Vec<String> = args.into_iter().collect();
        if args.iter().any(|arg| arg == "--help" || arg == "-h") {
            return Err(CliError::Help);
        }
        if args.iter().any(|arg| arg == "--version") {
            return Err(CliError::Version);
        }

        let mut args = args.into_iter();
        match args.next().as_deref() {
            Some("sync") => RunArgs::parse(args, RunMode::Sync)
                .map(|parsed| Command::Run(RunMode::Sync, parsed)),
            Some("validate") => RunArgs::parse(args, RunMode::Validate)
                .map(|parsed| Command::Run(RunMode::Validate, parsed)),
            Some("recompute") => RunArgs::parse(args, RunMode::Recompute)
                .map(|parsed| Command::Run(RunMode::Recompute, parsed)),
            Some("fingerprint") => parse_files(args).map(Command::Fingerprint),
            Some(other) => Err(CliError::UnknownCommand(other.to_string())),
            None => Err(CliError::MissingCommand),
        }
    }

    /// Whether logging should be limited to warnings.
    pub fn quiet(&self) -> bool {
        match self {
            Self::Run(_, args) => args.quiet,
            Self::Fingerprint(_) => false,
        }
    }
}

impl RunArgs {
    fn parse<I>(args: I, mode: RunMode) -> Result<Self, CliError>
    where
        I: Iterator<Item = String>,
    {
        let mut parsed = RunArgs::default();

        for arg in args {
            if arg.starts_with("--") {
                match arg.as_str() {
                    "--dry-run" => parsed.dry_run = true,
                    "--ignore-case" => parsed.ignore_case = Some(true),
                    "--case-sensitive" => parsed.ignore_case = Some(false),
                    "--quiet" => parsed.quiet = true,
                    "--keep-mismatched" if mode == RunMode::Validate => {
                        parsed.keep_mismatched = Some(true)
                    }
                    "--no-keep-mismatched" if mode == RunMode::Validate => {
                        parsed.keep_mismatched = Some(false)
                    }
                    _ => {
                        if let Some(value) = arg.strip_prefix("--base=") {
                            parsed.base = Some(PathBuf::from(value));
                        } else if let Some(value) = arg.strip_prefix("--report=") {
                            parsed.report = Some(PathBuf::from(value));
                        } else if let Some(value) = arg
                            .strip_prefix("--column=")
                            .filter(|_| mode != RunMode::Sync)
                        {
                            parsed.column = Some(value.to_string());
                        } else {
                            return Err(CliError::InvalidFlag(arg));
                        }
                    }
                }
                continue;
            }

            if parsed.table.is_none() {
                parsed.table = Some(PathBuf::from(&arg));
                continue;
            }

            return Err(CliError::InvalidFlag(arg));
        }

        Ok(parsed)
    }

    /// Layers the values given on the command line over `config`.
    pub fn apply_to(&self, config: &mut ReconcileConfig) {
        if let Some(table) = &self.table {
            config.table = table.clone();
        }
        if let Some(column) = &self.column {
            config.identifier_column = column.clone();
        }
        if let Some(keep) = self.keep_mismatched {
            config.keep_mismatched = keep;
        }
        if let Some(ignore) = self.ignore_case {
            config.ignore_case = ignore;
        }
    }
}

fn parse_files<I>(args: I) -> Result<Vec<PathBuf>, CliError>
where
    I: Iterator<Item = String>,
{
    let mut files = Vec::new();
    for arg in args {
        if arg.starts_with("--") {
            return Err(CliError::InvalidFlag(arg));
        }
        files.push(PathBuf::from(arg));
    }
    if files.is_empty() {
        return Err(CliError::MissingFiles);
    }
    Ok(files)
}

impl Display for CliError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Help => write!(f, "{}", USAGE),
            Self::Version => write!(f, "tagsync {}", env!("CARGO_PKG_VERSION")),
            Self::MissingCommand => write!(f, "a command is required\n\n{}", USAGE),
            Self::UnknownCommand(name) => write!(f, "unknown command: {}\n\n{}", name, USAGE),
            Self::MissingFiles => write!(f, "fingerprint needs at least one file"),
            Self::InvalidFlag(flag) => write!(f, "unrecognized argument: {}", flag),
        }
    }
}

impl Error for CliError {}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Command, CliError> {
        Command::from_iter(args.iter().map(|arg| arg.to_string()))
    }

    #[test]
    fn parses_validate_with_flags() {
        let command = parse(&[
            "validate",
            "tags.csv",
            "--column=Hash",
            "--keep-mismatched",
            "--base=./images",
            "--dry-run",
        ])
        .unwrap();
        match command {
            Command::Run(RunMode::Validate, args) => {
                assert_eq!(args.table, Some(PathBuf::from("tags.csv")));
                assert_eq!(args.column.as_deref(), Some("Hash"));
                assert_eq!(args.keep_mismatched, Some(true));
                assert_eq!(args.base, Some(PathBuf::from("./images")));
                assert!(args.dry_run);
                assert_eq!(args.ignore_case, None);
            }
            other => panic!("expected validate command, got {:?}", other),
        }
    }

    #[test]
    fn parses_recompute_defaults() {
        let command = parse(&["recompute"]).unwrap();
        assert_eq!(command, Command::Run(RunMode::Recompute, RunArgs::default()));
    }

    #[test]
    fn keep_mismatched_is_validate_only() {
        let result = parse(&["recompute", "--keep-mismatched"]);
        assert_eq!(
            result,
            Err(CliError::InvalidFlag(String::from("--keep-mismatched")))
        );
    }

    #[test]
    fn flags_turn_off_config_settings() {
        let mut config = ReconcileConfig {
            keep_mismatched: true,
            ignore_case: true,
            ..ReconcileConfig::default()
        };
        let command = parse(&["validate", "--no-keep-mismatched", "--case-sensitive"]).unwrap();
        let Command::Run(_, args) = command else {
            panic!("expected validate command");
        };

        args.apply_to(&mut config);
        assert!(!config.keep_mismatched);
        assert!(!config.ignore_case);
    }

    #[test]
    fn unset_flags_keep_config_values() {
        let mut config = ReconcileConfig {
            keep_mismatched: true,
            identifier_column: String::from("Hash"),
            ..ReconcileConfig::default()
        };
        RunArgs::default().apply_to(&mut config);
        assert!(config.keep_mismatched);
        assert_eq!(config.identifier_column, "Hash");

        let args = RunArgs {
            table: Some(PathBuf::from("other.csv")),
            ignore_case: Some(true),
            ..RunArgs::default()
        };
        args.apply_to(&mut config);
        assert_eq!(config.table, PathBuf::from("other.csv"));
        assert!(config.ignore_case);
    }

    #[test]
    fn sync_has_no_identifier_column() {
        let result = parse(&["sync", "--column=Identifier"]);
        assert!(matches!(result, Err(CliError::InvalidFlag(_))));
    }

    #[test]
    fn rejects_second_table() {
        let result = parse(&["sync", "a.csv", "b.csv"]);
        assert_eq!(result, Err(CliError::InvalidFlag(String::from("b.csv"))));
    }

    #[test]
    fn parses_fingerprint_files() {
        let command = parse(&["fingerprint", "a.png", "b.jpg"]).unwrap();
        assert_eq!(
            command,
            Command::Fingerprint(vec![PathBuf::from("a.png"), PathBuf::from("b.jpg")])
        );
        assert_eq!(parse(&["fingerprint"]), Err(CliError::MissingFiles));
    }

    #[test]
    fn help_and_version_short_circuit() {
        assert_eq!(parse(&["validate", "--help"]), Err(CliError::Help));
        assert_eq!(parse(&["--version"]), Err(CliError::Version));
        assert_eq!(parse(&[]), Err(CliError::MissingCommand));
        assert_eq!(
            parse(&["prune"]),
            Err(CliError::UnknownCommand(String::from("prune")))
        );
    }
}
