mod cli;

use cli::{CliError, Command, RunArgs};
use env_logger::Env;
use std::error::Error;
use std::path::PathBuf;
use tagsync_core::{
    fingerprint, print_summary, write_report, ProgressMode, ReconcileConfig, ReconcileOptions,
    Reconciler, RunMode,
};

fn main() {
    let command = Command::from_env().unwrap_or_else(|err| match err {
        CliError::Help | CliError::Version => {
            println!("{}", err);
            std::process::exit(0);
        }
        _ => {
            eprintln!("{}", err);
            std::process::exit(1);
        }
    });

    let level = if command.quiet() { "warn" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();

    let result = match command {
        Command::Run(mode, args) => run_reconcile(mode, args),
        Command::Fingerprint(files) => run_fingerprint(&files),
    };

    if let Err(error) = result {
        eprintln!("Error: {}", error);
        std::process::exit(1);
    }
}

fn run_reconcile(mode: RunMode, args: RunArgs) -> Result<(), Box<dyn Error>> {
    let base = match args.base.clone() {
        Some(base) => base,
        None => std::env::current_dir()?,
    };
    let mut config = ReconcileConfig::load_or_default(&base)?;
    args.apply_to(&mut config);
    let scan = config.scan_config();

    let progress = if args.quiet {
        ProgressMode::Hidden
    } else {
        ProgressMode::Visible
    };
    let options = ReconcileOptions::new(base)
        .with_scan_config(scan)
        .with_progress(progress)
        .with_dry_run(args.dry_run);
    let reconciler = Reconciler::new(options);

    log::debug!("running {} on {}", mode, reconciler.table_path(&config.table).display());
    let reconciliation = match mode {
        RunMode::Sync => reconciler.reconcile(&config.table)?,
        RunMode::Validate => reconciler.validate(
            &config.table,
            &config.identifier_column,
            config.keep_mismatched,
        )?,
        RunMode::Recompute => reconciler.recompute(&config.table, &config.identifier_column)?,
    };

    print_summary(&reconciliation.summary);
    if let Some(report) = args.report.as_deref() {
        write_report(&reconciliation.summary, report)?;
        println!("Report written to {}", report.display());
    }
    Ok(())
}

fn run_fingerprint(files: &[PathBuf]) -> Result<(), Box<dyn Error>> {
    let mut failures = 0;
    for file in files {
        match fingerprint(file) {
            Ok(value) => println!("{}\t{}", value, file.display()),
            Err(error) => {
                eprintln!("{}", error);
                failures += 1;
            }
        }
    }

    if failures > 0 {
        let message = format!(
            "{} of {} files could not be fingerprinted",
            failures,
            files.len()
        );
        return Err(message.into());
    }
    Ok(())
}
