//! libmigrate - versioned library migration CLI
//!
//! Migrates the managed libraries in a target directory to the requested
//! (or latest) versions, keeping a restorable backup of every replaced file.

use anyhow::Context;
use clap::Parser;
use libmigrate::backup::BackupManager;
use libmigrate::cli::CliArgs;
use libmigrate::config::RunConfig;
use libmigrate::context::CancelFlag;
use libmigrate::error::{exit_code, IoError};
use libmigrate::logging::{init_logging, level_for};
use libmigrate::orchestrator::Orchestrator;
use libmigrate::output::{create_formatter, OutputConfig};
use std::io::{self, IsTerminal, Write};
use std::process::ExitCode;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> ExitCode {
    let args = CliArgs::parse();

    if args.print_version {
        println!("libmigrate {}", env!("CARGO_PKG_VERSION"));
        return ExitCode::SUCCESS;
    }

    match run(args).await {
        Ok(exit_code) => exit_code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(exit_code::CONFIG)
        }
    }
}

/// Main application logic
async fn run(args: CliArgs) -> anyhow::Result<ExitCode> {
    let config = match RunConfig::from_cli(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            return Ok(ExitCode::from(exit_code::CONFIG));
        }
    };

    let level = level_for(args.verbose, args.quiet);
    let log_file = (!args.list_backups).then_some(config.log_file.as_path());
    if let Err(e) = init_logging(level, log_file) {
        init_logging(level, None).context("failed to initialise logging")?;
        warn!(path = %config.log_file.display(), error = %e, "cannot open run log, logging to stderr only");
    }

    let mut output_config =
        OutputConfig::from_cli(args.json, args.verbose, args.quiet, args.dry_run);
    output_config.color = io::stdout().is_terminal();
    let show_progress = output_config.shows_progress() && io::stderr().is_terminal();
    let formatter = create_formatter(output_config);
    let mut stdout = io::stdout().lock();

    if args.list_backups {
        let backups = match BackupManager::new().list_backups(&config.backup_root) {
            Ok(backups) => backups,
            Err(e) => {
                eprintln!("Error: {}", e);
                return Ok(ExitCode::from(io_exit_code(&e)));
            }
        };
        formatter.format_backups(&backups, &mut stdout)?;
        stdout.flush()?;
        return Ok(ExitCode::SUCCESS);
    }

    if let Some(run_id) = &args.restore {
        info!(%run_id, target = %config.target_dir.display(), "restoring backup");
        let restored =
            match BackupManager::new().restore(&config.backup_root, run_id, &config.target_dir) {
                Ok(restored) => restored,
                Err(e) => {
                    eprintln!("Error: {}", e);
                    return Ok(ExitCode::from(io_exit_code(&e)));
                }
            };
        formatter.format_restore(run_id, &restored, &mut stdout)?;
        stdout.flush()?;
        return Ok(ExitCode::SUCCESS);
    }

    let cancel = CancelFlag::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping after the current step");
            on_interrupt.cancel();
        }
    });

    let orchestrator = Orchestrator::new(config)?
        .with_cancel_flag(cancel)
        .with_progress(show_progress);
    let report = orchestrator.run().await?;

    formatter.format(&report, &mut stdout)?;
    stdout.flush()?;

    Ok(ExitCode::from(report.exit_code()))
}

/// A missing backup is a usage problem; anything else is the filesystem
fn io_exit_code(error: &IoError) -> u8 {
    match error {
        IoError::BackupNotFound { .. }
        | IoError::InvalidManifest { .. }
        | IoError::InvalidRunId { .. } => exit_code::CONFIG,
        _ => exit_code::FILESYSTEM,
    }
}
