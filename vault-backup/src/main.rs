//! Vault Backup - Main entry point
//!
//! Invoked by the container's scheduler for backups and by an operator for
//! restores.

use chrono::Local;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use vault_backup::archive::list_archives;
use vault_backup::dispatch::BackupRequest;
use vault_backup::executor::BackupExecutor;
use vault_backup::notify::Notifier;
use vault_backup::restore::RestoreOrchestrator;
use vault_backup::snapshot::SnapshotBuilder;
use vault_backup::tools::Tools;
use vault_backup::{utils, BackupError, Config, Result};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", env = "VAULT_BACKUP_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build one archive and deliver it to each method (local, email, remote)
    Run {
        /// Methods, space or comma separated; defaults to backup.methods
        #[arg(value_name = "METHOD")]
        methods: Vec<String>,
    },

    /// Restore the vault from an archive
    Restore {
        /// Archive path, or a file name inside the backup directory
        #[arg(value_name = "ARCHIVE")]
        archive: PathBuf,
    },

    /// List archives in the backup directory, newest first
    List,

    /// Delete archives older than the retention window
    Prune,

    /// Print the effective configuration with secrets redacted
    Config,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let mut config = match Config::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::from(e.exit_code());
        }
    };
    if let Some(level) = args.log_level {
        config.log.level = level;
    }

    if let Err(e) = utils::logger::init(&config.log, &config.log_file()) {
        eprintln!("warning: logging not initialized: {}", e);
    }

    match execute(args.command, &config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            eprintln!("error: {}", e);
            eprintln!("{}", guidance(&e, &config.log_file()));
            ExitCode::from(e.exit_code())
        }
    }
}

fn execute(command: Command, config: &Config) -> Result<()> {
    match command {
        Command::Run { methods } => {
            let tools = Tools::from_config(config);
            let request = if methods.is_empty() {
                BackupRequest::parse_lenient(&config.backup.methods)
            } else {
                BackupRequest::parse(&methods)
            };
            let request = request.inspect_err(|e| {
                Notifier::new(&config.notify, &tools)
                    .failure("Backup not started", &format!("{}\n", e));
            })?;

            tracing::info!("vault-backup v{}", env!("CARGO_PKG_VERSION"));
            BackupExecutor::new(config, &tools).run(&request)?;
            Ok(())
        }
        Command::Restore { archive } => {
            let tools = Tools::from_config(config);
            let report = RestoreOrchestrator::new(config, &tools).restore(&archive)?;
            for warning in &report.warnings {
                eprintln!("warning: {}", warning);
            }
            if let Some(safety) = &report.safety_archive {
                println!("Safety backup: {}", safety);
            }
            println!("Restored from {}", report.archive);
            Ok(())
        }
        Command::List => {
            let now = Local::now().naive_local();
            let archives = list_archives(&config.backup_dir(), &config.backup.prefix)?;
            if archives.is_empty() {
                println!("No backups in {}", config.backup_dir().display());
            }
            for (archive, name) in archives {
                println!(
                    "{:<48} {:>12} {:>4}d {}",
                    archive.file_name(),
                    archive.size().unwrap_or(0),
                    (now - name.created).num_days(),
                    if archive.encrypted { "encrypted" } else { "" }
                );
            }
            Ok(())
        }
        Command::Prune => {
            let tools = Tools::from_config(config);
            let removed = SnapshotBuilder::new(config, &tools).prune();
            println!("Removed {} archive(s)", removed.len());
            Ok(())
        }
        Command::Config => {
            print!("{}", config.redacted().to_toml()?);
            Ok(())
        }
    }
}

fn guidance(err: &BackupError, log_file: &Path) -> String {
    match err {
        BackupError::Validation(_) => {
            "usage: vault-backup run <local|email|remote>[,<method>...]".to_string()
        }
        BackupError::Config(_) => {
            "check the configuration file and VAULT_BACKUP_* environment variables".to_string()
        }
        BackupError::RestoreFatal(_) => format!(
            "restore aborted; the database was not replaced. Details in {}",
            log_file.display()
        ),
        _ => format!("details in {}", log_file.display()),
    }
}
