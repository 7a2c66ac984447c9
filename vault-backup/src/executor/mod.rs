//! Backup run executor - builds one archive and hands it to every
//! requested destination.
//!
//! A run fails when the archive cannot be built, or when every requested
//! destination failed. Skipped and partially failed destinations do not
//! fail the run on their own.

use crate::archive::Archive;
use crate::config::Config;
use crate::dispatch::{BackupRequest, DeliveryOutcome, DestinationDispatcher};
use crate::notify::Notifier;
use crate::snapshot::SnapshotBuilder;
use crate::tools::Tools;
use crate::utils::errors::{BackupError, Result};
use std::time::Instant;
use tracing::{error, info, warn};

/// Result of a completed backup run
#[derive(Debug)]
pub struct RunSummary {
    pub archive: Archive,
    pub outcomes: Vec<DeliveryOutcome>,
    pub duration_secs: u64,
}

impl RunSummary {
    /// True iff every requested destination failed.
    pub fn all_failed(&self) -> bool {
        !self.outcomes.is_empty() && self.outcomes.iter().all(DeliveryOutcome::is_failed)
    }

    pub fn needs_attention(&self) -> bool {
        self.outcomes.iter().any(DeliveryOutcome::needs_attention)
    }

    fn report(&self) -> String {
        let mut body = format!(
            "Archive: {}\nEncrypted: {}\nDuration: {}s\n\nDestinations:\n",
            self.archive,
            if self.archive.encrypted { "yes" } else { "no" },
            self.duration_secs
        );
        for outcome in &self.outcomes {
            body.push_str(&format!("  - {}\n", outcome));
        }
        body
    }
}

/// Main backup executor
pub struct BackupExecutor<'a> {
    config: &'a Config,
    tools: &'a Tools,
    notifier: Notifier<'a>,
}

impl<'a> BackupExecutor<'a> {
    pub fn new(config: &'a Config, tools: &'a Tools) -> Self {
        Self {
            config,
            tools,
            notifier: Notifier::new(&config.notify, tools),
        }
    }

    /// Execute a backup run for the requested methods.
    pub fn run(&self, request: &BackupRequest) -> Result<RunSummary> {
        let start_time = Instant::now();
        let methods: Vec<String> = request.methods().iter().map(ToString::to_string).collect();
        info!("Starting backup run (methods: {})", methods.join(", "));

        let archive = match SnapshotBuilder::new(self.config, self.tools).build() {
            Ok(archive) => archive,
            Err(e) => {
                error!("Backup aborted: {}", e);
                self.notifier
                    .failure("Backup failed", &format!("No archive was created.\n\n{}\n", e));
                self.notifier.ping(false);
                return Err(e);
            }
        };

        let dispatcher = DestinationDispatcher::new(self.config, self.tools, &self.notifier);
        let outcomes: Vec<DeliveryOutcome> = request
            .methods()
            .iter()
            .map(|method| dispatcher.deliver(*method, &archive))
            .collect();

        let summary = RunSummary {
            archive,
            outcomes,
            duration_secs: start_time.elapsed().as_secs(),
        };
        let report = summary.report();

        if summary.all_failed() {
            error!("Backup run failed: no destination succeeded");
            self.notifier.failure("Backup delivery failed", &report);
            self.notifier.ping(false);

            let reasons: Vec<String> = summary.outcomes.iter().map(ToString::to_string).collect();
            return Err(BackupError::Delivery {
                method: methods.join(","),
                reason: reasons.join("; "),
            });
        }

        if summary.needs_attention() {
            warn!("Backup run completed with delivery problems");
            self.notifier.failure("Backup completed with errors", &report);
        } else {
            info!("Backup run completed in {}s", summary.duration_secs);
            self.notifier.success("Backup completed", &report);
        }
        self.notifier.ping(true);

        Ok(summary)
    }
}
