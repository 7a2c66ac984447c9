//! Remote sync through the `rclone` command line tool.

use super::{run_command, RemoteSync};
use crate::config::RemoteConfig;
use crate::utils::errors::ToolResult;
use std::path::{Path, PathBuf};
use std::process::Command;

pub struct RcloneSync {
    binary: String,
    config_path: PathBuf,
    path_suffix: String,
}

impl RcloneSync {
    pub fn from_config(config: &RemoteConfig) -> Self {
        Self {
            binary: config.binary.clone(),
            config_path: config.config_path.clone(),
            path_suffix: config.path_suffix.clone(),
        }
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.binary);
        command.arg("--config").arg(&self.config_path);
        command
    }

    /// `remote:suffix` target for a remote name.
    pub fn target(&self, remote: &str) -> String {
        format!("{}:{}", remote, self.path_suffix.trim_start_matches('/'))
    }
}

impl RemoteSync for RcloneSync {
    fn is_configured(&self) -> bool {
        self.config_path.is_file()
    }

    fn list_remotes(&self) -> ToolResult<Vec<String>> {
        let output = run_command(self.command().arg("listremotes"))?;
        Ok(parse_remotes(&String::from_utf8_lossy(&output.stdout)))
    }

    fn sync(&self, local_dir: &Path, remote: &str) -> ToolResult<()> {
        run_command(
            self.command()
                .arg("sync")
                .arg(local_dir)
                .arg(self.target(remote)),
        )?;
        Ok(())
    }
}

/// `listremotes` prints one `name:` per line.
fn parse_remotes(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(|line| line.trim().trim_end_matches(':'))
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}
