//! Secret input from the controlling terminal.

use super::SecretInput;
use crate::utils::errors::{ToolError, ToolResult};
use std::io::{BufRead, IsTerminal, Write};

/// Reads secrets from stdin with terminal echo switched off.
pub struct TerminalInput;

impl SecretInput for TerminalInput {
    fn is_interactive(&self) -> bool {
        std::io::stdin().is_terminal()
    }

    fn read_secret(&self, prompt: &str) -> ToolResult<String> {
        if !self.is_interactive() {
            return Err(ToolError::Unavailable("stdin is not a terminal".into()));
        }

        let mut stderr = std::io::stderr();
        write!(stderr, "{}", prompt)?;
        stderr.flush()?;

        let line = read_line_without_echo()?;
        writeln!(stderr)?;
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }
}

#[cfg(unix)]
fn read_line_without_echo() -> ToolResult<String> {
    use nix::sys::termios::{tcgetattr, tcsetattr, LocalFlags, SetArg};

    let stdin = std::io::stdin();
    let original = tcgetattr(&stdin).map_err(std::io::Error::from)?;
    let mut silent = original.clone();
    silent.local_flags.remove(LocalFlags::ECHO);
    tcsetattr(&stdin, SetArg::TCSANOW, &silent).map_err(std::io::Error::from)?;

    let mut line = String::new();
    let read = stdin.lock().read_line(&mut line);

    // Always restore the terminal, even when the read failed
    tcsetattr(&stdin, SetArg::TCSANOW, &original).map_err(std::io::Error::from)?;
    read?;
    Ok(line)
}

#[cfg(not(unix))]
fn read_line_without_echo() -> ToolResult<String> {
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    Ok(line)
}
