//! Lifecycle control of the vault service.

use super::{run_command, ServiceController};
use crate::utils::errors::{ToolError, ToolResult};
use std::process::Command;

/// Invokes `<program> stop|start <service>`, e.g. `supervisorctl`.
pub struct CommandServiceController {
    program: String,
}

impl CommandServiceController {
    pub fn new(program: &str) -> Self {
        Self {
            program: program.to_string(),
        }
    }

    fn invoke(&self, action: &str, service: &str) -> ToolResult<()> {
        let output = run_command(Command::new(&self.program).args([action, service]))?;
        tracing::debug!(
            "{} {} {}: {}",
            self.program,
            action,
            service,
            String::from_utf8_lossy(&output.stdout).trim()
        );
        Ok(())
    }
}

impl ServiceController for CommandServiceController {
    fn is_available(&self) -> bool {
        which::which(&self.program).is_ok()
    }

    fn stop(&self, service: &str) -> ToolResult<()> {
        self.invoke("stop", service)
    }

    fn start(&self, service: &str) -> ToolResult<()> {
        self.invoke("start", service)
    }
}

/// Used when no controller is configured.
pub struct NoServiceController;

impl ServiceController for NoServiceController {
    fn is_available(&self) -> bool {
        false
    }

    fn stop(&self, _service: &str) -> ToolResult<()> {
        Err(ToolError::Unavailable("no service controller configured".into()))
    }

    fn start(&self, _service: &str) -> ToolResult<()> {
        Err(ToolError::Unavailable("no service controller configured".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_program_is_unavailable() {
        let controller = CommandServiceController::new("definitely-not-a-controller-xyz");
        assert!(!controller.is_available());
        assert!(controller.stop("vault").is_err());
    }

    #[test]
    #[cfg(unix)]
    fn test_invokes_program_with_action() {
        let controller = CommandServiceController::new("true");
        assert!(controller.is_available());
        assert!(controller.stop("vault").is_ok());

        let failing = CommandServiceController::new("false");
        assert!(matches!(failing.start("vault"), Err(ToolError::Command { .. })));
    }
}
