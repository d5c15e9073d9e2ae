//! Control of the coordination-service process.

use std::process::Command;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("{program} is not available: {source}")]
    Unavailable {
        program: String,
        source: std::io::Error,
    },

    #[error("{program} {action} {unit} failed: {stderr}")]
    CommandFailed {
        program: String,
        action: &'static str,
        unit: String,
        stderr: String,
    },
}

pub trait ServiceControl: Send + Sync {
    fn unit(&self) -> &str;

    fn reload(&self) -> Result<(), ServiceError>;

    fn restart(&self) -> Result<(), ServiceError>;

    fn is_running(&self) -> bool;
}

/// `systemctl` driven service control.
#[derive(Debug, Clone)]
pub struct SystemdControl {
    program: String,
    unit: String,
}

impl SystemdControl {
    pub fn new(unit: impl Into<String>) -> Self {
        Self::with_program("systemctl", unit)
    }

    /// Use another executable with systemctl's argument layout.
    pub fn with_program(program: impl Into<String>, unit: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            unit: unit.into(),
        }
    }

    fn run(&self, action: &'static str) -> Result<(), ServiceError> {
        let output = Command::new(&self.program)
            .args([action, self.unit.as_str()])
            .output()
            .map_err(|source| ServiceError::Unavailable {
                program: self.program.clone(),
                source,
            })?;

        if output.status.success() {
            tracing::debug!(unit = %self.unit, action, "Service command succeeded");
            return Ok(());
        }
        Err(ServiceError::CommandFailed {
            program: self.program.clone(),
            action,
            unit: self.unit.clone(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

impl ServiceControl for SystemdControl {
    fn unit(&self) -> &str {
        &self.unit
    }

    fn reload(&self) -> Result<(), ServiceError> {
        self.run("reload")
    }

    fn restart(&self) -> Result<(), ServiceError> {
        self.run("restart")
    }

    fn is_running(&self) -> bool {
        self.run("is-active").is_ok()
    }
}
