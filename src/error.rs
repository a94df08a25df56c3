//! Fatal error taxonomy for a bootstrap run.
//!
//! Precondition and health-gate failures get their own variants so the final
//! ERROR line names what went wrong; everything else flows through `anyhow`
//! with context attached at the failing step.
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("required tool `{tool}` not found on PATH")]
    MissingTool { tool: String },

    #[error("invalid port for {name}: {value:?} (expected an integer in 1..=65535)")]
    InvalidPort { name: String, value: String },

    #[error("invalid setting {name}: {reason}")]
    InvalidSetting { name: String, reason: String },

    #[error("failed to pull image {image}: {detail}")]
    ImagePull { image: String, detail: String },

    #[error("{step} failed (exit {exit}): {detail}")]
    CommandFailed {
        step: String,
        exit: String,
        detail: String,
    },

    #[error(
        "broker did not report a running state after {attempts} attempts; diagnostics in {}",
        diagnostics.display()
    )]
    HealthGate {
        attempts: u32,
        diagnostics: PathBuf,
    },
}

impl BootstrapError {
    pub fn invalid_setting(name: &str, reason: impl Into<String>) -> Self {
        Self::InvalidSetting {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}

/// Process exit code for a failed run. Usage errors exit 2 inside clap.
pub const EXIT_FATAL: i32 = 1;
