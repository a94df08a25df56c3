//! Typed paths into the project layout.
//!
//! Centralizing path construction keeps file access consistent across the
//! bootstrap steps and prevents drift when the layout evolves.
use std::path::{Path, PathBuf};

/// Convenience wrapper for locating project artifacts.
#[derive(Debug, Clone)]
pub struct ProjectPaths {
    root: PathBuf,
}

impl ProjectPaths {
    /// Create a new path helper rooted at the project root.
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Return the project root used for path derivation.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Return the `secrets/` directory path.
    pub fn secrets_dir(&self) -> PathBuf {
        self.root.join("secrets")
    }

    /// Return the path of a named secret file.
    pub fn secret_path(&self, name: &str) -> PathBuf {
        self.secrets_dir().join(name)
    }

    /// Return the `compose.yaml` manifest path.
    pub fn compose_path(&self) -> PathBuf {
        self.root.join("compose.yaml")
    }

    /// Return the `.env` interpolation file path.
    pub fn env_path(&self) -> PathBuf {
        self.root.join(".env")
    }

    /// Return the `config/` directory holding bind-mounted inputs.
    pub fn config_dir(&self) -> PathBuf {
        self.root.join("config")
    }

    pub fn broker_config_dir(&self) -> PathBuf {
        self.config_dir().join("broker")
    }

    /// Return the broker MQSC script applied at queue manager start.
    pub fn broker_script_path(&self) -> PathBuf {
        self.broker_config_dir().join("20-config.mqsc")
    }

    pub fn gateway_config_dir(&self) -> PathBuf {
        self.config_dir().join("gateway")
    }

    /// Return the gateway startup script seeded into the config volume.
    pub fn gateway_script_path(&self) -> PathBuf {
        self.gateway_config_dir().join("auto-startup.cfg")
    }

    /// Return the `logs/` directory path.
    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    /// Return the persisted run log for one invocation.
    pub fn run_log_path(&self, run_stamp: &str) -> PathBuf {
        self.logs_dir().join(format!("bootstrap-{run_stamp}.log"))
    }

    /// Return the `logs/last-run.json` path.
    pub fn report_path(&self) -> PathBuf {
        self.logs_dir().join("last-run.json")
    }

    /// Return the `logs/history.jsonl` path.
    pub fn history_path(&self) -> PathBuf {
        self.logs_dir().join("history.jsonl")
    }

    /// Return the diagnostics directory for one invocation.
    pub fn diagnostics_dir(&self, run_stamp: &str) -> PathBuf {
        self.root.join("diagnostics").join(run_stamp)
    }

    /// Directories created on every run, in creation order.
    pub fn project_dirs(&self) -> Vec<PathBuf> {
        vec![
            self.root.clone(),
            self.secrets_dir(),
            self.broker_config_dir(),
            self.gateway_config_dir(),
            self.logs_dir(),
        ]
    }
}
