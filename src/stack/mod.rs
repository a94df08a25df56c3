//! Stack-owned configuration, layout and report types.
//!
//! The stack module centralizes the immutable run configuration, the project
//! directory layout and the JSON report schema so every bootstrap step reads
//! the same values.

/// Current schema version for `logs/last-run.json`.
pub const REPORT_SCHEMA_VERSION: u32 = 1;
/// Current schema version for `logs/history.jsonl` entries.
pub const HISTORY_SCHEMA_VERSION: u32 = 1;

/// Secret file names under `secrets/`; values are generated, names are fixed.
pub const BROKER_ADMIN_SECRET: &str = "broker-admin-password";
pub const BROKER_APP_SECRET: &str = "broker-app-password";
pub const FLOW_ADMIN_SECRET: &str = "flow-admin-password";

/// Carries the flow admin password into `.env` and one-shot environments.
pub const FLOW_ADMIN_PASSWORD_VAR: &str = "FLOW_ADMIN_PASSWORD";

mod config;
mod history;
mod paths;
mod types;

pub use config::{resolve_project_root, Config, HealthPolicy};
pub use history::record_run;
pub use paths::ProjectPaths;
pub use types::*;
