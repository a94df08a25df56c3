use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// The three services of the lab stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Service {
    Broker,
    Flow,
    Gateway,
}

impl Service {
    pub const ALL: [Service; 3] = [Service::Broker, Service::Flow, Service::Gateway];

    /// Service key in `compose.yaml`.
    pub fn compose_name(self) -> &'static str {
        match self {
            Service::Broker => "broker",
            Service::Flow => "flow",
            Service::Gateway => "gateway",
        }
    }

    pub fn container_name(self, project: &str) -> String {
        format!("{project}-{}", self.compose_name())
    }
}

/// Numeric user/group a container process runs as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceIdentity {
    pub uid: u32,
    pub gid: u32,
}

impl std::fmt::Display for ServiceIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.uid, self.gid)
    }
}

/// A named volume the stack mounts into one service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeSpec {
    pub name: String,
    pub service: Service,
    pub mount_path: &'static str,
    pub mode: u32,
}

/// Lifecycle states of the two-wave launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LaunchState {
    Stopped,
    Wave1Starting,
    Wave1Healthy,
    Wave2Starting,
    Running,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecretOutcome {
    Created,
    /// Written from the fixed fallback because the OS random source failed.
    CreatedWeak,
    Reused,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretRecord {
    pub name: String,
    pub outcome: SecretOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ArtifactOutcome {
    Created,
    Replaced { backup: PathBuf },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRecord {
    pub path: PathBuf,
    pub outcome: ArtifactOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FixOutcome {
    Applied,
    Skipped { reason: String },
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnershipRecord {
    pub target: String,
    pub identity: ServiceIdentity,
    pub mode: String,
    pub outcome: FixOutcome,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Running,
    Failed,
}

/// Snapshot written to `logs/last-run.json` after every run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub schema_version: u32,
    pub run_stamp: String,
    pub project_root: PathBuf,
    pub fresh: bool,
    pub secrets: Vec<SecretRecord>,
    pub artifacts: Vec<ArtifactRecord>,
    pub volumes: Vec<String>,
    pub ownership: Vec<OwnershipRecord>,
    /// SELinux relabel of the bind-mounted config tree.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relabel: Option<FixOutcome>,
    pub states: Vec<LaunchState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_attempts: Option<u32>,
    pub outcome: RunOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// One line in `logs/history.jsonl`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub schema_version: u32,
    pub run_stamp: String,
    pub fresh: bool,
    pub outcome: RunOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_state: Option<LaunchState>,
}
