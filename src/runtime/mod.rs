//! Container runtime collaborator.
//!
//! Every interaction with images, volumes and containers goes through the
//! `ContainerRuntime` trait so the bootstrap steps can be driven by a scripted
//! fake in tests. One-shot commands are a separate capability from
//! compose-managed services: they always override the image entrypoint and
//! carry an optional timeout. Calls into running containers (`exec`, `logs`)
//! take a timeout as well.
mod cli;
#[cfg(test)]
pub(crate) mod fake;
mod process;

pub use cli::CliRuntime;
pub use process::{run_captured, CommandOutput};

use anyhow::Result;
use std::time::Duration;

/// A volume or host directory mounted into a one-shot container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mount {
    pub source: String,
    pub target: String,
    pub read_only: bool,
}

impl Mount {
    pub fn rw(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            read_only: false,
        }
    }

    pub fn ro(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            read_only: true,
        }
    }
}

/// A throwaway `run --rm` of an image with its entrypoint replaced.
#[derive(Debug, Clone)]
pub struct OneShot {
    /// Short label used in logs and error messages.
    pub label: String,
    pub image: String,
    pub entrypoint: String,
    pub command: Vec<String>,
    pub user: Option<String>,
    pub mounts: Vec<Mount>,
    /// Passed through the child environment; only names reach the argv.
    pub env: Vec<(String, String)>,
    pub timeout: Option<Duration>,
}

impl OneShot {
    /// A `sh -c <script>` one-shot, the shape every setup command takes.
    pub fn shell(label: &str, image: &str, script: &str, timeout: Option<Duration>) -> Self {
        Self {
            label: label.to_string(),
            image: image.to_string(),
            entrypoint: "sh".to_string(),
            command: vec!["-c".to_string(), script.to_string()],
            user: None,
            mounts: Vec::new(),
            env: Vec::new(),
            timeout,
        }
    }

    pub fn user(mut self, user: &str) -> Self {
        self.user = Some(user.to_string());
        self
    }

    pub fn mount(mut self, mount: Mount) -> Self {
        self.mounts.push(mount);
        self
    }

    pub fn env(mut self, name: &str, value: &str) -> Self {
        self.env.push((name.to_string(), value.to_string()));
        self
    }
}

/// Operations the bootstrapper needs from the container runtime CLI.
pub trait ContainerRuntime {
    fn pull(&self, image: &str) -> Result<CommandOutput>;

    fn run_one_shot(&self, spec: &OneShot) -> Result<CommandOutput>;

    fn volume_exists(&self, name: &str) -> Result<bool>;

    fn volume_create(&self, name: &str) -> Result<CommandOutput>;

    fn volume_remove(&self, name: &str) -> Result<CommandOutput>;

    fn compose_up(&self, services: &[&str]) -> Result<CommandOutput>;

    fn compose_down(&self) -> Result<CommandOutput>;

    fn compose_ps(&self, timeout: Option<Duration>) -> Result<CommandOutput>;

    /// Run `argv` in a running container. A call that outlives `timeout` is
    /// killed and comes back with `timed_out` set.
    fn exec(&self, container: &str, argv: &[&str], timeout: Option<Duration>)
        -> Result<CommandOutput>;

    fn logs(&self, container: &str, tail: u32, timeout: Option<Duration>) -> Result<CommandOutput>;
}
