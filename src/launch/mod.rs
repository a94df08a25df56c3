//! Two-wave, health-gated stack launch.
//!
//! Wave 1 starts the broker alone and polls its status command until it
//! reports a running queue manager. Only then does wave 2 start the flow
//! engine and gateway. Each probe is bounded by the policy's probe timeout,
//! and a probe that hits it counts as a failed attempt. When the gate is never
//! passed, diagnostics are collected once and the run fails without starting
//! wave 2.
mod diagnostics;

pub use diagnostics::DiagnosticsCollector;

use crate::error::BootstrapError;
use crate::runtime::ContainerRuntime;
use crate::stack::{HealthPolicy, LaunchState, Service};
use anyhow::{Context, Result};
use std::time::Duration;

const WAVE_ONE: &[&str] = &["broker"];
const WAVE_TWO: &[&str] = &["flow", "gateway"];
const STATUS_COMMAND: &[&str] = &["dspmq"];

/// State transitions and probe count of one launch, kept even on failure.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaunchRecord {
    pub states: Vec<LaunchState>,
    pub health_attempts: Option<u32>,
}

impl LaunchRecord {
    fn enter(&mut self, state: LaunchState) {
        tracing::info!(state = ?state, "launch state");
        self.states.push(state);
    }
}

/// Whether status probe output reports a running queue manager.
pub fn reports_running(stdout: &str) -> bool {
    stdout.to_lowercase().contains("running")
}

pub struct Launcher<'a> {
    runtime: &'a dyn ContainerRuntime,
    policy: HealthPolicy,
    broker_container: String,
    sleeper: Box<dyn Fn(Duration) + 'a>,
}

impl<'a> Launcher<'a> {
    pub fn new(runtime: &'a dyn ContainerRuntime, policy: HealthPolicy, project: &str) -> Self {
        Self {
            runtime,
            policy,
            broker_container: Service::Broker.container_name(project),
            sleeper: Box::new(std::thread::sleep),
        }
    }

    /// Replace the inter-attempt sleep; tests use this to avoid waiting.
    pub fn with_sleeper(mut self, sleeper: impl Fn(Duration) + 'a) -> Self {
        self.sleeper = Box::new(sleeper);
        self
    }

    pub fn broker_container(&self) -> &str {
        &self.broker_container
    }

    /// Run both waves, recording every transition into `record`.
    pub fn launch(
        &self,
        diagnostics: &DiagnosticsCollector<'_>,
        record: &mut LaunchRecord,
    ) -> Result<()> {
        record.enter(LaunchState::Stopped);
        record.enter(LaunchState::Wave1Starting);
        if let Err(err) = self.compose_up(WAVE_ONE) {
            record.enter(LaunchState::Failed);
            return Err(err);
        }

        let (healthy, attempts) = self.wait_for_broker();
        record.health_attempts = Some(attempts);
        if !healthy {
            record.enter(LaunchState::Failed);
            let dir = diagnostics.collect();
            return Err(BootstrapError::HealthGate {
                attempts,
                diagnostics: dir,
            }
            .into());
        }
        record.enter(LaunchState::Wave1Healthy);

        record.enter(LaunchState::Wave2Starting);
        if let Err(err) = self.compose_up(WAVE_TWO) {
            record.enter(LaunchState::Failed);
            return Err(err);
        }
        record.enter(LaunchState::Running);
        Ok(())
    }

    fn compose_up(&self, services: &[&str]) -> Result<()> {
        let step = format!("compose up {}", services.join(" "));
        let output = self
            .runtime
            .compose_up(services)
            .with_context(|| step.clone())?;
        if !output.success() {
            return Err(BootstrapError::CommandFailed {
                step,
                exit: output.exit_display(),
                detail: output.detail(),
            }
            .into());
        }
        tracing::info!(services = %services.join(","), "services started");
        Ok(())
    }

    /// Poll the broker status command; returns whether it became healthy and
    /// how many probes ran.
    fn wait_for_broker(&self) -> (bool, u32) {
        let attempts = self.policy.attempts;
        for attempt in 1..=attempts {
            let probe =
                self.runtime
                    .exec(&self.broker_container, STATUS_COMMAND, self.policy.probe_timeout);
            match probe {
                Ok(output) if output.timed_out => tracing::debug!(
                    attempt,
                    max = attempts,
                    "broker status probe timed out"
                ),
                Ok(output) if reports_running(&output.stdout) => {
                    tracing::info!(attempt, "broker reports running");
                    return (true, attempt);
                }
                Ok(output) => tracing::debug!(
                    attempt,
                    max = attempts,
                    status = %output.stdout.trim(),
                    detail = %output.stderr.trim(),
                    "broker not running yet"
                ),
                Err(err) => tracing::debug!(
                    attempt,
                    max = attempts,
                    error = %format!("{err:#}"),
                    "broker status probe failed"
                ),
            }
            if attempt < attempts {
                (self.sleeper)(self.policy.delay);
            }
        }
        tracing::warn!(attempts, "broker did not become healthy");
        (false, attempts)
    }
}

#[cfg(test)]
#[path = "launch_tests.rs"]
mod tests;
