//! Flow-engine administration through one-shot runs of the flow image.
//!
//! Each command sources the product profile and works on the flow workdir
//! volume. The admin password is passed only through the child environment.
use crate::error::BootstrapError;
use crate::runtime::{CommandOutput, ContainerRuntime, Mount, OneShot};
use crate::stack::{Config, FLOW_ADMIN_PASSWORD_VAR};
use anyhow::{Context, Result};
use std::time::Duration;

const ADMIN_USER_VAR: &str = "FLOW_ADMIN_USER";

pub struct FlowAdmin<'a> {
    runtime: &'a dyn ContainerRuntime,
    image: String,
    profile: String,
    volume: String,
    workdir: String,
    timeout: Option<Duration>,
}

impl<'a> FlowAdmin<'a> {
    pub fn new(runtime: &'a dyn ContainerRuntime, config: &Config) -> Result<Self> {
        let volume = config
            .volume("flow-work")
            .context("flow workdir volume is not declared")?;
        Ok(Self {
            runtime,
            image: config.flow.image.clone(),
            profile: config.flow.profile.clone(),
            volume: volume.name,
            workdir: volume.mount_path.to_string(),
            timeout: config.oneshot_timeout,
        })
    }

    fn one_shot(&self, label: &str, command: &str) -> OneShot {
        let script = format!(". {} >/dev/null 2>&1; {command}", self.profile);
        OneShot::shell(label, &self.image, &script, self.timeout)
            .mount(Mount::rw(&self.volume, &self.workdir))
    }

    fn run(&self, spec: &OneShot) -> Result<CommandOutput> {
        self.runtime
            .run_one_shot(spec)
            .with_context(|| format!("run {}", spec.label))
    }

    fn run_checked(&self, spec: &OneShot) -> Result<()> {
        let output = self.run(spec)?;
        if output.success() {
            return Ok(());
        }
        Err(BootstrapError::CommandFailed {
            step: spec.label.clone(),
            exit: output.exit_display(),
            detail: output.detail(),
        }
        .into())
    }

    /// Create the server workdir unless it already holds a configuration.
    pub fn init_workdir(&self) -> Result<()> {
        let command = format!(
            "[ -f {dir}/server.conf.yaml ] || mqsicreateworkdir {dir}",
            dir = self.workdir
        );
        self.run_checked(&self.one_shot("flow-workdir", &command))?;
        tracing::info!(workdir = %self.workdir, "flow workdir ready");
        Ok(())
    }

    pub fn activate_file_auth(&self) -> Result<()> {
        let command = format!(
            "mqsichangeauthmode -w {} -r admin -s active -m file",
            self.workdir
        );
        self.run_checked(&self.one_shot("flow-authmode", &command))?;
        tracing::info!("flow web admin authentication active");
        Ok(())
    }

    /// Create the admin web user, or update its password when it exists.
    pub fn upsert_web_user(&self, user: &str, password: &str) -> Result<()> {
        let create = self.web_user_command("flow-webuser-create", "-c", user, password);
        let output = self.run(&create)?;
        if output.success() {
            tracing::info!(user, "flow web user created");
            return Ok(());
        }
        tracing::debug!(
            user,
            detail = %output.detail(),
            "web user create failed; trying modify"
        );

        let modify = self.web_user_command("flow-webuser-modify", "-m", user, password);
        let output = self.run(&modify)?;
        if output.success() {
            tracing::info!(user, "flow web user updated");
            return Ok(());
        }
        Err(BootstrapError::CommandFailed {
            step: format!("create or modify flow web user {user}"),
            exit: output.exit_display(),
            detail: output.detail(),
        }
        .into())
    }

    fn web_user_command(&self, label: &str, action: &str, user: &str, password: &str) -> OneShot {
        let command = format!(
            "mqsiwebuseradmin -w {} {action} -u \"${ADMIN_USER_VAR}\" -a \"${FLOW_ADMIN_PASSWORD_VAR}\" -r admin",
            self.workdir
        );
        self.one_shot(label, &command)
            .env(ADMIN_USER_VAR, user)
            .env(FLOW_ADMIN_PASSWORD_VAR, password)
    }

    /// Run every admin step in order.
    pub fn configure(&self, user: &str, password: &str) -> Result<()> {
        self.init_workdir()?;
        self.activate_file_auth()?;
        self.upsert_web_user(user, password)
    }
}
