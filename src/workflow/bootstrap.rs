//! The end-to-end bootstrap run.
use crate::artifacts::ArtifactWriter;
use crate::launch::{DiagnosticsCollector, LaunchRecord, Launcher};
use crate::provision::{
    provision_secrets, pull_all, relabel_for_containers, seed_startup_script, FlowAdmin,
    OwnershipFixer, SecretGenerator, Secrets, Target, VolumeLifecycle,
};
use crate::runtime::ContainerRuntime;
use crate::stack::{
    record_run, ArtifactRecord, Config, OwnershipRecord, ProjectPaths, RunOutcome, RunReport,
    Service, ServiceIdentity, REPORT_SCHEMA_VERSION,
};
use crate::templates::TemplateRenderer;
use crate::util::{display_path, octal_mode};
use anyhow::{Context, Result};
use std::fs;
use std::time::Duration;

const PUBLIC_FILE_MODE: u32 = 0o644;
const ENV_FILE_MODE: u32 = 0o600;
const CONFIG_DIR_MODE: u32 = 0o755;

pub struct Bootstrapper<'a> {
    config: &'a Config,
    paths: ProjectPaths,
    runtime: &'a dyn ContainerRuntime,
    generator: &'a dyn SecretGenerator,
    run_stamp: String,
    sleeper: Box<dyn Fn(Duration) + 'a>,
}

impl<'a> Bootstrapper<'a> {
    pub fn new(
        config: &'a Config,
        runtime: &'a dyn ContainerRuntime,
        generator: &'a dyn SecretGenerator,
        run_stamp: &str,
    ) -> Self {
        Self {
            config,
            paths: ProjectPaths::new(config.project_root.clone()),
            runtime,
            generator,
            run_stamp: run_stamp.to_string(),
            sleeper: Box::new(std::thread::sleep),
        }
    }

    /// Replace the health-poll sleep.
    pub fn with_sleeper(mut self, sleeper: impl Fn(Duration) + 'a) -> Self {
        self.sleeper = Box::new(sleeper);
        self
    }

    /// Run every step, then persist the report and history line.
    pub fn run(&self) -> Result<RunReport> {
        let mut report = RunReport {
            schema_version: REPORT_SCHEMA_VERSION,
            run_stamp: self.run_stamp.clone(),
            project_root: self.config.project_root.clone(),
            fresh: self.config.fresh,
            secrets: Vec::new(),
            artifacts: Vec::new(),
            volumes: Vec::new(),
            ownership: Vec::new(),
            relabel: None,
            states: Vec::new(),
            health_attempts: None,
            outcome: RunOutcome::Failed,
            error: None,
        };
        let mut launch = LaunchRecord::default();
        let result = self.execute(&mut report, &mut launch);

        report.states = launch.states.clone();
        report.health_attempts = launch.health_attempts;
        match &result {
            Ok(()) => report.outcome = RunOutcome::Running,
            Err(err) => report.error = Some(format!("{err:#}")),
        }
        self.persist(&report);
        result.map(|()| report)
    }

    fn execute(&self, report: &mut RunReport, launch: &mut LaunchRecord) -> Result<()> {
        if self.config.fresh {
            tracing::warn!(root = %self.paths.root().display(), "fresh start: service data will be erased");
        }
        self.create_project_dirs()?;

        let (secrets, records) = provision_secrets(&self.paths, self.generator)?;
        report.secrets = records;

        report.artifacts = self.write_artifacts(&secrets)?;

        if self.config.skip_pull {
            tracing::info!("skipping image pulls");
        } else {
            pull_all(self.runtime, &self.config.images())?;
        }

        report.volumes =
            VolumeLifecycle::new(self.runtime).prepare(&self.config.volumes(), self.config.fresh)?;

        report.ownership = self.fix_ownership();
        report.relabel = Some(relabel_for_containers(&self.paths.config_dir()));

        seed_startup_script(self.runtime, self.config, &self.paths, &self.run_stamp)?;
        FlowAdmin::new(self.runtime, self.config)?
            .configure(&self.config.flow.admin_user, &secrets.flow_admin)?;

        let launcher = Launcher::new(self.runtime, self.config.health, &self.config.project_name)
            .with_sleeper(|delay| (self.sleeper)(delay));
        let diagnostics = DiagnosticsCollector::new(
            self.runtime,
            launcher.broker_container(),
            self.paths.diagnostics_dir(&self.run_stamp),
            self.config.log_tail,
        )
        .with_timeout(self.config.oneshot_timeout);
        launcher.launch(&diagnostics, launch)?;
        tracing::info!(
            root = %self.paths.root().display(),
            project = %self.config.project_name,
            "stack running"
        );
        Ok(())
    }

    fn create_project_dirs(&self) -> Result<()> {
        for dir in self.paths.project_dirs() {
            fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;
        }
        Ok(())
    }

    fn write_artifacts(&self, secrets: &Secrets) -> Result<Vec<ArtifactRecord>> {
        let rendered = TemplateRenderer::from_embedded()?.render_all(
            self.config,
            secrets,
            &self.run_stamp,
        )?;
        let writer = ArtifactWriter::new(&self.run_stamp);
        let outputs = [
            (self.paths.compose_path(), rendered.compose, PUBLIC_FILE_MODE),
            (self.paths.env_path(), rendered.env, ENV_FILE_MODE),
            (
                self.paths.broker_script_path(),
                rendered.broker_script,
                PUBLIC_FILE_MODE,
            ),
            (
                self.paths.gateway_script_path(),
                rendered.gateway_script,
                PUBLIC_FILE_MODE,
            ),
        ];
        let mut records = Vec::with_capacity(outputs.len());
        for (path, content, mode) in outputs {
            let outcome = writer
                .write_artifact(&path, &content, mode)
                .with_context(|| format!("write {}", display_path(&path, Some(self.paths.root()))))?;
            records.push(ArtifactRecord { path, outcome });
        }
        Ok(records)
    }

    /// Probe each image's runtime identity and align storage with it.
    fn fix_ownership(&self) -> Vec<OwnershipRecord> {
        let fixer = OwnershipFixer::new(self.runtime, self.config.oneshot_timeout);
        let identities: Vec<(Service, ServiceIdentity)> = Service::ALL
            .into_iter()
            .map(|service| {
                let identity = fixer.probe_identity(
                    service.compose_name(),
                    self.config.image(service),
                    self.config.fallback_identity(service),
                );
                (service, identity)
            })
            .collect();
        let identity_of = |service: Service| {
            identities
                .iter()
                .find(|(probed, _)| *probed == service)
                .map(|(_, identity)| *identity)
                .unwrap_or_else(|| self.config.fallback_identity(service))
        };

        let mut targets: Vec<(Target, ServiceIdentity, u32)> = self
            .config
            .volumes()
            .into_iter()
            .map(|volume| {
                (
                    Target::Volume {
                        image: self.config.image(volume.service).to_string(),
                        name: volume.name,
                    },
                    identity_of(volume.service),
                    volume.mode,
                )
            })
            .collect();
        targets.push((
            Target::HostPath(self.paths.broker_config_dir()),
            identity_of(Service::Broker),
            CONFIG_DIR_MODE,
        ));
        targets.push((
            Target::HostPath(self.paths.gateway_config_dir()),
            identity_of(Service::Gateway),
            CONFIG_DIR_MODE,
        ));

        targets
            .into_iter()
            .map(|(target, identity, mode)| OwnershipRecord {
                outcome: fixer.fix_ownership(&target, identity, mode),
                target: target.describe(),
                identity,
                mode: octal_mode(mode),
            })
            .collect()
    }

    fn persist(&self, report: &RunReport) {
        if let Err(err) = record_run(&self.paths, report) {
            tracing::warn!(error = %format!("{err:#}"), "could not record run");
        }
    }
}

#[cfg(test)]
#[path = "bootstrap_tests.rs"]
mod tests;
