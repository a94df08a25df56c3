//! Embedded artifact templates and their rendering.
//!
//! The manifest, broker script and gateway script are rendered from contexts
//! that carry no credentials at all; only the `.env` context sees the
//! generated passwords.
use crate::provision::Secrets;
use crate::stack::{Config, Service};
use anyhow::{Context, Result};
use serde::Serialize;
use tera::Tera;

pub const COMPOSE_TEMPLATE: &str = include_str!("../templates/compose.yaml.tera");
pub const ENV_TEMPLATE: &str = include_str!("../templates/env.tera");
pub const BROKER_SCRIPT_TEMPLATE: &str = include_str!("../templates/broker.mqsc.tera");
pub const GATEWAY_SCRIPT_TEMPLATE: &str = include_str!("../templates/gateway-startup.cfg.tera");

const ALL_TEMPLATES: [(&str, &str); 4] = [
    ("compose.yaml", COMPOSE_TEMPLATE),
    ("env", ENV_TEMPLATE),
    ("broker.mqsc", BROKER_SCRIPT_TEMPLATE),
    ("gateway-startup.cfg", GATEWAY_SCRIPT_TEMPLATE),
];

/// The four generated text artifacts of one run.
#[derive(Debug, Clone)]
pub struct RenderedArtifacts {
    pub compose: String,
    pub env: String,
    pub broker_script: String,
    pub gateway_script: String,
}

#[derive(Serialize)]
struct VolumeContext {
    key: String,
    name: String,
    service: &'static str,
    mount_path: &'static str,
}

#[derive(Serialize)]
struct ComposeContext<'a> {
    run_stamp: &'a str,
    project_name: &'a str,
    network_name: String,
    broker_container: String,
    flow_container: String,
    gateway_container: String,
    gateway_web_port: u16,
    gateway_ssh_port: u16,
    gateway_enable_ssh: bool,
    volumes: Vec<VolumeContext>,
}

#[derive(Serialize)]
struct EnvContext<'a> {
    run_stamp: &'a str,
    project_name: &'a str,
    fresh: bool,
    broker_image: &'a str,
    flow_image: &'a str,
    gateway_image: &'a str,
    qmgr_name: &'a str,
    host_bind_address: &'a str,
    broker_listener_port: u16,
    broker_web_port: u16,
    flow_admin_port: u16,
    flow_http_port: u16,
    gateway_web_port: u16,
    gateway_ssh_port: u16,
    broker_memory: &'a str,
    flow_memory: &'a str,
    gateway_memory: &'a str,
    gateway_cpus: &'a str,
    broker_admin_password: &'a str,
    broker_app_password: &'a str,
    flow_admin_password: &'a str,
}

#[derive(Serialize)]
struct BrokerScriptContext<'a> {
    run_stamp: &'a str,
    qmgr_name: &'a str,
    app_queue: &'a str,
    app_channel: &'a str,
}

#[derive(Serialize)]
struct GatewayScriptContext<'a> {
    bind_address: &'a str,
    web_port: u16,
    ssh_port: u16,
    enable_ssh: bool,
}

pub struct TemplateRenderer {
    tera: Tera,
}

impl TemplateRenderer {
    /// Load the templates compiled into the binary.
    pub fn from_embedded() -> Result<Self> {
        let mut tera = Tera::default();
        tera.add_raw_templates(ALL_TEMPLATES)
            .context("load embedded templates")?;
        tracing::debug!(count = ALL_TEMPLATES.len(), "loaded embedded templates");
        Ok(Self { tera })
    }

    fn render<T: Serialize>(&self, name: &str, value: &T) -> Result<String> {
        let context = tera::Context::from_serialize(value)
            .with_context(|| format!("build context for {name}"))?;
        self.tera
            .render(name, &context)
            .with_context(|| format!("render template {name}"))
    }

    pub fn render_all(
        &self,
        config: &Config,
        secrets: &Secrets,
        run_stamp: &str,
    ) -> Result<RenderedArtifacts> {
        let volumes = config
            .volumes()
            .into_iter()
            .map(|spec| VolumeContext {
                key: spec
                    .name
                    .strip_prefix(&format!("{}_", config.project_name))
                    .unwrap_or(&spec.name)
                    .to_string(),
                name: spec.name.clone(),
                service: spec.service.compose_name(),
                mount_path: spec.mount_path,
            })
            .collect();
        let compose = self.render(
            "compose.yaml",
            &ComposeContext {
                run_stamp,
                project_name: &config.project_name,
                network_name: config.network_name(),
                broker_container: config.container_name(Service::Broker),
                flow_container: config.container_name(Service::Flow),
                gateway_container: config.container_name(Service::Gateway),
                gateway_web_port: config.gateway.web_port,
                gateway_ssh_port: config.gateway.ssh_port,
                gateway_enable_ssh: config.gateway.enable_ssh,
                volumes,
            },
        )?;

        let env = self.render(
            "env",
            &EnvContext {
                run_stamp,
                project_name: &config.project_name,
                fresh: config.fresh,
                broker_image: &config.broker.image,
                flow_image: &config.flow.image,
                gateway_image: &config.gateway.image,
                qmgr_name: &config.broker.qmgr_name,
                host_bind_address: &config.host_bind_address,
                broker_listener_port: config.broker.listener_port,
                broker_web_port: config.broker.web_port,
                flow_admin_port: config.flow.admin_port,
                flow_http_port: config.flow.http_port,
                gateway_web_port: config.gateway.web_port,
                gateway_ssh_port: config.gateway.ssh_port,
                broker_memory: &config.broker.memory,
                flow_memory: &config.flow.memory,
                gateway_memory: &config.gateway.memory,
                gateway_cpus: &config.gateway.cpus,
                broker_admin_password: &secrets.broker_admin,
                broker_app_password: &secrets.broker_app,
                flow_admin_password: &secrets.flow_admin,
            },
        )?;

        let broker_script = self.render(
            "broker.mqsc",
            &BrokerScriptContext {
                run_stamp,
                qmgr_name: &config.broker.qmgr_name,
                app_queue: &config.broker.app_queue,
                app_channel: &config.broker.app_channel,
            },
        )?;

        let gateway_script = self.render(
            "gateway-startup.cfg",
            &GatewayScriptContext {
                bind_address: &config.gateway.bind_address,
                web_port: config.gateway.web_port,
                ssh_port: config.gateway.ssh_port,
                enable_ssh: config.gateway.enable_ssh,
            },
        )?;

        Ok(RenderedArtifacts {
            compose,
            env,
            broker_script,
            gateway_script,
        })
    }
}
