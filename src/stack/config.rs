//! Immutable run configuration.
//!
//! `Config` is built once from CLI flags and an environment lookup and then
//! passed by reference to every step. Precedence: flag > environment >
//! built-in default. Empty environment values count as unset.
use super::{Service, ServiceIdentity, VolumeSpec};
use crate::cli::RootArgs;
use crate::error::BootstrapError;
use anyhow::{anyhow, Result};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_BROKER_IMAGE: &str = "icr.io/ibm-messaging/mq:9.4.0.0-r1";
pub const DEFAULT_FLOW_IMAGE: &str = "cp.icr.io/cp/appc/ace:12.0.12.0-r1";
pub const DEFAULT_GATEWAY_IMAGE: &str = "icr.io/cpopen/datapower/datapower-limited:10.6.0.0";
pub const DEFAULT_FLOW_PROFILE: &str = "/opt/ibm/ace-12/server/bin/mqsiprofile";

/// Bounded poll of the broker status probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthPolicy {
    pub attempts: u32,
    pub delay: Duration,
    /// Bound on a single status exec; `None` waits indefinitely.
    pub probe_timeout: Option<Duration>,
}

impl Default for HealthPolicy {
    fn default() -> Self {
        Self {
            attempts: 60,
            delay: Duration::from_secs(2),
            probe_timeout: Some(Duration::from_secs(10)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RuntimeSettings {
    /// Container runtime binary (`docker`, `podman`).
    pub binary: String,
    /// Compose command argv prefix, e.g. `["docker", "compose"]`.
    pub compose: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct BrokerSettings {
    pub image: String,
    pub qmgr_name: String,
    pub app_queue: String,
    pub app_channel: String,
    pub listener_port: u16,
    pub web_port: u16,
    pub memory: String,
    pub fallback_identity: ServiceIdentity,
}

#[derive(Debug, Clone)]
pub struct FlowSettings {
    pub image: String,
    pub admin_port: u16,
    pub http_port: u16,
    pub memory: String,
    pub admin_user: String,
    pub profile: String,
    pub fallback_identity: ServiceIdentity,
}

#[derive(Debug, Clone)]
pub struct GatewaySettings {
    pub image: String,
    pub web_port: u16,
    pub ssh_port: u16,
    pub enable_ssh: bool,
    pub bind_address: String,
    pub memory: String,
    pub cpus: String,
    pub fallback_identity: ServiceIdentity,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub project_root: PathBuf,
    pub project_name: String,
    pub fresh: bool,
    pub debug: bool,
    pub skip_pull: bool,
    pub runtime: RuntimeSettings,
    pub host_bind_address: String,
    pub broker: BrokerSettings,
    pub flow: FlowSettings,
    pub gateway: GatewaySettings,
    pub health: HealthPolicy,
    /// `None` disables the one-shot timeout.
    pub oneshot_timeout: Option<Duration>,
    pub log_tail: u32,
}

/// Resolve the project root early so logging can open the run log before the
/// rest of the configuration is validated.
pub fn resolve_project_root<F>(args: &RootArgs, lookup: F) -> Result<PathBuf>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(root) = &args.project_root {
        return Ok(root.clone());
    }
    if let Some(root) = non_empty(&lookup, "LABSTACK_PROJECT_ROOT") {
        return Ok(PathBuf::from(root));
    }
    let home = dirs::home_dir().ok_or_else(|| anyhow!("cannot determine home directory"))?;
    Ok(home.join("labstack"))
}

/// Parse a TCP port, rejecting anything outside `1..=65535`.
pub fn parse_port(name: &str, raw: &str) -> Result<u16, BootstrapError> {
    let invalid = || BootstrapError::InvalidPort {
        name: name.to_string(),
        value: raw.to_string(),
    };
    let value: u32 = raw.trim().parse().map_err(|_| invalid())?;
    if value == 0 || value > u32::from(u16::MAX) {
        return Err(invalid());
    }
    u16::try_from(value).map_err(|_| invalid())
}

impl Config {
    /// Build the configuration from parsed flags and an environment lookup.
    pub fn from_env<F>(args: &RootArgs, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = EnvReader { lookup: &lookup };
        let project_root = resolve_project_root(args, &lookup)?;

        let binary = env.word("LABSTACK_RUNTIME", "docker")?;
        let compose = match non_empty(&lookup, "LABSTACK_COMPOSE") {
            Some(raw) => {
                let argv = shell_words::split(&raw).map_err(|err| {
                    BootstrapError::invalid_setting("LABSTACK_COMPOSE", err.to_string())
                })?;
                if argv.is_empty() {
                    return Err(
                        BootstrapError::invalid_setting("LABSTACK_COMPOSE", "empty command").into(),
                    );
                }
                argv
            }
            None => vec![binary.clone(), "compose".to_string()],
        };

        let broker = BrokerSettings {
            image: env.word("LABSTACK_BROKER_IMAGE", DEFAULT_BROKER_IMAGE)?,
            qmgr_name: env.word("LABSTACK_QMGR_NAME", "QM1")?,
            app_queue: env.word("LABSTACK_BROKER_QUEUE", "LAB.APP.QUEUE")?,
            app_channel: env.word("LABSTACK_BROKER_CHANNEL", "LAB.APP.SVRCONN")?,
            listener_port: env.port("LABSTACK_BROKER_LISTENER_PORT", 1414)?,
            web_port: env.port("LABSTACK_BROKER_WEB_PORT", 9443)?,
            memory: env.word("LABSTACK_BROKER_MEMORY", "1g")?,
            fallback_identity: env.identity("LABSTACK_BROKER", 1001, 0)?,
        };
        let flow = FlowSettings {
            image: env.word("LABSTACK_FLOW_IMAGE", DEFAULT_FLOW_IMAGE)?,
            admin_port: env.port("LABSTACK_FLOW_ADMIN_PORT", 7600)?,
            http_port: env.port("LABSTACK_FLOW_HTTP_PORT", 7800)?,
            memory: env.word("LABSTACK_FLOW_MEMORY", "1g")?,
            admin_user: env.word("LABSTACK_FLOW_ADMIN_USER", "admin")?,
            profile: env.word("LABSTACK_FLOW_PROFILE", DEFAULT_FLOW_PROFILE)?,
            fallback_identity: env.identity("LABSTACK_FLOW", 1001, 1001)?,
        };
        let gateway = GatewaySettings {
            image: env.word("LABSTACK_GATEWAY_IMAGE", DEFAULT_GATEWAY_IMAGE)?,
            web_port: env.port("LABSTACK_GATEWAY_WEB_PORT", 9090)?,
            ssh_port: env.port("LABSTACK_GATEWAY_SSH_PORT", 9022)?,
            enable_ssh: env.flag("LABSTACK_GATEWAY_ENABLE_SSH", false)?,
            bind_address: env.word("LABSTACK_GATEWAY_BIND_ADDRESS", "0.0.0.0")?,
            memory: env.word("LABSTACK_GATEWAY_MEMORY", "4g")?,
            cpus: env.word("LABSTACK_GATEWAY_CPUS", "2")?,
            fallback_identity: env.identity("LABSTACK_GATEWAY", 101, 0)?,
        };

        let health = HealthPolicy {
            attempts: env.positive("LABSTACK_HEALTH_ATTEMPTS", 60)?,
            delay: Duration::from_secs(u64::from(env.count("LABSTACK_HEALTH_DELAY_SECS", 2)?)),
            probe_timeout: env.timeout("LABSTACK_HEALTH_PROBE_TIMEOUT_SECS", 10)?,
        };
        let oneshot_timeout = env.timeout("LABSTACK_ONESHOT_TIMEOUT_SECS", 180)?;

        let config = Self {
            project_root,
            project_name: env.word("LABSTACK_PROJECT_NAME", "labstack")?,
            fresh: args.fresh,
            debug: args.debug,
            skip_pull: args.skip_pull,
            runtime: RuntimeSettings { binary, compose },
            host_bind_address: env.word("LABSTACK_HOST_BIND_ADDRESS", "127.0.0.1")?,
            broker,
            flow,
            gateway,
            health,
            oneshot_timeout,
            log_tail: env.positive("LABSTACK_LOG_TAIL", 200)?,
        };
        config.check_host_ports()?;
        Ok(config)
    }

    /// Host ports published by the manifest, keyed by their setting name.
    pub fn host_ports(&self) -> Vec<(&'static str, u16)> {
        let mut ports = vec![
            ("LABSTACK_BROKER_LISTENER_PORT", self.broker.listener_port),
            ("LABSTACK_BROKER_WEB_PORT", self.broker.web_port),
            ("LABSTACK_FLOW_ADMIN_PORT", self.flow.admin_port),
            ("LABSTACK_FLOW_HTTP_PORT", self.flow.http_port),
            ("LABSTACK_GATEWAY_WEB_PORT", self.gateway.web_port),
        ];
        if self.gateway.enable_ssh {
            ports.push(("LABSTACK_GATEWAY_SSH_PORT", self.gateway.ssh_port));
        }
        ports
    }

    fn check_host_ports(&self) -> Result<(), BootstrapError> {
        let mut seen: BTreeMap<u16, &str> = BTreeMap::new();
        for (name, port) in self.host_ports() {
            if let Some(previous) = seen.insert(port, name) {
                return Err(BootstrapError::invalid_setting(
                    name,
                    format!("port {port} is already used by {previous}"),
                ));
            }
        }
        Ok(())
    }

    pub fn image(&self, service: Service) -> &str {
        match service {
            Service::Broker => &self.broker.image,
            Service::Flow => &self.flow.image,
            Service::Gateway => &self.gateway.image,
        }
    }

    pub fn images(&self) -> Vec<&str> {
        Service::ALL.iter().map(|service| self.image(*service)).collect()
    }

    pub fn fallback_identity(&self, service: Service) -> ServiceIdentity {
        match service {
            Service::Broker => self.broker.fallback_identity,
            Service::Flow => self.flow.fallback_identity,
            Service::Gateway => self.gateway.fallback_identity,
        }
    }

    pub fn container_name(&self, service: Service) -> String {
        service.container_name(&self.project_name)
    }

    pub fn network_name(&self) -> String {
        format!("{}-net", self.project_name)
    }

    /// Declared persistent storage, one named volume per storage need.
    pub fn volumes(&self) -> Vec<VolumeSpec> {
        let volume = |suffix: &str, service: Service, mount_path: &'static str, mode: u32| VolumeSpec {
            name: format!("{}_{suffix}", self.project_name),
            service,
            mount_path,
            mode,
        };
        vec![
            volume("broker-data", Service::Broker, "/mnt/mqm", 0o775),
            volume(
                "flow-work",
                Service::Flow,
                "/home/aceuser/ace-server",
                0o770,
            ),
            volume(
                "gateway-config",
                Service::Gateway,
                "/opt/ibm/datapower/drouter/config",
                0o775,
            ),
            volume(
                "gateway-local",
                Service::Gateway,
                "/opt/ibm/datapower/drouter/local",
                0o775,
            ),
        ]
    }

    pub fn volume(&self, suffix: &str) -> Option<VolumeSpec> {
        let name = format!("{}_{suffix}", self.project_name);
        self.volumes().into_iter().find(|spec| spec.name == name)
    }
}

fn non_empty<F>(lookup: &F, name: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

struct EnvReader<'a, F> {
    lookup: &'a F,
}

impl<F> EnvReader<'_, F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, name: &str) -> Option<String> {
        non_empty(self.lookup, name)
    }

    /// A single token: image refs, names, sizes, addresses.
    fn word(&self, name: &str, default: &str) -> Result<String, BootstrapError> {
        let Some(value) = self.get(name) else {
            return Ok(default.to_string());
        };
        if value.chars().any(char::is_whitespace) {
            return Err(BootstrapError::invalid_setting(
                name,
                format!("{value:?} must not contain whitespace"),
            ));
        }
        Ok(value)
    }

    fn port(&self, name: &str, default: u16) -> Result<u16, BootstrapError> {
        match self.get(name) {
            Some(raw) => parse_port(name, &raw),
            None => Ok(default),
        }
    }

    fn count(&self, name: &str, default: u32) -> Result<u32, BootstrapError> {
        let Some(raw) = self.get(name) else {
            return Ok(default);
        };
        raw.parse().map_err(|_| {
            BootstrapError::invalid_setting(name, format!("{raw:?} is not a non-negative integer"))
        })
    }

    /// Seconds as a timeout; `0` disables it.
    fn timeout(&self, name: &str, default: u32) -> Result<Option<Duration>, BootstrapError> {
        let secs = self.count(name, default)?;
        Ok((secs > 0).then(|| Duration::from_secs(u64::from(secs))))
    }

    fn positive(&self, name: &str, default: u32) -> Result<u32, BootstrapError> {
        let value = self.count(name, default)?;
        if value == 0 {
            return Err(BootstrapError::invalid_setting(name, "must be at least 1"));
        }
        Ok(value)
    }

    fn flag(&self, name: &str, default: bool) -> Result<bool, BootstrapError> {
        let Some(raw) = self.get(name) else {
            return Ok(default);
        };
        match raw.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(BootstrapError::invalid_setting(
                name,
                format!("{raw:?} is not a boolean"),
            )),
        }
    }

    fn identity(
        &self,
        prefix: &str,
        uid: u32,
        gid: u32,
    ) -> Result<ServiceIdentity, BootstrapError> {
        Ok(ServiceIdentity {
            uid: self.count(&format!("{prefix}_UID"), uid)?,
            gid: self.count(&format!("{prefix}_GID"), gid)?,
        })
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
