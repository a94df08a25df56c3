use super::{run_captured, CommandOutput, ContainerRuntime, OneShot};
use crate::stack::{Config, ProjectPaths};
use anyhow::Result;
use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

/// `ContainerRuntime` backed by the `docker`/`podman` CLI and a compose front end.
#[derive(Debug, Clone)]
pub struct CliRuntime {
    binary: String,
    compose: Vec<String>,
    project_name: String,
    compose_file: PathBuf,
    env_file: PathBuf,
}

impl CliRuntime {
    pub fn new(config: &Config, paths: &ProjectPaths) -> Self {
        Self {
            binary: config.runtime.binary.clone(),
            compose: config.runtime.compose.clone(),
            project_name: config.project_name.clone(),
            compose_file: paths.compose_path(),
            env_file: paths.env_path(),
        }
    }

    fn command<I, S>(&self, args: I) -> Command
    where
        I: IntoIterator<Item = S>,
        S: AsRef<std::ffi::OsStr>,
    {
        let mut cmd = Command::new(&self.binary);
        cmd.args(args);
        cmd
    }

    fn compose_command(&self, args: &[&str]) -> Command {
        let mut cmd = Command::new(&self.compose[0]);
        cmd.args(&self.compose[1..])
            .arg("-p")
            .arg(&self.project_name)
            .arg("-f")
            .arg(&self.compose_file)
            .arg("--env-file")
            .arg(&self.env_file)
            .args(args);
        cmd
    }

    fn one_shot_name(&self, label: &str) -> String {
        let label: String = label
            .chars()
            .map(|ch| {
                if ch.is_ascii_alphanumeric() {
                    ch.to_ascii_lowercase()
                } else {
                    '-'
                }
            })
            .collect();
        format!("{}-oneshot-{label}-{}", self.project_name, std::process::id())
    }
}

impl ContainerRuntime for CliRuntime {
    fn pull(&self, image: &str) -> Result<CommandOutput> {
        run_captured(self.command(["pull", image]), None)
    }

    fn run_one_shot(&self, spec: &OneShot) -> Result<CommandOutput> {
        let name = self.one_shot_name(&spec.label);
        let mut cmd = self.command(["run", "--rm", "--name", name.as_str()]);
        cmd.arg("--entrypoint").arg(&spec.entrypoint);
        if let Some(user) = &spec.user {
            cmd.arg("--user").arg(user);
        }
        for mount in &spec.mounts {
            let mut volume = format!("{}:{}", mount.source, mount.target);
            if mount.read_only {
                volume.push_str(":ro");
            }
            cmd.arg("-v").arg(volume);
        }
        for (key, value) in &spec.env {
            cmd.arg("-e").arg(key);
            cmd.env(key, value);
        }
        cmd.arg(&spec.image).args(&spec.command);

        let output = run_captured(cmd, spec.timeout)?;
        if output.timed_out {
            tracing::warn!(label = %spec.label, container = %name, "one-shot timed out; removing container");
            let _ = run_captured(self.command(["rm", "-f", name.as_str()]), None);
        }
        Ok(output)
    }

    fn volume_exists(&self, name: &str) -> Result<bool> {
        let output = run_captured(self.command(["volume", "inspect", name]), None)?;
        Ok(output.success())
    }

    fn volume_create(&self, name: &str) -> Result<CommandOutput> {
        run_captured(self.command(["volume", "create", name]), None)
    }

    fn volume_remove(&self, name: &str) -> Result<CommandOutput> {
        run_captured(self.command(["volume", "rm", "-f", name]), None)
    }

    fn compose_up(&self, services: &[&str]) -> Result<CommandOutput> {
        let mut args = vec!["up", "-d"];
        args.extend_from_slice(services);
        run_captured(self.compose_command(&args), None)
    }

    fn compose_down(&self) -> Result<CommandOutput> {
        run_captured(self.compose_command(&["down"]), None)
    }

    fn compose_ps(&self, timeout: Option<Duration>) -> Result<CommandOutput> {
        run_captured(self.compose_command(&["ps"]), timeout)
    }

    fn exec(
        &self,
        container: &str,
        argv: &[&str],
        timeout: Option<Duration>,
    ) -> Result<CommandOutput> {
        let mut cmd = self.command(["exec", container]);
        cmd.args(argv);
        let output = run_captured(cmd, timeout)?;
        if output.timed_out {
            tracing::warn!(container, command = %argv.join(" "), "exec timed out");
        }
        Ok(output)
    }

    fn logs(&self, container: &str, tail: u32, timeout: Option<Duration>) -> Result<CommandOutput> {
        let tail = tail.to_string();
        run_captured(
            self.command(["logs", "--tail", tail.as_str(), container]),
            timeout,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::RootArgs;
    use crate::runtime::fake::{stub_calls, stub_runtime_binary};

    fn runtime() -> CliRuntime {
        let args = RootArgs {
            project_root: Some(PathBuf::from("/srv/lab")),
            ..RootArgs::default()
        };
        let config = Config::from_env(&args, |_| None).expect("config");
        CliRuntime::new(&config, &ProjectPaths::new(config.project_root.clone()))
    }

    #[test]
    fn compose_commands_pin_project_file_and_env_file() {
        let cmd = runtime().compose_command(&["up", "-d", "broker"]);
        let args: Vec<String> = cmd
            .get_args()
            .map(|arg| arg.to_string_lossy().to_string())
            .collect();
        assert_eq!(cmd.get_program(), "docker");
        assert_eq!(
            args,
            vec![
                "compose",
                "-p",
                "labstack",
                "-f",
                "/srv/lab/compose.yaml",
                "--env-file",
                "/srv/lab/.env",
                "up",
                "-d",
                "broker"
            ]
        );
    }

    fn stubbed(dir: &std::path::Path) -> CliRuntime {
        let stub = stub_runtime_binary(dir).display().to_string();
        let args = RootArgs {
            project_root: Some(dir.to_path_buf()),
            ..RootArgs::default()
        };
        let config = Config::from_env(&args, |name| {
            (name == "LABSTACK_RUNTIME").then(|| stub.clone())
        })
        .expect("config");
        CliRuntime::new(&config, &ProjectPaths::new(config.project_root.clone()))
    }

    #[test]
    fn timed_out_one_shot_is_removed_by_name() {
        let dir = tempfile::tempdir().expect("tempdir");
        let runtime = stubbed(dir.path());
        let spec = OneShot::shell("hang", "lab/image:1", "sleep 600", Some(Duration::from_millis(500)));

        let output = runtime.run_one_shot(&spec).expect("one-shot");

        assert!(output.timed_out);
        assert!(!output.success());
        let name = runtime.one_shot_name("hang");
        let calls = stub_calls(dir.path());
        assert!(calls[0].starts_with(&format!("run --rm --name {name} --entrypoint sh")), "{calls:#?}");
        assert_eq!(calls.last(), Some(&format!("rm -f {name}")));
    }

    #[test]
    fn hanging_exec_returns_once_its_timeout_passes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let runtime = stubbed(dir.path());

        let output = runtime
            .exec("lab-broker", &["dspmq"], Some(Duration::from_millis(500)))
            .expect("exec");

        assert!(output.timed_out);
        assert!(output.duration_ms < 20_000);
        assert_eq!(stub_calls(dir.path()), vec!["exec lab-broker dspmq"]);
    }

    #[test]
    fn one_shot_names_are_container_safe() {
        let name = runtime().one_shot_name("Identity probe/flow");
        assert!(name.starts_with("labstack-oneshot-identity-probe-flow-"));
        assert!(name
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '-'));
    }
}
