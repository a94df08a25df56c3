//! Scripted in-memory runtime for tests.
use super::{CommandOutput, ContainerRuntime, OneShot};
use anyhow::{anyhow, Result};
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Default)]
struct FakeState {
    calls: Vec<String>,
    volumes: BTreeMap<String, BTreeSet<String>>,
    probe_responses: VecDeque<Result<String, String>>,
    probe_default: Option<String>,
    failing_pulls: BTreeSet<String>,
    one_shots: Vec<OneShot>,
    web_users: BTreeSet<String>,
    fdc_listing: String,
    fdc_body: String,
    /// File bodies by volume, for helpers whose effect tests inspect.
    contents: BTreeMap<String, BTreeMap<String, String>>,
    exec_hangs: bool,
    exec_timeouts: Vec<Option<Duration>>,
}

/// Stand-in runtime binary for driving `CliRuntime` in tests.
///
/// Every invocation appends its argv to `calls.log` beside the script.
/// `exec`, `logs` and `run` hang; everything else exits 0 at once.
pub fn stub_runtime_binary(dir: &Path) -> std::path::PathBuf {
    use std::os::unix::fs::PermissionsExt;
    let path = dir.join("stub-runtime");
    let script = r#"#!/bin/sh
echo "$*" >> "$(dirname "$0")/calls.log"
case "$1" in
  exec|logs|run) exec sleep 30 ;;
  compose) case "$*" in *" ps") echo "NAME STATUS" ;; esac ;;
esac
exit 0
"#;
    std::fs::write(&path, script).expect("write stub runtime");
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
        .expect("chmod stub runtime");
    path
}

/// Argv lines the stub runtime recorded.
pub fn stub_calls(dir: &Path) -> Vec<String> {
    std::fs::read_to_string(dir.join("calls.log"))
        .unwrap_or_default()
        .lines()
        .map(str::to_string)
        .collect()
}

/// Records every call and answers from scripted state.
#[derive(Debug, Default)]
pub struct FakeRuntime {
    state: RefCell<FakeState>,
}

fn ok(stdout: &str) -> CommandOutput {
    CommandOutput {
        command_line: "fake".to_string(),
        exit_code: Some(0),
        stdout: stdout.to_string(),
        ..CommandOutput::default()
    }
}

fn hung() -> CommandOutput {
    CommandOutput {
        command_line: "fake".to_string(),
        timed_out: true,
        ..CommandOutput::default()
    }
}

fn failed(stderr: &str) -> CommandOutput {
    CommandOutput {
        command_line: "fake".to_string(),
        exit_code: Some(1),
        stderr: stderr.to_string(),
        ..CommandOutput::default()
    }
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue status probe answers; `Err` makes the exec itself fail.
    pub fn script_probe(&self, responses: Vec<Result<&str, &str>>) {
        let mut state = self.state.borrow_mut();
        for response in responses {
            state.probe_responses.push_back(
                response
                    .map(|text| text.to_string())
                    .map_err(|text| text.to_string()),
            );
        }
    }

    /// Answer used once scripted responses run out.
    pub fn probe_default(&self, text: &str) {
        self.state.borrow_mut().probe_default = Some(text.to_string());
    }

    pub fn fail_pull(&self, image: &str) {
        self.state.borrow_mut().failing_pulls.insert(image.to_string());
    }

    pub fn put_volume_file(&self, volume: &str, file: &str) {
        self.state
            .borrow_mut()
            .volumes
            .entry(volume.to_string())
            .or_default()
            .insert(file.to_string());
    }

    pub fn set_fdc(&self, listing: &str, body: &str) {
        let mut state = self.state.borrow_mut();
        state.fdc_listing = listing.to_string();
        state.fdc_body = body.to_string();
    }

    /// Make every `exec` and `logs` call behave as if it hit its timeout.
    pub fn hang_execs(&self) {
        self.state.borrow_mut().exec_hangs = true;
    }

    /// Timeouts passed to `exec`, in call order.
    pub fn exec_timeouts(&self) -> Vec<Option<Duration>> {
        self.state.borrow().exec_timeouts.clone()
    }

    pub fn volume_file_content(&self, volume: &str, file: &str) -> Option<String> {
        self.state
            .borrow()
            .contents
            .get(volume)
            .and_then(|files| files.get(file).cloned())
    }

    pub fn volume_files(&self, volume: &str) -> Option<Vec<String>> {
        self.state
            .borrow()
            .volumes
            .get(volume)
            .map(|files| files.iter().cloned().collect())
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.borrow().calls.clone()
    }

    pub fn count_calls(&self, prefix: &str) -> usize {
        self.state
            .borrow()
            .calls
            .iter()
            .filter(|call| call.starts_with(prefix))
            .count()
    }

    pub fn one_shots(&self) -> Vec<OneShot> {
        self.state.borrow().one_shots.clone()
    }

    fn record(&self, call: String) {
        self.state.borrow_mut().calls.push(call);
    }

    /// Mirror the gateway seed helper: copy when absent, replace and back up
    /// when the host copy differs.
    fn seed_gateway(&self, spec: &OneShot) -> CommandOutput {
        let mount_source = |target: &str| {
            spec.mounts
                .iter()
                .find(|mount| mount.target == target)
                .map(|mount| mount.source.clone())
                .unwrap_or_default()
        };
        let stamp = spec
            .env
            .iter()
            .find(|(key, _)| key == "LABSTACK_RUN_STAMP")
            .map(|(_, value)| value.clone())
            .unwrap_or_default();
        let source = Path::new(&mount_source("/src")).join("auto-startup.cfg");
        let Ok(rendered) = std::fs::read_to_string(source) else {
            return failed("cp: cannot stat '/src/auto-startup.cfg'");
        };
        let volume = mount_source("/cfg");
        let mut state = self.state.borrow_mut();
        let state = &mut *state;
        let files = state.contents.entry(volume.clone()).or_default();
        let names = state.volumes.entry(volume).or_default();
        let answer = match files.get("auto-startup.cfg").cloned() {
            None => "seeded".to_string(),
            Some(current) if current == rendered => return ok("unchanged\n"),
            Some(current) => {
                let backup = format!("auto-startup.cfg.bak.{stamp}");
                files.insert(backup.clone(), current);
                names.insert(backup.clone());
                format!("updated /cfg/{backup}")
            }
        };
        files.insert("auto-startup.cfg".to_string(), rendered);
        names.insert("auto-startup.cfg".to_string());
        ok(&format!("{answer}\n"))
    }

    fn answer_one_shot(&self, spec: &OneShot) -> CommandOutput {
        if spec.label == "gateway-seed" {
            return self.seed_gateway(spec);
        }
        let script = spec.command.last().cloned().unwrap_or_default();
        let mut state = self.state.borrow_mut();
        if script.starts_with("id -u") {
            return ok("1001\n0\n");
        }
        if script.contains("mqsiwebuseradmin") && script.contains(" -c ") {
            let user = spec
                .env
                .iter()
                .find(|(key, _)| key == "FLOW_ADMIN_USER")
                .map(|(_, value)| value.clone())
                .unwrap_or_default();
            if !state.web_users.insert(user) {
                return failed("BIP2201E: user already exists");
            }
        }
        ok("")
    }
}

impl ContainerRuntime for FakeRuntime {
    fn pull(&self, image: &str) -> Result<CommandOutput> {
        self.record(format!("pull {image}"));
        if self.state.borrow().failing_pulls.contains(image) {
            return Ok(failed("manifest unknown"));
        }
        Ok(ok(""))
    }

    fn run_one_shot(&self, spec: &OneShot) -> Result<CommandOutput> {
        self.record(format!("one-shot {}", spec.label));
        self.state.borrow_mut().one_shots.push(spec.clone());
        Ok(self.answer_one_shot(spec))
    }

    fn volume_exists(&self, name: &str) -> Result<bool> {
        self.record(format!("volume inspect {name}"));
        Ok(self.state.borrow().volumes.contains_key(name))
    }

    fn volume_create(&self, name: &str) -> Result<CommandOutput> {
        self.record(format!("volume create {name}"));
        self.state
            .borrow_mut()
            .volumes
            .entry(name.to_string())
            .or_default();
        Ok(ok(name))
    }

    fn volume_remove(&self, name: &str) -> Result<CommandOutput> {
        self.record(format!("volume rm {name}"));
        let mut state = self.state.borrow_mut();
        state.volumes.remove(name);
        state.contents.remove(name);
        Ok(ok(""))
    }

    fn compose_up(&self, services: &[&str]) -> Result<CommandOutput> {
        self.record(format!("compose up {}", services.join(" ")));
        Ok(ok(""))
    }

    fn compose_down(&self) -> Result<CommandOutput> {
        self.record("compose down".to_string());
        Ok(ok(""))
    }

    fn compose_ps(&self, _timeout: Option<Duration>) -> Result<CommandOutput> {
        self.record("compose ps".to_string());
        Ok(ok("NAME STATUS\n"))
    }

    fn exec(
        &self,
        container: &str,
        argv: &[&str],
        timeout: Option<Duration>,
    ) -> Result<CommandOutput> {
        self.record(format!("exec {container} {}", argv.join(" ")));
        let mut state = self.state.borrow_mut();
        state.exec_timeouts.push(timeout);
        if state.exec_hangs {
            return Ok(hung());
        }
        if argv.first() == Some(&"dspmq") {
            let next = state
                .probe_responses
                .pop_front()
                .or_else(|| state.probe_default.clone().map(Ok));
            return match next {
                Some(Ok(text)) => Ok(ok(&text)),
                Some(Err(text)) => Err(anyhow!(text)),
                None => Ok(failed("no such container")),
            };
        }
        let script = argv.last().copied().unwrap_or_default();
        if script.contains("ls -t") {
            return Ok(ok(&state.fdc_listing));
        }
        if argv.first() == Some(&"cat") {
            return Ok(ok(&state.fdc_body));
        }
        Ok(ok(""))
    }

    fn logs(&self, container: &str, tail: u32, _timeout: Option<Duration>) -> Result<CommandOutput> {
        self.record(format!("logs {container} {tail}"));
        if self.state.borrow().exec_hangs {
            return Ok(hung());
        }
        Ok(ok("AMQ5026I: The listener 'SYSTEM.LISTENER.TCP.1' has started.\n"))
    }
}
