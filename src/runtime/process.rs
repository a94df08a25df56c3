use crate::util::truncate_string;
use anyhow::{Context, Result};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(25);
const MAX_DETAIL_BYTES: usize = 2_000;

/// Captured result of one external command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Shell-quoted command line, safe to log.
    pub command_line: String,
    pub exit_code: Option<i32>,
    pub timed_out: bool,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u128,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }

    /// Exit code, or `timeout` / `signal` when there is none.
    pub fn exit_display(&self) -> String {
        if self.timed_out {
            return "timeout".to_string();
        }
        match self.exit_code {
            Some(code) => code.to_string(),
            None => "signal".to_string(),
        }
    }

    /// Short failure detail: stderr when present, stdout otherwise.
    pub fn detail(&self) -> String {
        let text = if self.stderr.trim().is_empty() {
            self.stdout.trim()
        } else {
            self.stderr.trim()
        };
        if text.is_empty() {
            return "no output".to_string();
        }
        truncate_string(text, MAX_DETAIL_BYTES)
    }
}

/// Run `cmd` to completion with stdout/stderr captured.
///
/// Output goes to anonymous temp files rather than pipes so a chatty child
/// cannot block on a full pipe while we poll for the deadline. When the
/// timeout elapses the child is killed and `timed_out` is set.
pub fn run_captured(mut cmd: Command, timeout: Option<Duration>) -> Result<CommandOutput> {
    let command_line = render_command_line(&cmd);
    let mut stdout_file = tempfile::tempfile().context("create stdout capture file")?;
    let mut stderr_file = tempfile::tempfile().context("create stderr capture file")?;
    cmd.stdin(Stdio::null())
        .stdout(Stdio::from(
            stdout_file.try_clone().context("clone stdout capture")?,
        ))
        .stderr(Stdio::from(
            stderr_file.try_clone().context("clone stderr capture")?,
        ));

    tracing::debug!(command = %command_line, "spawn");
    let start = Instant::now();
    let mut child = cmd
        .spawn()
        .with_context(|| format!("spawn {command_line}"))?;
    let mut timed_out = false;

    let status = match timeout {
        None => child.wait().context("wait for child")?,
        Some(limit) => loop {
            if let Some(status) = child.try_wait().context("check child status")? {
                break status;
            }
            if start.elapsed() > limit {
                timed_out = true;
                let _ = child.kill();
                break child.wait().context("reap timed-out child")?;
            }
            std::thread::sleep(POLL_INTERVAL);
        },
    };

    let duration_ms = start.elapsed().as_millis();
    let output = CommandOutput {
        command_line,
        exit_code: if timed_out { None } else { status.code() },
        timed_out,
        stdout: read_capture(&mut stdout_file).context("read stdout capture")?,
        stderr: read_capture(&mut stderr_file).context("read stderr capture")?,
        duration_ms,
    };
    tracing::debug!(
        command = %output.command_line,
        exit = %output.exit_display(),
        duration_ms,
        "command finished"
    );
    Ok(output)
}

fn read_capture(file: &mut File) -> Result<String> {
    file.seek(SeekFrom::Start(0))?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)?;
    Ok(String::from_utf8_lossy(&bytes).to_string())
}

fn render_command_line(cmd: &Command) -> String {
    let mut argv = vec![cmd.get_program().to_string_lossy().to_string()];
    argv.extend(cmd.get_args().map(|arg| arg.to_string_lossy().to_string()));
    shell_words::join(argv)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn captures_stdout_stderr_and_exit_code() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "echo out; echo err >&2; exit 3"]);
        let output = run_captured(cmd, Some(Duration::from_secs(10))).expect("run sh");
        assert_eq!(output.exit_code, Some(3));
        assert!(!output.success());
        assert_eq!(output.stdout.trim(), "out");
        assert_eq!(output.detail(), "err");
        assert_eq!(output.command_line, "sh -c 'echo out; echo err >&2; exit 3'");
    }

    #[test]
    fn kills_child_after_timeout() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "sleep 5"]);
        let output = run_captured(cmd, Some(Duration::from_millis(100))).expect("run sleep");
        assert!(output.timed_out);
        assert_eq!(output.exit_display(), "timeout");
        assert!(output.duration_ms < 5_000);
    }

    #[test]
    fn environment_values_stay_out_of_the_command_line() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "printf %s \"$LABSTACK_TEST_SECRET\""])
            .env("LABSTACK_TEST_SECRET", "hunter2");
        let output = run_captured(cmd, None).expect("run sh");
        assert!(output.success());
        assert_eq!(output.stdout, "hunter2");
        assert!(!output.command_line.contains("hunter2"));
    }
}
