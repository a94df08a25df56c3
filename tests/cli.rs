//! End-to-end checks of the built binary's argument handling and exit codes.
use std::process::Command;

fn labstack() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_labstack"));
    for (key, _) in std::env::vars() {
        if key.starts_with("LABSTACK_") {
            cmd.env_remove(key);
        }
    }
    cmd.env_remove("RUST_LOG");
    cmd
}

#[test]
fn help_lists_flags_and_exits_zero() {
    let output = labstack().arg("--help").output().expect("run labstack");
    assert_eq!(output.status.code(), Some(0));
    let stdout = String::from_utf8_lossy(&output.stdout);
    for flag in ["--fresh", "--project-root", "--debug"] {
        assert!(stdout.contains(flag), "missing {flag} in:\n{stdout}");
    }
    assert!(stdout.contains("refresh"));
}

#[test]
fn unknown_flag_exits_two() {
    let output = labstack().arg("--bogus").output().expect("run labstack");
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn invalid_port_exits_one_before_touching_the_runtime() {
    let dir = tempfile::tempdir().expect("tempdir");
    let output = labstack()
        .arg("--project-root")
        .arg(dir.path())
        .env("LABSTACK_BROKER_LISTENER_PORT", "0")
        .env("LABSTACK_RUNTIME", "labstack-no-such-runtime")
        .output()
        .expect("run labstack");
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("LABSTACK_BROKER_LISTENER_PORT"), "{stderr}");
    assert!(!dir.path().join("compose.yaml").exists());
}

#[test]
fn missing_runtime_exits_one() {
    let dir = tempfile::tempdir().expect("tempdir");
    let output = labstack()
        .arg("--project-root")
        .arg(dir.path())
        .env("LABSTACK_RUNTIME", "labstack-no-such-runtime")
        .output()
        .expect("run labstack");
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("labstack-no-such-runtime"), "{stderr}");
    assert!(!dir.path().join("secrets").exists());
}
