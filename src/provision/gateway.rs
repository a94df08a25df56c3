use crate::error::BootstrapError;
use crate::runtime::{ContainerRuntime, Mount, OneShot};
use crate::stack::{Config, ProjectPaths};
use anyhow::{Context, Result};

const SCRIPT_NAME: &str = "auto-startup.cfg";
const STAMP_VAR: &str = "LABSTACK_RUN_STAMP";

/// What the seed helper did to the startup script inside the volume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SeedOutcome {
    Seeded,
    Unchanged,
    /// The in-volume copy differed; it was saved under `backup` first.
    Updated { backup: String },
}

/// Compare `/src` against `/cfg` inside the helper. A differing volume copy
/// is backed up as `<name>.bak.<stamp>` (with a counter when that name is
/// taken) before the rendered script replaces it.
fn seed_script() -> String {
    format!(
        r#"src=/src/{SCRIPT_NAME}; dst=/cfg/{SCRIPT_NAME}
if [ ! -f "$dst" ]; then
  cp "$src" "$dst" && echo seeded
elif [ "$(cat "$src")" = "$(cat "$dst")" ]; then
  echo unchanged
else
  bak="$dst.bak.${STAMP_VAR}"; n=1
  while [ -e "$bak" ]; do bak="$dst.bak.${STAMP_VAR}.$n"; n=$((n+1)); done
  cp -p "$dst" "$bak" && cp "$src" "$dst" && echo "updated $bak"
fi"#
    )
}

fn parse_outcome(stdout: &str) -> Option<SeedOutcome> {
    let line = stdout.lines().map(str::trim).rfind(|line| !line.is_empty())?;
    match line.split_once(' ') {
        Some(("updated", backup)) => Some(SeedOutcome::Updated {
            backup: backup.to_string(),
        }),
        None if line == "seeded" => Some(SeedOutcome::Seeded),
        None if line == "unchanged" => Some(SeedOutcome::Unchanged),
        _ => None,
    }
}

/// Bring the gateway config volume's startup script in line with the
/// rendered one, keeping the previous in-volume copy when it is replaced.
pub fn seed_startup_script(
    runtime: &dyn ContainerRuntime,
    config: &Config,
    paths: &ProjectPaths,
    run_stamp: &str,
) -> Result<SeedOutcome> {
    let volume = config
        .volume("gateway-config")
        .context("gateway config volume is not declared")?;
    let source = paths.gateway_config_dir();
    let spec = OneShot::shell(
        "gateway-seed",
        &config.gateway.image,
        &seed_script(),
        config.oneshot_timeout,
    )
    .user("0")
    .env(STAMP_VAR, run_stamp)
    .mount(Mount::ro(source.display().to_string(), "/src"))
    .mount(Mount::rw(&volume.name, "/cfg"));

    let output = runtime
        .run_one_shot(&spec)
        .context("seed gateway startup script")?;
    let outcome = if output.success() {
        parse_outcome(&output.stdout)
    } else {
        None
    };
    let Some(outcome) = outcome else {
        return Err(BootstrapError::CommandFailed {
            step: "seed gateway startup script".to_string(),
            exit: output.exit_display(),
            detail: output.detail(),
        }
        .into());
    };
    match &outcome {
        SeedOutcome::Updated { backup } => tracing::info!(
            volume = %volume.name,
            backup = %backup,
            "gateway startup script replaced"
        ),
        _ => tracing::info!(volume = %volume.name, outcome = ?outcome, "gateway startup script in place"),
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::RootArgs;
    use crate::runtime::fake::FakeRuntime;
    use std::fs;
    use std::path::Path;

    fn config(root: &Path) -> Config {
        let args = RootArgs {
            project_root: Some(root.to_path_buf()),
            ..RootArgs::default()
        };
        Config::from_env(&args, |_| None).expect("config")
    }

    #[test]
    fn helper_mounts_host_dir_read_only_and_volume_read_write() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = config(dir.path());
        let paths = ProjectPaths::new(config.project_root.clone());
        fs::create_dir_all(paths.gateway_config_dir()).expect("mkdir");
        fs::write(paths.gateway_script_path(), "web-mgmt 0.0.0.0 9090\n").expect("script");
        let runtime = FakeRuntime::new();

        let outcome = seed_startup_script(&runtime, &config, &paths, "20260101-120000").expect("seed");

        assert_eq!(outcome, SeedOutcome::Seeded);
        let shot = runtime.one_shots().pop().expect("one-shot");
        assert_eq!(
            shot.mounts,
            vec![
                Mount::ro(paths.gateway_config_dir().display().to_string(), "/src"),
                Mount::rw("labstack_gateway-config", "/cfg"),
            ]
        );
        assert_eq!(shot.user.as_deref(), Some("0"));
        assert_eq!(
            shot.env,
            vec![(STAMP_VAR.to_string(), "20260101-120000".to_string())]
        );
    }

    #[test]
    fn changed_script_replaces_volume_copy_and_keeps_backup() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = config(dir.path());
        let paths = ProjectPaths::new(config.project_root.clone());
        fs::create_dir_all(paths.gateway_config_dir()).expect("mkdir");
        let runtime = FakeRuntime::new();

        fs::write(paths.gateway_script_path(), "web-mgmt 0.0.0.0 9090\n").expect("first");
        seed_startup_script(&runtime, &config, &paths, "20260101-120000").expect("seed");
        assert_eq!(
            seed_startup_script(&runtime, &config, &paths, "20260101-120500").expect("again"),
            SeedOutcome::Unchanged
        );

        fs::write(paths.gateway_script_path(), "web-mgmt 0.0.0.0 9191\n").expect("second");
        let outcome = seed_startup_script(&runtime, &config, &paths, "20260101-130000").expect("update");

        assert_eq!(
            outcome,
            SeedOutcome::Updated {
                backup: "/cfg/auto-startup.cfg.bak.20260101-130000".to_string()
            }
        );
        let volume = "labstack_gateway-config";
        assert_eq!(
            runtime.volume_file_content(volume, "auto-startup.cfg").as_deref(),
            Some("web-mgmt 0.0.0.0 9191\n")
        );
        assert_eq!(
            runtime
                .volume_file_content(volume, "auto-startup.cfg.bak.20260101-130000")
                .as_deref(),
            Some("web-mgmt 0.0.0.0 9090\n")
        );
    }

    #[test]
    fn helper_output_is_parsed_from_the_last_line() {
        assert_eq!(parse_outcome("seeded\n"), Some(SeedOutcome::Seeded));
        assert_eq!(parse_outcome("noise\nunchanged\n\n"), Some(SeedOutcome::Unchanged));
        assert_eq!(
            parse_outcome("updated /cfg/auto-startup.cfg.bak.s.1\n"),
            Some(SeedOutcome::Updated {
                backup: "/cfg/auto-startup.cfg.bak.s.1".to_string()
            })
        );
        assert_eq!(parse_outcome(""), None);
        assert_eq!(parse_outcome("cp: permission denied"), None);
    }

    #[test]
    fn backup_name_is_not_reused_within_the_volume() {
        let script = seed_script();
        assert!(script.contains("while [ -e \"$bak\" ]"));
        assert!(script.contains("$LABSTACK_RUN_STAMP"));
    }
}
