//! Best-effort ownership and mode fixes for container-mounted storage.
//!
//! Images run as fixed non-root users while fresh volumes and host
//! directories belong to whoever created them. The runtime identity is read
//! from the image itself so image updates that change the internal user are
//! picked up. Nothing in here fails the run; problems are logged as warnings.
use crate::runtime::{run_captured, ContainerRuntime, Mount, OneShot};
use crate::stack::{FixOutcome, ServiceIdentity};
use crate::util::octal_mode;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

const VOLUME_MOUNT_POINT: &str = "/target";
const SELINUX_ENFORCE: &str = "/sys/fs/selinux/enforce";

/// Storage whose ownership should match a container identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Named volume, fixed from inside a helper run of `image` as root.
    Volume { name: String, image: String },
    HostPath(PathBuf),
}

impl Target {
    pub fn describe(&self) -> String {
        match self {
            Target::Volume { name, .. } => format!("volume:{name}"),
            Target::HostPath(path) => path.display().to_string(),
        }
    }
}

/// Parse the output of `id -u; id -g`.
pub fn parse_identity(stdout: &str) -> Option<ServiceIdentity> {
    let mut numbers = stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| line.parse::<u32>());
    let uid = numbers.next()?.ok()?;
    let gid = numbers.next()?.ok()?;
    if numbers.next().is_some() {
        return None;
    }
    Some(ServiceIdentity { uid, gid })
}

pub fn is_root() -> bool {
    // SAFETY: geteuid has no preconditions and cannot fail.
    unsafe { libc::geteuid() == 0 }
}

pub struct OwnershipFixer<'a> {
    runtime: &'a dyn ContainerRuntime,
    timeout: Option<Duration>,
}

impl<'a> OwnershipFixer<'a> {
    pub fn new(runtime: &'a dyn ContainerRuntime, timeout: Option<Duration>) -> Self {
        Self { runtime, timeout }
    }

    /// Read the uid/gid `image` runs as, falling back when the probe fails.
    pub fn probe_identity(
        &self,
        label: &str,
        image: &str,
        fallback: ServiceIdentity,
    ) -> ServiceIdentity {
        let spec = OneShot::shell(
            &format!("identity-{label}"),
            image,
            "id -u; id -g",
            self.timeout,
        );
        let output = match self.runtime.run_one_shot(&spec) {
            Ok(output) => output,
            Err(err) => {
                tracing::warn!(
                    image,
                    error = %format!("{err:#}"),
                    %fallback,
                    "identity probe failed; using fallback"
                );
                return fallback;
            }
        };
        if !output.success() {
            tracing::warn!(
                image,
                exit = %output.exit_display(),
                detail = %output.detail(),
                %fallback,
                "identity probe failed; using fallback"
            );
            return fallback;
        }
        match parse_identity(&output.stdout) {
            Some(identity) => {
                tracing::info!(image, %identity, "runtime identity");
                identity
            }
            None => {
                tracing::warn!(
                    image,
                    stdout = %output.stdout.trim(),
                    %fallback,
                    "unrecognized identity probe output; using fallback"
                );
                fallback
            }
        }
    }

    /// Apply `identity` and `mode` to `target`. Never fails the run.
    pub fn fix_ownership(
        &self,
        target: &Target,
        identity: ServiceIdentity,
        mode: u32,
    ) -> FixOutcome {
        let outcome = match target {
            Target::Volume { name, image } => self.fix_volume(name, image, identity, mode),
            Target::HostPath(path) => fix_host_path(path, identity, mode),
        };
        match &outcome {
            FixOutcome::Applied => tracing::info!(
                target = %target.describe(),
                %identity,
                mode = %octal_mode(mode),
                "ownership fixed"
            ),
            FixOutcome::Skipped { reason } => tracing::debug!(
                target = %target.describe(),
                reason = %reason,
                "ownership left unchanged"
            ),
            FixOutcome::Failed { reason } => tracing::warn!(
                target = %target.describe(),
                %identity,
                reason = %reason,
                "ownership fix failed; the container may hit permission errors"
            ),
        }
        outcome
    }

    fn fix_volume(
        &self,
        name: &str,
        image: &str,
        identity: ServiceIdentity,
        mode: u32,
    ) -> FixOutcome {
        let script = format!(
            "chown -R {}:{} {VOLUME_MOUNT_POINT} && chmod {} {VOLUME_MOUNT_POINT}",
            identity.uid,
            identity.gid,
            octal_mode(mode)
        );
        let spec = OneShot::shell(&format!("chown-{name}"), image, &script, self.timeout)
            .user("0")
            .mount(Mount::rw(name, VOLUME_MOUNT_POINT));
        match self.runtime.run_one_shot(&spec) {
            Ok(output) if output.success() => FixOutcome::Applied,
            Ok(output) => FixOutcome::Failed {
                reason: format!("exit {}: {}", output.exit_display(), output.detail()),
            },
            Err(err) => FixOutcome::Failed {
                reason: format!("{err:#}"),
            },
        }
    }
}

fn fix_host_path(path: &Path, identity: ServiceIdentity, mode: u32) -> FixOutcome {
    if let Err(err) = fs::set_permissions(path, fs::Permissions::from_mode(mode)) {
        return FixOutcome::Failed {
            reason: format!("chmod {}: {err}", octal_mode(mode)),
        };
    }
    if !is_root() {
        // Bind-mounted inputs only need to be readable; ownership changes
        // require root on the host.
        return FixOutcome::Skipped {
            reason: "mode applied; ownership unchanged because not running as root".to_string(),
        };
    }
    match std::os::unix::fs::chown(path, Some(identity.uid), Some(identity.gid)) {
        Ok(()) => FixOutcome::Applied,
        Err(err) => FixOutcome::Failed {
            reason: format!("chown {identity}: {err}"),
        },
    }
}

/// Best-effort SELinux relabel so bind-mounted host paths are readable from
/// containers. Skipped when SELinux is not enforcing or `chcon` is missing.
pub fn relabel_for_containers(path: &Path) -> FixOutcome {
    let enforcing = fs::read_to_string(SELINUX_ENFORCE)
        .map(|text| text.trim() == "1")
        .unwrap_or(false);
    if !enforcing {
        return FixOutcome::Skipped {
            reason: "SELinux not enforcing".to_string(),
        };
    }
    let chcon = match which::which("chcon") {
        Ok(path) => path,
        Err(_) => {
            tracing::warn!(path = %path.display(), "SELinux enforcing but chcon not found; skipping relabel");
            return FixOutcome::Skipped {
                reason: "chcon not found".to_string(),
            };
        }
    };
    let mut cmd = Command::new(chcon);
    cmd.args(["-R", "-t", "container_file_t"]).arg(path);
    match run_captured(cmd, Some(Duration::from_secs(30))) {
        Ok(output) if output.success() => {
            tracing::info!(path = %path.display(), "relabeled for container access");
            FixOutcome::Applied
        }
        Ok(output) => {
            let reason = format!("exit {}: {}", output.exit_display(), output.detail());
            tracing::warn!(path = %path.display(), reason = %reason, "SELinux relabel failed");
            FixOutcome::Failed { reason }
        }
        Err(err) => {
            let reason = format!("{err:#}");
            tracing::warn!(path = %path.display(), reason = %reason, "SELinux relabel failed");
            FixOutcome::Failed { reason }
        }
    }
}
