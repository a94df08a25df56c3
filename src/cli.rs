//! CLI argument parsing for the bootstrap run.
//!
//! The CLI is intentionally flat: one invocation brings the whole stack up,
//! and every templated parameter beyond these flags comes from `LABSTACK_*`
//! environment variables.
use clap::Parser;
use std::path::PathBuf;

/// Root CLI entrypoint.
#[derive(Parser, Debug, Clone, Default)]
#[command(
    name = "labstack",
    version,
    about = "Provision and start the broker + flow engine + gateway lab stack",
    after_help = "Environment:\n  LABSTACK_PROJECT_ROOT, LABSTACK_RUNTIME, LABSTACK_COMPOSE, LABSTACK_*_IMAGE,\n  LABSTACK_*_PORT, LABSTACK_HEALTH_ATTEMPTS, LABSTACK_HEALTH_DELAY_SECS,\n  LABSTACK_ONESHOT_TIMEOUT_SECS and friends override every templated value.\n\nExamples:\n  labstack\n  labstack --fresh --debug\n  LABSTACK_RUNTIME=podman labstack --project-root /srv/lab"
)]
pub struct RootArgs {
    /// Wipe all persistent service storage before starting
    #[arg(long, visible_alias = "refresh")]
    pub fresh: bool,

    /// Project root holding secrets, rendered config and run logs
    #[arg(long, value_name = "PATH")]
    pub project_root: Option<PathBuf>,

    /// Emit verbose tracing (debug level)
    #[arg(long)]
    pub debug: bool,

    /// Reuse locally present images instead of pulling
    #[arg(long)]
    pub skip_pull: bool,
}
