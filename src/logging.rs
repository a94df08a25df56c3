//! Console and per-run log file output.
use anyhow::{Context, Result};
use std::fs::{self, File};
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn default_directives(debug: bool) -> &'static str {
    if debug {
        "labstack=debug"
    } else {
        "labstack=info"
    }
}

fn open_log_file(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    File::create(path).with_context(|| format!("create {}", path.display()))
}

/// Install the global subscriber. `RUST_LOG` wins over `--debug`.
///
/// The run log at `log_path` mirrors the console without ANSI colors; when it
/// cannot be opened the run continues with console output only.
pub fn init_logging(log_path: Option<&Path>, debug: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(debug)));

    let (file, file_error) = match log_path.map(open_log_file) {
        Some(Ok(file)) => (Some(file), None),
        Some(Err(err)) => (None, Some(err)),
        None => (None, None),
    };
    let file_layer = file.map(|file| {
        fmt::layer()
            .with_ansi(false)
            .with_target(false)
            .with_writer(Mutex::new(file))
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .with(file_layer)
        .try_init()
        .context("install tracing subscriber")?;

    if let Some(err) = file_error {
        tracing::warn!(error = %format!("{err:#}"), "run log disabled");
    } else if let Some(path) = log_path {
        tracing::debug!(path = %path.display(), "run log opened");
    }
    Ok(())
}
