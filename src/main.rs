use anyhow::Result;
use clap::Parser;

mod artifacts;
mod cli;
mod error;
mod launch;
mod logging;
mod provision;
mod runtime;
mod stack;
mod templates;
mod util;
mod workflow;

use crate::cli::RootArgs;
use crate::error::EXIT_FATAL;
use crate::provision::OsRandom;
use crate::runtime::CliRuntime;
use crate::stack::{resolve_project_root, Config, ProjectPaths};
use crate::workflow::{preflight, Bootstrapper};

fn env_lookup(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

fn main() {
    let args = RootArgs::parse();
    let run_stamp = util::run_stamp();

    let log_path = resolve_project_root(&args, env_lookup)
        .ok()
        .map(|root| ProjectPaths::new(root).run_log_path(&run_stamp));
    if let Err(err) = logging::init_logging(log_path.as_deref(), args.debug) {
        eprintln!("error: {err:#}");
        std::process::exit(EXIT_FATAL);
    }

    if let Err(err) = run(&args, &run_stamp) {
        tracing::error!("bootstrap failed: {err:#}");
        std::process::exit(EXIT_FATAL);
    }
}

fn run(args: &RootArgs, run_stamp: &str) -> Result<()> {
    let config = Config::from_env(args, env_lookup)?;
    tracing::info!(
        root = %config.project_root.display(),
        project = %config.project_name,
        runtime = %config.runtime.binary,
        fresh = config.fresh,
        debug = config.debug,
        run_stamp,
        "starting bootstrap"
    );
    preflight(&config)?;

    let paths = ProjectPaths::new(config.project_root.clone());
    let runtime = CliRuntime::new(&config, &paths);
    let generator = OsRandom::default();
    let report = Bootstrapper::new(&config, &runtime, &generator, run_stamp).run()?;
    tracing::info!(
        report = %paths.report_path().display(),
        volumes = report.volumes.len(),
        "bootstrap complete"
    );
    Ok(())
}
