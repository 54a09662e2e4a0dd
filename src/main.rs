//! Game Optimizer CLI
//!
//! Lowers the scheduling priority of background processes, optionally
//! boosts whitelisted ones and moves games onto dedicated CPU cores, and
//! restores everything afterwards from a crash-safe record of each change.
//!
//! Commands:
//! - optimize: apply an optimize pass (see `optimize --help` for flags)
//! - restore: undo the last pass (`--force` resets everything to Normal)
//! - status: show whether the system is optimized
//! - toggle-errors: show or hide per-process failures
//! - init: write the default whitelist and configuration

mod app;
mod config;
mod constants;
#[cfg(windows)]
mod ffi;
mod optimizer;
mod system;

use anyhow::{Context, Result};
use clap::Parser;

use app::{AppContext, Args};

fn init_logging(debug: bool) {
    let level = if debug {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Warn
    };

    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.debug);

    let data_dir = match &args.data_dir {
        Some(dir) => dir.clone(),
        None => std::env::current_dir().context("Failed to read the current directory")?,
    };
    log::debug!("Using data directory {}", data_dir.display());

    let mut context = AppContext::new(&data_dir)?;
    context.run(&args.command, args.no_delay)
}
