//! Application context and command dispatch
//!
//! Everything the commands share (paths, configuration, the optimizer and
//! the console) is built once in [`AppContext::new`] and passed around
//! explicitly.

pub mod cli;
mod output;

pub use cli::{Args, Command};
pub use output::ConsoleOutput;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::config::Config;
use crate::constants::{
    APP_VERSION, CONFIG_FILE, DISPLAY_NAME, RESTORE_STATE_FILE, WHITELIST_FILE,
};
use crate::optimizer::classifier::write_default_file;
use crate::optimizer::{
    ExplicitProcessClassifier, FileLedger, OptimizeConditions, Optimizer, OutputSink,
};
use crate::system::{self, admin};

/// Files the application reads and writes, all in one directory.
#[derive(Debug, Clone)]
pub struct DataPaths {
    pub whitelist: PathBuf,
    pub config: PathBuf,
    pub ledger: PathBuf,
}

impl DataPaths {
    pub fn new(dir: &Path) -> Self {
        Self {
            whitelist: dir.join(WHITELIST_FILE),
            config: dir.join(CONFIG_FILE),
            ledger: dir.join(RESTORE_STATE_FILE),
        }
    }
}

pub struct AppContext {
    paths: DataPaths,
    config: Config,
    output: Arc<ConsoleOutput>,
    optimizer: Optimizer,
}

impl AppContext {
    pub fn new(data_dir: &Path) -> Result<Self> {
        let paths = DataPaths::new(data_dir);
        let config = Config::load_or_create(&paths.config).context("Failed to load configuration")?;
        let ledger = FileLedger::open(&paths.ledger).context("Failed to open restore records")?;
        log::debug!("Restore records in {}", ledger.path().display());
        let output = Arc::new(ConsoleOutput);

        let optimizer = Optimizer::new(
            system::default_provider(),
            Box::new(ExplicitProcessClassifier::new(&paths.whitelist)),
            Box::new(ledger),
            output.clone(),
        )
        .with_settings(config.optimizer_settings());

        Ok(Self {
            paths,
            config,
            output,
            optimizer,
        })
    }

    pub fn run(&mut self, command: &Command, no_delay: bool) -> Result<()> {
        match command {
            Command::Optimize(args) => self.optimize(args.conditions(), no_delay),
            Command::Restore { force } => self.restore(*force),
            Command::Status => {
                self.status();
                Ok(())
            }
            Command::ToggleErrors => self.toggle_errors(),
            Command::Init => self.init(),
        }
    }

    fn optimize(&self, flags: OptimizeConditions, no_delay: bool) -> Result<()> {
        if !admin::is_elevated() {
            self.output.output_highlight(
                "Not running as Administrator: some processes cannot be changed. \
                 Run as Administrator for the best results.",
            );
        }

        if !no_delay && self.config.optimize_delay_ms > 0 {
            self.output.output(&format!(
                "Optimizing in {} ms, switch to your game now...",
                self.config.optimize_delay_ms
            ));
            thread::sleep(Duration::from_millis(self.config.optimize_delay_ms));
        }

        let count = self
            .optimizer
            .optimize(flags)
            .context("Optimize failed")?;
        self.output
            .output_highlight(&format!("{} optimizations performed.", count));
        Ok(())
    }

    fn restore(&self, force: bool) -> Result<()> {
        if force {
            let count = self
                .optimizer
                .force_restore_to_normal()
                .context("Force restore failed")?;
            self.output
                .output_highlight(&format!("{} processes reset to normal.", count));
        } else {
            let count = self.optimizer.restore().context("Restore failed")?;
            self.output
                .output_highlight(&format!("{} restore operations completed.", count));
        }
        Ok(())
    }

    fn status(&self) {
        self.output
            .output(&format!("{} {}", DISPLAY_NAME, APP_VERSION));
        self.output.output(&format!(
            "Running as: {}",
            admin::elevation_status_string()
        ));

        if self.optimizer.is_optimized() {
            self.output.output_highlight(&format!(
                "Optimized: {} changes can be restored.",
                self.optimizer.pending_changes()
            ));
        } else {
            self.output.output("Not optimized.");
        }

        self.output.output(&format!(
            "Verbose errors: {}",
            if self.optimizer.verbose_errors() { "on" } else { "off" }
        ));
    }

    fn toggle_errors(&mut self) -> Result<()> {
        let enabled = self.optimizer.toggle_verbose_errors();
        self.config.verbose_errors = enabled;
        self.config
            .save(&self.paths.config)
            .context("Failed to save configuration")?;

        self.output.output(&format!(
            "Verbose errors are now {}.",
            if enabled { "on" } else { "off" }
        ));
        Ok(())
    }

    fn init(&self) -> Result<()> {
        let created = write_default_file(&self.paths.whitelist)
            .context("Failed to write the default whitelist")?;

        let whitelist = self.paths.whitelist.display();
        if created {
            self.output.output(&format!("Wrote {}", whitelist));
        } else {
            self.output.output(&format!("{} already exists", whitelist));
        }
        self.output
            .output(&format!("Configuration: {}", self.paths.config.display()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_context_creates_data_files() {
        let dir = TempDir::new().unwrap();
        let mut context = AppContext::new(dir.path()).unwrap();

        assert!(dir.path().join(CONFIG_FILE).exists());
        assert!(dir.path().join(RESTORE_STATE_FILE).exists());

        context.run(&Command::Init, true).unwrap();
        assert!(dir.path().join(WHITELIST_FILE).exists());
    }

    #[test]
    fn test_toggle_errors_is_persisted() {
        let dir = TempDir::new().unwrap();
        let mut context = AppContext::new(dir.path()).unwrap();
        context.run(&Command::ToggleErrors, true).unwrap();

        let config = Config::load_or_create(&dir.path().join(CONFIG_FILE)).unwrap();
        assert!(config.verbose_errors);

        let reopened = AppContext::new(dir.path()).unwrap();
        assert!(reopened.optimizer.verbose_errors());
    }

    #[test]
    fn test_restore_without_session_succeeds() {
        let dir = TempDir::new().unwrap();
        let mut context = AppContext::new(dir.path()).unwrap();
        context
            .run(&Command::Restore { force: false }, true)
            .unwrap();
        assert!(!context.optimizer.is_optimized());
    }
}
