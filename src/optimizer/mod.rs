//! Optimizer module - the optimize / restore state machine
//!
//! An optimize pass walks every running process once, lowering or raising
//! its priority class and moving it between core sets according to the
//! given [`OptimizeConditions`]. Before each mutation is applied the previous
//! value is read, and right after it is applied an undo record is written to
//! the [`ChangeLedger`], so [`Optimizer::restore`] can put everything back
//! even after a crash.

pub mod affinity;
pub mod bitmask;
pub mod classifier;
pub mod conditions;
pub mod ledger;
pub mod record;

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;

use crate::constants::{EXEMPT_PROCESS, SHELL_PROCESS};
use crate::system::affinity::format_affinity;
use crate::system::{
    shell, Priority, ProcessError, ProcessHandle, ProcessProvider, ProcessorTopology,
};

pub use affinity::PerformancePreference;
pub use bitmask::BitMaskError;
pub use classifier::{ClassifierError, ExplicitProcessClassifier, ProcessClassifier};
pub use conditions::OptimizeConditions;
pub use ledger::{ChangeLedger, FileLedger, LedgerError};
pub use record::{LedgerRecord, ProcessStateChange, RecordError};

#[derive(Debug, Error)]
pub enum OptimizerError {
    #[error("the system is already optimized, restore it first")]
    AlreadyOptimized,

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("could not encode restore record: {0}")]
    Record(#[from] RecordError),

    #[error("could not list running processes: {0}")]
    Snapshot(#[source] ProcessError),

    #[error(transparent)]
    Classifier(#[from] ClassifierError),

    #[error("invalid affinity mask: {0}")]
    Mask(#[from] BitMaskError),
}

/// Where user-facing optimizer messages go.
pub trait OutputSink: Send + Sync {
    fn output(&self, message: &str);

    fn output_highlight(&self, message: &str);

    fn output_error(&self, message: &str);
}

/// Starts the Windows shell again after a session that killed it.
pub type ShellLauncher = Box<dyn Fn() -> io::Result<()> + Send + Sync>;

/// Tunables that do not change between passes.
#[derive(Debug, Clone, Default)]
pub struct OptimizerSettings {
    pub preference: PerformancePreference,
    /// Executables that stay on the streamer cores in streamer mode
    pub streamer_executables: Vec<String>,
    /// Logical cores reserved for streaming software
    pub streamer_cores: Option<Vec<u32>>,
    pub verbose_errors: bool,
}

impl OptimizerSettings {
    fn streamer_cores(&self) -> Option<&[u32]> {
        match self.streamer_cores.as_deref() {
            Some(cores) if !cores.is_empty() && !self.streamer_executables.is_empty() => {
                Some(cores)
            }
            _ => None,
        }
    }
}

struct OptimizerState {
    classifier: Box<dyn ProcessClassifier>,
    ledger: Box<dyn ChangeLedger>,
    is_optimized: bool,
    /// Flags of the session the ledger belongs to
    session_flags: OptimizeConditions,
}

/// Masks for one optimize pass, computed before any process is touched.
#[derive(Debug, Clone, Copy)]
struct CoreSplit {
    /// Cores games (or streaming software) run on
    reserved: usize,
    /// Cores everything else runs on
    rest: usize,
}

pub struct Optimizer {
    provider: Box<dyn ProcessProvider>,
    topology: ProcessorTopology,
    output: Arc<dyn OutputSink>,
    settings: OptimizerSettings,
    verbose_errors: AtomicBool,
    launch_shell: ShellLauncher,
    state: Mutex<OptimizerState>,
}

impl Optimizer {
    /// Creates an optimizer over an existing ledger.
    ///
    /// A non-empty ledger means a previous session was never restored, so
    /// the optimizer starts out optimized.
    pub fn new(
        provider: Box<dyn ProcessProvider>,
        classifier: Box<dyn ProcessClassifier>,
        ledger: Box<dyn ChangeLedger>,
        output: Arc<dyn OutputSink>,
    ) -> Self {
        let is_optimized = ledger.count() > 0;
        let session_flags = read_records(ledger.as_ref())
            .iter()
            .find_map(LedgerRecord::session_flags)
            .unwrap_or_default();

        if is_optimized {
            log::info!(
                "Found {} restore records from an earlier session",
                ledger.count()
            );
        }

        Self {
            provider,
            topology: ProcessorTopology::default(),
            output,
            settings: OptimizerSettings::default(),
            verbose_errors: AtomicBool::new(false),
            launch_shell: Box::new(shell::relaunch_shell),
            state: Mutex::new(OptimizerState {
                classifier,
                ledger,
                is_optimized,
                session_flags,
            }),
        }
    }

    pub fn with_settings(mut self, settings: OptimizerSettings) -> Self {
        self.verbose_errors = AtomicBool::new(settings.verbose_errors);
        self.settings = settings;
        self
    }

    pub fn with_topology(mut self, topology: ProcessorTopology) -> Self {
        self.topology = topology;
        self
    }

    pub fn with_shell_launcher(mut self, launch_shell: ShellLauncher) -> Self {
        self.launch_shell = launch_shell;
        self
    }

    pub fn is_optimized(&self) -> bool {
        self.state.lock().is_optimized
    }

    /// Number of process changes waiting to be restored.
    pub fn pending_changes(&self) -> usize {
        read_records(self.state.lock().ledger.as_ref())
            .iter()
            .filter(|record| matches!(record, LedgerRecord::Change(_)))
            .count()
    }

    pub fn verbose_errors(&self) -> bool {
        self.verbose_errors.load(Ordering::Relaxed)
    }

    /// Flips per-process error reporting and returns the new setting.
    pub fn toggle_verbose_errors(&self) -> bool {
        !self.verbose_errors.fetch_xor(true, Ordering::Relaxed)
    }

    fn all_cores(&self) -> Result<usize, BitMaskError> {
        affinity::all_cores_mask(self.topology.logical_processor_count())
    }

    fn affinity_split(&self) -> Result<CoreSplit, BitMaskError> {
        let layout = self.topology.current_layout();
        let preference = self.settings.preference;
        let split = CoreSplit {
            reserved: affinity::optimal_affinity_mask(layout, preference, true)?,
            rest: affinity::optimal_affinity_mask(layout, preference, false)?,
        };

        debug_assert!(bitmask::logical_binary_complement(
            &bitmask::padded_binary(split.reserved),
            &bitmask::padded_binary(split.rest)
        )
        .unwrap_or(false));
        log::debug!(
            "Game cores {}, other cores {}",
            bitmask::padded_binary(split.reserved),
            bitmask::padded_binary(split.rest)
        );
        Ok(split)
    }

    fn streamer_split(&self, cores: &[u32]) -> Result<CoreSplit, BitMaskError> {
        let available = self.topology.logical_processor_count();
        Ok(CoreSplit {
            reserved: affinity::affinity_mask_from_cores(cores, available, false)?,
            rest: affinity::affinity_mask_from_cores(cores, available, true)?,
        })
    }

    /// Runs one optimize pass and returns the number of changes made.
    ///
    /// Fails with [`OptimizerError::AlreadyOptimized`] until the previous
    /// session has been restored.
    pub fn optimize(&self, flags: OptimizeConditions) -> Result<usize, OptimizerError> {
        let mut guard = self.state.lock();
        if guard.is_optimized {
            return Err(OptimizerError::AlreadyOptimized);
        }

        let streamer_split = if flags.contains(OptimizeConditions::STREAMER_MODE) {
            match self.settings.streamer_cores() {
                Some(cores) => Some(self.streamer_split(cores)?),
                None => {
                    log::warn!("Streamer mode requested without streamer configuration");
                    let skipped = if flags.contains(OptimizeConditions::OPTIMIZE_AFFINITY) {
                        "skipping all affinity changes, STREAMER_MODE still overrides \
                         OPTIMIZE_AFFINITY"
                    } else {
                        "skipping streamer affinity"
                    };
                    self.output.output_error(&format!(
                        "Streamer mode needs streamer executables and affinity cores in the \
                         configuration; {}.",
                        skipped
                    ));
                    None
                }
            }
        } else {
            None
        };

        let affinity_split = if flags.contains(OptimizeConditions::OPTIMIZE_AFFINITY)
            && !flags.intersects(
                OptimizeConditions::STREAMER_MODE | OptimizeConditions::IGNORE_ORDINARY_PROCESSES,
            ) {
            Some(self.affinity_split()?)
        } else {
            None
        };

        let all_cores = self.all_cores()?;

        let state = &mut *guard;
        state.is_optimized = true;
        state.session_flags = flags;

        log::info!("Optimizing with flags {:?}", flags);
        for conflict in flags.conflicts() {
            let message = conflict.message(flags);
            log::warn!("{}", message);
            self.output.output_error(&message);
        }

        let processes = match self.begin_session(state, flags) {
            Ok(processes) => processes,
            Err(e) => {
                // nothing was changed yet, so there is nothing to restore
                log::warn!("Optimize aborted before any process was changed: {}", e);
                if let Err(clear) = state.ledger.clear_all() {
                    log::warn!("Could not clear the session record: {}", clear);
                }
                state.is_optimized = false;
                state.session_flags = OptimizeConditions::empty();
                return Err(e);
            }
        };

        let classifier = state.classifier.as_ref();
        let mut changes = ChangeWriter {
            ledger: state.ledger.as_mut(),
            output: self.output.as_ref(),
            verbose: self.verbose_errors(),
            all_cores,
        };

        let mut optimizations = 0;
        for process in &processes {
            let process = process.as_ref();
            let name = process.name();

            if name == SHELL_PROCESS && flags.contains(OptimizeConditions::KILL_EXPLORER_EXE) {
                match process.kill() {
                    Ok(()) => {
                        optimizations += 1;
                        self.output.output(&format!("Killed '{}'.", name));
                    }
                    Err(e) => changes.report_failure(process, "kill", &e),
                }
                continue;
            }

            let exempt = name == EXEMPT_PROCESS;
            let is_game = classifier.is_game(process);
            let is_whitelisted = is_game || classifier.is_whitelisted(process);

            if is_whitelisted && !exempt && flags.contains(OptimizeConditions::BOOST_PRIORITIES) {
                if let Some(previous) = changes.change_priority(process, Priority::AboveNormal)? {
                    optimizations += 1;
                    self.output
                        .output(&format!("{} : {} -> {}", name, previous, Priority::AboveNormal));
                    self.output.output_highlight(&format!(
                        "Prioritized '{}' because it is a whitelisted process.",
                        name
                    ));
                }
            }

            if let Some(split) = streamer_split.filter(|_| !exempt) {
                let streamer_exe = self
                    .settings
                    .streamer_executables
                    .iter()
                    .any(|exe| exe == name);
                let target = if streamer_exe || !is_whitelisted || !is_game {
                    split.reserved
                } else {
                    split.rest
                };
                if changes.change_affinity(process, target)? {
                    optimizations += 1;
                }
            }

            if is_whitelisted {
                self.output.output_highlight(&format!(
                    "Did not de-prioritize: '{}' because it is a whitelisted process.",
                    name
                ));
            } else if !exempt && !flags.contains(OptimizeConditions::IGNORE_ORDINARY_PROCESSES) {
                if let Some(previous) = changes.change_priority(process, Priority::Idle)? {
                    optimizations += 1;
                    self.output
                        .output(&format!("{} : {} -> {}", name, previous, Priority::Idle));
                }
            }

            if let Some(split) = affinity_split.filter(|_| !exempt) {
                let target = if is_game { split.reserved } else { split.rest };
                if target == 0 {
                    log::debug!("No cores left for '{}', affinity unchanged", name);
                } else if changes.change_affinity(process, target)? {
                    optimizations += 1;
                }
            }
        }

        log::info!(
            "Optimize pass made {} changes across {} processes",
            optimizations,
            processes.len()
        );
        Ok(optimizations)
    }

    /// Starts a fresh ledger for `flags` and takes the process snapshot.
    /// No process is touched here.
    fn begin_session(
        &self,
        state: &mut OptimizerState,
        flags: OptimizeConditions,
    ) -> Result<Vec<Box<dyn ProcessHandle>>, OptimizerError> {
        state.ledger.clear_all()?;
        let value = LedgerRecord::session(flags).to_value()?;
        state.ledger.put(&ledger::unique_key(&value), &value)?;

        state.classifier.refresh()?;

        let mut processes = self
            .provider
            .processes()
            .map_err(OptimizerError::Snapshot)?;
        processes.sort_by(|a, b| a.name().cmp(b.name()));
        Ok(processes)
    }

    /// Undoes every recorded change and returns the number of values restored.
    ///
    /// Processes that exited since the optimize pass are skipped. The ledger
    /// is cleared afterwards even when some values could not be restored.
    pub fn restore(&self) -> Result<usize, OptimizerError> {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        let records = read_records(state.ledger.as_ref());
        let session_flags = records
            .iter()
            .find_map(LedgerRecord::session_flags)
            .unwrap_or(state.session_flags);

        if session_flags.contains(OptimizeConditions::KILL_EXPLORER_EXE) {
            self.relaunch_shell();
        }

        let pending: Vec<ProcessStateChange> = records
            .into_iter()
            .filter_map(|record| match record {
                LedgerRecord::Change(change) => Some(change),
                LedgerRecord::Session { .. } => None,
            })
            .collect();

        let mut restored = 0;
        if pending.is_empty() {
            self.output.output("No changes to restore.");
        } else {
            log::info!("Restoring {} recorded changes", pending.len());
            let all_cores = self.all_cores()?;
            let verbose = self.verbose_errors();

            for change in &pending {
                log::debug!("Restoring {}", change.to_delimited());
                let process = match self.provider.process_by_id(change.pid()) {
                    Some(process) if !process.has_exited() => process,
                    _ => {
                        log::debug!("PID {} is gone, nothing to restore", change.pid());
                        continue;
                    }
                };
                let name = process.name();

                if let Some(priority) = change.previous_priority() {
                    match process.set_priority(priority) {
                        Ok(()) => {
                            restored += 1;
                            self.output.output(&format!(
                                "Restored '{}' priority to '{}'.",
                                name, priority
                            ));
                        }
                        Err(e) => self.report_restore_failure(verbose, name, "priority", &e),
                    }
                }

                if let Some(mask) = change.previous_affinity() {
                    match process.set_affinity(mask) {
                        Ok(()) => {
                            restored += 1;
                            self.output.output(&format!(
                                "Restored '{}' affinity '{}'.",
                                name,
                                format_affinity(mask, all_cores)
                            ));
                        }
                        Err(e) => self.report_restore_failure(verbose, name, "affinity", &e),
                    }
                }
            }
        }

        state.ledger.clear_all()?;
        state.is_optimized = false;
        state.session_flags = OptimizeConditions::empty();

        log::info!("Restore completed {} operations", restored);
        Ok(restored)
    }

    /// Puts every live process back on Normal priority and all cores,
    /// ignoring the ledger, then clears it.
    ///
    /// Returns the number of processes where at least one of the two
    /// changes succeeded.
    pub fn force_restore_to_normal(&self) -> Result<usize, OptimizerError> {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        let all_cores = self.all_cores()?;
        let verbose = self.verbose_errors();
        let processes = self
            .provider
            .processes()
            .map_err(OptimizerError::Snapshot)?;

        let mut restored = 0;
        let mut failed = 0;
        for process in processes.iter().filter(|p| p.name() != EXEMPT_PROCESS) {
            let name = process.name();
            let priority = process.set_priority(Priority::Normal);
            let affinity = process.set_affinity(all_cores);

            if let Err(e) = &priority {
                self.report_restore_failure(verbose, name, "priority", e);
            }
            if let Err(e) = &affinity {
                self.report_restore_failure(verbose, name, "affinity", e);
            }

            if priority.is_ok() || affinity.is_ok() {
                restored += 1;
            } else {
                failed += 1;
            }
        }

        state.ledger.clear_all()?;
        state.is_optimized = false;
        state.session_flags = OptimizeConditions::empty();

        if failed > 0 {
            log::warn!("Force restore could not reset {} processes", failed);
            self.output.output_error(&format!(
                "{} processes could not be reset to normal. The restore records were \
                 cleared anyway.",
                failed
            ));
        }

        log::info!("Force restore reset {} processes", restored);
        Ok(restored)
    }

    fn relaunch_shell(&self) {
        let running = self
            .provider
            .processes()
            .map(|processes| processes.iter().any(|p| p.name() == SHELL_PROCESS))
            .unwrap_or(false);

        if running {
            log::debug!("Shell is already running, not relaunching");
            return;
        }

        if let Err(e) = (self.launch_shell)() {
            log::warn!("Could not relaunch the shell: {}", e);
            self.output
                .output_error(&format!("Could not restart '{}': {}", SHELL_PROCESS, e));
        }
    }

    fn report_restore_failure(&self, verbose: bool, name: &str, what: &str, error: &ProcessError) {
        log::debug!("Failed to restore {} of '{}': {}", what, name, error);
        if verbose {
            self.output
                .output_error(&format!("Could not restore {} of '{}': {}", what, name, error));
        }
    }
}

/// Applies mutations during an optimize pass and writes their undo records.
struct ChangeWriter<'a> {
    ledger: &'a mut dyn ChangeLedger,
    output: &'a dyn OutputSink,
    verbose: bool,
    all_cores: usize,
}

impl ChangeWriter<'_> {
    fn persist(&mut self, record: &LedgerRecord) -> Result<(), OptimizerError> {
        let value = record.to_value()?;
        self.ledger.put(&ledger::unique_key(&value), &value)?;
        log::debug!("Recorded {}", value);
        Ok(())
    }

    /// Returns the previous priority when the change was applied.
    fn change_priority(
        &mut self,
        process: &dyn ProcessHandle,
        priority: Priority,
    ) -> Result<Option<Priority>, OptimizerError> {
        let applied = process
            .priority()
            .and_then(|previous| process.set_priority(priority).map(|()| previous));

        match applied {
            Ok(previous) => {
                self.persist(&LedgerRecord::Change(ProcessStateChange::priority_change(
                    process.id(),
                    previous,
                )))?;
                Ok(Some(previous))
            }
            Err(e) => {
                self.report_failure(process, "priority", &e);
                Ok(None)
            }
        }
    }

    fn change_affinity(
        &mut self,
        process: &dyn ProcessHandle,
        mask: usize,
    ) -> Result<bool, OptimizerError> {
        let applied = process
            .affinity()
            .and_then(|previous| process.set_affinity(mask).map(|()| previous));

        match applied {
            Ok(previous) => {
                self.persist(&LedgerRecord::Change(ProcessStateChange::affinity_change(
                    process.id(),
                    previous,
                )))?;
                self.output.output(&format!(
                    "{} : Affinity -> {}",
                    process.name(),
                    format_affinity(mask, self.all_cores)
                ));
                Ok(true)
            }
            Err(e) => {
                self.report_failure(process, "affinity", &e);
                Ok(false)
            }
        }
    }

    fn report_failure(&self, process: &dyn ProcessHandle, what: &str, error: &ProcessError) {
        log::debug!(
            "Failed to change {} of '{}' ({}): {}",
            what,
            process.name(),
            process.id(),
            error
        );
        if self.verbose {
            self.output.output_error(&format!(
                "Could not change {} of '{}' ({}): {}",
                what,
                process.name(),
                process.id(),
                error
            ));
        }
    }
}

/// Decodes every ledger value, skipping ones that cannot be read.
fn read_records(ledger: &dyn ChangeLedger) -> Vec<LedgerRecord> {
    ledger
        .values()
        .iter()
        .filter_map(|value| match LedgerRecord::parse(value) {
            Ok(record) => Some(record),
            Err(e) => {
                log::warn!("Skipping unreadable restore record '{}': {}", value, e);
                None
            }
        })
        .collect()
}
