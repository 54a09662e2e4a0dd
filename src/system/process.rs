//! Capability traits over live OS processes
//!
//! The optimizer only ever talks to processes through [`ProcessHandle`] and
//! obtains them from a [`ProcessProvider`]. The Win32 implementation lives in
//! `processes.rs`; tests use the in-memory fakes in [`fake`].

use super::error::ProcessResult;
use super::priority::Priority;

/// The operations the optimizer needs on one running process.
///
/// Setters take `&self`: the handle is a reference to OS state, not the state
/// itself.
pub trait ProcessHandle {
    /// Process ID, stable for the lifetime of the process
    fn id(&self) -> u32;

    /// Executable name without the `.exe` suffix (not unique)
    fn name(&self) -> &str;

    fn priority(&self) -> ProcessResult<Priority>;

    fn set_priority(&self, priority: Priority) -> ProcessResult<()>;

    /// Affinity mask, bit i = logical core i
    fn affinity(&self) -> ProcessResult<usize>;

    fn set_affinity(&self, mask: usize) -> ProcessResult<()>;

    fn has_exited(&self) -> bool;

    fn kill(&self) -> ProcessResult<()>;
}

/// Source of live processes.
pub trait ProcessProvider: Send + Sync {
    /// Snapshot of every running process.
    fn processes(&self) -> ProcessResult<Vec<Box<dyn ProcessHandle>>>;

    /// Fresh lookup by PID; `None` when the process no longer exists.
    fn process_by_id(&self, pid: u32) -> Option<Box<dyn ProcessHandle>>;
}

/// Provider for platforms without process control.
#[cfg(not(windows))]
#[derive(Debug, Default, Clone, Copy)]
pub struct UnsupportedProvider;

#[cfg(not(windows))]
impl ProcessProvider for UnsupportedProvider {
    fn processes(&self) -> ProcessResult<Vec<Box<dyn ProcessHandle>>> {
        Err(super::error::ProcessError::Unsupported)
    }

    fn process_by_id(&self, _pid: u32) -> Option<Box<dyn ProcessHandle>> {
        None
    }
}

/// In-memory processes for tests.
#[cfg(test)]
pub mod fake {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::{ProcessHandle, ProcessProvider};
    use crate::system::error::{ProcessError, ProcessResult};
    use crate::system::priority::Priority;

    static NEXT_PID: AtomicU32 = AtomicU32::new(10);

    #[derive(Debug)]
    struct FakeState {
        priority: Priority,
        affinity: usize,
        exited: bool,
        killed: bool,
        deny_priority: bool,
        deny_affinity: bool,
    }

    /// A fake process; clones share state so tests can inspect the result
    /// of an optimizer pass.
    #[derive(Debug, Clone)]
    pub struct FakeProcess {
        pid: u32,
        name: String,
        state: Arc<Mutex<FakeState>>,
    }

    impl FakeProcess {
        pub fn new(name: &str, affinity: usize) -> Self {
            Self {
                pid: NEXT_PID.fetch_add(1, Ordering::Relaxed),
                name: name.to_string(),
                state: Arc::new(Mutex::new(FakeState {
                    priority: Priority::Normal,
                    affinity,
                    exited: false,
                    killed: false,
                    deny_priority: false,
                    deny_affinity: false,
                })),
            }
        }

        /// Rejects every priority read/write, like a protected process.
        pub fn deny_priority(self) -> Self {
            self.state.lock().deny_priority = true;
            self
        }

        /// Rejects every affinity read/write.
        pub fn deny_affinity(self) -> Self {
            self.state.lock().deny_affinity = true;
            self
        }

        pub fn current_priority(&self) -> Priority {
            self.state.lock().priority
        }

        pub fn current_affinity(&self) -> usize {
            self.state.lock().affinity
        }

        pub fn force_priority(&self, priority: Priority) {
            self.state.lock().priority = priority;
        }

        pub fn mark_exited(&self) {
            self.state.lock().exited = true;
        }

        pub fn was_killed(&self) -> bool {
            self.state.lock().killed
        }
    }

    impl ProcessHandle for FakeProcess {
        fn id(&self) -> u32 {
            self.pid
        }

        fn name(&self) -> &str {
            &self.name
        }

        fn priority(&self) -> ProcessResult<Priority> {
            let state = self.state.lock();
            if state.deny_priority {
                return Err(ProcessError::AccessDenied);
            }
            Ok(state.priority)
        }

        fn set_priority(&self, priority: Priority) -> ProcessResult<()> {
            let mut state = self.state.lock();
            if state.deny_priority {
                return Err(ProcessError::AccessDenied);
            }
            state.priority = priority;
            Ok(())
        }

        fn affinity(&self) -> ProcessResult<usize> {
            let state = self.state.lock();
            if state.deny_affinity {
                return Err(ProcessError::AccessDenied);
            }
            Ok(state.affinity)
        }

        fn set_affinity(&self, mask: usize) -> ProcessResult<()> {
            let mut state = self.state.lock();
            if state.deny_affinity {
                return Err(ProcessError::AccessDenied);
            }
            state.affinity = mask;
            Ok(())
        }

        fn has_exited(&self) -> bool {
            self.state.lock().exited
        }

        fn kill(&self) -> ProcessResult<()> {
            let mut state = self.state.lock();
            state.killed = true;
            state.exited = true;
            Ok(())
        }
    }

    /// A fixed set of fake processes.
    #[derive(Debug, Default, Clone)]
    pub struct FakeProvider {
        processes: Vec<FakeProcess>,
    }

    impl FakeProvider {
        pub fn new(processes: Vec<FakeProcess>) -> Self {
            Self { processes }
        }
    }

    impl ProcessProvider for FakeProvider {
        fn processes(&self) -> ProcessResult<Vec<Box<dyn ProcessHandle>>> {
            Ok(self
                .processes
                .iter()
                .filter(|p| !p.has_exited())
                .map(|p| Box::new(p.clone()) as Box<dyn ProcessHandle>)
                .collect())
        }

        fn process_by_id(&self, pid: u32) -> Option<Box<dyn ProcessHandle>> {
            self.processes
                .iter()
                .find(|p| p.pid == pid && !p.has_exited())
                .map(|p| Box::new(p.clone()) as Box<dyn ProcessHandle>)
        }
    }
}
