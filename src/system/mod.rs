//! System module - Process enumeration, priority, affinity and CPU topology
//!
//! This module provides safe abstractions over the Win32 APIs the optimizer
//! needs, behind small traits so the optimizer can run against fakes.

pub mod admin;
pub mod affinity;
pub mod error;
pub mod priority;
pub mod process;
#[cfg(windows)]
pub mod processes;
pub mod shell;
pub mod topology;

pub use error::{ProcessError, ProcessResult};
pub use priority::Priority;
pub use process::{ProcessHandle, ProcessProvider};
pub use topology::{ProcessorLayout, ProcessorTopology};

/// The process provider for the current platform.
pub fn default_provider() -> Box<dyn ProcessProvider> {
    #[cfg(windows)]
    {
        Box::new(processes::Win32ProcessProvider)
    }
    #[cfg(not(windows))]
    {
        Box::new(process::UnsupportedProvider)
    }
}
