//! Process priority management using Win32 APIs
//!
//! This module provides the platform-neutral [`Priority`] enum used by the
//! optimizer and ledger, plus the GetPriorityClass / SetPriorityClass
//! wrappers used by the Win32 process adapter.

use serde::{Deserialize, Serialize};

#[cfg(windows)]
use windows::Win32::System::Threading::{
    GetPriorityClass, SetPriorityClass, ABOVE_NORMAL_PRIORITY_CLASS,
    BELOW_NORMAL_PRIORITY_CLASS, HIGH_PRIORITY_CLASS, IDLE_PRIORITY_CLASS,
    NORMAL_PRIORITY_CLASS, PROCESS_CREATION_FLAGS, PROCESS_QUERY_LIMITED_INFORMATION,
    PROCESS_SET_INFORMATION, REALTIME_PRIORITY_CLASS,
};

#[cfg(windows)]
use super::error::{ProcessError, ProcessResult};
#[cfg(windows)]
use crate::ffi::OwnedProcessHandle;

/// Windows process priority classes.
///
/// Priority determines how the OS scheduler allocates CPU time to a process.
/// Higher priority processes receive more CPU time when competing for resources.
///
/// # Levels (lowest to highest)
/// * `Idle` - Runs only when system is idle
/// * `BelowNormal` - Lower than normal priority
/// * `Normal` - Default priority for most applications
/// * `AboveNormal` - Higher than normal priority
/// * `High` - Significantly more CPU time (use with caution)
/// * `Realtime` - Highest priority, can affect system stability
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Priority {
    Idle,
    BelowNormal,
    Normal,
    AboveNormal,
    High,
    Realtime,
}

impl Priority {
    /// Raw Win32 priority class value (the numeric form used by the legacy
    /// delimited restore records).
    pub fn class_value(self) -> u32 {
        match self {
            Priority::Idle => 0x0000_0040,
            Priority::BelowNormal => 0x0000_4000,
            Priority::Normal => 0x0000_0020,
            Priority::AboveNormal => 0x0000_8000,
            Priority::High => 0x0000_0080,
            Priority::Realtime => 0x0000_0100,
        }
    }

    /// Inverse of [`Priority::class_value`]
    pub fn from_class_value(value: u32) -> Option<Self> {
        [
            Priority::Idle,
            Priority::BelowNormal,
            Priority::Normal,
            Priority::AboveNormal,
            Priority::High,
            Priority::Realtime,
        ]
        .into_iter()
        .find(|p| p.class_value() == value)
    }

    /// Convert from Win32 priority class value
    #[cfg(windows)]
    pub fn from_win32(value: PROCESS_CREATION_FLAGS) -> Option<Self> {
        match value {
            IDLE_PRIORITY_CLASS => Some(Priority::Idle),
            BELOW_NORMAL_PRIORITY_CLASS => Some(Priority::BelowNormal),
            NORMAL_PRIORITY_CLASS => Some(Priority::Normal),
            ABOVE_NORMAL_PRIORITY_CLASS => Some(Priority::AboveNormal),
            HIGH_PRIORITY_CLASS => Some(Priority::High),
            REALTIME_PRIORITY_CLASS => Some(Priority::Realtime),
            _ => None,
        }
    }

    /// Convert to Win32 priority class value
    #[cfg(windows)]
    pub fn to_win32(self) -> PROCESS_CREATION_FLAGS {
        match self {
            Priority::Idle => IDLE_PRIORITY_CLASS,
            Priority::BelowNormal => BELOW_NORMAL_PRIORITY_CLASS,
            Priority::Normal => NORMAL_PRIORITY_CLASS,
            Priority::AboveNormal => ABOVE_NORMAL_PRIORITY_CLASS,
            Priority::High => HIGH_PRIORITY_CLASS,
            Priority::Realtime => REALTIME_PRIORITY_CLASS,
        }
    }

    /// Get full display name
    pub fn name(&self) -> &'static str {
        match self {
            Priority::Idle => "Idle",
            Priority::BelowNormal => "Below Normal",
            Priority::Normal => "Normal",
            Priority::AboveNormal => "Above Normal",
            Priority::High => "High",
            Priority::Realtime => "Realtime",
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Gets the priority class of a process.
///
/// # Returns
/// * `Ok(Priority)` - The process priority
/// * `Err(ProcessError)` - If the process cannot be opened or queried
#[cfg(windows)]
pub fn get_process_priority(pid: u32) -> ProcessResult<Priority> {
    let handle = OwnedProcessHandle::open(pid, PROCESS_QUERY_LIMITED_INFORMATION)
        .map_err(|e| ProcessError::from_win32("OpenProcess", &e))?;

    // SAFETY: GetPriorityClass is safe with a valid handle.
    let priority_class = unsafe { GetPriorityClass(handle.as_raw()) };

    if priority_class == 0 {
        let err = windows::core::Error::from_win32();
        return Err(ProcessError::from_win32("GetPriorityClass", &err));
    }

    Priority::from_win32(PROCESS_CREATION_FLAGS(priority_class)).ok_or(
        ProcessError::InvalidParameter {
            reason: "unrecognised priority class",
        },
    )
}

/// Sets the priority class of a process.
///
/// Requires elevated privileges for some processes.
#[cfg(windows)]
pub fn set_process_priority(pid: u32, priority: Priority) -> ProcessResult<()> {
    let handle = OwnedProcessHandle::open(pid, PROCESS_SET_INFORMATION)
        .map_err(|e| ProcessError::from_win32("OpenProcess", &e))?;

    // SAFETY: SetPriorityClass is safe with a valid handle.
    unsafe { SetPriorityClass(handle.as_raw(), priority.to_win32()) }
        .map_err(|e| ProcessError::from_win32("SetPriorityClass", &e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_ordering() {
        assert!(Priority::Idle < Priority::Normal);
        assert!(Priority::Normal < Priority::AboveNormal);
        assert!(Priority::High < Priority::Realtime);
    }

    #[test]
    fn test_class_value_round_trip() {
        assert_eq!(Priority::from_class_value(0x40), Some(Priority::Idle));
        assert_eq!(Priority::from_class_value(0x8000), Some(Priority::AboveNormal));
        assert_eq!(Priority::from_class_value(0x1234), None);
    }

    #[cfg(windows)]
    #[test]
    fn test_get_own_priority() {
        let pid = std::process::id();
        let priority = get_process_priority(pid).expect("Should read own priority");
        println!("Our process priority: {:?}", priority);
    }
}
