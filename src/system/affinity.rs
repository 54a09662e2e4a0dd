//! CPU affinity management using Win32 APIs
//!
//! This module provides functions to get and set process CPU affinity,
//! which determines which CPU cores a process is allowed to use, plus a
//! readable formatter used in optimizer messages.

#[cfg(windows)]
use windows::Win32::System::SystemInformation::GetSystemInfo;
#[cfg(windows)]
use windows::Win32::System::Threading::{
    GetProcessAffinityMask, SetProcessAffinityMask, PROCESS_QUERY_LIMITED_INFORMATION,
    PROCESS_SET_INFORMATION,
};

#[cfg(windows)]
use super::error::{ProcessError, ProcessResult};
#[cfg(windows)]
use crate::ffi::OwnedProcessHandle;

/// Returns a human-readable description of an affinity mask.
///
/// `"All cores"` when the mask equals `all_cores`, otherwise
/// a list like `"Cores: 0, 1, 2, 3"`.
pub fn format_affinity(mask: usize, all_cores: usize) -> String {
    if mask == all_cores {
        return "All cores".to_string();
    }

    let cores = (0..usize::BITS)
        .filter(|i| (mask >> i) & 1 == 1)
        .map(|i| i.to_string())
        .collect::<Vec<_>>();

    if cores.is_empty() {
        "No cores".to_string()
    } else {
        format!("Cores: {}", cores.join(", "))
    }
}

/// Get the total number of logical processors (cores) on the system.
#[cfg(windows)]
#[must_use]
pub fn get_system_core_count() -> u32 {
    unsafe {
        let mut sys_info = std::mem::zeroed();
        GetSystemInfo(&mut sys_info);
        sys_info.dwNumberOfProcessors
    }
}

/// Get the total number of logical processors (cores) on the system.
#[cfg(not(windows))]
#[must_use]
pub fn get_system_core_count() -> u32 {
    std::thread::available_parallelism()
        .map(|n| n.get() as u32)
        .unwrap_or(1)
}

/// Get the affinity mask of a process.
#[cfg(windows)]
pub fn get_process_affinity(pid: u32) -> ProcessResult<usize> {
    let handle = OwnedProcessHandle::open(pid, PROCESS_QUERY_LIMITED_INFORMATION)
        .map_err(|e| ProcessError::from_win32("OpenProcess", &e))?;

    let mut process_mask: usize = 0;
    let mut system_mask: usize = 0;

    // SAFETY: valid handle and out-pointers to locals.
    unsafe { GetProcessAffinityMask(handle.as_raw(), &mut process_mask, &mut system_mask) }
        .map_err(|e| ProcessError::from_win32("GetProcessAffinityMask", &e))?;

    Ok(process_mask)
}

/// Set CPU affinity for a process
///
/// # Arguments
/// * `pid` - Process ID
/// * `core_mask` - Bitmask of cores to allow (bit 0 = core 0, bit 1 = core 1, etc.)
#[cfg(windows)]
pub fn set_process_affinity(pid: u32, core_mask: usize) -> ProcessResult<()> {
    if core_mask == 0 {
        return Err(ProcessError::InvalidParameter {
            reason: "at least one core must be selected",
        });
    }

    // Need PROCESS_SET_INFORMATION to change affinity
    let handle = OwnedProcessHandle::open(
        pid,
        PROCESS_SET_INFORMATION | PROCESS_QUERY_LIMITED_INFORMATION,
    )
    .map_err(|e| ProcessError::from_win32("OpenProcess", &e))?;

    // SAFETY: valid handle owned by the guard above.
    unsafe { SetProcessAffinityMask(handle.as_raw(), core_mask) }
        .map_err(|e| ProcessError::from_win32("SetProcessAffinityMask", &e))
}
