//! Safe RAII wrappers for Windows HANDLEs
//!
//! These wrappers ensure that handles are properly closed when they
//! go out of scope, preventing resource leaks.

use windows::Win32::Foundation::{CloseHandle, HANDLE};
use windows::Win32::System::Diagnostics::ToolHelp::{
    CreateToolhelp32Snapshot, TH32CS_SNAPPROCESS,
};
use windows::Win32::System::Threading::{OpenProcess, PROCESS_ACCESS_RIGHTS};

/// An owned Windows process HANDLE, closed when dropped.
///
/// Every priority/affinity call opens a fresh handle with the narrowest
/// access it needs, so a protected process fails only the call that
/// actually requires the missing right.
pub struct OwnedProcessHandle(HANDLE);

impl OwnedProcessHandle {
    /// Opens a process by PID with the specified access rights.
    ///
    /// # Returns
    /// * `Ok(OwnedProcessHandle)` - A wrapped handle to the process
    /// * `Err` - If the process cannot be opened (access denied, process exited, etc.)
    pub fn open(pid: u32, access: PROCESS_ACCESS_RIGHTS) -> windows::core::Result<Self> {
        // SAFETY: OpenProcess is safe to call with valid parameters.
        let handle = unsafe { OpenProcess(access, false, pid)? };
        Ok(Self(handle))
    }

    /// Returns the raw HANDLE for use with Win32 APIs.
    ///
    /// The handle must not be used after this guard is dropped.
    pub fn as_raw(&self) -> HANDLE {
        self.0
    }
}

impl Drop for OwnedProcessHandle {
    fn drop(&mut self) {
        // SAFETY: We own this handle and close it exactly once.
        unsafe {
            let _ = CloseHandle(self.0);
        }
    }
}

/// A safe wrapper around a ToolHelp32 snapshot HANDLE.
/// Automatically closes the handle when dropped.
pub struct SnapshotHandle(HANDLE);

impl SnapshotHandle {
    /// Creates a snapshot of all processes in the system.
    pub fn create_process_snapshot() -> windows::core::Result<Self> {
        // SAFETY: TH32CS_SNAPPROCESS captures all processes; the PID
        // argument is ignored for process snapshots.
        let handle = unsafe { CreateToolhelp32Snapshot(TH32CS_SNAPPROCESS, 0)? };
        Ok(Self(handle))
    }

    /// Returns the raw HANDLE for use with Win32 APIs.
    pub fn as_raw(&self) -> HANDLE {
        self.0
    }
}

impl Drop for SnapshotHandle {
    fn drop(&mut self) {
        // SAFETY: We own this handle.
        unsafe {
            let _ = CloseHandle(self.0);
        }
    }
}
