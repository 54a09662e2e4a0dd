//! Process enumeration using the ToolHelp32 API
//!
//! This module enumerates all running processes with
//! CreateToolhelp32Snapshot and Process32First/Next, and exposes each one
//! to the optimizer as a [`Win32Process`].

use std::mem;

use windows::Win32::Foundation::STILL_ACTIVE;
use windows::Win32::System::Diagnostics::ToolHelp::{
    Process32FirstW, Process32NextW, PROCESSENTRY32W,
};
use windows::Win32::System::Threading::{
    GetExitCodeProcess, TerminateProcess, PROCESS_QUERY_LIMITED_INFORMATION, PROCESS_TERMINATE,
};

use super::affinity::{get_process_affinity, set_process_affinity};
use super::error::{ProcessError, ProcessResult};
use super::priority::{get_process_priority, set_process_priority, Priority};
use super::process::{ProcessHandle, ProcessProvider};
use crate::ffi::{OwnedProcessHandle, SnapshotHandle};

/// Information about a single process from the snapshot
#[derive(Debug, Clone)]
pub struct ProcessInfo {
    /// Process ID
    pub pid: u32,
    /// Executable name (e.g., "notepad.exe")
    pub exe_name: String,
}

impl ProcessInfo {
    /// Creates a ProcessInfo from a PROCESSENTRY32W struct
    fn from_entry(entry: &PROCESSENTRY32W) -> Self {
        Self {
            pid: entry.th32ProcessID,
            exe_name: wide_to_string(&entry.szExeFile),
        }
    }
}

/// Converts a null-terminated wide string (u16 slice) to a Rust String
fn wide_to_string(wide: &[u16]) -> String {
    let len = wide.iter().position(|&c| c == 0).unwrap_or(wide.len());
    String::from_utf16_lossy(&wide[..len])
}

/// Strips a trailing `.exe` (any case), giving the name the whitelist uses.
pub fn process_name_from_exe(exe_name: &str) -> &str {
    let len = exe_name.len();
    match exe_name.get(len.saturating_sub(4)..) {
        Some(suffix) if len > 4 && suffix.eq_ignore_ascii_case(".exe") => &exe_name[..len - 4],
        _ => exe_name,
    }
}

/// Enumerates all running processes on the system.
///
/// # Returns
/// * `Ok(Vec<ProcessInfo>)` - A vector of all running processes
/// * `Err` - If the snapshot cannot be created
pub fn enumerate_processes() -> windows::core::Result<Vec<ProcessInfo>> {
    let snapshot = SnapshotHandle::create_process_snapshot()?;
    let mut processes = Vec::new();

    // dwSize must be set before the first call
    let mut entry = PROCESSENTRY32W {
        dwSize: mem::size_of::<PROCESSENTRY32W>() as u32,
        ..Default::default()
    };

    // SAFETY: We have a valid snapshot handle and properly initialized entry.
    let mut success = unsafe { Process32FirstW(snapshot.as_raw(), &mut entry) };

    while success.is_ok() {
        processes.push(ProcessInfo::from_entry(&entry));

        // SAFETY: Same as above - valid handles and initialized struct.
        success = unsafe { Process32NextW(snapshot.as_raw(), &mut entry) };
    }

    Ok(processes)
}

/// A live Win32 process, addressed by PID.
///
/// No handle is held between calls; each operation opens one with the
/// access it needs.
#[derive(Debug, Clone)]
pub struct Win32Process {
    pid: u32,
    name: String,
}

impl Win32Process {
    fn from_info(info: ProcessInfo) -> Self {
        let name = process_name_from_exe(&info.exe_name).to_string();
        Self { pid: info.pid, name }
    }
}

impl ProcessHandle for Win32Process {
    fn id(&self) -> u32 {
        self.pid
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn priority(&self) -> ProcessResult<Priority> {
        get_process_priority(self.pid)
    }

    fn set_priority(&self, priority: Priority) -> ProcessResult<()> {
        set_process_priority(self.pid, priority)
    }

    fn affinity(&self) -> ProcessResult<usize> {
        get_process_affinity(self.pid)
    }

    fn set_affinity(&self, mask: usize) -> ProcessResult<()> {
        set_process_affinity(self.pid, mask)
    }

    fn has_exited(&self) -> bool {
        let handle = match OwnedProcessHandle::open(self.pid, PROCESS_QUERY_LIMITED_INFORMATION) {
            Ok(h) => h,
            Err(e) => {
                // Still running but protected from us
                return ProcessError::from_win32("OpenProcess", &e) != ProcessError::AccessDenied;
            }
        };

        let mut exit_code: u32 = 0;
        // SAFETY: valid handle and out-pointer to a local.
        match unsafe { GetExitCodeProcess(handle.as_raw(), &mut exit_code) } {
            Ok(()) => exit_code != STILL_ACTIVE.0 as u32,
            Err(_) => false,
        }
    }

    fn kill(&self) -> ProcessResult<()> {
        let handle = OwnedProcessHandle::open(self.pid, PROCESS_TERMINATE)
            .map_err(|e| ProcessError::from_win32("OpenProcess", &e))?;

        // SAFETY: valid handle opened with PROCESS_TERMINATE.
        unsafe { TerminateProcess(handle.as_raw(), 1) }
            .map_err(|e| ProcessError::from_win32("TerminateProcess", &e))
    }
}

/// [`ProcessProvider`] backed by ToolHelp32 snapshots.
#[derive(Debug, Default, Clone, Copy)]
pub struct Win32ProcessProvider;

impl ProcessProvider for Win32ProcessProvider {
    fn processes(&self) -> ProcessResult<Vec<Box<dyn ProcessHandle>>> {
        let processes = enumerate_processes()
            .map_err(|e| ProcessError::from_win32("CreateToolhelp32Snapshot", &e))?;

        Ok(processes
            .into_iter()
            // PID 0 (System Idle) and 4 (System) can never be changed
            .filter(|info| info.pid != 0 && info.pid != 4)
            .map(|info| Box::new(Win32Process::from_info(info)) as Box<dyn ProcessHandle>)
            .collect())
    }

    fn process_by_id(&self, pid: u32) -> Option<Box<dyn ProcessHandle>> {
        let info = enumerate_processes()
            .ok()?
            .into_iter()
            .find(|info| info.pid == pid)?;
        Some(Box::new(Win32Process::from_info(info)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enumerate_processes() {
        let processes = enumerate_processes().expect("Should enumerate processes");
        assert!(!processes.is_empty(), "Should find at least one process");

        let current_pid = std::process::id();
        let found = processes.iter().any(|p| p.pid == current_pid);
        assert!(found, "Should find our own process");
    }

    #[test]
    fn test_process_name_strips_exe() {
        assert_eq!(process_name_from_exe("explorer.exe"), "explorer");
        assert_eq!(process_name_from_exe("SVCHOST.EXE"), "SVCHOST");
        assert_eq!(process_name_from_exe("System"), "System");
    }

    #[test]
    fn test_own_process_is_running() {
        let me = Win32ProcessProvider
            .process_by_id(std::process::id())
            .expect("Should find our own process");
        assert!(!me.has_exited());
    }
}
