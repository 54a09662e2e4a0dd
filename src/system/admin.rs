//! Admin/elevation status detection
//!
//! Many processes (services, other users' processes) can only be
//! re-prioritised from an elevated console, so the optimizer hints at
//! elevation when it is not running as Administrator.

#[cfg(windows)]
use std::mem;

#[cfg(windows)]
use windows::Win32::Foundation::{CloseHandle, HANDLE};
#[cfg(windows)]
use windows::Win32::Security::{GetTokenInformation, TokenElevation, TOKEN_ELEVATION, TOKEN_QUERY};
#[cfg(windows)]
use windows::Win32::System::Threading::{GetCurrentProcess, OpenProcessToken};

/// Checks if the current process is running with elevated (administrator) privileges.
///
/// # Returns
/// * `true` if running as administrator
/// * `false` if running as standard user or if the check fails
#[cfg(windows)]
#[must_use]
pub fn is_elevated() -> bool {
    // SAFETY: the token handle is closed before returning and every
    // out-pointer refers to a local of the right size.
    unsafe {
        let mut token_handle = HANDLE::default();

        if OpenProcessToken(GetCurrentProcess(), TOKEN_QUERY, &mut token_handle).is_err() {
            return false;
        }

        let mut elevation = TOKEN_ELEVATION::default();
        let mut return_length: u32 = 0;
        let elevation_size = mem::size_of::<TOKEN_ELEVATION>() as u32;

        let result = GetTokenInformation(
            token_handle,
            TokenElevation,
            Some(&mut elevation as *mut _ as *mut _),
            elevation_size,
            &mut return_length,
        );

        let _ = CloseHandle(token_handle);

        result.is_ok() && elevation.TokenIsElevated != 0
    }
}

#[cfg(not(windows))]
#[must_use]
pub fn is_elevated() -> bool {
    false
}

/// Returns a display string for the current elevation status
#[must_use]
pub fn elevation_status_string() -> &'static str {
    if is_elevated() {
        "Administrator"
    } else {
        "Standard User"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_elevation_status_string() {
        let status = elevation_status_string();
        assert!(status == "Administrator" || status == "Standard User");
    }
}
