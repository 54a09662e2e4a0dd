//! Custom error types for type-safe error handling
//!
//! This module provides structured error types instead of raw strings,
//! enabling better error handling, matching, and user messages.

use thiserror::Error;

// ============================================================================
// Process Error
// ============================================================================

/// Errors that can occur while reading or changing a single process.
///
/// These are expected at runtime (protected processes, processes that exit
/// mid-pass) and are reported per mutation rather than aborting a batch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProcessError {
    /// Process does not exist or has already terminated
    #[error("Process not found or has terminated")]
    NotFound,

    /// Access denied - typically requires elevation
    #[error("Access denied - try running as Administrator")]
    AccessDenied,

    /// Windows API call failed with an error code
    #[error("{api} failed (error code: 0x{code:08X})")]
    WinApi {
        /// Name of the failing API function
        api: &'static str,
        /// Windows error code (HRESULT)
        code: i32,
    },

    /// Invalid parameter provided to a function
    #[error("Invalid parameter: {reason}")]
    InvalidParameter {
        /// Description of what was invalid
        reason: &'static str,
    },

    /// The operation is not available on this platform
    #[error("Operation not supported on this platform")]
    Unsupported,
}

#[cfg(windows)]
impl ProcessError {
    /// Maps a `windows::core::Error` from `api` onto a process error.
    pub fn from_win32(api: &'static str, err: &windows::core::Error) -> Self {
        use windows::Win32::Foundation::{E_ACCESSDENIED, E_INVALIDARG};

        let code = err.code();
        if code == E_ACCESSDENIED {
            ProcessError::AccessDenied
        } else if code == E_INVALIDARG {
            // OpenProcess reports a vanished PID as an invalid parameter
            ProcessError::NotFound
        } else {
            ProcessError::WinApi { api, code: code.0 }
        }
    }
}

// ============================================================================
// Result type aliases
// ============================================================================

/// Result type for process operations
pub type ProcessResult<T> = Result<T, ProcessError>;
