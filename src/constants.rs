//! Centralized constants for the application
//!
//! This module contains the file names, exempt process names and tuning
//! tables used throughout the optimizer, making them easy to find and modify.

// ============================================================================
// Application Info
// ============================================================================

/// Application name displayed in console output
pub const DISPLAY_NAME: &str = "Game Optimizer CLI";

/// Application version from Cargo.toml
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

// ============================================================================
// Files
// ============================================================================

/// Whitelist / game classification file
pub const WHITELIST_FILE: &str = "process_whitelist.txt";

/// JSON configuration file
pub const CONFIG_FILE: &str = "config.json";

/// Durable restore ledger (JSON lines)
pub const RESTORE_STATE_FILE: &str = "opt_restore_state.jsonl";

/// Contents written to [`WHITELIST_FILE`] when it does not exist yet
pub const DEFAULT_WHITELIST: &str = include_str!("../assets/default_process_whitelist.txt");

// ============================================================================
// Process Names
// ============================================================================

/// Hosts unrelated OS services; never re-prioritised or re-pinned
pub const EXEMPT_PROCESS: &str = "svchost";

/// The Windows shell, optionally killed during optimization
pub const SHELL_PROCESS: &str = "explorer";

// ============================================================================
// Classification File Format
// ============================================================================

/// Starts a trailing comment
pub const COMMENT_MARKER: char = '#';

/// Switches the active section to whitelisted processes
pub const WHITELISTED_TAG: &str = "<Whitelisted>";

/// Switches the active section to games
pub const GAMES_TAG: &str = "<Games>";

// ============================================================================
// Optimizer Defaults
// ============================================================================

/// Delay before an optimize pass so the user can focus the game
pub const DEFAULT_OPTIMIZE_DELAY_MS: u64 = 1000;

/// Executables kept on the streamer cores in streamer mode
pub const DEFAULT_STREAMER_EXECUTABLES: [&str; 3] = ["obs64", "ffmpeg-mux64", "obs-ffmpeg-mux"];

/// Physical core count -> number of cores reserved for games.
/// Counts missing from the table make every core a priority core.
pub const PRIORITY_CORE_TABLE: [(u32, u32); 9] = [
    (2, 1),
    (4, 3),
    (6, 4),
    (8, 6),
    (12, 10),
    (16, 12),
    (24, 20),
    (28, 20),
    (32, 24),
];
