//! Relaunching the Windows shell after it was killed by an optimize pass

use std::io;
use std::path::PathBuf;
use std::process::Command;

/// Path to `explorer.exe` under the Windows directory.
fn explorer_path() -> PathBuf {
    let windir = std::env::var_os("SystemRoot")
        .or_else(|| std::env::var_os("windir"))
        .unwrap_or_else(|| "C:\\Windows".into());
    PathBuf::from(windir).join("explorer.exe")
}

/// Starts a new `explorer.exe`. Does not wait for it.
pub fn relaunch_shell() -> io::Result<()> {
    let path = explorer_path();
    log::info!("Relaunching shell: {}", path.display());
    Command::new(path).spawn().map(|_| ())
}
