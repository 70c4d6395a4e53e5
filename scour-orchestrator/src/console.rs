//! Terminal mode switching for stdin forwarding. Best-effort: without a
//! tty (or on stty failure) forwarding still works line-buffered.

use tokio::process::Command;

/// Puts the controlling terminal into character-at-a-time, no-echo mode so
/// single keystrokes reach the remote commands.
pub async fn enable_raw() {
    let _ = Command::new("stty")
        .args(["-F", "/dev/tty", "cbreak", "min", "1"])
        .status()
        .await;
    let _ = Command::new("stty")
        .args(["-F", "/dev/tty", "-echo"])
        .status()
        .await;
}

/// Returns the terminal to its normal line-buffered, echoing state. Called
/// on the interrupt path so the operator's shell stays usable after exit.
pub async fn restore() {
    let _ = Command::new("stty")
        .args(["-F", "/dev/tty", "sane"])
        .status()
        .await;
}
