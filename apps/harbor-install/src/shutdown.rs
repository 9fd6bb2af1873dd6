//! Interrupt handling for an install run.
//!
//! The whole run is raced against SIGINT/SIGTERM (Ctrl-C/Ctrl-Break on
//! Windows). When a signal wins, the run future is dropped: scratch
//! directories are removed by their `TempDir` guards and running children
//! are killed by `kill_on_drop`.

use std::future::Future;

use anyhow::Result;
use tracing::{debug, info};

use crate::errors::InstallerError;

/// Exit status for a run stopped by a signal (128 + SIGINT).
pub const INTERRUPTED_EXIT_CODE: i32 = 130;

/// Runs `work` unless `interrupt` completes first.
///
/// # Errors
///
/// Returns the error of `work`, or [`InstallerError::Interrupted`] when
/// `interrupt` resolves before it.
pub async fn until_interrupted<W, I>(work: W, interrupt: I) -> Result<()>
where
    W: Future<Output = Result<()>>,
    I: Future<Output = ()>,
{
    tokio::select! {
        outcome = work => outcome,
        () = interrupt => Err(InstallerError::Interrupted.into()),
    }
}

/// Resolves when the process receives an interrupt or terminate signal.
///
/// If the handlers cannot be installed this never resolves, and the run
/// falls back to the default signal disposition.
pub async fn wait_for_interrupt() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let (mut sigterm, mut sigint) =
            match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
                (Ok(term), Ok(int)) => (term, int),
                (Err(e), _) | (_, Err(e)) => {
                    debug!(error = %e, "cannot install signal handlers");
                    return std::future::pending().await;
                }
            };

        tokio::select! {
            _ = sigterm.recv() => info!("received SIGTERM"),
            _ = sigint.recv() => info!("received SIGINT"),
        }
    }

    #[cfg(windows)]
    {
        use tokio::signal::windows;

        let (mut ctrl_c, mut ctrl_break) = match (windows::ctrl_c(), windows::ctrl_break()) {
            (Ok(c), Ok(b)) => (c, b),
            (Err(e), _) | (_, Err(e)) => {
                debug!(error = %e, "cannot install console handlers");
                return std::future::pending().await;
            }
        };

        tokio::select! {
            _ = ctrl_c.recv() => info!("received Ctrl+C"),
            _ = ctrl_break.recv() => info!("received Ctrl+Break"),
        }
    }
}
