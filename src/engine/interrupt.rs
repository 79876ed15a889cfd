//! Scoped conversion of process interrupts into task cancellation.
//!
//! The scheduler installs an [`InterruptGuard`] around the migration chain
//! only. While installed, SIGINT/SIGTERM delivery cancels a
//! [`CancellationToken`] the scheduler races the running task against, so an
//! interrupt is observably equivalent to that task failing. Dropping the
//! guard aborts the watcher on every exit path (success, failure, panic
//! unwind), so the handling never leaks into a later phase or run.
//!
//! Interrupts delivered while no guard is installed get whatever the
//! process default disposition is; in particular rollback is deliberately
//! not wrapped.

use std::sync::Arc;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Scoped interrupt-to-cancellation bridge.
///
/// Created with a fresh token per installation: an interrupt "delivered"
/// before installation is never observed, matching the enter/exit contract
/// of a signal handler that is only registered for the guarded scope.
#[derive(Debug)]
pub struct InterruptGuard {
    token: CancellationToken,
    watcher: JoinHandle<()>,
}

impl InterruptGuard {
    /// Install a watcher over the process interrupt signals.
    ///
    /// On unix both SIGINT and SIGTERM are watched; elsewhere ctrl-c.
    pub fn install() -> Self {
        let token = CancellationToken::new();
        let fired = token.clone();
        let watcher = tokio::spawn(async move {
            wait_for_signal().await;
            fired.cancel();
        });
        Self { token, watcher }
    }

    /// Install a watcher over an in-process interrupt source.
    ///
    /// Used by tests and embedders: `notify_waiters` on the source while
    /// the guard is installed behaves like signal delivery; a notification
    /// sent while no guard is listening is lost, like a signal arriving
    /// outside the guarded scope.
    pub fn install_with_source(source: Arc<Notify>) -> Self {
        let token = CancellationToken::new();
        let fired = token.clone();
        let watcher = tokio::spawn(async move {
            source.notified().await;
            fired.cancel();
        });
        Self { token, watcher }
    }

    /// Token cancelled when an interrupt arrives during the guarded scope.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }
}

impl Drop for InterruptGuard {
    fn drop(&mut self) {
        self.watcher.abort();
    }
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut interrupt = match signal(SignalKind::interrupt()) {
        Ok(s) => s,
        Err(_) => return,
    };
    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(_) => return,
    };
    tokio::select! {
        _ = interrupt.recv() => {}
        _ = terminate.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
