//! Shutdown propagation into the boot sequencer.
//!
//! Termination requests flow through a watch channel so the sequencer can
//! select against whichever phase child is currently active. The CLI feeds
//! the channel from real signals; tests trigger the handle directly.

use tokio::sync::watch;

/// Delivers an external termination request to a running [`super::BootSequencer`].
pub struct ShutdownHandle {
    tx: watch::Sender<Option<i32>>,
}

impl ShutdownHandle {
    /// Request shutdown, recording which signal asked for it.
    pub fn trigger(&self, signal: i32) {
        let _ = self.tx.send(Some(signal));
    }
}

pub(crate) fn channel() -> (ShutdownHandle, watch::Receiver<Option<i32>>) {
    let (tx, rx) = watch::channel(None);
    (ShutdownHandle { tx }, rx)
}

/// Resolves once a shutdown has been requested; never resolves if the
/// handle is dropped without firing.
pub(crate) async fn wait_for_shutdown(rx: &mut watch::Receiver<Option<i32>>) -> i32 {
    loop {
        if let Some(signal) = *rx.borrow_and_update() {
            return signal;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Forward SIGTERM and SIGINT into the handle.
pub fn spawn_signal_listener(handle: ShutdownHandle) {
    tokio::spawn(async move {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!("cannot install SIGTERM handler: {}", e);
                return;
            }
        };
        let mut sigint = match signal(SignalKind::interrupt()) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!("cannot install SIGINT handler: {}", e);
                return;
            }
        };

        let signo = tokio::select! {
            _ = sigterm.recv() => libc::SIGTERM,
            _ = sigint.recv() => libc::SIGINT,
        };
        tracing::info!(signal = signo, "termination signal received");
        handle.trigger(signo);
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn trigger_resolves_waiters() {
        let (handle, mut rx) = channel();
        handle.trigger(libc::SIGTERM);
        assert_eq!(wait_for_shutdown(&mut rx).await, libc::SIGTERM);
    }

    #[tokio::test]
    async fn no_trigger_means_no_resolution() {
        let (_handle, mut rx) = channel();
        let waited =
            tokio::time::timeout(Duration::from_millis(50), wait_for_shutdown(&mut rx)).await;
        assert!(waited.is_err());
    }

    #[tokio::test]
    async fn dropped_handle_parks_forever() {
        let (handle, mut rx) = channel();
        drop(handle);
        let waited =
            tokio::time::timeout(Duration::from_millis(50), wait_for_shutdown(&mut rx)).await;
        assert!(waited.is_err());
    }
}
