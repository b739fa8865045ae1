// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! Caller-controlled cancellation of in-flight syncs.

use tokio::sync::watch;

/// Creates a connected cancel handle and signal.
#[must_use]
pub fn cancel_pair() -> (CancelHandle, CancelSignal) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, CancelSignal { rx })
}

/// Triggers cancellation for every clone of the paired [`CancelSignal`].
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    /// Cancels all syncs observing the paired signal.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

/// Observed by the coordinator while waiting on the remote.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

impl CancelSignal {
    /// A signal that never fires.
    #[must_use]
    pub fn never() -> Self {
        let (_, signal) = cancel_pair();
        signal
    }

    /// Whether cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancellation is requested.
    ///
    /// Pends forever if the handle was dropped without cancelling.
    pub async fn cancelled(&mut self) {
        let fired = self.rx.wait_for(|cancelled| *cancelled).await.is_ok();
        if !fired {
            std::future::pending::<()>().await;
        }
    }
}
