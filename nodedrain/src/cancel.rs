//! Cooperative cancellation shared by every step of a drain.
//!
//! A [`Cancellation`] is cheap to clone and can be handed to any number of concurrent drains. Once the paired
//! [`CancellationTrigger`] fires, every clone observes it. Dropping the trigger without firing it leaves the
//! cancellation pending forever.
use std::future::Future;
use tokio::sync::watch;
use tracing::{event, Level};

/// Fires the paired [`Cancellation`].
#[derive(Debug)]
pub struct CancellationTrigger {
    tx: watch::Sender<bool>,
}

impl CancellationTrigger {
    pub fn cancel(&self) {
        // send_replace never fails, even when every receiver has been dropped.
        self.tx.send_replace(true);
    }
}

/// The receiving side of a cancellation signal.
#[derive(Clone, Debug)]
pub struct Cancellation {
    rx: watch::Receiver<bool>,
}

/// Creates a connected trigger and cancellation pair.
pub fn cancellation() -> (CancellationTrigger, Cancellation) {
    let (tx, rx) = watch::channel(false);
    (CancellationTrigger { tx }, Cancellation { rx })
}

impl Cancellation {
    /// A cancellation that never fires.
    pub fn never() -> Self {
        let (_, cancellation) = cancellation();
        cancellation
    }

    /// Returns a cancellation which fires once `signal` completes.
    ///
    /// Must be called from within a tokio runtime.
    pub fn on_signal<F>(signal: F) -> Self
    where
        F: Future + Send + 'static,
    {
        let (trigger, cancellation) = cancellation();
        tokio::spawn(async move {
            signal.await;
            event!(Level::WARN, "Cancellation signal received.");
            trigger.cancel();
        });
        cancellation
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Completes once cancellation has been requested.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        let closed = rx.wait_for(|cancelled| *cancelled).await.is_err();
        if closed {
            futures::future::pending::<()>().await;
        }
    }
}
