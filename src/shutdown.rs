//! Graceful shutdown signalling.
//!
//! A single watch channel fans the shutdown signal out to every background
//! loop. Each loop selects on `wait()` at its suspension points; no task
//! ever has to poll a global flag.

use tokio::sync::watch;

/// Cloneable shutdown token handed to every background task.
#[derive(Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

impl Shutdown {
    /// True once shutdown has been requested
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves when shutdown is requested. Safe to call repeatedly.
    pub async fn wait(&mut self) {
        if *self.rx.borrow() {
            return;
        }
        // The sender lives for the process lifetime; a closed channel also
        // means it is time to stop.
        while self.rx.changed().await.is_ok() {
            if *self.rx.borrow() {
                return;
            }
        }
    }
}

/// The triggering side, owned by the run loop.
pub struct ShutdownHandle {
    tx: watch::Sender<bool>,
}

impl ShutdownHandle {
    pub fn new() -> (Self, Shutdown) {
        let (tx, rx) = watch::channel(false);
        (Self { tx }, Shutdown { rx })
    }

    /// Broadcast shutdown to every subscribed task
    pub fn trigger(&self) {
        let _ = self.tx.send(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_shutdown_broadcast() {
        let (handle, shutdown) = ShutdownHandle::new();
        let mut waiter = shutdown.clone();
        assert!(!shutdown.is_triggered());

        let task = tokio::spawn(async move {
            waiter.wait().await;
            true
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        handle.trigger();

        let finished = tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
        assert!(finished);
        assert!(shutdown.is_triggered());
    }

    #[tokio::test]
    async fn test_wait_after_trigger_returns_immediately() {
        let (handle, mut shutdown) = ShutdownHandle::new();
        handle.trigger();
        shutdown.wait().await;
        assert!(shutdown.is_triggered());
    }
}
