//! Fixed-interval tick source with cooperative shutdown.

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{interval, Interval, MissedTickBehavior};

/// Triggers shutdown for every token created from it.
#[derive(Debug)]
pub struct ShutdownHandle {
    tx: watch::Sender<bool>,
}

/// Observes shutdown. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ShutdownToken {
    rx: watch::Receiver<bool>,
}

pub fn shutdown_channel() -> (ShutdownHandle, ShutdownToken) {
    let (tx, rx) = watch::channel(false);
    (ShutdownHandle { tx }, ShutdownToken { rx })
}

impl ShutdownHandle {
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }
}

impl ShutdownToken {
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once shutdown is triggered or the handle is dropped.
    pub async fn cancelled(&mut self) {
        while !*self.rx.borrow_and_update() {
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }
}

/// Ticks every `period` until shutdown.
pub struct Scheduler {
    interval: Interval,
    shutdown: ShutdownToken,
}

impl Scheduler {
    /// The first tick fires immediately. A slow sweep delays later ticks
    /// instead of bursting to catch up.
    pub fn new(period: Duration, shutdown: ShutdownToken) -> Self {
        let mut interval = interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self { interval, shutdown }
    }

    /// Wait for the next tick. `None` once shutdown has been requested.
    pub async fn next_tick(&mut self) -> Option<()> {
        if self.shutdown.is_triggered() {
            return None;
        }

        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => None,
            _ = self.interval.tick() => Some(()),
        }
    }
}
