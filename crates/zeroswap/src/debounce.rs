//! Last-write-wins delay relay for values that change in bursts (keystrokes).

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

pub const DEFAULT_DEBOUNCE_MS: u64 = 250;

/// Re-emits the latest input once it has been stable for `interval`.
///
/// Every change cancels the pending timer before arming a new one, so intermediate values
/// are never emitted. While disabled, every change is emitted immediately. Dropping the
/// debouncer aborts the pending timer.
#[derive(Debug)]
pub struct Debouncer<T> {
    interval: Duration,
    enabled: bool,
    latest: T,
    out: Arc<watch::Sender<T>>,
    pending: Option<JoinHandle<()>>,
}

impl<T> Debouncer<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    pub fn new(initial: T, interval: Duration) -> Self {
        let (tx, _rx) = watch::channel(initial.clone());
        Self {
            interval,
            enabled: true,
            latest: initial,
            out: Arc::new(tx),
            pending: None,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<T> {
        self.out.subscribe()
    }

    #[cfg(test)]
    const fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Feed both inputs at once; re-arms only when one of them changed.
    pub fn update(&mut self, value: T, enabled: bool) {
        if value == self.latest && enabled == self.enabled {
            return;
        }
        self.latest = value;
        self.enabled = enabled;
        self.rearm();
    }

    pub fn cancel(&mut self) {
        if let Some(h) = self.pending.take() {
            h.abort();
        }
    }

    fn rearm(&mut self) {
        self.cancel();
        if !self.enabled {
            self.out.send_replace(self.latest.clone());
            return;
        }
        let out = Arc::clone(&self.out);
        let value = self.latest.clone();
        let interval = self.interval;
        self.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(interval).await;
            out.send_replace(value);
        }));
    }
}

impl<T> Drop for Debouncer<T> {
    fn drop(&mut self) {
        if let Some(h) = self.pending.take() {
            h.abort();
        }
    }
}
