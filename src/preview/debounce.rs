use std::time::Duration;

use tokio::{sync::mpsc, task::JoinHandle};
use tracing::debug;

/// Trailing-edge debouncer: only the last value scheduled within `delay` is delivered.
pub struct Debouncer<T> {
    delay: Duration,
    out: mpsc::Sender<T>,
    pending: Option<JoinHandle<()>>,
}

impl<T: Send + 'static> Debouncer<T> {
    pub fn new(delay: Duration, out: mpsc::Sender<T>) -> Self {
        Self {
            delay,
            out,
            pending: None,
        }
    }

    pub fn schedule(&mut self, value: T) {
        self.cancel();

        let delay = self.delay;
        let out = self.out.clone();
        self.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if out.send(value).await.is_err() {
                debug!("debounce target closed");
            }
        }));
    }

    pub fn cancel(&mut self) {
        if let Some(handle) = self.pending.take() {
            handle.abort();
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }
}

impl<T> Drop for Debouncer<T> {
    fn drop(&mut self) {
        if let Some(handle) = self.pending.take() {
            handle.abort();
        }
    }
}
