use tokio::sync::broadcast;

use super::AppLifecycle;

const CAPACITY: usize = 16;

/// Process-wide foreground/background signal. Handed to each subscriber
/// explicitly; the shell feeds it from window focus changes.
#[derive(Clone)]
pub struct LifecycleSignal {
    tx: broadcast::Sender<AppLifecycle>,
}

impl Default for LifecycleSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl LifecycleSignal {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CAPACITY);
        Self { tx }
    }

    /// Returns how many subscribers saw the event.
    pub fn emit(&self, lifecycle: AppLifecycle) -> usize {
        self.tx.send(lifecycle).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AppLifecycle> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
