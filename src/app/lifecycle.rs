use tokio::sync::broadcast;

const SIGNAL_BUFFER: usize = 16;

/// Discrete app-lifecycle signals the host forwards into the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    EnterForeground,
    EnterBackground,
    WillTerminate,
}

/// Fan-out point for lifecycle signals. The host calls `notify`; pipeline
/// components subscribe at setup.
#[derive(Clone)]
pub struct Lifecycle {
    tx: broadcast::Sender<LifecycleEvent>,
}

impl Lifecycle {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(SIGNAL_BUFFER);
        Self { tx }
    }

    pub fn notify(&self, event: LifecycleEvent) {
        // Send only fails with no live subscribers, which is fine.
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.tx.subscribe()
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}
