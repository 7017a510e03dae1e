use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Handle to a background pump task.
///
/// ## Example
///
/// ```ignore
/// use relay_rust::{InMemoryOutboxStore, OutboxPump, OutboxPumpConfig, RecordingPublisher};
///
/// let pump = OutboxPump::new(
///     InMemoryOutboxStore::new(),
///     RecordingPublisher::new(),
///     OutboxPumpConfig::default(),
/// );
///
/// let handle = pump.spawn();
///
/// // ... stage events, let the pump deliver them ...
///
/// let stats = handle.stop().await;
/// println!("published {} events", stats.published);
/// ```
pub struct PumpHandle<T> {
    shutdown: watch::Sender<bool>,
    handle: Option<JoinHandle<T>>,
}

impl<T: Default> PumpHandle<T> {
    pub(crate) fn new(shutdown: watch::Sender<bool>, handle: JoinHandle<T>) -> Self {
        PumpHandle {
            shutdown,
            handle: Some(handle),
        }
    }

    /// Signal the pump to stop and wait for it to finish.
    /// Returns the accumulated statistics.
    pub async fn stop(mut self) -> T {
        let _ = self.shutdown.send(true);
        if let Some(handle) = self.handle.take() {
            handle.await.unwrap_or_default()
        } else {
            T::default()
        }
    }

    /// Signal the pump to stop without waiting.
    pub fn signal_stop(&self) {
        let _ = self.shutdown.send(true);
    }
}

impl<T> Drop for PumpHandle<T> {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
        // Don't wait on drop - the task winds down on its own
    }
}
