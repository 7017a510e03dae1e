use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex};
use tokio::time::{interval, interval_at, timeout, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::publisher::EventPublisher;
use super::record::OutboxRecord;
use super::store::OutboxStore;
use crate::clock::{Clock, SystemClock};
use crate::error::StoreError;
use crate::pump::PumpHandle;
use crate::transaction::RepositoryContext;

/// Tuning for the outbox pump's drain loop.
#[derive(Debug, Clone)]
pub struct OutboxPumpConfig {
    /// Records fetched per drain cycle.
    pub batch_size: usize,
    /// Delay between drain cycles. The first drain runs immediately.
    pub interval: Duration,
    /// Ceiling on a single publish call.
    pub publish_timeout: Duration,
    /// Delay between retention sweeps.
    pub cleanup_interval: Duration,
    /// How long processed records stay around before the sweep removes them.
    pub retention: chrono::Duration,
}

impl Default for OutboxPumpConfig {
    fn default() -> Self {
        OutboxPumpConfig {
            batch_size: 10,
            interval: Duration::from_millis(1000),
            publish_timeout: Duration::from_secs(5),
            cleanup_interval: Duration::from_secs(60 * 60),
            retention: chrono::Duration::days(7),
        }
    }
}

/// Outcome of a single drain cycle.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct OutboxDrainReport {
    /// Records fetched for this cycle.
    pub claimed: usize,
    /// Publishes that succeeded and were marked processed.
    pub published: usize,
    /// Failed publishes that keep some retry budget.
    pub retried: usize,
    /// Records abandoned because their budget is spent.
    pub gave_up: usize,
    /// Records whose status change could not be persisted.
    pub failed: usize,
}

/// Statistics accumulated by a spawned pump.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct OutboxPumpStats {
    pub cycles: usize,
    pub published: usize,
    pub retried: usize,
    pub gave_up: usize,
    pub failed: usize,
    /// Ticks skipped because a drain was already in flight.
    pub skipped: usize,
    /// Cycles that failed outright before touching any record.
    pub errors: usize,
}

impl OutboxPumpStats {
    fn merge(&mut self, report: &OutboxDrainReport) {
        self.published += report.published;
        self.retried += report.retried;
        self.gave_up += report.gave_up;
        self.failed += report.failed;
    }
}

/// Drains staged events from an [`OutboxStore`] and hands them to an
/// [`EventPublisher`].
///
/// Records are attempted oldest-first, strictly one at a time, so a single
/// pump never races itself into publishing the same record twice. Failed
/// publishes burn one retry per cycle until the budget runs out, after
/// which the record is left in place and skipped.
///
/// Cloning shares the publisher, clock, and drain guard; pair it with a
/// store whose clones share storage and every handle sees the same queue.
pub struct OutboxPump<S, P> {
    store: S,
    publisher: Arc<P>,
    config: OutboxPumpConfig,
    clock: Arc<dyn Clock>,
    drain_guard: Arc<Mutex<()>>,
}

impl<S: Clone, P> Clone for OutboxPump<S, P> {
    fn clone(&self) -> Self {
        OutboxPump {
            store: self.store.clone(),
            publisher: Arc::clone(&self.publisher),
            config: self.config.clone(),
            clock: Arc::clone(&self.clock),
            drain_guard: Arc::clone(&self.drain_guard),
        }
    }
}

impl<S, P> OutboxPump<S, P> {
    pub fn new(store: S, publisher: P, config: OutboxPumpConfig) -> Self {
        OutboxPump {
            store,
            publisher: Arc::new(publisher),
            config,
            clock: Arc::new(SystemClock),
            drain_guard: Arc::new(Mutex::new(())),
        }
    }

    /// Replace the clock, mainly to pin time in tests.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn publisher(&self) -> &P {
        &self.publisher
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

impl<S, P> OutboxPump<S, P>
where
    S: OutboxStore + Clone + 'static,
    P: EventPublisher + 'static,
{
    /// Stages an event for delivery. Call this inside the same transaction
    /// that persists the state change the event reports, so the event and
    /// the change survive or vanish together.
    pub async fn stage(
        &self,
        event_name: &str,
        topic: &str,
        payload: &str,
        ctx: &RepositoryContext,
    ) -> Result<OutboxRecord, StoreError> {
        let id = Uuid::new_v4().to_string();
        let record = OutboxRecord::new(&id, event_name, topic, payload, self.clock.now())?;
        self.store.save(&record, ctx).await?;
        debug!(id = %record.id, event = %record.event_name, topic = %record.topic, "staged outbox event");
        Ok(record)
    }

    /// Runs one drain cycle now, waiting if another drain is in flight.
    pub async fn drain(&self, ctx: &RepositoryContext) -> Result<OutboxDrainReport, StoreError> {
        let _guard = self.drain_guard.lock().await;
        self.drain_locked(ctx).await
    }

    async fn drain_locked(&self, ctx: &RepositoryContext) -> Result<OutboxDrainReport, StoreError> {
        let mut report = OutboxDrainReport::default();
        let batch = self.store.find_unprocessed(self.config.batch_size).await?;
        if batch.is_empty() {
            return Ok(report);
        }

        report.claimed = batch.len();
        debug!(count = report.claimed, "processing outbox events");

        for mut record in batch {
            // An exhausted record stays in the store but is never attempted again.
            if !record.can_retry() {
                warn!(
                    id = %record.id,
                    retry_count = record.retry_count,
                    max_retries = record.max_retries,
                    "max retries exceeded, giving up"
                );
                report.gave_up += 1;
                continue;
            }

            let outcome = match timeout(
                self.config.publish_timeout,
                self.publisher.publish(&record.topic, &record.payload),
            )
            .await
            {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(e.to_string()),
                Err(_) => Err(format!(
                    "publish timed out after {:?}",
                    self.config.publish_timeout
                )),
            };

            match outcome {
                Ok(()) => {
                    record.mark_processed(self.clock.now());
                    match self.store.save(&record, ctx).await {
                        Ok(()) => {
                            debug!(id = %record.id, topic = %record.topic, "published outbox event");
                            report.published += 1;
                        }
                        Err(e) => {
                            // The publish went out; the record will be attempted
                            // again next cycle, which is what at-least-once means.
                            error!(id = %record.id, error = %e, "failed to mark event processed");
                            report.failed += 1;
                        }
                    }
                }
                Err(reason) => {
                    error!(id = %record.id, topic = %record.topic, error = %reason, "failed to publish outbox event");
                    match record.increment_retry(self.clock.now()) {
                        Ok(()) => match self.store.save(&record, ctx).await {
                            Ok(()) => {
                                warn!(
                                    id = %record.id,
                                    retry_count = record.retry_count,
                                    max_retries = record.max_retries,
                                    "incremented retry count"
                                );
                                report.retried += 1;
                            }
                            Err(e) => {
                                error!(id = %record.id, error = %e, "failed to persist retry count");
                                report.failed += 1;
                            }
                        },
                        Err(e) => {
                            error!(id = %record.id, error = %e, "max retries exceeded, giving up");
                            report.gave_up += 1;
                        }
                    }
                }
            }
        }

        Ok(report)
    }

    /// Deletes processed records older than the retention window.
    pub async fn delete_processed(&self, ctx: &RepositoryContext) -> Result<usize, StoreError> {
        let cutoff = self.clock.now() - self.config.retention;
        let deleted = self.store.delete_processed_before(cutoff, ctx).await?;
        if deleted > 0 {
            info!(deleted, "cleaned up processed outbox events");
        }
        Ok(deleted)
    }

    /// Starts a background task that drains on `interval` and sweeps old
    /// processed records on `cleanup_interval`. The first drain runs
    /// immediately; the first sweep waits one full period.
    pub fn spawn(&self) -> PumpHandle<OutboxPumpStats> {
        let pump = self.clone();
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            let mut stats = OutboxPumpStats::default();
            let mut drain_tick = interval(pump.config.interval);
            drain_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut cleanup_tick = interval_at(
                Instant::now() + pump.config.cleanup_interval,
                pump.config.cleanup_interval,
            );
            cleanup_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let ctx = RepositoryContext::none();

            info!(
                batch_size = pump.config.batch_size,
                interval_ms = pump.config.interval.as_millis() as u64,
                "outbox pump started"
            );

            loop {
                tokio::select! {
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    _ = drain_tick.tick() => {
                        stats.cycles += 1;
                        match pump.drain_guard.try_lock() {
                            Ok(_guard) => match pump.drain_locked(&ctx).await {
                                Ok(report) => stats.merge(&report),
                                Err(e) => {
                                    error!(error = %e, "outbox drain cycle failed");
                                    stats.errors += 1;
                                }
                            },
                            Err(_) => {
                                debug!("drain already in flight, skipping tick");
                                stats.skipped += 1;
                            }
                        }
                    }
                    _ = cleanup_tick.tick() => {
                        if let Err(e) = pump.delete_processed(&ctx).await {
                            error!(error = %e, "outbox cleanup failed");
                        }
                    }
                }
            }

            info!(
                cycles = stats.cycles,
                published = stats.published,
                "outbox pump stopped"
            );
            stats
        });

        PumpHandle::new(shutdown_tx, handle)
    }
}
