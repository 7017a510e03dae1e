use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::anyhow;
use tokio::sync::{watch, Mutex};
use tokio::time::{interval_at, timeout, Instant as TokioInstant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::record::InboxRecord;
use super::registry::HandlerRegistry;
use super::store::InboxStore;
use crate::clock::{Clock, SystemClock};
use crate::error::StoreError;
use crate::message::Message;
use crate::pump::PumpHandle;
use crate::transaction::RepositoryContext;

/// Tuning for the inbox pump's drain loop.
#[derive(Debug, Clone)]
pub struct InboxPumpConfig {
    /// Records fetched per drain cycle.
    pub batch_size: usize,
    /// Delay between drain cycles. The first drain waits one full period.
    pub interval: Duration,
    /// Ceiling on a single handler invocation.
    pub handle_timeout: Duration,
    /// Delay between retention sweeps.
    pub cleanup_interval: Duration,
    /// How long processed records stay around before the sweep removes them.
    pub retention: chrono::Duration,
}

impl Default for InboxPumpConfig {
    fn default() -> Self {
        InboxPumpConfig {
            batch_size: 10,
            interval: Duration::from_millis(5000),
            handle_timeout: Duration::from_secs(5),
            cleanup_interval: Duration::from_secs(60 * 60),
            retention: chrono::Duration::days(7),
        }
    }
}

/// Outcome of `receive`: whether the message was new, plus the record that
/// now represents it (the freshly saved one, or the one already there).
#[derive(Debug, Clone)]
pub struct Receipt {
    pub is_new: bool,
    pub record: InboxRecord,
}

/// Outcome of a single drain cycle.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct InboxDrainReport {
    /// Pending records fetched for this cycle.
    pub claimed: usize,
    /// Records whose handler ran to completion.
    pub processed: usize,
    /// Records marked failed (handler error, timeout, or no handler).
    pub failed: usize,
}

/// Statistics accumulated by a spawned pump.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct InboxPumpStats {
    pub cycles: usize,
    pub processed: usize,
    pub failed: usize,
    /// Ticks skipped because a drain was already in flight.
    pub skipped: usize,
    /// Cycles that failed outright before touching any record.
    pub errors: usize,
}

impl InboxPumpStats {
    fn merge(&mut self, report: &InboxDrainReport) {
        self.processed += report.processed;
        self.failed += report.failed;
    }
}

/// Accepts inbound messages idempotently and dispatches them to registered
/// handlers.
///
/// `receive` is the dedup gate: the first sighting of a message id persists
/// a pending record, any later sighting returns the existing record
/// untouched. The drain loop then walks pending records oldest-first and
/// runs one handler at a time; a record that fails is terminal and never
/// picked up again.
pub struct InboxPump<S> {
    store: S,
    registry: Arc<HandlerRegistry>,
    config: InboxPumpConfig,
    clock: Arc<dyn Clock>,
    drain_guard: Arc<Mutex<()>>,
}

impl<S: Clone> Clone for InboxPump<S> {
    fn clone(&self) -> Self {
        InboxPump {
            store: self.store.clone(),
            registry: Arc::clone(&self.registry),
            config: self.config.clone(),
            clock: Arc::clone(&self.clock),
            drain_guard: Arc::clone(&self.drain_guard),
        }
    }
}

impl<S> InboxPump<S> {
    pub fn new(store: S, registry: HandlerRegistry, config: InboxPumpConfig) -> Self {
        InboxPump {
            store,
            registry: Arc::new(registry),
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

    pub fn store(&self) -> &S {
        &self.store
    }
}

impl<S> InboxPump<S>
where
    S: InboxStore + Clone + 'static,
{
    /// Records an inbound message exactly once.
    ///
    /// A message id seen before short-circuits: the existing record comes
    /// back with `is_new: false` and nothing is written. The caller must
    /// not dispatch the message again in that case.
    pub async fn receive(&self, message: &Message, topic: &str) -> Result<Receipt, StoreError> {
        debug!(id = %message.id, name = %message.name, topic, "received message");

        if let Some(existing) = self.store.find_by_id(&message.id).await? {
            warn!(id = %message.id, name = %message.name, topic, "duplicate message received");
            return Ok(Receipt {
                is_new: false,
                record: existing,
            });
        }

        let payload = serde_json::to_string(message)?;
        let record = InboxRecord::new(
            &message.id,
            &message.name,
            topic,
            &payload,
            self.clock.now(),
        )?;
        self.store.save(&record, &RepositoryContext::none()).await?;
        info!(id = %record.id, name = %record.event_name, topic, "new inbox record saved");

        Ok(Receipt {
            is_new: true,
            record,
        })
    }

    /// Runs one drain cycle now, waiting if another drain is in flight.
    pub async fn drain(&self, ctx: &RepositoryContext) -> Result<InboxDrainReport, StoreError> {
        let _guard = self.drain_guard.lock().await;
        self.drain_locked(ctx).await
    }

    async fn drain_locked(&self, ctx: &RepositoryContext) -> Result<InboxDrainReport, StoreError> {
        let mut report = InboxDrainReport::default();
        let batch = self.store.find_pending(self.config.batch_size).await?;
        if batch.is_empty() {
            debug!("no pending inbox records");
            return Ok(report);
        }

        report.claimed = batch.len();
        debug!(count = report.claimed, "processing pending inbox records");

        for record in batch {
            if self.process_one(record, ctx).await {
                report.processed += 1;
            } else {
                report.failed += 1;
            }
        }

        Ok(report)
    }

    // One record, one outcome; a failure here never aborts the batch.
    async fn process_one(&self, mut record: InboxRecord, ctx: &RepositoryContext) -> bool {
        match self.try_process(&mut record, ctx).await {
            Ok(()) => true,
            Err(reason) => {
                error!(
                    id = %record.id,
                    topic = %record.topic,
                    event = %record.event_name,
                    error = %reason,
                    "failed to process inbox record"
                );
                match record.mark_failed() {
                    Ok(()) => {
                        if let Err(e) = self.store.save(&record, ctx).await {
                            error!(id = %record.id, error = %e, "failed to persist failed status");
                        }
                    }
                    Err(e) => {
                        error!(id = %record.id, error = %e, "record not in a failable state");
                    }
                }
                false
            }
        }
    }

    async fn try_process(
        &self,
        record: &mut InboxRecord,
        ctx: &RepositoryContext,
    ) -> anyhow::Result<()> {
        debug!(id = %record.id, topic = %record.topic, event = %record.event_name, "processing inbox record");
        let started = Instant::now();

        record.mark_processing()?;
        self.store.save(record, ctx).await?;

        let handler = self
            .registry
            .get(&record.topic, &record.event_name)
            .cloned()
            .ok_or_else(|| {
                anyhow!(
                    "no handler registered for topic '{}' and event '{}'",
                    record.topic,
                    record.event_name
                )
            })?;
        let message = Message::parse(&record.payload)?;

        timeout(self.config.handle_timeout, handler.handle(&message))
            .await
            .map_err(|_| anyhow!("handler timed out after {:?}", self.config.handle_timeout))??;

        record.mark_processed(self.clock.now())?;
        self.store.save(record, ctx).await?;

        debug!(
            id = %record.id,
            topic = %record.topic,
            event = %record.event_name,
            duration_ms = started.elapsed().as_millis() as u64,
            "processed inbox record"
        );
        Ok(())
    }

    /// Deletes processed records older than the retention window.
    pub async fn delete_processed(&self, ctx: &RepositoryContext) -> Result<usize, StoreError> {
        let cutoff = self.clock.now() - self.config.retention;
        let deleted = self.store.delete_processed_before(cutoff, ctx).await?;
        if deleted > 0 {
            info!(deleted, "cleaned up processed inbox records");
        }
        Ok(deleted)
    }

    /// Starts a background task that drains on `interval` and sweeps old
    /// processed records on `cleanup_interval`. Both start after one full
    /// period; `receive` keeps accepting messages independently.
    pub fn spawn(&self) -> PumpHandle<InboxPumpStats> {
        let pump = self.clone();
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            let mut stats = InboxPumpStats::default();
            let mut drain_tick = interval_at(
                TokioInstant::now() + pump.config.interval,
                pump.config.interval,
            );
            drain_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut cleanup_tick = interval_at(
                TokioInstant::now() + pump.config.cleanup_interval,
                pump.config.cleanup_interval,
            );
            cleanup_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let ctx = RepositoryContext::none();

            info!(
                batch_size = pump.config.batch_size,
                interval_ms = pump.config.interval.as_millis() as u64,
                "inbox pump started"
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
                                    error!(error = %e, "inbox drain cycle failed");
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
                            error!(error = %e, "inbox cleanup failed");
                        }
                    }
                }
            }

            info!(
                cycles = stats.cycles,
                processed = stats.processed,
                "inbox pump stopped"
            );
            stats
        });

        PumpHandle::new(shutdown_tx, handle)
    }
}
