//! The whole pipe at once: a transaction stages an event next to a state
//! change, the outbox hands it to a publisher wired straight into an inbox,
//! and the inbox drives the handler that reacts to it.

mod support;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use relay_rust::{
    EventPublisher, HandlerRegistry, InMemoryInboxStore, InMemoryOutboxStore, InboxHandler,
    InboxPump, InboxPumpConfig, InboxStatus, InboxStore, Message, OutboxPump, OutboxPumpConfig,
    PublishError, RepositoryContext, Transaction,
};
use serde_json::json;
use support::task_store::{Task, TaskStore};

/// Publisher that delivers payloads straight into an inbox, standing in for
/// a broker round trip.
struct BridgePublisher {
    inbox: InboxPump<InMemoryInboxStore>,
}

#[async_trait]
impl EventPublisher for BridgePublisher {
    type Error = PublishError;

    async fn publish(&self, topic: &str, payload: &str) -> Result<(), Self::Error> {
        let message =
            Message::parse(payload).map_err(|e| PublishError::Rejected(e.to_string()))?;
        self.inbox
            .receive(&message, topic)
            .await
            .map_err(|e| PublishError::Rejected(e.to_string()))?;
        Ok(())
    }
}

/// Handler that flips the task named in the message to done, counting calls.
struct CompleteTaskHandler {
    tasks: TaskStore,
    calls: Arc<AtomicUsize>,
}

impl CompleteTaskHandler {
    fn new(tasks: TaskStore) -> Self {
        CompleteTaskHandler {
            tasks,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl InboxHandler for CompleteTaskHandler {
    async fn handle(&self, message: &Message) -> anyhow::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let id = message
            .data
            .get("taskId")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow::anyhow!("message carries no taskId"))?;
        let task = self
            .tasks
            .find(id)?
            .ok_or_else(|| anyhow::anyhow!("task '{id}' not found"))?;
        self.tasks
            .save(&task.complete(), &RepositoryContext::none())
            .await?;
        Ok(())
    }
}

struct Pipeline {
    tasks: TaskStore,
    handler: Arc<CompleteTaskHandler>,
    inbox: InboxPump<InMemoryInboxStore>,
    outbox: OutboxPump<InMemoryOutboxStore, BridgePublisher>,
}

fn pipeline() -> Pipeline {
    let tasks = TaskStore::new();
    let handler = Arc::new(CompleteTaskHandler::new(tasks.clone()));
    let mut registry = HandlerRegistry::new();
    registry.register("tasks", "task.created", handler.clone());
    let inbox = InboxPump::new(
        InMemoryInboxStore::new(),
        registry,
        InboxPumpConfig::default(),
    );
    let outbox = OutboxPump::new(
        InMemoryOutboxStore::new(),
        BridgePublisher {
            inbox: inbox.clone(),
        },
        OutboxPumpConfig::default(),
    );
    Pipeline {
        tasks,
        handler,
        inbox,
        outbox,
    }
}

#[tokio::test]
async fn a_task_change_and_its_event_travel_the_whole_pipeline() {
    let pipe = pipeline();

    let tasks_in = pipe.tasks.clone();
    let outbox_in = pipe.outbox.clone();
    let result: Result<(), anyhow::Error> = Transaction::run(|ctx| async move {
        tasks_in
            .save(&Task::new("t-1", "write the report"), &ctx)
            .await?;
        let payload = Message::new("msg-1", "task.created")
            .with_field("taskId", json!("t-1"))
            .to_payload()?;
        outbox_in
            .stage("task.created", "tasks", &payload, &ctx)
            .await?;
        Ok(())
    })
    .await;
    result.unwrap();

    // Committed but not yet delivered.
    assert!(!pipe.tasks.find("t-1").unwrap().unwrap().done);

    let ctx = RepositoryContext::none();
    let out_report = pipe.outbox.drain(&ctx).await.unwrap();
    assert_eq!(out_report.published, 1);

    let in_report = pipe.inbox.drain(&ctx).await.unwrap();
    assert_eq!(in_report.processed, 1);

    assert!(pipe.tasks.find("t-1").unwrap().unwrap().done);
    assert_eq!(pipe.handler.calls(), 1);
    let record = pipe.inbox.store().find_by_id("msg-1").await.unwrap().unwrap();
    assert_eq!(record.status, InboxStatus::Processed);
}

#[tokio::test]
async fn redelivery_is_absorbed_before_the_handler_runs() {
    let pipe = pipeline();

    let payload = Message::new("msg-1", "task.created")
        .with_field("taskId", json!("t-1"))
        .to_payload()
        .unwrap();

    let tasks_in = pipe.tasks.clone();
    let outbox_in = pipe.outbox.clone();
    let payload_in = payload.clone();
    let result: Result<(), anyhow::Error> = Transaction::run(|ctx| async move {
        tasks_in
            .save(&Task::new("t-1", "write the report"), &ctx)
            .await?;
        // The same logical message staged twice, as an application retry would.
        outbox_in
            .stage("task.created", "tasks", &payload_in, &ctx)
            .await?;
        outbox_in
            .stage("task.created", "tasks", &payload_in, &ctx)
            .await?;
        Ok(())
    })
    .await;
    result.unwrap();

    let ctx = RepositoryContext::none();
    let out_report = pipe.outbox.drain(&ctx).await.unwrap();
    assert_eq!(out_report.published, 2);

    // Two deliveries, one inbox record, one handler run.
    let in_report = pipe.inbox.drain(&ctx).await.unwrap();
    assert_eq!(in_report.claimed, 1);
    assert_eq!(in_report.processed, 1);
    assert_eq!(pipe.handler.calls(), 1);
    assert!(pipe.tasks.find("t-1").unwrap().unwrap().done);
}
