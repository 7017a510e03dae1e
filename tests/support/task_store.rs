//! A small task repository standing in for application state, so the
//! tests can watch business writes and outbox writes settle together.

use relay_rust::{MemoryBackend, RepositoryContext, StoreError};

#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    pub id: String,
    pub title: String,
    pub done: bool,
}

impl Task {
    pub fn new(id: &str, title: &str) -> Self {
        Task {
            id: id.to_string(),
            title: title.to_string(),
            done: false,
        }
    }

    pub fn complete(mut self) -> Self {
        self.done = true;
        self
    }
}

/// Transaction-aware task store. Clones share the same rows.
#[derive(Clone)]
pub struct TaskStore {
    backend: MemoryBackend<Task>,
}

impl TaskStore {
    pub fn new() -> Self {
        TaskStore {
            backend: MemoryBackend::new("tasks"),
        }
    }

    pub async fn save(&self, task: &Task, ctx: &RepositoryContext) -> Result<(), StoreError> {
        self.backend.insert(&task.id, task.clone(), ctx).await
    }

    pub fn find(&self, id: &str) -> Result<Option<Task>, StoreError> {
        self.backend.get(id)
    }

    pub async fn remove(&self, id: &str, ctx: &RepositoryContext) -> Result<bool, StoreError> {
        self.backend.remove(id, ctx).await
    }

    pub async fn clear(&self, ctx: &RepositoryContext) -> Result<(), StoreError> {
        self.backend.clear(ctx).await
    }

    pub fn len(&self) -> Result<usize, StoreError> {
        self.backend.len()
    }
}

impl Default for TaskStore {
    fn default() -> Self {
        Self::new()
    }
}
