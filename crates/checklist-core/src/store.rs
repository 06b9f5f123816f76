//! Document store abstraction over the "tasks" collection.
//!
//! Every mutation is expected to be followed by a fresh [`Snapshot`] on the
//! subscription channel. Callers never patch their local list from a write;
//! they wait for the broadcast.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::task::{NewTask, Task, TaskPatch};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("task not found: {0}")]
    NotFound(Uuid),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("io error: {0}")]
    Io(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

/// The full, ordered contents of the collection at one revision.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    pub revision: u64,
    pub tasks: Vec<Task>,
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Current contents of the collection.
    async fn snapshot(&self) -> Result<Snapshot, StoreError>;

    /// Live feed of full snapshots, one per change.
    fn subscribe(&self) -> broadcast::Receiver<Snapshot>;

    /// Inserts a new document and returns it with its assigned identifier.
    async fn create(&self, task: NewTask) -> Result<Task, StoreError>;

    async fn update(&self, id: Uuid, patch: TaskPatch) -> Result<(), StoreError>;

    async fn delete(&self, id: Uuid) -> Result<(), StoreError>;
}
