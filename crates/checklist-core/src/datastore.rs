use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use anyhow::Context;
use async_trait::async_trait;
use parking_lot::Mutex;
use tempfile::NamedTempFile;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::store::{DocumentStore, Snapshot, StoreError};
use crate::task::{NewTask, Task, TaskPatch};

const SNAPSHOT_CHANNEL_CAPACITY: usize = 64;

/// JSON-lines document store with in-process snapshot fan-out.
///
/// The file is the source of truth: every write reloads it, applies the
/// change, and persists atomically before broadcasting the new contents.
#[derive(Debug)]
pub struct FileStore {
    pub data_dir: PathBuf,
    pub tasks_path: PathBuf,
    state: Mutex<Published>,
    tx: broadcast::Sender<Snapshot>,
}

#[derive(Debug, Default)]
struct Published {
    revision: u64,
    tasks: Vec<Task>,
}

impl FileStore {
    #[tracing::instrument(skip(data_dir))]
    pub fn open(data_dir: &Path) -> anyhow::Result<Self> {
        let data_dir = data_dir.to_path_buf();
        fs::create_dir_all(&data_dir)
            .with_context(|| format!("failed to create {}", data_dir.display()))?;

        let tasks_path = data_dir.join("tasks.data");
        if !tasks_path.exists() {
            fs::write(&tasks_path, "")?;
        }

        let tasks = load_jsonl(&tasks_path).context("failed to load tasks.data")?;
        info!(
            data_dir = %data_dir.display(),
            tasks = %tasks_path.display(),
            count = tasks.len(),
            "opened datastore"
        );

        let (tx, _) = broadcast::channel(SNAPSHOT_CHANNEL_CAPACITY);
        Ok(Self {
            data_dir,
            tasks_path,
            state: Mutex::new(Published { revision: 0, tasks }),
            tx,
        })
    }

    /// Re-reads the file and broadcasts if another process changed it.
    #[tracing::instrument(skip(self))]
    pub fn reload(&self) -> Result<bool, StoreError> {
        let mut state = self.state.lock();
        let tasks = load_jsonl(&self.tasks_path)?;
        if tasks == state.tasks {
            return Ok(false);
        }
        debug!(count = tasks.len(), "tasks file changed on disk");
        self.publish(&mut state, tasks);
        Ok(true)
    }

    fn mutate<T>(
        &self,
        op: impl FnOnce(&mut Vec<Task>) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut state = self.state.lock();
        let mut tasks = load_jsonl(&self.tasks_path)?;
        let out = op(&mut tasks)?;
        save_jsonl_atomic(&self.tasks_path, &tasks)?;
        self.publish(&mut state, tasks);
        Ok(out)
    }

    fn publish(&self, state: &mut Published, tasks: Vec<Task>) {
        state.revision += 1;
        state.tasks = tasks;
        let snapshot = Snapshot {
            revision: state.revision,
            tasks: state.tasks.clone(),
        };
        // No receivers is fine: the file already holds the truth.
        if self.tx.send(snapshot).is_err() {
            debug!(revision = state.revision, "no snapshot subscribers");
        }
    }
}

#[async_trait]
impl DocumentStore for FileStore {
    async fn snapshot(&self) -> Result<Snapshot, StoreError> {
        let state = self.state.lock();
        Ok(Snapshot {
            revision: state.revision,
            tasks: state.tasks.clone(),
        })
    }

    fn subscribe(&self) -> broadcast::Receiver<Snapshot> {
        self.tx.subscribe()
    }

    #[tracing::instrument(skip(self, task), fields(name = %task.name, category = %task.category))]
    async fn create(&self, task: NewTask) -> Result<Task, StoreError> {
        let created = Task::from_new(Uuid::new_v4(), task);
        let out = created.clone();
        self.mutate(move |tasks| {
            tasks.push(created);
            Ok(())
        })?;
        info!(id = %out.id, "created task");
        Ok(out)
    }

    #[tracing::instrument(skip(self, patch), fields(id = %id))]
    async fn update(&self, id: Uuid, patch: TaskPatch) -> Result<(), StoreError> {
        self.mutate(|tasks| {
            let task = tasks
                .iter_mut()
                .find(|t| t.id == id)
                .ok_or(StoreError::NotFound(id))?;
            patch.apply_to(task);
            Ok(())
        })?;
        debug!("updated task");
        Ok(())
    }

    #[tracing::instrument(skip(self), fields(id = %id))]
    async fn delete(&self, id: Uuid) -> Result<(), StoreError> {
        self.mutate(|tasks| {
            let idx = tasks
                .iter()
                .position(|t| t.id == id)
                .ok_or(StoreError::NotFound(id))?;
            tasks.remove(idx);
            Ok(())
        })?;
        info!("deleted task");
        Ok(())
    }
}

#[tracing::instrument(skip(path))]
fn load_jsonl(path: &Path) -> Result<Vec<Task>, StoreError> {
    debug!(file = %path.display(), "loading jsonl");
    let file = fs::File::open(path)?;
    let reader = BufReader::new(file);

    let mut out = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let task: Task = serde_json::from_str(trimmed).map_err(|err| {
            warn!(file = %path.display(), line = idx + 1, error = %err, "corrupt task line");
            StoreError::Serialization(format!(
                "failed parsing {} line {}: {err}",
                path.display(),
                idx + 1
            ))
        })?;
        out.push(task);
    }

    debug!(count = out.len(), "loaded tasks from jsonl");
    Ok(out)
}

#[tracing::instrument(skip(path, tasks))]
fn save_jsonl_atomic(path: &Path, tasks: &[Task]) -> Result<(), StoreError> {
    debug!(file = %path.display(), count = tasks.len(), "saving jsonl atomically");

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = NamedTempFile::new_in(dir)?;
    for task in tasks {
        let serialized = serde_json::to_string(task)?;
        writeln!(temp, "{serialized}")?;
    }
    temp.flush()?;

    temp.persist(path).map_err(|err| {
        StoreError::Io(format!("failed to persist {}: {}", path.display(), err))
    })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::Category;
    use tempfile::tempdir;

    fn new_task(name: &str) -> NewTask {
        NewTask {
            name: name.to_string(),
            description: String::new(),
            category: Category::Work,
            deadline: None,
            reminders: vec![],
        }
    }

    #[tokio::test]
    async fn writes_broadcast_full_snapshots_in_order() {
        let temp = tempdir().expect("tempdir");
        let store = FileStore::open(temp.path()).expect("open");
        let mut rx = store.subscribe();

        let a = store.create(new_task("a")).await.expect("create a");
        let b = store.create(new_task("b")).await.expect("create b");

        let first = rx.recv().await.expect("first snapshot");
        let second = rx.recv().await.expect("second snapshot");
        assert_eq!(first.tasks.len(), 1);
        assert_eq!(second.revision, first.revision + 1);
        let ids: Vec<Uuid> = second.tasks.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![a.id, b.id]);
    }

    #[tokio::test]
    async fn update_and_delete_missing_task_fail() {
        let temp = tempdir().expect("tempdir");
        let store = FileStore::open(temp.path()).expect("open");
        let missing = Uuid::new_v4();

        assert!(matches!(
            store.update(missing, TaskPatch::default()).await,
            Err(StoreError::NotFound(id)) if id == missing
        ));
        assert!(matches!(
            store.delete(missing).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn contents_survive_reopen() {
        let temp = tempdir().expect("tempdir");
        let created = {
            let store = FileStore::open(temp.path()).expect("open");
            let task = store.create(new_task("persist me")).await.expect("create");
            store
                .update(
                    task.id,
                    TaskPatch {
                        done: Some(true),
                        ..TaskPatch::default()
                    },
                )
                .await
                .expect("update");
            task
        };

        let reopened = FileStore::open(temp.path()).expect("reopen");
        let snapshot = reopened.snapshot().await.expect("snapshot");
        assert_eq!(snapshot.tasks.len(), 1);
        assert_eq!(snapshot.tasks[0].id, created.id);
        assert!(snapshot.tasks[0].done);
    }

    #[tokio::test]
    async fn reload_detects_external_writes() {
        let temp = tempdir().expect("tempdir");
        let store = FileStore::open(temp.path()).expect("open");
        let other = FileStore::open(temp.path()).expect("second handle");
        let mut rx = store.subscribe();

        assert!(!store.reload().expect("reload unchanged"));
        other.create(new_task("from elsewhere")).await.expect("create");
        assert!(store.reload().expect("reload changed"));

        let snapshot = rx.recv().await.expect("snapshot");
        assert_eq!(snapshot.tasks[0].name, "from elsewhere");
    }
}
