//! One user's view of the checklist: store handle, state, form and prompts.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::datetime::{Reminder, WallClock};
use crate::form::{Commit, FormError, TaskForm};
use crate::notify::{Notifier, Permission};
use crate::poller::{Poller, PollerSettings};
use crate::state::{Action, AppState};
use crate::store::{DocumentStore, Snapshot, StoreError};
use crate::task::{Task, TaskPatch, View};

/// Asks the user before anything irreversible happens.
pub trait Confirm: Send + Sync {
    fn confirm(&self, prompt: &str) -> bool;
}

/// Answers yes to everything; used for `--yes` and `confirm = off`.
#[derive(Debug, Clone, Copy, Default)]
pub struct AssumeYes;

impl Confirm for AssumeYes {
    fn confirm(&self, prompt: &str) -> bool {
        debug!(prompt, "confirmation assumed");
        true
    }
}

#[derive(Debug, Error)]
pub enum LookupError {
    #[error("no task matches '{0}'")]
    NotFound(String),

    #[error("'{0}' matches {1} tasks; use more characters")]
    Ambiguous(String, usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submitted {
    Created(Task),
    Updated(Uuid),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    Declined,
}

#[derive(Debug)]
pub enum BulkDeleteOutcome {
    NothingSelected,
    Declined,
    Finished(Vec<(Uuid, Result<(), StoreError>)>),
}

impl BulkDeleteOutcome {
    pub fn deleted(&self) -> usize {
        match self {
            BulkDeleteOutcome::Finished(results) => {
                results.iter().filter(|(_, r)| r.is_ok()).count()
            }
            _ => 0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SessionSettings {
    pub require_reminders: bool,
    pub clock: WallClock,
}

pub struct Session {
    store: Arc<dyn DocumentStore>,
    state: Arc<Mutex<AppState>>,
    snapshots: broadcast::Receiver<Snapshot>,
    form: TaskForm,
    confirm: Box<dyn Confirm>,
    notifier: Arc<dyn Notifier>,
    clock: WallClock,
}

impl Session {
    /// Subscribes first, then seeds the state from the current contents, so
    /// no change between the two is missed.
    #[instrument(skip_all, fields(view = %view))]
    pub async fn open(
        store: Arc<dyn DocumentStore>,
        view: View,
        settings: SessionSettings,
        confirm: Box<dyn Confirm>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self, StoreError> {
        let snapshots = store.subscribe();
        let initial = store.snapshot().await?;

        let mut state = AppState::new(view);
        state.reduce(Action::Snapshot(initial));
        info!(tasks = state.tasks().len(), "session opened");

        Ok(Self {
            store,
            state: Arc::new(Mutex::new(state)),
            snapshots,
            form: TaskForm::new(settings.require_reminders),
            confirm,
            notifier,
            clock: settings.clock,
        })
    }

    pub fn state(&self) -> Arc<Mutex<AppState>> {
        Arc::clone(&self.state)
    }

    pub fn clock(&self) -> WallClock {
        self.clock
    }

    pub fn poller(&self, settings: PollerSettings) -> Poller {
        Poller::new(
            Arc::clone(&self.store),
            Arc::clone(&self.state),
            Arc::clone(&self.notifier),
            self.clock,
            settings,
        )
    }

    pub fn request_notification_permission(&self) -> Permission {
        self.notifier.request_permission()
    }

    pub fn apply(&self, snapshot: Snapshot) {
        self.state.lock().reduce(Action::Snapshot(snapshot));
    }

    /// Applies every snapshot already waiting on the subscription.
    pub fn sync(&mut self) -> usize {
        let mut applied = 0;
        loop {
            match self.snapshots.try_recv() {
                Ok(snapshot) => {
                    self.apply(snapshot);
                    applied += 1;
                }
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!(skipped, "snapshot subscriber lagged");
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }
        applied
    }

    /// Waits for the next snapshot. `None` once the store is gone.
    pub async fn next_snapshot(&mut self) -> Option<Snapshot> {
        loop {
            match self.snapshots.recv().await {
                Ok(snapshot) => return Some(snapshot),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "snapshot subscriber lagged");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    pub fn view(&self) -> View {
        self.state.lock().view()
    }

    pub fn switch_view(&self, view: View) {
        self.state.lock().reduce(Action::SwitchView(view));
    }

    pub fn tasks(&self) -> Vec<Task> {
        self.state.lock().tasks().to_vec()
    }

    pub fn visible(&self) -> Vec<Task> {
        self.state.lock().visible().into_iter().cloned().collect()
    }

    /// Finds a task by full id or unique id prefix.
    pub fn resolve(&self, reference: &str) -> Result<Uuid, LookupError> {
        let needle = reference.trim().to_ascii_lowercase().replace('-', "");
        if needle.is_empty() {
            return Err(LookupError::NotFound(reference.to_string()));
        }
        let state = self.state.lock();
        let matches: Vec<Uuid> = state
            .tasks()
            .iter()
            .filter(|t| t.id.simple().to_string().starts_with(&needle))
            .map(|t| t.id)
            .collect();
        match matches.as_slice() {
            [id] => Ok(*id),
            [] => Err(LookupError::NotFound(reference.to_string())),
            many => Err(LookupError::Ambiguous(reference.to_string(), many.len())),
        }
    }

    pub fn form(&self) -> &TaskForm {
        &self.form
    }

    pub fn form_mut(&mut self) -> &mut TaskForm {
        &mut self.form
    }

    pub fn open_create(&mut self) -> Result<(), FormError> {
        let view = self.view();
        self.form.open_create(view)
    }

    pub fn open_edit(&mut self, id: Uuid) -> Result<(), FormError> {
        let task = self
            .state
            .lock()
            .task(id)
            .cloned()
            .ok_or_else(|| FormError::TaskNotFound(id.to_string()))?;
        self.form.open_edit(&task);
        Ok(())
    }

    pub fn close_form(&mut self) {
        self.form.close();
    }

    /// Validates the staged task and commits it.
    ///
    /// On a store failure the error is logged and returned and the form keeps
    /// its staged values.
    #[instrument(skip(self, now), fields(now = %now))]
    pub async fn submit(&mut self, now: DateTime<Utc>) -> Result<Submitted, FormError> {
        let commit = self.form.validate(self.clock.local(now))?;

        let submitted = match commit {
            Commit::Create(new) => {
                let created = self.store.create(new).await.map_err(|err| {
                    error!(error = %err, "failed to create task");
                    err
                })?;
                Submitted::Created(created)
            }
            Commit::Update { id, mut patch } => {
                patch.fired_reminders = self.pruned_fired(id, &patch);
                self.store.update(id, patch).await.map_err(|err| {
                    error!(%id, error = %err, "failed to update task");
                    err
                })?;
                Submitted::Updated(id)
            }
        };

        self.form.close();
        Ok(submitted)
    }

    fn pruned_fired(&self, id: Uuid, patch: &TaskPatch) -> Option<Vec<Reminder>> {
        let reminders = patch.reminders.as_ref()?;
        let state = self.state.lock();
        let task = state.task(id)?;
        let kept: Vec<_> = task
            .fired_reminders
            .iter()
            .filter(|r| reminders.contains(r))
            .copied()
            .collect();
        (kept.len() != task.fired_reminders.len()).then_some(kept)
    }

    /// Flips completion in the store. Returns the new value.
    #[instrument(skip(self), fields(id = %id))]
    pub async fn toggle_done(&self, id: Uuid) -> Result<bool, StoreError> {
        let done = self
            .state
            .lock()
            .task(id)
            .map(|t| !t.done)
            .ok_or(StoreError::NotFound(id))?;
        self.store
            .update(
                id,
                TaskPatch {
                    done: Some(done),
                    ..TaskPatch::default()
                },
            )
            .await?;
        Ok(done)
    }

    #[instrument(skip(self), fields(id = %id))]
    pub async fn delete(&self, id: Uuid) -> Result<DeleteOutcome, StoreError> {
        let name = self
            .state
            .lock()
            .task(id)
            .map(|t| t.name.clone())
            .ok_or(StoreError::NotFound(id))?;
        if !self
            .confirm
            .confirm(&format!("Delete task '{name}'? This cannot be undone."))
        {
            info!("delete declined");
            return Ok(DeleteOutcome::Declined);
        }
        self.store.delete(id).await?;
        Ok(DeleteOutcome::Deleted)
    }

    pub fn toggle_selected(&self, id: Uuid) {
        self.state.lock().reduce(Action::ToggleSelected(id));
    }

    pub fn set_select_all(&self, on: bool) {
        self.state.lock().reduce(Action::SelectAll(on));
    }

    pub fn all_selected(&self) -> bool {
        self.state.lock().all_selected()
    }

    pub fn selected(&self) -> Vec<Uuid> {
        self.state.lock().selected().iter().copied().collect()
    }

    /// Deletes every selected task concurrently, then clears the selection.
    ///
    /// The selection is cleared only after every delete has resolved, failed
    /// ones included.
    #[instrument(skip(self))]
    pub async fn bulk_delete(&self) -> BulkDeleteOutcome {
        let ids = self.selected();
        if ids.is_empty() {
            return BulkDeleteOutcome::NothingSelected;
        }
        if !self.confirm.confirm(&format!(
            "Delete {} selected task(s)? This cannot be undone.",
            ids.len()
        )) {
            info!(count = ids.len(), "bulk delete declined");
            return BulkDeleteOutcome::Declined;
        }

        let store = &self.store;
        let results = join_all(ids.iter().map(|id| async move {
            let result = store.delete(*id).await;
            if let Err(err) = &result {
                error!(id = %id, error = %err, "bulk delete failed for task");
            }
            (*id, result)
        }))
        .await;

        self.state.lock().reduce(Action::ClearSelection);
        info!(
            requested = ids.len(),
            failed = results.iter().filter(|(_, r)| r.is_err()).count(),
            "bulk delete finished"
        );
        BulkDeleteOutcome::Finished(results)
    }
}
