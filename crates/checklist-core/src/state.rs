//! In-memory reflection of the store plus view and selection state.
//!
//! All changes go through [`AppState::reduce`]. Snapshots replace the task
//! list wholesale; nothing is diffed.

use std::collections::BTreeSet;

use tracing::{debug, trace};
use uuid::Uuid;

use crate::filter;
use crate::store::Snapshot;
use crate::task::{Task, TaskPatch, View};

#[derive(Debug, Clone)]
pub enum Action {
    Snapshot(Snapshot),
    /// Local write from the poller, ahead of the store's broadcast.
    Patch { id: Uuid, patch: TaskPatch },
    SwitchView(View),
    ToggleSelected(Uuid),
    SelectAll(bool),
    ClearSelection,
}

#[derive(Debug, Clone, Default)]
pub struct AppState {
    tasks: Vec<Task>,
    revision: u64,
    view: View,
    selected: BTreeSet<Uuid>,
}

impl AppState {
    pub fn new(view: View) -> Self {
        Self {
            view,
            ..Self::default()
        }
    }

    pub fn reduce(&mut self, action: Action) {
        match action {
            Action::Snapshot(snapshot) => {
                debug!(
                    revision = snapshot.revision,
                    count = snapshot.tasks.len(),
                    cleared = self.selected.len(),
                    "applying snapshot"
                );
                self.tasks = snapshot.tasks;
                self.revision = snapshot.revision;
                self.selected.clear();
            }
            Action::Patch { id, patch } => {
                if let Some(task) = self.tasks.iter_mut().find(|t| t.id == id) {
                    patch.apply_to(task);
                } else {
                    trace!(%id, "patch for task no longer in list");
                }
            }
            Action::SwitchView(view) => {
                self.view = view;
                self.selected.clear();
            }
            Action::ToggleSelected(id) => {
                filter::toggle(&mut self.selected, id);
            }
            Action::SelectAll(on) => {
                let visible: Vec<Uuid> = self.visible().iter().map(|t| t.id).collect();
                filter::set_all(&mut self.selected, &visible, on);
            }
            Action::ClearSelection => self.selected.clear(),
        }
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn task(&self, id: Uuid) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn view(&self) -> View {
        self.view
    }

    pub fn visible(&self) -> Vec<&Task> {
        filter::filter_tasks(&self.tasks, self.view)
    }

    pub fn selected(&self) -> &BTreeSet<Uuid> {
        &self.selected
    }

    pub fn all_selected(&self) -> bool {
        let visible: Vec<Uuid> = self.visible().iter().map(|t| t.id).collect();
        filter::all_selected(&self.selected, &visible)
    }
}
