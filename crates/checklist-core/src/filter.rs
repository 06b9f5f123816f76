use std::collections::BTreeSet;

use uuid::Uuid;

use crate::task::{
  Task,
  View
};

/// Tasks visible under `view`, in their original relative order.
pub fn filter_tasks(
  tasks: &[Task],
  view: View
) -> Vec<&Task> {
  tasks
    .iter()
    .filter(|task| view.includes(task))
    .collect()
}

pub fn toggle(
  selected: &mut BTreeSet<Uuid>,
  id: Uuid
) {
  if !selected.remove(&id) {
    selected.insert(id);
  }
}

/// Adds or removes every id in `visible`; ids outside it are left alone.
pub fn set_all(
  selected: &mut BTreeSet<Uuid>,
  visible: &[Uuid],
  on: bool
) {
  for id in visible {
    if on {
      selected.insert(*id);
    } else {
      selected.remove(id);
    }
  }
}

pub fn all_selected(
  selected: &BTreeSet<Uuid>,
  visible: &[Uuid]
) -> bool {
  !visible.is_empty()
    && visible
      .iter()
      .all(|id| selected.contains(id))
}
