//! Staging area for creating or editing one task.
//!
//! Staged values are raw text, the way a user typed them. Nothing reaches
//! the store until [`TaskForm::validate`] produces a [`Commit`].

use chrono::{NaiveDate, NaiveDateTime};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::datetime::{DEADLINE_FORMAT, Reminder, parse_deadline};
use crate::store::StoreError;
use crate::task::{Category, NewTask, Task, TaskPatch, View};

#[derive(Debug, Error)]
pub enum FormError {
    #[error("choose a category before adding a task")]
    NoCategorySelected,

    #[error("no task form is open")]
    NotOpen,

    #[error("task not found: {0}")]
    TaskNotFound(String),

    #[error("please enter a task name")]
    MissingName,

    #[error("please choose a deadline")]
    MissingDeadline,

    #[error("please add at least one reminder")]
    MissingReminders,

    #[error("invalid deadline '{0}'")]
    MalformedDeadline(String),

    #[error("deadline {0} is in the past")]
    DeadlineInPast(NaiveDate),

    #[error("reminder {0} is in the past")]
    ReminderInPast(Reminder),

    #[error("invalid reminder '{0}': expected YYYY-MM-DDTHH:MM")]
    MalformedReminder(String),

    #[error("reminder {0} is already set")]
    DuplicateReminder(Reminder),

    #[error("reminder {0} is not in the list")]
    UnknownReminder(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FormMode {
    #[default]
    Closed,
    Create(Category),
    Edit(Uuid),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Commit {
    Create(NewTask),
    Update { id: Uuid, patch: TaskPatch },
}

#[derive(Debug, Clone, Default)]
pub struct TaskForm {
    mode: FormMode,
    pub name: String,
    pub description: String,
    pub deadline: String,
    reminders: Vec<String>,
    require_reminders: bool,
}

impl TaskForm {
    pub fn new(require_reminders: bool) -> Self {
        Self {
            require_reminders,
            ..Self::default()
        }
    }

    pub fn mode(&self) -> FormMode {
        self.mode
    }

    pub fn is_open(&self) -> bool {
        self.mode != FormMode::Closed
    }

    pub fn reminders(&self) -> &[String] {
        &self.reminders
    }

    pub fn open_create(&mut self, view: View) -> Result<(), FormError> {
        let category = view.category().ok_or(FormError::NoCategorySelected)?;
        self.clear();
        self.mode = FormMode::Create(category);
        debug!(%category, "opened form for creation");
        Ok(())
    }

    /// Pre-fills from `task`. The reminder list is copied, so staged edits
    /// never reach the live task before commit.
    pub fn open_edit(&mut self, task: &Task) {
        self.mode = FormMode::Edit(task.id);
        self.name = task.name.clone();
        self.description = task.description.clone();
        self.deadline = task
            .deadline
            .map(|d| d.format(DEADLINE_FORMAT).to_string())
            .unwrap_or_default();
        self.reminders = task.reminders.iter().map(ToString::to_string).collect();
        debug!(id = %task.id, "opened form for edit");
    }

    pub fn add_reminder(&mut self, raw: &str) -> Result<Reminder, FormError> {
        let reminder =
            Reminder::parse(raw).map_err(|_| FormError::MalformedReminder(raw.to_string()))?;
        let duplicate = self
            .reminders
            .iter()
            .filter_map(|r| Reminder::parse(r).ok())
            .any(|existing| existing == reminder);
        if duplicate {
            return Err(FormError::DuplicateReminder(reminder));
        }
        self.reminders.push(reminder.to_string());
        Ok(reminder)
    }

    pub fn remove_reminder(&mut self, raw: &str) -> Result<(), FormError> {
        let wanted = Reminder::parse(raw).ok();
        let idx = self
            .reminders
            .iter()
            .position(|r| r == raw.trim() || (wanted.is_some() && Reminder::parse(r).ok() == wanted))
            .ok_or_else(|| FormError::UnknownReminder(raw.to_string()))?;
        self.reminders.remove(idx);
        Ok(())
    }

    pub fn clear_reminders(&mut self) {
        self.reminders.clear();
    }

    /// Checks staged values against `now` and reports the first violation.
    ///
    /// Order: name, deadline presence, reminder presence (when required),
    /// deadline format, deadline in the past, reminders in the past,
    /// reminder format.
    pub fn validate(&self, now: NaiveDateTime) -> Result<Commit, FormError> {
        if self.mode == FormMode::Closed {
            return Err(FormError::NotOpen);
        }

        let name = self.name.trim();
        if name.is_empty() {
            return Err(FormError::MissingName);
        }

        let raw_deadline = self.deadline.trim();
        if raw_deadline.is_empty() {
            return Err(FormError::MissingDeadline);
        }
        if self.require_reminders && self.reminders.is_empty() {
            return Err(FormError::MissingReminders);
        }

        let today = now.date();
        let deadline = parse_deadline(raw_deadline, today)
            .map_err(|_| FormError::MalformedDeadline(raw_deadline.to_string()))?;
        if deadline < today {
            return Err(FormError::DeadlineInPast(deadline));
        }

        let parsed: Vec<Result<Reminder, &String>> = self
            .reminders
            .iter()
            .map(|raw| Reminder::parse(raw).map_err(|_| raw))
            .collect();
        if let Some(past) = parsed
            .iter()
            .filter_map(|r| r.as_ref().ok())
            .find(|r| r.at() < now)
        {
            return Err(FormError::ReminderInPast(*past));
        }
        let reminders = parsed
            .into_iter()
            .map(|r| r.map_err(|raw| FormError::MalformedReminder(raw.clone())))
            .collect::<Result<Vec<_>, _>>()?;

        let description = self.description.trim().to_string();
        let commit = match self.mode {
            FormMode::Create(category) => Commit::Create(NewTask {
                name: name.to_string(),
                description,
                category,
                deadline: Some(deadline),
                reminders,
            }),
            FormMode::Edit(id) => Commit::Update {
                id,
                patch: TaskPatch {
                    name: Some(name.to_string()),
                    description: Some(description),
                    deadline: Some(Some(deadline)),
                    reminders: Some(reminders),
                    ..TaskPatch::default()
                },
            },
            FormMode::Closed => return Err(FormError::NotOpen),
        };
        Ok(commit)
    }

    pub fn close(&mut self) {
        self.clear();
        self.mode = FormMode::Closed;
    }

    fn clear(&mut self) {
        self.name.clear();
        self.description.clear();
        self.deadline.clear();
        self.reminders.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> NaiveDateTime {
        Reminder::parse("2026-02-17T10:00").expect("now").at()
    }

    fn create_form() -> TaskForm {
        let mut form = TaskForm::new(false);
        form.open_create(View::Only(Category::Work)).expect("open");
        form.name = "ship release".to_string();
        form.deadline = "2099-01-01".to_string();
        form
    }

    #[test]
    fn create_requires_concrete_category() {
        let mut form = TaskForm::new(false);
        assert!(matches!(
            form.open_create(View::All),
            Err(FormError::NoCategorySelected)
        ));
        assert!(!form.is_open());
    }

    #[test]
    fn empty_name_is_rejected_first() {
        let mut form = create_form();
        form.name = "   ".to_string();
        form.deadline = String::new();
        assert!(matches!(form.validate(now()), Err(FormError::MissingName)));
    }

    #[test]
    fn past_deadline_is_rejected() {
        let mut form = create_form();
        form.deadline = "2020-01-01".to_string();
        assert!(matches!(
            form.validate(now()),
            Err(FormError::DeadlineInPast(_))
        ));
    }

    #[test]
    fn oversized_day_offset_is_malformed() {
        let mut form = create_form();
        form.deadline = "+99999999999d".to_string();
        assert!(matches!(
            form.validate(now()),
            Err(FormError::MalformedDeadline(raw)) if raw == "+99999999999d"
        ));
        assert_eq!(form.mode(), FormMode::Create(Category::Work));
    }

    #[test]
    fn deadline_today_is_accepted() {
        let mut form = create_form();
        form.deadline = "2026-02-17".to_string();
        assert!(form.validate(now()).is_ok());
    }

    #[test]
    fn reminders_required_when_configured() {
        let mut form = TaskForm::new(true);
        form.open_create(View::Only(Category::Personal)).expect("open");
        form.name = "call mom".to_string();
        form.deadline = "2099-01-01".to_string();
        assert!(matches!(
            form.validate(now()),
            Err(FormError::MissingReminders)
        ));
    }

    #[test]
    fn reminder_add_rejects_malformed_and_duplicates() {
        let mut form = create_form();
        assert!(matches!(
            form.add_reminder("next tuesday"),
            Err(FormError::MalformedReminder(_))
        ));
        form.add_reminder("2099-01-01T08:00").expect("first add");
        assert!(matches!(
            form.add_reminder("2099-01-01 08:00"),
            Err(FormError::DuplicateReminder(_))
        ));
        assert_eq!(form.reminders().len(), 1);
    }

    #[test]
    fn past_reminder_reported_before_malformed_one() {
        let mut form = create_form();
        form.add_reminder("2026-02-17T09:00").expect("accepted at add time");
        form.reminders.push("garbage".to_string());
        assert!(matches!(
            form.validate(now()),
            Err(FormError::ReminderInPast(_))
        ));

        form.remove_reminder("2026-02-17T09:00").expect("remove");
        assert!(matches!(
            form.validate(now()),
            Err(FormError::MalformedReminder(raw)) if raw == "garbage"
        ));
    }

    #[test]
    fn edit_copies_reminders_and_builds_patch() {
        let task = Task::from_new(
            Uuid::new_v4(),
            NewTask {
                name: "old".to_string(),
                description: "desc".to_string(),
                category: Category::Shopping,
                deadline: NaiveDate::from_ymd_opt(2099, 5, 1),
                reminders: vec![Reminder::parse("2099-04-30T18:00").expect("reminder")],
            },
        );
        let mut form = TaskForm::new(false);
        form.open_edit(&task);
        form.add_reminder("2099-04-30T19:00").expect("add");
        assert_eq!(task.reminders.len(), 1);
        assert_eq!(form.deadline, "2099-05-01");

        form.name = "new".to_string();
        match form.validate(now()).expect("valid") {
            Commit::Update { id, patch } => {
                assert_eq!(id, task.id);
                assert_eq!(patch.name.as_deref(), Some("new"));
                assert_eq!(patch.reminders.map(|r| r.len()), Some(2));
                assert_eq!(patch.done, None);
            }
            other => panic!("expected update, got {other:?}"),
        }
    }

    #[test]
    fn close_discards_staged_values() {
        let mut form = create_form();
        form.add_reminder("2099-01-01T08:00").expect("add");
        form.close();
        assert!(!form.is_open());
        assert!(form.name.is_empty());
        assert!(form.reminders().is_empty());
        assert!(matches!(form.validate(now()), Err(FormError::NotOpen)));
    }
}
