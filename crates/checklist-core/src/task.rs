use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::datetime::Reminder;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Category {
    Personal,
    Work,
    Shopping,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::Personal, Category::Work, Category::Shopping];

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Personal => "Personal",
            Category::Work => "Work",
            Category::Shopping => "Shopping",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Category::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| anyhow!("unknown category: {wanted}"))
    }
}

/// The active view: either every task, or one category.
///
/// "All" lives here and only here, so a stored task can never carry it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum View {
    #[default]
    All,
    Only(Category),
}

impl View {
    pub fn category(self) -> Option<Category> {
        match self {
            View::All => None,
            View::Only(category) => Some(category),
        }
    }

    pub fn includes(self, task: &Task) -> bool {
        match self {
            View::All => true,
            View::Only(category) => task.category == category,
        }
    }
}

impl fmt::Display for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            View::All => f.write_str("All"),
            View::Only(category) => category.fmt(f),
        }
    }
}

impl FromStr for View {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("all") {
            return Ok(View::All);
        }
        s.parse::<Category>().map(View::Only)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Task {
    pub id: Uuid,

    pub name: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub done: bool,

    pub category: Category,

    #[serde(default)]
    pub deadline: Option<NaiveDate>,

    #[serde(default)]
    pub reminders: Vec<Reminder>,

    #[serde(default)]
    pub fired_reminders: Vec<Reminder>,

    #[serde(default)]
    pub notified: bool,

    #[serde(default)]
    pub reminder_notified: bool,
}

impl Task {
    pub fn from_new(id: Uuid, new: NewTask) -> Self {
        Self {
            id,
            name: new.name,
            description: new.description,
            done: false,
            category: new.category,
            deadline: new.deadline,
            reminders: new.reminders,
            fired_reminders: vec![],
            notified: false,
            reminder_notified: false,
        }
    }

    pub fn short_id(&self) -> String {
        let mut id = self.id.simple().to_string();
        id.truncate(8);
        id
    }

    pub fn has_fired(&self, reminder: &Reminder) -> bool {
        self.fired_reminders.contains(reminder)
    }

    pub fn unfired_reminders(&self) -> impl Iterator<Item = &Reminder> {
        self.reminders.iter().filter(|r| !self.has_fired(r))
    }

    pub fn fired_is_subset(&self) -> bool {
        self.fired_reminders
            .iter()
            .all(|fired| self.reminders.contains(fired))
    }
}

/// A task staged for creation. It has no identifier until the store assigns one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewTask {
    pub name: String,
    pub description: String,
    pub category: Category,
    pub deadline: Option<NaiveDate>,
    pub reminders: Vec<Reminder>,
}

/// Partial update applied by identifier; `None` leaves a field untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub done: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline: Option<Option<NaiveDate>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reminders: Option<Vec<Reminder>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fired_reminders: Option<Vec<Reminder>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notified: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reminder_notified: Option<bool>,
}

impl TaskPatch {
    pub fn apply_to(&self, task: &mut Task) {
        if let Some(name) = &self.name {
            task.name = name.clone();
        }
        if let Some(description) = &self.description {
            task.description = description.clone();
        }
        if let Some(done) = self.done {
            task.done = done;
        }
        if let Some(deadline) = self.deadline {
            task.deadline = deadline;
        }
        if let Some(reminders) = &self.reminders {
            task.reminders = reminders.clone();
        }
        if let Some(fired) = &self.fired_reminders {
            task.fired_reminders = fired.clone();
        }
        if let Some(notified) = self.notified {
            task.notified = notified;
        }
        if let Some(reminder_notified) = self.reminder_notified {
            task.reminder_notified = reminder_notified;
        }
    }
}
