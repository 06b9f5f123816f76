//! Fixed-interval reconciliation of deadlines and reminders against the clock.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use parking_lot::Mutex;
use tracing::{debug, error, info, instrument};
use uuid::Uuid;

use crate::datetime::{Reminder, WallClock, deadline_elapsed};
use crate::notify::{self, Notification, Notifier};
use crate::state::{Action, AppState};
use crate::store::{DocumentStore, StoreError};
use crate::task::{Task, TaskPatch};

pub const MIN_INTERVAL_SECS: u64 = 15;
pub const MAX_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_INTERVAL_SECS: u64 = 30;
pub const DEFAULT_WINDOW_SECS: i64 = 300;

/// When a reminder counts as due.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReminderWindow {
    /// Due while `now - reminder` lies in `0..=width`.
    Trailing(Duration),
    /// Due from its timestamp onwards until fired.
    Catchup,
}

impl Default for ReminderWindow {
    fn default() -> Self {
        ReminderWindow::Trailing(Duration::seconds(DEFAULT_WINDOW_SECS))
    }
}

impl ReminderWindow {
    pub fn contains(&self, reminder: NaiveDateTime, now: NaiveDateTime) -> bool {
        if reminder > now {
            return false;
        }
        match self {
            ReminderWindow::Trailing(width) => now - reminder <= *width,
            ReminderWindow::Catchup => true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PollerSettings {
    pub interval: StdDuration,
    pub window: ReminderWindow,
    pub icon: String,
}

impl Default for PollerSettings {
    fn default() -> Self {
        Self {
            interval: StdDuration::from_secs(DEFAULT_INTERVAL_SECS),
            window: ReminderWindow::default(),
            icon: "checklist.png".to_string(),
        }
    }
}

pub fn clamp_interval(secs: u64) -> StdDuration {
    StdDuration::from_secs(secs.clamp(MIN_INTERVAL_SECS, MAX_INTERVAL_SECS))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    DeadlinePassed,
    ReminderFired { reminder: Reminder, last: bool },
}

#[derive(Debug, Clone)]
pub struct PlannedUpdate {
    pub id: Uuid,
    pub trigger: Trigger,
    pub patch: TaskPatch,
    pub notification: Notification,
}

/// Decides what one tick does, without touching any state.
///
/// Tasks are visited in list order. Per task, an elapsed deadline wins;
/// otherwise the first unfired reminder in the window fires, and later ones
/// wait for the next tick.
pub fn plan_tick(
    tasks: &[Task],
    now: NaiveDateTime,
    window: ReminderWindow,
    icon: &str,
) -> Vec<PlannedUpdate> {
    let mut planned = Vec::new();

    for task in tasks {
        if let Some(deadline) = task.deadline
            && !task.done
            && !task.notified
            && deadline_elapsed(deadline, now)
        {
            planned.push(PlannedUpdate {
                id: task.id,
                trigger: Trigger::DeadlinePassed,
                patch: TaskPatch {
                    done: Some(true),
                    notified: Some(true),
                    ..TaskPatch::default()
                },
                notification: Notification {
                    title: "Deadline passed".to_string(),
                    body: format!("{}\nDue {}", notification_title(task), deadline),
                    icon: icon.to_string(),
                },
            });
            continue;
        }

        if task.done {
            continue;
        }

        let Some(reminder) = task
            .unfired_reminders()
            .find(|r| window.contains(r.at(), now))
            .copied()
        else {
            continue;
        };

        let mut fired = task.fired_reminders.clone();
        fired.push(reminder);
        let last = task.reminders.iter().all(|r| fired.contains(r));

        let mut patch = TaskPatch {
            fired_reminders: Some(fired),
            ..TaskPatch::default()
        };
        if last {
            patch.done = Some(true);
            patch.reminder_notified = Some(true);
        }

        planned.push(PlannedUpdate {
            id: task.id,
            trigger: Trigger::ReminderFired { reminder, last },
            patch,
            notification: Notification {
                title: "Reminder".to_string(),
                body: format!("{}\nAt {}", notification_title(task), reminder),
                icon: icon.to_string(),
            },
        });
    }

    planned
}

fn notification_title(task: &Task) -> String {
    let name = task.name.trim();
    if !name.is_empty() {
        return name.to_string();
    }
    format!("Task {}", task.short_id())
}

#[derive(Debug)]
pub struct WriteOutcome {
    pub id: Uuid,
    pub trigger: Trigger,
    pub shown: bool,
    pub result: Result<(), StoreError>,
}

#[derive(Debug, Default)]
pub struct TickReport {
    pub outcomes: Vec<WriteOutcome>,
}

impl TickReport {
    pub fn shown(&self) -> usize {
        self.outcomes.iter().filter(|o| o.shown).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_err()).count()
    }
}

pub struct Poller {
    store: Arc<dyn DocumentStore>,
    state: Arc<Mutex<AppState>>,
    notifier: Arc<dyn Notifier>,
    clock: WallClock,
    settings: PollerSettings,
}

impl Poller {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        state: Arc<Mutex<AppState>>,
        notifier: Arc<dyn Notifier>,
        clock: WallClock,
        settings: PollerSettings,
    ) -> Self {
        Self {
            store,
            state,
            notifier,
            clock,
            settings,
        }
    }

    pub fn interval(&self) -> StdDuration {
        self.settings.interval
    }

    /// Runs one reconciliation pass at `now`.
    ///
    /// The local list is patched before each store write; a failed write is
    /// reported and left for the next snapshot to overwrite.
    #[instrument(skip(self, now), fields(now = %now))]
    pub async fn tick(&self, now: DateTime<Utc>) -> TickReport {
        let local_now = self.clock.local(now);
        let planned = {
            let state = self.state.lock();
            plan_tick(
                state.tasks(),
                local_now,
                self.settings.window,
                &self.settings.icon,
            )
        };
        debug!(count = planned.len(), "planned poller updates");

        let mut report = TickReport::default();
        for update in planned {
            self.state.lock().reduce(Action::Patch {
                id: update.id,
                patch: update.patch.clone(),
            });
            let shown = notify::emit(self.notifier.as_ref(), &update.notification);

            let result = self.store.update(update.id, update.patch).await;
            match &result {
                Ok(()) => info!(id = %update.id, trigger = ?update.trigger, "poller update written"),
                Err(err) => error!(
                    id = %update.id,
                    trigger = ?update.trigger,
                    error = %err,
                    "poller update failed; local state diverges until next snapshot"
                ),
            }

            report.outcomes.push(WriteOutcome {
                id: update.id,
                trigger: update.trigger,
                shown,
                result,
            });
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, NaiveDateTime};

    use super::*;
    use crate::task::{Category, NewTask};

    fn at(raw: &str) -> NaiveDateTime {
        Reminder::parse(raw).expect("timestamp").at()
    }

    fn task_with(deadline: Option<NaiveDate>, reminders: &[&str]) -> Task {
        Task::from_new(
            Uuid::new_v4(),
            NewTask {
                name: "water plants".to_string(),
                description: String::new(),
                category: Category::Personal,
                deadline,
                reminders: reminders
                    .iter()
                    .map(|r| Reminder::parse(r).expect("reminder"))
                    .collect(),
            },
        )
    }

    #[test]
    fn trailing_window_bounds() {
        let window = ReminderWindow::Trailing(Duration::minutes(5));
        let reminder = at("2026-02-17T10:00");
        assert!(!window.contains(reminder, at("2026-02-17T09:59")));
        assert!(window.contains(reminder, at("2026-02-17T10:00")));
        assert!(window.contains(reminder, at("2026-02-17T10:05")));
        assert!(!window.contains(reminder, at("2026-02-17T10:06")));
        assert!(ReminderWindow::Catchup.contains(reminder, at("2026-03-01T00:00")));
    }

    #[test]
    fn elapsed_deadline_takes_priority_over_reminders() {
        let deadline = NaiveDate::from_ymd_opt(2026, 2, 16).expect("date");
        let task = task_with(Some(deadline), &["2026-02-17T09:58"]);
        let planned = plan_tick(
            &[task],
            at("2026-02-17T10:00"),
            ReminderWindow::default(),
            "icon.png",
        );
        assert_eq!(planned.len(), 1);
        assert_eq!(planned[0].trigger, Trigger::DeadlinePassed);
        assert_eq!(planned[0].patch.done, Some(true));
        assert_eq!(planned[0].patch.notified, Some(true));
    }

    #[test]
    fn earliest_listed_reminder_wins_per_tick() {
        let task = task_with(None, &["2026-02-17T09:57", "2026-02-17T09:58", "2026-02-18T09:00"]);
        let planned = plan_tick(
            &[task],
            at("2026-02-17T10:00"),
            ReminderWindow::default(),
            "icon.png",
        );
        assert_eq!(planned.len(), 1);
        assert_eq!(
            planned[0].trigger,
            Trigger::ReminderFired {
                reminder: Reminder::parse("2026-02-17T09:57").expect("reminder"),
                last: false,
            }
        );
        assert_eq!(planned[0].patch.done, None);
    }

    #[test]
    fn last_reminder_completes_task() {
        let mut task = task_with(None, &["2026-02-17T09:57", "2026-02-17T09:58"]);
        task.fired_reminders = vec![Reminder::parse("2026-02-17T09:57").expect("reminder")];
        let planned = plan_tick(
            &[task],
            at("2026-02-17T10:00"),
            ReminderWindow::default(),
            "icon.png",
        );
        assert_eq!(planned.len(), 1);
        assert_eq!(planned[0].patch.done, Some(true));
        assert_eq!(planned[0].patch.reminder_notified, Some(true));
        assert_eq!(planned[0].patch.fired_reminders.as_ref().map(Vec::len), Some(2));
    }

    #[test]
    fn done_and_already_notified_tasks_are_skipped() {
        let deadline = NaiveDate::from_ymd_opt(2026, 2, 1).expect("date");
        let mut done = task_with(Some(deadline), &["2026-02-17T09:59"]);
        done.done = true;
        let mut reopened = task_with(Some(deadline), &[]);
        reopened.notified = true;

        let planned = plan_tick(
            &[done, reopened],
            at("2026-02-17T10:00"),
            ReminderWindow::Catchup,
            "icon.png",
        );
        assert!(planned.is_empty());
    }

    #[test]
    fn window_as_wide_as_the_interval_never_skips_a_reminder() {
        let mut task = task_with(None, &["2026-02-17T10:00"]);
        let window = ReminderWindow::Trailing(Duration::seconds(15));
        let start = at("2026-02-17T09:59") + Duration::seconds(58);

        let mut fired = 0;
        for step in 0..10 {
            let now = start + Duration::seconds(15 * step);
            for update in plan_tick(std::slice::from_ref(&task), now, window, "icon.png") {
                update.patch.apply_to(&mut task);
                fired += 1;
            }
        }
        assert_eq!(fired, 1);
        assert!(task.done && task.reminder_notified);
    }

    #[test]
    fn interval_is_clamped() {
        assert_eq!(clamp_interval(1), StdDuration::from_secs(15));
        assert_eq!(clamp_interval(45), StdDuration::from_secs(45));
        assert_eq!(clamp_interval(3600), StdDuration::from_secs(60));
    }
}
