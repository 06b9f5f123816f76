use std::io::{self, IsTerminal, Write};
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    Default,
    Granted,
    Denied,
}

impl Permission {
    pub fn as_label(self) -> &'static str {
        match self {
            Self::Default => "Permission not requested",
            Self::Granted => "Permission granted",
            Self::Denied => "Permission denied",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub icon: String,
}

/// Platform notification facility.
///
/// Permission is asked for once at startup and queried again before every
/// notification; it is never cached by callers.
pub trait Notifier: Send + Sync {
    fn request_permission(&self) -> Permission;

    fn permission(&self) -> Permission;

    fn show(&self, notification: &Notification);
}

/// Fires `notification` if permitted. Returns whether it was shown.
pub fn emit(notifier: &dyn Notifier, notification: &Notification) -> bool {
    let permission = notifier.permission();
    if permission != Permission::Granted {
        debug!(
            permission = permission.as_label(),
            title = %notification.title,
            "skipping notification because permission is not granted"
        );
        return false;
    }
    notifier.show(notification);
    true
}

/// Prints notifications to stderr, for the command-line front end.
///
/// Stays at [`Permission::Default`] until permission is requested.
#[derive(Debug)]
pub struct TerminalNotifier {
    enabled: bool,
    requested: AtomicBool,
}

impl TerminalNotifier {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            requested: AtomicBool::new(false),
        }
    }
}

impl Notifier for TerminalNotifier {
    fn request_permission(&self) -> Permission {
        self.requested.store(true, Ordering::Relaxed);
        let permission = self.permission();
        info!(permission = permission.as_label(), "notification permission resolved");
        permission
    }

    fn permission(&self) -> Permission {
        if !self.requested.load(Ordering::Relaxed) {
            Permission::Default
        } else if self.enabled {
            Permission::Granted
        } else {
            Permission::Denied
        }
    }

    fn show(&self, notification: &Notification) {
        info!(
            title = %notification.title,
            icon = %notification.icon,
            "showing notification"
        );
        let mut err = io::stderr().lock();
        let bell = if err.is_terminal() { "\x07" } else { "" };
        if let Err(e) = writeln!(
            err,
            "{bell}[{}] {}",
            notification.title,
            notification.body.replace('\n', " | ")
        ) {
            warn!(error = %e, "failed writing notification to stderr");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notifications_need_granted_permission() {
        let notification = Notification {
            title: "t".to_string(),
            body: "b".to_string(),
            icon: "i.png".to_string(),
        };
        let denied = TerminalNotifier::new(false);
        assert_eq!(denied.request_permission(), Permission::Denied);
        assert!(!emit(&denied, &notification));

        let granted = TerminalNotifier::new(true);
        assert_eq!(granted.permission(), Permission::Default);
        assert!(!emit(&granted, &notification));
        assert_eq!(granted.request_permission(), Permission::Granted);
        assert!(emit(&granted, &notification));
    }
}
