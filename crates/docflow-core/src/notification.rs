//! User-facing notifications (toasts)
//!
//! Components never render anything themselves; they hand a [`Notification`]
//! to an injected [`Notifier`] and move on. Notifications are non-blocking.

use serde::{Deserialize, Serialize};

/// Severity of a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationLevel {
    Success,
    Info,
    Warning,
    Error,
}

/// A toast to show to the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub level: NotificationLevel,
    pub title: String,
    pub message: String,
    pub help: Option<String>,
}

impl Notification {
    /// Create notification with explicit level
    #[must_use]
    pub fn new(
        level: NotificationLevel,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            level,
            title: title.into(),
            message: message.into(),
            help: None,
        }
    }

    /// Success toast
    #[inline]
    #[must_use]
    pub fn success(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Success, title, message)
    }

    /// Informational toast
    #[inline]
    #[must_use]
    pub fn info(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Info, title, message)
    }

    /// Error toast
    #[inline]
    #[must_use]
    pub fn error(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Error, title, message)
    }

    /// With suggested user action
    #[inline]
    #[must_use]
    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }
}

/// Sink for notifications
pub trait Notifier: Send + Sync {
    /// Show a notification; must not block
    fn notify(&self, notification: Notification);
}

/// Notifier that writes every notification to the tracing pipeline
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, n: Notification) {
        let help = n.help.as_deref().unwrap_or("");
        match n.level {
            NotificationLevel::Error => {
                tracing::error!(title = %n.title, help, "{}", n.message);
            }
            NotificationLevel::Warning => {
                tracing::warn!(title = %n.title, help, "{}", n.message);
            }
            NotificationLevel::Success | NotificationLevel::Info => {
                tracing::info!(title = %n.title, "{}", n.message);
            }
        }
    }
}

impl<N: Notifier + ?Sized> Notifier for std::sync::Arc<N> {
    fn notify(&self, notification: Notification) {
        (**self).notify(notification);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builders_set_level() {
        let n = Notification::success("Done", "Document approved").with_help("none");
        assert_eq!(n.level, NotificationLevel::Success);
        assert_eq!(n.help.as_deref(), Some("none"));
        assert_eq!(Notification::info("a", "b").level, NotificationLevel::Info);
    }

    #[test]
    fn tracing_notifier_accepts_all_levels() {
        let notifier = TracingNotifier;
        notifier.notify(Notification::error("x", "y").with_help("z"));
        notifier.notify(Notification::new(NotificationLevel::Warning, "x", "y"));
        notifier.notify(Notification::success("x", "y"));
    }
}
