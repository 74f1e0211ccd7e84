//! Desktop notifications shown when an event fires.
//!
//! Like the activity log, notifications are best effort: the engine shows
//! them on a detached task and only logs failures.

use crate::error::{BellError, Result};
use async_trait::async_trait;
use std::sync::Mutex;

/// Title and body of one notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub title: String,
    pub body: String,
}

impl Notice {
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
        }
    }
}

/// Destination for fire notifications.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// # Errors
    ///
    /// Returns [`BellError::Notify`] when the notice could not be shown.
    async fn notify(&self, notice: &Notice) -> Result<()>;
}

/// Notifier that shows nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn notify(&self, _notice: &Notice) -> Result<()> {
        Ok(())
    }
}

/// Shows notices through the platform notification service.
#[derive(Debug, Clone)]
pub struct DesktopNotifier {
    app_name: String,
}

impl DesktopNotifier {
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
        }
    }
}

#[async_trait]
impl Notifier for DesktopNotifier {
    async fn notify(&self, notice: &Notice) -> Result<()> {
        let app_name = self.app_name.clone();
        let notice = notice.clone();
        // The D-Bus / platform call blocks.
        tokio::task::spawn_blocking(move || {
            notify_rust::Notification::new()
                .appname(&app_name)
                .summary(&notice.title)
                .body(&notice.body)
                .show()
                .map(|_| ())
                .map_err(|e| BellError::Notify(e.to_string()))
        })
        .await
        .map_err(|e| BellError::Notify(format!("notification task failed: {e}")))?
    }
}

/// Keeps every notice in memory. Used by tests.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    notices: Mutex<Vec<Notice>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Notices received so far, oldest first.
    pub fn notices(&self) -> Vec<Notice> {
        self.notices
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, notice: &Notice) -> Result<()> {
        self.notices
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(notice.clone());
        Ok(())
    }
}
