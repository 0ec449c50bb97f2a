//! Notifier implementations

use async_trait::async_trait;
use natours_core::{notification_error, NatoursResult, Notification, Notifier};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::info;

/// Records that a notification would have been sent. The body is not logged.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, notification: Notification) -> NatoursResult<()> {
        info!(
            to = %notification.to,
            subject = %notification.subject,
            "Notification dispatched"
        );
        Ok(())
    }
}

/// Keeps sent notifications in memory and can be told to fail
#[derive(Debug, Clone, Default)]
pub struct MemoryNotifier {
    sent: Arc<Mutex<Vec<Notification>>>,
    failing: Arc<AtomicBool>,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent sends fail (or succeed again)
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn last(&self) -> Option<Notification> {
        self.sent().pop()
    }
}

#[async_trait]
impl Notifier for MemoryNotifier {
    async fn send(&self, notification: Notification) -> NatoursResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(notification_error!(
                "Mail transport unavailable",
                "memory_notifier"
            ));
        }

        self.sent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(notification);
        Ok(())
    }
}
