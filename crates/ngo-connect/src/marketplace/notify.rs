use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::domain::UserId;

/// Outbound message to a marketplace participant (e-mail, push, etc.).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub recipient: UserId,
    pub template: String,
    pub details: BTreeMap<String, String>,
}

impl Notification {
    pub fn new(recipient: UserId, template: &str) -> Self {
        Self {
            recipient,
            template: template.to_string(),
            details: BTreeMap::new(),
        }
    }

    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("notification transport unavailable: {0}")]
    Transport(String),
}

/// Delivery hook so services stay independent of the messaging provider.
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification) -> Result<(), NotifyError>;
}

/// Deliver without failing the caller; delivery problems are only logged.
pub(crate) fn dispatch(notifier: &dyn Notifier, notification: Notification) {
    let template = notification.template.clone();
    let recipient = notification.recipient;
    if let Err(err) = notifier.notify(notification) {
        warn!(%recipient, %template, error = %err, "notification dropped");
    }
}

/// Writes notifications to the log; used when no provider is configured.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notification: Notification) -> Result<(), NotifyError> {
        info!(
            recipient = %notification.recipient,
            template = %notification.template,
            details = ?notification.details,
            "notification"
        );
        Ok(())
    }
}

/// Keeps every notification in memory so callers can inspect what was sent.
#[derive(Debug, Default, Clone)]
pub struct RecordingNotifier {
    sent: Arc<Mutex<Vec<Notification>>>,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<Notification> {
        self.sent
            .lock()
            .map(|sent| sent.clone())
            .unwrap_or_default()
    }

    pub fn templates(&self) -> Vec<String> {
        self.sent()
            .into_iter()
            .map(|notification| notification.template)
            .collect()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notification: Notification) -> Result<(), NotifyError> {
        self.sent
            .lock()
            .map_err(|_| NotifyError::Transport("recorder poisoned".to_string()))?
            .push(notification);
        Ok(())
    }
}
