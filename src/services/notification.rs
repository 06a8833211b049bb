//! Notification sink
//!
//! The engine reports every committed outcome to a [`NotificationSink`].
//! Delivery (email, push, chat) belongs to the surrounding application; the
//! default sink only writes structured log records.

use std::sync::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{info, error};
use uuid::Uuid;
use crate::models::Registration;

/// Outcome reported after a transaction commits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notice {
    Registered { registration: Registration },
    Waitlisted { registration: Registration, position: i32 },
    Cancelled { registration: Registration, cancelled_by: Uuid },
    Promoted { registration: Registration },
    CheckedIn { registration: Registration, checked_in_by: Uuid },
    BatchApplied { action: String, processed: usize, actor_id: Uuid },
}

impl Notice {
    pub fn template_key(&self) -> &'static str {
        match self {
            Notice::Registered { .. } => "registration_confirmed",
            Notice::Waitlisted { .. } => "registration_waitlisted",
            Notice::Cancelled { .. } => "registration_cancelled",
            Notice::Promoted { .. } => "waitlist_promoted",
            Notice::CheckedIn { .. } => "checked_in",
            Notice::BatchApplied { .. } => "batch_applied",
        }
    }

    /// Registration the notice is about, if any
    pub fn registration(&self) -> Option<&Registration> {
        match self {
            Notice::Registered { registration }
            | Notice::Waitlisted { registration, .. }
            | Notice::Cancelled { registration, .. }
            | Notice::Promoted { registration }
            | Notice::CheckedIn { registration, .. } => Some(registration),
            Notice::BatchApplied { .. } => None,
        }
    }
}

/// Receiver of committed outcomes
pub trait NotificationSink: Send + Sync {
    fn notify(&self, notice: Notice);
}

/// Sink that writes each notice as a structured log record
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl NotificationSink for TracingNotifier {
    fn notify(&self, notice: Notice) {
        match serde_json::to_string(&notice) {
            Ok(payload) => info!(template_key = notice.template_key(), payload = %payload, "Notification emitted"),
            Err(e) => error!(template_key = notice.template_key(), error = %e, "Failed to serialize notification"),
        }
    }
}

/// Sink that keeps every notice in memory
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    notices: Mutex<Vec<Notice>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notices(&self) -> Vec<Notice> {
        self.notices.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).clone()
    }

    pub fn count_of(&self, template_key: &str) -> usize {
        self.notices()
            .iter()
            .filter(|notice| notice.template_key() == template_key)
            .count()
    }

    pub fn clear(&self) {
        self.notices.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).clear();
    }
}

impl NotificationSink for RecordingNotifier {
    fn notify(&self, notice: Notice) {
        self.notices.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).push(notice);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_notifier() {
        let notifier = RecordingNotifier::new();
        notifier.notify(Notice::BatchApplied { action: "cancel".to_string(), processed: 2, actor_id: Uuid::nil() });
        assert_eq!(notifier.count_of("batch_applied"), 1);
        assert!(notifier.notices()[0].registration().is_none());

        notifier.clear();
        assert!(notifier.notices().is_empty());
    }

    #[test]
    fn test_notice_serialization_is_tagged() {
        let notice = Notice::BatchApplied { action: "checkin".to_string(), processed: 1, actor_id: Uuid::nil() };
        let json = serde_json::to_value(&notice).unwrap();
        assert_eq!(json["kind"], "batch_applied");
        assert_eq!(json["processed"], 1);
    }
}
