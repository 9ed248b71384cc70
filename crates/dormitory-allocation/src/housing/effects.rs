use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::warn;

use super::domain::{Actor, Details, StudentId};
use super::repository::{
    ActivityAction, ActivityEntry, ActivityLog, Notification, NotificationKind, Notifier,
};

/// Fire-and-forget dispatch of notifications and audit entries.
///
/// Failures are logged and swallowed; callers never observe them.
#[derive(Clone)]
pub struct SideEffects {
    notifier: Arc<dyn Notifier>,
    activity: Arc<dyn ActivityLog>,
}

impl SideEffects {
    pub fn new(notifier: Arc<dyn Notifier>, activity: Arc<dyn ActivityLog>) -> Self {
        Self { notifier, activity }
    }

    pub fn notify(&self, kind: NotificationKind, student_id: &StudentId, details: Details) {
        let notification = Notification {
            kind,
            student_id: student_id.clone(),
            details,
        };
        if let Err(err) = self.notifier.notify(notification) {
            warn!(
                notification = kind.label(),
                student_id = %student_id,
                error = %err,
                "notification dropped"
            );
        }
    }

    pub fn record(
        &self,
        actor: &Actor,
        action: ActivityAction,
        description: impl Into<String>,
        details: Details,
        at: DateTime<Utc>,
    ) {
        let entry = ActivityEntry {
            actor: actor.clone(),
            action,
            description: description.into(),
            details,
            at,
        };
        if let Err(err) = self.activity.record(entry) {
            warn!(
                action = action.label(),
                actor = actor.role(),
                error = %err,
                "activity entry dropped"
            );
        }
    }
}

/// Build a details map from literal pairs.
pub(crate) fn details<const N: usize>(pairs: [(&str, String); N]) -> Details {
    pairs
        .into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .collect()
}
