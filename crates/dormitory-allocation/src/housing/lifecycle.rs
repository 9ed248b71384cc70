//! Legal moves of an application through review, payment, placement, and departure.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{Actor, Application, ApplicationStatus, TransitionStamp};
use super::error::HousingError;

/// Actions that drive the application state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationEvent {
    Approve,
    Reject,
    Waitlist,
    ConfirmPayment,
    Assign,
    AutoAssign,
    CheckIn,
    CheckOut,
    RequestCheckout,
    Cancel,
    Expire,
}

impl ApplicationEvent {
    pub const fn label(self) -> &'static str {
        match self {
            ApplicationEvent::Approve => "approve",
            ApplicationEvent::Reject => "reject",
            ApplicationEvent::Waitlist => "waitlist",
            ApplicationEvent::ConfirmPayment => "confirm payment for",
            ApplicationEvent::Assign => "assign a room to",
            ApplicationEvent::AutoAssign => "auto-assign a room to",
            ApplicationEvent::CheckIn => "check in",
            ApplicationEvent::CheckOut => "check out",
            ApplicationEvent::RequestCheckout => "request checkout for",
            ApplicationEvent::Cancel => "cancel",
            ApplicationEvent::Expire => "expire",
        }
    }

    /// Resulting status when the event is legal from `from`.
    pub const fn target(self, from: ApplicationStatus) -> Option<ApplicationStatus> {
        use ApplicationStatus as S;

        match (self, from) {
            (ApplicationEvent::Approve, S::PendingReview | S::Waitlist) => {
                Some(S::ApprovedWaitingPayment)
            }
            (
                ApplicationEvent::Reject,
                S::PendingReview | S::ApprovedWaitingPayment | S::Waitlist,
            ) => Some(S::Rejected),
            (ApplicationEvent::Waitlist, S::PendingReview | S::ApprovedWaitingPayment) => {
                Some(S::Waitlist)
            }
            (ApplicationEvent::ConfirmPayment, S::ApprovedWaitingPayment) => {
                Some(S::ApprovedWaitingPayment)
            }
            (ApplicationEvent::Assign, S::ApprovedWaitingPayment | S::Waitlist) => {
                Some(S::AssignedRoom)
            }
            (ApplicationEvent::AutoAssign, S::PendingReview | S::Waitlist) => {
                Some(S::AssignedRoom)
            }
            (ApplicationEvent::CheckIn, S::AssignedRoom) => Some(S::CheckedIn),
            (ApplicationEvent::CheckOut, S::AssignedRoom | S::CheckedIn) => Some(S::CheckedOut),
            (ApplicationEvent::RequestCheckout, S::AssignedRoom | S::CheckedIn) => Some(from),
            (
                ApplicationEvent::Cancel,
                S::PendingReview | S::ApprovedWaitingPayment | S::Waitlist,
            ) => Some(S::Cancelled),
            (
                ApplicationEvent::Expire,
                S::PendingReview | S::ApprovedWaitingPayment | S::Waitlist,
            ) => Some(S::Expired),
            _ => None,
        }
    }
}

impl fmt::Display for ApplicationEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Check legality without touching the application.
pub fn ensure_allowed(
    application: &Application,
    event: ApplicationEvent,
) -> Result<ApplicationStatus, HousingError> {
    event
        .target(application.status)
        .ok_or(HousingError::IllegalTransition {
            from: application.status,
            event,
        })
}

/// Move the application and stamp actor and time when the status changes.
pub fn apply(
    application: &mut Application,
    event: ApplicationEvent,
    actor: &Actor,
    at: DateTime<Utc>,
) -> Result<ApplicationStatus, HousingError> {
    let from = application.status;
    let to = ensure_allowed(application, event)?;

    if to != from {
        application.transitions.push(TransitionStamp {
            from,
            to,
            actor: actor.clone(),
            at,
        });
        application.status = to;
    }
    application.updated_at = at;

    Ok(to)
}
