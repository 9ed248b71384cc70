//! Storage and collaborator seams consumed by the allocation engine.
//!
//! Dormitories are stored as whole documents carrying a version number. Every mutation of
//! the nested capacity hierarchy is a full-document replace that only succeeds when the
//! caller's expected version still matches, so concurrent writers either win or retry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::capacity::{Dormitory, DormitoryId};
use super::domain::{Actor, Application, ApplicationId, Details, Student, StudentId};
use super::eligibility::{AcademicPolicy, AcademicWindow};

/// Error enumeration for repository failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("stale write: expected version {expected}, found {found}")]
    VersionConflict { expected: u64, found: u64 },
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// A document together with the version it was read at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Versioned<T> {
    pub version: u64,
    pub document: T,
}

pub trait DormitoryStore: Send + Sync {
    fn fetch(&self, id: &DormitoryId) -> Result<Option<Versioned<Dormitory>>, RepositoryError>;
    fn list(&self) -> Result<Vec<Versioned<Dormitory>>, RepositoryError>;
    fn insert(&self, dormitory: Dormitory) -> Result<Versioned<Dormitory>, RepositoryError>;
    /// Replace the document only if it is still at `expected_version`.
    fn replace(
        &self,
        dormitory: Dormitory,
        expected_version: u64,
    ) -> Result<Versioned<Dormitory>, RepositoryError>;
}

pub trait StudentRepository: Send + Sync {
    fn insert(&self, student: Student) -> Result<Student, RepositoryError>;
    fn update(&self, student: Student) -> Result<(), RepositoryError>;
    fn fetch(&self, id: &StudentId) -> Result<Option<Student>, RepositoryError>;
    fn list(&self) -> Result<Vec<Student>, RepositoryError>;
}

pub trait ApplicationRepository: Send + Sync {
    /// Allocate an id no stored or future application of this repository will reuse.
    fn next_id(&self) -> Result<ApplicationId, RepositoryError>;
    fn insert(&self, application: Application) -> Result<Application, RepositoryError>;
    fn update(&self, application: Application) -> Result<(), RepositoryError>;
    fn fetch(&self, id: &ApplicationId) -> Result<Option<Application>, RepositoryError>;
    fn for_student(&self, student_id: &StudentId) -> Result<Vec<Application>, RepositoryError>;
    fn for_academic_year(&self, academic_year: &str) -> Result<Vec<Application>, RepositoryError>;
}

/// Read-only view of admin-maintained academic-year policy.
pub trait PolicyStore: Send + Sync {
    fn active_policy(&self, academic_year: &str) -> Result<Option<AcademicPolicy>, RepositoryError>;
    fn window(&self, academic_year: &str) -> Result<Option<AcademicWindow>, RepositoryError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Welcome,
    RegistrationSubmitted,
    RegistrationApproved,
    RegistrationRejected,
    RegistrationWaitlisted,
    RegistrationCancelled,
    RegistrationExpired,
    PaymentConfirmed,
    RoomAssigned,
    CheckedIn,
    CheckedOut,
    CheckoutRequested,
}

impl NotificationKind {
    pub const fn label(self) -> &'static str {
        match self {
            NotificationKind::Welcome => "welcome",
            NotificationKind::RegistrationSubmitted => "registration_submitted",
            NotificationKind::RegistrationApproved => "registration_approved",
            NotificationKind::RegistrationRejected => "registration_rejected",
            NotificationKind::RegistrationWaitlisted => "registration_waitlisted",
            NotificationKind::RegistrationCancelled => "registration_cancelled",
            NotificationKind::RegistrationExpired => "registration_expired",
            NotificationKind::PaymentConfirmed => "payment_confirmed",
            NotificationKind::RoomAssigned => "room_assigned",
            NotificationKind::CheckedIn => "checked_in",
            NotificationKind::CheckedOut => "checked_out",
            NotificationKind::CheckoutRequested => "checkout_requested",
        }
    }
}

/// Event handed to the notifier collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub kind: NotificationKind,
    pub student_id: StudentId,
    pub details: Details,
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("notification transport unavailable: {0}")]
    Transport(String),
}

/// Outbound notification hook (e-mail, in-app inbox, ...).
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification) -> Result<(), NotifyError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityAction {
    RegistrationSubmitted,
    ApplicationApproved,
    ApplicationRejected,
    ApplicationWaitlisted,
    PaymentConfirmed,
    RoomAssigned,
    RoomManuallyAssigned,
    RoomSelfSelected,
    RoomAutoAssigned,
    CheckedIn,
    CheckedOut,
    CheckoutRequested,
    RegistrationCancelled,
    ApplicationsExpired,
    ConsistencyRepaired,
}

impl ActivityAction {
    pub const fn label(self) -> &'static str {
        match self {
            ActivityAction::RegistrationSubmitted => "registration_submitted",
            ActivityAction::ApplicationApproved => "application_approved",
            ActivityAction::ApplicationRejected => "application_rejected",
            ActivityAction::ApplicationWaitlisted => "application_waitlisted",
            ActivityAction::PaymentConfirmed => "payment_confirmed",
            ActivityAction::RoomAssigned => "room_assigned",
            ActivityAction::RoomManuallyAssigned => "room_manually_assigned",
            ActivityAction::RoomSelfSelected => "room_self_selected",
            ActivityAction::RoomAutoAssigned => "room_auto_assigned",
            ActivityAction::CheckedIn => "checked_in",
            ActivityAction::CheckedOut => "checked_out",
            ActivityAction::CheckoutRequested => "checkout_requested",
            ActivityAction::RegistrationCancelled => "registration_cancelled",
            ActivityAction::ApplicationsExpired => "applications_expired",
            ActivityAction::ConsistencyRepaired => "consistency_repaired",
        }
    }
}

/// Audit entry handed to the activity log collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub actor: Actor,
    pub action: ActivityAction,
    pub description: String,
    pub details: Details,
    pub at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum ActivityLogError {
    #[error("activity log unavailable: {0}")]
    Unavailable(String),
}

pub trait ActivityLog: Send + Sync {
    fn record(&self, entry: ActivityEntry) -> Result<(), ActivityLogError>;
}

/// Source of the current time, injectable for tests and batch replays.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
