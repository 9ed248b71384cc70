use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::capacity::{DormitoryId, GenderPolicy, RoomLocator, RoomType};

/// External student code (e.g. the university registration number).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StudentId(pub String);

impl fmt::Display for StudentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier wrapper for registration applications.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ApplicationId(pub String);

impl fmt::Display for ApplicationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of an administrator account.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AdminId(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    Male,
    Female,
}

impl Gender {
    pub const fn label(self) -> &'static str {
        match self {
            Gender::Male => "male",
            Gender::Female => "female",
        }
    }

    pub fn from_label(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "male" | "m" => Some(Gender::Male),
            "female" | "f" => Some(Gender::Female),
            _ => None,
        }
    }
}

/// Who performed a state-changing action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Actor {
    Admin(AdminId),
    Student(StudentId),
    System,
}

impl Actor {
    pub fn admin(id: impl Into<String>) -> Self {
        Actor::Admin(AdminId(id.into()))
    }

    pub fn id(&self) -> Option<&str> {
        match self {
            Actor::Admin(id) => Some(&id.0),
            Actor::Student(id) => Some(&id.0),
            Actor::System => None,
        }
    }

    pub const fn role(&self) -> &'static str {
        match self {
            Actor::Admin(_) => "admin",
            Actor::Student(_) => "student",
            Actor::System => "system",
        }
    }
}

/// Lifecycle states of a registration application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    PendingReview,
    ApprovedWaitingPayment,
    Waitlist,
    AssignedRoom,
    CheckedIn,
    CheckedOut,
    Rejected,
    Expired,
    Cancelled,
}

impl ApplicationStatus {
    pub const fn label(self) -> &'static str {
        match self {
            ApplicationStatus::PendingReview => "pending_review",
            ApplicationStatus::ApprovedWaitingPayment => "approved_waiting_payment",
            ApplicationStatus::Waitlist => "waitlist",
            ApplicationStatus::AssignedRoom => "assigned_room",
            ApplicationStatus::CheckedIn => "checked_in",
            ApplicationStatus::CheckedOut => "checked_out",
            ApplicationStatus::Rejected => "rejected",
            ApplicationStatus::Expired => "expired",
            ApplicationStatus::Cancelled => "cancelled",
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            ApplicationStatus::Rejected
                | ApplicationStatus::Expired
                | ApplicationStatus::Cancelled
                | ApplicationStatus::CheckedOut
        )
    }

    /// Not yet placed in a room and not terminal.
    pub const fn is_unresolved(self) -> bool {
        matches!(
            self,
            ApplicationStatus::PendingReview
                | ApplicationStatus::ApprovedWaitingPayment
                | ApplicationStatus::Waitlist
        )
    }
}

impl fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Student-facing registration state, mirroring the active application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationStatus {
    NotRegistered,
    PendingReview,
    ApprovedWaitingPayment,
    Waitlist,
    AssignedRoom,
    CheckedIn,
    CheckedOut,
    Rejected,
    Expired,
}

impl RegistrationStatus {
    pub const fn label(self) -> &'static str {
        match self {
            RegistrationStatus::NotRegistered => "not_registered",
            RegistrationStatus::PendingReview => "pending_review",
            RegistrationStatus::ApprovedWaitingPayment => "approved_waiting_payment",
            RegistrationStatus::Waitlist => "waitlist",
            RegistrationStatus::AssignedRoom => "assigned_room",
            RegistrationStatus::CheckedIn => "checked_in",
            RegistrationStatus::CheckedOut => "checked_out",
            RegistrationStatus::Rejected => "rejected",
            RegistrationStatus::Expired => "expired",
        }
    }

    /// Holding a room right now.
    pub const fn is_placed(self) -> bool {
        matches!(
            self,
            RegistrationStatus::AssignedRoom | RegistrationStatus::CheckedIn
        )
    }
}

impl From<ApplicationStatus> for RegistrationStatus {
    fn from(status: ApplicationStatus) -> Self {
        match status {
            ApplicationStatus::PendingReview => RegistrationStatus::PendingReview,
            ApplicationStatus::ApprovedWaitingPayment => {
                RegistrationStatus::ApprovedWaitingPayment
            }
            ApplicationStatus::Waitlist => RegistrationStatus::Waitlist,
            ApplicationStatus::AssignedRoom => RegistrationStatus::AssignedRoom,
            ApplicationStatus::CheckedIn => RegistrationStatus::CheckedIn,
            ApplicationStatus::CheckedOut => RegistrationStatus::CheckedOut,
            ApplicationStatus::Rejected => RegistrationStatus::Rejected,
            ApplicationStatus::Expired => RegistrationStatus::Expired,
            ApplicationStatus::Cancelled => RegistrationStatus::NotRegistered,
        }
    }
}

/// Denormalized pointer to the room a student currently holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomAssignment {
    pub dormitory_id: DormitoryId,
    pub dormitory_name: String,
    pub floor_number: i32,
    pub room_number: String,
}

impl RoomAssignment {
    pub fn locator(&self) -> RoomLocator {
        RoomLocator::new(
            self.dormitory_id.clone(),
            self.floor_number,
            self.room_number.clone(),
        )
    }

    pub fn points_at(&self, locator: &RoomLocator) -> bool {
        self.dormitory_id == locator.dormitory_id
            && self.floor_number == locator.floor_number
            && self.room_number == locator.room_number
    }
}

impl fmt::Display for RoomAssignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} - floor {} - room {}",
            self.dormitory_name, self.floor_number, self.room_number
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResidencyOutcome {
    Completed,
    Terminated,
}

/// Append-only record of a past allocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResidencyRecord {
    pub academic_year: String,
    pub assignment: RoomAssignment,
    pub checked_in_at: Option<DateTime<Utc>>,
    pub checked_out_at: DateTime<Utc>,
    pub outcome: ResidencyOutcome,
}

/// System of record for where a student lives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Student {
    pub id: StudentId,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub gender: Gender,
    /// Year of study; missing or malformed values are tolerated and classified downstream.
    pub academic_year: Option<i32>,
    pub faculty: Option<String>,
    pub registration_status: RegistrationStatus,
    pub assignment: Option<RoomAssignment>,
    pub registration_history: Vec<ResidencyRecord>,
    pub check_in_date: Option<DateTime<Utc>>,
    pub check_out_date: Option<DateTime<Utc>>,
}

impl Student {
    pub fn new(id: StudentId, name: impl Into<String>, gender: Gender, academic_year: Option<i32>) -> Self {
        Self {
            id,
            name: name.into(),
            email: String::new(),
            phone: String::new(),
            gender,
            academic_year,
            faculty: None,
            registration_status: RegistrationStatus::NotRegistered,
            assignment: None,
            registration_history: Vec::new(),
            check_in_date: None,
            check_out_date: None,
        }
    }

    pub fn completed_residencies(&self) -> usize {
        self.registration_history
            .iter()
            .filter(|record| record.outcome == ResidencyOutcome::Completed)
            .count()
    }
}

/// Inclusive floor range preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FloorRange {
    pub min: i32,
    pub max: i32,
}

impl FloorRange {
    pub fn contains(&self, floor_number: i32) -> bool {
        floor_number >= self.min && floor_number <= self.max
    }
}

/// Student-supplied narrowing of the candidate room set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomPreferences {
    #[serde(default)]
    pub preferred_buildings: Vec<DormitoryId>,
    #[serde(default)]
    pub floor_range: Option<FloorRange>,
    #[serde(default)]
    pub room_type: Option<RoomType>,
    #[serde(default)]
    pub gender_policy: Option<GenderPolicy>,
}

/// Payment sub-record; only the confirmed flag and its metadata are modeled.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub paid: bool,
    pub amount: u64,
    pub method: Option<String>,
    pub transaction_ref: Option<String>,
    pub confirmed_by: Option<Actor>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub note: Option<String>,
}

/// Payload supplied when an administrator confirms payment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentConfirmation {
    #[serde(default)]
    pub amount: u64,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub transaction_ref: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutRequest {
    pub requested_at: DateTime<Utc>,
    pub reason: String,
    pub scheduled_for: Option<DateTime<Utc>>,
}

/// One stamped status change on an application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionStamp {
    pub from: ApplicationStatus,
    pub to: ApplicationStatus,
    pub actor: Actor,
    pub at: DateTime<Utc>,
}

/// A student's registration request and its full audit trail. Never deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Application {
    pub id: ApplicationId,
    pub student_id: StudentId,
    pub student_name: String,
    pub gender: Gender,
    pub academic_year: String,
    pub preferences: RoomPreferences,
    pub requested_room: Option<RoomLocator>,
    pub status: ApplicationStatus,
    pub payment: PaymentRecord,
    pub assignment: Option<RoomAssignment>,
    pub rejection_reason: Option<String>,
    pub cancellation_reason: Option<String>,
    pub checkout_request: Option<CheckoutRequest>,
    pub transitions: Vec<TransitionStamp>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Application {
    pub fn last_transition_to(&self, status: ApplicationStatus) -> Option<&TransitionStamp> {
        self.transitions.iter().rev().find(|stamp| stamp.to == status)
    }

    pub fn status_view(&self) -> ApplicationStatusView {
        ApplicationStatusView {
            application_id: self.id.clone(),
            student_id: self.student_id.clone(),
            academic_year: self.academic_year.clone(),
            status: self.status.label(),
            paid: self.payment.paid,
            assignment: self.assignment.clone(),
            rejection_reason: self.rejection_reason.clone(),
        }
    }
}

/// Sanitized representation of an application's exposed status.
#[derive(Debug, Clone, Serialize)]
pub struct ApplicationStatusView {
    pub application_id: ApplicationId,
    pub student_id: StudentId,
    pub academic_year: String,
    pub status: &'static str,
    pub paid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignment: Option<RoomAssignment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
}

/// Inbound intake payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationRequest {
    pub student_id: StudentId,
    pub academic_year: String,
    #[serde(default)]
    pub preferences: RoomPreferences,
    #[serde(default)]
    pub requested_room: Option<RoomLocator>,
}

/// Free-form key/value context attached to audit and notification events.
pub type Details = BTreeMap<String, String>;
