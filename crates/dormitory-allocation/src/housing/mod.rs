//! Dormitory room allocation: eligibility, room search, capacity-safe placement, and the
//! application lifecycle that drives them.
//!
//! Storage, notification, and audit logging are reached only through the traits in
//! [`repository`]; the [`memory`] module provides process-local implementations.

pub mod allocation;
pub mod capacity;
pub mod domain;
pub(crate) mod effects;
pub mod eligibility;
pub mod error;
pub mod import;
pub mod lifecycle;
pub mod memory;
pub mod repository;
pub mod router;
pub mod search;
pub mod service;

#[cfg(test)]
mod tests;

pub use allocation::{
    AllocationEngine, ConsistencyReport, Discrepancy, Placement, RepairOutcome,
    DEFAULT_MAX_COMMIT_ATTEMPTS,
};
pub use capacity::{
    CapacityError, ContactInfo, Dormitory, DormitoryId, Floor, GenderPolicy, GeoPoint, MatchedOn,
    Occupant, PriceRange, Room, RoomLocator, RoomStatus, RoomType, RoomUpdate,
};
pub use domain::{
    Actor, AdminId, Application, ApplicationId, ApplicationStatus, ApplicationStatusView,
    CheckoutRequest, FloorRange, Gender, PaymentConfirmation, PaymentRecord, RegistrationRequest,
    RegistrationStatus, ResidencyOutcome, ResidencyRecord, RoomAssignment, RoomPreferences,
    Student, StudentId,
};
pub use eligibility::{
    AcademicPolicy, AcademicWindow, DormitoryPriority, EligibilityDecision, EligibilityEvaluator,
    PriorityTier, PriorityWeights, SelectionWindow, YearGroup,
};
pub use error::{HousingError, Missing};
pub use import::{ImportError, InventoryImporter, RosterImporter};
pub use lifecycle::ApplicationEvent;
pub use memory::{
    FixedClock, InMemoryApplicationRepository, InMemoryDormitoryStore, InMemoryPolicyStore,
    InMemoryStudentRepository, RecordingActivityLog, RecordingNotifier,
};
pub use repository::{
    ActivityAction, ActivityEntry, ActivityLog, ActivityLogError, ApplicationRepository, Clock,
    DormitoryStore, Notification, NotificationKind, Notifier, NotifyError, PolicyStore,
    RepositoryError, StudentRepository, SystemClock, Versioned,
};
pub use router::housing_router;
pub use search::{rank_candidates, RoomCandidate, SearchCriteria};
pub use service::{
    AllocationSettings, AssignmentMode, AssignmentOutcome, BatchPlacement, BatchReport,
    BatchSkip, Collaborators, ExpiryReport, QueueEntry, QueueFilter, RegistrationService,
};
