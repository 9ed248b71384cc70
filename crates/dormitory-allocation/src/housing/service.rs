use std::cmp::Reverse;
use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::allocation::{
    AllocationEngine, ConsistencyReport, Discrepancy, Placement, RepairOutcome,
    DEFAULT_MAX_COMMIT_ATTEMPTS,
};
use super::capacity::{CapacityError, Dormitory, RoomLocator, RoomUpdate};
use super::domain::{
    Actor, Application, ApplicationId, ApplicationStatus, CheckoutRequest, Gender,
    PaymentConfirmation, PaymentRecord, RegistrationRequest, RegistrationStatus, RoomAssignment,
    RoomPreferences, Student, StudentId,
};
use super::effects::{details, SideEffects};
use super::eligibility::{
    AcademicPolicy, AcademicWindow, EligibilityDecision, EligibilityEvaluator, PriorityWeights,
    WindowState, YearGroup,
};
use super::error::{HousingError, Missing};
use super::lifecycle::{self, ApplicationEvent};
use super::repository::{
    ActivityAction, ActivityLog, ApplicationRepository, Clock, DormitoryStore, NotificationKind,
    Notifier, PolicyStore, StudentRepository,
};
use super::search::{rank_candidates, RoomCandidate, SearchCriteria};

const DEFAULT_REJECTION_REASON: &str = "application does not meet the current registration requirements";


/// Everything the service talks to, injected at construction.
#[derive(Clone)]
pub struct Collaborators {
    pub dormitories: Arc<dyn DormitoryStore>,
    pub students: Arc<dyn StudentRepository>,
    pub applications: Arc<dyn ApplicationRepository>,
    pub policies: Arc<dyn PolicyStore>,
    pub notifier: Arc<dyn Notifier>,
    pub activity: Arc<dyn ActivityLog>,
    pub clock: Arc<dyn Clock>,
}

/// Tunables for the allocation engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationSettings {
    pub max_commit_attempts: u8,
    pub weights: PriorityWeights,
}

impl Default for AllocationSettings {
    fn default() -> Self {
        Self {
            max_commit_attempts: DEFAULT_MAX_COMMIT_ATTEMPTS,
            weights: PriorityWeights::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "room", rename_all = "snake_case")]
pub enum AssignmentMode {
    /// Admin override onto a specific room.
    Manual(RoomLocator),
    /// Best-ranked open room for the application's preferences.
    Automatic,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AssignmentOutcome {
    Assigned { assignment: RoomAssignment },
    Waitlisted { reason: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueFilter {
    #[serde(default)]
    pub year_group: Option<YearGroup>,
    #[serde(default)]
    pub gender: Option<Gender>,
    #[serde(default)]
    pub faculty: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueEntry {
    pub application_id: ApplicationId,
    pub student_id: StudentId,
    pub student_name: String,
    pub gender: Gender,
    pub year_group: YearGroup,
    pub status: ApplicationStatus,
    pub paid: bool,
    pub priority_score: u32,
    pub submitted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExpiryReport {
    pub academic_year: String,
    pub expired: Vec<ApplicationId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchPlacement {
    pub student_id: StudentId,
    pub application_id: ApplicationId,
    pub assignment: RoomAssignment,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchSkip {
    pub student_id: StudentId,
    pub reason: String,
}

/// Result of a first-year sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub academic_year: String,
    pub assigned: Vec<BatchPlacement>,
    pub skipped: Vec<BatchSkip>,
}

/// Façade over eligibility, search, allocation, and the application lifecycle.
#[derive(Clone)]
pub struct RegistrationService {
    dormitories: Arc<dyn DormitoryStore>,
    students: Arc<dyn StudentRepository>,
    applications: Arc<dyn ApplicationRepository>,
    policies: Arc<dyn PolicyStore>,
    clock: Arc<dyn Clock>,
    effects: SideEffects,
    evaluator: EligibilityEvaluator,
    engine: AllocationEngine,
}

impl RegistrationService {
    pub fn new(collaborators: Collaborators, settings: AllocationSettings) -> Self {
        let Collaborators {
            dormitories,
            students,
            applications,
            policies,
            notifier,
            activity,
            clock,
        } = collaborators;

        let effects = SideEffects::new(notifier, activity);
        let engine = AllocationEngine::new(
            dormitories.clone(),
            students.clone(),
            applications.clone(),
            effects.clone(),
            settings.max_commit_attempts,
        );

        Self {
            dormitories,
            students,
            applications,
            policies,
            clock,
            effects,
            evaluator: EligibilityEvaluator::new(settings.weights),
            engine,
        }
    }

    /// Create a `pending_review` application. Room capacity is not checked here.
    pub fn submit(&self, request: RegistrationRequest) -> Result<Application, HousingError> {
        let now = self.clock.now();
        let RegistrationRequest {
            student_id,
            academic_year,
            preferences,
            requested_room,
        } = request;

        if student_id.0.trim().is_empty() {
            return Err(HousingError::Validation("student id is required".to_string()));
        }
        let academic_year = academic_year.trim().to_string();
        if academic_year.is_empty() {
            return Err(HousingError::Validation(
                "academic year is required".to_string(),
            ));
        }
        if let Some(range) = preferences.floor_range {
            if range.min > range.max {
                return Err(HousingError::Validation(format!(
                    "floor range {}..{} is empty",
                    range.min, range.max
                )));
            }
        }

        let mut student = self.load_student(&student_id)?;

        if let Some(open) = self
            .applications
            .for_student(&student.id)?
            .into_iter()
            .find(|application| !application.status.is_terminal())
        {
            return Err(HousingError::ineligible(format!(
                "student already has open application {} ({})",
                open.id, open.status
            )));
        }

        if let Some(window) = self.policies.window(&academic_year)? {
            let open = window.register_open_at.format("%Y-%m-%d %H:%M UTC");
            let close = window.register_close_at.format("%Y-%m-%d %H:%M UTC");
            match window.registration_state(now) {
                WindowState::Open => {}
                WindowState::NotYetOpen => {
                    return Err(HousingError::ineligible(format!(
                        "registration for {academic_year} opens at {open} and closes at {close}"
                    )))
                }
                WindowState::Closed => {
                    return Err(HousingError::ineligible(format!(
                        "registration for {academic_year} closed at {close}"
                    )))
                }
            }
        }

        let decision = self.decide(&student, &academic_year, now)?;
        if !decision.eligible {
            return Err(HousingError::ineligible(decision.reason));
        }
        if requested_room.is_some() && !decision.can_choose_room {
            return Err(HousingError::ineligible(format!(
                "{} students cannot request a specific room",
                decision.year_group
            )));
        }

        let application = Application {
            id: self.applications.next_id()?,
            student_id: student.id.clone(),
            student_name: student.name.clone(),
            gender: student.gender,
            academic_year,
            preferences,
            requested_room,
            status: ApplicationStatus::PendingReview,
            payment: PaymentRecord::default(),
            assignment: None,
            rejection_reason: None,
            cancellation_reason: None,
            checkout_request: None,
            transitions: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        let stored = self.applications.insert(application)?;

        student.registration_status = RegistrationStatus::PendingReview;
        self.students.update(student.clone())?;

        info!(
            application_id = %stored.id,
            student_id = %student.id,
            academic_year = %stored.academic_year,
            "registration submitted"
        );
        let context = details([
            ("application_id", stored.id.to_string()),
            ("academic_year", stored.academic_year.clone()),
        ]);
        self.effects.notify(
            NotificationKind::RegistrationSubmitted,
            &student.id,
            context.clone(),
        );
        self.effects.record(
            &Actor::Student(student.id.clone()),
            ActivityAction::RegistrationSubmitted,
            format!("{} submitted a registration for {}", student.name, stored.academic_year),
            context,
            now,
        );

        Ok(stored)
    }

    pub fn evaluate_eligibility(
        &self,
        student_id: &StudentId,
        academic_year: &str,
    ) -> Result<EligibilityDecision, HousingError> {
        let student = self.load_student(student_id)?;
        self.decide(&student, academic_year, self.clock.now())
    }

    pub fn priority_score(&self, student_id: &StudentId) -> Result<u32, HousingError> {
        let student = self.load_student(student_id)?;
        Ok(self.evaluator.priority_score(&student))
    }

    /// Ranked open rooms the student could be placed in right now.
    pub fn search_rooms(
        &self,
        student_id: &StudentId,
        academic_year: &str,
        preferences: Option<RoomPreferences>,
    ) -> Result<Vec<RoomCandidate>, HousingError> {
        let student = self.load_student(student_id)?;
        let policy = self.require_policy(academic_year)?;
        let window = self.policies.window(academic_year)?;
        let criteria = criteria_for(&student, &policy, preferences.unwrap_or_default());
        self.rank(&criteria, window.as_ref())
    }

    /// Approve after the global duplicate check and a live look at the requested room.
    pub fn approve(
        &self,
        application_id: &ApplicationId,
        actor: &Actor,
    ) -> Result<Application, HousingError> {
        let now = self.clock.now();
        let mut application = self.load_application(application_id)?;
        lifecycle::ensure_allowed(&application, ApplicationEvent::Approve)?;

        let student = self.load_student(&application.student_id)?;
        self.engine.ensure_not_placed(&student)?;
        if let Some(locator) = &application.requested_room {
            self.engine.ensure_room_open(locator, &student)?;
        }

        lifecycle::apply(&mut application, ApplicationEvent::Approve, actor, now)?;
        self.applications.update(application.clone())?;
        self.mirror_status(&application)?;

        info!(application_id = %application.id, "application approved");
        let context = details([("application_id", application.id.to_string())]);
        self.effects.notify(
            NotificationKind::RegistrationApproved,
            &application.student_id,
            context.clone(),
        );
        self.effects.record(
            actor,
            ActivityAction::ApplicationApproved,
            format!("approved registration of {}", application.student_name),
            context,
            now,
        );

        Ok(application)
    }

    pub fn reject(
        &self,
        application_id: &ApplicationId,
        actor: &Actor,
        reason: Option<String>,
    ) -> Result<Application, HousingError> {
        let now = self.clock.now();
        let mut application = self.load_application(application_id)?;
        let reason = reason
            .map(|reason| reason.trim().to_string())
            .filter(|reason| !reason.is_empty())
            .unwrap_or_else(|| DEFAULT_REJECTION_REASON.to_string());

        lifecycle::apply(&mut application, ApplicationEvent::Reject, actor, now)?;
        application.rejection_reason = Some(reason.clone());
        self.applications.update(application.clone())?;
        self.mirror_status(&application)?;

        info!(application_id = %application.id, reason = %reason, "application rejected");
        let context = details([
            ("application_id", application.id.to_string()),
            ("reason", reason.clone()),
        ]);
        self.effects.notify(
            NotificationKind::RegistrationRejected,
            &application.student_id,
            context.clone(),
        );
        self.effects.record(
            actor,
            ActivityAction::ApplicationRejected,
            format!("rejected registration of {}: {reason}", application.student_name),
            context,
            now,
        );

        Ok(application)
    }

    pub fn waitlist(
        &self,
        application_id: &ApplicationId,
        actor: &Actor,
        note: Option<String>,
    ) -> Result<Application, HousingError> {
        let now = self.clock.now();
        let mut application = self.load_application(application_id)?;
        lifecycle::apply(&mut application, ApplicationEvent::Waitlist, actor, now)?;
        self.applications.update(application.clone())?;
        self.mirror_status(&application)?;

        info!(application_id = %application.id, "application waitlisted");
        let context = details([
            ("application_id", application.id.to_string()),
            ("note", note.unwrap_or_default()),
        ]);
        self.effects.notify(
            NotificationKind::RegistrationWaitlisted,
            &application.student_id,
            context.clone(),
        );
        self.effects.record(
            actor,
            ActivityAction::ApplicationWaitlisted,
            format!("moved {} to the waitlist", application.student_name),
            context,
            now,
        );

        Ok(application)
    }

    /// Record payment on an approved application. Status does not change.
    pub fn confirm_payment(
        &self,
        application_id: &ApplicationId,
        actor: &Actor,
        confirmation: PaymentConfirmation,
    ) -> Result<Application, HousingError> {
        let now = self.clock.now();
        let mut application = self.load_application(application_id)?;
        lifecycle::ensure_allowed(&application, ApplicationEvent::ConfirmPayment)?;
        if application.payment.paid {
            return Err(HousingError::Validation(format!(
                "payment for application {} is already confirmed",
                application.id
            )));
        }

        lifecycle::apply(&mut application, ApplicationEvent::ConfirmPayment, actor, now)?;
        application.payment = PaymentRecord {
            paid: true,
            amount: confirmation.amount,
            method: confirmation.method,
            transaction_ref: confirmation.transaction_ref,
            confirmed_by: Some(actor.clone()),
            confirmed_at: Some(now),
            note: confirmation.note,
        };
        self.applications.update(application.clone())?;

        info!(application_id = %application.id, amount = application.payment.amount, "payment confirmed");
        let context = details([
            ("application_id", application.id.to_string()),
            ("amount", application.payment.amount.to_string()),
        ]);
        self.effects.notify(
            NotificationKind::PaymentConfirmed,
            &application.student_id,
            context.clone(),
        );
        self.effects.record(
            actor,
            ActivityAction::PaymentConfirmed,
            format!("confirmed payment for {}", application.student_name),
            context,
            now,
        );

        Ok(application)
    }

    /// Admin assignment of a paid application.
    ///
    /// Automatic mode tries ranked candidates in order, relaxing the building preference
    /// once, and waitlists the application when nothing can be committed.
    pub fn assign(
        &self,
        application_id: &ApplicationId,
        actor: &Actor,
        mode: AssignmentMode,
    ) -> Result<AssignmentOutcome, HousingError> {
        let now = self.clock.now();
        let mut application = self.load_application(application_id)?;
        lifecycle::ensure_allowed(&application, ApplicationEvent::Assign)?;
        if !application.payment.paid {
            return Err(HousingError::ineligible(format!(
                "payment for application {} has not been confirmed",
                application.id
            )));
        }
        let mut student = self.load_student(&application.student_id)?;

        match mode {
            AssignmentMode::Manual(locator) => {
                let assignment = self.engine.commit(
                    &mut application,
                    &mut student,
                    Placement {
                        locator: &locator,
                        event: ApplicationEvent::Assign,
                        action: ActivityAction::RoomManuallyAssigned,
                        actor,
                        at: now,
                    },
                )?;
                Ok(AssignmentOutcome::Assigned { assignment })
            }
            AssignmentMode::Automatic => {
                let policy = self.require_policy(&application.academic_year)?;
                let window = self.policies.window(&application.academic_year)?;
                let criteria = criteria_for(&student, &policy, application.preferences.clone());

                let mut candidates = self.rank(&criteria, window.as_ref())?;
                if candidates.is_empty() && !criteria.preferences.preferred_buildings.is_empty() {
                    debug!(
                        application_id = %application.id,
                        "no room in preferred buildings, widening search"
                    );
                    candidates =
                        self.rank(&criteria.without_building_preference(), window.as_ref())?;
                }

                for candidate in &candidates {
                    let locator = candidate.locator();
                    let attempt = self.engine.commit(
                        &mut application,
                        &mut student,
                        Placement {
                            locator: &locator,
                            event: ApplicationEvent::Assign,
                            action: ActivityAction::RoomAssigned,
                            actor,
                            at: now,
                        },
                    );
                    match attempt {
                        Ok(assignment) => return Ok(AssignmentOutcome::Assigned { assignment }),
                        Err(err) if is_room_contention(&err) => {
                            debug!(room = %locator, error = %err, "candidate lost, trying next");
                        }
                        Err(err) => return Err(err),
                    }
                }

                let reason = "no open room matches the application".to_string();
                if application.status != ApplicationStatus::Waitlist {
                    lifecycle::apply(&mut application, ApplicationEvent::Waitlist, actor, now)?;
                    self.applications.update(application.clone())?;
                    self.mirror_status(&application)?;
                }
                info!(application_id = %application.id, "no room available, application waitlisted");
                let context = details([
                    ("application_id", application.id.to_string()),
                    ("reason", reason.clone()),
                ]);
                self.effects.notify(
                    NotificationKind::RegistrationWaitlisted,
                    &application.student_id,
                    context.clone(),
                );
                self.effects.record(
                    actor,
                    ActivityAction::ApplicationWaitlisted,
                    format!("no room available for {}", application.student_name),
                    context,
                    now,
                );
                Ok(AssignmentOutcome::Waitlisted { reason })
            }
        }
    }

    /// Student picks a room for their open, paid application.
    pub fn self_select(
        &self,
        student_id: &StudentId,
        academic_year: &str,
        locator: RoomLocator,
    ) -> Result<Application, HousingError> {
        let now = self.clock.now();
        let mut student = self.load_student(student_id)?;

        let decision = self.decide(&student, academic_year, now)?;
        if !decision.eligible {
            return Err(HousingError::ineligible(decision.reason));
        }
        if !decision.can_choose_room {
            return Err(HousingError::ineligible(format!(
                "{} students are assigned automatically and cannot choose a room",
                decision.year_group
            )));
        }

        let mut application = self
            .applications
            .for_student(student_id)?
            .into_iter()
            .find(|application| {
                application.academic_year == academic_year && application.status.is_unresolved()
            })
            .ok_or_else(|| {
                HousingError::ineligible(format!(
                    "no open application for academic year {academic_year}"
                ))
            })?;
        if !application.payment.paid {
            return Err(HousingError::ineligible(format!(
                "payment for application {} has not been confirmed",
                application.id
            )));
        }

        self.engine.commit(
            &mut application,
            &mut student,
            Placement {
                locator: &locator,
                event: ApplicationEvent::Assign,
                action: ActivityAction::RoomSelfSelected,
                actor: &Actor::Student(student_id.clone()),
                at: now,
            },
        )?;
        Ok(application)
    }

    pub fn check_in(
        &self,
        application_id: &ApplicationId,
        actor: &Actor,
    ) -> Result<Application, HousingError> {
        let now = self.clock.now();
        let mut application = self.load_application(application_id)?;
        lifecycle::apply(&mut application, ApplicationEvent::CheckIn, actor, now)?;
        self.applications.update(application.clone())?;

        let mut student = self.load_student(&application.student_id)?;
        student.registration_status = RegistrationStatus::CheckedIn;
        student.check_in_date = Some(now);
        self.students.update(student)?;

        info!(application_id = %application.id, "student checked in");
        let context = details([
            ("application_id", application.id.to_string()),
            (
                "room",
                application
                    .assignment
                    .as_ref()
                    .map(ToString::to_string)
                    .unwrap_or_default(),
            ),
        ]);
        self.effects.notify(
            NotificationKind::CheckedIn,
            &application.student_id,
            context.clone(),
        );
        self.effects.record(
            actor,
            ActivityAction::CheckedIn,
            format!("checked in {}", application.student_name),
            context,
            now,
        );

        Ok(application)
    }

    /// Vacate the room and close the residency. Accepted from `assigned_room` too.
    pub fn check_out(
        &self,
        application_id: &ApplicationId,
        actor: &Actor,
    ) -> Result<Application, HousingError> {
        let now = self.clock.now();
        let mut application = self.load_application(application_id)?;
        lifecycle::ensure_allowed(&application, ApplicationEvent::CheckOut)?;
        let mut student = self.load_student(&application.student_id)?;

        let assignment = self
            .engine
            .release(&mut application, &mut student, actor, now)?;

        let context = details([
            ("application_id", application.id.to_string()),
            ("room", assignment.to_string()),
        ]);
        self.effects.notify(
            NotificationKind::CheckedOut,
            &application.student_id,
            context.clone(),
        );
        self.effects.record(
            actor,
            ActivityAction::CheckedOut,
            format!("checked out {} from {assignment}", application.student_name),
            context,
            now,
        );

        Ok(application)
    }

    pub fn request_checkout(
        &self,
        application_id: &ApplicationId,
        student_id: &StudentId,
        reason: String,
        scheduled_for: Option<DateTime<Utc>>,
    ) -> Result<Application, HousingError> {
        let now = self.clock.now();
        let mut application = self.load_owned_application(application_id, student_id)?;
        let reason = reason.trim().to_string();
        if reason.is_empty() {
            return Err(HousingError::Validation(
                "a checkout reason is required".to_string(),
            ));
        }

        let actor = Actor::Student(student_id.clone());
        lifecycle::apply(&mut application, ApplicationEvent::RequestCheckout, &actor, now)?;
        application.checkout_request = Some(CheckoutRequest {
            requested_at: now,
            reason: reason.clone(),
            scheduled_for,
        });
        self.applications.update(application.clone())?;

        info!(application_id = %application.id, "checkout requested");
        let context = details([
            ("application_id", application.id.to_string()),
            ("reason", reason),
        ]);
        self.effects.notify(
            NotificationKind::CheckoutRequested,
            student_id,
            context.clone(),
        );
        self.effects.record(
            &actor,
            ActivityAction::CheckoutRequested,
            format!("{} requested checkout", application.student_name),
            context,
            now,
        );

        Ok(application)
    }

    /// Student withdraws an unresolved application.
    pub fn cancel(
        &self,
        application_id: &ApplicationId,
        student_id: &StudentId,
        reason: Option<String>,
    ) -> Result<Application, HousingError> {
        let now = self.clock.now();
        let mut application = self.load_owned_application(application_id, student_id)?;
        let actor = Actor::Student(student_id.clone());

        lifecycle::apply(&mut application, ApplicationEvent::Cancel, &actor, now)?;
        application.cancellation_reason = reason.filter(|reason| !reason.trim().is_empty());
        self.applications.update(application.clone())?;
        self.mirror_status(&application)?;

        info!(application_id = %application.id, "registration cancelled");
        let context = details([
            ("application_id", application.id.to_string()),
            (
                "reason",
                application.cancellation_reason.clone().unwrap_or_default(),
            ),
        ]);
        self.effects.notify(
            NotificationKind::RegistrationCancelled,
            student_id,
            context.clone(),
        );
        self.effects.record(
            &actor,
            ActivityAction::RegistrationCancelled,
            format!("{} cancelled their registration", application.student_name),
            context,
            now,
        );

        Ok(application)
    }

    /// Expire every unresolved application of a year whose registration window has closed.
    pub fn expire_year(
        &self,
        academic_year: &str,
        actor: &Actor,
    ) -> Result<ExpiryReport, HousingError> {
        let now = self.clock.now();
        let window = self
            .policies
            .window(academic_year)?
            .ok_or_else(|| HousingError::NotFound(Missing::AcademicWindow(academic_year.to_string())))?;
        if window.registration_state(now) != WindowState::Closed {
            return Err(HousingError::Validation(format!(
                "registration for {academic_year} is open until {}",
                window.register_close_at.format("%Y-%m-%d %H:%M UTC")
            )));
        }

        let mut expired = Vec::new();
        for mut application in self.applications.for_academic_year(academic_year)? {
            if !application.status.is_unresolved() {
                continue;
            }
            lifecycle::apply(&mut application, ApplicationEvent::Expire, actor, now)?;
            self.applications.update(application.clone())?;
            self.mirror_status(&application)?;
            self.effects.notify(
                NotificationKind::RegistrationExpired,
                &application.student_id,
                details([
                    ("application_id", application.id.to_string()),
                    ("academic_year", academic_year.to_string()),
                ]),
            );
            expired.push(application.id);
        }

        info!(academic_year, count = expired.len(), "unresolved applications expired");
        self.effects.record(
            actor,
            ActivityAction::ApplicationsExpired,
            format!("expired {} applications for {academic_year}", expired.len()),
            details([
                ("academic_year", academic_year.to_string()),
                ("count", expired.len().to_string()),
            ]),
            now,
        );

        Ok(ExpiryReport {
            academic_year: academic_year.to_string(),
            expired,
        })
    }

    /// Sweep unplaced first-year students into rooms, highest priority first.
    ///
    /// Remaining capacity is counted down locally per room; every placement still goes
    /// through the versioned commit, which has the final word.
    pub fn auto_assign_first_years(
        &self,
        academic_year: &str,
        actor: &Actor,
    ) -> Result<BatchReport, HousingError> {
        let now = self.clock.now();
        let policy = self.require_policy(academic_year)?;
        if !policy.policies.year1.auto_assign {
            return Err(HousingError::ineligible(format!(
                "automatic assignment is disabled for year 1 students in {academic_year}"
            )));
        }
        let window = self.policies.window(academic_year)?;

        let mut report = BatchReport {
            academic_year: academic_year.to_string(),
            assigned: Vec::new(),
            skipped: Vec::new(),
        };

        let mut queue: Vec<(u32, Student)> = self
            .students
            .list()?
            .into_iter()
            .filter(|student| YearGroup::classify(student.academic_year) == YearGroup::First)
            .filter(|student| student.assignment.is_none() && !student.registration_status.is_placed())
            .map(|student| (self.evaluator.priority_score(&student), student))
            .collect();
        queue.sort_by_key(|(score, student)| (Reverse(*score), student.id.clone()));

        let dormitories = self.snapshot()?;
        let mut rankings: HashMap<Gender, Vec<RoomCandidate>> = HashMap::new();
        let mut remaining: HashMap<RoomLocator, u32> = HashMap::new();

        for (_, mut student) in queue {
            let (mut application, stored) =
                match self.batch_application(&student, academic_year, now)? {
                    Ok(found) => found,
                    Err(reason) => {
                        report.skipped.push(BatchSkip {
                            student_id: student.id.clone(),
                            reason,
                        });
                        continue;
                    }
                };

            let candidates = rankings.entry(student.gender).or_insert_with(|| {
                let criteria = SearchCriteria {
                    year_group: YearGroup::First,
                    gender: student.gender,
                    preferences: RoomPreferences::default(),
                    allowed_buildings: policy.policies.year1.allowed_buildings.clone(),
                };
                let ranked = rank_candidates(&dormitories, &criteria, window.as_ref());
                for candidate in &ranked {
                    remaining
                        .entry(candidate.locator())
                        .or_insert(candidate.remaining);
                }
                ranked
            });

            let mut outcome: Option<Result<RoomAssignment, String>> = None;
            for candidate in candidates.iter() {
                let locator = candidate.locator();
                let left = remaining.get(&locator).copied().unwrap_or(0);
                if left == 0 {
                    continue;
                }
                let placement = Placement {
                    locator: &locator,
                    event: ApplicationEvent::AutoAssign,
                    action: ActivityAction::RoomAutoAssigned,
                    actor,
                    at: now,
                };
                let attempt = if stored {
                    self.engine.commit(&mut application, &mut student, placement)
                } else {
                    self.engine.commit_new(&mut application, &mut student, placement)
                };
                match attempt {
                    Ok(assignment) => {
                        remaining.insert(locator, left - 1);
                        outcome = Some(Ok(assignment));
                        break;
                    }
                    Err(err) if is_room_contention(&err) => {
                        debug!(room = %locator, error = %err, "room no longer open, dropping from batch");
                        remaining.insert(locator, 0);
                    }
                    Err(err) if err.is_business_outcome() => {
                        outcome = Some(Err(err.to_string()));
                        break;
                    }
                    Err(err) => return Err(err),
                }
            }

            match outcome {
                Some(Ok(assignment)) => report.assigned.push(BatchPlacement {
                    student_id: student.id.clone(),
                    application_id: application.id.clone(),
                    assignment,
                }),
                Some(Err(reason)) => report.skipped.push(BatchSkip {
                    student_id: student.id.clone(),
                    reason,
                }),
                None => report.skipped.push(BatchSkip {
                    student_id: student.id.clone(),
                    reason: format!("no open room for {} students", student.gender.label()),
                }),
            }
        }

        info!(
            academic_year,
            assigned = report.assigned.len(),
            skipped = report.skipped.len(),
            "first-year batch finished"
        );
        Ok(report)
    }

    /// Students with an unresolved application for the year, highest priority first.
    pub fn priority_queue(
        &self,
        academic_year: &str,
        filter: &QueueFilter,
    ) -> Result<Vec<QueueEntry>, HousingError> {
        let mut entries = Vec::new();
        for application in self.applications.for_academic_year(academic_year)? {
            if !application.status.is_unresolved() {
                continue;
            }
            let Some(student) = self.students.fetch(&application.student_id)? else {
                debug!(student_id = %application.student_id, "queued application without student record");
                continue;
            };
            let year_group = YearGroup::classify(student.academic_year);

            if filter.year_group.is_some_and(|wanted| wanted != year_group) {
                continue;
            }
            if filter.gender.is_some_and(|wanted| wanted != student.gender) {
                continue;
            }
            if let Some(faculty) = &filter.faculty {
                if student.faculty.as_deref() != Some(faculty.as_str()) {
                    continue;
                }
            }

            entries.push(QueueEntry {
                application_id: application.id.clone(),
                student_id: student.id.clone(),
                student_name: student.name.clone(),
                gender: student.gender,
                year_group,
                status: application.status,
                paid: application.payment.paid,
                priority_score: self.evaluator.priority_score(&student),
                submitted_at: application.created_at,
            });
        }

        entries.sort_by(|a, b| {
            b.priority_score
                .cmp(&a.priority_score)
                .then_with(|| a.submitted_at.cmp(&b.submitted_at))
        });
        Ok(entries)
    }

    /// Administrative room change. Capacity can never drop below current occupancy.
    pub fn update_room(
        &self,
        locator: &RoomLocator,
        update: RoomUpdate,
    ) -> Result<Dormitory, HousingError> {
        let (_, stored) = self.engine.mutate_dormitory(&locator.dormitory_id, |dormitory| {
            dormitory
                .update_room(locator.floor_number, &locator.room_number, update.clone())
                .map(|_| ())
                .map_err(|err| match err {
                    CapacityError::RoomNotFound { .. } => {
                        HousingError::NotFound(Missing::Room(locator.clone()))
                    }
                    other => HousingError::Validation(other.to_string()),
                })
        })?;
        info!(room = %locator, "room settings updated");
        Ok(stored.document)
    }

    pub fn get(&self, application_id: &ApplicationId) -> Result<Application, HousingError> {
        self.load_application(application_id)
    }

    pub fn student(&self, student_id: &StudentId) -> Result<Student, HousingError> {
        self.load_student(student_id)
    }

    pub fn check_consistency(&self) -> Result<ConsistencyReport, HousingError> {
        self.engine.check_consistency()
    }

    pub fn repair(
        &self,
        discrepancy: &Discrepancy,
        actor: &Actor,
    ) -> Result<RepairOutcome, HousingError> {
        self.engine.repair(discrepancy, actor, self.clock.now())
    }

    /// Check, then repair every discrepancy found.
    pub fn repair_all(&self, actor: &Actor) -> Result<Vec<RepairOutcome>, HousingError> {
        let report = self.check_consistency()?;
        report
            .discrepancies
            .iter()
            .map(|discrepancy| self.repair(discrepancy, actor))
            .collect()
    }

    fn decide(
        &self,
        student: &Student,
        academic_year: &str,
        now: DateTime<Utc>,
    ) -> Result<EligibilityDecision, HousingError> {
        let policy = self.policies.active_policy(academic_year)?;
        Ok(self
            .evaluator
            .evaluate(student, academic_year, policy.as_ref(), now))
    }

    fn require_policy(&self, academic_year: &str) -> Result<AcademicPolicy, HousingError> {
        self.policies.active_policy(academic_year)?.ok_or_else(|| {
            HousingError::ineligible(format!(
                "no active registration policy for academic year {academic_year}"
            ))
        })
    }

    fn snapshot(&self) -> Result<Vec<Dormitory>, HousingError> {
        Ok(self
            .dormitories
            .list()?
            .into_iter()
            .map(|stored| stored.document)
            .collect())
    }

    fn rank(
        &self,
        criteria: &SearchCriteria,
        window: Option<&AcademicWindow>,
    ) -> Result<Vec<RoomCandidate>, HousingError> {
        Ok(rank_candidates(&self.snapshot()?, criteria, window))
    }

    fn load_student(&self, id: &StudentId) -> Result<Student, HousingError> {
        self.students
            .fetch(id)?
            .ok_or_else(|| HousingError::NotFound(Missing::Student(id.clone())))
    }

    fn load_application(&self, id: &ApplicationId) -> Result<Application, HousingError> {
        self.applications
            .fetch(id)?
            .ok_or_else(|| HousingError::NotFound(Missing::Application(id.clone())))
    }

    fn load_owned_application(
        &self,
        id: &ApplicationId,
        student_id: &StudentId,
    ) -> Result<Application, HousingError> {
        let application = self.load_application(id)?;
        if &application.student_id != student_id {
            return Err(HousingError::Validation(format!(
                "application {id} does not belong to student {student_id}"
            )));
        }
        Ok(application)
    }

    /// Copy the application's status onto the student record.
    fn mirror_status(&self, application: &Application) -> Result<(), HousingError> {
        let mut student = self.load_student(&application.student_id)?;
        student.registration_status = application.status.into();
        self.students.update(student)?;
        Ok(())
    }

    /// The application a batch placement will be recorded on, and whether it is stored.
    ///
    /// A missing application is built in memory only; the placement inserts it. The inner
    /// `Err` is a skip reason, the outer one a store failure.
    fn batch_application(
        &self,
        student: &Student,
        academic_year: &str,
        now: DateTime<Utc>,
    ) -> Result<Result<(Application, bool), String>, HousingError> {
        let existing = self.applications.for_student(&student.id)?;

        if let Some(open) = existing
            .iter()
            .find(|application| !application.status.is_terminal())
        {
            if open.academic_year != academic_year {
                return Ok(Err(format!(
                    "open application {} belongs to {}",
                    open.id, open.academic_year
                )));
            }
            return Ok(match ApplicationEvent::AutoAssign.target(open.status) {
                Some(_) => Ok((open.clone(), true)),
                None => Err(format!(
                    "application {} is {} and must be assigned by an administrator",
                    open.id, open.status
                )),
            });
        }

        let application = Application {
            id: self.applications.next_id()?,
            student_id: student.id.clone(),
            student_name: student.name.clone(),
            gender: student.gender,
            academic_year: academic_year.to_string(),
            preferences: RoomPreferences::default(),
            requested_room: None,
            status: ApplicationStatus::PendingReview,
            payment: PaymentRecord::default(),
            assignment: None,
            rejection_reason: None,
            cancellation_reason: None,
            checkout_request: None,
            transitions: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        Ok(Ok((application, false)))
    }
}

fn criteria_for(
    student: &Student,
    policy: &AcademicPolicy,
    preferences: RoomPreferences,
) -> SearchCriteria {
    let year_group = YearGroup::classify(student.academic_year);
    SearchCriteria {
        year_group,
        gender: student.gender,
        preferences,
        allowed_buildings: policy.for_group(year_group).allowed_buildings().to_vec(),
    }
}

/// Failures that mean "this room, not this student": the next candidate may still work.
fn is_room_contention(err: &HousingError) -> bool {
    matches!(
        err,
        HousingError::RoomFull { .. }
            | HousingError::RoomUnavailable { .. }
            | HousingError::ConcurrencyConflict { .. }
    )
}
