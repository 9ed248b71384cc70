use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use axum::body::to_bytes;
use axum::response::Response;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;

use crate::housing::capacity::{Dormitory, DormitoryId, GenderPolicy, Room, RoomLocator, RoomType};
use crate::housing::domain::{
    Actor, Application, ApplicationId, Gender, PaymentConfirmation, RegistrationRequest,
    RoomPreferences, Student, StudentId,
};
use crate::housing::eligibility::AcademicPolicy;
use crate::housing::memory::{
    FixedClock, InMemoryApplicationRepository, InMemoryDormitoryStore, InMemoryPolicyStore,
    InMemoryStudentRepository, RecordingActivityLog, RecordingNotifier,
};
use crate::housing::repository::{
    ActivityEntry, ActivityLog, ActivityLogError, ApplicationRepository, DormitoryStore,
    Notification, Notifier, NotifyError, RepositoryError, StudentRepository, Versioned,
};
use crate::housing::service::{AllocationSettings, Collaborators, RegistrationService};

pub(super) const YEAR: &str = "2025-2026";

pub(super) fn at(year: i32, month: u32, day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, hour, 0, 0)
        .single()
        .expect("valid timestamp")
}

pub(super) fn now() -> DateTime<Utc> {
    at(2025, 8, 1, 9)
}

pub(super) fn admin() -> Actor {
    Actor::admin("admin-1")
}

pub(super) fn dorm_id(id: &str) -> DormitoryId {
    DormitoryId(id.to_string())
}

pub(super) fn locator(dormitory: &str, floor: i32, room: &str) -> RoomLocator {
    RoomLocator::new(dorm_id(dormitory), floor, room)
}

pub(super) fn room(number: &str, room_type: RoomType, policy: GenderPolicy, price: u32) -> Room {
    Room::new(number, room_type, policy, price)
}

/// Dormitory with the given `(floor, room)` entries.
pub(super) fn dormitory(id: &str, name: &str, rooms: Vec<(i32, Room)>) -> Dormitory {
    let mut dormitory = Dormitory::new(dorm_id(id), name, format!("{name} street 1"));
    for (floor, room) in rooms {
        dormitory.add_room(floor, room).expect("room added");
    }
    dormitory
}

pub(super) fn student(id: &str, name: &str, gender: Gender, year: Option<i32>) -> Student {
    let mut student = Student::new(StudentId(id.to_string()), name, gender, year);
    student.email = format!("{}@uni.example", id.to_ascii_lowercase());
    student.phone = "0900000000".to_string();
    student
}

pub(super) fn request(student_id: &str) -> RegistrationRequest {
    RegistrationRequest {
        student_id: StudentId(student_id.to_string()),
        academic_year: YEAR.to_string(),
        preferences: RoomPreferences::default(),
        requested_room: None,
    }
}

pub(super) fn payment() -> PaymentConfirmation {
    PaymentConfirmation {
        amount: 1_500_000,
        method: Some("bank_transfer".to_string()),
        transaction_ref: Some("TX-1".to_string()),
        note: None,
    }
}

/// Service wired to in-memory collaborators, with handles kept for assertions.
pub(super) struct Harness {
    pub(super) service: RegistrationService,
    pub(super) dormitories: InMemoryDormitoryStore,
    pub(super) students: InMemoryStudentRepository,
    pub(super) applications: InMemoryApplicationRepository,
    pub(super) policies: InMemoryPolicyStore,
    pub(super) notifier: RecordingNotifier,
    pub(super) activity: RecordingActivityLog,
    pub(super) clock: FixedClock,
}

impl Harness {
    pub(super) fn new() -> Self {
        let dormitories = InMemoryDormitoryStore::default();
        let students = InMemoryStudentRepository::default();
        let applications = InMemoryApplicationRepository::default();
        let policies = InMemoryPolicyStore::default();
        let notifier = RecordingNotifier::default();
        let activity = RecordingActivityLog::default();
        let clock = FixedClock::new(now());

        policies
            .put_policy(AcademicPolicy::new(YEAR))
            .expect("policy stored");

        let service = RegistrationService::new(
            Collaborators {
                dormitories: Arc::new(dormitories.clone()),
                students: Arc::new(students.clone()),
                applications: Arc::new(applications.clone()),
                policies: Arc::new(policies.clone()),
                notifier: Arc::new(notifier.clone()),
                activity: Arc::new(activity.clone()),
                clock: Arc::new(clock.clone()),
            },
            AllocationSettings::default(),
        );

        Self {
            service,
            dormitories,
            students,
            applications,
            policies,
            notifier,
            activity,
            clock,
        }
    }

    pub(super) fn with_dormitory(self, dormitory: Dormitory) -> Self {
        self.dormitories.insert(dormitory).expect("dormitory stored");
        self
    }

    pub(super) fn with_student(self, student: Student) -> Self {
        self.students.insert(student).expect("student stored");
        self
    }

    pub(super) fn dormitory(&self, id: &str) -> Dormitory {
        self.dormitories
            .fetch(&dorm_id(id))
            .expect("fetch succeeds")
            .expect("dormitory present")
            .document
    }

    pub(super) fn occupancy(&self, at: &RoomLocator) -> u32 {
        self.dormitory(&at.dormitory_id.0)
            .room(at.floor_number, &at.room_number)
            .expect("room present")
            .active_occupancy()
    }

    pub(super) fn stored_student(&self, id: &str) -> Student {
        self.students
            .fetch(&StudentId(id.to_string()))
            .expect("fetch succeeds")
            .expect("student present")
    }

    /// Submit, approve, and pay for a student's application.
    pub(super) fn paid_application(&self, student_id: &str) -> Application {
        let application = self
            .service
            .submit(request(student_id))
            .expect("submission accepted");
        self.service
            .approve(&application.id, &admin())
            .expect("approval succeeds");
        self.service
            .confirm_payment(&application.id, &admin(), payment())
            .expect("payment recorded")
    }

    pub(super) fn notification_kinds(&self) -> Vec<&'static str> {
        self.notifier
            .events()
            .iter()
            .map(|event| event.kind.label())
            .collect()
    }
}

/// Two-dormitory campus: a male block and a mixed block.
pub(super) fn campus() -> Vec<Dormitory> {
    vec![
        dormitory(
            "DORM-A",
            "Block A",
            vec![
                (1, room("101", RoomType::FourPersonService, GenderPolicy::Male, 900)),
                (2, room("201", RoomType::FourPersonService, GenderPolicy::Male, 950)),
                (2, room("202", RoomType::EightPerson, GenderPolicy::Male, 600)),
            ],
        ),
        dormitory(
            "DORM-B",
            "Block B",
            vec![
                (1, room("105", RoomType::FivePerson, GenderPolicy::Female, 700)),
                (3, room("301", RoomType::TenPerson, GenderPolicy::Any, 500)),
            ],
        ),
    ]
}

pub(super) fn campus_harness() -> Harness {
    campus()
        .into_iter()
        .fold(Harness::new(), |harness, dormitory| harness.with_dormitory(dormitory))
}

pub(super) fn application_id(raw: &str) -> ApplicationId {
    ApplicationId(raw.to_string())
}

pub(super) async fn body_json(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body readable");
    serde_json::from_slice(&bytes).expect("json body")
}

#[derive(Default, Clone)]
pub(super) struct FailingNotifier;

impl Notifier for FailingNotifier {
    fn notify(&self, _notification: Notification) -> Result<(), NotifyError> {
        Err(NotifyError::Transport("smtp down".to_string()))
    }
}

#[derive(Default, Clone)]
pub(super) struct FailingActivityLog;

impl ActivityLog for FailingActivityLog {
    fn record(&self, _entry: ActivityEntry) -> Result<(), ActivityLogError> {
        Err(ActivityLogError::Unavailable("audit store down".to_string()))
    }
}

/// Student repository whose `update` can be made to fail on demand.
#[derive(Default, Clone)]
pub(super) struct FlakyStudents {
    pub(super) inner: InMemoryStudentRepository,
    pub(super) fail_updates: Arc<AtomicBool>,
}

impl StudentRepository for FlakyStudents {
    fn insert(&self, student: Student) -> Result<Student, RepositoryError> {
        self.inner.insert(student)
    }

    fn update(&self, student: Student) -> Result<(), RepositoryError> {
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(RepositoryError::Unavailable("student store offline".to_string()));
        }
        self.inner.update(student)
    }

    fn fetch(&self, id: &StudentId) -> Result<Option<Student>, RepositoryError> {
        self.inner.fetch(id)
    }

    fn list(&self) -> Result<Vec<Student>, RepositoryError> {
        self.inner.list()
    }
}

/// Dormitory store that lets another writer sneak in before the next `replace` calls.
///
/// Each interleaving places `intruder` into the given room, so the caller's snapshot goes
/// stale exactly as it would under a concurrent admin action.
#[derive(Clone)]
pub(super) struct InterleavingStore {
    pub(super) inner: InMemoryDormitoryStore,
    pub(super) target: RoomLocator,
    pub(super) remaining_interleavings: Arc<AtomicUsize>,
    pub(super) intruders: Arc<AtomicUsize>,
}

impl InterleavingStore {
    pub(super) fn new(inner: InMemoryDormitoryStore, target: RoomLocator, interleavings: usize) -> Self {
        Self {
            inner,
            target,
            remaining_interleavings: Arc::new(AtomicUsize::new(interleavings)),
            intruders: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn intrude(&self) -> Result<(), RepositoryError> {
        let stored = self
            .inner
            .fetch(&self.target.dormitory_id)?
            .ok_or(RepositoryError::NotFound)?;
        let mut document = stored.document;
        let n = self.intruders.fetch_add(1, Ordering::SeqCst);
        if let Some(room) = document.room_mut(self.target.floor_number, &self.target.room_number) {
            let _ = room.place(crate::housing::capacity::Occupant {
                student_id: StudentId(format!("INTRUDER-{n}")),
                name: format!("Intruder {n}"),
                email: String::new(),
                phone: String::new(),
                gender: None,
                check_in_date: now(),
                checked_out_at: None,
                active: true,
            });
        }
        self.inner.replace(document, stored.version).map(|_| ())
    }
}

impl DormitoryStore for InterleavingStore {
    fn fetch(&self, id: &DormitoryId) -> Result<Option<Versioned<Dormitory>>, RepositoryError> {
        self.inner.fetch(id)
    }

    fn list(&self) -> Result<Vec<Versioned<Dormitory>>, RepositoryError> {
        self.inner.list()
    }

    fn insert(&self, dormitory: Dormitory) -> Result<Versioned<Dormitory>, RepositoryError> {
        self.inner.insert(dormitory)
    }

    fn replace(
        &self,
        dormitory: Dormitory,
        expected_version: u64,
    ) -> Result<Versioned<Dormitory>, RepositoryError> {
        let pending = self.remaining_interleavings.load(Ordering::SeqCst);
        if pending > 0 {
            self.remaining_interleavings.store(pending - 1, Ordering::SeqCst);
            self.intrude()?;
        }
        self.inner.replace(dormitory, expected_version)
    }
}

/// Dormitory store that counts single-document reads, one per commit attempt.
#[derive(Default, Clone)]
pub(super) struct CountingStore {
    pub(super) inner: InMemoryDormitoryStore,
    pub(super) fetches: Arc<AtomicUsize>,
}

impl DormitoryStore for CountingStore {
    fn fetch(&self, id: &DormitoryId) -> Result<Option<Versioned<Dormitory>>, RepositoryError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.inner.fetch(id)
    }

    fn list(&self) -> Result<Vec<Versioned<Dormitory>>, RepositoryError> {
        self.inner.list()
    }

    fn insert(&self, dormitory: Dormitory) -> Result<Versioned<Dormitory>, RepositoryError> {
        self.inner.insert(dormitory)
    }

    fn replace(
        &self,
        dormitory: Dormitory,
        expected_version: u64,
    ) -> Result<Versioned<Dormitory>, RepositoryError> {
        self.inner.replace(dormitory, expected_version)
    }
}

/// Application repository whose reads fail once `offline` is set.
#[derive(Default, Clone)]
pub(super) struct OfflineApplications {
    pub(super) inner: InMemoryApplicationRepository,
    pub(super) offline: Arc<AtomicBool>,
}

impl OfflineApplications {
    fn check(&self) -> Result<(), RepositoryError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(RepositoryError::Unavailable(
                "application store offline".to_string(),
            ));
        }
        Ok(())
    }
}

impl ApplicationRepository for OfflineApplications {
    fn next_id(&self) -> Result<ApplicationId, RepositoryError> {
        self.inner.next_id()
    }

    fn insert(&self, application: Application) -> Result<Application, RepositoryError> {
        self.check()?;
        self.inner.insert(application)
    }

    fn update(&self, application: Application) -> Result<(), RepositoryError> {
        self.check()?;
        self.inner.update(application)
    }

    fn fetch(&self, id: &ApplicationId) -> Result<Option<Application>, RepositoryError> {
        self.check()?;
        self.inner.fetch(id)
    }

    fn for_student(&self, student_id: &StudentId) -> Result<Vec<Application>, RepositoryError> {
        self.check()?;
        self.inner.for_student(student_id)
    }

    fn for_academic_year(&self, academic_year: &str) -> Result<Vec<Application>, RepositoryError> {
        self.check()?;
        self.inner.for_academic_year(academic_year)
    }
}

/// Service with a default policy over the given stores and recording collaborators.
pub(super) fn batch_service(
    dormitories: Arc<dyn DormitoryStore>,
    students: InMemoryStudentRepository,
    applications: Arc<dyn ApplicationRepository>,
) -> RegistrationService {
    let policies = InMemoryPolicyStore::default();
    policies
        .put_policy(AcademicPolicy::new(YEAR))
        .expect("policy stored");
    RegistrationService::new(
        Collaborators {
            dormitories,
            students: Arc::new(students),
            applications,
            policies: Arc::new(policies),
            notifier: Arc::new(RecordingNotifier::default()),
            activity: Arc::new(RecordingActivityLog::default()),
            clock: Arc::new(FixedClock::new(now())),
        },
        AllocationSettings::default(),
    )
}

/// Service over caller-supplied dormitory and student stores.
pub(super) fn service_with(
    dormitories: Arc<dyn DormitoryStore>,
    students: Arc<dyn StudentRepository>,
    applications: InMemoryApplicationRepository,
    policies: InMemoryPolicyStore,
    notifier: Arc<dyn Notifier>,
    activity: Arc<dyn ActivityLog>,
) -> RegistrationService {
    RegistrationService::new(
        Collaborators {
            dormitories,
            students,
            applications: Arc::new(applications),
            policies: Arc::new(policies),
            notifier,
            activity,
            clock: Arc::new(FixedClock::new(now())),
        },
        AllocationSettings::default(),
    )
}
