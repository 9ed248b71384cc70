//! Process-local implementations of the storage and collaborator seams.
//!
//! Used by the demo service, the CLI batch command, and the tests. The dormitory store
//! enforces the same versioned compare-and-swap contract a document database would.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};

use super::capacity::{Dormitory, DormitoryId};
use super::domain::{Application, ApplicationId, Student, StudentId};
use super::eligibility::{AcademicPolicy, AcademicWindow};
use super::repository::{
    ActivityEntry, ActivityLog, ActivityLogError, ApplicationRepository, Clock, DormitoryStore,
    Notification, Notifier, NotifyError, PolicyStore, RepositoryError, StudentRepository,
    Versioned,
};

fn lock<'a, T>(mutex: &'a Mutex<T>, name: &str) -> Result<MutexGuard<'a, T>, RepositoryError> {
    mutex
        .lock()
        .map_err(|_| RepositoryError::Unavailable(format!("{name} mutex poisoned")))
}

#[derive(Default, Clone)]
pub struct InMemoryDormitoryStore {
    documents: Arc<Mutex<BTreeMap<DormitoryId, Versioned<Dormitory>>>>,
}

impl DormitoryStore for InMemoryDormitoryStore {
    fn fetch(&self, id: &DormitoryId) -> Result<Option<Versioned<Dormitory>>, RepositoryError> {
        let guard = lock(&self.documents, "dormitory store")?;
        Ok(guard.get(id).cloned())
    }

    fn list(&self) -> Result<Vec<Versioned<Dormitory>>, RepositoryError> {
        let guard = lock(&self.documents, "dormitory store")?;
        Ok(guard.values().cloned().collect())
    }

    fn insert(&self, dormitory: Dormitory) -> Result<Versioned<Dormitory>, RepositoryError> {
        let mut guard = lock(&self.documents, "dormitory store")?;
        if guard.contains_key(&dormitory.id) {
            return Err(RepositoryError::Conflict);
        }
        let stored = Versioned {
            version: 1,
            document: dormitory,
        };
        guard.insert(stored.document.id.clone(), stored.clone());
        Ok(stored)
    }

    fn replace(
        &self,
        dormitory: Dormitory,
        expected_version: u64,
    ) -> Result<Versioned<Dormitory>, RepositoryError> {
        let mut guard = lock(&self.documents, "dormitory store")?;
        let current = guard
            .get_mut(&dormitory.id)
            .ok_or(RepositoryError::NotFound)?;
        if current.version != expected_version {
            return Err(RepositoryError::VersionConflict {
                expected: expected_version,
                found: current.version,
            });
        }
        current.version += 1;
        current.document = dormitory;
        Ok(current.clone())
    }
}

#[derive(Default, Clone)]
pub struct InMemoryStudentRepository {
    records: Arc<Mutex<BTreeMap<StudentId, Student>>>,
}

impl StudentRepository for InMemoryStudentRepository {
    fn insert(&self, student: Student) -> Result<Student, RepositoryError> {
        let mut guard = lock(&self.records, "student repository")?;
        if guard.contains_key(&student.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(student.id.clone(), student.clone());
        Ok(student)
    }

    fn update(&self, student: Student) -> Result<(), RepositoryError> {
        let mut guard = lock(&self.records, "student repository")?;
        match guard.get_mut(&student.id) {
            Some(existing) => {
                *existing = student;
                Ok(())
            }
            None => Err(RepositoryError::NotFound),
        }
    }

    fn fetch(&self, id: &StudentId) -> Result<Option<Student>, RepositoryError> {
        let guard = lock(&self.records, "student repository")?;
        Ok(guard.get(id).cloned())
    }

    fn list(&self) -> Result<Vec<Student>, RepositoryError> {
        let guard = lock(&self.records, "student repository")?;
        Ok(guard.values().cloned().collect())
    }
}

#[derive(Default, Clone)]
pub struct InMemoryApplicationRepository {
    records: Arc<Mutex<HashMap<ApplicationId, Application>>>,
    sequence: Arc<AtomicU64>,
}

impl InMemoryApplicationRepository {
    fn matching(
        &self,
        predicate: impl Fn(&Application) -> bool,
    ) -> Result<Vec<Application>, RepositoryError> {
        let guard = lock(&self.records, "application repository")?;
        let mut applications: Vec<Application> = guard
            .values()
            .filter(|application| predicate(application))
            .cloned()
            .collect();
        applications.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(applications)
    }
}

impl ApplicationRepository for InMemoryApplicationRepository {
    fn next_id(&self) -> Result<ApplicationId, RepositoryError> {
        let id = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        Ok(ApplicationId(format!("app-{id:06}")))
    }

    fn insert(&self, application: Application) -> Result<Application, RepositoryError> {
        let mut guard = lock(&self.records, "application repository")?;
        if guard.contains_key(&application.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(application.id.clone(), application.clone());
        Ok(application)
    }

    fn update(&self, application: Application) -> Result<(), RepositoryError> {
        let mut guard = lock(&self.records, "application repository")?;
        if guard.contains_key(&application.id) {
            guard.insert(application.id.clone(), application);
            Ok(())
        } else {
            Err(RepositoryError::NotFound)
        }
    }

    fn fetch(&self, id: &ApplicationId) -> Result<Option<Application>, RepositoryError> {
        let guard = lock(&self.records, "application repository")?;
        Ok(guard.get(id).cloned())
    }

    fn for_student(&self, student_id: &StudentId) -> Result<Vec<Application>, RepositoryError> {
        self.matching(|application| &application.student_id == student_id)
    }

    fn for_academic_year(&self, academic_year: &str) -> Result<Vec<Application>, RepositoryError> {
        self.matching(|application| application.academic_year == academic_year)
    }
}

#[derive(Default, Clone)]
pub struct InMemoryPolicyStore {
    policies: Arc<Mutex<HashMap<String, AcademicPolicy>>>,
    windows: Arc<Mutex<HashMap<String, AcademicWindow>>>,
}

impl InMemoryPolicyStore {
    pub fn put_policy(&self, policy: AcademicPolicy) -> Result<(), RepositoryError> {
        let mut guard = lock(&self.policies, "policy store")?;
        guard.insert(policy.academic_year.clone(), policy);
        Ok(())
    }

    pub fn put_window(&self, window: AcademicWindow) -> Result<(), RepositoryError> {
        let mut guard = lock(&self.windows, "policy store")?;
        guard.insert(window.academic_year.clone(), window);
        Ok(())
    }
}

impl PolicyStore for InMemoryPolicyStore {
    fn active_policy(&self, academic_year: &str) -> Result<Option<AcademicPolicy>, RepositoryError> {
        let guard = lock(&self.policies, "policy store")?;
        Ok(guard
            .get(academic_year)
            .filter(|policy| policy.active)
            .cloned())
    }

    fn window(&self, academic_year: &str) -> Result<Option<AcademicWindow>, RepositoryError> {
        let guard = lock(&self.windows, "policy store")?;
        Ok(guard.get(academic_year).cloned())
    }
}

/// Notifier that keeps every delivered notification in memory.
#[derive(Default, Clone)]
pub struct RecordingNotifier {
    events: Arc<Mutex<Vec<Notification>>>,
}

impl RecordingNotifier {
    pub fn events(&self) -> Vec<Notification> {
        self.events
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notification: Notification) -> Result<(), NotifyError> {
        let mut guard = self
            .events
            .lock()
            .map_err(|_| NotifyError::Transport("notifier mutex poisoned".to_string()))?;
        guard.push(notification);
        Ok(())
    }
}

#[derive(Default, Clone)]
pub struct RecordingActivityLog {
    entries: Arc<Mutex<Vec<ActivityEntry>>>,
}

impl RecordingActivityLog {
    pub fn entries(&self) -> Vec<ActivityEntry> {
        self.entries
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

impl ActivityLog for RecordingActivityLog {
    fn record(&self, entry: ActivityEntry) -> Result<(), ActivityLogError> {
        let mut guard = self
            .entries
            .lock()
            .map_err(|_| ActivityLogError::Unavailable("activity mutex poisoned".to_string()))?;
        guard.push(entry);
        Ok(())
    }
}

/// Manually driven clock.
#[derive(Clone)]
pub struct FixedClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(now)),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        if let Ok(mut guard) = self.now.lock() {
            *guard = now;
        }
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(mut guard) = self.now.lock() {
            *guard += by;
        }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.now
            .lock()
            .map(|guard| *guard)
            .unwrap_or_else(|poisoned| *poisoned.into_inner())
    }
}
