use dormitory_allocation::error::AppError;
use dormitory_allocation::housing::{
    AcademicPolicy, AllocationSettings, Collaborators, Dormitory, InMemoryApplicationRepository,
    InMemoryDormitoryStore, InMemoryPolicyStore, InMemoryStudentRepository, InventoryImporter,
    RecordingActivityLog, RecordingNotifier, RegistrationService, RosterImporter, Student,
    SystemClock,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::info;

pub(crate) const DEFAULT_ACADEMIC_YEAR: &str = "2025-2026";

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Process-local stores wired behind one registration service.
#[derive(Clone)]
pub(crate) struct Campus {
    pub(crate) service: Arc<RegistrationService>,
    pub(crate) dormitories: InMemoryDormitoryStore,
    pub(crate) students: InMemoryStudentRepository,
    pub(crate) notifier: RecordingNotifier,
    pub(crate) activity: RecordingActivityLog,
}

impl Campus {
    pub(crate) fn new(
        settings: AllocationSettings,
        academic_year: &str,
    ) -> Result<Self, AppError> {
        let dormitories = InMemoryDormitoryStore::default();
        let students = InMemoryStudentRepository::default();
        let policies = InMemoryPolicyStore::default();
        let notifier = RecordingNotifier::default();
        let activity = RecordingActivityLog::default();

        policies
            .put_policy(AcademicPolicy::new(academic_year))
            .map_err(|err| AppError::Housing(err.into()))?;

        let service = RegistrationService::new(
            Collaborators {
                dormitories: Arc::new(dormitories.clone()),
                students: Arc::new(students.clone()),
                applications: Arc::new(InMemoryApplicationRepository::default()),
                policies: Arc::new(policies),
                notifier: Arc::new(notifier.clone()),
                activity: Arc::new(activity.clone()),
                clock: Arc::new(SystemClock),
            },
            settings,
        );

        Ok(Self {
            service: Arc::new(service),
            dormitories,
            students,
            notifier,
            activity,
        })
    }

    pub(crate) fn load_dormitories(&self, dormitories: Vec<Dormitory>) -> Result<usize, AppError> {
        Ok(InventoryImporter::load(&self.dormitories, dormitories)?)
    }

    pub(crate) fn load_students(&self, students: Vec<Student>) -> Result<usize, AppError> {
        Ok(RosterImporter::load(&self.students, students)?)
    }

    /// Load optional CSV exports, skipping whichever path is absent.
    pub(crate) fn load_files(
        &self,
        inventory: Option<&Path>,
        roster: Option<&Path>,
    ) -> Result<(), AppError> {
        if let Some(path) = inventory {
            let count = self.load_dormitories(InventoryImporter::from_path(path)?)?;
            info!(path = %path.display(), count, "room inventory imported");
        }
        if let Some(path) = roster {
            let count = self.load_students(RosterImporter::from_path(path)?)?;
            info!(path = %path.display(), count, "student roster imported");
        }
        Ok(())
    }
}
