//! Capacity-safe placement and removal of occupants.
//!
//! Every write to a dormitory document goes through [`AllocationEngine::mutate_dormitory`]:
//! fetch the current version, re-run the caller's checks against it, then replace the
//! document only if nobody else wrote in between. A lost race re-reads and re-checks, so
//! a room that filled up meanwhile surfaces as `RoomFull` rather than an overbooking.
//!
//! A placement touches three records in a fixed order: dormitory, student, application.
//! Only the first is protected by the version check. If a later write fails the records
//! disagree, which is reported as [`HousingError::FatalConsistency`] and left for
//! [`AllocationEngine::check_consistency`] and [`AllocationEngine::repair`].

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use super::capacity::{Dormitory, DormitoryId, MatchedOn, Occupant, RoomLocator, RoomStatus};
use super::domain::{
    Actor, Application, RegistrationStatus, ResidencyOutcome, ResidencyRecord, RoomAssignment,
    Student, StudentId,
};
use super::effects::{details, SideEffects};
use super::error::{HousingError, Missing};
use super::lifecycle::{self, ApplicationEvent};
use super::repository::{
    ActivityAction, ApplicationRepository, DormitoryStore, NotificationKind, RepositoryError,
    StudentRepository, Versioned,
};

pub const DEFAULT_MAX_COMMIT_ATTEMPTS: u8 = 3;

/// How a placement should be recorded on the application and in the audit trail.
#[derive(Debug, Clone, Copy)]
pub struct Placement<'a> {
    pub locator: &'a RoomLocator,
    pub event: ApplicationEvent,
    pub action: ActivityAction,
    pub actor: &'a Actor,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ApplicationWrite {
    Update,
    Insert,
}

#[derive(Clone)]
pub struct AllocationEngine {
    dormitories: Arc<dyn DormitoryStore>,
    students: Arc<dyn StudentRepository>,
    applications: Arc<dyn ApplicationRepository>,
    effects: SideEffects,
    max_attempts: u8,
}

impl AllocationEngine {
    pub fn new(
        dormitories: Arc<dyn DormitoryStore>,
        students: Arc<dyn StudentRepository>,
        applications: Arc<dyn ApplicationRepository>,
        effects: SideEffects,
        max_attempts: u8,
    ) -> Self {
        Self {
            dormitories,
            students,
            applications,
            effects,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Fail when the student already holds a room anywhere, matched by id or by name.
    pub fn ensure_not_placed(&self, student: &Student) -> Result<(), HousingError> {
        if let Some(assignment) = &student.assignment {
            return Err(HousingError::DuplicateStudent {
                matched_on: MatchedOn::StudentId,
                value: student.id.to_string(),
                location: assignment.clone(),
            });
        }

        for stored in self.dormitories.list()? {
            if let Some(conflict) = duplicate_in(&stored.document, student) {
                return Err(conflict);
            }
        }
        Ok(())
    }

    /// Read-only live check that a room could take this student right now.
    pub fn ensure_room_open(
        &self,
        locator: &RoomLocator,
        student: &Student,
    ) -> Result<(), HousingError> {
        let stored = self.fetch_dormitory(&locator.dormitory_id)?;
        check_room(&stored.document, locator, student)
    }

    /// Place the student in the room and record the outcome on both records.
    ///
    /// `application` and `student` must be freshly read; they are updated in place and
    /// written back only after the dormitory commit succeeds.
    pub fn commit(
        &self,
        application: &mut Application,
        student: &mut Student,
        placement: Placement<'_>,
    ) -> Result<RoomAssignment, HousingError> {
        self.place(application, student, placement, ApplicationWrite::Update)
    }

    /// Like [`commit`](Self::commit) for an application that is not stored yet.
    ///
    /// The application is inserted only once the room is taken, so a failed placement
    /// leaves nothing behind.
    pub fn commit_new(
        &self,
        application: &mut Application,
        student: &mut Student,
        placement: Placement<'_>,
    ) -> Result<RoomAssignment, HousingError> {
        self.place(application, student, placement, ApplicationWrite::Insert)
    }

    fn place(
        &self,
        application: &mut Application,
        student: &mut Student,
        placement: Placement<'_>,
        write: ApplicationWrite,
    ) -> Result<RoomAssignment, HousingError> {
        let Placement {
            locator,
            event,
            action,
            actor,
            at,
        } = placement;

        lifecycle::ensure_allowed(application, event)?;
        self.ensure_not_placed(student)?;

        let occupant = Occupant {
            student_id: student.id.clone(),
            name: student.name.clone(),
            email: student.email.clone(),
            phone: student.phone.clone(),
            gender: Some(student.gender),
            check_in_date: at,
            checked_out_at: None,
            active: true,
        };

        let (_, committed) = self.mutate_dormitory(&locator.dormitory_id, |dormitory| {
            check_room(dormitory, locator, student)?;
            if let Some(conflict) = duplicate_in(dormitory, student) {
                return Err(conflict);
            }
            let room = dormitory
                .room_mut(locator.floor_number, &locator.room_number)
                .ok_or_else(|| HousingError::NotFound(Missing::Room(locator.clone())))?;
            if room.mixes_genders_with(student.gender) {
                warn!(
                    room = %locator,
                    student_id = %student.id,
                    "placing student in an any-gender room with occupants of another gender"
                );
            }
            let capacity = room.max_capacity();
            room.place(occupant.clone())
                .map_err(|_| HousingError::RoomFull {
                    location: locator.clone(),
                    capacity,
                })
        })?;

        let assignment = RoomAssignment {
            dormitory_id: locator.dormitory_id.clone(),
            dormitory_name: committed.document.name.clone(),
            floor_number: locator.floor_number,
            room_number: locator.room_number.clone(),
        };

        student.assignment = Some(assignment.clone());
        student.registration_status = RegistrationStatus::AssignedRoom;
        if let Err(err) = self.students.update(student.clone()) {
            return Err(fatal(format!(
                "room {locator} now holds student {} but the student record could not be updated: {err}",
                student.id
            )));
        }

        lifecycle::apply(application, event, actor, at)?;
        application.assignment = Some(assignment.clone());
        let written = match write {
            ApplicationWrite::Update => self.applications.update(application.clone()),
            ApplicationWrite::Insert => self.applications.insert(application.clone()).map(|_| ()),
        };
        if let Err(err) = written {
            return Err(fatal(format!(
                "student {} was placed in {locator} but application {} could not be updated: {err}",
                student.id, application.id
            )));
        }

        info!(
            application_id = %application.id,
            student_id = %student.id,
            room = %locator,
            dormitory_version = committed.version,
            "room assigned"
        );

        let context = details([
            ("application_id", application.id.to_string()),
            ("dormitory", assignment.dormitory_name.clone()),
            ("floor", assignment.floor_number.to_string()),
            ("room", assignment.room_number.clone()),
        ]);
        self.effects
            .notify(NotificationKind::RoomAssigned, &student.id, context.clone());
        self.effects.record(
            actor,
            action,
            format!("assigned {} to {assignment}", student.name),
            context,
            at,
        );

        Ok(assignment)
    }

    /// Vacate the student's slot on check-out and close the residency.
    pub fn release(
        &self,
        application: &mut Application,
        student: &mut Student,
        actor: &Actor,
        at: DateTime<Utc>,
    ) -> Result<RoomAssignment, HousingError> {
        lifecycle::ensure_allowed(application, ApplicationEvent::CheckOut)?;

        let assignment = application
            .assignment
            .clone()
            .or_else(|| student.assignment.clone())
            .ok_or_else(|| {
                fatal(format!(
                    "application {} is {} but carries no room",
                    application.id, application.status
                ))
            })?;
        let locator = assignment.locator();

        self.mutate_dormitory(&locator.dormitory_id, |dormitory| {
            let room = dormitory
                .room_mut(locator.floor_number, &locator.room_number)
                .ok_or_else(|| HousingError::NotFound(Missing::Room(locator.clone())))?;
            if room.vacate(&student.id, at).is_none() {
                warn!(
                    student_id = %student.id,
                    room = %locator,
                    "no active occupant slot to vacate on check-out"
                );
            }
            Ok(())
        })?;

        student.registration_history.push(ResidencyRecord {
            academic_year: application.academic_year.clone(),
            assignment: assignment.clone(),
            checked_in_at: student.check_in_date,
            checked_out_at: at,
            outcome: ResidencyOutcome::Completed,
        });
        student.assignment = None;
        student.registration_status = RegistrationStatus::CheckedOut;
        student.check_out_date = Some(at);
        if let Err(err) = self.students.update(student.clone()) {
            return Err(fatal(format!(
                "room {locator} released student {} but the student record could not be updated: {err}",
                student.id
            )));
        }

        lifecycle::apply(application, ApplicationEvent::CheckOut, actor, at)?;
        if let Err(err) = self.applications.update(application.clone()) {
            return Err(fatal(format!(
                "student {} left {locator} but application {} could not be updated: {err}",
                student.id, application.id
            )));
        }

        info!(
            application_id = %application.id,
            student_id = %student.id,
            room = %locator,
            "student checked out"
        );
        Ok(assignment)
    }

    /// Compare every student pointer with the active occupant slots.
    pub fn check_consistency(&self) -> Result<ConsistencyReport, HousingError> {
        let dormitories = self.dormitories.list()?;
        let students = self.students.list()?;

        let mut slots: BTreeMap<StudentId, Vec<RoomLocator>> = BTreeMap::new();
        for stored in &dormitories {
            let dormitory = &stored.document;
            for (floor_number, room) in dormitory.rooms() {
                for occupant in room.active_occupants() {
                    slots.entry(occupant.student_id.clone()).or_default().push(
                        RoomLocator::new(dormitory.id.clone(), floor_number, room.room_number()),
                    );
                }
            }
        }

        let mut discrepancies = Vec::new();
        for student in &students {
            let held = slots.remove(&student.id).unwrap_or_default();
            if let Some(discrepancy) = classify(student, held) {
                discrepancies.push(discrepancy);
            }
        }
        for (student_id, rooms) in slots {
            discrepancies.push(Discrepancy::UnknownStudent { student_id, rooms });
        }

        if !discrepancies.is_empty() {
            warn!(
                count = discrepancies.len(),
                "student pointers and occupant slots disagree"
            );
        }

        Ok(ConsistencyReport {
            students_checked: students.len(),
            dormitories_checked: dormitories.len(),
            discrepancies,
        })
    }

    /// Realign occupant slots with the student record, which is authoritative.
    pub fn repair(
        &self,
        discrepancy: &Discrepancy,
        actor: &Actor,
        at: DateTime<Utc>,
    ) -> Result<RepairOutcome, HousingError> {
        let student_id = discrepancy.student_id();
        let student = self.students.fetch(student_id)?;
        let target = student
            .as_ref()
            .and_then(|student| student.assignment.as_ref())
            .map(RoomAssignment::locator);

        let mut outcome = RepairOutcome {
            student_id: student_id.clone(),
            vacated: Vec::new(),
            placed: None,
        };

        for stored in self.dormitories.list()? {
            let dormitory_id = stored.document.id.clone();
            let stray: Vec<RoomLocator> = stored
                .document
                .rooms_holding(student_id)
                .into_iter()
                .map(|(floor_number, room_number)| {
                    RoomLocator::new(dormitory_id.clone(), floor_number, room_number)
                })
                .filter(|locator| Some(locator) != target.as_ref())
                .collect();
            if stray.is_empty() {
                continue;
            }

            self.mutate_dormitory(&dormitory_id, |dormitory| {
                for locator in &stray {
                    if let Some(room) = dormitory.room_mut(locator.floor_number, &locator.room_number)
                    {
                        room.vacate(student_id, at);
                    }
                }
                Ok(())
            })?;
            outcome.vacated.extend(stray);
        }

        if let (Some(student), Some(locator)) = (&student, &target) {
            let (placed, _) = self.mutate_dormitory(&locator.dormitory_id, |dormitory| {
                let room = dormitory
                    .room_mut(locator.floor_number, &locator.room_number)
                    .ok_or_else(|| HousingError::NotFound(Missing::Room(locator.clone())))?;
                if room.has_active(&student.id) {
                    return Ok(false);
                }
                let capacity = room.max_capacity();
                room.place(Occupant {
                    student_id: student.id.clone(),
                    name: student.name.clone(),
                    email: student.email.clone(),
                    phone: student.phone.clone(),
                    gender: Some(student.gender),
                    check_in_date: student.check_in_date.unwrap_or(at),
                    checked_out_at: None,
                    active: true,
                })
                .map(|_| true)
                .map_err(|_| HousingError::RoomFull {
                    location: locator.clone(),
                    capacity,
                })
            })?;
            if placed {
                outcome.placed = Some(locator.clone());
            }
        }

        info!(
            student_id = %student_id,
            vacated = outcome.vacated.len(),
            placed = outcome.placed.is_some(),
            "occupant slots realigned"
        );
        self.effects.record(
            actor,
            ActivityAction::ConsistencyRepaired,
            format!("realigned occupant slots for student {student_id}"),
            details([
                ("issue", discrepancy.label().to_string()),
                ("vacated", outcome.vacated.len().to_string()),
                (
                    "placed",
                    outcome
                        .placed
                        .as_ref()
                        .map(ToString::to_string)
                        .unwrap_or_default(),
                ),
            ]),
            at,
        );

        Ok(outcome)
    }

    fn fetch_dormitory(&self, id: &DormitoryId) -> Result<Versioned<Dormitory>, HousingError> {
        self.dormitories
            .fetch(id)?
            .ok_or_else(|| HousingError::NotFound(Missing::Dormitory(id.clone())))
    }

    /// Read-check-write loop over one dormitory document.
    ///
    /// `change` runs against a fresh copy on every attempt; returning an error aborts
    /// without writing.
    pub(crate) fn mutate_dormitory<R>(
        &self,
        id: &DormitoryId,
        mut change: impl FnMut(&mut Dormitory) -> Result<R, HousingError>,
    ) -> Result<(R, Versioned<Dormitory>), HousingError> {
        for attempt in 1..=self.max_attempts {
            let Versioned {
                version,
                mut document,
            } = self.fetch_dormitory(id)?;

            let result = change(&mut document)?;

            match self.dormitories.replace(document, version) {
                Ok(stored) => return Ok((result, stored)),
                Err(RepositoryError::VersionConflict { expected, found }) => {
                    debug!(
                        dormitory_id = %id,
                        attempt,
                        expected,
                        found,
                        "dormitory changed since read, retrying"
                    );
                }
                Err(err) => return Err(err.into()),
            }
        }

        Err(HousingError::ConcurrencyConflict {
            dormitory_id: id.clone(),
            attempts: self.max_attempts,
        })
    }
}

fn fatal(detail: String) -> HousingError {
    error!(detail = %detail, "partial allocation update; operator intervention required");
    HousingError::FatalConsistency { detail }
}

fn check_room(
    dormitory: &Dormitory,
    locator: &RoomLocator,
    student: &Student,
) -> Result<(), HousingError> {
    let room = dormitory
        .room(locator.floor_number, &locator.room_number)
        .ok_or_else(|| {
            if dormitory.has_floor(locator.floor_number) {
                HousingError::NotFound(Missing::Room(locator.clone()))
            } else {
                HousingError::NotFound(Missing::Floor {
                    dormitory_id: locator.dormitory_id.clone(),
                    floor_number: locator.floor_number,
                })
            }
        })?;

    if room.status() == RoomStatus::Unavailable {
        return Err(HousingError::RoomUnavailable {
            location: locator.clone(),
            reason: "room is administratively closed".to_string(),
        });
    }
    if !room.gender_policy().admits(student.gender) {
        return Err(HousingError::RoomUnavailable {
            location: locator.clone(),
            reason: format!(
                "room is reserved for {} students",
                room.gender_policy().label()
            ),
        });
    }
    if room.remaining_capacity() == 0 {
        return Err(HousingError::RoomFull {
            location: locator.clone(),
            capacity: room.max_capacity(),
        });
    }
    Ok(())
}

fn duplicate_in(dormitory: &Dormitory, student: &Student) -> Option<HousingError> {
    let found = dormitory.find_active_occupant(&student.id, &student.name)?;
    let value = match found.matched_on {
        MatchedOn::StudentId => found.occupant.student_id.to_string(),
        MatchedOn::Name => found.occupant.name.clone(),
    };
    Some(HousingError::DuplicateStudent {
        matched_on: found.matched_on,
        value,
        location: RoomAssignment {
            dormitory_id: dormitory.id.clone(),
            dormitory_name: dormitory.name.clone(),
            floor_number: found.floor_number,
            room_number: found.room_number,
        },
    })
}

fn classify(student: &Student, held: Vec<RoomLocator>) -> Option<Discrepancy> {
    let student_id = student.id.clone();
    match &student.assignment {
        None if held.is_empty() => None,
        None => Some(Discrepancy::OccupantWithoutPointer {
            student_id,
            rooms: held,
        }),
        Some(assignment) => {
            let pointed = held.iter().any(|locator| assignment.points_at(locator));
            match (pointed, held.len()) {
                (true, 1) => None,
                (false, 0) => Some(Discrepancy::PointerWithoutOccupant {
                    student_id,
                    assignment: assignment.clone(),
                }),
                (true, _) => Some(Discrepancy::MultipleRooms {
                    student_id,
                    assignment: assignment.clone(),
                    rooms: held,
                }),
                (false, _) => Some(Discrepancy::PointerMismatch {
                    student_id,
                    assignment: assignment.clone(),
                    rooms: held,
                }),
            }
        }
    }
}

/// One disagreement between a student's pointer and the occupant slots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Discrepancy {
    PointerWithoutOccupant {
        student_id: StudentId,
        assignment: RoomAssignment,
    },
    OccupantWithoutPointer {
        student_id: StudentId,
        rooms: Vec<RoomLocator>,
    },
    PointerMismatch {
        student_id: StudentId,
        assignment: RoomAssignment,
        rooms: Vec<RoomLocator>,
    },
    MultipleRooms {
        student_id: StudentId,
        assignment: RoomAssignment,
        rooms: Vec<RoomLocator>,
    },
    UnknownStudent {
        student_id: StudentId,
        rooms: Vec<RoomLocator>,
    },
}

impl Discrepancy {
    pub fn student_id(&self) -> &StudentId {
        match self {
            Discrepancy::PointerWithoutOccupant { student_id, .. }
            | Discrepancy::OccupantWithoutPointer { student_id, .. }
            | Discrepancy::PointerMismatch { student_id, .. }
            | Discrepancy::MultipleRooms { student_id, .. }
            | Discrepancy::UnknownStudent { student_id, .. } => student_id,
        }
    }

    pub const fn label(&self) -> &'static str {
        match self {
            Discrepancy::PointerWithoutOccupant { .. } => "pointer_without_occupant",
            Discrepancy::OccupantWithoutPointer { .. } => "occupant_without_pointer",
            Discrepancy::PointerMismatch { .. } => "pointer_mismatch",
            Discrepancy::MultipleRooms { .. } => "multiple_rooms",
            Discrepancy::UnknownStudent { .. } => "unknown_student",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConsistencyReport {
    pub students_checked: usize,
    pub dormitories_checked: usize,
    pub discrepancies: Vec<Discrepancy>,
}

impl ConsistencyReport {
    pub fn is_consistent(&self) -> bool {
        self.discrepancies.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepairOutcome {
    pub student_id: StudentId,
    pub vacated: Vec<RoomLocator>,
    pub placed: Option<RoomLocator>,
}
