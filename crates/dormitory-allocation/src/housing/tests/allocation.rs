use std::sync::atomic::Ordering;
use std::sync::Arc;

use super::common::*;

use crate::housing::allocation::{AllocationEngine, Discrepancy, Placement};
use crate::housing::capacity::{GenderPolicy, MatchedOn, Occupant, RoomType};
use crate::housing::domain::{
    ApplicationStatus, Gender, RegistrationStatus, RoomAssignment, StudentId,
};
use crate::housing::effects::SideEffects;
use crate::housing::error::{HousingError, Missing};
use crate::housing::eligibility::AcademicPolicy;
use crate::housing::lifecycle::ApplicationEvent;
use crate::housing::memory::{
    InMemoryApplicationRepository, InMemoryDormitoryStore, InMemoryPolicyStore,
    RecordingActivityLog, RecordingNotifier,
};
use crate::housing::repository::{
    ActivityAction, ApplicationRepository, DormitoryStore, StudentRepository,
};
use crate::housing::service::AssignmentMode;

fn occupant_for(id: &str, name: &str, gender: Gender) -> Occupant {
    Occupant {
        student_id: StudentId(id.to_string()),
        name: name.to_string(),
        email: String::new(),
        phone: String::new(),
        gender: Some(gender),
        check_in_date: now(),
        checked_out_at: None,
        active: true,
    }
}

fn seat(harness: &Harness, at: &crate::housing::capacity::RoomLocator, occupant: Occupant) {
    let stored = harness
        .dormitories
        .fetch(&at.dormitory_id)
        .expect("fetch")
        .expect("dormitory present");
    let mut document = stored.document;
    document
        .room_mut(at.floor_number, &at.room_number)
        .expect("room present")
        .place(occupant)
        .expect("seat placed");
    harness
        .dormitories
        .replace(document, stored.version)
        .expect("replace");
}

fn pointer(dormitory: &str, floor: i32, room: &str) -> RoomAssignment {
    RoomAssignment {
        dormitory_id: dorm_id(dormitory),
        dormitory_name: if dormitory == "DORM-A" { "Block A" } else { "Block B" }.to_string(),
        floor_number: floor,
        room_number: room.to_string(),
    }
}

#[test]
fn commit_places_student_and_writes_both_pointers() {
    let harness = campus_harness().with_student(student("S1", "An Nguyen", Gender::Male, Some(2)));
    let application = harness.paid_application("S1");
    let target = locator("DORM-A", 2, "201");

    let outcome = harness
        .service
        .assign(&application.id, &admin(), AssignmentMode::Manual(target.clone()))
        .expect("assignment succeeds");

    let stored_student = harness.stored_student("S1");
    let stored_application = harness
        .applications
        .fetch(&application.id)
        .expect("fetch")
        .expect("present");
    assert_eq!(stored_student.registration_status, RegistrationStatus::AssignedRoom);
    assert_eq!(stored_student.assignment, Some(pointer("DORM-A", 2, "201")));
    assert_eq!(stored_application.status, ApplicationStatus::AssignedRoom);
    assert_eq!(stored_application.assignment, stored_student.assignment);
    assert_eq!(harness.occupancy(&target), 1);
    assert!(matches!(
        outcome,
        crate::housing::service::AssignmentOutcome::Assigned { .. }
    ));

    assert!(harness.notification_kinds().contains(&"room_assigned"));
    assert!(harness
        .activity
        .entries()
        .iter()
        .any(|entry| entry.action == ActivityAction::RoomManuallyAssigned));
}

#[test]
fn duplicate_name_in_another_dormitory_blocks_placement() {
    let harness = campus_harness().with_student(student("S1", "An Nguyen", Gender::Male, Some(2)));
    let application = harness.paid_application("S1");
    seat(
        &harness,
        &locator("DORM-B", 3, "301"),
        occupant_for("LEGACY-7", "an  NGUYEN", Gender::Male),
    );

    let err = harness
        .service
        .assign(
            &application.id,
            &admin(),
            AssignmentMode::Manual(locator("DORM-A", 1, "101")),
        )
        .expect_err("duplicate refused");

    match err {
        HousingError::DuplicateStudent {
            matched_on,
            value,
            location,
        } => {
            assert_eq!(matched_on, MatchedOn::Name);
            assert_eq!(value, "an  NGUYEN");
            assert_eq!(location, pointer("DORM-B", 3, "301"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(harness.occupancy(&locator("DORM-A", 1, "101")), 0);
}

#[test]
fn gender_and_closed_rooms_are_refused_with_reason() {
    let harness = campus_harness().with_student(student("S1", "An Nguyen", Gender::Male, Some(2)));
    let application = harness.paid_application("S1");

    let err = harness
        .service
        .assign(
            &application.id,
            &admin(),
            AssignmentMode::Manual(locator("DORM-B", 1, "105")),
        )
        .expect_err("female room");
    match err {
        HousingError::RoomUnavailable { reason, .. } => {
            assert_eq!(reason, "room is reserved for female students")
        }
        other => panic!("unexpected error: {other:?}"),
    }

    let missing_floor = harness
        .service
        .assign(
            &application.id,
            &admin(),
            AssignmentMode::Manual(locator("DORM-A", 9, "901")),
        )
        .expect_err("no such floor");
    assert!(matches!(
        missing_floor,
        HousingError::NotFound(Missing::Floor { floor_number: 9, .. })
    ));

    let missing_room = harness
        .service
        .assign(
            &application.id,
            &admin(),
            AssignmentMode::Manual(locator("DORM-A", 1, "199")),
        )
        .expect_err("no such room");
    assert!(matches!(missing_room, HousingError::NotFound(Missing::Room(_))));
}

#[test]
fn lost_race_is_retried_and_rechecked() {
    let dormitories = InMemoryDormitoryStore::default();
    for dormitory in campus() {
        dormitories.insert(dormitory).expect("stored");
    }
    let target = locator("DORM-A", 2, "202");
    let store = InterleavingStore::new(dormitories.clone(), target.clone(), 1);
    let (engine, students, applications) = engine_over(Arc::new(store.clone()));

    let (mut application, mut student) = placeable(&students, &applications, "S1", "An Nguyen");
    engine
        .commit(
            &mut application,
            &mut student,
            Placement {
                locator: &target,
                event: ApplicationEvent::Assign,
                action: ActivityAction::RoomAssigned,
                actor: &admin(),
                at: now(),
            },
        )
        .expect("second attempt commits");

    let stored = dormitories
        .fetch(&dorm_id("DORM-A"))
        .expect("fetch")
        .expect("present");
    let room = stored.document.room(2, "202").expect("room");
    assert_eq!(room.active_occupancy(), 2);
    assert!(room.has_active(&StudentId("S1".to_string())));
    assert_eq!(store.intruders.load(Ordering::SeqCst), 1);
}

#[test]
fn room_filled_by_a_racing_writer_surfaces_as_room_full() {
    let dormitories = InMemoryDormitoryStore::default();
    dormitories
        .insert(dormitory(
            "DORM-C",
            "Block C",
            vec![(
                1,
                room("110", RoomType::FourPersonService, GenderPolicy::Any, 800)
                    .with_capacity(1)
                    .expect("capacity"),
            )],
        ))
        .expect("stored");
    let target = locator("DORM-C", 1, "110");
    let store = InterleavingStore::new(dormitories.clone(), target.clone(), 1);
    let (engine, students, applications) = engine_over(Arc::new(store));

    let (mut application, mut student) = placeable(&students, &applications, "S1", "An Nguyen");
    let err = engine
        .commit(
            &mut application,
            &mut student,
            Placement {
                locator: &target,
                event: ApplicationEvent::Assign,
                action: ActivityAction::RoomAssigned,
                actor: &admin(),
                at: now(),
            },
        )
        .expect_err("room taken meanwhile");

    assert!(matches!(err, HousingError::RoomFull { capacity: 1, .. }));
    let stored = dormitories
        .fetch(&dorm_id("DORM-C"))
        .expect("fetch")
        .expect("present");
    assert_eq!(stored.document.room(1, "110").expect("room").active_occupancy(), 1);
    assert_eq!(application.status, ApplicationStatus::ApprovedWaitingPayment);
    assert!(student.assignment.is_none());
}

#[test]
fn exhausted_retries_report_a_retryable_conflict() {
    let dormitories = InMemoryDormitoryStore::default();
    for dormitory in campus() {
        dormitories.insert(dormitory).expect("stored");
    }
    let target = locator("DORM-A", 2, "202");
    let store = InterleavingStore::new(dormitories, target.clone(), 3);
    let (engine, students, applications) = engine_over(Arc::new(store));

    let (mut application, mut student) = placeable(&students, &applications, "S1", "An Nguyen");
    let err = engine
        .commit(
            &mut application,
            &mut student,
            Placement {
                locator: &target,
                event: ApplicationEvent::Assign,
                action: ActivityAction::RoomAssigned,
                actor: &admin(),
                at: now(),
            },
        )
        .expect_err("every attempt loses");

    assert!(matches!(
        err,
        HousingError::ConcurrencyConflict { attempts: 3, .. }
    ));
    assert!(err.is_retryable());
    assert!(err.is_business_outcome());
}

#[test]
fn failed_student_write_after_commit_is_fatal_and_repairable() {
    let dormitories = InMemoryDormitoryStore::default();
    for dormitory in campus() {
        dormitories.insert(dormitory).expect("stored");
    }
    let students = FlakyStudents::default();
    students
        .insert(student("S1", "An Nguyen", Gender::Male, Some(2)))
        .expect("student stored");
    let policies = InMemoryPolicyStore::default();
    policies.put_policy(AcademicPolicy::new(YEAR)).expect("policy");
    let applications = InMemoryApplicationRepository::default();
    let activity = RecordingActivityLog::default();

    let service = service_with(
        Arc::new(dormitories.clone()),
        Arc::new(students.clone()),
        applications.clone(),
        policies,
        Arc::new(RecordingNotifier::default()),
        Arc::new(activity.clone()),
    );

    let application = service.submit(request("S1")).expect("submitted");
    service.approve(&application.id, &admin()).expect("approved");
    service
        .confirm_payment(&application.id, &admin(), payment())
        .expect("paid");

    students.fail_updates.store(true, Ordering::SeqCst);
    let target = locator("DORM-A", 1, "101");
    let err = service
        .assign(&application.id, &admin(), AssignmentMode::Manual(target.clone()))
        .expect_err("student write fails");
    assert!(matches!(err, HousingError::FatalConsistency { .. }));
    assert!(!err.is_business_outcome());
    assert_eq!(
        err.public_message(),
        "internal error, please contact the housing office"
    );

    let report = service.check_consistency().expect("report");
    assert_eq!(report.students_checked, 1);
    assert_eq!(
        report.discrepancies,
        vec![Discrepancy::OccupantWithoutPointer {
            student_id: StudentId("S1".to_string()),
            rooms: vec![target.clone()],
        }]
    );

    students.fail_updates.store(false, Ordering::SeqCst);
    let repaired = service.repair_all(&admin()).expect("repair");
    assert_eq!(repaired.len(), 1);
    assert_eq!(repaired[0].vacated, vec![target.clone()]);
    assert_eq!(repaired[0].placed, None);

    assert!(service.check_consistency().expect("report").is_consistent());
    assert!(activity
        .entries()
        .iter()
        .any(|entry| entry.action == ActivityAction::ConsistencyRepaired));
}

#[test]
fn repair_restores_missing_slot_from_student_pointer() {
    let mut pointed = student("S5", "Em Do", Gender::Female, Some(3));
    pointed.assignment = Some(pointer("DORM-B", 1, "105"));
    pointed.registration_status = RegistrationStatus::CheckedIn;
    let harness = campus_harness().with_student(pointed);

    let report = harness.service.check_consistency().expect("report");
    assert!(matches!(
        report.discrepancies.as_slice(),
        [Discrepancy::PointerWithoutOccupant { .. }]
    ));

    let outcome = harness
        .service
        .repair(&report.discrepancies[0], &admin())
        .expect("repair");
    assert_eq!(outcome.placed, Some(locator("DORM-B", 1, "105")));
    assert_eq!(harness.occupancy(&locator("DORM-B", 1, "105")), 1);
    assert!(harness.service.check_consistency().expect("report").is_consistent());
}

#[test]
fn stray_and_unknown_slots_are_reported() {
    let mut pointed = student("S6", "Giang Ho", Gender::Male, Some(2));
    pointed.assignment = Some(pointer("DORM-A", 1, "101"));
    pointed.registration_status = RegistrationStatus::AssignedRoom;
    let harness = campus_harness().with_student(pointed);

    seat(&harness, &locator("DORM-A", 1, "101"), occupant_for("S6", "Giang Ho", Gender::Male));
    seat(&harness, &locator("DORM-A", 2, "201"), occupant_for("S6", "Giang Ho", Gender::Male));
    seat(&harness, &locator("DORM-B", 3, "301"), occupant_for("GHOST", "Nobody", Gender::Female));

    let report = harness.service.check_consistency().expect("report");
    let kinds: Vec<&str> = report.discrepancies.iter().map(Discrepancy::label).collect();
    assert_eq!(kinds, vec!["multiple_rooms", "unknown_student"]);

    let outcomes = harness.service.repair_all(&admin()).expect("repair");
    assert_eq!(outcomes[0].vacated, vec![locator("DORM-A", 2, "201")]);
    assert_eq!(outcomes[1].vacated, vec![locator("DORM-B", 3, "301")]);
    assert_eq!(harness.occupancy(&locator("DORM-A", 1, "101")), 1);
    assert_eq!(harness.occupancy(&locator("DORM-A", 2, "201")), 0);
    assert!(harness.service.check_consistency().expect("report").is_consistent());
}

#[test]
fn side_effect_failures_never_fail_the_placement() {
    let dormitories = InMemoryDormitoryStore::default();
    for dormitory in campus() {
        dormitories.insert(dormitory).expect("stored");
    }
    let students = crate::housing::memory::InMemoryStudentRepository::default();
    students
        .insert(student("S1", "An Nguyen", Gender::Male, Some(2)))
        .expect("student stored");
    let policies = InMemoryPolicyStore::default();
    policies.put_policy(AcademicPolicy::new(YEAR)).expect("policy");

    let service = service_with(
        Arc::new(dormitories),
        Arc::new(students.clone()),
        InMemoryApplicationRepository::default(),
        policies,
        Arc::new(FailingNotifier),
        Arc::new(FailingActivityLog),
    );

    let application = service.submit(request("S1")).expect("submitted");
    service.approve(&application.id, &admin()).expect("approved");
    service
        .confirm_payment(&application.id, &admin(), payment())
        .expect("paid");
    service
        .assign(
            &application.id,
            &admin(),
            AssignmentMode::Manual(locator("DORM-A", 1, "101")),
        )
        .expect("placement succeeds");

    let stored = students
        .fetch(&StudentId("S1".to_string()))
        .expect("fetch")
        .expect("present");
    assert_eq!(stored.registration_status, RegistrationStatus::AssignedRoom);
}

fn engine_over(
    dormitories: Arc<dyn DormitoryStore>,
) -> (
    AllocationEngine,
    crate::housing::memory::InMemoryStudentRepository,
    InMemoryApplicationRepository,
) {
    let students = crate::housing::memory::InMemoryStudentRepository::default();
    let applications = InMemoryApplicationRepository::default();
    let engine = AllocationEngine::new(
        dormitories,
        Arc::new(students.clone()),
        Arc::new(applications.clone()),
        SideEffects::new(
            Arc::new(RecordingNotifier::default()),
            Arc::new(RecordingActivityLog::default()),
        ),
        3,
    );
    (engine, students, applications)
}

/// A stored student with a stored, approved application ready for `Assign`.
fn placeable(
    students: &crate::housing::memory::InMemoryStudentRepository,
    applications: &InMemoryApplicationRepository,
    id: &str,
    name: &str,
) -> (
    crate::housing::domain::Application,
    crate::housing::domain::Student,
) {
    let student = students
        .insert(student(id, name, Gender::Male, Some(2)))
        .expect("student stored");
    let application = crate::housing::domain::Application {
        id: application_id(&format!("app-{id}")),
        student_id: student.id.clone(),
        student_name: student.name.clone(),
        gender: student.gender,
        academic_year: YEAR.to_string(),
        preferences: Default::default(),
        requested_room: None,
        status: ApplicationStatus::ApprovedWaitingPayment,
        payment: Default::default(),
        assignment: None,
        rejection_reason: None,
        cancellation_reason: None,
        checkout_request: None,
        transitions: Vec::new(),
        created_at: now(),
        updated_at: now(),
    };
    let application = applications.insert(application).expect("application stored");
    (application, student)
}
