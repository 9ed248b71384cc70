use super::common::*;

use crate::housing::capacity::{GenderPolicy, RoomStatus, RoomType};
use crate::housing::domain::Gender;
use crate::housing::import::{ImportError, InventoryImporter, RosterImporter};
use crate::housing::memory::{InMemoryDormitoryStore, InMemoryStudentRepository};
use crate::housing::repository::{DormitoryStore, RepositoryError, StudentRepository};

const INVENTORY: &str = "\
dormitory_id,dormitory_name,floor,room,room_type,gender_policy,max_capacity,price_per_month,status,amenities
DORM-A,Block A,2,201,4-person-service,male,,950,available,wifi;fridge
DORM-A,Block A,1,101,4-person-service,male,3,900,,
DORM-B,Block B,3,301,10-person,mixed,,500,unavailable,wifi | air conditioning
";

const ROSTER: &str = "\
student_id,name,email,phone,gender,academic_year,faculty
S1,An Nguyen,an@uni.example,0901,male,1,Engineering
S2, Binh Tran ,binh@uni.example,0902,F,,
S3,Cuong Le,,,male,third,Law
";

#[test]
fn inventory_groups_rows_into_dormitories() {
    let dormitories = InventoryImporter::from_reader(INVENTORY.as_bytes()).expect("parsed");

    assert_eq!(dormitories.len(), 2);
    let block_a = &dormitories[0];
    assert_eq!(block_a.id, dorm_id("DORM-A"));
    assert_eq!(block_a.total_floors(), 2);
    assert_eq!(block_a.floors()[0].floor_number(), 1);

    let room_101 = block_a.room(1, "101").expect("room 101");
    assert_eq!(room_101.max_capacity(), 3);
    assert_eq!(room_101.status(), RoomStatus::Available);

    let room_201 = block_a.room(2, "201").expect("room 201");
    assert_eq!(room_201.max_capacity(), 4);
    assert_eq!(room_201.amenities(), ["wifi".to_string(), "fridge".to_string()]);

    let room_301 = dormitories[1].room(3, "301").expect("room 301");
    assert_eq!(room_301.room_type(), RoomType::TenPerson);
    assert_eq!(room_301.gender_policy(), GenderPolicy::Any);
    assert_eq!(room_301.status(), RoomStatus::Unavailable);
    assert_eq!(room_301.amenities().len(), 2);
}

#[test]
fn inventory_rejects_unknown_room_type_with_line_number() {
    let csv = "\
dormitory_id,dormitory_name,floor,room,room_type,gender_policy,max_capacity,price_per_month,status,amenities
DORM-A,Block A,1,101,4-person-service,male,,900,,
DORM-A,Block A,1,102,penthouse,male,,900,,
";
    let err = InventoryImporter::from_reader(csv.as_bytes()).expect_err("bad type");
    match err {
        ImportError::Row { line, message } => {
            assert_eq!(line, 3);
            assert!(message.contains("penthouse"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn inventory_rejects_duplicate_rooms_and_zero_capacity() {
    let duplicate = "\
dormitory_id,dormitory_name,floor,room,room_type,gender_policy,max_capacity,price_per_month,status,amenities
DORM-A,Block A,1,101,4-person-service,male,,900,,
DORM-A,Block A,1,101,8-person,male,,600,,
";
    assert!(matches!(
        InventoryImporter::from_reader(duplicate.as_bytes()),
        Err(ImportError::Row { line: 3, .. })
    ));

    let zero = "\
dormitory_id,dormitory_name,floor,room,room_type,gender_policy,max_capacity,price_per_month,status,amenities
DORM-A,Block A,1,101,4-person-service,male,0,900,,
";
    assert!(matches!(
        InventoryImporter::from_reader(zero.as_bytes()),
        Err(ImportError::Row { line: 2, .. })
    ));
}

#[test]
fn malformed_csv_is_reported() {
    let csv = "\
dormitory_id,dormitory_name,floor,room,room_type,gender_policy,max_capacity,price_per_month,status,amenities
DORM-A,Block A,first,101,4-person-service,male,,900,,
";
    assert!(matches!(
        InventoryImporter::from_reader(csv.as_bytes()),
        Err(ImportError::Csv(_))
    ));
}

#[test]
fn roster_tolerates_missing_and_malformed_years() {
    let students = RosterImporter::from_reader(ROSTER.as_bytes()).expect("parsed");

    assert_eq!(students.len(), 3);
    assert_eq!(students[0].academic_year, Some(1));
    assert_eq!(students[0].faculty.as_deref(), Some("Engineering"));
    assert_eq!(students[1].name, "Binh Tran");
    assert_eq!(students[1].gender, Gender::Female);
    assert_eq!(students[1].academic_year, None);
    assert_eq!(students[1].faculty, None);
    assert_eq!(students[2].academic_year, None);
    assert!(students[2].email.is_empty());
}

#[test]
fn roster_rejects_unknown_gender() {
    let csv = "\
student_id,name,email,phone,gender,academic_year,faculty
S1,An Nguyen,,,robot,1,
";
    let err = RosterImporter::from_reader(csv.as_bytes()).expect_err("bad gender");
    assert_eq!(err.to_string(), "line 2: unknown gender 'robot'");
}

#[test]
fn load_inserts_records_and_surfaces_conflicts() {
    let store = InMemoryDormitoryStore::default();
    let dormitories = InventoryImporter::from_reader(INVENTORY.as_bytes()).expect("parsed");
    assert_eq!(
        InventoryImporter::load(&store, dormitories.clone()).expect("loaded"),
        2
    );
    assert_eq!(store.list().expect("list").len(), 2);
    assert!(matches!(
        InventoryImporter::load(&store, dormitories),
        Err(ImportError::Store(RepositoryError::Conflict))
    ));

    let repository = InMemoryStudentRepository::default();
    let students = RosterImporter::from_reader(ROSTER.as_bytes()).expect("parsed");
    assert_eq!(RosterImporter::load(&repository, students).expect("loaded"), 3);
    assert_eq!(repository.list().expect("list").len(), 3);
}

#[test]
fn missing_file_is_an_io_error() {
    assert!(matches!(
        InventoryImporter::from_path("/nonexistent/inventory.csv"),
        Err(ImportError::Io(_))
    ));
}
