//! CSV loading of room inventory and student rosters.

mod parser;

use std::io::Read;
use std::path::Path;

use tracing::{debug, info};

use super::capacity::{
    CapacityError, Dormitory, DormitoryId, GenderPolicy, Room, RoomStatus, RoomType,
};
use super::domain::{Gender, Student, StudentId};
use super::repository::{DormitoryStore, RepositoryError, StudentRepository};

#[derive(Debug)]
pub enum ImportError {
    Io(std::io::Error),
    Csv(csv::Error),
    /// Row-level problem; `line` counts the header as line 1.
    Row { line: usize, message: String },
    Store(RepositoryError),
}

impl std::fmt::Display for ImportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImportError::Io(err) => write!(f, "failed to read import file: {}", err),
            ImportError::Csv(err) => write!(f, "invalid CSV data: {}", err),
            ImportError::Row { line, message } => write!(f, "line {}: {}", line, message),
            ImportError::Store(err) => write!(f, "could not store imported records: {}", err),
        }
    }
}

impl std::error::Error for ImportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ImportError::Io(err) => Some(err),
            ImportError::Csv(err) => Some(err),
            ImportError::Row { .. } => None,
            ImportError::Store(err) => Some(err),
        }
    }
}

impl From<std::io::Error> for ImportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<csv::Error> for ImportError {
    fn from(err: csv::Error) -> Self {
        Self::Csv(err)
    }
}

impl From<RepositoryError> for ImportError {
    fn from(err: RepositoryError) -> Self {
        Self::Store(err)
    }
}

fn row_error(index: usize, message: impl Into<String>) -> ImportError {
    ImportError::Row {
        line: index + 2,
        message: message.into(),
    }
}

/// Builds dormitory documents from an inventory export.
pub struct InventoryImporter;

impl InventoryImporter {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Vec<Dormitory>, ImportError> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(file)
    }

    /// Dormitories come back in first-seen order.
    pub fn from_reader<R: Read>(reader: R) -> Result<Vec<Dormitory>, ImportError> {
        let rows = parser::parse_inventory(reader)?;
        let mut dormitories: Vec<Dormitory> = Vec::new();

        for (index, row) in rows.iter().enumerate() {
            let room_type = RoomType::from_label(&row.room_type).ok_or_else(|| {
                row_error(index, format!("unknown room type '{}'", row.room_type))
            })?;
            let gender_policy = GenderPolicy::from_label(&row.gender_policy).ok_or_else(|| {
                row_error(
                    index,
                    format!("unknown gender policy '{}'", row.gender_policy),
                )
            })?;
            let status = match row.status.as_deref().map(str::to_ascii_lowercase).as_deref() {
                None | Some("available") => RoomStatus::Available,
                Some("unavailable") => RoomStatus::Unavailable,
                Some(other) => {
                    return Err(row_error(index, format!("unknown room status '{other}'")))
                }
            };

            let mut room = Room::new(row.room.clone(), room_type, gender_policy, row.price_per_month)
                .with_status(status)
                .with_amenities(row.amenity_list());
            if let Some(raw) = &row.max_capacity {
                let capacity: u32 = raw.parse().map_err(|_| {
                    row_error(index, format!("max_capacity '{raw}' is not a positive integer"))
                })?;
                room = room
                    .with_capacity(capacity)
                    .map_err(|err| row_error(index, err.to_string()))?;
            }

            let id = DormitoryId(row.dormitory_id.clone());
            let position = match dormitories.iter().position(|dormitory| dormitory.id == id) {
                Some(position) => position,
                None => {
                    dormitories.push(Dormitory::new(id, row.dormitory_name.clone(), String::new()));
                    dormitories.len() - 1
                }
            };

            dormitories[position]
                .add_room(row.floor, room)
                .map_err(|err: CapacityError| row_error(index, err.to_string()))?;
        }

        debug!(
            rows = rows.len(),
            dormitories = dormitories.len(),
            "inventory parsed"
        );
        Ok(dormitories)
    }

    pub fn load(
        store: &dyn DormitoryStore,
        dormitories: Vec<Dormitory>,
    ) -> Result<usize, ImportError> {
        let count = dormitories.len();
        for dormitory in dormitories {
            store.insert(dormitory)?;
        }
        info!(count, "dormitories loaded");
        Ok(count)
    }
}

/// Builds student records from a roster export.
pub struct RosterImporter;

impl RosterImporter {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Vec<Student>, ImportError> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(file)
    }

    /// Unparseable academic years are kept as missing and classified downstream.
    pub fn from_reader<R: Read>(reader: R) -> Result<Vec<Student>, ImportError> {
        let rows = parser::parse_roster(reader)?;
        let mut students = Vec::with_capacity(rows.len());

        for (index, row) in rows.into_iter().enumerate() {
            if row.student_id.is_empty() {
                return Err(row_error(index, "student_id is required"));
            }
            let gender = Gender::from_label(&row.gender)
                .ok_or_else(|| row_error(index, format!("unknown gender '{}'", row.gender)))?;
            let academic_year = row.academic_year.as_deref().and_then(|raw| {
                let parsed = raw.parse::<i32>().ok();
                if parsed.is_none() {
                    debug!(student_id = %row.student_id, raw, "unparseable academic year");
                }
                parsed
            });

            let mut student = Student::new(
                StudentId(row.student_id.clone()),
                row.name,
                gender,
                academic_year,
            );
            student.email = row.email;
            student.phone = row.phone;
            student.faculty = row.faculty;
            students.push(student);
        }

        Ok(students)
    }

    pub fn load(
        repository: &dyn StudentRepository,
        students: Vec<Student>,
    ) -> Result<usize, ImportError> {
        let count = students.len();
        for student in students {
            repository.insert(student)?;
        }
        info!(count, "students loaded");
        Ok(count)
    }
}
