//! Dormitory → floor → room → occupant hierarchy with derived occupancy counts.
//!
//! Everything here is plain data plus invariant checks. The two invariants maintained by
//! this module are:
//!
//! * a room never holds more active occupants than its `max_capacity`;
//! * a dormitory's `price_range` and `total_floors` always reflect its current room set.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{Gender, StudentId};

/// Identifier wrapper for dormitory documents.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DormitoryId(pub String);

impl fmt::Display for DormitoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Enumerated room layouts, each with a fixed default capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RoomType {
    #[serde(rename = "8-person")]
    EightPerson,
    #[serde(rename = "4-person-service")]
    FourPersonService,
    #[serde(rename = "5-person")]
    FivePerson,
    #[serde(rename = "10-person")]
    TenPerson,
}

impl RoomType {
    pub const fn capacity(self) -> u32 {
        match self {
            RoomType::EightPerson => 8,
            RoomType::FourPersonService => 4,
            RoomType::FivePerson => 5,
            RoomType::TenPerson => 10,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            RoomType::EightPerson => "8-person",
            RoomType::FourPersonService => "4-person-service",
            RoomType::FivePerson => "5-person",
            RoomType::TenPerson => "10-person",
        }
    }

    pub fn from_label(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "8-person" => Some(RoomType::EightPerson),
            "4-person-service" => Some(RoomType::FourPersonService),
            "5-person" => Some(RoomType::FivePerson),
            "10-person" => Some(RoomType::TenPerson),
            _ => None,
        }
    }
}

/// Which genders a room admits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenderPolicy {
    Male,
    Female,
    Any,
}

impl GenderPolicy {
    pub fn admits(self, gender: Gender) -> bool {
        match self {
            GenderPolicy::Any => true,
            GenderPolicy::Male => gender == Gender::Male,
            GenderPolicy::Female => gender == Gender::Female,
        }
    }

    /// Whether a room with this policy satisfies an applicant's requested policy.
    /// A request for `Any` accepts every room; a gendered request rejects the opposite one.
    pub fn satisfies(self, requested: GenderPolicy) -> bool {
        !matches!(
            (requested, self),
            (GenderPolicy::Male, GenderPolicy::Female) | (GenderPolicy::Female, GenderPolicy::Male)
        )
    }

    pub const fn label(self) -> &'static str {
        match self {
            GenderPolicy::Male => "male",
            GenderPolicy::Female => "female",
            GenderPolicy::Any => "any",
        }
    }

    pub fn from_label(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "male" => Some(GenderPolicy::Male),
            "female" => Some(GenderPolicy::Female),
            "any" | "mixed" => Some(GenderPolicy::Any),
            _ => None,
        }
    }
}

/// Administrative room status, independent of occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomStatus {
    Available,
    Unavailable,
}

/// Slot record for a student placed in a room. Deactivated on check-out, never deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Occupant {
    pub student_id: StudentId,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub gender: Option<Gender>,
    pub check_in_date: DateTime<Utc>,
    pub checked_out_at: Option<DateTime<Utc>>,
    pub active: bool,
}

/// Address of a single room across the hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoomLocator {
    pub dormitory_id: DormitoryId,
    pub floor_number: i32,
    pub room_number: String,
}

impl RoomLocator {
    pub fn new(dormitory_id: DormitoryId, floor_number: i32, room_number: impl Into<String>) -> Self {
        Self {
            dormitory_id,
            floor_number,
            room_number: room_number.into(),
        }
    }
}

impl fmt::Display for RoomLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/floor {}/room {}",
            self.dormitory_id, self.floor_number, self.room_number
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CapacityError {
    #[error("room {room_number} is full ({max_capacity} active occupants)")]
    RoomFull {
        room_number: String,
        max_capacity: u32,
    },
    #[error("room capacity must be a positive integer, got {requested}")]
    InvalidCapacity { requested: u32 },
    #[error("cannot lower capacity to {requested}: room has {active} active occupants")]
    CapacityBelowOccupancy { requested: u32, active: u32 },
    #[error("room {room_number} already exists on floor {floor_number}")]
    DuplicateRoom {
        floor_number: i32,
        room_number: String,
    },
    #[error("room {room_number} not found on floor {floor_number}")]
    RoomNotFound {
        floor_number: i32,
        room_number: String,
    },
    #[error("student {student_id} already occupies room {room_number}")]
    AlreadyOccupying {
        student_id: StudentId,
        room_number: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Room {
    room_number: String,
    room_type: RoomType,
    max_capacity: u32,
    gender_policy: GenderPolicy,
    price_per_month: u32,
    status: RoomStatus,
    amenities: Vec<String>,
    occupants: Vec<Occupant>,
}

impl Room {
    /// New, empty, available room sized by its type.
    pub fn new(
        room_number: impl Into<String>,
        room_type: RoomType,
        gender_policy: GenderPolicy,
        price_per_month: u32,
    ) -> Self {
        Self {
            room_number: room_number.into(),
            room_type,
            max_capacity: room_type.capacity(),
            gender_policy,
            price_per_month,
            status: RoomStatus::Available,
            amenities: Vec::new(),
            occupants: Vec::new(),
        }
    }

    pub fn with_capacity(mut self, max_capacity: u32) -> Result<Self, CapacityError> {
        self.set_max_capacity(max_capacity)?;
        Ok(self)
    }

    pub fn with_status(mut self, status: RoomStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_amenities(mut self, amenities: Vec<String>) -> Self {
        self.amenities = amenities;
        self
    }

    pub fn room_number(&self) -> &str {
        &self.room_number
    }

    pub fn room_type(&self) -> RoomType {
        self.room_type
    }

    pub fn max_capacity(&self) -> u32 {
        self.max_capacity
    }

    pub fn gender_policy(&self) -> GenderPolicy {
        self.gender_policy
    }

    pub fn price_per_month(&self) -> u32 {
        self.price_per_month
    }

    pub fn status(&self) -> RoomStatus {
        self.status
    }

    pub fn amenities(&self) -> &[String] {
        &self.amenities
    }

    /// Full occupant history, active and vacated.
    pub fn occupants(&self) -> &[Occupant] {
        &self.occupants
    }

    pub fn active_occupants(&self) -> impl Iterator<Item = &Occupant> {
        self.occupants.iter().filter(|occupant| occupant.active)
    }

    pub fn active_occupancy(&self) -> u32 {
        self.active_occupants().count() as u32
    }

    pub fn remaining_capacity(&self) -> u32 {
        self.max_capacity.saturating_sub(self.active_occupancy())
    }

    pub fn is_open(&self) -> bool {
        self.status == RoomStatus::Available && self.active_occupancy() < self.max_capacity
    }

    pub fn has_active(&self, student_id: &StudentId) -> bool {
        self.active_occupants()
            .any(|occupant| &occupant.student_id == student_id)
    }

    /// True when an `Any` room already hosts an active occupant of a different gender.
    pub fn mixes_genders_with(&self, gender: Gender) -> bool {
        self.gender_policy == GenderPolicy::Any
            && self
                .active_occupants()
                .any(|occupant| occupant.gender.is_some_and(|existing| existing != gender))
    }

    pub(crate) fn set_max_capacity(&mut self, requested: u32) -> Result<(), CapacityError> {
        if requested == 0 {
            return Err(CapacityError::InvalidCapacity { requested });
        }
        let active = self.active_occupancy();
        if requested < active {
            return Err(CapacityError::CapacityBelowOccupancy { requested, active });
        }
        self.max_capacity = requested;
        Ok(())
    }

    /// Append an active occupant. Rejects the insert when it would exceed capacity.
    pub fn place(&mut self, occupant: Occupant) -> Result<(), CapacityError> {
        if self.has_active(&occupant.student_id) {
            return Err(CapacityError::AlreadyOccupying {
                student_id: occupant.student_id,
                room_number: self.room_number.clone(),
            });
        }
        if self.active_occupancy() >= self.max_capacity {
            return Err(CapacityError::RoomFull {
                room_number: self.room_number.clone(),
                max_capacity: self.max_capacity,
            });
        }

        self.occupants.push(Occupant {
            active: true,
            checked_out_at: None,
            ..occupant
        });
        Ok(())
    }

    /// Deactivate the student's active slot, keeping it in history.
    pub fn vacate(&mut self, student_id: &StudentId, at: DateTime<Utc>) -> Option<Occupant> {
        let occupant = self
            .occupants
            .iter_mut()
            .find(|occupant| occupant.active && &occupant.student_id == student_id)?;
        occupant.active = false;
        occupant.checked_out_at = Some(at);
        Some(occupant.clone())
    }
}

/// Partial update applied by administrators to a room's settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoomUpdate {
    pub price_per_month: Option<u32>,
    pub status: Option<RoomStatus>,
    pub gender_policy: Option<GenderPolicy>,
    pub max_capacity: Option<u32>,
    pub room_type: Option<RoomType>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Floor {
    floor_number: i32,
    rooms: Vec<Room>,
}

impl Floor {
    pub fn floor_number(&self) -> i32 {
        self.floor_number
    }

    pub fn rooms(&self) -> &[Room] {
        &self.rooms
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceRange {
    pub min: u32,
    pub max: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub longitude: f64,
    pub latitude: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactInfo {
    pub phone: String,
    pub email: String,
}

/// Which field of an active occupant matched a uniqueness probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchedOn {
    StudentId,
    Name,
}

impl MatchedOn {
    pub const fn label(self) -> &'static str {
        match self {
            MatchedOn::StudentId => "student id",
            MatchedOn::Name => "name",
        }
    }
}

/// An active occupant located somewhere inside a dormitory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OccupantMatch {
    pub floor_number: i32,
    pub room_number: String,
    pub occupant: Occupant,
    pub matched_on: MatchedOn,
}

/// Top-level document owning its floors, rooms, and occupant slots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dormitory {
    pub id: DormitoryId,
    pub name: String,
    pub address: String,
    pub location: Option<GeoPoint>,
    pub contact: ContactInfo,
    pub accepting_applications: bool,
    floors: Vec<Floor>,
    price_range: Option<PriceRange>,
    total_floors: usize,
}

impl Dormitory {
    pub fn new(id: DormitoryId, name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            address: address.into(),
            location: None,
            contact: ContactInfo::default(),
            accepting_applications: true,
            floors: Vec::new(),
            price_range: None,
            total_floors: 0,
        }
    }

    pub fn floors(&self) -> &[Floor] {
        &self.floors
    }

    pub fn price_range(&self) -> Option<PriceRange> {
        self.price_range
    }

    pub fn total_floors(&self) -> usize {
        self.total_floors
    }

    /// Every room paired with its floor number, in floor then room order.
    pub fn rooms(&self) -> impl Iterator<Item = (i32, &Room)> {
        self.floors
            .iter()
            .flat_map(|floor| floor.rooms.iter().map(move |room| (floor.floor_number, room)))
    }

    pub fn room(&self, floor_number: i32, room_number: &str) -> Option<&Room> {
        self.floors
            .iter()
            .find(|floor| floor.floor_number == floor_number)?
            .rooms
            .iter()
            .find(|room| room.room_number == room_number)
    }

    pub(crate) fn room_mut(&mut self, floor_number: i32, room_number: &str) -> Option<&mut Room> {
        self.floors
            .iter_mut()
            .find(|floor| floor.floor_number == floor_number)?
            .rooms
            .iter_mut()
            .find(|room| room.room_number == room_number)
    }

    pub fn has_floor(&self, floor_number: i32) -> bool {
        self.floors
            .iter()
            .any(|floor| floor.floor_number == floor_number)
    }

    /// Add a room, creating the floor when needed. Floors stay ordered by number.
    pub fn add_room(&mut self, floor_number: i32, room: Room) -> Result<(), CapacityError> {
        let position = self
            .floors
            .iter()
            .position(|floor| floor.floor_number >= floor_number);

        let floor = match position {
            Some(index) if self.floors[index].floor_number == floor_number => {
                &mut self.floors[index]
            }
            Some(index) => {
                self.floors.insert(
                    index,
                    Floor {
                        floor_number,
                        rooms: Vec::new(),
                    },
                );
                &mut self.floors[index]
            }
            None => {
                self.floors.push(Floor {
                    floor_number,
                    rooms: Vec::new(),
                });
                let last = self.floors.len() - 1;
                &mut self.floors[last]
            }
        };

        if floor
            .rooms
            .iter()
            .any(|existing| existing.room_number == room.room_number)
        {
            return Err(CapacityError::DuplicateRoom {
                floor_number,
                room_number: room.room_number,
            });
        }

        floor.rooms.push(room);
        self.recompute();
        Ok(())
    }

    pub fn update_room(
        &mut self,
        floor_number: i32,
        room_number: &str,
        update: RoomUpdate,
    ) -> Result<&Room, CapacityError> {
        let room =
            self.room_mut(floor_number, room_number)
                .ok_or_else(|| CapacityError::RoomNotFound {
                    floor_number,
                    room_number: room_number.to_string(),
                })?;

        if let Some(max_capacity) = update.max_capacity {
            room.set_max_capacity(max_capacity)?;
        }
        if let Some(price) = update.price_per_month {
            room.price_per_month = price;
        }
        if let Some(status) = update.status {
            room.status = status;
        }
        if let Some(policy) = update.gender_policy {
            room.gender_policy = policy;
        }
        if let Some(room_type) = update.room_type {
            room.room_type = room_type;
        }

        self.recompute();
        self.room(floor_number, room_number)
            .ok_or_else(|| CapacityError::RoomNotFound {
                floor_number,
                room_number: room_number.to_string(),
            })
    }

    /// First active occupant matching the student id or, failing that, the full name.
    pub fn find_active_occupant(&self, student_id: &StudentId, name: &str) -> Option<OccupantMatch> {
        let wanted_name = normalize_name(name);
        let mut by_name = None;

        for (floor_number, room) in self.rooms() {
            for occupant in room.active_occupants() {
                if &occupant.student_id == student_id {
                    return Some(OccupantMatch {
                        floor_number,
                        room_number: room.room_number.clone(),
                        occupant: occupant.clone(),
                        matched_on: MatchedOn::StudentId,
                    });
                }
                if by_name.is_none()
                    && !wanted_name.is_empty()
                    && normalize_name(&occupant.name) == wanted_name
                {
                    by_name = Some(OccupantMatch {
                        floor_number,
                        room_number: room.room_number.clone(),
                        occupant: occupant.clone(),
                        matched_on: MatchedOn::Name,
                    });
                }
            }
        }

        by_name
    }

    /// Every room where the student currently holds an active slot.
    pub fn rooms_holding(&self, student_id: &StudentId) -> Vec<(i32, String)> {
        self.rooms()
            .filter(|(_, room)| room.has_active(student_id))
            .map(|(floor_number, room)| (floor_number, room.room_number.clone()))
            .collect()
    }

    fn recompute(&mut self) {
        self.floors.retain(|floor| !floor.rooms.is_empty());
        self.total_floors = self.floors.len();

        let mut prices = self.rooms().map(|(_, room)| room.price_per_month);
        self.price_range = prices.next().map(|first| {
            prices.fold(
                PriceRange {
                    min: first,
                    max: first,
                },
                |range, price| PriceRange {
                    min: range.min.min(price),
                    max: range.max.max(price),
                },
            )
        });
    }
}

pub(crate) fn normalize_name(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
