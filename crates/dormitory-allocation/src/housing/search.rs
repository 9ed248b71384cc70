//! Candidate-room search over a snapshot of the capacity hierarchy.
//!
//! Results are advisory: the allocation commit re-reads the room before placing anyone.

use std::cmp::Reverse;
use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::capacity::{Dormitory, DormitoryId, GenderPolicy, RoomLocator, RoomStatus, RoomType};
use super::domain::{Gender, RoomPreferences};
use super::eligibility::{AcademicWindow, YearGroup};

/// Constraints a candidate room must satisfy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchCriteria {
    pub year_group: YearGroup,
    pub gender: Gender,
    #[serde(default)]
    pub preferences: RoomPreferences,
    /// Administrative building restriction from the year-group policy. Empty means unrestricted.
    #[serde(default)]
    pub allowed_buildings: Vec<DormitoryId>,
}

impl SearchCriteria {
    /// Same criteria without the student's building preference. The administrative
    /// restriction is kept.
    pub fn without_building_preference(&self) -> Self {
        let mut relaxed = self.clone();
        relaxed.preferences.preferred_buildings.clear();
        relaxed
    }

    fn building_filter(&self) -> BuildingFilter {
        let allowed: BTreeSet<&DormitoryId> = self.allowed_buildings.iter().collect();
        let preferred: BTreeSet<&DormitoryId> =
            self.preferences.preferred_buildings.iter().collect();

        match (allowed.is_empty(), preferred.is_empty()) {
            (true, true) => BuildingFilter::Any,
            (false, true) => BuildingFilter::Only(allowed.into_iter().cloned().collect()),
            (true, false) => BuildingFilter::Only(preferred.into_iter().cloned().collect()),
            (false, false) => BuildingFilter::Only(
                allowed
                    .intersection(&preferred)
                    .map(|id| (*id).clone())
                    .collect(),
            ),
        }
    }
}

enum BuildingFilter {
    Any,
    Only(BTreeSet<DormitoryId>),
}

impl BuildingFilter {
    fn admits(&self, id: &DormitoryId) -> bool {
        match self {
            BuildingFilter::Any => true,
            BuildingFilter::Only(ids) => ids.contains(id),
        }
    }
}

/// An open room that matched the search, with the figures used to rank it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomCandidate {
    pub dormitory_id: DormitoryId,
    pub dormitory_name: String,
    pub floor_number: i32,
    pub room_number: String,
    pub room_type: RoomType,
    pub gender_policy: GenderPolicy,
    pub max_capacity: u32,
    pub active_occupants: u32,
    pub remaining: u32,
    pub price_per_month: u32,
    pub amenities: Vec<String>,
    pub dormitory_priority: i32,
    /// An `any` room already holding someone of the other gender.
    pub mixed_gender_risk: bool,
}

impl RoomCandidate {
    pub fn locator(&self) -> RoomLocator {
        RoomLocator::new(
            self.dormitory_id.clone(),
            self.floor_number,
            self.room_number.clone(),
        )
    }
}

/// Filter and order every open room across `dormitories`.
///
/// Dormitories ranked by the window's priority table come first; within the same score,
/// emptier rooms come first. Ties keep floor and room order.
pub fn rank_candidates(
    dormitories: &[Dormitory],
    criteria: &SearchCriteria,
    window: Option<&AcademicWindow>,
) -> Vec<RoomCandidate> {
    let buildings = criteria.building_filter();
    let preferences = &criteria.preferences;
    let mut candidates = Vec::new();

    for dormitory in dormitories {
        if !dormitory.accepting_applications || !buildings.admits(&dormitory.id) {
            continue;
        }
        let dormitory_priority = window
            .map(|window| window.priority_of(&dormitory.id))
            .unwrap_or(0);

        for (floor_number, room) in dormitory.rooms() {
            if preferences
                .floor_range
                .is_some_and(|range| !range.contains(floor_number))
            {
                continue;
            }
            if room.status() != RoomStatus::Available || room.remaining_capacity() == 0 {
                continue;
            }
            if !room.gender_policy().admits(criteria.gender) {
                continue;
            }
            if preferences
                .gender_policy
                .is_some_and(|requested| !room.gender_policy().satisfies(requested))
            {
                continue;
            }
            if preferences
                .room_type
                .is_some_and(|wanted| wanted != room.room_type())
            {
                continue;
            }

            candidates.push(RoomCandidate {
                dormitory_id: dormitory.id.clone(),
                dormitory_name: dormitory.name.clone(),
                floor_number,
                room_number: room.room_number().to_string(),
                room_type: room.room_type(),
                gender_policy: room.gender_policy(),
                max_capacity: room.max_capacity(),
                active_occupants: room.active_occupancy(),
                remaining: room.remaining_capacity(),
                price_per_month: room.price_per_month(),
                amenities: room.amenities().to_vec(),
                dormitory_priority,
                mixed_gender_risk: room.mixes_genders_with(criteria.gender),
            });
        }
    }

    candidates.sort_by_key(|candidate| {
        (
            Reverse(candidate.dormitory_priority),
            Reverse(candidate.remaining),
        )
    });
    candidates
}
