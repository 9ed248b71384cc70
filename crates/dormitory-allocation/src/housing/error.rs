use std::fmt;

use super::capacity::{DormitoryId, MatchedOn, RoomLocator};
use super::domain::{ApplicationId, ApplicationStatus, RoomAssignment, StudentId};
use super::lifecycle::ApplicationEvent;
use super::repository::RepositoryError;

/// Which record a lookup failed to find.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Missing {
    Dormitory(DormitoryId),
    Floor {
        dormitory_id: DormitoryId,
        floor_number: i32,
    },
    Room(RoomLocator),
    Student(StudentId),
    Application(ApplicationId),
    AcademicWindow(String),
}

impl fmt::Display for Missing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Missing::Dormitory(id) => write!(f, "dormitory {id}"),
            Missing::Floor {
                dormitory_id,
                floor_number,
            } => write!(f, "floor {floor_number} in dormitory {dormitory_id}"),
            Missing::Room(locator) => write!(f, "room {locator}"),
            Missing::Student(id) => write!(f, "student {id}"),
            Missing::Application(id) => write!(f, "application {id}"),
            Missing::AcademicWindow(year) => write!(f, "academic window {year}"),
        }
    }
}

/// Every way an allocation-engine operation can fail.
#[derive(Debug, thiserror::Error)]
pub enum HousingError {
    #[error("invalid request: {0}")]
    Validation(String),
    #[error("{0} not found")]
    NotFound(Missing),
    #[error("not eligible: {reason}")]
    Ineligible { reason: String },
    #[error("{} \"{value}\" is already registered at {location}", .matched_on.label())]
    DuplicateStudent {
        matched_on: MatchedOn,
        value: String,
        location: RoomAssignment,
    },
    #[error("room {location} is full ({capacity} of {capacity} places taken)")]
    RoomFull { location: RoomLocator, capacity: u32 },
    #[error("room {location} is unavailable: {reason}")]
    RoomUnavailable {
        location: RoomLocator,
        reason: String,
    },
    #[error("cannot {event} an application that is {from}")]
    IllegalTransition {
        from: ApplicationStatus,
        event: ApplicationEvent,
    },
    #[error("dormitory {dormitory_id} changed concurrently; gave up after {attempts} attempt(s)")]
    ConcurrencyConflict {
        dormitory_id: DormitoryId,
        attempts: u8,
    },
    #[error("inconsistent records require operator intervention: {detail}")]
    FatalConsistency { detail: String },
    #[error(transparent)]
    Store(#[from] RepositoryError),
}

impl HousingError {
    /// Expected outcomes are returned to the caller and never logged as system errors.
    pub fn is_business_outcome(&self) -> bool {
        !matches!(
            self,
            HousingError::FatalConsistency { .. } | HousingError::Store(_)
        )
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, HousingError::ConcurrencyConflict { .. })
    }

    /// Message safe to show an end user; system failures stay opaque.
    pub fn public_message(&self) -> String {
        if self.is_business_outcome() {
            self.to_string()
        } else {
            "internal error, please contact the housing office".to_string()
        }
    }

    pub(crate) fn ineligible(reason: impl Into<String>) -> Self {
        HousingError::Ineligible {
            reason: reason.into(),
        }
    }
}
