use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::super::domain::Student;
use super::config::PriorityWeights;

/// Classification bucket derived from a student's year of study.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum YearGroup {
    First,
    SecondThird,
    FourthPlus,
}

impl YearGroup {
    /// 1 → first, 2 or 3 → second/third, 4 and up → fourth-plus.
    /// Anything else falls back to the first-year group.
    pub fn classify(academic_year: Option<i32>) -> Self {
        match academic_year {
            Some(1) => YearGroup::First,
            Some(2 | 3) => YearGroup::SecondThird,
            Some(year) if year >= 4 => YearGroup::FourthPlus,
            other => {
                debug!(academic_year = ?other, "unclassifiable academic year, using first-year group");
                YearGroup::First
            }
        }
    }

    pub const fn number(self) -> u8 {
        match self {
            YearGroup::First => 1,
            YearGroup::SecondThird => 2,
            YearGroup::FourthPlus => 3,
        }
    }

    pub fn from_number(value: u8) -> Option<Self> {
        match value {
            1 => Some(YearGroup::First),
            2 => Some(YearGroup::SecondThird),
            3 => Some(YearGroup::FourthPlus),
            _ => None,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            YearGroup::First => "year 1",
            YearGroup::SecondThird => "years 2-3",
            YearGroup::FourthPlus => "year 4+",
        }
    }
}

impl fmt::Display for YearGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

pub(crate) fn priority_score(student: &Student, weights: &PriorityWeights) -> u32 {
    let base = match YearGroup::classify(student.academic_year) {
        YearGroup::First => weights.year1,
        YearGroup::SecondThird => weights.year2_3,
        YearGroup::FourthPlus => weights.year4_plus,
    };

    let residency = weights
        .per_completed_residency
        .saturating_mul(student.completed_residencies() as u32);

    let continuity = if student.assignment.is_some() {
        weights.continuity_bonus
    } else {
        0
    };

    base.saturating_add(residency).saturating_add(continuity)
}
