mod config;
mod policy;
mod rules;

pub use config::PriorityWeights;
pub use policy::{
    AcademicPolicy, AcademicWindow, ContinuingPolicy, DormitoryPriority, FirstYearPolicy,
    GroupPolicy, PriorityTier, SelectionWindow, SeniorPolicy, WindowState, YearGroupPolicies,
};
pub use rules::YearGroup;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::domain::Student;

/// Stateless gate deciding whether and how a student may register for an academic year.
#[derive(Debug, Clone, Default)]
pub struct EligibilityEvaluator {
    weights: PriorityWeights,
}

impl EligibilityEvaluator {
    pub fn new(weights: PriorityWeights) -> Self {
        Self { weights }
    }

    pub fn weights(&self) -> &PriorityWeights {
        &self.weights
    }

    pub fn priority_score(&self, student: &Student) -> u32 {
        rules::priority_score(student, &self.weights)
    }

    /// Checks run in a fixed order: policy present, not already placed, selection window.
    /// Inactive policies count as missing.
    pub fn evaluate(
        &self,
        student: &Student,
        academic_year: &str,
        policy: Option<&AcademicPolicy>,
        now: DateTime<Utc>,
    ) -> EligibilityDecision {
        let year_group = YearGroup::classify(student.academic_year);

        let Some(policy) = policy.filter(|policy| policy.active) else {
            return EligibilityDecision::blocked(
                year_group,
                format!("no active registration policy for academic year {academic_year}"),
            );
        };

        if student.registration_status.is_placed() {
            let location = student
                .assignment
                .as_ref()
                .map(|assignment| format!(" ({assignment})"))
                .unwrap_or_default();
            return EligibilityDecision::blocked(
                year_group,
                format!(
                    "student already holds a room{location}; status is {}",
                    student.registration_status.label()
                ),
            );
        }

        let group_policy = policy.for_group(year_group);

        if let Some(window) = group_policy.selection_window() {
            let start = window.start.format("%Y-%m-%d %H:%M UTC");
            let end = window.end.format("%Y-%m-%d %H:%M UTC");
            let reason = match window.state(now) {
                WindowState::NotYetOpen => Some(format!(
                    "room selection for {year_group} has not opened yet; window is {start} to {end}"
                )),
                WindowState::Closed => Some(format!(
                    "room selection for {year_group} has closed; window was {start} to {end}"
                )),
                WindowState::Open => None,
            };
            if let Some(reason) = reason {
                return EligibilityDecision::blocked(year_group, reason);
            }
        }

        debug!(
            student_id = %student.id,
            year_group = year_group.label(),
            "student eligible for registration"
        );

        EligibilityDecision {
            eligible: true,
            reason: format!("eligible under the {year_group} policy for {academic_year}"),
            can_choose_room: group_policy.can_choose_room(),
            auto_assign: group_policy.auto_assign(),
            tier: Some(group_policy.priority()),
            year_group,
        }
    }
}

/// Outcome of the eligibility gate; flags are copied from the matching sub-policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EligibilityDecision {
    pub eligible: bool,
    pub reason: String,
    pub can_choose_room: bool,
    pub auto_assign: bool,
    pub tier: Option<PriorityTier>,
    pub year_group: YearGroup,
}

impl EligibilityDecision {
    fn blocked(year_group: YearGroup, reason: String) -> Self {
        Self {
            eligible: false,
            reason,
            can_choose_room: false,
            auto_assign: false,
            tier: None,
            year_group,
        }
    }
}
