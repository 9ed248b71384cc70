use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::super::capacity::DormitoryId;
use super::rules::YearGroup;

/// Coarse allocation priority attached to a year group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriorityTier {
    Low,
    Default,
    Medium,
    High,
}

/// Where `now` sits relative to a selection window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowState {
    NotYetOpen,
    Open,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl SelectionWindow {
    pub fn state(&self, now: DateTime<Utc>) -> WindowState {
        if now < self.start {
            WindowState::NotYetOpen
        } else if now > self.end {
            WindowState::Closed
        } else {
            WindowState::Open
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirstYearPolicy {
    pub can_choose_room: bool,
    pub auto_assign: bool,
    #[serde(default)]
    pub allowed_buildings: Vec<DormitoryId>,
    #[serde(default)]
    pub selection_window: Option<SelectionWindow>,
    pub priority: PriorityTier,
}

impl Default for FirstYearPolicy {
    fn default() -> Self {
        Self {
            can_choose_room: false,
            auto_assign: true,
            allowed_buildings: Vec::new(),
            selection_window: None,
            priority: PriorityTier::Default,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContinuingPolicy {
    pub can_choose_room: bool,
    pub auto_assign: bool,
    #[serde(default)]
    pub allowed_buildings: Vec<DormitoryId>,
    #[serde(default)]
    pub selection_window: Option<SelectionWindow>,
    pub priority: PriorityTier,
}

impl Default for ContinuingPolicy {
    fn default() -> Self {
        Self {
            can_choose_room: true,
            auto_assign: false,
            allowed_buildings: Vec::new(),
            selection_window: None,
            priority: PriorityTier::Medium,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeniorPolicy {
    pub can_choose_room: bool,
    pub auto_assign: bool,
    pub special_priority: bool,
    pub allow_room_change: bool,
    #[serde(default)]
    pub allowed_buildings: Vec<DormitoryId>,
    #[serde(default)]
    pub selection_window: Option<SelectionWindow>,
    pub priority: PriorityTier,
}

impl Default for SeniorPolicy {
    fn default() -> Self {
        Self {
            can_choose_room: true,
            auto_assign: false,
            special_priority: true,
            allow_room_change: true,
            allowed_buildings: Vec::new(),
            selection_window: None,
            priority: PriorityTier::High,
        }
    }
}

/// One sub-policy per year group, each with its own shape.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct YearGroupPolicies {
    pub year1: FirstYearPolicy,
    pub year2_3: ContinuingPolicy,
    pub year4_plus: SeniorPolicy,
}

/// Borrowed view of the sub-policy that applies to a year group.
#[derive(Debug, Clone, Copy)]
pub enum GroupPolicy<'a> {
    First(&'a FirstYearPolicy),
    Continuing(&'a ContinuingPolicy),
    Senior(&'a SeniorPolicy),
}

impl<'a> GroupPolicy<'a> {
    pub fn can_choose_room(&self) -> bool {
        match self {
            GroupPolicy::First(policy) => policy.can_choose_room,
            GroupPolicy::Continuing(policy) => policy.can_choose_room,
            GroupPolicy::Senior(policy) => policy.can_choose_room,
        }
    }

    pub fn auto_assign(&self) -> bool {
        match self {
            GroupPolicy::First(policy) => policy.auto_assign,
            GroupPolicy::Continuing(policy) => policy.auto_assign,
            GroupPolicy::Senior(policy) => policy.auto_assign,
        }
    }

    /// Empty means every dormitory is allowed.
    pub fn allowed_buildings(&self) -> &'a [DormitoryId] {
        match self {
            GroupPolicy::First(policy) => &policy.allowed_buildings,
            GroupPolicy::Continuing(policy) => &policy.allowed_buildings,
            GroupPolicy::Senior(policy) => &policy.allowed_buildings,
        }
    }

    pub fn selection_window(&self) -> Option<SelectionWindow> {
        match self {
            GroupPolicy::First(policy) => policy.selection_window,
            GroupPolicy::Continuing(policy) => policy.selection_window,
            GroupPolicy::Senior(policy) => policy.selection_window,
        }
    }

    pub fn priority(&self) -> PriorityTier {
        match self {
            GroupPolicy::First(policy) => policy.priority,
            GroupPolicy::Continuing(policy) => policy.priority,
            GroupPolicy::Senior(policy) => policy.priority,
        }
    }
}

/// Registration rules for one academic year (e.g. "2025-2026").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcademicPolicy {
    pub academic_year: String,
    pub active: bool,
    pub policies: YearGroupPolicies,
    #[serde(default)]
    pub notes: Option<String>,
}

impl AcademicPolicy {
    pub fn new(academic_year: impl Into<String>) -> Self {
        Self {
            academic_year: academic_year.into(),
            active: true,
            policies: YearGroupPolicies::default(),
            notes: None,
        }
    }

    pub fn for_group(&self, group: YearGroup) -> GroupPolicy<'_> {
        match group {
            YearGroup::First => GroupPolicy::First(&self.policies.year1),
            YearGroup::SecondThird => GroupPolicy::Continuing(&self.policies.year2_3),
            YearGroup::FourthPlus => GroupPolicy::Senior(&self.policies.year4_plus),
        }
    }

    /// No window configured means always open.
    pub fn is_selection_window_open(&self, group: YearGroup, now: DateTime<Utc>) -> bool {
        self.for_group(group)
            .selection_window()
            .map(|window| window.state(now) == WindowState::Open)
            .unwrap_or(true)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DormitoryPriority {
    pub dormitory_id: DormitoryId,
    pub score: i32,
}

/// Intake period and per-dormitory ranking for an academic year.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcademicWindow {
    pub academic_year: String,
    pub register_open_at: DateTime<Utc>,
    pub register_close_at: DateTime<Utc>,
    #[serde(default)]
    pub auto_expire_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub dormitory_priority: Vec<DormitoryPriority>,
}

impl AcademicWindow {
    pub fn registration_state(&self, now: DateTime<Utc>) -> WindowState {
        SelectionWindow {
            start: self.register_open_at,
            end: self.register_close_at,
        }
        .state(now)
    }

    /// Unlisted dormitories score zero.
    pub fn priority_of(&self, dormitory_id: &DormitoryId) -> i32 {
        self.dormitory_priority
            .iter()
            .find(|entry| &entry.dormitory_id == dormitory_id)
            .map(|entry| entry.score)
            .unwrap_or(0)
    }
}
