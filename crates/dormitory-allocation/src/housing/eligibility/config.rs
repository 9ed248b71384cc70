use serde::{Deserialize, Serialize};

/// Weights behind the priority score used for ranking and batch order.
///
/// Base points must increase with seniority: `year1 < year2_3 < year4_plus`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriorityWeights {
    pub year1: u32,
    pub year2_3: u32,
    pub year4_plus: u32,
    pub per_completed_residency: u32,
    pub continuity_bonus: u32,
}

impl PriorityWeights {
    pub fn is_monotonic(&self) -> bool {
        self.year1 < self.year2_3 && self.year2_3 < self.year4_plus
    }
}

impl Default for PriorityWeights {
    fn default() -> Self {
        Self {
            year1: 10,
            year2_3: 50,
            year4_plus: 100,
            per_completed_residency: 10,
            continuity_bonus: 20,
        }
    }
}
