use super::common::*;

use crate::housing::domain::{
    Gender, RegistrationStatus, ResidencyOutcome, ResidencyRecord, RoomAssignment,
};
use crate::housing::eligibility::{
    AcademicPolicy, EligibilityEvaluator, PriorityTier, PriorityWeights, SelectionWindow,
    WindowState, YearGroup,
};

fn assignment() -> RoomAssignment {
    RoomAssignment {
        dormitory_id: dorm_id("DORM-A"),
        dormitory_name: "Block A".to_string(),
        floor_number: 1,
        room_number: "101".to_string(),
    }
}

#[test]
fn classify_buckets_years_and_defaults_to_first() {
    assert_eq!(YearGroup::classify(Some(1)), YearGroup::First);
    assert_eq!(YearGroup::classify(Some(2)), YearGroup::SecondThird);
    assert_eq!(YearGroup::classify(Some(3)), YearGroup::SecondThird);
    assert_eq!(YearGroup::classify(Some(4)), YearGroup::FourthPlus);
    assert_eq!(YearGroup::classify(Some(7)), YearGroup::FourthPlus);
    assert_eq!(YearGroup::classify(None), YearGroup::First);
    assert_eq!(YearGroup::classify(Some(0)), YearGroup::First);
    assert_eq!(YearGroup::classify(Some(-2)), YearGroup::First);
}

#[test]
fn year_group_numbers_round_trip() {
    for group in [YearGroup::First, YearGroup::SecondThird, YearGroup::FourthPlus] {
        assert_eq!(YearGroup::from_number(group.number()), Some(group));
    }
    assert_eq!(YearGroup::from_number(9), None);
}

#[test]
fn missing_policy_blocks_every_student() {
    let evaluator = EligibilityEvaluator::default();
    let decision = evaluator.evaluate(
        &student("S1", "An Nguyen", Gender::Male, Some(2)),
        YEAR,
        None,
        now(),
    );

    assert!(!decision.eligible);
    assert_eq!(
        decision.reason,
        "no active registration policy for academic year 2025-2026"
    );
    assert_eq!(decision.tier, None);
}

#[test]
fn inactive_policy_counts_as_missing() {
    let mut policy = AcademicPolicy::new(YEAR);
    policy.active = false;

    let decision = EligibilityEvaluator::default().evaluate(
        &student("S1", "An Nguyen", Gender::Male, Some(2)),
        YEAR,
        Some(&policy),
        now(),
    );
    assert!(!decision.eligible);
    assert!(decision.reason.starts_with("no active registration policy"));
}

#[test]
fn placed_student_is_refused_with_location() {
    let mut placed = student("S1", "An Nguyen", Gender::Male, Some(2));
    placed.registration_status = RegistrationStatus::CheckedIn;
    placed.assignment = Some(assignment());

    let decision = EligibilityEvaluator::default().evaluate(
        &placed,
        YEAR,
        Some(&AcademicPolicy::new(YEAR)),
        now(),
    );

    assert!(!decision.eligible);
    assert!(decision.reason.contains("Block A - floor 1 - room 101"));
    assert!(decision.reason.contains("checked_in"));
}

#[test]
fn selection_window_distinguishes_not_yet_open_from_closed() {
    let mut policy = AcademicPolicy::new(YEAR);
    policy.policies.year2_3.selection_window = Some(SelectionWindow {
        start: at(2025, 8, 10, 0),
        end: at(2025, 8, 20, 0),
    });
    let evaluator = EligibilityEvaluator::default();
    let continuing = student("S2", "Binh Tran", Gender::Male, Some(3));

    let early = evaluator.evaluate(&continuing, YEAR, Some(&policy), at(2025, 8, 1, 0));
    assert!(!early.eligible);
    assert!(early.reason.contains("has not opened yet"));
    assert!(early.reason.contains("2025-08-10 00:00 UTC"));

    let late = evaluator.evaluate(&continuing, YEAR, Some(&policy), at(2025, 8, 21, 0));
    assert!(!late.eligible);
    assert!(late.reason.contains("has closed"));

    let inside = evaluator.evaluate(&continuing, YEAR, Some(&policy), at(2025, 8, 20, 0));
    assert!(inside.eligible);

    // other groups are not affected by the year 2-3 window
    let senior = student("S4", "Dung Vo", Gender::Female, Some(4));
    assert!(evaluator.evaluate(&senior, YEAR, Some(&policy), at(2025, 8, 1, 0)).eligible);
}

#[test]
fn eligible_decisions_copy_sub_policy_flags() {
    let policy = AcademicPolicy::new(YEAR);
    let evaluator = EligibilityEvaluator::default();

    let first = evaluator.evaluate(
        &student("S1", "An Nguyen", Gender::Male, Some(1)),
        YEAR,
        Some(&policy),
        now(),
    );
    assert!(first.eligible);
    assert!(!first.can_choose_room);
    assert!(first.auto_assign);
    assert_eq!(first.tier, Some(PriorityTier::Default));
    assert_eq!(first.year_group, YearGroup::First);

    let senior = evaluator.evaluate(
        &student("S4", "Dung Vo", Gender::Female, Some(5)),
        YEAR,
        Some(&policy),
        now(),
    );
    assert!(senior.can_choose_room);
    assert!(!senior.auto_assign);
    assert_eq!(senior.tier, Some(PriorityTier::High));
}

#[test]
fn selection_window_bounds_are_inclusive() {
    let window = SelectionWindow {
        start: at(2025, 8, 10, 0),
        end: at(2025, 8, 20, 0),
    };
    assert_eq!(window.state(at(2025, 8, 10, 0)), WindowState::Open);
    assert_eq!(window.state(at(2025, 8, 9, 23)), WindowState::NotYetOpen);
    assert_eq!(window.state(at(2025, 8, 20, 1)), WindowState::Closed);

    let policy = AcademicPolicy::new(YEAR);
    assert!(policy.is_selection_window_open(YearGroup::First, now()));
}

#[test]
fn priority_score_rewards_seniority_history_and_continuity() {
    let evaluator = EligibilityEvaluator::default();

    let first = student("S1", "An Nguyen", Gender::Male, Some(1));
    let senior = student("S4", "Dung Vo", Gender::Female, Some(4));
    assert_eq!(evaluator.priority_score(&first), 10);
    assert_eq!(evaluator.priority_score(&senior), 100);

    let mut returning = student("S3", "Cuong Le", Gender::Male, Some(3));
    for (year, outcome) in [
        ("2023-2024", ResidencyOutcome::Completed),
        ("2024-2025", ResidencyOutcome::Completed),
        ("2022-2023", ResidencyOutcome::Terminated),
    ] {
        returning.registration_history.push(ResidencyRecord {
            academic_year: year.to_string(),
            assignment: assignment(),
            checked_in_at: None,
            checked_out_at: now(),
            outcome,
        });
    }
    returning.assignment = Some(assignment());

    // 50 base + 2 completed * 10 + 20 continuity
    assert_eq!(evaluator.priority_score(&returning), 90);
}

#[test]
fn custom_weights_are_checked_for_monotonic_base_points() {
    assert!(PriorityWeights::default().is_monotonic());
    let flat = PriorityWeights {
        year1: 10,
        year2_3: 10,
        ..PriorityWeights::default()
    };
    assert!(!flat.is_monotonic());

    let evaluator = EligibilityEvaluator::new(PriorityWeights {
        year1: 1,
        year2_3: 2,
        year4_plus: 3,
        per_completed_residency: 0,
        continuity_bonus: 0,
    });
    assert_eq!(
        evaluator.priority_score(&student("S2", "Binh Tran", Gender::Male, Some(2))),
        2
    );
}
