//! Property-based tests for goal progress arithmetic.
//!
//! These tests verify that the clamp, completion-transition, and
//! aggregate-progress rules hold across all valid inputs, using the
//! `proptest` crate for random test case generation.

use greatfeel_core::goals::{Goal, GoalCategory, GoalDraft, GoalFilter, GoalSummary};
use proptest::prelude::*;

// =============================================================================
// Generators
// =============================================================================

fn arb_category() -> impl Strategy<Value = GoalCategory> {
    prop_oneof![
        Just(GoalCategory::Meditation),
        Just(GoalCategory::Audio),
        Just(GoalCategory::Video),
        Just(GoalCategory::Wellness),
        Just(GoalCategory::Mindfulness),
        Just(GoalCategory::Sleep),
        Just(GoalCategory::Fitness),
        Just(GoalCategory::Custom),
    ]
}

/// Generates a non-completed goal with `0 <= current <= target`.
fn arb_goal() -> impl Strategy<Value = Goal> {
    (
        "[a-z]{3,20}",     // title
        arb_category(),
        1.0f64..200.0,     // target
        0.0f64..1.0,       // current as a fraction of target
    )
        .prop_map(|(title, category, target, fraction)| {
            GoalDraft {
                title,
                category,
                target_value: target,
                current_value: fraction * target,
                unit: "units".to_string(),
                ..GoalDraft::default()
            }
            .build()
        })
}

// =============================================================================
// Properties
// =============================================================================

proptest! {
    /// Repeated increments never push the current value past the
    /// target, completion flips at most once, and the completion
    /// date set on that flip is never touched again.
    #[test]
    fn increments_clamp_and_complete_once(
        goal in arb_goal(),
        amounts in proptest::collection::vec(-20.0f64..60.0, 1..24),
    ) {
        let mut goal = goal;
        let mut completions = 0usize;
        let mut stamp = None;

        for amount in amounts {
            let was_completed = goal.is_completed;
            goal.apply_increment(amount);

            prop_assert!(goal.current_value <= goal.target_value + 1e-9);
            prop_assert!(goal.current_value >= 0.0);

            if goal.is_completed && !was_completed {
                completions += 1;
                stamp = goal.completed_date;
                prop_assert!(stamp.is_some());
            }
            if was_completed {
                prop_assert!(goal.is_completed);
                prop_assert_eq!(goal.completed_date, stamp);
            }
        }

        prop_assert!(completions <= 1);
        prop_assert_eq!(goal.is_completed, completions == 1);
    }

    /// A toggle pair lands back in the non-completed state with the
    /// completion date cleared; the current value stays where the
    /// completing toggle forced it.
    #[test]
    fn toggle_pair_round_trips_except_completed_date(goal in arb_goal()) {
        let mut goal = goal;
        let before = goal.clone();

        goal.toggle_completion();
        prop_assert!(goal.is_completed);
        prop_assert_eq!(goal.current_value, goal.target_value);
        prop_assert!(goal.completed_date.is_some());

        goal.toggle_completion();
        prop_assert!(!goal.is_completed);
        prop_assert_eq!(goal.completed_date, None);
        prop_assert_eq!(goal.current_value, before.target_value);
        prop_assert_eq!(goal.id, before.id);
        prop_assert_eq!(goal.title, before.title);
    }

    /// The aggregate progress is a mean over non-completed goals only,
    /// bounded to `0..=1`, and zero when every goal is completed.
    #[test]
    fn summary_progress_is_bounded_active_mean(
        inputs in proptest::collection::vec((arb_goal(), any::<bool>()), 0..12),
    ) {
        let goals: Vec<Goal> = inputs
            .into_iter()
            .map(|(mut goal, completed)| {
                if completed {
                    goal.toggle_completion();
                }
                goal
            })
            .collect();

        let summary = GoalSummary::of(&goals);

        prop_assert_eq!(summary.total, goals.len());
        prop_assert_eq!(summary.active + summary.completed, summary.total);
        prop_assert!(summary.overall_progress >= 0.0);
        prop_assert!(summary.overall_progress <= 1.0 + 1e-9);

        let active = goals
            .iter()
            .filter(|g| GoalFilter::Active.matches(g))
            .count();
        prop_assert_eq!(active, summary.active);
        if active == 0 {
            prop_assert_eq!(summary.overall_progress, 0.0);
        } else {
            let mean = goals
                .iter()
                .filter(|g| !g.is_completed)
                .map(Goal::progress)
                .sum::<f64>()
                / active as f64;
            prop_assert!((summary.overall_progress - mean).abs() < 1e-9);
        }
    }
}
