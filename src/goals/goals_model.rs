//! Goal domain types and the pending-change queue entry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Goal category, matching the backend's string values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum GoalCategory {
    Meditation,
    Audio,
    Video,
    Wellness,
    Mindfulness,
    Sleep,
    Fitness,
    #[default]
    Custom,
}

/// A trackable wellness goal.
///
/// Invariant: `0 <= current_value <= target_value`. Mutations go
/// through [`apply_increment`](Goal::apply_increment) and
/// [`toggle_completion`](Goal::toggle_completion), which maintain the
/// clamp and the completion transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Goal {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: GoalCategory,
    pub target_value: f64,
    pub current_value: f64,
    #[serde(default)]
    pub unit: String,
    #[serde(default)]
    pub is_completed: bool,
    pub created_date: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_date: Option<DateTime<Utc>>,
}

impl Goal {
    /// Fractional progress in `0.0..=1.0`. Zero for a zero/negative
    /// target, never above one even if the stored values disagree.
    pub fn progress(&self) -> f64 {
        if self.target_value <= 0.0 {
            return 0.0;
        }
        (self.current_value / self.target_value).clamp(0.0, 1.0)
    }

    /// Add `amount` to the current value, clamped to the target.
    ///
    /// Completion flips exactly once, on the call that first reaches
    /// the target; `completed_date` is stamped then and untouched by
    /// later increments.
    pub fn apply_increment(&mut self, amount: f64) {
        let ceiling = self.target_value.max(0.0);
        self.current_value = (self.current_value + amount).clamp(0.0, ceiling);
        if !self.is_completed && self.target_value > 0.0 && self.current_value >= self.target_value
        {
            self.is_completed = true;
            self.completed_date = Some(Utc::now());
        }
    }

    /// Invert completion. Completing forces the current value to the
    /// target and stamps `completed_date`; un-completing clears the
    /// date and leaves the current value as-is.
    pub fn toggle_completion(&mut self) {
        if self.is_completed {
            self.is_completed = false;
            self.completed_date = None;
        } else {
            self.is_completed = true;
            self.current_value = self.target_value;
            self.completed_date = Some(Utc::now());
        }
    }
}

/// Input for creating a goal. The engine assigns id and created date.
#[derive(Debug, Clone, Default)]
pub struct GoalDraft {
    pub title: String,
    pub description: String,
    pub category: GoalCategory,
    pub target_value: f64,
    pub current_value: f64,
    pub unit: String,
    pub target_date: Option<DateTime<Utc>>,
}

impl GoalDraft {
    /// Materialize the draft: the id and created date are assigned
    /// here, completion always starts false.
    pub fn build(self) -> Goal {
        let ceiling = self.target_value.max(0.0);
        Goal {
            id: Uuid::new_v4().to_string(),
            title: self.title,
            description: self.description,
            category: self.category,
            target_value: self.target_value,
            current_value: self.current_value.clamp(0.0, ceiling),
            unit: self.unit,
            is_completed: false,
            created_date: Utc::now(),
            completed_date: None,
            target_date: self.target_date,
        }
    }
}

/// Built-in sample goals, served only when offline with no cache.
/// A demo fallback so a first launch without connectivity shows
/// something, not production data.
pub(crate) fn sample_goals() -> Vec<Goal> {
    let drafts = [
        ("Meditate Daily", GoalCategory::Meditation, 12.0, 30.0, "sessions"),
        ("Calming Audio", GoalCategory::Audio, 4.0, 10.0, "hours"),
        ("Wellness Videos", GoalCategory::Video, 2.0, 5.0, "courses"),
        ("Improve Sleep", GoalCategory::Sleep, 8.0, 20.0, "nights"),
    ];
    drafts
        .into_iter()
        .map(|(title, category, current, target, unit)| {
            GoalDraft {
                title: title.to_string(),
                category,
                current_value: current,
                target_value: target,
                unit: unit.to_string(),
                ..GoalDraft::default()
            }
            .build()
        })
        .collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Pending changes
// ─────────────────────────────────────────────────────────────────────────────

/// The kind of mutation a queued change replays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ChangeAction {
    Create,
    Update,
    Delete,
    IncrementProgress,
}

/// One optimistic local mutation not yet confirmed by the server.
/// Queued durably, replayed in FIFO order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingChange {
    pub id: String,
    pub action: ChangeAction,
    pub goal_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goal: Option<Goal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

impl PendingChange {
    fn new(action: ChangeAction, goal_id: String, goal: Option<Goal>, amount: Option<f64>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            action,
            goal_id,
            goal,
            amount,
            timestamp: Utc::now(),
        }
    }

    pub fn create(goal: Goal) -> Self {
        Self::new(ChangeAction::Create, goal.id.clone(), Some(goal), None)
    }

    pub fn update(goal: Goal) -> Self {
        Self::new(ChangeAction::Update, goal.id.clone(), Some(goal), None)
    }

    pub fn delete(goal_id: &str) -> Self {
        Self::new(ChangeAction::Delete, goal_id.to_string(), None, None)
    }

    pub fn increment(goal_id: &str, amount: f64) -> Self {
        Self::new(
            ChangeAction::IncrementProgress,
            goal_id.to_string(),
            None,
            Some(amount),
        )
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Derived views
// ─────────────────────────────────────────────────────────────────────────────

/// Goal list filter for the UI layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GoalFilter {
    #[default]
    All,
    Active,
    Completed,
}

impl GoalFilter {
    pub fn matches(&self, goal: &Goal) -> bool {
        match self {
            GoalFilter::All => true,
            GoalFilter::Active => !goal.is_completed,
            GoalFilter::Completed => goal.is_completed,
        }
    }
}

/// Aggregate counts plus the mean progress over non-completed goals.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalSummary {
    pub total: usize,
    pub active: usize,
    pub completed: usize,
    pub overall_progress: f64,
}

impl GoalSummary {
    pub fn of(goals: &[Goal]) -> Self {
        let total = goals.len();
        let completed = goals.iter().filter(|g| g.is_completed).count();
        let active = total - completed;
        let overall_progress = if active == 0 {
            0.0
        } else {
            goals
                .iter()
                .filter(|g| !g.is_completed)
                .map(Goal::progress)
                .sum::<f64>()
                / active as f64
        };
        Self {
            total,
            active,
            completed,
            overall_progress,
        }
    }
}
