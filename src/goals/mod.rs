pub mod goals_api;
pub mod goals_model;
pub mod goals_service;

pub use goals_api::{GoalsApi, GoalsApiClient};
pub use goals_model::{ChangeAction, Goal, GoalCategory, GoalDraft, GoalFilter, GoalSummary, PendingChange};
pub use goals_service::{GoalSyncEngine, SyncReport};
