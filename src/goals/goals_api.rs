//! Server-side goal operations behind a trait seam.
//!
//! The sync engine talks to [`GoalsApi`] so tests can script server
//! behavior; the production implementation routes through the session
//! manager to get the transparent refresh-and-retry on 401.

use async_trait::async_trait;
use serde_json::json;

use crate::auth::SessionManager;
use crate::errors::Result;
use crate::transport::Method;

use super::goals_model::Goal;

#[async_trait]
pub trait GoalsApi: Send + Sync {
    async fn fetch_goals(&self) -> Result<Vec<Goal>>;
    async fn create_goal(&self, goal: &Goal) -> Result<Goal>;
    async fn update_goal(&self, goal: &Goal) -> Result<Goal>;
    async fn delete_goal(&self, goal_id: &str) -> Result<()>;
    async fn increment_progress(&self, goal_id: &str, amount: f64) -> Result<Goal>;
}

/// Goals API over the authenticated transport.
#[derive(Clone)]
pub struct GoalsApiClient {
    session: SessionManager,
}

impl GoalsApiClient {
    pub fn new(session: SessionManager) -> Self {
        Self { session }
    }
}

#[async_trait]
impl GoalsApi for GoalsApiClient {
    async fn fetch_goals(&self) -> Result<Vec<Goal>> {
        self.session
            .authorized_request(Method::GET, "/goals", None)
            .await
    }

    async fn create_goal(&self, goal: &Goal) -> Result<Goal> {
        let body = serde_json::to_value(goal)?;
        self.session
            .authorized_request(Method::POST, "/goals", Some(body))
            .await
    }

    async fn update_goal(&self, goal: &Goal) -> Result<Goal> {
        let body = serde_json::to_value(goal)?;
        self.session
            .authorized_request(Method::PUT, &format!("/goals/{}", goal.id), Some(body))
            .await
    }

    async fn delete_goal(&self, goal_id: &str) -> Result<()> {
        self.session
            .authorized_request_no_content(Method::DELETE, &format!("/goals/{}", goal_id), None)
            .await
    }

    async fn increment_progress(&self, goal_id: &str, amount: f64) -> Result<Goal> {
        let body = json!({ "increment": amount });
        self.session
            .authorized_request(
                Method::PATCH,
                &format!("/goals/{}/progress", goal_id),
                Some(body),
            )
            .await
    }
}
