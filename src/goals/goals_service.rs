//! Offline-aware goal sync engine.
//!
//! Presents an eventually-consistent goal list: every mutation applies
//! to the in-memory list immediately, then confirms against the server
//! when online. A confirmation failure queues a durable
//! [`PendingChange`] for replay instead of surfacing a hard error;
//! a failed delete additionally rolls the removal back so data is
//! never silently hidden. Coming back online replays the queue in
//! FIFO order, then reloads from the server to reconcile.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use log::{debug, info, warn};

use crate::constants::{CACHED_GOALS_KEY, PENDING_CHANGES_KEY};
use crate::errors::{Error, Result};
use crate::events::{DomainEvent, DomainEventSink};
use crate::secrets::SecretStore;

use super::goals_api::GoalsApi;
use super::goals_model::{sample_goals, ChangeAction, Goal, GoalDraft, GoalFilter, GoalSummary, PendingChange};

/// Outcome of one pending-change replay pass. Failed entries stay
/// queued for the next pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SyncReport {
    pub synced: usize,
    pub failed: usize,
}

struct EngineInner {
    api: Arc<dyn GoalsApi>,
    store: Arc<dyn SecretStore>,
    sink: Arc<dyn DomainEventSink>,
    goals: Mutex<Vec<Goal>>,
    // Serializes read-modify-write of the durable queue. An unguarded
    // update can lose a concurrent offline mutation.
    queue_lock: Mutex<()>,
    online: AtomicBool,
}

/// Maintains the in-memory goal list, its durable cache, and the
/// pending-change queue.
#[derive(Clone)]
pub struct GoalSyncEngine {
    inner: Arc<EngineInner>,
}

impl GoalSyncEngine {
    pub fn new(
        api: Arc<dyn GoalsApi>,
        store: Arc<dyn SecretStore>,
        sink: Arc<dyn DomainEventSink>,
    ) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                api,
                store,
                sink,
                goals: Mutex::new(Vec::new()),
                queue_lock: Mutex::new(()),
                online: AtomicBool::new(true),
            }),
        }
    }

    pub fn is_online(&self) -> bool {
        self.inner.online.load(Ordering::SeqCst)
    }

    /// Record a connectivity change. An offline→online transition
    /// replays the pending queue, then reloads from the server.
    pub async fn set_online(&self, online: bool) -> Result<()> {
        let was_online = self.inner.online.swap(online, Ordering::SeqCst);
        if online && !was_online {
            info!("[GoalSync] connectivity restored, replaying queue");
            self.sync_pending_changes().await?;
            self.load_goals().await?;
        }
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Views
    // ─────────────────────────────────────────────────────────────────────────

    pub fn goals(&self) -> Vec<Goal> {
        self.inner.goals.lock().unwrap().clone()
    }

    pub fn filtered(&self, filter: GoalFilter) -> Vec<Goal> {
        self.inner
            .goals
            .lock()
            .unwrap()
            .iter()
            .filter(|g| filter.matches(g))
            .cloned()
            .collect()
    }

    pub fn summary(&self) -> GoalSummary {
        GoalSummary::of(&self.inner.goals.lock().unwrap())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Loading
    // ─────────────────────────────────────────────────────────────────────────

    /// Fetch from the server when online; otherwise serve the cached
    /// snapshot, or the built-in samples when no cache exists yet.
    pub async fn load_goals(&self) -> Result<Vec<Goal>> {
        if self.is_online() {
            match self.inner.api.fetch_goals().await {
                Ok(goals) => {
                    self.with_goals(|list| *list = goals.clone())?;
                    return Ok(goals);
                }
                Err(err) => {
                    warn!("[GoalSync] fetch failed, serving cached goals: {}", err);
                }
            }
        }

        let goals = match self.cached_goals()? {
            Some(cached) => cached,
            None => {
                debug!("[GoalSync] no cached goals, using built-in samples");
                sample_goals()
            }
        };
        // Fallback data goes to memory only; the durable cache keeps
        // whatever the server last confirmed.
        *self.inner.goals.lock().unwrap() = goals.clone();
        self.inner.sink.emit(DomainEvent::GoalsChanged);
        Ok(goals)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Mutations (optimistic-apply-then-confirm)
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn add_goal(&self, draft: GoalDraft) -> Result<Goal> {
        let goal = draft.build();
        self.with_goals(|goals| goals.push(goal.clone()))?;

        if !self.is_online() {
            self.enqueue(PendingChange::create(goal.clone()))?;
            return Ok(goal);
        }
        match self.inner.api.create_goal(&goal).await {
            Ok(server) => {
                self.replace_goal(&goal.id, server.clone())?;
                Ok(server)
            }
            Err(err) => {
                warn!("[GoalSync] create failed, queued for replay: {}", err);
                self.enqueue(PendingChange::create(goal.clone()))?;
                Ok(goal)
            }
        }
    }

    pub async fn update_goal(&self, goal: Goal) -> Result<Goal> {
        self.replace_goal(&goal.id, goal.clone())?;

        if !self.is_online() {
            self.enqueue(PendingChange::update(goal.clone()))?;
            return Ok(goal);
        }
        match self.inner.api.update_goal(&goal).await {
            Ok(server) => {
                self.replace_goal(&goal.id, server.clone())?;
                Ok(server)
            }
            Err(err) => {
                warn!("[GoalSync] update failed, queued for replay: {}", err);
                self.enqueue(PendingChange::update(goal.clone()))?;
                Ok(goal)
            }
        }
    }

    pub async fn delete_goal(&self, goal_id: &str) -> Result<()> {
        let removed = self.with_goals(|goals| {
            goals
                .iter()
                .position(|g| g.id == goal_id)
                .map(|index| goals.remove(index))
        })?;
        let Some(removed) = removed else {
            return Ok(());
        };

        if !self.is_online() {
            self.enqueue(PendingChange::delete(goal_id))?;
            return Ok(());
        }
        match self.inner.api.delete_goal(goal_id).await {
            Ok(()) => Ok(()),
            Err(err) => {
                // A failed delete must not silently hide data: put the
                // goal back and leave the delete queued.
                warn!("[GoalSync] delete failed, rolling back: {}", err);
                self.with_goals(|goals| goals.insert(0, removed))?;
                self.enqueue(PendingChange::delete(goal_id))?;
                Ok(())
            }
        }
    }

    pub async fn increment_progress(&self, goal_id: &str, amount: f64) -> Result<Goal> {
        let local = self
            .with_goals(|goals| {
                goals.iter_mut().find(|g| g.id == goal_id).map(|goal| {
                    goal.apply_increment(amount);
                    goal.clone()
                })
            })?
            .ok_or_else(|| Error::Unexpected(format!("Unknown goal id {}", goal_id)))?;

        if !self.is_online() {
            self.enqueue(PendingChange::increment(goal_id, amount))?;
            return Ok(local);
        }
        match self.inner.api.increment_progress(goal_id, amount).await {
            Ok(server) => {
                self.replace_goal(goal_id, server.clone())?;
                Ok(server)
            }
            Err(err) => {
                warn!("[GoalSync] increment failed, queued for replay: {}", err);
                self.enqueue(PendingChange::increment(goal_id, amount))?;
                Ok(local)
            }
        }
    }

    pub async fn toggle_completion(&self, goal_id: &str) -> Result<Goal> {
        let local = self
            .with_goals(|goals| {
                goals.iter_mut().find(|g| g.id == goal_id).map(|goal| {
                    goal.toggle_completion();
                    goal.clone()
                })
            })?
            .ok_or_else(|| Error::Unexpected(format!("Unknown goal id {}", goal_id)))?;

        if !self.is_online() {
            self.enqueue(PendingChange::update(local.clone()))?;
            return Ok(local);
        }
        match self.inner.api.update_goal(&local).await {
            Ok(server) => {
                self.replace_goal(goal_id, server.clone())?;
                Ok(server)
            }
            Err(err) => {
                warn!("[GoalSync] toggle failed, queued for replay: {}", err);
                self.enqueue(PendingChange::update(local.clone()))?;
                Ok(local)
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Replay
    // ─────────────────────────────────────────────────────────────────────────

    /// Replay the pending queue in FIFO order. Entries that fail stay
    /// queued for the next pass instead of being dropped.
    pub async fn sync_pending_changes(&self) -> Result<SyncReport> {
        let queue = self.pending_changes()?;
        if queue.is_empty() {
            return Ok(SyncReport::default());
        }
        info!("[GoalSync] replaying {} pending changes", queue.len());

        let mut synced_ids = Vec::new();
        let mut failed = 0usize;
        for change in &queue {
            match self.replay(change).await {
                Ok(()) => synced_ids.push(change.id.clone()),
                Err(err) => {
                    warn!(
                        "[GoalSync] replay of {:?} for goal {} failed, keeping queued: {}",
                        change.action, change.goal_id, err
                    );
                    failed += 1;
                }
            }
        }

        let synced = synced_ids.len();
        {
            // Drop only what this pass replayed; failed entries and
            // anything enqueued meanwhile stay for the next pass.
            let _guard = self.inner.queue_lock.lock().unwrap();
            let mut current = self.read_queue()?;
            current.retain(|change| !synced_ids.contains(&change.id));
            self.write_queue(&current)?;
        }
        self.inner
            .sink
            .emit(DomainEvent::SyncCompleted { synced, failed });
        Ok(SyncReport { synced, failed })
    }

    async fn replay(&self, change: &PendingChange) -> Result<()> {
        match change.action {
            ChangeAction::Create => {
                let goal = change
                    .goal
                    .as_ref()
                    .ok_or_else(|| Error::Unexpected("Create change without goal".to_string()))?;
                let server = self.inner.api.create_goal(goal).await?;
                self.replace_goal(&goal.id, server)
            }
            ChangeAction::Update => {
                let goal = change
                    .goal
                    .as_ref()
                    .ok_or_else(|| Error::Unexpected("Update change without goal".to_string()))?;
                let server = self.inner.api.update_goal(goal).await?;
                self.replace_goal(&goal.id, server)
            }
            ChangeAction::Delete => {
                self.inner.api.delete_goal(&change.goal_id).await?;
                self.with_goals(|goals| goals.retain(|g| g.id != change.goal_id))
            }
            ChangeAction::IncrementProgress => {
                let amount = change.amount.unwrap_or(1.0);
                let server = self
                    .inner
                    .api
                    .increment_progress(&change.goal_id, amount)
                    .await?;
                self.replace_goal(&change.goal_id, server)
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Durable state
    // ─────────────────────────────────────────────────────────────────────────

    pub fn pending_changes(&self) -> Result<Vec<PendingChange>> {
        let _guard = self.inner.queue_lock.lock().unwrap();
        self.read_queue()
    }

    fn enqueue(&self, change: PendingChange) -> Result<()> {
        let _guard = self.inner.queue_lock.lock().unwrap();
        let mut queue = self.read_queue()?;
        queue.push(change);
        self.write_queue(&queue)
    }

    fn read_queue(&self) -> Result<Vec<PendingChange>> {
        match self.inner.store.get(PENDING_CHANGES_KEY)? {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Ok(Vec::new()),
        }
    }

    fn write_queue(&self, queue: &[PendingChange]) -> Result<()> {
        let raw = serde_json::to_string(queue)?;
        self.inner.store.set(PENDING_CHANGES_KEY, &raw)
    }

    fn cached_goals(&self) -> Result<Option<Vec<Goal>>> {
        match self.inner.store.get(CACHED_GOALS_KEY)? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// Mutate the list and persist the snapshot while still holding
    /// the lock, so a stale snapshot never overwrites a newer one.
    fn with_goals<R>(&self, f: impl FnOnce(&mut Vec<Goal>) -> R) -> Result<R> {
        let result = {
            let mut goals = self.inner.goals.lock().unwrap();
            let result = f(&mut goals);
            let raw = serde_json::to_string(&*goals)?;
            self.inner.store.set(CACHED_GOALS_KEY, &raw)?;
            result
        };
        self.inner.sink.emit(DomainEvent::GoalsChanged);
        Ok(result)
    }

    fn replace_goal(&self, id: &str, server: Goal) -> Result<()> {
        self.with_goals(|goals| {
            if let Some(entry) = goals.iter_mut().find(|g| g.id == id) {
                *entry = server;
            }
        })
    }
}
