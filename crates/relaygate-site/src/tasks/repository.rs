//! Bounded, TTL-evicting task queues keyed by relay.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use relaygate_core::config::TaskConfig;
use relaygate_core::db::DatabaseError;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use super::clock::Clock;
use super::model::{Task, TaskSpec, TaskStatus};
use crate::storage::SiteDatabase;

/// Queue limits, validated once at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskLimits {
    pub ttl_secs: i64,
    pub max_tasks_per_relay: usize,
    /// How long DONE/FAILED tasks stay retrievable after their transition.
    pub completed_retention_secs: i64,
}

impl From<&TaskConfig> for TaskLimits {
    fn from(config: &TaskConfig) -> Self {
        Self {
            ttl_secs: config.task_ttl_secs,
            max_tasks_per_relay: config.max_tasks_per_relay,
            completed_retention_secs: config.completed_retention_secs(),
        }
    }
}

impl TaskLimits {
    fn validate(&self) -> Result<(), TaskError> {
        if self.ttl_secs <= 0 {
            return Err(TaskError::Configuration(format!(
                "task ttl must be positive, got {}",
                self.ttl_secs
            )));
        }
        if self.max_tasks_per_relay < 1 {
            return Err(TaskError::Configuration(
                "max tasks per relay must be at least 1".to_string(),
            ));
        }
        if self.completed_retention_secs < 0 {
            return Err(TaskError::Configuration(format!(
                "completed task retention must not be negative, got {}",
                self.completed_retention_secs
            )));
        }
        Ok(())
    }
}

/// Tasks of a single relay in creation order.
#[derive(Debug, Default)]
struct RelayQueue {
    tasks: VecDeque<Task>,
}

impl RelayQueue {
    /// Drop expired pending tasks and terminal tasks past retention.
    fn purge(&mut self, now: i64, limits: &TaskLimits) -> usize {
        let before = self.tasks.len();
        self.tasks.retain(|task| match task.status {
            TaskStatus::Pending => now - task.created_at <= limits.ttl_secs,
            TaskStatus::Done | TaskStatus::Failed => {
                now - task.updated_at <= limits.completed_retention_secs
            }
        });
        before - self.tasks.len()
    }

    fn pending(&self) -> impl Iterator<Item = &Task> {
        self.tasks
            .iter()
            .filter(|task| task.status == TaskStatus::Pending)
    }
}

/// Owner of every relay's task queue.
///
/// The map lock is only held to find or insert a relay's queue; all task
/// mutation happens under that relay's own mutex.
#[derive(Debug)]
pub struct TasksRepository {
    db: SiteDatabase,
    queues: RwLock<HashMap<String, Arc<Mutex<RelayQueue>>>>,
    limits: TaskLimits,
    clock: Arc<dyn Clock>,
}

impl TasksRepository {
    pub fn new(
        db: SiteDatabase,
        limits: TaskLimits,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, TaskError> {
        limits.validate()?;
        Ok(Self {
            db,
            queues: RwLock::new(HashMap::new()),
            limits,
            clock,
        })
    }

    pub const fn limits(&self) -> &TaskLimits {
        &self.limits
    }

    /// Enqueue a PENDING task for a relay and return its id.
    pub async fn create_task(&self, relay_id: &str, spec: TaskSpec) -> Result<String, TaskError> {
        self.ensure_relay(relay_id).await?;

        let queue = self.queue_for(relay_id).await;
        let mut queue = queue.lock().await;
        // A removal may have completed between the first check and the lock.
        self.ensure_relay(relay_id).await?;

        let now = self.clock.now();
        queue.purge(now, &self.limits);

        let pending = queue.pending().count();
        if pending >= self.limits.max_tasks_per_relay {
            return Err(TaskError::QueueFull {
                relay_id: relay_id.to_string(),
                limit: self.limits.max_tasks_per_relay,
            });
        }

        let task = Task::new(relay_id, spec, now);
        let task_id = task.id.clone();
        queue.tasks.push_back(task);

        debug!(relay_id = %relay_id, task_id = %task_id, pending = pending + 1, "Task queued");
        Ok(task_id)
    }

    /// Pending, non-expired tasks of a relay, oldest first.
    ///
    /// Polling does not consume tasks; they stay pending until the relay
    /// reports a result or they expire.
    pub async fn get_tasks(&self, relay_id: &str) -> Result<Vec<Task>, TaskError> {
        self.ensure_relay(relay_id).await?;

        let Some(queue) = self.existing_queue(relay_id).await else {
            return Ok(Vec::new());
        };
        let mut queue = queue.lock().await;
        queue.purge(self.clock.now(), &self.limits);

        Ok(queue.pending().cloned().collect())
    }

    /// A task in any status, while it is retained.
    pub async fn get_task(&self, relay_id: &str, task_id: &str) -> Result<Task, TaskError> {
        let not_found = || TaskError::TaskNotFound {
            relay_id: relay_id.to_string(),
            task_id: task_id.to_string(),
        };

        let queue = self.existing_queue(relay_id).await.ok_or_else(not_found)?;
        let mut queue = queue.lock().await;
        queue.purge(self.clock.now(), &self.limits);

        queue
            .tasks
            .iter()
            .find(|task| task.id == task_id)
            .cloned()
            .ok_or_else(not_found)
    }

    /// Mark a pending task DONE with the relay's reported outcome.
    pub async fn complete_task(
        &self,
        relay_id: &str,
        task_id: &str,
        outcome: String,
    ) -> Result<Task, TaskError> {
        self.transition(relay_id, task_id, TaskStatus::Done, outcome)
            .await
    }

    /// Mark a pending task FAILED with the relay's reason.
    pub async fn fail_task(
        &self,
        relay_id: &str,
        task_id: &str,
        reason: String,
    ) -> Result<Task, TaskError> {
        self.transition(relay_id, task_id, TaskStatus::Failed, reason)
            .await
    }

    /// Drop every task of a relay. Returns the number of tasks removed.
    pub async fn purge_relay(&self, relay_id: &str) -> usize {
        let removed = self.queues.write().await.remove(relay_id);
        let Some(queue) = removed else {
            return 0;
        };

        let mut queue = queue.lock().await;
        let count = queue.tasks.len();
        queue.tasks.clear();

        if count > 0 {
            info!(relay_id = %relay_id, count, "Purged relay tasks");
        }
        count
    }

    /// Reclaim expired and retention-elapsed tasks across all relays.
    ///
    /// Queues left empty are dropped from the map. Returns the number of
    /// tasks reclaimed.
    pub async fn purge_expired(&self) -> usize {
        let snapshot: Vec<Arc<Mutex<RelayQueue>>> =
            self.queues.read().await.values().cloned().collect();

        let now = self.clock.now();
        let mut reclaimed = 0;
        for queue in snapshot {
            reclaimed += queue.lock().await.purge(now, &self.limits);
        }

        // A queue is only dropped when the map holds its sole handle; a
        // concurrent `create_task` may already own a clone it is about to fill.
        self.queues.write().await.retain(|_, queue| {
            Arc::strong_count(queue) > 1
                || queue
                    .try_lock()
                    .map_or(true, |queue| !queue.tasks.is_empty())
        });

        if reclaimed > 0 {
            info!(reclaimed, "Reclaimed expired tasks");
        }
        reclaimed
    }

    /// Number of relays with a live queue.
    pub async fn queue_count(&self) -> usize {
        self.queues.read().await.len()
    }

    async fn transition(
        &self,
        relay_id: &str,
        task_id: &str,
        status: TaskStatus,
        result: String,
    ) -> Result<Task, TaskError> {
        let not_found = || TaskError::TaskNotFound {
            relay_id: relay_id.to_string(),
            task_id: task_id.to_string(),
        };

        let queue = self.existing_queue(relay_id).await.ok_or_else(not_found)?;
        let mut queue = queue.lock().await;
        let now = self.clock.now();
        queue.purge(now, &self.limits);

        let task = queue
            .tasks
            .iter_mut()
            .find(|task| task.id == task_id)
            .ok_or_else(not_found)?;

        if task.status.is_terminal() {
            return Err(TaskError::NotPending {
                task_id: task_id.to_string(),
                status: task.status,
            });
        }

        task.status = status;
        task.updated_at = now;
        task.result = Some(result);

        info!(relay_id = %relay_id, task_id = %task_id, status = %status, "Task finished");
        Ok(task.clone())
    }

    async fn ensure_relay(&self, relay_id: &str) -> Result<(), TaskError> {
        if self.db.relay_exists(relay_id).await? {
            Ok(())
        } else {
            Err(TaskError::RelayNotFound(relay_id.to_string()))
        }
    }

    async fn existing_queue(&self, relay_id: &str) -> Option<Arc<Mutex<RelayQueue>>> {
        self.queues.read().await.get(relay_id).cloned()
    }

    async fn queue_for(&self, relay_id: &str) -> Arc<Mutex<RelayQueue>> {
        if let Some(queue) = self.existing_queue(relay_id).await {
            return queue;
        }
        Arc::clone(
            self.queues
                .write()
                .await
                .entry(relay_id.to_string())
                .or_default(),
        )
    }
}

/// Task queue errors.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("Invalid task queue configuration: {0}")]
    Configuration(String),

    #[error("Relay not found: {0}")]
    RelayNotFound(String),

    #[error("Task queue of relay {relay_id} is full ({limit} pending tasks)")]
    QueueFull { relay_id: String, limit: usize },

    #[error("Task {task_id} not found for relay {relay_id}")]
    TaskNotFound { relay_id: String, task_id: String },

    #[error("Task {task_id} is already {status}")]
    NotPending { task_id: String, status: TaskStatus },

    #[error("Storage error: {0}")]
    Storage(#[from] DatabaseError),
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::tasks::{ConfigSerial, ManualClock};

    const START: i64 = 1_700_000_000;

    fn limits(max: usize) -> TaskLimits {
        TaskLimits {
            ttl_secs: 120,
            max_tasks_per_relay: max,
            completed_retention_secs: 120,
        }
    }

    fn fetch() -> TaskSpec {
        TaskSpec::Fetch {
            payload: serde_json::json!({"host": "db01"}),
            timeout_secs: 30,
        }
    }

    async fn setup(max: usize) -> (TasksRepository, Arc<ManualClock>, SiteDatabase) {
        let db = SiteDatabase::open_in_memory().await.unwrap();
        db.create_relay("r1", "Relay One").await.unwrap();
        let clock = Arc::new(ManualClock::new(START));
        let repo = TasksRepository::new(db.clone(), limits(max), clock.clone()).unwrap();
        (repo, clock, db)
    }

    #[tokio::test]
    async fn invalid_limits_fail_fast() {
        let db = SiteDatabase::open_in_memory().await.unwrap();
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(START));

        let mut bad = limits(10);
        bad.ttl_secs = 0;
        assert!(matches!(
            TasksRepository::new(db.clone(), bad, clock.clone()),
            Err(TaskError::Configuration(_))
        ));

        assert!(matches!(
            TasksRepository::new(db, limits(0), clock),
            Err(TaskError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn create_for_unknown_relay_fails() {
        let (repo, _, _) = setup(10).await;
        let err = repo.create_task("ghost", fetch()).await.unwrap_err();
        assert!(matches!(err, TaskError::RelayNotFound(id) if id == "ghost"));
        assert!(matches!(
            repo.get_tasks("ghost").await,
            Err(TaskError::RelayNotFound(_))
        ));
    }

    #[tokio::test]
    async fn queue_full_after_max_tasks() {
        let (repo, _, _) = setup(3).await;
        for _ in 0..3 {
            repo.create_task("r1", fetch()).await.unwrap();
        }

        let err = repo.create_task("r1", fetch()).await.unwrap_err();
        assert!(matches!(err, TaskError::QueueFull { limit: 3, .. }));
        assert_eq!(repo.get_tasks("r1").await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn tasks_are_returned_oldest_first() {
        let (repo, clock, _) = setup(10).await;
        let first = repo.create_task("r1", fetch()).await.unwrap();
        clock.advance(1);
        let second = repo.create_task("r1", fetch()).await.unwrap();

        let ids: Vec<String> = repo
            .get_tasks("r1")
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.id)
            .collect();
        assert_eq!(ids, vec![first, second]);
    }

    #[tokio::test]
    async fn expired_tasks_are_never_returned() {
        let (repo, clock, _) = setup(10).await;
        repo.create_task("r1", fetch()).await.unwrap();

        clock.advance(120);
        assert_eq!(repo.get_tasks("r1").await.unwrap().len(), 1);

        clock.advance(1);
        assert!(repo.get_tasks("r1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn polling_is_idempotent() {
        let (repo, clock, _) = setup(10).await;
        repo.create_task("r1", fetch()).await.unwrap();
        clock.advance(60);
        repo.create_task("r1", fetch()).await.unwrap();
        clock.advance(61);

        let first = repo.get_tasks("r1").await.unwrap();
        let second = repo.get_tasks("r1").await.unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn expired_tasks_free_queue_capacity() {
        let (repo, clock, _) = setup(2).await;
        repo.create_task("r1", fetch()).await.unwrap();
        repo.create_task("r1", fetch()).await.unwrap();
        assert!(repo.create_task("r1", fetch()).await.is_err());

        clock.advance(121);
        repo.create_task("r1", fetch()).await.unwrap();
    }

    #[tokio::test]
    async fn completed_task_leaves_poll_and_capacity() {
        let (repo, _, _) = setup(1).await;
        let id = repo.create_task("r1", fetch()).await.unwrap();

        let done = repo
            .complete_task("r1", &id, "ok".to_string())
            .await
            .unwrap();
        assert_eq!(done.status, TaskStatus::Done);
        assert_eq!(done.result.as_deref(), Some("ok"));

        assert!(repo.get_tasks("r1").await.unwrap().is_empty());
        repo.create_task("r1", fetch()).await.unwrap();
    }

    #[tokio::test]
    async fn terminal_transition_cannot_repeat() {
        let (repo, _, _) = setup(10).await;
        let id = repo.create_task("r1", fetch()).await.unwrap();
        repo.fail_task("r1", &id, "timeout".to_string())
            .await
            .unwrap();

        let err = repo
            .complete_task("r1", &id, "late".to_string())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TaskError::NotPending { status: TaskStatus::Failed, .. }
        ));
    }

    #[tokio::test]
    async fn completing_unknown_or_expired_task_fails() {
        let (repo, clock, _) = setup(10).await;
        let err = repo
            .complete_task("r1", "nope", String::new())
            .await
            .unwrap_err();
        assert!(matches!(err, TaskError::TaskNotFound { .. }));

        let id = repo.create_task("r1", fetch()).await.unwrap();
        clock.advance(121);
        let err = repo
            .complete_task("r1", &id, String::new())
            .await
            .unwrap_err();
        assert!(matches!(err, TaskError::TaskNotFound { .. }));
    }

    #[tokio::test]
    async fn completion_is_scoped_to_the_owning_relay() {
        let (repo, _, db) = setup(10).await;
        db.create_relay("r2", "Relay Two").await.unwrap();
        let id = repo.create_task("r1", fetch()).await.unwrap();

        assert!(repo.complete_task("r2", &id, String::new()).await.is_err());
        assert_eq!(repo.get_task("r1", &id).await.unwrap().status, TaskStatus::Pending);
    }

    #[tokio::test]
    async fn terminal_tasks_are_retained_then_reclaimed() {
        let (repo, clock, _) = setup(10).await;
        let id = repo.create_task("r1", fetch()).await.unwrap();
        clock.advance(100);
        repo.complete_task("r1", &id, "ok".to_string())
            .await
            .unwrap();

        // Retention counts from the transition, not from creation.
        clock.advance(100);
        assert_eq!(repo.get_task("r1", &id).await.unwrap().status, TaskStatus::Done);

        clock.advance(21);
        assert!(matches!(
            repo.get_task("r1", &id).await,
            Err(TaskError::TaskNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn purge_relay_drops_everything() {
        let (repo, _, _) = setup(10).await;
        for _ in 0..3 {
            repo.create_task("r1", fetch()).await.unwrap();
        }

        assert_eq!(repo.purge_relay("r1").await, 3);
        assert!(repo.get_tasks("r1").await.unwrap().is_empty());
        assert_eq!(repo.purge_relay("r1").await, 0);
    }

    #[tokio::test]
    async fn no_task_survives_relay_removal() {
        let (repo, _, db) = setup(10).await;
        repo.create_task("r1", fetch()).await.unwrap();

        db.remove_relay("r1").await.unwrap();
        repo.purge_relay("r1").await;

        assert!(matches!(
            repo.create_task("r1", fetch()).await,
            Err(TaskError::RelayNotFound(_))
        ));
        assert_eq!(repo.queue_count().await, 0);
    }

    #[tokio::test]
    async fn sweep_reclaims_and_drops_empty_queues() {
        let (repo, clock, db) = setup(10).await;
        db.create_relay("r2", "Relay Two").await.unwrap();
        repo.create_task("r1", fetch()).await.unwrap();
        repo.create_task(
            "r2",
            TaskSpec::RelayConfig {
                serial: ConfigSerial::new("7"),
            },
        )
        .await
        .unwrap();
        clock.advance(60);
        repo.create_task("r2", fetch()).await.unwrap();
        assert_eq!(repo.queue_count().await, 2);

        clock.advance(61);
        assert_eq!(repo.purge_expired().await, 2);
        assert_eq!(repo.queue_count().await, 1);
        assert_eq!(repo.get_tasks("r2").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn sweep_keeps_queue_held_by_an_in_flight_create() {
        let (repo, clock, _) = setup(10).await;
        repo.create_task("r1", fetch()).await.unwrap();
        clock.advance(121);

        // Same handle create_task obtains before taking the queue lock.
        let handle = repo.queue_for("r1").await;
        assert_eq!(repo.purge_expired().await, 1);
        assert_eq!(repo.queue_count().await, 1);

        let task = Task::new("r1", fetch(), clock.now());
        let task_id = task.id.clone();
        handle.lock().await.tasks.push_back(task);
        drop(handle);

        let visible = repo.get_tasks("r1").await.unwrap();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].id, task_id);
    }

    #[tokio::test]
    async fn sweep_drops_empty_queue_once_unreferenced() {
        let (repo, clock, _) = setup(10).await;
        repo.create_task("r1", fetch()).await.unwrap();
        clock.advance(121);

        assert_eq!(repo.purge_expired().await, 1);
        assert_eq!(repo.queue_count().await, 0);
    }
}
