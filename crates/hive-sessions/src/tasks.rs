//! Task execution tracking
//!
//! Long-running work (MCP tool calls, A2A tasks, workflows) runs on
//! spawned workers and is tracked here: monotone progress, results,
//! errors, and cooperative cancellation delivered over a watch channel
//! that executors poll at their checkpoints.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use hive_core::{ClockRef, ErrorKind, HiveError, HiveResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;
use uuid::Uuid;

/// What kind of work a task execution tracks.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    McpTool,
    A2aTask,
    Workflow,
}

/// Task lifecycle status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }
}

/// One progress observation. Events are totally ordered per task by
/// `seq`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub seq: u64,
    pub progress: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
    pub at: DateTime<Utc>,
}

/// Task execution record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskExecution {
    pub task_id: String,
    pub session_id: String,
    pub task_type: TaskType,
    pub name: String,
    pub parameters: Value,
    pub status: TaskStatus,
    pub progress: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<HiveError>,
    pub can_cancel: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancelled_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancellation_reason: Option<String>,
    pub events: Vec<ProgressEvent>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

/// Streaming tool-response frame kinds. A stream terminates with
/// `final` or `error`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StreamFrameKind {
    Progress,
    Partial,
    Final,
    Error,
}

/// One frame of a streaming tool response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamFrame {
    pub kind: StreamFrameKind,
    pub payload: Value,
}

impl StreamFrame {
    pub fn progress(payload: Value) -> Self {
        Self { kind: StreamFrameKind::Progress, payload }
    }
    pub fn partial(payload: Value) -> Self {
        Self { kind: StreamFrameKind::Partial, payload }
    }
    pub fn final_frame(payload: Value) -> Self {
        Self { kind: StreamFrameKind::Final, payload }
    }
    pub fn error(payload: Value) -> Self {
        Self { kind: StreamFrameKind::Error, payload }
    }

    /// Whether this frame terminates the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self.kind, StreamFrameKind::Final | StreamFrameKind::Error)
    }
}

/// Handle given to a task executor: progress reporting plus the
/// cooperative cancellation signal.
#[derive(Clone)]
pub struct TaskHandle {
    registry: Arc<TaskRegistry>,
    task_id: String,
    cancel_rx: watch::Receiver<bool>,
}

impl TaskHandle {
    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    /// Report progress. Fractions are clamped to [0, 1] and never move
    /// backwards.
    pub fn update_progress(&self, fraction: f64, stage: Option<&str>) {
        self.registry.update_progress(&self.task_id, fraction, stage);
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        *self.cancel_rx.borrow()
    }

    /// Cooperative checkpoint: fail fast when cancellation was
    /// requested. Call at chunk boundaries and before expensive steps.
    pub fn checkpoint(&self) -> HiveResult<()> {
        if self.is_cancelled() {
            Err(HiveError::new(ErrorKind::Conflict, "task cancelled").with_code("cancelled"))
        } else {
            Ok(())
        }
    }

    /// Future that resolves when cancellation is requested; for use in
    /// `tokio::select!` around provider calls.
    pub async fn cancelled(&self) {
        let mut rx = self.cancel_rx.clone();
        while !*rx.borrow() {
            if rx.changed().await.is_err() {
                // Registry dropped; treat as cancelled.
                return;
            }
        }
    }
}

/// Registry of task executions.
pub struct TaskRegistry {
    tasks: DashMap<String, TaskExecution>,
    cancels: DashMap<String, watch::Sender<bool>>,
    clock: ClockRef,
}

impl TaskRegistry {
    pub fn new(clock: ClockRef) -> Arc<Self> {
        Arc::new(Self {
            tasks: DashMap::new(),
            cancels: DashMap::new(),
            clock,
        })
    }

    /// Create a pending task record.
    pub fn create_task(
        &self,
        session_id: &str,
        task_type: TaskType,
        name: &str,
        parameters: Value,
    ) -> String {
        let task_id = Uuid::new_v4().to_string();
        let task = TaskExecution {
            task_id: task_id.clone(),
            session_id: session_id.to_string(),
            task_type,
            name: name.to_string(),
            parameters,
            status: TaskStatus::Pending,
            progress: 0.0,
            stage: None,
            result: None,
            error: None,
            can_cancel: true,
            cancelled_by: None,
            cancellation_reason: None,
            events: Vec::new(),
            created_at: self.clock.now(),
            started_at: None,
            completed_at: None,
        };
        self.tasks.insert(task_id.clone(), task);
        let (tx, _rx) = watch::channel(false);
        self.cancels.insert(task_id.clone(), tx);
        tracing::info!(task_id = %task_id, name, "task created");
        task_id
    }

    /// Run the executor for a task on a spawned worker. The executor's
    /// result finalizes the record unless the task was cancelled first.
    pub fn start<F, Fut>(self: &Arc<Self>, task_id: &str, executor: F) -> HiveResult<()>
    where
        F: FnOnce(TaskHandle) -> Fut + Send + 'static,
        Fut: Future<Output = HiveResult<Value>> + Send + 'static,
    {
        let cancel_rx = self
            .cancels
            .get(task_id)
            .map(|tx| tx.subscribe())
            .ok_or_else(|| HiveError::not_found(format!("task '{}'", task_id)))?;

        {
            let mut task = self
                .tasks
                .get_mut(task_id)
                .ok_or_else(|| HiveError::not_found(format!("task '{}'", task_id)))?;
            if task.status != TaskStatus::Pending {
                return Err(HiveError::conflict(format!(
                    "task '{}' already started",
                    task_id
                )));
            }
            task.status = TaskStatus::Running;
            task.started_at = Some(self.clock.now());
        }

        let handle = TaskHandle {
            registry: self.clone(),
            task_id: task_id.to_string(),
            cancel_rx,
        };
        let registry = self.clone();
        let task_id = task_id.to_string();
        tokio::spawn(async move {
            let result = executor(handle).await;
            match result {
                Ok(value) => registry.complete(&task_id, value),
                Err(err) => registry.fail(&task_id, err),
            }
        });
        Ok(())
    }

    /// Record progress for a task. Monotone non-decreasing per task.
    pub fn update_progress(&self, task_id: &str, fraction: f64, stage: Option<&str>) {
        let Some(mut task) = self.tasks.get_mut(task_id) else {
            return;
        };
        if task.status.is_terminal() {
            return;
        }
        let fraction = fraction.clamp(0.0, 1.0);
        if fraction < task.progress {
            tracing::warn!(task_id, fraction, current = task.progress, "ignoring progress regression");
            return;
        }
        task.progress = fraction;
        task.stage = stage.map(str::to_string);
        let seq = task.events.len() as u64;
        task.events.push(ProgressEvent {
            seq,
            progress: fraction,
            stage: stage.map(str::to_string),
            at: self.clock.now(),
        });
    }

    /// Finalize a task successfully. No-op when the task already
    /// reached a terminal state (e.g. cancelled mid-flight).
    pub fn complete(&self, task_id: &str, result: Value) {
        let Some(mut task) = self.tasks.get_mut(task_id) else {
            return;
        };
        if task.status.is_terminal() {
            return;
        }
        task.status = TaskStatus::Completed;
        task.progress = 1.0;
        task.result = Some(result);
        task.completed_at = Some(self.clock.now());
        tracing::info!(task_id, "task completed");
    }

    /// Finalize a task with an error. A task that was cancelled stays
    /// cancelled, even when the executor surfaces its abort as an
    /// error.
    pub fn fail(&self, task_id: &str, error: HiveError) {
        let Some(mut task) = self.tasks.get_mut(task_id) else {
            return;
        };
        if task.status.is_terminal() {
            return;
        }
        tracing::warn!(task_id, error = %error, "task failed");
        task.status = TaskStatus::Failed;
        task.error = Some(error);
        task.completed_at = Some(self.clock.now());
    }

    /// Request cancellation. Valid from pending or running when the
    /// task is cancellable; the executor is signalled and aborts at its
    /// next checkpoint. Idempotent: a second cancel is a no-op.
    pub fn cancel(&self, task_id: &str, by: &str, reason: &str) -> HiveResult<()> {
        let mut task = self
            .tasks
            .get_mut(task_id)
            .ok_or_else(|| HiveError::not_found(format!("task '{}'", task_id)))?;

        match task.status {
            TaskStatus::Cancelled => return Ok(()), // idempotent
            TaskStatus::Completed | TaskStatus::Failed => {
                return Err(HiveError::conflict(format!(
                    "task '{}' already finished",
                    task_id
                )));
            }
            TaskStatus::Pending | TaskStatus::Running => {}
        }
        if !task.can_cancel {
            return Err(HiveError::conflict(format!(
                "task '{}' is not cancellable",
                task_id
            )));
        }

        task.status = TaskStatus::Cancelled;
        task.cancelled_by = Some(by.to_string());
        task.cancellation_reason = Some(reason.to_string());
        task.completed_at = Some(self.clock.now());
        drop(task);

        if let Some(tx) = self.cancels.get(task_id) {
            let _ = tx.send(true);
        }
        tracing::info!(task_id, by, reason, "task cancelled");
        Ok(())
    }

    /// Task snapshot.
    pub fn get(&self, task_id: &str) -> Option<TaskExecution> {
        self.tasks.get(task_id).map(|t| t.clone())
    }

    /// Tasks belonging to one session, newest first.
    pub fn for_session(&self, session_id: &str) -> Vec<TaskExecution> {
        let mut out: Vec<TaskExecution> = self
            .tasks
            .iter()
            .filter(|t| t.session_id == session_id)
            .map(|t| t.clone())
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hive_core::system_clock;
    use serde_json::json;
    use std::time::Duration;

    fn registry() -> Arc<TaskRegistry> {
        TaskRegistry::new(system_clock())
    }

    #[tokio::test]
    async fn test_task_lifecycle() {
        let registry = registry();
        let task_id = registry.create_task("s1", TaskType::McpTool, "echo", json!({"x": 1}));
        assert_eq!(registry.get(&task_id).unwrap().status, TaskStatus::Pending);

        registry
            .start(&task_id, |handle| async move {
                handle.update_progress(0.5, Some("halfway"));
                Ok(json!({"ok": true}))
            })
            .unwrap();

        // Wait for the worker to finish.
        for _ in 0..100 {
            if registry.get(&task_id).unwrap().status.is_terminal() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let task = registry.get(&task_id).unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.progress, 1.0);
        assert_eq!(task.result, Some(json!({"ok": true})));
        assert!(task.started_at.is_some());
        assert!(task.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_progress_is_monotone() {
        let registry = registry();
        let task_id = registry.create_task("s1", TaskType::A2aTask, "work", json!({}));
        registry
            .tasks
            .get_mut(&task_id)
            .map(|mut t| t.status = TaskStatus::Running);

        registry.update_progress(&task_id, 0.2, None);
        registry.update_progress(&task_id, 0.7, Some("stage-2"));
        registry.update_progress(&task_id, 0.4, None); // regression ignored
        registry.update_progress(&task_id, 0.9, None);

        let task = registry.get(&task_id).unwrap();
        assert_eq!(task.progress, 0.9);
        let fractions: Vec<f64> = task.events.iter().map(|e| e.progress).collect();
        assert_eq!(fractions, vec![0.2, 0.7, 0.9]);
        // Events are totally ordered by seq.
        let seqs: Vec<u64> = task.events.iter().map(|e| e.seq).collect();
        assert_eq!(seqs, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_cancel_is_idempotent_single_transition() {
        let registry = registry();
        let task_id = registry.create_task("s1", TaskType::Workflow, "long", json!({}));

        registry.cancel(&task_id, "user", "no longer needed").unwrap();
        registry.cancel(&task_id, "user", "again").unwrap();

        let task = registry.get(&task_id).unwrap();
        assert_eq!(task.status, TaskStatus::Cancelled);
        // First cancellation wins; the second is a no-op.
        assert_eq!(task.cancellation_reason.as_deref(), Some("no longer needed"));
    }

    #[tokio::test]
    async fn test_cancelled_task_never_becomes_failed() {
        let registry = registry();
        let task_id = registry.create_task("s1", TaskType::A2aTask, "loop", json!({}));

        let started = Arc::new(tokio::sync::Notify::new());
        let started2 = started.clone();
        registry
            .start(&task_id, move |handle| async move {
                started2.notify_one();
                loop {
                    // Cooperative checkpoint surfaces the abort.
                    handle.checkpoint()?;
                    tokio::time::sleep(Duration::from_millis(5)).await;
                }
            })
            .unwrap();

        started.notified().await;
        registry.cancel(&task_id, "user", "abort").unwrap();

        for _ in 0..100 {
            tokio::time::sleep(Duration::from_millis(5)).await;
            if registry.get(&task_id).unwrap().status.is_terminal() {
                break;
            }
        }
        // The executor returned an error after the cancel, but the
        // record stays cancelled.
        assert_eq!(registry.get(&task_id).unwrap().status, TaskStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_cancel_finished_task_conflicts() {
        let registry = registry();
        let task_id = registry.create_task("s1", TaskType::McpTool, "quick", json!({}));
        registry
            .tasks
            .get_mut(&task_id)
            .map(|mut t| t.status = TaskStatus::Running);
        registry.complete(&task_id, json!(null));

        let err = registry.cancel(&task_id, "user", "too late").unwrap_err();
        assert_eq!(err.kind, hive_core::ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn test_cancelled_future_resolves() {
        let registry = registry();
        let task_id = registry.create_task("s1", TaskType::A2aTask, "wait", json!({}));

        let done = Arc::new(tokio::sync::Notify::new());
        let done2 = done.clone();
        registry
            .start(&task_id, move |handle| async move {
                handle.cancelled().await;
                done2.notify_one();
                Ok(json!(null))
            })
            .unwrap();

        tokio::time::sleep(Duration::from_millis(10)).await;
        registry.cancel(&task_id, "user", "stop").unwrap();
        tokio::time::timeout(Duration::from_secs(1), done.notified())
            .await
            .expect("executor observed cancellation");
    }

    #[test]
    fn test_stream_frame_terminality() {
        assert!(!StreamFrame::progress(json!({})).is_terminal());
        assert!(!StreamFrame::partial(json!({})).is_terminal());
        assert!(StreamFrame::final_frame(json!({})).is_terminal());
        assert!(StreamFrame::error(json!({})).is_terminal());
    }

    #[tokio::test]
    async fn test_for_session_listing() {
        let registry = registry();
        registry.create_task("s1", TaskType::McpTool, "a", json!({}));
        registry.create_task("s1", TaskType::McpTool, "b", json!({}));
        registry.create_task("s2", TaskType::McpTool, "c", json!({}));

        assert_eq!(registry.for_session("s1").len(), 2);
        assert_eq!(registry.for_session("s2").len(), 1);
    }
}
