//! Task Manager (C9, spec §4.9).
//!
//! Tracks long-running delete-by-query jobs. Status transitions form a DAG:
//! running → {completed, failed, cancelled}. Cancellation is cooperative,
//! grounded on the teacher's `QueryTimeout`: a shared `AtomicBool` the task
//! polls between batches rather than a hard kill.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, TaskStatus::Running)
    }
}

/// A handle a long-running job polls to decide whether to keep going.
///
/// Cloning shares the same underlying flag and progress counters.
#[derive(Clone)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }
}

#[derive(Debug, Clone)]
pub struct TaskProgress {
    pub total: u64,
    pub deleted: u64,
    pub batches: u64,
}

struct TaskEntry {
    status: TaskStatus,
    progress: TaskProgress,
    cancelled: Arc<AtomicBool>,
    created_at: Instant,
    failure_reason: Option<String>,
}

pub struct TaskManager {
    tasks: RwLock<HashMap<String, TaskEntry>>,
}

impl TaskManager {
    pub fn new() -> Self {
        Self { tasks: RwLock::new(HashMap::new()) }
    }

    /// Registers a new running task and returns its id plus a cancellation
    /// token the caller should poll between batches.
    pub fn start(&self) -> (String, CancellationToken) {
        let id = uuid::Uuid::new_v4().to_string();
        let cancelled = Arc::new(AtomicBool::new(false));
        let entry = TaskEntry {
            status: TaskStatus::Running,
            progress: TaskProgress { total: 0, deleted: 0, batches: 0 },
            cancelled: Arc::clone(&cancelled),
            created_at: Instant::now(),
            failure_reason: None,
        };
        self.tasks.write().insert(id.clone(), entry);
        (id, CancellationToken { cancelled })
    }

    pub fn report_progress(&self, id: &str, progress: TaskProgress) -> Result<()> {
        let mut tasks = self.tasks.write();
        let entry = tasks.get_mut(id).ok_or_else(|| Error::TaskNotFound(id.to_string()))?;
        entry.progress = progress;
        Ok(())
    }

    pub fn complete(&self, id: &str) -> Result<()> {
        self.finish(id, TaskStatus::Completed, None)
    }

    pub fn fail(&self, id: &str, reason: String) -> Result<()> {
        self.finish(id, TaskStatus::Failed, Some(reason))
    }

    /// Requests cancellation of a running task; the task observes this on its
    /// next poll of the token and transitions itself to `Cancelled`.
    pub fn request_cancel(&self, id: &str) -> Result<()> {
        let tasks = self.tasks.read();
        let entry = tasks.get(id).ok_or_else(|| Error::TaskNotFound(id.to_string()))?;
        if entry.status.is_terminal() {
            return Err(Error::Cancelled(format!("task {id} is already in a terminal state")));
        }
        entry.cancelled.cancel();
        Ok(())
    }

    /// Called by the task itself once it observes the cancellation token set.
    pub fn mark_cancelled(&self, id: &str) -> Result<()> {
        self.finish(id, TaskStatus::Cancelled, None)
    }

    fn finish(&self, id: &str, status: TaskStatus, reason: Option<String>) -> Result<()> {
        let mut tasks = self.tasks.write();
        let entry = tasks.get_mut(id).ok_or_else(|| Error::TaskNotFound(id.to_string()))?;
        entry.status = status;
        entry.failure_reason = reason;
        Ok(())
    }

    pub fn status(&self, id: &str) -> Result<TaskStatus> {
        self.tasks.read().get(id).map(|e| e.status).ok_or_else(|| Error::TaskNotFound(id.to_string()))
    }

    pub fn snapshot(&self, id: &str) -> Result<TaskSnapshot> {
        let tasks = self.tasks.read();
        let entry = tasks.get(id).ok_or_else(|| Error::TaskNotFound(id.to_string()))?;
        Ok(TaskSnapshot {
            id: id.to_string(),
            status: entry.status,
            progress: entry.progress.clone(),
            running_time_ms: entry.created_at.elapsed().as_millis() as u64,
            failure_reason: entry.failure_reason.clone(),
        })
    }
}

impl Default for TaskManager {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone)]
pub struct TaskSnapshot {
    pub id: String,
    pub status: TaskStatus,
    pub progress: TaskProgress,
    pub running_time_ms: u64,
    pub failure_reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_task_starts_running() {
        let mgr = TaskManager::new();
        let (id, _token) = mgr.start();
        assert_eq!(mgr.status(&id).unwrap(), TaskStatus::Running);
    }

    #[test]
    fn complete_transitions_to_terminal_state() {
        let mgr = TaskManager::new();
        let (id, _token) = mgr.start();
        mgr.complete(&id).unwrap();
        assert_eq!(mgr.status(&id).unwrap(), TaskStatus::Completed);
    }

    #[test]
    fn request_cancel_sets_the_shared_token() {
        let mgr = TaskManager::new();
        let (id, token) = mgr.start();
        assert!(!token.is_cancelled());
        mgr.request_cancel(&id).unwrap();
        assert!(token.is_cancelled());
    }

    #[test]
    fn cancel_on_terminal_task_is_an_error() {
        let mgr = TaskManager::new();
        let (id, _token) = mgr.start();
        mgr.complete(&id).unwrap();
        assert!(mgr.request_cancel(&id).is_err());
    }

    #[test]
    fn cooperative_cancellation_marks_task_cancelled() {
        let mgr = TaskManager::new();
        let (id, token) = mgr.start();
        mgr.request_cancel(&id).unwrap();
        assert!(token.is_cancelled());
        mgr.mark_cancelled(&id).unwrap();
        assert_eq!(mgr.status(&id).unwrap(), TaskStatus::Cancelled);
    }

    #[test]
    fn progress_is_reported_and_visible_in_snapshot() {
        let mgr = TaskManager::new();
        let (id, _token) = mgr.start();
        mgr.report_progress(&id, TaskProgress { total: 100, deleted: 40, batches: 4 }).unwrap();
        let snapshot = mgr.snapshot(&id).unwrap();
        assert_eq!(snapshot.progress.deleted, 40);
    }

    #[test]
    fn unknown_task_id_is_not_found() {
        let mgr = TaskManager::new();
        assert!(matches!(mgr.status("missing").unwrap_err(), Error::TaskNotFound(_)));
    }
}
