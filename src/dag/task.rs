// src/dag/task.rs

//! Load tasks: the owning handle over a scheduled batch of jobs and the
//! unit of cancellation.
//!
//! Lifecycle: a task is created by [`crate::AsyncLoader::make_task`],
//! submitted with [`LoadTask::schedule`], and either removed (canceling
//! whatever has not run yet) or detached (leaving its jobs to complete on
//! their own). Dropping a task that was neither detached nor removed
//! behaves like [`LoadTask::remove`].

use std::mem;
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::dag::job::LoadJob;
use crate::engine::loader::Shared;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TaskState {
    Created,
    Scheduled,
    Detached,
    Removed,
}

struct TaskInner {
    state: TaskState,
    jobs: Vec<Arc<LoadJob>>,
}

/// Owning handle over a set of jobs. Safe to share across threads; all
/// operations take `&self`.
pub struct LoadTask {
    shared: Arc<Shared>,
    inner: Mutex<TaskInner>,
}

impl LoadTask {
    pub(crate) fn new(shared: Arc<Shared>, jobs: Vec<Arc<LoadJob>>) -> Self {
        Self {
            shared,
            inner: Mutex::new(TaskInner {
                state: TaskState::Created,
                jobs,
            }),
        }
    }

    /// Submit the task's jobs to the loader.
    ///
    /// Fails with [`crate::LoadError::Cycle`] when the batch contains a
    /// dependency cycle, in which case nothing is scheduled and the task
    /// stays unscheduled.
    ///
    /// # Panics
    ///
    /// Panics if called more than once on the same task.
    pub fn schedule(&self) -> crate::errors::Result<()> {
        let mut inner = self.inner.lock().unwrap();
        assert_eq!(
            inner.state,
            TaskState::Created,
            "load task scheduled more than once"
        );
        self.shared.schedule(&inner.jobs)?;
        inner.state = TaskState::Scheduled;
        debug!(jobs = inner.jobs.len(), "load task scheduled");
        Ok(())
    }

    /// Absorb another task's jobs, transferring ownership. The merged task
    /// is left empty and detached, so dropping it is a no-op.
    pub fn merge(&self, other: LoadTask) {
        let mut absorbed = {
            let mut o = other.inner.lock().unwrap();
            o.state = TaskState::Detached;
            mem::take(&mut o.jobs)
        };
        let mut inner = self.inner.lock().unwrap();
        inner.jobs.append(&mut absorbed);
    }

    /// Cancel every member job that has not started executing, and block
    /// until executing members reach a terminal status. Executing jobs are
    /// not interrupted; one that returns normally still finishes OK.
    ///
    /// Idempotent: repeated calls (and the implicit call from `Drop`) do
    /// nothing further.
    pub fn remove(&self) {
        let jobs = {
            let mut inner = self.inner.lock().unwrap();
            if matches!(inner.state, TaskState::Removed | TaskState::Detached) {
                return;
            }
            inner.state = TaskState::Removed;
            mem::take(&mut inner.jobs)
        };
        self.shared.remove_jobs(&jobs);
    }

    /// Release the task's claim on its jobs: the task can be dropped
    /// without canceling them.
    pub fn detach(&self) {
        let mut inner = self.inner.lock().unwrap();
        if inner.state == TaskState::Removed {
            return;
        }
        inner.state = TaskState::Detached;
        inner.jobs.clear();
    }

    /// Snapshot of the member jobs.
    pub fn jobs(&self) -> Vec<Arc<LoadJob>> {
        self.inner.lock().unwrap().jobs.clone()
    }
}

impl Drop for LoadTask {
    fn drop(&mut self) {
        self.remove();
    }
}
