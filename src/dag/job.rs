// src/dag/job.rs

//! Load jobs: the nodes of the dependency graph.
//!
//! A [`LoadJob`] carries a user function, a fixed set of dependencies, a
//! status, and an effective priority. Jobs are created up front, bundled in
//! a [`crate::LoadTask`], and executed by the loader once every dependency
//! has finished OK. The job itself does not run anything; it only exposes
//! its state to waiters.

use std::collections::HashSet;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};

use crate::errors::LoadError;

/// Lifecycle status of a [`LoadJob`].
///
/// The only transitions are `Pending -> Ok | Failed | Canceled`; the three
/// terminal states are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStatus {
    /// Not finished yet (waiting on dependencies, queued, or executing).
    Pending,
    /// The job function returned successfully.
    Ok,
    /// The job function returned an error or panicked.
    Failed,
    /// The job was canceled before it could run.
    Canceled,
}

impl LoadStatus {
    /// True for `Ok`, `Failed` and `Canceled`.
    pub fn is_terminal(self) -> bool {
        self != LoadStatus::Pending
    }
}

/// The user function executed by a worker.
///
/// It receives the job itself so it can observe its own name and effective
/// priority at the moment of execution.
pub type JobFunc = Box<dyn FnOnce(&Arc<LoadJob>) -> anyhow::Result<()> + Send>;

static NEXT_JOB_ID: AtomicU64 = AtomicU64::new(1);

struct JobState {
    status: LoadStatus,
    error: Option<LoadError>,
    waiters: usize,
}

/// A single unit of work with a user function, dependencies, status and
/// priority.
///
/// `status`, `priority` and `waiters_count` are safe to call from any thread
/// without external synchronization.
pub struct LoadJob {
    id: u64,
    name: String,
    static_priority: i64,
    /// Effective priority: monotonically raised, read outside any lock.
    priority: AtomicI64,
    /// Dependencies, normally fixed at construction. `add_dependency` may
    /// extend this before the job is scheduled.
    deps: Mutex<Vec<Arc<LoadJob>>>,
    func: Mutex<Option<JobFunc>>,
    state: Mutex<JobState>,
    finished: Condvar,
}

impl LoadJob {
    /// Create a job with static priority 0.
    pub fn new<F>(name: impl Into<String>, deps: Vec<Arc<LoadJob>>, func: F) -> Arc<LoadJob>
    where
        F: FnOnce(&Arc<LoadJob>) -> anyhow::Result<()> + Send + 'static,
    {
        Self::with_priority(name, deps, 0, func)
    }

    /// Create a job with an explicit static priority (higher runs earlier).
    pub fn with_priority<F>(
        name: impl Into<String>,
        deps: Vec<Arc<LoadJob>>,
        priority: i64,
        func: F,
    ) -> Arc<LoadJob>
    where
        F: FnOnce(&Arc<LoadJob>) -> anyhow::Result<()> + Send + 'static,
    {
        let name = name.into();
        debug_assert!(!name.is_empty(), "load job name must be non-empty");
        Arc::new(LoadJob {
            id: NEXT_JOB_ID.fetch_add(1, Ordering::Relaxed),
            name,
            static_priority: priority,
            priority: AtomicI64::new(priority),
            deps: Mutex::new(dedup_by_id(deps)),
            func: Mutex::new(Some(Box::new(func))),
            state: Mutex::new(JobState {
                status: LoadStatus::Pending,
                error: None,
                waiters: 0,
            }),
            finished: Condvar::new(),
        })
    }

    /// Stable integer identity of this job.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The priority supplied at construction; the floor for the effective
    /// priority.
    pub fn static_priority(&self) -> i64 {
        self.static_priority
    }

    /// Current effective priority.
    pub fn priority(&self) -> i64 {
        self.priority.load(Ordering::Acquire)
    }

    /// Current status.
    pub fn status(&self) -> LoadStatus {
        self.state.lock().unwrap().status
    }

    /// Number of threads currently blocked in [`LoadJob::wait`] (or in
    /// `LoadTask::remove` / `AsyncLoader::wait`) on this job.
    pub fn waiters_count(&self) -> usize {
        self.state.lock().unwrap().waiters
    }

    /// Snapshot of the dependency list.
    pub fn dependencies(&self) -> Vec<Arc<LoadJob>> {
        self.deps.lock().unwrap().clone()
    }

    /// Append a dependency while building a graph incrementally.
    ///
    /// Only valid before the job is scheduled; mutating the dependencies of
    /// an already scheduled job is unsupported and the scheduler will not
    /// observe the new edge.
    pub fn add_dependency(&self, dep: Arc<LoadJob>) {
        let mut deps = self.deps.lock().unwrap();
        if !deps.iter().any(|d| d.id == dep.id) {
            deps.push(dep);
        }
    }

    /// Block until the job reaches a terminal status.
    ///
    /// Returns `Ok(())` when the job finished OK; re-raises the recorded
    /// [`LoadError`] when it failed or was canceled.
    pub fn wait(&self) -> crate::errors::Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.status == LoadStatus::Pending {
            state.waiters += 1;
            while state.status == LoadStatus::Pending {
                state = self.finished.wait(state).unwrap();
            }
            state.waiters -= 1;
        }
        match (&state.status, &state.error) {
            (LoadStatus::Ok, _) => Ok(()),
            (_, Some(error)) => Err(error.clone()),
            // A terminal non-OK status always carries an error; keep the
            // waiter contract even if that invariant is ever broken.
            (status, None) => Err(LoadError::Canceled {
                name: self.name.clone(),
                message: format!("finished as {status:?} without a recorded error"),
            }),
        }
    }

    /// Like [`LoadJob::wait`], ignoring the outcome. Still counted in
    /// `waiters_count`.
    pub(crate) fn wait_done(&self) {
        let mut state = self.state.lock().unwrap();
        if state.status == LoadStatus::Pending {
            state.waiters += 1;
            while state.status == LoadStatus::Pending {
                state = self.finished.wait(state).unwrap();
            }
            state.waiters -= 1;
        }
    }

    /// The recorded error, if any.
    pub(crate) fn error(&self) -> Option<LoadError> {
        self.state.lock().unwrap().error.clone()
    }

    /// Raise the effective priority to at least `priority`.
    pub(crate) fn raise_priority(&self, priority: i64) {
        self.priority.fetch_max(priority, Ordering::AcqRel);
    }

    /// Take the user function for execution. Returns `None` if it was
    /// already taken (the job is dispatched at most once).
    pub(crate) fn take_func(&self) -> Option<JobFunc> {
        self.func.lock().unwrap().take()
    }

    /// Record the terminal status and wake every waiter. The status and the
    /// error become observable atomically together.
    pub(crate) fn finish(&self, status: LoadStatus, error: Option<LoadError>) {
        debug_assert!(status.is_terminal());
        let mut state = self.state.lock().unwrap();
        debug_assert_eq!(state.status, LoadStatus::Pending);
        state.status = status;
        state.error = error;
        self.finished.notify_all();
    }
}

impl std::fmt::Debug for LoadJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadJob")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("status", &self.status())
            .field("priority", &self.priority())
            .finish()
    }
}

fn dedup_by_id(deps: Vec<Arc<LoadJob>>) -> Vec<Arc<LoadJob>> {
    let mut seen = HashSet::new();
    deps.into_iter().filter(|d| seen.insert(d.id)).collect()
}
