// src/engine/loader.rs

//! The loader: scheduler core plus worker pool.
//!
//! One mutex guards the whole scheduler state: the registry of pending and
//! executing jobs, the ready queue, and the dependency bookkeeping. Workers
//! take the mutex to claim a job and to record its completion, and release
//! it while the user function runs, so job functions are free to call back
//! into the loader (including [`AsyncLoader::prioritize`]) without
//! deadlocking.

use std::collections::HashMap;
use std::mem;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

use tracing::{debug, warn};

use crate::config::LoaderConfig;
use crate::dag::graph;
use crate::dag::job::{JobFunc, LoadJob, LoadStatus};
use crate::dag::task::LoadTask;
use crate::engine::queue::ReadyQueue;
use crate::errors::LoadError;
use crate::metrics::Gauge;

/// Scheduler-side metadata for a registered (pending or executing) job.
struct JobInfo {
    job: Arc<LoadJob>,
    /// Direct successors, by job id (the inverse of the dependency edges).
    successors: Vec<u64>,
    /// Dependencies that have not yet finished OK.
    deps_left: usize,
    /// Whether the job currently sits in the ready queue.
    is_ready: bool,
    /// Whether a worker is currently running the job function.
    is_executing: bool,
}

struct Inner {
    is_running: bool,
    max_threads: usize,
    /// Workers spawned and not yet retired.
    alive_workers: usize,
    /// Jobs currently inside their function. Never exceeds `max_threads`
    /// at dispatch time.
    executing: usize,
    scheduled: HashMap<u64, JobInfo>,
    ready: ReadyQueue,
    handles: Vec<JoinHandle<()>>,
    worker_seq: usize,
}

pub(crate) struct Shared {
    inner: Mutex<Inner>,
    /// Signaled when ready work may be dispatchable, an executing slot was
    /// freed, or workers must re-check their retirement condition.
    work_available: Condvar,
    total_threads: Gauge,
    active_threads: Gauge,
    log_failures: bool,
}

/// Dependency-aware, priority-scheduled job execution engine.
///
/// Jobs are bundled into [`LoadTask`]s and submitted via
/// [`LoadTask::schedule`]; the loader runs them on up to `max_threads`
/// worker threads, highest effective priority first, once their
/// dependencies have finished OK.
///
/// Dropping the loader stops the worker pool (joining the workers) but does
/// not cancel still-pending jobs; tasks keep their claim on those.
pub struct AsyncLoader {
    shared: Arc<Shared>,
}

impl AsyncLoader {
    /// Create a stopped loader.
    ///
    /// `total_threads` and `active_threads` are the host's metric counters
    /// for live workers and currently running job functions. When
    /// `log_failures` is set, every job failure is logged with the job name
    /// and the error message.
    pub fn new(
        total_threads: Gauge,
        active_threads: Gauge,
        max_threads: usize,
        log_failures: bool,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner {
                    is_running: false,
                    max_threads,
                    alive_workers: 0,
                    executing: 0,
                    scheduled: HashMap::new(),
                    ready: ReadyQueue::new(),
                    handles: Vec::new(),
                    worker_seq: 0,
                }),
                work_available: Condvar::new(),
                total_threads,
                active_threads,
                log_failures,
            }),
        }
    }

    /// Create a stopped loader from a validated [`LoaderConfig`].
    pub fn from_config(cfg: &LoaderConfig, total_threads: Gauge, active_threads: Gauge) -> Self {
        Self::new(total_threads, active_threads, cfg.max_threads, cfg.log_failures)
    }

    /// Bundle jobs into a task owned by this loader.
    pub fn make_task(&self, jobs: Vec<Arc<LoadJob>>) -> LoadTask {
        LoadTask::new(Arc::clone(&self.shared), jobs)
    }

    /// Spawn workers up to `max_threads` and begin executing ready jobs.
    /// Idempotent.
    pub fn start(&self) {
        let mut inner = self.shared.inner.lock().unwrap();
        if inner.is_running {
            return;
        }
        inner.is_running = true;
        debug!(max_threads = inner.max_threads, "loader starting");
        self.shared.spawn_workers_locked(&mut inner);
    }

    /// Request shutdown and join the workers.
    ///
    /// Executing jobs finish normally; pending jobs stay scheduled and
    /// resume on the next [`AsyncLoader::start`].
    pub fn stop(&self) {
        let handles = {
            let mut inner = self.shared.inner.lock().unwrap();
            inner.is_running = false;
            self.shared.work_available.notify_all();
            mem::take(&mut inner.handles)
        };
        for handle in handles {
            if handle.join().is_err() {
                warn!("worker thread panicked");
            }
        }
        debug!("loader stopped");
    }

    /// Block until every job that was scheduled before this call has
    /// reached a terminal status. Jobs submitted afterwards are not
    /// awaited.
    pub fn wait(&self) {
        let jobs: Vec<Arc<LoadJob>> = {
            let inner = self.shared.inner.lock().unwrap();
            inner.scheduled.values().map(|i| Arc::clone(&i.job)).collect()
        };
        for job in jobs {
            job.wait_done();
        }
    }

    /// Set a lower bound on the effective priority of `job` and,
    /// transitively, of every dependency that has not started executing
    /// yet. Queued jobs whose priority rises are repositioned before the
    /// next dequeue. Lowering a priority is a no-op.
    pub fn prioritize(&self, job: &Arc<LoadJob>, priority: i64) {
        let mut inner = self.shared.inner.lock().unwrap();
        Shared::prioritize_locked(&mut inner, job, priority);
    }

    /// Adjust the worker-count limit.
    ///
    /// Raising it spawns workers (when running) which start dispatching
    /// immediately; lowering it lets surplus workers retire on their next
    /// wake, after finishing their current job. Executing jobs are never
    /// interrupted.
    pub fn set_max_threads(&self, max_threads: usize) {
        let mut inner = self.shared.inner.lock().unwrap();
        debug!(
            from = inner.max_threads,
            to = max_threads,
            "adjusting worker-count limit"
        );
        inner.max_threads = max_threads;
        if inner.is_running && inner.alive_workers < max_threads {
            self.shared.spawn_workers_locked(&mut inner);
        }
        self.shared.work_available.notify_all();
    }

    /// Current worker-count limit.
    pub fn max_threads(&self) -> usize {
        self.shared.inner.lock().unwrap().max_threads
    }

    /// Number of registered jobs (pending or executing).
    pub fn scheduled_job_count(&self) -> usize {
        self.shared.inner.lock().unwrap().scheduled.len()
    }
}

impl Drop for AsyncLoader {
    fn drop(&mut self) {
        self.stop();
    }
}

impl Shared {
    /// Register a batch of jobs. All-or-nothing: a dependency cycle rejects
    /// the whole batch without mutating any scheduler state.
    pub(crate) fn schedule(&self, jobs: &[Arc<LoadJob>]) -> crate::errors::Result<()> {
        let mut inner = self.inner.lock().unwrap();

        if let Some(cycle) = graph::find_cycle(jobs, |j| {
            inner.scheduled.contains_key(&j.id()) || j.status().is_terminal()
        }) {
            let mut path: Vec<String> = cycle.iter().map(|n| format!("'{n}'")).collect();
            if let Some(first) = path.first().cloned() {
                path.push(first);
            }
            return Err(LoadError::Cycle(path.join(" -> ")));
        }

        // Register the batch.
        let mut batch: Vec<Arc<LoadJob>> = Vec::with_capacity(jobs.len());
        for job in jobs {
            if job.status().is_terminal() || inner.scheduled.contains_key(&job.id()) {
                warn!(job = %job.name(), "job already scheduled or finished; skipping");
                continue;
            }
            inner.scheduled.insert(
                job.id(),
                JobInfo {
                    job: Arc::clone(job),
                    successors: Vec::new(),
                    deps_left: 0,
                    is_ready: false,
                    is_executing: false,
                },
            );
            batch.push(Arc::clone(job));
        }
        debug!(jobs = batch.len(), "scheduled job batch");

        // Wire dependency edges; collect jobs that can never become ready.
        let mut doomed: Vec<(Arc<LoadJob>, LoadError)> = Vec::new();
        for job in &batch {
            let mut deps_left = 0;
            for dep in job.dependencies() {
                if let Some(dep_info) = inner.scheduled.get_mut(&dep.id()) {
                    dep_info.successors.push(job.id());
                    deps_left += 1;
                    continue;
                }
                match dep.status() {
                    LoadStatus::Ok => {}
                    LoadStatus::Failed | LoadStatus::Canceled => {
                        doomed.push((Arc::clone(job), chained_cancel(job, &dep)));
                    }
                    LoadStatus::Pending => {
                        doomed.push((
                            Arc::clone(job),
                            LoadError::Canceled {
                                name: job.name().to_string(),
                                message: format!(
                                    "dependency '{}' was never scheduled",
                                    dep.name()
                                ),
                            },
                        ));
                    }
                }
            }
            if let Some(info) = inner.scheduled.get_mut(&job.id()) {
                info.deps_left = deps_left;
            }
        }

        // Establish the priority invariant: every dependency runs at least
        // at the effective priority of each of its successors.
        for job in &batch {
            let priority = job.priority();
            for dep in job.dependencies() {
                Shared::prioritize_locked(&mut inner, &dep, priority);
            }
        }

        // Jobs whose dependencies already failed, were canceled, or were
        // never scheduled are canceled now; this propagates to their
        // in-batch successors.
        for (job, error) in doomed {
            if inner.scheduled.contains_key(&job.id()) {
                self.finish_locked(&mut inner, job.id(), LoadStatus::Canceled, Some(error));
            }
        }

        // Enqueue whatever is immediately ready.
        let ready: Vec<Arc<LoadJob>> = batch
            .iter()
            .filter(|job| {
                inner
                    .scheduled
                    .get(&job.id())
                    .map_or(false, |i| i.deps_left == 0)
            })
            .cloned()
            .collect();
        self.enqueue_batch(&mut inner, ready);

        Ok(())
    }

    /// Cancel the still-pending jobs of a removed task, then (outside the
    /// lock) wait for its executing jobs to finish. Executing jobs are not
    /// interrupted; a member that returns normally still finishes OK.
    pub(crate) fn remove_jobs(&self, jobs: &[Arc<LoadJob>]) {
        let executing: Vec<Arc<LoadJob>> = {
            let mut inner = self.inner.lock().unwrap();
            let mut executing = Vec::new();
            for job in jobs {
                // None: already finished, or never scheduled.
                let is_executing = inner.scheduled.get(&job.id()).map(|i| i.is_executing);
                match is_executing {
                    None => {}
                    Some(true) => executing.push(Arc::clone(job)),
                    Some(false) => {
                        debug!(job = %job.name(), "canceling pending job of removed task");
                        let error = LoadError::Canceled {
                            name: job.name().to_string(),
                            message: "owning task was removed before the job could run"
                                .to_string(),
                        };
                        self.finish_locked(
                            &mut inner,
                            job.id(),
                            LoadStatus::Canceled,
                            Some(error),
                        );
                    }
                }
            }
            executing
        };

        for job in executing {
            job.wait_done();
        }
    }

    /// Raise the effective priority of `job` and of its dependency closure
    /// to at least `priority`. Stops at jobs that already satisfy the bound,
    /// have started executing (their dependencies are all terminal), or are
    /// no longer registered.
    fn prioritize_locked(inner: &mut Inner, job: &Arc<LoadJob>, priority: i64) {
        let mut stack = vec![Arc::clone(job)];
        while let Some(j) = stack.pop() {
            if j.priority() >= priority {
                continue;
            }
            let Some(info) = inner.scheduled.get(&j.id()) else {
                continue;
            };
            j.raise_priority(priority);
            debug!(job = %j.name(), priority, "raised effective priority");
            if info.is_ready {
                inner.ready.reprioritize(j.id(), priority);
            }
            if !info.is_executing {
                stack.extend(j.dependencies());
            }
        }
    }

    /// Put a batch of now-ready jobs into the ready queue and wake workers.
    ///
    /// Jobs entering together are ordered by static priority; the queue's
    /// FIFO sequence numbers then keep that order under equal effective
    /// priorities.
    fn enqueue_batch(&self, inner: &mut Inner, mut jobs: Vec<Arc<LoadJob>>) {
        if jobs.is_empty() {
            return;
        }
        jobs.sort_by_key(|j| std::cmp::Reverse(j.static_priority()));
        for job in jobs {
            let Some(info) = inner.scheduled.get_mut(&job.id()) else {
                continue;
            };
            if info.is_ready || info.is_executing {
                continue;
            }
            info.is_ready = true;
            inner.ready.push(job.id(), job.priority());
            debug!(job = %job.name(), priority = job.priority(), "job ready");
        }
        self.work_available.notify_all();
    }

    /// Record a terminal status for a job and propagate: on success,
    /// dependents lose a pending dependency and may become ready; on
    /// failure or cancellation, every transitive successor is canceled with
    /// a message that embeds this job's error.
    fn finish_locked(
        &self,
        inner: &mut Inner,
        job_id: u64,
        status: LoadStatus,
        error: Option<LoadError>,
    ) {
        let mut worklist = vec![(job_id, status, error)];
        while let Some((id, status, error)) = worklist.pop() {
            let Some(info) = inner.scheduled.remove(&id) else {
                continue;
            };
            if info.is_ready {
                inner.ready.remove(id);
            }
            let cause = error.clone();
            info.job.finish(status, error);
            debug!(job = %info.job.name(), ?status, "load job finished");

            match status {
                LoadStatus::Ok => {
                    let mut newly_ready = Vec::new();
                    for succ_id in &info.successors {
                        if let Some(succ) = inner.scheduled.get_mut(succ_id) {
                            succ.deps_left -= 1;
                            if succ.deps_left == 0 {
                                newly_ready.push(Arc::clone(&succ.job));
                            }
                        }
                    }
                    self.enqueue_batch(inner, newly_ready);
                }
                LoadStatus::Failed | LoadStatus::Canceled => {
                    // Successors cannot be executing: a job only starts
                    // after every dependency finished OK.
                    for succ_id in &info.successors {
                        let Some(succ) = inner.scheduled.get(succ_id) else {
                            continue;
                        };
                        let message = match &cause {
                            Some(e) => {
                                format!("dependency '{}' was not loaded: {e}", info.job.name())
                            }
                            None => format!("dependency '{}' was not loaded", info.job.name()),
                        };
                        worklist.push((
                            *succ_id,
                            LoadStatus::Canceled,
                            Some(LoadError::Canceled {
                                name: succ.job.name().to_string(),
                                message,
                            }),
                        ));
                    }
                }
                LoadStatus::Pending => debug_assert!(false, "finish with non-terminal status"),
            }
        }
    }

    fn spawn_workers_locked(self: &Arc<Self>, inner: &mut Inner) {
        while inner.alive_workers < inner.max_threads {
            inner.alive_workers += 1;
            inner.worker_seq += 1;
            self.total_threads.increment();
            let shared = Arc::clone(self);
            let name = format!("loaddag-worker-{}", inner.worker_seq);
            match std::thread::Builder::new()
                .name(name)
                .spawn(move || shared.worker_loop())
            {
                Ok(handle) => inner.handles.push(handle),
                Err(err) => {
                    inner.alive_workers -= 1;
                    self.total_threads.decrement();
                    warn!(error = %err, "failed to spawn worker thread");
                    break;
                }
            }
        }
    }

    fn worker_loop(self: &Arc<Self>) {
        loop {
            // Claim the highest-priority ready job, or retire.
            let job = {
                let mut inner = self.inner.lock().unwrap();
                loop {
                    if !inner.is_running || inner.alive_workers > inner.max_threads {
                        inner.alive_workers -= 1;
                        self.total_threads.decrement();
                        debug!("worker retiring");
                        return;
                    }
                    if inner.executing < inner.max_threads {
                        if let Some(id) = inner.ready.pop_highest() {
                            match inner.scheduled.get_mut(&id) {
                                Some(info) => {
                                    info.is_ready = false;
                                    info.is_executing = true;
                                    let job = Arc::clone(&info.job);
                                    inner.executing += 1;
                                    break job;
                                }
                                None => {
                                    warn!(job_id = id, "ready queue held an unregistered job");
                                    continue;
                                }
                            }
                        }
                    }
                    inner = self.work_available.wait(inner).unwrap();
                }
            };

            self.active_threads.increment();
            let result = run_job(&job);
            self.active_threads.decrement();

            if self.log_failures {
                if let Err(err) = &result {
                    warn!(job = %job.name(), error = %err, "load job failed");
                }
            }

            let mut inner = self.inner.lock().unwrap();
            inner.executing -= 1;
            match result {
                Ok(()) => self.finish_locked(&mut inner, job.id(), LoadStatus::Ok, None),
                Err(err) => {
                    let error = LoadError::Failed {
                        name: job.name().to_string(),
                        message: format!("{err:#}"),
                    };
                    self.finish_locked(&mut inner, job.id(), LoadStatus::Failed, Some(error));
                }
            }
            // Freeing the executing slot may unblock a queued dispatch.
            self.work_available.notify_one();
        }
    }
}

/// Run the user function, containing panics. The caller reacquires the
/// scheduler lock afterwards to record the outcome.
fn run_job(job: &Arc<LoadJob>) -> anyhow::Result<()> {
    let func: JobFunc = match job.take_func() {
        Some(func) => func,
        None => {
            warn!(job = %job.name(), "job had no function at dispatch; treating as no-op");
            return Ok(());
        }
    };
    match catch_unwind(AssertUnwindSafe(|| func(job))) {
        Ok(result) => result,
        Err(panic) => Err(anyhow::anyhow!("job panicked: {}", panic_message(&*panic))),
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

fn chained_cancel(job: &Arc<LoadJob>, dep: &Arc<LoadJob>) -> LoadError {
    let message = match dep.error() {
        Some(e) => format!("dependency '{}' was not loaded: {e}", dep.name()),
        None => format!("dependency '{}' was not loaded", dep.name()),
    };
    LoadError::Canceled {
        name: job.name().to_string(),
        message,
    }
}
