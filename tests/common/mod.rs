#![allow(dead_code)] // each test binary uses a different subset of helpers

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::Rng;
use tracing_subscriber::EnvFilter;

use loaddag::{AsyncLoader, Gauge, LoadJob, LoadTask};

/// Route `tracing` output through the test harness, so it only shows up for
/// failing tests (or with `-- --nocapture`). Directives come from `RUST_LOG`,
/// e.g. `RUST_LOG=loaddag=debug cargo test`. Safe to call from every test;
/// only the first call installs the subscriber.
pub fn init_tracing() {
    let directives = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(directives))
        .with_test_writer()
        .try_init();
}

/// A loader plus its metric gauges, the way the harness wires them.
pub struct TestLoader {
    pub loader: Arc<AsyncLoader>,
    pub total_threads: Gauge,
    pub active_threads: Gauge,
}

impl TestLoader {
    pub fn new(max_threads: usize) -> Self {
        init_tracing();
        let total_threads = Gauge::new();
        let active_threads = Gauge::new();
        let loader = Arc::new(AsyncLoader::new(
            total_threads.clone(),
            active_threads.clone(),
            max_threads,
            false,
        ));
        Self {
            loader,
            total_threads,
            active_threads,
        }
    }

    /// Bundle `jobs` into a task and schedule it.
    pub fn schedule(&self, jobs: Vec<Arc<LoadJob>>) -> LoadTask {
        let task = self.loader.make_task(jobs);
        task.schedule().expect("schedule failed");
        task
    }
}

/// Build a linear chain `prefix0 <- prefix1 <- ... <- prefixN-1`, every job
/// running the same function.
pub fn chain_jobs<F>(prefix: &str, count: usize, func: F) -> Vec<Arc<LoadJob>>
where
    F: Fn(&Arc<LoadJob>) -> anyhow::Result<()> + Clone + Send + 'static,
{
    let mut jobs: Vec<Arc<LoadJob>> = Vec::with_capacity(count);
    for i in 0..count {
        let deps = if i == 0 {
            vec![]
        } else {
            vec![jobs[i - 1].clone()]
        };
        let f = func.clone();
        jobs.push(LoadJob::new(format!("{prefix}{i}"), deps, move |j| f(j)));
    }
    jobs
}

/// Build a random DAG batch: job `j` may depend on any earlier job of the
/// batch (probability `dep_percent`), and on one random job from
/// `external` (same probability).
pub fn random_jobs<F>(
    rng: &mut StdRng,
    prefix: &str,
    count: usize,
    dep_percent: u32,
    external: &[Arc<LoadJob>],
    func: F,
) -> Vec<Arc<LoadJob>>
where
    F: Fn(&Arc<LoadJob>) -> anyhow::Result<()> + Clone + Send + 'static,
{
    let mut jobs: Vec<Arc<LoadJob>> = Vec::with_capacity(count);
    for j in 0..count {
        let mut deps = Vec::new();
        for dep in jobs.iter().take(j) {
            if rng.gen_range(0..100) < dep_percent {
                deps.push(dep.clone());
            }
        }
        if !external.is_empty() && rng.gen_range(0..100) < dep_percent {
            deps.push(external[rng.gen_range(0..external.len())].clone());
        }
        let f = func.clone();
        jobs.push(LoadJob::new(format!("{prefix}{j}"), deps, move |job| f(job)));
    }
    jobs
}

/// Sleep for a random few hundred microseconds with the given probability.
pub fn random_sleep_us(rng: &mut StdRng, min_us: u64, max_us: u64, percent: u32) {
    if rng.gen_range(0..100) < percent {
        let us = rng.gen_range(min_us..=max_us);
        std::thread::sleep(std::time::Duration::from_micros(us));
    }
}
