// src/dag/graph.rs

//! Cycle detection over a submission batch.
//!
//! Submission is all-or-nothing: the loader walks the submitted jobs and
//! their transitive dependencies before registering anything, and rejects
//! the whole batch if a cycle is found. Jobs the scheduler already tracks
//! (and finished jobs) cannot take part in a new cycle, so the walk stops
//! at them.

use std::collections::HashMap;
use std::sync::Arc;

use crate::dag::job::LoadJob;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    /// On the current DFS path.
    OnPath,
    /// Fully explored, known cycle-free.
    Done,
}

struct Frame {
    job: Arc<LoadJob>,
    deps: Vec<Arc<LoadJob>>,
    next: usize,
}

impl Frame {
    fn new(job: &Arc<LoadJob>) -> Self {
        Self {
            job: Arc::clone(job),
            deps: job.dependencies(),
            next: 0,
        }
    }
}

/// Search the batch for a dependency cycle.
///
/// Returns the names of the jobs on the first cycle found, in path order
/// (only the jobs on the cycle, not the rest of the batch), or `None` when
/// the batch is acyclic. `skip` marks jobs that are already registered or
/// terminal; edges into them are ignored.
pub(crate) fn find_cycle<F>(jobs: &[Arc<LoadJob>], skip: F) -> Option<Vec<String>>
where
    F: Fn(&LoadJob) -> bool,
{
    let mut marks: HashMap<u64, Mark> = HashMap::new();

    for root in jobs {
        if marks.contains_key(&root.id()) || skip(root) {
            continue;
        }
        marks.insert(root.id(), Mark::OnPath);
        let mut stack = vec![Frame::new(root)];

        while let Some(top) = stack.last_mut() {
            if top.next < top.deps.len() {
                let dep = Arc::clone(&top.deps[top.next]);
                top.next += 1;
                if skip(&dep) {
                    continue;
                }
                match marks.get(&dep.id()) {
                    Some(Mark::OnPath) => {
                        // Back edge: the cycle is the path suffix starting
                        // at the first occurrence of `dep`.
                        let start = stack
                            .iter()
                            .position(|f| f.job.id() == dep.id())
                            .unwrap_or(0);
                        return Some(
                            stack[start..]
                                .iter()
                                .map(|f| f.job.name().to_string())
                                .collect(),
                        );
                    }
                    Some(Mark::Done) => {}
                    None => {
                        marks.insert(dep.id(), Mark::OnPath);
                        stack.push(Frame::new(&dep));
                    }
                }
            } else {
                marks.insert(top.job.id(), Mark::Done);
                stack.pop();
            }
        }
    }

    None
}
