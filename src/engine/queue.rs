// src/engine/queue.rs

//! Priority-ordered queue of jobs whose dependencies are all satisfied.
//!
//! Semantics:
//! - `pop_highest` always returns the job with the highest effective
//!   priority; within a priority level, jobs leave in arrival order (FIFO).
//! - `reprioritize` repositions a queued job after its effective priority
//!   was raised, keeping its original arrival sequence number so the FIFO
//!   order inside the new priority level still reflects when the job first
//!   became ready.
//!
//! The queue stores job ids only; the scheduler owns the jobs themselves.

use std::collections::{BTreeMap, HashMap};

/// Sort key: higher priority first, then earlier arrival first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ReadyKey {
    priority: i64,
    seq: u64,
}

impl Ord for ReadyKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        other
            .priority
            .cmp(&self.priority)
            .then(self.seq.cmp(&other.seq))
    }
}

impl PartialOrd for ReadyKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, Default)]
pub(crate) struct ReadyQueue {
    entries: BTreeMap<ReadyKey, u64>,
    keys: HashMap<u64, ReadyKey>,
    next_seq: u64,
}

impl ReadyQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a job at the given effective priority.
    pub fn push(&mut self, job_id: u64, priority: i64) {
        debug_assert!(!self.keys.contains_key(&job_id), "job already queued");
        let key = ReadyKey {
            priority,
            seq: self.next_seq,
        };
        self.next_seq += 1;
        self.keys.insert(job_id, key);
        self.entries.insert(key, job_id);
    }

    /// Dequeue the highest-priority job, or `None` when empty.
    pub fn pop_highest(&mut self) -> Option<u64> {
        let (_, job_id) = self.entries.pop_first()?;
        self.keys.remove(&job_id);
        Some(job_id)
    }

    /// Drop a queued job (e.g. it was canceled). Returns whether it was
    /// present.
    pub fn remove(&mut self, job_id: u64) -> bool {
        match self.keys.remove(&job_id) {
            Some(key) => {
                self.entries.remove(&key);
                true
            }
            None => false,
        }
    }

    /// Reposition a queued job whose effective priority increased. The
    /// arrival sequence number is preserved. Returns whether the job was
    /// present and moved.
    pub fn reprioritize(&mut self, job_id: u64, priority: i64) -> bool {
        let Some(key) = self.keys.get_mut(&job_id) else {
            return false;
        };
        if priority <= key.priority {
            return false;
        }
        let old = *key;
        key.priority = priority;
        let new = *key;
        self.entries.remove(&old);
        self.entries.insert(new, job_id);
        true
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
