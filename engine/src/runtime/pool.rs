//! Discovery worker pool
//!
//! Fixed-size pool of worker threads pulling discovery jobs from per-tenant
//! FIFO queues. Dispatch rotates round-robin across tenants so one tenant's
//! large graph cannot starve others. The pool owns no tenant data; jobs are
//! opaque closures that carry their own state.
//!
//! Backpressure is two-layered: the queue has a bounded total capacity
//! (`submit` reports saturation instead of queueing unboundedly), and the
//! tenant managers coalesce dirty sets so at most one discovery job per
//! tenant is ever pending.

use parking_lot::{Condvar, Mutex};
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::thread;
use thiserror::Error;
use tracing::{debug, trace};
use uuid::Uuid;

/// Default bound on jobs queued across all tenants
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PoolError {
    #[error("job queue is saturated")]
    Saturated,

    #[error("pool is shutting down")]
    ShuttingDown,
}

/// A unit of discovery work bound to one tenant
pub struct Job {
    pub id: Uuid,
    pub tenant: String,
    pub task: Box<dyn FnOnce() + Send + 'static>,
}

impl Job {
    pub fn new(tenant: String, task: Box<dyn FnOnce() + Send + 'static>) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant,
            task,
        }
    }
}

struct PoolState {
    queues: BTreeMap<String, VecDeque<Job>>,
    rotation: VecDeque<String>,
    queued: usize,
    in_flight: usize,
    capacity: usize,
    shutting_down: bool,
}

impl PoolState {
    /// Pop the next job, rotating across tenants
    fn pop_next(&mut self) -> Option<Job> {
        while let Some(tenant) = self.rotation.pop_front() {
            let Some(queue) = self.queues.get_mut(&tenant) else {
                continue;
            };
            let Some(job) = queue.pop_front() else {
                self.queues.remove(&tenant);
                continue;
            };
            if queue.is_empty() {
                self.queues.remove(&tenant);
            } else {
                self.rotation.push_back(tenant);
            }
            self.queued -= 1;
            return Some(job);
        }
        None
    }
}

struct PoolShared {
    state: Mutex<PoolState>,
    work_ready: Condvar,
    idle: Condvar,
}

/// Fixed-size worker pool with round-robin tenant fairness
pub struct WorkerPool {
    shared: Arc<PoolShared>,
    workers: Vec<thread::JoinHandle<()>>,
}

impl WorkerPool {
    /// Number of workers when not configured: hardware threads clamped to
    /// [2, 16]
    pub fn default_worker_count() -> usize {
        num_cpus::get().clamp(2, 16)
    }

    pub fn new(workers: usize, capacity: usize) -> Self {
        let shared = Arc::new(PoolShared {
            state: Mutex::new(PoolState {
                queues: BTreeMap::new(),
                rotation: VecDeque::new(),
                queued: 0,
                in_flight: 0,
                capacity,
                shutting_down: false,
            }),
            work_ready: Condvar::new(),
            idle: Condvar::new(),
        });

        let handles = (0..workers.max(1))
            .map(|n| {
                let shared = Arc::clone(&shared);
                thread::Builder::new()
                    .name(format!("discovery-worker-{}", n))
                    .spawn(move || worker_loop(shared))
                    .expect("spawning worker thread")
            })
            .collect();

        Self {
            shared,
            workers: handles,
        }
    }

    /// Enqueue a job for its tenant. Fails fast when the queue is full so
    /// the caller can coalesce instead of queueing unboundedly.
    pub fn submit(&self, job: Job) -> Result<(), PoolError> {
        let mut state = self.shared.state.lock();
        if state.shutting_down {
            return Err(PoolError::ShuttingDown);
        }
        if state.queued >= state.capacity {
            return Err(PoolError::Saturated);
        }
        trace!(job = %job.id, tenant = %job.tenant, "job queued");
        let tenant = job.tenant.clone();
        let had_queue = state.queues.contains_key(&tenant);
        state.queues.entry(tenant.clone()).or_default().push_back(job);
        if !had_queue {
            state.rotation.push_back(tenant);
        }
        state.queued += 1;
        drop(state);
        self.shared.work_ready.notify_one();
        Ok(())
    }

    pub fn queued(&self) -> usize {
        self.shared.state.lock().queued
    }

    /// Block until every queued job has been executed
    pub fn drain(&self) {
        let mut state = self.shared.state.lock();
        while state.queued > 0 || state.in_flight > 0 {
            self.shared.idle.wait(&mut state);
        }
    }

    /// Drain remaining jobs, then stop and join every worker
    pub fn shutdown(mut self) {
        self.drain();
        {
            let mut state = self.shared.state.lock();
            state.shutting_down = true;
        }
        self.shared.work_ready.notify_all();
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        {
            let mut state = self.shared.state.lock();
            state.shutting_down = true;
        }
        self.shared.work_ready.notify_all();
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}

fn worker_loop(shared: Arc<PoolShared>) {
    loop {
        let job = {
            let mut state = shared.state.lock();
            loop {
                if let Some(job) = state.pop_next() {
                    state.in_flight += 1;
                    break job;
                }
                if state.shutting_down {
                    return;
                }
                shared.work_ready.wait(&mut state);
            }
        };

        debug!(job = %job.id, tenant = %job.tenant, "discovery job started");
        (job.task)();
        debug!(job = %job.id, "discovery job finished");

        let mut state = shared.state.lock();
        state.in_flight -= 1;
        if state.queued == 0 && state.in_flight == 0 {
            shared.idle.notify_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn executes_submitted_jobs() {
        let pool = WorkerPool::new(2, 16);
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..8 {
            let counter = Arc::clone(&counter);
            pool.submit(Job::new(
                "t1".to_string(),
                Box::new(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                }),
            ))
            .unwrap();
        }
        pool.shutdown();
        assert_eq!(counter.load(Ordering::SeqCst), 8);
    }

    #[test]
    fn saturation_is_reported() {
        let pool = WorkerPool::new(1, 1);
        // block the single worker so the queue can fill
        let gate = Arc::new((Mutex::new(false), Condvar::new()));
        let worker_gate = Arc::clone(&gate);
        pool.submit(Job::new(
            "t1".to_string(),
            Box::new(move || {
                let (lock, cvar) = &*worker_gate;
                let mut open = lock.lock();
                while !*open {
                    cvar.wait(&mut open);
                }
            }),
        ))
        .unwrap();
        // wait until the worker picked the gate job up, then fill the queue
        while pool.queued() > 0 {
            std::thread::yield_now();
        }
        pool.submit(Job::new("t1".to_string(), Box::new(|| {}))).unwrap();
        let overflow = pool.submit(Job::new("t1".to_string(), Box::new(|| {})));
        assert_eq!(overflow.unwrap_err(), PoolError::Saturated);

        let (lock, cvar) = &*gate;
        *lock.lock() = true;
        cvar.notify_all();
        pool.shutdown();
    }

    #[test]
    fn round_robin_across_tenants() {
        // single worker: record execution order across two tenants
        let pool = WorkerPool::new(1, 16);
        let order = Arc::new(Mutex::new(Vec::new()));
        let gate = Arc::new((Mutex::new(false), Condvar::new()));

        let worker_gate = Arc::clone(&gate);
        pool.submit(Job::new(
            "gate".to_string(),
            Box::new(move || {
                let (lock, cvar) = &*worker_gate;
                let mut open = lock.lock();
                while !*open {
                    cvar.wait(&mut open);
                }
            }),
        ))
        .unwrap();

        for (tenant, tag) in [("a", "a1"), ("a", "a2"), ("b", "b1")] {
            let order = Arc::clone(&order);
            pool.submit(Job::new(
                tenant.to_string(),
                Box::new(move || order.lock().push(tag)),
            ))
            .unwrap();
        }

        let (lock, cvar) = &*gate;
        *lock.lock() = true;
        cvar.notify_all();
        pool.shutdown();

        // tenants alternate: a1, b1, a2
        assert_eq!(*order.lock(), vec!["a1", "b1", "a2"]);
    }
}
