//! Fixed-size worker pool fed by a bounded queue.
//!
//! The pool only queues shared references; it never copies the work
//! itself. Submission never blocks: a full queue is reported to the caller,
//! who decides what to do with the rejected task.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use tracing::debug;

use crate::error::PoolError;

/// Work that can be executed by a pool thread.
pub trait Task: Send + Sync + 'static {
    fn run(&self);
}

struct Queue<T> {
    tasks: VecDeque<Arc<T>>,
    stop: bool,
}

struct Shared<T> {
    queue: Mutex<Queue<T>>,
    available: Condvar,
    max_requests: usize,
}

impl<T> Shared<T> {
    fn lock(&self) -> MutexGuard<'_, Queue<T>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A set of long-lived threads draining a shared task queue.
///
/// Dropping the pool lets the workers finish every queued task, then joins
/// them.
pub struct WorkerPool<T: Task> {
    shared: Arc<Shared<T>>,
    workers: Vec<JoinHandle<()>>,
}

impl<T: Task> WorkerPool<T> {
    /// Starts `threads` workers sharing a queue of at most `max_requests`
    /// pending tasks.
    pub fn new(threads: usize, max_requests: usize) -> Result<Self, PoolError> {
        if threads == 0 {
            return Err(PoolError::NoWorkers);
        }
        if max_requests == 0 {
            return Err(PoolError::ZeroCapacity);
        }

        let shared = Arc::new(Shared {
            queue: Mutex::new(Queue {
                tasks: VecDeque::new(),
                stop: false,
            }),
            available: Condvar::new(),
            max_requests,
        });

        let mut pool = Self {
            shared,
            workers: Vec::with_capacity(threads),
        };

        for id in 0..threads {
            let shared = pool.shared.clone();
            // On failure `pool` is dropped here, which stops and joins the
            // workers already started.
            let handle = thread::Builder::new()
                .name(format!("lantern-worker-{id}"))
                .spawn(move || worker_loop(id, &shared))
                .map_err(PoolError::Spawn)?;
            pool.workers.push(handle);
        }

        Ok(pool)
    }

    /// Queues a task and wakes one worker.
    ///
    /// Fails with [`PoolError::QueueFull`] instead of waiting when the
    /// queue is at capacity.
    pub fn append(&self, task: Arc<T>) -> Result<(), PoolError> {
        let mut queue = self.shared.lock();
        if queue.tasks.len() >= self.shared.max_requests {
            return Err(PoolError::QueueFull);
        }

        queue.tasks.push_back(task);
        drop(queue);

        self.shared.available.notify_one();
        Ok(())
    }

    pub fn threads(&self) -> usize {
        self.workers.len()
    }

    /// Number of tasks waiting for a worker.
    pub fn pending(&self) -> usize {
        self.shared.lock().tasks.len()
    }
}

fn worker_loop<T: Task>(id: usize, shared: &Shared<T>) {
    debug!(worker = id, "worker started");

    loop {
        let task = {
            let mut queue = shared.lock();
            loop {
                if let Some(task) = queue.tasks.pop_front() {
                    break Some(task);
                }
                if queue.stop {
                    break None;
                }
                queue = shared
                    .available
                    .wait(queue)
                    .unwrap_or_else(PoisonError::into_inner);
            }
        };

        match task {
            Some(task) => task.run(),
            None => break,
        }
    }

    debug!(worker = id, "worker stopped");
}

impl<T: Task> Drop for WorkerPool<T> {
    fn drop(&mut self) {
        self.shared.lock().stop = true;
        self.shared.available.notify_all();

        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}
