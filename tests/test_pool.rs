use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use lantern::error::PoolError;
use lantern::server::pool::{Task, WorkerPool};

#[derive(Default)]
struct Counter {
    hits: AtomicUsize,
}

impl Task for Counter {
    fn run(&self) {
        self.hits.fetch_add(1, Ordering::SeqCst);
    }
}

/// Blocks every run until the gate is opened.
#[derive(Default)]
struct Gate {
    open: Mutex<bool>,
    opened: Condvar,
    started: AtomicUsize,
}

impl Gate {
    fn release(&self) {
        *self.open.lock().unwrap() = true;
        self.opened.notify_all();
    }
}

impl Task for Gate {
    fn run(&self) {
        self.started.fetch_add(1, Ordering::SeqCst);
        let mut open = self.open.lock().unwrap();
        while !*open {
            open = self.opened.wait(open).unwrap();
        }
    }
}

fn wait_until(cond: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !cond() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        thread::sleep(Duration::from_millis(1));
    }
}

#[test]
fn test_pool_runs_every_task() {
    let pool = WorkerPool::new(4, 1000).unwrap();
    let counter = Arc::new(Counter::default());

    for _ in 0..200 {
        pool.append(counter.clone()).unwrap();
    }

    drop(pool);
    assert_eq!(counter.hits.load(Ordering::SeqCst), 200);
}

#[test]
fn test_pool_thread_count() {
    let pool: WorkerPool<Counter> = WorkerPool::new(3, 10).unwrap();
    assert_eq!(pool.threads(), 3);
    assert_eq!(pool.pending(), 0);
}

#[test]
fn test_pool_rejects_invalid_sizes() {
    assert!(matches!(
        WorkerPool::<Counter>::new(0, 10),
        Err(PoolError::NoWorkers)
    ));
    assert!(matches!(
        WorkerPool::<Counter>::new(2, 0),
        Err(PoolError::ZeroCapacity)
    ));
}

#[test]
fn test_pool_append_fails_when_queue_full() {
    let pool = WorkerPool::new(1, 1).unwrap();
    let gate = Arc::new(Gate::default());

    pool.append(gate.clone()).unwrap();
    wait_until(|| gate.started.load(Ordering::SeqCst) == 1);
    assert_eq!(pool.pending(), 0);

    pool.append(gate.clone()).unwrap();
    assert_eq!(pool.pending(), 1);

    assert!(matches!(
        pool.append(gate.clone()),
        Err(PoolError::QueueFull)
    ));

    gate.release();
    drop(pool);
    assert_eq!(gate.started.load(Ordering::SeqCst), 2);
}

#[test]
fn test_pool_drop_drains_queue() {
    let pool = WorkerPool::new(1, 100).unwrap();
    let gate = Arc::new(Gate::default());

    for _ in 0..10 {
        pool.append(gate.clone()).unwrap();
    }

    gate.release();
    drop(pool);
    assert_eq!(gate.started.load(Ordering::SeqCst), 10);
}
