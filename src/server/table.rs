//! Slot arena holding every client connection.
//!
//! A connection is addressed by its token, the index of its slot. Slots are
//! allocated on first use and reused for later connections, up to the
//! configured ceiling.

use std::path::Path;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::warn;

use crate::http::connection::Connection;
use crate::server::poller::Poller;
use crate::server::pool::Task;
use crate::server::timer::TimerId;

/// Which thread is allowed to act on a connection.
///
/// A connection starts out owned by the reactor. The reactor hands it to a
/// worker when it queues the connection, and the worker hands it back
/// after re-arming its readiness. Because client descriptors are one-shot,
/// no readiness event can arrive for a connection while a worker owns it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Owner {
    Reactor = 0,
    Worker = 1,
}

/// A reusable connection slot.
///
/// The mutex is never contended while the ownership protocol is followed;
/// it exists so that the hand-off between threads is expressed in safe code.
#[derive(Debug)]
pub struct Slot {
    token: usize,
    owner: AtomicU8,
    conn: Mutex<Connection>,
    poller: Arc<Poller>,
}

impl Slot {
    fn new(token: usize, doc_root: Arc<Path>, poller: Arc<Poller>) -> Self {
        Self {
            token,
            owner: AtomicU8::new(Owner::Reactor as u8),
            conn: Mutex::new(Connection::new(doc_root)),
            poller,
        }
    }

    pub fn token(&self) -> usize {
        self.token
    }

    pub fn owner(&self) -> Owner {
        match self.owner.load(Ordering::Acquire) {
            0 => Owner::Reactor,
            _ => Owner::Worker,
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Marks the connection as owned by a worker. Reactor only.
    pub fn hand_to_worker(&self) {
        self.owner.store(Owner::Worker as u8, Ordering::Release);
    }

    /// Returns the connection to the reactor.
    pub fn hand_back(&self) {
        self.owner.store(Owner::Reactor as u8, Ordering::Release);
    }
}

impl Task for Slot {
    /// Processes the buffered request, re-arms the socket and hands the
    /// connection back, all while holding the connection so the reactor
    /// cannot close it halfway.
    fn run(&self) {
        let mut conn = self.lock();
        let interest = conn.process();

        if let Some(fd) = conn.raw_fd() {
            if let Err(e) = self.poller.rearm(fd, self.token, interest) {
                warn!(token = self.token, error = %e, "failed to re-arm connection");
            }
        }

        self.hand_back();
    }
}

#[derive(Debug)]
struct Entry {
    slot: Arc<Slot>,
    live: bool,
    timer: Option<TimerId>,
}

/// Every client connection, indexed by token.
///
/// Reactor-side bookkeeping (liveness, idle timer) is kept here rather
/// than in the [`Slot`], so workers never see it.
#[derive(Debug)]
pub struct ConnectionTable {
    entries: Vec<Entry>,
    free: Vec<usize>,
    capacity: usize,
    live: usize,
    doc_root: Arc<Path>,
    poller: Arc<Poller>,
}

impl ConnectionTable {
    pub fn new(capacity: usize, doc_root: Arc<Path>, poller: Arc<Poller>) -> Self {
        Self {
            entries: Vec::new(),
            free: Vec::new(),
            capacity,
            live: 0,
            doc_root,
            poller,
        }
    }

    /// Claims a free slot, returning its token.
    ///
    /// Returns `None` once `capacity` connections are live.
    pub fn insert(&mut self) -> Option<usize> {
        let token = match self.free.pop() {
            Some(token) => token,
            None if self.entries.len() < self.capacity => {
                let token = self.entries.len();
                self.entries.push(Entry {
                    slot: Arc::new(Slot::new(
                        token,
                        self.doc_root.clone(),
                        self.poller.clone(),
                    )),
                    live: false,
                    timer: None,
                });
                token
            }
            None => return None,
        };

        let entry = &mut self.entries[token];
        entry.live = true;
        entry.timer = None;
        self.live += 1;
        Some(token)
    }

    /// The slot behind a live token.
    pub fn get(&self, token: usize) -> Option<&Arc<Slot>> {
        self.entries
            .get(token)
            .filter(|e| e.live)
            .map(|e| &e.slot)
    }

    pub fn timer(&self, token: usize) -> Option<TimerId> {
        self.entries.get(token).filter(|e| e.live)?.timer
    }

    pub fn set_timer(&mut self, token: usize, timer: Option<TimerId>) {
        if let Some(entry) = self.entries.get_mut(token).filter(|e| e.live) {
            entry.timer = timer;
        }
    }

    /// Releases a token, returning its slot and the timer it still held.
    ///
    /// Returns `None` if the token was not live.
    pub fn remove(&mut self, token: usize) -> Option<(Arc<Slot>, Option<TimerId>)> {
        let entry = self.entries.get_mut(token).filter(|e| e.live)?;
        entry.live = false;
        let timer = entry.timer.take();
        let slot = entry.slot.clone();

        self.free.push(token);
        self.live -= 1;
        Some((slot, timer))
    }

    /// Tokens of every live connection.
    pub fn tokens(&self) -> Vec<usize> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.live)
            .map(|(token, _)| token)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
