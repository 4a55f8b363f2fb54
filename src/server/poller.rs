//! Linux `epoll` readiness poller.
//!
//! Client sockets are registered edge-triggered and one-shot: after an
//! event is delivered the descriptor is disabled until it is explicitly
//! re-armed with [`Poller::rearm`]. Only the thread that currently owns a
//! connection re-arms it, so a connection never has two events in flight.
//!
//! `epoll_ctl` is safe to call concurrently with `epoll_wait`, which lets
//! worker threads re-arm connections while the reactor is waiting.

use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::time::Duration;

use libc::{
    EPOLL_CLOEXEC, EPOLL_CTL_ADD, EPOLL_CTL_DEL, EPOLL_CTL_MOD, EPOLLERR, EPOLLET, EPOLLHUP,
    EPOLLIN, EPOLLONESHOT, EPOLLOUT, EPOLLRDHUP, epoll_create1, epoll_ctl, epoll_event,
    epoll_wait,
};

/// Readiness a descriptor is waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interest {
    Read,
    Write,
}

impl Interest {
    fn bits(self) -> u32 {
        match self {
            Interest::Read => EPOLLIN as u32,
            Interest::Write => EPOLLOUT as u32,
        }
    }
}

/// How a descriptor is registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Fires on every edge; used for the listener and the notify channel.
    Edge,
    /// Fires once, then stays disabled until re-armed; used for clients.
    OneShot,
}

/// A readiness event for one registered descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event {
    /// Token the descriptor was registered with.
    pub token: usize,
    pub readable: bool,
    pub writable: bool,
    /// Error, hangup, or the peer shut down its writing half.
    pub hangup: bool,
}

/// Reusable buffer for events returned by [`Poller::wait`].
pub struct Events {
    inner: Vec<epoll_event>,
}

impl Events {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Vec::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = Event> + '_ {
        self.inner.iter().map(|ev| {
            let bits = ev.events;
            Event {
                token: ev.u64 as usize,
                readable: bits & EPOLLIN as u32 != 0,
                writable: bits & EPOLLOUT as u32 != 0,
                hangup: bits & (EPOLLRDHUP | EPOLLHUP | EPOLLERR) as u32 != 0,
            }
        })
    }
}

/// Owner of an `epoll` instance.
#[derive(Debug)]
pub struct Poller {
    epoll: OwnedFd,
}

impl Poller {
    pub fn new() -> io::Result<Self> {
        let fd = unsafe { epoll_create1(EPOLL_CLOEXEC) };
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }

        Ok(Self {
            epoll: unsafe { OwnedFd::from_raw_fd(fd) },
        })
    }

    /// Starts watching `fd` for `interest`.
    pub fn add(&self, fd: RawFd, token: usize, interest: Interest, mode: Mode) -> io::Result<()> {
        let mut flags = interest.bits() | (EPOLLET | EPOLLRDHUP) as u32;
        if mode == Mode::OneShot {
            flags |= EPOLLONESHOT as u32;
        }
        self.ctl(EPOLL_CTL_ADD, fd, token, flags)
    }

    /// Re-enables a one-shot descriptor for its next event.
    pub fn rearm(&self, fd: RawFd, token: usize, interest: Interest) -> io::Result<()> {
        let flags = interest.bits() | (EPOLLET | EPOLLRDHUP | EPOLLONESHOT) as u32;
        self.ctl(EPOLL_CTL_MOD, fd, token, flags)
    }

    /// Stops watching `fd`.
    pub fn delete(&self, fd: RawFd) -> io::Result<()> {
        let rc = unsafe {
            epoll_ctl(
                self.epoll.as_raw_fd(),
                EPOLL_CTL_DEL,
                fd,
                std::ptr::null_mut(),
            )
        };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    fn ctl(&self, op: i32, fd: RawFd, token: usize, flags: u32) -> io::Result<()> {
        let mut event = epoll_event {
            events: flags,
            u64: token as u64,
        };

        let rc = unsafe { epoll_ctl(self.epoll.as_raw_fd(), op, fd, &mut event) };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    /// Blocks until at least one descriptor is ready or `timeout` elapses.
    ///
    /// An interrupted wait returns with no events.
    pub fn wait(&self, events: &mut Events, timeout: Option<Duration>) -> io::Result<usize> {
        let timeout_ms = timeout
            .map(|t| t.as_millis().min(i32::MAX as u128) as i32)
            .unwrap_or(-1);
        let capacity = events.inner.capacity().max(1);
        events.inner.clear();
        events.inner.reserve(capacity);

        let n = unsafe {
            epoll_wait(
                self.epoll.as_raw_fd(),
                events.inner.as_mut_ptr(),
                capacity as i32,
                timeout_ms,
            )
        };

        if n < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(0);
            }
            return Err(err);
        }

        // SAFETY: epoll_wait initialized the first `n` entries.
        unsafe { events.inner.set_len(n as usize) };
        Ok(n as usize)
    }
}
