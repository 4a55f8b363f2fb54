//! Notification side-channel into the reactor.
//!
//! Asynchronous events (the periodic timer tick and termination requests)
//! reach the reactor as single tag bytes written into a Unix socket pair.
//! The reactor watches the read end like any other descriptor, so every
//! decision is taken on the reactor thread. Process signals are picked up
//! by a `signal-hook` iterator thread and forwarded as tags.

use std::io::{self, Read, Write};
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::net::UnixStream;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::iterator::{Handle, Signals};

/// An event delivered through the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// The timer interval elapsed; expire idle connections.
    Tick,
    /// Stop the server after the current batch of events.
    Terminate,
}

impl Signal {
    fn tag(self) -> u8 {
        match self {
            Signal::Tick => libc::SIGALRM as u8,
            Signal::Terminate => libc::SIGTERM as u8,
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag as libc::c_int {
            libc::SIGALRM => Some(Signal::Tick),
            libc::SIGTERM | libc::SIGINT => Some(Signal::Terminate),
            _ => None,
        }
    }
}

/// Creates a connected notifier/receiver pair.
pub fn channel() -> io::Result<(Notifier, Receiver)> {
    let (tx, rx) = UnixStream::pair()?;
    tx.set_nonblocking(true)?;
    rx.set_nonblocking(true)?;

    Ok((Notifier { tx: Arc::new(tx) }, Receiver { rx }))
}

/// Sending half. Cheap to clone and usable from any thread.
#[derive(Debug, Clone)]
pub struct Notifier {
    tx: Arc<UnixStream>,
}

impl Notifier {
    pub fn send(&self, signal: Signal) -> io::Result<()> {
        match (&*self.tx).write(&[signal.tag()]) {
            Ok(_) => Ok(()),
            // The reactor is already behind on reading tags, so it will
            // wake up regardless.
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(()),
            Err(e) => Err(e),
        }
    }
}

/// Receiving half, owned by the reactor.
#[derive(Debug)]
pub struct Receiver {
    rx: UnixStream,
}

impl Receiver {
    pub fn raw_fd(&self) -> RawFd {
        self.rx.as_raw_fd()
    }

    /// Reads every queued tag and appends the decoded signals to `out`.
    pub fn drain(&mut self, out: &mut Vec<Signal>) -> io::Result<()> {
        let mut buf = [0u8; 1024];

        loop {
            match self.rx.read(&mut buf) {
                Ok(0) => return Ok(()),
                Ok(n) => out.extend(buf[..n].iter().filter_map(|&tag| Signal::from_tag(tag))),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(()),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }
}

/// Forwards SIGTERM and SIGINT into the channel while alive.
///
/// Dropping the guard closes the signal iterator and joins its thread.
#[derive(Debug)]
pub struct SignalGuard {
    handle: Handle,
    thread: Option<JoinHandle<()>>,
}

impl Drop for SignalGuard {
    fn drop(&mut self) {
        self.handle.close();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

/// Routes SIGTERM and SIGINT into the channel as [`Signal::Terminate`].
pub fn install_handlers(notifier: &Notifier) -> io::Result<SignalGuard> {
    let mut signals = Signals::new([SIGTERM, SIGINT])?;
    let handle = signals.handle();
    let notifier = notifier.clone();

    let thread = thread::Builder::new()
        .name("lantern-signals".into())
        .spawn(move || {
            for sig in signals.forever() {
                tracing::info!(signal = sig, "received termination signal");
                if let Err(e) = notifier.send(Signal::Terminate) {
                    tracing::warn!(error = %e, "failed to forward signal");
                    break;
                }
            }
        })?;

    Ok(SignalGuard {
        handle,
        thread: Some(thread),
    })
}

/// Background thread that sends [`Signal::Tick`] at a fixed interval.
#[derive(Debug)]
pub struct Ticker {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Ticker {
    pub fn spawn(notifier: Notifier, interval: Duration) -> io::Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = stop.clone();

        let handle = thread::Builder::new()
            .name("lantern-ticker".into())
            .spawn(move || {
                let mut next = Instant::now() + interval;

                while !flag.load(Ordering::Acquire) {
                    let now = Instant::now();
                    if now < next {
                        thread::park_timeout(next - now);
                        continue;
                    }

                    if let Err(e) = notifier.send(Signal::Tick) {
                        tracing::debug!(error = %e, "ticker stopping, channel closed");
                        break;
                    }
                    next += interval;
                }
            })?;

        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            handle.thread().unpark();
            let _ = handle.join();
        }
    }
}
