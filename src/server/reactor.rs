use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::os::fd::{AsRawFd, RawFd};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use anyhow::Context;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::http::connection::{ReadStatus, WriteStatus};
use crate::server::notify::{self, Notifier, Receiver, Signal, Ticker};
use crate::server::poller::{Events, Interest, Mode, Poller};
use crate::server::pool::WorkerPool;
use crate::server::table::{ConnectionTable, Owner, Slot};
use crate::server::timer::TimerList;

/// Token of the listening socket.
pub const LISTENER_TOKEN: usize = usize::MAX;

/// Token of the notification channel.
pub const NOTIFY_TOKEN: usize = usize::MAX - 1;

/// Process-wide connection accounting.
///
/// Created once per server and shared by handle; the count goes up on
/// accept and down on every close, whichever path triggers it.
#[derive(Debug)]
pub struct ServerState {
    active: AtomicUsize,
    max: usize,
}

impl ServerState {
    pub fn new(max: usize) -> Self {
        Self {
            active: AtomicUsize::new(0),
            max,
        }
    }

    /// Counts a new connection, failing if the ceiling is reached.
    pub fn try_acquire(&self) -> bool {
        self.active
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < self.max).then_some(n + 1)
            })
            .is_ok()
    }

    pub fn release(&self) {
        let _ = self
            .active
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
    }

    pub fn active(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    pub fn max(&self) -> usize {
        self.max
    }
}

/// Remote control for a running [`Server`].
#[derive(Debug, Clone)]
pub struct ServerHandle {
    notifier: Notifier,
    state: Arc<ServerState>,
}

impl ServerHandle {
    /// Asks the server to stop after its current batch of events.
    pub fn shutdown(&self) -> io::Result<()> {
        self.notifier.send(Signal::Terminate)
    }

    pub fn active_connections(&self) -> usize {
        self.state.active()
    }
}

/// What an idle timer knows about its connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientData {
    pub token: usize,
    pub fd: RawFd,
    pub peer: SocketAddr,
}

/// The reactor.
///
/// Runs on a single thread and owns the listening socket, the poller,
/// the idle timers and the connection table. Readable connections are
/// read here and handed to the worker pool for parsing and response
/// building; writable connections are drained here.
pub struct Server {
    config: Config,
    listener: TcpListener,
    poller: Arc<Poller>,
    notifier: Notifier,
    receiver: Receiver,
    connections: ConnectionTable,
    timers: TimerList<ClientData>,
    pool: WorkerPool<Slot>,
    state: Arc<ServerState>,
}

impl Server {
    /// Binds `0.0.0.0:<port>` and builds a server around it.
    pub fn bind(config: Config) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(("0.0.0.0", config.port))
            .with_context(|| format!("failed to bind port {}", config.port))?;
        Self::new(config, listener)
    }

    /// Builds a server around an already bound listener.
    pub fn new(config: Config, listener: TcpListener) -> anyhow::Result<Self> {
        config.validate()?;

        listener
            .set_nonblocking(true)
            .context("failed to make listener non-blocking")?;

        let poller = Arc::new(Poller::new().context("failed to create epoll instance")?);
        let (notifier, receiver) =
            notify::channel().context("failed to create notification channel")?;

        poller
            .add(listener.as_raw_fd(), LISTENER_TOKEN, Interest::Read, Mode::Edge)
            .context("failed to register listener")?;
        poller
            .add(receiver.raw_fd(), NOTIFY_TOKEN, Interest::Read, Mode::Edge)
            .context("failed to register notification channel")?;

        let pool = WorkerPool::new(config.worker_threads, config.max_requests)
            .context("failed to start worker pool")?;

        let doc_root: Arc<Path> = Arc::from(config.doc_root.as_path());
        let connections = ConnectionTable::new(config.max_connections, doc_root, poller.clone());
        let state = Arc::new(ServerState::new(config.max_connections));

        Ok(Self {
            config,
            listener,
            poller,
            notifier,
            receiver,
            connections,
            timers: TimerList::new(),
            pool,
            state,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            notifier: self.notifier.clone(),
            state: self.state.clone(),
        }
    }

    /// Sending half of the notification channel, for signal handlers.
    pub fn notifier(&self) -> Notifier {
        self.notifier.clone()
    }

    /// Runs the event loop until a termination signal arrives.
    pub fn run(mut self) -> anyhow::Result<()> {
        let addr = self.local_addr().context("listener has no local address")?;
        info!(
            addr = %addr,
            root = %self.config.doc_root.display(),
            workers = self.pool.threads(),
            "listening"
        );

        let _ticker = Ticker::spawn(self.notifier.clone(), self.config.tick_interval())
            .context("failed to start timer tick")?;

        let mut events = Events::with_capacity(self.config.max_events);
        let mut signals = Vec::new();
        let mut stop = false;
        let mut timeout = false;

        while !stop {
            self.poller
                .wait(&mut events, None)
                .context("epoll wait failed")?;

            for event in events.iter() {
                match event.token {
                    LISTENER_TOKEN => self.accept_connections(),
                    NOTIFY_TOKEN => {
                        signals.clear();
                        if let Err(e) = self.receiver.drain(&mut signals) {
                            warn!(error = %e, "failed to read notification channel");
                        }
                        for signal in &signals {
                            match signal {
                                // Timers are handled after the batch: I/O
                                // comes first.
                                Signal::Tick => timeout = true,
                                Signal::Terminate => stop = true,
                            }
                        }
                    }
                    token if event.hangup => self.close_connection(token),
                    token if event.readable => self.on_readable(token),
                    token if event.writable => self.on_writable(token),
                    _ => {}
                }
            }

            if timeout {
                self.timer_handler();
                timeout = false;
            }
        }

        info!(active = self.state.active(), "shutting down");
        Ok(())
    }

    fn accept_connections(&mut self) {
        loop {
            match self.listener.accept() {
                Ok((stream, peer)) => self.register(stream, peer),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!(error = %e, "accept failed");
                    break;
                }
            }
        }
    }

    fn register(&mut self, stream: TcpStream, peer: SocketAddr) {
        if !self.state.try_acquire() {
            warn!(peer = %peer, max = self.state.max(), "connection limit reached, rejecting");
            return;
        }

        let Some(token) = self.connections.insert() else {
            self.state.release();
            warn!(peer = %peer, "no free connection slot, rejecting");
            return;
        };

        if let Err(e) = stream.set_nonblocking(true) {
            warn!(peer = %peer, error = %e, "failed to make socket non-blocking");
            self.connections.remove(token);
            self.state.release();
            return;
        }

        let fd = stream.as_raw_fd();
        let Some(slot) = self.connections.get(token).cloned() else {
            return;
        };
        slot.lock().init(stream, peer);

        if let Err(e) = self.poller.add(fd, token, Interest::Read, Mode::OneShot) {
            warn!(peer = %peer, error = %e, "failed to register connection");
            self.close_connection(token);
            return;
        }

        let expire = Instant::now() + self.config.idle_timeout();
        let timer = self.timers.add_timer(expire, ClientData { token, fd, peer });
        self.connections.set_timer(token, Some(timer));

        debug!(token, fd, peer = %peer, "accepted connection");
    }

    fn on_readable(&mut self, token: usize) {
        let Some(slot) = self.connections.get(token).cloned() else {
            return;
        };

        if let Some(timer) = self.connections.timer(token) {
            self.timers
                .adjust_timer(timer, Instant::now() + self.config.idle_timeout());
            debug!(token, "adjust timer once");
        }

        let status = {
            let mut conn = slot.lock();
            debug_assert_eq!(slot.owner(), Owner::Reactor);
            conn.read()
        };

        match status {
            Ok(ReadStatus::Ready) => {
                slot.hand_to_worker();
                if let Err(e) = self.pool.append(slot) {
                    warn!(token, error = %e, "dropping connection");
                    if let Some(slot) = self.connections.get(token) {
                        slot.hand_back();
                    }
                    self.close_connection(token);
                }
            }
            Ok(ReadStatus::PeerClosed) => {
                debug!(token, "peer closed connection");
                self.close_connection(token);
            }
            Err(e) => {
                debug!(token, error = %e, "read failed");
                self.close_connection(token);
            }
        }
    }

    fn on_writable(&mut self, token: usize) {
        let Some(slot) = self.connections.get(token).cloned() else {
            return;
        };

        let result = {
            let mut conn = slot.lock();
            debug_assert_eq!(slot.owner(), Owner::Reactor);
            conn.write().map(|status| (status, conn.raw_fd()))
        };

        let next = match result {
            Ok((WriteStatus::Pending, Some(fd))) => Some((fd, Interest::Write)),
            Ok((WriteStatus::KeepAlive, Some(fd))) => Some((fd, Interest::Read)),
            Ok(_) => None,
            Err(e) => {
                debug!(token, error = %e, "write failed");
                None
            }
        };

        match next {
            Some((fd, interest)) => {
                if let Err(e) = self.poller.rearm(fd, token, interest) {
                    warn!(token, error = %e, "failed to re-arm connection");
                    self.close_connection(token);
                }
            }
            None => self.close_connection(token),
        }
    }

    /// Closes a connection: deletes its timer, deregisters and closes the
    /// socket, releases its mapping and frees its slot.
    ///
    /// Closing a token that is not live does nothing.
    fn close_connection(&mut self, token: usize) {
        let Some((slot, timer)) = self.connections.remove(token) else {
            return;
        };

        if let Some(timer) = timer {
            self.timers.del_timer(timer);
        }

        {
            let mut conn = slot.lock();
            if let Some(fd) = conn.raw_fd() {
                let _ = self.poller.delete(fd);
            }
            conn.close_conn();
        }
        slot.hand_back();

        self.state.release();
    }

    /// Fires every expired idle timer.
    fn timer_handler(&mut self) {
        let mut expired = Vec::new();
        self.timers.tick(Instant::now(), |client| expired.push(client));

        for client in expired {
            self.connections.set_timer(client.token, None);

            match self.connections.get(client.token).map(|slot| slot.owner()) {
                None => {}
                Some(Owner::Worker) => {
                    // Never close under a worker; check again later.
                    let expire = Instant::now() + self.config.idle_timeout();
                    let timer = self.timers.add_timer(expire, client);
                    self.connections.set_timer(client.token, Some(timer));
                }
                Some(Owner::Reactor) => {
                    info!(fd = client.fd, peer = %client.peer, "idle timeout, closing");
                    self.close_connection(client.token);
                }
            }
        }
    }

    pub fn active_connections(&self) -> usize {
        self.state.active()
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        for token in self.connections.tokens() {
            self.close_connection(token);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::thread;
    use std::time::Duration;

    fn wait_until(what: &str, mut cond: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !cond() {
            assert!(Instant::now() < deadline, "timed out waiting for {what}");
            thread::sleep(Duration::from_millis(5));
        }
    }

    fn token_of(server: &Server, client: &TcpStream) -> usize {
        let addr = client.local_addr().unwrap();
        server
            .connections
            .tokens()
            .into_iter()
            .find(|&token| server.connections.get(token).unwrap().lock().peer() == Some(addr))
            .unwrap()
    }

    #[test]
    fn full_task_queue_closes_the_connection() {
        let root = tempfile::tempdir().unwrap();
        let config = Config {
            doc_root: root.path().to_path_buf(),
            worker_threads: 1,
            max_requests: 1,
            ..Config::default()
        };
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let mut server = Server::new(config, listener).unwrap();
        let addr = server.local_addr().unwrap();

        let busy = TcpStream::connect(addr).unwrap();
        let queued = TcpStream::connect(addr).unwrap();
        let mut rejected = TcpStream::connect(addr).unwrap();
        rejected
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();

        wait_until("accept", || {
            server.accept_connections();
            server.connections.len() == 3
        });
        assert_eq!(server.active_connections(), 3);

        let busy_slot = server.connections.get(token_of(&server, &busy)).unwrap().clone();
        let queued_slot = server.connections.get(token_of(&server, &queued)).unwrap().clone();
        let token = token_of(&server, &rejected);

        // The only worker blocks on a connection the test holds.
        let held = busy_slot.lock();
        server.pool.append(busy_slot.clone()).unwrap();
        wait_until("worker pickup", || server.pool.pending() == 0);
        server.pool.append(queued_slot).unwrap();

        rejected
            .write_all(b"GET /index.html HTTP/1.1\r\n\r\n")
            .unwrap();
        server.on_readable(token);

        assert!(server.connections.get(token).is_none());
        assert_eq!(server.active_connections(), 2);
        assert_eq!(server.timers.len(), 2);

        let mut buf = [0u8; 16];
        match rejected.read(&mut buf) {
            Ok(n) => assert_eq!(n, 0),
            Err(e) => assert_eq!(e.kind(), io::ErrorKind::ConnectionReset),
        }

        drop(held);
        wait_until("queue drained", || server.pool.pending() == 0);
    }
}
