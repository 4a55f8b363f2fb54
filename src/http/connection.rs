use std::io::{self, Read};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::os::fd::{AsRawFd, RawFd};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::http::READ_BUFFER_SIZE;
use crate::http::mime;
use crate::http::parser::{HttpCode, RequestParser};
use crate::http::request::Request;
use crate::http::resource::{self, MappedFile};
use crate::http::response::StatusCode;
use crate::http::writer::{Drain, ResponseWriter};
use crate::server::poller::Interest;

/// Result of draining the socket into the read buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadStatus {
    /// New bytes (possibly none) are buffered and the socket is still open.
    Ready,
    /// The peer closed its end.
    PeerClosed,
}

/// Result of draining the response into the socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteStatus {
    /// The socket is full; wait for it to become writable again.
    Pending,
    /// The response is out and the connection waits for the next request.
    KeepAlive,
    /// The response is out and the connection should be closed.
    Close,
}

/// One client connection and its request/response state.
///
/// A `Connection` is allocated once per slot and re-initialized for every
/// socket accepted into that slot. It never blocks: reads and writes stop
/// as soon as the socket would block, and the caller re-arms readiness.
#[derive(Debug)]
pub struct Connection {
    stream: Option<TcpStream>,
    peer: Option<SocketAddr>,

    read_buf: Box<[u8]>,
    read_idx: usize,
    parser: RequestParser,

    real_file: PathBuf,
    mapped: Option<MappedFile>,
    response: ResponseWriter,

    doc_root: Arc<Path>,
}

impl Connection {
    pub fn new(doc_root: Arc<Path>) -> Self {
        Self {
            stream: None,
            peer: None,
            read_buf: vec![0; READ_BUFFER_SIZE].into_boxed_slice(),
            read_idx: 0,
            parser: RequestParser::new(),
            real_file: PathBuf::new(),
            mapped: None,
            response: ResponseWriter::new(),
            doc_root,
        }
    }

    /// Takes ownership of a freshly accepted, non-blocking socket.
    pub fn init(&mut self, stream: TcpStream, peer: SocketAddr) {
        self.close_conn();
        self.stream = Some(stream);
        self.peer = Some(peer);
    }

    /// Clears per-request state, keeping the socket.
    fn reset(&mut self) {
        self.read_idx = 0;
        self.parser.reset();
        self.real_file.clear();
        self.mapped = None;
        self.response.clear();
    }

    /// Reads everything the socket has ready into the read buffer.
    ///
    /// Stops when the socket would block, the peer closes, or the buffer
    /// is full. A full buffer is not an error here: if the request still
    /// cannot be parsed, [`process`](Self::process) answers 400.
    pub fn read(&mut self) -> io::Result<ReadStatus> {
        let Some(stream) = self.stream.as_mut() else {
            return Err(io::ErrorKind::NotConnected.into());
        };

        while self.read_idx < self.read_buf.len() {
            match stream.read(&mut self.read_buf[self.read_idx..]) {
                Ok(0) => return Ok(ReadStatus::PeerClosed),
                Ok(n) => self.read_idx += n,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }

        Ok(ReadStatus::Ready)
    }

    /// Parses what has been read and, once a request is complete, builds
    /// the response.
    ///
    /// Returns the readiness the connection should be re-armed for: more
    /// input while the request is incomplete, output once a response is
    /// queued.
    pub fn process(&mut self) -> Interest {
        let code = self.process_read();

        match code {
            HttpCode::NoRequest => return Interest::Read,
            HttpCode::ClosedConnection => return Interest::Read,
            _ => {}
        }

        if !self.process_write(code) {
            // No response was queued: shut the socket down so the reactor
            // sees a hangup and closes it.
            if let Some(stream) = &self.stream {
                if let Err(e) = stream.shutdown(Shutdown::Both) {
                    debug!(peer = ?self.peer, error = %e, "shutdown failed");
                }
            }
            return Interest::Read;
        }

        Interest::Write
    }

    /// Runs the parser over the buffered bytes and resolves the target of a
    /// complete request.
    pub fn process_read(&mut self) -> HttpCode {
        if self.stream.is_none() {
            return HttpCode::ClosedConnection;
        }

        match self.parser.parse(&self.read_buf[..self.read_idx]) {
            HttpCode::NoRequest if self.read_idx == self.read_buf.len() => HttpCode::BadRequest,
            HttpCode::GetRequest if !self.parser.request().is_supported() => {
                HttpCode::BadRequest
            }
            HttpCode::GetRequest => self.do_request(),
            other => other,
        }
    }

    fn do_request(&mut self) -> HttpCode {
        self.real_file = match resource::resolve(&self.doc_root, &self.parser.request().url) {
            Ok(path) => path,
            Err(code) => return code,
        };

        match MappedFile::open(&self.real_file) {
            Ok(file) => {
                self.mapped = Some(file);
                HttpCode::FileRequest
            }
            Err(code) => code,
        }
    }

    /// Renders the response for `code` into the write buffer.
    ///
    /// A response that does not fit is replaced by a 500 page. Returns
    /// `false` only if `code` has no response or even the 500 page fails.
    fn process_write(&mut self, code: HttpCode) -> bool {
        let Some(status) = StatusCode::from_outcome(code) else {
            return false;
        };

        let built = match (status, self.mapped.take()) {
            (StatusCode::Ok, Some(file)) => {
                let content_type = mime::content_type(&self.real_file);
                let keep_alive = self.parser.request().keep_alive;
                self.response.build_file(file, content_type, keep_alive)
            }
            (StatusCode::Ok, None) => self.response.build_error(StatusCode::InternalServerError),
            (status, _) => self.response.build_error(status),
        };

        if built.is_err() {
            warn!(peer = ?self.peer, "response does not fit the write buffer");
            if self
                .response
                .build_error(StatusCode::InternalServerError)
                .is_err()
            {
                return false;
            }
        }

        debug!(
            peer = ?self.peer,
            status = status.as_u16(),
            url = %self.parser.request().url,
            "response ready"
        );
        true
    }

    /// Writes as much of the queued response as the socket accepts.
    ///
    /// On completion the connection is reset for the next request when the
    /// client asked for keep-alive.
    pub fn write(&mut self) -> io::Result<WriteStatus> {
        if self.stream.is_none() {
            return Err(io::ErrorKind::NotConnected.into());
        }

        if self.response.bytes_to_send() == 0 {
            self.reset();
            return Ok(WriteStatus::KeepAlive);
        }

        let Some(stream) = self.stream.as_mut() else {
            return Err(io::ErrorKind::NotConnected.into());
        };

        match self.response.drain(stream)? {
            Drain::Pending => Ok(WriteStatus::Pending),
            Drain::Complete if self.response.keep_alive() => {
                self.reset();
                Ok(WriteStatus::KeepAlive)
            }
            Drain::Complete => Ok(WriteStatus::Close),
        }
    }

    /// Drops the socket and releases every per-request resource.
    ///
    /// Calling this on a closed connection does nothing.
    pub fn close_conn(&mut self) {
        if let Some(stream) = self.stream.take() {
            debug!(fd = stream.as_raw_fd(), peer = ?self.peer, "closing connection");
        }
        self.peer = None;
        self.reset();
    }

    pub fn raw_fd(&self) -> Option<RawFd> {
        self.stream.as_ref().map(AsRawFd::as_raw_fd)
    }

    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    pub fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    /// The request parsed so far.
    pub fn request(&self) -> &Request {
        self.parser.request()
    }

    pub fn response(&self) -> &ResponseWriter {
        &self.response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detached() -> Connection {
        Connection::new(Arc::from(Path::new("/nonexistent")))
    }

    #[test]
    fn outcome_without_response_queues_nothing() {
        let mut conn = detached();
        assert!(!conn.process_write(HttpCode::NoRequest));
        assert_eq!(conn.response().bytes_to_send(), 0);
    }

    #[test]
    fn error_outcome_queues_error_page() {
        let mut conn = detached();
        assert!(conn.process_write(HttpCode::BadRequest));
        assert!(conn.response().bytes_to_send() > 0);
        assert!(!conn.response().is_mapped());
    }
}
