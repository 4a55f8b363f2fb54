use std::fmt;
use std::io::{self, IoSlice, Write};

use bytes::{BufMut, BytesMut};

use crate::http::WRITE_BUFFER_SIZE;
use crate::http::mime;
use crate::http::resource::MappedFile;
use crate::http::response::{StatusCode, error_page};

/// Returned when a response does not fit in the write buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Overflow;

/// Progress of a [`ResponseWriter::drain`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Drain {
    /// Every byte of the response has been written.
    Complete,
    /// The socket stopped accepting data; try again when it is writable.
    Pending,
}

/// Appends formatted text to the buffer, refusing to grow past `limit`.
struct Bounded<'a> {
    buf: &'a mut BytesMut,
    limit: usize,
}

impl fmt::Write for Bounded<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        if self.buf.len() + s.len() > self.limit {
            return Err(fmt::Error);
        }
        self.buf.put_slice(s.as_bytes());
        Ok(())
    }
}

/// Holds a response until it has been written to the socket.
///
/// The status line and headers (and the whole body, for error pages) live
/// in a fixed-capacity buffer. A served file is not copied: it is sent as a
/// second segment straight from its memory mapping, and both segments go
/// out with a single vectored write.
#[derive(Debug)]
pub struct ResponseWriter {
    buf: BytesMut,
    file: Option<MappedFile>,
    bytes_to_send: usize,
    bytes_have_send: usize,
    keep_alive: bool,
}

impl Default for ResponseWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseWriter {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(WRITE_BUFFER_SIZE),
            file: None,
            bytes_to_send: 0,
            bytes_have_send: 0,
            keep_alive: false,
        }
    }

    /// Appends formatted text to the write buffer.
    ///
    /// Nothing is appended if the text would not fit.
    pub fn add_response(&mut self, args: fmt::Arguments<'_>) -> Result<(), Overflow> {
        let start = self.buf.len();
        let mut out = Bounded {
            buf: &mut self.buf,
            limit: WRITE_BUFFER_SIZE,
        };

        if fmt::write(&mut out, args).is_err() {
            self.buf.truncate(start);
            return Err(Overflow);
        }
        Ok(())
    }

    fn add_status_line(&mut self, status: StatusCode) -> Result<(), Overflow> {
        self.add_response(format_args!(
            "HTTP/1.1 {} {}\r\n",
            status.as_u16(),
            status.reason_phrase()
        ))
    }

    fn add_headers(&mut self, content_type: &str, content_length: usize) -> Result<(), Overflow> {
        self.add_response(format_args!("Content-Type: {content_type}\r\n"))?;
        self.add_response(format_args!("Content-Length: {content_length}\r\n"))?;
        let connection = if self.keep_alive { "keep-alive" } else { "close" };
        self.add_response(format_args!("Connection: {connection}\r\n"))?;
        self.add_response(format_args!("\r\n"))
    }

    /// Renders an error status with its canned HTML page.
    ///
    /// Error responses always close the connection.
    pub fn build_error(&mut self, status: StatusCode) -> Result<(), Overflow> {
        self.clear();
        self.keep_alive = false;

        let body = error_page(status);
        self.add_status_line(status)?;
        self.add_headers(mime::HTML, body.len())?;
        self.add_response(format_args!("{body}"))?;

        self.bytes_to_send = self.buf.len();
        Ok(())
    }

    /// Renders a `200 OK` header block and queues `file` as the body.
    pub fn build_file(
        &mut self,
        file: MappedFile,
        content_type: &str,
        keep_alive: bool,
    ) -> Result<(), Overflow> {
        self.clear();
        self.keep_alive = keep_alive;

        self.add_status_line(StatusCode::Ok)?;
        self.add_headers(content_type, file.len())?;

        self.bytes_to_send = self.buf.len() + file.len();
        self.file = Some(file);
        Ok(())
    }

    /// Writes as much of the pending response as `out` accepts.
    ///
    /// Partial writes advance the sent-byte counter so the next call picks
    /// up where this one stopped. The file mapping is released as soon as
    /// the last byte has gone out.
    pub fn drain<W: Write>(&mut self, out: &mut W) -> io::Result<Drain> {
        while self.bytes_have_send < self.bytes_to_send {
            let (head, body) = self.remaining();
            let segments = [IoSlice::new(head), IoSlice::new(body)];

            match out.write_vectored(&segments) {
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "peer stopped accepting data",
                    ));
                }
                Ok(n) => self.bytes_have_send += n,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(Drain::Pending),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }

        self.unmap();
        Ok(Drain::Complete)
    }

    /// The unsent tail of both segments.
    fn remaining(&self) -> (&[u8], &[u8]) {
        let head: &[u8] = &self.buf;
        let body: &[u8] = self.file.as_ref().map_or(&[][..], MappedFile::as_bytes);

        if self.bytes_have_send >= head.len() {
            (&head[head.len()..], &body[self.bytes_have_send - head.len()..])
        } else {
            (&head[self.bytes_have_send..], body)
        }
    }

    /// Releases the file mapping, if any.
    pub fn unmap(&mut self) {
        self.file = None;
    }

    /// Forgets the current response, releasing its mapping.
    pub fn clear(&mut self) {
        self.buf.clear();
        self.unmap();
        self.bytes_to_send = 0;
        self.bytes_have_send = 0;
        self.keep_alive = false;
    }

    /// Header bytes (and the page, for error responses) in the write buffer.
    pub fn buffered(&self) -> &[u8] {
        &self.buf
    }

    pub fn is_mapped(&self) -> bool {
        self.file.is_some()
    }

    pub fn bytes_to_send(&self) -> usize {
        self.bytes_to_send
    }

    pub fn bytes_have_send(&self) -> usize {
        self.bytes_have_send
    }

    pub fn keep_alive(&self) -> bool {
        self.keep_alive
    }
}
