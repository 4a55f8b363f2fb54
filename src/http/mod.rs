//! HTTP protocol implementation.
//!
//! This module implements the per-connection side of the server: a
//! non-blocking HTTP/1.1 request parser and a zero-copy static file
//! responder. It knows nothing about readiness notification; the
//! [`server`](crate::server) module decides when a connection is read,
//! processed and written.
//!
//! # Architecture
//!
//! - **`connection`**: Socket, buffers and the request/response cycle
//! - **`parser`**: Line scanner and the request-line/header/content state machine
//! - **`request`**: Parsed request representation
//! - **`resource`**: Document-root resolution and memory-mapped files
//! - **`response`**: Status codes and canned error pages
//! - **`writer`**: Bounded header buffer and scatter-gather output
//! - **`mime`**: MIME type detection based on file extensions
//!
//! # Parser State Machine
//!
//! ```text
//!        ┌──────────────┐
//!        │ REQUEST_LINE │ ← "GET /index.html HTTP/1.1"
//!        └──────┬───────┘
//!               │ valid request line
//!               ▼
//!        ┌──────────────┐
//!        │    HEADER    │ ← one line per call until a blank line
//!        └──────┬───────┘
//!               │ blank line
//!               ├─ no Content-Length → GET_REQUEST
//!               ▼
//!        ┌──────────────┐
//!        │   CONTENT    │ ← wait for Content-Length bytes
//!        └──────┬───────┘
//!               ▼
//!          GET_REQUEST
//! ```
//!
//! Any state can end early with `BAD_REQUEST`; an incomplete request
//! yields `NO_REQUEST` and is resumed on the next read.

pub mod connection;
pub mod mime;
pub mod parser;
pub mod request;
pub mod resource;
pub mod response;
pub mod writer;

/// Capacity of each connection's read buffer.
pub const READ_BUFFER_SIZE: usize = 2048;

/// Capacity of each connection's write buffer.
pub const WRITE_BUFFER_SIZE: usize = 1024;

/// Upper bound on the length of a resolved file path.
pub const FILENAME_LEN: usize = 200;
