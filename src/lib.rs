//! Lantern - Static File Web Server
//!
//! Core library for HTTP connection handling and the event-driven server.

pub mod config;
pub mod error;
pub mod http;
pub mod server;
