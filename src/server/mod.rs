//! Event-driven server core
//!
//! This module implements the reactor that drives every client connection:
//! readiness polling, the notification channel, idle timers, the worker
//! pool and the connection table.

pub mod notify;
pub mod poller;
pub mod pool;
pub mod reactor;
pub mod table;
pub mod timer;

pub use reactor::{ClientData, Server, ServerHandle, ServerState};
pub use timer::{TimerId, TimerList};
