//! Data Transfer Objects
//!
//! Payloads exchanged with the outside world: admission requests, status
//! reports from the build system and runtime, and lifecycle events sent to
//! the notification sink.

pub mod admission;
pub mod event;
pub mod status;
