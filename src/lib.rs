//! Session engine for Celestron Origin telescopes.
//!
//! The telescope exposes a JSON-over-WebSocket control channel for mount,
//! camera and task commands, and an HTTP server for the images it captures.
//! This crate keeps the protocol state for one telescope (mount status,
//! camera exposure state machine, pending commands, status polling) in a
//! [`Session`] that performs no I/O, and drives it from a Tokio task behind
//! [`OriginClient`].
//!
//! Operations check the connection state first and fail with
//! [`OriginError::NotConnected`] without side effects when the link is down.
//! Everything the telescope reports arrives as [`Event`]s.

pub mod client;
pub mod config;
mod errors;
pub mod image_store;
pub mod journal;
pub mod protocol;
pub mod session;
pub mod status;
pub mod telemetry;
pub mod units;

#[cfg(any(test, feature = "test"))]
pub mod test_utils;

pub use client::{HttpImageFetcher, ImageFetcher, OriginClient};
pub use config::OriginConfig;
pub use errors::{DeviceError, OriginError, OriginResult};
pub use session::{CameraState, Effect, Event, ImageFormat, MoveDirection, Session};
pub use status::{Operation, TelescopeStatus};
