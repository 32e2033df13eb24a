use crate::session::CameraState;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::time::Duration;
use thiserror::Error;

/// Error reported by the telescope in a `Response` message.
///
/// Mirrors the `ErrorCode` / `ErrorMessage` pair carried on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("device error {code}: {message}")]
pub struct DeviceError {
    /// Error number, `0` meaning success.
    #[serde(rename = "ErrorCode")]
    pub code: i64,
    /// Human-readable message supplied by the device.
    #[serde(rename = "ErrorMessage", default)]
    pub message: Cow<'static, str>,
}

impl DeviceError {
    /// Create a new `DeviceError` from given error code and a message.
    pub fn new(code: i64, message: impl std::fmt::Display) -> Self {
        Self {
            code,
            message: message.to_string().into(),
        }
    }
}

/// Errors produced by the Origin session and its transports.
#[derive(Debug, Error)]
pub enum OriginError {
    /// There is no physical link to the telescope.
    #[error("no physical connection to the telescope")]
    NotConnected,
    /// The physical link is up but the caller hasn't asserted a logical connection.
    #[error("telescope is not logically connected")]
    NotLogicallyConnected,
    /// A connection attempt is already running.
    #[error("a connection attempt is already in progress")]
    ConnectInProgress,
    /// The camera is not idle.
    #[error("camera is busy ({0})")]
    CameraBusy(CameraState),
    /// The camera is not in the state the operation requires.
    #[error("camera is {actual}, expected {expected}")]
    InvalidCameraState {
        /// State the operation requires.
        expected: CameraState,
        /// Current state.
        actual: CameraState,
    },
    /// An argument is out of range.
    #[error("invalid value: {0}")]
    InvalidValue(Cow<'static, str>),
    /// The control channel didn't come up in time.
    #[error("timed out after {0:?} waiting for the control channel")]
    ConnectTimeout(Duration),
    /// Control channel failure.
    #[error("WebSocket error: {0}")]
    WebSocket(Box<tokio_tungstenite::tungstenite::Error>),
    /// Image channel failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    /// Failed to encode a command.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    /// Filesystem failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// The device rejected a command.
    #[error(transparent)]
    Device(#[from] DeviceError),
    /// The session task is gone.
    #[error("session task has shut down")]
    SessionClosed,
}

impl From<tokio_tungstenite::tungstenite::Error> for OriginError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::WebSocket(Box::new(err))
    }
}

impl OriginError {
    /// Create a new "invalid value" error with the specified message.
    pub fn invalid_value(message: impl Into<Cow<'static, str>>) -> Self {
        Self::InvalidValue(message.into())
    }
}

/// Result type for Origin operations.
pub type OriginResult<T = ()> = Result<T, OriginError>;
