//! Async driver for a [`Session`].
//!
//! [`OriginClient`] is a cheap handle to a background task that owns the
//! session, the control channel and both timers. Every input (caller
//! operations, inbound frames, timer ticks, finished downloads) is handled
//! by that one task in arrival order.
//!
//! ```no_run
//! # async fn demo() -> origin_alpaca::OriginResult {
//! use origin_alpaca::{OriginClient, OriginConfig};
//!
//! let client = OriginClient::spawn(OriginConfig::default());
//! let mut events = client.subscribe();
//! client.connect("192.168.1.50", 80).await?;
//! client.set_connected(true).await?;
//! client.start_exposure(2.0, 400).await?;
//! while let Ok(event) = events.recv().await {
//!     println!("{event:?}");
//! }
//! # Ok(())
//! # }
//! ```

mod actor;
use actor::{Actor, Request};

mod fetch;
pub use fetch::{HttpImageFetcher, ImageFetcher};

mod transport;

#[cfg(test)]
mod test;

use crate::config::OriginConfig;
use crate::errors::{OriginError, OriginResult};
use crate::session::{CameraState, Event, ImageFormat, MoveDirection, Session};
use crate::status::TelescopeStatus;
use bytes::Bytes;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};

const EVENT_CAPACITY: usize = 256;

/// Handle to a running telescope session.
///
/// Cloning is cheap; the session task stops once every handle is dropped.
#[derive(Debug, Clone)]
pub struct OriginClient {
    requests: mpsc::UnboundedSender<Request>,
    events: broadcast::Sender<Event>,
}

macro_rules! forward_to_session {
    ($(
        $(#[doc = $doc:literal])*
        fn $name:ident($($arg:ident: $ty:ty),*);
    )*) => {$(
        $(#[doc = $doc])*
        pub async fn $name(&self, $($arg: $ty),*) -> OriginResult {
            self.with_session(move |session| session.$name($($arg),*)).await?
        }
    )*};
}

impl OriginClient {
    /// Start a session task on the current Tokio runtime, fetching images
    /// over HTTP.
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn spawn(config: OriginConfig) -> Self {
        Self::spawn_with(Session::new(config), Arc::new(HttpImageFetcher::default()))
    }

    /// Start a session task around an existing session and fetcher.
    pub fn spawn_with(session: Session, fetcher: Arc<dyn ImageFetcher>) -> Self {
        let (requests, requests_rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (actor, completions_rx) = Actor::new(session, fetcher, events.clone());
        drop(tokio::spawn(actor.run(requests_rx, completions_rx)));
        Self { requests, events }
    }

    /// Receive session events from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    fn request(&self, request: Request) -> OriginResult {
        self.requests
            .send(request)
            .map_err(|_closed| OriginError::SessionClosed)
    }

    /// Open the control channel to `host:port`.
    ///
    /// Resolves once the channel is up, or with
    /// [`OriginError::ConnectTimeout`] after the configured timeout. The
    /// session keeps processing traffic while the attempt runs; a second
    /// attempt fails with [`OriginError::ConnectInProgress`].
    #[tracing::instrument(skip(self), err(level = "warn"))]
    pub async fn connect(&self, host: &str, port: u16) -> OriginResult {
        let (reply, result) = oneshot::channel();
        self.request(Request::Connect {
            host: host.to_owned(),
            port,
            reply,
        })?;
        result.await.map_err(|_closed| OriginError::SessionClosed)?
    }

    /// Close the control channel.
    ///
    /// A pending [`Self::connect`] resolves with [`OriginError::NotConnected`].
    pub fn disconnect(&self) -> OriginResult {
        self.request(Request::Disconnect)
    }

    /// Run `f` on the session task and return its result.
    ///
    /// Effects queued by `f` are executed before the next input is handled.
    pub async fn with_session<R: Send + 'static>(
        &self,
        f: impl FnOnce(&mut Session) -> R + Send + 'static,
    ) -> OriginResult<R> {
        let (reply, result) = oneshot::channel();
        self.request(Request::WithSession(Box::new(move |session| {
            let _ = reply.send(f(session));
        })))?;
        result.await.map_err(|_closed| OriginError::SessionClosed)
    }

    forward_to_session! {
        /// See [`Session::set_connected`].
        fn set_connected(connected: bool);
        /// See [`Session::set_camera_connected`].
        fn set_camera_connected(connected: bool);
        /// See [`Session::goto`].
        fn goto(ra: f64, dec: f64);
        /// See [`Session::sync`].
        fn sync(ra: f64, dec: f64);
        /// See [`Session::abort_motion`].
        fn abort_motion();
        /// See [`Session::park`].
        fn park();
        /// See [`Session::unpark`].
        fn unpark();
        /// See [`Session::initialize`].
        fn initialize();
        /// See [`Session::move_axis`].
        fn move_axis(direction: MoveDirection, speed: u8);
        /// See [`Session::set_tracking`].
        fn set_tracking(enabled: bool);
        /// See [`Session::start_exposure`].
        fn start_exposure(duration: f64, gain: i64);
        /// See [`Session::abort_exposure`].
        fn abort_exposure();
        /// See [`Session::clear_camera_error`].
        fn clear_camera_error();
        /// See [`Session::set_gain`].
        fn set_gain(gain: i64);
        /// See [`Session::take_snapshot`].
        fn take_snapshot(exposure: f64, iso: i64);
        /// See [`Session::take_single_snapshot`].
        fn take_single_snapshot();
        /// See [`Session::set_camera_manual_mode`].
        fn set_camera_manual_mode();
        /// See [`Session::set_camera_auto_mode`].
        fn set_camera_auto_mode();
        /// See [`Session::request_camera_mode`].
        fn request_camera_mode();
        /// See [`Session::request_capture_parameters`].
        fn request_capture_parameters();
        /// See [`Session::set_capture_parameters`].
        fn set_capture_parameters(exposure: f64, iso: i64);
        /// See [`Session::request_camera_info`].
        fn request_camera_info();
    }

    /// Snapshot of the mount status.
    pub async fn status(&self) -> OriginResult<TelescopeStatus> {
        self.with_session(|session| session.status().clone()).await
    }

    /// Camera state.
    pub async fn camera_state(&self) -> OriginResult<CameraState> {
        self.with_session(|session| session.camera_state()).await
    }

    /// Whether an image is ready.
    pub async fn is_image_ready(&self) -> OriginResult<bool> {
        self.with_session(|session| session.is_image_ready()).await
    }

    /// Bytes and format of the last exposure image.
    pub async fn last_image(&self) -> OriginResult<(Bytes, Option<ImageFormat>)> {
        self.with_session(|session| {
            (
                session.last_image_data().clone(),
                session.last_image_format(),
            )
        })
        .await
    }
}
