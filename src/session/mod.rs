//! Protocol state of one telescope session.
//!
//! [`Session`] never performs I/O itself. The driver feeds it transport
//! events (`on_connected`, `on_text`, `on_download_complete`, timer ticks)
//! and caller operations, then drains the resulting [`Effect`]s with
//! [`Session::take_effects`] and executes them in order. Everything is
//! processed serially by whoever owns the session, which is what keeps the
//! mount status and the camera state machine consistent without locks.

mod camera;
pub use camera::{CameraState, CaptureParameters, ImageFormat};
use camera::CameraMachine;

mod capture;

mod commands;
use commands::CommandEngine;

mod images;
pub use images::{DownloadedImage, ImageContext, ImageDecision, ImageKind, ImageRequest, classify};

mod mount;
pub use mount::MoveDirection;

mod rotation;
pub use rotation::StatusQuery;
use rotation::StatusRotation;

use crate::config::OriginConfig;
use crate::errors::{DeviceError, OriginError, OriginResult};
use crate::image_store::ImageStore;
use crate::journal::{Direction, Journal};
use crate::protocol::{Destination, Inbound, MessageType, Params, SequenceId};
use crate::status::TelescopeStatus;
use crate::telemetry::{StatusParser, TelemetryProcessor, TelescopeData};
use bytes::Bytes;
use image::DynamicImage;
use std::borrow::Cow;
use std::path::PathBuf;
use std::time::Instant;
use time::OffsetDateTime;

/// Work the driver must perform on behalf of the session.
#[derive(Debug)]
pub enum Effect {
    /// Write a text frame on the control channel.
    Send(String),
    /// Send a keep-alive ping on the control channel.
    Ping,
    /// Start an HTTP download; report back via [`Session::on_download_complete`].
    Fetch(ImageRequest),
    /// Close the control channel.
    Close,
    /// Start the status rotation and ping timers.
    StartTimers,
    /// Stop both timers.
    StopTimers,
    /// Deliver an event to observers.
    Emit(Event),
}

/// Notification delivered to observers.
#[derive(Debug, Clone)]
pub enum Event {
    /// The control channel came up.
    Connected,
    /// The control channel went down.
    Disconnected,
    /// Mount/environment telemetry refreshed the status.
    StatusUpdated(TelescopeStatus),
    /// An exposure was started.
    ExposureStarted,
    /// The image for the running exposure was announced.
    ExposureComplete,
    /// The camera state machine moved.
    CameraStateChanged(CameraState),
    /// Exposure data was downloaded and cached.
    ImageReady {
        /// Remote path of the image.
        remote_path: String,
    },
    /// The camera reported its capture parameters.
    CaptureParametersChanged(CaptureParameters),
    /// The live stream reported manual or automatic mode.
    CameraModeChanged {
        /// Whether manual mode is on.
        manual: bool,
    },
    /// The camera identified itself.
    CameraInfoReceived {
        /// `CameraID` field.
        camera_id: String,
        /// `CameraModel` field.
        model: String,
    },
    /// A snapshot was requested.
    SnapshotRequested,
    /// A snapshot (TIFF) finished downloading.
    SnapshotDownloaded(DownloadedImage),
    /// A live frame (JPEG) finished downloading and decoded successfully.
    LiveImageDownloaded(DownloadedImage),
    /// The device answered a command with a non-zero error code.
    CommandFailed {
        /// Id of the failed command, if known.
        sequence_id: Option<SequenceId>,
        /// Command name as echoed by the device.
        command: String,
        /// The reported error.
        error: DeviceError,
    },
}

/// Protocol session for one telescope.
#[derive(Debug)]
pub struct Session {
    config: OriginConfig,
    host: Option<String>,
    port: u16,
    status: TelescopeStatus,
    commands: CommandEngine,
    rotation: StatusRotation,
    camera: CameraMachine,
    snapshot_in_progress: bool,
    exposure_owns_snapshot: bool,
    parser: Box<dyn StatusParser>,
    journal: Journal,
    image_store: Option<ImageStore>,
    save_images: bool,
    ping_sent_at: Option<Instant>,
    effects: Vec<Effect>,
}

impl Session {
    /// Create a session, opening the journal and image directory named in
    /// `config`.
    pub fn new(config: OriginConfig) -> Self {
        let journal = match &config.log_dir {
            Some(dir) => Journal::create_in(dir).unwrap_or_else(|err| {
                tracing::warn!(%err, dir = %dir.display(), "Failed to open session journal");
                Journal::disabled()
            }),
            None => Journal::disabled(),
        };
        let image_store = config
            .image_save_dir
            .clone()
            .and_then(ImageStore::create_or_fallback);

        Self {
            commands: CommandEngine::new(config.first_sequence_id, config.source_tag.clone()),
            host: None,
            port: 0,
            status: TelescopeStatus::default(),
            rotation: StatusRotation::default(),
            camera: CameraMachine::default(),
            snapshot_in_progress: false,
            exposure_owns_snapshot: false,
            parser: Box::new(TelemetryProcessor::default()),
            journal,
            save_images: image_store.is_some(),
            image_store,
            ping_sent_at: None,
            effects: Vec::new(),
            config,
        }
    }

    /// Replace the session journal.
    #[must_use]
    pub fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = journal;
        self
    }

    /// Replace the status parser.
    #[must_use]
    pub fn with_parser(mut self, parser: impl StatusParser + 'static) -> Self {
        self.parser = Box::new(parser);
        self
    }

    /// Session settings.
    pub const fn config(&self) -> &OriginConfig {
        &self.config
    }

    /// Drain the effects queued so far, oldest first.
    pub fn take_effects(&mut self) -> Vec<Effect> {
        std::mem::take(&mut self.effects)
    }

    fn emit(&mut self, event: Event) {
        self.effects.push(Effect::Emit(event));
    }

    // Connection lifecycle.

    /// Remember the endpoint and return the control channel URL to open.
    pub fn begin_connect(&mut self, host: &str, port: u16) -> String {
        self.host = Some(host.to_owned());
        self.port = port;
        let url = self.config.control_url(host, port);
        tracing::debug!(%url, "Connecting to telescope");
        url
    }

    /// The control channel is up.
    pub fn on_connected(&mut self) {
        self.status.is_connected = true;
        self.rotation.reset();
        self.ping_sent_at = None;
        let endpoint = format!("{}:{}", self.host.as_deref().unwrap_or_default(), self.port);
        tracing::info!(%endpoint, "Connected to telescope");
        self.journal
            .record(Direction::System, format_args!("Connected to {endpoint}"));

        self.effects.push(Effect::StartTimers);
        self.send_query(StatusQuery::Mount);
        self.emit(Event::Connected);
    }

    /// The control channel went down, either on request or because the link
    /// failed.
    pub fn on_disconnected(&mut self) {
        let was_connected = self.status.is_connected;
        self.status.mark_disconnected();
        self.ping_sent_at = None;
        self.end_snapshot();
        self.effects.push(Effect::StopTimers);

        if was_connected {
            tracing::info!("Disconnected from telescope");
            self.journal
                .record(Direction::System, "Disconnected from telescope");
            self.emit(Event::Disconnected);
        }
    }

    /// Close the control channel, stop the timers and drop all connection
    /// flags.
    pub fn disconnect(&mut self) {
        if self.status.is_connected {
            self.effects.push(Effect::Close);
        }
        self.on_disconnected();
    }

    /// The control channel reported an error.
    pub fn on_transport_error(&mut self, error: &OriginError) {
        tracing::warn!(%error, "Control channel error");
        self.journal.record(Direction::Error, error);
    }

    /// Assert or drop the logical mount connection.
    ///
    /// Asserting it requires the physical link.
    pub fn set_connected(&mut self, connected: bool) -> OriginResult {
        if connected && !self.status.is_connected {
            tracing::warn!("Cannot logically connect without a physical connection");
            return Err(OriginError::NotConnected);
        }
        self.status.is_logically_connected = connected;
        Ok(())
    }

    /// Assert or drop the logical camera connection.
    ///
    /// Asserting it requires the physical link.
    pub fn set_camera_connected(&mut self, connected: bool) -> OriginResult {
        if connected && !self.status.is_connected {
            tracing::warn!("Cannot logically connect camera without a physical connection");
            return Err(OriginError::NotConnected);
        }
        self.status.is_camera_logically_connected = connected;
        Ok(())
    }

    fn require_link(&self, operation: &'static str) -> OriginResult {
        if self.status.is_connected {
            Ok(())
        } else {
            tracing::warn!(operation, "Rejected: not connected");
            Err(OriginError::NotConnected)
        }
    }

    fn require_logical_connection(&self, operation: &'static str) -> OriginResult {
        self.require_link(operation)?;
        if self.status.is_logically_connected {
            Ok(())
        } else {
            tracing::warn!(operation, "Rejected: not logically connected");
            Err(OriginError::NotLogicallyConnected)
        }
    }

    // Outbound commands.

    /// Build and queue a command.
    ///
    /// Fire-and-forget: the response, if any, arrives later through
    /// [`Self::on_text`]. The sequence id is consumed even when the command is
    /// dropped because the control channel is down; in that case a warning
    /// is logged and `None` returned.
    pub fn send(
        &mut self,
        name: impl Into<Cow<'static, str>>,
        destination: Destination,
        params: Params,
    ) -> Option<SequenceId> {
        let command = self.commands.build(name, destination, params);
        if !self.status.is_connected {
            tracing::warn!(command = %command.name, %destination, "Cannot send command, control channel is down");
            return None;
        }
        let text = match command.encode() {
            Ok(text) => text,
            Err(err) => {
                tracing::warn!(%err, command = %command.name, "Failed to encode command");
                return None;
            }
        };
        tracing::debug!(sequence_id = %command.sequence_id, command = %command.name, %destination, "Sending command");
        self.journal.record(Direction::Send, &text);
        self.commands.record(&command, Instant::now());
        self.effects.push(Effect::Send(text));
        Some(command.sequence_id)
    }

    fn send_query(&mut self, query: StatusQuery) {
        let (name, destination) = query.command();
        let _ = self.send(name, destination, Params::new());
    }

    // Inbound traffic.

    /// Handle one text frame from the control channel.
    pub fn on_text(&mut self, text: &str) {
        let _span = tracing::debug_span!("inbound").entered();
        self.journal.record(Direction::Recv, text);

        let Some(message) = Inbound::parse(text) else {
            tracing::trace!("Dropping frame that is not a JSON object");
            return;
        };

        if self.parser.process_packet(text.as_bytes()) {
            self.status.refresh_from(self.parser.data());
            self.emit(Event::StatusUpdated(self.status.clone()));
        }

        match message.ty {
            MessageType::Notification => {
                if let Some(notification) = message.image_notification() {
                    self.on_image_ready(&notification);
                }
            }
            MessageType::Response => self.on_response(&message),
            MessageType::Command | MessageType::Other => {}
        }
    }

    fn on_response(&mut self, response: &Inbound) {
        let resolved = self.commands.resolve(response);
        let capture_failed = resolved
            .as_ref()
            .map_or(response.command == "RunSampleCapture", |(_, pending)| {
                pending.name == "RunSampleCapture"
            });
        let sequence_id = resolved.map(|(id, _)| id).or(response.sequence_id);

        if let Some(error) = response.device_error() {
            tracing::warn!(command = %response.command, ?sequence_id, %error, "Command failed");
            if capture_failed {
                self.end_snapshot();
            }
            self.emit(Event::CommandFailed {
                sequence_id,
                command: response.command.clone(),
                error,
            });
            return;
        }

        match response.command.as_str() {
            "RunSampleCapture" => tracing::debug!("Exposure command acknowledged"),
            "GetCaptureParameters" => {
                let parameters = CaptureParameters {
                    exposure: response.f64_field("Exposure"),
                    iso: response.i64_field("ISO"),
                };
                self.camera.capture = parameters;
                self.emit(Event::CaptureParametersChanged(parameters));
            }
            "GetEnableManual" | "SetEnableManual" | "SetEnableAuto"
                if response.contains("IsManual") =>
            {
                let manual = response.bool_field("IsManual");
                tracing::debug!(manual, "Camera mode");
                self.camera.manual_mode = Some(manual);
                self.emit(Event::CameraModeChanged { manual });
            }
            "GetCameraInfo" => {
                let camera_id = response.str_field("CameraID").to_owned();
                let model = response.str_field("CameraModel").to_owned();
                tracing::debug!(%camera_id, %model, "Camera info");
                self.emit(Event::CameraInfoReceived { camera_id, model });
            }
            _ => {}
        }
    }

    // Timers.

    /// Status rotation timer fired.
    pub fn on_status_tick(&mut self) {
        if !self.status.is_connected {
            return;
        }
        let query = self.rotation.next_query();
        tracing::trace!(?query, "Status tick");
        self.send_query(query);

        let expired = self
            .commands
            .expire(Instant::now(), self.config.pending_command_ttl);
        if expired > 0 {
            tracing::debug!(expired, "Dropped unanswered commands");
        }
    }

    /// Keep-alive timer fired.
    pub fn on_ping_tick(&mut self, now: Instant) {
        if !self.status.is_connected {
            return;
        }
        tracing::trace!("Sending keep-alive ping");
        self.ping_sent_at = Some(now);
        self.effects.push(Effect::Ping);
        self.journal.record(Direction::Ping, "Keep-alive ping sent");
    }

    /// A pong arrived on the control channel.
    pub fn on_pong(&mut self, now: Instant) {
        let Some(sent_at) = self.ping_sent_at.take() else {
            tracing::trace!("Ignoring unsolicited pong");
            return;
        };
        let rtt = now.saturating_duration_since(sent_at).as_millis();
        tracing::debug!(rtt_ms = rtt, "Pong received");
        self.journal
            .record(Direction::Pong, format_args!("RTT: {rtt}ms"));
    }

    // Image saving.

    /// Turn saving of downloaded images on or off.
    pub fn enable_image_saving(&mut self, enable: bool) {
        if enable && self.image_store.is_none() {
            tracing::warn!("Image saving enabled without a save directory");
        }
        self.save_images = enable;
    }

    /// Save images to `dir` from now on, creating it if needed.
    pub fn set_image_save_dir(&mut self, dir: impl Into<PathBuf>) -> OriginResult {
        let store = ImageStore::new(dir)?;
        tracing::debug!(dir = %store.dir().display(), "Image save directory changed");
        self.image_store = Some(store);
        Ok(())
    }

    /// Current image directory, if any.
    pub fn image_save_dir(&self) -> Option<&std::path::Path> {
        self.image_store.as_ref().map(ImageStore::dir)
    }

    // Queries.

    /// Physical link state.
    pub const fn is_connected(&self) -> bool {
        self.status.is_connected
    }

    /// Physical link plus caller-asserted mount connection.
    pub const fn is_logically_connected(&self) -> bool {
        self.status.is_connected && self.status.is_logically_connected
    }

    /// Physical link plus caller-asserted camera connection.
    pub const fn is_camera_connected(&self) -> bool {
        self.status.is_connected && self.status.is_camera_logically_connected
    }

    /// Host of the last connection attempt.
    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    /// Mount status.
    pub const fn status(&self) -> &TelescopeStatus {
        &self.status
    }

    /// Everything the status parser collected.
    pub fn telemetry(&self) -> &TelescopeData {
        self.parser.data()
    }

    /// Ambient temperature, °C.
    pub const fn temperature(&self) -> f64 {
        self.status.temperature
    }

    /// Whether the mount is tracking.
    pub const fn is_tracking(&self) -> bool {
        self.status.is_tracking
    }

    /// Camera state.
    pub const fn camera_state(&self) -> CameraState {
        self.camera.state
    }

    /// Whether an exposure is running.
    pub fn is_exposing(&self) -> bool {
        self.camera.state == CameraState::Exposing
    }

    /// Whether an image is available.
    pub const fn is_image_ready(&self) -> bool {
        self.camera.image_ready
    }

    /// Bytes of the last exposure download.
    pub const fn last_image_data(&self) -> &Bytes {
        &self.camera.last_image_data
    }

    /// Format of [`Self::last_image_data`].
    pub const fn last_image_format(&self) -> Option<ImageFormat> {
        self.camera.last_image_format
    }

    /// Remote path of the last exposure image.
    pub fn last_image_path(&self) -> Option<&str> {
        self.camera.last_image_path.as_deref()
    }

    /// Last decoded live frame.
    pub const fn last_image(&self) -> Option<&DynamicImage> {
        self.camera.last_image.as_ref()
    }

    /// Duration of the last exposure, seconds.
    pub const fn last_exposure_duration(&self) -> f64 {
        self.camera.last_exposure_duration
    }

    /// Start time of the last exposure.
    pub const fn last_exposure_start(&self) -> Option<OffsetDateTime> {
        self.camera.last_exposure_start
    }

    /// Gain of the last exposure or [`Self::set_gain`] call.
    pub const fn gain(&self) -> i64 {
        self.camera.gain
    }

    /// Capture parameters last reported by the camera.
    pub const fn capture_parameters(&self) -> CaptureParameters {
        self.camera.capture
    }

    /// Camera mode last reported, `None` if never.
    pub const fn camera_manual_mode(&self) -> Option<bool> {
        self.camera.manual_mode
    }

    /// Whether a snapshot download is outstanding.
    pub const fn is_snapshot_in_progress(&self) -> bool {
        self.snapshot_in_progress
    }

    /// Number of commands awaiting a response.
    pub fn pending_commands(&self) -> usize {
        self.commands.pending_len()
    }

    /// Id the next command will get.
    pub fn next_sequence_id(&self) -> SequenceId {
        self.commands.next_sequence_id()
    }

    /// Position of the status rotation, `0` meaning the mount query is next.
    pub const fn status_rotation_index(&self) -> usize {
        self.rotation.index()
    }
}
