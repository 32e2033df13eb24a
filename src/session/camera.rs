use crate::errors::{OriginError, OriginResult};
use bytes::Bytes;
use image::DynamicImage;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde_repr::{Deserialize_repr, Serialize_repr};
use time::OffsetDateTime;

/// Exposure state of the camera.
#[derive(
    Debug,
    Default,
    PartialEq,
    Eq,
    Clone,
    Copy,
    Serialize_repr,
    Deserialize_repr,
    TryFromPrimitive,
    IntoPrimitive,
    derive_more::Display,
)]
#[repr(u8)]
pub enum CameraState {
    /// Available to start an exposure.
    #[default]
    Idle = 0,

    /// Exposure in progress.
    Exposing = 1,

    /// Exposure finished, image being downloaded.
    Reading = 2,

    /// The last download failed. Cleared with [`Session::clear_camera_error`](super::Session::clear_camera_error).
    Error = 3,
}

/// Format of a downloaded image, from the remote file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum ImageFormat {
    /// `.jpg` / `.jpeg`
    #[display("JPEG")]
    Jpeg,
    /// `.tif` / `.tiff`
    #[display("TIFF")]
    Tiff,
    /// Anything else.
    #[display("RAW")]
    Raw,
}

impl ImageFormat {
    /// Classify a remote path, case-insensitively.
    pub fn from_path(path: &str) -> Self {
        let lower = path.to_ascii_lowercase();
        if lower.ends_with(".jpg") || lower.ends_with(".jpeg") {
            Self::Jpeg
        } else if lower.ends_with(".tif") || lower.ends_with(".tiff") {
            Self::Tiff
        } else {
            Self::Raw
        }
    }
}

/// Capture settings last reported by (or sent to) the camera.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CaptureParameters {
    /// Exposure, seconds.
    pub exposure: f64,
    /// ISO.
    pub iso: i64,
}

impl Default for CaptureParameters {
    fn default() -> Self {
        Self {
            exposure: 0.1,
            iso: 200,
        }
    }
}

/// Exposure state machine plus the data attached to the last exposure.
#[derive(Debug, Clone)]
pub(crate) struct CameraMachine {
    pub(crate) state: CameraState,
    pub(crate) last_exposure_duration: f64,
    pub(crate) gain: i64,
    pub(crate) last_exposure_start: Option<OffsetDateTime>,
    pub(crate) image_ready: bool,
    pub(crate) last_image_data: Bytes,
    pub(crate) last_image_format: Option<ImageFormat>,
    pub(crate) last_image_path: Option<String>,
    pub(crate) last_image: Option<DynamicImage>,
    pub(crate) capture: CaptureParameters,
    pub(crate) manual_mode: Option<bool>,
}

impl Default for CameraMachine {
    fn default() -> Self {
        Self {
            state: CameraState::Idle,
            last_exposure_duration: 0.0,
            gain: 200,
            last_exposure_start: None,
            image_ready: false,
            last_image_data: Bytes::new(),
            last_image_format: None,
            last_image_path: None,
            last_image: None,
            capture: CaptureParameters::default(),
            manual_mode: None,
        }
    }
}

impl CameraMachine {
    /// Idle → Exposing.
    pub(crate) fn begin_exposure(&mut self, duration: f64, gain: i64) -> OriginResult {
        if self.state != CameraState::Idle {
            return Err(OriginError::CameraBusy(self.state));
        }
        if !duration.is_finite() || duration < 0.0 {
            return Err(OriginError::invalid_value(format!(
                "exposure duration must be a non-negative number of seconds, got {duration}"
            )));
        }

        self.last_exposure_duration = duration;
        self.gain = gain;
        self.last_exposure_start = Some(OffsetDateTime::now_utc());
        self.image_ready = false;
        self.last_image_data = Bytes::new();
        self.state = CameraState::Exposing;
        Ok(())
    }

    /// Exposing → Reading, when the image for the running exposure shows up.
    ///
    /// Returns whether the exposure was running.
    pub(crate) fn exposure_complete(&mut self, remote_path: &str) -> bool {
        if self.state != CameraState::Exposing {
            return false;
        }
        self.last_image_path = Some(remote_path.to_owned());
        self.state = CameraState::Reading;
        true
    }

    /// Reading → Idle, caching the downloaded bytes.
    pub(crate) fn finish_download(&mut self, remote_path: &str, data: Bytes) {
        self.last_image_format = Some(ImageFormat::from_path(remote_path));
        self.last_image_data = data;
        self.last_image_path = Some(remote_path.to_owned());
        self.image_ready = true;
        if self.state == CameraState::Reading {
            self.state = CameraState::Idle;
        } else {
            tracing::debug!(state = ?self.state, "Exposure download finished outside of Reading");
        }
    }

    /// Reading → Error.
    pub(crate) fn fail_download(&mut self) -> bool {
        if self.state != CameraState::Reading {
            return false;
        }
        self.state = CameraState::Error;
        true
    }

    /// Exposing → Idle.
    pub(crate) fn abort(&mut self) -> OriginResult {
        self.expect_state(CameraState::Exposing)?;
        self.state = CameraState::Idle;
        Ok(())
    }

    /// Error → Idle.
    pub(crate) fn clear_error(&mut self) -> OriginResult {
        self.expect_state(CameraState::Error)?;
        self.state = CameraState::Idle;
        Ok(())
    }

    /// Cache a decoded live frame.
    pub(crate) fn set_live_image(&mut self, image: DynamicImage) {
        self.last_image = Some(image);
        self.image_ready = true;
    }

    fn expect_state(&self, expected: CameraState) -> OriginResult {
        if self.state == expected {
            Ok(())
        } else {
            Err(OriginError::InvalidCameraState {
                expected,
                actual: self.state,
            })
        }
    }
}
