//! Structured view of the device's status notifications.
//!
//! The session hands every inbound frame to a [`StatusParser`]. The default
//! [`TelemetryProcessor`] routes objects by their `Source` and keeps the
//! latest payload of every subsystem together with the time it was received.

use crate::protocol::whole_number;
use serde::de::{self, DeserializeOwned};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::fmt::Debug;
use time::OffsetDateTime;

/// Collaborator that turns raw status frames into [`TelescopeData`].
pub trait StatusParser: Send + Debug {
    /// Feed one raw frame.
    ///
    /// Returns `true` when mount or environment data was updated, which makes
    /// the session refresh its [`TelescopeStatus`](crate::status::TelescopeStatus).
    fn process_packet(&mut self, raw: &[u8]) -> bool;

    /// Latest known data.
    fn data(&self) -> &TelescopeData;
}

/// Value together with the time it was last refreshed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Stamped<T> {
    /// Last received value.
    pub value: T,
    /// When `value` was last replaced, `None` if never.
    pub updated_at: Option<OffsetDateTime>,
}

impl<T> Stamped<T> {
    fn replace(&mut self, value: T) {
        self.value = value;
        self.updated_at = Some(OffsetDateTime::now_utc());
    }
}

/// Mount status (`Source: Mount`).
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
#[allow(missing_docs)]
pub struct MountStatus {
    pub battery_level: String,
    pub battery_voltage: f64,
    pub battery_current: f64,
    pub charger_status: String,
    pub date: String,
    pub time: String,
    pub time_zone: String,
    pub latitude: f64,
    pub longitude: f64,
    pub is_aligned: bool,
    pub is_goto_over: bool,
    pub is_tracking: bool,
    #[serde(deserialize_with = "lenient_int")]
    pub num_align_refs: i64,
    #[serde(rename = "Alt")]
    pub altitude: f64,
    #[serde(rename = "Azm")]
    pub azimuth: f64,
    pub altitude_error: f64,
    pub azimuth_error: f64,
    /// First axis encoder, radians.
    #[serde(rename = "Enc0")]
    pub enc0: f64,
    /// Second axis encoder, radians.
    #[serde(rename = "Enc1")]
    pub enc1: f64,
}

/// Camera capture parameters (`Source: Camera`, `Command: GetCaptureParameters`).
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
#[allow(missing_docs)]
pub struct CameraStatus {
    #[serde(deserialize_with = "lenient_int")]
    pub binning: i64,
    #[serde(deserialize_with = "lenient_int")]
    pub bit_depth: i64,
    pub color_b_balance: f64,
    pub color_g_balance: f64,
    pub color_r_balance: f64,
    pub exposure: f64,
    #[serde(rename = "ISO", deserialize_with = "lenient_int")]
    pub iso: i64,
    #[serde(deserialize_with = "lenient_int")]
    pub offset: i64,
}

impl Default for CameraStatus {
    fn default() -> Self {
        Self {
            binning: 1,
            bit_depth: 0,
            color_b_balance: 0.0,
            color_g_balance: 0.0,
            color_r_balance: 0.0,
            exposure: 0.0,
            iso: 0,
            offset: 0,
        }
    }
}

/// Focuser status (`Source: Focuser`).
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
#[allow(missing_docs)]
pub struct FocuserStatus {
    #[serde(deserialize_with = "lenient_int")]
    pub backlash: i64,
    #[serde(deserialize_with = "lenient_int")]
    pub calibration_lower_limit: i64,
    #[serde(deserialize_with = "lenient_int")]
    pub calibration_upper_limit: i64,
    pub is_calibration_complete: bool,
    pub is_move_to_over: bool,
    pub need_auto_focus: bool,
    #[serde(deserialize_with = "lenient_int")]
    pub percentage_calibration_complete: i64,
    #[serde(deserialize_with = "lenient_int")]
    pub position: i64,
    pub requires_calibration: bool,
    pub velocity: f64,
}

/// Environment sensors (`Source: Environment`).
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
#[allow(missing_docs)]
pub struct EnvironmentStatus {
    pub ambient_temperature: f64,
    pub camera_temperature: f64,
    pub cpu_fan_on: bool,
    pub cpu_temperature: f64,
    pub dew_point: f64,
    pub front_cell_temperature: f64,
    pub humidity: f64,
    pub ota_fan_on: bool,
    pub recalibrating: bool,
}

/// Last image announced by the image server.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
#[allow(missing_docs)]
pub struct ImageInfo {
    pub file_location: String,
    pub image_type: String,
    pub dec: f64,
    pub ra: f64,
    pub orientation: f64,
    pub fov_x: f64,
    pub fov_y: f64,
}

/// Storage status (`Source: Disk`).
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
#[allow(missing_docs)]
pub struct DiskStatus {
    #[serde(deserialize_with = "lenient_int")]
    pub capacity: i64,
    #[serde(deserialize_with = "lenient_int")]
    pub free_bytes: i64,
    pub level: String,
}

/// Dew heater (`Source: DewHeater`).
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
#[allow(missing_docs)]
pub struct DewHeaterStatus {
    #[serde(deserialize_with = "lenient_int")]
    pub aggression: i64,
    pub heater_level: f64,
    pub manual_power_level: f64,
    pub mode: String,
}

/// Orientation sensor (`Source: OrientationSensor`).
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
#[allow(missing_docs)]
pub struct OrientationStatus {
    #[serde(deserialize_with = "lenient_int")]
    pub altitude: i64,
}

/// Everything the device has told us so far.
#[derive(Debug, Clone, Default, PartialEq)]
#[allow(missing_docs)]
pub struct TelescopeData {
    pub mount: Stamped<MountStatus>,
    pub camera: Stamped<CameraStatus>,
    pub focuser: Stamped<FocuserStatus>,
    pub environment: Stamped<EnvironmentStatus>,
    pub last_image: Stamped<ImageInfo>,
    pub disk: Stamped<DiskStatus>,
    pub dew_heater: Stamped<DewHeaterStatus>,
    pub orientation: Stamped<OrientationStatus>,
}

/// Default [`StatusParser`].
#[derive(Debug, Default)]
pub struct TelemetryProcessor {
    data: TelescopeData,
}

impl TelemetryProcessor {
    /// Forget everything received so far.
    pub fn reset(&mut self) {
        self.data = TelescopeData::default();
    }

    fn process_value(&mut self, value: Value) -> bool {
        let Some(component) = Component::route(&value) else {
            return false;
        };

        let data = &mut self.data;
        let updated = match component {
            Component::Mount => update(&mut data.mount, value),
            Component::Camera => update(&mut data.camera, value),
            Component::Focuser => update(&mut data.focuser, value),
            Component::Environment => update(&mut data.environment, value),
            Component::Image => update(&mut data.last_image, value),
            Component::Disk => update(&mut data.disk, value),
            Component::DewHeater => update(&mut data.dew_heater, value),
            Component::Orientation => update(&mut data.orientation, value),
        };
        updated && matches!(component, Component::Mount | Component::Environment)
    }
}

#[derive(Debug, Clone, Copy)]
enum Component {
    Mount,
    Camera,
    Focuser,
    Environment,
    Image,
    Disk,
    DewHeater,
    Orientation,
}

impl Component {
    fn route(value: &Value) -> Option<Self> {
        let Value::Object(object) = value else {
            tracing::debug!("Telemetry frame is not a JSON object");
            return None;
        };
        let field = |key: &str| object.get(key).and_then(Value::as_str).unwrap_or_default();

        if !matches!(field("Type"), "Notification" | "Response") {
            return None;
        }

        Some(match (field("Source"), field("Command")) {
            ("Mount", "GetStatus") => Self::Mount,
            ("Camera", "GetCaptureParameters") => Self::Camera,
            ("Focuser", _) => Self::Focuser,
            ("Environment", _) => Self::Environment,
            ("ImageServer", "NewImageReady") => Self::Image,
            ("Disk", _) => Self::Disk,
            ("DewHeater", _) => Self::DewHeater,
            ("OrientationSensor", _) => Self::Orientation,
            _ => return None,
        })
    }
}

/// Integer field that also accepts whole-number floats such as `400.0`.
fn lenient_int<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    let number = serde_json::Number::deserialize(deserializer)?;
    number
        .as_i64()
        .or_else(|| number.as_f64().and_then(whole_number))
        .ok_or_else(|| de::Error::custom(format_args!("{number} is not an integer")))
}

/// Replace `slot` with the decoded payload. Mistyped payloads are logged and
/// leave the previous value in place.
fn update<T: DeserializeOwned>(slot: &mut Stamped<T>, value: Value) -> bool {
    match T::deserialize(value) {
        Ok(parsed) => {
            slot.replace(parsed);
            true
        }
        Err(err) => {
            tracing::warn!(%err, ty = std::any::type_name::<T>(), "Ignoring malformed status payload");
            false
        }
    }
}

impl StatusParser for TelemetryProcessor {
    fn process_packet(&mut self, raw: &[u8]) -> bool {
        match serde_json::from_slice(raw) {
            Ok(value) => self.process_value(value),
            Err(err) => {
                tracing::debug!(%err, "Telemetry frame is not valid JSON");
                false
            }
        }
    }

    fn data(&self) -> &TelescopeData {
        &self.data
    }
}
