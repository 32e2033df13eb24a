use super::SequenceId;
use crate::errors::DeviceError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Value of the `Type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageType {
    /// A request, as sent by us.
    Command,
    /// Reply to a command.
    Response,
    /// Unsolicited message from the device.
    Notification,
    /// Anything else, including a missing `Type`.
    #[serde(other)]
    Other,
}

impl MessageType {
    fn from_field(value: Option<&Value>) -> Self {
        match value.and_then(Value::as_str) {
            Some("Command") => Self::Command,
            Some("Response") => Self::Response,
            Some("Notification") => Self::Notification,
            _ => Self::Other,
        }
    }
}

/// A JSON object received on the control channel.
///
/// Field access is lenient in the same way the device is: missing or
/// mistyped fields read as their zero value.
#[derive(Debug, Clone)]
pub struct Inbound {
    /// Message class.
    pub ty: MessageType,
    /// `Command` field (may be empty).
    pub command: String,
    /// `Source` field (may be empty).
    pub source: String,
    /// `SequenceID` echoed back by the device, if any.
    pub sequence_id: Option<SequenceId>,
    /// The whole object.
    pub body: serde_json::Map<String, Value>,
}

/// Payload of a `NewImageReady` notification.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageNotification {
    /// Remote file path relative to the image root, e.g. `Images/Temp/0.jpg`.
    pub file_location: String,
    /// Right ascension in radians.
    pub ra: f64,
    /// Declination in radians.
    pub dec: f64,
    /// Exposure duration in seconds.
    pub exposure: f64,
}

impl Inbound {
    /// Parse a text frame. Anything that isn't a JSON object yields `None`.
    pub fn parse(text: &str) -> Option<Self> {
        let Ok(Value::Object(body)) = serde_json::from_str::<Value>(text) else {
            return None;
        };

        Some(Self {
            ty: MessageType::from_field(body.get("Type")),
            command: str_of(body.get("Command")).to_owned(),
            source: str_of(body.get("Source")).to_owned(),
            sequence_id: body
                .get("SequenceID")
                .and_then(Value::as_u64)
                .map(SequenceId::from),
            body,
        })
    }

    /// Whether the object has the given key at all.
    pub fn contains(&self, key: &str) -> bool {
        self.body.contains_key(key)
    }

    /// String field, empty if absent.
    pub fn str_field(&self, key: &str) -> &str {
        str_of(self.body.get(key))
    }

    /// Numeric field, `0.0` if absent.
    pub fn f64_field(&self, key: &str) -> f64 {
        self.body.get(key).and_then(Value::as_f64).unwrap_or_default()
    }

    /// Integral field, `0` if absent or out of range. Whole floats are accepted.
    pub fn i64_field(&self, key: &str) -> i64 {
        match self.body.get(key) {
            Some(value) => value
                .as_i64()
                .or_else(|| value.as_f64().and_then(whole_number))
                .unwrap_or_default(),
            None => 0,
        }
    }

    /// Boolean field, `false` if absent.
    pub fn bool_field(&self, key: &str) -> bool {
        self.body
            .get(key)
            .and_then(Value::as_bool)
            .unwrap_or_default()
    }

    /// The error carried by a `Response` with a non-zero `ErrorCode`.
    pub fn device_error(&self) -> Option<DeviceError> {
        if self.ty != MessageType::Response {
            return None;
        }
        match self.i64_field("ErrorCode") {
            0 => None,
            code => Some(DeviceError::new(code, self.str_field("ErrorMessage"))),
        }
    }

    /// Decode a `NewImageReady` notification.
    pub fn image_notification(&self) -> Option<ImageNotification> {
        if self.ty != MessageType::Notification || self.command != "NewImageReady" {
            return None;
        }
        Some(ImageNotification {
            file_location: self.str_field("FileLocation").to_owned(),
            ra: self.f64_field("Ra"),
            dec: self.f64_field("Dec"),
            exposure: self.f64_field("ExposureTime"),
        })
    }
}

fn str_of(value: Option<&Value>) -> &str {
    value.and_then(Value::as_str).unwrap_or_default()
}

#[expect(clippy::as_conversions, clippy::cast_possible_truncation)]
pub(crate) fn whole_number(value: f64) -> Option<i64> {
    (value.fract() == 0.0 && value.abs() < 9.0e15).then_some(value as i64)
}
