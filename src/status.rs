//! Mount status derived from telemetry.

use crate::telemetry::TelescopeData;
use crate::units::{radians_to_degrees, radians_to_hours};
use serde::Serialize;

/// Altitude reported until real horizontal coordinates are computed.
const PLACEHOLDER_ALTITUDE: f64 = 45.0;
/// Azimuth reported until real horizontal coordinates are computed.
const PLACEHOLDER_AZIMUTH: f64 = 180.0;

/// What the mount is currently busy with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, derive_more::Display)]
#[allow(missing_docs)]
pub enum Operation {
    #[default]
    Idle,
    Slewing,
    Tracking,
    Parking,
    Unparking,
    Initializing,
}

/// Session-level view of the mount.
///
/// Mutated by command acknowledgements and status responses, never directly
/// by callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelescopeStatus {
    /// Altitude, degrees (placeholder).
    pub alt: f64,
    /// Azimuth, degrees (placeholder).
    pub az: f64,
    /// Right ascension, hours.
    pub ra: f64,
    /// Declination, degrees.
    pub dec: f64,
    /// Physical link is up.
    pub is_connected: bool,
    /// Caller asserted a logical mount connection.
    pub is_logically_connected: bool,
    /// Caller asserted a logical camera connection.
    pub is_camera_logically_connected: bool,
    /// A goto is in progress.
    pub is_slewing: bool,
    /// Sidereal tracking is on.
    pub is_tracking: bool,
    /// Mount was parked by us.
    pub is_parked: bool,
    /// Mount reports a completed alignment.
    pub is_aligned: bool,
    /// Current activity.
    pub current_operation: Operation,
    /// Ambient temperature, °C.
    pub temperature: f64,
}

impl Default for TelescopeStatus {
    fn default() -> Self {
        Self {
            alt: 0.0,
            az: 0.0,
            ra: 0.0,
            dec: 0.0,
            is_connected: false,
            is_logically_connected: false,
            is_camera_logically_connected: false,
            is_slewing: false,
            is_tracking: false,
            is_parked: false,
            is_aligned: false,
            current_operation: Operation::Idle,
            temperature: 20.0,
        }
    }
}

impl TelescopeStatus {
    /// Overwrite position, motion flags and temperature from parsed telemetry.
    pub fn refresh_from(&mut self, data: &TelescopeData) {
        let mount = &data.mount.value;

        self.is_tracking = mount.is_tracking;
        self.is_slewing = !mount.is_goto_over;
        self.is_aligned = mount.is_aligned;

        self.ra = radians_to_hours(mount.enc0);
        self.dec = radians_to_degrees(mount.enc1);
        self.alt = PLACEHOLDER_ALTITUDE;
        self.az = PLACEHOLDER_AZIMUTH;

        self.temperature = data.environment.value.ambient_temperature;

        self.current_operation = if self.is_slewing {
            Operation::Slewing
        } else if self.is_tracking {
            Operation::Tracking
        } else {
            Operation::Idle
        };
    }

    /// Drop every connection flag after the link went away.
    pub(crate) fn mark_disconnected(&mut self) {
        self.is_connected = false;
        self.is_logically_connected = false;
        self.is_camera_logically_connected = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::{EnvironmentStatus, MountStatus, Stamped};
    use std::f64::consts::PI;

    fn data(mount: MountStatus, ambient_temperature: f64) -> TelescopeData {
        TelescopeData {
            mount: Stamped {
                value: mount,
                updated_at: None,
            },
            environment: Stamped {
                value: EnvironmentStatus {
                    ambient_temperature,
                    ..EnvironmentStatus::default()
                },
                updated_at: None,
            },
            ..TelescopeData::default()
        }
    }

    #[test]
    fn converts_encoders_and_temperature() {
        let mut status = TelescopeStatus::default();
        status.refresh_from(&data(
            MountStatus {
                enc0: PI / 2.0,
                enc1: PI / 4.0,
                is_goto_over: true,
                ..MountStatus::default()
            },
            7.5,
        ));

        assert!((status.ra - 6.0).abs() < 1e-9);
        assert!((status.dec - 45.0).abs() < 1e-9);
        assert_eq!(status.alt, PLACEHOLDER_ALTITUDE);
        assert_eq!(status.az, PLACEHOLDER_AZIMUTH);
        assert_eq!(status.temperature, 7.5);
        assert_eq!(status.current_operation, Operation::Idle);
    }

    #[test]
    fn slewing_wins_over_tracking() {
        let mut status = TelescopeStatus::default();
        status.refresh_from(&data(
            MountStatus {
                is_goto_over: false,
                is_tracking: true,
                ..MountStatus::default()
            },
            0.0,
        ));
        assert!(status.is_slewing);
        assert_eq!(status.current_operation, Operation::Slewing);

        status.refresh_from(&data(
            MountStatus {
                is_goto_over: true,
                is_tracking: true,
                is_aligned: true,
                ..MountStatus::default()
            },
            0.0,
        ));
        assert!(!status.is_slewing);
        assert!(status.is_aligned);
        assert_eq!(status.current_operation, Operation::Tracking);
        assert_eq!(status.current_operation.to_string(), "Tracking");
    }

    #[test]
    fn refresh_keeps_connection_flags() {
        let mut status = TelescopeStatus {
            is_connected: true,
            is_logically_connected: true,
            ..TelescopeStatus::default()
        };
        status.refresh_from(&TelescopeData::default());
        assert!(status.is_connected && status.is_logically_connected);

        status.mark_disconnected();
        assert!(!status.is_connected);
        assert!(!status.is_logically_connected);
        assert!(!status.is_camera_logically_connected);
    }
}
