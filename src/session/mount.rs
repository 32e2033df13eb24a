use super::Session;
use crate::errors::{OriginError, OriginResult};
use crate::protocol::{Destination, Params, params};
use crate::status::Operation;
use crate::units::{degrees_to_radians, hours_to_radians};
use num_enum::{IntoPrimitive, TryFromPrimitive};
use std::ops::RangeInclusive;
use time::OffsetDateTime;
use time::macros::format_description;

/// Manual slew direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum MoveDirection {
    /// Declination +.
    North = 0,
    /// Declination −.
    South = 1,
    /// Right ascension +.
    East = 2,
    /// Right ascension −.
    West = 3,
}

impl MoveDirection {
    /// `(Axis, Direction)` parameter values.
    const fn wire(self) -> (&'static str, &'static str) {
        match self {
            Self::North => ("Dec", "Positive"),
            Self::South => ("Dec", "Negative"),
            Self::East => ("Ra", "Positive"),
            Self::West => ("Ra", "Negative"),
        }
    }
}

const MOVE_SPEED: RangeInclusive<u8> = 0..=100;

impl Session {
    /// Slew to `ra` (hours) / `dec` (degrees).
    pub fn goto(&mut self, ra: f64, dec: f64) -> OriginResult {
        self.require_link("goto")?;
        let _ = self.send(
            "GotoRaDec",
            Destination::Mount,
            params! { Ra: hours_to_radians(ra), Dec: degrees_to_radians(dec) },
        );
        self.status.is_slewing = true;
        self.status.current_operation = Operation::Slewing;
        Ok(())
    }

    /// Tell the mount it is pointing at `ra` (hours) / `dec` (degrees).
    pub fn sync(&mut self, ra: f64, dec: f64) -> OriginResult {
        self.require_link("sync")?;
        let _ = self.send(
            "SyncToRaDec",
            Destination::Mount,
            params! { Ra: hours_to_radians(ra), Dec: degrees_to_radians(dec) },
        );
        Ok(())
    }

    /// Stop any axis movement.
    pub fn abort_motion(&mut self) -> OriginResult {
        self.require_link("abort_motion")?;
        let _ = self.send("AbortAxisMovement", Destination::Mount, Params::new());
        self.status.is_slewing = false;
        self.status.current_operation = Operation::Idle;
        Ok(())
    }

    /// Park the mount.
    pub fn park(&mut self) -> OriginResult {
        self.require_link("park")?;
        let _ = self.send("Park", Destination::Mount, Params::new());
        self.status.is_parked = true;
        self.status.current_operation = Operation::Parking;
        Ok(())
    }

    /// Unpark the mount.
    pub fn unpark(&mut self) -> OriginResult {
        self.require_link("unpark")?;
        let _ = self.send("Unpark", Destination::Mount, Params::new());
        self.status.is_parked = false;
        self.status.current_operation = Operation::Unparking;
        Ok(())
    }

    /// Run the mount's initialisation with the current UTC time and the
    /// configured site.
    pub fn initialize(&mut self) -> OriginResult {
        self.require_link("initialize")?;
        let now = OffsetDateTime::now_utc();
        let date = now
            .format(format_description!("[day] [month] [year]"))
            .unwrap_or_default();
        let time = now
            .format(format_description!("[hour]:[minute]:[second]"))
            .unwrap_or_default();
        let _ = self.send(
            "RunInitialize",
            Destination::TaskController,
            params! {
                Date: date,
                Time: time,
                TimeZone: "UTC",
                Latitude: degrees_to_radians(self.config.site_latitude_deg),
                Longitude: degrees_to_radians(self.config.site_longitude_deg),
                FakeInitialize: false,
            },
        );
        self.status.current_operation = Operation::Initializing;
        Ok(())
    }

    /// Move one axis at `speed` percent.
    pub fn move_axis(&mut self, direction: MoveDirection, speed: u8) -> OriginResult {
        self.require_link("move_axis")?;
        if !MOVE_SPEED.contains(&speed) {
            return Err(OriginError::invalid_value(format!(
                "move speed must be within {MOVE_SPEED:?}, got {speed}"
            )));
        }
        let (axis, sign) = direction.wire();
        let _ = self.send(
            "MoveAxis",
            Destination::Mount,
            params! { Axis: axis, Direction: sign, Speed: speed },
        );
        Ok(())
    }

    /// Turn sidereal tracking on or off.
    pub fn set_tracking(&mut self, enabled: bool) -> OriginResult {
        self.require_link("set_tracking")?;
        let name = if enabled { "StartTracking" } else { "StopTracking" };
        let _ = self.send(name, Destination::Mount, Params::new());
        self.status.is_tracking = enabled;
        Ok(())
    }
}
