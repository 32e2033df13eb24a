use crate::protocol::Destination;

/// One of the periodic status queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusQuery {
    /// `GetStatus` → `Mount`.
    Mount,
    /// `GetStatus` → `Environment`.
    Environment,
    /// `GetCaptureParameters` → `Camera`.
    CaptureParameters,
}

impl StatusQuery {
    const ROTATION: [Self; 3] = [Self::Mount, Self::Environment, Self::CaptureParameters];

    /// Command name and destination.
    pub const fn command(self) -> (&'static str, Destination) {
        match self {
            Self::Mount => ("GetStatus", Destination::Mount),
            Self::Environment => ("GetStatus", Destination::Environment),
            Self::CaptureParameters => ("GetCaptureParameters", Destination::Camera),
        }
    }
}

/// Round-robin over [`StatusQuery`], one per tick.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct StatusRotation {
    index: usize,
}

impl StatusRotation {
    pub(crate) fn next_query(&mut self) -> StatusQuery {
        let query = StatusQuery::ROTATION[self.index];
        self.index = (self.index + 1) % StatusQuery::ROTATION.len();
        query
    }

    /// Start again from [`StatusQuery::Mount`].
    pub(crate) fn reset(&mut self) {
        self.index = 0;
    }

    pub(crate) const fn index(&self) -> usize {
        self.index
    }
}
