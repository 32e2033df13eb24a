use super::MessageType;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::borrow::Cow;

/// Free-form command parameters merged into the outbound object.
pub type Params = serde_json::Map<String, serde_json::Value>;

/// Build [`Params`] from `Key: value` pairs, using the key names verbatim.
macro_rules! params {
    ($($key:ident: $value:expr),* $(,)?) => {{
        #[allow(unused_mut)]
        let mut params = $crate::protocol::Params::new();
        $(
            let _ = params.insert(stringify!($key).to_owned(), serde_json::json!($value));
        )*
        params
    }};
}
pub(crate) use params;

/// Keys owned by the envelope; parameters can't override them.
const ENVELOPE_KEYS: [&str; 5] = ["Command", "Destination", "SequenceID", "Source", "Type"];

/// Per-session command tag, strictly increasing.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    derive_more::Display,
    derive_more::From,
    derive_more::Into,
)]
#[serde(transparent)]
pub struct SequenceId(u64);

/// Hands out sequence ids starting from a fixed seed.
#[derive(Debug, Clone, Copy)]
pub struct SequenceGenerator {
    next: u64,
}

impl SequenceGenerator {
    /// Create a generator whose first id is `first`.
    pub const fn starting_at(first: u64) -> Self {
        Self { next: first }
    }

    /// Id that the next call to [`Self::next_id`] will return.
    pub const fn peek(&self) -> SequenceId {
        SequenceId(self.next)
    }

    /// Allocate the next id.
    pub const fn next_id(&mut self) -> SequenceId {
        let id = SequenceId(self.next);
        self.next += 1;
        id
    }
}

/// Logical device subsystem a command is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, derive_more::Display)]
#[allow(missing_docs)]
pub enum Destination {
    Mount,
    Camera,
    TaskController,
    LiveStream,
    Environment,
    Focuser,
    ImageServer,
}

/// Outbound command object.
///
/// Serializes as a flat JSON object: the envelope fields
/// (`Command`, `Destination`, `SequenceID`, `Source`, `Type`) followed by the
/// parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    /// Command name, e.g. `GotoRaDec`.
    pub name: Cow<'static, str>,
    /// Target subsystem.
    pub destination: Destination,
    /// Sequence id assigned at build time.
    pub sequence_id: SequenceId,
    /// Tag identifying this client to the device.
    pub source: Cow<'static, str>,
    /// Caller parameters.
    pub params: Params,
}

impl Serialize for Command {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("Command", &self.name)?;
        map.serialize_entry("Destination", &self.destination)?;
        map.serialize_entry("SequenceID", &self.sequence_id)?;
        map.serialize_entry("Source", &self.source)?;
        map.serialize_entry("Type", &MessageType::Command)?;
        for (key, value) in &self.params {
            if ENVELOPE_KEYS.contains(&key.as_str()) {
                tracing::warn!(key, command = %self.name, "Ignoring parameter that clashes with the envelope");
                continue;
            }
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

impl Command {
    /// Serialize to the single-line compact JSON used on the wire.
    pub fn encode(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
