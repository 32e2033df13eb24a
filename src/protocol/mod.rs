//! Wire format of the Origin control channel.
//!
//! Both directions carry single-line JSON objects. Outbound commands look like
//!
//! ```json
//! {"Command":"GotoRaDec","Destination":"Mount","SequenceID":2001,"Source":"AlpacaServer","Type":"Command","Ra":1.2,"Dec":0.3}
//! ```
//!
//! while inbound objects are tagged `Command`, `Response` or `Notification`
//! and may carry `ErrorCode` / `ErrorMessage` plus arbitrary payload fields.

mod command;
pub use command::{Command, Destination, Params, SequenceGenerator, SequenceId};
pub(crate) use command::params;

mod inbound;
pub use inbound::{ImageNotification, Inbound, MessageType};
pub(crate) use inbound::whole_number;
