//! Transport to the controller service
//!
//! A persistent WebSocket carrying JSON `{type, data}` frames.

mod connection;
pub mod protocol;

pub use connection::{Connection, ConnectionState};
pub use protocol::{Decoder, OutboundFrame};

#[cfg(test)]
pub(crate) use connection::ClientCommand;
