//! Per-connection protocol driver and state machine.
//!
//! ## Connection Lifecycle
//!
//! 1. **Connecting** - socket accepted, upgrade request being read
//! 2. **Open** - handshake completed, frames flow
//! 3. **Closing** - close frame sent or received
//! 4. **Closed** - socket released
//!
//! A failed handshake or any protocol/transport error goes straight to
//! `Closed`.

mod state;

#[allow(clippy::module_inception)]
mod connection;

pub use connection::{CLOSE_MESSAGE, Connection, ConnectionId};
pub use state::{ConnectionState, Phase, StateMachine};
