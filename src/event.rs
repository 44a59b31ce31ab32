//! Notifications delivered from the server to the embedding application.

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::connection::Connection;
use crate::error::Error;

/// Why a connection left the `Open`/`Closing` states.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The close handshake completed.
    Closed,
    /// Closed by this side without a close handshake (watchdog, shutdown, application).
    Local,
    /// A protocol or transport error.
    Error(Error),
}

impl std::fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DisconnectReason::Closed => write!(f, "closed"),
            DisconnectReason::Local => write!(f, "closed locally"),
            DisconnectReason::Error(e) => write!(f, "error: {e}"),
        }
    }
}

/// A server notification.
///
/// For one connection, events arrive in order: `Connected`, any number of
/// `Text`/`Binary`, then `Disconnected`. A connection whose handshake fails
/// produces no events at all.
#[derive(Debug, Clone)]
pub enum ServerEvent {
    /// Handshake completed; the connection is `Open`.
    Connected(Arc<Connection>),
    /// A text frame arrived.
    Text(Arc<Connection>, String),
    /// A binary frame arrived.
    Binary(Arc<Connection>, Bytes),
    /// A previously connected connection was closed.
    Disconnected(Arc<Connection>, DisconnectReason),
}

impl ServerEvent {
    /// The connection this event concerns.
    pub fn connection(&self) -> &Arc<Connection> {
        match self {
            ServerEvent::Connected(conn)
            | ServerEvent::Text(conn, _)
            | ServerEvent::Binary(conn, _)
            | ServerEvent::Disconnected(conn, _) => conn,
        }
    }
}

/// Receiving end of the server's event stream.
pub type Events = mpsc::UnboundedReceiver<ServerEvent>;

pub(crate) type EventSender = mpsc::UnboundedSender<ServerEvent>;
