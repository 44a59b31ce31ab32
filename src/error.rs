//! Error types for the WebSocket server.
//!
//! Errors fall into three families that the connection loop treats alike
//! once the handshake is done: handshake rejections, protocol violations and
//! transport failures. Server lifecycle misuse has its own variants.

use thiserror::Error;

use crate::connection::ConnectionState;

/// Result type alias for WebSocket operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while serving WebSocket connections.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// Opcode outside the six values defined by RFC 6455.
    #[error("Invalid opcode: {0:#x}")]
    InvalidOpcode(u8),

    /// Control frame with FIN=0.
    #[error("Control frames cannot be fragmented")]
    FragmentedControlFrame,

    /// Control frame declaring more than 125 payload bytes.
    #[error("Control frame payload too large: {0} bytes (max: 125)")]
    ControlFrameTooLarge(usize),

    /// Declared payload length exceeds the configured maximum.
    #[error("Frame too large: {size} bytes (max: {max})")]
    FrameTooLarge {
        /// Declared payload length.
        size: u64,
        /// Maximum allowed payload length.
        max: u64,
    },

    /// Continuation frame received; message fragmentation is not supported.
    #[error("Fragmented messages are not supported")]
    FragmentationUnsupported,

    /// Unmasked client frame while unmasked frames are not accepted.
    #[error("Client frame must be masked")]
    UnmaskedClientFrame,

    /// Reserved bits set while reserved-bit checking is enabled.
    #[error("Reserved bits set without negotiated extension")]
    ReservedBitsSet,

    /// Invalid UTF-8 in a text frame.
    #[error("Invalid UTF-8 in text frame")]
    InvalidUtf8,

    /// Buffer ended before the frame did.
    #[error("Incomplete frame: need {needed} more bytes")]
    IncompleteFrame {
        /// Number of additional bytes needed.
        needed: usize,
    },

    /// Upgrade request rejected.
    #[error("Invalid handshake: {0}")]
    InvalidHandshake(String),

    /// Upgrade request head exceeds the configured maximum.
    #[error("Handshake too large: {size} bytes (max: {max})")]
    HandshakeTooLarge {
        /// Bytes read so far.
        size: usize,
        /// Maximum allowed size.
        max: usize,
    },

    /// The connection is closing or closed.
    #[error("Connection closed")]
    ConnectionClosed,

    /// I/O error occurred.
    #[error("I/O error: {0}")]
    Io(String),

    /// Illegal lifecycle transition.
    #[error("Invalid state transition: {from} -> {to}")]
    InvalidStateTransition {
        /// State the connection was in.
        from: ConnectionState,
        /// State that was requested.
        to: ConnectionState,
    },

    /// `Server::start` called on a running server.
    #[error("Server already active")]
    AlreadyActive,

    /// `Server::stop` called on a server that is not running.
    #[error("Server is not active")]
    NotActive,

    /// The server has been disposed.
    #[error("Server has been disposed")]
    Disposed,

    /// Configuration value could not be used.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Whether this error is a violation of the framing protocol.
    ///
    /// Protocol errors end the connection without a close handshake.
    #[must_use]
    pub const fn is_protocol_error(&self) -> bool {
        matches!(
            self,
            Error::InvalidOpcode(_)
                | Error::FragmentedControlFrame
                | Error::ControlFrameTooLarge(_)
                | Error::FrameTooLarge { .. }
                | Error::FragmentationUnsupported
                | Error::UnmaskedClientFrame
                | Error::ReservedBitsSet
                | Error::InvalidUtf8
        )
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::UnexpectedEof {
            return Error::ConnectionClosed;
        }
        Error::Io(err.to_string())
    }
}

impl From<std::string::FromUtf8Error> for Error {
    fn from(_: std::string::FromUtf8Error) -> Self {
        Error::InvalidUtf8
    }
}
