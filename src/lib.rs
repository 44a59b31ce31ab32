//! # sockweb - WebSocket server over raw TCP
//!
//! `sockweb` is a server-side RFC 6455 WebSocket implementation built on
//! tokio. It performs the HTTP upgrade handshake, parses and emits frames,
//! tracks each connection's lifecycle and runs a watchdog that times out
//! stalled handshakes and pings idle connections.
//!
//! ## Features
//!
//! - **Single-frame messages**: continuation frames are a protocol error
//! - **Origin pinning**: only one configured `Origin` is accepted
//! - **Event channel**: connect, text, binary and disconnect notifications
//! - **Resource limits**: frame size, handshake size, connection count
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use sockweb::{Server, ServerConfig, ServerEvent};
//!
//! let (server, mut events) = Server::new(ServerConfig::from_env()?);
//! server.start().await?;
//!
//! while let Some(event) = events.recv().await {
//!     match event {
//!         ServerEvent::Text(conn, text) => conn.send_text(&text).await?,
//!         ServerEvent::Disconnected(conn, reason) => println!("{} left: {reason}", conn.id()),
//!         _ => {}
//!     }
//! }
//! ```

pub mod codec;
pub mod config;
pub mod connection;
pub mod error;
pub mod event;
pub mod protocol;
pub mod server;

pub use config::{Config, Limits, ServerConfig, Timeouts};
pub use connection::{Connection, ConnectionId, ConnectionState};
pub use error::{Error, Result};
pub use event::{DisconnectReason, Events, ServerEvent};
pub use protocol::{Frame, HandshakeRequest, HandshakeResponse, OpCode, WS_GUID, compute_accept_key};
pub use server::Server;
