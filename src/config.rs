//! Configuration and limits for the server and its connections.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use crate::error::{Error, Result};

/// Largest payload accepted in a single frame: 2,000,000 bytes.
pub const MAX_FRAME_SIZE: u64 = 2_000_000;

/// Default listening port.
pub const DEFAULT_PORT: u16 = 6360;

/// Default accepted `Origin` header value.
pub const DEFAULT_ORIGIN: &str = "http://localhost";

/// Resource limits for connections.
///
/// These limits keep a single misbehaving client from forcing unbounded
/// allocations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Limits {
    /// Maximum payload size of a single frame in bytes.
    ///
    /// Checked against the declared length before any payload byte is read.
    ///
    /// Default: 2,000,000
    pub max_frame_size: u64,

    /// Maximum size of the upgrade request head in bytes.
    ///
    /// Default: 8 KB (8192)
    pub max_handshake_size: usize,

    /// Maximum number of live connections, `None` for unlimited.
    ///
    /// Default: None
    pub max_connections: Option<usize>,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_frame_size: MAX_FRAME_SIZE,
            max_handshake_size: 8192,
            max_connections: None,
        }
    }
}

impl Limits {
    /// Create new limits with custom values.
    #[must_use]
    pub const fn new(
        max_frame_size: u64,
        max_handshake_size: usize,
        max_connections: Option<usize>,
    ) -> Self {
        Self {
            max_frame_size,
            max_handshake_size,
            max_connections,
        }
    }

    /// Validate that a declared frame payload length is within limits.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FrameTooLarge`] if `size` exceeds the configured maximum.
    pub const fn check_frame_size(&self, size: u64) -> Result<()> {
        if size > self.max_frame_size {
            Err(Error::FrameTooLarge {
                size,
                max: self.max_frame_size,
            })
        } else {
            Ok(())
        }
    }

    /// Validate that the handshake read so far is within limits.
    ///
    /// # Errors
    ///
    /// Returns [`Error::HandshakeTooLarge`] if `size` exceeds the configured maximum.
    pub const fn check_handshake_size(&self, size: usize) -> Result<()> {
        if size > self.max_handshake_size {
            Err(Error::HandshakeTooLarge {
                size,
                max: self.max_handshake_size,
            })
        } else {
            Ok(())
        }
    }

    /// Whether another connection may be admitted when `current` are live.
    #[must_use]
    pub const fn admits(&self, current: usize) -> bool {
        match self.max_connections {
            Some(max) => current < max,
            None => true,
        }
    }
}

/// Timeouts enforced by the server watchdog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timeouts {
    /// Time a connection may spend in the handshake before it is dropped.
    ///
    /// Default: 10 seconds
    pub handshake: Duration,

    /// Silence since the last pong after which the watchdog sends a ping.
    ///
    /// Default: 30 seconds
    pub keepalive: Duration,

    /// Interval between watchdog sweeps.
    ///
    /// Default: 15 seconds
    pub watchdog_interval: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            handshake: Duration::from_secs(10),
            keepalive: Duration::from_secs(30),
            watchdog_interval: Duration::from_secs(15),
        }
    }
}

impl Timeouts {
    /// Create new timeouts with custom values.
    #[must_use]
    pub const fn new(handshake: Duration, keepalive: Duration, watchdog_interval: Duration) -> Self {
        Self {
            handshake,
            keepalive,
            watchdog_interval,
        }
    }

    /// Check that the watchdog can run with these timeouts.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if `watchdog_interval` is zero.
    pub fn validate(&self) -> Result<()> {
        if self.watchdog_interval.is_zero() {
            return Err(Error::InvalidConfig(
                "watchdog interval must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

/// Per-connection configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Resource limits.
    pub limits: Limits,

    /// Watchdog timeouts.
    pub timeouts: Timeouts,

    /// Accept unmasked frames from clients.
    ///
    /// RFC 6455 requires clients to mask every frame. Unmasked frames are
    /// tolerated unless this is set to `false`, in which case they are a
    /// protocol error.
    ///
    /// Default: true
    pub accept_unmasked_frames: bool,

    /// Reject frames with any RSV bit set.
    ///
    /// No extensions are negotiated, so set bits are meaningless. They are
    /// ignored unless this is enabled.
    ///
    /// Default: false
    pub reject_reserved_bits: bool,

    /// Read buffer size (in bytes).
    ///
    /// Default: 8 KB (8192)
    pub read_buffer_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            limits: Limits::default(),
            timeouts: Timeouts::default(),
            accept_unmasked_frames: true,
            reject_reserved_bits: false,
            read_buffer_size: 8192,
        }
    }
}

impl Config {
    /// Create a new configuration with default limits.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set custom limits.
    #[must_use]
    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Set watchdog timeouts.
    #[must_use]
    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Set whether unmasked client frames are accepted.
    #[must_use]
    pub const fn with_accept_unmasked(mut self, accept: bool) -> Self {
        self.accept_unmasked_frames = accept;
        self
    }

    /// Set whether frames with RSV bits set are rejected.
    #[must_use]
    pub const fn with_reject_reserved_bits(mut self, reject: bool) -> Self {
        self.reject_reserved_bits = reject;
        self
    }

    /// Set read buffer size.
    #[must_use]
    pub const fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size;
        self
    }
}

/// Server configuration: where to listen and which origin to accept.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the listener to. Port 0 picks an ephemeral port.
    pub bind_addr: SocketAddr,

    /// The only accepted `Origin` header value, compared case-sensitively.
    pub origin: String,

    /// Configuration applied to every accepted connection.
    pub connection: Config,
}

impl ServerConfig {
    /// Create a server configuration with default connection settings.
    #[must_use]
    pub fn new(addr: IpAddr, port: u16, origin: impl Into<String>) -> Self {
        Self {
            bind_addr: SocketAddr::new(addr, port),
            origin: origin.into(),
            connection: Config::default(),
        }
    }

    /// Set the per-connection configuration.
    #[must_use]
    pub fn with_connection_config(mut self, config: Config) -> Self {
        self.connection = config;
        self
    }

    /// Loads configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv().ok()` first so a `.env` file is honoured.
    /// Unset numeric variables fall back to their defaults.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `SOCKWEB_BIND_ADDR` | `0.0.0.0:6360` |
    /// | `SOCKWEB_ORIGIN` | `http://localhost` |
    /// | `SOCKWEB_MAX_FRAME_SIZE` | `2000000` |
    /// | `SOCKWEB_MAX_CONNECTIONS` | unlimited |
    /// | `SOCKWEB_HANDSHAKE_TIMEOUT_SECS` | `10` |
    /// | `SOCKWEB_KEEPALIVE_SECS` | `30` |
    /// | `SOCKWEB_WATCHDOG_INTERVAL_SECS` | `15` |
    /// | `SOCKWEB_ACCEPT_UNMASKED` | `true` |
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if `SOCKWEB_BIND_ADDR` is set but is
    /// not a socket address, or if `SOCKWEB_WATCHDOG_INTERVAL_SECS` is zero.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let default_addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), DEFAULT_PORT);
        let bind_addr = match std::env::var("SOCKWEB_BIND_ADDR") {
            Ok(raw) => raw
                .parse()
                .map_err(|_| Error::InvalidConfig(format!("SOCKWEB_BIND_ADDR: {raw}")))?,
            Err(_) => default_addr,
        };

        let origin =
            std::env::var("SOCKWEB_ORIGIN").unwrap_or_else(|_| DEFAULT_ORIGIN.to_string());

        let limits = Limits {
            max_frame_size: parse_env("SOCKWEB_MAX_FRAME_SIZE", MAX_FRAME_SIZE),
            max_connections: std::env::var("SOCKWEB_MAX_CONNECTIONS")
                .ok()
                .and_then(|v| v.parse().ok()),
            ..Limits::default()
        };

        let timeouts = Timeouts::new(
            Duration::from_secs(parse_env("SOCKWEB_HANDSHAKE_TIMEOUT_SECS", 10)),
            Duration::from_secs(parse_env("SOCKWEB_KEEPALIVE_SECS", 30)),
            Duration::from_secs(parse_env("SOCKWEB_WATCHDOG_INTERVAL_SECS", 15)),
        );
        timeouts.validate()?;

        let connection = Config::new()
            .with_limits(limits)
            .with_timeouts(timeouts)
            .with_accept_unmasked(parse_env_bool("SOCKWEB_ACCEPT_UNMASKED", true));

        Ok(Self {
            bind_addr,
            origin,
            connection,
        })
    }
}

/// Parses an environment variable as `T`, returning `default` on missing
/// or invalid values.
fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Parses an environment variable as a boolean. Accepts `"true"`, `"1"`,
/// `"false"`, `"0"` (case-insensitive). Returns `default` otherwise.
fn parse_env_bool(key: &str, default: bool) -> bool {
    match std::env::var(key).ok().as_deref().map(str::to_ascii_lowercase) {
        Some(v) if v == "true" || v == "1" => true,
        Some(v) if v == "false" || v == "0" => false,
        _ => default,
    }
}
