//! TCP listener, connection registry and watchdog.
//!
//! ## Example
//!
//! ```rust,ignore
//! use sockweb::{Server, ServerConfig, ServerEvent};
//!
//! let (server, mut events) = Server::new(ServerConfig::from_env()?);
//! server.start().await?;
//!
//! while let Some(event) = events.recv().await {
//!     if let ServerEvent::Text(conn, text) = event {
//!         conn.send_text(&text).await?;
//!     }
//! }
//! ```

pub mod registry;
pub mod watchdog;

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::config::{Config, ServerConfig, Timeouts};
use crate::connection::{Connection, ConnectionId};
use crate::error::{Error, Result};
use crate::event::{EventSender, Events};

pub use registry::Registry;
use registry::Registration;

/// Sentinel endpoint for sockets whose peer address cannot be read.
pub const UNKNOWN_ENDPOINT: &str = "Error";

const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// State shared between the server handle and its accept loop.
struct Shared {
    config: Config,
    origin: Arc<str>,
    registry: Arc<Registry>,
    events: EventSender,
    next_id: AtomicU64,
}

impl Shared {
    fn admit(&self, stream: TcpStream) {
        let remote_endpoint = stream
            .peer_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_else(|_| UNKNOWN_ENDPOINT.to_string());

        if !self.config.limits.admits(self.registry.len()) {
            warn!(peer = %remote_endpoint, "connection limit reached, dropping socket");
            return;
        }
        if let Err(e) = stream.set_nodelay(true) {
            debug!(peer = %remote_endpoint, error = %e, "could not set TCP_NODELAY");
        }

        let id = ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (read, write) = stream.into_split();
        let conn = Connection::new(
            id,
            remote_endpoint,
            write,
            Arc::clone(&self.origin),
            self.config.clone(),
            self.events.clone(),
        );
        debug!(conn = %id, peer = %conn.remote_endpoint(), "accepted");

        let registration = Registration::new(Arc::clone(&self.registry), Arc::clone(&conn));
        tokio::spawn(async move {
            let _registration = registration;
            conn.run(read).await;
        });
    }
}

async fn accept_loop(listener: TcpListener, shared: Arc<Shared>, mut shutdown: watch::Receiver<bool>) {
    loop {
        let accepted = tokio::select! {
            accepted = listener.accept() => accepted,
            _ = shutdown.wait_for(|stop| *stop) => break,
        };
        match accepted {
            Ok((stream, _)) => shared.admit(stream),
            Err(e) => {
                warn!(error = %e, "accept failed");
                tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
            }
        }
    }
    debug!("accept loop stopped");
}

enum Listener {
    Idle,
    Starting,
    Running {
        local_addr: SocketAddr,
        shutdown: watch::Sender<bool>,
    },
    Disposed,
}

struct Control {
    listener: Listener,
    watchdog: Option<watch::Sender<bool>>,
}

/// A WebSocket server.
///
/// Constructed inactive. [`Server::start`] binds the listener and begins
/// accepting; [`Server::stop`] stops accepting without touching existing
/// connections; [`Server::dispose`] (also run on drop) stops accepting and
/// ends the watchdog for good.
pub struct Server {
    shared: Arc<Shared>,
    bind_addr: SocketAddr,
    timeouts: Timeouts,
    control: Mutex<Control>,
}

impl Server {
    /// Create an inactive server and the receiver for its events.
    pub fn new(config: ServerConfig) -> (Self, Events) {
        let (events, rx) = mpsc::unbounded_channel();
        let ServerConfig {
            bind_addr,
            origin,
            connection,
        } = config;
        let server = Self {
            timeouts: connection.timeouts.clone(),
            shared: Arc::new(Shared {
                config: connection,
                origin: Arc::from(origin),
                registry: Arc::new(Registry::new()),
                events,
                next_id: AtomicU64::new(1),
            }),
            bind_addr,
            control: Mutex::new(Control {
                listener: Listener::Idle,
                watchdog: None,
            }),
        };
        (server, rx)
    }

    /// Bind the listener and start accepting connections.
    ///
    /// The watchdog starts with the first successful `start` and runs until
    /// the server is disposed. Returns the bound address.
    ///
    /// # Errors
    ///
    /// - `Error::Disposed` if the server was disposed
    /// - `Error::AlreadyActive` if the server is already started
    /// - `Error::InvalidConfig` if the watchdog interval is zero
    /// - `Error::Io` if the address cannot be bound
    pub async fn start(&self) -> Result<SocketAddr> {
        self.timeouts.validate()?;
        {
            let mut control = self.lock();
            match control.listener {
                Listener::Disposed => return Err(Error::Disposed),
                Listener::Starting | Listener::Running { .. } => return Err(Error::AlreadyActive),
                Listener::Idle => control.listener = Listener::Starting,
            }
        }

        let listener = match TcpListener::bind(self.bind_addr).await {
            Ok(listener) => listener,
            Err(e) => {
                self.abandon_start();
                return Err(e.into());
            }
        };
        let local_addr = match listener.local_addr() {
            Ok(addr) => addr,
            Err(e) => {
                self.abandon_start();
                return Err(e.into());
            }
        };

        let mut control = self.lock();
        if !matches!(control.listener, Listener::Starting) {
            return Err(Error::Disposed);
        }

        let (shutdown, shutdown_rx) = watch::channel(false);
        tokio::spawn(accept_loop(listener, Arc::clone(&self.shared), shutdown_rx));
        control.listener = Listener::Running {
            local_addr,
            shutdown,
        };

        if control.watchdog.is_none() {
            let (stop, stop_rx) = watch::channel(false);
            tokio::spawn(watchdog::run(
                Arc::clone(&self.shared.registry),
                self.timeouts.clone(),
                stop_rx,
            ));
            control.watchdog = Some(stop);
        }

        info!(addr = %local_addr, origin = %self.shared.origin, "server started");
        Ok(local_addr)
    }

    /// Stop accepting connections. Existing connections keep running.
    ///
    /// # Errors
    ///
    /// - `Error::Disposed` if the server was disposed
    /// - `Error::NotActive` if the server is not started
    pub fn stop(&self) -> Result<()> {
        let mut control = self.lock();
        match std::mem::replace(&mut control.listener, Listener::Idle) {
            Listener::Running {
                local_addr,
                shutdown,
            } => {
                shutdown.send_replace(true);
                info!(addr = %local_addr, "server stopped");
                Ok(())
            }
            Listener::Disposed => {
                control.listener = Listener::Disposed;
                Err(Error::Disposed)
            }
            other => {
                control.listener = other;
                Err(Error::NotActive)
            }
        }
    }

    /// Stop accepting and end the watchdog. Idempotent; the server cannot be
    /// started again.
    pub fn dispose(&self) {
        let mut control = self.lock();
        if let Listener::Running { shutdown, .. } =
            std::mem::replace(&mut control.listener, Listener::Disposed)
        {
            shutdown.send_replace(true);
        }
        if let Some(stop) = control.watchdog.take() {
            stop.send_replace(true);
            debug!("server disposed");
        }
    }

    /// Whether the server is accepting connections.
    pub fn is_active(&self) -> bool {
        matches!(self.lock().listener, Listener::Running { .. })
    }

    /// The bound address while active.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        match self.lock().listener {
            Listener::Running { local_addr, .. } => Some(local_addr),
            _ => None,
        }
    }

    /// The only accepted `Origin` header value.
    pub fn origin(&self) -> &str {
        &self.shared.origin
    }

    /// Connections currently `Open`.
    pub fn connections(&self) -> Vec<Arc<Connection>> {
        self.shared.registry.open_connections()
    }

    /// Number of registered connections, handshaking ones included.
    pub fn connection_count(&self) -> usize {
        self.shared.registry.len()
    }

    pub fn registry(&self) -> &Registry {
        &self.shared.registry
    }

    fn abandon_start(&self) {
        let mut control = self.lock();
        if matches!(control.listener, Listener::Starting) {
            control.listener = Listener::Idle;
        }
    }

    fn lock(&self) -> MutexGuard<'_, Control> {
        self.control.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("bind_addr", &self.bind_addr)
            .field("origin", &self.shared.origin)
            .field("active", &self.is_active())
            .field("connections", &self.connection_count())
            .finish()
    }
}
