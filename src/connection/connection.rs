use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::codec::FrameReader;
use crate::config::Config;
use crate::connection::state::StateMachine;
use crate::connection::ConnectionState;
use crate::error::{Error, Result};
use crate::event::{DisconnectReason, EventSender, ServerEvent};
use crate::protocol::handshake::BAD_REQUEST;
use crate::protocol::{Frame, OpCode};

/// Payload of the close frame sent by [`Connection::initiate_close`].
pub const CLOSE_MESSAGE: &str = "Server requested disconnect";

/// Upper bound on flushing the write half during teardown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Server-assigned identity of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One accepted client socket.
///
/// The connection's own task drives the handshake and the frame loop (see
/// the server). Every other method may be called from any task: outbound
/// frames are serialized by a write lock, and each frame goes out as a
/// single contiguous write.
///
/// ## Example
///
/// ```rust,ignore
/// while let Some(event) = events.recv().await {
///     if let ServerEvent::Text(conn, text) = event {
///         conn.send_text(&text).await?;
///     }
/// }
/// ```
pub struct Connection {
    id: ConnectionId,
    remote_endpoint: String,
    origin: Arc<str>,
    config: Config,
    created_at: Instant,
    last_pong: Mutex<Instant>,
    state: Mutex<StateMachine>,
    writer: tokio::sync::Mutex<Option<BoxedWriter>>,
    shutdown: watch::Sender<bool>,
    ping_pending: AtomicBool,
    events: EventSender,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("remote_endpoint", &self.remote_endpoint)
            .field("state", &self.state())
            .finish()
    }
}

impl Connection {
    pub(crate) fn new<W>(
        id: ConnectionId,
        remote_endpoint: String,
        writer: W,
        origin: Arc<str>,
        config: Config,
        events: EventSender,
    ) -> Arc<Self>
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let now = Instant::now();
        let (shutdown, _) = watch::channel(false);
        Arc::new(Self {
            id,
            remote_endpoint,
            origin,
            config,
            created_at: now,
            last_pong: Mutex::new(now),
            state: Mutex::new(StateMachine::new()),
            writer: tokio::sync::Mutex::new(Some(Box::new(writer))),
            shutdown,
            ping_pending: AtomicBool::new(false),
            events,
        })
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Peer address captured at accept time, or `"Error"` if it was unavailable.
    pub fn remote_endpoint(&self) -> &str {
        &self.remote_endpoint
    }

    pub fn state(&self) -> ConnectionState {
        self.lock_state().state()
    }

    /// When the socket was accepted.
    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// When the last pong arrived (initially the accept time).
    pub fn last_pong(&self) -> Instant {
        *self.last_pong.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Send a text frame.
    ///
    /// # Errors
    ///
    /// - `Error::ConnectionClosed` unless the connection is `Open`
    /// - `Error::Io` if the write fails; the connection is then closed
    pub async fn send_text(self: &Arc<Self>, text: &str) -> Result<()> {
        self.send_frame(Frame::text(text.to_owned())).await
    }

    /// Send a binary frame.
    ///
    /// # Errors
    ///
    /// Same as [`Connection::send_text`].
    pub async fn send_data(self: &Arc<Self>, data: impl Into<bytes::Bytes>) -> Result<()> {
        self.send_frame(Frame::binary(data)).await
    }

    /// Send a ping frame with an empty payload.
    ///
    /// # Errors
    ///
    /// Same as [`Connection::send_text`].
    pub async fn send_ping(self: &Arc<Self>) -> Result<()> {
        self.send_frame(Frame::ping(bytes::Bytes::new())).await
    }

    /// Send a keepalive ping unless an earlier one is still being written.
    ///
    /// Returns whether a ping was sent.
    pub(crate) async fn keepalive_ping(self: &Arc<Self>) -> Result<bool> {
        if self.ping_pending.swap(true, Ordering::AcqRel) {
            return Ok(false);
        }
        let result = self.send_ping().await;
        self.ping_pending.store(false, Ordering::Release);
        result.map(|()| true)
    }

    /// Start the close handshake.
    ///
    /// Sends a close frame carrying [`CLOSE_MESSAGE`] and moves to `Closing`;
    /// the peer's close frame completes the closure. Does nothing unless the
    /// connection is `Open`.
    ///
    /// # Errors
    ///
    /// `Error::Io` if the close frame cannot be written.
    pub async fn initiate_close(self: &Arc<Self>) -> Result<()> {
        let sent = self
            .write_if(&Frame::close(CLOSE_MESSAGE).encode(), |machine| {
                Ok(machine.begin_close(true).is_ok())
            })
            .await?;
        if sent {
            debug!(conn = %self.id, "close requested");
        }
        Ok(())
    }

    /// Close the connection immediately, without a close handshake.
    ///
    /// Idempotent. A `Disconnected` event is emitted only if the connection
    /// had reached `Open`.
    pub fn force_close(self: &Arc<Self>) {
        self.close_with(DisconnectReason::Local);
    }

    /// Run the connection to completion: handshake, then the frame loop.
    ///
    /// Returns once the connection is `Closed`, with the socket released.
    pub(crate) async fn run<R>(self: &Arc<Self>, reader: R)
    where
        R: AsyncRead + Unpin,
    {
        let mut reader = FrameReader::new(reader, &self.config);
        let mut shutdown = self.shutdown.subscribe();

        let outcome = tokio::select! {
            result = self.serve(&mut reader) => result,
            _ = shutdown.wait_for(|stop| *stop) => Ok(()),
        };

        match outcome {
            Ok(()) => self.close_with(DisconnectReason::Local),
            Err(Error::ConnectionClosed) => {
                debug!(conn = %self.id, "peer went away");
                self.close_with(DisconnectReason::Error(Error::ConnectionClosed));
            }
            Err(e) => {
                if e.is_protocol_error() {
                    warn!(conn = %self.id, peer = %self.remote_endpoint, error = %e, "protocol error");
                } else {
                    debug!(conn = %self.id, error = %e, "connection failed");
                }
                self.close_with(DisconnectReason::Error(e));
            }
        }

        let writer = self.writer.lock().await.take();
        if let Some(mut io) = writer {
            if tokio::time::timeout(SHUTDOWN_GRACE, io.shutdown()).await.is_err() {
                debug!(conn = %self.id, "write half did not shut down in time, dropping it");
            }
        }
    }

    async fn serve<R>(self: &Arc<Self>, reader: &mut FrameReader<R>) -> Result<()>
    where
        R: AsyncRead + Unpin,
    {
        self.handshake(reader).await?;
        loop {
            let frame = reader.read_frame().await?;
            match frame.opcode {
                OpCode::Text => {
                    let text = String::from_utf8(frame.into_payload().to_vec())?;
                    self.emit_message(|conn| ServerEvent::Text(conn, text));
                }
                OpCode::Binary => {
                    let data = frame.into_payload();
                    self.emit_message(|conn| ServerEvent::Binary(conn, data));
                }
                OpCode::Close => {
                    let echo = Frame::close(frame.into_payload()).encode();
                    let echoed = self
                        .write_if(&echo, |machine| {
                            Ok(!machine.close_requested() && machine.begin_close(false).is_ok())
                        })
                        .await;
                    if let Err(e) = echoed {
                        debug!(conn = %self.id, error = %e, "close echo failed");
                    }
                    self.close_with(DisconnectReason::Closed);
                    return Ok(());
                }
                OpCode::Ping => {
                    let pong = Frame::pong(frame.into_payload()).encode();
                    self.write_if(&pong, |machine| Ok(machine.state().can_send()))
                        .await?;
                }
                OpCode::Pong => {
                    *self.last_pong.lock().unwrap_or_else(PoisonError::into_inner) =
                        Instant::now();
                }
                OpCode::Continuation => return Err(Error::FragmentationUnsupported),
            }
        }
    }

    async fn handshake<R>(self: &Arc<Self>, reader: &mut FrameReader<R>) -> Result<()>
    where
        R: AsyncRead + Unpin,
    {
        let connecting = |machine: &mut StateMachine| Ok(machine.state() == ConnectionState::Connecting);

        let request = reader.read_request().await;
        let response = match request.and_then(|request| request.validate(&self.origin)) {
            Ok(response) => response,
            Err(e) => {
                info!(conn = %self.id, peer = %self.remote_endpoint, error = %e, "handshake rejected");
                let _ = self.write_if(BAD_REQUEST, connecting).await;
                return Err(e);
            }
        };

        if !self.write_if(&response.to_bytes(), connecting).await? {
            return Err(Error::ConnectionClosed);
        }

        {
            let mut machine = self.lock_state();
            machine.open()?;
            let _ = self.events.send(ServerEvent::Connected(Arc::clone(self)));
        }
        info!(conn = %self.id, peer = %self.remote_endpoint, "connection opened");
        Ok(())
    }

    async fn send_frame(self: &Arc<Self>, frame: Frame) -> Result<()> {
        self.write_if(&frame.encode(), |machine| {
            if machine.state().can_send() {
                Ok(true)
            } else {
                Err(Error::ConnectionClosed)
            }
        })
        .await
        .map(|_| ())
    }

    /// Write `bytes` if `admit` allows it.
    ///
    /// `admit` runs under the state lock after the write lock is taken, so a
    /// state check and the write it guards cannot be split by another writer.
    /// Returns whether the bytes were written.
    async fn write_if<F>(self: &Arc<Self>, bytes: &[u8], admit: F) -> Result<bool>
    where
        F: FnOnce(&mut StateMachine) -> Result<bool>,
    {
        let mut writer = self.writer.lock().await;
        let admitted = admit(&mut self.lock_state())?;
        if !admitted {
            return Ok(false);
        }
        let Some(io) = writer.as_mut() else {
            return Err(Error::ConnectionClosed);
        };

        // A peer that stops reading must not pin the write lock past a close.
        let mut shutdown = self.shutdown.subscribe();
        let result = tokio::select! {
            result = async {
                io.write_all(bytes).await?;
                io.flush().await
            } => result,
            _ = shutdown.wait_for(|stop| *stop) => return Err(Error::ConnectionClosed),
        };
        drop(writer);

        match result {
            Ok(()) => Ok(true),
            Err(e) => {
                let err = Error::from(e);
                self.close_with(DisconnectReason::Error(err.clone()));
                Err(err)
            }
        }
    }

    /// Deliver a message event if the connection may still receive.
    fn emit_message(self: &Arc<Self>, event: impl FnOnce(Arc<Self>) -> ServerEvent) {
        let machine = self.lock_state();
        if machine.state().can_receive() {
            let _ = self.events.send(event(Arc::clone(self)));
        }
    }

    fn close_with(self: &Arc<Self>, reason: DisconnectReason) {
        let mut machine = self.lock_state();
        let Some(prior) = machine.close() else {
            return;
        };
        self.shutdown.send_replace(true);

        if prior.can_receive() {
            info!(conn = %self.id, peer = %self.remote_endpoint, %reason, "connection closed");
            let _ = self
                .events
                .send(ServerEvent::Disconnected(Arc::clone(self), reason));
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, StateMachine> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
