//! Echo server for integration tests.
//!
//! Binds an ephemeral port on localhost, echoes text and binary frames, and
//! forwards every event to the test for inspection.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use sockweb::{Server, ServerConfig, ServerEvent};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub const ORIGIN: &str = "http://localhost";

pub struct TestServer {
    server: Server,
    dispatch: JoinHandle<()>,
    observed: mpsc::UnboundedReceiver<ServerEvent>,
}

impl TestServer {
    pub async fn spawn() -> (Self, SocketAddr) {
        Self::spawn_with(Self::config()).await
    }

    /// Default test configuration: localhost, ephemeral port, [`ORIGIN`].
    pub fn config() -> ServerConfig {
        ServerConfig::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0, ORIGIN)
    }

    pub async fn spawn_with(config: ServerConfig) -> (Self, SocketAddr) {
        let (server, mut events) = Server::new(config);
        let addr = server.start().await.unwrap();
        let (tx, observed) = mpsc::unbounded_channel();

        let dispatch = tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                match &event {
                    ServerEvent::Text(conn, text) => {
                        let _ = conn.send_text(text).await;
                    }
                    ServerEvent::Binary(conn, data) => {
                        let _ = conn.send_data(data.clone()).await;
                    }
                    _ => {}
                }
                let _ = tx.send(event);
            }
        });

        (
            Self {
                server,
                dispatch,
                observed,
            },
            addr,
        )
    }

    pub fn server(&self) -> &Server {
        &self.server
    }

    /// Next observed event, failing the test after five seconds.
    pub async fn next_event(&mut self) -> ServerEvent {
        tokio::time::timeout(Duration::from_secs(5), self.observed.recv())
            .await
            .expect("timed out waiting for a server event")
            .expect("event stream ended")
    }

    /// Skip events until one matches.
    pub async fn wait_for<F>(&mut self, mut pred: F) -> ServerEvent
    where
        F: FnMut(&ServerEvent) -> bool,
    {
        loop {
            let event = self.next_event().await;
            if pred(&event) {
                return event;
            }
        }
    }

    /// Assert that no event arrives within `window`.
    pub async fn assert_quiet(&mut self, window: Duration) {
        if let Ok(Some(event)) = tokio::time::timeout(window, self.observed.recv()).await {
            panic!("unexpected event: {event:?}");
        }
    }

    /// Wait until the registry holds exactly `n` connections.
    pub async fn wait_for_count(&self, n: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while self.server.connection_count() != n {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("registry never reached the expected size");
    }

    pub async fn shutdown(self) {
        self.server.dispose();
        self.dispatch.abort();
    }
}
