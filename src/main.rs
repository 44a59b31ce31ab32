//! sockweb demo server.
//!
//! Logs every connection event and echoes text frames back after one second.

use std::time::Duration;

use tracing_subscriber::EnvFilter;

use sockweb::{Server, ServerConfig, ServerEvent};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ServerConfig::from_env()?;
    tracing::info!(addr = %config.bind_addr, origin = %config.origin, "starting sockweb");

    let (server, mut events) = Server::new(config);
    let addr = server.start().await?;
    tracing::info!(addr = %addr, "server listening");

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                handle(event);
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutting down");
                break;
            }
        }
    }

    server.dispose();
    Ok(())
}

fn handle(event: ServerEvent) {
    match event {
        ServerEvent::Connected(conn) => {
            tracing::info!(conn = %conn.id(), peer = %conn.remote_endpoint(), "client connected");
        }
        ServerEvent::Disconnected(conn, reason) => {
            tracing::info!(conn = %conn.id(), %reason, "client disconnected");
        }
        ServerEvent::Text(conn, text) => {
            tracing::info!(conn = %conn.id(), %text, "text received");
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs(1)).await;
                if let Err(e) = conn.send_text(&text).await {
                    tracing::debug!(conn = %conn.id(), error = %e, "echo failed");
                }
            });
        }
        ServerEvent::Binary(conn, data) => {
            tracing::info!(conn = %conn.id(), len = data.len(), "binary received");
        }
    }
}
