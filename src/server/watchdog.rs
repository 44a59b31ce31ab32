//! Periodic sweep over the registry: handshake timeouts and keepalive pings.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::config::Timeouts;
use crate::connection::{Connection, ConnectionState};
use crate::server::registry::Registry;

/// What the watchdog does to one connection on a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Still `Connecting` past the handshake timeout: force close.
    HandshakeTimeout,
    /// `Open` with no pong for the keepalive period: send a ping.
    Ping,
}

/// Decide the fate of a connection from its state and timestamps.
#[must_use]
pub fn judge(
    state: ConnectionState,
    created_at: Instant,
    last_pong: Instant,
    now: Instant,
    timeouts: &Timeouts,
) -> Option<Verdict> {
    match state {
        ConnectionState::Connecting
            if now.saturating_duration_since(created_at) >= timeouts.handshake =>
        {
            Some(Verdict::HandshakeTimeout)
        }
        ConnectionState::Open if now.saturating_duration_since(last_pong) >= timeouts.keepalive => {
            Some(Verdict::Ping)
        }
        _ => None,
    }
}

/// Run one watchdog pass over a snapshot of the registry.
///
/// Pings are spawned as their own tasks so a peer that stops reading
/// cannot stall the sweep. Returns the verdicts issued.
pub fn sweep(registry: &Registry, timeouts: &Timeouts, now: Instant) -> Vec<Verdict> {
    let mut verdicts = Vec::new();
    for conn in registry.snapshot() {
        let Some(verdict) = judge(
            conn.state(),
            conn.created_at(),
            conn.last_pong(),
            now,
            timeouts,
        ) else {
            continue;
        };
        match verdict {
            Verdict::HandshakeTimeout => {
                info!(conn = %conn.id(), peer = %conn.remote_endpoint(), "handshake timed out");
                conn.force_close();
            }
            Verdict::Ping => spawn_ping(conn),
        }
        verdicts.push(verdict);
    }
    verdicts
}

fn spawn_ping(conn: Arc<Connection>) {
    tokio::spawn(async move {
        match conn.keepalive_ping().await {
            Ok(true) => debug!(conn = %conn.id(), "keepalive ping sent"),
            Ok(false) => debug!(conn = %conn.id(), "previous keepalive ping still pending"),
            Err(e) => debug!(conn = %conn.id(), error = %e, "keepalive ping failed"),
        }
    });
}

/// Sweep on every `timeouts.watchdog_interval` until `shutdown` turns true.
pub(crate) async fn run(
    registry: Arc<Registry>,
    timeouts: Timeouts,
    mut shutdown: watch::Receiver<bool>,
) {
    let period = timeouts.watchdog_interval;
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let verdicts = sweep(&registry, &timeouts, Instant::now());
                if !verdicts.is_empty() {
                    debug!(count = verdicts.len(), "watchdog acted");
                }
            }
            _ = shutdown.wait_for(|stop| *stop) => break,
        }
    }
}
