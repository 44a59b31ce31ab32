//! Shared test harness: a raw-TCP WebSocket client and an echo server.
//!
//! Each integration test binary pulls in only what it needs.
#![allow(dead_code)]

mod client;
mod metrics;
mod server;

pub use client::{ACCEPT, KEY, TestClient, masked_frame, upgrade_request};
pub use metrics::Metrics;
pub use server::{ORIGIN, TestServer};
