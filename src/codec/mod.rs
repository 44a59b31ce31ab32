//! Framed reading over async streams.
//!
//! This module turns a byte stream into upgrade requests and frames.

mod framed;

pub use framed::FrameReader;
