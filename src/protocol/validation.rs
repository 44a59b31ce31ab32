//! Frame validation for incoming client frames (RFC 6455).
//!
//! Checks run on the parsed header, after the extended length and mask
//! bit are known and before a single payload byte is read:
//! - Masking policy per RFC 6455 Section 5.1
//! - Reserved bits policy
//! - Frame size limit

use crate::config::{Config, Limits};
use crate::error::{Error, Result};
use crate::protocol::frame::FrameHeader;

/// Frame validator for incoming WebSocket frames.
#[derive(Debug, Clone)]
pub struct FrameValidator {
    /// Size limits for frames.
    limits: Limits,
    /// Whether to accept unmasked frames (non-compliant clients).
    accept_unmasked_frames: bool,
    /// Whether set reserved bits are a protocol error.
    reject_reserved_bits: bool,
}

impl Default for FrameValidator {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl FrameValidator {
    /// Create a new frame validator with strict masking and lenient reserved bits.
    pub fn new(limits: Limits) -> Self {
        Self {
            limits,
            accept_unmasked_frames: false,
            reject_reserved_bits: false,
        }
    }

    /// Create a validator following the policies of a connection config.
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.limits.clone())
            .with_accept_unmasked(config.accept_unmasked_frames)
            .with_reject_reserved_bits(config.reject_reserved_bits)
    }

    /// Accept frames without a masking key.
    pub fn with_accept_unmasked(mut self, accept: bool) -> Self {
        self.accept_unmasked_frames = accept;
        self
    }

    /// Reject frames that set any reserved bit.
    pub fn with_reject_reserved_bits(mut self, reject: bool) -> Self {
        self.reject_reserved_bits = reject;
        self
    }

    /// Validate a frame header whose extended length has been read.
    ///
    /// # Errors
    ///
    /// - `Error::UnmaskedClientFrame` - unmasked frame while unmasked frames are refused
    /// - `Error::ReservedBitsSet` - RSV bits set while reserved bits are refused
    /// - `Error::FrameTooLarge` - declared payload exceeds the size limit
    pub fn validate(&self, header: &FrameHeader) -> Result<()> {
        self.validate_masking(header.masked)?;
        self.validate_rsv_bits(header)?;
        self.limits.check_frame_size(header.payload_len()?)
    }

    fn validate_masking(&self, masked: bool) -> Result<()> {
        if !masked && !self.accept_unmasked_frames {
            return Err(Error::UnmaskedClientFrame);
        }
        Ok(())
    }

    fn validate_rsv_bits(&self, header: &FrameHeader) -> Result<()> {
        if self.reject_reserved_bits && header.has_reserved_bits() {
            return Err(Error::ReservedBitsSet);
        }
        Ok(())
    }
}
