//! WebSocket frame parsing and serialization (RFC 6455).
//!
//! [`FrameHeader`] mirrors the wire fields one to one: the two fixed header
//! bytes, the raw extended-length bytes and the optional masking key. The
//! full payload length is derived from those raw fields. [`Frame`] pairs an
//! opcode with its (unmasked) payload and knows how to serialize itself.
//!
//! ## Frame Structure
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-------+-+-------------+-------------------------------+
//! |F|R|R|R| opcode|M| Payload len |    Extended payload length    |
//! |I|S|S|S|  (4)  |A|     (7)     |             (16/64)           |
//! |N|V|V|V|       |S|             |   (if payload len==126/127)   |
//! | |1|2|3|       |K|             |                               |
//! +-+-+-+-+-------+-+-------------+-------------------------------+
//! |                     Masking key (if present)                  |
//! +---------------------------------------------------------------+
//! |                          Payload data                         |
//! +---------------------------------------------------------------+
//! ```

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{Error, Result};
use crate::protocol::OpCode;
use crate::protocol::byte_order;
use crate::protocol::mask::apply_mask;

/// Maximum payload size for control frames (RFC 6455).
pub const MAX_CONTROL_FRAME_PAYLOAD: usize = 125;

/// Size of the fixed part of every frame header.
pub const BASE_HEADER_LEN: usize = 2;

/// Length sentinel announcing a 16-bit extended length.
const LEN_16: u8 = 126;

/// Length sentinel announcing a 64-bit extended length.
const LEN_64: u8 = 127;

/// Raw header fields of one frame as read off the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameHeader {
    /// Final fragment flag.
    pub fin: bool,
    /// Reserved bit 1.
    pub rsv1: bool,
    /// Reserved bit 2.
    pub rsv2: bool,
    /// Reserved bit 3.
    pub rsv3: bool,
    /// Frame opcode.
    pub opcode: OpCode,
    /// Whether the payload is XOR-masked.
    pub masked: bool,
    /// The 7-bit length field; 126 and 127 announce an extended length.
    pub base_len: u8,
    /// Raw big-endian extended length: 0, 2 or 8 bytes.
    pub ext_len_bytes: Vec<u8>,
    /// Masking key, present when `masked` is set and the key has been read.
    pub mask_key: Option<[u8; 4]>,
}

impl FrameHeader {
    /// Decode the two fixed header bytes.
    ///
    /// Control-frame rules are enforced here, before any further byte of the
    /// frame is consumed.
    ///
    /// # Errors
    ///
    /// - `Error::InvalidOpcode` if the opcode is not one of the defined values
    /// - `Error::FragmentedControlFrame` if a control frame has FIN=0
    /// - `Error::ControlFrameTooLarge` if a control frame declares more than 125 bytes
    pub fn parse(head: [u8; 2]) -> Result<Self> {
        let [byte0, byte1] = head;

        let opcode = OpCode::from_u8(byte0 & 0x0F)?;
        let header = Self {
            fin: (byte0 & 0x80) != 0,
            rsv1: (byte0 & 0x40) != 0,
            rsv2: (byte0 & 0x20) != 0,
            rsv3: (byte0 & 0x10) != 0,
            opcode,
            masked: (byte1 & 0x80) != 0,
            base_len: byte1 & 0x7F,
            ext_len_bytes: Vec::new(),
            mask_key: None,
        };

        if opcode.is_control() {
            if !header.fin {
                return Err(Error::FragmentedControlFrame);
            }
            if usize::from(header.base_len) > MAX_CONTROL_FRAME_PAYLOAD {
                return Err(Error::ControlFrameTooLarge(usize::from(header.base_len)));
            }
        }

        Ok(header)
    }

    /// Number of extended-length bytes that follow the fixed header.
    #[inline]
    #[must_use]
    pub const fn ext_len_size(&self) -> usize {
        match self.base_len {
            LEN_16 => 2,
            LEN_64 => 8,
            _ => 0,
        }
    }

    /// Number of masking-key bytes that follow the extended length.
    #[inline]
    #[must_use]
    pub const fn mask_len(&self) -> usize {
        if self.masked { 4 } else { 0 }
    }

    /// Whether any reserved bit is set.
    #[inline]
    #[must_use]
    pub const fn has_reserved_bits(&self) -> bool {
        self.rsv1 || self.rsv2 || self.rsv3
    }

    /// Full payload length derived from the raw length fields.
    ///
    /// # Errors
    ///
    /// Returns `Error::IncompleteFrame` if an extended length was announced
    /// but its bytes have not been filled in.
    pub fn payload_len(&self) -> Result<u64> {
        match self.ext_len_size() {
            2 => byte_order::read_u16(&self.ext_len_bytes).map(u64::from),
            8 => byte_order::read_u64(&self.ext_len_bytes),
            _ => Ok(u64::from(self.base_len)),
        }
    }

    /// Total header size on the wire once all optional fields are present.
    #[inline]
    #[must_use]
    pub const fn wire_len(&self) -> usize {
        BASE_HEADER_LEN + self.ext_len_size() + self.mask_len()
    }
}

/// A WebSocket frame: header flags, opcode and unmasked payload.
///
/// Frames built by this crate are always final and never masked, as
/// server-to-client traffic must be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Final fragment flag.
    pub fin: bool,
    /// Reserved bit 1.
    pub rsv1: bool,
    /// Reserved bit 2.
    pub rsv2: bool,
    /// Reserved bit 3.
    pub rsv3: bool,
    /// Frame opcode defining the interpretation of payload data.
    pub opcode: OpCode,
    payload: Bytes,
}

impl Frame {
    /// Create a new frame with the given parameters.
    #[must_use]
    pub fn new(fin: bool, opcode: OpCode, payload: impl Into<Bytes>) -> Self {
        Self {
            fin,
            rsv1: false,
            rsv2: false,
            rsv3: false,
            opcode,
            payload: payload.into(),
        }
    }

    /// Create a text frame.
    #[must_use]
    pub fn text(data: impl Into<Bytes>) -> Self {
        Self::new(true, OpCode::Text, data)
    }

    /// Create a binary frame.
    #[must_use]
    pub fn binary(data: impl Into<Bytes>) -> Self {
        Self::new(true, OpCode::Binary, data)
    }

    /// Create a close frame carrying a raw payload.
    #[must_use]
    pub fn close(data: impl Into<Bytes>) -> Self {
        Self::new(true, OpCode::Close, data)
    }

    /// Create a ping frame.
    #[must_use]
    pub fn ping(data: impl Into<Bytes>) -> Self {
        Self::new(true, OpCode::Ping, data)
    }

    /// Create a pong frame.
    #[must_use]
    pub fn pong(data: impl Into<Bytes>) -> Self {
        Self::new(true, OpCode::Pong, data)
    }

    /// Assemble a frame from a parsed header and its already-unmasked payload.
    #[must_use]
    pub fn from_parts(header: &FrameHeader, payload: impl Into<Bytes>) -> Self {
        Self {
            fin: header.fin,
            rsv1: header.rsv1,
            rsv2: header.rsv2,
            rsv3: header.rsv3,
            opcode: header.opcode,
            payload: payload.into(),
        }
    }

    /// Get the payload bytes.
    #[inline]
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Take ownership of the payload.
    #[must_use]
    pub fn into_payload(self) -> Bytes {
        self.payload
    }

    /// Parse a complete frame from a buffer.
    ///
    /// Returns the parsed frame and the number of bytes consumed. Masked
    /// payloads are unmasked.
    ///
    /// ## Errors
    ///
    /// - `Error::IncompleteFrame` if not enough data is available
    /// - any error of [`FrameHeader::parse`]
    pub fn parse(buf: &[u8]) -> Result<(Self, usize)> {
        let (head, rest) = match buf {
            [a, b, rest @ ..] => ([*a, *b], rest),
            _ => {
                return Err(Error::IncompleteFrame {
                    needed: BASE_HEADER_LEN - buf.len(),
                });
            }
        };
        let mut header = FrameHeader::parse(head)?;

        let need = |have: usize, want: usize| Error::IncompleteFrame {
            needed: want - have,
        };

        let ext_len = header.ext_len_size();
        let ext = rest.get(..ext_len).ok_or_else(|| need(rest.len(), ext_len))?;
        header.ext_len_bytes = ext.to_vec();
        let rest = &rest[ext_len..];

        let mask_len = header.mask_len();
        let key = rest.get(..mask_len).ok_or_else(|| need(rest.len(), mask_len))?;
        if let [a, b, c, d] = *key {
            header.mask_key = Some([a, b, c, d]);
        }
        let rest = &rest[mask_len..];

        let declared = header.payload_len()?;
        let payload_len = usize::try_from(declared).map_err(|_| Error::FrameTooLarge {
            size: declared,
            max: usize::MAX as u64,
        })?;
        if rest.len() < payload_len {
            return Err(need(rest.len(), payload_len));
        }

        let mut payload = rest[..payload_len].to_vec();
        if let Some(key) = header.mask_key {
            apply_mask(&mut payload, key);
        }

        Ok((
            Self::from_parts(&header, payload),
            header.wire_len() + payload_len,
        ))
    }

    /// Calculate the size needed to write this frame.
    #[must_use]
    pub fn wire_size(&self) -> usize {
        let payload_len = self.payload.len();
        let extended_len_size = if payload_len <= MAX_CONTROL_FRAME_PAYLOAD {
            0
        } else if payload_len <= usize::from(u16::MAX) {
            2
        } else {
            8
        };
        BASE_HEADER_LEN + extended_len_size + payload_len
    }

    /// Serialize the frame, unmasked, into one contiguous buffer.
    ///
    /// The length uses the shortest form: 7-bit up to 125 bytes, 16-bit up
    /// to 65535 bytes, 64-bit beyond.
    #[must_use]
    pub fn encode(&self) -> Bytes {
        let payload_len = self.payload.len();
        let mut buf = BytesMut::with_capacity(self.wire_size());

        let mut byte0 = self.opcode.as_u8();
        if self.fin {
            byte0 |= 0x80;
        }
        if self.rsv1 {
            byte0 |= 0x40;
        }
        if self.rsv2 {
            byte0 |= 0x20;
        }
        if self.rsv3 {
            byte0 |= 0x10;
        }
        buf.put_u8(byte0);

        if payload_len <= MAX_CONTROL_FRAME_PAYLOAD {
            buf.put_u8(payload_len as u8);
        } else if let Ok(len) = u16::try_from(payload_len) {
            buf.put_u8(LEN_16);
            buf.put_slice(&byte_order::write_u16(len));
        } else {
            buf.put_u8(LEN_64);
            buf.put_slice(&byte_order::write_u64(payload_len as u64));
        }

        buf.put_slice(&self.payload);
        buf.freeze()
    }
}
