//! WebSocket protocol core implementation (RFC 6455).

pub mod byte_order;
pub mod frame;
pub mod handshake;
pub mod mask;
pub mod opcode;
pub mod validation;

pub use frame::{Frame, FrameHeader, MAX_CONTROL_FRAME_PAYLOAD};
pub use handshake::{
    BAD_REQUEST, HandshakeRequest, HandshakeResponse, WS_GUID, compute_accept_key,
};
pub use mask::apply_mask;
pub use opcode::OpCode;
pub use validation::FrameValidator;
