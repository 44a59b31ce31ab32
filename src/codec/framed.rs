use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};

use crate::config::{Config, Limits};
use crate::error::{Error, Result};
use crate::protocol::frame::{BASE_HEADER_LEN, Frame, FrameHeader};
use crate::protocol::handshake::HandshakeRequest;
use crate::protocol::mask::apply_mask;
use crate::protocol::validation::FrameValidator;

/// Buffered reader over the read half of a connection.
///
/// Every read is an exact-length read: a stream that ends early yields
/// [`Error::ConnectionClosed`].
pub struct FrameReader<R> {
    io: BufReader<R>,
    limits: Limits,
    validator: FrameValidator,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    #[must_use]
    pub fn new(io: R, config: &Config) -> Self {
        Self {
            io: BufReader::with_capacity(config.read_buffer_size, io),
            limits: config.limits.clone(),
            validator: FrameValidator::from_config(config),
        }
    }

    /// Read exactly `n` bytes.
    pub async fn read_exact_bytes(&mut self, n: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; n];
        self.io.read_exact(&mut buf).await?;
        Ok(buf)
    }

    async fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut buf = [0u8; N];
        self.io.read_exact(&mut buf).await?;
        Ok(buf)
    }

    /// Read one CRLF-terminated line of at most `limit` bytes, terminator included.
    ///
    /// The returned line has its terminator stripped.
    pub async fn read_line(&mut self, limit: usize) -> Result<String> {
        let mut line = Vec::new();
        let n = (&mut self.io)
            .take(limit as u64)
            .read_until(b'\n', &mut line)
            .await?;

        if line.last() != Some(&b'\n') {
            return Err(if n < limit {
                Error::ConnectionClosed
            } else {
                Error::HandshakeTooLarge {
                    size: n + 1,
                    max: self.limits.max_handshake_size,
                }
            });
        }
        line.pop();
        if line.last() == Some(&b'\r') {
            line.pop();
        }

        String::from_utf8(line).map_err(|_| Error::InvalidHandshake("Invalid UTF-8".into()))
    }

    /// Read an upgrade request head: request line, headers, blank line.
    ///
    /// The whole head is bounded by `Limits::max_handshake_size`.
    ///
    /// # Errors
    ///
    /// - `Error::HandshakeTooLarge` if the head exceeds the limit
    /// - `Error::InvalidHandshake` for a malformed request line or header line
    /// - `Error::ConnectionClosed` if the stream ends mid-request
    pub async fn read_request(&mut self) -> Result<HandshakeRequest> {
        let max = self.limits.max_handshake_size;
        let mut used = 0usize;

        let line = self.read_line(max).await?;
        used += line.len() + 2;
        let mut request = HandshakeRequest::from_request_line(&line)?;

        loop {
            let remaining = max.saturating_sub(used);
            if remaining == 0 {
                return Err(Error::HandshakeTooLarge { size: used, max });
            }
            let line = self.read_line(remaining).await.map_err(|e| match e {
                Error::HandshakeTooLarge { size, max } => Error::HandshakeTooLarge {
                    size: used + size,
                    max,
                },
                other => other,
            })?;
            used += line.len() + 2;
            self.limits.check_handshake_size(used)?;

            if line.is_empty() {
                return Ok(request);
            }
            request.push_header_line(&line)?;
        }
    }

    /// Read one frame: header, extended length, masking key, payload.
    ///
    /// The header is validated before the payload is read, so an oversized
    /// or disallowed frame never has its payload consumed. Masked payloads
    /// are returned unmasked.
    ///
    /// # Errors
    ///
    /// - any error of [`FrameHeader::parse`] or [`FrameValidator::validate`]
    /// - `Error::ConnectionClosed` if the stream ends mid-frame
    pub async fn read_frame(&mut self) -> Result<Frame> {
        let head = self.read_array::<BASE_HEADER_LEN>().await?;
        let mut header = FrameHeader::parse(head)?;

        header.ext_len_bytes = self.read_exact_bytes(header.ext_len_size()).await?;
        self.validator.validate(&header)?;

        if header.masked {
            header.mask_key = Some(self.read_array::<4>().await?);
        }

        let declared = header.payload_len()?;
        let len = usize::try_from(declared).map_err(|_| Error::FrameTooLarge {
            size: declared,
            max: self.limits.max_frame_size,
        })?;
        let mut payload = self.read_exact_bytes(len).await?;
        if let Some(key) = header.mask_key {
            apply_mask(&mut payload, key);
        }

        Ok(Frame::from_parts(&header, payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MAX_FRAME_SIZE;
    use crate::protocol::OpCode;

    fn reader(data: &[u8]) -> FrameReader<&[u8]> {
        FrameReader::new(data, &Config::default())
    }

    #[tokio::test]
    async fn test_read_frame() {
        // Masked "Hello" from RFC 6455 Section 5.7
        let data = [
            0x81, 0x85, 0x37, 0xfa, 0x21, 0x3d, 0x7f, 0x9f, 0x4d, 0x51, 0x58,
        ];
        let frame = reader(&data).read_frame().await.unwrap();
        assert!(frame.fin);
        assert_eq!(frame.opcode, OpCode::Text);
        assert_eq!(frame.payload(), b"Hello");
    }

    #[tokio::test]
    async fn test_read_multiple_frames() {
        // Frame 1: Text "Hi" - mask [0x12, 0x34, 0x56, 0x78]
        // Frame 2: Binary [0x01, 0x02] - mask [0xaa, 0xbb, 0xcc, 0xdd]
        let data = [
            0x81, 0x82, 0x12, 0x34, 0x56, 0x78, 0x5a, 0x5d, //
            0x82, 0x82, 0xaa, 0xbb, 0xcc, 0xdd, 0xab, 0xb9,
        ];
        let mut reader = reader(&data);

        let frame1 = reader.read_frame().await.unwrap();
        assert_eq!(frame1.payload(), b"Hi");

        let frame2 = reader.read_frame().await.unwrap();
        assert_eq!(frame2.opcode, OpCode::Binary);
        assert_eq!(frame2.payload(), &[0x01, 0x02]);

        assert_eq!(reader.read_frame().await, Err(Error::ConnectionClosed));
    }

    #[tokio::test]
    async fn test_read_unmasked_frame_tolerated_by_default() {
        let data = [0x82, 0x03, 0x01, 0x02, 0x03];
        let frame = reader(&data).read_frame().await.unwrap();
        assert_eq!(frame.payload(), &[0x01, 0x02, 0x03]);
    }

    #[tokio::test]
    async fn test_read_unmasked_frame_rejected_when_strict() {
        let config = Config::default().with_accept_unmasked(false);
        let data = [0x82, 0x03, 0x01, 0x02, 0x03];
        let result = FrameReader::new(&data[..], &config).read_frame().await;
        assert_eq!(result, Err(Error::UnmaskedClientFrame));
    }

    #[tokio::test]
    async fn test_read_large_payload() {
        // 300 bytes, 16-bit length, identity mask
        let mut data = vec![0x82, 0xFE, 0x01, 0x2C, 0x00, 0x00, 0x00, 0x00];
        data.extend_from_slice(&[0xAB; 300]);

        let frame = reader(&data).read_frame().await.unwrap();
        assert_eq!(frame.payload().len(), 300);
        assert!(frame.payload().iter().all(|&b| b == 0xAB));
    }

    #[tokio::test]
    async fn test_oversized_frame_rejected_before_payload() {
        // Declares MAX_FRAME_SIZE + 1 bytes but carries none.
        let mut data = vec![0x82, 0xFF];
        data.extend_from_slice(&(MAX_FRAME_SIZE + 1).to_be_bytes());
        data.extend_from_slice(&[0x00; 4]);

        let result = reader(&data).read_frame().await;
        assert!(matches!(result, Err(Error::FrameTooLarge { .. })));
    }

    #[tokio::test]
    async fn test_control_frame_rules() {
        let fragmented_ping = [0x09, 0x80, 0, 0, 0, 0];
        assert_eq!(
            reader(&fragmented_ping).read_frame().await,
            Err(Error::FragmentedControlFrame)
        );

        let oversized_close = [0x88, 0xFE, 0x00, 0x7E];
        assert_eq!(
            reader(&oversized_close).read_frame().await,
            Err(Error::ControlFrameTooLarge(126))
        );
    }

    #[tokio::test]
    async fn test_truncated_frame_is_connection_closed() {
        let data = [0x81, 0x85, 0x37, 0xfa, 0x21, 0x3d, 0x7f];
        assert_eq!(reader(&data).read_frame().await, Err(Error::ConnectionClosed));

        assert_eq!(reader(&[]).read_frame().await, Err(Error::ConnectionClosed));
    }

    #[tokio::test]
    async fn test_read_line() {
        let mut reader = reader(b"GET / HTTP/1.1\r\nHost: x\r\n\r\n");
        assert_eq!(reader.read_line(64).await.unwrap(), "GET / HTTP/1.1");
        assert_eq!(reader.read_line(64).await.unwrap(), "Host: x");
        assert_eq!(reader.read_line(64).await.unwrap(), "");
    }

    #[tokio::test]
    async fn test_read_line_limit() {
        let mut reader = reader(b"0123456789\r\n");
        assert!(matches!(
            reader.read_line(4).await,
            Err(Error::HandshakeTooLarge { .. })
        ));
    }

    #[tokio::test]
    async fn test_read_request() {
        let data = b"GET /chat HTTP/1.1\r\n\
            Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
            Sec-WebSocket-Version: 13\r\n\
            Origin: http://localhost\r\n\
            \r\n\
            \x81\x00";
        let mut reader = reader(data);

        let request = reader.read_request().await.unwrap();
        assert_eq!(request.path, "/chat");
        assert_eq!(request.header("origin"), Some("http://localhost"));

        // Bytes after the blank line belong to the frame stream.
        let frame = reader.read_frame().await.unwrap();
        assert_eq!(frame.opcode, OpCode::Text);
        assert!(frame.payload().is_empty());
    }

    #[tokio::test]
    async fn test_read_request_too_large() {
        let mut data = b"GET / HTTP/1.1\r\n".to_vec();
        for i in 0..200 {
            data.extend_from_slice(format!("X-Filler-{i}: {}\r\n", "a".repeat(40)).as_bytes());
        }
        data.extend_from_slice(b"\r\n");

        let result = reader(&data).read_request().await;
        assert!(matches!(
            result,
            Err(Error::HandshakeTooLarge { max: 8192, .. })
        ));
    }

    #[tokio::test]
    async fn test_read_request_truncated() {
        let result = reader(b"GET / HTTP/1.1\r\nOrigin: x\r\n").read_request().await;
        assert_eq!(result, Err(Error::ConnectionClosed));
    }

    #[tokio::test]
    async fn test_read_request_bad_request_line() {
        let result = reader(b"POST / HTTP/1.1\r\n\r\n").read_request().await;
        assert!(matches!(result, Err(Error::InvalidHandshake(_))));
    }
}
