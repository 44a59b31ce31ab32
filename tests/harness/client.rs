//! Raw-TCP WebSocket client.
//!
//! Speaks just enough of the protocol to drive the server: a hand-written
//! upgrade request and masked client frames.

use std::net::SocketAddr;

use sockweb::protocol::{Frame, OpCode, apply_mask};
use sockweb::{Error, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use super::server::ORIGIN;

pub const KEY: &str = "dGhlIHNhbXBsZSBub25jZQ==";
pub const ACCEPT: &str = "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=";

/// Mask a frame the way a client must send it.
///
/// `byte0` is written verbatim so tests can set any FIN/RSV/opcode combination.
pub fn masked_frame(byte0: u8, payload: &[u8], key: [u8; 4]) -> Vec<u8> {
    let unmasked = Frame::binary(payload.to_vec()).encode();
    let header_len = unmasked.len() - payload.len();

    let mut out = Vec::with_capacity(unmasked.len() + 4);
    out.push(byte0);
    out.push(unmasked[1] | 0x80);
    out.extend_from_slice(&unmasked[2..header_len]);
    out.extend_from_slice(&key);

    let mut body = payload.to_vec();
    apply_mask(&mut body, key);
    out.extend_from_slice(&body);
    out
}

pub fn upgrade_request(origin: &str) -> String {
    format!(
        "GET /chat HTTP/1.1\r\n\
         Host: localhost\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Key: {KEY}\r\n\
         Sec-WebSocket-Version: 13\r\n\
         Origin: {origin}\r\n\
         \r\n"
    )
}

pub struct TestClient {
    stream: TcpStream,
    buf: Vec<u8>,
    mask: [u8; 4],
    /// Status line and headers of the upgrade response.
    pub response: Vec<String>,
}

impl TestClient {
    /// Connect and complete the handshake with the default origin.
    pub async fn connect(addr: SocketAddr) -> Result<Self> {
        Self::connect_with_id(addr, 0).await
    }

    pub async fn connect_with_id(addr: SocketAddr, id: usize) -> Result<Self> {
        let mut client = Self::raw(addr, id).await?;
        let status = client.handshake(&upgrade_request(ORIGIN)).await?;
        if status != "HTTP/1.1 101 Switching Protocols" {
            return Err(Error::InvalidHandshake(status));
        }
        Ok(client)
    }

    /// Open the TCP connection without handshaking.
    pub async fn raw(addr: SocketAddr, id: usize) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        let id = id as u32;
        Ok(Self {
            stream,
            buf: Vec::new(),
            mask: id.wrapping_mul(0x9E37_79B9).wrapping_add(0x1234_5678).to_be_bytes(),
            response: Vec::new(),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.stream.local_addr().unwrap()
    }

    /// Send a request head and read the response head, returning its status line.
    pub async fn handshake(&mut self, request: &str) -> Result<String> {
        self.send_raw(request.as_bytes()).await?;

        loop {
            if let Some(end) = self.buf.windows(4).position(|w| w == b"\r\n\r\n") {
                let head = String::from_utf8_lossy(&self.buf[..end]).into_owned();
                self.buf.drain(..end + 4);
                self.response = head.split("\r\n").map(str::to_owned).collect();
                return Ok(self.response[0].clone());
            }
            if self.fill().await? == 0 {
                return Err(Error::ConnectionClosed);
            }
        }
    }

    pub async fn send_raw(&mut self, bytes: &[u8]) -> Result<()> {
        self.stream.write_all(bytes).await?;
        Ok(())
    }

    pub async fn send_frame(&mut self, byte0: u8, payload: &[u8]) -> Result<()> {
        let frame = masked_frame(byte0, payload, self.mask);
        self.send_raw(&frame).await
    }

    pub async fn send_text(&mut self, text: &str) -> Result<()> {
        self.send_frame(0x81, text.as_bytes()).await
    }

    pub async fn send_binary(&mut self, data: &[u8]) -> Result<()> {
        self.send_frame(0x82, data).await
    }

    pub async fn send_ping(&mut self, payload: &[u8]) -> Result<()> {
        self.send_frame(0x89, payload).await
    }

    pub async fn send_close(&mut self, payload: &[u8]) -> Result<()> {
        self.send_frame(0x88, payload).await
    }

    /// Read the next frame, or `None` once the server closed the socket.
    pub async fn recv_frame(&mut self) -> Result<Option<Frame>> {
        loop {
            match Frame::parse(&self.buf) {
                Ok((frame, consumed)) => {
                    self.buf.drain(..consumed);
                    return Ok(Some(frame));
                }
                Err(Error::IncompleteFrame { .. }) => {}
                Err(e) => return Err(e),
            }
            if self.fill().await? == 0 {
                return Ok(None);
            }
        }
    }

    /// Read the next text frame, answering pings on the way.
    ///
    /// Returns `None` on a close frame or end of stream.
    pub async fn recv_text(&mut self) -> Result<Option<String>> {
        loop {
            let Some(frame) = self.recv_frame().await? else {
                return Ok(None);
            };
            match frame.opcode {
                OpCode::Text => {
                    let text = String::from_utf8(frame.payload().to_vec())?;
                    return Ok(Some(text));
                }
                OpCode::Ping => self.send_frame(0x8A, frame.payload()).await?,
                OpCode::Close => return Ok(None),
                _ => {}
            }
        }
    }

    /// Read the next binary frame, answering pings on the way.
    pub async fn recv_binary(&mut self) -> Result<Option<Vec<u8>>> {
        loop {
            let Some(frame) = self.recv_frame().await? else {
                return Ok(None);
            };
            match frame.opcode {
                OpCode::Binary => return Ok(Some(frame.payload().to_vec())),
                OpCode::Ping => self.send_frame(0x8A, frame.payload()).await?,
                OpCode::Close => return Ok(None),
                _ => {}
            }
        }
    }

    /// Whether the server has closed the socket, discarding anything unread.
    pub async fn is_closed(&mut self) -> bool {
        loop {
            match self.fill().await {
                Ok(0) | Err(_) => return true,
                Ok(_) => self.buf.clear(),
            }
        }
    }

    /// Run the close handshake: send a close frame, expect its echo, then EOF.
    pub async fn close(mut self) -> Result<()> {
        self.send_close(&[0x03, 0xE8]).await?;
        loop {
            match self.recv_frame().await? {
                Some(frame) if frame.opcode == OpCode::Close => break,
                Some(_) => continue,
                None => return Err(Error::ConnectionClosed),
            }
        }
        if self.recv_frame().await?.is_some() {
            return Err(Error::InvalidHandshake("data after close".into()));
        }
        Ok(())
    }

    async fn fill(&mut self) -> Result<usize> {
        let mut chunk = [0u8; 4096];
        let n = self.stream.read(&mut chunk).await?;
        self.buf.extend_from_slice(&chunk[..n]);
        Ok(n)
    }
}
