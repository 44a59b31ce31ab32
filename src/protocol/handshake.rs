//! WebSocket opening handshake (RFC 6455 Section 4).
//!
//! The server reads the upgrade request line by line: the request line
//! first, then `Name: Value` header lines until a blank line. The parsed
//! request is validated against the configured origin and answered with
//! either a `101 Switching Protocols` response or [`BAD_REQUEST`].

use std::collections::HashMap;

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use sha1::{Digest, Sha1};

use crate::error::{Error, Result};

/// The WebSocket GUID used in the Sec-WebSocket-Accept calculation (RFC 6455).
pub const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// The only protocol version this server speaks.
pub const WS_VERSION: &str = "13";

/// Response written for every rejected handshake.
pub const BAD_REQUEST: &[u8] = b"HTTP/1.1 400 Bad Request\r\n\r\n";

const HEADER_VERSION: &str = "sec-websocket-version";
const HEADER_KEY: &str = "sec-websocket-key";
const HEADER_PROTOCOL: &str = "sec-websocket-protocol";
const HEADER_ORIGIN: &str = "origin";

/// Computes the Sec-WebSocket-Accept value from the client's Sec-WebSocket-Key.
///
/// The accept key is calculated as: Base64(SHA-1(key + GUID))
///
/// # Example
///
/// ```
/// use sockweb::protocol::handshake::compute_accept_key;
///
/// let key = "dGhlIHNhbXBsZSBub25jZQ==";
/// let accept = compute_accept_key(key);
/// assert_eq!(accept, "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
/// ```
pub fn compute_accept_key(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(WS_GUID.as_bytes());
    let hash = hasher.finalize();
    BASE64.encode(hash)
}

/// Parse a request line of the form `GET <path> HTTP/1.1`, returning the path.
///
/// # Errors
///
/// Returns [`Error::InvalidHandshake`] if the method is not `GET`, the
/// version is not exactly `HTTP/1.1`, or the path is missing.
pub fn parse_request_line(line: &str) -> Result<&str> {
    let path = line
        .strip_prefix("GET ")
        .and_then(|rest| rest.strip_suffix(" HTTP/1.1"))
        .map(str::trim)
        .ok_or_else(|| Error::InvalidHandshake(format!("Invalid request line: {line}")))?;

    if path.is_empty() || path.contains(char::is_whitespace) {
        return Err(Error::InvalidHandshake(format!("Invalid request path: {path}")));
    }
    Ok(path)
}

/// Parse a `Name: Value` header line into its trimmed name and value.
///
/// # Errors
///
/// Returns [`Error::InvalidHandshake`] if there is no colon or the name is
/// empty or contains whitespace.
pub fn parse_header_line(line: &str) -> Result<(&str, &str)> {
    let (name, value) = line
        .split_once(':')
        .ok_or_else(|| Error::InvalidHandshake(format!("Malformed header line: {line}")))?;

    if name.is_empty() || name.contains(char::is_whitespace) {
        return Err(Error::InvalidHandshake(format!("Malformed header name: {name}")));
    }
    Ok((name, value.trim()))
}

/// An upgrade request as read from the client.
///
/// Header names are stored lowercased; values are kept verbatim (trimmed).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HandshakeRequest {
    /// The request path (e.g., "/chat").
    pub path: String,
    headers: HashMap<String, String>,
}

impl HandshakeRequest {
    /// Start a request from its request line.
    ///
    /// # Errors
    ///
    /// See [`parse_request_line`].
    pub fn from_request_line(line: &str) -> Result<Self> {
        Ok(Self {
            path: parse_request_line(line)?.to_string(),
            headers: HashMap::new(),
        })
    }

    /// Add one header line to the request.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHandshake`] if the line is malformed or the
    /// header was already present.
    pub fn push_header_line(&mut self, line: &str) -> Result<()> {
        let (name, value) = parse_header_line(line)?;
        let name_lower = name.to_ascii_lowercase();
        if self.headers.contains_key(&name_lower) {
            return Err(Error::InvalidHandshake(format!("Duplicate header: {name}")));
        }
        self.headers.insert(name_lower, value.to_string());
        Ok(())
    }

    /// Parse a complete request head (request line, headers, blank line).
    ///
    /// Connections read their head incrementally through
    /// [`FrameReader::read_request`](crate::codec::FrameReader::read_request),
    /// which applies the same line rules. This entry point is for a head that
    /// is already in memory, as in tests, fuzzing and benchmarks.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHandshake`] if the data is not UTF-8, the
    /// request line is invalid, or any header line is malformed.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(data)
            .map_err(|_| Error::InvalidHandshake("Invalid UTF-8".into()))?;

        let mut lines = text.split("\r\n");
        let request_line = lines
            .next()
            .ok_or_else(|| Error::InvalidHandshake("Empty request".into()))?;
        let mut request = Self::from_request_line(request_line)?;

        for line in lines {
            if line.is_empty() {
                break;
            }
            request.push_header_line(line)?;
        }
        Ok(request)
    }

    /// Look up a header by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Validate the request and build the upgrade response.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHandshake`] if:
    /// - a `Sec-WebSocket-Protocol` header is present
    /// - `Sec-WebSocket-Version`, `Sec-WebSocket-Key` or `Origin` is missing
    /// - the version is not `13`
    /// - the origin is not exactly `expected_origin`
    pub fn validate(&self, expected_origin: &str) -> Result<HandshakeResponse> {
        if self.header(HEADER_PROTOCOL).is_some() {
            return Err(Error::InvalidHandshake(
                "Sub-protocols are not supported".into(),
            ));
        }

        let version = self.required(HEADER_VERSION)?;
        let key = self.required(HEADER_KEY)?;
        let origin = self.required(HEADER_ORIGIN)?;

        if version != WS_VERSION {
            return Err(Error::InvalidHandshake(format!(
                "Unsupported WebSocket version: {version} (expected {WS_VERSION})"
            )));
        }

        if origin != expected_origin {
            return Err(Error::InvalidHandshake(format!(
                "Origin not allowed: {origin}"
            )));
        }

        Ok(HandshakeResponse::new(key))
    }

    fn required(&self, name: &str) -> Result<&str> {
        self.header(name)
            .ok_or_else(|| Error::InvalidHandshake(format!("Missing {name} header")))
    }
}

/// WebSocket handshake response from server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeResponse {
    /// The Sec-WebSocket-Accept value.
    pub accept: String,
}

impl HandshakeResponse {
    /// Create a response answering the given client key.
    pub fn new(key: &str) -> Self {
        Self {
            accept: compute_accept_key(key),
        }
    }

    /// Write the HTTP response to a buffer.
    pub fn write(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(b"HTTP/1.1 101 Switching Protocols\r\n");
        buf.extend_from_slice(b"Upgrade: websocket\r\n");
        buf.extend_from_slice(b"Connection: Upgrade\r\n");
        buf.extend_from_slice(format!("Sec-WebSocket-Accept: {}\r\n", self.accept).as_bytes());
        buf.extend_from_slice(b"\r\n");
    }

    /// Serialize the response into a new buffer.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(128);
        self.write(&mut buf);
        buf
    }
}
