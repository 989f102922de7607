// crates/tool-relay-tools/src/amqp.rs
// ============================================================================
// Module: AMQP Connection Probe
// Description: Minimal AMQP 0-9-1 connection handshake over TCP.
// Purpose: Verify broker reachability and credentials without a client stack.
// Dependencies: bytes, tokio, thiserror, tracing
// ============================================================================

//! ## Overview
//! The probe performs the connection handshake: protocol header,
//! `Start`/`StartOk` with PLAIN credentials, `Tune`/`TuneOk`, `Open`/`OpenOk`,
//! then opens one channel to confirm the broker accepts channel traffic, and
//! finishes with a graceful connection `Close`.
//!
//! Frames are bounded by [`MAX_FRAME_BYTES`]; all decoding is length-checked
//! and malformed input surfaces as [`ProbeError::Malformed`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;
use std::io;

use bytes::BufMut;
use bytes::BytesMut;
use thiserror::Error;
use tokio::io::AsyncRead;
use tokio::io::AsyncReadExt;
use tokio::io::AsyncWrite;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Protocol header announcing AMQP 0-9-1.
pub const PROTOCOL_HEADER: &[u8; 8] = b"AMQP\x00\x00\x09\x01";
/// Largest frame payload accepted from a broker.
pub const MAX_FRAME_BYTES: usize = 128 * 1024;
/// Method frame type.
const FRAME_METHOD: u8 = 1;
/// Heartbeat frame type.
const FRAME_HEARTBEAT: u8 = 8;
/// Frame terminator octet.
const FRAME_END: u8 = 0xCE;
/// Reply code for a normal connection close.
const REPLY_SUCCESS: u16 = 200;
/// Channel carrying connection-class methods.
pub(crate) const CONTROL_CHANNEL: u16 = 0;
/// Channel opened to confirm the broker accepts channel traffic.
pub(crate) const PROBE_CHANNEL: u16 = 1;

/// Class and method identifiers of a method frame.
type MethodId = (u16, u16);

/// `connection.start`
pub(crate) const CONNECTION_START: MethodId = (10, 10);
/// `connection.start-ok`
pub(crate) const CONNECTION_START_OK: MethodId = (10, 11);
/// `connection.tune`
pub(crate) const CONNECTION_TUNE: MethodId = (10, 30);
/// `connection.tune-ok`
pub(crate) const CONNECTION_TUNE_OK: MethodId = (10, 31);
/// `connection.open`
pub(crate) const CONNECTION_OPEN: MethodId = (10, 40);
/// `connection.open-ok`
pub(crate) const CONNECTION_OPEN_OK: MethodId = (10, 41);
/// `connection.close`
pub(crate) const CONNECTION_CLOSE: MethodId = (10, 50);
/// `connection.close-ok`
pub(crate) const CONNECTION_CLOSE_OK: MethodId = (10, 51);
/// `channel.open`
pub(crate) const CHANNEL_OPEN: MethodId = (20, 10);
/// `channel.open-ok`
pub(crate) const CHANNEL_OPEN_OK: MethodId = (20, 11);

// ============================================================================
// SECTION: Types
// ============================================================================

/// Broker endpoint and credentials for a probe.
#[derive(Clone, PartialEq, Eq)]
pub struct ProbeTarget {
    /// Broker host name or address.
    pub host: String,
    /// Broker TCP port.
    pub port: u16,
    /// Login user.
    pub user: String,
    /// Login password.
    pub password: String,
    /// Virtual host to open.
    pub vhost: String,
}

impl fmt::Debug for ProbeTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProbeTarget")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("vhost", &self.vhost)
            .finish()
    }
}

/// Server identification reported in `connection.start`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerInfo {
    /// Server product name.
    pub product: Option<String>,
    /// Server version.
    pub version: Option<String>,
}

/// AMQP probe failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProbeError {
    /// TCP connection could not be established.
    #[error("connection failed: {0}")]
    Connect(String),
    /// Socket read or write failed.
    #[error("i/o error: {0}")]
    Io(String),
    /// The broker closed the socket mid-handshake.
    #[error("connection closed by broker")]
    Closed,
    /// The broker does not speak AMQP 0-9-1.
    #[error("unsupported protocol: {0}")]
    UnsupportedProtocol(String),
    /// The broker closed the connection with a reply code.
    #[error("broker refused connection ({code}): {text}")]
    Refused {
        /// AMQP reply code.
        code: u16,
        /// AMQP reply text.
        text: String,
    },
    /// A frame or method payload could not be decoded.
    #[error("malformed frame: {0}")]
    Malformed(String),
    /// The broker sent a method out of sequence.
    #[error("unexpected method {class}.{method}")]
    Unexpected {
        /// Class identifier.
        class: u16,
        /// Method identifier.
        method: u16,
    },
    /// The broker does not offer PLAIN authentication.
    #[error("broker does not offer PLAIN authentication (offers: {0})")]
    NoPlainAuth(String),
    /// Local input cannot be encoded.
    #[error("invalid probe input: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Probe
// ============================================================================

/// Connects to the broker and performs the connection handshake.
///
/// # Errors
///
/// Returns [`ProbeError`] when the connection or any handshake step fails.
pub async fn probe(target: &ProbeTarget) -> Result<ServerInfo, ProbeError> {
    let mut stream = TcpStream::connect((target.host.as_str(), target.port))
        .await
        .map_err(|err| ProbeError::Connect(err.to_string()))?;
    handshake(&mut stream, target).await
}

/// Performs the connection handshake over an established stream.
///
/// # Errors
///
/// Returns [`ProbeError`] when any handshake step fails.
pub async fn handshake<S>(stream: &mut S, target: &ProbeTarget) -> Result<ServerInfo, ProbeError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    stream.write_all(PROTOCOL_HEADER).await.map_err(io_error)?;

    let start = expect_method(stream, CONNECTION_START).await?;
    let mut reader = Reader::new(&start);
    let version = (reader.u8()?, reader.u8()?);
    if version != (0, 9) {
        return Err(ProbeError::UnsupportedProtocol(format!(
            "server speaks AMQP {}-{}",
            version.0, version.1
        )));
    }
    let properties = reader.table()?;
    let mechanisms = String::from_utf8_lossy(reader.longstr()?).into_owned();
    if !mechanisms.split_whitespace().any(|mechanism| mechanism == "PLAIN") {
        return Err(ProbeError::NoPlainAuth(mechanisms));
    }

    let mut args = BytesMut::new();
    put_table(&mut args, &[("product", "tool-relay"), ("version", env!("CARGO_PKG_VERSION"))])?;
    put_shortstr(&mut args, "PLAIN")?;
    put_longstr(&mut args, &plain_response(&target.user, &target.password))?;
    put_shortstr(&mut args, "en_US")?;
    write_method(stream, CONTROL_CHANNEL, CONNECTION_START_OK, &args).await?;

    let tune = expect_method(stream, CONNECTION_TUNE).await?;
    let mut reader = Reader::new(&tune);
    let channel_max = reader.u16()?;
    let frame_max = reader.u32()?;
    let mut args = BytesMut::new();
    args.put_u16(channel_max);
    args.put_u32(frame_max);
    args.put_u16(0);
    write_method(stream, CONTROL_CHANNEL, CONNECTION_TUNE_OK, &args).await?;

    let mut args = BytesMut::new();
    put_shortstr(&mut args, &target.vhost)?;
    put_shortstr(&mut args, "")?;
    args.put_u8(0);
    write_method(stream, CONTROL_CHANNEL, CONNECTION_OPEN, &args).await?;
    expect_method(stream, CONNECTION_OPEN_OK).await?;

    let mut args = BytesMut::new();
    put_shortstr(&mut args, "")?;
    write_method(stream, PROBE_CHANNEL, CHANNEL_OPEN, &args).await?;
    expect_method(stream, CHANNEL_OPEN_OK).await?;

    let args = close_args(REPLY_SUCCESS, "probe complete")?;
    write_method(stream, CONTROL_CHANNEL, CONNECTION_CLOSE, &args).await?;
    if let Err(err) = expect_method(stream, CONNECTION_CLOSE_OK).await {
        tracing::debug!(error = %err, "broker did not acknowledge connection close");
    }

    Ok(ServerInfo {
        product: properties.get("product").cloned(),
        version: properties.get("version").cloned(),
    })
}

/// Builds the PLAIN SASL response.
fn plain_response(user: &str, password: &str) -> Vec<u8> {
    let mut response = Vec::with_capacity(user.len() + password.len() + 2);
    response.push(0);
    response.extend_from_slice(user.as_bytes());
    response.push(0);
    response.extend_from_slice(password.as_bytes());
    response
}

/// Encodes `connection.close` arguments.
pub(crate) fn close_args(code: u16, text: &str) -> Result<BytesMut, ProbeError> {
    let mut args = BytesMut::new();
    args.put_u16(code);
    put_shortstr(&mut args, text)?;
    args.put_u16(0);
    args.put_u16(0);
    Ok(args)
}

// ============================================================================
// SECTION: Framing
// ============================================================================

/// A decoded frame.
struct Frame {
    /// Frame type octet.
    kind: u8,
    /// Frame payload.
    payload: Vec<u8>,
}

/// Reads one frame.
async fn read_frame<S>(stream: &mut S) -> Result<Frame, ProbeError>
where
    S: AsyncRead + Unpin,
{
    let mut header = [0u8; 7];
    read_exact(stream, &mut header).await?;
    if header.starts_with(b"AMQP") {
        return Err(ProbeError::UnsupportedProtocol(format!(
            "server replied with protocol header {}.{}.{}",
            header[4], header[5], header[6]
        )));
    }
    let kind = header[0];
    let size = u32::from_be_bytes([header[3], header[4], header[5], header[6]]);
    let size = usize::try_from(size)
        .ok()
        .filter(|size| *size <= MAX_FRAME_BYTES)
        .ok_or_else(|| ProbeError::Malformed(format!("frame of {size} bytes exceeds limit")))?;
    let mut payload = vec![0u8; size + 1];
    read_exact(stream, &mut payload).await?;
    if payload.pop() != Some(FRAME_END) {
        return Err(ProbeError::Malformed("missing frame end marker".to_string()));
    }
    Ok(Frame {
        kind,
        payload,
    })
}

/// Writes a method frame on `channel`.
pub(crate) async fn write_method<S>(
    stream: &mut S,
    channel: u16,
    method: MethodId,
    args: &[u8],
) -> Result<(), ProbeError>
where
    S: AsyncWrite + Unpin,
{
    let size = u32::try_from(args.len() + 4)
        .map_err(|_| ProbeError::Invalid("method arguments too large".to_string()))?;
    let mut frame = BytesMut::with_capacity(args.len() + 12);
    frame.put_u8(FRAME_METHOD);
    frame.put_u16(channel);
    frame.put_u32(size);
    frame.put_u16(method.0);
    frame.put_u16(method.1);
    frame.put_slice(args);
    frame.put_u8(FRAME_END);
    stream.write_all(&frame).await.map_err(io_error)?;
    stream.flush().await.map_err(io_error)
}

/// Reads frames until a method arrives and returns its arguments.
///
/// Heartbeats are skipped. A `connection.close` that was not expected is
/// reported as [`ProbeError::Refused`].
pub(crate) async fn expect_method<S>(
    stream: &mut S,
    expected: MethodId,
) -> Result<Vec<u8>, ProbeError>
where
    S: AsyncRead + Unpin,
{
    loop {
        let frame = read_frame(stream).await?;
        match frame.kind {
            FRAME_HEARTBEAT => {}
            FRAME_METHOD => {
                let mut reader = Reader::new(&frame.payload);
                let method = (reader.u16()?, reader.u16()?);
                let args = reader.rest().to_vec();
                if method == expected {
                    return Ok(args);
                }
                if method == CONNECTION_CLOSE {
                    let mut reader = Reader::new(&args);
                    return Err(ProbeError::Refused {
                        code: reader.u16()?,
                        text: reader.shortstr()?,
                    });
                }
                return Err(ProbeError::Unexpected {
                    class: method.0,
                    method: method.1,
                });
            }
            other => {
                return Err(ProbeError::Malformed(format!("unexpected frame type {other}")));
            }
        }
    }
}

/// Fills `buf`, mapping end-of-stream to [`ProbeError::Closed`].
async fn read_exact<S>(stream: &mut S, buf: &mut [u8]) -> Result<(), ProbeError>
where
    S: AsyncRead + Unpin,
{
    match stream.read_exact(buf).await {
        Ok(_) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => Err(ProbeError::Closed),
        Err(err) => Err(io_error(err)),
    }
}

/// Maps socket errors.
fn io_error(err: io::Error) -> ProbeError {
    ProbeError::Io(err.to_string())
}

// ============================================================================
// SECTION: Decoding
// ============================================================================

/// Bounds-checked reader over a method payload.
pub(crate) struct Reader<'a> {
    /// Unread bytes.
    bytes: &'a [u8],
}

impl<'a> Reader<'a> {
    /// Creates a reader over `bytes`.
    pub(crate) const fn new(bytes: &'a [u8]) -> Self {
        Self {
            bytes,
        }
    }

    /// Returns the unread bytes.
    const fn rest(&self) -> &'a [u8] {
        self.bytes
    }

    /// Consumes `len` bytes.
    fn take(&mut self, len: usize) -> Result<&'a [u8], ProbeError> {
        let (head, rest) = self
            .bytes
            .split_at_checked(len)
            .ok_or_else(|| ProbeError::Malformed("truncated method payload".to_string()))?;
        self.bytes = rest;
        Ok(head)
    }

    /// Consumes a fixed-size array.
    fn array<const N: usize>(&mut self) -> Result<[u8; N], ProbeError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    /// Reads an octet.
    pub(crate) fn u8(&mut self) -> Result<u8, ProbeError> {
        Ok(u8::from_be_bytes(self.array()?))
    }

    /// Reads a big-endian short.
    pub(crate) fn u16(&mut self) -> Result<u16, ProbeError> {
        Ok(u16::from_be_bytes(self.array()?))
    }

    /// Reads a big-endian long.
    pub(crate) fn u32(&mut self) -> Result<u32, ProbeError> {
        Ok(u32::from_be_bytes(self.array()?))
    }

    /// Reads a short string.
    pub(crate) fn shortstr(&mut self) -> Result<String, ProbeError> {
        let len = usize::from(self.u8()?);
        Ok(String::from_utf8_lossy(self.take(len)?).into_owned())
    }

    /// Reads a long string as raw bytes.
    pub(crate) fn longstr(&mut self) -> Result<&'a [u8], ProbeError> {
        let len = usize::try_from(self.u32()?)
            .map_err(|_| ProbeError::Malformed("long string length overflow".to_string()))?;
        self.take(len)
    }

    /// Reads a field table, keeping only long-string values.
    pub(crate) fn table(&mut self) -> Result<BTreeMap<String, String>, ProbeError> {
        let mut inner = Reader::new(self.longstr()?);
        let mut entries = BTreeMap::new();
        while !inner.bytes.is_empty() {
            let key = inner.shortstr()?;
            match inner.u8()? {
                b'S' => {
                    let value = String::from_utf8_lossy(inner.longstr()?).into_owned();
                    entries.insert(key, value);
                }
                b'x' | b'A' | b'F' => {
                    inner.longstr()?;
                }
                b't' | b'b' | b'B' => {
                    inner.take(1)?;
                }
                b's' | b'u' => {
                    inner.take(2)?;
                }
                b'I' | b'i' | b'f' => {
                    inner.take(4)?;
                }
                b'D' => {
                    inner.take(5)?;
                }
                b'l' | b'L' | b'd' | b'T' => {
                    inner.take(8)?;
                }
                b'V' => {}
                other => {
                    return Err(ProbeError::Malformed(format!(
                        "unsupported field type '{}' for key {key}",
                        char::from(other)
                    )));
                }
            }
        }
        Ok(entries)
    }
}

// ============================================================================
// SECTION: Encoding
// ============================================================================

/// Writes a short string.
pub(crate) fn put_shortstr(buf: &mut BytesMut, value: &str) -> Result<(), ProbeError> {
    let len = u8::try_from(value.len())
        .map_err(|_| ProbeError::Invalid(format!("short string exceeds 255 bytes: {value}")))?;
    buf.put_u8(len);
    buf.put_slice(value.as_bytes());
    Ok(())
}

/// Writes a long string.
pub(crate) fn put_longstr(buf: &mut BytesMut, value: &[u8]) -> Result<(), ProbeError> {
    let len = u32::try_from(value.len())
        .map_err(|_| ProbeError::Invalid("long string too large".to_string()))?;
    buf.put_u32(len);
    buf.put_slice(value);
    Ok(())
}

/// Writes a field table of long-string values.
pub(crate) fn put_table(buf: &mut BytesMut, entries: &[(&str, &str)]) -> Result<(), ProbeError> {
    let mut table = BytesMut::new();
    for (key, value) in entries {
        put_shortstr(&mut table, key)?;
        table.put_u8(b'S');
        put_longstr(&mut table, value.as_bytes())?;
    }
    put_longstr(buf, &table)
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
pub(crate) mod fake_broker;
