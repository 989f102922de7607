// crates/tool-relay-tools/src/amqp/fake_broker.rs
// ============================================================================
// Module: Fake AMQP Broker
// Description: Scripted single-connection broker for handshake tests.
// Purpose: Drive the probe through success and refusal paths locally.
// Dependencies: bytes, tokio
// ============================================================================

//! ## Overview
//! [`spawn`] binds an ephemeral port, accepts one connection, and plays the
//! server side of the connection handshake according to a [`Script`]. The
//! credentials and virtual host the client sent are recorded for assertions.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test-only fixture with panic-based setup."
)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use bytes::BufMut;
use bytes::BytesMut;
use tokio::io::AsyncReadExt;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tokio::net::TcpStream;

use super::CHANNEL_OPEN;
use super::CHANNEL_OPEN_OK;
use super::CONNECTION_CLOSE;
use super::CONNECTION_CLOSE_OK;
use super::CONNECTION_OPEN;
use super::CONNECTION_OPEN_OK;
use super::CONNECTION_START;
use super::CONNECTION_START_OK;
use super::CONNECTION_TUNE;
use super::CONNECTION_TUNE_OK;
use super::CONTROL_CHANNEL;
use super::PROBE_CHANNEL;
use super::ProbeError;
use super::Reader;
use super::close_args;
use super::expect_method;
use super::put_longstr;
use super::put_shortstr;
use super::write_method;

/// Server behavior for one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Script {
    /// Complete the handshake.
    Accept,
    /// Close with 403 after `start-ok`.
    RefuseLogin,
    /// Close with 530 after `open`.
    RejectVhost,
    /// Close with 504 after `channel.open`.
    RejectChannel,
    /// Answer the protocol header with an AMQP 0-8 header.
    WrongProtocol,
    /// Offer only AMQPLAIN.
    NoPlain,
    /// Accept the socket and never answer.
    Stall,
}

/// What the client sent during the handshake.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Seen {
    /// PLAIN response bytes.
    pub(crate) credentials: Vec<u8>,
    /// Requested virtual host.
    pub(crate) vhost: Option<String>,
    /// Whether the client opened a channel.
    pub(crate) channel_opened: bool,
    /// Whether the client closed gracefully.
    pub(crate) closed: bool,
}

/// Handle to a running fake broker.
pub(crate) struct FakeBroker {
    /// Listening address.
    pub(crate) addr: SocketAddr,
    /// Recorded client input.
    seen: Arc<Mutex<Seen>>,
}

impl FakeBroker {
    /// Returns a copy of what the client sent.
    pub(crate) fn seen(&self) -> Seen {
        self.seen.lock().unwrap().clone()
    }
}

/// Starts a broker that serves one connection with `script`.
pub(crate) async fn spawn(script: Script) -> FakeBroker {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let seen = Arc::new(Mutex::new(Seen::default()));
    let record = Arc::clone(&seen);
    tokio::spawn(async move {
        if let Ok((mut socket, _)) = listener.accept().await {
            let _ = serve(&mut socket, script, &record).await;
        }
    });
    FakeBroker {
        addr,
        seen,
    }
}

/// Plays the server side of the handshake.
async fn serve(
    socket: &mut TcpStream,
    script: Script,
    seen: &Mutex<Seen>,
) -> Result<(), ProbeError> {
    let mut header = [0u8; 8];
    socket.read_exact(&mut header).await.map_err(|err| ProbeError::Io(err.to_string()))?;
    assert_eq!(&header, super::PROTOCOL_HEADER);
    match script {
        Script::WrongProtocol => {
            socket
                .write_all(b"AMQP\x01\x01\x08\x00")
                .await
                .map_err(|err| ProbeError::Io(err.to_string()))?;
            return Ok(());
        }
        Script::Stall => {
            tokio::time::sleep(Duration::from_secs(30)).await;
            return Ok(());
        }
        _ => {}
    }

    let mechanisms: &[u8] = if script == Script::NoPlain { b"AMQPLAIN" } else { b"AMQPLAIN PLAIN" };
    let mut start = BytesMut::new();
    start.put_u8(0);
    start.put_u8(9);
    put_longstr(&mut start, &server_properties()?)?;
    put_longstr(&mut start, mechanisms)?;
    put_longstr(&mut start, b"en_US")?;
    write_method(socket, CONTROL_CHANNEL, CONNECTION_START, &start).await?;

    let start_ok = expect_method(socket, CONNECTION_START_OK).await?;
    let mut reader = Reader::new(&start_ok);
    reader.table()?;
    assert_eq!(reader.shortstr()?, "PLAIN");
    seen.lock().unwrap().credentials = reader.longstr()?.to_vec();
    if script == Script::RefuseLogin {
        let args = close_args(403, "ACCESS_REFUSED - Login was refused using authentication mechanism PLAIN")?;
        return write_method(socket, CONTROL_CHANNEL, CONNECTION_CLOSE, &args).await;
    }

    let mut tune = BytesMut::new();
    tune.put_u16(2047);
    tune.put_u32(131_072);
    tune.put_u16(60);
    write_method(socket, CONTROL_CHANNEL, CONNECTION_TUNE, &tune).await?;
    expect_method(socket, CONNECTION_TUNE_OK).await?;

    let open = expect_method(socket, CONNECTION_OPEN).await?;
    let vhost = Reader::new(&open).shortstr()?;
    seen.lock().unwrap().vhost = Some(vhost.clone());
    if script == Script::RejectVhost {
        let args = close_args(530, &format!("NOT_ALLOWED - vhost {vhost} not found"))?;
        return write_method(socket, CONTROL_CHANNEL, CONNECTION_CLOSE, &args).await;
    }
    let mut open_ok = BytesMut::new();
    put_shortstr(&mut open_ok, "")?;
    write_method(socket, CONTROL_CHANNEL, CONNECTION_OPEN_OK, &open_ok).await?;

    expect_method(socket, CHANNEL_OPEN).await?;
    seen.lock().unwrap().channel_opened = true;
    if script == Script::RejectChannel {
        let args = close_args(504, "CHANNEL_ERROR - second 'channel.open' seen")?;
        return write_method(socket, CONTROL_CHANNEL, CONNECTION_CLOSE, &args).await;
    }
    let mut channel_open_ok = BytesMut::new();
    put_longstr(&mut channel_open_ok, b"")?;
    write_method(socket, PROBE_CHANNEL, CHANNEL_OPEN_OK, &channel_open_ok).await?;

    expect_method(socket, CONNECTION_CLOSE).await?;
    seen.lock().unwrap().closed = true;
    write_method(socket, CONTROL_CHANNEL, CONNECTION_CLOSE_OK, &[]).await
}

/// Encodes server properties with a mix of field types.
fn server_properties() -> Result<BytesMut, ProbeError> {
    let mut capabilities = BytesMut::new();
    put_shortstr(&mut capabilities, "publisher_confirms")?;
    capabilities.put_u8(b't');
    capabilities.put_u8(1);

    let mut table = BytesMut::new();
    put_shortstr(&mut table, "capabilities")?;
    table.put_u8(b'F');
    put_longstr(&mut table, &capabilities)?;
    put_shortstr(&mut table, "product")?;
    table.put_u8(b'S');
    put_longstr(&mut table, b"RabbitMQ")?;
    put_shortstr(&mut table, "cluster_size")?;
    table.put_u8(b'I');
    table.put_u32(3);
    put_shortstr(&mut table, "version")?;
    table.put_u8(b'S');
    put_longstr(&mut table, b"3.13.7")?;
    Ok(table)
}
