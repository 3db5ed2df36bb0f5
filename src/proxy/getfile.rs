//! The Getfile wire protocol: a tiny client-facing request/response format
//! over a plain TCP socket. This is the external collaborator spec calls
//! out as owning header semantics — the core only ever calls in with one
//! of two outcomes (`OK` with a length, or `FILE_NOT_FOUND`) followed by a
//! stream of body bytes.

use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};

use anyhow::{bail, Context, Result};
use socket2::{Socket, TcpKeepalive};
use tracing::{debug, warn};

/// Status codes, matching the values the original `gfserver.h` contract
/// assigns them.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GfStatus {
    Ok = 200,
    FileNotFound = 400,
    Error = 500,
}

impl GfStatus {
    fn as_str(self) -> &'static str {
        match self {
            GfStatus::Ok => "OK",
            GfStatus::FileNotFound => "FILE_NOT_FOUND",
            GfStatus::Error => "ERROR",
        }
    }
}

/// Listens for Getfile client connections and hands each parsed request to
/// the caller one at a time.
pub struct GetfileListener {
    listener: TcpListener,
}

/// One accepted connection, parsed into a request path and a reply handle.
pub struct GetfileRequest {
    pub path: String,
    pub reply: GetfileReply,
}

impl GetfileListener {
    pub fn bind(port: u16) -> Result<Self> {
        let listener = TcpListener::bind(("0.0.0.0", port))
            .with_context(|| format!("failed to bind Getfile listener on port {port}"))?;
        Ok(Self { listener })
    }

    /// Blocks until the next client connects, parses its request line, and
    /// returns the path plus a reply handle. Connections that fail to parse
    /// are logged and skipped, never propagated as fatal to the caller.
    pub fn accept(&self) -> Result<Option<GetfileRequest>> {
        let (stream, peer) = self.listener.accept().context("accept failed")?;
        debug!(%peer, "accepted Getfile connection");
        let socket = Socket::from(stream.try_clone().context("failed to clone client stream")?);
        let _ = socket.set_tcp_keepalive(&TcpKeepalive::new());
        let _ = stream.set_nodelay(true);

        let mut reader = BufReader::new(stream.try_clone().context("failed to clone stream")?);
        let mut request_line = String::new();
        if reader.read_line(&mut request_line).unwrap_or(0) == 0 {
            warn!(%peer, "client closed connection before sending a request");
            return Ok(None);
        }

        match parse_request_line(&request_line) {
            Some(path) => Ok(Some(GetfileRequest {
                path,
                reply: GetfileReply { stream },
            })),
            None => {
                warn!(%peer, line = %request_line.trim_end(), "malformed Getfile request line");
                Ok(None)
            }
        }
    }
}

/// `GETFILE GET <path>\r\n\r\n` — the only request form this server accepts.
fn parse_request_line(line: &str) -> Option<String> {
    let mut parts = line.trim_end().split_whitespace();
    if parts.next()? != "GETFILE" {
        return None;
    }
    if parts.next()? != "GET" {
        return None;
    }
    let path = parts.next()?;
    if path.is_empty() {
        return None;
    }
    Some(path.to_string())
}

/// The reply half of one Getfile transaction.
pub struct GetfileReply {
    stream: TcpStream,
}

impl GetfileReply {
    /// Wraps an already-connected stream as a reply handle. `GetfileListener`
    /// is the usual source of these, but tests build one directly from a
    /// loopback `TcpStream` to drive a transaction without a real client.
    pub fn from_stream(stream: TcpStream) -> Self {
        Self { stream }
    }

    /// Sends the `GETFILE <status> <length>\r\n\r\n` header. Must be called
    /// exactly once, before any body bytes.
    pub fn send_header(&mut self, status: GfStatus, len: i64) -> Result<()> {
        let header = format!("GETFILE {} {}\r\n\r\n", status.as_str(), len);
        self.stream
            .write_all(header.as_bytes())
            .context("failed to write Getfile header")?;
        Ok(())
    }

    /// Writes one chunk of body bytes, tolerating a short write by
    /// returning how many bytes actually went out rather than erroring —
    /// the transfer protocol logs short writes and keeps draining its peer.
    pub fn write_chunk(&mut self, data: &[u8]) -> Result<usize> {
        match self.stream.write(data) {
            Ok(n) => Ok(n),
            Err(e) => bail!("client write failed: {e}"),
        }
    }
}
