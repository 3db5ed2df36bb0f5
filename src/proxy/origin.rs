//! The HTTP-to-origin fetch path: an alternate worker callback used instead
//! of the cache daemon when the proxy is configured to forward straight to
//! an upstream origin. Not part of the IPC data plane — a minimal blocking
//! HTTP/1.1 client is enough to make the binary runnable end to end.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpStream;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use socket2::{Domain, Socket, Type};

/// Result of fetching `path` from `origin_host`: the HTTP status and the
/// full response body.
pub struct OriginResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

/// Performs a blocking `GET <path>` against `origin_host` (a `host[:port]`
/// string) and returns the status and body. `TCP_NODELAY` is set the same
/// way the rest of this crate tunes its sockets.
pub fn fetch(origin_host: &str, path: &str) -> Result<OriginResponse> {
    let (host, port) = split_host_port(origin_host);
    let addr = format!("{host}:{port}");
    let socket = Socket::new(Domain::IPV4, Type::STREAM, None).context("socket() failed")?;
    socket.set_nodelay(true).ok();
    let socket_addr = addr
        .parse()
        .or_else(|_| resolve_first(&host, port))
        .with_context(|| format!("could not resolve origin host {host}"))?;
    socket
        .connect(&socket_addr.into())
        .with_context(|| format!("failed to connect to origin {addr}"))?;
    let mut stream: TcpStream = socket.into();
    stream.set_read_timeout(Some(Duration::from_secs(30))).ok();

    let request = format!(
        "GET {path} HTTP/1.1\r\nHost: {host}\r\nConnection: close\r\n\r\n"
    );
    stream
        .write_all(request.as_bytes())
        .context("failed to write origin request")?;

    let mut reader = BufReader::new(stream);
    let mut status_line = String::new();
    reader
        .read_line(&mut status_line)
        .context("failed to read origin status line")?;
    let status = parse_status_line(&status_line)?;

    let mut content_length: Option<usize> = None;
    loop {
        let mut line = String::new();
        let n = reader.read_line(&mut line).context("failed to read origin headers")?;
        if n == 0 || line == "\r\n" || line == "\n" {
            break;
        }
        if let Some(value) = line.strip_prefix("Content-Length:").or_else(|| line.strip_prefix("content-length:")) {
            content_length = value.trim().parse().ok();
        }
    }

    let mut body = Vec::new();
    match content_length {
        Some(len) => {
            body.resize(len, 0);
            reader
                .read_exact(&mut body)
                .context("origin body shorter than Content-Length")?;
        }
        None => {
            reader
                .read_to_end(&mut body)
                .context("failed to read origin body")?;
        }
    }

    Ok(OriginResponse { status, body })
}

fn split_host_port(origin_host: &str) -> (String, u16) {
    match origin_host.rsplit_once(':') {
        Some((host, port)) => match port.parse() {
            Ok(p) => (host.to_string(), p),
            Err(_) => (origin_host.to_string(), 80),
        },
        None => (origin_host.to_string(), 80),
    }
}

fn resolve_first(host: &str, port: u16) -> Result<std::net::SocketAddr> {
    use std::net::ToSocketAddrs;
    (host, port)
        .to_socket_addrs()
        .with_context(|| format!("DNS resolution failed for {host}:{port}"))?
        .next()
        .ok_or_else(|| anyhow!("no addresses found for {host}:{port}"))
}

fn parse_status_line(line: &str) -> Result<u16> {
    let mut parts = line.trim_end().splitn(3, ' ');
    let _version = parts.next().ok_or_else(|| anyhow!("empty origin status line"))?;
    let code = parts
        .next()
        .ok_or_else(|| anyhow!("origin status line missing status code: {line:?}"))?;
    code.parse()
        .with_context(|| format!("invalid status code {code:?} in {line:?}"))
}
