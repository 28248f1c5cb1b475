use std::io::{self, BufReader, Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use super::error::SessionError;
use super::wire;

/// Optional HTTP-CONNECT proxy to tunnel the SMTP conversation through
/// (§4.2, §4.7). Once the proxy replies `200` to `CONNECT`, the stream
/// behaves identically to a direct one.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub host: String,
    pub port: u16,
}

/// A connected transport: a TCP stream to `host:port`, optionally tunneled
/// through an HTTP-CONNECT proxy. Owns the socket exclusively; `Close` is
/// idempotent (§4.2).
pub struct Transport {
    host: String,
    reader: BufReader<TcpStream>,
    stream: TcpStream,
    closed: bool,
}

impl Transport {
    /// Opens a TCP stream to `host:port` with `connect_deadline`, then sets
    /// the read/write deadline to the same value as a baseline (§4.2).
    /// Surfaces `NoConnection(host)` on failure.
    pub fn connect(host: &str, port: u16, connect_deadline: Duration) -> Result<Self, SessionError> {
        let addr = resolve_one(host, port).map_err(|err| SessionError::no_connection(host, &err))?;
        let stream = TcpStream::connect_timeout(&addr, connect_deadline)
            .map_err(|err| SessionError::no_connection(host, &err))?;
        Self::from_stream(host, stream, connect_deadline)
    }

    /// Opens a TCP stream to the proxy, issues an HTTP `CONNECT host:port`,
    /// and treats the tunnel as live once the proxy answers `200` (§4.2,
    /// §4.7's "cURL-mode" uses the transcript variant instead; this is the
    /// structured equivalent for direct callers).
    pub fn connect_via_proxy(
        proxy: &ProxyConfig,
        host: &str,
        port: u16,
        connect_deadline: Duration,
    ) -> Result<Self, SessionError> {
        let addr = resolve_one(&proxy.host, proxy.port)
            .map_err(|err| SessionError::no_connection(&proxy.host, &err))?;
        let mut stream = TcpStream::connect_timeout(&addr, connect_deadline)
            .map_err(|err| SessionError::no_connection(&proxy.host, &err))?;
        stream
            .set_read_timeout(Some(connect_deadline))
            .map_err(|err| SessionError::no_connection(&proxy.host, &err))?;

        let request = format!(
            "CONNECT {host}:{port} HTTP/1.1\r\nHost: {host}:{port}\r\nProxy-Connection: Keep-Alive\r\n\r\n"
        );
        stream
            .write_all(request.as_bytes())
            .map_err(|err| SessionError::send_failed(&proxy.host, &err))?;

        let mut reader = BufReader::new(
            stream
                .try_clone()
                .map_err(|err| SessionError::no_connection(&proxy.host, &err))?,
        );
        let status_line = read_http_status_line(&mut reader)
            .map_err(|err| SessionError::no_connection(&proxy.host, &err))?;
        if !status_line.contains(" 200 ") && !status_line.ends_with(" 200") {
            return Err(SessionError::unexpected_response(
                "CONNECT",
                0,
                &status_line,
            ));
        }

        Self::from_stream(host, stream, connect_deadline)
    }

    fn from_stream(host: &str, stream: TcpStream, deadline: Duration) -> Result<Self, SessionError> {
        stream
            .set_read_timeout(Some(deadline))
            .map_err(|err| SessionError::no_connection(host, &err))?;
        stream
            .set_write_timeout(Some(deadline))
            .map_err(|err| SessionError::no_connection(host, &err))?;
        let reader = BufReader::new(
            stream
                .try_clone()
                .map_err(|err| SessionError::no_connection(host, &err))?,
        );
        Ok(Self {
            host: host.to_string(),
            reader,
            stream,
            closed: false,
        })
    }

    /// Overrides the read deadline for the next command, per the
    /// named-timeout model (§5).
    pub fn set_deadline(&mut self, deadline: Duration) -> Result<(), SessionError> {
        self.stream
            .set_read_timeout(Some(deadline))
            .and_then(|_| self.stream.set_write_timeout(Some(deadline)))
            .map_err(|err| SessionError::no_connection(&self.host, &err))
    }

    pub fn send(&mut self, command: &str) -> Result<(), SessionError> {
        wire::send_command(&mut self.stream, &self.host, command)
    }

    pub fn read_reply(&mut self, command: &str) -> Result<wire::Reply, SessionError> {
        wire::read_reply(&mut self.reader, command)
    }

    /// Idempotent: a second call is a no-op.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        let _ = self.stream.shutdown(std::net::Shutdown::Both);
        self.closed = true;
    }

    pub fn host(&self) -> &str {
        &self.host
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        // Best-effort, no QUIT: lifecycle teardown per §3 "implicit"
        // disconnect.
        self.close();
    }
}

fn resolve_one(host: &str, port: u16) -> io::Result<SocketAddr> {
    (host, port)
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| io::Error::new(io::ErrorKind::AddrNotAvailable, "no address resolved"))
}

fn read_http_status_line<R: Read>(r: &mut BufReader<R>) -> io::Result<String>
where
    R: Read,
{
    use std::io::BufRead;
    let mut line = String::new();
    r.read_line(&mut line)?;
    while line.ends_with('\n') || line.ends_with('\r') {
        line.pop();
    }
    // Drain headers up to the blank line terminating the CONNECT response.
    loop {
        let mut header = String::new();
        let n = r.read_line(&mut header)?;
        if n == 0 || header.trim().is_empty() {
            break;
        }
    }
    Ok(line)
}
