use std::io::{self, BufRead, Write};

use super::error::SessionError;

/// Maximum line length the reader will buffer; longer lines are truncated,
/// not treated as an error (§4.1).
const MAX_LINE_LEN: usize = 1024;

/// One fully-drained logical SMTP reply: a run of `NNN-` continuation
/// lines terminated by an `NNN text` (or bare `NNN`) final line. The code
/// of the *last* line is the reply's code (§4.4 "Multi-line replies").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub code: u16,
    /// Raw concatenated text of every line, CRLF-joined, in arrival order.
    pub raw: String,
}

impl Reply {
    pub fn is_2xx(&self) -> bool {
        (200..300).contains(&self.code)
    }
}

/// Write `COMMAND [args]<CRLF>` to `w`. Write failure surfaces
/// `SendFailed(host)` (§4.1).
pub fn send_command<W: Write>(w: &mut W, host: &str, command: &str) -> Result<(), SessionError> {
    let mut line = command.as_bytes().to_vec();
    line.extend_from_slice(b"\r\n");
    w.write_all(&line)
        .and_then(|_| w.flush())
        .map_err(|err| SessionError::send_failed(host, &err))
}

/// Read one logical reply, draining every `NNN-` continuation line before
/// returning. An EOF mid-reply is `NoResponse`; a malformed line is folded
/// into `UnexpectedResponse` since it cannot be classified.
pub fn read_reply<R: BufRead>(r: &mut R, command: &str) -> Result<Reply, SessionError> {
    let mut code: Option<u16> = None;
    let mut raw = String::new();
    loop {
        let line = read_line(r, command)?;
        if line.len() < 3 || !line.as_bytes()[..3].iter().all(u8::is_ascii_digit) {
            return Err(SessionError::unexpected_response(command, 0, &line));
        }
        let parsed: u16 = line[..3]
            .parse()
            .map_err(|_| SessionError::unexpected_response(command, 0, &line))?;
        code.get_or_insert(parsed);
        raw.push_str(&line);
        raw.push_str("\r\n");
        let is_continuation = line.as_bytes().get(3) == Some(&b'-');
        if !is_continuation {
            break;
        }
    }
    Ok(Reply {
        code: code.unwrap_or(0),
        raw,
    })
}

/// Read a single CRLF- or LF-terminated line, truncating at
/// [`MAX_LINE_LEN`] rather than erroring (§4.1). EOF with no bytes read
/// yet is `NoResponse`.
fn read_line<R: BufRead>(r: &mut R, command: &str) -> Result<String, SessionError> {
    let mut buf = Vec::new();
    loop {
        let available = r.fill_buf().map_err(|err| {
            if is_timeout(&err) {
                SessionError::timeout(command)
            } else {
                SessionError::no_response(command)
            }
        })?;
        if available.is_empty() {
            if buf.is_empty() {
                return Err(SessionError::no_response(command));
            }
            break;
        }
        if let Some(pos) = available.iter().position(|b| *b == b'\n') {
            if buf.len() + pos < MAX_LINE_LEN {
                buf.extend_from_slice(&available[..pos]);
            }
            r.consume(pos + 1);
            break;
        } else {
            if buf.len() < MAX_LINE_LEN {
                buf.extend_from_slice(available);
            }
            let consumed = available.len();
            r.consume(consumed);
        }
    }
    buf.truncate(MAX_LINE_LEN.min(buf.len()));
    while buf.last() == Some(&b'\r') {
        buf.pop();
    }
    String::from_utf8(buf).map_err(|_| {
        SessionError::unexpected_response(command, 0, "non-utf8 reply line")
    })
}

/// An IO error surfaced while connecting/reading, mapped to the nearest
/// §7 kind by the caller; kept as a thin helper so `transport.rs` doesn't
/// need to duplicate this match.
pub fn is_timeout(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn single_line_reply() {
        let mut cur = Cursor::new(b"250 ok\r\n".to_vec());
        let reply = read_reply(&mut cur, "EHLO").unwrap();
        assert_eq!(reply.code, 250);
        assert_eq!(reply.raw, "250 ok\r\n");
    }

    #[test]
    fn multiline_reply_uses_last_code() {
        let mut cur = Cursor::new(b"220-greeting\r\n220 ready\r\n".to_vec());
        let reply = read_reply(&mut cur, "CONNECT").unwrap();
        assert_eq!(reply.code, 220);
        assert_eq!(reply.raw, "220-greeting\r\n220 ready\r\n");
    }

    #[test]
    fn bare_code_with_no_text_is_final() {
        let mut cur = Cursor::new(b"250\r\n".to_vec());
        let reply = read_reply(&mut cur, "RSET").unwrap();
        assert_eq!(reply.code, 250);
    }

    #[test]
    fn eof_is_no_response() {
        let mut cur = Cursor::new(Vec::<u8>::new());
        let err = read_reply(&mut cur, "EHLO").unwrap_err();
        assert_eq!(err.kind, super::super::error::SessionErrorKind::NoResponse);
    }

    #[test]
    fn reply_parsing_is_idempotent_on_concatenation() {
        let raw = b"250-one\r\n250-two\r\n250 three\r\n".to_vec();
        let mut cur = Cursor::new(raw.clone());
        let parsed = read_reply(&mut cur, "EHLO").unwrap();
        let mut cur2 = Cursor::new(parsed.raw.clone().into_bytes());
        let reparsed = read_reply(&mut cur2, "EHLO").unwrap();
        assert_eq!(parsed.code, reparsed.code);
        assert_eq!(parsed.raw, reparsed.raw);
    }
}
