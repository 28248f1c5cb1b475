use super::classify::{ReplyCategory, classify};
use super::diagnostics::DiagnosticsLog;
use super::error::{SessionError, SessionErrorKind};
use super::options::Timeouts;
use super::transport::Transport;
use super::wire::Reply;

/// `{helo_done, mail_done, rcpt_done}` (§3). Transitions form a DAG:
/// `helo_done` must precede `mail_done`; `mail_done` must precede any
/// `rcpt_done`; `RSET` clears `mail_done`/`rcpt_done` but preserves
/// `helo_done`; `QUIT` is only sent when `helo_done`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionState {
    pub helo_done: bool,
    pub mail_done: bool,
    pub rcpt_done: bool,
}

/// Drives one `connect -> banner -> EHLO -> MAIL FROM -> RCPT TO* -> RSET
/// -> QUIT` dialog over an owned [`Transport`] (§4.4).
///
/// A fresh `Session` is created per MX attempt by the dispatcher so state
/// never leaks across attempts (§9 design note on the source's mutable
/// member-field bug).
pub struct Session<'a> {
    transport: Transport,
    state: SessionState,
    timeouts: &'a Timeouts,
    log: &'a mut DiagnosticsLog,
    /// Once a 421 or other session-ending failure is observed, further
    /// commands are refused rather than attempted.
    dead: bool,
}

impl<'a> Session<'a> {
    pub fn new(transport: Transport, timeouts: &'a Timeouts, log: &'a mut DiagnosticsLog) -> Self {
        Self {
            transport,
            state: SessionState::default(),
            timeouts,
            log,
            dead: false,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        !self.dead
    }

    /// Reads the greeting banner. Expects 220 within the `connected`
    /// timeout; anything else (or a timeout) fails `Inconclusive(banner)`
    /// and marks the session dead.
    pub fn read_banner(&mut self) -> Result<Reply, SessionError> {
        self.transport.set_deadline(self.timeouts.connected())?;
        let reply = self.read_guarded("CONNECT")?;
        if reply.code != 220 {
            self.dead = true;
            self.log.record(format!(
                "banner rejected: {} {}",
                reply.code,
                reply.raw.trim_end()
            ));
            return Err(SessionError::unexpected_response(
                "CONNECT",
                reply.code,
                &reply.raw,
            ));
        }
        self.log.record(format!("banner: {}", reply.raw.trim_end()));
        Ok(reply)
    }

    /// `EHLO <from_domain>`. Expects 250 within the `ehlo` timeout. Does
    /// not fall back to `HELO` on failure.
    pub fn ehlo(&mut self, from_domain: &str) -> Result<(), SessionError> {
        let command = format!("EHLO {from_domain}");
        self.transport.set_deadline(self.timeouts.ehlo())?;
        let reply = self.send_and_read(&command)?;
        if reply.code != 250 {
            self.dead = true;
            self.log
                .record(format!("EHLO rejected: {} {}", reply.code, reply.raw.trim_end()));
            return Err(SessionError::unexpected_response(&command, reply.code, &reply.raw));
        }
        self.state.helo_done = true;
        self.log.record("EHLO accepted");
        Ok(())
    }

    /// `MAIL FROM:<sender>`; `sender` may be empty (`<>`). On an unexpected
    /// reply, force-closes the socket without `QUIT` (some MTAs drop the
    /// connection after rejecting `MAIL FROM`) and returns `Ok(false)`
    /// rather than an error, since this is a per-domain outcome, not a
    /// transport failure.
    pub fn mail_from(&mut self, sender: &str) -> Result<bool, SessionError> {
        if !self.state.helo_done {
            return Err(SessionError::state_guard("MAIL FROM before EHLO succeeded"));
        }
        let envelope = if sender.is_empty() {
            "MAIL FROM:<>".to_string()
        } else {
            format!("MAIL FROM:<{sender}>")
        };
        self.transport.set_deadline(self.timeouts.mail())?;
        let reply = self.send_and_read(&envelope)?;
        if reply.code == 250 {
            self.state.mail_done = true;
            self.log.record("MAIL FROM accepted");
            return Ok(true);
        }
        self.log.record(format!(
            "MAIL FROM rejected: {} {}",
            reply.code,
            reply.raw.trim_end()
        ));
        self.transport.close();
        self.dead = true;
        Ok(false)
    }

    /// `RCPT TO:<local@domain>`. Accepted codes are `{250, 251}`, plus
    /// `{450, 451, 452}` iff `greylisted_considered_valid`. Returns the raw
    /// reply text on acceptance, `None` otherwise.
    pub fn rcpt_to(
        &mut self,
        local: &str,
        domain: &str,
        greylisted_considered_valid: bool,
    ) -> Result<Option<String>, SessionError> {
        if !self.state.mail_done {
            return Err(SessionError::state_guard("RCPT TO before MAIL FROM succeeded"));
        }
        let command = format!("RCPT TO:<{local}@{domain}>");
        self.transport.set_deadline(self.timeouts.rcpt())?;
        let reply = self.send_and_read(&command)?;
        if ReplyCategory::rcpt_accepted(reply.code, greylisted_considered_valid) {
            self.state.rcpt_done = true;
            self.log
                .record(format!("RCPT TO {local}@{domain} accepted: {}", reply.code));
            Ok(Some(reply.raw))
        } else {
            self.log
                .record(format!("RCPT TO {local}@{domain} rejected: {}", reply.code));
            Ok(None)
        }
    }

    /// `NOOP`, used between `RCPT`s to cheaply detect mid-session
    /// disconnects. Acceptable replies: 250, 500, 502, 503, 220, or a
    /// reply whose text starts with the literal token `SMTP` (defensive
    /// against non-conforming servers that answer with unframed text).
    /// Failure here is non-fatal: the caller just checks
    /// [`Session::is_connected`] and proceeds.
    pub fn noop(&mut self) {
        if self.dead {
            return;
        }
        if self.transport.set_deadline(self.timeouts.noop()).is_err() {
            return;
        }
        match self.send_and_read("NOOP") {
            Ok(reply) => {
                let accepted = matches!(reply.code, 250 | 500 | 502 | 503 | 220)
                    || reply.raw.trim_start().starts_with("SMTP");
                if !accepted {
                    self.log
                        .record(format!("NOOP unexpected: {} {}", reply.code, reply.raw.trim_end()));
                }
            }
            Err(err) => {
                self.log.record(format!("NOOP failed: {err}"));
                self.dead = true;
            }
        }
    }

    /// `RSET`. Expected `{250, 220, 502, 554}`. Clears `mail_done` and
    /// `rcpt_done`, preserves `helo_done`.
    pub fn rset(&mut self) -> Result<(), SessionError> {
        self.transport.set_deadline(self.timeouts.rset())?;
        let reply = self.send_and_read("RSET")?;
        if !matches!(reply.code, 250 | 220 | 502 | 554) {
            self.log
                .record(format!("RSET unexpected: {} {}", reply.code, reply.raw.trim_end()));
        }
        self.state.mail_done = false;
        self.state.rcpt_done = false;
        Ok(())
    }

    /// `QUIT`, only sent if `helo_done`. Expected `{250, 221}`, errors
    /// swallowed.
    pub fn quit(&mut self) {
        if !self.state.helo_done || self.dead {
            return;
        }
        self.transport.set_deadline(self.timeouts.quit()).ok();
        let _ = self.send_and_read("QUIT");
        self.transport.close();
    }

    fn send_and_read(&mut self, command: &str) -> Result<Reply, SessionError> {
        self.transport.send(command)?;
        self.read_guarded(command)
    }

    /// Reads one reply and enforces that a 421 is always treated as
    /// unexpected/fatal regardless of what the caller expected (§4.4).
    fn read_guarded(&mut self, command: &str) -> Result<Reply, SessionError> {
        let reply = self.transport.read_reply(command)?;
        if classify(reply.code) == ReplyCategory::ServiceUnavailable {
            self.dead = true;
            self.log.record(format!(
                "421 service unavailable on {command}: {}",
                reply.raw.trim_end()
            ));
            return Err(SessionError::new(
                SessionErrorKind::UnexpectedResponse,
                format!("{command} got 421 {}", reply.raw.trim_end()),
            ));
        }
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::smtp_probe::diagnostics::DiagnosticsLog;
    use std::io::{BufRead, BufReader, Write};
    use std::net::TcpListener;
    use std::thread;
    use std::time::Duration;

    fn spawn_scripted_server(script: Vec<(&'static str, &'static str)>) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        thread::spawn(move || {
            if let Ok((mut stream, _)) = listener.accept() {
                let mut reader = BufReader::new(stream.try_clone().unwrap());
                for (expected, response) in script {
                    if !expected.is_empty() {
                        let mut line = String::new();
                        if reader.read_line(&mut line).unwrap_or(0) == 0 {
                            break;
                        }
                        assert!(line.starts_with(expected), "got: {line}");
                    }
                    stream.write_all(response.as_bytes()).unwrap();
                    stream.flush().unwrap();
                }
            }
        });
        port
    }

    fn test_timeouts() -> Timeouts {
        Timeouts {
            connected_ms: 2000,
            ehlo_ms: 2000,
            mail_ms: 2000,
            rcpt_ms: 2000,
            rset_ms: 2000,
            quit_ms: 2000,
            noop_ms: 2000,
        }
    }

    #[test]
    fn full_accept_flow() {
        let port = spawn_scripted_server(vec![
            ("", "220 mx.example.com ready\r\n"),
            ("EHLO", "250 mx.example.com\r\n"),
            ("MAIL FROM", "250 ok\r\n"),
            ("RCPT TO", "250 ok\r\n"),
            ("QUIT", "221 bye\r\n"),
        ]);
        let timeouts = test_timeouts();
        let mut log = DiagnosticsLog::new(false);
        let transport = Transport::connect("127.0.0.1", port, Duration::from_secs(2)).unwrap();
        let mut session = Session::new(transport, &timeouts, &mut log);
        session.read_banner().unwrap();
        session.ehlo("localhost").unwrap();
        assert!(session.mail_from("user@localhost").unwrap());
        let reply = session.rcpt_to("a", "example.com", false).unwrap();
        assert!(reply.is_some());
        session.quit();
    }

    #[test]
    fn rcpt_before_mail_is_guard_violation() {
        let port = spawn_scripted_server(vec![("", "220 ready\r\n"), ("EHLO", "250 ok\r\n")]);
        let timeouts = test_timeouts();
        let mut log = DiagnosticsLog::new(false);
        let transport = Transport::connect("127.0.0.1", port, Duration::from_secs(2)).unwrap();
        let mut session = Session::new(transport, &timeouts, &mut log);
        session.read_banner().unwrap();
        session.ehlo("localhost").unwrap();
        let err = session.rcpt_to("a", "example.com", false).unwrap_err();
        assert_eq!(err.kind, SessionErrorKind::StateGuardViolated);
    }

    #[test]
    fn multiline_banner_then_single_ehlo() {
        let port = spawn_scripted_server(vec![
            ("", "220-greeting\r\n220 ready\r\n"),
            ("EHLO", "250 ok\r\n"),
        ]);
        let timeouts = test_timeouts();
        let mut log = DiagnosticsLog::new(false);
        let transport = Transport::connect("127.0.0.1", port, Duration::from_secs(2)).unwrap();
        let mut session = Session::new(transport, &timeouts, &mut log);
        let banner = session.read_banner().unwrap();
        assert_eq!(banner.code, 220);
        session.ehlo("localhost").unwrap();
        assert!(session.state().helo_done);
    }

    #[test]
    fn service_unavailable_aborts_session() {
        let port = spawn_scripted_server(vec![("", "220 ready\r\n"), ("EHLO", "421 busy\r\n")]);
        let timeouts = test_timeouts();
        let mut log = DiagnosticsLog::new(false);
        let transport = Transport::connect("127.0.0.1", port, Duration::from_secs(2)).unwrap();
        let mut session = Session::new(transport, &timeouts, &mut log);
        session.read_banner().unwrap();
        let err = session.ehlo("localhost").unwrap_err();
        assert_eq!(err.kind, SessionErrorKind::UnexpectedResponse);
        assert!(!session.is_connected());
    }

    #[test]
    fn rset_clears_mail_and_rcpt_but_not_helo() {
        let port = spawn_scripted_server(vec![
            ("", "220 ready\r\n"),
            ("EHLO", "250 ok\r\n"),
            ("MAIL FROM", "250 ok\r\n"),
            ("RCPT TO", "250 ok\r\n"),
            ("RSET", "250 ok\r\n"),
        ]);
        let timeouts = test_timeouts();
        let mut log = DiagnosticsLog::new(false);
        let transport = Transport::connect("127.0.0.1", port, Duration::from_secs(2)).unwrap();
        let mut session = Session::new(transport, &timeouts, &mut log);
        session.read_banner().unwrap();
        session.ehlo("localhost").unwrap();
        session.mail_from("user@localhost").unwrap();
        session.rcpt_to("a", "example.com", false).unwrap();
        session.rset().unwrap();
        let state = session.state();
        assert!(state.helo_done);
        assert!(!state.mail_done);
        assert!(!state.rcpt_done);
    }
}
