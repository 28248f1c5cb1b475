use super::error::SessionError;
use super::session::Session;

/// Outcome of probing a domain's catch-all behavior (§4.5).
///
/// Deliberately distinct from a plain `bool`: a probe that never got a
/// clean verdict (the session died before `RCPT TO` on the synthetic
/// address resolved) must surface as [`CatchAllOutcome::Indeterminate`]
/// rather than silently defaulting to "not catch-all" — collapsing that
/// case would make every address on an unreachable domain look uniquely
/// deliverable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatchAllOutcome {
    CatchAll,
    NotCatchAll,
    Indeterminate,
}

impl std::fmt::Display for CatchAllOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::CatchAll => "catch-all",
            Self::NotCatchAll => "not catch-all",
            Self::Indeterminate => "indeterminate",
        })
    }
}

/// Builds the synthetic probe address `catch-all-test-<unix_ts>@domain`
/// (§4.5). `unix_ts` is supplied by the caller rather than read from the
/// clock here, keeping this function pure and the dispatcher the single
/// place that touches wall-clock time.
pub fn catchall_probe_address(domain: &str, unix_ts: u64) -> String {
    format!("catch-all-test-{unix_ts}@{domain}")
}

/// Runs the catch-all probe on an already-authenticated session (`EHLO`
/// and `MAIL FROM` already accepted): issues `RCPT TO` for the synthetic
/// local part and folds the result into a [`CatchAllOutcome`].
///
/// The caller is responsible for `RSET`ting the session afterwards if it
/// intends to reuse it for further `RCPT TO` probes on the same domain.
pub fn probe_catchall(
    session: &mut Session<'_>,
    domain: &str,
    unix_ts: u64,
    greylisted_considered_valid: bool,
) -> CatchAllOutcome {
    let probe = catchall_probe_address(domain, unix_ts);
    let local = match probe.split_once('@') {
        Some((local, _)) => local,
        None => return CatchAllOutcome::Indeterminate,
    };
    match session.rcpt_to(local, domain, greylisted_considered_valid) {
        Ok(Some(_)) => CatchAllOutcome::CatchAll,
        Ok(None) => CatchAllOutcome::NotCatchAll,
        Err(err) => indeterminate_on_failure(&err),
    }
}

fn indeterminate_on_failure(_err: &SessionError) -> CatchAllOutcome {
    CatchAllOutcome::Indeterminate
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::smtp_probe::diagnostics::DiagnosticsLog;
    use crate::smtp_probe::options::Timeouts;
    use crate::smtp_probe::transport::Transport;
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

    fn ready_session<'a>(
        port: u16,
        timeouts: &'a Timeouts,
        log: &'a mut DiagnosticsLog,
    ) -> Session<'a> {
        let transport = Transport::connect("127.0.0.1", port, Duration::from_secs(2)).unwrap();
        let mut session = Session::new(transport, timeouts, log);
        session.read_banner().unwrap();
        session.ehlo("localhost").unwrap();
        session.mail_from("user@localhost").unwrap();
        session
    }

    #[test]
    fn probe_address_format() {
        assert_eq!(
            catchall_probe_address("example.com", 1_700_000_000),
            "catch-all-test-1700000000@example.com"
        );
    }

    #[test]
    fn accepted_rcpt_means_catch_all() {
        let port = spawn_scripted_server(vec![
            ("", "220 ready\r\n"),
            ("EHLO", "250 ok\r\n"),
            ("MAIL FROM", "250 ok\r\n"),
            ("RCPT TO", "250 ok\r\n"),
        ]);
        let timeouts = Timeouts::default();
        let mut log = DiagnosticsLog::new(false);
        let mut session = ready_session(port, &timeouts, &mut log);
        let outcome = probe_catchall(&mut session, "example.com", 1_700_000_000, false);
        assert_eq!(outcome, CatchAllOutcome::CatchAll);
    }

    #[test]
    fn rejected_rcpt_means_not_catch_all() {
        let port = spawn_scripted_server(vec![
            ("", "220 ready\r\n"),
            ("EHLO", "250 ok\r\n"),
            ("MAIL FROM", "250 ok\r\n"),
            ("RCPT TO", "550 no such user\r\n"),
        ]);
        let timeouts = Timeouts::default();
        let mut log = DiagnosticsLog::new(false);
        let mut session = ready_session(port, &timeouts, &mut log);
        let outcome = probe_catchall(&mut session, "example.com", 1_700_000_000, false);
        assert_eq!(outcome, CatchAllOutcome::NotCatchAll);
    }

    #[test]
    fn disconnect_during_probe_is_indeterminate_not_not_catch_all() {
        let port = spawn_scripted_server(vec![
            ("", "220 ready\r\n"),
            ("EHLO", "250 ok\r\n"),
            ("MAIL FROM", "250 ok\r\n"),
            ("RCPT TO", "421 shutting down\r\n"),
        ]);
        let timeouts = Timeouts::default();
        let mut log = DiagnosticsLog::new(false);
        let mut session = ready_session(port, &timeouts, &mut log);
        let outcome = probe_catchall(&mut session, "example.com", 1_700_000_000, false);
        assert_eq!(outcome, CatchAllOutcome::Indeterminate);
    }
}
