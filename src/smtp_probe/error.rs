use thiserror::Error;

/// Closed taxonomy of failures the session state machine can raise (§7 of
/// the design notes this module implements).
///
/// Modeled as a single `SessionError { kind, detail }` rather than one
/// exception type per failure the way a typical source port would do it:
/// the dispatcher only ever needs to match on `kind` to pick a bulk-verdict
/// policy, so per-kind repetition buys nothing here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionErrorKind {
    /// TCP connect refused or unreachable.
    NoConnection,
    /// A read deadline elapsed.
    Timeout,
    /// EOF on a read that was expected to produce a reply line.
    NoResponse,
    /// Reply code was not in the command's expected set, or was 421.
    UnexpectedResponse,
    /// Write to the socket failed.
    SendFailed,
    /// `MAIL FROM`/`RCPT TO`/`QUIT` attempted before the state machine allowed it.
    StateGuardViolated,
    /// Address failed to parse into local-part/domain.
    MalformedAddress,
}

#[derive(Debug, Error, Clone)]
#[error("{kind:?}: {detail}")]
pub struct SessionError {
    pub kind: SessionErrorKind,
    pub detail: String,
}

impl SessionError {
    pub fn new(kind: SessionErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    pub fn no_connection(host: &str, source: &std::io::Error) -> Self {
        Self::new(
            SessionErrorKind::NoConnection,
            format!("connect to {host} failed: {source}"),
        )
    }

    pub fn timeout(command: &str) -> Self {
        Self::new(SessionErrorKind::Timeout, format!("{command} timed out"))
    }

    pub fn no_response(command: &str) -> Self {
        Self::new(
            SessionErrorKind::NoResponse,
            format!("connection closed while awaiting reply to {command}"),
        )
    }

    pub fn unexpected_response(command: &str, code: u16, text: &str) -> Self {
        Self::new(
            SessionErrorKind::UnexpectedResponse,
            format!("{command} got unexpected {code} {text}"),
        )
    }

    pub fn send_failed(host: &str, source: &std::io::Error) -> Self {
        Self::new(
            SessionErrorKind::SendFailed,
            format!("write to {host} failed: {source}"),
        )
    }

    pub fn state_guard(message: &str) -> Self {
        Self::new(SessionErrorKind::StateGuardViolated, message.to_string())
    }

    pub fn malformed_address(raw: &str) -> Self {
        Self::new(
            SessionErrorKind::MalformedAddress,
            format!("'{raw}' is not a valid local@domain address"),
        )
    }

    /// Which bulk-verdict policy (§7's "Policy" column) a dispatcher should
    /// apply once this failure reaches it.
    pub fn fallback_policy(&self) -> FallbackPolicy {
        match self.kind {
            SessionErrorKind::NoConnection => FallbackPolicy::NoConn,
            _ => FallbackPolicy::NoComm,
        }
    }
}

/// Which configured flag (`no_comm_is_valid` or `no_conn_is_valid`) a
/// dispatcher-level failure should be attributed through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackPolicy {
    NoComm,
    NoConn,
}
