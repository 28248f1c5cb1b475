use std::borrow::Cow;
use std::time::Duration;

#[cfg(feature = "with-serde")]
use serde::{Deserialize, Serialize};

/// The seven named per-command timeouts (§4.4, §5). Each is applied as a
/// read deadline before its command is sent.
#[cfg_attr(feature = "with-serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timeouts {
    pub connected_ms: u64,
    pub ehlo_ms: u64,
    pub mail_ms: u64,
    pub rcpt_ms: u64,
    pub rset_ms: u64,
    pub quit_ms: u64,
    pub noop_ms: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            connected_ms: 10_000,
            ehlo_ms: 120_000,
            mail_ms: 300_000,
            rcpt_ms: 300_000,
            rset_ms: 30_000,
            quit_ms: 60_000,
            noop_ms: 30_000,
        }
    }
}

impl Timeouts {
    pub fn connected(&self) -> Duration {
        Duration::from_millis(self.connected_ms)
    }
    pub fn ehlo(&self) -> Duration {
        Duration::from_millis(self.ehlo_ms)
    }
    pub fn mail(&self) -> Duration {
        Duration::from_millis(self.mail_ms)
    }
    pub fn rcpt(&self) -> Duration {
        Duration::from_millis(self.rcpt_ms)
    }
    pub fn rset(&self) -> Duration {
        Duration::from_millis(self.rset_ms)
    }
    pub fn quit(&self) -> Duration {
        Duration::from_millis(self.quit_ms)
    }
    pub fn noop(&self) -> Duration {
        Duration::from_millis(self.noop_ms)
    }
}

/// Policy flags controlling how inconclusive outcomes are coerced (§4.9,
/// §6).
#[cfg_attr(feature = "with-serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PolicyFlags {
    /// Whether to probe a randomly-named mailbox to detect catch-all
    /// domains (§4.5).
    pub catchall_test: bool,
    /// If the domain is catch-all, whether addresses on it should still be
    /// considered valid.
    pub catchall_is_valid: bool,
    /// Verdict to assign addresses when a communication failure (timeout,
    /// unexpected reply, disconnect) stops the session.
    pub no_comm_is_valid: bool,
    /// Verdict to assign addresses when the transport itself could not
    /// connect.
    pub no_conn_is_valid: bool,
    /// Whether 450/451/452 on `RCPT TO` should be treated as accepted.
    pub greylisted_considered_valid: bool,
    /// Mirror diagnostics log entries to stdout as they're recorded.
    pub debug: bool,
}

impl Default for PolicyFlags {
    fn default() -> Self {
        Self {
            catchall_test: true,
            catchall_is_valid: false,
            no_comm_is_valid: false,
            no_conn_is_valid: false,
            greylisted_considered_valid: false,
            debug: false,
        }
    }
}

/// The Configuration Facet (§2, §6): typed options for a verification run.
#[cfg_attr(feature = "with-serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeOptions {
    /// `local@domain` identifying `MAIL FROM` and the `EHLO` hostname
    /// (domain part). Defaults to `user@localhost` (§6).
    pub sender: String,
    pub port: u16,
    pub timeouts: Timeouts,
    pub policy: PolicyFlags,
    /// Domains probed on every MX in the list rather than a single random
    /// one (§4.6), seeded with `qq.com`.
    pub probe_all_mx_domains: Vec<String>,
}

impl Default for ProbeOptions {
    fn default() -> Self {
        Self {
            sender: "user@localhost".to_string(),
            port: 25,
            timeouts: Timeouts::default(),
            policy: PolicyFlags::default(),
            probe_all_mx_domains: vec!["qq.com".to_string()],
        }
    }
}

impl ProbeOptions {
    pub fn sender_local(&self) -> &str {
        self.sender.split('@').next().unwrap_or("user")
    }

    pub fn sender_domain(&self) -> Cow<'_, str> {
        match self.sender.split_once('@') {
            Some((_, domain)) if !domain.is_empty() => Cow::Borrowed(domain),
            _ => Cow::Borrowed("localhost"),
        }
    }

    pub fn probes_all_mx(&self, domain_key: &str) -> bool {
        self.probe_all_mx_domains
            .iter()
            .any(|d| d.eq_ignore_ascii_case(domain_key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let t = Timeouts::default();
        assert_eq!(t.connected_ms, 10_000);
        assert_eq!(t.ehlo_ms, 120_000);
        assert_eq!(t.mail_ms, 300_000);
        assert_eq!(t.rcpt_ms, 300_000);
        assert_eq!(t.rset_ms, 30_000);
        assert_eq!(t.quit_ms, 60_000);
    }

    #[test]
    fn qq_com_seeded_for_probe_all() {
        let opts = ProbeOptions::default();
        assert!(opts.probes_all_mx("qq.com"));
        assert!(opts.probes_all_mx("QQ.COM"));
        assert!(!opts.probes_all_mx("example.com"));
    }

    #[test]
    fn sender_domain_falls_back_to_localhost() {
        let mut opts = ProbeOptions::default();
        opts.sender = "user@localhost".to_string();
        assert_eq!(opts.sender_domain(), "localhost");
    }
}
