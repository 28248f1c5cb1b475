use std::collections::BTreeMap;

use super::catchall::CatchAllOutcome;
use super::error::FallbackPolicy;
use super::options::PolicyFlags;

/// Per-address outcome before policy coercion (§3 `Verdict`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// `RCPT TO` accepted; carries the server's raw reply text.
    Accepted(String),
    /// `RCPT TO` rejected outright (permanent or non-greylist transient
    /// failure).
    Rejected,
    /// `RCPT TO` answered with a 450/451/452; carries the raw reply text.
    /// Whether this counts as accepted depends on `greylisted_considered_valid`.
    Greylisted(String),
    /// The address's domain was detected catch-all (§4.5); whether this
    /// counts as accepted depends on `catchall_is_valid`.
    CatchAll,
    /// No definite answer was reached (timeout, disconnect, connect
    /// failure). `fallback` records which policy flag resolves it;
    /// `reason` is the diagnostic text surfaced as `mailError`.
    Inconclusive {
        reason: String,
        fallback: FallbackPolicy,
    },
}

impl Verdict {
    /// Coerces to a final accepted/not-accepted boolean per the run's
    /// policy flags (§4.9's merge rules).
    pub fn is_accepted(&self, policy: &PolicyFlags) -> bool {
        match self {
            Verdict::Accepted(_) => true,
            Verdict::Rejected => false,
            Verdict::Greylisted(_) => policy.greylisted_considered_valid,
            Verdict::CatchAll => policy.catchall_is_valid,
            Verdict::Inconclusive { fallback, .. } => match fallback {
                FallbackPolicy::NoComm => policy.no_comm_is_valid,
                FallbackPolicy::NoConn => policy.no_conn_is_valid,
            },
        }
    }

    /// The server's raw accepted-reply text, when there is one — feeds
    /// `passRes` (§4.9, §6).
    pub fn raw_text(&self) -> Option<&str> {
        match self {
            Verdict::Accepted(raw) | Verdict::Greylisted(raw) => Some(raw),
            _ => None,
        }
    }
}

/// Per-domain info record: the users probed on it, the MX(es) actually
/// tried, and the outcome of its catch-all probe (§3 `RunResults`).
///
/// `catchall` is `None` when no probe ran at all (e.g. `catchall_test` was
/// disabled, or every MX failed before a probe could be attempted) and
/// `Some(CatchAllOutcome::Indeterminate)` when a probe ran but never got a
/// definite answer — collapsing those two into one `None` would hide the
/// latter from callers (§9).
#[derive(Debug, Clone, Default)]
pub struct DomainInfo {
    pub users: Vec<String>,
    pub mxs: Vec<String>,
    pub catchall: Option<CatchAllOutcome>,
}

/// The full output of a verification run (§3 `RunResults`, §6 outputs).
///
/// `verdicts` preserves input order (invariant 6, §8) rather than sorting,
/// so it is a `Vec` keyed by the original `user@domain` string with exact
/// input casing, not a `BTreeMap` — mirroring [`super::address::DomainUsers`]'s
/// own ordered-set approach.
#[derive(Debug, Clone, Default)]
pub struct RunResults {
    verdicts: Vec<(String, Verdict)>,
    domains: BTreeMap<String, DomainInfo>,
    mail_error: Option<String>,
}

impl RunResults {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, original_address: impl Into<String>, verdict: Verdict) {
        self.verdicts.push((original_address.into(), verdict));
    }

    pub fn verdict_for(&self, original_address: &str) -> Option<&Verdict> {
        self.verdicts
            .iter()
            .find(|(addr, _)| addr == original_address)
            .map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Verdict)> {
        self.verdicts.iter().map(|(a, v)| (a.as_str(), v))
    }

    pub fn domain_info(&self, domain_key: &str) -> Option<&DomainInfo> {
        self.domains.get(domain_key)
    }

    pub fn domain_info_mut(&mut self, domain_key: &str) -> &mut DomainInfo {
        self.domains.entry(domain_key.to_string()).or_default()
    }

    pub fn domains(&self) -> impl Iterator<Item = (&str, &DomainInfo)> {
        self.domains.iter().map(|(d, i)| (d.as_str(), i))
    }

    pub fn set_mail_error(&mut self, message: impl Into<String>) {
        self.mail_error = Some(message.into());
    }

    pub fn mail_error(&self) -> Option<&str> {
        self.mail_error.as_deref()
    }

    /// All accepted raw reply texts, in `RCPT` order, regardless of which
    /// address they belong to (§4.9 `passRes`).
    pub fn pass_res(&self) -> Vec<&str> {
        self.verdicts
            .iter()
            .filter_map(|(_, v)| v.raw_text())
            .collect()
    }

    /// Applies catch-all propagation (invariant 4, §8): every address
    /// already recorded on `domain_key` that isn't itself the catch-all
    /// probe gets coerced to `Verdict::CatchAll`.
    pub fn propagate_catchall(&mut self, domain_key: &str) {
        for (addr, verdict) in self.verdicts.iter_mut() {
            if addr
                .rsplit_once('@')
                .map(|(_, d)| d.eq_ignore_ascii_case(domain_key))
                .unwrap_or(false)
            {
                *verdict = Verdict::CatchAll;
            }
        }
        self.domain_info_mut(domain_key).catchall = Some(CatchAllOutcome::CatchAll);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flags(greylisted_ok: bool, catchall_ok: bool, no_comm_ok: bool, no_conn_ok: bool) -> PolicyFlags {
        PolicyFlags {
            catchall_test: true,
            catchall_is_valid: catchall_ok,
            no_comm_is_valid: no_comm_ok,
            no_conn_is_valid: no_conn_ok,
            greylisted_considered_valid: greylisted_ok,
            debug: false,
        }
    }

    #[test]
    fn accepted_is_always_accepted() {
        let v = Verdict::Accepted("250 ok\r\n".to_string());
        assert!(v.is_accepted(&flags(false, false, false, false)));
        assert_eq!(v.raw_text(), Some("250 ok\r\n"));
    }

    #[test]
    fn greylisted_follows_its_flag() {
        let v = Verdict::Greylisted("451 try later\r\n".to_string());
        assert!(v.is_accepted(&flags(true, false, false, false)));
        assert!(!v.is_accepted(&flags(false, false, false, false)));
    }

    #[test]
    fn inconclusive_follows_matching_fallback_flag() {
        let comm = Verdict::Inconclusive {
            reason: "timed out".to_string(),
            fallback: FallbackPolicy::NoComm,
        };
        assert!(comm.is_accepted(&flags(false, false, true, false)));
        assert!(!comm.is_accepted(&flags(false, false, false, true)));

        let conn = Verdict::Inconclusive {
            reason: "refused".to_string(),
            fallback: FallbackPolicy::NoConn,
        };
        assert!(conn.is_accepted(&flags(false, false, false, true)));
        assert!(!conn.is_accepted(&flags(false, false, true, false)));
    }

    #[test]
    fn catch_all_propagation_overwrites_prior_verdicts() {
        let mut results = RunResults::new();
        results.record("a@example.com", Verdict::Accepted("250 ok\r\n".to_string()));
        results.record("b@example.com", Verdict::Rejected);
        results.propagate_catchall("example.com");
        assert_eq!(results.verdict_for("a@example.com"), Some(&Verdict::CatchAll));
        assert_eq!(results.verdict_for("b@example.com"), Some(&Verdict::CatchAll));
        assert_eq!(
            results.domain_info("example.com").unwrap().catchall,
            Some(CatchAllOutcome::CatchAll)
        );
    }

    #[test]
    fn pass_res_collects_accepted_and_greylisted_raw_text_in_order() {
        let mut results = RunResults::new();
        results.record("a@example.com", Verdict::Accepted("250 ok\r\n".to_string()));
        results.record("b@example.com", Verdict::Rejected);
        results.record(
            "c@example.com",
            Verdict::Greylisted("451 try later\r\n".to_string()),
        );
        assert_eq!(results.pass_res(), vec!["250 ok\r\n", "451 try later\r\n"]);
    }

    #[test]
    fn verdicts_preserve_insertion_order() {
        let mut results = RunResults::new();
        results.record("b@example.com", Verdict::Rejected);
        results.record("a@example.com", Verdict::Accepted("250 ok\r\n".to_string()));
        let order: Vec<&str> = results.iter().map(|(a, _)| a).collect();
        assert_eq!(order, vec!["b@example.com", "a@example.com"]);
    }
}
