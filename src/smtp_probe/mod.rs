//! SMTP deliverability probing engine (`with-smtp-probe` feature).
//!
//! Drives an RFC 5321 `RCPT TO` dialogue against caller-supplied MX hosts
//! for each recipient, up to but not including `DATA`, and classifies each
//! address as accepted, rejected, greylisted, catch-all, or indeterminate.
//! MX lookup and DNS resolution are out of scope here; see [`crate::mx`]
//! for a caller-side helper that builds an [`MxList`] per domain.

mod address;
mod aggregator;
mod catchall;
mod classify;
mod diagnostics;
mod dispatcher;
mod error;
mod options;
mod session;
mod transcript;
mod transport;
mod wire;

pub use address::{Address, DomainBatch, DomainUsers};
pub use aggregator::{DomainInfo, RunResults, Verdict};
pub use catchall::{CatchAllOutcome, catchall_probe_address};
pub use classify::{ReplyCategory, classify};
pub use diagnostics::DiagnosticsLog;
pub use dispatcher::{MxList, dispatch, dispatch_via_transcript};
pub use error::{FallbackPolicy, SessionError, SessionErrorKind};
pub use options::{PolicyFlags, ProbeOptions, Timeouts};
pub use session::{Session, SessionState};
pub use transcript::{TranscriptOutcome, classify_transcript};
pub use transport::{ProxyConfig, Transport};
pub use wire::Reply;

use std::collections::HashMap;

/// Convenience facade over [`dispatch`] for programmatic callers (§6):
/// parses `emails` into a [`DomainBatch`], runs the dispatcher against
/// `mxs` with the process's thread-local RNG, and returns the populated
/// [`RunResults`] together with the run's [`DiagnosticsLog`] and any inputs
/// that failed to parse as `local@domain`.
///
/// `unix_ts` seeds the catch-all probe's synthetic local-part; callers
/// supply the current time so this function itself never reads the clock.
pub fn verify(
    emails: &[String],
    mxs: &HashMap<String, MxList>,
    options: &ProbeOptions,
    unix_ts: u64,
) -> (RunResults, DiagnosticsLog, Vec<String>) {
    let mut batch = DomainBatch::new();
    let mut malformed = Vec::new();
    for email in emails {
        if let Err(err) = batch.insert(email) {
            malformed.push(err.to_string());
        }
    }
    let mut log = DiagnosticsLog::new(options.policy.debug);
    let mut rng = rand::thread_rng();
    let results = dispatch(&batch, mxs, options, &mut rng, unix_ts, &mut log);
    (results, log, malformed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_addresses_are_reported_without_aborting_the_batch() {
        let emails = vec!["noatsign".to_string(), "a@example.com".to_string()];
        let mxs = HashMap::new();
        let options = ProbeOptions::default();
        let (results, _log, malformed) = verify(&emails, &mxs, &options, 1_700_000_000);
        assert_eq!(malformed.len(), 1);
        assert!(results.verdict_for("a@example.com").is_some());
    }
}
