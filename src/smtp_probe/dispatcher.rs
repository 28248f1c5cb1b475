use std::collections::HashMap;

use rand::Rng;

use super::address::DomainBatch;
use super::aggregator::{RunResults, Verdict};
use super::catchall::{CatchAllOutcome, probe_catchall};
use super::diagnostics::DiagnosticsLog;
use super::error::{SessionError, SessionErrorKind};
use super::options::ProbeOptions;
use super::session::Session;
use super::transcript::classify_transcript;
use super::transport::Transport;

/// Ordered MX hostnames for one domain, supplied by the caller (§3
/// `MXList`). Priority-aware ordering is the caller's responsibility; the
/// dispatcher itself only imposes a lexicographic ascending sort (§4.6
/// step 1, mirroring the source's `asort`).
#[derive(Debug, Clone, Default)]
pub struct MxList(Vec<String>);

impl MxList {
    pub fn new(hosts: impl IntoIterator<Item = String>) -> Self {
        Self(hosts.into_iter().collect())
    }

    fn sorted(&self) -> Vec<String> {
        let mut hosts = self.0.clone();
        hosts.sort();
        hosts
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Result of driving one MX through EHLO/MAIL FROM/RCPT* for whichever
/// addresses were still unanswered going in.
struct AttemptOutcome {
    verdicts: Vec<(String, Verdict)>,
    catchall: Option<CatchAllOutcome>,
    /// `None` means every requested address got a definite verdict and the
    /// dispatcher should stop trying further MXes for this domain.
    failure: Option<SessionError>,
}

/// Runs the verification batch against caller-supplied MX lists (§4.6).
///
/// `mxs` maps each domain key (lowercase) present in `batch` to its
/// `MxList`; a domain with no entry (or an empty one) is bulk-attributed to
/// `no_conn_is_valid` without attempting a connection. `unix_ts` seeds the
/// catch-all probe's synthetic local-part and is supplied by the caller
/// rather than read from the clock here (§9's "pure function" treatment of
/// catch-all probing extends to the dispatcher).
pub fn dispatch<R: Rng>(
    batch: &DomainBatch,
    mxs: &HashMap<String, MxList>,
    options: &ProbeOptions,
    rng: &mut R,
    unix_ts: u64,
    log: &mut DiagnosticsLog,
) -> RunResults {
    let mut results = RunResults::new();

    for (domain_key, users) in batch.domains() {
        let mut remaining: Vec<String> = users.iter().map(str::to_string).collect();
        if remaining.is_empty() {
            continue;
        }

        for local in &remaining {
            let original = batch
                .original_for(domain_key, local)
                .unwrap_or(local)
                .to_string();
            results.domain_info_mut(domain_key).users.push(original);
        }

        let mx_list = mxs.get(domain_key);
        let selected = select_mxes(mx_list, domain_key, options, rng);
        if selected.is_empty() {
            bulk_fail_remaining(
                &mut results,
                batch,
                domain_key,
                &remaining,
                SessionError::no_connection(
                    domain_key,
                    &std::io::Error::new(std::io::ErrorKind::NotFound, "no MX supplied"),
                ),
            );
            continue;
        }

        let mut last_failure: Option<SessionError> = None;
        let mut domain_catchall: Option<CatchAllOutcome> = None;
        let probe_all = options.probes_all_mx(domain_key);
        let total_mx = selected.len();

        for (mx_idx, mx_host) in selected.iter().enumerate() {
            if remaining.is_empty() {
                break;
            }
            results
                .domain_info_mut(domain_key)
                .mxs
                .push(mx_host.clone());

            let outcome = attempt_mx(
                mx_host,
                domain_key,
                &remaining,
                options,
                unix_ts,
                log,
            );

            let is_last_mx = mx_idx + 1 == total_mx;
            for (local, verdict) in outcome.verdicts {
                // A plain reject on a probe-all domain doesn't settle the
                // address yet: the same mailbox may exist on a different MX
                // (§4.6 step 2), so it stays in `remaining` for the next
                // selected MX unless this was the last one to try.
                let retry = matches!(verdict, Verdict::Rejected) && probe_all && !is_last_mx;
                if retry {
                    continue;
                }
                let original = batch
                    .original_for(domain_key, &local)
                    .unwrap_or(&local)
                    .to_string();
                results.record(original, verdict);
                remaining.retain(|u| u != &local);
            }
            if let Some(outcome_catchall) = outcome.catchall {
                domain_catchall = Some(outcome_catchall);
            }

            match outcome.failure {
                None => {
                    last_failure = None;
                }
                Some(err) => {
                    log.record(format!("MX {mx_host} attempt failed: {err}"));
                    last_failure = Some(err);
                }
            }
            if remaining.is_empty() {
                break;
            }
        }

        if let Some(outcome) = domain_catchall {
            results.domain_info_mut(domain_key).catchall = Some(outcome);
            if outcome == CatchAllOutcome::CatchAll && !options.policy.catchall_is_valid {
                results.propagate_catchall(domain_key);
            }
        }

        if !remaining.is_empty() {
            let err = last_failure.unwrap_or_else(|| {
                SessionError::new(
                    SessionErrorKind::NoConnection,
                    format!("all MXes exhausted for {domain_key}"),
                )
            });
            bulk_fail_remaining(&mut results, batch, domain_key, &remaining, err);
        }
    }

    results
}

fn select_mxes<R: Rng>(
    mx_list: Option<&MxList>,
    domain_key: &str,
    options: &ProbeOptions,
    rng: &mut R,
) -> Vec<String> {
    let Some(mx_list) = mx_list else {
        return Vec::new();
    };
    if mx_list.is_empty() {
        return Vec::new();
    }
    let sorted = mx_list.sorted();
    if options.probes_all_mx(domain_key) {
        sorted
    } else {
        let idx = rng.gen_range(0..sorted.len());
        vec![sorted[idx].clone()]
    }
}

fn attempt_mx(
    mx_host: &str,
    domain_key: &str,
    remaining: &[String],
    options: &ProbeOptions,
    unix_ts: u64,
    log: &mut DiagnosticsLog,
) -> AttemptOutcome {
    let mut verdicts = Vec::new();

    let transport = match Transport::connect(mx_host, options.port, options.timeouts.connected()) {
        Ok(t) => t,
        Err(err) => {
            return AttemptOutcome {
                verdicts,
                catchall: None,
                failure: Some(err),
            };
        }
    };
    let mut session = Session::new(transport, &options.timeouts, log);

    if let Err(err) = session.read_banner() {
        return AttemptOutcome {
            verdicts,
            catchall: None,
            failure: Some(err),
        };
    }
    if let Err(err) = session.ehlo(&options.sender_domain()) {
        return AttemptOutcome {
            verdicts,
            catchall: None,
            failure: Some(err),
        };
    }
    match session.mail_from(options.sender_local()) {
        Ok(true) => {}
        Ok(false) => {
            return AttemptOutcome {
                verdicts,
                catchall: None,
                failure: Some(SessionError::new(
                    SessionErrorKind::UnexpectedResponse,
                    "MAIL FROM rejected",
                )),
            };
        }
        Err(err) => {
            return AttemptOutcome {
                verdicts,
                catchall: None,
                failure: Some(err),
            };
        }
    }

    for (i, local) in remaining.iter().enumerate() {
        if i > 0 {
            session.noop();
            if !session.is_connected() {
                return AttemptOutcome {
                    verdicts,
                    catchall: None,
                    failure: Some(SessionError::new(
                        SessionErrorKind::NoResponse,
                        "connection dropped mid-session",
                    )),
                };
            }
        }
        match session.rcpt_to(local, domain_key, options.policy.greylisted_considered_valid) {
            Ok(Some(raw)) => {
                let verdict = if is_greylist_reply(&raw) {
                    Verdict::Greylisted(raw)
                } else {
                    Verdict::Accepted(raw)
                };
                verdicts.push((local.clone(), verdict));
            }
            Ok(None) => verdicts.push((local.clone(), Verdict::Rejected)),
            Err(err) => {
                return AttemptOutcome {
                    verdicts,
                    catchall: None,
                    failure: Some(err),
                };
            }
        }
    }

    let catchall = if options.policy.catchall_test {
        session.rset().ok();
        let outcome = probe_catchall(
            &mut session,
            domain_key,
            unix_ts,
            options.policy.greylisted_considered_valid,
        );
        Some(outcome)
    } else {
        None
    };

    session.rset().ok();
    session.quit();

    AttemptOutcome {
        verdicts,
        catchall,
        failure: None,
    }
}

fn bulk_fail_remaining(
    results: &mut RunResults,
    batch: &DomainBatch,
    domain_key: &str,
    remaining: &[String],
    err: SessionError,
) {
    results.set_mail_error(err.detail.clone());
    let fallback = err.fallback_policy();
    for local in remaining {
        let original = batch
            .original_for(domain_key, local)
            .unwrap_or(local)
            .to_string();
        results.record(
            original,
            Verdict::Inconclusive {
                reason: err.detail.clone(),
                fallback,
            },
        );
    }
}

/// 450/451/452 reply codes carry their status in the first three bytes of
/// the raw text; used to tag an accepted-for-greylist verdict distinctly
/// from a plain accept once `greylisted_considered_valid` has already
/// folded both into "accepted" at the session layer.
fn is_greylist_reply(raw: &str) -> bool {
    raw.len() >= 3 && matches!(&raw[..3], "450" | "451" | "452")
}

/// Runs the "cURL-mode" proxied variant (§4.7): rather than driving the
/// session directly, each domain's already-captured transcript lines are
/// classified by [`classify_transcript`] and folded into the same
/// [`RunResults`] shape the direct dispatcher produces.
pub fn dispatch_via_transcript(
    batch: &DomainBatch,
    transcripts: &HashMap<String, Vec<String>>,
) -> RunResults {
    let mut results = RunResults::new();

    for (domain_key, users) in batch.domains() {
        let remaining: Vec<String> = users.iter().map(str::to_string).collect();
        if remaining.is_empty() {
            continue;
        }
        for local in &remaining {
            let original = batch
                .original_for(domain_key, local)
                .unwrap_or(local)
                .to_string();
            results.domain_info_mut(domain_key).users.push(original);
        }

        let Some(lines) = transcripts.get(domain_key) else {
            bulk_fail_remaining(
                &mut results,
                batch,
                domain_key,
                &remaining,
                SessionError::new(
                    SessionErrorKind::NoResponse,
                    "no transcript captured for domain",
                ),
            );
            continue;
        };

        let outcome = classify_transcript(lines, &remaining);
        let mut answered = Vec::new();
        for (local, verdict) in outcome.verdicts {
            let original = batch
                .original_for(domain_key, &local)
                .unwrap_or(&local)
                .to_string();
            results.record(original, verdict);
            answered.push(local);
        }

        let still_remaining: Vec<String> = remaining
            .into_iter()
            .filter(|u| !answered.contains(u))
            .collect();
        if let Some(reason) = outcome.failure {
            if !still_remaining.is_empty() {
                bulk_fail_remaining(
                    &mut results,
                    batch,
                    domain_key,
                    &still_remaining,
                    SessionError::new(SessionErrorKind::UnexpectedResponse, reason),
                );
            }
        } else if !still_remaining.is_empty() {
            bulk_fail_remaining(
                &mut results,
                batch,
                domain_key,
                &still_remaining,
                SessionError::new(
                    SessionErrorKind::NoResponse,
                    "transcript ended before every recipient was answered",
                ),
            );
        }
    }

    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::mock::StepRng;
    use std::io::{BufRead, BufReader, Write};
    use std::net::TcpListener;
    use std::thread;

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

    fn options_for(port: u16) -> ProbeOptions {
        let mut opts = ProbeOptions::default();
        opts.port = port;
        opts.policy.catchall_test = false;
        opts
    }

    #[test]
    fn single_mx_accept_flow_populates_results() {
        let port = spawn_scripted_server(vec![
            ("", "220 ready\r\n"),
            ("EHLO", "250 ok\r\n"),
            ("MAIL FROM", "250 ok\r\n"),
            ("RCPT TO", "250 ok\r\n"),
            ("RSET", "250 ok\r\n"),
            ("QUIT", "221 bye\r\n"),
        ]);
        let mut batch = DomainBatch::new();
        batch.insert("a@example.com").unwrap();
        let mut mxs = HashMap::new();
        mxs.insert("example.com".to_string(), MxList::new(vec!["127.0.0.1".to_string()]));
        let options = options_for(port);
        let mut rng = StepRng::new(0, 1);
        let mut log = DiagnosticsLog::new(false);
        let results = dispatch(&batch, &mxs, &options, &mut rng, 1_700_000_000, &mut log);
        assert!(matches!(
            results.verdict_for("a@example.com"),
            Some(Verdict::Accepted(_))
        ));
    }

    #[test]
    fn missing_mx_list_bulk_fails_as_no_connection() {
        let mut batch = DomainBatch::new();
        batch.insert("a@example.com").unwrap();
        let mxs = HashMap::new();
        let options = ProbeOptions::default();
        let mut rng = StepRng::new(0, 1);
        let mut log = DiagnosticsLog::new(false);
        let results = dispatch(&batch, &mxs, &options, &mut rng, 1_700_000_000, &mut log);
        match results.verdict_for("a@example.com") {
            Some(Verdict::Inconclusive { fallback, .. }) => {
                assert_eq!(*fallback, crate::smtp_probe::error::FallbackPolicy::NoConn);
            }
            other => panic!("expected inconclusive/no-conn verdict, got {other:?}"),
        }
    }

    #[test]
    fn transcript_mode_accepts_and_rejects_positionally() {
        let mut batch = DomainBatch::new();
        batch.insert("a@example.com").unwrap();
        batch.insert("b@example.com").unwrap();
        let mut transcripts = HashMap::new();
        transcripts.insert(
            "example.com".to_string(),
            vec![
                "> EHLO localhost".to_string(),
                "< 250 ok".to_string(),
                "> MAIL FROM:<user@localhost>".to_string(),
                "< 250 ok".to_string(),
                "> RCPT TO:<a@example.com>".to_string(),
                "< 250 ok".to_string(),
                "> RCPT TO:<b@example.com>".to_string(),
                "< 550 no such user".to_string(),
            ],
        );
        let results = dispatch_via_transcript(&batch, &transcripts);
        assert!(matches!(
            results.verdict_for("a@example.com"),
            Some(Verdict::Accepted(_))
        ));
        assert_eq!(results.verdict_for("b@example.com"), Some(&Verdict::Rejected));
    }

    #[test]
    fn rejected_rcpt_produces_rejected_verdict() {
        let port = spawn_scripted_server(vec![
            ("", "220 ready\r\n"),
            ("EHLO", "250 ok\r\n"),
            ("MAIL FROM", "250 ok\r\n"),
            ("RCPT TO", "550 no such user\r\n"),
            ("RSET", "250 ok\r\n"),
            ("QUIT", "221 bye\r\n"),
        ]);
        let mut batch = DomainBatch::new();
        batch.insert("a@example.com").unwrap();
        let mut mxs = HashMap::new();
        mxs.insert("example.com".to_string(), MxList::new(vec!["127.0.0.1".to_string()]));
        let options = options_for(port);
        let mut rng = StepRng::new(0, 1);
        let mut log = DiagnosticsLog::new(false);
        let results = dispatch(&batch, &mxs, &options, &mut rng, 1_700_000_000, &mut log);
        assert_eq!(results.verdict_for("a@example.com"), Some(&Verdict::Rejected));
    }
}
