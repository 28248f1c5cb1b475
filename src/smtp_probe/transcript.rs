use std::sync::OnceLock;

use regex::Regex;

use super::aggregator::Verdict;

/// Outcome of scanning one "cURL-mode" transcript (§4.7): whatever
/// per-recipient verdicts were read off `> RCPT TO` / `< NNN` pairs before
/// a fatal pattern was matched, plus that pattern's description if one was.
#[derive(Debug, Clone, Default)]
pub struct TranscriptOutcome {
    pub verdicts: Vec<(String, Verdict)>,
    pub failure: Option<String>,
}

struct Patterns {
    too_many_connections: Regex,
    connection_reset: Regex,
    proxy_connect_failed: Regex,
    connection_timed_out: Regex,
    keep_alive: Regex,
    status_200: Regex,
    proxy_ok_connect: Regex,
    banner_220: Regex,
    ehlo_sent: Regex,
    reply_250: Regex,
    mail_from_sent: Regex,
    rcpt_to_sent: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        too_many_connections: Regex::new(r"(?i)too many connections").unwrap(),
        connection_reset: Regex::new(r"(?i)Connection reset by peer").unwrap(),
        proxy_connect_failed: Regex::new(r"(?i)connect to PROXY port (\d+) failed").unwrap(),
        connection_timed_out: Regex::new(r"(?i)Connection timed out").unwrap(),
        keep_alive: Regex::new(r"Proxy-Connection: Keep-Alive").unwrap(),
        status_200: Regex::new(r"(^|\s)200(\s|$)").unwrap(),
        proxy_ok_connect: Regex::new(r"Proxy replied OK to CONNECT").unwrap(),
        banner_220: Regex::new(r"^\s*<\s*220").unwrap(),
        ehlo_sent: Regex::new(r"^\s*>\s*EHLO").unwrap(),
        reply_250: Regex::new(r"^\s*<\s*250").unwrap(),
        mail_from_sent: Regex::new(r"^\s*>\s*MAIL FROM").unwrap(),
        rcpt_to_sent: Regex::new(r"^\s*>\s*RCPT TO").unwrap(),
    })
}

fn hard_failure(line: &str, p: &Patterns) -> Option<String> {
    if p.too_many_connections.is_match(line) {
        return Some("too many connections".to_string());
    }
    if p.connection_reset.is_match(line) {
        return Some("connection reset by peer".to_string());
    }
    if let Some(caps) = p.proxy_connect_failed.captures(line) {
        return Some(format!("connect to PROXY port {} failed", &caps[1]));
    }
    if p.connection_timed_out.is_match(line) {
        return Some("connection timed out".to_string());
    }
    None
}

fn next_non_empty(lines: &[String], from: usize) -> Option<&str> {
    lines[from..]
        .iter()
        .map(String::as_str)
        .find(|l| !l.trim().is_empty())
}

/// Classifies a captured transcript (§4.7). `remaining` is the ordered list
/// of local-parts expected to appear as successive `> RCPT TO` lines;
/// verdicts are correlated positionally since the transcript carries no
/// structured recipient identity, only command/reply text.
pub fn classify_transcript(lines: &[String], remaining: &[String]) -> TranscriptOutcome {
    let p = patterns();

    for line in lines {
        if let Some(reason) = hard_failure(line, p) {
            return TranscriptOutcome {
                verdicts: Vec::new(),
                failure: Some(reason),
            };
        }
    }

    let mut outcome = TranscriptOutcome::default();
    let mut recipients = remaining.iter();

    for (i, line) in lines.iter().enumerate() {
        if p.keep_alive.is_match(line) {
            if let Some(next) = next_non_empty(lines, i + 1) {
                if !p.status_200.is_match(next) {
                    outcome.failure = Some(format!("proxy tunnel rejected: {}", next.trim()));
                    return outcome;
                }
            }
        } else if p.proxy_ok_connect.is_match(line) {
            if let Some(next) = next_non_empty(lines, i + 1) {
                if !p.banner_220.is_match(next) {
                    outcome.failure = Some(format!("banner rejected: {}", next.trim()));
                    return outcome;
                }
            }
        } else if p.ehlo_sent.is_match(line) {
            if let Some(next) = next_non_empty(lines, i + 1) {
                if !p.reply_250.is_match(next) {
                    outcome.failure = Some(format!("EHLO rejected: {}", next.trim()));
                    return outcome;
                }
            }
        } else if p.mail_from_sent.is_match(line) {
            if let Some(next) = next_non_empty(lines, i + 1) {
                if !p.reply_250.is_match(next) {
                    outcome.failure = Some(format!("MAIL FROM rejected: {}", next.trim()));
                    return outcome;
                }
            }
        } else if p.rcpt_to_sent.is_match(line) {
            if let Some(local) = recipients.next() {
                if let Some(next) = next_non_empty(lines, i + 1) {
                    let verdict = if p.reply_250.is_match(next) {
                        Verdict::Accepted(next.trim().to_string())
                    } else {
                        Verdict::Rejected
                    };
                    outcome.verdicts.push((local.clone(), verdict));
                }
            }
        }
    }

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(text: &str) -> Vec<String> {
        text.lines().map(str::to_string).collect()
    }

    #[test]
    fn too_many_connections_is_a_hard_failure() {
        let t = lines("too many connections\n> EHLO localhost\n< 250 ok\n");
        let outcome = classify_transcript(&t, &["a".to_string()]);
        assert_eq!(outcome.failure.as_deref(), Some("too many connections"));
        assert!(outcome.verdicts.is_empty());
    }

    #[test]
    fn accepted_rcpt_reply() {
        let t = lines(
            "Proxy replied OK to CONNECT\n< 220 mx.example.com\n> EHLO localhost\n< 250 ok\n> MAIL FROM:<user@localhost>\n< 250 ok\n> RCPT TO:<a@example.com>\n< 250 ok\n",
        );
        let outcome = classify_transcript(&t, &["a".to_string()]);
        assert!(outcome.failure.is_none());
        assert_eq!(
            outcome.verdicts,
            vec![("a".to_string(), Verdict::Accepted("250 ok".to_string()))]
        );
    }

    #[test]
    fn rejected_rcpt_reply() {
        let t = lines("> RCPT TO:<a@example.com>\n< 550 no such user\n");
        let outcome = classify_transcript(&t, &["a".to_string()]);
        assert_eq!(outcome.verdicts, vec![("a".to_string(), Verdict::Rejected)]);
    }

    #[test]
    fn ehlo_rejected_stops_before_rcpt() {
        let t = lines("> EHLO localhost\n< 501 syntax error\n> RCPT TO:<a@example.com>\n< 250 ok\n");
        let outcome = classify_transcript(&t, &["a".to_string()]);
        assert_eq!(outcome.failure.as_deref(), Some("EHLO rejected: < 501 syntax error"));
        assert!(outcome.verdicts.is_empty());
    }

    #[test]
    fn keep_alive_followed_by_non_200_is_a_failure() {
        let t = lines("Proxy-Connection: Keep-Alive\nHTTP/1.1 403 Forbidden\n");
        let outcome = classify_transcript(&t, &["a".to_string()]);
        assert!(outcome.failure.unwrap().contains("proxy tunnel rejected"));
    }
}
