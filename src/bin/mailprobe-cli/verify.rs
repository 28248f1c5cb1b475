use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Result, bail};
use mailprobe_lib::{DomainBatch, MxList, PolicyFlags, ProbeOptions, Timeouts, Verdict, dispatch};

#[cfg(feature = "with-serde")]
use serde::Serialize;

pub struct VerifyConfig<'a> {
    pub email: &'a str,
    pub format: &'a str,
    pub mail_from: Option<&'a str>,
    pub mx_hosts: &'a [String],
    pub port: u16,
    pub no_catchall_probe: bool,
    pub catchall_is_valid: bool,
    pub greylist_is_valid: bool,
    pub no_comm_is_valid: bool,
    pub no_conn_is_valid: bool,
    pub timeout_ms: u64,
}

pub fn run_verify_exists(cfg: VerifyConfig<'_>) -> Result<()> {
    let mut batch = DomainBatch::new();
    batch.insert(cfg.email)?;
    let Some(domain_key) = domain_of(cfg.email) else {
        bail!("'{}' is not a valid local@domain address", cfg.email);
    };

    let mxs = resolve_mx_list(&domain_key, cfg.mx_hosts)?;

    let mut options = ProbeOptions::default();
    if let Some(from) = cfg.mail_from {
        options.sender = from.to_string();
    }
    options.port = cfg.port;
    options.timeouts = uniform_timeouts(cfg.timeout_ms);
    options.policy = PolicyFlags {
        catchall_test: !cfg.no_catchall_probe,
        catchall_is_valid: cfg.catchall_is_valid,
        no_comm_is_valid: cfg.no_comm_is_valid,
        no_conn_is_valid: cfg.no_conn_is_valid,
        greylisted_considered_valid: cfg.greylist_is_valid,
        debug: false,
    };

    let unix_ts = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);

    let mut log = mailprobe_lib::DiagnosticsLog::new(false);
    let mut rng = rand::thread_rng();
    let results = dispatch(&batch, &mxs, &options, &mut rng, unix_ts, &mut log);
    let verdict = results
        .verdict_for(cfg.email)
        .expect("dispatch always records a verdict for every batch entry");
    let accepted = verdict.is_accepted(&options.policy);
    let domain_info = results.domain_info(&domain_key);

    match cfg.format {
        "human" => print_human(cfg.email, verdict, accepted, domain_info),
        "json" => {
            #[cfg(feature = "with-serde")]
            {
                let payload = VerdictPayload::from_parts(cfg.email, verdict, accepted, domain_info);
                println!("{}", serde_json::to_string_pretty(&payload)?);
            }
            #[cfg(not(feature = "with-serde"))]
            {
                bail!("format=json nécessite la feature 'with-serde'");
            }
        }
        other => bail!("format inconnu '{other}', utilisez human|json"),
    }

    Ok(())
}

fn domain_of(email: &str) -> Option<String> {
    let pos = email.rfind('@')?;
    let domain = &email[pos + 1..];
    if domain.is_empty() {
        return None;
    }
    Some(domain.to_ascii_lowercase())
}

fn uniform_timeouts(timeout_ms: u64) -> Timeouts {
    Timeouts {
        connected_ms: timeout_ms,
        ehlo_ms: timeout_ms,
        mail_ms: timeout_ms,
        rcpt_ms: timeout_ms,
        rset_ms: timeout_ms,
        quit_ms: timeout_ms,
        noop_ms: timeout_ms,
    }
}

#[cfg(feature = "with-mx")]
fn resolve_mx_list(domain_key: &str, explicit: &[String]) -> Result<HashMap<String, MxList>> {
    let mut mxs = HashMap::new();
    if !explicit.is_empty() {
        mxs.insert(domain_key.to_string(), MxList::new(explicit.iter().cloned()));
        return Ok(mxs);
    }
    match mailprobe_lib::check_mx(domain_key) {
        Ok(mailprobe_lib::MxStatus::Records(records)) => {
            let hosts = records.into_iter().map(|r| r.exchange);
            mxs.insert(domain_key.to_string(), MxList::new(hosts));
        }
        Ok(mailprobe_lib::MxStatus::NoRecords) => {}
        Err(err) => bail!("MX lookup for '{domain_key}' failed: {err}"),
    }
    Ok(mxs)
}

#[cfg(not(feature = "with-mx"))]
fn resolve_mx_list(domain_key: &str, explicit: &[String]) -> Result<HashMap<String, MxList>> {
    let mut mxs = HashMap::new();
    if explicit.is_empty() {
        bail!(
            "no --mx-host supplied and the 'with-mx' feature is disabled; cannot resolve MX for '{domain_key}'"
        );
    }
    mxs.insert(domain_key.to_string(), MxList::new(explicit.iter().cloned()));
    Ok(mxs)
}

fn print_human(
    email: &str,
    verdict: &Verdict,
    accepted: bool,
    domain_info: Option<&mailprobe_lib::DomainInfo>,
) {
    println!(
        "{email}: {} ({})",
        describe_verdict(verdict),
        if accepted { "valid" } else { "invalid" }
    );
    if let Some(info) = domain_info {
        if !info.mxs.is_empty() {
            println!("MX tried: {}", info.mxs.join(", "));
        }
        if let Some(catchall) = info.catchall {
            println!("Catch-all: {catchall}");
        }
    }
}

fn describe_verdict(verdict: &Verdict) -> String {
    match verdict {
        Verdict::Accepted(raw) => format!("accepted ({})", raw.trim_end()),
        Verdict::Rejected => "rejected".to_string(),
        Verdict::Greylisted(raw) => format!("greylisted ({})", raw.trim_end()),
        Verdict::CatchAll => "catch-all domain".to_string(),
        Verdict::Inconclusive { reason, .. } => format!("inconclusive: {reason}"),
    }
}

#[cfg(feature = "with-serde")]
#[derive(Serialize)]
struct VerdictPayload<'a> {
    email: &'a str,
    verdict: &'static str,
    detail: Option<String>,
    accepted: bool,
    mx_tried: Vec<String>,
    catchall: Option<String>,
}

#[cfg(feature = "with-serde")]
impl<'a> VerdictPayload<'a> {
    fn from_parts(
        email: &'a str,
        verdict: &Verdict,
        accepted: bool,
        domain_info: Option<&mailprobe_lib::DomainInfo>,
    ) -> Self {
        let (kind, detail) = match verdict {
            Verdict::Accepted(raw) => ("accepted", Some(raw.clone())),
            Verdict::Rejected => ("rejected", None),
            Verdict::Greylisted(raw) => ("greylisted", Some(raw.clone())),
            Verdict::CatchAll => ("catch_all", None),
            Verdict::Inconclusive { reason, .. } => ("inconclusive", Some(reason.clone())),
        };
        Self {
            email,
            verdict: kind,
            detail,
            accepted,
            mx_tried: domain_info.map(|i| i.mxs.clone()).unwrap_or_default(),
            catchall: domain_info.and_then(|i| i.catchall).map(|c| c.to_string()),
        }
    }
}
