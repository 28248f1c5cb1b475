use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use mailprobe_lib::{
    DiagnosticsLog, DomainBatch, MxList, MxStatus, NormalizedEmail, ProbeOptions, Verdict, check_mx,
    dispatch,
};

#[cfg_attr(feature = "with-serde", derive(serde::Serialize))]
#[derive(Debug, Clone)]
pub struct DeliverabilitySummary {
    #[cfg_attr(feature = "with-serde", serde(skip_serializing_if = "Option::is_none"))]
    pub verdict: Option<VerdictSnapshot>,
    #[cfg_attr(feature = "with-serde", serde(skip_serializing_if = "Option::is_none"))]
    pub error: Option<String>,
    #[cfg_attr(feature = "with-serde", serde(skip_serializing_if = "Option::is_none"))]
    pub skipped: Option<String>,
}

#[cfg_attr(feature = "with-serde", derive(serde::Serialize))]
#[derive(Debug, Clone)]
pub struct VerdictSnapshot {
    pub kind: &'static str,
    pub detail: Option<String>,
    pub accepted: bool,
}

impl DeliverabilitySummary {
    pub fn from_verdict(verdict: &Verdict, accepted: bool) -> Self {
        let (kind, detail) = match verdict {
            Verdict::Accepted(raw) => ("accepted", Some(raw.clone())),
            Verdict::Rejected => ("rejected", None),
            Verdict::Greylisted(raw) => ("greylisted", Some(raw.clone())),
            Verdict::CatchAll => ("catch_all", None),
            Verdict::Inconclusive { reason, .. } => ("inconclusive", Some(reason.clone())),
        };
        Self {
            verdict: Some(VerdictSnapshot {
                kind,
                detail,
                accepted,
            }),
            error: None,
            skipped: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            verdict: None,
            error: Some(message.into()),
            skipped: None,
        }
    }

    pub fn skipped(reason: impl Into<String>) -> Self {
        Self {
            verdict: None,
            error: None,
            skipped: Some(reason.into()),
        }
    }

    pub fn human_summary(&self) -> String {
        if let Some(v) = &self.verdict {
            let state = if v.accepted { "valid" } else { "invalid" };
            match &v.detail {
                Some(detail) => format!("{} ({state}): {detail}", v.kind),
                None => format!("{} ({state})", v.kind),
            }
        } else if let Some(error) = &self.error {
            format!("error: {error}")
        } else if let Some(reason) = &self.skipped {
            format!("skipped: {reason}")
        } else {
            "unknown".to_string()
        }
    }

    #[cfg(feature = "with-csv")]
    pub fn csv_fields(&self) -> (String, String) {
        if let Some(v) = &self.verdict {
            (v.kind.to_string(), v.detail.clone().unwrap_or_default())
        } else if let Some(error) = &self.error {
            ("error".to_string(), error.clone())
        } else if let Some(reason) = &self.skipped {
            ("skipped".to_string(), reason.clone())
        } else {
            ("unknown".to_string(), String::new())
        }
    }
}

pub fn probe(row: &NormalizedEmail) -> DeliverabilitySummary {
    if !row.valid {
        return DeliverabilitySummary::skipped("email invalid");
    }
    if row.local.is_empty() {
        return DeliverabilitySummary::skipped("local part missing");
    }

    let domain = if !row.ascii_domain.is_empty() {
        row.ascii_domain.as_str()
    } else if !row.domain.is_empty() {
        row.domain.as_str()
    } else {
        ""
    };
    if domain.is_empty() {
        return DeliverabilitySummary::skipped("domain missing");
    }

    let candidate = format!("{}@{}", row.local, domain);
    let mut batch = DomainBatch::new();
    if let Err(err) = batch.insert(&candidate) {
        return DeliverabilitySummary::error(err.to_string());
    }

    let domain_key = domain.to_ascii_lowercase();
    let mut mxs = HashMap::new();
    match check_mx(&domain_key) {
        Ok(MxStatus::Records(records)) => {
            mxs.insert(
                domain_key.clone(),
                MxList::new(records.into_iter().map(|r| r.exchange)),
            );
        }
        Ok(MxStatus::NoRecords) => {}
        Err(err) => return DeliverabilitySummary::error(err.to_string()),
    }

    let options = ProbeOptions::default();
    let unix_ts = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let mut log = DiagnosticsLog::new(false);
    let mut rng = rand::thread_rng();
    let results = dispatch(&batch, &mxs, &options, &mut rng, unix_ts, &mut log);

    match results.verdict_for(&candidate) {
        Some(verdict) => {
            let accepted = verdict.is_accepted(&options.policy);
            DeliverabilitySummary::from_verdict(verdict, accepted)
        }
        None => DeliverabilitySummary::error("dispatcher produced no verdict"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalized(valid: bool, local: &str, domain: &str) -> NormalizedEmail {
        NormalizedEmail {
            original: format!("{local}@{domain}"),
            local: local.to_string(),
            domain: domain.to_string(),
            ascii_domain: domain.to_string(),
            mode: mailprobe_lib::ValidationMode::Strict,
            valid,
            reasons: Vec::new(),
            spec_chars: None,
            has_confusables: None,
            has_diacritics: None,
            has_mixed_scripts: None,
            spec_notes: None,
            ascii_hint: None,
        }
    }

    #[test]
    fn skips_when_invalid() {
        let row = normalized(false, "", "");
        let summary = DeliverabilitySummary::skipped("email invalid");
        assert_eq!(summary.human_summary(), "skipped: email invalid");
        assert!(!row.valid);
    }

    #[test]
    fn human_summary_reports_accepted_with_detail() {
        let verdict = Verdict::Accepted("250 ok\r\n".to_string());
        let summary = DeliverabilitySummary::from_verdict(&verdict, true);
        assert_eq!(summary.human_summary(), "accepted (valid): 250 ok\r\n");
    }

    #[test]
    fn human_summary_reports_rejected() {
        let verdict = Verdict::Rejected;
        let summary = DeliverabilitySummary::from_verdict(&verdict, false);
        assert_eq!(summary.human_summary(), "rejected (invalid)");
    }
}
