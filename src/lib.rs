#![forbid(unsafe_code)]
//! mailprobe_lib — SMTP deliverability probing (RFC 5321 `RCPT TO`, up to but
//! not including `DATA`), plus the format-validation and caller-side DNS
//! helpers it composes with.

pub mod validator;
pub use validator::{
    EmailError,
    NormalizedEmail,
    SpecCharacters,
    SpecClass,
    SpecFinding,
    SpecOptions,
    SpecSegment,
    ValidationMode,
    ValidationReport,
    normalize_email,
    normalize_email_with_spec,
    validate_email,
    validate_email_with_spec,
};

#[cfg(feature = "with-mx")]
pub mod mx;
#[cfg(feature = "with-mx")]
pub use mx::{Error as MxError, MxRecord, MxStatus, check_mx};

#[cfg(feature = "with-smtp-probe")]
pub mod smtp_probe;
#[cfg(feature = "with-smtp-probe")]
pub use smtp_probe::{
    Address, CatchAllOutcome, DiagnosticsLog, DomainBatch, DomainInfo, DomainUsers, MxList,
    PolicyFlags, ProbeOptions, ReplyCategory, RunResults, Session, SessionError, SessionErrorKind,
    SessionState, Timeouts, Verdict, dispatch, dispatch_via_transcript, verify,
};
