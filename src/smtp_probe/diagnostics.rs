use chrono::Utc;

/// Append-only, timestamped event log for a single run (§4.8).
///
/// Cleared at the start of each run, exposed read-only afterwards. When
/// `debug` is set, entries are additionally mirrored to stdout as they're
/// recorded, and a `tracing::debug!` event is emitted regardless of the
/// flag so a host application wiring this crate into `tracing` still gets
/// structured logs (the Non-goal only excludes building a sink here, not
/// instrumenting the code path).
#[derive(Debug, Clone, Default)]
pub struct DiagnosticsLog {
    entries: Vec<String>,
    debug: bool,
}

impl DiagnosticsLog {
    pub fn new(debug: bool) -> Self {
        Self {
            entries: Vec::new(),
            debug,
        }
    }

    pub fn record(&mut self, message: impl Into<String>) {
        let message = message.into();
        let stamped = format!(
            "[{}] {message}",
            Utc::now().format("%Y-%m-%dT%H:%M:%S%.6fZ")
        );
        #[cfg(feature = "with-tracing")]
        tracing::debug!(target: "mailprobe_lib::smtp_probe", "{message}");
        if self.debug {
            println!("{stamped}");
        }
        self.entries.push(stamped);
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_timestamped_entries() {
        let mut log = DiagnosticsLog::new(false);
        log.record("connect mx.example.com");
        assert_eq!(log.entries().len(), 1);
        assert!(log.entries()[0].starts_with('['));
        assert!(log.entries()[0].contains("connect mx.example.com"));
    }

    #[test]
    fn clear_resets_between_runs() {
        let mut log = DiagnosticsLog::new(false);
        log.record("one");
        log.clear();
        assert!(log.entries().is_empty());
    }
}
