use ncaa_api::RoundKind;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};

pub const METRIC_PREFIX: &str = "mmscore";

/// Counters for the sync and scoring paths.
#[derive(Debug, Default)]
pub struct Metrics {
    bracket_updates: Mutex<BTreeMap<u8, u64>>,
    score_updates: AtomicU64,
    poll_failures: AtomicU64,
    poll_skipped: AtomicU64,
    malformed_records: AtomicU64,
    stale_reads: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_bracket_update(&self, round: RoundKind) {
        *self.bracket_updates.lock().entry(round.number()).or_insert(0) += 1;
    }

    pub fn increment_score_update(&self) {
        self.score_updates.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_poll_failure(&self) {
        self.poll_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_poll_skipped(&self) {
        self.poll_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_malformed_records(&self, count: usize) {
        self.malformed_records.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn increment_stale_read(&self) {
        self.stale_reads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bracket_updates(&self, round: RoundKind) -> u64 {
        self.bracket_updates.lock().get(&round.number()).copied().unwrap_or(0)
    }

    pub fn score_updates(&self) -> u64 {
        self.score_updates.load(Ordering::Relaxed)
    }

    pub fn poll_failures(&self) -> u64 {
        self.poll_failures.load(Ordering::Relaxed)
    }

    pub fn poll_skipped(&self) -> u64 {
        self.poll_skipped.load(Ordering::Relaxed)
    }

    pub fn malformed_records(&self) -> u64 {
        self.malformed_records.load(Ordering::Relaxed)
    }

    pub fn stale_reads(&self) -> u64 {
        self.stale_reads.load(Ordering::Relaxed)
    }

    /// Prometheus text exposition of every counter.
    pub fn render(&self) -> String {
        let mut body = String::new();
        let _ = writeln!(
            body,
            "# HELP {METRIC_PREFIX}_bracket_updates_total Master bracket updates by round"
        );
        let _ = writeln!(body, "# TYPE {METRIC_PREFIX}_bracket_updates_total counter");
        for (round, count) in self.bracket_updates.lock().iter() {
            let _ = writeln!(
                body,
                "{METRIC_PREFIX}_bracket_updates_total{{round=\"{round}\"}} {count}"
            );
        }
        let counters = [
            ("score_updates_total", "User score recomputations", self.score_updates()),
            (
                "poll_failures_total",
                "Poll ticks that exhausted their retries",
                self.poll_failures(),
            ),
            ("poll_skipped_total", "Poll ticks skipped by the rate limiter", self.poll_skipped()),
            (
                "malformed_records_total",
                "Upstream game records dropped during normalization",
                self.malformed_records(),
            ),
            (
                "stale_reads_total",
                "Expired master brackets served after a failed refresh",
                self.stale_reads(),
            ),
        ];
        for (name, help, value) in counters {
            let _ = writeln!(body, "# HELP {METRIC_PREFIX}_{name} {help}");
            let _ = writeln!(body, "# TYPE {METRIC_PREFIX}_{name} counter");
            let _ = writeln!(body, "{METRIC_PREFIX}_{name} {value}");
        }
        body
    }
}
