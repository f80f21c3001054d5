use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::PrimaryKey;

/// Viewer counters for one code
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CodeAnalytics {
    /// Lifetime connection count
    pub total_connections: u64,
    pub current_viewers: u32,
    pub peak_viewers: u32,
    /// When the peak was reached
    pub peak_at: Option<DateTime<Utc>>,
    pub last_connection_at: Option<DateTime<Utc>>,
}

/// Aggregates viewer counts per code, keyed by the code's surrogate id so
/// reissued digits never merge two codes' numbers.
///
/// The dashmap entry API gives one critical section per code, so
/// simultaneous admissions to a popular code cannot lose updates or
/// overshoot a viewer cap.
#[derive(Default)]
pub struct Analytics {
    records: DashMap<PrimaryKey, CodeAnalytics>,
}

impl Analytics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims a viewer slot if the code's cap allows one more, atomically.
    /// `max_viewers` of 0 means unlimited.
    ///
    /// The lifetime counters are recorded by [Analytics::record_admission]
    /// once the session actually persists, so a claim that never becomes a
    /// session is fully undone by [Analytics::on_disconnect].
    pub fn try_connect(&self, code: PrimaryKey, max_viewers: u32, at: DateTime<Utc>) -> bool {
        let mut record = self.records.entry(code).or_default();

        if max_viewers > 0 && record.current_viewers >= max_viewers {
            return false;
        }

        record.current_viewers += 1;

        if record.current_viewers > record.peak_viewers {
            record.peak_viewers = record.current_viewers;
            record.peak_at = Some(at);
        }

        true
    }

    /// Accounts a successfully admitted session in the lifetime counters
    pub fn record_admission(&self, code: PrimaryKey, at: DateTime<Utc>) {
        let mut record = self.records.entry(code).or_default();

        record.total_connections += 1;
        record.last_connection_at = Some(at);
    }

    /// Accounts a session departure. Clamped at zero, since a disconnect
    /// notification can race with timeout-based cleanup.
    pub fn on_disconnect(&self, code: PrimaryKey) {
        if let Some(mut record) = self.records.get_mut(&code) {
            record.current_viewers = record.current_viewers.saturating_sub(1);
        }
    }

    pub fn current_viewers(&self, code: PrimaryKey) -> u32 {
        self.records
            .get(&code)
            .map(|r| r.current_viewers)
            .unwrap_or(0)
    }

    pub fn snapshot(&self, code: PrimaryKey) -> CodeAnalytics {
        self.records
            .get(&code)
            .map(|r| r.value().clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CODE: PrimaryKey = 1;

    fn connect(analytics: &Analytics, max_viewers: u32, at: DateTime<Utc>) -> bool {
        let admitted = analytics.try_connect(CODE, max_viewers, at);

        if admitted {
            analytics.record_admission(CODE, at);
        }

        admitted
    }

    #[test]
    fn counters_hold_their_invariants() {
        let analytics = Analytics::new();
        let now = Utc::now();

        // Arbitrary connect/disconnect interleaving
        assert!(connect(&analytics, 0, now));
        assert!(connect(&analytics, 0, now));
        analytics.on_disconnect(CODE);
        assert!(connect(&analytics, 0, now));
        analytics.on_disconnect(CODE);
        analytics.on_disconnect(CODE);

        let snapshot = analytics.snapshot(CODE);
        assert_eq!(snapshot.total_connections, 3);
        assert_eq!(snapshot.current_viewers, 0);
        assert_eq!(snapshot.peak_viewers, 2);
        assert!(snapshot.peak_viewers >= snapshot.current_viewers);
    }

    #[test]
    fn double_disconnect_is_a_no_op() {
        let analytics = Analytics::new();

        assert!(connect(&analytics, 0, Utc::now()));
        analytics.on_disconnect(CODE);
        analytics.on_disconnect(CODE);

        assert_eq!(analytics.snapshot(CODE).current_viewers, 0);
    }

    #[test]
    fn viewer_cap_is_enforced_atomically() {
        let analytics = Analytics::new();
        let now = Utc::now();

        assert!(connect(&analytics, 2, now));
        assert!(connect(&analytics, 2, now));
        assert!(!connect(&analytics, 2, now));

        analytics.on_disconnect(CODE);
        assert!(connect(&analytics, 2, now));
    }

    #[test]
    fn an_undone_claim_never_reaches_the_lifetime_counters() {
        let analytics = Analytics::new();

        // The slot was claimed but the session never persisted
        assert!(analytics.try_connect(CODE, 0, Utc::now()));
        analytics.on_disconnect(CODE);

        let snapshot = analytics.snapshot(CODE);
        assert_eq!(snapshot.total_connections, 0);
        assert_eq!(snapshot.current_viewers, 0);
        assert!(snapshot.last_connection_at.is_none());
    }

    #[test]
    fn disconnect_for_unknown_code_is_tolerated() {
        let analytics = Analytics::new();
        analytics.on_disconnect(99);

        assert_eq!(analytics.snapshot(99), CodeAnalytics::default());
    }
}
