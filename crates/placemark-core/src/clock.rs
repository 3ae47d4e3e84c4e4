//! Clock and id-generation collaborators.
//!
//! Both are injected into the mutation engine and the caches so tests can
//! substitute deterministic implementations.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use uuid::Uuid;

/// Format a timestamp as ISO-8601 UTC with millisecond precision.
///
/// The fixed width and `Z` suffix make lexicographic order equal to
/// chronological order, which the cache merge relies on.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Source of the current time.
pub trait Clock: Send + Sync {
    /// Milliseconds since the Unix epoch.
    fn now_millis(&self) -> i64;

    /// Current time as an ISO-8601 string.
    fn now_iso(&self) -> String {
        let ts = Utc
            .timestamp_millis_opt(self.now_millis())
            .single()
            .unwrap_or_else(Utc::now);
        format_timestamp(&ts)
    }
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// Settable clock for tests.
#[derive(Debug, Default)]
pub struct ManualClock {
    millis: AtomicI64,
}

impl ManualClock {
    pub fn new(millis: i64) -> Self {
        Self {
            millis: AtomicI64::new(millis),
        }
    }

    /// Start at an ISO-8601 instant. Falls back to the epoch if unparsable.
    pub fn at(iso: &str) -> Self {
        let millis = DateTime::parse_from_rfc3339(iso)
            .map(|ts| ts.timestamp_millis())
            .unwrap_or(0);
        Self::new(millis)
    }

    pub fn set(&self, millis: i64) {
        self.millis.store(millis, Ordering::SeqCst);
    }

    pub fn advance(&self, delta_ms: i64) {
        self.millis.fetch_add(delta_ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> i64 {
        self.millis.load(Ordering::SeqCst)
    }
}

/// Generate a new review id: `review-{uuidv7}`.
///
/// UUIDv7 is time-ordered with 74 random bits, so collisions are
/// practically impossible and no external state is read.
#[inline]
pub fn new_review_id() -> String {
    format!("review-{}", Uuid::now_v7())
}

/// Source of new review ids.
pub trait IdGenerator: Send + Sync {
    fn review_id(&self) -> String;
}

/// Production id source.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomIds;

impl IdGenerator for RandomIds {
    fn review_id(&self) -> String {
        new_review_id()
    }
}

/// Deterministic `review-001`, `review-002`, ... for tests.
#[derive(Debug, Default)]
pub struct SequentialIds {
    next: AtomicU64,
}

impl SequentialIds {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdGenerator for SequentialIds {
    fn review_id(&self) -> String {
        let n = self.next.fetch_add(1, Ordering::SeqCst) + 1;
        format!("review-{:03}", n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_formats_millis() {
        let clock = ManualClock::at("2026-02-10T10:00:00.000Z");
        assert_eq!(clock.now_iso(), "2026-02-10T10:00:00.000Z");
        clock.advance(1_500);
        assert_eq!(clock.now_iso(), "2026-02-10T10:00:01.500Z");
    }

    #[test]
    fn timestamps_sort_lexicographically() {
        let clock = ManualClock::at("2026-02-10T09:59:59.999Z");
        let earlier = clock.now_iso();
        clock.advance(1);
        let later = clock.now_iso();
        assert!(earlier < later);
    }

    #[test]
    fn review_ids_are_unique_and_prefixed() {
        let a = new_review_id();
        let b = new_review_id();
        assert!(a.starts_with("review-"));
        assert_ne!(a, b);
    }

    #[test]
    fn sequential_ids_count_up() {
        let ids = SequentialIds::new();
        assert_eq!(ids.review_id(), "review-001");
        assert_eq!(ids.review_id(), "review-002");
    }
}
