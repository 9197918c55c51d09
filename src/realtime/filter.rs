use std::collections::HashMap;
use std::time::Duration;

use issuedesk_common::{InboundUpdate, Timestamp, UpdateKind};
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Accept,
    /// Same `type + timestamp` seen inside the suppression window
    Duplicate,
    /// Older than the newest accepted update of the same kind
    Stale,
}

/// Duplicate and staleness suppression for inbound updates.
///
/// Ids are remembered only for `window`; a replay after that is accepted
/// again unless the per-kind staleness check catches it. Ordering is
/// enforced per kind, never across kinds.
#[derive(Debug)]
pub struct UpdateFilter {
    window: Duration,
    seen: HashMap<String, Instant>,
    latest: HashMap<UpdateKind, Timestamp>,
}

impl UpdateFilter {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            seen: HashMap::new(),
            latest: HashMap::new(),
        }
    }

    pub fn check(&mut self, update: &InboundUpdate, now: Instant) -> Verdict {
        self.prune(now);

        let id = update.update_id();
        if self.seen.contains_key(&id) {
            return Verdict::Duplicate;
        }

        let kind = update.kind();
        if let Some(latest) = self.latest.get(&kind) {
            if update.timestamp < *latest {
                return Verdict::Stale;
            }
        }

        self.seen.insert(id, now);
        self.latest.insert(kind, update.timestamp);
        Verdict::Accept
    }

    pub fn latest(&self, kind: UpdateKind) -> Option<Timestamp> {
        self.latest.get(&kind).copied()
    }

    fn prune(&mut self, now: Instant) {
        let window = self.window;
        self.seen
            .retain(|_, seen_at| now.saturating_duration_since(*seen_at) < window);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use issuedesk_common::{StatisticsPatch, UpdatePayload};

    fn stats(ts: i64) -> InboundUpdate {
        InboundUpdate {
            timestamp: Timestamp(ts),
            payload: UpdatePayload::Statistics(StatisticsPatch::default()),
        }
    }

    fn session(ts: i64) -> InboundUpdate {
        InboundUpdate {
            timestamp: Timestamp(ts),
            payload: UpdatePayload::SessionUpdate(Default::default()),
        }
    }

    #[test]
    fn test_duplicate_within_window_is_dropped() {
        let mut filter = UpdateFilter::new(Duration::from_secs(1));
        let t0 = Instant::now();
        assert_eq!(filter.check(&stats(100), t0), Verdict::Accept);
        assert_eq!(
            filter.check(&stats(100), t0 + Duration::from_millis(999)),
            Verdict::Duplicate
        );
    }

    #[test]
    fn test_duplicate_after_window_is_forgotten() {
        let mut filter = UpdateFilter::new(Duration::from_secs(1));
        let t0 = Instant::now();
        assert_eq!(filter.check(&stats(100), t0), Verdict::Accept);
        // Same timestamp is not older than the latest, so it passes again.
        assert_eq!(
            filter.check(&stats(100), t0 + Duration::from_millis(1000)),
            Verdict::Accept
        );
    }

    #[test]
    fn test_stale_update_is_dropped_per_kind() {
        let mut filter = UpdateFilter::new(Duration::from_secs(1));
        let now = Instant::now();
        assert_eq!(filter.check(&session(200), now), Verdict::Accept);
        assert_eq!(filter.check(&session(100), now), Verdict::Stale);
        assert_eq!(filter.latest(UpdateKind::SessionUpdate), Some(Timestamp(200)));

        // A different kind keeps its own ordering.
        assert_eq!(filter.check(&stats(50), now), Verdict::Accept);
    }

    #[test]
    fn test_same_timestamp_different_kind_is_not_duplicate() {
        let mut filter = UpdateFilter::new(Duration::from_secs(1));
        let now = Instant::now();
        assert_eq!(filter.check(&stats(7), now), Verdict::Accept);
        assert_eq!(filter.check(&session(7), now), Verdict::Accept);
    }
}
