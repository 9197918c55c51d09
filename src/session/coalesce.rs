use std::time::Duration;

use tokio::time::Instant;

/// Timer-flushed queue with a bounded batch window.
///
/// The first item pushed into an empty buffer opens the window; everything
/// pushed before `opened + window` is released together. No item waits
/// longer than the window.
#[derive(Debug)]
pub struct Coalescer<T> {
    window: Duration,
    items: Vec<T>,
    opened_at: Option<Instant>,
}

impl<T> Coalescer<T> {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            items: Vec::new(),
            opened_at: None,
        }
    }

    pub fn push(&mut self, item: T, now: Instant) {
        if self.items.is_empty() {
            self.opened_at = Some(now);
        }
        self.items.push(item);
    }

    pub fn extend(&mut self, items: impl IntoIterator<Item = T>, now: Instant) {
        for item in items {
            self.push(item, now);
        }
    }

    /// When the current batch must be released, if one is open.
    pub fn deadline(&self) -> Option<Instant> {
        self.opened_at.map(|opened| opened + self.window)
    }

    pub fn is_due(&self, now: Instant) -> bool {
        self.deadline().is_some_and(|deadline| now >= deadline)
    }

    pub fn take(&mut self) -> Vec<T> {
        self.opened_at = None;
        std::mem::take(&mut self.items)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_opens_on_first_push_only() {
        let mut buf = Coalescer::new(Duration::from_millis(50));
        let t0 = Instant::now();
        assert!(buf.deadline().is_none());

        buf.push(1, t0);
        buf.push(2, t0 + Duration::from_millis(30));
        assert_eq!(buf.deadline(), Some(t0 + Duration::from_millis(50)));
        assert!(!buf.is_due(t0 + Duration::from_millis(49)));
        assert!(buf.is_due(t0 + Duration::from_millis(50)));
    }

    #[test]
    fn test_take_releases_batch_and_closes_window() {
        let mut buf = Coalescer::new(Duration::from_millis(50));
        let t0 = Instant::now();
        buf.extend(vec!["a", "b", "c"], t0);
        assert_eq!(buf.len(), 3);
        assert_eq!(buf.take(), vec!["a", "b", "c"]);
        assert!(buf.is_empty());
        assert!(buf.deadline().is_none());

        let t1 = t0 + Duration::from_millis(200);
        buf.push("d", t1);
        assert_eq!(buf.deadline(), Some(t1 + Duration::from_millis(50)));
    }
}
