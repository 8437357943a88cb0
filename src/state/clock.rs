use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Utc};

use crate::config::POSTED_AT_TZ;

/// Issues creation instants for new picks.
///
/// Instants are milliseconds since the epoch and strictly increasing within a
/// process, so `play_<ms>` ids never collide even when two creates land in the
/// same millisecond.
#[derive(Debug, Default)]
pub struct PickClock {
    last_ms: AtomicI64,
}

impl PickClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start after `floor_ms`, e.g. the newest `createdAt` already persisted.
    pub fn starting_after(floor_ms: i64) -> Self {
        Self { last_ms: AtomicI64::new(floor_ms) }
    }

    pub fn next_ms(&self) -> i64 {
        let now = Utc::now().timestamp_millis();
        let mut prev = self.last_ms.load(Ordering::Relaxed);
        loop {
            let candidate = now.max(prev + 1);
            match self.last_ms.compare_exchange_weak(prev, candidate, Ordering::AcqRel, Ordering::Relaxed) {
                Ok(_) => return candidate,
                Err(actual) => prev = actual,
            }
        }
    }

    /// `(id, created_at, posted_at)` for a pick created now.
    pub fn stamp(&self) -> (String, i64, String) {
        let created_at = self.next_ms();
        (pick_id(created_at), created_at, format_posted_at(created_at))
    }
}

pub fn pick_id(created_at_ms: i64) -> String {
    format!("play_{created_at_ms}")
}

/// "Jan 10, 3:00 PM ET" in the feed's fixed timezone.
pub fn format_posted_at(created_at_ms: i64) -> String {
    let utc = DateTime::<Utc>::from_timestamp_millis(created_at_ms).unwrap_or_default();
    format!("{} ET", utc.with_timezone(&POSTED_AT_TZ).format("%b %-d, %-I:%M %p"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn instants_strictly_increase() {
        let clock = PickClock::new();
        let mut last = 0;
        for _ in 0..1_000 {
            let t = clock.next_ms();
            assert!(t > last);
            last = t;
        }
    }

    #[test]
    fn floor_is_respected() {
        let far_future = Utc::now().timestamp_millis() + 60_000;
        let clock = PickClock::starting_after(far_future);
        assert_eq!(clock.next_ms(), far_future + 1);
    }

    #[test]
    fn concurrent_stamps_are_unique() {
        let clock = Arc::new(PickClock::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let clock = Arc::clone(&clock);
                std::thread::spawn(move || (0..200).map(|_| clock.stamp().0).collect::<Vec<_>>())
            })
            .collect();
        let ids: Vec<String> = handles.into_iter().flat_map(|h| h.join().unwrap()).collect();
        let unique: HashSet<_> = ids.iter().collect();
        assert_eq!(unique.len(), ids.len());
    }

    #[test]
    fn posted_at_uses_eastern_time() {
        // 2025-01-10T20:00:00Z is 3:00 PM EST.
        assert_eq!(format_posted_at(1_736_539_200_000), "Jan 10, 3:00 PM ET");
        // 2025-07-04T16:30:00Z is 12:30 PM EDT.
        assert_eq!(format_posted_at(1_751_646_600_000), "Jul 4, 12:30 PM ET");
    }
}
