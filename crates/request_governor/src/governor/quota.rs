use std::time::Duration;

use tokio::time::Instant;

use super::GovernorSettings;

/// Count of requests currently holding a quota slot.
///
/// Invariant: `0 <= in_flight <= max_requests`. Every successful
/// [`try_admit`](QuotaTracker::try_admit) hands out exactly one release
/// deadline, and the owner must call [`release`](QuotaTracker::release) once
/// for it.
#[derive(Debug)]
pub(crate) struct QuotaTracker {
    max_requests: usize,
    release_interval: Duration,
    in_flight: usize,
    last_release: Option<Instant>,
}

impl QuotaTracker {
    pub(crate) fn new(settings: &GovernorSettings) -> Self {
        Self {
            max_requests: settings.max_requests.max(1),
            release_interval: settings.release_interval(),
            in_flight: 0,
            last_release: None,
        }
    }

    /// Takes a slot if one is free and returns the instant it frees again.
    ///
    /// Release deadlines are chained one interval apart, so a burst of
    /// admissions frees its slots one by one rather than all at once.
    pub(crate) fn try_admit(&mut self, now: Instant) -> Option<Instant> {
        if self.in_flight >= self.max_requests {
            return None;
        }
        self.in_flight += 1;

        let base = match self.last_release {
            Some(last) if last > now => last,
            _ => now,
        };
        let release_at = base + self.release_interval;
        self.last_release = Some(release_at);
        Some(release_at)
    }

    pub(crate) fn release(&mut self) {
        debug_assert!(self.in_flight > 0, "release without a matching admission");
        self.in_flight = self.in_flight.saturating_sub(1);
    }

    pub(crate) fn in_flight(&self) -> usize {
        self.in_flight
    }
}
