use std::time::Duration;

use metrics::{counter, gauge, histogram};

/// An observable occurrence inside the governor. Emitting records its metrics
/// and logs it.
pub trait InternalEvent {
    fn emit(self);
}

/// A request got a quota slot, either immediately or from the queue.
#[derive(Clone, Copy, Debug)]
pub struct RequestAdmitted {
    pub in_flight: usize,
    pub queued: usize,
}

impl InternalEvent for RequestAdmitted {
    fn emit(self) {
        counter!("request_governor_admitted_total").increment(1);
        gauge!("request_governor_in_flight").set(self.in_flight as f64);
        gauge!("request_governor_queue_depth").set(self.queued as f64);
        tracing::debug!(
            target: "request_governor::stats",
            in_flight = self.in_flight,
            queued = self.queued,
            "Request admitted"
        );
    }
}

/// A queued request's caller resumed after waiting for its slot.
#[derive(Clone, Copy, Debug)]
pub struct QueuedRequestResumed {
    pub seq: u64,
    pub waited: Duration,
}

impl InternalEvent for QueuedRequestResumed {
    fn emit(self) {
        histogram!("request_governor_admission_wait_seconds").record(self.waited);
        tracing::trace!(
            target: "request_governor::stats",
            seq = self.seq,
            waited_ms = self.waited.as_millis() as u64,
            "Queued request resumed"
        );
    }
}

/// A request was denied immediate admission and joined the queue.
#[derive(Clone, Copy, Debug)]
pub struct RequestDeferred {
    pub seq: u64,
    pub queued: usize,
}

impl InternalEvent for RequestDeferred {
    fn emit(self) {
        counter!("request_governor_deferred_total").increment(1);
        gauge!("request_governor_queue_depth").set(self.queued as f64);
        tracing::debug!(
            target: "request_governor::stats",
            seq = self.seq,
            queued = self.queued,
            "Quota exhausted; request queued"
        );
    }
}

/// A queued request was dropped by its caller before it got a slot.
#[derive(Clone, Copy, Debug)]
pub struct QueuedRequestAbandoned {
    pub seq: u64,
}

impl InternalEvent for QueuedRequestAbandoned {
    fn emit(self) {
        counter!("request_governor_abandoned_total").increment(1);
        tracing::debug!(target: "request_governor::stats", seq = self.seq, "Skipping abandoned queued request");
    }
}

/// A slot was handed back to the quota.
#[derive(Clone, Copy, Debug)]
pub struct QuotaReleased {
    pub in_flight: usize,
}

impl InternalEvent for QuotaReleased {
    fn emit(self) {
        gauge!("request_governor_in_flight").set(self.in_flight as f64);
        tracing::trace!(target: "request_governor::stats", in_flight = self.in_flight, "Quota slot released");
    }
}

/// A throttled request is being resubmitted.
#[derive(Clone, Copy, Debug)]
pub struct ThrottleRetryScheduled {
    pub delay: Duration,
    pub attempts_remaining: usize,
}

impl InternalEvent for ThrottleRetryScheduled {
    fn emit(self) {
        counter!("request_governor_throttle_retries_total").increment(1);
        tracing::warn!(
            target: "request_governor::retry",
            delay_secs = self.delay.as_secs(),
            attempts_remaining = self.attempts_remaining,
            "Server throttled the request; resubmitting after delay"
        );
    }
}
