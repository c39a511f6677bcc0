use std::{
    fmt,
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use parking_lot::Mutex;
use snafu::Snafu;
use tokio::{sync::oneshot, time::Instant};

use super::{
    GovernorSettings, instant_now,
    internal_event::{
        InternalEvent, QueuedRequestAbandoned, QueuedRequestResumed, QuotaReleased, RequestAdmitted,
        RequestDeferred,
    },
    queue::AdmissionQueue,
    quota::QuotaTracker,
};

#[derive(Debug, Snafu)]
pub enum AdmissionError {
    #[snafu(display("Governor dropped the queued request before admitting it"))]
    Aborted,
}

#[derive(Debug)]
struct GovernorState {
    quota: QuotaTracker,
    queue: AdmissionQueue,
}

#[derive(Debug)]
struct Shared {
    settings: GovernorSettings,
    state: Mutex<GovernorState>,
}

/// Admission control for every outbound request of one API client.
///
/// Cloning yields another handle to the same quota and queue. Build one per
/// client (or per test) and hand it to every
/// [`QuotaLimitLayer`](super::QuotaLimitLayer) that should share the quota.
///
/// Must be used from within a tokio runtime: every admission schedules the
/// release of its slot on a timer task.
#[derive(Clone)]
pub struct RequestGovernor {
    shared: Arc<Shared>,
}

impl fmt::Debug for RequestGovernor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("RequestGovernor")
            .field("settings", &self.shared.settings)
            .field("in_flight", &state.quota.in_flight())
            .field("queued", &state.queue.len())
            .finish()
    }
}

impl RequestGovernor {
    pub fn new(settings: GovernorSettings) -> Self {
        let state = GovernorState {
            quota: QuotaTracker::new(&settings),
            queue: AdmissionQueue::default(),
        };
        Self {
            shared: Arc::new(Shared {
                settings,
                state: Mutex::new(state),
            }),
        }
    }

    pub fn settings(&self) -> &GovernorSettings {
        &self.shared.settings
    }

    /// Requests currently holding a quota slot.
    pub fn in_flight(&self) -> usize {
        self.shared.state.lock().quota.in_flight()
    }

    /// Requests waiting for a slot, abandoned ones included until the
    /// scheduler reaches them.
    pub fn queued(&self) -> usize {
        self.shared.state.lock().queue.len()
    }

    /// Asks for a quota slot.
    ///
    /// Granted immediately when the queue is empty and the quota has room;
    /// otherwise the request joins the tail of the queue and the returned
    /// future resolves once the scheduler dispatches it. Dropping a pending
    /// [`Admission`] gives up its place in line without consuming quota.
    pub fn acquire(&self) -> Admission {
        let now = instant_now();
        let mut state = self.shared.state.lock();

        if state.queue.is_empty() {
            if let Some(release_at) = state.quota.try_admit(now) {
                RequestAdmitted {
                    in_flight: state.quota.in_flight(),
                    queued: 0,
                }
                .emit();
                drop(state);
                self.schedule_release(release_at);
                return Admission {
                    state: AdmissionState::Granted,
                };
            }
        }

        let (seq, rx) = state.queue.enqueue();
        RequestDeferred {
            seq,
            queued: state.queue.len(),
        }
        .emit();

        Admission {
            state: AdmissionState::Queued {
                seq,
                rx,
                queued_at: now,
            },
        }
    }

    fn schedule_release(&self, release_at: Instant) {
        let governor = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep_until(release_at).await;
            governor.release_and_drain();
        });
    }

    fn release_and_drain(&self) {
        let released = {
            let mut state = self.shared.state.lock();
            state.quota.release();
            QuotaReleased {
                in_flight: state.quota.in_flight(),
            }
            .emit();
            self.drain(&mut state)
        };

        for release_at in released {
            self.schedule_release(release_at);
        }
    }

    /// Dispatches queued slots from the head while the quota admits them and
    /// returns the release deadlines of the slots it admitted.
    ///
    /// Abandoned slots at the head are discarded without taking quota.
    fn drain(&self, state: &mut GovernorState) -> Vec<Instant> {
        let now = instant_now();
        let mut released = Vec::new();

        while let Some(front) = state.queue.front() {
            if front.is_abandoned() {
                if let Some(slot) = state.queue.pop_front() {
                    QueuedRequestAbandoned { seq: slot.seq() }.emit();
                }
                continue;
            }

            let Some(release_at) = state.quota.try_admit(now) else {
                break;
            };
            released.push(release_at);

            if let Some(slot) = state.queue.pop_front() {
                let seq = slot.seq();
                if slot.dispatch() {
                    debug!(message = "Dispatched queued request.", seq);
                    RequestAdmitted {
                        in_flight: state.quota.in_flight(),
                        queued: state.queue.len(),
                    }
                    .emit();
                } else {
                    // Dropped between the abandon check and dispatch; its slot
                    // stays taken until the scheduled release.
                    QueuedRequestAbandoned { seq }.emit();
                }
            }
        }

        released
    }
}

#[derive(Debug)]
enum AdmissionState {
    Granted,
    Queued {
        seq: u64,
        rx: oneshot::Receiver<()>,
        queued_at: Instant,
    },
    Done,
}

/// Future returned by [`RequestGovernor::acquire`]; resolves once the request
/// holds a quota slot.
#[must_use = "an admission does nothing unless awaited"]
#[derive(Debug)]
pub struct Admission {
    state: AdmissionState,
}

impl Admission {
    /// Whether the request was admitted without queueing.
    pub fn is_immediate(&self) -> bool {
        matches!(self.state, AdmissionState::Granted)
    }

    /// Gives up a queued request's place in line.
    pub fn cancel(self) {
        if let AdmissionState::Queued { seq, .. } = &self.state {
            debug!(message = "Queued request cancelled.", seq = *seq);
        }
    }
}

impl Future for Admission {
    type Output = Result<(), AdmissionError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let result = match &mut self.state {
            AdmissionState::Granted => Ok(()),
            AdmissionState::Queued { seq, rx, queued_at } => {
                match std::task::ready!(Pin::new(rx).poll(cx)) {
                    Ok(()) => {
                        QueuedRequestResumed {
                            seq: *seq,
                            waited: queued_at.elapsed(),
                        }
                        .emit();
                        Ok(())
                    }
                    Err(_) => Err(AdmissionError::Aborted),
                }
            }
            AdmissionState::Done => panic!("Admission polled after completion"),
        };
        self.state = AdmissionState::Done;
        Poll::Ready(result)
    }
}
