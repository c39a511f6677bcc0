//! Admit outbound requests against a fixed quota, queue the rest.

mod future;
pub mod layer;
mod queue;
mod quota;
mod scheduler;
pub mod service;

pub mod http;
pub mod internal_event;
pub mod reqwest_integration;
pub mod retries;

use std::time::Duration;

use bon::Builder;
use serde::{Deserialize, Serialize};

pub use layer::QuotaLimitLayer;
pub use scheduler::{Admission, AdmissionError, RequestGovernor};
pub use service::QuotaLimit;

fn instant_now() -> tokio::time::Instant {
    tokio::time::Instant::now()
}

/// Quota parameters of a [`RequestGovernor`].
///
/// At most `max_requests` requests are in flight against the quota at once.
/// Each admitted request holds its slot for one release interval
/// (`window / max_requests`) after the previously scheduled release, so slots
/// free up at an even pace instead of all at the end of the window.
///
/// | Parameter | Default | Description |
/// |-----------|---------|-------------|
/// | `max_requests` | 10 | Ceiling on admitted requests |
/// | `window` | 60 s | Period over which the ceiling is spread |
///
/// # Example
///
/// ```rust
/// use request_governor::governor::GovernorSettings;
/// use std::time::Duration;
///
/// let settings = GovernorSettings::builder()
///     .max_requests(5)
///     .window(Duration::from_secs(10))
///     .build();
/// assert_eq!(settings.release_interval(), Duration::from_secs(2));
/// ```
#[derive(Clone, Copy, Debug, Builder, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GovernorSettings {
    /// Ceiling on requests admitted against the quota.
    ///
    /// **Default**: 10
    #[builder(default = default_max_requests())]
    pub(super) max_requests: usize,

    /// Length of the quota window.
    ///
    /// **Default**: 60 seconds
    #[builder(default = default_window())]
    pub(super) window: Duration,
}

const fn default_max_requests() -> usize {
    10
}

const fn default_window() -> Duration {
    Duration::from_secs(60)
}

impl Default for GovernorSettings {
    fn default() -> Self {
        Self {
            max_requests: default_max_requests(),
            window: default_window(),
        }
    }
}

impl GovernorSettings {
    pub fn get_max_requests(&self) -> usize {
        self.max_requests
    }

    pub fn get_window(&self) -> Duration {
        self.window
    }

    /// Time one admitted request holds its slot: `window / max_requests`.
    ///
    /// A zero ceiling is treated as one, here and in admission.
    pub fn release_interval(&self) -> Duration {
        let slots = u32::try_from(self.max_requests.max(1)).unwrap_or(u32::MAX);
        self.window / slots
    }
}
