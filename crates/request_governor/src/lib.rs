//! Client-side request governor for quota-limited HTTP APIs.
//!
//! Every outbound request passes an admission check against a fixed quota
//! (by default 10 requests per 60 second window). Requests over the quota are
//! queued instead of dropped and dispatched in FIFO order as slots free up,
//! one slot every `window / max_requests`. Responses that carry a server-side
//! throttling signal (HTTP 429) are retried after the server-provided delay,
//! and the retry goes through admission again.
//!
//! # Layering
//!
//! The pieces are ordinary [`tower`] middleware:
//!
//! ```text
//! Retry<ThrottleRetryPolicy>         resubmits 429s after `retry_after`
//!   └── QuotaLimit                   admission: run now or wait in the FIFO
//!         └── ReqwestService         buffers the body, classifies failures
//! ```
//!
//! # Basic Usage
//! ```no_run
//! use request_governor::governor::{
//!     GovernorSettings, QuotaLimitLayer, RequestGovernor,
//!     http::ApiRequest,
//!     reqwest_integration::ReqwestService,
//!     retries::{ThrottleRetryLogic, ThrottleRetryPolicy},
//! };
//! use std::time::Duration;
//! use tower::{ServiceBuilder, ServiceExt};
//!
//! # async fn run() -> Result<(), request_governor::governor::http::HttpError> {
//! let governor = RequestGovernor::new(GovernorSettings::default());
//! let service = ServiceBuilder::new()
//!     .retry(ThrottleRetryPolicy::new(5, Duration::from_secs(60), ThrottleRetryLogic))
//!     .layer(QuotaLimitLayer::new(governor))
//!     .service(ReqwestService::new("https://example.com")?);
//!
//! let response = service.oneshot(ApiRequest::get("/campaigns")).await?;
//! # let _ = response;
//! # Ok(())
//! # }
//! ```
//!
//! # Metrics
//! Emits gauges, counters and histograms via the `InternalEvent` trait.
pub mod governor;

#[macro_use]
extern crate tracing;

pub type Error = Box<dyn std::error::Error + Send + Sync + 'static>;
