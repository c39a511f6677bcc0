use std::{
    borrow::Cow,
    future::Future,
    pin::Pin,
    task::{Context, Poll},
    time::Duration,
};

use futures::FutureExt;
use http::StatusCode;
use tokio::time::{Sleep, sleep};
use tower::retry::Policy;

use crate::governor::{
    http::{ApiResponse, HttpError},
    internal_event::{InternalEvent, ThrottleRetryScheduled},
};

/// Server-side fallback when a throttling response names no delay.
pub const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(60);

/// Longest server-requested wait honored before resubmitting.
pub const MAX_RETRY_AFTER: Duration = Duration::from_secs(60 * 60);

pub enum RetryAction {
    /// Retry the request. `after` carries a delay dictated by the server.
    Retry {
        reason: Cow<'static, str>,
        after: Option<Duration>,
    },
    /// Indicate that this request should not be retried with a reason
    DontRetry(Cow<'static, str>),
    /// Indicate that this request should not be retried but the request was successful
    Successful,
}

impl RetryAction {
    pub const fn is_retryable(&self) -> bool {
        matches!(self, RetryAction::Retry { .. })
    }

    pub const fn is_not_retryable(&self) -> bool {
        matches!(self, RetryAction::DontRetry(_))
    }

    pub const fn is_successful(&self) -> bool {
        matches!(self, RetryAction::Successful)
    }
}

/// Decides which outcomes of a service call a retry policy acts on.
///
/// Each policy in a stack gets its own logic, so unrelated failure classes
/// (server throttling, gateway timeouts) never share an attempt budget.
///
/// # Example
/// ```rust
/// use std::borrow::Cow;
/// use request_governor::governor::{
///     http::{ApiResponse, HttpError},
///     retries::{RetryAction, RetryLogic},
/// };
///
/// #[derive(Clone)]
/// struct RetryTimeouts;
///
/// impl RetryLogic for RetryTimeouts {
///     type Error = HttpError;
///     type Response = ApiResponse;
///
///     fn should_retry_error(&self, error: &Self::Error) -> RetryAction {
///         match error {
///             HttpError::Timeout => RetryAction::Retry { reason: Cow::Borrowed("timeout"), after: None },
///             _ => RetryAction::DontRetry(Cow::Borrowed("not a timeout")),
///         }
///     }
/// }
/// ```
pub trait RetryLogic: Clone + Send + Sync + 'static {
    /// The type of errors produced by the service
    type Error: std::error::Error + Send + Sync + 'static;

    /// The type of successful responses from the service
    type Response;

    fn should_retry_error(&self, error: &Self::Error) -> RetryAction;

    /// Successful responses are final unless a logic says otherwise.
    fn should_retry_response(&self, _response: &Self::Response) -> RetryAction {
        RetryAction::Successful
    }
}

/// What a throttling response asks of the client: how long to wait before
/// sending the same request again.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryDirective {
    pub delay: Duration,
}

impl RetryDirective {
    /// Reads `retry_after` (seconds) from a JSON throttling body.
    ///
    /// Returns `None` when the body is not JSON, the field is missing, or it is
    /// not a positive number; callers fall back to their default delay.
    /// Delays are capped at [`MAX_RETRY_AFTER`].
    pub fn from_throttle_body(body: &str) -> Option<Self> {
        let value: serde_json::Value = serde_json::from_str(body).ok()?;
        let secs = value.get("retry_after")?.as_f64()?;
        if !secs.is_finite() || secs <= 0.0 {
            return None;
        }
        let delay = Duration::try_from_secs_f64(secs)
            .unwrap_or(MAX_RETRY_AFTER)
            .min(MAX_RETRY_AFTER);
        Some(RetryDirective { delay })
    }
}

/// Retries HTTP 429 responses after the server's `retry_after`.
#[derive(Clone, Copy, Debug, Default)]
pub struct ThrottleRetryLogic;

impl RetryLogic for ThrottleRetryLogic {
    type Error = HttpError;
    type Response = ApiResponse;

    fn should_retry_error(&self, error: &Self::Error) -> RetryAction {
        match error {
            HttpError::Status { status, body } if *status == StatusCode::TOO_MANY_REQUESTS => {
                RetryAction::Retry {
                    reason: Cow::Borrowed("Server responded with 429 Too Many Requests"),
                    after: RetryDirective::from_throttle_body(body).map(|d| d.delay),
                }
            }
            _ => RetryAction::DontRetry(Cow::Owned(format!("Not a throttling response: {}", error))),
        }
    }
}

/// Retries HTTP 504 responses.
#[derive(Clone, Copy, Debug, Default)]
pub struct GatewayTimeoutRetryLogic;

impl RetryLogic for GatewayTimeoutRetryLogic {
    type Error = HttpError;
    type Response = ApiResponse;

    fn should_retry_error(&self, error: &Self::Error) -> RetryAction {
        if error.is_status(StatusCode::GATEWAY_TIMEOUT) {
            RetryAction::Retry {
                reason: Cow::Borrowed("Server responded with 504 Gateway Timeout"),
                after: None,
            }
        } else {
            RetryAction::DontRetry(Cow::Owned(format!("Not a gateway timeout: {}", error)))
        }
    }
}

/// Waits out the retry delay, then yields the policy for the next attempt.
pub struct RetryPolicyFuture<P> {
    delay: Pin<Box<Sleep>>,
    policy: Option<P>,
}

impl<P> RetryPolicyFuture<P> {
    fn new(delay: Duration, policy: P) -> Self {
        RetryPolicyFuture {
            delay: Box::pin(sleep(delay)),
            policy: Some(policy),
        }
    }
}

// Safety: `P` is never pinned and we use no unsafe pin projections
// therefore this safe.
impl<P> Unpin for RetryPolicyFuture<P> {}

impl<P> Future for RetryPolicyFuture<P> {
    type Output = P;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        std::task::ready!(self.delay.poll_unpin(cx));
        match self.policy.take() {
            Some(policy) => Poll::Ready(policy),
            None => panic!("RetryPolicyFuture polled after completion"),
        }
    }
}

/// Resubmits requests the server throttled, waiting as long as the server
/// asked (`default_delay` when it did not say).
///
/// Sits outside the quota layer, so every resubmission is admitted against
/// the quota like a fresh request. Attempts are capped at
/// `remaining_attempts`; after that the throttling error reaches the caller.
#[derive(Clone, Debug)]
pub struct ThrottleRetryPolicy<L> {
    remaining_attempts: usize,
    default_delay: Duration,
    logic: L,
}

impl<L: RetryLogic> ThrottleRetryPolicy<L> {
    pub fn new(remaining_attempts: usize, default_delay: Duration, logic: L) -> Self {
        ThrottleRetryPolicy {
            remaining_attempts,
            default_delay,
            logic,
        }
    }

    pub fn remaining_attempts(&self) -> usize {
        self.remaining_attempts
    }

    fn advance(&self) -> Self {
        ThrottleRetryPolicy {
            remaining_attempts: self.remaining_attempts - 1,
            default_delay: self.default_delay,
            logic: self.logic.clone(),
        }
    }

    fn build_retry(&self, after: Option<Duration>) -> RetryPolicyFuture<Self> {
        let delay = after.unwrap_or(self.default_delay);
        let policy = self.advance();
        ThrottleRetryScheduled {
            delay,
            attempts_remaining: policy.remaining_attempts,
        }
        .emit();
        RetryPolicyFuture::new(delay, policy)
    }
}

impl<Req, L> Policy<Req, L::Response, L::Error> for ThrottleRetryPolicy<L>
where
    Req: Clone,
    L: RetryLogic,
{
    type Future = RetryPolicyFuture<Self>;

    fn retry(&self, _: &Req, result: Result<&L::Response, &L::Error>) -> Option<Self::Future> {
        let action = match result {
            Ok(response) => self.logic.should_retry_response(response),
            Err(error) => self.logic.should_retry_error(error),
        };

        match action {
            RetryAction::Retry { reason, after } => {
                if self.remaining_attempts == 0 {
                    error!(message = "Throttle retries exhausted; giving up.", %reason);
                    return None;
                }
                Some(self.build_retry(after))
            }
            RetryAction::DontRetry(reason) => {
                trace!(message = "Not a throttling outcome; passing through.", %reason);
                None
            }
            RetryAction::Successful => None,
        }
    }

    fn clone_request(&self, request: &Req) -> Option<Req> {
        Some(request.clone())
    }
}

/// Retries with a fixed client-chosen pause and a hard attempt ceiling,
/// ignoring any delay the server suggests.
#[derive(Clone, Debug)]
pub struct FixedBackoffPolicy<L> {
    remaining_attempts: usize,
    delay: Duration,
    logic: L,
}

impl<L: RetryLogic> FixedBackoffPolicy<L> {
    pub fn new(remaining_attempts: usize, delay: Duration, logic: L) -> Self {
        FixedBackoffPolicy {
            remaining_attempts,
            delay,
            logic,
        }
    }

    pub fn remaining_attempts(&self) -> usize {
        self.remaining_attempts
    }
}

impl<Req, L> Policy<Req, L::Response, L::Error> for FixedBackoffPolicy<L>
where
    Req: Clone,
    L: RetryLogic,
{
    type Future = RetryPolicyFuture<Self>;

    fn retry(&self, _: &Req, result: Result<&L::Response, &L::Error>) -> Option<Self::Future> {
        let action = match result {
            Ok(response) => self.logic.should_retry_response(response),
            Err(error) => self.logic.should_retry_error(error),
        };

        match action {
            RetryAction::Retry { reason, .. } => {
                if self.remaining_attempts == 0 {
                    error!(message = "Retries exhausted; giving up.", %reason);
                    return None;
                }
                let next = FixedBackoffPolicy {
                    remaining_attempts: self.remaining_attempts - 1,
                    delay: self.delay,
                    logic: self.logic.clone(),
                };
                warn!(
                    message = "Retrying after fixed pause.",
                    %reason,
                    delay_ms = %self.delay.as_millis(),
                    attempts_remaining = next.remaining_attempts,
                );
                Some(RetryPolicyFuture::new(self.delay, next))
            }
            RetryAction::DontRetry(_) | RetryAction::Successful => None,
        }
    }

    fn clone_request(&self, request: &Req) -> Option<Req> {
        Some(request.clone())
    }
}
