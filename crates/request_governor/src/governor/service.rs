use std::task::{Context, Poll};

use tower::Service;

use super::{AdmissionError, RequestGovernor, future::ResponseFuture, http::HttpError};

/// Admission interceptor: every call waits for a quota slot from the
/// [`RequestGovernor`] before it reaches the inner service.
///
/// Calls over the quota are queued in FIFO order, so `poll_ready` never
/// applies backpressure; callers see the wait as part of the response future.
#[derive(Clone, Debug)]
pub struct QuotaLimit<S> {
    inner: S,
    governor: RequestGovernor,
}

impl<S> QuotaLimit<S> {
    pub fn new(inner: S, governor: RequestGovernor) -> Self {
        QuotaLimit { inner, governor }
    }

    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    pub fn governor(&self) -> &RequestGovernor {
        &self.governor
    }
}

impl<S, Request> Service<Request> for QuotaLimit<S>
where
    S: Service<Request> + Clone,
    S::Error: From<AdmissionError>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = ResponseFuture<S, Request>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: Request) -> Self::Future {
        let admission = self.governor.acquire();
        ResponseFuture::new(admission, self.inner.clone(), request)
    }
}

impl From<AdmissionError> for HttpError {
    fn from(_: AdmissionError) -> Self {
        HttpError::AdmissionAborted
    }
}
