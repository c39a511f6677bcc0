//! Future types

use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll, ready},
};

use pin_project::pin_project;
use tower::{Service, util::Oneshot};

use super::{Admission, AdmissionError};

/// Future for the [`QuotaLimit`](super::QuotaLimit) service: waits for
/// admission, then drives the inner service to readiness and calls it.
#[pin_project]
pub struct ResponseFuture<S: Service<Req>, Req> {
    #[pin]
    state: State<S, Req>,
}

#[pin_project(project = StateProj)]
enum State<S: Service<Req>, Req> {
    Admitting {
        admission: Admission,
        service: Option<S>,
        request: Option<Req>,
    },
    Calling {
        #[pin]
        call: Oneshot<S, Req>,
    },
}

impl<S: Service<Req>, Req> ResponseFuture<S, Req> {
    pub(super) fn new(admission: Admission, service: S, request: Req) -> Self {
        ResponseFuture {
            state: State::Admitting {
                admission,
                service: Some(service),
                request: Some(request),
            },
        }
    }
}

impl<S, Req> Future for ResponseFuture<S, Req>
where
    S: Service<Req>,
    S::Error: From<AdmissionError>,
{
    type Output = Result<S::Response, S::Error>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut this = self.project();
        loop {
            match this.state.as_mut().project() {
                StateProj::Admitting {
                    admission,
                    service,
                    request,
                } => {
                    ready!(Pin::new(admission).poll(cx))?;
                    let (Some(service), Some(request)) = (service.take(), request.take()) else {
                        panic!("ResponseFuture polled after completion");
                    };
                    this.state.set(State::Calling {
                        call: Oneshot::new(service, request),
                    });
                }
                StateProj::Calling { call } => return call.poll(cx),
            }
        }
    }
}
