use tower::Layer;

use super::{RequestGovernor, service::QuotaLimit};

/// Enforces a [`RequestGovernor`]'s quota on the underlying service.
///
/// Every service built from clones of this layer shares the same governor.
#[derive(Clone, Debug)]
pub struct QuotaLimitLayer {
    governor: RequestGovernor,
}

impl QuotaLimitLayer {
    pub fn new(governor: RequestGovernor) -> Self {
        QuotaLimitLayer { governor }
    }

    pub fn governor(&self) -> &RequestGovernor {
        &self.governor
    }
}

impl<S> Layer<S> for QuotaLimitLayer {
    type Service = QuotaLimit<S>;

    fn layer(&self, service: S) -> Self::Service {
        QuotaLimit::new(service, self.governor.clone())
    }
}
