use std::task::{Context, Poll};

use futures::future::BoxFuture;
use http::StatusCode;
use reqwest::Url;
use tower::Service;

use crate::governor::http::{ApiRequest, ApiResponse, HttpError};

/// A `tower::Service` wrapper for `reqwest::Client` bound to one base URL.
///
/// Accepts [`ApiRequest`]s whose path is resolved against the base URL and
/// returns the response with its body fully read. Non-success statuses come
/// back as [`HttpError::Status`] carrying the body text.
#[derive(Clone, Debug)]
pub struct ReqwestService {
    client: reqwest::Client,
    base_url: Url,
}

impl ReqwestService {
    pub fn new(base_url: &str) -> Result<Self, HttpError> {
        Self::new_with_client(reqwest::Client::new(), base_url)
    }

    pub fn new_with_client(client: reqwest::Client, base_url: &str) -> Result<Self, HttpError> {
        let base_url = Url::parse(base_url).map_err(|parse_err| HttpError::InvalidRequest {
            details: format!("Invalid base URL '{}': {}", base_url, parse_err),
        })?;
        Ok(Self { client, base_url })
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Resolves a request path against the base URL, keeping any path prefix
    /// the base URL already has.
    pub fn url_for(&self, path: &str) -> Result<Url, HttpError> {
        let joined = format!(
            "{}/{}",
            self.base_url.as_str().trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        Url::parse(&joined).map_err(|parse_err| HttpError::InvalidRequest {
            details: format!("Invalid URL '{}': {}", joined, parse_err),
        })
    }
}

/// Maps a reqwest failure onto the governor's error classes.
pub fn classify_reqwest_error(e: reqwest::Error) -> HttpError {
    if e.is_timeout() {
        warn!(error = %e, "Request timed out");
        HttpError::Timeout
    } else if e.is_connect() || e.is_request() {
        error!(error = %e, "Connection error");
        HttpError::Transport {
            source: Box::new(e),
        }
    } else {
        error!(error = %e, "Other reqwest error");
        HttpError::ClientError {
            source: Box::new(e),
        }
    }
}

impl Service<ApiRequest> for ReqwestService {
    type Response = ApiResponse;
    type Error = HttpError;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: ApiRequest) -> Self::Future {
        let url = match self.url_for(&request.path) {
            Ok(url) => url,
            Err(e) => return Box::pin(async move { Err(e) }),
        };

        let mut request_builder = self
            .client
            .request(request.method, url)
            .header(reqwest::header::CONTENT_TYPE, "application/json");
        if let Some(body) = request.body {
            request_builder = request_builder.body(body);
        }

        let request_future = request_builder.send();
        Box::pin(async move {
            let response = request_future.await.map_err(classify_reqwest_error)?;
            let status = response.status();

            if status.is_success() {
                let body = response.bytes().await.map_err(classify_reqwest_error)?;
                return Ok(ApiResponse { status, body });
            }

            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "Could not read error body".to_string());

            if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
                warn!(status = %status, error_body = %error_body, "Server error or rate limited");
            } else if status.is_client_error() {
                debug!(status = %status, error_body = %error_body, "Client error");
            }

            Err(HttpError::Status {
                status,
                body: error_body,
            })
        })
    }
}
